//! Embedded HEALPix primitive.
//!
//! Nested and ring indexing for power-of-two `nside`, pixel centres and
//! vertices, and ring-scan disc queries (Gorski et al. 2005).
//!
//! Everything here works in radians on `(z, phi)` with `z = cos(theta)`;
//! [`super::PixelGrid`] is the only caller and owns the degree conversions.
//!
//! The 12 base faces are laid out as:
//! - 0–3: north polar cap
//! - 4–7: equatorial belt
//! - 8–11: south polar cap

use std::f64::consts::{FRAC_PI_2, PI, TAU};

/// Highest supported order (`nside = 2^29`).
pub const MAX_ORDER: u32 = 29;

const JRLL: [i64; 12] = [2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4];
const JPLL: [i64; 12] = [1, 3, 5, 7, 0, 2, 4, 6, 1, 3, 5, 7];

/// Base face plus integer position inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FaceXy {
    pub face: usize,
    pub ix: u64,
    pub iy: u64,
}

pub(crate) fn npix(order: u32) -> u64 {
    12u64 << (2 * order)
}

// ---------------------------------------------------------------------------
// Nested bit interleaving
// ---------------------------------------------------------------------------

/// Interleave `v` with zeros: bit `i` moves to bit `2i`.
fn spread_bits(v: u64) -> u64 {
    let mut result = 0u64;
    for i in 0..32 {
        result |= ((v >> i) & 1) << (2 * i);
    }
    result
}

/// Inverse of [`spread_bits`]: collect the even bits.
fn compact_bits(v: u64) -> u64 {
    let mut result = 0u64;
    for i in 0..32 {
        result |= ((v >> (2 * i)) & 1) << i;
    }
    result
}

pub(crate) fn xyf_to_nest(xyf: FaceXy, order: u32) -> u64 {
    ((xyf.face as u64) << (2 * order)) + (spread_bits(xyf.ix) | (spread_bits(xyf.iy) << 1))
}

pub(crate) fn nest_to_xyf(pix: u64, order: u32) -> FaceXy {
    let face = (pix >> (2 * order)) as usize;
    let sub = pix & ((1u64 << (2 * order)) - 1);
    FaceXy {
        face,
        ix: compact_bits(sub),
        iy: compact_bits(sub >> 1),
    }
}

// ---------------------------------------------------------------------------
// Ring scheme
// ---------------------------------------------------------------------------

/// First pixel, pixel count and half-pixel shift of ring `ring` (1-based from north).
fn ring_info(ring: i64, ns: i64) -> (i64, i64, bool) {
    let ncap = 2 * ns * (ns - 1);
    let npix = 12 * ns * ns;
    if ring < ns {
        (2 * ring * (ring - 1), 4 * ring, true)
    } else if ring < 3 * ns {
        (ncap + (ring - ns) * 4 * ns, 4 * ns, ((ring - ns) & 1) == 0)
    } else {
        let nr = 4 * ns - ring;
        (npix - 2 * nr * (nr + 1), 4 * nr, true)
    }
}

/// `cos(theta)` of the pixel centres on ring `ring`.
fn ring_z(ring: i64, ns: i64) -> f64 {
    let nsf = ns as f64;
    if ring < ns {
        1.0 - (ring * ring) as f64 / (3.0 * nsf * nsf)
    } else if ring <= 3 * ns {
        (2 * ns - ring) as f64 * 2.0 / (3.0 * nsf)
    } else {
        let nr = 4 * ns - ring;
        (nr * nr) as f64 / (3.0 * nsf * nsf) - 1.0
    }
}

/// Continuous inverse of [`ring_z`]: the (fractional) ring at height `z`.
fn ring_index(z: f64, ns: i64) -> f64 {
    let nsf = ns as f64;
    if z > 2.0 / 3.0 {
        nsf * (3.0 * (1.0 - z)).max(0.0).sqrt()
    } else if z >= -2.0 / 3.0 {
        nsf * (2.0 - 1.5 * z)
    } else {
        4.0 * nsf - nsf * (3.0 * (1.0 + z)).max(0.0).sqrt()
    }
}

fn isqrt(v: i64) -> i64 {
    let mut r = (v as f64).sqrt() as i64;
    while r * r > v {
        r -= 1;
    }
    while (r + 1) * (r + 1) <= v {
        r += 1;
    }
    r
}

pub(crate) fn ring_to_xyf(pix: u64, order: u32) -> FaceXy {
    let ns = 1i64 << order;
    let pix = pix as i64;
    let ncap = 2 * ns * (ns - 1);
    let npix = 12 * ns * ns;
    let nl2 = 2 * ns;

    let (iring, iphi, kshift, nr, face);
    if pix < ncap {
        iring = (1 + isqrt(1 + 2 * pix)) >> 1;
        iphi = (pix + 1) - 2 * iring * (iring - 1);
        kshift = 0;
        nr = iring;
        face = (iphi - 1) / nr;
    } else if pix < npix - ncap {
        let ip = pix - ncap;
        let tmp = ip / (4 * ns);
        iring = tmp + ns;
        iphi = ip - tmp * 4 * ns + 1;
        kshift = (iring + ns) & 1;
        nr = ns;
        let ire = tmp + 1;
        let irm = nl2 + 1 - tmp;
        let ifm = (iphi - (ire >> 1) + ns - 1) / ns;
        let ifp = (iphi - (irm >> 1) + ns - 1) / ns;
        face = equatorial_face(ifp, ifm);
    } else {
        let ip = npix - pix;
        let ir = (1 + isqrt(2 * ip - 1)) >> 1;
        iphi = 4 * ir + 1 - (ip - 2 * ir * (ir - 1));
        kshift = 0;
        nr = ir;
        iring = 2 * nl2 - ir;
        face = (iphi - 1) / nr + 8;
    }

    let irt = iring - (2 + (face >> 2)) * ns + 1;
    let mut ipt = 2 * iphi - JPLL[face as usize] * nr - kshift - 1;
    if ipt >= nl2 {
        ipt -= 8 * ns;
    }
    FaceXy {
        face: face as usize,
        ix: ((ipt - irt) >> 1) as u64,
        iy: ((-ipt - irt) >> 1) as u64,
    }
}

pub(crate) fn xyf_to_ring(xyf: FaceXy, order: u32) -> u64 {
    let ns = 1i64 << order;
    let (ix, iy) = (xyf.ix as i64, xyf.iy as i64);
    let jr = JRLL[xyf.face] * ns - ix - iy - 1;
    let (start, ringpix, shifted) = ring_info(jr, ns);
    let nr = ringpix >> 2;
    let kshift = 1 - shifted as i64;
    let mut jp = (JPLL[xyf.face] * nr + ix - iy + 1 + kshift) / 2;
    if jp < 1 {
        jp += 4 * ns;
    }
    (start + jp - 1) as u64
}

fn equatorial_face(ifp: i64, ifm: i64) -> i64 {
    if ifp == ifm {
        ifp | 4
    } else if ifp < ifm {
        ifp
    } else {
        ifm + 8
    }
}

// ---------------------------------------------------------------------------
// Coordinates
// ---------------------------------------------------------------------------

/// Locate the face and cell containing `(z, phi)`; `sth = sin(theta)` keeps
/// precision near the poles.
pub(crate) fn loc_to_xyf(z: f64, sth: f64, phi: f64, order: u32) -> FaceXy {
    let ns = 1i64 << order;
    let nsf = ns as f64;
    let za = z.abs();
    let mut tt = (phi / FRAC_PI_2).rem_euclid(4.0);
    if tt >= 4.0 {
        tt -= 4.0;
    }

    if za <= 2.0 / 3.0 {
        let temp1 = nsf * (0.5 + tt);
        let temp2 = nsf * (z * 0.75);
        let jp = (temp1 - temp2) as i64;
        let jm = (temp1 + temp2) as i64;
        let face = equatorial_face(jp >> order, jm >> order);
        FaceXy {
            face: face as usize,
            ix: (jm & (ns - 1)) as u64,
            iy: (ns - (jp & (ns - 1)) - 1) as u64,
        }
    } else {
        let ntt = (tt as i64).min(3);
        let tp = tt - ntt as f64;
        let tmp = if za < 0.99 {
            nsf * (3.0 * (1.0 - za)).sqrt()
        } else {
            nsf * sth / ((1.0 + za) / 3.0).sqrt()
        };
        let jp = ((tp * tmp) as i64).min(ns - 1);
        let jm = (((1.0 - tp) * tmp) as i64).min(ns - 1);
        if z >= 0.0 {
            FaceXy {
                face: ntt as usize,
                ix: (ns - jm - 1) as u64,
                iy: (ns - jp - 1) as u64,
            }
        } else {
            FaceXy {
                face: (ntt + 8) as usize,
                ix: jp as u64,
                iy: jm as u64,
            }
        }
    }
}

/// Continuous face coordinates (`x`, `y` in units of the face side) to
/// `(z, sin(theta), phi)`.
pub(crate) fn face_to_loc(face: usize, x: f64, y: f64) -> (f64, f64, f64) {
    let jr = JRLL[face] as f64 - x - y;
    let (nr, z, sth) = if jr < 1.0 {
        let tmp = jr * jr / 3.0;
        (jr, 1.0 - tmp, (tmp * (2.0 - tmp)).max(0.0).sqrt())
    } else if jr > 3.0 {
        let nr = 4.0 - jr;
        let tmp = nr * nr / 3.0;
        (nr, tmp - 1.0, (tmp * (2.0 - tmp)).max(0.0).sqrt())
    } else {
        let z = (2.0 - jr) * 2.0 / 3.0;
        (1.0, z, ((1.0 - z) * (1.0 + z)).sqrt())
    };

    let mut tmp = JPLL[face] as f64 * nr + x - y;
    if tmp < 0.0 {
        tmp += 8.0;
    }
    if tmp >= 8.0 {
        tmp -= 8.0;
    }
    let phi = if nr < 1e-15 {
        0.0
    } else {
        0.5 * FRAC_PI_2 * tmp / nr
    };
    (z, sth, phi)
}

/// Centre of a cell as `(z, sin(theta), phi)`.
pub(crate) fn xyf_centre(xyf: FaceXy, order: u32) -> (f64, f64, f64) {
    let nsf = (1u64 << order) as f64;
    face_to_loc(
        xyf.face,
        (xyf.ix as f64 + 0.5) / nsf,
        (xyf.iy as f64 + 0.5) / nsf,
    )
}

/// Corner vertices of a cell in N, W, S, E order.
pub(crate) fn xyf_corners(xyf: FaceXy, order: u32) -> [(f64, f64, f64); 4] {
    let nsf = (1u64 << order) as f64;
    let xc = (xyf.ix as f64 + 0.5) / nsf;
    let yc = (xyf.iy as f64 + 0.5) / nsf;
    let dc = 0.5 / nsf;
    [
        face_to_loc(xyf.face, xc + dc, yc + dc),
        face_to_loc(xyf.face, xc - dc, yc + dc),
        face_to_loc(xyf.face, xc - dc, yc - dc),
        face_to_loc(xyf.face, xc + dc, yc - dc),
    ]
}

fn unit_vector(z: f64, phi: f64) -> [f64; 3] {
    let sth = ((1.0 - z) * (1.0 + z)).max(0.0).sqrt();
    [sth * phi.cos(), sth * phi.sin(), z]
}

fn vector_angle(a: [f64; 3], b: [f64; 3]) -> f64 {
    let cross = [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ];
    let norm = (cross[0] * cross[0] + cross[1] * cross[1] + cross[2] * cross[2]).sqrt();
    let dot = a[0] * b[0] + a[1] * b[1] + a[2] * b[2];
    norm.atan2(dot)
}

/// Largest angular distance (radians) between any pixel centre and its corners.
pub(crate) fn max_pixrad(order: u32) -> f64 {
    let nsf = (1u64 << order) as f64;
    let va = unit_vector(2.0 / 3.0, PI / (4.0 * nsf));
    let t1 = (1.0 - 1.0 / nsf).powi(2);
    let vb = unit_vector(1.0 - t1 / 3.0, 0.0);
    vector_angle(va, vb)
}

// ---------------------------------------------------------------------------
// Disc query
// ---------------------------------------------------------------------------

/// Ring-scheme ids of all pixels whose centres lie within `radius` (radians)
/// of the point at colatitude `theta0`, longitude `phi0`.
///
/// Each ring is intersected analytically: on a ring at height `z` the centres
/// within the disc satisfy `cos(dphi) >= (cos r - z z0) / (s s0)`.
pub(crate) fn query_disc_ring(order: u32, theta0: f64, phi0: f64, radius: f64) -> Vec<u64> {
    let ns = 1i64 << order;
    if radius >= PI {
        return (0..npix(order)).collect();
    }

    let (z0, s0) = (theta0.cos(), theta0.sin());
    let cos_r = radius.cos();
    let z_max = (theta0 - radius).max(0.0).cos();
    let z_min = (theta0 + radius).min(PI).cos();
    let phi0 = phi0.rem_euclid(TAU);

    let first = (ring_index(z_max, ns).floor() as i64 - 1).max(1);
    let last = (ring_index(z_min, ns).ceil() as i64 + 1).min(4 * ns - 1);

    let mut pixels = Vec::new();
    for ring in first..=last {
        let z = ring_z(ring, ns);
        if z > z_max + 1e-12 || z < z_min - 1e-12 {
            continue;
        }
        let s = ((1.0 - z) * (1.0 + z)).max(0.0).sqrt();
        let (start, ringpix, shifted) = ring_info(ring, ns);

        let denom = s * s0;
        let full_ring = if denom < 1e-300 {
            if z * z0 >= cos_r {
                true
            } else {
                continue;
            }
        } else {
            let x = (cos_r - z * z0) / denom;
            if x > 1.0 {
                continue;
            }
            if x <= -1.0 {
                true
            } else {
                let dphi = x.acos();
                let step = TAU / ringpix as f64;
                let shift = if shifted { 0.5 } else { 0.0 };
                let lo = ((phi0 - dphi) / step - shift).ceil() as i64;
                let hi = ((phi0 + dphi) / step - shift).floor() as i64;
                if hi - lo + 1 >= ringpix {
                    true
                } else {
                    for j in lo..=hi {
                        pixels.push((start + j.rem_euclid(ringpix)) as u64);
                    }
                    false
                }
            }
        };
        if full_ring {
            pixels.extend((start..start + ringpix).map(|p| p as u64));
        }
    }
    pixels
}
