//! Spherical helpers: angular distances, cap and window areas, RA ranges.
//!
//! Distances use the cosine formula with the argument clamped to `[-1, 1]`,
//! so round-off never produces a NaN.

use std::f64::consts::PI;

const RAD_TO_DEG: f64 = 180.0 / PI;
const DEG_TO_RAD: f64 = PI / 180.0;

/// A fixed reference point with its trigonometry precomputed.
///
/// Every exact distance in the crate goes through [`SkyPoint::distance_deg`],
/// so two classifiers that compare against the same centre agree bit for bit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkyPoint {
    pub ra_deg: f64,
    pub dec_deg: f64,
    sin_dec: f64,
    cos_dec: f64,
}

impl SkyPoint {
    pub fn new(ra_deg: f64, dec_deg: f64) -> Self {
        let (sin_dec, cos_dec) = libm::sincos(dec_deg * DEG_TO_RAD);
        Self {
            ra_deg,
            dec_deg,
            sin_dec,
            cos_dec,
        }
    }

    /// Angular distance in degrees from this point to `(ra_deg, dec_deg)`.
    pub fn distance_deg(&self, ra_deg: f64, dec_deg: f64) -> f64 {
        let (sin_dec, cos_dec) = libm::sincos(dec_deg * DEG_TO_RAD);
        let cos_dra = libm::cos((ra_deg - self.ra_deg) * DEG_TO_RAD);
        let cos_theta = self.sin_dec * sin_dec + self.cos_dec * cos_dec * cos_dra;
        libm::acos(cos_theta.clamp(-1.0, 1.0)) * RAD_TO_DEG
    }
}

/// Angular distance in degrees between two positions given in degrees.
pub fn angular_distance_deg(ra1_deg: f64, dec1_deg: f64, ra2_deg: f64, dec2_deg: f64) -> f64 {
    SkyPoint::new(ra2_deg, dec2_deg).distance_deg(ra1_deg, dec1_deg)
}

/// Area in square degrees between two concentric circles of radii
/// `r_in_deg < r_out_deg`.
pub fn annulus_area_deg2(r_in_deg: f64, r_out_deg: f64) -> f64 {
    2.0 * PI
        * (libm::cos(r_in_deg * DEG_TO_RAD) - libm::cos(r_out_deg * DEG_TO_RAD))
        * RAD_TO_DEG
        * RAD_TO_DEG
}

/// Area in square degrees of an RA/Dec rectangle.
pub fn radec_window_area_deg2(ra_min: f64, ra_max: f64, dec_min: f64, dec_max: f64) -> f64 {
    (ra_max - ra_min)
        * RAD_TO_DEG
        * (libm::sin(dec_max * DEG_TO_RAD) - libm::sin(dec_min * DEG_TO_RAD))
}

/// RA extent of a set of positions, unwrapping surveys that straddle RA = 0.
///
/// When positions reach both edges of `[0, 360)` the longest run of empty 1°
/// bins is used as the cut and RAs beyond it are shifted by −360, so the returned
/// minimum may be negative. A survey without any empty degree returns
/// `(0, 360)`. Returns `None` for an empty input.
pub fn survey_ra_range(ra_deg: &[f64]) -> Option<(f64, f64)> {
    let (min, max) = min_max(ra_deg.iter().copied())?;
    if !(min < 0.5 && max > 359.5) {
        return Some((min, max));
    }

    let mut occupied = [false; 360];
    for &ra in ra_deg {
        let bin = (ra.rem_euclid(360.0) as usize).min(359);
        occupied[bin] = true;
    }
    let Some((_, gap_end)) = longest_empty_run(&occupied) else {
        return Some((0.0, 360.0));
    };

    let unwrapped = ra_deg.iter().map(|&ra| {
        let ra = ra.rem_euclid(360.0);
        if ra >= gap_end as f64 {
            ra - 360.0
        } else {
            ra
        }
    });
    min_max(unwrapped)
}

/// Longest run of empty bins as a half-open `[start, end)` range.
fn longest_empty_run(occupied: &[bool]) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None;
    let mut start = None;
    for (i, &o) in occupied.iter().chain(std::iter::once(&true)).enumerate() {
        match (o, start) {
            (false, None) => start = Some(i),
            (true, Some(s)) => {
                if best.is_none_or(|(bs, be)| i - s > be - bs) {
                    best = Some((s, i));
                }
                start = None;
            }
            _ => {}
        }
    }
    best
}

fn min_max(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}
