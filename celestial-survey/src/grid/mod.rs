//! Pixel grid over the HEALPix equal-area pixelization.
//!
//! A [`PixelGrid`] is a `(nside, scheme)` pair. It is the only way the rest of
//! the crate converts between sky positions and pixel ids, so every module
//! shares one convention for orderings, disc queries and hierarchy.
//!
//! All angles at this API are in degrees. RA is normalised into `[0, 360)`
//! before any lookup, so `ra` and `ra + 360` always resolve to the same pixels.

pub(crate) mod healpix;
pub mod sphere;

use crate::error::{Result, SurveyError};
use healpix::FaceXy;
use std::collections::BTreeMap;
use std::f64::consts::{PI, TAU};
use std::fmt;

const RAD_TO_DEG: f64 = 180.0 / PI;
const DEG_TO_RAD: f64 = PI / 180.0;

/// Full-sky solid angle in square degrees.
pub const FULL_SKY_DEG2: f64 = 4.0 * PI * RAD_TO_DEG * RAD_TO_DEG;

/// Padding applied to the maximum pixel radius when building inclusive discs.
const INCLUSIVE_PAD: f64 = 1.01;

/// Pixel numbering scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// Hierarchical: the four children of pixel `p` are `4p..4p+4`.
    Nest,
    /// Iso-latitude rings, numbered from the north pole.
    Ring,
}

impl Scheme {
    pub fn from_nest_flag(nest: bool) -> Self {
        if nest {
            Scheme::Nest
        } else {
            Scheme::Ring
        }
    }

    pub fn is_nest(self) -> bool {
        self == Scheme::Nest
    }
}

/// A HEALPix grid at one resolution and ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelGrid {
    order: u32,
    scheme: Scheme,
}

impl fmt::Display for PixelGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.scheme {
            Scheme::Nest => "NEST",
            Scheme::Ring => "RING",
        };
        write!(f, "nside={} {}", self.nside(), scheme)
    }
}

impl PixelGrid {
    /// Create a grid. `nside` must be a power of two no larger than `2^29`.
    pub fn new(nside: u64, scheme: Scheme) -> Result<Self> {
        if nside == 0 || !nside.is_power_of_two() {
            return Err(SurveyError::configuration(format!(
                "nside must be a positive power of two, got {nside}"
            )));
        }
        let order = nside.trailing_zeros();
        if order > healpix::MAX_ORDER {
            return Err(SurveyError::configuration(format!(
                "nside {nside} exceeds the maximum 2^{}",
                healpix::MAX_ORDER
            )));
        }
        Ok(Self { order, scheme })
    }

    pub fn nest(nside: u64) -> Result<Self> {
        Self::new(nside, Scheme::Nest)
    }

    pub fn ring(nside: u64) -> Result<Self> {
        Self::new(nside, Scheme::Ring)
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    pub fn nside(&self) -> u64 {
        1u64 << self.order
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn is_nest(&self) -> bool {
        self.scheme.is_nest()
    }

    pub fn npix(&self) -> u64 {
        healpix::npix(self.order)
    }

    /// Same scheme at another resolution.
    pub fn with_nside(&self, nside: u64) -> Result<Self> {
        Self::new(nside, self.scheme)
    }

    pub fn pixel_area_deg2(&self) -> f64 {
        FULL_SKY_DEG2 / self.npix() as f64
    }

    /// Side of a square with the pixel's area.
    pub fn pixel_size_deg(&self) -> f64 {
        self.pixel_area_deg2().sqrt()
    }

    /// Largest distance between any pixel centre and one of its corners.
    pub fn max_pixel_radius_deg(&self) -> f64 {
        healpix::max_pixrad(self.order) * RAD_TO_DEG
    }

    fn to_xyf(&self, pixel: u64) -> Result<FaceXy> {
        if pixel >= self.npix() {
            return Err(SurveyError::integrity(format!(
                "pixel {pixel} outside grid {self} (npix {})",
                self.npix()
            )));
        }
        Ok(match self.scheme {
            Scheme::Nest => healpix::nest_to_xyf(pixel, self.order),
            Scheme::Ring => healpix::ring_to_xyf(pixel, self.order),
        })
    }

    fn from_xyf(&self, xyf: FaceXy) -> u64 {
        match self.scheme {
            Scheme::Nest => healpix::xyf_to_nest(xyf, self.order),
            Scheme::Ring => healpix::xyf_to_ring(xyf, self.order),
        }
    }

    fn locate(&self, z: f64, sth: f64, phi: f64) -> u64 {
        self.from_xyf(healpix::loc_to_xyf(z, sth, phi, self.order))
    }

    // -----------------------------------------------------------------------
    // Positions
    // -----------------------------------------------------------------------

    /// Pixel containing `(ra, dec)`.
    pub fn ang2pix(&self, ra_deg: f64, dec_deg: f64) -> u64 {
        let dec = dec_deg.clamp(-90.0, 90.0) * DEG_TO_RAD;
        let (z, sth) = libm::sincos(dec);
        let phi = ra_deg.rem_euclid(360.0) * DEG_TO_RAD;
        self.locate(z, sth.max(0.0), phi)
    }

    /// Centre of `pixel` as `(ra, dec)` in degrees.
    pub fn pix2ang(&self, pixel: u64) -> Result<(f64, f64)> {
        let (z, sth, phi) = healpix::xyf_centre(self.to_xyf(pixel)?, self.order);
        Ok(loc_to_radec(z, sth, phi))
    }

    pub fn angles_to_pixels(&self, ra_deg: &[f64], dec_deg: &[f64]) -> Result<Vec<u64>> {
        check_lengths("ra", ra_deg.len(), "dec", dec_deg.len())?;
        Ok(ra_deg
            .iter()
            .zip(dec_deg)
            .map(|(&ra, &dec)| self.ang2pix(ra, dec))
            .collect())
    }

    pub fn pixels_to_angles(&self, pixels: &[u64]) -> Result<(Vec<f64>, Vec<f64>)> {
        let mut ra = Vec::with_capacity(pixels.len());
        let mut dec = Vec::with_capacity(pixels.len());
        for &pixel in pixels {
            let (r, d) = self.pix2ang(pixel)?;
            ra.push(r);
            dec.push(d);
        }
        Ok((ra, dec))
    }

    /// Corner vertices of `pixel` as `(ra, dec)`, in N, W, S, E order.
    pub fn corners(&self, pixel: u64) -> Result<[(f64, f64); 4]> {
        let corners = healpix::xyf_corners(self.to_xyf(pixel)?, self.order);
        Ok(corners.map(|(z, sth, phi)| loc_to_radec(z, sth, phi)))
    }

    // -----------------------------------------------------------------------
    // Disc queries
    // -----------------------------------------------------------------------

    /// Sorted, unique pixels of a disc.
    ///
    /// With `inclusive = false` a pixel is returned when its centre lies
    /// within `radius_deg` of the disc centre. With `inclusive = true` the
    /// result is a conservative superset holding every pixel that overlaps
    /// the disc: centres within `radius_deg` plus the maximum pixel radius.
    pub fn disc_pixels(&self, ra_deg: f64, dec_deg: f64, radius_deg: f64, inclusive: bool) -> Vec<u64> {
        if radius_deg < 0.0 {
            return Vec::new();
        }
        let theta0 = (90.0 - dec_deg.clamp(-90.0, 90.0)) * DEG_TO_RAD;
        let phi0 = (ra_deg.rem_euclid(360.0) * DEG_TO_RAD).rem_euclid(TAU);
        let mut radius = radius_deg * DEG_TO_RAD;
        if inclusive {
            radius += INCLUSIVE_PAD * healpix::max_pixrad(self.order);
        }

        let ring_ids = healpix::query_disc_ring(self.order, theta0, phi0, radius);
        let mut pixels: Vec<u64> = match self.scheme {
            Scheme::Ring => ring_ids,
            Scheme::Nest => ring_ids
                .into_iter()
                .map(|p| healpix::xyf_to_nest(healpix::ring_to_xyf(p, self.order), self.order))
                .collect(),
        };
        pixels.sort_unstable();
        pixels.dedup();
        pixels
    }

    // -----------------------------------------------------------------------
    // Hierarchy
    // -----------------------------------------------------------------------

    fn check_coarser(&self, target: &PixelGrid) -> Result<u32> {
        if target.order > self.order {
            return Err(SurveyError::configuration(format!(
                "cannot degrade {self} to finer grid {target}"
            )));
        }
        Ok(self.order - target.order)
    }

    /// Parent of `pixel` on a coarser (or equal) grid.
    pub fn parent(&self, pixel: u64, target: &PixelGrid) -> Result<u64> {
        let shift = self.check_coarser(target)?;
        let xyf = self.to_xyf(pixel)?;
        Ok(target.from_xyf(FaceXy {
            face: xyf.face,
            ix: xyf.ix >> shift,
            iy: xyf.iy >> shift,
        }))
    }

    /// Map fine pixels onto `target`, returning the distinct coarse pixels in
    /// ascending order and the number of input pixels landing in each.
    pub fn degrade(&self, pixels: &[u64], target: &PixelGrid) -> Result<(Vec<u64>, Vec<u64>)> {
        self.check_coarser(target)?;
        let mut counts: BTreeMap<u64, u64> = BTreeMap::new();
        for &pixel in pixels {
            *counts.entry(self.parent(pixel, target)?).or_insert(0) += 1;
        }
        Ok(counts.into_iter().unzip())
    }

    /// Grid at twice this resolution, same scheme.
    pub fn refined(&self) -> Result<PixelGrid> {
        if self.order >= healpix::MAX_ORDER {
            return Err(SurveyError::configuration(format!(
                "cannot refine {self} beyond order {}",
                healpix::MAX_ORDER
            )));
        }
        Ok(PixelGrid {
            order: self.order + 1,
            scheme: self.scheme,
        })
    }

    /// The four pixels of [`refined`](Self::refined) covering `pixel` exactly.
    pub fn children(&self, pixel: u64) -> Result<[u64; 4]> {
        let fine = self.refined()?;
        let xyf = self.to_xyf(pixel)?;
        Ok([(0, 0), (1, 0), (0, 1), (1, 1)].map(|(dx, dy)| {
            fine.from_xyf(FaceXy {
                face: xyf.face,
                ix: 2 * xyf.ix + dx,
                iy: 2 * xyf.iy + dy,
            })
        }))
    }

    /// Pixels at twice the resolution found at the midpoints between the
    /// centre of `pixel` and each of its corners.
    ///
    /// This is an approximation of the children and may repeat ids.
    pub fn refine_boundary_midpoints(&self, pixel: u64) -> Result<[u64; 4]> {
        let fine = self.refined()?;
        let xyf = self.to_xyf(pixel)?;
        let centre = healpix::xyf_centre(xyf, self.order);
        let corners = healpix::xyf_corners(xyf, self.order);
        Ok(corners.map(|corner| {
            let (z, sth, phi) = midpoint(centre, corner);
            fine.locate(z, sth, phi)
        }))
    }

    /// Batch form of [`refine_boundary_midpoints`](Self::refine_boundary_midpoints),
    /// four entries per input pixel.
    pub fn sub_pixels(&self, pixels: &[u64]) -> Result<Vec<u64>> {
        let mut out = Vec::with_capacity(pixels.len() * 4);
        for &pixel in pixels {
            out.extend(self.refine_boundary_midpoints(pixel)?);
        }
        Ok(out)
    }

    /// Sparse histogram of positions: occupied pixels in ascending order and
    /// the count (or summed weight) in each.
    pub fn pixel_counts(
        &self,
        ra_deg: &[f64],
        dec_deg: &[f64],
        weights: Option<&[f64]>,
    ) -> Result<(Vec<u64>, Vec<f64>)> {
        let pixels = self.angles_to_pixels(ra_deg, dec_deg)?;
        if let Some(w) = weights {
            check_lengths("ra", ra_deg.len(), "weights", w.len())?;
        }
        let mut counts: BTreeMap<u64, f64> = BTreeMap::new();
        for (i, pixel) in pixels.into_iter().enumerate() {
            *counts.entry(pixel).or_insert(0.0) += weights.map_or(1.0, |w| w[i]);
        }
        Ok(counts.into_iter().unzip())
    }
}

fn check_lengths(a: &str, len_a: usize, b: &str, len_b: usize) -> Result<()> {
    if len_a != len_b {
        return Err(SurveyError::integrity(format!(
            "{a} has {len_a} entries but {b} has {len_b}"
        )));
    }
    Ok(())
}

fn loc_to_radec(z: f64, sth: f64, phi: f64) -> (f64, f64) {
    let dec = libm::atan2(z, sth) * RAD_TO_DEG;
    let ra = (phi * RAD_TO_DEG).rem_euclid(360.0);
    (ra, dec)
}

/// Great-circle midpoint of two `(z, sin(theta), phi)` locations.
fn midpoint(a: (f64, f64, f64), b: (f64, f64, f64)) -> (f64, f64, f64) {
    let va = [a.1 * a.2.cos(), a.1 * a.2.sin(), a.0];
    let vb = [b.1 * b.2.cos(), b.1 * b.2.sin(), b.0];
    let v = [va[0] + vb[0], va[1] + vb[1], va[2] + vb[2]];
    let norm = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    let xy = (v[0] * v[0] + v[1] * v[1]).sqrt();
    (v[2] / norm, xy / norm, libm::atan2(v[1], v[0]).rem_euclid(TAU))
}

#[cfg(test)]
mod tests {
    use super::sphere::angular_distance_deg;
    use super::*;

    #[test]
    fn test_new_rejects_bad_nside() {
        assert!(PixelGrid::nest(0).is_err());
        assert!(PixelGrid::nest(3).is_err());
        assert!(PixelGrid::nest(1 << 30).is_err());
        assert!(matches!(
            PixelGrid::ring(48),
            Err(SurveyError::Configuration(_))
        ));
        assert_eq!(PixelGrid::nest(64).unwrap().order(), 6);
    }

    #[test]
    fn test_pixel_area_sums_to_full_sky() {
        let grid = PixelGrid::nest(16).unwrap();
        let total = grid.pixel_area_deg2() * grid.npix() as f64;
        assert!((total - FULL_SKY_DEG2).abs() < 1e-6);
        assert!((FULL_SKY_DEG2 - 41252.96).abs() < 0.01);
    }

    #[test]
    fn test_pix2ang_ang2pix_roundtrip_both_schemes() {
        for grid in [PixelGrid::nest(8).unwrap(), PixelGrid::ring(8).unwrap()] {
            for pixel in 0..grid.npix() {
                let (ra, dec) = grid.pix2ang(pixel).unwrap();
                assert!((0.0..360.0).contains(&ra));
                assert!((-90.0..=90.0).contains(&dec));
                assert_eq!(grid.ang2pix(ra, dec), pixel, "{grid} pixel {pixel}");
            }
        }
    }

    #[test]
    fn test_pixels_to_angles_rejects_out_of_range() {
        let grid = PixelGrid::nest(2).unwrap();
        assert!(matches!(
            grid.pixels_to_angles(&[0, 48]),
            Err(SurveyError::DataIntegrity(_))
        ));
    }

    #[test]
    fn test_angles_to_pixels_length_mismatch() {
        let grid = PixelGrid::nest(2).unwrap();
        assert!(grid.angles_to_pixels(&[1.0, 2.0], &[0.0]).is_err());
    }

    #[test]
    fn test_nest_and_ring_agree_on_position() {
        let nest = PixelGrid::nest(32).unwrap();
        let ring = PixelGrid::ring(32).unwrap();
        for (ra, dec) in [(10.0, 20.0), (200.0, -45.0), (359.9, 89.5), (0.0, -89.9)] {
            let (ra_n, dec_n) = nest.pix2ang(nest.ang2pix(ra, dec)).unwrap();
            let (ra_r, dec_r) = ring.pix2ang(ring.ang2pix(ra, dec)).unwrap();
            assert!((ra_n - ra_r).abs() < 1e-9 && (dec_n - dec_r).abs() < 1e-9);
        }
    }

    #[test]
    fn test_disc_pixels_sorted_and_centres_inside() {
        let grid = PixelGrid::nest(64).unwrap();
        let pixels = grid.disc_pixels(150.0, 2.2, 1.5, false);
        assert!(!pixels.is_empty());
        assert!(pixels.windows(2).all(|w| w[0] < w[1]));
        for &p in &pixels {
            let (ra, dec) = grid.pix2ang(p).unwrap();
            assert!(angular_distance_deg(ra, dec, 150.0, 2.2) <= 1.5 + 1e-9);
        }
    }

    #[test]
    fn test_disc_pixels_non_inclusive_matches_brute_force() {
        for grid in [PixelGrid::nest(16).unwrap(), PixelGrid::ring(16).unwrap()] {
            let (ra0, dec0, r) = (45.0, 60.0, 7.0);
            let disc = grid.disc_pixels(ra0, dec0, r, false);
            let brute: Vec<u64> = (0..grid.npix())
                .filter(|&p| {
                    let (ra, dec) = grid.pix2ang(p).unwrap();
                    angular_distance_deg(ra, dec, ra0, dec0) < r
                })
                .collect();
            assert_eq!(disc, brute, "{grid}");
        }
    }

    #[test]
    fn test_inclusive_disc_contains_every_overlapping_pixel() {
        let grid = PixelGrid::nest(32).unwrap();
        let (ra0, dec0, r) = (300.0, -30.0, 2.0);
        let inclusive = grid.disc_pixels(ra0, dec0, r, true);
        let strict = grid.disc_pixels(ra0, dec0, r, false);
        assert!(strict.iter().all(|p| inclusive.binary_search(p).is_ok()));

        // Any pixel with a corner inside the disc overlaps it.
        for p in 0..grid.npix() {
            let touches = grid
                .corners(p)
                .unwrap()
                .iter()
                .any(|&(ra, dec)| angular_distance_deg(ra, dec, ra0, dec0) < r);
            if touches {
                assert!(inclusive.binary_search(&p).is_ok(), "missing pixel {p}");
            }
        }
    }

    #[test]
    fn test_disc_ra_zero_and_360_identical() {
        let grid = PixelGrid::nest(64).unwrap();
        for inclusive in [false, true] {
            let a = grid.disc_pixels(0.0, 10.0, 2.0, inclusive);
            let b = grid.disc_pixels(360.0, 10.0, 2.0, inclusive);
            assert_eq!(a, b);
            assert!(!a.is_empty());
        }
    }

    #[test]
    fn test_degrade_counts_full_children() {
        let fine = PixelGrid::nest(16).unwrap();
        let coarse = PixelGrid::nest(4).unwrap();
        let all: Vec<u64> = (0..fine.npix()).collect();
        let (ids, counts) = fine.degrade(&all, &coarse).unwrap();
        assert_eq!(ids, (0..coarse.npix()).collect::<Vec<_>>());
        assert!(counts.iter().all(|&c| c == 16));
    }

    #[test]
    fn test_degrade_ring_matches_centre_reprojection() {
        let fine = PixelGrid::ring(32).unwrap();
        let coarse = PixelGrid::ring(8).unwrap();
        for p in (0..fine.npix()).step_by(7) {
            let (ra, dec) = fine.pix2ang(p).unwrap();
            assert_eq!(fine.parent(p, &coarse).unwrap(), coarse.ang2pix(ra, dec));
        }
    }

    #[test]
    fn test_degrade_output_sorted() {
        let fine = PixelGrid::ring(8).unwrap();
        let coarse = PixelGrid::nest(2).unwrap();
        let (ids, counts) = fine.degrade(&[700, 3, 450, 3, 12], &coarse).unwrap();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(counts.iter().sum::<u64>(), 5);
    }

    #[test]
    fn test_degrade_to_finer_grid_is_configuration_error() {
        let coarse = PixelGrid::nest(4).unwrap();
        let fine = PixelGrid::nest(8).unwrap();
        assert!(matches!(
            coarse.degrade(&[0], &fine),
            Err(SurveyError::Configuration(_))
        ));
    }

    #[test]
    fn test_children_degrade_back_to_parent() {
        for grid in [PixelGrid::nest(4).unwrap(), PixelGrid::ring(4).unwrap()] {
            let fine = grid.refined().unwrap();
            for p in 0..grid.npix() {
                let children = grid.children(p).unwrap();
                for c in children {
                    assert_eq!(fine.parent(c, &grid).unwrap(), p);
                }
            }
        }
        let nest = PixelGrid::nest(4).unwrap();
        assert_eq!(nest.children(5).unwrap(), [20, 21, 22, 23]);
    }

    #[test]
    fn test_refine_boundary_midpoints_stay_inside_parent() {
        let grid = PixelGrid::nest(8).unwrap();
        let fine = grid.refined().unwrap();
        for p in (0..grid.npix()).step_by(5) {
            for sub in grid.refine_boundary_midpoints(p).unwrap() {
                assert_eq!(fine.parent(sub, &grid).unwrap(), p);
            }
        }
        assert_eq!(grid.sub_pixels(&[0, 1]).unwrap().len(), 8);
    }

    #[test]
    fn test_pixel_counts_sparse() {
        let grid = PixelGrid::nest(4).unwrap();
        let ra = [10.0, 10.01, 200.0];
        let dec = [5.0, 5.01, -40.0];
        let (pixels, counts) = grid.pixel_counts(&ra, &dec, None).unwrap();
        assert_eq!(pixels.len(), 2);
        assert_eq!(counts.iter().sum::<f64>(), 3.0);

        let (_, weighted) = grid
            .pixel_counts(&ra, &dec, Some(&[0.5, 0.5, 2.0]))
            .unwrap();
        assert_eq!(weighted.iter().sum::<f64>(), 3.0);
    }
}
