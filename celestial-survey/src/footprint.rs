//! Sparse fractional-coverage footprint maps.
//!
//! A [`FootprintMap`] lists the pixels of one [`PixelGrid`] that a survey
//! observed, each with the fraction of the pixel it covers. Pixels are kept
//! sorted and unique; the map is immutable once built.
//!
//! Area bookkeeping is always `Σ fraction × pixel_area`, so degrading to a
//! coarser grid and upgrading back conserves the effective area.

use crate::config::FootprintConfig;
use crate::error::{Result, SurveyError};
use crate::grid::PixelGrid;
use crate::table::{Column, Table, TableStore};
use std::collections::BTreeMap;
use tracing::debug;

/// Default name of the fraction column written by [`FootprintMap::to_table`].
pub const DEFAULT_FRAC_KEY: &str = "frac";

#[derive(Debug, Clone, PartialEq)]
pub struct FootprintMap {
    grid: PixelGrid,
    pixels: Vec<u64>,
    fractions: Vec<f64>,
}

/// Coverage of a footprint inside an annulus.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnulusCoverage {
    /// Annulus pixels present in the footprint, ascending.
    pub pixels: Vec<u64>,
    /// Covered fraction of each entry in `pixels`.
    pub fractions: Vec<f64>,
    /// `Σ fraction × pixel_area` over `pixels`.
    pub area_deg2: f64,
    /// `Σ fraction` divided by the number of pixels in the annulus, or 0 when
    /// the annulus holds no pixel.
    pub coverfrac: f64,
    /// Number of grid pixels in the annulus, observed or not.
    pub annulus_pixels: usize,
}

impl FootprintMap {
    /// Build a map from unsorted pixel ids and their fractions.
    ///
    /// # Errors
    /// `DataIntegrity` when the inputs differ in length, a pixel id repeats or
    /// lies outside `grid`, or a fraction is not a finite value in `[0, 1]`.
    pub fn new(grid: PixelGrid, pixels: Vec<u64>, fractions: Vec<f64>) -> Result<Self> {
        if pixels.len() != fractions.len() {
            return Err(SurveyError::integrity(format!(
                "{} pixels but {} fractions",
                pixels.len(),
                fractions.len()
            )));
        }
        if let Some(&bad) = pixels.iter().find(|&&p| p >= grid.npix()) {
            return Err(SurveyError::integrity(format!(
                "pixel {bad} outside grid {grid}"
            )));
        }
        if let Some(&bad) = fractions
            .iter()
            .find(|f| !f.is_finite() || !(0.0..=1.0).contains(*f))
        {
            return Err(SurveyError::integrity(format!(
                "covered fraction {bad} outside [0, 1]"
            )));
        }

        let mut order: Vec<usize> = (0..pixels.len()).collect();
        order.sort_unstable_by_key(|&i| pixels[i]);
        let pixels: Vec<u64> = order.iter().map(|&i| pixels[i]).collect();
        let fractions: Vec<f64> = order.iter().map(|&i| fractions[i]).collect();
        if let Some(w) = pixels.windows(2).find(|w| w[0] == w[1]) {
            return Err(SurveyError::integrity(format!(
                "duplicate pixel {} in footprint",
                w[0]
            )));
        }

        Ok(Self {
            grid,
            pixels,
            fractions,
        })
    }

    /// Every pixel fully covered.
    pub fn full(grid: PixelGrid, pixels: Vec<u64>) -> Result<Self> {
        let fractions = vec![1.0; pixels.len()];
        Self::new(grid, pixels, fractions)
    }

    /// Read a map from table columns. Without `key_frac` every pixel counts as
    /// fully covered.
    pub fn from_table(
        table: &Table,
        grid: PixelGrid,
        key_pixel: &str,
        key_frac: Option<&str>,
    ) -> Result<Self> {
        let pixels = table.pixel_ids(key_pixel)?;
        let fractions = match key_frac {
            Some(key) => table.numeric_as_f64(key)?,
            None => vec![1.0; pixels.len()],
        };
        Self::new(grid, pixels, fractions)
    }

    /// Load the footprint described by `config`.
    pub fn load<S: TableStore>(store: &S, config: &FootprintConfig) -> Result<Self> {
        let table = store.read_table(&config.path)?;
        let map = Self::from_table(
            &table,
            config.grid.build()?,
            &config.key_pixel,
            config.key_frac.as_deref(),
        )?;
        debug!(
            path = %config.path.display(),
            pixels = map.len(),
            area_deg2 = map.total_area_deg2(),
            "loaded footprint"
        );
        Ok(map)
    }

    pub fn to_table(&self, key_pixel: &str, key_frac: &str) -> Result<Table> {
        Table::new()
            .with_column(
                key_pixel,
                Column::Int(self.pixels.iter().map(|&p| p as i64).collect()),
            )?
            .with_column(key_frac, Column::Float(self.fractions.clone()))
    }

    pub fn grid(&self) -> &PixelGrid {
        &self.grid
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn pixels(&self) -> &[u64] {
        &self.pixels
    }

    pub fn fractions(&self) -> &[f64] {
        &self.fractions
    }

    /// `(pixel, fraction)` pairs in ascending pixel order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, f64)> + '_ {
        self.pixels.iter().copied().zip(self.fractions.iter().copied())
    }

    pub fn fraction_of(&self, pixel: u64) -> Option<f64> {
        self.pixels
            .binary_search(&pixel)
            .ok()
            .map(|i| self.fractions[i])
    }

    pub fn contains(&self, pixel: u64) -> bool {
        self.pixels.binary_search(&pixel).is_ok()
    }

    pub fn total_area_deg2(&self) -> f64 {
        self.fractions.iter().sum::<f64>() * self.grid.pixel_area_deg2()
    }

    /// Group fine pixels by coarse parent. Each coarse fraction is the mean of
    /// its `(nside_fine / nside_coarse)²` children, unobserved children
    /// counting as zero.
    pub fn build_from_degrade(
        fine_pixels: Vec<u64>,
        fine_fractions: Vec<f64>,
        fine_grid: PixelGrid,
        coarse_grid: PixelGrid,
    ) -> Result<Self> {
        Self::new(fine_grid, fine_pixels, fine_fractions)?.degrade(&coarse_grid)
    }

    /// This map on a coarser grid, conserving area.
    pub fn degrade(&self, coarse: &PixelGrid) -> Result<Self> {
        if coarse.nside() > self.grid.nside() {
            return Err(SurveyError::configuration(format!(
                "cannot degrade footprint on {} to finer grid {coarse}",
                self.grid
            )));
        }
        let ratio = self.grid.nside() / coarse.nside();
        let nsamp = (ratio * ratio) as f64;

        let mut sums: BTreeMap<u64, f64> = BTreeMap::new();
        for (pixel, fraction) in self.iter() {
            *sums.entry(self.grid.parent(pixel, coarse)?).or_insert(0.0) += fraction;
        }
        let (pixels, fractions): (Vec<u64>, Vec<f64>) = sums
            .into_iter()
            .map(|(p, sum)| (p, (sum / nsamp).min(1.0)))
            .unzip();

        debug!(
            from = %self.grid,
            to = %coarse,
            fine_pixels = self.len(),
            coarse_pixels = pixels.len(),
            "degraded footprint"
        );
        Ok(Self {
            grid: *coarse,
            pixels,
            fractions,
        })
    }

    /// This map on a finer grid: every pixel is replaced by its exact
    /// descendants, each carrying the parent's fraction.
    pub fn upgrade(&self, fine: &PixelGrid) -> Result<Self> {
        if fine.nside() < self.grid.nside() {
            return Err(SurveyError::configuration(format!(
                "cannot upgrade footprint on {} to coarser grid {fine}",
                self.grid
            )));
        }

        let mut level_grid = self.grid;
        let mut pixels = self.pixels.clone();
        let mut fractions = self.fractions.clone();
        while level_grid.nside() < fine.nside() {
            let mut next_pixels = Vec::with_capacity(pixels.len() * 4);
            let mut next_fractions = Vec::with_capacity(pixels.len() * 4);
            for (&pixel, &fraction) in pixels.iter().zip(&fractions) {
                next_pixels.extend(level_grid.children(pixel)?);
                next_fractions.extend([fraction; 4]);
            }
            level_grid = level_grid.refined()?;
            pixels = next_pixels;
            fractions = next_fractions;
        }

        if level_grid.scheme() != fine.scheme() {
            let same_level = level_grid;
            pixels = pixels
                .into_iter()
                .map(|p| same_level.parent(p, fine))
                .collect::<Result<_>>()?;
        }
        Self::new(*fine, pixels, fractions)
    }

    /// Pixels in the annulus `r_in < r ≤ r_out` around `(ra, dec)`, restricted
    /// to this map.
    ///
    /// The annulus is the outer disc minus the inner disc, both computed with
    /// the same `inclusive` convention, so no pixel of the inner disc is ever
    /// part of the result. `r_in ≤ 0` degenerates to a plain disc.
    pub fn coverage_in_annulus(
        &self,
        ra_deg: f64,
        dec_deg: f64,
        r_in_deg: f64,
        r_out_deg: f64,
        inclusive: bool,
    ) -> AnnulusCoverage {
        let outer = self.grid.disc_pixels(ra_deg, dec_deg, r_out_deg, inclusive);
        let annulus: Vec<u64> = if r_in_deg > 0.0 {
            let inner = self.grid.disc_pixels(ra_deg, dec_deg, r_in_deg, inclusive);
            outer
                .into_iter()
                .filter(|p| inner.binary_search(p).is_err())
                .collect()
        } else {
            outer
        };

        let mut pixels = Vec::new();
        let mut fractions = Vec::new();
        for &p in &annulus {
            if let Some(f) = self.fraction_of(p) {
                pixels.push(p);
                fractions.push(f);
            }
        }
        let sum: f64 = fractions.iter().sum();
        let coverfrac = if annulus.is_empty() {
            0.0
        } else {
            sum / annulus.len() as f64
        };

        AnnulusCoverage {
            pixels,
            fractions,
            area_deg2: sum * self.grid.pixel_area_deg2(),
            coverfrac,
            annulus_pixels: annulus.len(),
        }
    }

    /// Share of the pixels of an inclusive disc that appear in the map,
    /// ignoring their fractions. 0 when the disc holds no pixel.
    pub fn disc_coverage_fraction(&self, ra_deg: f64, dec_deg: f64, radius_deg: f64) -> f64 {
        let disc = self.grid.disc_pixels(ra_deg, dec_deg, radius_deg, true);
        if disc.is_empty() {
            return 0.0;
        }
        let present = disc.iter().filter(|&&p| self.contains(p)).count();
        present as f64 / disc.len() as f64
    }

    /// Effective area of the map pixels whose centres fall inside the disc.
    pub fn disc_effective_area_deg2(&self, ra_deg: f64, dec_deg: f64, radius_deg: f64) -> f64 {
        self.coverage_in_annulus(ra_deg, dec_deg, 0.0, radius_deg, false)
            .area_deg2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ColumnarFile;
    use tempfile::TempDir;

    /// Fine footprint with varied fractions over a patch of sky.
    fn patch(grid: PixelGrid) -> FootprintMap {
        let pixels = grid.disc_pixels(40.0, -20.0, 6.0, false);
        let fractions = pixels
            .iter()
            .map(|&p| ((p % 7) as f64 + 1.0) / 8.0)
            .collect();
        FootprintMap::new(grid, pixels, fractions).unwrap()
    }

    #[test]
    fn test_new_sorts_and_validates() {
        let grid = PixelGrid::nest(4).unwrap();
        let map = FootprintMap::new(grid, vec![9, 2, 5], vec![0.1, 0.2, 0.3]).unwrap();
        assert_eq!(map.pixels(), &[2, 5, 9]);
        assert_eq!(map.fractions(), &[0.2, 0.3, 0.1]);
        assert_eq!(map.fraction_of(9), Some(0.1));
        assert_eq!(map.fraction_of(3), None);
    }

    #[test]
    fn test_new_rejects_duplicates_and_bad_fractions() {
        let grid = PixelGrid::nest(4).unwrap();
        assert!(matches!(
            FootprintMap::new(grid, vec![1, 1], vec![0.5, 0.5]),
            Err(SurveyError::DataIntegrity(_))
        ));
        assert!(FootprintMap::new(grid, vec![1], vec![1.5]).is_err());
        assert!(FootprintMap::new(grid, vec![1], vec![f64::NAN]).is_err());
        assert!(FootprintMap::new(grid, vec![192], vec![1.0]).is_err());
        assert!(FootprintMap::new(grid, vec![1, 2], vec![1.0]).is_err());
    }

    #[test]
    fn test_total_area_is_weighted_pixel_area() {
        let map = patch(PixelGrid::nest(64).unwrap());
        let expected: f64 = map
            .fractions()
            .iter()
            .map(|f| f * map.grid().pixel_area_deg2())
            .sum();
        assert!((map.total_area_deg2() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_annulus_area_matches_weighted_sum() {
        let map = patch(PixelGrid::nest(64).unwrap());
        let cov = map.coverage_in_annulus(40.0, -20.0, 1.0, 3.0, true);
        let expected: f64 = cov.fractions.iter().sum::<f64>() * map.grid().pixel_area_deg2();
        assert!((cov.area_deg2 - expected).abs() < 1e-12);
        assert!(cov.coverfrac > 0.0 && cov.coverfrac <= 1.0);
    }

    #[test]
    fn test_annulus_with_zero_inner_radius_equals_disc() {
        let map = patch(PixelGrid::ring(32).unwrap());
        for inclusive in [false, true] {
            let cov = map.coverage_in_annulus(41.0, -19.0, 0.0, 2.5, inclusive);
            let disc = map.grid().disc_pixels(41.0, -19.0, 2.5, inclusive);
            let expected: Vec<u64> = disc.iter().copied().filter(|&p| map.contains(p)).collect();
            assert_eq!(cov.pixels, expected);
            assert_eq!(cov.annulus_pixels, disc.len());
        }
    }

    #[test]
    fn test_annulus_excludes_inner_disc() {
        let map = patch(PixelGrid::nest(64).unwrap());
        let inner = map.grid().disc_pixels(40.0, -20.0, 1.0, true);
        let cov = map.coverage_in_annulus(40.0, -20.0, 1.0, 3.0, true);
        assert!(cov.pixels.iter().all(|p| inner.binary_search(p).is_err()));
    }

    #[test]
    fn test_annulus_outside_map_is_empty() {
        let map = patch(PixelGrid::nest(64).unwrap());
        let cov = map.coverage_in_annulus(220.0, 50.0, 0.0, 1.0, false);
        assert!(cov.pixels.is_empty());
        assert_eq!(cov.area_deg2, 0.0);
        assert_eq!(cov.coverfrac, 0.0);
    }

    #[test]
    fn test_degrade_uses_mean_over_all_children() {
        let fine = PixelGrid::nest(8).unwrap();
        let coarse = PixelGrid::nest(4).unwrap();
        // Two of the four children of coarse pixel 3, at 1.0 and 0.5.
        let map = FootprintMap::build_from_degrade(vec![12, 13], vec![1.0, 0.5], fine, coarse)
            .unwrap();
        assert_eq!(map.pixels(), &[3]);
        assert!((map.fractions()[0] - 0.375).abs() < 1e-12);
    }

    #[test]
    fn test_degrade_conserves_area() {
        let fine = patch(PixelGrid::nest(64).unwrap());
        let coarse = fine.degrade(&PixelGrid::nest(16).unwrap()).unwrap();
        assert!((coarse.total_area_deg2() - fine.total_area_deg2()).abs() < 1e-6);
    }

    #[test]
    fn test_degrade_then_upgrade_never_increases_area() {
        for grid in [PixelGrid::nest(64).unwrap(), PixelGrid::ring(64).unwrap()] {
            let map = patch(grid);
            let half = grid.with_nside(32).unwrap();
            let round_trip = map.degrade(&half).unwrap().upgrade(&grid).unwrap();
            assert!(
                round_trip.total_area_deg2() <= map.total_area_deg2() + 1e-9,
                "{grid}: {} > {}",
                round_trip.total_area_deg2(),
                map.total_area_deg2()
            );
            assert!(round_trip.len() >= map.len());
        }
    }

    #[test]
    fn test_degrade_to_finer_grid_rejected() {
        let map = patch(PixelGrid::nest(16).unwrap());
        assert!(matches!(
            map.degrade(&PixelGrid::nest(32).unwrap()),
            Err(SurveyError::Configuration(_))
        ));
    }

    #[test]
    fn test_disc_coverage_fraction() {
        let grid = PixelGrid::nest(32).unwrap();
        let disc = grid.disc_pixels(100.0, 0.0, 3.0, true);
        let half: Vec<u64> = disc.iter().copied().step_by(2).collect();
        let map = FootprintMap::full(grid, half.clone()).unwrap();
        let frac = map.disc_coverage_fraction(100.0, 0.0, 3.0);
        assert!((frac - half.len() as f64 / disc.len() as f64).abs() < 1e-12);

        let empty = FootprintMap::full(grid, Vec::new()).unwrap();
        assert_eq!(empty.disc_coverage_fraction(100.0, 0.0, 3.0), 0.0);
    }

    #[test]
    fn test_table_roundtrip_through_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("footprint.ctab");
        let map = patch(PixelGrid::nest(32).unwrap());
        let table = map.to_table("pixel", "signal").unwrap();
        ColumnarFile.write_table(&table, &path, false).unwrap();

        let config = FootprintConfig {
            path,
            grid: (*map.grid()).into(),
            key_pixel: "pixel".into(),
            key_frac: Some("signal".into()),
            mosaic: None,
        };
        let loaded = FootprintMap::load(&ColumnarFile, &config).unwrap();
        assert_eq!(loaded, map);

        let unweighted = FootprintMap::from_table(&table, *map.grid(), "pixel", None).unwrap();
        assert!(unweighted.fractions().iter().all(|&f| f == 1.0));
    }
}
