//! Shard selection: load mosaic shards and keep the rows a region needs.

use super::Positions;
use crate::error::Result;
use crate::grid::sphere::SkyPoint;
use crate::mosaic::ShardLocator;
use crate::table::{Table, TableStore};
use tracing::debug;

/// Rows of `shards` strictly closer than `radius_deg` to `(ra, dec)`,
/// concatenated in shard order. `None` when there is no shard to read.
///
/// A missing shard file propagates as an `Io` error.
pub fn select_in_disc<S: TableStore>(
    store: &S,
    shards: &[ShardLocator],
    radius_deg: f64,
    ra_deg: f64,
    dec_deg: f64,
    positions: &Positions<'_>,
) -> Result<Option<Table>> {
    if shards.is_empty() {
        return Ok(None);
    }
    let centre = SkyPoint::new(ra_deg, dec_deg);
    let mut parts = Vec::with_capacity(shards.len());
    for shard in shards {
        let table = store.read_table(&shard.path)?;
        let (ra, dec) = positions.resolve(&table)?;
        let mask: Vec<bool> = ra
            .iter()
            .zip(&dec)
            .map(|(&r, &d)| centre.distance_deg(r, d) < radius_deg)
            .collect();
        let kept = table.filter(&mask)?;
        debug!(
            shard = shard.pixel,
            read = table.num_rows(),
            kept = kept.num_rows(),
            "disc selection"
        );
        parts.push(kept);
    }
    Table::concat(&parts).map(Some)
}

/// All rows of `shards` concatenated in shard order. `None` when there is no
/// shard to read.
pub fn select_in_hpix<S: TableStore>(store: &S, shards: &[ShardLocator]) -> Result<Option<Table>> {
    if shards.is_empty() {
        return Ok(None);
    }
    let parts = shards
        .iter()
        .map(|shard| store.read_table(&shard.path))
        .collect::<Result<Vec<_>>>()?;
    Table::concat(&parts).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SurveyError;
    use crate::grid::sphere::angular_distance_deg;
    use crate::grid::PixelGrid;
    use crate::table::{Column, ColumnarFile};
    use tempfile::TempDir;

    fn write_shard(dir: &std::path::Path, pixel: u64, ra: Vec<f64>, dec: Vec<f64>) -> ShardLocator {
        let path = dir.join(format!("{pixel}.ctab"));
        let table = Table::new()
            .with_column("RA", Column::Float(ra))
            .unwrap()
            .with_column("DEC", Column::Float(dec))
            .unwrap();
        ColumnarFile.write_table(&table, &path, false).unwrap();
        ShardLocator { pixel, path }
    }

    const COLUMNS: Positions<'static> = Positions::Columns {
        ra: "RA",
        dec: "DEC",
    };

    #[test]
    fn test_select_in_disc_filters_and_keeps_shard_order() {
        let dir = TempDir::new().unwrap();
        let a = write_shard(dir.path(), 1, vec![10.0, 10.5, 15.0], vec![0.0, 0.2, 0.0]);
        let b = write_shard(dir.path(), 2, vec![9.8, 30.0], vec![-0.1, 0.0]);

        let table = select_in_disc(&ColumnarFile, &[a, b], 1.0, 10.0, 0.0, &COLUMNS)
            .unwrap()
            .unwrap();
        assert_eq!(table.floats("RA").unwrap(), &[10.0, 10.5, 9.8]);
        for (&r, &d) in table.floats("RA").unwrap().iter().zip(table.floats("DEC").unwrap()) {
            assert!(angular_distance_deg(r, d, 10.0, 0.0) < 1.0);
        }
    }

    #[test]
    fn test_select_in_disc_empty_shards_is_none() {
        assert!(select_in_disc(&ColumnarFile, &[], 1.0, 0.0, 0.0, &COLUMNS)
            .unwrap()
            .is_none());
        assert!(select_in_hpix(&ColumnarFile, &[]).unwrap().is_none());
    }

    #[test]
    fn test_missing_shard_propagates() {
        let dir = TempDir::new().unwrap();
        let ghost = ShardLocator {
            pixel: 4,
            path: dir.path().join("4.ctab"),
        };
        assert!(matches!(
            select_in_hpix(&ColumnarFile, &[ghost]),
            Err(SurveyError::Io { .. })
        ));
    }

    #[test]
    fn test_select_in_disc_by_pixel_centres() {
        let dir = TempDir::new().unwrap();
        let grid = PixelGrid::nest(64).unwrap();
        let pixels = grid.disc_pixels(50.0, 50.0, 3.0, false);
        let path = dir.path().join("0_footprint.ctab");
        let table = Table::new()
            .with_column("pixel", Column::Int(pixels.iter().map(|&p| p as i64).collect()))
            .unwrap();
        ColumnarFile.write_table(&table, &path, false).unwrap();
        let shard = ShardLocator { pixel: 0, path };

        let positions = Positions::PixelCentres { key: "pixel", grid };
        let inner = select_in_disc(&ColumnarFile, &[shard.clone()], 1.5, 50.0, 50.0, &positions)
            .unwrap()
            .unwrap();
        let expected = grid.disc_pixels(50.0, 50.0, 1.5, false).len();
        assert!(inner.num_rows().abs_diff(expected) <= 2, "{} vs {expected}", inner.num_rows());

        let all = select_in_hpix(&ColumnarFile, &[shard]).unwrap().unwrap();
        assert_eq!(all.num_rows(), pixels.len());
    }
}
