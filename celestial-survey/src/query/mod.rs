//! Region queries over mosaic shards.
//!
//! [`RegionQuery`] ties a [`MosaicIndex`] lookup to the shard selection in
//! [`disc`]. Row positions come either from RA/Dec columns (catalog shards) or
//! from the centres of a pixel-id column (footprint shards); see
//! [`Positions`].

pub mod disc;
pub mod membership;

pub use disc::{select_in_disc, select_in_hpix};
pub use membership::{
    fast_disc_membership, rows_in_disc, rows_in_pixel, strict_disc_membership, tag_pixels,
};

use crate::error::Result;
use crate::grid::PixelGrid;
use crate::mosaic::MosaicIndex;
use crate::table::{Table, TableStore};

/// Where a table's row positions come from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Positions<'a> {
    /// RA and Dec columns, in degrees.
    Columns { ra: &'a str, dec: &'a str },
    /// Centres of the pixels named in column `key`.
    PixelCentres { key: &'a str, grid: PixelGrid },
}

impl Positions<'_> {
    /// Per-row `(ra, dec)` in degrees.
    pub fn resolve(&self, table: &Table) -> Result<(Vec<f64>, Vec<f64>)> {
        match *self {
            Positions::Columns { ra, dec } => {
                Ok((table.numeric_as_f64(ra)?, table.numeric_as_f64(dec)?))
            }
            Positions::PixelCentres { key, grid } => {
                grid.pixels_to_angles(&table.pixel_ids(key)?)
            }
        }
    }
}

/// Disc and pixel lookups against sharded catalogs and footprints.
pub struct RegionQuery<'s, S: TableStore> {
    store: &'s S,
}

impl<'s, S: TableStore> RegionQuery<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Catalog rows strictly within `radius_deg`, read from every shard the
    /// inclusive disc touches.
    pub fn catalog_in_disc(
        &self,
        index: &MosaicIndex,
        key_ra: &str,
        key_dec: &str,
        ra_deg: f64,
        dec_deg: f64,
        radius_deg: f64,
    ) -> Result<Option<Table>> {
        let shards = index.shards_for_disc(ra_deg, dec_deg, radius_deg, true);
        let positions = Positions::Columns {
            ra: key_ra,
            dec: key_dec,
        };
        select_in_disc(self.store, &shards, radius_deg, ra_deg, dec_deg, &positions)
    }

    /// Footprint rows whose pixel centre is strictly within `radius_deg`.
    /// `footprint_grid` is the grid of the pixel ids stored in the shards.
    pub fn footprint_in_disc(
        &self,
        index: &MosaicIndex,
        key_pixel: &str,
        footprint_grid: PixelGrid,
        ra_deg: f64,
        dec_deg: f64,
        radius_deg: f64,
    ) -> Result<Option<Table>> {
        let shards = index.shards_for_disc(ra_deg, dec_deg, radius_deg, true);
        let positions = Positions::PixelCentres {
            key: key_pixel,
            grid: footprint_grid,
        };
        select_in_disc(self.store, &shards, radius_deg, ra_deg, dec_deg, &positions)
    }

    /// All catalog rows in the shards inside the given tile pixels.
    pub fn catalog_in_hpix(
        &self,
        index: &MosaicIndex,
        tile_pixels: &[u64],
        tile_grid: &PixelGrid,
    ) -> Result<Option<Table>> {
        let shards = index.shards_for_tile(tile_pixels, tile_grid)?;
        select_in_hpix(self.store, &shards)
    }

    /// All footprint rows in the shards inside the given tile pixels.
    pub fn footprint_in_hpix(
        &self,
        index: &MosaicIndex,
        tile_pixels: &[u64],
        tile_grid: &PixelGrid,
    ) -> Result<Option<Table>> {
        self.catalog_in_hpix(index, tile_pixels, tile_grid)
    }
}
