//! Survey tiling.
//!
//! In grid mode the fine survey footprint is degraded to the tiling grid and
//! every occupied coarse pixel becomes one [`Tile`]. In target mode a single
//! tile is centred on a requested position. Either way a tile is processed as
//! a disc of radius [`TileGenerator::tile_radius_deg`], which adds the
//! configured overlap to half the pixel diagonal so neighbouring tiles share a
//! margin.
//!
//! Tile tables on disk use `-1` for values that do not apply to a mode
//! (`hpix`, `Nside`, coverage fractions, filter radius).

use crate::config::TilingConfig;
use crate::error::{Result, SurveyError};
use crate::footprint::FootprintMap;
use crate::grid::sphere::annulus_area_deg2;
use crate::grid::{PixelGrid, Scheme};
use crate::table::{Column, Table, TableStore};
use std::path::Path;
use tracing::info;

/// Radius of the wide coverage fraction reported for target tiles.
pub const COVERFRAC_WIDE_DEG: f64 = 0.5;
/// Radius of the narrow coverage fraction reported for target tiles.
pub const COVERFRAC_NARROW_DEG: f64 = 1.0 / 12.0;

const MISSING: f64 = -1.0;

/// One unit of survey processing.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub id: i64,
    pub ra: f64,
    pub dec: f64,
    /// Tiling-grid pixel; `None` for target tiles.
    pub hpix: Option<u64>,
    grid: Option<PixelGrid>,
    pub area_deg2: f64,
    pub eff_area_deg2: f64,
    /// Footprint area within `radius_tile_deg` of the centre.
    pub disc_eff_area_deg2: f64,
    pub radius_tile_deg: f64,
    /// Object search radius; target tiles only.
    pub radius_filter_deg: Option<f64>,
    pub coverfrac_30arcmin: Option<f64>,
    pub coverfrac_5arcmin: Option<f64>,
}

impl Tile {
    /// The tiling grid the tile's `hpix` belongs to.
    pub fn grid(&self) -> Option<&PixelGrid> {
        self.grid.as_ref()
    }

    pub fn is_target(&self) -> bool {
        self.hpix.is_none()
    }
}

/// Search radius of a target, either angular or physical.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchRadius {
    Arcmin(f64),
    /// Physical radius with the target's scale factor.
    Mpc { value: f64, conv_factor: f64 },
}

impl SearchRadius {
    /// Radius in degrees. Physical radii convert as
    /// `degrees((value / 60) / conv_factor)`.
    pub fn to_degrees(self) -> Result<f64> {
        match self {
            SearchRadius::Arcmin(arcmin) => Ok(arcmin / 60.0),
            SearchRadius::Mpc { value, conv_factor } => {
                if !conv_factor.is_finite() || conv_factor <= 0.0 {
                    return Err(SurveyError::configuration(format!(
                        "conversion factor must be positive, got {conv_factor}"
                    )));
                }
                Ok(((value / 60.0) / conv_factor).to_degrees())
            }
        }
    }
}

/// A position to build a single target-mode tile around.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Target {
    pub id: i64,
    pub ra: f64,
    pub dec: f64,
    pub tile_radius_deg: f64,
    pub search_radius: SearchRadius,
}

pub struct TileGenerator {
    config: TilingConfig,
    grid: PixelGrid,
}

impl TileGenerator {
    pub fn new(config: TilingConfig) -> Result<Self> {
        config.validate()?;
        let grid = config.grid.build()?;
        Ok(Self { config, grid })
    }

    pub fn grid(&self) -> &PixelGrid {
        &self.grid
    }

    /// Half the diagonal of a tiling pixel plus the overlap margin.
    pub fn tile_radius_deg(&self) -> f64 {
        (2.0 * self.grid.pixel_area_deg2()).sqrt() / 2.0 + self.config.overlap_deg
    }

    /// One tile per tiling pixel touched by the footprint, ids `0..n` in
    /// ascending pixel order.
    pub fn grid_tiles(&self, footprint: &FootprintMap) -> Result<Vec<Tile>> {
        let coarse = footprint.degrade(&self.grid)?;
        let radius = self.tile_radius_deg();
        let area = self.grid.pixel_area_deg2();

        let mut tiles = Vec::with_capacity(coarse.len());
        for (id, (pixel, fraction)) in coarse.iter().enumerate() {
            let (ra, dec) = self.grid.pix2ang(pixel)?;
            tiles.push(Tile {
                id: id as i64,
                ra,
                dec,
                hpix: Some(pixel),
                grid: Some(self.grid),
                area_deg2: area,
                eff_area_deg2: fraction * area,
                disc_eff_area_deg2: footprint.disc_effective_area_deg2(ra, dec, radius),
                radius_tile_deg: radius,
                radius_filter_deg: None,
                coverfrac_30arcmin: None,
                coverfrac_5arcmin: None,
            });
        }

        info!(
            tiles = tiles.len(),
            grid = %self.grid,
            tile_area_deg2 = area,
            tile_radius_deg = radius,
            "generated survey tiles"
        );
        info!(
            eff_area_deg2 = tiles.iter().map(|t| t.eff_area_deg2).sum::<f64>(),
            "effective survey area"
        );
        Ok(tiles)
    }

    /// A single tile centred on `target`.
    pub fn target_tile(&self, target: &Target, footprint: &FootprintMap) -> Result<Tile> {
        let radius_filter = target.search_radius.to_degrees()?;
        let disc_eff_area =
            footprint.disc_effective_area_deg2(target.ra, target.dec, target.tile_radius_deg);
        let tile = Tile {
            id: target.id,
            ra: target.ra,
            dec: target.dec,
            hpix: None,
            grid: None,
            area_deg2: annulus_area_deg2(0.0, target.tile_radius_deg),
            eff_area_deg2: disc_eff_area,
            disc_eff_area_deg2: disc_eff_area,
            radius_tile_deg: target.tile_radius_deg,
            radius_filter_deg: Some(radius_filter),
            coverfrac_30arcmin: Some(footprint.disc_coverage_fraction(
                target.ra,
                target.dec,
                COVERFRAC_WIDE_DEG,
            )),
            coverfrac_5arcmin: Some(footprint.disc_coverage_fraction(
                target.ra,
                target.dec,
                COVERFRAC_NARROW_DEG,
            )),
        };
        info!(
            id = tile.id,
            ra = tile.ra,
            dec = tile.dec,
            eff_area_deg2 = tile.eff_area_deg2,
            "generated target tile"
        );
        Ok(tile)
    }
}

/// Tiles as a table with the on-disk column layout.
pub fn tiles_to_table(tiles: &[Tile]) -> Result<Table> {
    let opt = |v: Option<f64>| v.unwrap_or(MISSING);
    Table::new()
        .with_column("id", Column::Int(tiles.iter().map(|t| t.id).collect()))?
        .with_column(
            "hpix",
            Column::Int(tiles.iter().map(|t| t.hpix.map_or(-1, |p| p as i64)).collect()),
        )?
        .with_column("ra", Column::Float(tiles.iter().map(|t| t.ra).collect()))?
        .with_column("dec", Column::Float(tiles.iter().map(|t| t.dec).collect()))?
        .with_column(
            "area_deg2",
            Column::Float(tiles.iter().map(|t| t.area_deg2).collect()),
        )?
        .with_column(
            "eff_area_deg2",
            Column::Float(tiles.iter().map(|t| t.eff_area_deg2).collect()),
        )?
        .with_column(
            "Nside",
            Column::Int(
                tiles
                    .iter()
                    .map(|t| t.grid.map_or(-1, |g| g.nside() as i64))
                    .collect(),
            ),
        )?
        .with_column(
            "nest",
            Column::Bool(tiles.iter().map(|t| t.grid.is_some_and(|g| g.is_nest())).collect()),
        )?
        .with_column(
            "disc_eff_area_deg2",
            Column::Float(tiles.iter().map(|t| t.disc_eff_area_deg2).collect()),
        )?
        .with_column(
            "radius_tile_deg",
            Column::Float(tiles.iter().map(|t| t.radius_tile_deg).collect()),
        )?
        .with_column(
            "radius_filter_deg",
            Column::Float(tiles.iter().map(|t| opt(t.radius_filter_deg)).collect()),
        )?
        .with_column(
            "coverfrac_30arcmin",
            Column::Float(tiles.iter().map(|t| opt(t.coverfrac_30arcmin)).collect()),
        )?
        .with_column(
            "coverfrac_5arcmin",
            Column::Float(tiles.iter().map(|t| opt(t.coverfrac_5arcmin)).collect()),
        )?
        .with_column(
            "target_mode",
            Column::Bool(tiles.iter().map(Tile::is_target).collect()),
        )
}

/// Inverse of [`tiles_to_table`].
pub fn tiles_from_table(table: &Table) -> Result<Vec<Tile>> {
    let id = table.ints("id")?;
    let hpix = table.ints("hpix")?;
    let ra = table.floats("ra")?;
    let dec = table.floats("dec")?;
    let area = table.floats("area_deg2")?;
    let eff_area = table.floats("eff_area_deg2")?;
    let nside = table.ints("Nside")?;
    let nest = table.bools("nest")?;
    let disc_eff_area = table.floats("disc_eff_area_deg2")?;
    let radius_tile = table.floats("radius_tile_deg")?;
    let radius_filter = table.floats("radius_filter_deg")?;
    let coverfrac_30 = table.floats("coverfrac_30arcmin")?;
    let coverfrac_5 = table.floats("coverfrac_5arcmin")?;
    let target_mode = table.bools("target_mode")?;

    let present = |v: f64| (v >= 0.0).then_some(v);
    (0..table.num_rows())
        .map(|i| {
            let (hpix, grid) = if target_mode[i] {
                (None, None)
            } else {
                let pixel = u64::try_from(hpix[i]).map_err(|_| {
                    SurveyError::integrity(format!("tile {} has no pixel", id[i]))
                })?;
                let nside = u64::try_from(nside[i]).map_err(|_| {
                    SurveyError::integrity(format!("tile {} has no Nside", id[i]))
                })?;
                let grid = PixelGrid::new(nside, Scheme::from_nest_flag(nest[i]))?;
                (Some(pixel), Some(grid))
            };
            Ok(Tile {
                id: id[i],
                ra: ra[i],
                dec: dec[i],
                hpix,
                grid,
                area_deg2: area[i],
                eff_area_deg2: eff_area[i],
                disc_eff_area_deg2: disc_eff_area[i],
                radius_tile_deg: radius_tile[i],
                radius_filter_deg: present(radius_filter[i]),
                coverfrac_30arcmin: present(coverfrac_30[i]),
                coverfrac_5arcmin: present(coverfrac_5[i]),
            })
        })
        .collect()
}

pub fn write_tile_table<S: TableStore>(
    store: &S,
    tiles: &[Tile],
    path: &Path,
    overwrite: bool,
) -> Result<()> {
    store.write_table(&tiles_to_table(tiles)?, path, overwrite)
}

pub fn read_tile_table<S: TableStore>(store: &S, path: &Path) -> Result<Vec<Tile>> {
    tiles_from_table(&store.read_table(path)?)
}
