//! Mosaic shard directories.
//!
//! A mosaic splits a survey-wide table into one file per pixel of a coarse
//! grid. File names are `<pixel><suffix>.<ext>`: catalog shards have no
//! suffix, footprint shards end in `_footprint`. A [`MosaicIndex`] scans the
//! directory once and answers which shards a disc, tile or pixel set touches.

use crate::config::MosaicConfig;
use crate::error::{Result, SurveyError};
use crate::footprint::FootprintMap;
use crate::grid::PixelGrid;
use crate::table::{Column, Table, TableStore};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What a mosaic holds, which fixes the filename suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardKind {
    /// `<pixel>.<ext>`
    Catalog,
    /// `<pixel>_footprint.<ext>`
    Footprint,
}

impl ShardKind {
    pub fn suffix(self) -> &'static str {
        match self {
            ShardKind::Catalog => "",
            ShardKind::Footprint => "_footprint",
        }
    }
}

/// One shard of a mosaic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ShardLocator {
    pub pixel: u64,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct MosaicIndex {
    dir: PathBuf,
    grid: PixelGrid,
    kind: ShardKind,
    extension: String,
    shards: BTreeMap<u64, PathBuf>,
}

/// Path of the shard for `pixel` inside `dir`.
pub fn shard_path(dir: &Path, pixel: u64, kind: ShardKind, extension: &str) -> PathBuf {
    dir.join(format!("{pixel}{}.{extension}", kind.suffix()))
}

impl MosaicIndex {
    /// Index every shard in `dir`. Hidden files and subdirectories are skipped.
    ///
    /// # Errors
    /// `Configuration` when the directory is missing or holds no shard, a
    /// file name does not parse as `<pixel><suffix>.<ext>`, extensions are
    /// mixed, or a pixel id is outside `grid` or appears twice.
    pub fn scan(dir: impl AsRef<Path>, grid: PixelGrid, kind: ShardKind) -> Result<Self> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir).map_err(|e| {
            SurveyError::configuration(format!("cannot list mosaic directory {dir:?}: {e}"))
        })?;

        let mut extension: Option<String> = None;
        let mut shards = BTreeMap::new();
        for entry in entries {
            let entry = entry.map_err(|e| SurveyError::io(dir, e))?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || path.is_dir() {
                continue;
            }

            let (stem, ext) = name.rsplit_once('.').ok_or_else(|| {
                SurveyError::configuration(format!("shard {name:?} has no extension"))
            })?;
            match &extension {
                None => extension = Some(ext.to_string()),
                Some(seen) if seen != ext => {
                    return Err(SurveyError::configuration(format!(
                        "mixed shard extensions in {dir:?}: .{seen} and .{ext}"
                    )))
                }
                Some(_) => {}
            }

            let pixel = stem
                .strip_suffix(kind.suffix())
                .and_then(|s| s.parse::<u64>().ok())
                .ok_or_else(|| {
                    SurveyError::configuration(format!(
                        "shard {name:?} is not named <pixel>{}.<ext>",
                        kind.suffix()
                    ))
                })?;
            if pixel >= grid.npix() {
                return Err(SurveyError::configuration(format!(
                    "shard {name:?} pixel {pixel} outside mosaic grid {grid}"
                )));
            }
            if shards.insert(pixel, path).is_some() {
                return Err(SurveyError::configuration(format!(
                    "duplicate shard for pixel {pixel} in {dir:?}"
                )));
            }
        }

        let Some(extension) = extension else {
            return Err(SurveyError::configuration(format!(
                "mosaic directory {dir:?} holds no shards"
            )));
        };
        info!(dir = %dir.display(), %grid, shards = shards.len(), "indexed mosaic");
        Ok(Self {
            dir: dir.to_path_buf(),
            grid,
            kind,
            extension,
            shards,
        })
    }

    pub fn from_config(config: &MosaicConfig, kind: ShardKind) -> Result<Self> {
        Self::scan(&config.dir, config.grid.build()?, kind)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn grid(&self) -> &PixelGrid {
        &self.grid
    }

    pub fn kind(&self) -> ShardKind {
        self.kind
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// Indexed pixel ids, ascending.
    pub fn pixels(&self) -> impl Iterator<Item = u64> + '_ {
        self.shards.keys().copied()
    }

    pub fn locator(&self, pixel: u64) -> Option<ShardLocator> {
        self.shards.get(&pixel).map(|path| ShardLocator {
            pixel,
            path: path.clone(),
        })
    }

    fn locators(&self, pixels: impl IntoIterator<Item = u64>) -> Vec<ShardLocator> {
        pixels.into_iter().filter_map(|p| self.locator(p)).collect()
    }

    /// Shards whose pixel is in the disc, computed on the mosaic's own grid.
    pub fn shards_for_disc(
        &self,
        ra_deg: f64,
        dec_deg: f64,
        radius_deg: f64,
        inclusive: bool,
    ) -> Vec<ShardLocator> {
        let disc = self.grid.disc_pixels(ra_deg, dec_deg, radius_deg, inclusive);
        let shards = self.locators(disc);
        debug!(ra_deg, dec_deg, radius_deg, shards = shards.len(), "disc shard lookup");
        shards
    }

    /// Shards lying inside the given tile pixels. The mosaic must be at least
    /// as fine as `tile_grid`.
    pub fn shards_for_tile(&self, tile_pixels: &[u64], tile_grid: &PixelGrid) -> Result<Vec<ShardLocator>> {
        if self.grid.nside() < tile_grid.nside() {
            return Err(SurveyError::configuration(format!(
                "mosaic grid {} is coarser than tile grid {tile_grid}",
                self.grid
            )));
        }
        let wanted: BTreeSet<u64> = tile_pixels.iter().copied().collect();
        let mut shards = Vec::new();
        for (&pixel, path) in &self.shards {
            if wanted.contains(&self.grid.parent(pixel, tile_grid)?) {
                shards.push(ShardLocator {
                    pixel,
                    path: path.clone(),
                });
            }
        }
        Ok(shards)
    }

    /// Shards holding the given fine pixels. `grid` must be at least as fine
    /// as the mosaic.
    pub fn shards_for_pixels(&self, pixels: &[u64], grid: &PixelGrid) -> Result<Vec<ShardLocator>> {
        if grid.nside() < self.grid.nside() {
            return Err(SurveyError::configuration(format!(
                "query grid {grid} is coarser than mosaic grid {}",
                self.grid
            )));
        }
        let (coarse, _) = grid.degrade(pixels, &self.grid)?;
        Ok(self.locators(coarse))
    }

    /// Every shard concatenated in pixel order.
    pub fn concatenate<S: TableStore>(&self, store: &S) -> Result<Table> {
        let tables = self
            .shards
            .values()
            .map(|path| store.read_table(path))
            .collect::<Result<Vec<_>>>()?;
        Table::concat(&tables)
    }
}

/// Split a fine footprint into one `_footprint` shard per pixel of the mosaic
/// grid. Each shard carries `key_pixel`, the pixel centres as `ra`/`dec`, and
/// `key_frac`. Returns the index of the written mosaic.
pub fn write_footprint_mosaic<S: TableStore>(
    store: &S,
    footprint: &FootprintMap,
    mosaic: &MosaicConfig,
    key_pixel: &str,
    key_frac: &str,
    overwrite: bool,
) -> Result<MosaicIndex> {
    let fine = footprint.grid();
    let coarse = mosaic.grid.build()?;
    if coarse.nside() > fine.nside() {
        return Err(SurveyError::configuration(format!(
            "mosaic grid {coarse} is finer than footprint grid {fine}"
        )));
    }
    fs::create_dir_all(&mosaic.dir).map_err(|e| SurveyError::io(&mosaic.dir, e))?;

    let mut groups: BTreeMap<u64, Vec<(u64, f64)>> = BTreeMap::new();
    for (pixel, fraction) in footprint.iter() {
        groups
            .entry(fine.parent(pixel, &coarse)?)
            .or_default()
            .push((pixel, fraction));
    }

    for (&shard, members) in &groups {
        let pixels: Vec<u64> = members.iter().map(|&(p, _)| p).collect();
        let (ra, dec) = fine.pixels_to_angles(&pixels)?;
        let table = Table::new()
            .with_column(key_pixel, Column::Int(pixels.iter().map(|&p| p as i64).collect()))?
            .with_column("ra", Column::Float(ra))?
            .with_column("dec", Column::Float(dec))?
            .with_column(key_frac, Column::Float(members.iter().map(|&(_, f)| f).collect()))?;
        let path = shard_path(&mosaic.dir, shard, ShardKind::Footprint, store.extension());
        store.write_table(&table, &path, overwrite)?;
    }
    info!(
        dir = %mosaic.dir.display(),
        shards = groups.len(),
        pixels = footprint.len(),
        "wrote footprint mosaic"
    );

    MosaicIndex::scan(&mosaic.dir, coarse, ShardKind::Footprint)
}
