//! Survey-wide reassembly of per-tile outputs.
//!
//! Every tile produces a cluster table and a member table. Assembly
//! concatenates the cluster tables in tile-id order, keeps each cluster only
//! in the tile that owns its position, ranks the survivors into string ids
//! `"0".."n-1"`, and finally attaches `id_cl` and `tile` to the members of the
//! retained clusters.
//!
//! Required columns:
//! - clusters: `index_cl_tile`, `nmem` (and `tile` once merged)
//! - members: `index_cl_tile`

use crate::config::AssemblyConfig;
use crate::error::{Result, SurveyError};
use crate::grid::sphere::SkyPoint;
use crate::query::Positions;
use crate::table::{Column, SortOrder, Table, TableStore};
use crate::tiles::Tile;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const KEY_ID: &str = "id";
pub const KEY_TILE: &str = "tile";
pub const KEY_INDEX_IN_TILE: &str = "index_cl_tile";
pub const KEY_NMEM: &str = "nmem";
pub const KEY_ID_CL: &str = "id_cl";

/// Per-tile file stems for cluster and member tables.
pub const CLUSTERS_STEM: &str = "clusters";
pub const MEMBERS_STEM: &str = "members";

/// Output of one tile.
#[derive(Debug, Clone, PartialEq)]
pub struct TileOutput {
    pub tile_id: i64,
    pub table: Table,
}

/// Directory holding the outputs of tile `tile_id`.
pub fn tile_dir(tiles_dir: &Path, tile_id: i64) -> PathBuf {
    tiles_dir.join(format!("tile_{tile_id}"))
}

/// Rank rows by `rank_key`, highest first (NaN last, ties keep input order),
/// and replace any `id` column with `"0".."n-1"` in that order.
pub fn assign_unique_ids(table: &Table, rank_key: &str) -> Result<Table> {
    let order = table.argsort(rank_key, SortOrder::Descending)?;
    let mut ranked = table.take(&order)?;
    ranked.push_column(
        KEY_ID,
        Column::Str((0..ranked.num_rows()).map(|i| i.to_string()).collect()),
    )?;
    Ok(ranked)
}

fn sorted_by_tile(mut outputs: Vec<TileOutput>) -> Result<Vec<TileOutput>> {
    outputs.sort_by_key(|o| o.tile_id);
    if let Some(w) = outputs.windows(2).find(|w| w[0].tile_id == w[1].tile_id) {
        return Err(SurveyError::integrity(format!(
            "tile {} appears twice",
            w[0].tile_id
        )));
    }
    Ok(outputs)
}

/// Concatenate per-tile tables in tile-id order with a `tile` column.
pub fn merge_tiles(tiles: Vec<TileOutput>) -> Result<Table> {
    let mut parts = Vec::with_capacity(tiles.len());
    for output in sorted_by_tile(tiles)? {
        let mut table = output.table;
        let rows = table.num_rows();
        table.push_column(KEY_TILE, Column::Int(vec![output.tile_id; rows]))?;
        parts.push(table);
    }
    Table::concat(&parts)
}

fn id_strings(column: &Column) -> Result<Vec<String>> {
    match column {
        Column::Str(v) => Ok(v.clone()),
        Column::Int(v) => Ok(v.iter().map(i64::to_string).collect()),
        other => Err(SurveyError::integrity(format!(
            "cluster id column is {:?}",
            other.kind()
        ))),
    }
}

/// Attach `id_cl` and `tile` to the members of the retained clusters.
///
/// `survey_clusters` holds the retained clusters of the whole survey with
/// their `id`, `tile`, `index_cl_tile` and `nmem`. Members are grouped per
/// tile in tile-id order and, within a tile, stably sorted by
/// `index_cl_tile`. Members of clusters that were not retained are dropped.
///
/// # Errors
/// `DataIntegrity` when a cluster's member count differs from `nmem`, an
/// `index_cl_tile` repeats within a tile, a survey `id` repeats, or a
/// retained cluster's tile has no member table.
pub fn merge_members(members: Vec<TileOutput>, survey_clusters: &Table) -> Result<Table> {
    let cluster_tiles = survey_clusters.ints(KEY_TILE)?;
    let cluster_index = survey_clusters.ints(KEY_INDEX_IN_TILE)?;
    let cluster_nmem = survey_clusters.ints(KEY_NMEM)?;
    let cluster_ids = survey_clusters.column(KEY_ID)?;

    let mut seen = HashSet::new();
    for id in id_strings(cluster_ids)? {
        if !seen.insert(id.clone()) {
            return Err(SurveyError::integrity(format!("duplicate cluster id {id:?}")));
        }
    }

    let members = sorted_by_tile(members)?;
    let mut by_tile: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (row, &tile) in cluster_tiles.iter().enumerate() {
        by_tile.entry(tile).or_default().push(row);
    }
    if let Some(orphan) = by_tile
        .keys()
        .find(|&&t| members.binary_search_by_key(&t, |m| m.tile_id).is_err())
    {
        return Err(SurveyError::integrity(format!(
            "clusters reference tile {orphan} which has no member table"
        )));
    }

    let mut parts = Vec::with_capacity(members.len());
    let mut dropped = 0usize;
    for output in &members {
        let mut rows = by_tile.remove(&output.tile_id).unwrap_or_default();
        rows.sort_by_key(|&r| cluster_index[r]);
        let mut cluster_row: HashMap<i64, usize> = HashMap::with_capacity(rows.len());
        for &r in &rows {
            if cluster_row.insert(cluster_index[r], r).is_some() {
                return Err(SurveyError::integrity(format!(
                    "tile {} has index_cl_tile {} twice",
                    output.tile_id, cluster_index[r]
                )));
            }
        }

        let member_index = output.table.ints(KEY_INDEX_IN_TILE)?;
        let mut kept: Vec<usize> = (0..member_index.len())
            .filter(|&i| cluster_row.contains_key(&member_index[i]))
            .collect();
        kept.sort_by_key(|&i| member_index[i]);
        dropped += member_index.len() - kept.len();

        let mut counts: HashMap<i64, i64> = HashMap::new();
        for &i in &kept {
            *counts.entry(member_index[i]).or_insert(0) += 1;
        }
        for &r in &rows {
            let found = counts.get(&cluster_index[r]).copied().unwrap_or(0);
            if found != cluster_nmem[r] {
                return Err(SurveyError::integrity(format!(
                    "tile {} cluster {}: {found} members found, nmem is {}",
                    output.tile_id, cluster_index[r], cluster_nmem[r]
                )));
            }
        }

        let owner_rows: Vec<usize> = kept
            .iter()
            .map(|&i| cluster_row[&member_index[i]])
            .collect();
        let mut part = output.table.take(&kept)?;
        part.push_column(KEY_ID_CL, cluster_ids.take(&owner_rows))?;
        part.push_column(KEY_TILE, Column::Int(vec![output.tile_id; kept.len()]))?;
        parts.push(part);
    }

    if dropped > 0 {
        warn!(dropped, "dropped members of clusters not retained");
    }
    Table::concat(&parts)
}

/// Keep each cluster only in the tile that owns its position: inside the
/// tile's own pixel for grid tiles, within the tile radius for target tiles.
pub fn select_owned(clusters: &Table, tiles: &[Tile], positions: &Positions<'_>) -> Result<Table> {
    let by_id: HashMap<i64, &Tile> = tiles.iter().map(|t| (t.id, t)).collect();
    let tile_ids = clusters.ints(KEY_TILE)?;
    let (ra, dec) = positions.resolve(clusters)?;

    let mut mask = Vec::with_capacity(tile_ids.len());
    for (i, tile_id) in tile_ids.iter().enumerate() {
        let tile = by_id.get(tile_id).ok_or_else(|| {
            SurveyError::integrity(format!("cluster row {i} references unknown tile {tile_id}"))
        })?;
        let owned = match (tile.hpix, tile.grid()) {
            (Some(hpix), Some(grid)) => grid.ang2pix(ra[i], dec[i]) == hpix,
            _ => SkyPoint::new(tile.ra, tile.dec).distance_deg(ra[i], dec[i]) <= tile.radius_tile_deg,
        };
        mask.push(owned);
    }
    clusters.filter(&mask)
}

/// File-level assembly over a [`TableStore`].
pub struct CatalogAssembler<'s, S: TableStore> {
    store: &'s S,
    config: AssemblyConfig,
}

impl<'s, S: TableStore> CatalogAssembler<'s, S> {
    pub fn new(store: &'s S, config: AssemblyConfig) -> Self {
        Self { store, config }
    }

    /// Path of a per-tile table (`stem` is [`CLUSTERS_STEM`] or [`MEMBERS_STEM`]).
    pub fn tile_file(&self, tiles_dir: &Path, tile_id: i64, stem: &str) -> PathBuf {
        tile_dir(tiles_dir, tile_id).join(format!("{stem}.{}", self.store.extension()))
    }

    fn read_outputs(&self, files: &[(i64, PathBuf)]) -> Result<Vec<TileOutput>> {
        files
            .iter()
            .map(|(tile_id, path)| {
                Ok(TileOutput {
                    tile_id: *tile_id,
                    table: self.store.read_table(path)?,
                })
            })
            .collect()
    }

    /// Read and merge per-tile cluster tables.
    pub fn merge_tile_files(&self, files: &[(i64, PathBuf)]) -> Result<Table> {
        merge_tiles(self.read_outputs(files)?)
    }

    /// Read per-tile member tables and attach them to `survey_clusters`.
    pub fn merge_member_files(&self, files: &[(i64, PathBuf)], survey_clusters: &Table) -> Result<Table> {
        merge_members(self.read_outputs(files)?, survey_clusters)
    }

    /// Full assembly of the outputs under `tiles_dir` for `tiles`, returning
    /// the ranked survey clusters and their members.
    pub fn assemble(
        &self,
        tiles: &[Tile],
        tiles_dir: &Path,
        positions: &Positions<'_>,
    ) -> Result<(Table, Table)> {
        let files = |stem: &str| -> Vec<(i64, PathBuf)> {
            tiles
                .iter()
                .map(|t| (t.id, self.tile_file(tiles_dir, t.id, stem)))
                .collect()
        };

        let merged = self.merge_tile_files(&files(CLUSTERS_STEM))?;
        let owned = select_owned(&merged, tiles, positions)?;
        let clusters = assign_unique_ids(&owned, &self.config.key_rank)?;
        let members = self.merge_member_files(&files(MEMBERS_STEM), &clusters)?;

        info!(
            tiles = tiles.len(),
            detections = merged.num_rows(),
            clusters = clusters.num_rows(),
            members = members.num_rows(),
            "assembled survey catalog"
        );
        Ok((clusters, members))
    }
}
