//! Catalog extraction for a single tile.

use crate::cli::TileQueryArgs;
use anyhow::Context;
use celestial_survey::config::SurveyConfig;
use celestial_survey::mosaic::{MosaicIndex, ShardKind};
use celestial_survey::query::RegionQuery;
use celestial_survey::table::{ColumnarFile, TableStore};
use celestial_survey::tiles::read_tile_table;
use tracing::{info, warn};

pub fn run(args: &TileQueryArgs) -> anyhow::Result<()> {
    let config = SurveyConfig::from_json_file(&args.config)
        .with_context(|| format!("loading {:?}", args.config))?;
    let store = ColumnarFile;

    let tiles = read_tile_table(&store, &args.tiles)?;
    let Some(tile) = tiles.iter().find(|t| t.id == args.tile_id) else {
        anyhow::bail!("tile {} not found in {:?}", args.tile_id, args.tiles);
    };

    let catalog = &config.catalog;
    let index = MosaicIndex::from_config(&catalog.mosaic, ShardKind::Catalog)?;
    let rows = RegionQuery::new(&store).catalog_in_disc(
        &index,
        &catalog.key_ra,
        &catalog.key_dec,
        tile.ra,
        tile.dec,
        tile.radius_tile_deg,
    )?;
    let Some(rows) = rows else {
        warn!(tile = tile.id, "no catalog shard overlaps the tile");
        return Ok(());
    };

    store
        .write_table(&rows, &args.output, args.overwrite)
        .with_context(|| format!("writing {:?}", args.output))?;
    info!(
        tile = tile.id,
        rows = rows.num_rows(),
        radius_deg = tile.radius_tile_deg,
        "tile catalog written"
    );
    Ok(())
}
