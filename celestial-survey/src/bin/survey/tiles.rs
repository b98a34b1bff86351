//! Survey tile table generation.

use crate::cli::TilesArgs;
use anyhow::Context;
use celestial_survey::config::SurveyConfig;
use celestial_survey::footprint::FootprintMap;
use celestial_survey::table::ColumnarFile;
use celestial_survey::tiles::{write_tile_table, TileGenerator};
use tracing::info;

pub fn run(args: &TilesArgs) -> anyhow::Result<()> {
    let config = SurveyConfig::from_json_file(&args.config)
        .with_context(|| format!("loading {:?}", args.config))?;
    let store = ColumnarFile;

    let footprint = FootprintMap::load(&store, &config.footprint)?;
    info!(
        pixels = footprint.len(),
        area_deg2 = footprint.total_area_deg2(),
        "footprint loaded"
    );

    let generator = TileGenerator::new(config.tiling.clone())?;
    let tiles = generator.grid_tiles(&footprint)?;
    write_tile_table(&store, &tiles, &args.output, args.overwrite)
        .with_context(|| format!("writing {:?}", args.output))?;
    info!(tiles = tiles.len(), output = %args.output.display(), "tile table written");
    Ok(())
}
