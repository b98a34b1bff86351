//! Footprint sharding into a mosaic directory.

use crate::cli::MosaicFootprintArgs;
use anyhow::Context;
use celestial_survey::config::SurveyConfig;
use celestial_survey::footprint::{FootprintMap, DEFAULT_FRAC_KEY};
use celestial_survey::mosaic::write_footprint_mosaic;
use celestial_survey::table::ColumnarFile;
use std::fs;
use tracing::info;

pub fn run(args: &MosaicFootprintArgs) -> anyhow::Result<()> {
    let config = SurveyConfig::from_json_file(&args.config)
        .with_context(|| format!("loading {:?}", args.config))?;
    let Some(mosaic) = &config.footprint.mosaic else {
        anyhow::bail!("footprint.mosaic is not configured in {:?}", args.config);
    };

    let store = ColumnarFile;
    let footprint = FootprintMap::load(&store, &config.footprint)?;
    fs::create_dir_all(&mosaic.dir).with_context(|| format!("creating {:?}", mosaic.dir))?;

    let key_frac = config
        .footprint
        .key_frac
        .as_deref()
        .unwrap_or(DEFAULT_FRAC_KEY);
    let index = write_footprint_mosaic(
        &store,
        &footprint,
        mosaic,
        &config.footprint.key_pixel,
        key_frac,
        args.overwrite,
    )?;
    info!(
        shards = index.len(),
        pixels = footprint.len(),
        dir = %mosaic.dir.display(),
        "footprint mosaic written"
    );
    Ok(())
}
