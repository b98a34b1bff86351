//! Survey-wide merge of per-tile clusters and members.

use crate::cli::AssembleArgs;
use anyhow::Context;
use celestial_survey::assemble::CatalogAssembler;
use celestial_survey::config::SurveyConfig;
use celestial_survey::query::Positions;
use celestial_survey::table::{ColumnarFile, TableStore};
use celestial_survey::tiles::read_tile_table;

pub fn run(args: &AssembleArgs) -> anyhow::Result<()> {
    let config = SurveyConfig::from_json_file(&args.config)
        .with_context(|| format!("loading {:?}", args.config))?;
    let store = ColumnarFile;

    let tiles = read_tile_table(&store, &args.tiles)?;
    let positions = Positions::Columns {
        ra: &config.catalog.key_ra,
        dec: &config.catalog.key_dec,
    };
    let assembler = CatalogAssembler::new(&store, config.assembly.clone());
    let (clusters, members) = assembler.assemble(&tiles, &args.tiles_dir, &positions)?;

    store
        .write_table(&clusters, &args.clusters_out, args.overwrite)
        .with_context(|| format!("writing {:?}", args.clusters_out))?;
    store
        .write_table(&members, &args.members_out, args.overwrite)
        .with_context(|| format!("writing {:?}", args.members_out))?;
    Ok(())
}
