//! Survey: footprint sharding, tiling, per-tile extraction and assembly
//!
//! Every subcommand reads the same JSON survey configuration and works on
//! `.ctab` columnar tables.

mod assemble;
mod cli;
mod mosaic_footprint;
mod tile_query;
mod tiles;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Commands::MosaicFootprint(args) => mosaic_footprint::run(args),
        Commands::Tiles(args) => tiles::run(args),
        Commands::TileQuery(args) => tile_query::run(args),
        Commands::Assemble(args) => assemble::run(args),
    }
}
