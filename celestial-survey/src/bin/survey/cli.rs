//! CLI argument definitions for survey

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "survey")]
#[command(about = "HEALPix survey tiling and catalog assembly")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Shard the footprint into a mosaic directory
    MosaicFootprint(MosaicFootprintArgs),

    /// Generate the survey tile table from the footprint
    Tiles(TilesArgs),

    /// Extract the catalog rows of one tile
    TileQuery(TileQueryArgs),

    /// Merge per-tile clusters and members into survey catalogs
    Assemble(AssembleArgs),
}

#[derive(Parser)]
pub struct MosaicFootprintArgs {
    /// Survey configuration (JSON)
    #[arg(long)]
    pub config: PathBuf,

    /// Replace existing shard files
    #[arg(long)]
    pub overwrite: bool,
}

#[derive(Parser)]
pub struct TilesArgs {
    /// Survey configuration (JSON)
    #[arg(long)]
    pub config: PathBuf,

    /// Output tile table
    #[arg(long)]
    pub output: PathBuf,

    /// Replace an existing output file
    #[arg(long)]
    pub overwrite: bool,
}

#[derive(Parser)]
pub struct TileQueryArgs {
    /// Survey configuration (JSON)
    #[arg(long)]
    pub config: PathBuf,

    /// Tile table written by `tiles`
    #[arg(long)]
    pub tiles: PathBuf,

    /// Id of the tile to extract
    #[arg(long)]
    pub tile_id: i64,

    /// Output catalog table
    #[arg(long)]
    pub output: PathBuf,

    /// Replace an existing output file
    #[arg(long)]
    pub overwrite: bool,
}

#[derive(Parser)]
pub struct AssembleArgs {
    /// Survey configuration (JSON)
    #[arg(long)]
    pub config: PathBuf,

    /// Tile table written by `tiles`
    #[arg(long)]
    pub tiles: PathBuf,

    /// Directory holding one `tile_<id>` directory per tile
    #[arg(long)]
    pub tiles_dir: PathBuf,

    /// Output survey cluster table
    #[arg(long)]
    pub clusters_out: PathBuf,

    /// Output survey member table
    #[arg(long)]
    pub members_out: PathBuf,

    /// Replace existing output files
    #[arg(long)]
    pub overwrite: bool,
}
