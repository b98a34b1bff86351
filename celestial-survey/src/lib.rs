//! HEALPix spatial indexing and tiling for wide-field survey catalogs.
//!
//! Catalogs and footprint masks are sharded into per-pixel files (a
//! *mosaic*). The survey footprint is cut into overlapping tiles, each tile
//! reads only the shards it touches, and per-tile results are reassembled
//! into survey catalogs with deterministic ids.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`grid`] | [`PixelGrid`](grid::PixelGrid): pixel ids, disc queries, hierarchy, [`sphere`](grid::sphere) geometry |
//! | [`footprint`] | [`FootprintMap`](footprint::FootprintMap): sparse coverage fractions, degrade/upgrade, annulus coverage |
//! | [`mosaic`] | [`MosaicIndex`](mosaic::MosaicIndex): shard directory scan and region-to-shard lookup |
//! | [`query`] | [`RegionQuery`](query::RegionQuery), [`fast_disc_membership`](query::fast_disc_membership), row selection |
//! | [`tiles`] | [`TileGenerator`](tiles::TileGenerator), [`Tile`](tiles::Tile) and the tile table |
//! | [`assemble`] | [`CatalogAssembler`](assemble::CatalogAssembler), unique ids, member merging |
//! | [`table`] | Columnar [`Table`](table::Table) and the [`TableStore`](table::TableStore) file interface |
//! | [`lookup`] | Redshift interpolation tables |
//! | [`config`] | JSON survey configuration |
//!
//! # Quick Start
//!
//! ```ignore
//! use celestial_survey::config::SurveyConfig;
//! use celestial_survey::footprint::FootprintMap;
//! use celestial_survey::table::ColumnarFile;
//! use celestial_survey::tiles::TileGenerator;
//!
//! let config = SurveyConfig::from_json_file("survey.json")?;
//! let footprint = FootprintMap::load(&ColumnarFile, &config.footprint)?;
//! let tiles = TileGenerator::new(config.tiling)?.grid_tiles(&footprint)?;
//! ```
//!
//! # Features
//!
//! - **`cli`**: enables the `survey` binary driving mosaic, tiling,
//!   per-tile extraction and assembly from the command line.

pub mod assemble;
pub mod config;
pub mod error;
pub mod footprint;
pub mod grid;
pub mod lookup;
pub mod mosaic;
pub mod query;
pub mod table;
pub mod tiles;

pub use error::{Result, SurveyError};
pub use grid::{PixelGrid, Scheme};
