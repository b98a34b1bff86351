//! Typed pipeline configuration.
//!
//! Every struct rejects unknown fields and has no defaults for required
//! values, so a typo or an omitted key fails at load time rather than
//! silently changing behaviour. [`SurveyConfig::validate`] then checks the
//! cross-field constraints (resolutions, overlap, column keys).

use crate::error::{Result, SurveyError};
use crate::grid::{PixelGrid, Scheme};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Resolution and ordering of a pixel grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GridConfig {
    /// HEALPix `nside`, a power of two.
    pub nside: u64,
    /// `true` for NEST ordering, `false` for RING.
    pub nest: bool,
}

impl GridConfig {
    pub fn build(&self) -> Result<PixelGrid> {
        PixelGrid::new(self.nside, Scheme::from_nest_flag(self.nest))
    }
}

impl From<PixelGrid> for GridConfig {
    fn from(grid: PixelGrid) -> Self {
        Self {
            nside: grid.nside(),
            nest: grid.is_nest(),
        }
    }
}

/// A directory of per-pixel shards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MosaicConfig {
    pub dir: PathBuf,
    pub grid: GridConfig,
}

/// The survey footprint table and where its mosaic shards live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FootprintConfig {
    /// Footprint table file.
    pub path: PathBuf,
    pub grid: GridConfig,
    /// Column holding pixel ids.
    pub key_pixel: String,
    /// Column holding covered fractions; absent means fully covered pixels.
    pub key_frac: Option<String>,
    pub mosaic: Option<MosaicConfig>,
}

/// Sharded object catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogConfig {
    pub key_ra: String,
    pub key_dec: String,
    pub mosaic: MosaicConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TilingConfig {
    pub grid: GridConfig,
    /// Margin added to every tile radius, in degrees.
    pub overlap_deg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssemblyConfig {
    /// Column ranking clusters for unique ids, highest first.
    pub key_rank: String,
}

/// Everything one survey run needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SurveyConfig {
    pub footprint: FootprintConfig,
    pub catalog: CatalogConfig,
    pub tiling: TilingConfig,
    pub assembly: AssemblyConfig,
    /// Directory for tile tables and per-tile outputs.
    pub workdir: PathBuf,
}

impl SurveyConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SurveyConfig = serde_json::from_str(json)
            .map_err(|e| SurveyError::configuration(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| SurveyError::io(path, e))?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        let footprint = self.footprint.grid.build()?;
        let tiling = self.tiling.grid.build()?;
        self.catalog.mosaic.grid.build()?;

        if let Some(mosaic) = &self.footprint.mosaic {
            if mosaic.grid.build()?.nside() > footprint.nside() {
                return Err(SurveyError::configuration(format!(
                    "footprint mosaic nside {} is finer than footprint nside {}",
                    mosaic.grid.nside,
                    footprint.nside()
                )));
            }
        }
        if tiling.nside() > footprint.nside() {
            return Err(SurveyError::configuration(format!(
                "tiling nside {} is finer than footprint nside {}",
                tiling.nside(),
                footprint.nside()
            )));
        }
        self.tiling.validate()?;

        for (what, key) in [
            ("footprint.key_pixel", &self.footprint.key_pixel),
            ("catalog.key_ra", &self.catalog.key_ra),
            ("catalog.key_dec", &self.catalog.key_dec),
            ("assembly.key_rank", &self.assembly.key_rank),
        ] {
            if key.is_empty() {
                return Err(SurveyError::configuration(format!("{what} is empty")));
            }
        }
        if self.catalog.key_ra == self.catalog.key_dec {
            return Err(SurveyError::configuration(
                "catalog.key_ra and catalog.key_dec name the same column",
            ));
        }
        Ok(())
    }
}

impl TilingConfig {
    pub fn validate(&self) -> Result<()> {
        self.grid.build()?;
        if !self.overlap_deg.is_finite() || self.overlap_deg < 0.0 {
            return Err(SurveyError::configuration(format!(
                "overlap_deg must be a non-negative number, got {}",
                self.overlap_deg
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "footprint": {
            "path": "footprint.ctab",
            "grid": { "nside": 4096, "nest": true },
            "key_pixel": "pixel",
            "key_frac": "signal",
            "mosaic": { "dir": "fp_mosaic", "grid": { "nside": 32, "nest": true } }
        },
        "catalog": {
            "key_ra": "ra",
            "key_dec": "dec",
            "mosaic": { "dir": "galcat", "grid": { "nside": 64, "nest": false } }
        },
        "tiling": { "grid": { "nside": 16, "nest": true }, "overlap_deg": 0.5 },
        "assembly": { "key_rank": "snr" },
        "workdir": "run"
    }"#;

    #[test]
    fn test_valid_config_loads() {
        let config = SurveyConfig::from_json_str(VALID).unwrap();
        assert_eq!(config.tiling.grid.nside, 16);
        assert_eq!(config.footprint.key_frac.as_deref(), Some("signal"));
        assert_eq!(config.catalog.mosaic.grid.build().unwrap().scheme(), Scheme::Ring);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let json = VALID.replace("\"overlap_deg\": 0.5", "\"overlap_deg\": 0.5, \"overlap\": 1");
        assert!(matches!(
            SurveyConfig::from_json_str(&json),
            Err(SurveyError::Configuration(_))
        ));
    }

    #[test]
    fn test_missing_field_rejected() {
        let json = VALID.replace("\"key_rank\": \"snr\"", "");
        assert!(SurveyConfig::from_json_str(&json).is_err());
    }

    #[test]
    fn test_optional_fields_may_be_omitted() {
        let json = VALID.replace("\"key_frac\": \"signal\",", "");
        let config = SurveyConfig::from_json_str(&json).unwrap();
        assert!(config.footprint.key_frac.is_none());
    }

    #[test]
    fn test_bad_nside_rejected() {
        let json = VALID.replace("\"nside\": 16", "\"nside\": 12");
        assert!(SurveyConfig::from_json_str(&json).is_err());
    }

    #[test]
    fn test_negative_overlap_rejected() {
        let json = VALID.replace("\"overlap_deg\": 0.5", "\"overlap_deg\": -0.1");
        assert!(SurveyConfig::from_json_str(&json).is_err());
    }

    #[test]
    fn test_tiling_finer_than_footprint_rejected() {
        let json = VALID.replace("\"nside\": 4096", "\"nside\": 8");
        assert!(SurveyConfig::from_json_str(&json).is_err());
    }

    #[test]
    fn test_grid_config_from_grid() {
        let grid = PixelGrid::ring(8).unwrap();
        let config = GridConfig::from(grid);
        assert_eq!(config, GridConfig { nside: 8, nest: false });
        assert_eq!(config.build().unwrap(), grid);
    }
}
