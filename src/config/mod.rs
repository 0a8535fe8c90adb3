//! Configuration types for the clear-cut clustering pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while validating a configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be a finite, non-negative number (got {value})")]
    InvalidThreshold { name: &'static str, value: f64 },

    #[error("concave_hull_ratio must be in (0, 1] (got {0})")]
    InvalidHullRatio(f64),

    #[error("tile_size_m must be strictly positive (got {0})")]
    InvalidTileSize(f64),
}

/// Configuration for reading the detection raster.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RasterConfig {
    /// Overrides the nodata value stored in the raster file
    #[serde(default)]
    pub nodata: Option<i64>,

    /// Separate mask raster (non-zero = observed pixel)
    #[serde(default)]
    pub mask_path: Option<PathBuf>,

    /// CRS as `EPSG:<code>` or WKT, used when the raster carries none
    #[serde(default)]
    pub crs: Option<String>,

    /// Use `crs` even if the raster declares its own
    #[serde(default)]
    pub force_crs: bool,
}

/// Configuration for pairing and grouping detections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Maximum gap between two detections of the same event, in map units (meters)
    #[serde(default = "default_max_meters")]
    pub max_meters_between_clear_cuts: f64,

    /// Maximum number of days between two detections of the same event
    #[serde(default = "default_max_days")]
    pub max_days_between_clear_cuts: i64,

    /// Side of the square tiles used to partition the pair search
    #[serde(default = "default_tile_size")]
    pub tile_size_m: f64,

    /// Buffer applied after dissolving a cluster to close slivers
    #[serde(default = "default_dissolve_buffer")]
    pub dissolve_buffer: f64,
}

fn default_max_meters() -> f64 {
    50.0
}

fn default_max_days() -> i64 {
    62
}

fn default_tile_size() -> f64 {
    10_000.0
}

fn default_dissolve_buffer() -> f64 {
    0.0001
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            max_meters_between_clear_cuts: default_max_meters(),
            max_days_between_clear_cuts: default_max_days(),
            tile_size_m: default_tile_size(),
            dissolve_buffer: default_dissolve_buffer(),
        }
    }
}

/// Configuration for the false-positive filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilteringConfig {
    /// Clusters smaller than this are discarded
    #[serde(default = "default_min_area")]
    pub min_clear_cut_area_hectare: f64,

    /// Concave hull tightness, 1.0 is the convex hull
    #[serde(default = "default_hull_ratio")]
    pub concave_hull_ratio: f64,

    /// Clusters whose area / hull area falls below this are discarded
    #[serde(default = "default_hull_score_threshold")]
    pub concave_hull_score_threshold: f64,
}

fn default_min_area() -> f64 {
    0.5
}

fn default_hull_ratio() -> f64 {
    0.42
}

fn default_hull_score_threshold() -> f64 {
    0.42
}

impl Default for FilteringConfig {
    fn default() -> Self {
        Self {
            min_clear_cut_area_hectare: default_min_area(),
            concave_hull_ratio: default_hull_ratio(),
            concave_hull_score_threshold: default_hull_score_threshold(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub raster: RasterConfig,

    #[serde(default)]
    pub clustering: ClusteringConfig,

    #[serde(default)]
    pub filtering: FilteringConfig,
}

fn check_threshold(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidThreshold { name, value })
    }
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject thresholds that would make the pass meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.clustering;
        let f = &self.filtering;

        check_threshold(
            "max_meters_between_clear_cuts",
            c.max_meters_between_clear_cuts,
        )?;
        check_threshold(
            "max_days_between_clear_cuts",
            c.max_days_between_clear_cuts as f64,
        )?;
        check_threshold("dissolve_buffer", c.dissolve_buffer)?;
        check_threshold("min_clear_cut_area_hectare", f.min_clear_cut_area_hectare)?;
        check_threshold(
            "concave_hull_score_threshold",
            f.concave_hull_score_threshold,
        )?;

        if !(c.tile_size_m.is_finite() && c.tile_size_m > 0.0) {
            return Err(ConfigError::InvalidTileSize(c.tile_size_m));
        }
        if !(f.concave_hull_ratio > 0.0 && f.concave_hull_ratio <= 1.0) {
            return Err(ConfigError::InvalidHullRatio(f.concave_hull_ratio));
        }
        Ok(())
    }
}
