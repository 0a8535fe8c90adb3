//! Spatio-temporal clustering of clear-cut detections.
//!
//! This crate provides tools for:
//! - Loading single-band rasters of `YYDDD` detection dates (ESRI ASCII grid, GeoTIFF)
//! - Polygonizing them into dated polygons with 8-connectivity
//! - Pairing polygons that are close in space and time (parallel R-tree join)
//! - Grouping pairs transitively with a disjoint set and dissolving each group
//! - Dropping implausible groups by shape complexity and minimum area
//!
//! # Example
//!
//! ```no_run
//! use clearcut_clusters::{core::loaders::load_raster, processors::polygonize, PipelineConfig};
//! use clearcut_clusters::processors::clustering::cluster_polygons;
//!
//! let config = PipelineConfig::default();
//! let raster = load_raster("detections.tif", &config.raster).unwrap();
//! let polygons = polygonize::regions_to_polygons(polygonize::polygonize(&raster)).unwrap();
//! let (clusters, report) = cluster_polygons(&polygons, &config).unwrap();
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;

pub use config::{ClusteringConfig, FilteringConfig, PipelineConfig, RasterConfig};
pub use core::types::{Cluster, PolygonId, RawPolygon};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
