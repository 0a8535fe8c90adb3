//! Writers for cluster and polygon layers.
//!
//! - GeoJSON `FeatureCollection` of dissolved clusters, with a named CRS
//!   member when the raster's CRS is an EPSG code
//! - GeoJSON layer of raw dated polygons
//! - CSV attribute table of clusters

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use geo::MultiPolygon;
use geojson::feature::Id;
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, Value as GeoValue};
use serde_json::{json, Map as JsonMap, Value as JsonValue};
use thiserror::Error;

use super::loaders::Crs;
use super::types::{Cluster, RawPolygon};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Attribute columns shared by the GeoJSON and CSV cluster outputs.
const CLUSTER_COLUMNS: [&str; 6] = [
    "id",
    "date_min",
    "date_max",
    "days_delta",
    "member_count",
    "area_ha",
];

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{}': {source}", path.display())]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{}': {source}", path.display())]
    CreateFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{}': {source}", path.display())]
    WriteFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{}': {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// GeoJSON serialization error.
    #[error("GeoJSON write error for '{}': {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

fn write_failed(path: &Path) -> impl FnOnce(io::Error) -> WriteError + '_ {
    move |source| WriteError::WriteFile {
        path: path.to_path_buf(),
        source,
    }
}

fn csv_failed(path: &Path) -> impl FnOnce(csv::Error) -> WriteError + '_ {
    move |source| WriteError::Csv {
        path: path.to_path_buf(),
        source,
    }
}

/// Create the output file, and its missing parent directories, behind a buffer.
fn create_output(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| WriteError::CreateDirectory {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let file = File::create(path).map_err(|source| WriteError::CreateFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufWriter::new(file))
}

/// GeoJSON geometry for a multipolygon.
pub fn multipolygon_to_geojson(geometry: &MultiPolygon<f64>) -> Geometry {
    Geometry::new(GeoValue::from(geometry))
}

fn feature(id: usize, geometry: &MultiPolygon<f64>, properties: JsonMap<String, JsonValue>) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(multipolygon_to_geojson(geometry)),
        id: Some(Id::Number(id.into())),
        properties: Some(properties),
        foreign_members: None,
    }
}

fn cluster_properties(cluster: &Cluster) -> JsonMap<String, JsonValue> {
    let mut props = JsonMap::new();
    props.insert("id".to_string(), json!(cluster.id));
    props.insert(
        "date_min".to_string(),
        json!(cluster.date_min.format(DATE_FORMAT).to_string()),
    );
    props.insert(
        "date_max".to_string(),
        json!(cluster.date_max.format(DATE_FORMAT).to_string()),
    );
    props.insert("days_delta".to_string(), json!(cluster.days_delta));
    props.insert("member_count".to_string(), json!(cluster.member_count));
    props.insert("area_ha".to_string(), json!(cluster.area_ha));
    props
}

/// Named CRS member (`urn:ogc:def:crs:EPSG::<code>`), only for EPSG codes.
fn crs_member(crs: Option<&Crs>) -> Option<JsonMap<String, JsonValue>> {
    let urn = crs.and_then(Crs::ogc_urn)?;
    let mut members = JsonMap::new();
    members.insert(
        "crs".to_string(),
        json!({ "type": "name", "properties": { "name": urn } }),
    );
    Some(members)
}

fn write_feature_collection(path: &Path, features: Vec<Feature>, crs: Option<&Crs>) -> Result<()> {
    let collection = GeoJson::FeatureCollection(FeatureCollection {
        bbox: None,
        features,
        foreign_members: crs_member(crs),
    });

    let mut writer = create_output(path)?;
    serde_json::to_writer(&mut writer, &collection).map_err(|source| WriteError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    writeln!(writer).map_err(write_failed(path))?;
    writer.flush().map_err(write_failed(path))
}

/// Write clusters as a GeoJSON `FeatureCollection`.
///
/// Each feature carries the properties `id`, `date_min`, `date_max`,
/// `days_delta`, `member_count` and `area_ha` (null if the area filter has
/// not run). Dates are written as `YYYY-MM-DD`.
///
/// # Errors
///
/// Returns an error if:
/// - Parent directories cannot be created
/// - File cannot be created or written to
pub fn write_clusters_geojson(path: &Path, clusters: &[Cluster], crs: Option<&Crs>) -> Result<()> {
    let features = clusters
        .iter()
        .map(|cluster| feature(cluster.id, &cluster.geometry, cluster_properties(cluster)))
        .collect();
    write_feature_collection(path, features, crs)
}

/// Write raw dated polygons as a GeoJSON `FeatureCollection` with the
/// properties `id`, `date` and `date_code`.
pub fn write_polygons_geojson(path: &Path, polygons: &[RawPolygon], crs: Option<&Crs>) -> Result<()> {
    let features = polygons
        .iter()
        .map(|polygon| {
            let mut props = JsonMap::new();
            props.insert("id".to_string(), json!(polygon.id.0));
            props.insert(
                "date".to_string(),
                json!(polygon.date.format(DATE_FORMAT).to_string()),
            );
            props.insert("date_code".to_string(), json!(polygon.date_code));
            feature(polygon.id.0, &polygon.geometry, props)
        })
        .collect();
    write_feature_collection(path, features, crs)
}

/// Write the cluster attribute table to CSV.
///
/// Columns match the GeoJSON properties; `area_ha` is written with four
/// decimals and left empty when unset.
pub fn write_clusters_csv(path: &Path, clusters: &[Cluster]) -> Result<()> {
    let mut table = csv::Writer::from_writer(create_output(path)?);
    table.write_record(CLUSTER_COLUMNS).map_err(csv_failed(path))?;

    for cluster in clusters {
        table
            .write_record(&[
                cluster.id.to_string(),
                cluster.date_min.format(DATE_FORMAT).to_string(),
                cluster.date_max.format(DATE_FORMAT).to_string(),
                cluster.days_delta.to_string(),
                cluster.member_count.to_string(),
                cluster
                    .area_ha
                    .map(|a| format!("{:.4}", a))
                    .unwrap_or_default(),
            ])
            .map_err(csv_failed(path))?;
    }

    table.flush().map_err(write_failed(path))
}
