//! Grouping of detections into clear-cut events.
//!
//! A clustering pass runs four stages over the dated polygons of one raster:
//!
//! 1. **Pair**: spatio-temporal candidate pairs from [`find_candidate_pairs`]
//! 2. **Group**: every polygon is added to a [`DisjointSet`] and each pair is
//!    merged, so chains of nearby detections end up in one subset
//! 3. **Dissolve** (parallel per subset): member outlines are unioned and the
//!    dates summarised
//! 4. **Filter**: shape complexity first, then minimum area
//!
//! # Example
//!
//! ```no_run
//! use clearcut_clusters::config::PipelineConfig;
//! use clearcut_clusters::processors::clustering::process_raster;
//! use std::path::Path;
//!
//! let config = PipelineConfig::default();
//! let report = process_raster(
//!     Path::new("detections.asc"),
//!     Path::new("clusters.geojson"),
//!     None,
//!     &config,
//! )
//! .unwrap();
//! println!("{} clusters kept", report.survivors);
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use geo::{BooleanOps, Buffer, MultiPolygon};
use log::info;
use rayon::prelude::*;
use serde::Serialize;

use super::disjoint_set::{DisjointSet, DisjointSetError};
use super::filtering::{filter_by_area, filter_by_shape};
use super::pairing::find_candidate_pairs;
use super::polygonize::{polygonize, regions_to_polygons};
use crate::config::PipelineConfig;
use crate::core::dates::days_between;
use crate::core::loaders::load_raster;
use crate::core::types::{Cluster, PolygonId, RawPolygon};
use crate::core::writers::{write_clusters_csv, write_clusters_geojson};

/// Counts collected over one clustering pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClusterReport {
    pub raw_polygons: usize,
    pub candidate_pairs: usize,
    pub clusters: usize,
    pub dropped_by_shape: usize,
    pub indeterminate_shape: usize,
    pub dropped_by_area: usize,
    pub survivors: usize,
}

/// Union of all geometries, reduced pairwise so each union works on inputs
/// of similar size.
fn dissolve(parts: Vec<MultiPolygon<f64>>) -> MultiPolygon<f64> {
    let mut layer = parts;
    while layer.len() > 1 {
        layer = layer
            .chunks(2)
            .map(|pair| match pair {
                [a, b] => a.union(b),
                [a] => a.clone(),
                _ => MultiPolygon::new(vec![]),
            })
            .collect();
    }
    layer.pop().unwrap_or_else(|| MultiPolygon::new(vec![]))
}

/// Dissolve each subset into one cluster.
///
/// Cluster ids follow the order of `subsets`. A positive `dissolve_buffer`
/// is applied to the dissolved outline to close slivers between members.
///
/// # Errors
///
/// [`DisjointSetError::UnknownElement`] if a subset names a polygon that is
/// not in `polygons`.
pub fn merge_clusters(
    polygons: &[RawPolygon],
    subsets: &[Vec<PolygonId>],
    dissolve_buffer: f64,
) -> Result<Vec<Cluster>, DisjointSetError> {
    let by_id: HashMap<PolygonId, &RawPolygon> = polygons.iter().map(|p| (p.id, p)).collect();

    subsets
        .par_iter()
        .enumerate()
        .map(|(id, members)| -> Result<Cluster, DisjointSetError> {
            let members: Vec<&RawPolygon> = members
                .iter()
                .map(|m| {
                    by_id
                        .get(m)
                        .copied()
                        .ok_or_else(|| DisjointSetError::UnknownElement(m.to_string()))
                })
                .collect::<Result<_, _>>()?;

            let dates = members.iter().map(|p| p.date);
            let date_min = dates.clone().min().unwrap_or(NaiveDate::MIN);
            let date_max = dates.max().unwrap_or(NaiveDate::MIN);

            let mut geometry = dissolve(members.iter().map(|p| p.geometry.clone()).collect());
            if dissolve_buffer > 0.0 {
                geometry = geometry.buffer(dissolve_buffer);
            }

            let mut ids: Vec<PolygonId> = members.iter().map(|p| p.id).collect();
            ids.sort_unstable();

            Ok(Cluster {
                id,
                member_count: ids.len(),
                members: ids,
                geometry,
                date_min,
                date_max,
                days_delta: days_between(date_min, date_max),
                area_ha: None,
                concave_hull_score: None,
            })
        })
        .collect()
}

/// Run pairing, grouping, dissolving and filtering over dated polygons.
///
/// Returns the surviving clusters sorted by ascending area.
///
/// # Errors
///
/// Only fails if the polygon ids are inconsistent with the grouping, which
/// indicates duplicated ids in `polygons`.
pub fn cluster_polygons(
    polygons: &[RawPolygon],
    config: &PipelineConfig,
) -> Result<(Vec<Cluster>, ClusterReport), DisjointSetError> {
    let c = &config.clustering;
    let f = &config.filtering;
    let mut report = ClusterReport {
        raw_polygons: polygons.len(),
        ..Default::default()
    };

    let pairs = find_candidate_pairs(
        polygons,
        c.max_meters_between_clear_cuts,
        c.max_days_between_clear_cuts,
        c.tile_size_m,
    );
    report.candidate_pairs = pairs.len();

    let mut groups: DisjointSet<PolygonId> = polygons.iter().map(|p| p.id).collect();
    for pair in &pairs {
        groups.merge(pair.left, pair.right)?;
    }
    let subsets = groups.subsets();

    let clusters = merge_clusters(polygons, &subsets, c.dissolve_buffer)?;
    report.clusters = clusters.len();
    info!(
        "{} polygons grouped into {} clusters",
        report.raw_polygons, report.clusters
    );

    let shaped = filter_by_shape(
        clusters,
        f.concave_hull_ratio,
        f.concave_hull_score_threshold,
    );
    report.dropped_by_shape = shaped.dropped;
    report.indeterminate_shape = shaped.indeterminate;

    let sized = filter_by_area(shaped.kept, f.min_clear_cut_area_hectare);
    report.dropped_by_area = sized.dropped;
    report.survivors = sized.kept.len();

    info!(
        "filters: {} dropped by shape ({} indeterminate), {} dropped by area, {} kept",
        report.dropped_by_shape, report.indeterminate_shape, report.dropped_by_area, report.survivors
    );
    Ok((sized.kept, report))
}

/// Full pass from a detection raster to a cluster layer.
///
/// Writes the surviving clusters as GeoJSON to `output` and, when given, the
/// attribute table as CSV to `csv_output`.
///
/// # Errors
///
/// Returns an error if the raster cannot be read, a pixel value is not a
/// valid date code, or an output cannot be written.
pub fn process_raster(
    input: &Path,
    output: &Path,
    csv_output: Option<&Path>,
    config: &PipelineConfig,
) -> anyhow::Result<ClusterReport> {
    let raster = load_raster(input, &config.raster)
        .with_context(|| format!("loading {}", input.display()))?;

    let polygons = regions_to_polygons(polygonize(&raster))
        .with_context(|| format!("decoding dates of {}", input.display()))?;

    let (clusters, report) = cluster_polygons(&polygons, config)?;

    write_clusters_geojson(output, &clusters, raster.crs.as_ref())?;
    info!("Clusters GeoJSON -> {}", output.display());

    if let Some(csv_path) = csv_output {
        write_clusters_csv(csv_path, &clusters)?;
        info!("Clusters CSV -> {}", csv_path.display());
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Area};
    use std::fs;
    use tempfile::tempdir;

    fn square(id: usize, x: f64, size: f64, date: (i32, u32, u32)) -> RawPolygon {
        RawPolygon {
            id: PolygonId(id),
            geometry: MultiPolygon::new(vec![polygon![
                (x: x, y: 0.0),
                (x: x + size, y: 0.0),
                (x: x + size, y: size),
                (x: x, y: size),
            ]]),
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            date_code: 0,
        }
    }

    /// A, B and D form a chain of nearby detections, C is small and isolated.
    fn scenario() -> Vec<RawPolygon> {
        vec![
            square(0, 0.0, 100.0, (2020, 6, 1)),
            square(1, 120.0, 100.0, (2020, 6, 20)),
            square(2, 1000.0, 30.0, (2020, 6, 1)),
            square(3, 240.0, 100.0, (2020, 7, 10)),
        ]
    }

    #[test]
    fn test_dissolve_touching_squares() {
        let parts = vec![
            square(0, 0.0, 10.0, (2020, 1, 1)).geometry,
            square(1, 10.0, 10.0, (2020, 1, 1)).geometry,
            square(2, 20.0, 10.0, (2020, 1, 1)).geometry,
        ];
        let merged = dissolve(parts);
        assert_eq!(merged.0.len(), 1);
        assert!((merged.unsigned_area() - 300.0).abs() < 1e-9);
    }

    #[test]
    fn test_dissolve_empty() {
        assert!(dissolve(vec![]).0.is_empty());
    }

    #[test]
    fn test_merge_clusters_summarises_dates() {
        let polygons = scenario();
        let subsets = vec![
            vec![PolygonId(0), PolygonId(1), PolygonId(3)],
            vec![PolygonId(2)],
        ];
        let clusters = merge_clusters(&polygons, &subsets, 0.0).unwrap();

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].id, 0);
        assert_eq!(clusters[0].member_count, 3);
        assert_eq!(clusters[0].date_min, NaiveDate::from_ymd_opt(2020, 6, 1).unwrap());
        assert_eq!(clusters[0].date_max, NaiveDate::from_ymd_opt(2020, 7, 10).unwrap());
        assert_eq!(clusters[0].days_delta, 39);
        assert!((clusters[0].geometry.unsigned_area() - 30_000.0).abs() < 1e-6);

        assert_eq!(clusters[1].id, 1);
        assert_eq!(clusters[1].days_delta, 0);
        assert_eq!(clusters[1].members, vec![PolygonId(2)]);
    }

    #[test]
    fn test_merge_clusters_applies_buffer() {
        let polygons = vec![square(0, 0.0, 10.0, (2020, 1, 1))];
        let clusters = merge_clusters(&polygons, &[vec![PolygonId(0)]], 0.5).unwrap();
        assert!(clusters[0].geometry.unsigned_area() > 100.0);
    }

    #[test]
    fn test_buffer_closes_micro_gap() {
        // Two detections separated by a sliver narrower than the buffer
        let polygons = vec![
            square(0, 0.0, 10.0, (2020, 1, 1)),
            square(1, 10.00005, 10.0, (2020, 1, 2)),
        ];
        let subsets = vec![vec![PolygonId(0), PolygonId(1)]];

        let unbuffered = merge_clusters(&polygons, &subsets, 0.0).unwrap();
        assert_eq!(unbuffered[0].geometry.0.len(), 2);

        let buffered = merge_clusters(&polygons, &subsets, 0.0001).unwrap();
        assert_eq!(buffered[0].geometry.0.len(), 1);
        assert!((buffered[0].geometry.unsigned_area() - 200.0).abs() < 0.01);
    }

    #[test]
    fn test_merge_clusters_unknown_member() {
        let polygons = scenario();
        let result = merge_clusters(&polygons, &[vec![PolygonId(42)]], 0.0);
        assert_eq!(
            result.unwrap_err(),
            DisjointSetError::UnknownElement("42".to_string())
        );
    }

    #[test]
    fn test_cluster_polygons_scenario() {
        let polygons = scenario();
        let config = PipelineConfig::default();
        let (clusters, report) = cluster_polygons(&polygons, &config).unwrap();

        assert_eq!(report.raw_polygons, 4);
        assert_eq!(report.candidate_pairs, 2);
        assert_eq!(report.clusters, 2);
        assert_eq!(report.dropped_by_shape, 0);
        assert_eq!(report.dropped_by_area, 1);
        assert_eq!(report.survivors, 1);

        let cluster = &clusters[0];
        assert_eq!(cluster.id, 0);
        assert_eq!(cluster.members, vec![PolygonId(0), PolygonId(1), PolygonId(3)]);
        assert_eq!(cluster.days_delta, 39);
        let area = cluster.area_ha.unwrap();
        assert!((area - 3.0).abs() < 0.01, "area {}", area);
    }

    #[test]
    fn test_every_polygon_lands_in_one_cluster() {
        let polygons = scenario();
        let mut config = PipelineConfig::default();
        config.filtering.min_clear_cut_area_hectare = 0.0;
        config.filtering.concave_hull_score_threshold = 0.0;
        let (clusters, report) = cluster_polygons(&polygons, &config).unwrap();

        assert_eq!(report.survivors, 2);
        let total: usize = clusters.iter().map(|c| c.member_count).sum();
        assert_eq!(total, polygons.len());
        // sorted by ascending area
        assert!(clusters[0].area_ha.unwrap() <= clusters[1].area_ha.unwrap());
    }

    #[test]
    fn test_time_threshold_splits_chain() {
        let polygons = scenario();
        let mut config = PipelineConfig::default();
        config.clustering.max_days_between_clear_cuts = 10;
        config.filtering.min_clear_cut_area_hectare = 0.0;
        let (clusters, report) = cluster_polygons(&polygons, &config).unwrap();

        assert_eq!(report.candidate_pairs, 0);
        assert_eq!(clusters.len(), 4);
        assert!(clusters.iter().all(|c| c.member_count == 1));
    }

    #[test]
    fn test_process_raster_end_to_end() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("dates.asc");
        let output = dir.path().join("out").join("clusters.geojson");
        let csv = dir.path().join("out").join("clusters.csv");

        // A 2x2 block touching a single pixel at a corner, plus an isolated pixel
        fs::write(
            &input,
            "ncols 6\n\
             nrows 3\n\
             xllcorner 0\n\
             yllcorner 0\n\
             cellsize 50\n\
             NODATA_value 0\n\
             20150 20150 0 0 0 20160\n\
             20150 20150 0 0 0 0\n\
             0 0 20170 0 0 0\n",
        )
        .unwrap();

        let config = PipelineConfig::default();
        let report = process_raster(&input, &output, Some(&csv), &config).unwrap();

        assert_eq!(report.raw_polygons, 3);
        assert_eq!(report.candidate_pairs, 1);
        assert_eq!(report.clusters, 2);
        assert_eq!(report.dropped_by_area, 1);
        assert_eq!(report.survivors, 1);

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        let features = json["features"].as_array().unwrap();
        assert_eq!(features.len(), 1);
        let props = &features[0]["properties"];
        assert_eq!(props["member_count"], 2);
        assert_eq!(props["days_delta"], 20);
        assert_eq!(props["date_min"], "2020-05-29");
        let area = props["area_ha"].as_f64().unwrap();
        assert!((area - 1.25).abs() < 0.01, "area {}", area);

        let table = fs::read_to_string(&csv).unwrap();
        assert_eq!(table.lines().count(), 2);
    }

    #[test]
    fn test_process_raster_unreadable_input() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.asc");
        let output = dir.path().join("clusters.geojson");
        let result = process_raster(&missing, &output, None, &PipelineConfig::default());
        assert!(result.is_err());
        assert!(!output.exists());
    }
}
