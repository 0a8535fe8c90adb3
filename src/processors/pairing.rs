//! Spatio-temporal candidate pairs between detection polygons.
//!
//! Two polygons are candidates when the gap between them is at most the
//! distance threshold (a "within distance" join, not "intersects") and their
//! dates differ by at most the time threshold.
//!
//! # Algorithm (Parallelized)
//!
//! 1. **Index**: bulk-load every polygon envelope into an R-tree
//! 2. **Partition**: bucket polygons into square tiles by envelope centre
//! 3. **Join** (parallel per tile): query the tree with each envelope grown by
//!    the distance threshold, then confirm with the exact polygon distance
//! 4. **Reconcile**: keep only `left < right` pairs, which removes self pairs
//!    and the mirrored copy found from the other polygon's tile, then apply
//!    the time threshold

use std::collections::HashMap;

use chrono::NaiveDate;
use geo::{BoundingRect, Distance, Euclidean, MultiPolygon};
use log::info;
use rayon::prelude::*;
use rstar::{Envelope, RTree, RTreeObject, AABB};

use crate::core::dates::days_between;
use crate::core::types::{PolygonId, RawPolygon};

/// An unordered pair of nearby detections, stored with `left < right`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CandidatePair {
    pub left: PolygonId,
    pub right: PolygonId,
    pub left_date: NaiveDate,
    pub right_date: NaiveDate,
}

impl CandidatePair {
    /// Absolute date difference in days.
    #[inline]
    pub fn days_apart(&self) -> i64 {
        days_between(self.left_date, self.right_date)
    }
}

/// Envelope for R-tree spatial indexing
#[derive(Debug, Clone, Copy)]
struct PolygonEnvelope {
    aabb: AABB<[f64; 2]>,
    index: usize,
}

impl RTreeObject for PolygonEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

fn envelope_of(geometry: &MultiPolygon<f64>) -> Option<AABB<[f64; 2]>> {
    let rect = geometry.bounding_rect()?;
    Some(AABB::from_corners(
        [rect.min().x, rect.min().y],
        [rect.max().x, rect.max().y],
    ))
}

fn grow(aabb: &AABB<[f64; 2]>, by: f64) -> AABB<[f64; 2]> {
    let (lo, hi) = (aabb.lower(), aabb.upper());
    AABB::from_corners([lo[0] - by, lo[1] - by], [hi[0] + by, hi[1] + by])
}

/// Minimum Euclidean gap between two multipolygons (zero if they touch).
pub fn polygon_gap(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> f64 {
    let mut best = f64::INFINITY;
    for pa in &a.0 {
        for pb in &b.0 {
            let d = Euclidean.distance(pa, pb);
            if d < best {
                best = d;
                if best == 0.0 {
                    return best;
                }
            }
        }
    }
    best
}

/// Ordered pairs `(i, j)`, `i != j`, of polygon indices whose gap is within
/// `max_distance`. Both orientations of a pair are returned.
fn within_distance_join(
    polygons: &[RawPolygon],
    max_distance: f64,
    tile_size: f64,
) -> Vec<(usize, usize)> {
    let envelopes: Vec<PolygonEnvelope> = polygons
        .iter()
        .enumerate()
        .filter_map(|(index, p)| envelope_of(&p.geometry).map(|aabb| PolygonEnvelope { aabb, index }))
        .collect();

    let mut tiles: HashMap<(i64, i64), Vec<PolygonEnvelope>> = HashMap::new();
    for env in &envelopes {
        let centre = env.aabb.center();
        let key = (
            (centre[0] / tile_size).floor() as i64,
            (centre[1] / tile_size).floor() as i64,
        );
        tiles.entry(key).or_default().push(*env);
    }

    let tree = RTree::bulk_load(envelopes);

    tiles
        .into_par_iter()
        .flat_map_iter(|(_, members)| {
            let tree = &tree;
            members.into_iter().flat_map(move |env| {
                let query = grow(&env.aabb, max_distance);
                tree.locate_in_envelope_intersecting(&query)
                    .filter(move |cand| cand.index != env.index)
                    .filter(move |cand| {
                        polygon_gap(&polygons[env.index].geometry, &polygons[cand.index].geometry)
                            <= max_distance
                    })
                    .map(move |cand| (env.index, cand.index))
                    .collect::<Vec<_>>()
            })
        })
        .collect()
}

/// Find every pair of polygons within `max_distance` map units and
/// `max_days` days of each other.
///
/// Returned pairs are sorted, canonical (`left < right`) and unique.
pub fn find_candidate_pairs(
    polygons: &[RawPolygon],
    max_distance: f64,
    max_days: i64,
    tile_size: f64,
) -> Vec<CandidatePair> {
    let ordered = within_distance_join(polygons, max_distance, tile_size);
    let spatial_count = ordered.len();

    let mut pairs: Vec<CandidatePair> = ordered
        .into_iter()
        .filter(|&(i, j)| polygons[i].id < polygons[j].id)
        .map(|(i, j)| CandidatePair {
            left: polygons[i].id,
            right: polygons[j].id,
            left_date: polygons[i].date,
            right_date: polygons[j].date,
        })
        .filter(|pair| pair.days_apart() <= max_days)
        .collect();

    pairs.sort_unstable();
    pairs.dedup();

    info!(
        "{} polygons: {} ordered spatial matches, {} candidate pairs within {} days",
        polygons.len(),
        spatial_count,
        pairs.len(),
        max_days
    );
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon};

    fn square(id: usize, x: f64, y: f64, size: f64, date: (i32, u32, u32)) -> RawPolygon {
        RawPolygon {
            id: PolygonId(id),
            geometry: MultiPolygon::new(vec![polygon![
                (x: x, y: y),
                (x: x + size, y: y),
                (x: x + size, y: y + size),
                (x: x, y: y + size),
            ]]),
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            date_code: 0,
        }
    }

    fn ids(pairs: &[CandidatePair]) -> Vec<(usize, usize)> {
        pairs.iter().map(|p| (p.left.0, p.right.0)).collect()
    }

    #[test]
    fn test_polygon_gap() {
        let a = square(0, 0.0, 0.0, 10.0, (2020, 1, 1));
        let b = square(1, 15.0, 0.0, 10.0, (2020, 1, 1));
        let c = square(2, 5.0, 5.0, 10.0, (2020, 1, 1));
        assert!((polygon_gap(&a.geometry, &b.geometry) - 5.0).abs() < 1e-9);
        assert_eq!(polygon_gap(&a.geometry, &c.geometry), 0.0);
    }

    #[test]
    fn test_within_distance_not_just_intersects() {
        let polygons = vec![
            square(0, 0.0, 0.0, 10.0, (2020, 1, 1)),
            square(1, 14.0, 0.0, 10.0, (2020, 1, 5)),
            square(2, 100.0, 0.0, 10.0, (2020, 1, 5)),
        ];
        let pairs = find_candidate_pairs(&polygons, 5.0, 30, 1000.0);
        assert_eq!(ids(&pairs), vec![(0, 1)]);
        assert_eq!(pairs[0].days_apart(), 4);
    }

    #[test]
    fn test_time_threshold() {
        let polygons = vec![
            square(0, 0.0, 0.0, 10.0, (2020, 1, 1)),
            square(1, 10.0, 0.0, 10.0, (2020, 3, 1)),
            square(2, 0.0, 10.0, 10.0, (2020, 1, 31)),
        ];
        let pairs = find_candidate_pairs(&polygons, 1.0, 30, 1000.0);
        // 0-1: 60 days, 1-2: 30 days (corner contact), 0-2: 30 days
        assert_eq!(ids(&pairs), vec![(0, 2), (1, 2)]);
        for pair in &pairs {
            assert!(pair.days_apart() <= 30);
        }
    }

    #[test]
    fn test_pairs_are_canonical_across_tiles() {
        // Tiny tiles force every polygon into its own tile
        let polygons: Vec<RawPolygon> = (0..6)
            .map(|i| square(i, i as f64 * 10.0, 0.0, 10.0, (2021, 6, 1)))
            .collect();
        let pairs = find_candidate_pairs(&polygons, 0.5, 0, 5.0);

        assert_eq!(ids(&pairs), vec![(0, 1), (1, 2), (2, 3), (3, 4), (4, 5)]);
        for pair in &pairs {
            assert!(pair.left < pair.right);
            assert!(!pairs
                .iter()
                .any(|other| other.left == pair.right && other.right == pair.left));
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(find_candidate_pairs(&[], 10.0, 10, 100.0).is_empty());
    }

    #[test]
    fn test_empty_geometry_is_skipped() {
        let mut empty = square(1, 0.0, 0.0, 1.0, (2020, 1, 1));
        empty.geometry = MultiPolygon::new(vec![]);
        let polygons = vec![square(0, 0.0, 0.0, 1.0, (2020, 1, 1)), empty];
        assert!(find_candidate_pairs(&polygons, 10.0, 10, 100.0).is_empty());
    }
}
