//! False-positive filters applied to dissolved clusters.
//!
//! - Shape complexity: `area / concave_hull_area` below a threshold means the
//!   outline wanders far from even a tight hull, which is what an erroneous
//!   merge of unrelated detections looks like
//! - Area: clusters smaller than the minimum clear-cut size are dropped and
//!   the survivors are sorted by ascending area

use geo::{Area, MultiPolygon};
use log::debug;
use rayon::prelude::*;
use thiserror::Error;

use super::hull::concave_hull_area;
use crate::core::types::Cluster;

/// Square meters per hectare.
const M2_PER_HECTARE: f64 = 10_000.0;

/// Errors that can occur while scoring a shape.
#[derive(Debug, Error, PartialEq)]
pub enum ShapeScoreError {
    /// The concave hull has no area, so the score would be NaN or infinite.
    #[error("concave hull has zero area, shape score is indeterminate")]
    Indeterminate,
}

/// Ratio of the geometry's area to the area of its concave hull.
///
/// Close to 1.0 for compact shapes; may slightly exceed 1.0 for convex ones.
///
/// # Errors
///
/// [`ShapeScoreError::Indeterminate`] when the hull area is zero or the ratio
/// is not finite.
pub fn concave_hull_score(geometry: &MultiPolygon<f64>, ratio: f64) -> Result<f64, ShapeScoreError> {
    let hull_area = concave_hull_area(geometry, ratio);
    if !(hull_area > 0.0) {
        return Err(ShapeScoreError::Indeterminate);
    }
    let score = geometry.unsigned_area() / hull_area;
    if score.is_finite() {
        Ok(score)
    } else {
        Err(ShapeScoreError::Indeterminate)
    }
}

/// Area of a geometry in hectares, assuming map units are meters.
#[inline]
pub fn area_hectares(geometry: &MultiPolygon<f64>) -> f64 {
    geometry.unsigned_area() / M2_PER_HECTARE
}

/// Clusters surviving the shape filter, with drop counts.
#[derive(Debug, Clone, Default)]
pub struct ShapeFilterResult {
    pub kept: Vec<Cluster>,
    /// Clusters scored below the threshold.
    pub dropped: usize,
    /// Clusters whose score could not be computed.
    pub indeterminate: usize,
}

/// Drop clusters whose concave hull score is below `threshold`.
///
/// Scores are computed in parallel and stored on the kept clusters.
/// Clusters with an indeterminate score are excluded.
pub fn filter_by_shape(clusters: Vec<Cluster>, ratio: f64, threshold: f64) -> ShapeFilterResult {
    let scored: Vec<(Cluster, Result<f64, ShapeScoreError>)> = clusters
        .into_par_iter()
        .map(|cluster| {
            let score = concave_hull_score(&cluster.geometry, ratio);
            (cluster, score)
        })
        .collect();

    let mut result = ShapeFilterResult::default();
    for (mut cluster, score) in scored {
        match score {
            Ok(score) if score >= threshold => {
                cluster.concave_hull_score = Some(score);
                result.kept.push(cluster);
            }
            Ok(score) => {
                debug!(
                    "cluster {}: concave hull score {:.3} below {:.3}, dropped",
                    cluster.id, score, threshold
                );
                result.dropped += 1;
            }
            Err(e) => {
                debug!("cluster {}: {}, dropped", cluster.id, e);
                result.indeterminate += 1;
            }
        }
    }
    result
}

/// Clusters surviving the area filter, sorted by ascending area.
#[derive(Debug, Clone, Default)]
pub struct AreaFilterResult {
    pub kept: Vec<Cluster>,
    pub dropped: usize,
}

/// Compute `area_ha` for every cluster, drop those below `min_area_ha`, and
/// sort the rest by ascending area (ties by cluster id).
pub fn filter_by_area(clusters: Vec<Cluster>, min_area_ha: f64) -> AreaFilterResult {
    let total = clusters.len();
    let mut kept: Vec<Cluster> = clusters
        .into_iter()
        .filter_map(|mut cluster| {
            let area = area_hectares(&cluster.geometry);
            cluster.area_ha = Some(area);
            (area >= min_area_ha).then_some(cluster)
        })
        .collect();

    kept.sort_by(|a, b| {
        let (a_area, b_area) = (a.area_ha.unwrap_or(0.0), b.area_ha.unwrap_or(0.0));
        a_area.total_cmp(&b_area).then(a.id.cmp(&b.id))
    });

    AreaFilterResult {
        dropped: total - kept.len(),
        kept,
    }
}
