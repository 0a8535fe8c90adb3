//! Data processing modules.

pub mod clustering;
pub mod disjoint_set;
pub mod filtering;
pub mod hull;
pub mod pairing;
pub mod polygonize;

// Re-export key types for convenience
pub use clustering::{cluster_polygons, merge_clusters, process_raster, ClusterReport};
pub use disjoint_set::{DisjointSet, DisjointSetError};
pub use filtering::{
    concave_hull_score, filter_by_area, filter_by_shape, AreaFilterResult, ShapeFilterResult,
    ShapeScoreError,
};
pub use pairing::{find_candidate_pairs, CandidatePair};
pub use polygonize::{polygonize, polygonize_raster, regions_to_polygons};
