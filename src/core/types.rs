//! Geometry records flowing through the clustering pass.

use std::fmt;

use chrono::NaiveDate;
use geo::MultiPolygon;

/// Stable identifier of a raw detection polygon.
///
/// Assigned in emission order by the polygonizer and never reused within a
/// pass, so it doubles as the insertion key of the disjoint set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PolygonId(pub usize);

impl fmt::Display for PolygonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An 8-connected group of equal raster values, before date decoding.
#[derive(Debug, Clone)]
pub struct PixelRegion {
    /// Raster value shared by every pixel of the region.
    pub value: i64,
    /// Region outline in map coordinates.
    pub geometry: MultiPolygon<f64>,
    /// Number of pixels in the region.
    pub pixel_count: usize,
}

/// A single dated detection polygon.
#[derive(Debug, Clone)]
pub struct RawPolygon {
    pub id: PolygonId,
    pub geometry: MultiPolygon<f64>,
    pub date: NaiveDate,
    /// Original `YYDDD` raster value.
    pub date_code: i64,
}

/// A group of detections merged into one clear-cut event.
#[derive(Debug, Clone)]
pub struct Cluster {
    /// Stable identifier, assigned before any filtering.
    pub id: usize,
    /// Identifiers of the merged raw polygons, ascending.
    pub members: Vec<PolygonId>,
    /// Dissolved outline of all members.
    pub geometry: MultiPolygon<f64>,
    pub date_min: NaiveDate,
    pub date_max: NaiveDate,
    /// `date_max - date_min` in days.
    pub days_delta: i64,
    pub member_count: usize,
    /// Area in hectares, set by the area filter.
    pub area_ha: Option<f64>,
    /// Area over concave hull area, set by the shape filter.
    pub concave_hull_score: Option<f64>,
}
