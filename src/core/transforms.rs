//! Pixel-to-map coordinate transforms and ring helpers.
//!
//! Rasters are addressed in pixel-corner space: column `c`, row `r` names the
//! top-left corner of pixel `(c, r)`, with rows increasing downward. The
//! [`GeoTransform`] maps that space onto the map plane.

use geo::{Coord, LineString};
use serde::{Deserialize, Serialize};

/// Affine transform from pixel-corner coordinates to map coordinates.
///
/// Same layout as the classic six-coefficient GDAL transform:
/// `x = origin_x + col * pixel_width + row * row_rotation`,
/// `y = origin_y + col * col_rotation + row * pixel_height`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub pixel_width: f64,
    pub row_rotation: f64,
    pub origin_y: f64,
    pub col_rotation: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform with square pixels anchored at the top-left corner.
    pub fn north_up(origin_x: f64, origin_y: f64, cell_size: f64) -> Self {
        Self {
            origin_x,
            pixel_width: cell_size,
            row_rotation: 0.0,
            origin_y,
            col_rotation: 0.0,
            pixel_height: -cell_size,
        }
    }

    /// Map a pixel-corner position to map coordinates.
    #[inline]
    pub fn apply(&self, col: f64, row: f64) -> Coord<f64> {
        Coord {
            x: self.origin_x + col * self.pixel_width + row * self.row_rotation,
            y: self.origin_y + col * self.col_rotation + row * self.pixel_height,
        }
    }
}

impl Default for GeoTransform {
    /// Identity-like transform: one map unit per pixel, rows going down.
    fn default() -> Self {
        Self::north_up(0.0, 0.0, 1.0)
    }
}

/// Drop vertices that lie on a straight run between their neighbours.
///
/// `ring` is a closed ring of integer pixel-corner vertices without the
/// repeated closing vertex. Staircase boundaries keep their corners only.
pub fn drop_collinear(ring: &[(i64, i64)]) -> Vec<(i64, i64)> {
    let n = ring.len();
    if n < 4 {
        return ring.to_vec();
    }

    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let prev = ring[(i + n - 1) % n];
        let cur = ring[i];
        let next = ring[(i + 1) % n];
        let cross = (cur.0 - prev.0) * (next.1 - cur.1) - (cur.1 - prev.1) * (next.0 - cur.0);
        if cross != 0 {
            out.push(cur);
        }
    }
    out
}

/// Twice the signed area of an open integer ring (shoelace formula).
pub fn signed_area2(ring: &[(i64, i64)]) -> i64 {
    let n = ring.len();
    (0..n)
        .map(|i| {
            let (x0, y0) = ring[i];
            let (x1, y1) = ring[(i + 1) % n];
            x0 * y1 - x1 * y0
        })
        .sum()
}

/// Convert an open pixel-corner ring into a closed map-space [`LineString`].
pub fn ring_to_map(ring: &[(i64, i64)], transform: &GeoTransform) -> LineString<f64> {
    let mut coords: Vec<Coord<f64>> = ring
        .iter()
        .map(|&(c, r)| transform.apply(c as f64, r as f64))
        .collect();
    if let Some(&first) = coords.first() {
        coords.push(first);
    }
    LineString::new(coords)
}
