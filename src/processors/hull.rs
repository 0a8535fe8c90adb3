//! Concave hull area controlled by an edge-length ratio.
//!
//! The hull starts as the Delaunay triangulation of every vertex of the
//! geometry (whose outline is the convex hull). Border triangles are then
//! eroded, longest border edge first, while that edge is longer than
//!
//! `min_edge + ratio * (max_edge - min_edge)`
//!
//! taken over all triangulation edges. A triangle is only eroded when it has
//! a single border edge and its opposite vertex is not yet on the border, so
//! the hull stays one simple region. With `ratio = 1` nothing is eroded and
//! the result is the convex hull; smaller ratios follow the outline closer.
//!
//! Only the hull area is needed downstream, so no outline is assembled.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use geo::{Area, ConvexHull, Coord, MultiPolygon, TriangulateDelaunay};
use log::warn;

type EdgeKey = (usize, usize);

#[inline]
fn edge_key(a: usize, b: usize) -> EdgeKey {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

#[inline]
fn coord_key(c: &Coord<f64>) -> (u64, u64) {
    (c.x.to_bits(), c.y.to_bits())
}

/// Area of the ratio-controlled concave hull of `geometry`.
///
/// `ratio` is clamped to `[0, 1]`. Returns `0.0` when the geometry has fewer
/// than three distinct vertices or they are all collinear.
pub fn concave_hull_area(geometry: &MultiPolygon<f64>, ratio: f64) -> f64 {
    let ratio = ratio.clamp(0.0, 1.0);
    if ratio >= 1.0 {
        return geometry.convex_hull().unsigned_area();
    }

    let triangles = match geometry.unconstrained_triangulation() {
        Ok(triangles) => triangles,
        Err(e) => {
            warn!("triangulation failed ({:?}), falling back to convex hull", e);
            return geometry.convex_hull().unsigned_area();
        }
    };
    if triangles.is_empty() {
        return 0.0;
    }

    // Vertex ids for every distinct triangulation coordinate
    let mut vertex_ids: HashMap<(u64, u64), usize> = HashMap::new();
    let mut vertices: Vec<Coord<f64>> = Vec::new();
    let mut tris: Vec<[usize; 3]> = Vec::with_capacity(triangles.len());
    let mut areas: Vec<f64> = Vec::with_capacity(triangles.len());

    for t in &triangles {
        let mut ids = [0usize; 3];
        for (slot, c) in ids.iter_mut().zip(t.to_array()) {
            *slot = *vertex_ids.entry(coord_key(&c)).or_insert_with(|| {
                vertices.push(c);
                vertices.len() - 1
            });
        }
        tris.push(ids);
        areas.push(t.unsigned_area());
    }

    let mut edge_tris: HashMap<EdgeKey, Vec<usize>> = HashMap::new();
    for (ti, t) in tris.iter().enumerate() {
        for k in 0..3 {
            edge_tris
                .entry(edge_key(t[k], t[(k + 1) % 3]))
                .or_default()
                .push(ti);
        }
    }

    let length = |e: EdgeKey| -> f64 {
        let (a, b) = (vertices[e.0], vertices[e.1]);
        (a.x - b.x).hypot(a.y - b.y)
    };

    let (min_len, max_len) = edge_tris
        .keys()
        .map(|&e| length(e))
        .fold((f64::INFINITY, 0.0f64), |(lo, hi), l| (lo.min(l), hi.max(l)));
    let threshold = min_len + ratio * (max_len - min_len);

    let mut alive = vec![true; tris.len()];
    let mut on_border = vec![false; vertices.len()];
    // Max-heap on edge length; lengths are non-negative so bit order is numeric order
    let mut queue: BinaryHeap<(u64, Reverse<EdgeKey>)> = BinaryHeap::new();

    for (&e, owners) in &edge_tris {
        if owners.len() == 1 {
            on_border[e.0] = true;
            on_border[e.1] = true;
            let l = length(e);
            if l > threshold {
                queue.push((l.to_bits(), Reverse(e)));
            }
        }
    }

    let alive_owners = |edge_tris: &HashMap<EdgeKey, Vec<usize>>, alive: &[bool], e: EdgeKey| {
        edge_tris
            .get(&e)
            .map(|owners| owners.iter().copied().filter(|&t| alive[t]).collect::<Vec<_>>())
            .unwrap_or_default()
    };

    while let Some((_, Reverse(edge))) = queue.pop() {
        let owners = alive_owners(&edge_tris, &alive, edge);
        let &[tri] = owners.as_slice() else {
            continue;
        };

        let t = tris[tri];
        let apex = t
            .iter()
            .copied()
            .find(|&v| v != edge.0 && v != edge.1);
        let Some(apex) = apex else {
            continue;
        };
        if on_border[apex] {
            continue;
        }
        let others = [edge_key(edge.0, apex), edge_key(edge.1, apex)];
        // a second border edge would make this an ear
        if others
            .iter()
            .any(|&e| alive_owners(&edge_tris, &alive, e).len() < 2)
        {
            continue;
        }

        alive[tri] = false;
        on_border[apex] = true;
        for e in others {
            let l = length(e);
            if l > threshold {
                queue.push((l.to_bits(), Reverse(e)));
            }
        }
    }

    areas
        .iter()
        .zip(&alive)
        .filter(|&(_, &a)| a)
        .map(|(area, _)| area)
        .sum()
}
