//! Raster-to-polygon conversion with 8-connectivity.
//!
//! Pixels sharing the same observed value are grouped into regions when they
//! touch along an edge or a corner. Each region becomes one multipolygon:
//!
//! 1. **Labelling**: a single flood-fill pass assigns a region to every
//!    observed pixel, in row-major order of each region's first pixel
//! 2. **Tracing** (parallel): the boundary edges of each region are chained
//!    into rings. Where two pixels of a region touch only at a corner the
//!    chain turns into the current pixel, and a chain that still returns to
//!    a visited vertex is cut there. Rings are therefore simple, though a
//!    hole may touch its shell at a single corner
//! 3. **Assembly**: rings with positive pixel-space area are shells, the
//!    others are holes, attached to the smallest shell that contains them

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use geo::orient::{Direction, Orient};
use geo::{Area, Contains, LineString, MultiPolygon, Point, Polygon};
use log::info;
use rayon::prelude::*;

use crate::config::RasterConfig;
use crate::core::dates::{decode_date_code, DateError};
use crate::core::loaders::{load_raster, Raster};
use crate::core::writers::write_polygons_geojson;
use crate::core::transforms::{drop_collinear, ring_to_map, signed_area2, GeoTransform};
use crate::core::types::{PixelRegion, PolygonId, RawPolygon};

const NO_REGION: u32 = u32::MAX;

/// Neighbour offsets for 8-connectivity.
const NEIGHBOURS_8: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// A directed boundary edge between pixel corners.
#[derive(Debug, Clone, Copy)]
struct Edge {
    from: (i64, i64),
    to: (i64, i64),
    /// Pixel on the far side of the edge (outside the region).
    outside: (i64, i64),
}

impl Edge {
    #[inline]
    fn direction(&self) -> (i64, i64) {
        (self.to.0 - self.from.0, self.to.1 - self.from.1)
    }
}

/// A traced ring in pixel-corner space.
struct Ring {
    vertices: Vec<(i64, i64)>,
    area2: i64,
    /// A pixel centre lying just outside the ring's region side.
    marker: (f64, f64),
}

/// Region membership grid produced by the labelling pass.
struct Labels {
    width: usize,
    height: usize,
    cells: Vec<u32>,
}

impl Labels {
    #[inline]
    fn get(&self, col: i64, row: i64) -> u32 {
        if col < 0 || row < 0 || col as usize >= self.width || row as usize >= self.height {
            return NO_REGION;
        }
        self.cells[row as usize * self.width + col as usize]
    }
}

/// Convert a raster into one region per 8-connected group of equal observed values.
///
/// Masked pixels never produce geometry. Regions are returned in row-major
/// order of their top-left-most pixel.
pub fn polygonize(raster: &Raster) -> Vec<PixelRegion> {
    let (labels, members) = label_regions(raster);

    let regions: Vec<PixelRegion> = members
        .par_iter()
        .enumerate()
        .map(|(region, pixels)| {
            let first = pixels[0] as usize;
            PixelRegion {
                value: raster.values[first],
                geometry: trace_region(&labels, region as u32, pixels, &raster.transform),
                pixel_count: pixels.len(),
            }
        })
        .collect();

    info!(
        "polygonized {} regions from {} observed pixels",
        regions.len(),
        raster.observed_count()
    );
    regions
}

/// Decode the value of every region and assign sequential polygon ids.
///
/// # Errors
///
/// Fails on the first value that is not a representable `YYDDD` code.
pub fn regions_to_polygons(regions: Vec<PixelRegion>) -> Result<Vec<RawPolygon>, DateError> {
    regions
        .into_iter()
        .enumerate()
        .map(|(i, region)| {
            let date: NaiveDate = decode_date_code(region.value)?;
            Ok(RawPolygon {
                id: PolygonId(i),
                geometry: region.geometry,
                date,
                date_code: region.value,
            })
        })
        .collect()
}

/// Load a raster and write its dated polygons as GeoJSON.
///
/// Returns the number of polygons written.
///
/// # Errors
///
/// Returns an error if the raster cannot be read, a value is not a date code,
/// or the output cannot be written.
pub fn polygonize_raster(input: &Path, output: &Path, config: &RasterConfig) -> anyhow::Result<usize> {
    let raster = load_raster(input, config).with_context(|| format!("loading {}", input.display()))?;
    let polygons = regions_to_polygons(polygonize(&raster))
        .with_context(|| format!("decoding dates of {}", input.display()))?;

    write_polygons_geojson(output, &polygons, raster.crs.as_ref())?;
    info!("Polygons GeoJSON -> {}", output.display());
    Ok(polygons.len())
}

/// Flood-fill labelling; returns the label grid and the pixels of each region.
fn label_regions(raster: &Raster) -> (Labels, Vec<Vec<u32>>) {
    let (width, height) = (raster.width, raster.height);
    let mut cells = vec![NO_REGION; width * height];
    let mut members: Vec<Vec<u32>> = Vec::new();
    let mut queue = VecDeque::new();

    for start in 0..width * height {
        if !raster.observed[start] || cells[start] != NO_REGION {
            continue;
        }

        let region = members.len() as u32;
        let value = raster.values[start];
        let mut pixels = Vec::new();

        cells[start] = region;
        queue.push_back(start);
        while let Some(idx) = queue.pop_front() {
            pixels.push(idx as u32);
            let (col, row) = ((idx % width) as i64, (idx / width) as i64);

            for (dc, dr) in NEIGHBOURS_8 {
                let (nc, nr) = (col + dc, row + dr);
                if nc < 0 || nr < 0 || nc as usize >= width || nr as usize >= height {
                    continue;
                }
                let n = nr as usize * width + nc as usize;
                if raster.observed[n] && cells[n] == NO_REGION && raster.values[n] == value {
                    cells[n] = region;
                    queue.push_back(n);
                }
            }
        }

        pixels.sort_unstable();
        members.push(pixels);
    }

    (
        Labels {
            width,
            height,
            cells,
        },
        members,
    )
}

/// Collect the boundary edges of a region, clockwise around each pixel on screen.
fn boundary_edges(labels: &Labels, region: u32, pixels: &[u32]) -> Vec<Edge> {
    let mut edges = Vec::new();
    for &idx in pixels {
        let col = (idx as usize % labels.width) as i64;
        let row = (idx as usize / labels.width) as i64;

        if labels.get(col, row - 1) != region {
            edges.push(Edge {
                from: (col, row),
                to: (col + 1, row),
                outside: (col, row - 1),
            });
        }
        if labels.get(col + 1, row) != region {
            edges.push(Edge {
                from: (col + 1, row),
                to: (col + 1, row + 1),
                outside: (col + 1, row),
            });
        }
        if labels.get(col, row + 1) != region {
            edges.push(Edge {
                from: (col + 1, row + 1),
                to: (col, row + 1),
                outside: (col, row + 1),
            });
        }
        if labels.get(col - 1, row) != region {
            edges.push(Edge {
                from: (col, row + 1),
                to: (col, row),
                outside: (col - 1, row),
            });
        }
    }
    edges
}

/// Chain boundary edges into closed rings.
///
/// A chain that comes back to a vertex it already visited (a hole touching
/// the outer boundary at one corner, or two hole pixels meeting diagonally)
/// is split there, so every ring visits each vertex once.
fn chain_rings(edges: &[Edge]) -> Vec<Ring> {
    let mut outgoing: HashMap<(i64, i64), Vec<usize>> = HashMap::with_capacity(edges.len());
    for (i, e) in edges.iter().enumerate() {
        outgoing.entry(e.from).or_default().push(i);
    }

    let mut used = vec![false; edges.len()];
    let mut rings = Vec::new();

    for start in 0..edges.len() {
        if used[start] {
            continue;
        }

        let mut chain = Vec::new();
        let mut current = start;
        loop {
            used[current] = true;
            chain.push(current);

            let next = match outgoing.get(&edges[current].to) {
                Some(candidates) => pick_next(edges, current, candidates),
                None => None,
            };
            match next {
                Some(n) if n == start => break,
                Some(n) if !used[n] => current = n,
                // unreachable for a consistent boundary
                _ => break,
            }
        }

        for part in split_at_repeated_vertices(edges, chain) {
            let raw: Vec<(i64, i64)> = part.iter().map(|&e| edges[e].from).collect();
            let vertices = drop_collinear(&raw);
            let outside = edges[part[0]].outside;
            rings.push(Ring {
                area2: signed_area2(&vertices),
                vertices,
                marker: (outside.0 as f64 + 0.5, outside.1 as f64 + 0.5),
            });
        }
    }
    rings
}

/// Cut a closed chain of edges into simple loops at every repeated start vertex.
fn split_at_repeated_vertices(edges: &[Edge], chain: Vec<usize>) -> Vec<Vec<usize>> {
    let mut loops = Vec::new();
    let mut open: Vec<usize> = Vec::with_capacity(chain.len());
    let mut position: HashMap<(i64, i64), usize> = HashMap::new();

    for e in chain {
        let vertex = edges[e].from;
        if let Some(pos) = position.get(&vertex).copied() {
            let closed = open.split_off(pos);
            for &c in &closed {
                position.remove(&edges[c].from);
            }
            loops.push(closed);
        }
        position.insert(vertex, open.len());
        open.push(e);
    }
    if !open.is_empty() {
        loops.push(open);
    }
    loops
}

/// Choose the continuation of `current`, turning into the region at pinch vertices.
fn pick_next(edges: &[Edge], current: usize, candidates: &[usize]) -> Option<usize> {
    match candidates {
        [only] => Some(*only),
        _ => {
            let (dx, dy) = edges[current].direction();
            candidates
                .iter()
                .copied()
                .find(|&c| {
                    let (cx, cy) = edges[c].direction();
                    dx * cy - dy * cx > 0
                })
                .or_else(|| candidates.first().copied())
        }
    }
}

fn to_pixel_linestring(vertices: &[(i64, i64)]) -> LineString<f64> {
    let mut coords: Vec<(f64, f64)> = vertices.iter().map(|&(x, y)| (x as f64, y as f64)).collect();
    if let Some(&first) = coords.first() {
        coords.push(first);
    }
    LineString::from(coords)
}

fn trace_region(
    labels: &Labels,
    region: u32,
    pixels: &[u32],
    transform: &GeoTransform,
) -> MultiPolygon<f64> {
    let rings = chain_rings(&boundary_edges(labels, region, pixels));
    let (shells, holes): (Vec<Ring>, Vec<Ring>) = rings.into_iter().partition(|r| r.area2 > 0);

    // Pixel-space shells for hole assignment
    let shell_polys: Vec<Polygon<f64>> = shells
        .iter()
        .map(|s| Polygon::new(to_pixel_linestring(&s.vertices), vec![]))
        .collect();
    let mut shell_holes: Vec<Vec<LineString<f64>>> = vec![Vec::new(); shells.len()];

    for hole in &holes {
        let marker = Point::new(hole.marker.0, hole.marker.1);
        let owner = shell_polys
            .iter()
            .enumerate()
            .filter(|(_, p)| p.contains(&marker))
            .min_by(|(_, a), (_, b)| a.unsigned_area().total_cmp(&b.unsigned_area()))
            .map(|(i, _)| i);
        if let Some(i) = owner {
            shell_holes[i].push(ring_to_map(&hole.vertices, transform));
        }
    }

    let polygons: Vec<Polygon<f64>> = shells
        .iter()
        .zip(shell_holes)
        .map(|(shell, interiors)| Polygon::new(ring_to_map(&shell.vertices, transform), interiors))
        .collect();

    MultiPolygon::new(polygons).orient(Direction::Default)
}
