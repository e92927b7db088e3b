//! Maximum inscribed circle search (polylabel).
//!
//! Cells covering the bounding box are refined best-first by the largest
//! distance they could still contain, until no cell can beat the current best
//! by more than the tolerance.

use geo::{BoundingRect, Centroid};
use geo_types::{Coord, Geometry, LineString, Point, Polygon};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::TransformError;

const MAX_CELLS: usize = 100_000;

/// Fraction of the extent used when no positive tolerance is given.
const RELATIVE_TOLERANCE: f64 = 1e-4;

#[derive(Debug, Clone, Copy)]
struct Cell {
    center: Coord<f64>,
    half: f64,
    /// Signed distance from the center to the polygon boundary, positive inside.
    distance: f64,
    /// Upper bound for any distance within the cell.
    potential: f64,
}

impl Cell {
    fn new(center: Coord<f64>, half: f64, polygon: &Polygon<f64>) -> Self {
        let distance = signed_distance(center, polygon);
        Self {
            center,
            half,
            distance,
            potential: distance + half * std::f64::consts::SQRT_2,
        }
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.potential.total_cmp(&other.potential) == Ordering::Equal
    }
}

impl Eq for Cell {}

impl PartialOrd for Cell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cell {
    fn cmp(&self, other: &Self) -> Ordering {
        self.potential.total_cmp(&other.potential)
    }
}

/// Scratch queue reused across searches.
#[derive(Debug, Default)]
pub struct CellQueue {
    heap: BinaryHeap<Cell>,
}

pub fn pole_of_inaccessibility(
    queue: &mut CellQueue,
    geometry: &Geometry<f64>,
    tolerance: f64,
) -> Result<Point<f64>, TransformError> {
    let polygons: Vec<&Polygon<f64>> = match geometry {
        Geometry::Polygon(polygon) => vec![polygon],
        Geometry::MultiPolygon(multi) => multi.0.iter().collect(),
        _ => return Err(TransformError::NotPolygonal),
    };

    let mut best: Option<Cell> = None;
    for polygon in polygons {
        let Some(cell) = search(queue, polygon, tolerance) else {
            continue;
        };
        if best.is_none_or(|b| cell.distance > b.distance) {
            best = Some(cell);
        }
    }

    best.map(|cell| Point::from(cell.center))
        .ok_or(TransformError::NoResult("pole_of_inaccessibility"))
}

fn search(queue: &mut CellQueue, polygon: &Polygon<f64>, tolerance: f64) -> Option<Cell> {
    let rect = polygon.bounding_rect()?;
    let (width, height) = (rect.width(), rect.height());
    if width.min(height) == 0.0 {
        // degenerate polygon: nothing to inscribe into
        return Some(Cell::new(rect.min(), 0.0, polygon));
    }
    let tolerance = if tolerance > 0.0 {
        tolerance
    } else {
        width.max(height) * RELATIVE_TOLERANCE
    };
    // slivers would otherwise seed width/height cells
    let cell_size = width
        .min(height)
        .max(tolerance)
        .max(width.max(height) / (MAX_CELLS as f64).sqrt());

    let heap = &mut queue.heap;
    heap.clear();

    let half = cell_size / 2.0;
    let mut x = rect.min().x;
    while x < rect.max().x {
        let mut y = rect.min().y;
        while y < rect.max().y {
            heap.push(Cell::new(Coord { x: x + half, y: y + half }, half, polygon));
            y += cell_size;
        }
        x += cell_size;
    }

    let mut best = polygon
        .centroid()
        .map(|c| Cell::new(c.0, 0.0, polygon))
        .unwrap_or_else(|| Cell::new(rect.center(), 0.0, polygon));
    let bbox_cell = Cell::new(rect.center(), 0.0, polygon);
    if bbox_cell.distance > best.distance {
        best = bbox_cell;
    }

    let mut visited = 0;
    while let Some(cell) = heap.pop() {
        visited += 1;
        if cell.distance > best.distance {
            best = cell;
        }
        if cell.potential - best.distance <= tolerance || visited >= MAX_CELLS {
            continue;
        }
        let half = cell.half / 2.0;
        for (dx, dy) in [(-1.0, -1.0), (1.0, -1.0), (-1.0, 1.0), (1.0, 1.0)] {
            let center = Coord {
                x: cell.center.x + dx * half,
                y: cell.center.y + dy * half,
            };
            heap.push(Cell::new(center, half, polygon));
        }
    }
    heap.clear();

    Some(best)
}

fn signed_distance(point: Coord<f64>, polygon: &Polygon<f64>) -> f64 {
    let mut inside = false;
    let mut min_sq = f64::INFINITY;

    for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
        inside ^= ring_crossings_odd(point, ring);
        for line in ring.lines() {
            min_sq = min_sq.min(segment_distance_sq(point, line.start, line.end));
        }
    }

    let distance = min_sq.sqrt();
    if inside { distance } else { -distance }
}

fn ring_crossings_odd(point: Coord<f64>, ring: &LineString<f64>) -> bool {
    let mut odd = false;
    for line in ring.lines() {
        let (a, b) = (line.start, line.end);
        if (a.y > point.y) != (b.y > point.y)
            && point.x < (b.x - a.x) * (point.y - a.y) / (b.y - a.y) + a.x
        {
            odd = !odd;
        }
    }
    odd
}

fn segment_distance_sq(p: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> f64 {
    let mut x = a.x;
    let mut y = a.y;
    let dx = b.x - x;
    let dy = b.y - y;

    if dx != 0.0 || dy != 0.0 {
        let t = ((p.x - x) * dx + (p.y - y) * dy) / (dx * dx + dy * dy);
        if t > 1.0 {
            x = b.x;
            y = b.y;
        } else if t > 0.0 {
            x += dx * t;
            y += dy * t;
        }
    }

    let dx = p.x - x;
    let dy = p.y - y;
    dx * dx + dy * dy
}
