//! Polygon-set algebra over flat-ring segmentations.
//!
//! Every function here is pure. Segmentations are converted to
//! [`geo::MultiPolygon`] regions by ring nesting, the boolean work is done
//! by `geo`'s [`BooleanOps`], and results are flattened back into rings
//! (exterior first, then that polygon's holes).

use geo::{Area, BooleanOps, Contains, Coord, LineString, MultiPolygon, Point, Polygon};

use crate::types::{BBox, BrushOp, Ring, Segmentation};

/// Segments per quarter circle when rounding stroke caps and joins.
pub const QUARTER_SEGMENTS: usize = 16;

/// Set-theoretic union of two polygon sets.
///
/// Disjoint inputs come back as separate rings; overlapping or touching
/// inputs merge into one boundary.
pub fn union(a: &Segmentation, b: &Segmentation) -> Segmentation {
    from_region(&union_regions(to_region(a), to_region(b)))
}

/// Union over any number of polygon sets.
pub fn union_all<'a>(sets: impl IntoIterator<Item = &'a Segmentation>) -> Segmentation {
    let merged = sets
        .into_iter()
        .map(to_region)
        .fold(empty_region(), union_regions);
    from_region(&merged)
}

/// Area of `a` minus area of `b`. May split polygons or return an empty set.
pub fn difference(a: &Segmentation, b: &Segmentation) -> Segmentation {
    from_region(&difference_regions(to_region(a), &to_region(b)))
}

/// Covered area of a polygon set. Independent of ring winding.
pub fn area(seg: &Segmentation) -> f64 {
    to_region(seg).unsigned_area()
}

/// Tight axis-aligned box over every vertex; zero box for an empty set.
pub fn bounding_box(seg: &Segmentation) -> BBox {
    let mut vertices = seg.iter().flat_map(|ring| ring.chunks_exact(2)).peekable();
    if vertices.peek().is_none() {
        return BBox::default();
    }

    let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
    let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for v in vertices {
        min_x = min_x.min(v[0]);
        min_y = min_y.min(v[1]);
        max_x = max_x.max(v[0]);
        max_y = max_y.max(v[1]);
    }
    BBox::new(min_x, min_y, max_x - min_x, max_y - min_y)
}

/// Approximates a thick line of half-width `radius` along `path`, with round
/// caps and joins. A single-point path yields a disc.
pub fn stroke_to_polygon(path: &[(f64, f64)], radius: f64) -> Segmentation {
    from_region(&stroke_region(path, radius))
}

/// Grows (`Add`) or cuts (`Remove`) `current` by a brush stroke.
pub fn apply_stroke(
    current: &Segmentation,
    path: &[(f64, f64)],
    radius: f64,
    op: BrushOp,
) -> Segmentation {
    let stroke = stroke_region(path, radius);
    let region = to_region(current);
    let out = match op {
        BrushOp::Add => union_regions(region, stroke),
        BrushOp::Remove => difference_regions(region, &stroke),
    };
    from_region(&out)
}

/// True when `(x, y)` lies strictly inside the region.
pub fn contains_point(seg: &Segmentation, x: f64, y: f64) -> bool {
    to_region(seg).contains(&Point::new(x, y))
}

/// Shoelace area of one ring, sign dropped.
pub fn ring_area(ring: &[f64]) -> f64 {
    let n = ring.len() / 2;
    if n < 3 {
        return 0.0;
    }
    let mut twice = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        twice += ring[2 * i] * ring[2 * j + 1] - ring[2 * j] * ring[2 * i + 1];
    }
    (twice / 2.0).abs()
}

/// Ring enclosing the most area, if any ring has three vertices.
pub fn largest_ring(seg: &Segmentation) -> Option<&Ring> {
    seg.iter()
        .filter(|ring| ring.len() >= 6)
        .max_by(|a, b| ring_area(a).total_cmp(&ring_area(b)))
}

pub(crate) fn ring_polygon(ring: &[f64]) -> Option<Polygon<f64>> {
    if ring.len() < 6 {
        return None;
    }
    let coords: Vec<Coord<f64>> = ring
        .chunks_exact(2)
        .map(|c| Coord { x: c[0], y: c[1] })
        .collect();
    Some(Polygon::new(LineString::new(coords), Vec::new()))
}

fn empty_region() -> MultiPolygon<f64> {
    MultiPolygon::new(Vec::new())
}

/// Builds the covered region of a segmentation. A ring counts as a hole when
/// it is nested inside an odd number of larger rings; every other ring adds
/// area, so overlapping outer rings union rather than cancel.
fn to_region(seg: &Segmentation) -> MultiPolygon<f64> {
    let rings: Vec<(f64, Polygon<f64>)> = seg
        .iter()
        .filter_map(|ring| ring_polygon(ring).map(|poly| (ring_area(ring), poly)))
        .collect();

    let mut layered: Vec<(usize, &Polygon<f64>)> = rings
        .iter()
        .enumerate()
        .map(|(i, (size, poly))| {
            let depth = rings
                .iter()
                .enumerate()
                .filter(|&(j, (other_size, other))| {
                    j != i && *other_size > *size && other.contains(poly)
                })
                .count();
            (depth, poly)
        })
        .collect();
    layered.sort_by_key(|&(depth, _)| depth);

    layered
        .into_iter()
        .fold(empty_region(), |acc, (depth, poly)| {
            let piece = MultiPolygon::new(vec![poly.clone()]);
            if depth % 2 == 0 {
                union_regions(acc, piece)
            } else {
                difference_regions(acc, &piece)
            }
        })
}

fn from_region(region: &MultiPolygon<f64>) -> Segmentation {
    let mut out = Vec::new();
    for poly in &region.0 {
        push_ring(&mut out, poly.exterior());
        for hole in poly.interiors() {
            push_ring(&mut out, hole);
        }
    }
    out
}

fn push_ring(out: &mut Segmentation, ring: &LineString<f64>) {
    let mut coords = ring.0.as_slice();
    if coords.len() > 1 && ring.is_closed() {
        coords = &coords[..coords.len() - 1];
    }
    if coords.len() < 3 {
        return;
    }
    out.push(coords.iter().flat_map(|c| [c.x, c.y]).collect());
}

fn union_regions(a: MultiPolygon<f64>, b: MultiPolygon<f64>) -> MultiPolygon<f64> {
    match (a.0.is_empty(), b.0.is_empty()) {
        (true, true) => empty_region(),
        (true, false) => b,
        (false, true) => a,
        (false, false) => a.union(&b),
    }
}

fn difference_regions(a: MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    if a.0.is_empty() || b.0.is_empty() {
        return a;
    }
    a.difference(b)
}

fn stroke_region(path: &[(f64, f64)], radius: f64) -> MultiPolygon<f64> {
    if path.is_empty() || radius.is_nan() || radius <= 0.0 {
        return empty_region();
    }

    let mut pieces: Vec<Polygon<f64>> = path.iter().map(|&p| disc(p, radius)).collect();
    for pair in path.windows(2) {
        if let Some(rect) = segment_band(pair[0], pair[1], radius) {
            pieces.push(rect);
        }
    }

    pieces
        .into_iter()
        .map(|p| MultiPolygon::new(vec![p]))
        .fold(empty_region(), union_regions)
}

fn disc((cx, cy): (f64, f64), radius: f64) -> Polygon<f64> {
    let n = QUARTER_SEGMENTS * 4;
    let coords: Vec<Coord<f64>> = (0..n)
        .map(|i| {
            let theta = std::f64::consts::TAU * i as f64 / n as f64;
            Coord {
                x: cx + radius * theta.cos(),
                y: cy + radius * theta.sin(),
            }
        })
        .collect();
    Polygon::new(LineString::new(coords), Vec::new())
}

fn segment_band(a: (f64, f64), b: (f64, f64), radius: f64) -> Option<Polygon<f64>> {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len = dx.hypot(dy);
    if len <= f64::EPSILON {
        return None;
    }
    let (nx, ny) = (-dy / len * radius, dx / len * radius);
    let coords = vec![
        Coord { x: a.0 + nx, y: a.1 + ny },
        Coord { x: b.0 + nx, y: b.1 + ny },
        Coord { x: b.0 - nx, y: b.1 - ny },
        Coord { x: a.0 - nx, y: a.1 - ny },
    ];
    Some(Polygon::new(LineString::new(coords), Vec::new()))
}
