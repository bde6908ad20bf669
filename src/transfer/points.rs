//! Prompt derivation for transfer: turns a source polygon into positive
//! and negative prompt points on the next slice.

use std::future::Future;

use geo::{BoundingRect, Centroid, Contains, InteriorPoint, Point, Polygon};

use crate::{
    geometry,
    persist::{BackendError, BackendResult},
    types::{BBox, PromptPoint, Segmentation},
};

use super::TransferSettings;

/// Distance negative prompts keep from the source bbox, in pixels.
pub const NEGATIVE_MARGIN: f64 = 10.0;

const WALK_STEPS: usize = 10;

/// Prompt points derived from one source annotation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferPoints {
    pub positive: Vec<PromptPoint>,
    pub negative: Vec<PromptPoint>,
}

impl TransferPoints {
    /// Positive prompts followed by negative ones.
    pub fn into_prompts(self) -> Vec<PromptPoint> {
        let mut out = self.positive;
        out.extend(self.negative);
        out
    }

    pub fn len(&self) -> usize {
        self.positive.len() + self.negative.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positive.is_empty() && self.negative.is_empty()
    }
}

/// Points-generation collaborator.
pub trait PointGenerator: Send + Sync {
    fn generate_transfer_points(
        &self,
        segmentation: &Segmentation,
        bbox: &BBox,
        positive_count: u8,
        negative_count: u8,
    ) -> impl Future<Output = BackendResult<TransferPoints>> + Send;
}

/// Local generator working on the largest ring of the source region.
///
/// The first positive point is the centroid, or an interior point when the
/// centroid falls outside (concave shapes). Further positive points are
/// offset by a third of the bbox extent along its major axis. Negative
/// points sit just outside the bbox: edge midpoints first, then corners.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeometricPointGenerator;

impl PointGenerator for GeometricPointGenerator {
    async fn generate_transfer_points(
        &self,
        segmentation: &Segmentation,
        bbox: &BBox,
        positive_count: u8,
        negative_count: u8,
    ) -> BackendResult<TransferPoints> {
        transfer_points(segmentation, bbox, positive_count, negative_count)
    }
}

/// Synchronous core of [`GeometricPointGenerator`].
pub fn transfer_points(
    segmentation: &Segmentation,
    bbox: &BBox,
    positive_count: u8,
    negative_count: u8,
) -> BackendResult<TransferPoints> {
    if !(1..=TransferSettings::MAX_POSITIVE).contains(&positive_count) {
        return Err(BackendError::Rejected(format!(
            "positive point count must be 1..={}, got {positive_count}",
            TransferSettings::MAX_POSITIVE
        )));
    }
    if negative_count > TransferSettings::MAX_NEGATIVE {
        return Err(BackendError::Rejected(format!(
            "negative point count must be 0..={}, got {negative_count}",
            TransferSettings::MAX_NEGATIVE
        )));
    }

    let polygon = geometry::largest_ring(segmentation)
        .and_then(|ring| geometry::ring_polygon(ring))
        .ok_or_else(|| BackendError::Rejected("source annotation has no polygon".to_string()))?;

    Ok(TransferPoints {
        positive: positive_points(&polygon, positive_count as usize),
        negative: negative_points(&polygon, bbox, negative_count as usize),
    })
}

fn positive_points(polygon: &Polygon<f64>, count: usize) -> Vec<PromptPoint> {
    let centroid = polygon.centroid();
    let anchor = match centroid {
        Some(c) if polygon.contains(&c) => c,
        _ => polygon
            .interior_point()
            .or(centroid)
            .unwrap_or_else(|| Point::new(0.0, 0.0)),
    };

    let mut out = vec![PromptPoint::positive(anchor.x(), anchor.y())];
    if count == 1 {
        return out;
    }

    let (width, height) = polygon
        .bounding_rect()
        .map(|r| (r.width(), r.height()))
        .unwrap_or_default();
    let horizontal = width >= height;
    let offsets: &[f64] = if count == 2 { &[1.0] } else { &[-1.0, 1.0] };

    for &dir in offsets {
        let candidate = if horizontal {
            Point::new(anchor.x() + dir * width / 3.0, anchor.y())
        } else {
            Point::new(anchor.x(), anchor.y() + dir * height / 3.0)
        };
        let p = if polygon.contains(&candidate) {
            candidate
        } else {
            walk_inside(polygon, candidate, anchor)
        };
        out.push(PromptPoint::positive(p.x(), p.y()));
    }
    out.truncate(count);
    out
}

/// First point inside `polygon` on the segment from `from` to `toward`.
fn walk_inside(polygon: &Polygon<f64>, from: Point<f64>, toward: Point<f64>) -> Point<f64> {
    (0..WALK_STEPS)
        .map(|i| {
            let t = i as f64 / (WALK_STEPS - 1) as f64;
            Point::new(
                from.x() + t * (toward.x() - from.x()),
                from.y() + t * (toward.y() - from.y()),
            )
        })
        .find(|p| polygon.contains(p))
        .or_else(|| polygon.interior_point())
        .unwrap_or(toward)
}

fn negative_points(polygon: &Polygon<f64>, bbox: &BBox, count: usize) -> Vec<PromptPoint> {
    if count == 0 {
        return Vec::new();
    }

    let (x0, y0) = (bbox.x - NEGATIVE_MARGIN, bbox.y - NEGATIVE_MARGIN);
    let (x1, y1) = (bbox.max_x() + NEGATIVE_MARGIN, bbox.max_y() + NEGATIVE_MARGIN);
    let cx = bbox.x + bbox.width / 2.0;
    let cy = bbox.y + bbox.height / 2.0;

    // top, right, bottom, left, then the corners
    let candidates = [
        (cx, y0),
        (x1, cy),
        (cx, y1),
        (x0, cy),
        (x0, y0),
        (x1, y0),
        (x1, y1),
        (x0, y1),
    ];

    candidates
        .into_iter()
        .filter(|&(x, y)| !polygon.contains(&Point::new(x, y)))
        .take(count)
        .map(|(x, y)| PromptPoint::negative(x, y))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: f64, y: f64, w: f64, h: f64) -> Segmentation {
        vec![vec![x, y, x + w, y, x + w, y + h, x, y + h]]
    }

    fn inside(seg: &Segmentation, p: &PromptPoint) -> bool {
        geometry::contains_point(seg, p.x, p.y)
    }

    fn near(p: &PromptPoint, x: f64, y: f64) -> bool {
        (p.x - x).abs() < 1e-9 && (p.y - y).abs() < 1e-9
    }

    #[test]
    fn single_positive_at_centroid() {
        let seg = rect(0.0, 0.0, 30.0, 10.0);
        let pts = transfer_points(&seg, &geometry::bounding_box(&seg), 1, 0).unwrap();
        assert_eq!(pts.positive.len(), 1);
        assert!(near(&pts.positive[0], 15.0, 5.0));
        assert!(pts.positive[0].is_positive);
        assert!(pts.negative.is_empty());
    }

    #[test]
    fn extra_positives_follow_major_axis() {
        let seg = rect(0.0, 0.0, 30.0, 10.0);
        let pts = transfer_points(&seg, &geometry::bounding_box(&seg), 3, 0).unwrap();
        assert_eq!(pts.positive.len(), 3);
        assert!(near(&pts.positive[1], 5.0, 5.0));
        assert!(near(&pts.positive[2], 25.0, 5.0));

        let tall = rect(0.0, 0.0, 10.0, 30.0);
        let pts = transfer_points(&tall, &geometry::bounding_box(&tall), 2, 0).unwrap();
        assert_eq!(pts.positive.len(), 2);
        assert!(near(&pts.positive[1], 5.0, 25.0));
    }

    #[test]
    fn concave_shape_keeps_positives_inside() {
        // U shape whose centroid lies in the notch
        let seg = vec![vec![
            0.0, 0.0, 30.0, 0.0, 30.0, 30.0, 20.0, 30.0, 20.0, 10.0, 10.0, 10.0, 10.0, 30.0, 0.0,
            30.0,
        ]];
        let pts = transfer_points(&seg, &geometry::bounding_box(&seg), 3, 0).unwrap();
        assert_eq!(pts.positive.len(), 3);
        for p in &pts.positive {
            assert!(inside(&seg, p), "{p:?} outside");
        }
    }

    #[test]
    fn negatives_sit_outside_bbox_edges_first() {
        let seg = rect(10.0, 10.0, 20.0, 20.0);
        let bbox = geometry::bounding_box(&seg);
        let pts = transfer_points(&seg, &bbox, 1, 3).unwrap();
        assert_eq!(
            pts.negative,
            vec![
                PromptPoint::negative(20.0, 0.0),
                PromptPoint::negative(40.0, 20.0),
                PromptPoint::negative(20.0, 40.0),
            ]
        );
        assert!(pts.negative.iter().all(|p| !inside(&seg, p)));
        assert_eq!(pts.clone().into_prompts().len(), pts.len());
    }

    #[test]
    fn counts_out_of_range_are_rejected() {
        let seg = rect(0.0, 0.0, 10.0, 10.0);
        let bbox = geometry::bounding_box(&seg);
        assert!(transfer_points(&seg, &bbox, 0, 0).is_err());
        assert!(transfer_points(&seg, &bbox, 4, 0).is_err());
        assert!(transfer_points(&seg, &bbox, 1, 4).is_err());
    }

    #[test]
    fn empty_source_is_rejected() {
        let err = transfer_points(&Vec::new(), &BBox::default(), 1, 0).unwrap_err();
        assert!(matches!(err, BackendError::Rejected(_)));
    }
}
