//! Segmentation oracle contract and the preview orchestration around it.

pub mod debounce;
pub mod orchestrator;

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    annotation::Shape,
    persist::{BackendError, BackendResult},
    types::{BBox, ImageId, PromptPoint, Segmentation},
};

/// Oracle output for one set of prompt points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewResult {
    /// Predicted region.
    pub polygon: Segmentation,
    /// Tight box over `polygon`.
    pub bbox: BBox,
    /// Covered area of `polygon`.
    pub area: f64,
    /// Oracle confidence in `[0, 1]`.
    #[serde(default)]
    pub score: f64,
}

impl PreviewResult {
    /// Preview whose bbox and area are derived from `shape`.
    pub fn from_shape(shape: Shape, score: f64) -> Self {
        Self {
            polygon: shape.segmentation,
            bbox: shape.bbox,
            area: shape.area,
            score,
        }
    }

    /// Geometric part of the preview.
    pub fn shape(&self) -> Shape {
        Shape {
            segmentation: self.polygon.clone(),
            bbox: self.bbox,
            area: self.area,
        }
    }
}

/// Snapshot of the orchestrator published to subscribers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreviewState {
    /// An image preparation call is in flight.
    pub is_encoding: bool,
    /// An inference call is in flight.
    pub is_segmenting: bool,
    /// Current preview, if any.
    pub preview: Option<PreviewResult>,
    /// Message of the last failed call.
    pub error: Option<String>,
}

/// One debounced inference request.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptRequest {
    /// Image to segment.
    pub image_id: ImageId,
    /// Full current prompt set.
    pub points: Vec<PromptPoint>,
    /// Regions the result must not overlap.
    pub exclusions: Option<Vec<Segmentation>>,
}

#[derive(Debug, Error)]
pub enum SegmentError {
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Point-prompted segmentation collaborator.
pub trait SegmentationOracle: Send + Sync {
    /// Expensive per-image preparation. Idempotent.
    fn encode_image(&self, image_id: &str) -> impl Future<Output = BackendResult<()>> + Send;

    /// Predicts a region for `points`, suppressing overlap with `exclusions`.
    fn segment_image(
        &self,
        image_id: &str,
        points: &[PromptPoint],
        exclusions: Option<&[Segmentation]>,
    ) -> impl Future<Output = BackendResult<PreviewResult>> + Send;
}
