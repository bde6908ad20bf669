//! Shared primitive IDs and small geometric value types.

use serde::{Deserialize, Serialize};

/// Collaborator-assigned annotation identifier.
pub type AnnotationId = String;
/// Image (slice) identifier.
pub type ImageId = String;
/// Positive class label identifier.
pub type ClassId = u32;

/// One simple polygon ring as a flat `[x1, y1, x2, y2, ...]` sequence.
pub type Ring = Vec<f64>;
/// Ordered set of rings describing one region.
///
/// Rings are combined with even-odd fill, so a ring nested inside another
/// ring of the same segmentation is a hole.
pub type Segmentation = Vec<Ring>;

/// Axis-aligned box in image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BBox {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
}

impl BBox {
    /// Constructs a box from its origin and extent.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Right edge.
    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    /// Bottom edge.
    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }
}

/// Click prompt handed to the segmentation oracle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PromptPoint {
    /// X coordinate in image pixels.
    pub x: f64,
    /// Y coordinate in image pixels.
    pub y: f64,
    /// `true` for foreground, `false` for background prompts.
    pub is_positive: bool,
}

impl PromptPoint {
    /// Foreground prompt.
    pub fn positive(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            is_positive: true,
        }
    }

    /// Background prompt.
    pub fn negative(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            is_positive: false,
        }
    }
}

/// Brush stroke mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrushOp {
    /// Grow the region by the stroke.
    Add,
    /// Cut the stroke out of the region.
    Remove,
}
