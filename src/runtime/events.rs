//! Runtime event stream payloads.

use crate::types::{AnnotationId, ImageId};

/// Events emitted from the single-writer editor loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorEvent {
    /// A slice was loaded.
    Loaded {
        /// Active image.
        image_id: ImageId,
        /// Number of annotations loaded.
        count: usize,
    },
    /// An annotation was created.
    Created {
        /// Created annotation id.
        id: AnnotationId,
    },
    /// An annotation was deleted.
    Deleted {
        /// Deleted annotation id.
        id: AnnotationId,
    },
    /// An annotation was updated.
    Updated {
        /// Updated annotation id.
        id: AnnotationId,
    },
    /// Several annotations were merged into one.
    Merged {
        /// Resulting annotation id.
        id: AnnotationId,
        /// Ids that no longer exist.
        sources: Vec<AnnotationId>,
    },
    /// A brush stroke changed an annotation.
    Brushed {
        /// Brushed annotation id.
        id: AnnotationId,
    },
    /// One undo step was applied.
    UndoApplied,
    /// One redo step was applied.
    RedoApplied,
}
