//! Reversible action records kept by the undo/redo log.

use serde::{Deserialize, Serialize};

use crate::annotation::{Annotation, Shape};
use crate::types::AnnotationId;

/// Immutable description of one reversible store mutation.
///
/// Each record carries everything needed to replay it forward or backward
/// without re-reading the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionRecord {
    /// An annotation was created.
    Create {
        /// Created annotation.
        annotation: Annotation,
    },
    /// An annotation was deleted.
    Delete {
        /// Snapshot taken before deletion.
        annotation: Annotation,
    },
    /// An annotation was replaced field-wise.
    Update {
        /// State before the update.
        old: Annotation,
        /// State after the update.
        new: Annotation,
    },
    /// Several annotations were merged into one.
    Merge {
        /// Snapshots of the merged inputs, in selection order.
        sources: Vec<Annotation>,
        /// Resulting annotation.
        merged: Annotation,
    },
    /// A brush stroke changed an annotation's geometry.
    Brush {
        /// Brushed annotation.
        annotation_id: AnnotationId,
        /// Geometry before the stroke.
        prior: Shape,
        /// Geometry after the stroke.
        posterior: Shape,
    },
}

impl ActionRecord {
    /// Human-readable description for menus and logs.
    pub fn description(&self) -> String {
        match self {
            ActionRecord::Create { annotation } => {
                format!("Create '{}'", annotation.class_name)
            }
            ActionRecord::Delete { annotation } => {
                format!("Delete '{}'", annotation.class_name)
            }
            ActionRecord::Update { .. } => "Update annotation".to_string(),
            ActionRecord::Merge { sources, .. } => format!("Merge {} annotations", sources.len()),
            ActionRecord::Brush { .. } => "Brush stroke".to_string(),
        }
    }

    /// True when any annotation id in this record equals `id`.
    pub fn references(&self, id: &str) -> bool {
        match self {
            ActionRecord::Create { annotation } | ActionRecord::Delete { annotation } => {
                annotation.id == id
            }
            ActionRecord::Update { old, new } => old.id == id || new.id == id,
            ActionRecord::Merge { sources, merged } => {
                merged.id == id || sources.iter().any(|s| s.id == id)
            }
            ActionRecord::Brush { annotation_id, .. } => annotation_id == id,
        }
    }

    /// Returns a copy with every occurrence of `old` replaced by `new`.
    ///
    /// Recreating a deleted annotation yields a fresh collaborator id, so
    /// records that still name the old id must be rebound before replay.
    pub fn rebind(&self, old: &str, new: &str) -> Self {
        let swap = |ann: &Annotation| {
            let mut ann = ann.clone();
            if ann.id == old {
                ann.id = new.to_string();
            }
            ann
        };

        match self {
            ActionRecord::Create { annotation } => ActionRecord::Create {
                annotation: swap(annotation),
            },
            ActionRecord::Delete { annotation } => ActionRecord::Delete {
                annotation: swap(annotation),
            },
            ActionRecord::Update { old: before, new: after } => ActionRecord::Update {
                old: swap(before),
                new: swap(after),
            },
            ActionRecord::Merge { sources, merged } => ActionRecord::Merge {
                sources: sources.iter().map(swap).collect(),
                merged: swap(merged),
            },
            ActionRecord::Brush {
                annotation_id,
                prior,
                posterior,
            } => ActionRecord::Brush {
                annotation_id: if annotation_id == old {
                    new.to_string()
                } else {
                    annotation_id.clone()
                },
                prior: prior.clone(),
                posterior: posterior.clone(),
            },
        }
    }
}
