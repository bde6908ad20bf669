//! Cross-slice label transfer: settings, prompt generation, and the
//! step-wise workflow that re-derives each previous-slice annotation.

pub mod points;
pub mod workflow;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    annotation::{Annotation, AnnotationDraft},
    core::store::StoreError,
    persist::{BackendError, BackendResult, SettingsStore},
    segment::{PreviewResult, SegmentError},
    types::{AnnotationId, BBox, ClassId, Segmentation},
};

/// Key under which [`TransferSettings`] are persisted.
pub const SETTINGS_KEY: &str = "transfer.settings";

/// Prompt point counts used when generating transfer prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    /// Foreground prompts per annotation, `1..=3`.
    pub positive_points: u8,
    /// Background prompts per annotation, `0..=3`.
    pub negative_points: u8,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            positive_points: 3,
            negative_points: 1,
        }
    }
}

impl TransferSettings {
    pub const MAX_POSITIVE: u8 = 3;
    pub const MAX_NEGATIVE: u8 = 3;

    /// Forces both counts into their supported ranges.
    pub fn clamped(self) -> Self {
        Self {
            positive_points: self.positive_points.clamp(1, Self::MAX_POSITIVE),
            negative_points: self.negative_points.min(Self::MAX_NEGATIVE),
        }
    }

    /// Reads persisted settings, falling back to defaults when none are stored.
    pub fn load(store: &impl SettingsStore) -> BackendResult<Self> {
        match store.get(SETTINGS_KEY)? {
            Some(raw) => Ok(serde_json::from_str::<Self>(&raw)?.clamped()),
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, store: &mut impl SettingsStore) -> BackendResult<()> {
        let raw = serde_json::to_string(self)?;
        store.set(SETTINGS_KEY, &raw)
    }
}

/// A preview the user accepted for one source annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedPreview {
    /// Accepted region.
    pub polygon: Segmentation,
    /// Tight box over `polygon`.
    pub bbox: BBox,
    /// Covered area of `polygon`.
    pub area: f64,
    /// Class inherited from the source annotation.
    pub class_id: ClassId,
    /// Class name inherited from the source annotation.
    pub class_name: String,
    /// Source annotation on the previous slice.
    pub source_id: AnnotationId,
}

impl ConfirmedPreview {
    pub fn new(preview: &PreviewResult, source: &Annotation) -> Self {
        Self {
            polygon: preview.polygon.clone(),
            bbox: preview.bbox,
            area: preview.area,
            class_id: source.class_id,
            class_name: source.class_name.clone(),
            source_id: source.id.clone(),
        }
    }

    pub fn to_draft(&self) -> AnnotationDraft {
        AnnotationDraft {
            class_id: self.class_id,
            class_name: self.class_name.clone(),
            segmentation: self.polygon.clone(),
            bbox: self.bbox,
            area: self.area,
        }
    }
}

/// Progress of an active transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferState {
    /// Snapshot of the previous slice's annotations.
    pub source_annotations: Vec<Annotation>,
    /// Index of the source annotation being reviewed.
    pub current_index: usize,
    /// Accepted previews, in confirmation order.
    pub confirmed_previews: Vec<ConfirmedPreview>,
    /// Point counts used for the current step.
    pub settings: TransferSettings,
}

impl TransferState {
    pub fn current_source(&self) -> Option<&Annotation> {
        self.source_annotations.get(self.current_index)
    }

    /// True once every source annotation was confirmed or skipped.
    pub fn all_processed(&self) -> bool {
        self.current_index >= self.source_annotations.len()
    }
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("a transfer is already in progress")]
    AlreadyActive,
    #[error("no transfer in progress")]
    NotActive,
    #[error("there is no previous slice to transfer from")]
    NoPreviousSlice,
    #[error("the previous slice has no annotations to transfer")]
    NothingToTransfer,
    #[error("no active image")]
    NoActiveImage,
    #[error("no preview to confirm")]
    NoPreview,
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Segment(#[from] SegmentError),
    #[error("committed {committed} annotations before failing: {source}")]
    PartialCommit {
        committed: usize,
        #[source]
        source: StoreError,
    },
}
