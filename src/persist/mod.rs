pub mod memory;
pub mod sqlite;

use std::future::Future;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::{
    annotation::{Annotation, AnnotationDraft, AnnotationPatch, Shape},
    geometry,
    types::{AnnotationId, BrushOp, ClassId, ImageId},
};

/// Failure of any delegated collaborator call.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("annotation '{0}' not found")]
    NotFound(AnnotationId),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Persistence collaborator for annotations.
///
/// Calls may fail and are never retried by the engine.
pub trait AnnotationBackend: Send + Sync {
    fn load_annotations(
        &self,
        image_id: &str,
    ) -> impl Future<Output = BackendResult<Vec<Annotation>>> + Send;

    /// Stores a new annotation and assigns its id.
    fn create_annotation(
        &self,
        image_id: &str,
        draft: AnnotationDraft,
    ) -> impl Future<Output = BackendResult<Annotation>> + Send;

    fn update_annotation(
        &self,
        id: &str,
        patch: AnnotationPatch,
    ) -> impl Future<Output = BackendResult<Annotation>> + Send;

    fn delete_annotation(&self, id: &str) -> impl Future<Output = BackendResult<()>> + Send;

    /// Replaces `ids` with one annotation covering their union.
    ///
    /// `Ok(None)` when fewer than two ids are given, any id is unknown, or the
    /// annotations span several images.
    fn merge_annotations(
        &self,
        ids: &[AnnotationId],
        class_id: ClassId,
        class_name: &str,
    ) -> impl Future<Output = BackendResult<Option<Annotation>>> + Send;

    /// Grows or cuts an annotation by a round brush stroke. A fully consumed
    /// annotation comes back with an empty segmentation.
    fn apply_brush(
        &self,
        id: &str,
        path: &[(f64, f64)],
        radius: f64,
        op: BrushOp,
    ) -> impl Future<Output = BackendResult<Annotation>> + Send;
}

/// Key-value hooks for small pieces of local configuration.
pub trait SettingsStore {
    fn get(&self, key: &str) -> BackendResult<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> BackendResult<()>;
}

/// Union of the sources' regions, `None` when nothing is covered.
pub(crate) fn merged_shape(sources: &[Annotation]) -> Option<Shape> {
    let seg = geometry::union_all(sources.iter().map(|a| &a.segmentation));
    (!seg.is_empty()).then(|| Shape::from_segmentation(seg))
}

pub(crate) fn brushed_shape(
    ann: &Annotation,
    path: &[(f64, f64)],
    radius: f64,
    op: BrushOp,
) -> BackendResult<Shape> {
    if path.is_empty() || radius.is_nan() || radius <= 0.0 {
        return Err(BackendError::Rejected("empty brush stroke".to_string()));
    }
    let seg = geometry::apply_stroke(&ann.segmentation, path, radius, op);
    Ok(Shape::from_segmentation(seg))
}

pub(crate) fn owning_image(annotations: &[Annotation]) -> Option<ImageId> {
    let first = annotations.first()?;
    annotations
        .iter()
        .all(|a| a.image_id == first.image_id)
        .then(|| first.image_id.clone())
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
