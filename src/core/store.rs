use hashbrown::HashMap;
use thiserror::Error;

use crate::{
    action::ActionRecord,
    annotation::{Annotation, AnnotationDraft, AnnotationPatch, Shape},
    persist::{AnnotationBackend, BackendError, BackendResult},
    types::{AnnotationId, BrushOp, ClassId, ImageId},
};

use super::history::{ActionLog, HistoryConfig};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no active image")]
    NoActiveImage,
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("{action} failed: {source}")]
    Replay {
        action: String,
        #[source]
        source: BackendError,
    },
}

type ReplayResult = Result<ActionRecord, (ActionRecord, BackendError)>;

/// Authoritative annotation list for the active slice.
///
/// Every mutation is delegated to the backend first; local state changes only
/// after the backend call succeeds, then exactly one record is added to the
/// undo log.
pub struct AnnotationStore<B> {
    backend: B,
    image_id: Option<ImageId>,
    annotations: Vec<Annotation>,
    pos: HashMap<AnnotationId, usize>,
    history: ActionLog,
    is_loading: bool,
    error: Option<String>,
}

impl<B: AnnotationBackend> AnnotationStore<B> {
    pub fn new(backend: B) -> Self {
        Self::with_history(backend, HistoryConfig::default())
    }

    pub fn with_history(backend: B, config: HistoryConfig) -> Self {
        Self {
            backend,
            image_id: None,
            annotations: Vec::new(),
            pos: HashMap::new(),
            history: ActionLog::with_config(config),
            is_loading: false,
            error: None,
        }
    }

    /// Switches to `image_id`, replacing the whole list and resetting history.
    ///
    /// A failed load leaves no active image, so later creates are refused.
    pub async fn load(&mut self, image_id: &str) -> Result<(), StoreError> {
        self.image_id = None;
        self.replace_all(Vec::new());
        self.history.clear();
        self.error = None;
        self.is_loading = true;

        let res = self.backend.load_annotations(image_id).await;
        self.is_loading = false;
        let annotations = self.note(res)?;
        self.image_id = Some(image_id.to_string());
        log::info!("store: loaded {} annotations for '{image_id}'", annotations.len());
        self.replace_all(annotations);
        Ok(())
    }

    pub async fn create(&mut self, draft: AnnotationDraft) -> Result<Annotation, StoreError> {
        self.error = None;
        let Some(image_id) = self.image_id.clone() else {
            self.error = Some(StoreError::NoActiveImage.to_string());
            return Err(StoreError::NoActiveImage);
        };

        let res = self.backend.create_annotation(&image_id, draft).await;
        let created = self.note(res)?;
        self.insert_local(created.clone());
        self.history.record(ActionRecord::Create {
            annotation: created.clone(),
        });
        Ok(created)
    }

    /// Deletes `id`. Returns `false` without any call when the id is unknown.
    pub async fn delete(&mut self, id: &str) -> Result<bool, StoreError> {
        self.error = None;
        let Some(snapshot) = self.get(id).cloned() else {
            return Ok(false);
        };

        let res = self.backend.delete_annotation(id).await;
        self.note(res)?;
        self.remove_local(id);
        self.history.record(ActionRecord::Delete {
            annotation: snapshot,
        });
        Ok(true)
    }

    /// Applies a sparse patch. A replacement segmentation always carries its
    /// recomputed bbox and area.
    pub async fn update(
        &mut self,
        id: &str,
        patch: AnnotationPatch,
    ) -> Result<Option<Annotation>, StoreError> {
        self.error = None;
        let Some(old) = self.get(id).cloned() else {
            return Ok(None);
        };

        let res = self.backend.update_annotation(id, patch.normalized()).await;
        let new = self.note(res)?;
        self.replace_local(new.clone());
        self.history.record(ActionRecord::Update {
            old,
            new: new.clone(),
        });
        Ok(Some(new))
    }

    /// Replaces `ids` with a single annotation covering their union.
    ///
    /// Fewer than two ids, or ids not in the active slice, are a silent no-op.
    pub async fn merge(
        &mut self,
        ids: &[AnnotationId],
        class_id: ClassId,
        class_name: &str,
    ) -> Result<Option<Annotation>, StoreError> {
        self.error = None;
        if ids.len() < 2 {
            return Ok(None);
        }
        let Some(sources) = ids
            .iter()
            .map(|id| self.get(id).cloned())
            .collect::<Option<Vec<_>>>()
        else {
            log::debug!("store: merge skipped, selection not in active slice");
            return Ok(None);
        };

        let res = self
            .backend
            .merge_annotations(ids, class_id, class_name)
            .await;
        let Some(merged) = self.note(res)? else {
            log::warn!("store: backend declined merge of {} annotations", ids.len());
            return Ok(None);
        };

        for id in ids {
            self.remove_local(id);
        }
        self.insert_local(merged.clone());
        self.history.record(ActionRecord::Merge {
            sources,
            merged: merged.clone(),
        });
        Ok(Some(merged))
    }

    /// Grows or cuts `id` by a brush stroke.
    ///
    /// A `Remove` stroke that consumes the whole region deletes the
    /// annotation and records a `Delete` holding the pre-stroke snapshot;
    /// `Ok(None)` is returned in that case and for unknown ids.
    ///
    /// If that follow-up delete fails, the collaborator still holds the
    /// empty shape. The local copy mirrors it, a `Brush` is recorded so undo
    /// can restore the prior shape, and the delete error is returned.
    pub async fn apply_brush(
        &mut self,
        id: &str,
        path: &[(f64, f64)],
        radius: f64,
        op: BrushOp,
    ) -> Result<Option<Annotation>, StoreError> {
        self.error = None;
        let Some(prior) = self.get(id).cloned() else {
            return Ok(None);
        };

        let res = self.backend.apply_brush(id, path, radius, op).await;
        let mut brushed = self.note(res)?;
        let posterior = Shape::from_segmentation(std::mem::take(&mut brushed.segmentation));
        brushed.segmentation = posterior.segmentation.clone();
        brushed.bbox = posterior.bbox;
        brushed.area = posterior.area;

        let erase = if posterior.is_empty() {
            match self.backend.delete_annotation(id).await {
                Ok(()) => {
                    self.remove_local(id);
                    self.history.record(ActionRecord::Delete { annotation: prior });
                    return Ok(None);
                }
                Err(err) => Err(err),
            }
        } else {
            Ok(())
        };

        self.replace_local(brushed.clone());
        self.history.record(ActionRecord::Brush {
            annotation_id: brushed.id.clone(),
            prior: prior.shape(),
            posterior,
        });
        self.note(erase)?;
        Ok(Some(brushed))
    }

    /// Reverts the most recent action. `Ok(false)` when there is nothing to undo.
    ///
    /// On failure the record goes back onto the undo stack, rebound to any
    /// ids that were re-created before the failure.
    pub async fn undo(&mut self) -> Result<bool, StoreError> {
        self.error = None;
        let Some(record) = self.history.pop_undo() else {
            return Ok(false);
        };
        let label = record.description();

        match self.revert(record).await {
            Ok(done) => {
                log::debug!("store: undid '{label}'");
                self.history.push_redo(done);
                Ok(true)
            }
            Err((record, source)) => {
                log::error!("store: undo of '{label}' failed: {source}");
                self.history.restore_undo(record);
                Err(self.replay_error(format!("undo '{label}'"), source))
            }
        }
    }

    /// Re-applies the most recently undone action. `Ok(false)` when there is
    /// nothing to redo.
    pub async fn redo(&mut self) -> Result<bool, StoreError> {
        self.error = None;
        let Some(record) = self.history.pop_redo() else {
            return Ok(false);
        };
        let label = record.description();

        match self.replay(record).await {
            Ok(done) => {
                log::debug!("store: redid '{label}'");
                self.history.push_undo(done);
                Ok(true)
            }
            Err((record, source)) => {
                log::error!("store: redo of '{label}' failed: {source}");
                self.history.restore_redo(record);
                Err(self.replay_error(format!("redo '{label}'"), source))
            }
        }
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn get(&self, id: &str) -> Option<&Annotation> {
        self.pos.get(id).and_then(|&i| self.annotations.get(i))
    }

    pub fn image_id(&self) -> Option<&str> {
        self.image_id.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn history(&self) -> &ActionLog {
        &self.history
    }

    /// Read access to the collaborator, e.g. for loading a neighbouring slice.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    async fn revert(&mut self, mut record: ActionRecord) -> ReplayResult {
        match record.clone() {
            ActionRecord::Create { annotation } => {
                if let Err(err) = self.ensure_absent(&annotation.id).await {
                    return Err((record, err));
                }
            }
            ActionRecord::Delete { annotation } => match self.ensure_present(&annotation).await {
                Ok(id) => record = self.rebound(record, &annotation.id, &id),
                Err(err) => return Err((record, err)),
            },
            ActionRecord::Update { old, new } => {
                if let Err(err) = self.overwrite(&new.id, AnnotationPatch::full(&old)).await {
                    return Err((record, err));
                }
            }
            ActionRecord::Merge { sources, merged } => {
                if let Err(err) = self.ensure_absent(&merged.id).await {
                    return Err((record, err));
                }
                for source in &sources {
                    match self.ensure_present(source).await {
                        Ok(id) => record = self.rebound(record, &source.id, &id),
                        Err(err) => return Err((record, err)),
                    }
                }
            }
            ActionRecord::Brush {
                annotation_id,
                prior,
                ..
            } => {
                if let Err(err) = self
                    .overwrite(&annotation_id, AnnotationPatch::with_shape(prior))
                    .await
                {
                    return Err((record, err));
                }
            }
        }
        Ok(record)
    }

    async fn replay(&mut self, mut record: ActionRecord) -> ReplayResult {
        match record.clone() {
            ActionRecord::Create { annotation } => match self.ensure_present(&annotation).await {
                Ok(id) => record = self.rebound(record, &annotation.id, &id),
                Err(err) => return Err((record, err)),
            },
            ActionRecord::Delete { annotation } => {
                if let Err(err) = self.ensure_absent(&annotation.id).await {
                    return Err((record, err));
                }
            }
            ActionRecord::Update { old, new } => {
                if let Err(err) = self.overwrite(&old.id, AnnotationPatch::full(&new)).await {
                    return Err((record, err));
                }
            }
            ActionRecord::Merge { sources, merged } => {
                if self.get(&merged.id).is_none() {
                    match self.remerge(&sources, &merged).await {
                        Ok(id) => record = self.rebound(record, &merged.id, &id),
                        Err(err) => return Err((record, err)),
                    }
                }
            }
            ActionRecord::Brush {
                annotation_id,
                posterior,
                ..
            } => {
                if let Err(err) = self
                    .overwrite(&annotation_id, AnnotationPatch::with_shape(posterior))
                    .await
                {
                    return Err((record, err));
                }
            }
        }
        Ok(record)
    }

    async fn ensure_absent(&mut self, id: &str) -> BackendResult<()> {
        if self.get(id).is_none() {
            log::debug!("store: '{id}' already absent");
            return Ok(());
        }
        self.backend.delete_annotation(id).await?;
        self.remove_local(id);
        Ok(())
    }

    async fn ensure_present(&mut self, ann: &Annotation) -> BackendResult<AnnotationId> {
        if self.get(&ann.id).is_some() {
            return Ok(ann.id.clone());
        }
        let created = self
            .backend
            .create_annotation(&ann.image_id, ann.to_draft())
            .await?;
        let id = created.id.clone();
        self.insert_local(created);
        Ok(id)
    }

    async fn overwrite(&mut self, id: &str, patch: AnnotationPatch) -> BackendResult<()> {
        let updated = self.backend.update_annotation(id, patch).await?;
        self.replace_local(updated);
        Ok(())
    }

    async fn remerge(
        &mut self,
        sources: &[Annotation],
        merged: &Annotation,
    ) -> BackendResult<AnnotationId> {
        let ids: Vec<AnnotationId> = sources.iter().map(|s| s.id.clone()).collect();
        let remerged = self
            .backend
            .merge_annotations(&ids, merged.class_id, &merged.class_name)
            .await?
            .ok_or_else(|| BackendError::Rejected("merge sources no longer available".to_string()))?;
        for id in &ids {
            self.remove_local(id);
        }
        let id = remerged.id.clone();
        self.insert_local(remerged);
        Ok(id)
    }

    fn rebound(&mut self, record: ActionRecord, old: &str, new: &str) -> ActionRecord {
        if old == new {
            return record;
        }
        log::debug!("store: rebinding '{old}' -> '{new}'");
        self.history.rebind(old, new);
        record.rebind(old, new)
    }

    fn note<T>(&mut self, res: BackendResult<T>) -> Result<T, StoreError> {
        res.map_err(|err| {
            log::warn!("store: backend call failed: {err}");
            self.error = Some(err.to_string());
            StoreError::Backend(err)
        })
    }

    fn replay_error(&mut self, action: String, source: BackendError) -> StoreError {
        let err = StoreError::Replay { action, source };
        self.error = Some(err.to_string());
        err
    }

    fn replace_all(&mut self, annotations: Vec<Annotation>) {
        self.annotations = annotations;
        self.reindex();
    }

    fn insert_local(&mut self, ann: Annotation) {
        self.pos.insert(ann.id.clone(), self.annotations.len());
        self.annotations.push(ann);
    }

    fn replace_local(&mut self, ann: Annotation) {
        match self.pos.get(&ann.id) {
            Some(&i) => self.annotations[i] = ann,
            None => self.insert_local(ann),
        }
    }

    fn remove_local(&mut self, id: &str) -> Option<Annotation> {
        let i = self.pos.remove(id)?;
        let removed = self.annotations.remove(i);
        self.reindex();
        Some(removed)
    }

    fn reindex(&mut self) {
        self.pos.clear();
        for (i, ann) in self.annotations.iter().enumerate() {
            self.pos.insert(ann.id.clone(), i);
        }
    }
}
