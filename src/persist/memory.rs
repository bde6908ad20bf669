//! In-process annotation collaborator.

use std::sync::Arc;

use hashbrown::HashMap;
use tokio::sync::Mutex;

use crate::{
    annotation::{Annotation, AnnotationDraft, AnnotationPatch},
    types::{AnnotationId, BrushOp, ClassId, ImageId},
};

use super::{
    AnnotationBackend, BackendError, BackendResult, SettingsStore, brushed_shape, merged_shape,
    now_ms, owning_image,
};

#[derive(Debug, Default)]
struct Inner {
    by_image: HashMap<ImageId, Vec<Annotation>>,
    next_id: u64,
}

impl Inner {
    fn next_id(&mut self) -> AnnotationId {
        self.next_id += 1;
        format!("ann-{}", self.next_id)
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut Annotation> {
        self.by_image
            .values_mut()
            .flat_map(|anns| anns.iter_mut())
            .find(|a| a.id == id)
    }

    fn find(&self, id: &str) -> Option<&Annotation> {
        self.by_image
            .values()
            .flat_map(|anns| anns.iter())
            .find(|a| a.id == id)
    }

    fn remove(&mut self, id: &str) -> Option<Annotation> {
        for anns in self.by_image.values_mut() {
            if let Some(pos) = anns.iter().position(|a| a.id == id) {
                return Some(anns.remove(pos));
            }
        }
        None
    }

    fn insert(&mut self, image_id: &str, draft: AnnotationDraft) -> Annotation {
        let id = self.next_id();
        let ann = draft.into_annotation(id, image_id.to_string(), now_ms());
        self.by_image
            .entry(image_id.to_string())
            .or_default()
            .push(ann.clone());
        ann
    }
}

/// Annotation collaborator that keeps everything in memory.
///
/// Merge and brush geometry are computed here, the way a server would.
/// Clones share the same underlying data.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of annotations across all images.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.by_image.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl AnnotationBackend for MemoryBackend {
    async fn load_annotations(&self, image_id: &str) -> BackendResult<Vec<Annotation>> {
        let inner = self.inner.lock().await;
        Ok(inner.by_image.get(image_id).cloned().unwrap_or_default())
    }

    async fn create_annotation(
        &self,
        image_id: &str,
        draft: AnnotationDraft,
    ) -> BackendResult<Annotation> {
        let mut inner = self.inner.lock().await;
        Ok(inner.insert(image_id, draft))
    }

    async fn update_annotation(&self, id: &str, patch: AnnotationPatch) -> BackendResult<Annotation> {
        let mut inner = self.inner.lock().await;
        let ann = inner
            .find_mut(id)
            .ok_or_else(|| BackendError::NotFound(id.to_string()))?;
        patch.normalized().apply_to(ann);
        Ok(ann.clone())
    }

    async fn delete_annotation(&self, id: &str) -> BackendResult<()> {
        let mut inner = self.inner.lock().await;
        inner
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| BackendError::NotFound(id.to_string()))
    }

    async fn merge_annotations(
        &self,
        ids: &[AnnotationId],
        class_id: ClassId,
        class_name: &str,
    ) -> BackendResult<Option<Annotation>> {
        if ids.len() < 2 {
            return Ok(None);
        }

        let mut inner = self.inner.lock().await;
        let Some(sources) = ids
            .iter()
            .map(|id| inner.find(id).cloned())
            .collect::<Option<Vec<_>>>()
        else {
            return Ok(None);
        };
        let Some(image_id) = owning_image(&sources) else {
            return Ok(None);
        };
        let Some(shape) = merged_shape(&sources) else {
            return Ok(None);
        };

        for id in ids {
            inner.remove(id);
        }
        let draft = AnnotationDraft::from_shape(class_id, class_name, shape);
        Ok(Some(inner.insert(&image_id, draft)))
    }

    async fn apply_brush(
        &self,
        id: &str,
        path: &[(f64, f64)],
        radius: f64,
        op: BrushOp,
    ) -> BackendResult<Annotation> {
        let mut inner = self.inner.lock().await;
        let ann = inner
            .find_mut(id)
            .ok_or_else(|| BackendError::NotFound(id.to_string()))?;
        let shape = brushed_shape(ann, path, radius, op)?;
        ann.segmentation = shape.segmentation;
        ann.bbox = shape.bbox;
        ann.area = shape.area;
        Ok(ann.clone())
    }
}

/// Settings kept in a plain map.
#[derive(Debug, Clone, Default)]
pub struct MemorySettings {
    values: HashMap<String, String>,
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> BackendResult<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> BackendResult<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
