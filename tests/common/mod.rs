#![allow(dead_code)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use slicelabel::{
    annotation::{Annotation, AnnotationDraft, AnnotationPatch, Shape},
    persist::{AnnotationBackend, BackendError, BackendResult, memory::MemoryBackend},
    segment::{PreviewResult, SegmentationOracle},
    types::{AnnotationId, BrushOp, ClassId, PromptPoint, Segmentation},
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn square(x: f64, y: f64, size: f64) -> Segmentation {
    vec![vec![x, y, x + size, y, x + size, y + size, x, y + size]]
}

pub fn draft(class_id: ClassId, class_name: &str, seg: Segmentation) -> AnnotationDraft {
    AnnotationDraft::from_shape(class_id, class_name, Shape::from_segmentation(seg))
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

/// Memory collaborator whose calls can be switched to fail.
#[derive(Clone, Default)]
pub struct FlakyBackend {
    pub inner: MemoryBackend,
    failing: Arc<AtomicBool>,
    fail_deletes: Arc<AtomicBool>,
    merge_calls: Arc<AtomicUsize>,
}

impl FlakyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Fails only `delete_annotation`, leaving every other call working.
    pub fn set_failing_deletes(&self, failing: bool) {
        self.fail_deletes.store(failing, Ordering::SeqCst);
    }

    pub fn merge_calls(&self) -> usize {
        self.merge_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> BackendResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("switched off".to_string()));
        }
        Ok(())
    }
}

impl AnnotationBackend for FlakyBackend {
    async fn load_annotations(&self, image_id: &str) -> BackendResult<Vec<Annotation>> {
        self.check()?;
        self.inner.load_annotations(image_id).await
    }

    async fn create_annotation(
        &self,
        image_id: &str,
        draft: AnnotationDraft,
    ) -> BackendResult<Annotation> {
        self.check()?;
        self.inner.create_annotation(image_id, draft).await
    }

    async fn update_annotation(&self, id: &str, patch: AnnotationPatch) -> BackendResult<Annotation> {
        self.check()?;
        self.inner.update_annotation(id, patch).await
    }

    async fn delete_annotation(&self, id: &str) -> BackendResult<()> {
        self.check()?;
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("deletes switched off".to_string()));
        }
        self.inner.delete_annotation(id).await
    }

    async fn merge_annotations(
        &self,
        ids: &[AnnotationId],
        class_id: ClassId,
        class_name: &str,
    ) -> BackendResult<Option<Annotation>> {
        self.check()?;
        self.merge_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.merge_annotations(ids, class_id, class_name).await
    }

    async fn apply_brush(
        &self,
        id: &str,
        path: &[(f64, f64)],
        radius: f64,
        op: BrushOp,
    ) -> BackendResult<Annotation> {
        self.check()?;
        self.inner.apply_brush(id, path, radius, op).await
    }
}

#[derive(Debug, Default)]
pub struct OracleLog {
    pub encoded: Vec<String>,
    pub prompts: Vec<Vec<PromptPoint>>,
    pub exclusions: Vec<usize>,
}

/// Oracle answering with a square of `half_size` around the first positive
/// prompt after `delay`. Exclusions are recorded but ignored.
#[derive(Clone)]
pub struct MockOracle {
    pub half_size: f64,
    pub delay: Duration,
    log: Arc<Mutex<OracleLog>>,
    failing: Arc<AtomicBool>,
}

impl Default for MockOracle {
    fn default() -> Self {
        Self {
            half_size: 10.0,
            delay: Duration::ZERO,
            log: Arc::default(),
            failing: Arc::default(),
        }
    }
}

impl MockOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn encode_calls(&self) -> usize {
        self.log.lock().unwrap().encoded.len()
    }

    pub fn segment_calls(&self) -> usize {
        self.log.lock().unwrap().prompts.len()
    }

    pub fn last_prompts(&self) -> Vec<PromptPoint> {
        self.log.lock().unwrap().prompts.last().cloned().unwrap_or_default()
    }

    pub fn exclusion_counts(&self) -> Vec<usize> {
        self.log.lock().unwrap().exclusions.clone()
    }
}

impl SegmentationOracle for MockOracle {
    async fn encode_image(&self, image_id: &str) -> BackendResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("oracle down".to_string()));
        }
        self.log.lock().unwrap().encoded.push(image_id.to_string());
        Ok(())
    }

    async fn segment_image(
        &self,
        _image_id: &str,
        points: &[PromptPoint],
        exclusions: Option<&[Segmentation]>,
    ) -> BackendResult<PreviewResult> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("oracle down".to_string()));
        }
        {
            let mut log = self.log.lock().unwrap();
            log.prompts.push(points.to_vec());
            log.exclusions.push(exclusions.map_or(0, <[Segmentation]>::len));
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let anchor = points
            .iter()
            .find(|p| p.is_positive)
            .ok_or_else(|| BackendError::Rejected("no positive prompt".to_string()))?;
        let h = self.half_size;
        let seg = square(anchor.x - h, anchor.y - h, 2.0 * h);
        let shape = Shape::from_segmentation(seg);
        Ok(PreviewResult::from_shape(shape, 0.9))
    }
}
