use crate::{
    annotation::Annotation,
    core::store::AnnotationStore,
    persist::{AnnotationBackend, SettingsStore},
    segment::{SegmentationOracle, orchestrator::SegmentationOrchestrator},
    types::Segmentation,
};

use super::{
    ConfirmedPreview, TransferError, TransferSettings, TransferState, points::PointGenerator,
};

/// Step-wise transfer of the previous slice's annotations onto the active one.
///
/// Idle until [`start`](Self::start); then each source annotation is turned
/// into prompt points, segmented on the active slice with everything already
/// claimed excluded, and either confirmed or skipped. Nothing reaches the
/// store until [`commit`](Self::commit).
pub struct TransferWorkflow<P, S> {
    generator: P,
    settings_store: S,
    settings: TransferSettings,
    state: Option<TransferState>,
    is_loading: bool,
    error: Option<String>,
}

impl<P: PointGenerator, S: SettingsStore> TransferWorkflow<P, S> {
    /// Builds an idle workflow, reading settings from `settings_store`.
    pub fn new(generator: P, settings_store: S) -> Self {
        let settings = match TransferSettings::load(&settings_store) {
            Ok(settings) => settings,
            Err(err) => {
                log::warn!("transfer: stored settings unreadable, using defaults: {err}");
                TransferSettings::default()
            }
        };
        Self {
            generator,
            settings_store,
            settings,
            state: None,
            is_loading: false,
            error: None,
        }
    }

    /// Snapshots `previous_image`'s annotations and previews the first one.
    ///
    /// Stays idle when there is no previous slice or it has nothing to
    /// transfer. A failing first generation leaves the workflow active with
    /// no preview so the user can skip.
    pub async fn start<B, O>(
        &mut self,
        previous_image: Option<&str>,
        store: &AnnotationStore<B>,
        segmenter: &mut SegmentationOrchestrator<O>,
    ) -> Result<(), TransferError>
    where
        B: AnnotationBackend,
        O: SegmentationOracle,
    {
        self.error = None;
        if self.state.is_some() {
            return Err(self.fail(TransferError::AlreadyActive));
        }
        let Some(previous_image) = previous_image else {
            return Err(self.fail(TransferError::NoPreviousSlice));
        };
        if store.image_id().is_none() {
            return Err(self.fail(TransferError::NoActiveImage));
        }

        self.is_loading = true;
        let loaded = store.backend().load_annotations(previous_image).await;
        self.is_loading = false;
        let sources = match loaded {
            Ok(sources) => sources,
            Err(err) => return Err(self.fail(err.into())),
        };
        if sources.is_empty() {
            return Err(self.fail(TransferError::NothingToTransfer));
        }

        log::info!(
            "transfer: started with {} annotations from '{previous_image}'",
            sources.len()
        );
        self.state = Some(TransferState {
            source_annotations: sources,
            current_index: 0,
            confirmed_previews: Vec::new(),
            settings: self.settings,
        });
        self.generate_current(store, segmenter).await
    }

    /// Accepts the current preview for the current source and advances.
    pub async fn confirm_current<B, O>(
        &mut self,
        store: &AnnotationStore<B>,
        segmenter: &mut SegmentationOrchestrator<O>,
    ) -> Result<(), TransferError>
    where
        B: AnnotationBackend,
        O: SegmentationOracle,
    {
        self.error = None;
        let Some(state) = self.state.as_mut() else {
            return Err(self.fail(TransferError::NotActive));
        };
        let (Some(source), Some(preview)) = (state.current_source(), segmenter.preview()) else {
            return Err(self.fail(TransferError::NoPreview));
        };

        let confirmed = ConfirmedPreview::new(preview, source);
        log::debug!("transfer: confirmed preview for source '{}'", confirmed.source_id);
        state.confirmed_previews.push(confirmed);
        self.advance(store, segmenter).await
    }

    /// Moves past the current source without keeping anything.
    pub async fn skip_current<B, O>(
        &mut self,
        store: &AnnotationStore<B>,
        segmenter: &mut SegmentationOrchestrator<O>,
    ) -> Result<(), TransferError>
    where
        B: AnnotationBackend,
        O: SegmentationOracle,
    {
        self.error = None;
        let Some(state) = self.state.as_ref() else {
            return Err(self.fail(TransferError::NotActive));
        };
        if state.all_processed() {
            return Ok(());
        }
        self.advance(store, segmenter).await
    }

    /// Steps back one source, saturating at the first, and regenerates.
    ///
    /// Confirmed previews are kept.
    pub async fn prev_annotation<B, O>(
        &mut self,
        store: &AnnotationStore<B>,
        segmenter: &mut SegmentationOrchestrator<O>,
    ) -> Result<(), TransferError>
    where
        B: AnnotationBackend,
        O: SegmentationOracle,
    {
        self.error = None;
        let Some(state) = self.state.as_mut() else {
            return Err(self.fail(TransferError::NotActive));
        };
        state.current_index = state.current_index.saturating_sub(1);
        self.generate_current(store, segmenter).await
    }

    /// Drops the confirmed preview at `index`, if present.
    pub fn remove_confirmed(&mut self, index: usize) -> Option<ConfirmedPreview> {
        let state = self.state.as_mut()?;
        (index < state.confirmed_previews.len()).then(|| state.confirmed_previews.remove(index))
    }

    /// Updates and persists the point counts.
    ///
    /// While a transfer is active with a step in view, the current preview is
    /// regenerated with the new counts unless a generation is already in
    /// flight. Returns whether a regeneration ran.
    pub async fn set_settings<B, O>(
        &mut self,
        settings: TransferSettings,
        store: &AnnotationStore<B>,
        segmenter: &mut SegmentationOrchestrator<O>,
    ) -> Result<bool, TransferError>
    where
        B: AnnotationBackend,
        O: SegmentationOracle,
    {
        let settings = settings.clamped();
        if settings == self.settings {
            return Ok(false);
        }
        self.settings = settings;
        if let Err(err) = settings.save(&mut self.settings_store) {
            log::warn!("transfer: saving settings failed: {err}");
        }

        let Some(state) = self.state.as_mut() else {
            return Ok(false);
        };
        state.settings = settings;
        if self.is_loading || state.all_processed() {
            return Ok(false);
        }
        self.generate_current(store, segmenter).await?;
        Ok(true)
    }

    /// Creates one annotation per confirmed preview, in confirmation order.
    ///
    /// Each created entry leaves the confirmed list immediately. On failure
    /// the rest stay pending and the workflow stays active, so a retry never
    /// duplicates. On success the workflow returns to idle.
    pub async fn commit<B, O>(
        &mut self,
        store: &mut AnnotationStore<B>,
        segmenter: &mut SegmentationOrchestrator<O>,
    ) -> Result<usize, TransferError>
    where
        B: AnnotationBackend,
        O: SegmentationOracle,
    {
        self.error = None;
        let Some(state) = self.state.as_mut() else {
            return Err(self.fail(TransferError::NotActive));
        };

        let mut committed = 0;
        while let Some(entry) = state.confirmed_previews.first() {
            match store.create(entry.to_draft()).await {
                Ok(created) => {
                    log::debug!("transfer: committed '{}' as '{}'", entry.source_id, created.id);
                    state.confirmed_previews.remove(0);
                    committed += 1;
                }
                Err(source) => {
                    log::error!("transfer: commit stopped after {committed} annotations: {source}");
                    let err = TransferError::PartialCommit { committed, source };
                    self.error = Some(err.to_string());
                    return Err(err);
                }
            }
        }

        log::info!("transfer: committed {committed} annotations");
        self.cancel(segmenter);
        Ok(committed)
    }

    /// Discards all transfer state and clears the preview.
    pub fn cancel<O: SegmentationOracle>(&mut self, segmenter: &mut SegmentationOrchestrator<O>) {
        if self.state.take().is_some() {
            log::debug!("transfer: cancelled");
        }
        self.is_loading = false;
        segmenter.clear_preview();
    }

    pub fn is_active(&self) -> bool {
        self.state.is_some()
    }

    pub fn state(&self) -> Option<&TransferState> {
        self.state.as_ref()
    }

    pub fn current_source(&self) -> Option<&Annotation> {
        self.state.as_ref().and_then(TransferState::current_source)
    }

    pub fn confirmed(&self) -> &[ConfirmedPreview] {
        self.state
            .as_ref()
            .map(|s| s.confirmed_previews.as_slice())
            .unwrap_or_default()
    }

    /// `(current_index, total)` while active.
    pub fn progress(&self) -> Option<(usize, usize)> {
        self.state
            .as_ref()
            .map(|s| (s.current_index, s.source_annotations.len()))
    }

    pub fn is_all_processed(&self) -> bool {
        self.state.as_ref().is_some_and(TransferState::all_processed)
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn settings(&self) -> TransferSettings {
        self.settings
    }

    pub fn settings_store(&self) -> &S {
        &self.settings_store
    }

    async fn advance<B, O>(
        &mut self,
        store: &AnnotationStore<B>,
        segmenter: &mut SegmentationOrchestrator<O>,
    ) -> Result<(), TransferError>
    where
        B: AnnotationBackend,
        O: SegmentationOracle,
    {
        let Some(state) = self.state.as_mut() else {
            return Err(TransferError::NotActive);
        };
        state.current_index += 1;
        if state.all_processed() {
            log::info!(
                "transfer: all {} sources processed, {} confirmed",
                state.source_annotations.len(),
                state.confirmed_previews.len()
            );
            segmenter.clear_preview();
            return Ok(());
        }
        self.generate_current(store, segmenter).await
    }

    async fn generate_current<B, O>(
        &mut self,
        store: &AnnotationStore<B>,
        segmenter: &mut SegmentationOrchestrator<O>,
    ) -> Result<(), TransferError>
    where
        B: AnnotationBackend,
        O: SegmentationOracle,
    {
        let Some(state) = self.state.as_ref() else {
            return Err(TransferError::NotActive);
        };
        let Some(source) = state.current_source().cloned() else {
            segmenter.clear_preview();
            return Ok(());
        };
        let Some(image_id) = store.image_id().map(str::to_string) else {
            return Err(self.fail(TransferError::NoActiveImage));
        };

        let exclusions: Vec<Segmentation> = store
            .annotations()
            .iter()
            .map(|a| a.segmentation.clone())
            .chain(state.confirmed_previews.iter().map(|c| c.polygon.clone()))
            .collect();
        let settings = state.settings;

        // a stale preview must never be confirmed against the new source
        segmenter.clear_preview();
        self.is_loading = true;
        let res = async {
            let points = self
                .generator
                .generate_transfer_points(
                    &source.segmentation,
                    &source.bbox,
                    settings.positive_points,
                    settings.negative_points,
                )
                .await?;
            segmenter
                .segment(&image_id, &points.into_prompts(), Some(exclusions.as_slice()))
                .await?;
            Ok::<_, TransferError>(())
        }
        .await;
        self.is_loading = false;

        if let Err(err) = res {
            log::warn!("transfer: preview for source '{}' failed: {err}", source.id);
            return Err(self.fail(err));
        }
        Ok(())
    }

    fn fail(&mut self, err: TransferError) -> TransferError {
        self.error = Some(err.to_string());
        err
    }
}
