use serde::{Deserialize, Serialize};
use tokio::{sync::watch, time::Duration};

use crate::{
    annotation::Shape,
    geometry,
    types::{ImageId, PromptPoint, Segmentation},
};

use super::{
    PreviewResult, PreviewState, PromptRequest, SegmentError, SegmentationOracle,
    debounce::Debounced,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Quiet window for debounced prompt edits, in milliseconds.
    pub quiet_window_ms: u64,
    /// Subtract the exclusion set from oracle output locally as well.
    pub clip_exclusions: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            quiet_window_ms: 100,
            clip_exclusions: true,
        }
    }
}

impl OrchestratorConfig {
    pub fn quiet_window(&self) -> Duration {
        Duration::from_millis(self.quiet_window_ms)
    }
}

/// Drives the segmentation oracle and owns the single current preview.
///
/// The oracle's per-image preparation is memoized in a one-slot cache that
/// only [`reset_encoder`](Self::reset_encoder) or a different image
/// invalidates.
pub struct SegmentationOrchestrator<O> {
    oracle: O,
    config: OrchestratorConfig,
    encoded_image: Option<ImageId>,
    state: PreviewState,
    state_tx: watch::Sender<PreviewState>,
}

impl<O: SegmentationOracle> SegmentationOrchestrator<O> {
    pub fn new(oracle: O) -> Self {
        Self::with_config(oracle, OrchestratorConfig::default())
    }

    pub fn with_config(oracle: O, config: OrchestratorConfig) -> Self {
        let (state_tx, _) = watch::channel(PreviewState::default());
        Self {
            oracle,
            config,
            encoded_image: None,
            state: PreviewState::default(),
            state_tx,
        }
    }

    /// Prepares `image_id` unless it is already the cached image.
    pub async fn encode(&mut self, image_id: &str) -> Result<(), SegmentError> {
        if self.encoded_image.as_deref() == Some(image_id) {
            log::debug!("segment: encoder cache hit for '{image_id}'");
            return Ok(());
        }

        self.state.is_encoding = true;
        self.publish();
        let res = self.oracle.encode_image(image_id).await;
        self.state.is_encoding = false;

        match res {
            Ok(()) => {
                log::debug!("segment: encoded '{image_id}'");
                self.encoded_image = Some(image_id.to_string());
                self.publish();
                Ok(())
            }
            Err(err) => {
                log::warn!("segment: encoding '{image_id}' failed: {err}");
                self.state.error = Some(err.to_string());
                self.publish();
                Err(err.into())
            }
        }
    }

    /// Runs inference for the full prompt set and stores the result as the
    /// current preview. An empty prompt set clears the preview without any call.
    pub async fn segment(
        &mut self,
        image_id: &str,
        points: &[PromptPoint],
        exclusions: Option<&[Segmentation]>,
    ) -> Result<Option<PreviewResult>, SegmentError> {
        if points.is_empty() {
            self.clear_preview();
            return Ok(None);
        }

        self.encode(image_id).await?;

        self.state.is_segmenting = true;
        self.publish();
        let res = self
            .oracle
            .segment_image(image_id, points, exclusions)
            .await;
        self.state.is_segmenting = false;

        let preview = match res {
            Ok(preview) => preview,
            Err(err) => {
                log::warn!("segment: inference on '{image_id}' failed: {err}");
                self.state.error = Some(err.to_string());
                self.publish();
                return Err(err.into());
            }
        };

        let preview = match exclusions {
            Some(excluded) if self.config.clip_exclusions && !excluded.is_empty() => {
                clip_to_free_area(preview, excluded)
            }
            _ => preview,
        };

        self.state.error = None;
        self.state.preview = Some(preview.clone());
        self.publish();
        Ok(Some(preview))
    }

    /// Consumes debounced prompt sets until every sender is dropped.
    ///
    /// An inference call that is already running is not interrupted by newer
    /// prompts; its result still becomes the preview.
    pub async fn run_debounced(&mut self, requests: &mut Debounced<PromptRequest>) {
        while let Some(req) = requests.recv().await {
            let res = self
                .segment(&req.image_id, &req.points, req.exclusions.as_deref())
                .await;
            if let Err(err) = res {
                log::warn!("segment: debounced request dropped: {err}");
            }
        }
    }

    pub fn clear_preview(&mut self) {
        if self.state.preview.take().is_some() {
            self.publish();
        }
    }

    /// Invalidates the encoder cache and clears the preview. Call on slice switch.
    pub fn reset_encoder(&mut self) {
        self.encoded_image = None;
        self.state.preview = None;
        self.state.error = None;
        self.publish();
    }

    pub fn preview(&self) -> Option<&PreviewResult> {
        self.state.preview.as_ref()
    }

    pub fn encoded_image(&self) -> Option<&str> {
        self.encoded_image.as_deref()
    }

    pub fn state(&self) -> &PreviewState {
        &self.state
    }

    pub fn error(&self) -> Option<&str> {
        self.state.error.as_deref()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Receiver that always holds the latest [`PreviewState`].
    pub fn subscribe(&self) -> watch::Receiver<PreviewState> {
        self.state_tx.subscribe()
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.state.clone());
    }
}

fn clip_to_free_area(preview: PreviewResult, excluded: &[Segmentation]) -> PreviewResult {
    let claimed = geometry::union_all(excluded);
    if claimed.is_empty() {
        return preview;
    }
    let free = geometry::difference(&preview.polygon, &claimed);
    PreviewResult::from_shape(Shape::from_segmentation(free), preview.score)
}
