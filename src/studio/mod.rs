// src/studio/mod.rs

pub mod slice;
pub mod state;

use crate::errors::StudioError;
use crate::models::{AnalysisResult, ArtDirectionRequest, AspectRatio, DesignPlan, Quality};
use crate::services::{GenerationJob, GenerativeClient};
use futures_util::future::join_all;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::Mutex;

pub use slice::Ticket;
pub use state::StudioState;

/// Parameters of one Generate Images submission.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub job: GenerationJob,
    pub batch_size: u8,
    /// Append to the current images instead of replacing them.
    pub append: bool,
}

pub struct Orchestrator {
    state: Mutex<StudioState>,
    client: Arc<dyn GenerativeClient>,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn GenerativeClient>) -> Self {
        Self {
            state: Mutex::new(StudioState::default()),
            client,
        }
    }

    pub async fn snapshot(&self) -> StudioState {
        self.state.lock().await.clone()
    }

    pub async fn reset(&self) {
        self.state.lock().await.reset_all();
    }

    /// Runs the analysis. `Err` only for a refused start; the returned value
    /// is the stored analysis, with the ticket it was applied under, when this
    /// call's result was applied.
    pub async fn analyze(
        &self,
        request: &ArtDirectionRequest,
    ) -> Result<Option<(Ticket, AnalysisResult)>, StudioError> {
        let ticket = self.state.lock().await.begin_analysis(request)?;
        info!("Analyzing brief {:?}", request.main_headline);

        let outcome = self.client.analyze(request).await;
        if let Err(e) = &outcome {
            warn!("Analysis failed: {}", e);
        }

        let mut state = self.state.lock().await;
        if !state.finish_analysis(ticket, outcome) {
            debug!("Discarding stale analysis result");
            return Ok(None);
        }
        Ok(state.analysis.data.clone().map(|analysis| (ticket, analysis)))
    }

    /// False once a newer analysis or a reset superseded `ticket`.
    pub async fn analysis_is_current(&self, ticket: Ticket) -> bool {
        self.state.lock().await.analysis.is_current(ticket)
    }

    pub async fn update_plan(
        &self,
        request: &ArtDirectionRequest,
        plan: DesignPlan,
    ) -> Result<bool, StudioError> {
        let ticket = self.state.lock().await.begin_plan_update()?;
        info!("Resynthesizing prompt from edited plan");

        let outcome = self.client.resynthesize_prompt(request, &plan).await;
        if let Err(e) = &outcome {
            warn!("Plan update failed: {}", e);
        }

        let applied = self.state.lock().await.finish_plan_update(ticket, plan, outcome);
        if !applied {
            debug!("Discarding stale plan update");
        }
        Ok(applied)
    }

    /// Fires one call per image in the batch and joins them all.
    pub async fn generate_images(&self, request: GenerateRequest) -> bool {
        let ticket = self.state.lock().await.begin_generation();
        let batch = request.batch_size.max(1);
        info!(
            "Generating {} image(s) at {} ({})",
            batch,
            request.job.aspect_ratio.as_str(),
            request.job.quality.image_size()
        );

        let calls = (0..batch).map(|_| self.client.generate_image(&request.job));
        let mut images = Vec::new();
        let mut first_error = None;
        for result in join_all(calls).await {
            match result {
                Ok(urls) => images.extend(urls),
                Err(e) => {
                    warn!("Image generation call failed: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }
        let outcome = match first_error {
            Some(e) if images.is_empty() => Err(e),
            _ => Ok(images),
        };

        let applied = self
            .state
            .lock()
            .await
            .finish_generation(ticket, request.append, outcome);
        if !applied {
            debug!("Discarding stale image batch");
        }
        applied
    }

    pub async fn select_image(&self, index: usize) -> Result<(), StudioError> {
        self.state.lock().await.select_image(index)
    }

    pub async fn separate_layers(
        &self,
        aspect_ratio: AspectRatio,
        quality: Quality,
    ) -> Result<bool, StudioError> {
        let (ticket, image) = self.state.lock().await.begin_separation()?;
        info!("Separating layers of the selected image");

        let outcome = self.client.separate_layers(&image, aspect_ratio, quality).await;
        if let Err(e) = &outcome {
            warn!("Layer separation failed: {}", e);
        }

        let applied = self.state.lock().await.finish_separation(ticket, outcome);
        if !applied {
            debug!("Discarding stale layer separation");
        }
        Ok(applied)
    }

    pub async fn smart_remove(&self, image: &str, mask: &str, hint: &str) -> bool {
        let ticket = self.state.lock().await.begin_refinement();
        info!("Running mask-guided edit");

        let outcome = self.client.edit_with_mask(image, mask, hint).await;
        if let Err(e) = &outcome {
            warn!("Mask-guided edit failed: {}", e);
        }

        let applied = self.state.lock().await.finish_refinement(ticket, outcome);
        if !applied {
            debug!("Discarding stale refinement");
        }
        applied
    }

    pub async fn upscale(&self, aspect_ratio: AspectRatio) -> Result<bool, StudioError> {
        let (ticket, image) = self.state.lock().await.begin_upscale()?;
        info!("Upscaling the selected image");

        let outcome = self.client.upscale(&image, aspect_ratio).await;
        if let Err(e) = &outcome {
            warn!("Upscale failed: {}", e);
        }

        let applied = self.state.lock().await.finish_upscale(ticket, outcome);
        if !applied {
            debug!("Discarding stale upscale");
        }
        Ok(applied)
    }
}
