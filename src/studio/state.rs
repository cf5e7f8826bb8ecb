// src/studio/state.rs

use super::slice::{Slice, Ticket};
use crate::errors::StudioError;
use crate::models::{AnalysisResult, ArtDirectionRequest, DesignPlan, GeneratedImage, SeparatedAssets};
use serde::Serialize;

/// Tickets for a plan update: the plan slice's own call and the analysis it
/// was based on.
#[derive(Debug, Clone, Copy)]
pub struct PlanTicket {
    plan: Ticket,
    analysis: Ticket,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudioState {
    pub analysis: Slice<Option<AnalysisResult>>,
    pub plan_update: Slice<()>,
    pub images: Slice<Vec<GeneratedImage>>,
    pub layers: Slice<Option<SeparatedAssets>>,
    pub refinement: Slice<Option<String>>,
    pub upscale: Slice<Option<String>>,
    pub selected_image: Option<usize>,
}

impl StudioState {
    pub fn plan(&self) -> Option<&DesignPlan> {
        self.analysis.data.as_ref().map(|a| &a.design_plan)
    }

    pub fn selected_image_url(&self) -> Option<&str> {
        self.selected_image
            .and_then(|i| self.images.data.get(i))
            .map(|img| img.url.as_str())
    }

    /// Clears every slice; in-flight results are discarded when they arrive.
    pub fn reset_all(&mut self) {
        self.analysis.reset();
        self.plan_update.reset();
        self.clear_results();
    }

    fn clear_results(&mut self) {
        self.images.reset();
        self.layers.reset();
        self.refinement.reset();
        self.upscale.reset();
        self.selected_image = None;
    }

    pub fn begin_analysis(&mut self, request: &ArtDirectionRequest) -> Result<Ticket, StudioError> {
        request.validate()?;
        self.plan_update.reset();
        self.clear_results();
        self.analysis.data = None;
        Ok(self.analysis.begin())
    }

    pub fn finish_analysis(
        &mut self,
        ticket: Ticket,
        outcome: Result<AnalysisResult, StudioError>,
    ) -> bool {
        match outcome {
            Ok(result) => self.analysis.succeed_with(ticket, |data| *data = Some(result)),
            Err(e) => self
                .analysis
                .fail(ticket, format!("Analysis failed: {}", e.user_message())),
        }
    }

    pub fn begin_plan_update(&mut self) -> Result<PlanTicket, StudioError> {
        if self.analysis.data.is_none() {
            return Err(StudioError::InvalidState(
                "There is no design plan to update yet".to_string(),
            ));
        }
        Ok(PlanTicket {
            plan: self.plan_update.begin(),
            analysis: self.analysis.current(),
        })
    }

    /// On success the edited plan and the new prompt replace the current ones;
    /// on failure the previous plan stays.
    pub fn finish_plan_update(
        &mut self,
        ticket: PlanTicket,
        plan: DesignPlan,
        outcome: Result<String, StudioError>,
    ) -> bool {
        match outcome {
            Ok(prompt) => {
                if !self.plan_update.succeed_with(ticket.plan, |_| {}) {
                    return false;
                }
                if self.analysis.is_current(ticket.analysis) {
                    if let Some(analysis) = self.analysis.data.as_mut() {
                        analysis.design_plan = plan;
                        analysis.final_prompt = prompt;
                    }
                }
                true
            }
            Err(e) => self.plan_update.fail(
                ticket.plan,
                format!("Failed to update plan: {}", e.user_message()),
            ),
        }
    }

    pub fn begin_generation(&mut self) -> Ticket {
        self.images.begin()
    }

    pub fn finish_generation(
        &mut self,
        ticket: Ticket,
        append: bool,
        outcome: Result<Vec<String>, StudioError>,
    ) -> bool {
        let urls = match outcome {
            Ok(urls) => urls,
            Err(e) => {
                return self
                    .images
                    .fail(ticket, format!("Image generation failed: {}", e.user_message()));
            }
        };
        let applied = self.images.succeed_with(ticket, |images| {
            if append {
                mark_seen(images);
            } else {
                images.clear();
            }
            images.extend(urls.into_iter().map(|url| GeneratedImage { url, is_new: true }));
        });
        if applied && !append {
            self.selected_image = None;
            self.reset_follow_ups();
        }
        applied
    }

    /// Picks the base image for separation, removal and upscale.
    pub fn select_image(&mut self, index: usize) -> Result<(), StudioError> {
        if index >= self.images.data.len() {
            return Err(StudioError::Validation(format!(
                "No generated image at position {}",
                index
            )));
        }
        if self.selected_image != Some(index) {
            self.reset_follow_ups();
            self.selected_image = Some(index);
        }
        Ok(())
    }

    /// Drops results derived from the previous base image, including calls
    /// still in flight.
    fn reset_follow_ups(&mut self) {
        self.layers.reset();
        self.refinement.reset();
        self.upscale.reset();
    }

    fn require_selection(&self) -> Result<String, StudioError> {
        self.selected_image_url()
            .map(str::to_string)
            .ok_or_else(|| StudioError::InvalidState("Select a generated image first".to_string()))
    }

    pub fn begin_separation(&mut self) -> Result<(Ticket, String), StudioError> {
        let image = self.require_selection()?;
        Ok((self.layers.begin(), image))
    }

    pub fn finish_separation(
        &mut self,
        ticket: Ticket,
        outcome: Result<SeparatedAssets, StudioError>,
    ) -> bool {
        match outcome {
            Ok(assets) => {
                let produced = assets.images();
                let applied = self.layers.succeed_with(ticket, |data| *data = Some(assets));
                if applied {
                    self.append_images(produced);
                }
                applied
            }
            Err(e) => self
                .layers
                .fail(ticket, format!("Layer separation failed: {}", e.user_message())),
        }
    }

    pub fn begin_refinement(&mut self) -> Ticket {
        self.refinement.begin()
    }

    pub fn finish_refinement(
        &mut self,
        ticket: Ticket,
        outcome: Result<Option<String>, StudioError>,
    ) -> bool {
        match outcome {
            Ok(Some(url)) => {
                let applied = self
                    .refinement
                    .succeed_with(ticket, |data| *data = Some(url.clone()));
                if applied {
                    self.append_images(vec![url]);
                }
                applied
            }
            Ok(None) => self.refinement.fail(
                ticket,
                "Object removal failed: the model returned no image".to_string(),
            ),
            Err(e) => self
                .refinement
                .fail(ticket, format!("Object removal failed: {}", e.user_message())),
        }
    }

    pub fn begin_upscale(&mut self) -> Result<(Ticket, String), StudioError> {
        let image = self.require_selection()?;
        Ok((self.upscale.begin(), image))
    }

    pub fn finish_upscale(&mut self, ticket: Ticket, outcome: Result<String, StudioError>) -> bool {
        match outcome {
            Ok(url) => {
                let applied = self
                    .upscale
                    .succeed_with(ticket, |data| *data = Some(url.clone()));
                if applied {
                    self.append_images(vec![url]);
                }
                applied
            }
            Err(e) => self
                .upscale
                .fail(ticket, format!("Upscale failed: {}", e.user_message())),
        }
    }

    /// Adds images produced by a follow-up call without touching the
    /// generation of the image slice.
    fn append_images(&mut self, urls: Vec<String>) {
        if urls.is_empty() {
            return;
        }
        mark_seen(&mut self.images.data);
        self.images
            .data
            .extend(urls.into_iter().map(|url| GeneratedImage { url, is_new: true }));
    }
}

fn mark_seen(images: &mut [GeneratedImage]) {
    for image in images {
        image.is_new = false;
    }
}
