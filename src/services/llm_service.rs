// src/services/llm_service.rs
use crate::config::ModelConfig;
use crate::errors::StudioError;
use crate::models::*;
use crate::services::image_processor::split_data_url;
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Instant;

const ANALYSIS_INSTRUCTIONS: &str = r##"
You are a senior art director. Read the design brief and the attached images
and answer with a single JSON object, no prose, matching exactly:
{
  "designPlan": {
    "subject": "...", "styleContext": "...", "composition": "...",
    "colorLighting": "...", "decorElements": "...", "typography": "..."
  },
  "layoutSuggestion": {
    "canvas_ratio": "W:H",
    "elements": [
      {"id": "...", "name": "...", "type": "subject|text|decor|logo",
       "color": "#RRGGBB", "rect": {"x": 0, "y": 0, "width": 0, "height": 0}}
    ]
  },
  "analysis": "short reasoning",
  "final_prompt": "a complete image-generation prompt",
  "recommendedAspectRatio": "1:1|3:4|4:3|9:16|16:9"
}
All rect values are percentages of the canvas (0-100). Give every element a
distinct, saturated color. Never include text coordinates in final_prompt.
"##;

/// One image-generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationJob {
    pub prompt: String,
    pub aspect_ratio: AspectRatio,
    pub quality: Quality,
    /// Rasterized layout mask as a data URL.
    pub mask: Option<String>,
    pub reference_images: Vec<String>,
}

/// The generative-AI collaborator.
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    async fn analyze(&self, request: &ArtDirectionRequest) -> Result<AnalysisResult, StudioError>;

    /// Rewrites the final prompt from an edited design plan.
    async fn resynthesize_prompt(
        &self,
        request: &ArtDirectionRequest,
        plan: &DesignPlan,
    ) -> Result<String, StudioError>;

    /// Zero or more images; an empty result is not an error.
    async fn generate_image(&self, job: &GenerationJob) -> Result<Vec<String>, StudioError>;

    async fn separate_layers(
        &self,
        image: &str,
        aspect_ratio: AspectRatio,
        quality: Quality,
    ) -> Result<SeparatedAssets, StudioError>;

    async fn edit_with_mask(
        &self,
        image: &str,
        mask: &str,
        hint: &str,
    ) -> Result<Option<String>, StudioError>;

    async fn upscale(&self, image: &str, aspect_ratio: AspectRatio) -> Result<String, StudioError>;
}

pub struct GeminiClient {
    api_key: String,
    base_url: String,
    models: ModelConfig,
    client: Client,
}

impl GeminiClient {
    pub fn new(api_key: String, base_url: String, models: ModelConfig) -> Self {
        Self::with_http_client(Client::new(), api_key, base_url, models)
    }

    pub fn with_http_client(
        client: Client,
        api_key: String,
        base_url: String,
        models: ModelConfig,
    ) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            models,
            client,
        }
    }

    async fn generate_content(&self, model: &str, body: Value) -> Result<Value, StudioError> {
        let start = Instant::now();
        let response = self
            .client
            .post(format!("{}/models/{}:generateContent", self.base_url, model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| StudioError::Llm(format!("Request to {} failed: {}", model, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(StudioError::Llm(format!(
                "{} returned {}: {}",
                model, status, error_text
            )));
        }

        let result: Value = response
            .json()
            .await
            .map_err(|e| StudioError::Llm(format!("Failed to parse {} response: {}", model, e)))?;

        debug!("{} answered in {} ms", model, start.elapsed().as_millis());
        Ok(result)
    }

    async fn image_call(
        &self,
        parts: Vec<Value>,
        aspect_ratio: AspectRatio,
        image_size: &str,
    ) -> Result<Vec<String>, StudioError> {
        let body = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
                "imageConfig": {
                    "aspectRatio": aspect_ratio.as_str(),
                    "imageSize": image_size
                }
            }
        });
        let result = self.generate_content(&self.models.image, body).await?;
        Ok(response_images(&result))
    }

    async fn isolate(
        &self,
        image: &str,
        instruction: &str,
        aspect_ratio: AspectRatio,
        quality: Quality,
    ) -> Result<Vec<String>, StudioError> {
        let parts = vec![json!({ "text": instruction }), inline_part(image)?];
        self.image_call(parts, aspect_ratio, quality.image_size()).await
    }
}

#[async_trait]
impl GenerativeClient for GeminiClient {
    async fn analyze(&self, request: &ArtDirectionRequest) -> Result<AnalysisResult, StudioError> {
        let model = match request.analysis_model {
            AnalysisModel::Standard => &self.models.analysis,
            AnalysisModel::Pro => &self.models.analysis_pro,
        };

        let mut parts = vec![json!({ "text": brief_prompt(request) })];
        let labelled = request
            .headline_style_image
            .iter()
            .map(|img| ("Headline style reference:".to_string(), img))
            .chain(request.logo_image.iter().map(|img| ("Logo:".to_string(), img)))
            .chain(
                request
                    .asset_images
                    .iter()
                    .enumerate()
                    .map(|(i, img)| (format!("Product asset {}:", i + 1), img)),
            )
            .chain(request.reference_images.iter().enumerate().map(|(i, r)| {
                let attributes: Vec<String> = r
                    .attributes
                    .iter()
                    .map(|a| format!("{:?}", a).to_lowercase())
                    .collect();
                (
                    format!(
                        "Reference image {} (borrow: {}):",
                        i + 1,
                        attributes.join(", ")
                    ),
                    &r.image,
                )
            }));
        for (label, image) in labelled {
            parts.push(json!({ "text": label }));
            parts.push(inline_part(image)?);
        }

        let body = json!({
            "system_instruction": { "parts": [{ "text": ANALYSIS_INSTRUCTIONS }] },
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": { "responseMimeType": "application/json" }
        });

        let result = self.generate_content(model, body).await?;
        let text = response_text(&result)
            .ok_or_else(|| StudioError::Llm("No content in analysis response".to_string()))?;
        parse_analysis(&text)
    }

    async fn resynthesize_prompt(
        &self,
        request: &ArtDirectionRequest,
        plan: &DesignPlan,
    ) -> Result<String, StudioError> {
        let plan_json = serde_json::to_string_pretty(plan)?;
        let prompt = format!(
            "Rewrite a single image-generation prompt for this design.\n\
             Headline: {}\nSub headline: {}\nProduct: {}\n\
             Edited design plan (authoritative):\n{}\n\
             Answer with the prompt text only.",
            request.main_headline, request.sub_headline, request.product_type, plan_json
        );
        let body = json!({ "contents": [{ "role": "user", "parts": [{ "text": prompt }] }] });
        let result = self.generate_content(&self.models.analysis, body).await?;
        response_text(&result)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| StudioError::Llm("Empty prompt returned".to_string()))
    }

    async fn generate_image(&self, job: &GenerationJob) -> Result<Vec<String>, StudioError> {
        let mut parts = vec![json!({ "text": job.prompt })];
        if let Some(mask) = &job.mask {
            parts.push(json!({
                "text": "Spatial layout mask: each colored block marks where one element goes. Do not draw the mask."
            }));
            parts.push(inline_part(mask)?);
        }
        for image in &job.reference_images {
            parts.push(inline_part(image)?);
        }
        self.image_call(parts, job.aspect_ratio, job.quality.image_size())
            .await
    }

    async fn separate_layers(
        &self,
        image: &str,
        aspect_ratio: AspectRatio,
        quality: Quality,
    ) -> Result<SeparatedAssets, StudioError> {
        let (background, text_layer, decor) = tokio::join!(
            self.isolate(
                image,
                "Remove all text, logos and decorative elements. Keep only the clean background and main subject.",
                aspect_ratio,
                quality,
            ),
            self.isolate(
                image,
                "Extract only the typography on a plain white background, same positions and styling.",
                aspect_ratio,
                quality,
            ),
            self.isolate(
                image,
                "Extract only the decorative elements on a plain white background, same positions.",
                aspect_ratio,
                quality,
            ),
        );

        if let (Err(e), Err(_), Err(_)) = (&background, &text_layer, &decor) {
            return Err(e.clone());
        }
        let first = |layer: Result<Vec<String>, StudioError>, name: &str| match layer {
            Ok(images) => images.into_iter().next(),
            Err(e) => {
                warn!("Layer {} failed: {}", name, e);
                None
            }
        };
        let decor = match decor {
            Ok(images) => images,
            Err(e) => {
                warn!("Layer decor failed: {}", e);
                Vec::new()
            }
        };

        Ok(SeparatedAssets {
            background: first(background, "background"),
            text_layer: first(text_layer, "text"),
            decor,
        })
    }

    async fn edit_with_mask(
        &self,
        image: &str,
        mask: &str,
        hint: &str,
    ) -> Result<Option<String>, StudioError> {
        let instruction = format!(
            "Edit the first image. The second image is a mask: change only the white area. {}",
            if hint.trim().is_empty() {
                "Remove the object there and rebuild the background seamlessly."
            } else {
                hint.trim()
            }
        );
        let parts = vec![
            json!({ "text": instruction }),
            inline_part(image)?,
            inline_part(mask)?,
        ];
        let body = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": { "responseModalities": ["TEXT", "IMAGE"] }
        });
        let result = self.generate_content(&self.models.image, body).await?;
        Ok(response_images(&result).into_iter().next())
    }

    async fn upscale(&self, image: &str, aspect_ratio: AspectRatio) -> Result<String, StudioError> {
        let parts = vec![
            json!({ "text": "Reproduce this image exactly at higher resolution. Sharpen details, change nothing else." }),
            inline_part(image)?,
        ];
        self.image_call(parts, aspect_ratio, Quality::High.image_size())
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StudioError::Llm("No image data in upscale response".to_string()))
    }
}

fn brief_prompt(request: &ArtDirectionRequest) -> String {
    let mut lines = vec!["DESIGN BRIEF".to_string()];
    let fields = [
        ("Product type", &request.product_type),
        ("Main headline", &request.main_headline),
        ("Sub headline", &request.sub_headline),
        ("Body text", &request.body_text),
        ("Call to action", &request.call_to_action),
        ("Style", &request.style),
        ("Color palette", &request.color_palette),
        ("Notes", &request.additional_notes),
    ];
    for (label, value) in fields {
        if !value.trim().is_empty() {
            lines.push(format!("{}: {}", label, value.trim()));
        }
    }
    if let Some((w, h)) = request.dimensions_cm() {
        lines.push(format!("Print size: {} x {} cm", w, h));
    }
    lines.join("\n")
}

/// Converts a data URL into an inline request part.
fn inline_part(data_url: &str) -> Result<Value, StudioError> {
    let (mime_type, data) = split_data_url(data_url)?;
    let mime_type = if mime_type.is_empty() { "image/png" } else { mime_type };
    Ok(json!({
        "inline_data": {
            "mime_type": mime_type,
            "data": data
        }
    }))
}

fn response_parts(result: &Value) -> impl Iterator<Item = &Value> {
    result["candidates"][0]["content"]["parts"]
        .as_array()
        .into_iter()
        .flatten()
}

fn response_text(result: &Value) -> Option<String> {
    let text: String = response_parts(result)
        .filter_map(|p| p["text"].as_str())
        .collect();
    if text.trim().is_empty() { None } else { Some(text) }
}

/// Every inline image in the first candidate, as data URLs.
fn response_images(result: &Value) -> Vec<String> {
    response_parts(result)
        .filter_map(|p| {
            let inline = p.get("inlineData").or_else(|| p.get("inline_data"))?;
            let data = inline["data"].as_str()?;
            let mime = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str)
                .unwrap_or("image/png");
            Some(format!("data:{};base64,{}", mime, data))
        })
        .collect()
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

fn parse_analysis(text: &str) -> Result<AnalysisResult, StudioError> {
    let body = strip_code_fence(text);
    if body.is_empty() {
        return Err(StudioError::Llm("Empty analysis response".to_string()));
    }
    let mut analysis: AnalysisResult = serde_json::from_str(body)
        .map_err(|e| StudioError::Llm(format!("Failed to parse analysis JSON: {}", e)))?;
    if analysis.final_prompt.trim().is_empty() {
        return Err(StudioError::Llm("Analysis has no final prompt".to_string()));
    }
    analysis.layout_suggestion = analysis.layout_suggestion.normalized();
    Ok(analysis)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANALYSIS: &str = r##"{
        "designPlan": {"subject": "A cup", "styleContext": "Minimal", "composition": "Centered",
                       "colorLighting": "Warm", "decorElements": "Beans", "typography": "Serif"},
        "layoutSuggestion": {"canvas_ratio": "4:3", "elements": [
            {"id": "cup", "name": "Cup", "type": "subject", "color": "#ff0000",
             "rect": {"x": 30, "y": 20, "width": 90, "height": 50}}]},
        "analysis": "Focus on the cup",
        "final_prompt": "A warm minimal coffee poster",
        "recommendedAspectRatio": "4:3"
    }"##;

    #[test]
    fn analysis_parses_and_clamps_layout() {
        let analysis = parse_analysis(&format!("```json\n{}\n```", ANALYSIS)).unwrap();
        assert_eq!(analysis.design_plan.style_context, "Minimal");
        assert_eq!(analysis.recommended_aspect_ratio, AspectRatio::Landscape);
        let cup = &analysis.layout_suggestion.elements[0];
        assert_eq!(cup.rect.width, 70.0);
    }

    #[test]
    fn empty_or_malformed_analysis_is_an_error() {
        assert!(matches!(parse_analysis("  "), Err(StudioError::Llm(_))));
        assert!(matches!(parse_analysis("{\"designPlan\": 3}"), Err(StudioError::Llm(_))));
        assert!(matches!(parse_analysis("not json"), Err(StudioError::Llm(_))));
    }

    #[test]
    fn images_are_read_from_either_casing() {
        let result = json!({
            "candidates": [{ "content": { "parts": [
                { "text": "here you go" },
                { "inlineData": { "mimeType": "image/jpeg", "data": "AAA" } },
                { "inline_data": { "data": "BBB" } }
            ]}}]
        });
        assert_eq!(
            response_images(&result),
            vec!["data:image/jpeg;base64,AAA", "data:image/png;base64,BBB"]
        );
        assert_eq!(response_text(&result).as_deref(), Some("here you go"));
    }

    #[test]
    fn missing_candidates_yield_nothing() {
        let result = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        assert!(response_images(&result).is_empty());
        assert_eq!(response_text(&result), None);
    }

    #[test]
    fn inline_part_requires_data_url() {
        let part = inline_part("data:image/webp;base64,QUJD").unwrap();
        assert_eq!(part["inline_data"]["mime_type"], "image/webp");
        assert_eq!(part["inline_data"]["data"], "QUJD");
        assert!(inline_part("https://example.com/x.png").is_err());
    }

    #[test]
    fn brief_prompt_skips_empty_fields() {
        let request = ArtDirectionRequest {
            main_headline: "Grand opening".to_string(),
            width_cm: "60".to_string(),
            height_cm: "90".to_string(),
            ..Default::default()
        };
        let prompt = brief_prompt(&request);
        assert!(prompt.contains("Main headline: Grand opening"));
        assert!(prompt.contains("Print size: 60 x 90 cm"));
        assert!(!prompt.contains("Body text"));
    }

    #[test]
    fn analysis_instructions_keep_the_full_schema() {
        assert!(ANALYSIS_INSTRUCTIONS.contains(r##""color": "#RRGGBB""##));
        assert!(ANALYSIS_INSTRUCTIONS.contains("\"recommendedAspectRatio\""));
        assert!(ANALYSIS_INSTRUCTIONS.trim_end().ends_with("final_prompt."));
    }
}
