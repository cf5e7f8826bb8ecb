// src/models.rs
use crate::errors::StudioError;
use crate::layout::LayoutSuggestion;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const MAX_BATCH_SIZE: u8 = 3;
pub const MAX_REFERENCE_IMAGES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Quality {
    Low,
    #[default]
    Medium,
    High,
}

impl Quality {
    /// Output resolution class requested from the image model.
    pub fn image_size(self) -> &'static str {
        match self {
            Quality::Low => "1K",
            Quality::Medium => "2K",
            Quality::High => "4K",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisModel {
    #[default]
    Standard,
    Pro,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "3:4")]
    Portrait,
    #[serde(rename = "4:3")]
    Landscape,
    #[serde(rename = "9:16")]
    Story,
    #[serde(rename = "16:9")]
    Wide,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 5] = [
        AspectRatio::Square,
        AspectRatio::Portrait,
        AspectRatio::Landscape,
        AspectRatio::Story,
        AspectRatio::Wide,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait => "3:4",
            AspectRatio::Landscape => "4:3",
            AspectRatio::Story => "9:16",
            AspectRatio::Wide => "16:9",
        }
    }

    /// Width divided by height.
    pub fn value(self) -> f64 {
        match self {
            AspectRatio::Square => 1.0,
            AspectRatio::Portrait => 3.0 / 4.0,
            AspectRatio::Landscape => 4.0 / 3.0,
            AspectRatio::Story => 9.0 / 16.0,
            AspectRatio::Wide => 16.0 / 9.0,
        }
    }

    /// Supported ratio nearest to `ratio`, compared on a log scale so that
    /// 2:1 and 1:2 are equally far from 1:1.
    pub fn closest(ratio: f64) -> Self {
        if !ratio.is_finite() || ratio <= 0.0 {
            return AspectRatio::Square;
        }
        let target = ratio.ln();
        Self::ALL
            .into_iter()
            .min_by(|a, b| {
                let da = (a.value().ln() - target).abs();
                let db = (b.value().ln() - target).abs();
                da.total_cmp(&db)
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceAttribute {
    Style,
    Color,
    Composition,
    Lighting,
    Typography,
    Subject,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReferenceImage {
    /// Image as a data URL.
    pub image: String,
    #[serde(default)]
    pub attributes: BTreeSet<ReferenceAttribute>,
}

/// The full design brief.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArtDirectionRequest {
    pub product_type: String,
    pub main_headline: String,
    pub sub_headline: String,
    pub body_text: String,
    pub call_to_action: String,
    pub style: String,
    pub color_palette: String,
    pub additional_notes: String,
    pub width_cm: String,
    pub height_cm: String,
    pub asset_images: Vec<String>,
    pub logo_image: Option<String>,
    pub headline_style_image: Option<String>,
    pub reference_images: Vec<ReferenceImage>,
    pub batch_size: u8,
    pub quality: Quality,
    pub analysis_model: AnalysisModel,
}

impl Default for ArtDirectionRequest {
    fn default() -> Self {
        Self {
            product_type: String::new(),
            main_headline: String::new(),
            sub_headline: String::new(),
            body_text: String::new(),
            call_to_action: String::new(),
            style: String::new(),
            color_palette: String::new(),
            additional_notes: String::new(),
            width_cm: String::new(),
            height_cm: String::new(),
            asset_images: Vec::new(),
            logo_image: None,
            headline_style_image: None,
            reference_images: Vec::new(),
            batch_size: 1,
            quality: Quality::default(),
            analysis_model: AnalysisModel::default(),
        }
    }
}

impl ArtDirectionRequest {
    pub fn validate(&self) -> Result<(), StudioError> {
        if self.main_headline.trim().is_empty() {
            return Err(StudioError::Validation(
                "Please enter the main headline before analyzing".to_string(),
            ));
        }
        if !(1..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            return Err(StudioError::Validation(format!(
                "Batch size must be between 1 and {}",
                MAX_BATCH_SIZE
            )));
        }
        if self.reference_images.len() > MAX_REFERENCE_IMAGES {
            return Err(StudioError::Validation(format!(
                "At most {} reference images are allowed",
                MAX_REFERENCE_IMAGES
            )));
        }
        Ok(())
    }

    /// Batch size forced into the supported range.
    pub fn effective_batch_size(&self) -> u8 {
        self.batch_size.clamp(1, MAX_BATCH_SIZE)
    }

    /// All free-text fields, in a fixed order.
    pub fn free_text(&self) -> String {
        [
            &self.product_type,
            &self.main_headline,
            &self.sub_headline,
            &self.body_text,
            &self.call_to_action,
            &self.style,
            &self.color_palette,
            &self.additional_notes,
            &self.width_cm,
            &self.height_cm,
        ]
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .concat()
    }

    /// Every attached image: headline reference, logo, assets, then references.
    pub fn attached_images(&self) -> impl Iterator<Item = &str> {
        self.headline_style_image
            .iter()
            .chain(self.logo_image.iter())
            .chain(self.asset_images.iter())
            .map(String::as_str)
            .chain(self.reference_images.iter().map(|r| r.image.as_str()))
    }

    pub fn image_count(&self) -> usize {
        self.attached_images().count()
    }

    pub fn dimensions_cm(&self) -> Option<(f64, f64)> {
        let parse = |s: &str| {
            s.trim()
                .replace(',', ".")
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v > 0.0)
        };
        Some((parse(&self.width_cm)?, parse(&self.height_cm)?))
    }

    pub fn suggested_aspect_ratio(&self) -> AspectRatio {
        self.dimensions_cm()
            .map(|(w, h)| AspectRatio::closest(w / h))
            .unwrap_or_default()
    }
}

/// Six-field creative analysis returned by the AI.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DesignPlan {
    pub subject: String,
    pub style_context: String,
    pub composition: String,
    pub color_lighting: String,
    pub decor_elements: String,
    pub typography: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(rename = "designPlan")]
    pub design_plan: DesignPlan,
    #[serde(rename = "layoutSuggestion")]
    pub layout_suggestion: LayoutSuggestion,
    #[serde(default)]
    pub analysis: String,
    pub final_prompt: String,
    #[serde(rename = "recommendedAspectRatio", default)]
    pub recommended_aspect_ratio: AspectRatio,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    /// Data URL or remote URL.
    pub url: String,
    pub is_new: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeparatedAssets {
    pub background: Option<String>,
    pub text_layer: Option<String>,
    #[serde(default)]
    pub decor: Vec<String>,
}

impl SeparatedAssets {
    pub fn images(&self) -> Vec<String> {
        self.background
            .iter()
            .chain(self.text_layer.iter())
            .chain(self.decor.iter())
            .cloned()
            .collect()
    }
}

/// Saved design record, as the history store returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignDna {
    pub id: u64,
    pub thumbnail: String,
    pub request_data: ArtDirectionRequest,
    pub design_plan: Option<DesignPlan>,
    pub recommended_aspect_ratio: AspectRatio,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub seed: Option<i64>,
}

/// Design record before the store assigns it an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDesignDna {
    pub thumbnail: String,
    pub request_data: ArtDirectionRequest,
    pub design_plan: Option<DesignPlan>,
    pub recommended_aspect_ratio: AspectRatio,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub seed: Option<i64>,
}

impl NewDesignDna {
    pub fn with_id(self, id: u64) -> DesignDna {
        DesignDna {
            id,
            thumbnail: self.thumbnail,
            request_data: self.request_data,
            design_plan: self.design_plan,
            recommended_aspect_ratio: self.recommended_aspect_ratio,
            author: self.author,
            created_at: self.created_at,
            seed: self.seed,
        }
    }
}
