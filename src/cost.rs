// src/cost.rs

use crate::models::{AnalysisModel, ArtDirectionRequest, Quality};
use serde::{Deserialize, Serialize};

/// Price per 1K tokens, in VND.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRates {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingTable {
    pub chars_per_token: u64,
    pub tokens_per_image: u64,
    pub system_instruction_tokens: u64,
    pub output_tokens: u64,
    pub standard: ModelRates,
    pub pro: ModelRates,
    pub image_price_low: u64,
    pub image_price_medium: u64,
    pub image_price_high: u64,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self {
            chars_per_token: 4,
            tokens_per_image: 258,
            system_instruction_tokens: 1_500,
            output_tokens: 2_000,
            standard: ModelRates {
                input_per_1k: 7.5,
                output_per_1k: 62.5,
            },
            pro: ModelRates {
                input_per_1k: 75.0,
                output_per_1k: 625.0,
            },
            image_price_low: 1_000,
            image_price_medium: 3_350,
            image_price_high: 6_000,
        }
    }
}

impl PricingTable {
    pub fn rates(&self, model: AnalysisModel) -> ModelRates {
        match model {
            AnalysisModel::Standard => self.standard,
            AnalysisModel::Pro => self.pro,
        }
    }

    pub fn image_price(&self, quality: Quality) -> u64 {
        match quality {
            Quality::Low => self.image_price_low,
            Quality::Medium => self.image_price_medium,
            Quality::High => self.image_price_high,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBreakdown {
    #[serde(rename = "inputTokens")]
    pub input_tokens: u64,
    #[serde(rename = "outputTokens")]
    pub output_tokens: u64,
    #[serde(rename = "analysisCostVND")]
    pub analysis_cost_vnd: u64,
    #[serde(rename = "generationCostVND")]
    pub generation_cost_vnd: u64,
    #[serde(rename = "totalCostVND")]
    pub total_cost_vnd: u64,
}

pub fn estimate(request: &ArtDirectionRequest, pricing: &PricingTable) -> CostBreakdown {
    let chars = request.free_text().chars().count() as u64;
    let text_tokens = chars.div_ceil(pricing.chars_per_token.max(1));
    let image_tokens = pricing.tokens_per_image * request.image_count() as u64;
    let input_tokens = text_tokens + image_tokens + pricing.system_instruction_tokens;
    let output_tokens = pricing.output_tokens;

    let rates = pricing.rates(request.analysis_model);
    let analysis = input_tokens as f64 / 1000.0 * rates.input_per_1k
        + output_tokens as f64 / 1000.0 * rates.output_per_1k;
    let analysis_cost_vnd = analysis.round().max(0.0) as u64;

    let generation_cost_vnd =
        u64::from(request.effective_batch_size()) * pricing.image_price(request.quality);

    CostBreakdown {
        input_tokens,
        output_tokens,
        analysis_cost_vnd,
        generation_cost_vnd,
        total_cost_vnd: analysis_cost_vnd + generation_cost_vnd,
    }
}
