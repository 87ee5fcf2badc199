//! Token usage accounting and cost estimation.

use serde::{Deserialize, Serialize};

/// Token counts, timing and estimated cost of one successful extraction call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default)]
    pub cached_tokens: u64,
    pub total_tokens: u64,
    pub duration_ms: u64,
    /// Estimated cost in USD.
    pub estimated_cost: f64,
}

/// Token counts as reported by the API, before timing and pricing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenCounts {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cached_tokens: u64,
    #[serde(default)]
    pub total_tokens: Option<u64>,
}

/// USD prices per million tokens for one model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input: f64,
    pub cached_input: f64,
    pub output: f64,
}

/// Fixed per-model price list.
#[derive(Debug, Clone)]
pub struct PricingTable {
    entries: Vec<(&'static str, ModelPricing)>,
}

const DEFAULT_MODEL: &str = "gemini-2.5-flash";

const PRICES: &[(&str, ModelPricing)] = &[
    (
        "gemini-2.5-flash",
        ModelPricing {
            input: 0.30,
            cached_input: 0.075,
            output: 2.50,
        },
    ),
    (
        "gemini-2.5-flash-lite",
        ModelPricing {
            input: 0.10,
            cached_input: 0.025,
            output: 0.40,
        },
    ),
    (
        "gemini-2.5-pro",
        ModelPricing {
            input: 1.25,
            cached_input: 0.31,
            output: 10.00,
        },
    ),
    (
        "gpt-4o-mini",
        ModelPricing {
            input: 0.15,
            cached_input: 0.075,
            output: 0.60,
        },
    ),
];

impl Default for PricingTable {
    fn default() -> Self {
        Self {
            entries: PRICES.to_vec(),
        }
    }
}

impl PricingTable {
    /// Prices for `model`, falling back to the default model's rates.
    pub fn pricing_for(&self, model: &str) -> ModelPricing {
        self.lookup(model)
            .or_else(|| self.lookup(DEFAULT_MODEL))
            .unwrap_or(ModelPricing {
                input: 0.0,
                cached_input: 0.0,
                output: 0.0,
            })
    }

    fn lookup(&self, model: &str) -> Option<ModelPricing> {
        self.entries
            .iter()
            .find(|(name, _)| *name == model)
            .map(|(_, pricing)| *pricing)
    }

    /// Cached tokens are billed at the cached rate and excluded from the
    /// regular input charge.
    pub fn estimate_cost(&self, model: &str, counts: &TokenCounts) -> f64 {
        let pricing = self.pricing_for(model);
        let cached = counts.cached_tokens.min(counts.input_tokens);
        let uncached = counts.input_tokens - cached;

        (uncached as f64 * pricing.input
            + cached as f64 * pricing.cached_input
            + counts.output_tokens as f64 * pricing.output)
            / 1_000_000.0
    }

    /// Builds the final usage record for a call.
    pub fn usage(&self, model: &str, counts: &TokenCounts, duration_ms: u64) -> ExtractionUsage {
        ExtractionUsage {
            input_tokens: counts.input_tokens,
            output_tokens: counts.output_tokens,
            cached_tokens: counts.cached_tokens,
            total_tokens: counts
                .total_tokens
                .unwrap_or(counts.input_tokens + counts.output_tokens),
            duration_ms,
            estimated_cost: self.estimate_cost(model, counts),
        }
    }
}
