//! Cost model
//!
//! Maps a model ID and a token count to a cost in USD (primary) and EUR
//! (secondary). EUR comes from the model's published EUR price when the
//! price table has one; otherwise it is converted from USD at
//! [`CostModel::usd_to_eur_rate`]. That conversion is the only place an
//! exchange rate is applied.

use crate::llm::{find_model, Pricing};
use serde::{Deserialize, Serialize};

/// Fixed USD→EUR rate used when a model has no published EUR price.
/// Overridable through `DUET_USD_TO_EUR_RATE`.
pub const DEFAULT_USD_TO_EUR_RATE: f64 = 0.92;

/// A monetary amount in both currencies
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Cost {
    pub usd: f64,
    pub eur: f64,
}

impl Cost {
    pub fn add(&mut self, other: Cost) {
        self.usd += other.usd;
        self.eur += other.eur;
    }
}

/// Stateless pricing function over the model table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    usd_to_eur_rate: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self::new(DEFAULT_USD_TO_EUR_RATE)
    }
}

impl CostModel {
    pub fn new(usd_to_eur_rate: f64) -> Self {
        Self { usd_to_eur_rate }
    }

    pub fn usd_to_eur_rate(&self) -> f64 {
        self.usd_to_eur_rate
    }

    /// Cost of `tokens` tokens on `model_id`. Unknown models cost nothing.
    pub fn cost(&self, model_id: &str, tokens: u64) -> Cost {
        match find_model(model_id) {
            Some(def) => self.price(&def.pricing, tokens),
            None => {
                tracing::warn!(model = %model_id, "No pricing for model, recording zero cost");
                Cost::default()
            }
        }
    }

    #[allow(clippy::cast_precision_loss)] // token counts stay far below 2^52
    fn price(&self, pricing: &Pricing, tokens: u64) -> Cost {
        let thousands = tokens as f64 / 1000.0;
        let usd = thousands * pricing.usd_per_1k;
        let eur = match pricing.eur_per_1k {
            Some(eur_per_1k) => thousands * eur_per_1k,
            None => usd * self.usd_to_eur_rate,
        };
        Cost { usd, eur }
    }
}
