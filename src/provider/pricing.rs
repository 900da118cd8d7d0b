//! Pricing tables and deterministic cost computation.

use std::collections::HashMap;

/// (input, output) price per one million tokens, in USD.
pub type ModelPrice = (f64, f64);

/// Immutable mapping from model id to per-million-token prices.
///
/// Built once at provider construction and never mutated afterwards, so
/// concurrent reads need no synchronization. Unknown model ids resolve to
/// zero cost rather than failing; a new model degrades to untracked cost.
#[derive(Debug, Clone, Default)]
pub struct PricingTable {
    prices: HashMap<String, ModelPrice>,
}

impl PricingTable {
    /// Build a table from (model, input price, output price) entries.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, f64, f64)>,
        S: Into<String>,
    {
        Self {
            prices: entries
                .into_iter()
                .map(|(model, input, output)| (model.into(), (input, output)))
                .collect(),
        }
    }

    /// OpenAI list prices as of February 2026.
    pub fn openai() -> Self {
        Self::from_entries([
            ("gpt-4o", 2.50, 10.00),
            ("gpt-4o-mini", 0.15, 0.60),
            ("gpt-4.5", 3.00, 12.00),
            ("gpt-4", 3.00, 6.00),
            ("gpt-3.5-turbo", 0.50, 1.50),
        ])
    }

    /// Anthropic list prices as of February 2026.
    pub fn anthropic() -> Self {
        Self::from_entries([
            ("claude-opus-4-6", 5.00, 25.00),
            ("claude-sonnet-4-5", 3.00, 15.00),
            ("claude-haiku-4-5", 1.00, 5.00),
            ("claude-3-opus", 15.00, 75.00),
            ("claude-3-sonnet", 3.00, 15.00),
            ("claude-3-haiku", 0.25, 1.25),
        ])
    }

    /// Prices for a model; (0, 0) when unknown.
    pub fn price(&self, model: &str) -> ModelPrice {
        self.prices.get(model).copied().unwrap_or((0.0, 0.0))
    }

    /// USD cost of a call. Pure function of token counts and model id,
    /// rounded to 6 decimal places.
    pub fn cost(&self, model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        let (input_price, output_price) = self.price(model);
        let input_cost = (f64::from(input_tokens) / 1_000_000.0) * input_price;
        let output_cost = (f64::from(output_tokens) / 1_000_000.0) * output_price;
        round_cost(input_cost + output_cost)
    }
}

/// Round to the 6-decimal cost contract.
pub(crate) fn round_cost(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}
