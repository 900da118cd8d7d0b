//! Blind-review commentator agent.
//!
//! Reviews a draft question without ever seeing the key. The commentator
//! declares which option it believes is correct and writes the full
//! commentary; disagreement with the creator's key is a quality signal the
//! validator weighs, not an error here.

use crate::agent::PromptTemplate;
use crate::models::{CallUsage, Commentary, DraftQuestion, GenerationConfig, Result};
use crate::provider::{GenerationRequest, LlmProvider};
use std::sync::Arc;
use tracing::info;

/// Writes blind-review commentary for draft questions.
#[derive(Clone)]
pub struct CommentatorAgent {
    provider: Arc<dyn LlmProvider>,
    model: String,
    temperature: f64,
    template: PromptTemplate,
}

impl CommentatorAgent {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        config: &GenerationConfig,
        template: PromptTemplate,
    ) -> Self {
        Self {
            provider,
            model: config.model.clone(),
            temperature: config.temperature,
            template,
        }
    }

    /// Review a draft. The prompt carries the stem and options only; the
    /// key is withheld so the declared answer is an independent judgement.
    pub async fn review(&self, draft: &DraftQuestion) -> Result<(Commentary, CallUsage)> {
        let prompt = self.template.render(&[
            ("stem", &draft.stem),
            ("option_a", &draft.option_a),
            ("option_b", &draft.option_b),
            ("option_c", &draft.option_c),
            ("option_d", &draft.option_d),
        ])?;

        let response = self
            .provider
            .generate(GenerationRequest::structured::<Commentary>(
                prompt,
                &self.model,
                self.temperature,
            ))
            .await?;
        let usage = response.usage();
        let commentary: Commentary = response.decode()?;

        info!(
            declared = %commentary.declared_answer,
            model = %self.model,
            tokens = usage.tokens_used,
            cost = usage.cost,
            latency_secs = usage.latency_secs,
            "Blind review complete"
        );

        Ok((commentary, usage))
    }
}
