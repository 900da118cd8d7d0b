//! Subtopic batch generation.
//!
//! Expands a focus into a batch of specific subtopics, one question each.
//! The model routinely under-delivers or repeats itself, so the batch is
//! deduplicated and re-requested until the count is met or the attempt
//! budget runs out. This retry is content-level and entirely separate from
//! the provider's internal rate-limit retry.

use crate::agent::PromptTemplate;
use crate::models::{
    CallUsage, FocusInput, GenerationConfig, QuaestioError, Result, SubtopicBatch, SubtopicInput,
};
use crate::provider::{GenerationRequest, LlmProvider};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Fresh requests per batch: 1 initial + 2 retries.
const MAX_ATTEMPTS: u32 = 3;

/// Generates batches of unique subtopics for a focus.
#[derive(Clone)]
pub struct SubtopicGenerator {
    provider: Arc<dyn LlmProvider>,
    model: String,
    temperature: f64,
    template: PromptTemplate,
}

impl SubtopicGenerator {
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

    /// Generate `count` unique, non-blank subtopics for a focus.
    ///
    /// A response with fewer unique items than requested triggers a fresh
    /// request. Surplus items are truncated so the result is exactly
    /// `count` long.
    pub async fn generate_batch(
        &self,
        focus: &FocusInput,
        count: usize,
    ) -> Result<(Vec<SubtopicInput>, CallUsage)> {
        if count == 0 {
            return Err(QuaestioError::InvalidInput(
                "count must be positive, got 0".to_string(),
            ));
        }

        let mut usage = CallUsage::default();
        let mut last_unique = 0usize;

        for attempt in 1..=MAX_ATTEMPTS {
            let prompt = self.template.render(&[
                ("theme", &focus.theme),
                ("focus", &focus.focus),
                ("period", &focus.period),
                ("count", &count.to_string()),
            ])?;

            let response = self
                .provider
                .generate(GenerationRequest::structured::<SubtopicBatch>(
                    prompt,
                    &self.model,
                    self.temperature,
                ))
                .await?;
            usage.absorb(response.usage());

            let batch: SubtopicBatch = response.decode()?;
            let unique = dedup_subtopics(batch.subtopics);

            if unique.len() >= count {
                let subtopics: Vec<SubtopicInput> = unique
                    .into_iter()
                    .take(count)
                    .map(|s| SubtopicInput::from_focus(focus, s))
                    .collect();
                info!(
                    focus = %focus.focus,
                    count,
                    attempt,
                    tokens = usage.tokens_used,
                    cost = usage.cost,
                    "Subtopic batch complete"
                );
                return Ok((subtopics, usage));
            }

            last_unique = unique.len();
            warn!(
                focus = %focus.focus,
                attempt,
                unique = unique.len(),
                requested = count,
                "Subtopic batch came up short, retrying"
            );
        }

        Err(QuaestioError::InvalidOutput(format!(
            "subtopic batch for '{}' produced {last_unique} unique items, expected {count}, \
             after {MAX_ATTEMPTS} attempts",
            focus.focus
        )))
    }
}

/// Order-preserving dedup that drops blank entries.
fn dedup_subtopics(raw: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for item in raw {
        let trimmed = item.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_string()) {
            unique.push(trimmed.to_string());
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::ScriptedProvider;

    fn config() -> GenerationConfig {
        GenerationConfig {
            model: "gpt-4o".to_string(),
            temperature: 0.7,
            subtopics_per_focus: 50,
            difficulty: 2,
            max_review_rounds: 3,
            prompts_dir: "prompts".into(),
            concurrent_questions: 1,
            checkpoint_every: 10,
        }
    }

    fn template() -> PromptTemplate {
        PromptTemplate::from_text(
            "subtopics",
            "Generate {count} subtopics for {theme} / {focus} ({period}).",
        )
    }

    fn focus() -> FocusInput {
        FocusInput {
            theme: "Cardiology".to_string(),
            focus: "Heart failure".to_string(),
            period: "year 3".to_string(),
        }
    }

    fn batch_of(n: usize) -> SubtopicBatch {
        SubtopicBatch {
            subtopics: (0..n).map(|i| format!("subtopic {i}")).collect(),
        }
    }

    fn generator(provider: Arc<ScriptedProvider>) -> SubtopicGenerator {
        SubtopicGenerator::new(provider, &config(), template())
    }

    #[tokio::test]
    async fn full_batch_returns_requested_count() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_structured(&batch_of(50));

        let (subtopics, usage) = generator(Arc::clone(&provider))
            .generate_batch(&focus(), 50)
            .await
            .unwrap();

        assert_eq!(subtopics.len(), 50);
        assert!(subtopics.iter().all(|s| s.theme == "Cardiology"));
        assert!(subtopics.iter().all(|s| s.period == "year 3"));
        assert_eq!(provider.calls(), 1);
        assert_eq!(usage.tokens_used, 1500);

        let request = &provider.requests()[0];
        assert_eq!(request.model, "gpt-4o");
        assert_eq!(request.schema, Some("SubtopicBatch"));
        assert!(request.prompt.contains("50 subtopics"));
        assert!(request.prompt.contains("Heart failure"));
    }

    #[tokio::test]
    async fn surplus_items_are_truncated_to_count() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_structured(&batch_of(60));

        let (subtopics, _) = generator(provider)
            .generate_batch(&focus(), 50)
            .await
            .unwrap();
        assert_eq!(subtopics.len(), 50);
    }

    #[tokio::test]
    async fn short_batch_triggers_a_fresh_request() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_structured(&batch_of(30));
        provider.push_structured(&batch_of(50));

        let (subtopics, usage) = generator(Arc::clone(&provider))
            .generate_batch(&focus(), 50)
            .await
            .unwrap();

        assert_eq!(subtopics.len(), 50);
        assert_eq!(provider.calls(), 2);
        // usage accumulates across both attempts
        assert_eq!(usage.tokens_used, 3000);
    }

    #[tokio::test]
    async fn duplicates_collapse_and_trigger_retry() {
        let provider = Arc::new(ScriptedProvider::new());
        // 50 items but only 30 unique
        provider.push_structured(&SubtopicBatch {
            subtopics: (0..50).map(|i| format!("subtopic {}", i % 30)).collect(),
        });
        provider.push_structured(&batch_of(50));

        let (subtopics, _) = generator(Arc::clone(&provider))
            .generate_batch(&focus(), 50)
            .await
            .unwrap();

        assert_eq!(subtopics.len(), 50);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn blank_and_whitespace_items_are_dropped() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_structured(&SubtopicBatch {
            subtopics: (0..50)
                .map(|i| {
                    if i < 30 {
                        format!("subtopic {i}")
                    } else if i % 2 == 0 {
                        "   ".to_string()
                    } else {
                        String::new()
                    }
                })
                .collect(),
        });
        provider.push_structured(&batch_of(50));

        let (subtopics, _) = generator(Arc::clone(&provider))
            .generate_batch(&focus(), 50)
            .await
            .unwrap();

        assert_eq!(subtopics.len(), 50);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn exhausted_attempts_fail_with_counts_in_message() {
        let provider = Arc::new(ScriptedProvider::new());
        for _ in 0..3 {
            provider.push_structured(&batch_of(30));
        }

        let err = generator(Arc::clone(&provider))
            .generate_batch(&focus(), 50)
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("50"));
        assert!(message.contains("30"));
        assert!(message.contains("3 attempts"));
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn zero_count_is_rejected_before_any_call() {
        let provider = Arc::new(ScriptedProvider::new());
        let err = generator(Arc::clone(&provider))
            .generate_batch(&focus(), 0)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("count must be positive"));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn provider_failure_propagates_unchanged() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_error(crate::models::LlmError::TimedOut {
            model: "gpt-4o".to_string(),
            timeout: std::time::Duration::from_secs(30),
        });

        let err = generator(provider).generate_batch(&focus(), 50).await.unwrap_err();
        assert!(matches!(
            err,
            QuaestioError::Llm(crate::models::LlmError::TimedOut { .. })
        ));
    }

    #[test]
    fn dedup_preserves_first_occurrence_order() {
        let unique = dedup_subtopics(vec![
            "b".to_string(),
            "a".to_string(),
            "b".to_string(),
            " a ".to_string(),
            "c".to_string(),
        ]);
        assert_eq!(unique, vec!["b", "a", "c"]);
    }
}
