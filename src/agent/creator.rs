//! Question creator agent.
//!
//! Produces a complete draft question with the key at a caller-dictated
//! position. The position is dictated, not chosen by the model, so answer
//! keys can be balanced across a batch; a draft that places the key
//! anywhere else is rejected.

use crate::agent::PromptTemplate;
use crate::models::{
    AnswerPosition, CallUsage, Difficulty, DraftQuestion, GenerationConfig, QuaestioError, Result,
    ReviewFlags, SubtopicInput,
};
use crate::provider::{GenerationRequest, LlmProvider};
use std::sync::Arc;
use tracing::info;

/// Generates complete questions with stem, options, and key.
#[derive(Clone)]
pub struct CreatorAgent {
    provider: Arc<dyn LlmProvider>,
    model: String,
    temperature: f64,
    template: PromptTemplate,
}

impl CreatorAgent {
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

    /// Create a question for a subtopic with the key at `position`.
    pub async fn create_question(
        &self,
        subtopic: &SubtopicInput,
        position: AnswerPosition,
        difficulty: Difficulty,
    ) -> Result<(DraftQuestion, CallUsage)> {
        self.create_with_feedback(subtopic, position, difficulty, None)
            .await
    }

    /// Create a question, appending reviewer findings from a rejected
    /// round so the regeneration addresses them.
    pub async fn create_with_feedback(
        &self,
        subtopic: &SubtopicInput,
        position: AnswerPosition,
        difficulty: Difficulty,
        feedback: Option<&ReviewFlags>,
    ) -> Result<(DraftQuestion, CallUsage)> {
        let mut prompt = self.template.render(&[
            ("theme", &subtopic.theme),
            ("focus", &subtopic.focus),
            ("subtopic", &subtopic.subtopic),
            ("period", &subtopic.period),
            ("position", position.as_str()),
            ("difficulty", &difficulty.level().to_string()),
        ])?;

        if let Some(flags) = feedback {
            let issues = flags.issues();
            if !issues.is_empty() {
                prompt.push_str("\n\nA previous draft was rejected in review. Fix these issues:\n");
                for issue in &issues {
                    prompt.push_str("- ");
                    prompt.push_str(issue);
                    prompt.push('\n');
                }
            }
        }

        let response = self
            .provider
            .generate(GenerationRequest::structured::<DraftQuestion>(
                prompt,
                &self.model,
                self.temperature,
            ))
            .await?;
        let usage = response.usage();
        let draft: DraftQuestion = response.decode()?;

        // The dictated key position is the one invariant the model must
        // honor; everything else is reviewable.
        if draft.correct_answer != position {
            return Err(QuaestioError::InvalidOutput(format!(
                "model placed the key at {}, expected {} | subtopic={} | difficulty={}",
                draft.correct_answer,
                position,
                subtopic.subtopic,
                difficulty.level()
            )));
        }

        info!(
            subtopic = %subtopic.subtopic,
            difficulty = difficulty.level(),
            style = %draft.stem_style,
            position = %position,
            model = %self.model,
            tokens = usage.tokens_used,
            cost = usage.cost,
            latency_secs = usage.latency_secs,
            "Question created"
        );

        Ok((draft, usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::ScriptedProvider;

    fn config() -> GenerationConfig {
        GenerationConfig {
            model: "claude-sonnet-4-5".to_string(),
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
            "creator",
            "Write a {difficulty} question on {subtopic} ({theme}/{focus}, {period}). \
             Put the key at {position}.",
        )
    }

    fn subtopic() -> SubtopicInput {
        SubtopicInput {
            theme: "Gastroenterology".to_string(),
            focus: "Liver".to_string(),
            subtopic: "Hepatic function".to_string(),
            period: "year 2".to_string(),
        }
    }

    fn draft(position: AnswerPosition) -> DraftQuestion {
        DraftQuestion {
            stem: "Which liver function test is most specific?".to_string(),
            option_a: "ALT".to_string(),
            option_b: "AST".to_string(),
            option_c: "GGT".to_string(),
            option_d: "ALP".to_string(),
            correct_answer: position,
            learning_objective: "Recognize liver-specific markers".to_string(),
            difficulty: Difficulty::Application,
            stem_style: "conceptual".to_string(),
        }
    }

    fn agent(provider: Arc<ScriptedProvider>) -> CreatorAgent {
        CreatorAgent::new(provider, &config(), template())
    }

    #[tokio::test]
    async fn creates_question_at_dictated_position() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_structured(&draft(AnswerPosition::B));

        let (question, usage) = agent(Arc::clone(&provider))
            .create_question(&subtopic(), AnswerPosition::B, Difficulty::Application)
            .await
            .unwrap();

        assert_eq!(question.correct_answer, AnswerPosition::B);
        assert_eq!(usage.tokens_used, 1500);

        let request = &provider.requests()[0];
        assert_eq!(request.schema, Some("DraftQuestion"));
        assert_eq!(request.model, "claude-sonnet-4-5");
        assert!(request.prompt.contains("key at B"));
        assert!(request.prompt.contains("Hepatic function"));
    }

    #[tokio::test]
    async fn wrong_key_position_is_rejected() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_structured(&draft(AnswerPosition::C));

        let err = agent(provider)
            .create_question(&subtopic(), AnswerPosition::B, Difficulty::Application)
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("expected B"));
        assert!(message.contains("key at C"));
    }

    #[tokio::test]
    async fn feedback_issues_are_appended_to_the_prompt() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_structured(&draft(AnswerPosition::A));

        let flags = ReviewFlags {
            weak_distractors: true,
            notes: Some("option D is implausible".to_string()),
            ..Default::default()
        };

        agent(Arc::clone(&provider))
            .create_with_feedback(
                &subtopic(),
                AnswerPosition::A,
                Difficulty::Application,
                Some(&flags),
            )
            .await
            .unwrap();

        let prompt = &provider.requests()[0].prompt;
        assert!(prompt.contains("rejected in review"));
        assert!(prompt.contains("weak distractors"));
        assert!(prompt.contains("option D is implausible"));
    }

    #[tokio::test]
    async fn clean_feedback_adds_nothing() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_structured(&draft(AnswerPosition::A));

        agent(Arc::clone(&provider))
            .create_with_feedback(
                &subtopic(),
                AnswerPosition::A,
                Difficulty::Application,
                Some(&ReviewFlags::default()),
            )
            .await
            .unwrap();

        assert!(!provider.requests()[0].prompt.contains("rejected in review"));
    }

    #[tokio::test]
    async fn missing_template_placeholder_fails_before_any_call() {
        let provider = Arc::new(ScriptedProvider::new());
        let broken = PromptTemplate::from_text("creator", "Write about {subtopic} and {extra}.");
        let agent = CreatorAgent::new(Arc::clone(&provider) as Arc<dyn LlmProvider>, &config(), broken);

        let err = agent
            .create_question(&subtopic(), AnswerPosition::A, Difficulty::Recall)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("{extra}"));
        assert_eq!(provider.calls(), 0);
    }
}
