//! Validator agent.
//!
//! Combines the creator's draft with the commentator's blind review and
//! decides approval or rejection, with structured flags explaining a
//! rejection. Commentator agreement is computed here from the two answer
//! positions; it is a fact, not something to ask the model for.

use crate::agent::PromptTemplate;
use crate::models::{
    CallUsage, Commentary, DraftQuestion, GenerationConfig, Result, Validation, ValidatorVerdict,
};
use crate::provider::{GenerationRequest, LlmProvider};
use std::sync::Arc;
use tracing::info;

/// Judges question quality from the draft plus its blind review.
#[derive(Clone)]
pub struct ValidatorAgent {
    provider: Arc<dyn LlmProvider>,
    model: String,
    temperature: f64,
    template: PromptTemplate,
}

impl ValidatorAgent {
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

    /// Validate a draft against its blind review.
    pub async fn validate(
        &self,
        draft: &DraftQuestion,
        commentary: &Commentary,
    ) -> Result<(Validation, CallUsage)> {
        let agreed = commentary.declared_answer == draft.correct_answer;

        let prompt = self.template.render(&[
            ("stem", &draft.stem),
            ("option_a", &draft.option_a),
            ("option_b", &draft.option_b),
            ("option_c", &draft.option_c),
            ("option_d", &draft.option_d),
            ("correct_answer", draft.correct_answer.as_str()),
            ("declared_answer", commentary.declared_answer.as_str()),
            ("agreement", if agreed { "agrees" } else { "disagrees" }),
            ("difficulty", &draft.difficulty.level().to_string()),
            ("commentary", &commentary_digest(commentary)),
        ])?;

        let response = self
            .provider
            .generate(GenerationRequest::structured::<ValidatorVerdict>(
                prompt,
                &self.model,
                self.temperature,
            ))
            .await?;
        let usage = response.usage();
        let verdict: ValidatorVerdict = response.decode()?;

        info!(
            decision = ?verdict.decision,
            agreed,
            model = %self.model,
            tokens = usage.tokens_used,
            cost = usage.cost,
            "Validation complete"
        );

        Ok((
            Validation {
                decision: verdict.decision,
                commentator_agreed: agreed,
                flags: verdict.flags,
            },
            usage,
        ))
    }
}

/// Flatten the commentary sections into a labeled block for the prompt.
fn commentary_digest(commentary: &Commentary) -> String {
    format!(
        "Introduction: {}\nStem analysis: {}\nOption A: {}\nOption B: {}\nOption C: {}\nOption D: {}\nSynthesis: {}\nReference: {}",
        commentary.introduction,
        commentary.stem_analysis,
        commentary.comment_a,
        commentary.comment_b,
        commentary.comment_c,
        commentary.comment_d,
        commentary.synthesis,
        commentary.reference,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnswerPosition, Decision, Difficulty, ReviewFlags};
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
            "validator",
            "Stem: {stem}\nA) {option_a} B) {option_b} C) {option_c} D) {option_d}\n\
             Key: {correct_answer}. Blind reviewer declared {declared_answer} ({agreement}).\n\
             Level {difficulty}.\n{commentary}",
        )
    }

    fn draft() -> DraftQuestion {
        DraftQuestion {
            stem: "stem".to_string(),
            option_a: "a".to_string(),
            option_b: "b".to_string(),
            option_c: "c".to_string(),
            option_d: "d".to_string(),
            correct_answer: AnswerPosition::B,
            learning_objective: "obj".to_string(),
            difficulty: Difficulty::Application,
            stem_style: "clinical case".to_string(),
        }
    }

    fn commentary(declared: AnswerPosition) -> Commentary {
        Commentary {
            declared_answer: declared,
            introduction: "intro".to_string(),
            stem_analysis: "analysis".to_string(),
            comment_a: "ca".to_string(),
            comment_b: "cb".to_string(),
            comment_c: "cc".to_string(),
            comment_d: "cd".to_string(),
            synthesis: "synthesis".to_string(),
            reference: "ref".to_string(),
        }
    }

    fn verdict(decision: Decision, flags: ReviewFlags) -> ValidatorVerdict {
        ValidatorVerdict { decision, flags }
    }

    #[tokio::test]
    async fn approval_with_matching_answers_reports_agreement() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_structured(&verdict(Decision::Approved, ReviewFlags::default()));

        let agent = ValidatorAgent::new(Arc::clone(&provider) as Arc<dyn LlmProvider>, &config(), template());
        let (validation, _) = agent
            .validate(&draft(), &commentary(AnswerPosition::B))
            .await
            .unwrap();

        assert_eq!(validation.decision, Decision::Approved);
        assert!(validation.commentator_agreed);
        assert!(validation.flags.is_clean());
        assert_eq!(provider.requests()[0].schema, Some("ValidatorVerdict"));
        assert!(provider.requests()[0].prompt.contains("(agrees)"));
    }

    #[tokio::test]
    async fn disagreement_is_computed_locally_from_positions() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_structured(&verdict(Decision::Rejected, ReviewFlags {
            disputed_key: true,
            ..Default::default()
        }));

        let agent = ValidatorAgent::new(Arc::clone(&provider) as Arc<dyn LlmProvider>, &config(), template());
        let (validation, _) = agent
            .validate(&draft(), &commentary(AnswerPosition::D))
            .await
            .unwrap();

        assert_eq!(validation.decision, Decision::Rejected);
        assert!(!validation.commentator_agreed);
        assert!(validation.flags.disputed_key);
        assert!(provider.requests()[0].prompt.contains("(disagrees)"));
    }

    #[tokio::test]
    async fn prompt_carries_both_answers_and_the_commentary() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_structured(&verdict(Decision::Approved, ReviewFlags::default()));

        let agent = ValidatorAgent::new(Arc::clone(&provider) as Arc<dyn LlmProvider>, &config(), template());
        agent
            .validate(&draft(), &commentary(AnswerPosition::C))
            .await
            .unwrap();

        let prompt = &provider.requests()[0].prompt;
        assert!(prompt.contains("Key: B"));
        assert!(prompt.contains("declared C"));
        assert!(prompt.contains("Synthesis: synthesis"));
    }
}
