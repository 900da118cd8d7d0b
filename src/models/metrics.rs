//! Metrics models for generation analytics and model comparison.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::QuestionStatus;

/// Per-question generation and validation metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionMetrics {
    /// Model used for the question's calls
    pub model: String,

    /// Total tokens consumed across all rounds and agents
    pub tokens: u32,

    /// Total cost in USD
    pub cost: f64,

    /// Review rounds until approval/rejection
    pub rounds: u32,

    /// Wall-clock duration in seconds
    pub duration_secs: f64,

    /// Final outcome (approved, rejected, or failed; never pending)
    pub decision: QuestionStatus,

    pub timestamp: DateTime<Utc>,
}

/// Batch-level aggregated metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchMetrics {
    pub total_questions: usize,
    pub approved: usize,
    pub rejected: usize,
    pub failed: usize,

    /// Total cost in USD across all questions
    pub total_cost: f64,

    /// Total runtime in seconds
    pub runtime_secs: f64,

    /// approved / (approved + rejected), 0.0 when nothing was judged
    pub approval_rate: f64,
}

impl BatchMetrics {
    /// Calculate derived stats.
    pub fn finalize(&mut self) {
        let judged = self.approved + self.rejected;
        if judged > 0 {
            self.approval_rate = self.approved as f64 / judged as f64;
        }
    }
}

/// Per-model performance comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelComparison {
    pub model: String,
    pub questions: usize,
    pub approval_rate: f64,
    pub mean_cost: f64,
    pub mean_duration_secs: f64,
    /// How often the blind commentator agreed with the dictated key
    pub agreement_rate: f64,
}

/// Checkpoint summary persisted every N focuses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointSummary {
    pub checkpoint_id: String,

    /// Human-readable window, e.g. "focuses 1-10"
    pub focus_range: String,

    pub generated: usize,
    pub approved: usize,
    pub rejected: usize,
    pub failed: usize,
    pub approval_rate: f64,
    pub mean_agreement: f64,
    pub total_cost: f64,

    /// A few approved question ids for manual spot checks
    pub sample_question_ids: Vec<i64>,
}

/// Current position of a batch run, persisted for monitoring and resume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchState {
    /// Focus currently being processed
    pub current_focus: String,

    /// Focuses fully completed so far
    pub completed_focuses: usize,

    /// Questions resolved so far
    pub processed: usize,

    pub timestamp: DateTime<Utc>,
}
