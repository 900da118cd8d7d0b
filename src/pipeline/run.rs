//! Question generation pipeline.
//!
//! Flow per focus:
//! focus -> subtopic batch -> for each subtopic: create -> blind review ->
//! validate -> persist. A rejected question regenerates with the
//! validator's structured feedback up to the configured round budget. A
//! failed question is recorded as failed and never aborts the batch.

use crate::agent::{CommentatorAgent, CreatorAgent, PromptLibrary, SubtopicGenerator, ValidatorAgent};
use crate::models::{
    BatchMetrics, BatchState, CallUsage, CheckpointSummary, Config, Decision, Difficulty,
    FocusInput, QuaestioError, QuestionMetrics, QuestionRecord, QuestionStatus, Result,
    ReviewFlags, SubtopicInput,
};
use crate::pipeline::PositionBalancer;
use crate::provider::LlmProvider;
use crate::store::QuestionStore;
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Approved question ids kept per checkpoint for spot checks.
const CHECKPOINT_SAMPLE_IDS: usize = 5;

/// Orchestrates the full question lifecycle across a batch of focuses.
pub struct QuestionPipeline {
    subtopics: SubtopicGenerator,
    creator: CreatorAgent,
    commentator: CommentatorAgent,
    validator: ValidatorAgent,
    store: QuestionStore,
    config: Config,
    balancer: Arc<Mutex<PositionBalancer>>,
}

impl QuestionPipeline {
    /// Build the pipeline: load prompt templates, wire the agents, and
    /// restore the position balancer from persisted counts.
    pub async fn new(
        config: Config,
        provider: Arc<dyn LlmProvider>,
        store: QuestionStore,
    ) -> Result<Self> {
        let prompts = PromptLibrary::new(&config.generation.prompts_dir);

        let subtopics = SubtopicGenerator::new(
            Arc::clone(&provider),
            &config.generation,
            prompts.load("subtopics")?,
        );
        let creator = CreatorAgent::new(
            Arc::clone(&provider),
            &config.generation,
            prompts.load("creator")?,
        );
        let commentator = CommentatorAgent::new(
            Arc::clone(&provider),
            &config.generation,
            prompts.load("commentator")?,
        );
        let validator = ValidatorAgent::new(
            Arc::clone(&provider),
            &config.generation,
            prompts.load("validator")?,
        );

        let counts = store.balancer_counts().await?;
        let balancer = Arc::new(Mutex::new(PositionBalancer::from_counts(counts)));

        Ok(Self {
            subtopics,
            creator,
            commentator,
            validator,
            store,
            config,
            balancer,
        })
    }

    /// Load focus inputs from a JSONL file, one object per line.
    pub fn load_focuses(path: &Path) -> Result<Vec<FocusInput>> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| QuaestioError::io("reading focuses file", e))?;

        let mut focuses = Vec::new();
        for (line_num, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let focus: FocusInput = serde_json::from_str(line)
                .map_err(|e| QuaestioError::Parse(format!("line {}: {e}", line_num + 1)))?;
            focus.validate().map_err(|e| {
                QuaestioError::InvalidInput(format!("line {}: {e}", line_num + 1))
            })?;
            focuses.push(focus);
        }

        info!(count = focuses.len(), "Loaded focuses");
        Ok(focuses)
    }

    /// Run the pipeline over a batch of focuses.
    ///
    /// With `resume`, focuses already completed according to the stored
    /// batch state are skipped.
    pub async fn run(&self, focuses: Vec<FocusInput>, resume: bool) -> Result<BatchMetrics> {
        let started = Instant::now();
        let difficulty = Difficulty::try_from(self.config.generation.difficulty)
            .map_err(QuaestioError::InvalidInput)?;
        let per_focus = self.config.generation.subtopics_per_focus;

        let skip = if resume {
            let done = self
                .store
                .batch_state()
                .await?
                .map(|s| s.completed_focuses)
                .unwrap_or(0);
            if done > 0 {
                info!(completed = done, "Resuming after completed focuses");
            }
            done.min(focuses.len())
        } else {
            0
        };

        info!(
            focuses = focuses.len() - skip,
            per_focus,
            workers = self.config.generation.concurrent_questions,
            rounds = self.config.generation.max_review_rounds,
            "Starting question pipeline"
        );

        let pb = ProgressBar::new(((focuses.len() - skip) * per_focus) as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({percent}%) {msg}")
                .expect("static template is valid")
                .progress_chars("##-"),
        );

        let mut tally = RunTally::default();
        let mut window = CheckpointWindow::start_at(skip);

        for (index, focus) in focuses.iter().enumerate().skip(skip) {
            self.store
                .save_batch_state(&BatchState {
                    current_focus: focus.focus.clone(),
                    completed_focuses: index,
                    processed: tally.processed,
                    timestamp: Utc::now(),
                })
                .await?;

            let (subtopics, sub_usage) = self.subtopics.generate_batch(focus, per_focus).await?;
            tally.cost += sub_usage.cost;
            window.cost += sub_usage.cost;

            let chunk_size = self.config.generation.concurrent_questions.max(1);
            for chunk in subtopics.chunks(chunk_size) {
                let mut handles = Vec::with_capacity(chunk.len());
                for subtopic in chunk {
                    let worker = self.worker();
                    let subtopic = subtopic.clone();
                    handles.push(tokio::spawn(async move {
                        worker.process(subtopic, difficulty).await
                    }));
                }

                for handle in handles {
                    match handle.await {
                        Ok(outcome) => {
                            tally.record(&outcome);
                            window.record(&outcome);
                        }
                        Err(e) => {
                            warn!(error = %e, "Question task panicked");
                            tally.failed += 1;
                            tally.processed += 1;
                            window.failed += 1;
                            window.generated += 1;
                        }
                    }
                    pb.inc(1);
                    pb.set_message(format!(
                        "approved: {}, rejected: {}, failed: {}",
                        tally.approved, tally.rejected, tally.failed
                    ));
                }
            }

            let counts = self.balancer.lock().expect("balancer lock").counts().clone();
            self.store.save_balancer_counts(&counts).await?;

            window.focuses += 1;
            if window.focuses >= self.config.generation.checkpoint_every {
                self.flush_checkpoint(&mut window, index).await?;
            }

            self.store
                .save_batch_state(&BatchState {
                    current_focus: focus.focus.clone(),
                    completed_focuses: index + 1,
                    processed: tally.processed,
                    timestamp: Utc::now(),
                })
                .await?;
        }

        if window.generated > 0 || window.focuses > 0 {
            let last_index = focuses.len().saturating_sub(1);
            self.flush_checkpoint(&mut window, last_index).await?;
        }

        pb.finish_with_message(format!(
            "Done! {} approved, {} rejected, {} failed",
            tally.approved, tally.rejected, tally.failed
        ));

        let mut metrics = BatchMetrics {
            total_questions: tally.processed,
            approved: tally.approved,
            rejected: tally.rejected,
            failed: tally.failed,
            total_cost: tally.cost,
            runtime_secs: started.elapsed().as_secs_f64(),
            approval_rate: 0.0,
        };
        metrics.finalize();

        info!(
            approved = metrics.approved,
            rejected = metrics.rejected,
            failed = metrics.failed,
            approval_rate = format!("{:.1}%", metrics.approval_rate * 100.0),
            cost = format!("${:.4}", metrics.total_cost),
            "Question pipeline complete"
        );

        Ok(metrics)
    }

    fn worker(&self) -> QuestionWorker {
        QuestionWorker {
            creator: self.creator.clone(),
            commentator: self.commentator.clone(),
            validator: self.validator.clone(),
            store: self.store.clone(),
            balancer: Arc::clone(&self.balancer),
            model: self.config.generation.model.clone(),
            max_rounds: self.config.generation.max_review_rounds,
        }
    }

    async fn flush_checkpoint(&self, window: &mut CheckpointWindow, upto: usize) -> Result<()> {
        let judged = window.approved + window.rejected;
        let checkpoint = CheckpointSummary {
            checkpoint_id: Uuid::new_v4().to_string(),
            focus_range: format!("focuses {}-{}", window.first_focus + 1, upto + 1),
            generated: window.generated,
            approved: window.approved,
            rejected: window.rejected,
            failed: window.failed,
            approval_rate: if judged > 0 {
                window.approved as f64 / judged as f64
            } else {
                0.0
            },
            mean_agreement: if window.agreement_samples > 0 {
                window.agreement_hits as f64 / window.agreement_samples as f64
            } else {
                0.0
            },
            total_cost: window.cost,
            sample_question_ids: window.sample_ids.clone(),
        };

        self.store.save_checkpoint(&checkpoint).await?;
        info!(
            range = %checkpoint.focus_range,
            approved = checkpoint.approved,
            approval_rate = format!("{:.1}%", checkpoint.approval_rate * 100.0),
            cost = format!("${:.4}", checkpoint.total_cost),
            "Checkpoint saved"
        );

        *window = CheckpointWindow::start_at(upto + 1);
        Ok(())
    }
}

/// Clonable slice of the pipeline that one spawned question task needs.
struct QuestionWorker {
    creator: CreatorAgent,
    commentator: CommentatorAgent,
    validator: ValidatorAgent,
    store: QuestionStore,
    balancer: Arc<Mutex<PositionBalancer>>,
    model: String,
    max_rounds: u32,
}

/// How one question ended up.
struct QuestionOutcome {
    status: QuestionStatus,
    question_id: Option<i64>,
    commentator_agreed: Option<bool>,
    cost: f64,
}

impl QuestionWorker {
    /// Drive one subtopic to a terminal status. Errors degrade to a
    /// `failed` outcome so the batch keeps moving.
    async fn process(&self, subtopic: SubtopicInput, difficulty: Difficulty) -> QuestionOutcome {
        match self.drive(&subtopic, difficulty).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    subtopic = %subtopic.subtopic,
                    error = %e,
                    "Question failed"
                );
                QuestionOutcome {
                    status: QuestionStatus::Failed,
                    question_id: None,
                    commentator_agreed: None,
                    cost: 0.0,
                }
            }
        }
    }

    async fn drive(
        &self,
        subtopic: &SubtopicInput,
        difficulty: Difficulty,
    ) -> Result<QuestionOutcome> {
        let started = Instant::now();
        let mut usage = CallUsage::default();
        let mut feedback: Option<ReviewFlags> = None;
        let position = self.balancer.lock().expect("balancer lock").next();

        let mut round = 1u32;
        loop {
            let (draft, creator_usage) = self
                .creator
                .create_with_feedback(subtopic, position, difficulty, feedback.as_ref())
                .await?;
            usage.absorb(creator_usage);

            let (commentary, review_usage) = self.commentator.review(&draft).await?;
            usage.absorb(review_usage);

            let (validation, validation_usage) =
                self.validator.validate(&draft, &commentary).await?;
            usage.absorb(validation_usage);

            let approved = validation.decision == Decision::Approved;
            if approved || round == self.max_rounds {
                let status = if approved {
                    QuestionStatus::Approved
                } else {
                    QuestionStatus::Rejected
                };

                let record = QuestionRecord::assemble(
                    subtopic,
                    draft,
                    commentary,
                    &self.model,
                    round,
                    validation.commentator_agreed,
                );
                let id = self.store.save_question(&record).await?;
                self.store.update_status(id, status).await?;
                self.store
                    .save_metrics(
                        id,
                        &QuestionMetrics {
                            model: self.model.clone(),
                            tokens: usage.tokens_used,
                            cost: usage.cost,
                            rounds: round,
                            duration_secs: started.elapsed().as_secs_f64(),
                            decision: status,
                            timestamp: Utc::now(),
                        },
                    )
                    .await?;

                return Ok(QuestionOutcome {
                    status,
                    question_id: Some(id),
                    commentator_agreed: Some(validation.commentator_agreed),
                    cost: usage.cost,
                });
            }

            warn!(
                subtopic = %subtopic.subtopic,
                round,
                issues = ?validation.flags.issues(),
                "Question rejected, regenerating with feedback"
            );
            feedback = Some(validation.flags);
            round += 1;
        }
    }
}

#[derive(Default)]
struct RunTally {
    processed: usize,
    approved: usize,
    rejected: usize,
    failed: usize,
    cost: f64,
}

impl RunTally {
    fn record(&mut self, outcome: &QuestionOutcome) {
        self.processed += 1;
        self.cost += outcome.cost;
        match outcome.status {
            QuestionStatus::Approved => self.approved += 1,
            QuestionStatus::Rejected => self.rejected += 1,
            _ => self.failed += 1,
        }
    }
}

/// Rolling aggregates since the last checkpoint.
#[derive(Default)]
struct CheckpointWindow {
    first_focus: usize,
    focuses: usize,
    generated: usize,
    approved: usize,
    rejected: usize,
    failed: usize,
    agreement_hits: usize,
    agreement_samples: usize,
    cost: f64,
    sample_ids: Vec<i64>,
}

impl CheckpointWindow {
    fn start_at(index: usize) -> Self {
        Self {
            first_focus: index,
            ..Default::default()
        }
    }

    fn record(&mut self, outcome: &QuestionOutcome) {
        self.generated += 1;
        self.cost += outcome.cost;
        match outcome.status {
            QuestionStatus::Approved => {
                self.approved += 1;
                if let Some(id) = outcome.question_id {
                    if self.sample_ids.len() < CHECKPOINT_SAMPLE_IDS {
                        self.sample_ids.push(id);
                    }
                }
            }
            QuestionStatus::Rejected => self.rejected += 1,
            _ => self.failed += 1,
        }
        if let Some(agreed) = outcome.commentator_agreed {
            self.agreement_samples += 1;
            if agreed {
                self.agreement_hits += 1;
            }
        }
    }
}
