//! SQLite persistence for pipeline state and metrics.
//!
//! WAL mode keeps reads non-blocking during writes; foreign keys cascade
//! metric rows when a question is deleted. All access goes through a
//! connection pool, so the store is cheap to clone and share across tasks.

use crate::models::{
    AnswerPosition, BatchMetrics, BatchState, CheckpointSummary, ModelComparison, QuaestioError,
    QuestionMetrics, QuestionRecord, QuestionStatus, Result,
};
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// SQLite-backed store for questions, metrics, checkpoints, and run state.
#[derive(Clone)]
pub struct QuestionStore {
    pool: SqlitePool,
}

impl QuestionStore {
    /// Open (or create) the database at `path` and run migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| QuaestioError::io("creating database dir", e))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        let store = Self { pool };
        store.migrate().await?;
        info!(path = %path.display(), "Question store ready");
        Ok(store)
    }

    /// In-memory store for tests. Pinned to a single connection so the
    /// database survives for the store's lifetime.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .in_memory(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS questions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                theme TEXT NOT NULL,
                focus TEXT NOT NULL,
                subtopic TEXT NOT NULL,
                period TEXT NOT NULL,
                difficulty INTEGER NOT NULL CHECK(difficulty IN (1, 2, 3)),
                stem_style TEXT NOT NULL,
                stem TEXT NOT NULL,
                option_a TEXT NOT NULL,
                option_b TEXT NOT NULL,
                option_c TEXT NOT NULL,
                option_d TEXT NOT NULL,
                correct_answer TEXT NOT NULL CHECK(correct_answer IN ('A', 'B', 'C', 'D')),
                learning_objective TEXT NOT NULL,
                introduction TEXT NOT NULL,
                stem_analysis TEXT NOT NULL,
                comment_a TEXT NOT NULL,
                comment_b TEXT NOT NULL,
                comment_c TEXT NOT NULL,
                comment_d TEXT NOT NULL,
                synthesis TEXT NOT NULL,
                reference TEXT NOT NULL,
                image_file TEXT,
                image_source TEXT,
                model TEXT NOT NULL,
                review_rounds INTEGER NOT NULL CHECK(review_rounds >= 1),
                commentator_agreed INTEGER NOT NULL CHECK(commentator_agreed IN (0, 1)),
                status TEXT NOT NULL DEFAULT 'pending'
                    CHECK(status IN ('pending', 'approved', 'rejected', 'failed')),
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                question_id INTEGER NOT NULL,
                model TEXT NOT NULL,
                tokens INTEGER NOT NULL CHECK(tokens >= 0),
                cost REAL NOT NULL CHECK(cost >= 0.0),
                rounds INTEGER NOT NULL CHECK(rounds >= 0),
                duration_secs REAL NOT NULL CHECK(duration_secs >= 0.0),
                decision TEXT NOT NULL CHECK(decision IN ('approved', 'rejected', 'failed')),
                timestamp TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                checkpoint_id TEXT NOT NULL,
                focus_range TEXT NOT NULL,
                generated INTEGER NOT NULL,
                approved INTEGER NOT NULL,
                rejected INTEGER NOT NULL,
                failed INTEGER NOT NULL,
                approval_rate REAL NOT NULL,
                mean_agreement REAL NOT NULL,
                total_cost REAL NOT NULL,
                sample_question_ids TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS batch_state (
                id INTEGER PRIMARY KEY CHECK(id = 1),
                current_focus TEXT NOT NULL,
                completed_focuses INTEGER NOT NULL,
                processed INTEGER NOT NULL,
                timestamp TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS balancer_state (
                position TEXT PRIMARY KEY CHECK(position IN ('A', 'B', 'C', 'D')),
                count INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a question with status `pending`; returns its id.
    pub async fn save_question(&self, record: &QuestionRecord) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO questions (
                theme, focus, subtopic, period,
                difficulty, stem_style, stem,
                option_a, option_b, option_c, option_d,
                correct_answer, learning_objective,
                introduction, stem_analysis,
                comment_a, comment_b, comment_c, comment_d,
                synthesis, reference,
                image_file, image_source,
                model, review_rounds, commentator_agreed
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.theme)
        .bind(&record.focus)
        .bind(&record.subtopic)
        .bind(&record.period)
        .bind(i64::from(record.difficulty.level()))
        .bind(&record.stem_style)
        .bind(&record.stem)
        .bind(&record.option_a)
        .bind(&record.option_b)
        .bind(&record.option_c)
        .bind(&record.option_d)
        .bind(record.correct_answer.as_str())
        .bind(&record.learning_objective)
        .bind(&record.introduction)
        .bind(&record.stem_analysis)
        .bind(&record.comment_a)
        .bind(&record.comment_b)
        .bind(&record.comment_c)
        .bind(&record.comment_d)
        .bind(&record.synthesis)
        .bind(&record.reference)
        .bind(&record.image_file)
        .bind(&record.image_source)
        .bind(&record.model)
        .bind(i64::from(record.review_rounds))
        .bind(i64::from(record.commentator_agreed))
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Move a question to a new lifecycle status.
    pub async fn update_status(&self, id: i64, status: QuestionStatus) -> Result<()> {
        let result = sqlx::query(
            "UPDATE questions SET status = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(QuaestioError::InvalidInput(format!(
                "question {id} not found"
            )));
        }
        Ok(())
    }

    /// Fetch one question by id.
    pub async fn question(&self, id: i64) -> Result<Option<QuestionRecord>> {
        let row = sqlx::query("SELECT * FROM questions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| row_to_record(&r)).transpose()
    }

    /// All questions in a given status, oldest first.
    pub async fn questions_by_status(
        &self,
        status: QuestionStatus,
    ) -> Result<Vec<(i64, QuestionRecord)>> {
        let rows = sqlx::query("SELECT * FROM questions WHERE status = ? ORDER BY id")
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let id: i64 = row.try_get("id")?;
                Ok((id, row_to_record(row)?))
            })
            .collect()
    }

    /// Record per-question metrics.
    pub async fn save_metrics(&self, question_id: i64, metrics: &QuestionMetrics) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO metrics (question_id, model, tokens, cost, rounds, duration_secs, decision, timestamp)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(question_id)
        .bind(&metrics.model)
        .bind(i64::from(metrics.tokens))
        .bind(metrics.cost)
        .bind(i64::from(metrics.rounds))
        .bind(metrics.duration_secs)
        .bind(metrics.decision.as_str())
        .bind(metrics.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Aggregate metrics over every recorded question.
    pub async fn batch_metrics(&self) -> Result<BatchMetrics> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN decision = 'approved' THEN 1 ELSE 0 END), 0) AS approved,
                COALESCE(SUM(CASE WHEN decision = 'rejected' THEN 1 ELSE 0 END), 0) AS rejected,
                COALESCE(SUM(CASE WHEN decision = 'failed' THEN 1 ELSE 0 END), 0) AS failed,
                COALESCE(SUM(cost), 0.0) AS total_cost,
                COALESCE(SUM(duration_secs), 0.0) AS runtime_secs
            FROM metrics
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let mut metrics = BatchMetrics {
            total_questions: row.try_get::<i64, _>("total")? as usize,
            approved: row.try_get::<i64, _>("approved")? as usize,
            rejected: row.try_get::<i64, _>("rejected")? as usize,
            failed: row.try_get::<i64, _>("failed")? as usize,
            total_cost: row.try_get("total_cost")?,
            runtime_secs: row.try_get("runtime_secs")?,
            approval_rate: 0.0,
        };
        metrics.finalize();
        Ok(metrics)
    }

    /// Per-model quality and cost comparison.
    pub async fn model_comparison(&self) -> Result<Vec<ModelComparison>> {
        let rows = sqlx::query(
            r#"
            SELECT
                m.model AS model,
                COUNT(*) AS questions,
                AVG(CASE WHEN m.decision = 'approved' THEN 1.0 ELSE 0.0 END) AS approval_rate,
                AVG(m.cost) AS mean_cost,
                AVG(m.duration_secs) AS mean_duration_secs,
                AVG(CASE WHEN q.commentator_agreed = 1 THEN 1.0 ELSE 0.0 END) AS agreement_rate
            FROM metrics m
            JOIN questions q ON q.id = m.question_id
            GROUP BY m.model
            ORDER BY m.model
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ModelComparison {
                    model: row.try_get("model")?,
                    questions: row.try_get::<i64, _>("questions")? as usize,
                    approval_rate: row.try_get("approval_rate")?,
                    mean_cost: row.try_get("mean_cost")?,
                    mean_duration_secs: row.try_get("mean_duration_secs")?,
                    agreement_rate: row.try_get("agreement_rate")?,
                })
            })
            .collect()
    }

    /// Persist a checkpoint summary; returns the row id.
    pub async fn save_checkpoint(&self, checkpoint: &CheckpointSummary) -> Result<i64> {
        let sample_ids = serde_json::to_string(&checkpoint.sample_question_ids)
            .map_err(|e| QuaestioError::Internal(format!("serializing sample ids: {e}")))?;

        let result = sqlx::query(
            r#"
            INSERT INTO checkpoints (
                checkpoint_id, focus_range, generated, approved, rejected, failed,
                approval_rate, mean_agreement, total_cost, sample_question_ids
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&checkpoint.checkpoint_id)
        .bind(&checkpoint.focus_range)
        .bind(checkpoint.generated as i64)
        .bind(checkpoint.approved as i64)
        .bind(checkpoint.rejected as i64)
        .bind(checkpoint.failed as i64)
        .bind(checkpoint.approval_rate)
        .bind(checkpoint.mean_agreement)
        .bind(checkpoint.total_cost)
        .bind(sample_ids)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// All checkpoint summaries, oldest first.
    pub async fn checkpoints(&self) -> Result<Vec<CheckpointSummary>> {
        let rows = sqlx::query("SELECT * FROM checkpoints ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let sample_json: String = row.try_get("sample_question_ids")?;
                let sample_question_ids: Vec<i64> = serde_json::from_str(&sample_json)
                    .map_err(|e| QuaestioError::Parse(format!("sample ids: {e}")))?;

                Ok(CheckpointSummary {
                    checkpoint_id: row.try_get("checkpoint_id")?,
                    focus_range: row.try_get("focus_range")?,
                    generated: row.try_get::<i64, _>("generated")? as usize,
                    approved: row.try_get::<i64, _>("approved")? as usize,
                    rejected: row.try_get::<i64, _>("rejected")? as usize,
                    failed: row.try_get::<i64, _>("failed")? as usize,
                    approval_rate: row.try_get("approval_rate")?,
                    mean_agreement: row.try_get("mean_agreement")?,
                    total_cost: row.try_get("total_cost")?,
                    sample_question_ids,
                })
            })
            .collect()
    }

    /// Upsert the single batch-state row.
    pub async fn save_batch_state(&self, state: &BatchState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO batch_state (id, current_focus, completed_focuses, processed, timestamp)
            VALUES (1, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                current_focus = excluded.current_focus,
                completed_focuses = excluded.completed_focuses,
                processed = excluded.processed,
                timestamp = excluded.timestamp
            "#,
        )
        .bind(&state.current_focus)
        .bind(state.completed_focuses as i64)
        .bind(state.processed as i64)
        .bind(state.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Load the batch state, if a run has been recorded.
    pub async fn batch_state(&self) -> Result<Option<BatchState>> {
        let row = sqlx::query("SELECT * FROM batch_state WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| {
            let raw: String = r.try_get("timestamp")?;
            let timestamp = DateTime::parse_from_rfc3339(&raw)
                .map_err(|e| QuaestioError::Parse(format!("batch state timestamp: {e}")))?
                .with_timezone(&Utc);

            Ok(BatchState {
                current_focus: r.try_get("current_focus")?,
                completed_focuses: r.try_get::<i64, _>("completed_focuses")? as usize,
                processed: r.try_get::<i64, _>("processed")? as usize,
                timestamp,
            })
        })
        .transpose()
    }

    /// Persist answer-position usage counts.
    pub async fn save_balancer_counts(
        &self,
        counts: &HashMap<AnswerPosition, u64>,
    ) -> Result<()> {
        for position in AnswerPosition::ALL {
            let count = counts.get(&position).copied().unwrap_or(0);
            sqlx::query(
                r#"
                INSERT INTO balancer_state (position, count) VALUES (?, ?)
                ON CONFLICT(position) DO UPDATE SET count = excluded.count
                "#,
            )
            .bind(position.as_str())
            .bind(count as i64)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Load answer-position usage counts.
    pub async fn balancer_counts(&self) -> Result<HashMap<AnswerPosition, u64>> {
        let rows = sqlx::query("SELECT position, count FROM balancer_state")
            .fetch_all(&self.pool)
            .await?;

        let mut counts = HashMap::new();
        for row in rows {
            let raw: String = row.try_get("position")?;
            let position = AnswerPosition::from_str(&raw).map_err(QuaestioError::Parse)?;
            let count: i64 = row.try_get("count")?;
            counts.insert(position, count as u64);
        }
        Ok(counts)
    }
}

fn row_to_record(row: &SqliteRow) -> Result<QuestionRecord> {
    let difficulty_raw: i64 = row.try_get("difficulty")?;
    let difficulty = crate::models::Difficulty::try_from(difficulty_raw as u8)
        .map_err(QuaestioError::Parse)?;

    let position_raw: String = row.try_get("correct_answer")?;
    let correct_answer = AnswerPosition::from_str(&position_raw).map_err(QuaestioError::Parse)?;

    Ok(QuestionRecord {
        theme: row.try_get("theme")?,
        focus: row.try_get("focus")?,
        subtopic: row.try_get("subtopic")?,
        period: row.try_get("period")?,
        difficulty,
        stem_style: row.try_get("stem_style")?,
        stem: row.try_get("stem")?,
        option_a: row.try_get("option_a")?,
        option_b: row.try_get("option_b")?,
        option_c: row.try_get("option_c")?,
        option_d: row.try_get("option_d")?,
        correct_answer,
        learning_objective: row.try_get("learning_objective")?,
        introduction: row.try_get("introduction")?,
        stem_analysis: row.try_get("stem_analysis")?,
        comment_a: row.try_get("comment_a")?,
        comment_b: row.try_get("comment_b")?,
        comment_c: row.try_get("comment_c")?,
        comment_d: row.try_get("comment_d")?,
        synthesis: row.try_get("synthesis")?,
        reference: row.try_get("reference")?,
        image_file: row.try_get("image_file")?,
        image_source: row.try_get("image_source")?,
        model: row.try_get("model")?,
        review_rounds: row.try_get::<i64, _>("review_rounds")? as u32,
        commentator_agreed: row.try_get::<i64, _>("commentator_agreed")? != 0,
    })
}
