//! Spreadsheet export of finished questions.
//!
//! Writes the fixed 26-column layout with an emphasized header row. The
//! workbook is written to a temp file and renamed into place so a crash
//! mid-export never leaves a truncated spreadsheet behind.

use crate::models::{QuaestioError, QuestionRecord, QuestionStatus, Result};
use crate::store::QuestionStore;
use rust_xlsxwriter::{Color, Format, Workbook};
use std::path::Path;
use tracing::info;

/// Exported column order. Matches the `questions` table layout.
pub const COLUMN_ORDER: [&str; 26] = [
    "theme",
    "focus",
    "subtopic",
    "period",
    "difficulty",
    "stem_style",
    "stem",
    "option_a",
    "option_b",
    "option_c",
    "option_d",
    "correct_answer",
    "learning_objective",
    "introduction",
    "stem_analysis",
    "comment_a",
    "comment_b",
    "comment_c",
    "comment_d",
    "synthesis",
    "reference",
    "image_file",
    "image_source",
    "model",
    "review_rounds",
    "commentator_agreed",
];

/// Columns that hold long prose and get a wider layout.
const WIDE_COLUMNS: [&str; 10] = [
    "stem",
    "learning_objective",
    "introduction",
    "stem_analysis",
    "comment_a",
    "comment_b",
    "comment_c",
    "comment_d",
    "synthesis",
    "reference",
];

/// Exports stored questions to `.xlsx`.
#[derive(Debug, Clone, Default)]
pub struct SpreadsheetExporter {
    include_rejected: bool,
}

impl SpreadsheetExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also export rejected questions after the approved ones.
    pub fn include_rejected(mut self, include: bool) -> Self {
        self.include_rejected = include;
        self
    }

    /// Export questions to `output`; returns the number of rows written.
    pub async fn export(
        &self,
        store: &QuestionStore,
        output: &Path,
        limit: Option<usize>,
    ) -> Result<usize> {
        if output.extension().and_then(|e| e.to_str()) != Some("xlsx") {
            return Err(QuaestioError::InvalidInput(format!(
                "output path must end in .xlsx, got {}",
                output.display()
            )));
        }

        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| QuaestioError::io("creating output dir", e))?;
            }
        }

        let mut questions = store.questions_by_status(QuestionStatus::Approved).await?;
        if self.include_rejected {
            questions.extend(store.questions_by_status(QuestionStatus::Rejected).await?);
        }
        if let Some(limit) = limit {
            questions.truncate(limit);
        }

        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name("Questions")?;

        let header_format = Format::new()
            .set_bold()
            .set_background_color(Color::RGB(0x4F81BD))
            .set_font_color(Color::White);

        for (col, name) in COLUMN_ORDER.iter().enumerate() {
            let col = col as u16;
            worksheet.write_string_with_format(0, col, *name, &header_format)?;
            let width = if WIDE_COLUMNS.contains(name) { 40.0 } else { 16.0 };
            worksheet.set_column_width(col, width)?;
        }
        worksheet.set_freeze_panes(1, 0)?;

        for (row, (_, record)) in questions.iter().enumerate() {
            write_record(worksheet, row as u32 + 1, record)?;
        }

        // write-then-rename keeps the destination whole on failure
        let temp_path = output.with_extension("xlsx.tmp");
        workbook.save(&temp_path)?;
        std::fs::rename(&temp_path, output)
            .map_err(|e| QuaestioError::io("renaming spreadsheet into place", e))?;

        info!(
            rows = questions.len(),
            path = %output.display(),
            "Spreadsheet exported"
        );
        Ok(questions.len())
    }
}

fn write_record(
    worksheet: &mut rust_xlsxwriter::Worksheet,
    row: u32,
    record: &QuestionRecord,
) -> Result<()> {
    let text_cells = [
        &record.theme,
        &record.focus,
        &record.subtopic,
        &record.period,
    ];
    for (col, value) in text_cells.into_iter().enumerate() {
        worksheet.write_string(row, col as u16, value)?;
    }

    worksheet.write_number(row, 4, f64::from(record.difficulty.level()))?;
    worksheet.write_string(row, 5, &record.stem_style)?;
    worksheet.write_string(row, 6, &record.stem)?;
    worksheet.write_string(row, 7, &record.option_a)?;
    worksheet.write_string(row, 8, &record.option_b)?;
    worksheet.write_string(row, 9, &record.option_c)?;
    worksheet.write_string(row, 10, &record.option_d)?;
    worksheet.write_string(row, 11, record.correct_answer.as_str())?;
    worksheet.write_string(row, 12, &record.learning_objective)?;
    worksheet.write_string(row, 13, &record.introduction)?;
    worksheet.write_string(row, 14, &record.stem_analysis)?;
    worksheet.write_string(row, 15, &record.comment_a)?;
    worksheet.write_string(row, 16, &record.comment_b)?;
    worksheet.write_string(row, 17, &record.comment_c)?;
    worksheet.write_string(row, 18, &record.comment_d)?;
    worksheet.write_string(row, 19, &record.synthesis)?;
    worksheet.write_string(row, 20, &record.reference)?;
    worksheet.write_string(row, 21, record.image_file.as_deref().unwrap_or(""))?;
    worksheet.write_string(row, 22, record.image_source.as_deref().unwrap_or(""))?;
    worksheet.write_string(row, 23, &record.model)?;
    worksheet.write_number(row, 24, f64::from(record.review_rounds))?;
    worksheet.write_boolean(row, 25, record.commentator_agreed)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnswerPosition, Difficulty};
    use tempfile::TempDir;

    fn record() -> QuestionRecord {
        QuestionRecord {
            theme: "Cardiology".to_string(),
            focus: "Heart failure".to_string(),
            subtopic: "BNP".to_string(),
            period: "year 3".to_string(),
            difficulty: Difficulty::Application,
            stem_style: "clinical case".to_string(),
            stem: "stem".to_string(),
            option_a: "a".to_string(),
            option_b: "b".to_string(),
            option_c: "c".to_string(),
            option_d: "d".to_string(),
            correct_answer: AnswerPosition::A,
            learning_objective: "obj".to_string(),
            introduction: "intro".to_string(),
            stem_analysis: "analysis".to_string(),
            comment_a: "ca".to_string(),
            comment_b: "cb".to_string(),
            comment_c: "cc".to_string(),
            comment_d: "cd".to_string(),
            synthesis: "syn".to_string(),
            reference: "ref".to_string(),
            image_file: None,
            image_source: None,
            model: "gpt-4o".to_string(),
            review_rounds: 1,
            commentator_agreed: true,
        }
    }

    async fn store_with_questions(approved: usize, rejected: usize) -> QuestionStore {
        let store = QuestionStore::in_memory().await.unwrap();
        for _ in 0..approved {
            let id = store.save_question(&record()).await.unwrap();
            store.update_status(id, QuestionStatus::Approved).await.unwrap();
        }
        for _ in 0..rejected {
            let id = store.save_question(&record()).await.unwrap();
            store.update_status(id, QuestionStatus::Rejected).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn exports_approved_questions_to_xlsx() {
        let store = store_with_questions(3, 1).await;
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("questions.xlsx");

        let rows = SpreadsheetExporter::new()
            .export(&store, &output, None)
            .await
            .unwrap();

        assert_eq!(rows, 3);
        let written = std::fs::metadata(&output).unwrap();
        assert!(written.len() > 0);
        // temp file was renamed away
        assert!(!dir.path().join("questions.xlsx.tmp").exists());
    }

    #[tokio::test]
    async fn include_rejected_adds_rejected_rows() {
        let store = store_with_questions(2, 2).await;
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("all.xlsx");

        let rows = SpreadsheetExporter::new()
            .include_rejected(true)
            .export(&store, &output, None)
            .await
            .unwrap();

        assert_eq!(rows, 4);
    }

    #[tokio::test]
    async fn limit_caps_exported_rows() {
        let store = store_with_questions(5, 0).await;
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("limited.xlsx");

        let rows = SpreadsheetExporter::new()
            .export(&store, &output, Some(2))
            .await
            .unwrap();
        assert_eq!(rows, 2);
    }

    #[tokio::test]
    async fn refuses_non_xlsx_destination() {
        let store = store_with_questions(1, 0).await;
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("questions.csv");

        let err = SpreadsheetExporter::new()
            .export(&store, &output, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains(".xlsx"));
    }

    #[tokio::test]
    async fn empty_store_writes_header_only() {
        let store = QuestionStore::in_memory().await.unwrap();
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("empty.xlsx");

        let rows = SpreadsheetExporter::new()
            .export(&store, &output, None)
            .await
            .unwrap();

        assert_eq!(rows, 0);
        assert!(output.exists());
    }
}
