//! Question domain types: inputs, agent outputs, and the merged record.
//!
//! These are the typed contracts the LLM responses are validated into.
//! Enumerations replace validated strings wherever the value set is closed.

use serde::{Deserialize, Serialize};

/// Position of the correct answer among the four options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnswerPosition {
    A,
    B,
    C,
    D,
}

impl AnswerPosition {
    /// All positions, in option order.
    pub const ALL: [Self; 4] = [Self::A, Self::B, Self::C, Self::D];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
        }
    }
}

impl std::fmt::Display for AnswerPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AnswerPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" => Ok(Self::A),
            "B" => Ok(Self::B),
            "C" => Ok(Self::C),
            "D" => Ok(Self::D),
            other => Err(format!("answer position must be A/B/C/D, got '{other}'")),
        }
    }
}

/// Difficulty level mapped to Bloom's taxonomy.
///
/// Serialized as the integers 1-3 used throughout prompts and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Difficulty {
    /// Remember/Understand: basic concepts and definitions
    Recall,
    /// Apply/Analyze: clinical application, case analysis
    Application,
    /// Evaluate/Create: complex decision-making and synthesis
    Synthesis,
}

impl Difficulty {
    pub fn level(self) -> u8 {
        match self {
            Self::Recall => 1,
            Self::Application => 2,
            Self::Synthesis => 3,
        }
    }
}

impl TryFrom<u8> for Difficulty {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Recall),
            2 => Ok(Self::Application),
            3 => Ok(Self::Synthesis),
            other => Err(format!("difficulty must be 1-3, got {other}")),
        }
    }
}

impl From<Difficulty> for u8 {
    fn from(d: Difficulty) -> Self {
        d.level()
    }
}

/// Validator's approval decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
}

/// Lifecycle status of a stored question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionStatus {
    /// Saved but not yet resolved
    Pending,
    Approved,
    Rejected,
    /// Unrecoverable error during processing
    Failed,
}

impl QuestionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for QuestionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QuestionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown question status '{other}'")),
        }
    }
}

/// Input row describing a focus to generate questions for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FocusInput {
    /// Medical theme (e.g. "Cardiology")
    pub theme: String,

    /// Specific focus within the theme (e.g. "Heart failure")
    pub focus: String,

    /// Course period the questions target (e.g. "year 3")
    pub period: String,
}

impl FocusInput {
    /// Check required fields are non-blank.
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("theme", &self.theme),
            ("focus", &self.focus),
            ("period", &self.period),
        ] {
            if value.trim().is_empty() {
                return Err(format!("field '{name}' must not be blank"));
            }
        }
        Ok(())
    }
}

/// A focus narrowed down to one generated subtopic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtopicInput {
    pub theme: String,
    pub focus: String,
    pub subtopic: String,
    pub period: String,
}

impl SubtopicInput {
    /// Attach a generated subtopic to its source focus.
    pub fn from_focus(focus: &FocusInput, subtopic: impl Into<String>) -> Self {
        Self {
            theme: focus.theme.clone(),
            focus: focus.focus.clone(),
            subtopic: subtopic.into(),
            period: focus.period.clone(),
        }
    }
}

/// Typed contract for the subtopic batch response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtopicBatch {
    pub subtopics: Vec<String>,
}

/// Typed contract for the question creator's output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftQuestion {
    /// Full question statement
    pub stem: String,

    pub option_a: String,
    pub option_b: String,
    pub option_c: String,
    pub option_d: String,

    /// Position of the key; must equal the position dictated in the prompt
    pub correct_answer: AnswerPosition,

    /// Pedagogical objective of the question
    pub learning_objective: String,

    pub difficulty: Difficulty,

    /// Stem style: "conceptual", "clinical case", ...
    pub stem_style: String,
}

impl DraftQuestion {
    /// Option text at a given position.
    pub fn option(&self, position: AnswerPosition) -> &str {
        match position {
            AnswerPosition::A => &self.option_a,
            AnswerPosition::B => &self.option_b,
            AnswerPosition::C => &self.option_c,
            AnswerPosition::D => &self.option_d,
        }
    }
}

/// Typed contract for the blind-review commentator's output.
///
/// The commentator never sees the key; `declared_answer` is its independent
/// judgement and disagreement with the creator is a quality signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commentary {
    /// Option the commentator believes is correct
    pub declared_answer: AnswerPosition,

    /// Introductory comment contextualizing the theme
    pub introduction: String,

    /// Analysis of the stem and clinical context
    pub stem_analysis: String,

    pub comment_a: String,
    pub comment_b: String,
    pub comment_c: String,
    pub comment_d: String,

    /// Closing synthesis from the top-scorer's perspective
    pub synthesis: String,

    /// Verifiable bibliographic reference
    pub reference: String,
}

/// Structured error categories for validation feedback.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewFlags {
    /// Stem is confusing or ambiguous
    #[serde(default)]
    pub ambiguous_stem: bool,

    /// Incorrect options are too obviously wrong
    #[serde(default)]
    pub weak_distractors: bool,

    /// Declared key is debatable or controversial
    #[serde(default)]
    pub disputed_key: bool,

    /// Commentary does not cover all expected sections
    #[serde(default)]
    pub incomplete_commentary: bool,

    /// Difficulty does not match the requested level
    #[serde(default)]
    pub off_level: bool,

    /// Free-text detail on the problems found
    #[serde(default)]
    pub notes: Option<String>,
}

impl ReviewFlags {
    /// Human-readable labels for the raised flags, in declaration order.
    pub fn issues(&self) -> Vec<&str> {
        let mut issues = Vec::new();
        if self.ambiguous_stem {
            issues.push("ambiguous stem");
        }
        if self.weak_distractors {
            issues.push("weak distractors");
        }
        if self.disputed_key {
            issues.push("disputed answer key");
        }
        if self.incomplete_commentary {
            issues.push("incomplete commentary");
        }
        if self.off_level {
            issues.push("difficulty off level");
        }
        if let Some(notes) = &self.notes {
            if !notes.trim().is_empty() {
                issues.push(notes.trim());
            }
        }
        issues
    }

    pub fn is_clean(&self) -> bool {
        self.issues().is_empty()
    }
}

/// Typed contract for the validator's LLM response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorVerdict {
    pub decision: Decision,

    #[serde(default)]
    pub flags: ReviewFlags,
}

/// Final validation result for one review round.
///
/// `commentator_agreed` is computed locally from the declared and dictated
/// answers; it is a fact, not a model output.
#[derive(Debug, Clone)]
pub struct Validation {
    pub decision: Decision,
    pub commentator_agreed: bool,
    pub flags: ReviewFlags,
}

/// Complete question record: the 26 exported columns.
///
/// Merges the creator's draft, the commentator's review, optional image
/// support fields, and run metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRecord {
    // Base fields
    pub theme: String,
    pub focus: String,
    pub subtopic: String,
    pub period: String,

    // Question fields
    pub difficulty: Difficulty,
    pub stem_style: String,
    pub stem: String,
    pub option_a: String,
    pub option_b: String,
    pub option_c: String,
    pub option_d: String,
    pub correct_answer: AnswerPosition,
    pub learning_objective: String,

    // Commentary fields
    pub introduction: String,
    pub stem_analysis: String,
    pub comment_a: String,
    pub comment_b: String,
    pub comment_c: String,
    pub comment_d: String,
    pub synthesis: String,
    pub reference: String,

    // Image support, optional
    #[serde(default)]
    pub image_file: Option<String>,
    #[serde(default)]
    pub image_source: Option<String>,

    // Metadata
    pub model: String,
    pub review_rounds: u32,
    pub commentator_agreed: bool,
}

impl QuestionRecord {
    /// Assemble the record from the pieces produced along the lifecycle.
    pub fn assemble(
        subtopic: &SubtopicInput,
        draft: DraftQuestion,
        commentary: Commentary,
        model: impl Into<String>,
        review_rounds: u32,
        commentator_agreed: bool,
    ) -> Self {
        Self {
            theme: subtopic.theme.clone(),
            focus: subtopic.focus.clone(),
            subtopic: subtopic.subtopic.clone(),
            period: subtopic.period.clone(),
            difficulty: draft.difficulty,
            stem_style: draft.stem_style,
            stem: draft.stem,
            option_a: draft.option_a,
            option_b: draft.option_b,
            option_c: draft.option_c,
            option_d: draft.option_d,
            correct_answer: draft.correct_answer,
            learning_objective: draft.learning_objective,
            introduction: commentary.introduction,
            stem_analysis: commentary.stem_analysis,
            comment_a: commentary.comment_a,
            comment_b: commentary.comment_b,
            comment_c: commentary.comment_c,
            comment_d: commentary.comment_d,
            synthesis: commentary.synthesis,
            reference: commentary.reference,
            image_file: None,
            image_source: None,
            model: model.into(),
            review_rounds,
            commentator_agreed,
        }
    }
}

/// Token/cost/latency accounting for one or more provider calls.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CallUsage {
    pub tokens_used: u32,
    pub cost: f64,
    pub latency_secs: f64,
}

impl CallUsage {
    /// Fold another call's usage into this accumulator.
    pub fn absorb(&mut self, other: CallUsage) {
        self.tokens_used += other.tokens_used;
        self.cost += other.cost;
        self.latency_secs += other.latency_secs;
    }
}
