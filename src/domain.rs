//! Domain models: exercise kind, difficulty, the validated generation request,
//! and the decomposed exercise set.

use serde::{Deserialize, Serialize};

use crate::error::RequestError;

pub const MIN_QUESTIONS: usize = 1;
pub const MAX_QUESTIONS: usize = 10;

/// Pedagogical question format requested from the model.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseKind {
  #[serde(alias = "Fill-in-the-Blank", alias = "fill-in-the-blank")]
  FillInBlank,
  #[serde(alias = "Multiple Choice", alias = "multiple-choice")]
  MultipleChoice,
  #[serde(alias = "Reading Comprehension", alias = "reading-comprehension")]
  ReadingComprehension,
}

impl ExerciseKind {
  /// Label substituted into the prompt.
  pub fn prompt_label(&self) -> &'static str {
    match self {
      ExerciseKind::FillInBlank => "fill-in-the-blank",
      ExerciseKind::MultipleChoice => "multiple choice",
      ExerciseKind::ReadingComprehension => "reading comprehension",
    }
  }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
  #[serde(alias = "Easy", alias = "Mudah", alias = "mudah")]
  Easy,
  #[serde(alias = "Medium", alias = "Sedang", alias = "sedang")]
  Medium,
  #[serde(alias = "Hard", alias = "Sulit", alias = "sulit")]
  Hard,
}

impl Difficulty {
  pub fn prompt_label(&self) -> &'static str {
    match self {
      Difficulty::Easy => "easy",
      Difficulty::Medium => "medium",
      Difficulty::Hard => "hard",
    }
  }
}

/// One teacher request. Only constructible through `new`, so every instance is valid.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationRequest {
  source_text: String,
  kind: ExerciseKind,
  question_count: usize,
  difficulty: Difficulty,
  creativity: f32,
}

impl GenerationRequest {
  pub fn new(
    source_text: &str,
    kind: ExerciseKind,
    question_count: i64,
    difficulty: Difficulty,
    creativity: f32,
  ) -> Result<Self, RequestError> {
    let source_text = source_text.trim();
    if source_text.is_empty() {
      return Err(RequestError::EmptySourceText);
    }
    if question_count < MIN_QUESTIONS as i64 || question_count > MAX_QUESTIONS as i64 {
      return Err(RequestError::QuestionCountOutOfRange {
        got: question_count,
        min: MIN_QUESTIONS,
        max: MAX_QUESTIONS,
      });
    }
    // NaN fails this check too.
    if !(0.0..=1.0).contains(&creativity) {
      return Err(RequestError::CreativityOutOfRange(creativity));
    }
    Ok(Self {
      source_text: source_text.to_string(),
      kind,
      question_count: question_count as usize,
      difficulty,
      creativity,
    })
  }

  pub fn source_text(&self) -> &str { &self.source_text }
  pub fn kind(&self) -> ExerciseKind { self.kind }
  pub fn question_count(&self) -> usize { self.question_count }
  pub fn difficulty(&self) -> Difficulty { self.difficulty }
  pub fn creativity(&self) -> f32 { self.creativity }
}

/// Aligned question/answer lists: `answers[i]` belongs to `questions[i]`.
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct ExerciseSet {
  pub questions: Vec<String>,
  pub answers: Vec<String>,
}

impl ExerciseSet {
  pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
    self.questions.iter().map(String::as_str).zip(self.answers.iter().map(String::as_str))
  }
}

/// Result of one invocation, ready to be displayed.
#[derive(Clone, Debug, PartialEq)]
pub enum GenerationOutcome {
  Ready(ExerciseSet),
  /// Error-prefixed message shown in place of the question list; there are no answers.
  Failed { message: String },
}

impl GenerationOutcome {
  /// Split into the two display slots: questions, and answers when there are any.
  pub fn into_display(self) -> (Vec<String>, Option<Vec<String>>) {
    match self {
      GenerationOutcome::Ready(set) => (set.questions, Some(set.answers)),
      GenerationOutcome::Failed { message } => (vec![message], None),
    }
  }
}
