//! Prompt composition and the generate → decompose pipeline.
//!
//! `ExerciseComposer::generate` is the single entry point used by both HTTP and
//! WebSocket handlers. It never fails: every fault is converted into a
//! `GenerationOutcome::Failed` carrying a display-ready message.

use tracing::{error, info, instrument};

use crate::config::{ExerciseConfig, Prompts};
use crate::decompose::Decomposer;
use crate::domain::{GenerationOutcome, GenerationRequest};
use crate::error::{ConfigError, GenerationError};
use crate::openai::OpenAI;
use crate::util::fill_template;

pub const ERROR_PREFIX: &str = "An error occurred: ";

/// Render the user prompt. The source text goes in last so braces inside it stay literal.
pub fn build_prompt(prompts: &Prompts, req: &GenerationRequest) -> String {
  let count = req.question_count().to_string();
  fill_template(
    &prompts.user_template,
    &[
      ("count", count.as_str()),
      ("kind", req.kind().prompt_label()),
      ("difficulty", req.difficulty().prompt_label()),
      ("text", req.source_text()),
    ],
  )
}

pub struct ExerciseComposer {
  openai: Result<OpenAI, ConfigError>,
  prompts: Prompts,
  max_tokens: u32,
  decomposer: Decomposer,
}

impl ExerciseComposer {
  /// `openai` is the client, or the configuration error that kept it from being built.
  pub fn new(openai: Result<OpenAI, ConfigError>, config: &ExerciseConfig) -> Self {
    Self {
      openai,
      prompts: config.prompts.clone(),
      max_tokens: config.generation.max_tokens,
      decomposer: Decomposer::new(config.generation.strategy, config.generation.shuffle),
    }
  }

  pub fn is_ready(&self) -> bool {
    self.openai.is_ok()
  }

  /// Raw completion text for `req`.
  async fn complete(&self, req: &GenerationRequest) -> Result<String, GenerationError> {
    let client = self.openai.as_ref().map_err(|e| GenerationError::Config(e.clone()))?;
    let prompt = build_prompt(&self.prompts, req);
    client.chat_plain(&self.prompts.system, &prompt, req.creativity(), self.max_tokens).await
  }

  #[instrument(
    level = "info",
    skip(self, req),
    fields(kind = ?req.kind(), difficulty = ?req.difficulty(), count = req.question_count(), text_len = req.source_text().len())
  )]
  pub async fn generate(&self, req: &GenerationRequest) -> GenerationOutcome {
    match self.complete(req).await {
      Ok(text) => {
        let set = self.decomposer.decompose(&text, req.question_count());
        info!(
          target: "exercise",
          count = set.questions.len(),
          question_chars = set.questions.iter().map(|q| q.chars().count()).sum::<usize>(),
          "Exercises generated"
        );
        GenerationOutcome::Ready(set)
      }
      Err(e) => {
        error!(target: "exercise", error = %e, "Exercise generation failed");
        GenerationOutcome::Failed { message: format!("{ERROR_PREFIX}{e}") }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use axum::http::StatusCode;
  use serde_json::json;

  use crate::config::GenerationSettings;
  use crate::decompose::{ParsingStrategy, ANSWER_NOT_AVAILABLE, PAD_ANSWER, PAD_QUESTION};
  use crate::domain::{Difficulty, ExerciseKind};
  use crate::openai::tests::{client_for, completion_body, spawn_fake};
  use crate::telemetry::tests::LogCapture;

  fn request(text: &str, n: i64) -> GenerationRequest {
    GenerationRequest::new(text, ExerciseKind::MultipleChoice, n, Difficulty::Medium, 0.7).unwrap()
  }

  #[test]
  fn prompt_shape() {
    let prompt = build_prompt(&Prompts::default(), &request("The water cycle", 3));
    assert_eq!(
      prompt,
      "Create 3 English-practice exercises in multiple choice form based on the following text:\n\nThe water cycle\n\nEnsure the questions are at medium difficulty and provide complete answers for each.\n\nExercises and Answers:"
    );
  }

  #[test]
  fn prompt_keeps_braces_in_source_text() {
    let prompt = build_prompt(&Prompts::default(), &request("Use {difficulty} and {count} literally", 2));
    assert!(prompt.contains("Use {difficulty} and {count} literally"));
  }

  #[tokio::test]
  async fn generates_aligned_exercises() {
    let (url, fake) = spawn_fake(vec![(StatusCode::OK, completion_body("1. What is X? Jawaban: Y\n2. What is Z?"))]).await;
    let composer = ExerciseComposer::new(Ok(client_for(&url, 1)), &ExerciseConfig::default());
    assert!(composer.is_ready());

    let outcome = composer.generate(&request("source", 3)).await;
    let GenerationOutcome::Ready(set) = outcome else { panic!("expected exercises") };
    assert_eq!(set.questions, vec!["What is X?", "What is Z?", PAD_QUESTION]);
    assert_eq!(set.answers, vec!["Y", ANSWER_NOT_AVAILABLE, PAD_ANSWER]);

    let sent = fake.last_request.lock().unwrap().clone().unwrap();
    assert!((sent["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    assert_eq!(sent["messages"][0]["content"], Prompts::default().system);
  }

  #[tokio::test]
  async fn logs_counts_not_contents() {
    let capture = LogCapture::default();
    let _guard = capture.install();

    let (url, _) = spawn_fake(vec![(StatusCode::OK, completion_body("1. Describe the HIDDEN_QUESTION scene. Jawaban: HIDDEN_ANSWER"))]).await;
    let composer = ExerciseComposer::new(Ok(client_for(&url, 0)), &ExerciseConfig::default());
    let outcome = composer.generate(&request("PRIVATE_SOURCE about lighthouses", 1)).await;
    assert!(matches!(outcome, GenerationOutcome::Ready(_)));

    let logs = capture.contents();
    assert!(logs.contains("Exercises generated"), "logs: {logs}");
    assert!(logs.contains("question_chars="), "logs: {logs}");
    for secret in ["HIDDEN_QUESTION", "HIDDEN_ANSWER", "PRIVATE_SOURCE"] {
      assert!(!logs.contains(secret), "{secret} leaked into logs: {logs}");
    }
  }

  #[tokio::test]
  async fn uses_configured_strategy_and_token_limit() {
    let (url, fake) = spawn_fake(vec![(StatusCode::OK, completion_body("1. Q1\n2. Q2\nAnswers: a1, a2"))]).await;
    let config = ExerciseConfig {
      generation: GenerationSettings { strategy: ParsingStrategy::Simple, max_tokens: 800, ..GenerationSettings::default() },
      ..ExerciseConfig::default()
    };
    let composer = ExerciseComposer::new(Ok(client_for(&url, 0)), &config);

    let GenerationOutcome::Ready(set) = composer.generate(&request("source", 1)).await else { panic!("expected exercises") };
    assert_eq!(set.questions, vec!["1. Q1\n2. Q2"]);
    assert_eq!(set.answers, vec!["a1, a2"]);
    assert_eq!(fake.last_request.lock().unwrap().clone().unwrap()["max_tokens"], 800);
  }

  #[tokio::test]
  async fn service_failure_yields_error_message_without_answers() {
    let (url, _) = spawn_fake(vec![(StatusCode::UNAUTHORIZED, json!({ "error": { "message": "Incorrect API key provided" } }))]).await;
    let composer = ExerciseComposer::new(Ok(client_for(&url, 1)), &ExerciseConfig::default());

    let (questions, answers) = composer.generate(&request("source", 2)).await.into_display();
    assert_eq!(questions.len(), 1);
    assert!(questions[0].starts_with(ERROR_PREFIX));
    assert!(questions[0].contains("Incorrect API key provided"));
    assert!(answers.is_none());
  }

  #[tokio::test]
  async fn missing_credentials_surface_on_use() {
    let composer = ExerciseComposer::new(Err(ConfigError::MissingApiKey), &ExerciseConfig::default());
    assert!(!composer.is_ready());
    let outcome = composer.generate(&request("source", 2)).await;
    assert_eq!(
      outcome,
      GenerationOutcome::Failed { message: format!("{ERROR_PREFIX}{}", ConfigError::MissingApiKey) }
    );
  }
}
