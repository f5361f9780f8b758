//! Error kinds for configuration, request validation and the chat-completion call.
//!
//! None of these terminate the process: the composer turns every
//! `GenerationError` into a displayable message.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
  #[error("OPENAI_API_KEY is not set; exercise generation is disabled")]
  MissingApiKey,
  #[error("invalid value for {key}: {reason}")]
  InvalidValue { key: String, reason: String },
  #[error("failed to read config file {path}: {reason}")]
  Read { path: String, reason: String },
  #[error("failed to parse config file {path}: {reason}")]
  Parse { path: String, reason: String },
}

/// Rejected `GenerationRequest` fields.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RequestError {
  #[error("source text must not be empty")]
  EmptySourceText,
  #[error("question count must be between {min} and {max}, got {got}")]
  QuestionCountOutOfRange { got: i64, min: usize, max: usize },
  #[error("creativity must be between 0.0 and 1.0, got {0}")]
  CreativityOutOfRange(f32),
}

#[derive(Debug, Error)]
pub enum GenerationError {
  #[error(transparent)]
  Config(#[from] ConfigError),
  #[error("request to the model service failed: {0}")]
  Transport(String),
  #[error("model service did not answer within {0}s")]
  Timeout(u64),
  #[error("model service returned HTTP {status}: {message}")]
  Http { status: u16, message: String },
  #[error("could not decode model service response: {0}")]
  Decode(String),
  #[error("model service returned no usable text")]
  EmptyCompletion,
}

impl GenerationError {
  /// Faults worth a second attempt: transport hiccups, timeouts, throttling and 5xx.
  pub fn is_retryable(&self) -> bool {
    match self {
      GenerationError::Transport(_) | GenerationError::Timeout(_) => true,
      GenerationError::Http { status, .. } => *status == 429 || *status >= 500,
      _ => false,
    }
  }
}
