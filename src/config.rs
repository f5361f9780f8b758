//! Service configuration: OpenAI credentials from the environment, and prompts plus
//! generation settings from an optional TOML file.
//!
//! TOML schema (every field optional):
//!
//! ```toml
//! [prompts]
//! system = "..."
//! user_template = "... {count} {kind} {difficulty} {text} ..."
//!
//! [generation]
//! max_tokens = 700
//! strategy = "pattern_extract"   # simple | line_scan | pattern_extract
//! shuffle = false
//! timeout_secs = 30
//! max_retries = 1
//! ```

use serde::Deserialize;
use tracing::{error, info};

use crate::decompose::ParsingStrategy;
use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Clone, Debug, Deserialize, Default, PartialEq)]
pub struct ExerciseConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub generation: GenerationSettings,
}

/// Prompts sent to the chat model. The user template understands
/// `{count}`, `{kind}`, `{difficulty}` and `{text}`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Prompts {
  pub system: String,
  pub user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      system: "You are an assistant that creates interactive, professional English exercises.".into(),
      user_template: "Create {count} English-practice exercises in {kind} form based on the following text:\n\n{text}\n\nEnsure the questions are at {difficulty} difficulty and provide complete answers for each.\n\nExercises and Answers:".into(),
    }
  }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationSettings {
  pub max_tokens: u32,
  pub strategy: ParsingStrategy,
  pub shuffle: bool,
  pub timeout_secs: u64,
  pub max_retries: u32,
}

impl Default for GenerationSettings {
  fn default() -> Self {
    Self {
      max_tokens: 700,
      strategy: ParsingStrategy::PatternExtract,
      shuffle: false,
      timeout_secs: 30,
      max_retries: 1,
    }
  }
}

impl GenerationSettings {
  fn validate(&self) -> Result<(), ConfigError> {
    if self.max_tokens == 0 {
      return Err(ConfigError::InvalidValue { key: "generation.max_tokens".into(), reason: "must be positive".into() });
    }
    if self.timeout_secs == 0 {
      return Err(ConfigError::InvalidValue { key: "generation.timeout_secs".into(), reason: "must be positive".into() });
    }
    Ok(())
  }
}

/// Parse and validate a TOML config body. `path` is only used in error messages.
pub fn parse_config(path: &str, body: &str) -> Result<ExerciseConfig, ConfigError> {
  let cfg: ExerciseConfig = toml::from_str(body).map_err(|e| ConfigError::Parse {
    path: path.to_string(),
    reason: e.to_string(),
  })?;
  cfg.generation.validate()?;
  Ok(cfg)
}

pub fn load_config_file(path: &str) -> Result<ExerciseConfig, ConfigError> {
  let body = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
    path: path.to_string(),
    reason: e.to_string(),
  })?;
  parse_config(path, &body)
}

/// Load the TOML file named by EXERCISE_CONFIG_PATH. Missing variable means defaults;
/// an unreadable or invalid file is logged and defaults are used.
pub fn load_config_from_env() -> ExerciseConfig {
  let Ok(path) = std::env::var("EXERCISE_CONFIG_PATH") else {
    return ExerciseConfig::default();
  };
  match load_config_file(&path) {
    Ok(cfg) => {
      info!(target: "exercise_backend", %path, strategy = ?cfg.generation.strategy, "Loaded exercise config (TOML)");
      cfg
    }
    Err(e) => {
      error!(target: "exercise_backend", %path, error = %e, "Ignoring exercise config; using defaults");
      ExerciseConfig::default()
    }
  }
}

/// Credentials and endpoint of the chat-completion service.
#[derive(Clone)]
pub struct OpenAiSettings {
  pub api_key: String,
  pub base_url: String,
  pub model: String,
}

impl std::fmt::Debug for OpenAiSettings {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("OpenAiSettings")
      .field("api_key", &"<redacted>")
      .field("base_url", &self.base_url)
      .field("model", &self.model)
      .finish()
  }
}

impl OpenAiSettings {
  pub fn from_env() -> Result<Self, ConfigError> {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  /// Build from any key lookup; blank values count as absent.
  pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
  where
    F: Fn(&str) -> Option<String>,
  {
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let api_key = get("OPENAI_API_KEY").ok_or(ConfigError::MissingApiKey)?;
    let base_url = get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into());
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
      return Err(ConfigError::InvalidValue {
        key: "OPENAI_BASE_URL".into(),
        reason: format!("expected an http(s) URL, got {base_url:?}"),
      });
    }
    let model = get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into());

    Ok(Self { api_key, base_url: base_url.trim_end_matches('/').to_string(), model })
  }
}
