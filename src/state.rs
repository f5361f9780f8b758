//! Application state: the exercise composer built once at startup.
//!
//! Nothing here is mutated after startup; handlers share it through `Arc`.

use tracing::{error, info, instrument};

use crate::composer::ExerciseComposer;
use crate::config::{load_config_from_env, ExerciseConfig, OpenAiSettings};
use crate::openai::OpenAI;

pub struct AppState {
  pub composer: ExerciseComposer,
}

impl AppState {
  pub fn new(composer: ExerciseComposer) -> Self {
    Self { composer }
  }

  /// Build state from env: load TOML config, resolve credentials, init the OpenAI client.
  /// A missing credential is logged once here and reported again on every generation.
  #[instrument(level = "info", skip_all)]
  pub fn from_env() -> Self {
    let config: ExerciseConfig = load_config_from_env();

    let openai = OpenAiSettings::from_env().and_then(|s| OpenAI::new(&s, &config.generation));
    match &openai {
      Ok(oa) => info!(
        target: "exercise_backend",
        base_url = %oa.base_url,
        model = %oa.model,
        strategy = ?config.generation.strategy,
        shuffle = config.generation.shuffle,
        "OpenAI enabled."
      ),
      Err(e) => error!(target: "exercise_backend", error = %e, "OpenAI disabled; generation requests will report a configuration error."),
    }

    Self::new(ExerciseComposer::new(openai, &config))
  }
}
