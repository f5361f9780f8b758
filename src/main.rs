//! English exercise generator backend
//!
//! - Axum HTTP + WebSocket API
//! - Sends a teacher's text to an OpenAI chat model and splits the reply into
//!   aligned question/answer lists
//!
//! Important env variables:
//!   PORT                 : u16 (default 3000)
//!   OPENAI_API_KEY       : required for generation; without it requests get a configuration error
//!   OPENAI_BASE_URL      : default "https://api.openai.com/v1"
//!   OPENAI_MODEL         : default "gpt-4o-mini"
//!   EXERCISE_CONFIG_PATH : path to TOML config (prompts + generation settings)
//!   LOG_LEVEL            : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT           : "pretty" (default) or "json"

mod telemetry;
mod util;
mod error;
mod domain;
mod config;
mod decompose;
mod openai;
mod composer;
mod state;
mod protocol;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Config and OpenAI client are resolved once, here.
  let state = Arc::new(AppState::from_env());

  let app = build_router(state);

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "exercise_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "exercise_backend", error = %e, "Failed to listen for ctrl-c");
    std::future::pending::<()>().await;
  }
  info!(target: "exercise_backend", "Shutdown signal received");
}
