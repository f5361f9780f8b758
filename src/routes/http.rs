//! HTTP endpoint handlers. These are thin wrappers that forward to the composer.
//! Each handler is instrumented and logs basic result info.

use std::sync::Arc;
use axum::{extract::State, http::StatusCode, response::{IntoResponse, Response}, Json};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, generation_enabled: state.composer.is_ready() })
}

#[instrument(level = "info", skip(state, body), fields(text_len = body.text.len(), kind = ?body.kind, count = body.question_count))]
pub async fn http_post_exercises(
  State(state): State<Arc<AppState>>,
  Json(body): Json<GenerateIn>,
) -> Response {
  let req = match body.into_request() {
    Ok(r) => r,
    Err(e) => {
      warn!(target: "exercise", error = %e, "HTTP generate rejected");
      return (StatusCode::BAD_REQUEST, Json(ErrorOut { error: e.to_string() })).into_response();
    }
  };

  let id = Uuid::new_v4().to_string();
  let outcome = state.composer.generate(&req).await;
  info!(target: "exercise", %id, "HTTP exercises served");
  Json(ExercisesOut::from_outcome(id, outcome)).into_response()
}
