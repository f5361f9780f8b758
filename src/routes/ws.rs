//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to the composer. We reply with a single JSON message per request.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{info, error, instrument, debug};
use uuid::Uuid;

use crate::protocol::{ClientWsMessage, ExercisesOut, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "exercise_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "exercise_backend", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "exercise_backend", msg_len = txt.len(), "WS message received");
            handle_client_ws(incoming, &state).await
          }
          Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "exercise_backend", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "exercise_backend", "WebSocket disconnected");
}

#[instrument(level = "info", skip(msg, state), fields(text_len = tracing::field::Empty))]
pub async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::Generate(body) => {
      tracing::Span::current().record("text_len", body.text.len());
      match body.into_request() {
        Ok(req) => {
          let id = Uuid::new_v4().to_string();
          let outcome = state.composer.generate(&req).await;
          info!(target: "exercise", %id, "WS exercises served");
          ServerWsMessage::Exercises(ExercisesOut::from_outcome(id, outcome))
        }
        Err(e) => ServerWsMessage::Error { message: e.to_string() },
      }
    }
  }
}
