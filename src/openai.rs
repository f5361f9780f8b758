//! Minimal OpenAI chat-completions client.
//!
//! One logical call per generation: a bounded request timeout and at most
//! `max_retries` extra attempts for transport faults, timeouts, 429 and 5xx.
//! Calls log model name, latency, token usage and response size, never contents.
//!
//! NOTE: We never log the API key.

use std::time::{Duration, Instant};

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::config::{GenerationSettings, OpenAiSettings};
use crate::error::{ConfigError, GenerationError};

const RETRY_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Clone)]
pub struct OpenAI {
  client: reqwest::Client,
  api_key: String,
  pub base_url: String,
  pub model: String,
  timeout_secs: u64,
  max_retries: u32,
}

impl OpenAI {
  pub fn new(settings: &OpenAiSettings, generation: &GenerationSettings) -> Result<Self, ConfigError> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(generation.timeout_secs))
      .build()
      .map_err(|e| ConfigError::InvalidValue { key: "http client".into(), reason: e.to_string() })?;

    Ok(Self {
      client,
      api_key: settings.api_key.clone(),
      base_url: settings.base_url.clone(),
      model: settings.model.clone(),
      timeout_secs: generation.timeout_secs,
      max_retries: generation.max_retries,
    })
  }

  /// Plain-text chat completion with the retry policy applied.
  #[instrument(level = "info", skip(self, system, user), fields(model = %self.model, user_len = user.len()))]
  pub async fn chat_plain(
    &self,
    system: &str,
    user: &str,
    temperature: f32,
    max_tokens: u32,
  ) -> Result<String, GenerationError> {
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      max_tokens: Some(max_tokens),
    };

    let mut attempt = 0u32;
    loop {
      attempt += 1;
      let start = Instant::now();
      match self.send_once(&req).await {
        Ok(text) => {
          info!(attempt, elapsed = ?start.elapsed(), response_len = text.len(), "Model response received");
          return Ok(text);
        }
        Err(e) if e.is_retryable() && attempt <= self.max_retries => {
          warn!(attempt, elapsed = ?start.elapsed(), error = %e, "Model call failed; retrying");
          tokio::time::sleep(RETRY_BACKOFF).await;
        }
        Err(e) => return Err(e),
      }
    }
  }

  async fn send_once(&self, req: &ChatCompletionRequest) -> Result<String, GenerationError> {
    let url = format!("{}/chat/completions", self.base_url);
    let res = self.client.post(&url)
      .header(USER_AGENT, "exercise-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(req).send().await.map_err(|e| self.transport_error(e))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let message = extract_openai_error(&body).unwrap_or(body);
      return Err(GenerationError::Http { status: status.as_u16(), message });
    }

    let body = res.text().await.map_err(|e| self.transport_error(e))?;
    completion_text(&body)
  }

  fn transport_error(&self, e: reqwest::Error) -> GenerationError {
    if e.is_timeout() {
      GenerationError::Timeout(self.timeout_secs)
    } else {
      GenerationError::Transport(e.to_string())
    }
  }
}

/// Pull the first choice's text out of a completion body, treating the payload as untrusted.
fn completion_text(body: &str) -> Result<String, GenerationError> {
  let parsed: ChatCompletionResponse =
    serde_json::from_str(body).map_err(|e| GenerationError::Decode(e.to_string()))?;
  if let Some(usage) = &parsed.usage {
    info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
  }
  let text = parsed.choices.into_iter().next()
    .and_then(|c| c.message.content)
    .unwrap_or_default();
  let text = text.trim();
  if text.is_empty() {
    return Err(GenerationError::EmptyCompletion);
  }
  Ok(text.to_string())
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  #[serde(default)] choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { #[serde(default)] content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => Some(w.error.message),
    Err(_) => None,
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use std::net::SocketAddr;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;

  use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
  use serde_json::{json, Value};

  /// Canned replies served in order; the last one repeats.
  #[derive(Clone)]
  pub(crate) struct FakeCompletions {
    replies: Arc<Vec<(StatusCode, Value)>>,
    pub hits: Arc<AtomicUsize>,
    pub last_request: Arc<std::sync::Mutex<Option<Value>>>,
  }

  pub(crate) fn completion_body(content: &str) -> Value {
    json!({
      "choices": [{ "message": { "role": "assistant", "content": content } }],
      "usage": { "prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30 }
    })
  }

  async fn fake_handler(State(fake): State<FakeCompletions>, Json(req): Json<Value>) -> (StatusCode, Json<Value>) {
    let i = fake.hits.fetch_add(1, Ordering::SeqCst);
    if let Ok(mut last) = fake.last_request.lock() {
      *last = Some(req);
    }
    let (status, body) = fake.replies.get(i).or_else(|| fake.replies.last()).cloned()
      .unwrap_or((StatusCode::INTERNAL_SERVER_ERROR, Value::Null));
    (status, Json(body))
  }

  /// Serve `/v1/chat/completions` on an ephemeral port; returns the base URL.
  pub(crate) async fn spawn_fake(replies: Vec<(StatusCode, Value)>) -> (String, FakeCompletions) {
    let fake = FakeCompletions {
      replies: Arc::new(replies),
      hits: Arc::new(AtomicUsize::new(0)),
      last_request: Arc::new(std::sync::Mutex::new(None)),
    };
    let app = Router::new()
      .route("/v1/chat/completions", post(fake_handler))
      .with_state(fake.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}/v1"), fake)
  }

  pub(crate) fn client_for(base_url: &str, max_retries: u32) -> OpenAI {
    let settings = OpenAiSettings { api_key: "sk-test".into(), base_url: base_url.into(), model: "gpt-test".into() };
    let generation = GenerationSettings { timeout_secs: 5, max_retries, ..GenerationSettings::default() };
    OpenAI::new(&settings, &generation).unwrap()
  }

  #[tokio::test]
  async fn sends_messages_and_returns_trimmed_text() {
    let (url, fake) = spawn_fake(vec![(StatusCode::OK, completion_body("  1. Q Jawaban: A \n"))]).await;
    let text = client_for(&url, 1).chat_plain("sys", "user prompt", 0.3, 700).await.unwrap();
    assert_eq!(text, "1. Q Jawaban: A");

    let req = fake.last_request.lock().unwrap().clone().unwrap();
    assert_eq!(req["model"], "gpt-test");
    assert_eq!(req["max_tokens"], 700);
    assert_eq!(req["messages"][0]["role"], "system");
    assert_eq!(req["messages"][0]["content"], "sys");
    assert_eq!(req["messages"][1]["role"], "user");
    assert_eq!(req["messages"][1]["content"], "user prompt");
    assert!((req["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
  }

  #[tokio::test]
  async fn retries_once_on_server_error() {
    let (url, fake) = spawn_fake(vec![
      (StatusCode::BAD_GATEWAY, json!({ "error": { "message": "upstream" } })),
      (StatusCode::OK, completion_body("ok")),
    ]).await;
    let text = client_for(&url, 1).chat_plain("s", "u", 0.0, 10).await.unwrap();
    assert_eq!(text, "ok");
    assert_eq!(fake.hits.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn gives_up_after_single_retry() {
    let (url, fake) = spawn_fake(vec![(StatusCode::SERVICE_UNAVAILABLE, json!({ "error": { "message": "overloaded" } }))]).await;
    let err = client_for(&url, 1).chat_plain("s", "u", 0.0, 10).await.unwrap_err();
    assert!(matches!(err, GenerationError::Http { status: 503, ref message } if message == "overloaded"));
    assert_eq!(fake.hits.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn does_not_retry_client_errors() {
    let (url, fake) = spawn_fake(vec![(StatusCode::UNAUTHORIZED, json!({ "error": { "message": "Incorrect API key provided" } }))]).await;
    let err = client_for(&url, 1).chat_plain("s", "u", 0.0, 10).await.unwrap_err();
    assert!(matches!(err, GenerationError::Http { status: 401, .. }));
    assert_eq!(fake.hits.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn malformed_payloads_are_errors() {
    let (url, _) = spawn_fake(vec![(StatusCode::OK, json!({ "choices": [] }))]).await;
    let err = client_for(&url, 0).chat_plain("s", "u", 0.0, 10).await.unwrap_err();
    assert!(matches!(err, GenerationError::EmptyCompletion));

    let (url, _) = spawn_fake(vec![(StatusCode::OK, json!({ "choices": [{ "message": { "content": null } }] }))]).await;
    let err = client_for(&url, 0).chat_plain("s", "u", 0.0, 10).await.unwrap_err();
    assert!(matches!(err, GenerationError::EmptyCompletion));

    let (url, _) = spawn_fake(vec![(StatusCode::OK, json!("not an object"))]).await;
    let err = client_for(&url, 0).chat_plain("s", "u", 0.0, 10).await.unwrap_err();
    assert!(matches!(err, GenerationError::Decode(_)));
  }

  #[tokio::test]
  async fn unreachable_service_is_a_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let err = client_for(&format!("http://{addr}/v1"), 0).chat_plain("s", "u", 0.0, 10).await.unwrap_err();
    assert!(matches!(err, GenerationError::Transport(_)));
  }

  #[test]
  fn extracts_error_message() {
    assert_eq!(extract_openai_error(r#"{"error":{"message":"bad key","type":"invalid_request_error"}}"#), Some("bad key".into()));
    assert_eq!(extract_openai_error("<html>502</html>"), None);
  }
}
