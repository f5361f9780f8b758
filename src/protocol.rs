//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{Difficulty, ExerciseKind, GenerationOutcome, GenerationRequest};
use crate::error::RequestError;

/// Form fields shared by the HTTP body and the WebSocket `generate` message.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateIn {
    pub text: String,
    pub kind: ExerciseKind,
    #[serde(rename = "questionCount")]
    pub question_count: i64,
    pub difficulty: Difficulty,
    #[serde(default = "default_creativity")]
    pub creativity: f32,
}

fn default_creativity() -> f32 {
    0.7
}

impl GenerateIn {
    pub fn into_request(self) -> Result<GenerationRequest, RequestError> {
        GenerationRequest::new(
            &self.text,
            self.kind,
            self.question_count,
            self.difficulty,
            self.creativity,
        )
    }
}

/// `answers` is `null` when generation failed; `questions` then holds the error message.
#[derive(Debug, Serialize)]
pub struct ExercisesOut {
    pub id: String,
    pub questions: Vec<String>,
    pub answers: Option<Vec<String>>,
}

impl ExercisesOut {
    pub fn from_outcome(id: String, outcome: GenerationOutcome) -> Self {
        let (questions, answers) = outcome.into_display();
        Self { id, questions, answers }
    }
}

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    Generate(GenerateIn),
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Exercises(ExercisesOut),
    Error { message: String },
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub error: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    /// False when no usable OpenAI credential was configured.
    pub generation_enabled: bool,
}
