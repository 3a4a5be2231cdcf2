//! In-process stand-in for the reasoning service, plus shared fixtures.
//!
//! `spawn_mock_reasoner` binds an ephemeral axum server that speaks just
//! enough of the chat-completions protocol: configured steps are consumed in
//! order (the last one repeats), and every step can delay, fail with a
//! status, or return a completion whose content is the given string. A hit
//! counter lets tests assert that nothing (or exactly N things) crossed the
//! service boundary.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::reasoner::Reasoner;
use crate::render::TypesetRenderer;

#[derive(Clone)]
pub struct MockStep {
  delay: Duration,
  status: u16,
  content: String,
}

impl MockStep {
  /// Successful completion whose content is the JSON value as a string.
  pub fn content(v: Value) -> Self {
    Self { delay: Duration::ZERO, status: 200, content: v.to_string() }
  }

  /// Successful completion with raw (non-JSON) content.
  pub fn raw(content: &str) -> Self {
    Self { delay: Duration::ZERO, status: 200, content: content.to_string() }
  }

  /// Error response with the given status and a standard error body.
  pub fn status(code: u16) -> Self {
    Self { delay: Duration::ZERO, status: code, content: String::new() }
  }

  /// Delay the reply by `ms` milliseconds.
  pub fn delayed(mut self, ms: u64) -> Self {
    self.delay = Duration::from_millis(ms);
    self
  }
}

struct MockSrv {
  steps: Mutex<Vec<MockStep>>,
  hits: Arc<AtomicUsize>,
}

pub struct MockReasoner {
  pub base_url: String,
  hits: Arc<AtomicUsize>,
}

impl MockReasoner {
  /// How many requests reached /chat/completions.
  pub fn hits(&self) -> usize {
    self.hits.load(Ordering::SeqCst)
  }
}

/// Spawn the mock on an ephemeral local port. `steps` must not be empty.
pub async fn spawn_mock_reasoner(steps: Vec<MockStep>) -> MockReasoner {
  assert!(!steps.is_empty(), "mock needs at least one step");
  let hits = Arc::new(AtomicUsize::new(0));
  let srv = Arc::new(MockSrv { steps: Mutex::new(steps), hits: hits.clone() });

  let app = Router::new()
    .route("/chat/completions", post(completions))
    .with_state(srv);

  let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind mock listener");
  let addr = listener.local_addr().expect("mock local addr");
  tokio::spawn(async move {
    let _ = axum::serve(listener, app).await;
  });

  MockReasoner { base_url: format!("http://{addr}"), hits }
}

async fn completions(State(srv): State<Arc<MockSrv>>, _body: Json<Value>) -> impl IntoResponse {
  srv.hits.fetch_add(1, Ordering::SeqCst);
  let step = {
    let mut steps = srv.steps.lock().expect("mock steps lock");
    if steps.len() > 1 { steps.remove(0) } else { steps[0].clone() }
  };
  if !step.delay.is_zero() {
    tokio::time::sleep(step.delay).await;
  }
  if step.status != 200 {
    let code = StatusCode::from_u16(step.status).expect("mock status code");
    return (code, Json(json!({ "error": { "message": "mock failure" } }))).into_response();
  }
  Json(json!({
    "choices": [ { "message": { "content": step.content } } ],
    "usage": { "prompt_tokens": 12, "completion_tokens": 34, "total_tokens": 46 }
  }))
  .into_response()
}

/// Client pointed at the mock, with a short timeout.
pub fn test_reasoner(base_url: &str) -> Reasoner {
  Reasoner::new("test-key", base_url, Duration::from_secs(5)).expect("build test reasoner")
}

// --- Canonical payloads ---

pub fn solution_payload() -> Value {
  json!({
    "originalExpression": "2x + 3 = 7",
    "normalizedExpression": "2x+3=7",
    "problemCategory": "Linear Equations",
    "steps": [
      { "expression": "2x = 4", "explanation": "Subtract 3 from both sides", "rule": "subtraction property of equality" },
      { "expression": "x = 2", "explanation": "Divide both sides by 2", "rule": "division property of equality" }
    ],
    "finalAnswer": "x = 2",
    "confidence": 0.97
  })
}

pub fn question_payload() -> Value {
  question_payload_with("q1", "2x + 3 = 7", "Easy", "Linear Equations")
}

pub fn question_payload_with(id: &str, expression: &str, difficulty: &str, topic: &str) -> Value {
  json!({ "id": id, "expression": expression, "difficulty": difficulty, "topic": topic })
}

pub fn grading_payload(correct: bool) -> Value {
  if correct {
    json!({ "isCorrect": true, "score": 10, "feedback": "Correct!", "correctSolution": "x = 2" })
  } else {
    json!({
      "isCorrect": false,
      "score": 3,
      "feedback": "Check the sign when you subtract 3.",
      "correctSolution": "2x = 4\nx = 2"
    })
  }
}

// --- Image fixtures ---

/// Smallest byte prefix the sniffer accepts as PNG.
pub fn tiny_png() -> Vec<u8> {
  let mut bytes = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
  bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D', b'R']);
  bytes.extend_from_slice(&[0x00; 16]);
  bytes
}

/// Smallest byte prefix the sniffer accepts as JPEG.
pub fn tiny_jpeg() -> Vec<u8> {
  let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
  bytes.extend_from_slice(b"JFIF\0");
  bytes.extend_from_slice(&[0x00; 16]);
  bytes
}

// --- Recording renderer ---

/// Renderer that records every call so tests can assert what was displayed.
#[derive(Default)]
pub struct RecordingRenderer {
  calls: Mutex<Vec<(String, bool)>>,
}

impl RecordingRenderer {
  pub fn calls(&self) -> Vec<(String, bool)> {
    self.calls.lock().expect("renderer calls lock").clone()
  }
}

impl TypesetRenderer for RecordingRenderer {
  fn render(&self, expression: &str, display_mode: bool) {
    self.calls.lock().expect("renderer calls lock").push((expression.to_string(), display_mode));
  }
}
