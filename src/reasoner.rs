//! Minimal client for the reasoning service (an OpenAI-compatible chat API).
//!
//! We only call chat.completions, in two flavors: plain text (hints) and a
//! strict JSON object (solve / generate / grade) that is shape-checked by the
//! validators before anyone downstream sees it. Photographed problems travel
//! inline as data-URI image parts.
//!
//! Calls are instrumented and log model names, latencies, and response sizes
//! (not contents). We never log the API key.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, instrument};

use crate::config::Prompts;
use crate::domain::{Difficulty, GradingResult, Question, Solution};
use crate::error::{CoreError, CoreResult, ServiceErrorKind};
use crate::util::{fill_template, trunc_for_log};
use crate::validate::{validate_grading, validate_question, validate_solution};

#[derive(Clone)]
pub struct Reasoner {
  client: reqwest::Client,
  api_key: String,
  pub base_url: String,
  pub fast_model: String,
  pub strong_model: String,
}

impl Reasoner {
  /// Construct a client with explicit settings. Tests point this at a local
  /// stand-in server.
  pub fn new(
    api_key: impl Into<String>,
    base_url: impl Into<String>,
    timeout: Duration,
  ) -> CoreResult<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| CoreError::service(ServiceErrorKind::Transport, format!("HTTP client build failed: {e}")))?;
    Ok(Self {
      client,
      api_key: api_key.into(),
      base_url: base_url.into(),
      fast_model: "gpt-4o-mini".into(),
      strong_model: "gpt-4o".into(),
    })
  }

  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let timeout_secs = std::env::var("OPENAI_TIMEOUT_SECS")
      .ok()
      .and_then(|s| s.parse::<u64>().ok())
      .unwrap_or(30);

    let mut me = Self::new(api_key, base_url, Duration::from_secs(timeout_secs)).ok()?;
    if let Ok(m) = std::env::var("OPENAI_FAST_MODEL") {
      me.fast_model = m;
    }
    if let Ok(m) = std::env::var("OPENAI_STRONG_MODEL") {
      me.strong_model = m;
    }
    Some(me)
  }

  /// One chat.completions round trip. Returns the (trimmed) completion text.
  #[instrument(level = "info", skip(self, system, user), fields(model = %model, json_object))]
  async fn chat(
    &self,
    model: &str,
    system: &str,
    user: ChatContent,
    temperature: f32,
    json_object: bool,
  ) -> CoreResult<String> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: model.to_string(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: ChatContent::Text(system.into()) },
        ChatMessageReq { role: "user".into(), content: user },
      ],
      temperature,
      response_format: if json_object {
        Some(ResponseFormat { kind: "json_object".into() })
      } else {
        None
      },
    };

    let res = self.client.post(&url)
      .header(USER_AGENT, "mathsage-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await
      .map_err(|e| CoreError::service(ServiceErrorKind::Transport, e.to_string()))?;

    let status = res.status();
    if !status.is_success() {
      let body = res.text().await.unwrap_or_default();
      let msg = extract_service_error(&body).unwrap_or(body);
      let kind = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ServiceErrorKind::Auth,
        StatusCode::TOO_MANY_REQUESTS => ServiceErrorKind::RateLimit,
        _ => ServiceErrorKind::Remote,
      };
      return Err(CoreError::service(kind, format!("HTTP {status}: {msg}")));
    }

    let body: ChatCompletionResponse = res.json().await
      .map_err(|e| CoreError::malformed("choices", format!("body is not a chat completion: {e}")))?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "reasoning service usage");
    }
    let text = body.choices.first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default().trim().to_string();
    if text.is_empty() {
      return Err(CoreError::malformed("choices", "empty completion content"));
    }
    Ok(text)
  }

  /// Chat round trip whose completion must parse as a JSON object.
  async fn chat_json(
    &self,
    model: &str,
    system: &str,
    user: ChatContent,
    temperature: f32,
  ) -> CoreResult<Value> {
    let text = self.chat(model, system, user, temperature, true).await?;
    serde_json::from_str::<Value>(&text).map_err(|e| {
      debug!(preview = %trunc_for_log(&text, 120), "unparseable completion content");
      CoreError::malformed("response", format!("completion is not JSON ({} bytes): {e}", text.len()))
    })
  }

  // --- High-level operations ---

  /// Solve the photographed problem. `image_uri` is the base64 data URI the
  /// ingest layer produced; it travels as an inline image part.
  #[instrument(level = "info", skip(self, prompts, image_uri), fields(model = %self.strong_model, uri_len = image_uri.len()))]
  pub async fn solve_image(&self, prompts: &Prompts, image_uri: &str) -> CoreResult<Solution> {
    let user = ChatContent::Parts(vec![
      ChatContentPart::Text { text: prompts.solve_user.clone() },
      ChatContentPart::ImageUrl { image_url: ImageUrlRef { url: image_uri.to_string() } },
    ]);

    let start = std::time::Instant::now();
    let value = self.chat_json(&self.strong_model, &prompts.solve_system, user, 0.2).await;
    let elapsed = start.elapsed();

    match &value {
      Ok(_) => info!(?elapsed, "solve response received"),
      Err(e) => error!(?elapsed, error = %e, "solve call failed"),
    }

    let solution = validate_solution(&value?)?;
    info!(
      category = %solution.problem_category,
      steps = solution.steps.len(),
      confidence = solution.confidence,
      "solution validated"
    );
    Ok(solution)
  }

  /// Generate one practice question at the requested difficulty.
  #[instrument(level = "info", skip(self, prompts), fields(%difficulty, model = %self.strong_model))]
  pub async fn generate_question(
    &self,
    prompts: &Prompts,
    difficulty: Difficulty,
  ) -> CoreResult<Question> {
    let diff = difficulty.to_string();
    let system = fill_template(&prompts.question_system, &[("difficulty", &diff)]);
    let user = fill_template(&prompts.question_user_template, &[("difficulty", &diff)]);

    let value = self.chat_json(&self.strong_model, &system, ChatContent::Text(user), 0.9).await?;
    let q = validate_question(&value)?;
    info!(question_id = %q.id, topic = %q.topic, requested = %diff, returned = %q.difficulty, "question validated");
    Ok(q)
  }

  /// Grade a practice answer. The answer may be typed text, a handwritten
  /// image (as a data URI), or both.
  #[instrument(level = "info", skip_all, fields(model = %self.strong_model, answer_len = answer_text.map_or(0, str::len), has_image = answer_image_uri.is_some()))]
  pub async fn grade_answer(
    &self,
    prompts: &Prompts,
    question_expr: &str,
    answer_text: Option<&str>,
    answer_image_uri: Option<&str>,
  ) -> CoreResult<GradingResult> {
    let answer = answer_text.unwrap_or("(see the attached handwritten answer)");
    let user_text = fill_template(
      &prompts.grading_user_template,
      &[("question", question_expr), ("answer", answer)],
    );
    let user = match answer_image_uri {
      Some(uri) => ChatContent::Parts(vec![
        ChatContentPart::Text { text: user_text },
        ChatContentPart::ImageUrl { image_url: ImageUrlRef { url: uri.to_string() } },
      ]),
      None => ChatContent::Text(user_text),
    };

    let value = self.chat_json(&self.strong_model, &prompts.grading_system, user, 0.2).await?;
    let g = validate_grading(&value)?;
    info!(is_correct = g.is_correct, score = g.score, "grading validated");
    Ok(g)
  }

  /// Short plain-text nudge for the active practice question (fast model).
  #[instrument(level = "info", skip(self, prompts, question_expr), fields(model = %self.fast_model))]
  pub async fn practice_hint(&self, prompts: &Prompts, question_expr: &str) -> CoreResult<String> {
    let user = fill_template(&prompts.hint_user_template, &[("question", question_expr)]);
    self.chat(&self.fast_model, &prompts.hint_system, ChatContent::Text(user), 0.4, false).await
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: ChatContent }

/// User content: either a bare string or a list of typed parts (the vision
/// form used to attach images).
#[derive(Serialize)]
#[serde(untagged)]
enum ChatContent {
  Text(String),
  Parts(Vec<ChatContentPart>),
}
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ChatContentPart {
  Text { text: String },
  ImageUrl { image_url: ImageUrlRef },
}
#[derive(Serialize)]
struct ImageUrlRef { url: String }

#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] kind: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from a service error body.
fn extract_service_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::Difficulty;
  use crate::error::ServiceErrorKind;
  use crate::ingest::ingest_image;
  use crate::testkit::{
    grading_payload, question_payload, solution_payload, spawn_mock_reasoner, test_reasoner,
    tiny_png, MockStep,
  };

  #[tokio::test]
  async fn solve_happy_path_validates_and_normalizes() {
    let mock = spawn_mock_reasoner(vec![MockStep::content(solution_payload())]).await;
    let r = test_reasoner(&mock.base_url);
    let upload = ingest_image(tiny_png(), None).unwrap();

    let sol = r.solve_image(&Prompts::default(), &upload.to_data_uri()).await.unwrap();
    assert_eq!(sol.final_answer, "x = 2");
    assert_eq!(sol.steps.len(), 2);
    assert_eq!(mock.hits(), 1);
  }

  #[tokio::test]
  async fn unauthorized_maps_to_auth_error() {
    let mock = spawn_mock_reasoner(vec![MockStep::status(401)]).await;
    let r = test_reasoner(&mock.base_url);

    let err = r.practice_hint(&Prompts::default(), "2x = 4").await.unwrap_err();
    assert!(err.is_auth());
    assert!(err.to_string().contains("mock failure"));
  }

  #[tokio::test]
  async fn rate_limit_and_server_statuses_keep_their_kind() {
    let mock = spawn_mock_reasoner(vec![MockStep::status(429), MockStep::status(500)]).await;
    let r = test_reasoner(&mock.base_url);

    let e1 = r.practice_hint(&Prompts::default(), "x").await.unwrap_err();
    assert!(matches!(e1, CoreError::Service { kind: ServiceErrorKind::RateLimit, .. }));
    let e2 = r.practice_hint(&Prompts::default(), "x").await.unwrap_err();
    assert!(matches!(e2, CoreError::Service { kind: ServiceErrorKind::Remote, .. }));
  }

  #[tokio::test]
  async fn non_json_completion_is_malformed() {
    let mock = spawn_mock_reasoner(vec![MockStep::raw("the answer is two")]).await;
    let r = test_reasoner(&mock.base_url);
    let upload = ingest_image(tiny_png(), None).unwrap();

    let err = r.solve_image(&Prompts::default(), &upload.to_data_uri()).await.unwrap_err();
    assert!(matches!(err, CoreError::MalformedResponse { .. }));
  }

  #[tokio::test]
  async fn missing_solution_field_is_reported_by_name() {
    let mut payload = solution_payload();
    payload.as_object_mut().unwrap().remove("finalAnswer");
    let mock = spawn_mock_reasoner(vec![MockStep::content(payload)]).await;
    let r = test_reasoner(&mock.base_url);
    let upload = ingest_image(tiny_png(), None).unwrap();

    let err = r.solve_image(&Prompts::default(), &upload.to_data_uri()).await.unwrap_err();
    assert!(err.to_string().contains("finalAnswer"));
  }

  #[tokio::test]
  async fn slow_service_times_out_as_transport_error() {
    let mock = spawn_mock_reasoner(vec![MockStep::status(200).delayed(1500)]).await;
    let r = Reasoner::new("test-key", &mock.base_url, Duration::from_millis(200)).unwrap();

    let err = r.practice_hint(&Prompts::default(), "x").await.unwrap_err();
    assert!(matches!(err, CoreError::Service { kind: ServiceErrorKind::Transport, .. }));
  }

  #[tokio::test]
  async fn generated_question_is_validated() {
    let mock = spawn_mock_reasoner(vec![MockStep::content(question_payload())]).await;
    let r = test_reasoner(&mock.base_url);

    let q = r.generate_question(&Prompts::default(), Difficulty::Easy).await.unwrap();
    assert_eq!(q.id, "q1");
    assert_eq!(q.difficulty, Difficulty::Easy);
  }

  #[tokio::test]
  async fn grading_accepts_image_only_answers() {
    let mock = spawn_mock_reasoner(vec![MockStep::content(grading_payload(true))]).await;
    let r = test_reasoner(&mock.base_url);
    let upload = ingest_image(tiny_png(), None).unwrap();

    let g = r
      .grade_answer(&Prompts::default(), "2x + 3 = 7", None, Some(&upload.to_data_uri()))
      .await
      .unwrap();
    assert!(g.is_correct);
  }

  #[tokio::test]
  async fn hint_returns_plain_text() {
    let mock = spawn_mock_reasoner(vec![MockStep::raw("Try isolating x first.")]).await;
    let r = test_reasoner(&mock.base_url);

    let hint = r.practice_hint(&Prompts::default(), "2x + 3 = 7").await.unwrap();
    assert_eq!(hint, "Try isolating x first.");
  }
}
