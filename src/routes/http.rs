//! HTTP endpoint handlers. Thin wrappers that forward to the controllers and
//! let `CoreError` map itself onto a status code. Each handler is
//! instrumented with its key parameters.

use std::sync::Arc;
use axum::{extract::{Query, State}, Json};
use tracing::{info, instrument};

use crate::domain::Difficulty;
use crate::error::CoreError;
use crate::ingest::decode_base64_image;
use crate::pipeline::{SolveOutcome, SolveSnapshot};
use crate::practice::{DifficultyChange, GradeOutcome};
use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> Json<HealthOut> {
  Json(HealthOut { ok: true, reasoner_enabled: state.reasoner_enabled })
}

#[instrument(level = "info", skip(state, body), fields(b64_len = body.image_base64.len()))]
pub async fn http_post_solve(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SolveIn>,
) -> Result<Json<SolveOut>, CoreError> {
  let upload = decode_base64_image(&body.image_base64, body.mime.as_deref())?;
  let out = match state.solve.submit(upload).await? {
    SolveOutcome::Completed(solution) => {
      info!(target: "pipeline", final_answer_len = solution.final_answer.len(), "HTTP solve completed");
      SolveOut::Completed { solution }
    }
    SolveOutcome::Superseded => SolveOut::Superseded,
  };
  Ok(Json(out))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_solve_status(State(state): State<Arc<AppState>>) -> Json<SolveSnapshot> {
  Json(state.solve.snapshot().await)
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_solve_clear(State(state): State<Arc<AppState>>) -> Json<ClearOut> {
  state.solve.clear().await;
  Json(ClearOut { cleared: true })
}

#[instrument(level = "info", skip(state), fields(difficulty = ?q.difficulty))]
pub async fn http_get_question(
  State(state): State<Arc<AppState>>,
  Query(q): Query<QuestionQuery>,
) -> Result<Json<crate::domain::Question>, CoreError> {
  let level = q.difficulty.as_deref().map(str::parse::<Difficulty>).transpose()?;
  let question = state.practice.new_round(level).await?;
  info!(target: "practice", question_id = %question.id, "HTTP question served");
  Ok(Json(question))
}

#[instrument(level = "info", skip(state, body), fields(text_len = body.text.as_deref().map_or(0, str::len), has_image = body.image_base64.is_some()))]
pub async fn http_post_answer(
  State(state): State<Arc<AppState>>,
  Json(body): Json<AnswerIn>,
) -> Result<Json<AnswerOut>, CoreError> {
  let image = body
    .image_base64
    .as_deref()
    .map(|b64| decode_base64_image(b64, body.mime.as_deref()))
    .transpose()?;
  let out = match state.practice.submit_answer(body.text, image).await? {
    GradeOutcome::Graded(grading) => {
      info!(target: "practice", is_correct = grading.is_correct, "HTTP answer graded");
      AnswerOut::Graded { grading }
    }
    GradeOutcome::Superseded => AnswerOut::Superseded,
  };
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, body), fields(difficulty = %body.difficulty))]
pub async fn http_post_difficulty(
  State(state): State<Arc<AppState>>,
  Json(body): Json<DifficultyIn>,
) -> Result<Json<DifficultyOut>, CoreError> {
  let level: Difficulty = body.difficulty.parse()?;
  let out = match state.practice.change_difficulty(level).await? {
    DifficultyChange::Refreshed(question) => DifficultyOut { refreshed: true, question: Some(question) },
    DifficultyChange::Stored => DifficultyOut { refreshed: false, question: None },
  };
  Ok(Json(out))
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_draft(State(state): State<Arc<AppState>>) -> Json<AckOut> {
  state.practice.mark_answer_started().await;
  Json(AckOut { ok: true })
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_hint(
  State(state): State<Arc<AppState>>,
) -> Result<Json<HintOut>, CoreError> {
  let text = state.practice.hint().await?;
  info!(target: "practice", "HTTP hint served");
  Ok(Json(HintOut { text }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_round(State(state): State<Arc<AppState>>) -> Json<RoundOut> {
  Json(RoundOut { round: state.practice.snapshot().await })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{Prompts, StagePacing};
  use crate::render::NullRenderer;
  use crate::routes::build_router;
  use crate::testkit::{question_payload, spawn_mock_reasoner, test_reasoner, MockStep};
  use axum::body::Body;
  use axum::http::{Request, StatusCode};
  use tower::ServiceExt;

  fn router_without_reasoner() -> axum::Router {
    let state = AppState::with_parts(None, Prompts::default(), StagePacing::zero(), Arc::new(NullRenderer));
    build_router(Arc::new(state))
  }

  #[tokio::test]
  async fn health_reports_reasoner_availability() {
    let res = router_without_reasoner()
      .oneshot(Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap())
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
  }

  #[tokio::test]
  async fn unknown_difficulty_is_a_400_even_without_credentials() {
    let res = router_without_reasoner()
      .oneshot(
        Request::builder()
          .uri("/api/v1/practice/question?difficulty=Legendary")
          .body(Body::empty())
          .unwrap(),
      )
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn missing_credentials_surface_as_401() {
    let res = router_without_reasoner()
      .oneshot(
        Request::builder().uri("/api/v1/practice/question").body(Body::empty()).unwrap(),
      )
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn non_image_solve_payload_is_a_400() {
    let body = serde_json::json!({ "imageBase64": "bm90IGFuIGltYWdl" }).to_string();
    let res = router_without_reasoner()
      .oneshot(
        Request::builder()
          .method("POST")
          .uri("/api/v1/solve")
          .header("content-type", "application/json")
          .body(Body::from(body))
          .unwrap(),
      )
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn question_round_trips_through_the_router() {
    let mock = spawn_mock_reasoner(vec![MockStep::content(question_payload())]).await;
    let state = AppState::with_parts(
      Some(Arc::new(test_reasoner(&mock.base_url))),
      Prompts::default(),
      StagePacing::zero(),
      Arc::new(NullRenderer),
    );
    let res = build_router(Arc::new(state))
      .oneshot(
        Request::builder()
          .uri("/api/v1/practice/question?difficulty=Easy")
          .body(Body::empty())
          .unwrap(),
      )
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(mock.hits(), 1);
  }
}
