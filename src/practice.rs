//! Practice session controller.
//!
//! Owns the round lifecycle: fetch question → present → accept answer →
//! grade → present result → next round. One round at a time. A monotonically
//! increasing round token guards against stale service responses: results
//! that arrive for a superseded round are dropped, never written over the
//! current one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::config::Prompts;
use crate::domain::{Difficulty, GradingResult, Question};
use crate::error::{CoreError, CoreResult};
use crate::ingest::ImageUpload;
use crate::reasoner::Reasoner;
use crate::render::TypesetRenderer;

/// What `change_difficulty` did with the request.
#[derive(Clone, Debug, PartialEq)]
pub enum DifficultyChange {
  /// Nothing was in progress, so a question at the new level was fetched
  /// immediately.
  Refreshed(Question),
  /// The current round was left intact; the level applies from the next
  /// round.
  Stored,
}

/// Outcome of a grading submission.
#[derive(Clone, Debug, PartialEq)]
pub enum GradeOutcome {
  Graded(GradingResult),
  /// A new round superseded this submission while it was in flight; the
  /// verdict was dropped.
  Superseded,
}

/// Read-only view of the current round.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundSnapshot {
  pub preferred_difficulty: Difficulty,
  pub question: Option<Question>,
  pub answer_text: Option<String>,
  pub answer_has_image: bool,
  pub grading: Option<GradingResult>,
}

#[derive(Clone, Debug, Default)]
struct Answer {
  text: Option<String>,
  image: Option<ImageUpload>,
}

#[derive(Default)]
struct Round {
  question: Option<Question>,
  answer: Option<Answer>,
  grading: Option<GradingResult>,
  /// Set once the user starts typing/drawing; blocks difficulty refreshes.
  answer_started: bool,
  grading_in_flight: bool,
}

struct Inner {
  preferred: Difficulty,
  round: Round,
}

pub struct PracticeSession {
  reasoner: Option<Arc<Reasoner>>,
  prompts: Arc<Prompts>,
  renderer: Arc<dyn TypesetRenderer>,
  inner: RwLock<Inner>,
  /// Incremented by every `new_round`; in-flight work holding an older
  /// value is stale.
  round_seq: AtomicU64,
}

impl PracticeSession {
  pub fn new(
    reasoner: Option<Arc<Reasoner>>,
    prompts: Arc<Prompts>,
    renderer: Arc<dyn TypesetRenderer>,
  ) -> Self {
    Self {
      reasoner,
      prompts,
      renderer,
      inner: RwLock::new(Inner { preferred: Difficulty::default(), round: Round::default() }),
      round_seq: AtomicU64::new(0),
    }
  }

  fn reasoner(&self) -> CoreResult<&Reasoner> {
    self.reasoner.as_deref().ok_or_else(CoreError::credentials_missing)
  }

  /// Start a fresh round, superseding anything in flight. Uses the stored
  /// preference when no difficulty is given. On failure the round stays
  /// empty (no active question).
  #[instrument(level = "info", skip(self), fields(explicit = difficulty.is_some()))]
  pub async fn new_round(&self, difficulty: Option<Difficulty>) -> CoreResult<Question> {
    let reasoner = self.reasoner()?;
    let token = self.round_seq.fetch_add(1, Ordering::SeqCst) + 1;
    let level = {
      let mut inner = self.inner.write().await;
      inner.round = Round::default();
      difficulty.unwrap_or(inner.preferred)
    };
    info!(target: "practice", round = token, %level, "fetching practice question");

    let question = reasoner.generate_question(&self.prompts, level).await?;

    let mut inner = self.inner.write().await;
    if self.round_seq.load(Ordering::SeqCst) != token {
      warn!(target: "practice", round = token, question_id = %question.id, "dropping question fetched for a superseded round");
      return Err(CoreError::invalid_input("practice round was superseded by a newer request"));
    }
    inner.round.question = Some(question.clone());
    drop(inner);

    self.renderer.render(&question.expression, true);
    info!(target: "practice", round = token, question_id = %question.id, topic = %question.topic, "practice round ready");
    Ok(question)
  }

  /// Record that the user started working on an answer. Idempotent; a no-op
  /// without an active, ungraded question.
  pub async fn mark_answer_started(&self) {
    let mut inner = self.inner.write().await;
    if inner.round.question.is_some() && inner.round.grading.is_none() {
      inner.round.answer_started = true;
    }
  }

  /// Store the difficulty preference. Refetches the question immediately
  /// only when the round is untouched (no answer activity, not graded) or
  /// when there is no question at all; otherwise the current round is left
  /// intact and the new level applies from the next round.
  #[instrument(level = "info", skip(self), fields(%level))]
  pub async fn change_difficulty(&self, level: Difficulty) -> CoreResult<DifficultyChange> {
    let refresh = {
      let mut inner = self.inner.write().await;
      inner.preferred = level;
      let r = &inner.round;
      r.question.is_none()
        || (r.grading.is_none() && r.answer.is_none() && !r.answer_started && !r.grading_in_flight)
    };
    if refresh {
      let q = self.new_round(Some(level)).await?;
      Ok(DifficultyChange::Refreshed(q))
    } else {
      info!(target: "practice", %level, "difficulty stored; applies from the next round");
      Ok(DifficultyChange::Stored)
    }
  }

  /// Submit the user's answer for grading. The answer may be typed text, a
  /// handwritten image, or both; it must not be empty. A graded round is
  /// terminal: the next action is a new round, not another submit.
  #[instrument(level = "info", skip_all, fields(text_len = text.as_deref().map_or(0, str::len), has_image = image.is_some()))]
  pub async fn submit_answer(
    &self,
    text: Option<String>,
    image: Option<ImageUpload>,
  ) -> CoreResult<GradeOutcome> {
    let text = text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
    if text.is_none() && image.is_none() {
      return Err(CoreError::invalid_input("provide a typed answer, a handwritten image, or both"));
    }
    let reasoner = self.reasoner()?;

    let (token, question_expr) = {
      let mut inner = self.inner.write().await;
      let round = &mut inner.round;
      let question = round
        .question
        .as_ref()
        .ok_or_else(|| CoreError::invalid_input("no active question; start a round first"))?;
      if round.grading.is_some() {
        return Err(CoreError::invalid_input("round already graded; start a new round"));
      }
      if round.grading_in_flight {
        return Err(CoreError::invalid_input("grading already in progress"));
      }
      let expr = question.expression.clone();
      round.answer = Some(Answer { text: text.clone(), image: image.clone() });
      round.answer_started = true;
      round.grading_in_flight = true;
      (self.round_seq.load(Ordering::SeqCst), expr)
    };

    let image_uri = image.as_ref().map(ImageUpload::to_data_uri);
    let verdict = reasoner
      .grade_answer(&self.prompts, &question_expr, text.as_deref(), image_uri.as_deref())
      .await;

    match verdict {
      Ok(grading) => {
        let mut inner = self.inner.write().await;
        if self.round_seq.load(Ordering::SeqCst) != token {
          warn!(target: "practice", round = token, "dropping grading verdict for a superseded round");
          return Ok(GradeOutcome::Superseded);
        }
        inner.round.grading_in_flight = false;
        inner.round.grading = Some(grading.clone());
        drop(inner);

        if !grading.is_correct {
          self.renderer.render(&grading.correct_solution, true);
        }
        info!(target: "practice", round = token, is_correct = grading.is_correct, score = grading.score, "round graded");
        Ok(GradeOutcome::Graded(grading))
      }
      Err(e) => {
        let mut inner = self.inner.write().await;
        if self.round_seq.load(Ordering::SeqCst) == token {
          // answer is kept so the user can resubmit
          inner.round.grading_in_flight = false;
        }
        Err(e)
      }
    }
  }

  /// Plain-text hint for the active question.
  #[instrument(level = "info", skip(self))]
  pub async fn hint(&self) -> CoreResult<String> {
    let reasoner = self.reasoner()?;
    let question_expr = {
      let inner = self.inner.read().await;
      inner
        .round
        .question
        .as_ref()
        .map(|q| q.expression.clone())
        .ok_or_else(|| CoreError::invalid_input("no active question; start a round first"))?
    };
    reasoner.practice_hint(&self.prompts, &question_expr).await
  }

  /// Read-only snapshot of the current round.
  pub async fn snapshot(&self) -> RoundSnapshot {
    let inner = self.inner.read().await;
    let answer = inner.round.answer.as_ref();
    RoundSnapshot {
      preferred_difficulty: inner.preferred,
      question: inner.round.question.clone(),
      answer_text: answer.and_then(|a| a.text.clone()),
      answer_has_image: answer.is_some_and(|a| a.image.is_some()),
      grading: inner.round.grading.clone(),
    }
  }
}
