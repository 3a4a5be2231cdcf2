//! Domain models used by the backend: solve results, practice questions,
//! grading verdicts, difficulty and the solve pipeline stage.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// One step of a worked solution. Vec order is solution order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
  pub expression: String,
  pub explanation: String,
  /// Rule applied at this step ("distributive property", ...). Absent when
  /// the service omitted it or sent an empty string.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub rule: Option<String>,
}

/// Structured solve result, published once per completed session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Solution {
  pub original_expression: String,
  /// Falls back to the original expression when the service sends nothing.
  pub normalized_expression: String,
  /// Best-effort classification ("linear equation", ...); may be empty.
  pub problem_category: String,
  pub steps: Vec<Step>,
  pub final_answer: String,
  /// Service-reported confidence, passed through unclamped. 0.0 when absent.
  pub confidence: f32,
}

/// A generated practice question. Ephemeral: lives only for its round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
  pub id: String,
  pub expression: String,
  pub difficulty: Difficulty,
  /// Topic label from the generator; present but may be empty.
  pub topic: String,
}

/// Terminal grading verdict for one practice round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingResult {
  pub is_correct: bool,
  pub score: f32,
  pub feedback: String,
  /// Worked solution to show the user, expected in aligned-step form when
  /// the answer was wrong.
  pub correct_solution: String,
}

/// Requested practice difficulty. Closed set: unknown strings fail fast
/// locally and are never sent upstream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
  Easy,
  #[default]
  Medium,
  Hard,
}

impl FromStr for Difficulty {
  type Err = CoreError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "easy" => Ok(Self::Easy),
      "medium" => Ok(Self::Medium),
      "hard" => Ok(Self::Hard),
      _ => Err(CoreError::invalid_input(format!(
        "unknown difficulty '{}' (expected Easy, Medium or Hard)",
        s.trim()
      ))),
    }
  }
}

impl fmt::Display for Difficulty {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Self::Easy => "Easy",
      Self::Medium => "Medium",
      Self::Hard => "Hard",
    };
    f.write_str(s)
  }
}

/// Progress of the solve pipeline. A session holds exactly one value at a
/// time and moves forward only along `next_in_order`, with an escape to
/// `Error` from any non-terminal stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
  #[default]
  Idle,
  Preprocessing,
  Ocr,
  Parsing,
  Solving,
  Complete,
  Error,
}

impl Stage {
  /// Complete and Error end a session; only an explicit clear leaves them.
  pub const fn is_terminal(self) -> bool {
    matches!(self, Self::Complete | Self::Error)
  }

  /// True while a submitted image is being driven through the machine.
  pub const fn is_active(self) -> bool {
    !matches!(self, Self::Idle | Self::Complete | Self::Error)
  }

  /// The single legal forward edge from this stage, if any.
  pub const fn next_in_order(self) -> Option<Stage> {
    match self {
      Self::Idle => Some(Self::Preprocessing),
      Self::Preprocessing => Some(Self::Ocr),
      Self::Ocr => Some(Self::Parsing),
      Self::Parsing => Some(Self::Solving),
      Self::Solving => Some(Self::Complete),
      Self::Complete | Self::Error => None,
    }
  }
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Self::Idle => "idle",
      Self::Preprocessing => "preprocessing",
      Self::Ocr => "ocr",
      Self::Parsing => "parsing",
      Self::Solving => "solving",
      Self::Complete => "complete",
      Self::Error => "error",
    };
    f.write_str(s)
  }
}
