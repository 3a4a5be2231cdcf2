//! Loading solver configuration (prompts + stage pacing) from TOML.
//!
//! See `SolverConfig` and `Prompts` for expected schema.

use serde::Deserialize;
use std::time::Duration;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct SolverConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub pacing: PacingCfg,
}

/// Per-stage pacing in milliseconds. Preprocessing and OCR run as paced
/// local stages ahead of the service call; solving is paced presentation of
/// the steps after it. All three may be zeroed.
#[derive(Clone, Debug, Deserialize)]
pub struct PacingCfg {
  #[serde(default = "default_preprocessing_ms")]
  pub preprocessing_ms: u64,
  #[serde(default = "default_ocr_ms")]
  pub ocr_ms: u64,
  #[serde(default = "default_solving_ms")]
  pub solving_ms: u64,
}

fn default_preprocessing_ms() -> u64 { 400 }
fn default_ocr_ms() -> u64 { 600 }
fn default_solving_ms() -> u64 { 300 }

impl Default for PacingCfg {
  fn default() -> Self {
    Self {
      preprocessing_ms: default_preprocessing_ms(),
      ocr_ms: default_ocr_ms(),
      solving_ms: default_solving_ms(),
    }
  }
}

/// Stage pacing resolved to durations, as consumed by the pipeline.
#[derive(Clone, Copy, Debug)]
pub struct StagePacing {
  pub preprocessing: Duration,
  pub ocr: Duration,
  pub solving: Duration,
}

impl StagePacing {
  pub fn from_cfg(cfg: &PacingCfg) -> Self {
    Self {
      preprocessing: Duration::from_millis(cfg.preprocessing_ms),
      ocr: Duration::from_millis(cfg.ocr_ms),
      solving: Duration::from_millis(cfg.solving_ms),
    }
  }

  /// No artificial delays. Tests run the machine with this.
  pub const fn zero() -> Self {
    Self {
      preprocessing: Duration::ZERO,
      ocr: Duration::ZERO,
      solving: Duration::ZERO,
    }
  }
}

impl Default for StagePacing {
  fn default() -> Self {
    Self::from_cfg(&PacingCfg::default())
  }
}

/// Prompts used by the reasoning client. Defaults pin the strict JSON shapes
/// the validators expect. Override them in TOML to tune tone/structure.
#[derive(Clone, Debug, Deserialize)]
pub struct Prompts {
  // Image solve
  pub solve_system: String,
  pub solve_user: String,
  // Practice question generation
  pub question_system: String,
  pub question_user_template: String,
  // Answer grading
  pub grading_system: String,
  pub grading_user_template: String,
  // Hint
  pub hint_system: String,
  pub hint_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      solve_system: "You are a mathematics tutor engine. Read the math problem in the attached image and solve it step by step. Respond ONLY with strict JSON: {\"originalExpression\": string, \"normalizedExpression\": string, \"problemCategory\": string, \"steps\": [{\"expression\": string, \"explanation\": string, \"rule\": string}], \"finalAnswer\": string, \"confidence\": number between 0 and 1}. Expressions are LaTeX-friendly plain text.".into(),
      solve_user: "Solve the problem shown in the image. Keep each step small, give the algebraic rule applied, and put the fully simplified result in finalAnswer.".into(),
      question_system: "You are a math practice question generator. Respond ONLY with strict JSON: {\"id\": string, \"expression\": string, \"difficulty\": \"Easy\"|\"Medium\"|\"Hard\", \"topic\": string}.".into(),
      question_user_template: "Generate one {difficulty} practice problem solvable by hand. Set difficulty to exactly \"{difficulty}\". Keep the expression short.".into(),
      grading_system: "You are a strict math grader. Respond ONLY with strict JSON: {\"isCorrect\": boolean, \"score\": number from 0 to 10, \"feedback\": string, \"correctSolution\": string}. Accept mathematically equivalent forms. When the answer is wrong, correctSolution must show the worked steps as aligned lines.".into(),
      grading_user_template: "Problem: {question}\nStudent answer: {answer}\nGrade for mathematical correctness.".into(),
      hint_system: "You are a math coach. Give ONE short hint (< 25 words) that points at the next move without revealing the final answer.".into(),
      hint_user_template: "Problem: {question}".into(),
    }
  }
}

/// Attempt to load `SolverConfig` from SOLVER_CONFIG_PATH. On any parsing/IO
/// error, returns None and the caller falls back to defaults.
pub fn load_solver_config_from_env() -> Option<SolverConfig> {
  let path = std::env::var("SOLVER_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<SolverConfig>(&s) {
      Ok(cfg) => {
        info!(target: "mathsage_backend", %path, "Loaded solver config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "mathsage_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "mathsage_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
