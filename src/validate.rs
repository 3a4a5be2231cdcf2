//! Shape validation for reasoning-service payloads.
//!
//! The single choke point between the remote service and the controllers:
//! every response is parsed as free-form JSON and checked field by field
//! before anything downstream may rely on it. A missing or mistyped field
//! fails with the offending field name in the error.

use serde_json::Value;
use std::str::FromStr;

use crate::domain::{Difficulty, GradingResult, Question, Solution, Step};
use crate::error::{CoreError, CoreResult};

fn required_str(v: &Value, field: &'static str) -> CoreResult<String> {
  match v.get(field) {
    Some(Value::String(s)) => Ok(s.trim().to_string()),
    Some(_) => Err(CoreError::malformed(field, "expected a string")),
    None => Err(CoreError::malformed(field, "missing")),
  }
}

fn required_non_empty(v: &Value, field: &'static str) -> CoreResult<String> {
  let s = required_str(v, field)?;
  if s.is_empty() {
    return Err(CoreError::malformed(field, "must be non-empty"));
  }
  Ok(s)
}

fn optional_str(v: &Value, field: &'static str) -> CoreResult<Option<String>> {
  match v.get(field) {
    None | Some(Value::Null) => Ok(None),
    Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
    Some(_) => Err(CoreError::malformed(field, "expected a string")),
  }
}

fn required_bool(v: &Value, field: &'static str) -> CoreResult<bool> {
  match v.get(field) {
    Some(Value::Bool(b)) => Ok(*b),
    Some(_) => Err(CoreError::malformed(field, "expected a boolean")),
    None => Err(CoreError::malformed(field, "missing")),
  }
}

fn required_number(v: &Value, field: &'static str) -> CoreResult<f64> {
  match v.get(field) {
    Some(n) if n.is_number() => Ok(n.as_f64().unwrap_or(0.0)),
    Some(_) => Err(CoreError::malformed(field, "expected a number")),
    None => Err(CoreError::malformed(field, "missing")),
  }
}

fn optional_number(v: &Value, field: &'static str) -> CoreResult<Option<f64>> {
  match v.get(field) {
    None | Some(Value::Null) => Ok(None),
    Some(n) if n.is_number() => Ok(n.as_f64()),
    Some(_) => Err(CoreError::malformed(field, "expected a number")),
  }
}

/// Check and normalize a solve payload.
///
/// Normalization applied on the way in: a missing/empty normalizedExpression
/// falls back to the original, problemCategory defaults to empty, an absent
/// confidence becomes 0.0 (no clamping of out-of-range values), and empty
/// rule strings collapse to none.
pub fn validate_solution(v: &Value) -> CoreResult<Solution> {
  let original = required_non_empty(v, "originalExpression")?;
  let normalized = optional_str(v, "normalizedExpression")?
    .filter(|s| !s.is_empty())
    .unwrap_or_else(|| original.clone());
  let category = optional_str(v, "problemCategory")?.unwrap_or_default();

  let steps_v = v.get("steps").ok_or_else(|| CoreError::malformed("steps", "missing"))?;
  let steps_arr = steps_v
    .as_array()
    .ok_or_else(|| CoreError::malformed("steps", "expected a sequence"))?;
  let mut steps = Vec::with_capacity(steps_arr.len());
  for (i, sv) in steps_arr.iter().enumerate() {
    steps.push(validate_step(sv).map_err(|e| in_step(i, e))?);
  }

  let final_answer = required_non_empty(v, "finalAnswer")?;
  let confidence = optional_number(v, "confidence")?.unwrap_or(0.0) as f32;

  Ok(Solution {
    original_expression: original,
    normalized_expression: normalized,
    problem_category: category,
    steps,
    final_answer,
    confidence,
  })
}

fn validate_step(v: &Value) -> CoreResult<Step> {
  if !v.is_object() {
    return Err(CoreError::malformed("", "expected a step object"));
  }
  let expression = required_str(v, "expression")?;
  let explanation = required_str(v, "explanation")?;
  let rule = optional_str(v, "rule")?.filter(|s| !s.is_empty());
  Ok(Step { expression, explanation, rule })
}

/// Requalify step errors as `steps[i].field` so the report points at the
/// exact offender.
fn in_step(i: usize, e: CoreError) -> CoreError {
  match e {
    CoreError::MalformedResponse { field, message } if field.is_empty() => {
      CoreError::malformed(format!("steps[{i}]"), message)
    }
    CoreError::MalformedResponse { field, message } => {
      CoreError::malformed(format!("steps[{i}].{field}"), message)
    }
    other => other,
  }
}

/// Check a generated practice question.
pub fn validate_question(v: &Value) -> CoreResult<Question> {
  let id = required_non_empty(v, "id")?;
  let expression = required_non_empty(v, "expression")?;
  let difficulty_raw = required_str(v, "difficulty")?;
  let difficulty = Difficulty::from_str(&difficulty_raw).map_err(|_| {
    CoreError::malformed("difficulty", format!("'{difficulty_raw}' is not one of Easy/Medium/Hard"))
  })?;
  let topic = required_str(v, "topic")?;
  Ok(Question { id, expression, difficulty, topic })
}

/// Check a grading verdict. `score` passes through without clamping.
pub fn validate_grading(v: &Value) -> CoreResult<GradingResult> {
  let is_correct = required_bool(v, "isCorrect")?;
  let score = required_number(v, "score")? as f32;
  let feedback = required_str(v, "feedback")?;
  let correct_solution = required_str(v, "correctSolution")?;
  Ok(GradingResult { is_correct, score, feedback, correct_solution })
}
