// src/models/attempt.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use validator::Validate;

use crate::{error::AppError, models::question::AnswerShape};

/// A learner's answer to one question.
///
/// The JSON shape alone decides the variant; whether it suits the question is
/// checked against `AnswerKey::expected_shape` before scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Index(i64),
    Indices(Vec<i64>),
    Text(String),
    Texts(Vec<String>),
}

impl AnswerValue {
    /// Whether this value can be read as the given shape.
    /// An empty JSON array parses as `Indices` but also fits a text sequence.
    pub fn fits(&self, shape: AnswerShape) -> bool {
        match shape {
            AnswerShape::Index => self.as_index().is_some(),
            AnswerShape::IndexSet => self.as_indices().is_some(),
            AnswerShape::Text => self.as_text().is_some(),
            AnswerShape::TextSequence => self.as_texts().is_some(),
        }
    }

    pub fn as_index(&self) -> Option<i64> {
        match self {
            AnswerValue::Index(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_indices(&self) -> Option<&[i64]> {
        match self {
            AnswerValue::Indices(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AnswerValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_texts(&self) -> Option<&[String]> {
        match self {
            AnswerValue::Texts(v) => Some(v),
            AnswerValue::Indices(v) if v.is_empty() => Some(&[]),
            _ => None,
        }
    }
}

/// Submitted answers keyed by flattened question index. A `null` value is
/// the same as leaving the question out.
pub type AnswerSheet = BTreeMap<usize, Option<AnswerValue>>;

/// DTO for submitting a quiz attempt.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAttemptRequest {
    #[serde(default)]
    pub answers: AnswerSheet,

    /// Seconds the learner spent, as reported by the client.
    #[serde(default)]
    #[validate(range(max = 604800))]
    pub time_spent_seconds: u32,
}

/// Pass/fail outcome of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptResult {
    Pass,
    Fail,
}

impl AttemptResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptResult::Pass => "pass",
            AttemptResult::Fail => "fail",
        }
    }
}

impl std::str::FromStr for AttemptResult {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pass" => Ok(AttemptResult::Pass),
            "fail" => Ok(AttemptResult::Fail),
            other => Err(AppError::InternalServerError(format!(
                "Unknown attempt result '{}'",
                other
            ))),
        }
    }
}

/// Everything the grader derives for one submission. Frozen once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradedAttempt {
    pub quiz_id: i64,
    pub user_id: i64,
    pub answers: AnswerSheet,
    pub correct_count: u32,
    pub incorrect_count: u32,
    pub unattempted_count: u32,
    /// Answered questions the engine does not score (open response etc.).
    pub ungraded_count: u32,
    pub marks_obtained: f64,
    pub total_marks: f64,
    pub percentage: f64,
    pub result: AttemptResult,
    pub time_spent_seconds: u32,
    pub submitted_at: DateTime<Utc>,
}

/// A persisted attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub id: i64,
    #[serde(flatten)]
    pub graded: GradedAttempt,
}

/// Represents the 'quiz_attempts' table in the database.
#[derive(Debug, Clone, FromRow)]
pub struct AttemptRow {
    pub id: i64,
    pub quiz_id: i64,
    pub user_id: i64,
    pub answers: Json<AnswerSheet>,
    pub correct_count: i32,
    pub incorrect_count: i32,
    pub unattempted_count: i32,
    pub ungraded_count: i32,
    pub marks_obtained: f64,
    pub total_marks: f64,
    pub percentage: f64,
    pub result: String,
    pub time_spent_seconds: i32,
    pub submitted_at: DateTime<Utc>,
}

fn count(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

impl TryFrom<AttemptRow> for Attempt {
    type Error = AppError;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        Ok(Attempt {
            id: row.id,
            graded: GradedAttempt {
                quiz_id: row.quiz_id,
                user_id: row.user_id,
                answers: row.answers.0,
                correct_count: count(row.correct_count),
                incorrect_count: count(row.incorrect_count),
                unattempted_count: count(row.unattempted_count),
                ungraded_count: count(row.ungraded_count),
                marks_obtained: row.marks_obtained,
                total_marks: row.total_marks,
                percentage: row.percentage,
                result: row.result.parse()?,
                time_spent_seconds: count(row.time_spent_seconds),
                submitted_at: row.submitted_at,
            },
        })
    }
}

/// Response body of the eligibility preview.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityResponse {
    pub eligible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub attempts_used: u32,
    /// `None` when the quiz has no attempt ceiling.
    pub attempts_remaining: Option<u32>,
}
