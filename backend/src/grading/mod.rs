// src/grading/mod.rs

//! Quiz grading and eligibility.
//!
//! Nothing in here touches the database: callers load the quiz, the
//! submitter's batches and prior attempt count, then hand them over.

pub mod eligibility;
pub mod grader;
pub mod matcher;
pub mod report;

use crate::models::question::AnswerShape;

pub use eligibility::{EligibilityContext, Ineligible, check_eligibility};
pub use grader::{Submission, grade_attempt};
pub use report::{AttemptReport, project_report};

/// Typed reasons a submission cannot be turned into an attempt.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GradingError {
    #[error(transparent)]
    Ineligible(#[from] Ineligible),
    #[error("Quiz has no questions")]
    NoQuestions,
    #[error("Answer given for question {0}, which does not exist")]
    UnknownQuestionIndex(usize),
    #[error("Answer for question {index} must be {expected}")]
    AnswerShapeMismatch { index: usize, expected: AnswerShape },
}
