// src/grading/eligibility.rs

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::models::quiz::{Availability, MaxAttempts};

/// Facts about the submitter gathered by the persistence layer.
#[derive(Debug, Clone)]
pub struct EligibilityContext {
    /// Instant the submission is evaluated at.
    pub now: DateTime<Utc>,
    /// Audience groups the submitter belongs to.
    pub member_batches: HashSet<String>,
    /// Attempts already stored for this (submitter, quiz) pair.
    pub prior_attempts: u32,
}

/// Why a submission may not be graded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Ineligible {
    #[error("This quiz is not active")]
    Inactive,
    #[error("This quiz is not yet available (opens at {opens_at})")]
    NotYetAvailable { opens_at: DateTime<Utc> },
    #[error("This quiz is no longer available (closed at {closed_at})")]
    Closed { closed_at: DateTime<Utc> },
    #[error("This quiz is not available to your batch")]
    NotInAudience,
    #[error("Maximum attempts reached ({max})")]
    AttemptLimitReached { max: u32 },
}

impl Ineligible {
    /// True for the attempt ceiling, false for availability failures.
    pub fn is_capacity(&self) -> bool {
        matches!(self, Ineligible::AttemptLimitReached { .. })
    }

    /// Stable machine-readable reason.
    pub fn code(&self) -> &'static str {
        match self {
            Ineligible::Inactive => "quiz_inactive",
            Ineligible::NotYetAvailable { .. } => "not_yet_available",
            Ineligible::Closed { .. } => "window_closed",
            Ineligible::NotInAudience => "not_in_audience",
            Ineligible::AttemptLimitReached { .. } => "max_attempts_reached",
        }
    }
}

/// Decides whether a submission is allowed. The first failing check wins:
/// activation, then the time window, then audience, then the attempt ceiling.
pub fn check_eligibility(
    availability: &Availability,
    ctx: &EligibilityContext,
) -> Result<(), Ineligible> {
    if !availability.is_active {
        return Err(Ineligible::Inactive);
    }

    if let Some(opens_at) = availability.available_from {
        if ctx.now < opens_at {
            return Err(Ineligible::NotYetAvailable { opens_at });
        }
    }
    if let Some(closed_at) = availability.available_to {
        if ctx.now > closed_at {
            return Err(Ineligible::Closed { closed_at });
        }
    }

    if !availability.available_to_everyone
        && !availability
            .batches
            .iter()
            .any(|b| ctx.member_batches.contains(b))
    {
        return Err(Ineligible::NotInAudience);
    }

    if let MaxAttempts::Limited(max) = availability.max_attempts {
        if ctx.prior_attempts >= max {
            return Err(Ineligible::AttemptLimitReached { max });
        }
    }

    Ok(())
}

/// Attempts left before the ceiling, or `None` when unlimited.
pub fn attempts_remaining(max_attempts: MaxAttempts, prior_attempts: u32) -> Option<u32> {
    match max_attempts {
        MaxAttempts::Unlimited => None,
        MaxAttempts::Limited(max) => Some(max.saturating_sub(prior_attempts)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn open_quiz() -> Availability {
        Availability {
            is_active: true,
            available_from: None,
            available_to: None,
            available_to_everyone: true,
            batches: vec![],
            max_attempts: MaxAttempts::Unlimited,
        }
    }

    fn ctx(prior_attempts: u32, batches: &[&str]) -> EligibilityContext {
        EligibilityContext {
            now: Utc::now(),
            member_batches: batches.iter().map(|b| b.to_string()).collect(),
            prior_attempts,
        }
    }

    #[test]
    fn test_open_quiz_accepts() {
        assert_eq!(check_eligibility(&open_quiz(), &ctx(0, &[])), Ok(()));
    }

    #[test]
    fn test_inactive_rejects_regardless_of_other_fields() {
        let mut quiz = open_quiz();
        quiz.is_active = false;
        quiz.available_from = Some(Utc::now() + Duration::hours(1));
        quiz.max_attempts = MaxAttempts::Limited(1);

        assert_eq!(check_eligibility(&quiz, &ctx(5, &[])), Err(Ineligible::Inactive));
        assert_eq!(check_eligibility(&quiz, &ctx(0, &["b1"])), Err(Ineligible::Inactive));
    }

    #[test]
    fn test_not_yet_available() {
        let mut quiz = open_quiz();
        let opens_at = Utc::now() + Duration::hours(1);
        quiz.available_from = Some(opens_at);

        let err = check_eligibility(&quiz, &ctx(0, &[])).unwrap_err();
        assert_eq!(err, Ineligible::NotYetAvailable { opens_at });
        assert_eq!(err.code(), "not_yet_available");
        assert!(!err.is_capacity());
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let now = Utc::now();
        let mut quiz = open_quiz();
        quiz.available_from = Some(now);
        quiz.available_to = Some(now);

        let context = EligibilityContext {
            now,
            member_batches: HashSet::new(),
            prior_attempts: 0,
        };
        assert_eq!(check_eligibility(&quiz, &context), Ok(()));
    }

    #[test]
    fn test_closed_window() {
        let mut quiz = open_quiz();
        let closed_at = Utc::now() - Duration::minutes(5);
        quiz.available_to = Some(closed_at);

        assert_eq!(
            check_eligibility(&quiz, &ctx(0, &[])),
            Err(Ineligible::Closed { closed_at })
        );
    }

    #[test]
    fn test_audience_targeting() {
        let mut quiz = open_quiz();
        quiz.batches = vec!["morning".into(), "evening".into()];

        // Everyone flag bypasses the batch list.
        assert_eq!(check_eligibility(&quiz, &ctx(0, &["weekend"])), Ok(()));

        quiz.available_to_everyone = false;
        assert_eq!(check_eligibility(&quiz, &ctx(0, &["evening"])), Ok(()));
        assert_eq!(
            check_eligibility(&quiz, &ctx(0, &["weekend"])),
            Err(Ineligible::NotInAudience)
        );
        assert_eq!(
            check_eligibility(&quiz, &ctx(0, &[])),
            Err(Ineligible::NotInAudience)
        );
    }

    #[test]
    fn test_attempt_ceiling() {
        let mut quiz = open_quiz();
        quiz.max_attempts = MaxAttempts::Limited(3);

        for prior in 0..3 {
            assert_eq!(check_eligibility(&quiz, &ctx(prior, &[])), Ok(()));
        }
        for prior in 3..6 {
            let err = check_eligibility(&quiz, &ctx(prior, &[])).unwrap_err();
            assert_eq!(err, Ineligible::AttemptLimitReached { max: 3 });
            assert!(err.is_capacity());
        }
    }

    #[test]
    fn test_single_attempt_quiz_with_one_prior() {
        let mut quiz = open_quiz();
        quiz.max_attempts = MaxAttempts::Limited(1);

        let err = check_eligibility(&quiz, &ctx(1, &[])).unwrap_err();
        assert_eq!(err.code(), "max_attempts_reached");
        assert_eq!(err.to_string(), "Maximum attempts reached (1)");
    }

    #[test]
    fn test_window_checked_before_audience_and_capacity() {
        let mut quiz = open_quiz();
        quiz.available_from = Some(Utc::now() + Duration::hours(1));
        quiz.available_to_everyone = false;
        quiz.batches = vec!["a".into()];
        quiz.max_attempts = MaxAttempts::Limited(1);

        let err = check_eligibility(&quiz, &ctx(4, &[])).unwrap_err();
        assert_eq!(err.code(), "not_yet_available");
    }

    #[test]
    fn test_audience_checked_before_capacity() {
        let mut quiz = open_quiz();
        quiz.available_to_everyone = false;
        quiz.batches = vec!["morning".into()];
        quiz.max_attempts = MaxAttempts::Limited(2);

        assert_eq!(
            check_eligibility(&quiz, &ctx(2, &["evening"])),
            Err(Ineligible::NotInAudience)
        );
        assert_eq!(
            check_eligibility(&quiz, &ctx(2, &["morning"])),
            Err(Ineligible::AttemptLimitReached { max: 2 })
        );
    }

    #[test]
    fn test_attempts_remaining() {
        assert_eq!(attempts_remaining(MaxAttempts::Unlimited, 10), None);
        assert_eq!(attempts_remaining(MaxAttempts::Limited(3), 1), Some(2));
        assert_eq!(attempts_remaining(MaxAttempts::Limited(3), 7), Some(0));
    }
}
