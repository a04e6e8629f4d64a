// src/grading/grader.rs

use crate::{
    config::PASS_THRESHOLD_PERCENT,
    grading::{
        GradingError,
        eligibility::{EligibilityContext, check_eligibility},
        matcher::{Verdict, evaluate, mark_delta},
    },
    models::{
        attempt::{AnswerSheet, AnswerValue, AttemptResult, GradedAttempt},
        quiz::{FlatQuestion, Quiz},
    },
};

/// A learner's submission as handed to the grader.
#[derive(Debug, Clone)]
pub struct Submission {
    pub user_id: i64,
    pub answers: AnswerSheet,
    pub time_spent_seconds: u32,
}

/// Running totals over a quiz's questions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tally {
    pub correct: u32,
    pub incorrect: u32,
    pub unattempted: u32,
    pub ungraded: u32,
    /// Sum of mark deltas, before clamping.
    pub raw_marks: f64,
    pub total_marks: f64,
}

impl Tally {
    pub fn record(&mut self, marks: f64, verdict: Verdict, delta: f64) {
        self.total_marks += marks;
        self.raw_marks += delta;
        match verdict {
            Verdict::Correct => self.correct += 1,
            Verdict::Incorrect => self.incorrect += 1,
            Verdict::Unattempted => self.unattempted += 1,
            Verdict::Ungraded => self.ungraded += 1,
        }
    }

    /// Aggregate score; never below zero.
    pub fn marks_obtained(&self) -> f64 {
        self.raw_marks.max(0.0)
    }

    pub fn percentage(&self) -> f64 {
        percentage(self.marks_obtained(), self.total_marks)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `obtained / total * 100` rounded to two decimals, or 0 for a zero total.
pub fn percentage(obtained: f64, total: f64) -> f64 {
    if total > 0.0 {
        round2(obtained / total * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    }
}

pub fn result_for(percentage: f64) -> AttemptResult {
    if percentage >= PASS_THRESHOLD_PERCENT {
        AttemptResult::Pass
    } else {
        AttemptResult::Fail
    }
}

/// Looks up the answer for a question. `null` and a missing entry are the same.
pub fn answer_for(answers: &AnswerSheet, index: usize) -> Option<&AnswerValue> {
    answers.get(&index).and_then(Option::as_ref)
}

/// Rejects answers for questions the quiz does not have and answers whose
/// shape does not suit their question's variant.
fn check_answers(questions: &[FlatQuestion<'_>], answers: &AnswerSheet) -> Result<(), GradingError> {
    for (&index, value) in answers {
        let flat = questions
            .get(index)
            .ok_or(GradingError::UnknownQuestionIndex(index))?;
        let (Some(value), Some(expected)) = (value, flat.question.key.expected_shape()) else {
            continue;
        };
        if !value.fits(expected) {
            return Err(GradingError::AnswerShapeMismatch { index, expected });
        }
    }
    Ok(())
}

/// Scores every question in order.
pub fn tally(questions: &[FlatQuestion<'_>], answers: &AnswerSheet) -> Tally {
    questions.iter().fold(Tally::default(), |mut tally, flat| {
        let verdict = evaluate(&flat.question.key, answer_for(answers, flat.index));
        tally.record(flat.question.marks, verdict, mark_delta(flat.question, verdict));
        tally
    })
}

/// Grades a submission against a quiz snapshot.
///
/// Eligibility is decided first; a rejected submission produces nothing.
/// The returned record carries every derived field and is what gets stored.
pub fn grade_attempt(
    quiz: &Quiz,
    submission: Submission,
    ctx: &EligibilityContext,
) -> Result<GradedAttempt, GradingError> {
    check_eligibility(&quiz.availability, ctx)?;

    let questions = quiz.layout.flatten();
    if questions.is_empty() {
        return Err(GradingError::NoQuestions);
    }
    check_answers(&questions, &submission.answers)?;

    let tally = tally(&questions, &submission.answers);
    let percentage = tally.percentage();

    Ok(GradedAttempt {
        quiz_id: quiz.id,
        user_id: submission.user_id,
        correct_count: tally.correct,
        incorrect_count: tally.incorrect,
        unattempted_count: tally.unattempted,
        ungraded_count: tally.ungraded,
        marks_obtained: tally.marks_obtained(),
        total_marks: tally.total_marks,
        percentage,
        result: result_for(percentage),
        time_spent_seconds: submission.time_spent_seconds,
        submitted_at: ctx.now,
        answers: submission.answers,
    })
}
