// src/grading/report.rs

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    grading::{
        grader::{Tally, answer_for},
        matcher::{Verdict, evaluate, mark_delta},
    },
    models::{
        attempt::{AnswerValue, Attempt, AttemptResult},
        question::{AnswerKey, Question},
        quiz::Quiz,
    },
};

const NOT_ANSWERED: &str = "Not answered";
const ARROW: &str = " → ";

/// Tolerance when comparing recomputed marks with the stored total.
const MARKS_EPSILON: f64 = 1e-6;

/// One question of a report: what was asked, what the learner said, and
/// what was expected.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionReport {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub question_type: &'static str,
    pub question_text: String,
    pub verdict: Verdict,
    pub attempted: bool,
    pub correct: bool,
    pub max_marks: f64,
    /// Signed mark change for this question.
    pub marks_awarded: f64,
    pub learner_answer: String,
    pub correct_answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Human-readable account of a stored attempt.
///
/// The summary fields come from the stored record. `recomputedMarks` is
/// the per-question breakdown summed again; `consistent` says whether the
/// two agree.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptReport {
    pub attempt_id: i64,
    pub quiz_id: i64,
    pub quiz_title: String,
    pub user_id: i64,
    pub submitted_at: DateTime<Utc>,
    pub time_spent_seconds: u32,
    pub marks_obtained: f64,
    pub total_marks: f64,
    pub percentage: f64,
    pub result: AttemptResult,
    pub correct_count: u32,
    pub incorrect_count: u32,
    pub unattempted_count: u32,
    pub ungraded_count: u32,
    pub recomputed_marks: f64,
    pub consistent: bool,
    pub questions: Vec<QuestionReport>,
}

/// Rebuilds the per-question view of an attempt with the grader's own
/// matching rules.
pub fn project_report(quiz: &Quiz, attempt: &Attempt) -> AttemptReport {
    let stored = &attempt.graded;
    let mut tally = Tally::default();

    let questions: Vec<QuestionReport> = quiz
        .layout
        .flatten()
        .into_iter()
        .map(|flat| {
            let q = flat.question;
            let answer = answer_for(&stored.answers, flat.index);
            let verdict = evaluate(&q.key, answer);
            let delta = mark_delta(q, verdict);
            tally.record(q.marks, verdict, delta);

            QuestionReport {
                index: flat.index,
                section: flat.section.map(str::to_owned),
                question_type: q.key.type_name(),
                question_text: q.question_text.clone(),
                verdict,
                attempted: verdict.attempted(),
                correct: verdict.correct(),
                max_marks: q.marks,
                marks_awarded: delta,
                learner_answer: answer.map_or_else(
                    || NOT_ANSWERED.to_string(),
                    |a| render_answer(&q.key, a),
                ),
                correct_answer: render_key(q),
                explanation: q.explanation.clone(),
            }
        })
        .collect();

    let consistent = (tally.marks_obtained() - stored.marks_obtained).abs() < MARKS_EPSILON
        && (tally.total_marks - stored.total_marks).abs() < MARKS_EPSILON
        && tally.correct == stored.correct_count
        && tally.incorrect == stored.incorrect_count
        && tally.unattempted == stored.unattempted_count
        && tally.ungraded == stored.ungraded_count;

    if !consistent {
        tracing::warn!(
            attempt_id = attempt.id,
            quiz_id = quiz.id,
            stored = stored.marks_obtained,
            recomputed = tally.marks_obtained(),
            "Report breakdown disagrees with stored attempt"
        );
    }

    AttemptReport {
        attempt_id: attempt.id,
        quiz_id: quiz.id,
        quiz_title: quiz.title.clone(),
        user_id: stored.user_id,
        submitted_at: stored.submitted_at,
        time_spent_seconds: stored.time_spent_seconds,
        marks_obtained: stored.marks_obtained,
        total_marks: stored.total_marks,
        percentage: stored.percentage,
        result: stored.result,
        correct_count: stored.correct_count,
        incorrect_count: stored.incorrect_count,
        unattempted_count: stored.unattempted_count,
        ungraded_count: stored.ungraded_count,
        recomputed_marks: tally.marks_obtained(),
        consistent,
        questions,
    }
}

fn option_text(key: &AnswerKey, index: i64) -> String {
    key.option_label(index)
        .map(str::to_owned)
        .unwrap_or_else(|| format!("Invalid option {}", index))
}

fn render_value(value: &AnswerValue) -> String {
    match value {
        AnswerValue::Index(i) => i.to_string(),
        AnswerValue::Indices(v) => v.iter().map(i64::to_string).collect::<Vec<_>>().join(", "),
        AnswerValue::Text(s) => s.trim().to_string(),
        AnswerValue::Texts(v) => v.join(", "),
    }
}

fn render_answer(key: &AnswerKey, answer: &AnswerValue) -> String {
    match (key, answer) {
        (
            AnswerKey::SingleCorrect(_)
            | AnswerKey::TrueFalse(_)
            | AnswerKey::Passage(_)
            | AnswerKey::Image(_),
            AnswerValue::Index(i),
        ) => option_text(key, *i),
        (AnswerKey::MultiCorrect(_), AnswerValue::Indices(v)) => {
            let unique: BTreeSet<i64> = v.iter().copied().collect();
            unique
                .into_iter()
                .map(|i| option_text(key, i))
                .collect::<Vec<_>>()
                .join(", ")
        }
        (AnswerKey::MatchPairs(m), AnswerValue::Texts(v)) => {
            let mut parts: Vec<String> = m
                .pairs
                .iter()
                .zip(v)
                .map(|(pair, guess)| format!("{}{}{}", pair.left, ARROW, guess.trim()))
                .collect();
            // Guesses beyond the last pair have no left side to attach to.
            parts.extend(v.iter().skip(m.pairs.len()).map(|g| g.trim().to_string()));
            parts.join(", ")
        }
        (AnswerKey::Reorder(_), AnswerValue::Texts(v)) => v
            .iter()
            .map(|s| s.trim())
            .collect::<Vec<_>>()
            .join(ARROW),
        _ => render_value(answer),
    }
}

fn render_key(question: &Question) -> String {
    let key = &question.key;
    if key.validate().is_err() {
        return "Answer key unavailable".to_string();
    }
    match key {
        AnswerKey::SingleCorrect(_)
        | AnswerKey::TrueFalse(_)
        | AnswerKey::Passage(_)
        | AnswerKey::Image(_) => key
            .choice()
            .and_then(|c| c.correct_index)
            .map(|i| option_text(key, i))
            .unwrap_or_default(),
        AnswerKey::MultiCorrect(m) => {
            let unique: BTreeSet<i64> = m.correct_indices.iter().copied().collect();
            unique
                .into_iter()
                .map(|i| option_text(key, i))
                .collect::<Vec<_>>()
                .join(", ")
        }
        AnswerKey::FillBlank(f) => f.accepted_answers.join(" / "),
        AnswerKey::MatchPairs(m) => m
            .pairs
            .iter()
            .map(|p| format!("{}{}{}", p.left, ARROW, p.right))
            .collect::<Vec<_>>()
            .join(", "),
        AnswerKey::Reorder(r) => r.correct_order.join(ARROW),
        AnswerKey::OpenResponse | AnswerKey::MediaResponse => "Manual review required".to_string(),
        AnswerKey::Unknown => "Not auto-gradable".to_string(),
        AnswerKey::Malformed => "Answer key unavailable".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::{
        grading::{EligibilityContext, Submission, grade_attempt},
        models::quiz::{Availability, MaxAttempts},
    };

    fn quiz() -> Quiz {
        Quiz {
            id: 3,
            title: "Mixed bag".into(),
            availability: Availability {
                is_active: true,
                available_from: None,
                available_to: None,
                available_to_everyone: true,
                batches: vec![],
                max_attempts: MaxAttempts::Unlimited,
            },
            layout: serde_json::from_value(json!({
                "questions": [
                    {
                        "questionType": "single_correct",
                        "questionText": "Pick C",
                        "options": ["A", "B", "C", "D"],
                        "correctIndex": 2,
                        "marks": 2,
                        "negativeMarks": 0.5,
                        "explanation": "C is third"
                    },
                    {
                        "questionType": "multi_correct",
                        "questionText": "Pick A and C",
                        "options": ["A", "B", "C"],
                        "correctIndices": [2, 0],
                        "marks": 2
                    },
                    {
                        "questionType": "match_pairs",
                        "questionText": "Match formulas",
                        "pairs": [
                            { "left": "H2O", "right": "Water" },
                            { "left": "NaCl", "right": "Salt" }
                        ],
                        "marks": 2
                    },
                    {
                        "questionType": "reorder",
                        "questionText": "Order the steps",
                        "correctOrder": ["mix", "bake", "cool"],
                        "marks": 1,
                        "negativeMarks": 1
                    },
                    {
                        "questionType": "open_response",
                        "questionText": "Why?",
                        "marks": 1
                    }
                ]
            }))
            .unwrap(),
        }
    }

    fn graded_attempt(answers: serde_json::Value) -> Attempt {
        let quiz = quiz();
        let ctx = EligibilityContext {
            now: Utc::now(),
            member_batches: HashSet::new(),
            prior_attempts: 0,
        };
        let graded = grade_attempt(
            &quiz,
            Submission {
                user_id: 11,
                answers: serde_json::from_value(answers).unwrap(),
                time_spent_seconds: 30,
            },
            &ctx,
        )
        .unwrap();
        Attempt { id: 99, graded }
    }

    #[test]
    fn test_report_agrees_with_grader() {
        let attempt = graded_attempt(json!({
            "0": 0,
            "1": [0, 2],
            "2": ["water", "Salt"],
            "3": ["bake", "mix", "cool"],
            "4": "Because"
        }));
        let report = project_report(&quiz(), &attempt);

        assert!(report.consistent);
        assert_eq!(report.recomputed_marks, attempt.graded.marks_obtained);
        // -0.5 + 2 + 2 - 1
        assert_eq!(report.marks_obtained, 2.5);
        assert_eq!(report.questions.len(), 5);

        let verdicts: Vec<_> = report.questions.iter().map(|q| q.verdict).collect();
        assert_eq!(
            verdicts,
            [
                Verdict::Incorrect,
                Verdict::Correct,
                Verdict::Correct,
                Verdict::Incorrect,
                Verdict::Ungraded
            ]
        );
        let awarded: Vec<_> = report.questions.iter().map(|q| q.marks_awarded).collect();
        assert_eq!(awarded, [-0.5, 2.0, 2.0, -1.0, 0.0]);
    }

    #[test]
    fn test_renders_answers_and_keys() {
        let attempt = graded_attempt(json!({
            "0": 0,
            "1": [2, 0, 2],
            "2": ["Water", "Sugar"],
            "3": ["mix", "bake", "cool"]
        }));
        let report = project_report(&quiz(), &attempt);
        let q = &report.questions;

        assert_eq!(q[0].learner_answer, "A");
        assert_eq!(q[0].correct_answer, "C");
        assert_eq!(q[0].explanation.as_deref(), Some("C is third"));
        assert_eq!(q[1].learner_answer, "A, C");
        assert_eq!(q[1].correct_answer, "A, C");
        assert_eq!(q[2].learner_answer, "H2O → Water, NaCl → Sugar");
        assert_eq!(q[2].correct_answer, "H2O → Water, NaCl → Salt");
        assert_eq!(q[3].learner_answer, "mix → bake → cool");
        assert_eq!(q[3].correct_answer, "mix → bake → cool");
        assert_eq!(q[4].learner_answer, NOT_ANSWERED);
        assert_eq!(q[4].correct_answer, "Manual review required");
        assert!(!q[4].attempted);
    }

    #[test]
    fn test_extra_match_guesses_are_shown() {
        let attempt = graded_attempt(json!({ "2": ["Water", "Salt", "Sugar"] }));
        let report = project_report(&quiz(), &attempt);
        let q = &report.questions[2];

        assert_eq!(q.verdict, Verdict::Incorrect);
        assert_eq!(q.learner_answer, "H2O → Water, NaCl → Salt, Sugar");
    }

    #[test]
    fn test_flags_tampered_attempt() {
        let mut attempt = graded_attempt(json!({ "0": 2 }));
        attempt.graded.marks_obtained = 9.0;

        let report = project_report(&quiz(), &attempt);
        assert!(!report.consistent);
        assert_eq!(report.marks_obtained, 9.0);
        assert_eq!(report.recomputed_marks, 2.0);
    }

    #[test]
    fn test_out_of_range_choice_is_labelled() {
        let attempt = graded_attempt(json!({ "0": 7 }));
        let report = project_report(&quiz(), &attempt);
        assert_eq!(report.questions[0].learner_answer, "Invalid option 7");
        assert!(!report.questions[0].correct);
    }
}
