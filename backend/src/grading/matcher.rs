// src/grading/matcher.rs

//! Per-variant answer matching.
//!
//! Every function here is pure. Text comparisons ignore surrounding
//! whitespace and letter case.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::models::{
    attempt::AnswerValue,
    question::{AnswerKey, ChoiceKey, FillBlankKey, MatchPairsKey, MultiChoiceKey, Question, ReorderKey},
};

/// Outcome of matching one answer against one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Unattempted,
    Correct,
    Incorrect,
    /// Answered, but the engine cannot decide correctness.
    Ungraded,
}

impl Verdict {
    pub fn attempted(self) -> bool {
        !matches!(self, Verdict::Unattempted)
    }

    pub fn correct(self) -> bool {
        matches!(self, Verdict::Correct)
    }

    fn from_match(is_correct: bool) -> Self {
        if is_correct {
            Verdict::Correct
        } else {
            Verdict::Incorrect
        }
    }
}

/// Signed mark change a verdict produces for a question.
pub fn mark_delta(question: &Question, verdict: Verdict) -> f64 {
    match verdict {
        Verdict::Correct => question.marks,
        Verdict::Incorrect => -question.negative_marks,
        Verdict::Unattempted | Verdict::Ungraded => 0.0,
    }
}

/// Matches a submitted answer against a question's key.
///
/// A question whose key is inconsistent counts as unattempted whatever was
/// submitted. Variants the engine does not score, and answers whose shape
/// does not suit the variant, come back as `Ungraded` so they are never
/// penalised.
pub fn evaluate(key: &AnswerKey, answer: Option<&AnswerValue>) -> Verdict {
    let Some(answer) = answer else {
        return Verdict::Unattempted;
    };
    if key.validate().is_err() {
        return Verdict::Unattempted;
    }

    let matched = match key {
        AnswerKey::SingleCorrect(c) | AnswerKey::TrueFalse(c) => {
            answer.as_index().map(|i| match_choice(c, i))
        }
        AnswerKey::Passage(p) => answer.as_index().map(|i| match_choice(&p.choice, i)),
        AnswerKey::Image(img) => answer.as_index().map(|i| match_choice(&img.choice, i)),
        AnswerKey::MultiCorrect(m) => answer.as_indices().map(|v| match_multi(m, v)),
        AnswerKey::FillBlank(f) => answer.as_text().map(|s| match_fill_blank(f, s)),
        AnswerKey::MatchPairs(m) => answer.as_texts().map(|v| match_pairs(m, v)),
        AnswerKey::Reorder(r) => answer.as_texts().map(|v| match_reorder(r, v)),
        AnswerKey::OpenResponse
        | AnswerKey::MediaResponse
        | AnswerKey::Malformed
        | AnswerKey::Unknown => None,
    };

    matched.map_or(Verdict::Ungraded, Verdict::from_match)
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

fn same_text(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

fn same_sequence(submitted: &[String], expected: impl ExactSizeIterator<Item = impl AsRef<str>>) -> bool {
    submitted.len() == expected.len()
        && submitted
            .iter()
            .zip(expected)
            .all(|(got, want)| same_text(got, want.as_ref()))
}

pub fn match_choice(key: &ChoiceKey, submitted: i64) -> bool {
    key.correct_index == Some(submitted)
}

/// Set equality after removing duplicates. No partial credit.
pub fn match_multi(key: &MultiChoiceKey, submitted: &[i64]) -> bool {
    let expected: BTreeSet<i64> = key.correct_indices.iter().copied().collect();
    let given: BTreeSet<i64> = submitted.iter().copied().collect();
    expected == given
}

pub fn match_fill_blank(key: &FillBlankKey, submitted: &str) -> bool {
    key.accepted_answers.iter().any(|a| same_text(a, submitted))
}

/// Every position must hold that pair's right-hand side.
pub fn match_pairs(key: &MatchPairsKey, submitted: &[String]) -> bool {
    same_sequence(submitted, key.pairs.iter().map(|p| p.right.as_str()))
}

pub fn match_reorder(key: &ReorderKey, submitted: &[String]) -> bool {
    same_sequence(submitted, key.correct_order.iter())
}
