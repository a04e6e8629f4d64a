// src/models/question.rs

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Labels used for a true/false question authored without explicit options.
const TRUE_FALSE_LABELS: [&str; 2] = ["True", "False"];

/// A single question embedded in a quiz.
///
/// The answer key lives in `key`, a tagged union discriminated by the
/// `questionType` JSON field. Only the fields of the active variant exist.
///
/// A key that does not decode becomes `AnswerKey::Malformed` instead of
/// failing the whole quiz, so the other questions stay gradable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawQuestion")]
pub struct Question {
    pub question_text: String,

    /// Awarded on full correctness.
    #[serde(default)]
    pub marks: f64,

    /// Subtracted on an attempted-but-incorrect answer.
    #[serde(default)]
    pub negative_marks: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,

    #[serde(flatten)]
    pub key: AnswerKey,
}

/// The closed set of question variants with their answer keys.
///
/// Key fields default to empty when missing so that a malformed stored
/// question still loads; `AnswerKey::validate` reports the inconsistency and
/// the grader treats such a question as ungradable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "questionType", rename_all = "snake_case")]
pub enum AnswerKey {
    SingleCorrect(ChoiceKey),
    TrueFalse(ChoiceKey),
    MultiCorrect(MultiChoiceKey),
    FillBlank(FillBlankKey),
    MatchPairs(MatchPairsKey),
    Reorder(ReorderKey),
    Passage(PassageKey),
    Image(ImageKey),
    /// Free-text answer reviewed by a person.
    OpenResponse,
    /// Audio/video/file answer reviewed by a person.
    MediaResponse,
    /// A stored key that could not be decoded (missing `questionType`,
    /// wrongly typed fields). Never accepted at authoring time.
    #[serde(skip_deserializing)]
    Malformed,
    /// A type name this build does not know about.
    #[serde(other)]
    Unknown,
}

/// Wire form of a question before its key is decoded.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQuestion {
    question_text: String,
    #[serde(default)]
    marks: f64,
    #[serde(default)]
    negative_marks: f64,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(flatten)]
    key: Map<String, Value>,
}

impl From<RawQuestion> for Question {
    fn from(raw: RawQuestion) -> Self {
        let key = AnswerKey::deserialize(Value::Object(raw.key)).unwrap_or_else(|e| {
            tracing::warn!("Unreadable answer key: {}", e);
            AnswerKey::Malformed
        });

        Question {
            question_text: raw.question_text,
            marks: raw.marks,
            negative_marks: raw.negative_marks,
            explanation: raw.explanation,
            key,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceKey {
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub correct_index: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiChoiceKey {
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub correct_indices: Vec<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillBlankKey {
    #[serde(default)]
    pub accepted_answers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchPair {
    pub left: String,
    pub right: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchPairsKey {
    #[serde(default)]
    pub pairs: Vec<MatchPair>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderKey {
    #[serde(default)]
    pub correct_order: Vec<String>,
}

/// Single-correct choice asked about a reading passage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PassageKey {
    #[serde(default)]
    pub passage: String,
    #[serde(flatten)]
    pub choice: ChoiceKey,
}

/// Single-correct choice asked about an image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageKey {
    #[serde(default)]
    pub image_url: String,
    #[serde(flatten)]
    pub choice: ChoiceKey,
}

/// Shape a submitted answer must have for a given variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerShape {
    Index,
    IndexSet,
    Text,
    TextSequence,
}

impl std::fmt::Display for AnswerShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            AnswerShape::Index => "an option index",
            AnswerShape::IndexSet => "a list of option indices",
            AnswerShape::Text => "a text answer",
            AnswerShape::TextSequence => "a list of text answers",
        };
        f.write_str(text)
    }
}

/// Reasons an answer key cannot be graded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyIssue {
    #[error("question has no options")]
    NoOptions,
    #[error("correct option is not set")]
    MissingCorrectIndex,
    #[error("correct option {index} is outside the {count} available options")]
    IndexOutOfRange { index: i64, count: usize },
    #[error("no correct options are set")]
    NoCorrectIndices,
    #[error("no accepted answers are set")]
    NoAcceptedAnswers,
    #[error("no pairs are set")]
    NoPairs,
    #[error("no order is set")]
    NoOrder,
    #[error("answer key contains a blank entry")]
    BlankEntry,
    #[error("answer key could not be read")]
    Unreadable,
}

impl ChoiceKey {
    /// Number of selectable options. A true/false question authored without
    /// options still offers two.
    fn option_count(&self, true_false: bool) -> usize {
        if true_false && self.options.is_empty() {
            TRUE_FALSE_LABELS.len()
        } else {
            self.options.len()
        }
    }

    fn label(&self, index: i64, true_false: bool) -> Option<&str> {
        let index = usize::try_from(index).ok()?;
        if true_false && self.options.is_empty() {
            return TRUE_FALSE_LABELS.get(index).copied();
        }
        self.options.get(index).map(String::as_str)
    }

    fn validate(&self, true_false: bool) -> Result<(), KeyIssue> {
        let count = self.option_count(true_false);
        if count == 0 {
            return Err(KeyIssue::NoOptions);
        }
        let index = self.correct_index.ok_or(KeyIssue::MissingCorrectIndex)?;
        check_index(index, count)
    }
}

fn check_index(index: i64, count: usize) -> Result<(), KeyIssue> {
    match usize::try_from(index) {
        Ok(i) if i < count => Ok(()),
        _ => Err(KeyIssue::IndexOutOfRange { index, count }),
    }
}

fn check_entries<'a>(entries: impl IntoIterator<Item = &'a String>) -> Result<(), KeyIssue> {
    if entries.into_iter().any(|e| e.trim().is_empty()) {
        return Err(KeyIssue::BlankEntry);
    }
    Ok(())
}

impl AnswerKey {
    /// Wire name of the variant.
    pub fn type_name(&self) -> &'static str {
        match self {
            AnswerKey::SingleCorrect(_) => "single_correct",
            AnswerKey::TrueFalse(_) => "true_false",
            AnswerKey::MultiCorrect(_) => "multi_correct",
            AnswerKey::FillBlank(_) => "fill_blank",
            AnswerKey::MatchPairs(_) => "match_pairs",
            AnswerKey::Reorder(_) => "reorder",
            AnswerKey::Passage(_) => "passage",
            AnswerKey::Image(_) => "image",
            AnswerKey::OpenResponse => "open_response",
            AnswerKey::MediaResponse => "media_response",
            AnswerKey::Malformed => "malformed",
            AnswerKey::Unknown => "unknown",
        }
    }

    /// Whether this variant is scored by the engine at all.
    pub fn is_auto_gradable(&self) -> bool {
        !matches!(
            self,
            AnswerKey::OpenResponse | AnswerKey::MediaResponse | AnswerKey::Unknown
        )
    }

    /// The answer shape this variant expects, or `None` for variants the
    /// engine does not score (any shape is accepted for those).
    pub fn expected_shape(&self) -> Option<AnswerShape> {
        match self {
            AnswerKey::SingleCorrect(_)
            | AnswerKey::TrueFalse(_)
            | AnswerKey::Passage(_)
            | AnswerKey::Image(_) => Some(AnswerShape::Index),
            AnswerKey::MultiCorrect(_) => Some(AnswerShape::IndexSet),
            AnswerKey::FillBlank(_) => Some(AnswerShape::Text),
            AnswerKey::MatchPairs(_) | AnswerKey::Reorder(_) => Some(AnswerShape::TextSequence),
            AnswerKey::OpenResponse
            | AnswerKey::MediaResponse
            | AnswerKey::Malformed
            | AnswerKey::Unknown => None,
        }
    }

    /// The single-correct key shared by the index-answered variants.
    pub fn choice(&self) -> Option<&ChoiceKey> {
        match self {
            AnswerKey::SingleCorrect(c) | AnswerKey::TrueFalse(c) => Some(c),
            AnswerKey::Passage(p) => Some(&p.choice),
            AnswerKey::Image(i) => Some(&i.choice),
            _ => None,
        }
    }

    /// Resolves an option index to its text for the choice variants.
    pub fn option_label(&self, index: i64) -> Option<&str> {
        let true_false = matches!(self, AnswerKey::TrueFalse(_));
        match self {
            AnswerKey::MultiCorrect(m) => usize::try_from(index)
                .ok()
                .and_then(|i| m.options.get(i))
                .map(String::as_str),
            _ => self.choice()?.label(index, true_false),
        }
    }

    /// Checks that the key is internally consistent with its variant.
    ///
    /// Variants the engine does not score are always consistent.
    pub fn validate(&self) -> Result<(), KeyIssue> {
        match self {
            AnswerKey::SingleCorrect(c) => c.validate(false),
            AnswerKey::TrueFalse(c) => c.validate(true),
            AnswerKey::Passage(p) => p.choice.validate(false),
            AnswerKey::Image(i) => i.choice.validate(false),
            AnswerKey::MultiCorrect(m) => {
                if m.options.is_empty() {
                    return Err(KeyIssue::NoOptions);
                }
                if m.correct_indices.is_empty() {
                    return Err(KeyIssue::NoCorrectIndices);
                }
                m.correct_indices
                    .iter()
                    .try_for_each(|&i| check_index(i, m.options.len()))
            }
            AnswerKey::FillBlank(f) => {
                if f.accepted_answers.is_empty() {
                    return Err(KeyIssue::NoAcceptedAnswers);
                }
                check_entries(&f.accepted_answers)
            }
            AnswerKey::MatchPairs(m) => {
                if m.pairs.is_empty() {
                    return Err(KeyIssue::NoPairs);
                }
                check_entries(m.pairs.iter().flat_map(|p| [&p.left, &p.right]))
            }
            AnswerKey::Reorder(r) => {
                if r.correct_order.is_empty() {
                    return Err(KeyIssue::NoOrder);
                }
                check_entries(&r.correct_order)
            }
            AnswerKey::Malformed => Err(KeyIssue::Unreadable),
            AnswerKey::OpenResponse | AnswerKey::MediaResponse | AnswerKey::Unknown => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Question {
        serde_json::from_value(value).expect("question should deserialize")
    }

    #[test]
    fn test_single_correct_deserializes() {
        let q = parse(json!({
            "questionType": "single_correct",
            "questionText": "Pick C",
            "options": ["A", "B", "C", "D"],
            "correctIndex": 2,
            "marks": 2,
            "negativeMarks": 0.5
        }));

        assert_eq!(q.marks, 2.0);
        assert_eq!(q.negative_marks, 0.5);
        assert_eq!(
            q.key,
            AnswerKey::SingleCorrect(ChoiceKey {
                options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
                correct_index: Some(2),
            })
        );
        assert_eq!(q.key.validate(), Ok(()));
        assert_eq!(q.key.option_label(2), Some("C"));
    }

    #[test]
    fn test_passage_and_image_carry_choice_fields() {
        let q = parse(json!({
            "questionType": "passage",
            "questionText": "Main idea?",
            "passage": "Once upon a time...",
            "options": ["x", "y"],
            "correctIndex": 1
        }));
        assert_eq!(q.key.choice().and_then(|c| c.correct_index), Some(1));
        assert_eq!(q.key.expected_shape(), Some(AnswerShape::Index));

        let q = parse(json!({
            "questionType": "image",
            "questionText": "What is shown?",
            "imageUrl": "https://cdn.example.com/a.png",
            "options": ["cat", "dog"],
            "correctIndex": 0
        }));
        match &q.key {
            AnswerKey::Image(i) => assert_eq!(i.image_url, "https://cdn.example.com/a.png"),
            other => panic!("unexpected variant {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_still_loads() {
        let q = parse(json!({
            "questionType": "hotspot_v2",
            "questionText": "Click the valve",
            "marks": 3
        }));
        assert_eq!(q.key, AnswerKey::Unknown);
        assert!(!q.key.is_auto_gradable());
        assert_eq!(q.key.validate(), Ok(()));
    }

    #[test]
    fn test_undecodable_key_becomes_malformed() {
        let q = parse(json!({
            "questionType": "single_correct",
            "questionText": "Typed wrong",
            "options": ["A", "B"],
            "correctIndex": "1",
            "marks": 2
        }));
        assert_eq!(q.key, AnswerKey::Malformed);
        assert_eq!(q.marks, 2.0);
        assert_eq!(q.key.validate(), Err(KeyIssue::Unreadable));
        assert_eq!(q.key.expected_shape(), None);

        let q = parse(json!({ "questionText": "No type" }));
        assert_eq!(q.key, AnswerKey::Malformed);
    }

    #[test]
    fn test_open_response_ignores_extra_fields() {
        let q = parse(json!({
            "questionType": "open_response",
            "questionText": "Explain",
            "wordLimit": 200
        }));
        assert_eq!(q.key, AnswerKey::OpenResponse);
        assert_eq!(q.key.expected_shape(), None);
    }

    #[test]
    fn test_missing_key_fields_load_but_fail_validation() {
        let q = parse(json!({
            "questionType": "single_correct",
            "questionText": "No key",
            "options": ["A", "B"]
        }));
        assert_eq!(q.key.validate(), Err(KeyIssue::MissingCorrectIndex));

        let q = parse(json!({
            "questionType": "multi_correct",
            "questionText": "Bad key",
            "options": ["A", "B"],
            "correctIndices": [0, 5]
        }));
        assert_eq!(
            q.key.validate(),
            Err(KeyIssue::IndexOutOfRange { index: 5, count: 2 })
        );

        let q = parse(json!({
            "questionType": "fill_blank",
            "questionText": "Empty"
        }));
        assert_eq!(q.key.validate(), Err(KeyIssue::NoAcceptedAnswers));
    }

    #[test]
    fn test_true_false_defaults_labels() {
        let q = parse(json!({
            "questionType": "true_false",
            "questionText": "Water is wet",
            "correctIndex": 0
        }));
        assert_eq!(q.key.validate(), Ok(()));
        assert_eq!(q.key.option_label(0), Some("True"));
        assert_eq!(q.key.option_label(1), Some("False"));
        assert_eq!(q.key.option_label(2), None);
    }

    #[test]
    fn test_negative_correct_index_is_out_of_range() {
        let key = AnswerKey::SingleCorrect(ChoiceKey {
            options: vec!["A".into()],
            correct_index: Some(-1),
        });
        assert_eq!(
            key.validate(),
            Err(KeyIssue::IndexOutOfRange { index: -1, count: 1 })
        );
    }

    #[test]
    fn test_blank_reorder_entry_rejected() {
        let key = AnswerKey::Reorder(ReorderKey {
            correct_order: vec!["mix".into(), "  ".into()],
        });
        assert_eq!(key.validate(), Err(KeyIssue::BlankEntry));
    }

    #[test]
    fn test_serializes_with_type_tag() {
        let q = Question {
            question_text: "Order".into(),
            marks: 1.0,
            negative_marks: 0.0,
            explanation: None,
            key: AnswerKey::Reorder(ReorderKey {
                correct_order: vec!["a".into(), "b".into()],
            }),
        };
        let value = serde_json::to_value(&q).unwrap();
        assert_eq!(value["questionType"], "reorder");
        assert_eq!(value["correctOrder"], json!(["a", "b"]));
        assert!(value.get("explanation").is_none());
    }
}
