// src/models/quiz.rs

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use url::Url;
use validator::{Validate, ValidationError};

use crate::{
    config::UNLIMITED_ATTEMPTS,
    models::question::{AnswerKey, Question},
};

/// Ceiling on the number of attempts a learner may submit to a quiz.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum MaxAttempts {
    #[default]
    Unlimited,
    Limited(u32),
}

impl From<i32> for MaxAttempts {
    fn from(value: i32) -> Self {
        match u32::try_from(value) {
            Ok(n) if n > 0 => MaxAttempts::Limited(n),
            _ => MaxAttempts::Unlimited,
        }
    }
}

impl From<MaxAttempts> for i32 {
    fn from(value: MaxAttempts) -> Self {
        match value {
            MaxAttempts::Unlimited => UNLIMITED_ATTEMPTS,
            MaxAttempts::Limited(n) => i32::try_from(n).unwrap_or(i32::MAX),
        }
    }
}

/// Settings deciding who may submit an attempt, and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub is_active: bool,
    pub available_from: Option<DateTime<Utc>>,
    pub available_to: Option<DateTime<Utc>>,
    pub available_to_everyone: bool,
    /// Audience group ids; consulted only when `available_to_everyone` is false.
    pub batches: Vec<String>,
    pub max_attempts: MaxAttempts,
}

/// A titled group of questions inside a sectioned quiz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub questions: Vec<Question>,
}

/// The two mutually exclusive ways a quiz arranges its questions.
///
/// Serialized as either `{"questions": [...]}` or `{"sections": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QuizLayout {
    Questions(Vec<Question>),
    Sections(Vec<Section>),
}

/// A question together with its position in the flattened quiz.
/// `index` is the key submitted answers are joined on.
#[derive(Debug, Clone, Copy)]
pub struct FlatQuestion<'a> {
    pub index: usize,
    pub section: Option<&'a str>,
    pub question: &'a Question,
}

impl QuizLayout {
    /// Lists every question in order, sections concatenated.
    pub fn flatten(&self) -> Vec<FlatQuestion<'_>> {
        match self {
            QuizLayout::Questions(questions) => questions
                .iter()
                .enumerate()
                .map(|(index, question)| FlatQuestion {
                    index,
                    section: None,
                    question,
                })
                .collect(),
            QuizLayout::Sections(sections) => sections
                .iter()
                .flat_map(|s| s.questions.iter().map(move |q| (Some(s.title.as_str()), q)))
                .enumerate()
                .map(|(index, (section, question))| FlatQuestion {
                    index,
                    section,
                    question,
                })
                .collect(),
        }
    }

    pub fn question_count(&self) -> usize {
        match self {
            QuizLayout::Questions(questions) => questions.len(),
            QuizLayout::Sections(sections) => sections.iter().map(|s| s.questions.len()).sum(),
        }
    }

    fn questions_mut(&mut self) -> Box<dyn Iterator<Item = &mut Question> + '_> {
        match self {
            QuizLayout::Questions(questions) => Box::new(questions.iter_mut()),
            QuizLayout::Sections(sections) => {
                Box::new(sections.iter_mut().flat_map(|s| s.questions.iter_mut()))
            }
        }
    }

    /// Strips unsafe markup from display text. Answer keys are left untouched
    /// since learners' answers are compared against them verbatim.
    pub fn sanitize(&mut self) {
        use crate::utils::html::{clean_all, clean_html};

        if let QuizLayout::Sections(sections) = self {
            for section in sections.iter_mut() {
                section.title = clean_html(&section.title);
            }
        }
        for question in self.questions_mut() {
            question.question_text = clean_html(&question.question_text);
            if let Some(explanation) = &question.explanation {
                question.explanation = Some(clean_html(explanation));
            }
            match &mut question.key {
                AnswerKey::SingleCorrect(c) | AnswerKey::TrueFalse(c) => clean_all(&mut c.options),
                AnswerKey::MultiCorrect(m) => clean_all(&mut m.options),
                AnswerKey::Passage(p) => {
                    p.passage = clean_html(&p.passage);
                    clean_all(&mut p.choice.options);
                }
                AnswerKey::Image(i) => clean_all(&mut i.choice.options),
                _ => {}
            }
        }
    }
}

/// A quiz snapshot as consumed by the grading engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub id: i64,
    pub title: String,
    #[serde(flatten)]
    pub availability: Availability,
    #[serde(flatten)]
    pub layout: QuizLayout,
}

/// Represents the 'quizzes' table in the database.
#[derive(Debug, Clone, FromRow)]
pub struct QuizRow {
    pub id: i64,
    pub title: String,
    pub is_active: bool,
    pub available_from: Option<DateTime<Utc>>,
    pub available_to: Option<DateTime<Utc>>,
    pub available_to_everyone: bool,
    pub batches: Json<Vec<String>>,
    pub max_attempts: i32,
    /// Question layout, stored as JSONB.
    pub content: Json<QuizLayout>,
}

impl From<QuizRow> for Quiz {
    fn from(row: QuizRow) -> Self {
        Quiz {
            id: row.id,
            title: row.title,
            availability: Availability {
                is_active: row.is_active,
                available_from: row.available_from,
                available_to: row.available_to,
                available_to_everyone: row.available_to_everyone,
                batches: row.batches.0,
                max_attempts: MaxAttempts::from(row.max_attempts),
            },
            layout: row.content.0,
        }
    }
}

/// Question as shown to a learner: everything needed to answer, no key.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub question_type: &'static str,
    pub question_text: String,
    pub marks: f64,
    pub negative_marks: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    /// Left-hand prompts of a match-pairs question, in order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub prompts: Vec<String>,
    /// Candidate items for match-pairs and reorder questions, sorted so the
    /// stored order does not leak the key.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl PublicQuestion {
    fn from_flat(flat: &FlatQuestion<'_>) -> Self {
        let q = flat.question;
        let mut public = PublicQuestion {
            index: flat.index,
            section: flat.section.map(str::to_owned),
            question_type: q.key.type_name(),
            question_text: q.question_text.clone(),
            marks: q.marks,
            negative_marks: q.negative_marks,
            options: Vec::new(),
            prompts: Vec::new(),
            items: Vec::new(),
            passage: None,
            image_url: None,
        };

        match &q.key {
            AnswerKey::SingleCorrect(c) => public.options = c.options.clone(),
            AnswerKey::TrueFalse(_) => {
                public.options = (0..)
                    .map_while(|i| q.key.option_label(i))
                    .map(str::to_owned)
                    .collect();
            }
            AnswerKey::MultiCorrect(m) => public.options = m.options.clone(),
            AnswerKey::MatchPairs(m) => {
                public.prompts = m.pairs.iter().map(|p| p.left.clone()).collect();
                public.items = m.pairs.iter().map(|p| p.right.clone()).collect();
                public.items.sort();
            }
            AnswerKey::Reorder(r) => {
                public.items = r.correct_order.clone();
                public.items.sort();
            }
            AnswerKey::Passage(p) => {
                public.options = p.choice.options.clone();
                public.passage = Some(p.passage.clone());
            }
            AnswerKey::Image(i) => {
                public.options = i.choice.options.clone();
                public.image_url = Some(i.image_url.clone());
            }
            AnswerKey::FillBlank(_)
            | AnswerKey::OpenResponse
            | AnswerKey::MediaResponse
            | AnswerKey::Malformed
            | AnswerKey::Unknown => {}
        }

        public
    }
}

/// DTO for sending a quiz to a learner (excludes answer keys).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuiz {
    pub id: i64,
    pub title: String,
    pub available_from: Option<DateTime<Utc>>,
    pub available_to: Option<DateTime<Utc>>,
    pub max_attempts: MaxAttempts,
    pub total_marks: f64,
    pub questions: Vec<PublicQuestion>,
}

impl From<&Quiz> for PublicQuiz {
    fn from(quiz: &Quiz) -> Self {
        let flat = quiz.layout.flatten();
        PublicQuiz {
            id: quiz.id,
            title: quiz.title.clone(),
            available_from: quiz.availability.available_from,
            available_to: quiz.availability.available_to,
            max_attempts: quiz.availability.max_attempts,
            total_marks: flat.iter().map(|f| f.question.marks).sum(),
            questions: flat.iter().map(PublicQuestion::from_flat).collect(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// DTO for authoring a new quiz.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = validate_request))]
pub struct CreateQuizRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub available_from: Option<DateTime<Utc>>,
    pub available_to: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub available_to_everyone: bool,
    #[serde(default)]
    #[validate(custom(function = validate_batches))]
    pub batches: Vec<String>,
    #[serde(default)]
    pub max_attempts: MaxAttempts,
    /// Flat layout. Exactly one of `questions` and `sections` is set.
    #[serde(default)]
    pub questions: Option<Vec<Question>>,
    #[serde(default)]
    pub sections: Option<Vec<Section>>,
}

impl CreateQuizRequest {
    /// Moves the authored layout out of the request. `None` when both or
    /// neither layout is present.
    pub fn take_layout(&mut self) -> Option<QuizLayout> {
        match (self.questions.take(), self.sections.take()) {
            (Some(questions), None) => Some(QuizLayout::Questions(questions)),
            (None, Some(sections)) => Some(QuizLayout::Sections(sections)),
            _ => None,
        }
    }
}

fn invalid(code: &'static str, message: impl Into<Cow<'static, str>>) -> ValidationError {
    ValidationError::new(code).with_message(message.into())
}

fn validate_request(req: &CreateQuizRequest) -> Result<(), ValidationError> {
    validate_window_and_audience(req)?;
    validate_layout(req)
}

fn validate_window_and_audience(req: &CreateQuizRequest) -> Result<(), ValidationError> {
    if let (Some(from), Some(to)) = (req.available_from, req.available_to) {
        if from > to {
            return Err(invalid(
                "window_inverted",
                "availableFrom must not be after availableTo",
            ));
        }
    }
    if !req.available_to_everyone && req.batches.is_empty() {
        return Err(invalid(
            "no_audience",
            "batches must be set when the quiz is not available to everyone",
        ));
    }
    Ok(())
}

fn validate_batches(batches: &[String]) -> Result<(), ValidationError> {
    for batch in batches {
        if batch.trim().is_empty() || batch.len() > 100 {
            return Err(ValidationError::new("invalid_batch_id"));
        }
    }
    Ok(())
}

fn validate_question(position: usize, q: &Question) -> Result<(), ValidationError> {
    if q.question_text.trim().is_empty() || q.question_text.len() > 5000 {
        return Err(invalid(
            "question_text",
            format!("question {position}: text must be 1 to 5000 characters"),
        ));
    }
    if !(q.marks.is_finite() && q.marks >= 0.0) {
        return Err(invalid(
            "marks",
            format!("question {position}: marks must be a non-negative number"),
        ));
    }
    if !(q.negative_marks.is_finite() && q.negative_marks >= 0.0) {
        return Err(invalid(
            "negative_marks",
            format!("question {position}: negativeMarks must be a non-negative number"),
        ));
    }
    if q.key == AnswerKey::Unknown {
        return Err(invalid(
            "question_type",
            format!("question {position}: unsupported questionType"),
        ));
    }
    if let Err(issue) = q.key.validate() {
        return Err(invalid("answer_key", format!("question {position}: {issue}")));
    }
    match &q.key {
        AnswerKey::Passage(p) if p.passage.trim().is_empty() => Err(invalid(
            "passage",
            format!("question {position}: passage must not be empty"),
        )),
        AnswerKey::Image(i) if Url::parse(&i.image_url).is_err() => Err(invalid(
            "image_url",
            format!("question {position}: imageUrl must be a valid URL"),
        )),
        _ => Ok(()),
    }
}

fn validate_layout(req: &CreateQuizRequest) -> Result<(), ValidationError> {
    let questions: Vec<&Question> = match (&req.questions, &req.sections) {
        (Some(_), Some(_)) => {
            return Err(invalid(
                "layout_conflict",
                "provide either questions or sections, not both",
            ));
        }
        (None, None) => {
            return Err(invalid("no_layout", "questions or sections must be provided"));
        }
        (Some(questions), None) => questions.iter().collect(),
        (None, Some(sections)) => {
            if sections.iter().any(|s| s.title.trim().is_empty()) {
                return Err(invalid("section_title", "section titles must not be empty"));
            }
            sections.iter().flat_map(|s| &s.questions).collect()
        }
    };

    if questions.is_empty() {
        return Err(invalid("no_questions", "quiz must contain at least one question"));
    }
    questions
        .into_iter()
        .enumerate()
        .try_for_each(|(index, q)| validate_question(index, q))
}
