// src/handlers/quiz.rs

use std::collections::HashSet;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use sqlx::{PgExecutor, PgPool, types::Json as SqlJson};
use validator::Validate;

use crate::{
    error::AppError,
    grading::{
        EligibilityContext, Submission, check_eligibility, eligibility::attempts_remaining,
        grade_attempt,
    },
    models::{
        attempt::{Attempt, AttemptRow, EligibilityResponse, GradedAttempt, SubmitAttemptRequest},
        quiz::{PublicQuiz, Quiz, QuizRow},
    },
    utils::jwt::Claims,
};

pub(crate) const ATTEMPT_COLUMNS: &str = "id, quiz_id, user_id, answers, correct_count, \
     incorrect_count, unattempted_count, ungraded_count, marks_obtained, total_marks, \
     percentage, result, time_spent_seconds, submitted_at";

/// Loads a quiz snapshot by id.
pub(crate) async fn fetch_quiz<'e, E>(executor: E, quiz_id: i64) -> Result<Quiz, AppError>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, QuizRow>(
        r#"
        SELECT
            id, title, is_active, available_from, available_to,
            available_to_everyone, batches, max_attempts, content
        FROM quizzes
        WHERE id = $1
        "#,
    )
    .bind(quiz_id)
    .fetch_optional(executor)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch quiz {}: {:?}", quiz_id, e);
        AppError::InternalServerError(e.to_string())
    })?
    .ok_or(AppError::NotFound("Quiz not found".to_string()))?;

    Ok(Quiz::from(row))
}

/// Audience groups the user belongs to. Membership itself is managed by the
/// batch service.
async fn fetch_member_batches<'e, E>(executor: E, user_id: i64) -> Result<HashSet<String>, AppError>
where
    E: PgExecutor<'e>,
{
    let batches = sqlx::query_scalar::<_, String>(
        "SELECT batch_id FROM batch_members WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_all(executor)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch batches for user {}: {:?}", user_id, e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(batches.into_iter().collect())
}

async fn count_prior_attempts<'e, E>(executor: E, quiz_id: i64, user_id: i64) -> Result<u32, AppError>
where
    E: PgExecutor<'e>,
{
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM quiz_attempts WHERE quiz_id = $1 AND user_id = $2",
    )
    .bind(quiz_id)
    .bind(user_id)
    .fetch_one(executor)
    .await?;

    Ok(u32::try_from(count).unwrap_or(u32::MAX))
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

async fn insert_attempt<'e, E>(executor: E, graded: &GradedAttempt) -> Result<Attempt, AppError>
where
    E: PgExecutor<'e>,
{
    let sql = format!(
        r#"
        INSERT INTO quiz_attempts (
            quiz_id, user_id, answers, correct_count, incorrect_count,
            unattempted_count, ungraded_count, marks_obtained, total_marks,
            percentage, result, time_spent_seconds, submitted_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        RETURNING {}
        "#,
        ATTEMPT_COLUMNS
    );

    let row = sqlx::query_as::<_, AttemptRow>(&sql)
        .bind(graded.quiz_id)
        .bind(graded.user_id)
        .bind(SqlJson(&graded.answers))
        .bind(to_i32(graded.correct_count))
        .bind(to_i32(graded.incorrect_count))
        .bind(to_i32(graded.unattempted_count))
        .bind(to_i32(graded.ungraded_count))
        .bind(graded.marks_obtained)
        .bind(graded.total_marks)
        .bind(graded.percentage)
        .bind(graded.result.as_str())
        .bind(to_i32(graded.time_spent_seconds))
        .bind(graded.submitted_at)
        .fetch_one(executor)
        .await
        .map_err(|e| {
            tracing::error!("Failed to insert attempt: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    Attempt::try_from(row)
}

/// Returns a quiz for answering, without its answer keys.
/// Inactive quizzes are visible to admins only.
pub async fn get_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = fetch_quiz(&pool, quiz_id).await?;

    if !quiz.availability.is_active && !claims.is_admin() {
        return Err(AppError::NotFound("Quiz not found".to_string()));
    }

    Ok(Json(PublicQuiz::from(&quiz)))
}

/// Tells the caller whether a submission would currently be accepted.
pub async fn check_quiz_eligibility(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let quiz = fetch_quiz(&pool, quiz_id).await?;
    let member_batches = fetch_member_batches(&pool, user_id).await?;
    let prior_attempts = count_prior_attempts(&pool, quiz_id, user_id).await?;

    let ctx = EligibilityContext {
        now: Utc::now(),
        member_batches,
        prior_attempts,
    };
    let verdict = check_eligibility(&quiz.availability, &ctx);

    Ok(Json(EligibilityResponse {
        eligible: verdict.is_ok(),
        code: verdict.as_ref().err().map(|e| e.code()),
        reason: verdict.err().map(|e| e.to_string()),
        attempts_used: prior_attempts,
        attempts_remaining: attempts_remaining(quiz.availability.max_attempts, prior_attempts),
    }))
}

/// Submits answers to a quiz and stores the graded attempt.
///
/// * Loads the quiz, the learner's batches and prior attempt count.
/// * Checks eligibility, then scores every question.
/// * Inserts the attempt; nothing is written when the submission is rejected.
pub async fn submit_attempt(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
    Json(req): Json<SubmitAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let user_id = claims.user_id()?;

    // Count and insert share a transaction. It does not serialize concurrent
    // submissions from the same learner.
    let mut tx = pool.begin().await?;

    let quiz = fetch_quiz(&mut *tx, quiz_id).await?;
    let member_batches = fetch_member_batches(&mut *tx, user_id).await?;
    let prior_attempts = count_prior_attempts(&mut *tx, quiz_id, user_id).await?;

    let ctx = EligibilityContext {
        now: Utc::now(),
        member_batches,
        prior_attempts,
    };
    let submission = Submission {
        user_id,
        answers: req.answers,
        time_spent_seconds: req.time_spent_seconds,
    };

    let graded = grade_attempt(&quiz, submission, &ctx).map_err(|e| {
        tracing::info!(quiz_id, user_id, reason = %e, "Attempt rejected");
        AppError::from(e)
    })?;

    let attempt = insert_attempt(&mut *tx, &graded).await?;
    tx.commit().await?;

    tracing::info!(
        quiz_id,
        user_id,
        attempt_id = attempt.id,
        marks = attempt.graded.marks_obtained,
        result = attempt.graded.result.as_str(),
        "Attempt graded"
    );

    Ok((StatusCode::CREATED, Json(attempt)))
}

/// Lists the caller's attempts at a quiz, newest first.
pub async fn list_my_attempts(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let sql = format!(
        "SELECT {} FROM quiz_attempts WHERE quiz_id = $1 AND user_id = $2 \
         ORDER BY submitted_at DESC, id DESC",
        ATTEMPT_COLUMNS
    );
    let rows = sqlx::query_as::<_, AttemptRow>(&sql)
        .bind(quiz_id)
        .bind(user_id)
        .fetch_all(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list attempts: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    let attempts = rows
        .into_iter()
        .map(Attempt::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(attempts))
}
