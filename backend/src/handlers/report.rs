// src/handlers/report.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use sqlx::PgPool;

use crate::{
    error::AppError,
    grading::project_report,
    handlers::quiz::{ATTEMPT_COLUMNS, fetch_quiz},
    models::attempt::{Attempt, AttemptRow},
    utils::jwt::Claims,
};

/// Explains a stored attempt question by question.
/// Visible to the learner who made it and to admins.
pub async fn get_attempt_report(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let sql = format!("SELECT {} FROM quiz_attempts WHERE id = $1", ATTEMPT_COLUMNS);
    let row = sqlx::query_as::<_, AttemptRow>(&sql)
        .bind(attempt_id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Attempt not found".to_string()))?;
    let attempt = Attempt::try_from(row)?;

    if attempt.graded.user_id != user_id && !claims.is_admin() {
        return Err(AppError::Forbidden(
            "You can only view reports for your own attempts".to_string(),
        ));
    }

    let quiz = fetch_quiz(&pool, attempt.graded.quiz_id).await?;

    Ok(Json(project_report(&quiz, &attempt)))
}
