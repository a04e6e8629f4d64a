// src/handlers/admin.rs

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use sqlx::{PgPool, types::Json as SqlJson};
use validator::Validate;

use crate::{error::AppError, models::quiz::CreateQuizRequest};

/// Creates a new quiz.
/// Admin only. Every answer key must be consistent with its question type.
pub async fn create_quiz(
    State(pool): State<PgPool>,
    Json(mut payload): Json<CreateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let mut layout = payload
        .take_layout()
        .ok_or(AppError::BadRequest("Provide either questions or sections".to_string()))?;
    layout.sanitize();
    let question_count = layout.question_count();

    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO quizzes (
            title, is_active, available_from, available_to,
            available_to_everyone, batches, max_attempts, content
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id
        "#,
    )
    .bind(&payload.title)
    .bind(payload.is_active)
    .bind(payload.available_from)
    .bind(payload.available_to)
    .bind(payload.available_to_everyone)
    .bind(SqlJson(&payload.batches))
    .bind(i32::from(payload.max_attempts))
    .bind(SqlJson(&layout))
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create quiz: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    tracing::info!(quiz_id = id, question_count, "Quiz created");

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}
