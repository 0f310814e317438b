// src/handlers/admin.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    attempts,
    catalog::{QuizCatalog, QuizDocument},
    config::Config,
    error::AppError,
    mailer::{self, MailTransport},
    models::{
        quiz::Quiz,
        result::SubmissionEntry,
        settings::UpdateSettingsRequest,
        user::User,
    },
    settings,
    utils::{jwt::Claims, password::hash_password},
};

/// Creates a quiz from an uploaded document.
///
/// Validates the document shape, writes it to the data directory, inserts the
/// quiz row, and announces the quiz to students on a background task.
pub async fn create_quiz(
    State(pool): State<SqlitePool>,
    State(catalog): State<QuizCatalog>,
    State(transport): State<Arc<dyn MailTransport>>,
    State(config): State<Config>,
    Json(doc): Json<QuizDocument>,
) -> Result<impl IntoResponse, AppError> {
    let filename = catalog.store_document(&doc)?;

    let inserted = sqlx::query_as::<_, Quiz>(
        r#"
        INSERT INTO quizzes (title, filename, created_at)
        VALUES (?, ?, ?)
        RETURNING id, title, filename, created_at
        "#,
    )
    .bind(&doc.title)
    .bind(&filename)
    .bind(chrono::Utc::now())
    .fetch_one(&pool)
    .await;

    let quiz = match inserted {
        Ok(quiz) => quiz,
        Err(e) => {
            // Don't leave the document orphaned on disk without a row.
            catalog.remove_document(&filename);
            tracing::error!("Failed to create quiz: {:?}", e);
            return Err(AppError::InternalServerError(e.to_string()));
        }
    };

    // Ids can be reused after a delete-all; make sure no stale document is
    // served for this id.
    catalog.invalidate(quiz.id);

    let max_attempts = settings::get_or_create(&pool).await?.max_attempts;
    let title = quiz.title.clone();
    let base_url = config.base_url.clone();
    let notify_pool = pool.clone();
    tokio::spawn(async move {
        mailer::notify_new_quiz(&notify_pool, transport.as_ref(), &title, max_attempts, &base_url)
            .await;
    });

    Ok((StatusCode::CREATED, Json(quiz)))
}

/// Lists all quizzes, newest first.
pub async fn list_quizzes(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let quizzes = sqlx::query_as::<_, Quiz>(
        "SELECT id, title, filename, created_at FROM quizzes ORDER BY created_at DESC, id DESC",
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(quizzes))
}

/// Previews a quiz with the correct answers included. Admin only by routing.
pub async fn preview_quiz(
    State(pool): State<SqlitePool>,
    State(catalog): State<QuizCatalog>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let (quiz, doc) = catalog.load(&pool, quiz_id).await?;

    Ok(Json(serde_json::json!({
        "id": quiz.id,
        "filename": quiz.filename,
        "created_at": quiz.created_at,
        "document": doc.as_ref(),
    })))
}

/// Deletes a quiz along with its results, backing document and cache entry.
pub async fn delete_quiz(
    State(pool): State<SqlitePool>,
    State(catalog): State<QuizCatalog>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = sqlx::query_as::<_, Quiz>(
        "SELECT id, title, filename, created_at FROM quizzes WHERE id = ?",
    )
    .bind(quiz_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Quiz not found".to_string()))?;

    sqlx::query("DELETE FROM results WHERE quiz_id = ?")
        .bind(quiz_id)
        .execute(&pool)
        .await?;
    sqlx::query("DELETE FROM quizzes WHERE id = ?")
        .bind(quiz_id)
        .execute(&pool)
        .await?;

    catalog.remove_document(&quiz.filename);
    catalog.invalidate(quiz_id);

    Ok(Json(serde_json::json!({
        "message": format!("Quiz '{}' deleted successfully", quiz.title)
    })))
}

/// Lists all student accounts.
pub async fn list_users(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let users = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, user_id, password, email, role, created_at
        FROM users
        WHERE role = 'student'
        ORDER BY user_id, username
        "#,
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list users: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(users))
}

/// DTO for admin provisioning of a student account.
#[derive(Debug, Deserialize, Validate)]
pub struct AdminCreateUserRequest {
    #[validate(length(min = 1, max = 50, message = "Student ID is required."))]
    pub user_id: String,
    #[validate(length(
        min = 4,
        max = 128,
        message = "Password length must be between 4 and 128 characters."
    ))]
    pub password: String,
    #[validate(email(message = "Email address is not valid."))]
    pub email: Option<String>,
}

/// Provisions a student account keyed by the external student id.
pub async fn create_user(
    State(pool): State<SqlitePool>,
    Json(payload): Json<AdminCreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE user_id = ?")
        .bind(&payload.user_id)
        .fetch_optional(&pool)
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict(format!(
            "User with ID {} already exists",
            payload.user_id
        )));
    }

    let hashed_password = hash_password(&payload.password)?;
    let username = format!("Student_{}", payload.user_id);

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO users (username, user_id, password, email, role, created_at)
        VALUES (?, ?, ?, ?, 'student', ?)
        RETURNING id
        "#,
    )
    .bind(&username)
    .bind(&payload.user_id)
    .bind(&hashed_password)
    .bind(&payload.email)
    .bind(chrono::Utc::now())
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if e.to_string().contains("UNIQUE constraint failed") {
            AppError::Conflict(format!("Username '{}' already exists", username))
        } else {
            tracing::error!("Failed to create user: {:?}", e);
            AppError::InternalServerError(e.to_string())
        }
    })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

/// DTO for updating a user. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct AdminUpdateUserRequest {
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Updates student information.
pub async fn update_user(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<AdminUpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    // Check existence
    let _exists: i64 = sqlx::query_scalar("SELECT id FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    // Perform updates sequentially if fields are present
    if let Some(new_user_id) = payload.user_id {
        let taken: Option<i64> =
            sqlx::query_scalar("SELECT id FROM users WHERE user_id = ? AND id != ?")
                .bind(&new_user_id)
                .bind(id)
                .fetch_optional(&pool)
                .await?;
        if taken.is_some() {
            return Err(AppError::Conflict(format!(
                "User ID {} is already taken",
                new_user_id
            )));
        }

        sqlx::query("UPDATE users SET user_id = ?, username = ? WHERE id = ?")
            .bind(&new_user_id)
            .bind(format!("Student_{}", new_user_id))
            .bind(id)
            .execute(&pool)
            .await?;
    }

    if let Some(new_email) = payload.email {
        sqlx::query("UPDATE users SET email = ? WHERE id = ?")
            .bind(&new_email)
            .bind(id)
            .execute(&pool)
            .await?;
    }

    if let Some(new_password) = payload.password {
        let hashed = hash_password(&new_password)?;
        sqlx::query("UPDATE users SET password = ? WHERE id = ?")
            .bind(&hashed)
            .bind(id)
            .execute(&pool)
            .await?;
    }

    Ok(StatusCode::OK)
}

/// Deletes a user and their results. Prevents deleting self.
pub async fn delete_user(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if id == claims.user_id() {
        return Err(AppError::BadRequest("Cannot delete yourself".to_string()));
    }

    sqlx::query("DELETE FROM results WHERE user_id = ?")
        .bind(id)
        .execute(&pool)
        .await?;

    let deleted = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await?;

    if deleted.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    Ok(Json(serde_json::json!({"message": "User deleted successfully"})))
}

/// Lists every submission with its user and quiz, newest first.
pub async fn list_results(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let submissions = sqlx::query_as::<_, SubmissionEntry>(
        r#"
        SELECT
            r.id, u.username, u.user_id, r.quiz_id, q.title AS quiz_title,
            r.score, r.submitted_at, r.email_sent
        FROM results r
        JOIN users u ON u.id = r.user_id
        JOIN quizzes q ON q.id = r.quiz_id
        ORDER BY r.submitted_at DESC, r.id DESC
        "#,
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(submissions))
}

/// Views a single submission with the submitted answer mapping.
pub async fn view_submission(
    State(pool): State<SqlitePool>,
    Path(result_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = attempts::get_result(&pool, result_id).await?;

    let username: Option<String> = sqlx::query_scalar("SELECT username FROM users WHERE id = ?")
        .bind(result.user_id)
        .fetch_optional(&pool)
        .await?;
    let quiz_title: Option<String> = sqlx::query_scalar("SELECT title FROM quizzes WHERE id = ?")
        .bind(result.quiz_id)
        .fetch_optional(&pool)
        .await?;

    let answers = result.answer_map().map_err(|e| {
        AppError::InternalServerError(format!("Corrupt answers for result {}: {}", result.id, e))
    })?;

    Ok(Json(serde_json::json!({
        "id": result.id,
        "username": username.unwrap_or_else(|| "Unknown".to_string()),
        "quiz_title": quiz_title.unwrap_or_else(|| "Quiz".to_string()),
        "score": result.score,
        "answers": answers,
        "submitted_at": result.submitted_at,
        "email_sent": result.email_sent,
    })))
}

/// Returns the settings singleton plus whether SMTP is actually configured.
pub async fn get_settings(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
) -> Result<impl IntoResponse, AppError> {
    let settings = settings::get_or_create(&pool).await?;

    Ok(Json(serde_json::json!({
        "max_attempts": settings.max_attempts,
        "smtp_enabled": settings.smtp_enabled,
        "smtp_configured": config.smtp_configured(),
    })))
}

/// Updates the settings singleton. Rejects a non-positive attempt limit.
pub async fn update_settings(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Json(payload): Json<UpdateSettingsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let updated = settings::update(&pool, payload.max_attempts, payload.smtp_enabled).await?;

    if updated.smtp_enabled && !config.smtp_configured() {
        tracing::warn!("SMTP enabled but transport credentials are not fully configured");
    }

    Ok(Json(updated))
}
