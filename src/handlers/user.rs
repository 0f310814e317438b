// src/handlers/user.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use sqlx::SqlitePool;

use crate::{
    attempts,
    catalog::QuizCatalog,
    error::AppError,
    mailer::{self, MailTransport},
    models::{
        quiz::QuizListEntry,
        result::{ResultHistoryEntry, SubmitQuizRequest},
        user::User,
    },
    settings,
    utils::jwt::Claims,
};

/// Lists available quizzes with the caller's attempt usage.
pub async fn list_quizzes(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let quizzes = sqlx::query_as::<_, QuizListEntry>(
        r#"
        SELECT
            q.id, q.title, q.created_at,
            (SELECT COUNT(*) FROM results r WHERE r.quiz_id = q.id AND r.user_id = ?) AS attempts_used
        FROM quizzes q
        ORDER BY q.created_at DESC, q.id DESC
        "#,
    )
    .bind(claims.user_id())
    .fetch_all(&pool)
    .await?;

    Ok(Json(quizzes))
}

/// Fetches one quiz for taking, with the answers stripped from every item.
///
/// Fails with `AttemptLimitExceeded` when the caller has no attempts left, so
/// the quiz is never even displayed past the limit.
pub async fn get_quiz(
    State(pool): State<SqlitePool>,
    State(catalog): State<QuizCatalog>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id();

    let (quiz, doc) = catalog.load(&pool, quiz_id).await?;

    let used = attempts::count_attempts(&pool, user_id, quiz_id).await?;
    let max_attempts = settings::get_or_create(&pool).await?.max_attempts;
    if used >= max_attempts {
        return Err(AppError::AttemptLimitExceeded(format!(
            "You have reached the maximum number of attempts ({}) for this quiz",
            max_attempts
        )));
    }

    Ok(Json(serde_json::json!({
        "id": quiz.id,
        "title": doc.title,
        "attempt_number": used + 1,
        "max_attempts": max_attempts,
        "items": doc.public_items(),
    })))
}

/// Handles a quiz submission: scores the answers, records the result and
/// kicks off the result email without blocking the response on it.
pub async fn submit_quiz(
    State(pool): State<SqlitePool>,
    State(catalog): State<QuizCatalog>,
    State(transport): State<Arc<dyn MailTransport>>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
    Json(req): Json<SubmitQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id();

    let (quiz, doc) = catalog.load(&pool, quiz_id).await?;

    let (score, correctness) = attempts::score(&doc, &req.answers);

    // record() re-checks the attempt count inside its transaction.
    let result = attempts::record(&pool, user_id, quiz_id, &req.answers, score).await?;

    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, user_id, password, email, role, created_at FROM users WHERE id = ?",
    )
    .bind(user_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("User not found".to_string()))?;

    // Fire-and-forget dispatch; delivery failure never fails the submission.
    let total_items = doc.item_count();
    let title = quiz.title.clone();
    let notify_pool = pool.clone();
    let notify_result = result.clone();
    tokio::spawn(async move {
        mailer::notify_result(
            &notify_pool,
            transport.as_ref(),
            &user,
            &title,
            &notify_result,
            total_items,
        )
        .await;
    });

    Ok(Json(serde_json::json!({
        "result_id": result.id,
        "quiz_id": quiz_id,
        "score": score,
        "total_items": total_items,
        "correctness": correctness,
        "message": "Quiz submitted successfully"
    })))
}

/// The caller's result history, newest first, with per-quiz attempt ordinals.
pub async fn list_results(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let results = sqlx::query_as::<_, ResultHistoryEntry>(
        r#"
        SELECT
            r.id, r.quiz_id, q.title AS quiz_title, r.score, r.submitted_at,
            ROW_NUMBER() OVER (
                PARTITION BY r.quiz_id ORDER BY r.submitted_at, r.id
            ) AS attempt_number
        FROM results r
        JOIN quizzes q ON q.id = r.quiz_id
        WHERE r.user_id = ?
        ORDER BY r.submitted_at DESC, r.id DESC
        "#,
    )
    .bind(claims.user_id())
    .fetch_all(&pool)
    .await?;

    Ok(Json(results))
}

/// One of the caller's own results, including the submitted answer mapping.
/// Results belonging to other users are indistinguishable from absent ones.
pub async fn view_result(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(result_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id();

    let result = attempts::get_result(&pool, result_id).await?;
    if result.user_id != user_id {
        return Err(AppError::NotFound("Result not found".to_string()));
    }

    let quiz_title: Option<String> =
        sqlx::query_scalar("SELECT title FROM quizzes WHERE id = ?")
            .bind(result.quiz_id)
            .fetch_optional(&pool)
            .await?;

    let attempt_number: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM results WHERE user_id = ? AND quiz_id = ? AND id <= ?",
    )
    .bind(user_id)
    .bind(result.quiz_id)
    .bind(result.id)
    .fetch_one(&pool)
    .await?;

    let can_retake = attempts::can_attempt(&pool, user_id, result.quiz_id).await?;

    // A stored blob that fails to parse is server-side corruption, not a
    // client error.
    let answers = result.answer_map().map_err(|e| {
        AppError::InternalServerError(format!("Corrupt answers for result {}: {}", result.id, e))
    })?;

    Ok(Json(serde_json::json!({
        "id": result.id,
        "quiz_id": result.quiz_id,
        "quiz_title": quiz_title.unwrap_or_else(|| "Quiz".to_string()),
        "score": result.score,
        "answers": answers,
        "submitted_at": result.submitted_at,
        "attempt_number": attempt_number,
        "can_retake": can_retake,
    })))
}
