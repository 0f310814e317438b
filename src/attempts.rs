// src/attempts.rs

use sqlx::SqlitePool;

use crate::{
    catalog::QuizDocument,
    error::AppError,
    models::result::{AnswerMap, QuizResult},
    settings,
};

/// Counts existing results for a (user, quiz) pair.
pub async fn count_attempts(
    pool: &SqlitePool,
    user_id: i64,
    quiz_id: i64,
) -> Result<i64, AppError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM results WHERE user_id = ? AND quiz_id = ?",
    )
    .bind(user_id)
    .bind(quiz_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// True iff the pair has attempts left under the current settings.
pub async fn can_attempt(pool: &SqlitePool, user_id: i64, quiz_id: i64) -> Result<bool, AppError> {
    let used = count_attempts(pool, user_id, quiz_id).await?;
    let max_attempts = settings::get_or_create(pool).await?.max_attempts;
    Ok(used < max_attempts)
}

/// Scores a submission against a quiz document.
///
/// Each item is compared by exact equality: boolean match for true/false
/// items, case-sensitive option-text match for MCQs. Items absent from the
/// submission count as incorrect. Returns the score (count of correct items)
/// and per-item correctness in item order.
pub fn score(doc: &QuizDocument, submitted: &AnswerMap) -> (i64, Vec<bool>) {
    let correctness: Vec<bool> = doc
        .answer_key()
        .enumerate()
        .map(|(idx, correct)| submitted.get(&idx).is_some_and(|ans| *ans == correct))
        .collect();

    let total = correctness.iter().filter(|c| **c).count() as i64;
    (total, correctness)
}

/// Persists a new result.
///
/// The attempt count is re-checked against the limit inside the insert
/// transaction: the check at display time and the insert at submit time are
/// separate requests, and two in-flight submissions must not both land once
/// only one slot remains.
///
/// The transaction opens with BEGIN IMMEDIATE. A deferred BEGIN would let
/// two concurrent submissions both read the count and the loser would then
/// fail its write upgrade with SQLITE_BUSY; taking the write lock up front
/// makes the loser wait at BEGIN, re-read the committed count, and return
/// `AttemptLimitExceeded`.
pub async fn record(
    pool: &SqlitePool,
    user_id: i64,
    quiz_id: i64,
    answers: &AnswerMap,
    score: i64,
) -> Result<QuizResult, AppError> {
    let answers_json =
        serde_json::to_string(answers).map_err(|e| AppError::InternalServerError(e.to_string()))?;

    let mut conn = pool.acquire().await?;

    sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

    match insert_within_limit(&mut conn, user_id, quiz_id, &answers_json, score).await {
        Ok(result) => {
            sqlx::query("COMMIT").execute(&mut *conn).await?;
            Ok(result)
        }
        Err(e) => {
            if let Err(rollback_err) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                tracing::warn!("Failed to roll back result insert: {}", rollback_err);
            }
            Err(e)
        }
    }
}

async fn insert_within_limit(
    conn: &mut sqlx::SqliteConnection,
    user_id: i64,
    quiz_id: i64,
    answers_json: &str,
    score: i64,
) -> Result<QuizResult, AppError> {
    let used: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM results WHERE user_id = ? AND quiz_id = ?",
    )
    .bind(user_id)
    .bind(quiz_id)
    .fetch_one(&mut *conn)
    .await?;

    let max_attempts: i64 =
        sqlx::query_scalar("SELECT max_attempts FROM settings WHERE id = 1")
            .fetch_optional(&mut *conn)
            .await?
            .unwrap_or(3);

    if used >= max_attempts {
        return Err(AppError::AttemptLimitExceeded(format!(
            "You have reached the maximum number of attempts ({}) for this quiz",
            max_attempts
        )));
    }

    let result = sqlx::query_as::<_, QuizResult>(
        r#"
        INSERT INTO results (user_id, quiz_id, score, answers, submitted_at, email_sent)
        VALUES (?, ?, ?, ?, ?, 0)
        RETURNING id, user_id, quiz_id, score, answers, submitted_at, email_sent
        "#,
    )
    .bind(user_id)
    .bind(quiz_id)
    .bind(score)
    .bind(answers_json)
    .bind(chrono::Utc::now())
    .fetch_one(&mut *conn)
    .await?;

    Ok(result)
}

/// Fetches one result by id.
pub async fn get_result(pool: &SqlitePool, result_id: i64) -> Result<QuizResult, AppError> {
    sqlx::query_as::<_, QuizResult>(
        r#"
        SELECT id, user_id, quiz_id, score, answers, submitted_at, email_sent
        FROM results
        WHERE id = ?
        "#,
    )
    .bind(result_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Result not found".to_string()))
}
