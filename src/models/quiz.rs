// src/models/quiz.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'quizzes' table in the database.
/// The item content lives in the backing JSON document, not the table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,

    pub title: String,

    /// Name of the backing document inside the quiz data directory.
    pub filename: String,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Quiz list entry for the student surface, with the caller's usage so far.
#[derive(Debug, Serialize, FromRow)]
pub struct QuizListEntry {
    pub id: i64,
    pub title: String,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub attempts_used: i64,
}
