// src/models/result.rs

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A single submitted answer. True/false items carry a boolean, MCQ items the
/// selected option text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Bool(bool),
    Text(String),
}

/// Submitted answers keyed by item index. Items a student skipped are simply
/// absent from the map.
pub type AnswerMap = HashMap<usize, AnswerValue>;

/// Represents the 'results' table in the database.
/// Rows are immutable after insertion except for the `email_sent` flag.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QuizResult {
    pub id: i64,
    pub user_id: i64,
    pub quiz_id: i64,

    /// Count of correctly answered items.
    pub score: i64,

    /// JSON-serialized [`AnswerMap`].
    pub answers: String,

    pub submitted_at: Option<chrono::DateTime<chrono::Utc>>,

    /// Set true at most once, after a successful result email.
    pub email_sent: bool,
}

impl QuizResult {
    /// Deserializes the persisted answers back into the submitted mapping.
    pub fn answer_map(&self) -> Result<AnswerMap, serde_json::Error> {
        serde_json::from_str(&self.answers)
    }
}

/// DTO for submitting a quiz attempt.
#[derive(Debug, Deserialize)]
pub struct SubmitQuizRequest {
    /// User's answers, keyed by item index within the quiz.
    pub answers: AnswerMap,
}

/// A result row joined with its quiz title, for the student history view.
#[derive(Debug, Serialize, FromRow)]
pub struct ResultHistoryEntry {
    pub id: i64,
    pub quiz_id: i64,
    pub quiz_title: String,
    pub score: i64,
    pub submitted_at: Option<chrono::DateTime<chrono::Utc>>,

    /// 1-based ordinal of this submission among the user's attempts
    /// at the same quiz.
    pub attempt_number: i64,
}

/// A result row joined with username and quiz title, for the admin view.
#[derive(Debug, Serialize, FromRow)]
pub struct SubmissionEntry {
    pub id: i64,
    pub username: String,
    pub user_id: Option<String>,
    pub quiz_id: i64,
    pub quiz_title: String,
    pub score: i64,
    pub submitted_at: Option<chrono::DateTime<chrono::Utc>>,
    pub email_sent: bool,
}
