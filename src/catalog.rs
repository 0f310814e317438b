// src/catalog.rs

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    models::{quiz::Quiz, result::AnswerValue},
};

/// A true/false item in a quiz document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrueFalseItem {
    pub question: String,
    pub answer: bool,
}

/// A multiple-choice item in a quiz document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McqItem {
    pub question: String,
    pub options: Vec<String>,
    pub answer: String,
}

/// A parsed quiz document.
///
/// Items are ordered: all true/false items first, then all MCQ items, both in
/// document order. Item indices used in submissions refer to this ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizDocument {
    pub title: String,
    #[serde(default)]
    pub true_false: Vec<TrueFalseItem>,
    #[serde(default)]
    pub mcqs: Vec<McqItem>,
}

/// An item with the correct answer stripped, for sending to students.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PublicItem {
    TrueFalse { question: String },
    MultipleChoice { question: String, options: Vec<String> },
}

impl QuizDocument {
    pub fn item_count(&self) -> usize {
        self.true_false.len() + self.mcqs.len()
    }

    /// Checks the structural rules serde cannot express:
    /// MCQ options must be non-empty and contain the correct answer.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.title.trim().is_empty() {
            return Err(AppError::MalformedQuiz(
                "Quiz title must not be empty".to_string(),
            ));
        }
        for (idx, mcq) in self.mcqs.iter().enumerate() {
            if mcq.options.is_empty() {
                return Err(AppError::MalformedQuiz(format!(
                    "MCQ item {} has an empty options list",
                    idx
                )));
            }
            if !mcq.options.contains(&mcq.answer) {
                return Err(AppError::MalformedQuiz(format!(
                    "MCQ item {} answer is not among its options",
                    idx
                )));
            }
        }
        Ok(())
    }

    /// Correct answers in item order.
    pub fn answer_key(&self) -> impl Iterator<Item = AnswerValue> + '_ {
        self.true_false
            .iter()
            .map(|item| AnswerValue::Bool(item.answer))
            .chain(
                self.mcqs
                    .iter()
                    .map(|item| AnswerValue::Text(item.answer.clone())),
            )
    }

    /// Items in order with the answers stripped.
    pub fn public_items(&self) -> Vec<PublicItem> {
        self.true_false
            .iter()
            .map(|item| PublicItem::TrueFalse {
                question: item.question.clone(),
            })
            .chain(self.mcqs.iter().map(|item| PublicItem::MultipleChoice {
                question: item.question.clone(),
                options: item.options.clone(),
            }))
            .collect()
    }
}

/// Parses and validates a quiz document from raw JSON.
pub fn parse_document(raw: &str) -> Result<QuizDocument, AppError> {
    let doc: QuizDocument = serde_json::from_str(raw)
        .map_err(|e| AppError::MalformedQuiz(format!("Invalid quiz document: {}", e)))?;
    doc.validate()?;
    Ok(doc)
}

/// Catalog of quiz documents backed by a directory of JSON files.
///
/// Parsed documents are cached process-wide by quiz id. Entries are
/// invalidated explicitly when a quiz is re-created or deleted; documents are
/// never rewritten in place, so a cached entry stays scoreable against every
/// result that references it.
#[derive(Clone)]
pub struct QuizCatalog {
    dir: PathBuf,
    cache: Arc<RwLock<HashMap<i64, Arc<QuizDocument>>>>,
}

impl QuizCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Loads a quiz row and its parsed document.
    ///
    /// Fails with `NotFound` if the id has no row or no backing file, and
    /// `MalformedQuiz` if the file violates the document shape.
    pub async fn load(
        &self,
        pool: &SqlitePool,
        quiz_id: i64,
    ) -> Result<(Quiz, Arc<QuizDocument>), AppError> {
        let quiz = sqlx::query_as::<_, Quiz>(
            "SELECT id, title, filename, created_at FROM quizzes WHERE id = ?",
        )
        .bind(quiz_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Quiz not found".to_string()))?;

        if let Some(doc) = self.cache.read().expect("quiz cache lock poisoned").get(&quiz_id) {
            return Ok((quiz, Arc::clone(doc)));
        }

        let doc = Arc::new(self.read_document(&quiz.filename)?);
        self.cache
            .write()
            .expect("quiz cache lock poisoned")
            .insert(quiz_id, Arc::clone(&doc));

        Ok((quiz, doc))
    }

    fn read_document(&self, filename: &str) -> Result<QuizDocument, AppError> {
        let path = self.dir.join(filename);
        let raw = fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::NotFound("Quiz document is missing".to_string())
            } else {
                AppError::InternalServerError(format!(
                    "Failed to read quiz document {}: {}",
                    path.display(),
                    e
                ))
            }
        })?;
        parse_document(&raw)
    }

    /// Drops the cached document for a quiz id. Called on quiz deletion and
    /// re-creation.
    pub fn invalidate(&self, quiz_id: i64) {
        self.cache
            .write()
            .expect("quiz cache lock poisoned")
            .remove(&quiz_id);
    }

    /// Validates a document and writes it to the data directory under a
    /// generated filename. Returns the filename for the quiz row.
    pub fn store_document(&self, doc: &QuizDocument) -> Result<String, AppError> {
        doc.validate()?;

        fs::create_dir_all(&self.dir).map_err(|e| {
            AppError::InternalServerError(format!("Failed to create quiz directory: {}", e))
        })?;

        let filename = format!("quiz_{}.json", chrono::Utc::now().timestamp_micros());
        let path = self.dir.join(&filename);
        let raw = serde_json::to_string_pretty(doc)
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;
        fs::write(&path, raw).map_err(|e| {
            AppError::InternalServerError(format!(
                "Failed to write quiz document {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(filename)
    }

    /// Removes a quiz document from disk. A missing file is not an error.
    pub fn remove_document(&self, filename: &str) {
        let path = self.dir.join(filename);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove quiz document {}: {}", path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) const SAMPLE_QUIZ: &str = r#"{
        "title": "Networking Basics",
        "true_false": [
            {"question": "TCP is connection-oriented.", "answer": true},
            {"question": "UDP guarantees delivery.", "answer": false},
            {"question": "HTTP runs over TCP by default.", "answer": true},
            {"question": "DNS only ever uses TCP.", "answer": false},
            {"question": "An IPv4 address is 32 bits wide.", "answer": true},
            {"question": "ICMP is used by ping.", "answer": true},
            {"question": "ARP resolves hostnames to IPs.", "answer": false}
        ],
        "mcqs": [
            {
                "question": "Which port does HTTPS use by default?",
                "options": ["80", "443", "8080"],
                "answer": "443"
            },
            {
                "question": "Which layer does IP belong to?",
                "options": ["Link", "Network", "Transport", "Application"],
                "answer": "Network"
            }
        ]
    }"#;

    #[test]
    fn parses_sample_document() {
        let doc = parse_document(SAMPLE_QUIZ).unwrap();
        assert_eq!(doc.title, "Networking Basics");
        assert_eq!(doc.true_false.len(), 7);
        assert_eq!(doc.mcqs.len(), 2);
        assert_eq!(doc.item_count(), 9);

        let key: Vec<_> = doc.answer_key().collect();
        assert_eq!(key.len(), 9);
        assert_eq!(key[0], AnswerValue::Bool(true));
        assert_eq!(key[7], AnswerValue::Text("443".to_string()));
    }

    #[test]
    fn item_arrays_default_to_empty() {
        let doc = parse_document(r#"{"title": "Empty"}"#).unwrap();
        assert_eq!(doc.item_count(), 0);
    }

    #[test]
    fn missing_question_field_is_malformed() {
        let raw = r#"{"title": "Bad", "true_false": [{"answer": true}]}"#;
        assert!(matches!(
            parse_document(raw),
            Err(AppError::MalformedQuiz(_))
        ));
    }

    #[test]
    fn mcq_missing_options_is_malformed() {
        let raw = r#"{
            "title": "Bad",
            "mcqs": [{"question": "Pick one", "answer": "A"}]
        }"#;
        assert!(matches!(
            parse_document(raw),
            Err(AppError::MalformedQuiz(_))
        ));
    }

    #[test]
    fn mcq_empty_options_is_malformed() {
        let raw = r#"{
            "title": "Bad",
            "mcqs": [{"question": "Pick one", "options": [], "answer": "A"}]
        }"#;
        assert!(matches!(
            parse_document(raw),
            Err(AppError::MalformedQuiz(_))
        ));
    }

    #[test]
    fn mcq_answer_outside_options_is_malformed() {
        let raw = r#"{
            "title": "Bad",
            "mcqs": [{"question": "Pick one", "options": ["A", "B"], "answer": "C"}]
        }"#;
        assert!(matches!(
            parse_document(raw),
            Err(AppError::MalformedQuiz(_))
        ));
    }

    #[test]
    fn public_items_hide_answers() {
        let doc = parse_document(SAMPLE_QUIZ).unwrap();
        let items = doc.public_items();
        assert_eq!(items.len(), 9);

        let rendered = serde_json::to_string(&items).unwrap();
        assert!(!rendered.contains("answer"));
        assert!(rendered.contains("Which port does HTTPS use by default?"));
    }

    #[test]
    fn store_and_read_round_trip() {
        let dir = std::env::temp_dir().join(format!("quiz-catalog-{}", uuid::Uuid::new_v4()));
        let catalog = QuizCatalog::new(&dir);

        let doc = parse_document(SAMPLE_QUIZ).unwrap();
        let filename = catalog.store_document(&doc).unwrap();

        let reread = catalog.read_document(&filename).unwrap();
        assert_eq!(reread.title, doc.title);
        assert_eq!(reread.item_count(), doc.item_count());

        catalog.remove_document(&filename);
        assert!(matches!(
            catalog.read_document(&filename),
            Err(AppError::NotFound(_))
        ));

        std::fs::remove_dir_all(&dir).ok();
    }
}
