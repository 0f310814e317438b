// src/models/settings.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the singleton 'settings' table row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Settings {
    pub id: i64,

    /// Maximum quiz attempts per (user, quiz) pair. Always >= 1.
    pub max_attempts: i64,

    /// Master switch for email notifications.
    pub smtp_enabled: bool,
}

/// DTO for the admin settings update.
#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    pub max_attempts: i64,
    pub smtp_enabled: bool,
}
