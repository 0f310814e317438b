// src/settings.rs

use sqlx::SqlitePool;

use crate::{error::AppError, models::settings::Settings};

/// Upper bound carried over from the admin form; effectively "unlimited".
const MAX_ATTEMPTS_CEILING: i64 = 999;

/// Fetches the singleton settings row, creating the defaults if the table is
/// somehow empty. The migration seeds the row, so the insert branch is a
/// safety net for hand-managed databases.
pub async fn get_or_create(pool: &SqlitePool) -> Result<Settings, AppError> {
    if let Some(settings) = fetch(pool).await? {
        return Ok(settings);
    }

    sqlx::query("INSERT OR IGNORE INTO settings (id, max_attempts, smtp_enabled) VALUES (1, 3, 1)")
        .execute(pool)
        .await?;

    fetch(pool)
        .await?
        .ok_or_else(|| AppError::InternalServerError("Settings row missing".to_string()))
}

async fn fetch(pool: &SqlitePool) -> Result<Option<Settings>, AppError> {
    let settings = sqlx::query_as::<_, Settings>(
        "SELECT id, max_attempts, smtp_enabled FROM settings WHERE id = 1",
    )
    .fetch_optional(pool)
    .await?;
    Ok(settings)
}

/// Updates the singleton row. Rejects a non-positive (or absurdly large)
/// attempt limit with `InvalidConfiguration`.
pub async fn update(
    pool: &SqlitePool,
    max_attempts: i64,
    smtp_enabled: bool,
) -> Result<Settings, AppError> {
    if !(1..=MAX_ATTEMPTS_CEILING).contains(&max_attempts) {
        return Err(AppError::InvalidConfiguration(format!(
            "Maximum attempts must be between 1 and {}",
            MAX_ATTEMPTS_CEILING
        )));
    }

    // get_or_create guarantees the row exists before the update.
    let _ = get_or_create(pool).await?;

    sqlx::query("UPDATE settings SET max_attempts = ?, smtp_enabled = ? WHERE id = 1")
        .bind(max_attempts)
        .bind(smtp_enabled)
        .execute(pool)
        .await?;

    get_or_create(pool).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to open in-memory database");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to migrate test database");
        pool
    }

    #[tokio::test]
    async fn defaults_are_seeded() {
        let pool = test_pool().await;
        let settings = get_or_create(&pool).await.unwrap();
        assert_eq!(settings.max_attempts, 3);
        assert!(settings.smtp_enabled);
    }

    #[tokio::test]
    async fn update_persists() {
        let pool = test_pool().await;
        let settings = update(&pool, 5, false).await.unwrap();
        assert_eq!(settings.max_attempts, 5);
        assert!(!settings.smtp_enabled);

        let reread = get_or_create(&pool).await.unwrap();
        assert_eq!(reread.max_attempts, 5);
        assert!(!reread.smtp_enabled);
    }

    #[tokio::test]
    async fn rejects_non_positive_max_attempts() {
        let pool = test_pool().await;
        assert!(matches!(
            update(&pool, 0, true).await,
            Err(AppError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            update(&pool, -3, true).await,
            Err(AppError::InvalidConfiguration(_))
        ));

        // The failed updates must not have touched the row.
        let settings = get_or_create(&pool).await.unwrap();
        assert_eq!(settings.max_attempts, 3);
    }
}
