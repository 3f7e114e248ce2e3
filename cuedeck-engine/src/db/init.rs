//! Database initialization
//!
//! Creates tables on first run and fills missing settings with built-in
//! defaults. Initialization is a structured startup step: any failure
//! propagates to the caller instead of being logged and swallowed.

use crate::error::Result;
use sqlx::{Pool, Sqlite};
use tracing::info;

/// Create tables if they do not exist
pub async fn init_db(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sources (
            guid TEXT PRIMARY KEY,
            position INTEGER NOT NULL,
            data TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS switch_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            time TIMESTAMP NOT NULL,
            event TEXT NOT NULL,
            detail TEXT NOT NULL,
            level TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    init_settings_defaults(pool).await?;

    Ok(())
}

/// Initialize settings table with default values
pub async fn init_settings_defaults(pool: &Pool<Sqlite>) -> Result<()> {
    let defaults = vec![
        // Transition defaults
        ("global_transition_time", "2.0"),
        // Pending switch queue
        ("enable_pending_queue", "1"),
        // Destructive-operation confirmation gate
        ("safety_enabled", "0"),
        // Frames-remaining off-by-one policy
        ("frame_indexing", "zero_based"),
        // Registry bookkeeping
        ("selected_index", "0"),
        ("active_index", ""),
    ];

    for (key, default_value) in defaults {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM settings WHERE key = ?)")
                .bind(key)
                .fetch_one(pool)
                .await?;

        if !exists {
            sqlx::query("INSERT INTO settings (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(default_value)
                .execute(pool)
                .await?;

            info!(
                "Initialized setting '{}' with default value: {}",
                key, default_value
            );
        }
    }

    Ok(())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> Pool<Sqlite> {
    // Single connection: every handle sees the same in-memory database
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    init_db(&pool).await.unwrap();
    pool
}
