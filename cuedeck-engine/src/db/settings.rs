//! Settings database access
//!
//! Read/write runtime settings from the settings table (key-value store).
//! Missing values are initialized with built-in defaults and written back.

use crate::error::{Error, Result};
use crate::switcher::done::FrameIndexing;
use cuedeck_common::model::SourceRecord;
use sqlx::{Pool, Sqlite};
use std::str::FromStr;

/// Get a setting value parsed as T, or None when absent
pub async fn get_setting<T: FromStr>(pool: &Pool<Sqlite>, key: &str) -> Result<Option<T>> {
    let value: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    match value {
        Some((raw,)) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("Invalid value for setting '{}': {}", key, raw))),
        None => Ok(None),
    }
}

/// Write a setting value
pub async fn set_setting<T: ToString>(pool: &Pool<Sqlite>, key: &str, value: T) -> Result<()> {
    sqlx::query(
        "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

/// Get a setting with a write-back default
async fn get_or_init<T: FromStr + ToString + Clone>(
    pool: &Pool<Sqlite>,
    key: &str,
    default: T,
) -> Result<T> {
    match get_setting::<T>(pool, key).await? {
        Some(value) => Ok(value),
        None => {
            set_setting(pool, key, default.clone()).await?;
            Ok(default)
        }
    }
}

/// Global transition time in seconds (default 2.0)
pub async fn get_global_transition_time(pool: &Pool<Sqlite>) -> Result<f64> {
    get_or_init(pool, "global_transition_time", 2.0).await
}

pub async fn set_global_transition_time(pool: &Pool<Sqlite>, seconds: f64) -> Result<()> {
    set_setting(pool, "global_transition_time", seconds.max(0.0)).await
}

/// Whether switches queue behind an in-flight transition (default true)
pub async fn get_queue_enabled(pool: &Pool<Sqlite>) -> Result<bool> {
    Ok(get_or_init(pool, "enable_pending_queue", 1i64).await? != 0)
}

pub async fn set_queue_enabled(pool: &Pool<Sqlite>, enabled: bool) -> Result<()> {
    set_setting(pool, "enable_pending_queue", if enabled { 1 } else { 0 }).await
}

/// Destructive-operation confirmation gate (default off)
pub async fn get_safety(pool: &Pool<Sqlite>) -> Result<bool> {
    Ok(get_or_init(pool, "safety_enabled", 0i64).await? != 0)
}

pub async fn set_safety(pool: &Pool<Sqlite>, enabled: bool) -> Result<()> {
    set_setting(pool, "safety_enabled", if enabled { 1 } else { 0 }).await
}

/// Frames-remaining off-by-one policy (default zero_based)
pub async fn get_frame_indexing(pool: &Pool<Sqlite>) -> Result<FrameIndexing> {
    let raw = get_or_init(pool, "frame_indexing", "zero_based".to_string()).await?;
    Ok(FrameIndexing::from_str_or_default(&raw))
}

pub async fn set_frame_indexing(pool: &Pool<Sqlite>, indexing: FrameIndexing) -> Result<()> {
    set_setting(pool, "frame_indexing", indexing.as_str()).await
}

/// Selected source index
pub async fn get_selected_index(pool: &Pool<Sqlite>) -> Result<usize> {
    get_or_init(pool, "selected_index", 0usize).await
}

/// Active source index; stored empty when nothing is active
pub async fn get_active_index(pool: &Pool<Sqlite>) -> Result<Option<usize>> {
    let raw = get_setting::<String>(pool, "active_index").await?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<usize>()
            .map(Some)
            .map_err(|_| Error::Config(format!("Invalid active_index: {}", value))),
    }
}

/// Persist selection bookkeeping
pub async fn save_selection(
    pool: &Pool<Sqlite>,
    selected: usize,
    active: Option<usize>,
) -> Result<()> {
    set_setting(pool, "selected_index", selected).await?;
    let active = active.map(|a| a.to_string()).unwrap_or_default();
    set_setting(pool, "active_index", active).await
}

/// The template record used by add-source
pub async fn get_default_template(pool: &Pool<Sqlite>) -> Result<Option<SourceRecord>> {
    match get_setting::<String>(pool, "default_source_template").await? {
        Some(json) => {
            let record = serde_json::from_str(&json)
                .map_err(|e| Error::Config(format!("Invalid default template: {}", e)))?;
            Ok(Some(record))
        }
        None => Ok(None),
    }
}

pub async fn set_default_template(pool: &Pool<Sqlite>, record: &SourceRecord) -> Result<()> {
    let json = serde_json::to_string(record).map_err(cuedeck_common::Error::from)?;
    set_setting(pool, "default_source_template", json).await
}
