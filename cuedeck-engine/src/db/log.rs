//! Switch log ring persistence
//!
//! A capped ring (10 entries, newest first) of notable switcher events.
//! Appends trim older rows in the same call, so the table never grows past
//! the cap between process restarts.

use crate::error::{Error, Result};
use cuedeck_common::events::{LogEntry, LogLevel};
use sqlx::{Pool, Sqlite};

/// Maximum retained entries
pub const LOG_CAP: usize = 10;

fn level_str(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Info => "info",
        LogLevel::Warning => "warning",
        LogLevel::Error => "error",
    }
}

fn level_from_str(raw: &str) -> LogLevel {
    match raw {
        "error" => LogLevel::Error,
        "warning" => LogLevel::Warning,
        _ => LogLevel::Info,
    }
}

/// Append an entry, trimming the ring to the cap
pub async fn append(pool: &Pool<Sqlite>, entry: &LogEntry) -> Result<()> {
    sqlx::query("INSERT INTO switch_log (time, event, detail, level) VALUES (?, ?, ?, ?)")
        .bind(entry.time)
        .bind(&entry.event)
        .bind(entry.detail.to_string())
        .bind(level_str(entry.level))
        .execute(pool)
        .await?;

    sqlx::query(
        "DELETE FROM switch_log WHERE id NOT IN \
         (SELECT id FROM switch_log ORDER BY id DESC LIMIT ?)",
    )
    .bind(LOG_CAP as i64)
    .execute(pool)
    .await?;

    Ok(())
}

/// Recent entries, newest first
pub async fn recent(pool: &Pool<Sqlite>) -> Result<Vec<LogEntry>> {
    let rows: Vec<(chrono::DateTime<chrono::Utc>, String, String, String)> = sqlx::query_as(
        "SELECT time, event, detail, level FROM switch_log ORDER BY id DESC LIMIT ?",
    )
    .bind(LOG_CAP as i64)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(time, event, detail, level)| {
            let detail = serde_json::from_str(&detail)
                .map_err(|e| Error::Config(format!("Corrupt log detail: {}", e)))?;
            Ok(LogEntry {
                time,
                event,
                detail,
                level: level_from_str(&level),
            })
        })
        .collect()
}

/// Clear all log entries
pub async fn clear(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query("DELETE FROM switch_log").execute(pool).await?;
    Ok(())
}
