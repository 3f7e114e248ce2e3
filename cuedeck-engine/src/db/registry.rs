//! Source registry persistence
//!
//! The ordered source sequence is stored one row per record: stable UUID,
//! position, and the record itself as JSON. Saves rewrite the whole sequence
//! in one transaction; the registry is small (a playlist, not a library).

use crate::error::{Error, Result};
use cuedeck_common::model::SourceRecord;
use sqlx::{Pool, Sqlite};

/// Load the source sequence ordered by position
pub async fn load_sources(pool: &Pool<Sqlite>) -> Result<Vec<SourceRecord>> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT data FROM sources ORDER BY position ASC")
            .fetch_all(pool)
            .await?;

    rows.into_iter()
        .map(|(json,)| {
            serde_json::from_str(&json)
                .map_err(|e| Error::Config(format!("Corrupt source record: {}", e)))
        })
        .collect()
}

/// Replace the stored sequence with the given records
pub async fn save_sources(pool: &Pool<Sqlite>, records: &[SourceRecord]) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM sources").execute(&mut *tx).await?;

    for (position, record) in records.iter().enumerate() {
        let json = serde_json::to_string(record).map_err(cuedeck_common::Error::from)?;
        sqlx::query("INSERT INTO sources (guid, position, data) VALUES (?, ?, ?)")
            .bind(record.id.to_string())
            .bind(position as i64)
            .bind(json)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}
