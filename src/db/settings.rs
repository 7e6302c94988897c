//! Key/value settings table.
//!
//! Holds provider credentials and enrichment switches set at runtime. Values
//! here override the configuration file (see [`crate::config`]).

use sqlx::sqlite::SqlitePool;

pub const AUTO_ENRICH_ENABLED: &str = "metadata.auto_enrich.enabled";
pub const LASTFM_API_KEY: &str = "metadata.lastfm.api_key";
pub const FANART_API_KEY: &str = "metadata.fanart.api_key";
pub const AUTO_SEARCH_ENABLED: &str = "metadata.mbid_auto_search.enabled";
pub const AUTO_SEARCH_THRESHOLD: &str = "metadata.mbid_auto_search.confidence_threshold";
pub const AUTO_SEARCH_AUTO_APPLY: &str = "metadata.mbid_auto_search.auto_apply";

pub async fn get_setting(pool: &SqlitePool, key: &str) -> sqlx::Result<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(v,)| v))
}

pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_setting(pool: &SqlitePool, key: &str) -> sqlx::Result<bool> {
    let result = sqlx::query("DELETE FROM settings WHERE key = ?")
        .bind(key)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// All settings under a dotted prefix, sorted by key.
pub async fn settings_with_prefix(
    pool: &SqlitePool,
    prefix: &str,
) -> sqlx::Result<Vec<(String, String)>> {
    sqlx::query_as("SELECT key, value FROM settings WHERE key LIKE ? || '%' ORDER BY key")
        .bind(prefix)
        .fetch_all(pool)
        .await
}
