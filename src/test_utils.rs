//! Test utilities and fixtures for music-enricher tests.
//!
//! This module provides database helpers to reduce boilerplate in tests.
//!
//! # Example
//!
//! ```ignore
//! use music_enricher::test_utils::{temp_db, seed_artist};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let (pool, _dir) = temp_db().await;
//!     let id = seed_artist(&pool, "Portishead", None).await;
//!     // ... test logic
//! }
//! ```

use sqlx::sqlite::SqlitePool;
use tempfile::TempDir;

/// Creates a temporary database for testing.
///
/// The database is created in a temporary directory that is automatically
/// cleaned up when the returned `TempDir` is dropped. Migrations are run
/// automatically.
///
/// Keep the TempDir alive for the duration of your test.
pub async fn temp_db() -> (SqlitePool, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = dir.path().join("test.db");
    let db_url = format!("sqlite:{}", db_path.display());

    let pool = crate::db::init_db(&db_url)
        .await
        .expect("Failed to initialize test database");

    (pool, dir)
}

/// Insert an artist, optionally with an MBID already known.
pub async fn seed_artist(pool: &SqlitePool, name: &str, mbid: Option<&str>) -> i64 {
    sqlx::query("INSERT INTO artists (name, mbid) VALUES (?, ?)")
        .bind(name)
        .bind(mbid)
        .execute(pool)
        .await
        .expect("Failed to seed artist")
        .last_insert_rowid()
}

/// Insert an album.
pub async fn seed_album(pool: &SqlitePool, title: &str, artist_id: Option<i64>) -> i64 {
    sqlx::query("INSERT INTO albums (title, artist_id) VALUES (?, ?)")
        .bind(title)
        .bind(artist_id)
        .execute(pool)
        .await
        .expect("Failed to seed album")
        .last_insert_rowid()
}

/// Set a column on an artist row directly.
pub async fn set_artist_column(pool: &SqlitePool, id: i64, column: &str, value: &str) {
    let sql = format!("UPDATE artists SET {} = ? WHERE id = ?", column);
    sqlx::query(&sql)
        .bind(value)
        .bind(id)
        .execute(pool)
        .await
        .expect("Failed to update artist");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_temp_db_creates_valid_database() {
        let (pool, _dir) = temp_db().await;

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM metadata_conflicts")
            .fetch_one(&pool)
            .await
            .expect("Query should succeed");

        assert_eq!(count.0, 0);
    }
}
