//! Database module for library entities and enrichment bookkeeping.
//!
//! Uses SQLx with SQLite for lightweight, embedded database storage.
//! Provides async operations for:
//! - Artist and album reads and creation
//! - Single-field writes driven by [`MetadataField`] column mapping
//! - Enrichment run records ([`runs`]) and the settings table ([`settings`])
//!
//! Conflict and log tables live with their owners in [`crate::conflicts`]
//! and [`crate::enrichment::log`].
//!
//! # Example
//!
//! ```ignore
//! use music_enricher::db::{init_db, load_entity};
//!
//! let pool = init_db("sqlite:music_enricher.db").await?;
//! let artist = load_entity(&pool, EntityType::Artist, 1).await?;
//! ```

pub mod runs;
pub mod settings;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::SqliteExecutor;

use crate::enrichment::EnrichmentError;
use crate::model::{Album, Artist, EntityType, LibraryEntity, MetadataField};

/// Default database filename.
pub const DEFAULT_DB_NAME: &str = "music_enricher.db";

/// Build a SQLite database URL from an optional path.
///
/// If no path is provided, uses [`DEFAULT_DB_NAME`] in the current directory.
pub fn db_url(path: Option<&std::path::Path>) -> String {
    match path {
        Some(p) => format!("sqlite:{}", p.display()),
        None => format!("sqlite:{}", DEFAULT_DB_NAME),
    }
}

/// Initialize the database connection pool and run migrations.
///
/// Creates the database file if it doesn't exist, establishes a connection
/// pool with up to 5 connections, and runs all pending migrations.
///
/// # Errors
///
/// Returns an error if:
/// - Database creation fails
/// - Connection cannot be established
/// - Migration fails
pub async fn init_db(db_url: &str) -> Result<SqlitePool, sqlx::Error> {
    if !sqlx::Sqlite::database_exists(db_url).await.unwrap_or(false) {
        sqlx::Sqlite::create_database(db_url).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Timestamp format stored in every TEXT date column.
///
/// Fixed-width UTC with a `Z` suffix so string comparison orders correctly.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current time in storage format.
pub fn now() -> String {
    timestamp(Utc::now())
}

/// Parse a stored timestamp; None for anything unreadable.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Get or create an artist by name.
///
/// This is idempotent - calling with the same name always returns the same ID.
pub async fn get_or_create_artist(pool: &SqlitePool, name: &str) -> sqlx::Result<i64> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM artists WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;

    if let Some((id,)) = row {
        Ok(id)
    } else {
        let result = sqlx::query("INSERT INTO artists (name) VALUES (?)")
            .bind(name)
            .execute(pool)
            .await?;
        Ok(result.last_insert_rowid())
    }
}

/// Get or create an album by title and artist.
pub async fn get_or_create_album(
    pool: &SqlitePool,
    title: &str,
    artist_id: Option<i64>,
) -> sqlx::Result<i64> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM albums WHERE title = ? AND artist_id IS ?")
            .bind(title)
            .bind(artist_id)
            .fetch_optional(pool)
            .await?;

    if let Some((id,)) = row {
        Ok(id)
    } else {
        let result = sqlx::query("INSERT INTO albums (title, artist_id) VALUES (?, ?)")
            .bind(title)
            .bind(artist_id)
            .execute(pool)
            .await?;
        Ok(result.last_insert_rowid())
    }
}

pub async fn get_artist(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<Artist>> {
    sqlx::query_as::<_, Artist>(
        "SELECT id, name, sort_name, mbid, biography, profile_image_url, \
         background_image_url, tags FROM artists WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Get an album with its artist's name and MBID joined in.
pub async fn get_album(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<Album>> {
    sqlx::query_as::<_, Album>(
        r#"
        SELECT al.id, al.title, al.artist_id,
               ar.name AS artist_name, ar.mbid AS artist_mbid,
               al.mbid, al.description, al.cover_url, al.tags
        FROM albums al
        LEFT JOIN artists ar ON al.artist_id = ar.id
        WHERE al.id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn list_artists(pool: &SqlitePool) -> sqlx::Result<Vec<Artist>> {
    sqlx::query_as::<_, Artist>(
        "SELECT id, name, sort_name, mbid, biography, profile_image_url, \
         background_image_url, tags FROM artists ORDER BY COALESCE(sort_name, name)",
    )
    .fetch_all(pool)
    .await
}

/// Load an artist or album as a [`LibraryEntity`].
pub async fn load_entity(
    pool: &SqlitePool,
    entity_type: EntityType,
    id: i64,
) -> sqlx::Result<Option<LibraryEntity>> {
    Ok(match entity_type {
        EntityType::Artist => get_artist(pool, id).await?.map(LibraryEntity::from),
        EntityType::Album => get_album(pool, id).await?.map(LibraryEntity::from),
    })
}

/// Write one metadata field to an artist or album.
///
/// Returns false when no row with that id exists.
pub async fn apply_field<'e, E>(
    executor: E,
    entity_type: EntityType,
    id: i64,
    field: MetadataField,
    value: &str,
) -> Result<bool, EnrichmentError>
where
    E: SqliteExecutor<'e>,
{
    let column = field.column(entity_type).ok_or_else(|| {
        EnrichmentError::Validation(format!("{} has no field '{}'", entity_type, field))
    })?;
    let table = match entity_type {
        EntityType::Artist => "artists",
        EntityType::Album => "albums",
    };

    // table and column are both from fixed mappings
    let sql = format!("UPDATE {} SET {} = ? WHERE id = ?", table, column);
    let result = sqlx::query(&sql)
        .bind(value)
        .bind(id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{seed_album, seed_artist, temp_db};

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let (pool, _dir) = temp_db().await;

        let a = get_or_create_artist(&pool, "Portishead").await.unwrap();
        let b = get_or_create_artist(&pool, "Portishead").await.unwrap();
        assert_eq!(a, b);

        let x = get_or_create_album(&pool, "Dummy", Some(a)).await.unwrap();
        let y = get_or_create_album(&pool, "Dummy", Some(a)).await.unwrap();
        assert_eq!(x, y);
    }

    #[tokio::test]
    async fn test_album_joins_artist() {
        let (pool, _dir) = temp_db().await;
        let artist_id = seed_artist(&pool, "Massive Attack", Some("10adbe5e-a2c0-4bf3-8249-2b4cbf6e6ca8")).await;
        let album_id = seed_album(&pool, "Mezzanine", Some(artist_id)).await;

        let entity = load_entity(&pool, EntityType::Album, album_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entity.name, "Mezzanine");
        assert_eq!(entity.artist_name.as_deref(), Some("Massive Attack"));
        assert_eq!(
            entity.artist_mbid.as_deref(),
            Some("10adbe5e-a2c0-4bf3-8249-2b4cbf6e6ca8")
        );
    }

    #[tokio::test]
    async fn test_apply_field_uses_column_mapping() {
        let (pool, _dir) = temp_db().await;
        let album_id = seed_album(&pool, "Dummy", None).await;

        let applied = apply_field(&pool, EntityType::Album, album_id, MetadataField::Biography, "Debut album")
            .await
            .unwrap();
        assert!(applied);

        let album = get_album(&pool, album_id).await.unwrap().unwrap();
        assert_eq!(album.description.as_deref(), Some("Debut album"));
    }

    #[tokio::test]
    async fn test_apply_field_rejects_unsupported_field() {
        let (pool, _dir) = temp_db().await;
        let album_id = seed_album(&pool, "Dummy", None).await;

        let result = apply_field(&pool, EntityType::Album, album_id, MetadataField::ProfileImage, "x.jpg").await;
        assert!(matches!(result, Err(EnrichmentError::Validation(_))));
    }

    #[tokio::test]
    async fn test_apply_field_missing_row() {
        let (pool, _dir) = temp_db().await;
        let applied = apply_field(&pool, EntityType::Artist, 999, MetadataField::Tags, "rock")
            .await
            .unwrap();
        assert!(!applied);
    }

    #[test]
    fn test_timestamps_sort_as_strings() {
        let early = timestamp(DateTime::from_timestamp(1_700_000_000, 0).unwrap());
        let late = timestamp(DateTime::from_timestamp(1_700_000_001, 500_000_000).unwrap());
        assert!(early < late);
        assert!(early.ends_with('Z'));
        assert_eq!(parse_timestamp(&early).unwrap().timestamp(), 1_700_000_000);
    }
}
