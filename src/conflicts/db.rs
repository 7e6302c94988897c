//! Conflict store queries.
//!
//! Two rules keep the table consistent under concurrent writers:
//! - the partial unique index allows one pending row per
//!   (entity, field, provider); new proposals update that row in place
//! - resolution is a compare-and-set on `status = 'pending'`

use sqlx::SqliteExecutor;
use sqlx::sqlite::SqlitePool;
use tracing::{debug, info};

use super::types::{
    ConflictFilter, ConflictPage, ConflictRow, ConflictStatus, MAX_PAGE_SIZE, MetadataConflict,
    NewConflict, ResolveAction,
};
use crate::db;
use crate::enrichment::EnrichmentError;
use crate::model::{EntityType, MetadataField, Provider};

/// Queue a proposal, superseding any pending one for the same key.
///
/// Returns the id of the pending row.
pub async fn upsert_pending<'e, E>(executor: E, conflict: &NewConflict) -> Result<i64, EnrichmentError>
where
    E: SqliteExecutor<'e>,
{
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO metadata_conflicts
            (entity_type, entity_id, entity_name, provider, field,
             proposed_value, previous_value, confidence, status, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?)
        ON CONFLICT(entity_type, entity_id, field, provider) WHERE status = 'pending'
        DO UPDATE SET
            entity_name = excluded.entity_name,
            proposed_value = excluded.proposed_value,
            previous_value = excluded.previous_value,
            confidence = excluded.confidence,
            created_at = excluded.created_at
        RETURNING id
        "#,
    )
    .bind(conflict.entity_type.as_str())
    .bind(conflict.entity_id)
    .bind(&conflict.entity_name)
    .bind(conflict.provider.as_str())
    .bind(conflict.field.as_str())
    .bind(&conflict.proposed_value)
    .bind(&conflict.previous_value)
    .bind(conflict.confidence)
    .bind(db::now())
    .fetch_one(executor)
    .await?;

    debug!(
        id,
        entity = %conflict.entity_type,
        entity_id = conflict.entity_id,
        field = %conflict.field,
        provider = %conflict.provider,
        "Queued conflict"
    );
    Ok(id)
}

pub async fn get_conflict<'e, E>(executor: E, id: i64) -> Result<Option<MetadataConflict>, EnrichmentError>
where
    E: SqliteExecutor<'e>,
{
    let row: Option<ConflictRow> = sqlx::query_as("SELECT * FROM metadata_conflicts WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    row.map(MetadataConflict::try_from).transpose()
}

/// Filtered, paged listing, newest first.
pub async fn list_conflicts(
    pool: &SqlitePool,
    filter: &ConflictFilter,
) -> Result<ConflictPage, EnrichmentError> {
    if filter.skip < 0 || filter.take < 1 {
        return Err(EnrichmentError::Validation(
            "skip must be >= 0 and take >= 1".to_string(),
        ));
    }
    let take = filter.take.min(MAX_PAGE_SIZE);

    let entity_type = filter.entity_type.map(|e| e.as_str());
    let provider = filter.provider.map(|p| p.as_str());
    let status = filter.status.map(|s| s.as_str());

    const WHERE: &str = r#"
        WHERE (? IS NULL OR entity_type = ?)
          AND (? IS NULL OR provider = ?)
          AND ((? IS NULL AND status != 'ignored') OR status = ?)
    "#;

    let (total,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM metadata_conflicts {}", WHERE))
        .bind(entity_type)
        .bind(entity_type)
        .bind(provider)
        .bind(provider)
        .bind(status)
        .bind(status)
        .fetch_one(pool)
        .await?;

    let rows: Vec<ConflictRow> = sqlx::query_as(&format!(
        "SELECT * FROM metadata_conflicts {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        WHERE
    ))
    .bind(entity_type)
    .bind(entity_type)
    .bind(provider)
    .bind(provider)
    .bind(status)
    .bind(status)
    .bind(take)
    .bind(filter.skip)
    .fetch_all(pool)
    .await?;

    let items = rows
        .into_iter()
        .map(MetadataConflict::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ConflictPage {
        items,
        total,
        skip: filter.skip,
        take,
    })
}

pub async fn count_pending<'e, E>(executor: E) -> Result<i64, EnrichmentError>
where
    E: SqliteExecutor<'e>,
{
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM metadata_conflicts WHERE status = 'pending'")
            .fetch_one(executor)
            .await?;
    Ok(count)
}

/// Whether a reviewer already turned down this exact value.
pub async fn was_dismissed<'e, E>(
    executor: E,
    entity_type: EntityType,
    entity_id: i64,
    field: MetadataField,
    provider: Provider,
    value: &str,
) -> Result<bool, EnrichmentError>
where
    E: SqliteExecutor<'e>,
{
    let (count,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM metadata_conflicts
        WHERE entity_type = ? AND entity_id = ? AND field = ? AND provider = ?
          AND proposed_value = ? AND status IN ('rejected', 'ignored')
        "#,
    )
    .bind(entity_type.as_str())
    .bind(entity_id)
    .bind(field.as_str())
    .bind(provider.as_str())
    .bind(value)
    .fetch_one(executor)
    .await?;
    Ok(count > 0)
}

/// Move a pending conflict to a terminal state.
///
/// Returns None if the row is missing or no longer pending.
pub async fn mark_resolved<'e, E>(
    executor: E,
    id: i64,
    status: ConflictStatus,
    resolved_by: Option<&str>,
) -> Result<Option<MetadataConflict>, EnrichmentError>
where
    E: SqliteExecutor<'e>,
{
    let row: Option<ConflictRow> = sqlx::query_as(
        r#"
        UPDATE metadata_conflicts
        SET status = ?, resolved_at = ?, resolved_by = ?
        WHERE id = ? AND status = 'pending'
        RETURNING *
        "#,
    )
    .bind(status.as_str())
    .bind(db::now())
    .bind(resolved_by)
    .bind(id)
    .fetch_optional(executor)
    .await?;
    row.map(MetadataConflict::try_from).transpose()
}

/// Resolve a conflict; accepting writes the proposed value in the same
/// transaction.
pub async fn resolve(
    pool: &SqlitePool,
    id: i64,
    action: ResolveAction,
    resolved_by: Option<&str>,
) -> Result<MetadataConflict, EnrichmentError> {
    let mut tx = pool.begin().await?;

    let Some(conflict) = mark_resolved(&mut *tx, id, action.status(), resolved_by).await? else {
        return Err(match get_conflict(&mut *tx, id).await? {
            Some(existing) => EnrichmentError::ConflictAlreadyResolved {
                id,
                status: existing.status,
            },
            None => EnrichmentError::ConflictNotFound(id),
        });
    };

    if action == ResolveAction::Accept {
        let applied = db::apply_field(
            &mut *tx,
            conflict.entity_type,
            conflict.entity_id,
            conflict.field,
            &conflict.proposed_value,
        )
        .await?;
        if !applied {
            // dropping the transaction rolls the status change back
            return Err(EnrichmentError::Validation(format!(
                "{} {} no longer exists",
                conflict.entity_type, conflict.entity_id
            )));
        }
    }

    tx.commit().await?;

    info!(
        id,
        status = %conflict.status,
        field = %conflict.field,
        provider = %conflict.provider,
        "Resolved conflict"
    );
    Ok(conflict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{seed_artist, temp_db};

    fn bio_conflict(entity_id: i64, value: &str) -> NewConflict {
        NewConflict {
            entity_type: EntityType::Artist,
            entity_id,
            entity_name: "Portishead".to_string(),
            provider: Provider::LastFm,
            field: MetadataField::Biography,
            proposed_value: value.to_string(),
            previous_value: None,
            confidence: None,
        }
    }

    #[tokio::test]
    async fn test_new_proposal_supersedes_pending() {
        let (pool, _dir) = temp_db().await;
        let artist = seed_artist(&pool, "Portishead", None).await;

        let first = upsert_pending(&pool, &bio_conflict(artist, "Old bio")).await.unwrap();
        let second = upsert_pending(&pool, &bio_conflict(artist, "New bio")).await.unwrap();
        assert_eq!(first, second);

        let page = list_conflicts(&pool, &ConflictFilter::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].proposed_value, "New bio");
    }

    #[tokio::test]
    async fn test_resolved_row_does_not_block_new_pending() {
        let (pool, _dir) = temp_db().await;
        let artist = seed_artist(&pool, "Portishead", None).await;

        let first = upsert_pending(&pool, &bio_conflict(artist, "A")).await.unwrap();
        resolve(&pool, first, ResolveAction::Reject, None).await.unwrap();
        let second = upsert_pending(&pool, &bio_conflict(artist, "B")).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(count_pending(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_accept_applies_value_once() {
        let (pool, _dir) = temp_db().await;
        let artist = seed_artist(&pool, "Portishead", None).await;
        let id = upsert_pending(&pool, &bio_conflict(artist, "Trip-hop pioneers")).await.unwrap();

        let accepted = resolve(&pool, id, ResolveAction::Accept, Some("reviewer")).await.unwrap();
        assert_eq!(accepted.status, ConflictStatus::Accepted);
        assert_eq!(accepted.resolved_by.as_deref(), Some("reviewer"));
        assert!(accepted.resolved_at.is_some());

        let stored = db::get_artist(&pool, artist).await.unwrap().unwrap();
        assert_eq!(stored.biography.as_deref(), Some("Trip-hop pioneers"));

        let again = resolve(&pool, id, ResolveAction::Accept, None).await;
        assert_eq!(
            again.unwrap_err(),
            EnrichmentError::ConflictAlreadyResolved {
                id,
                status: ConflictStatus::Accepted
            }
        );
    }

    #[tokio::test]
    async fn test_reject_leaves_entity_alone() {
        let (pool, _dir) = temp_db().await;
        let artist = seed_artist(&pool, "Portishead", None).await;
        let id = upsert_pending(&pool, &bio_conflict(artist, "Wrong band")).await.unwrap();

        resolve(&pool, id, ResolveAction::Reject, None).await.unwrap();

        let stored = db::get_artist(&pool, artist).await.unwrap().unwrap();
        assert!(stored.biography.is_none());
        assert!(
            was_dismissed(&pool, EntityType::Artist, artist, MetadataField::Biography, Provider::LastFm, "Wrong band")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_accept_for_missing_entity_rolls_back() {
        let (pool, _dir) = temp_db().await;
        let id = upsert_pending(&pool, &bio_conflict(404, "Orphan")).await.unwrap();

        let result = resolve(&pool, id, ResolveAction::Accept, None).await;
        assert!(matches!(result, Err(EnrichmentError::Validation(_))));

        let conflict = get_conflict(&pool, id).await.unwrap().unwrap();
        assert_eq!(conflict.status, ConflictStatus::Pending);
    }

    #[tokio::test]
    async fn test_unknown_id() {
        let (pool, _dir) = temp_db().await;
        let result = resolve(&pool, 77, ResolveAction::Ignore, None).await;
        assert_eq!(result.unwrap_err(), EnrichmentError::ConflictNotFound(77));
    }

    #[tokio::test]
    async fn test_ignored_hidden_by_default() {
        let (pool, _dir) = temp_db().await;
        let artist = seed_artist(&pool, "Portishead", None).await;
        let id = upsert_pending(&pool, &bio_conflict(artist, "Meh")).await.unwrap();
        resolve(&pool, id, ResolveAction::Ignore, None).await.unwrap();

        let default_page = list_conflicts(&pool, &ConflictFilter::default()).await.unwrap();
        assert_eq!(default_page.total, 0);

        let ignored = list_conflicts(
            &pool,
            &ConflictFilter {
                status: Some(ConflictStatus::Ignored),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(ignored.items.len(), 1);
    }

    #[tokio::test]
    async fn test_filters_and_paging() {
        let (pool, _dir) = temp_db().await;
        for i in 0..5 {
            let artist = seed_artist(&pool, &format!("Artist {}", i), None).await;
            upsert_pending(&pool, &bio_conflict(artist, "Bio")).await.unwrap();
        }
        upsert_pending(
            &pool,
            &NewConflict {
                provider: Provider::FanartTv,
                field: MetadataField::ProfileImage,
                proposed_value: "https://img/x.jpg".to_string(),
                ..bio_conflict(1, "")
            },
        )
        .await
        .unwrap();

        let page = list_conflicts(
            &pool,
            &ConflictFilter {
                provider: Some(Provider::LastFm),
                skip: 3,
                take: 10,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);

        let bad = list_conflicts(&pool, &ConflictFilter { take: 0, ..Default::default() }).await;
        assert!(matches!(bad, Err(EnrichmentError::Validation(_))));
    }
}
