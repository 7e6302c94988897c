//! Enrichment run records.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use sqlx::FromRow;
use sqlx::sqlite::SqlitePool;

use crate::enrichment::EnrichmentError;
use crate::enrichment::domain::RunOutcome;
use crate::model::EntityType;

/// Lifecycle of a run row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Error => "error",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = EnrichmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "error" => Ok(RunStatus::Error),
            other => Err(EnrichmentError::Validation(format!(
                "unknown run status '{}'",
                other
            ))),
        }
    }
}

/// Raw run row.
#[derive(Debug, Clone, FromRow)]
pub struct RunRow {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: i64,
    pub status: String,
    pub outcome: Option<String>,
    pub triggered_by: String,
    pub error_message: Option<String>,
    pub started_at: String,
    pub finished_at: Option<String>,
}

/// A persisted enrichment run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentRun {
    pub id: i64,
    pub entity_type: EntityType,
    pub entity_id: i64,
    pub status: RunStatus,
    pub outcome: Option<RunOutcome>,
    pub triggered_by: String,
    pub error_message: Option<String>,
    pub started_at: String,
    pub finished_at: Option<String>,
}

impl TryFrom<RunRow> for EnrichmentRun {
    type Error = EnrichmentError;

    fn try_from(row: RunRow) -> Result<Self, Self::Error> {
        Ok(EnrichmentRun {
            id: row.id,
            entity_type: row.entity_type.parse()?,
            entity_id: row.entity_id,
            status: row.status.parse()?,
            outcome: row.outcome.and_then(|o| o.parse().ok()),
            triggered_by: row.triggered_by,
            error_message: row.error_message,
            started_at: row.started_at,
            finished_at: row.finished_at,
        })
    }
}

/// Open a run in `running` state.
pub async fn insert_run(
    pool: &SqlitePool,
    entity_type: EntityType,
    entity_id: i64,
    triggered_by: &str,
) -> sqlx::Result<i64> {
    let result = sqlx::query(
        "INSERT INTO enrichment_runs (entity_type, entity_id, status, triggered_by, started_at) \
         VALUES (?, ?, 'running', ?, ?)",
    )
    .bind(entity_type.as_str())
    .bind(entity_id)
    .bind(triggered_by)
    .bind(super::now())
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Close a run.
pub async fn finish_run(
    pool: &SqlitePool,
    run_id: i64,
    status: RunStatus,
    outcome: Option<RunOutcome>,
    error_message: Option<&str>,
) -> sqlx::Result<()> {
    sqlx::query(
        "UPDATE enrichment_runs SET status = ?, outcome = ?, error_message = ?, finished_at = ? \
         WHERE id = ?",
    )
    .bind(status.as_str())
    .bind(outcome.map(|o| o.as_str()))
    .bind(error_message)
    .bind(super::now())
    .bind(run_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_run(pool: &SqlitePool, run_id: i64) -> Result<Option<EnrichmentRun>, EnrichmentError> {
    let row: Option<RunRow> = sqlx::query_as("SELECT * FROM enrichment_runs WHERE id = ?")
        .bind(run_id)
        .fetch_optional(pool)
        .await?;
    row.map(EnrichmentRun::try_from).transpose()
}

/// Runs for one entity, newest first.
pub async fn runs_for_entity(
    pool: &SqlitePool,
    entity_type: EntityType,
    entity_id: i64,
) -> Result<Vec<EnrichmentRun>, EnrichmentError> {
    let rows: Vec<RunRow> = sqlx::query_as(
        "SELECT * FROM enrichment_runs WHERE entity_type = ? AND entity_id = ? ORDER BY id DESC",
    )
    .bind(entity_type.as_str())
    .bind(entity_id)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(EnrichmentRun::try_from).collect()
}

/// Mark runs left `running` by a previous process as failed.
pub async fn fail_abandoned_runs(pool: &SqlitePool) -> sqlx::Result<u64> {
    let result = sqlx::query(
        "UPDATE enrichment_runs SET status = 'error', outcome = 'error', \
         error_message = 'abandoned', finished_at = ? WHERE status = 'running'",
    )
    .bind(super::now())
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
