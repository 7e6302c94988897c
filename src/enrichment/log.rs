//! Enrichment audit log and statistics.
//!
//! One row per provider attempt per run. Rows are never updated.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Duration, Utc};
use serde::Serialize;
use sqlx::FromRow;
use sqlx::sqlite::SqlitePool;

use super::domain::EnrichmentError;
use crate::conflicts;
use crate::db;
use crate::model::{EntityType, MetadataField, Provider};

/// Outcome of one provider attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Success,
    /// Returned data, but some fields were refused
    Partial,
    Error,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStatus::Success => "success",
            LogStatus::Partial => "partial",
            LogStatus::Error => "error",
        }
    }
}

impl fmt::Display for LogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogStatus {
    type Err = EnrichmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(LogStatus::Success),
            "partial" => Ok(LogStatus::Partial),
            "error" => Ok(LogStatus::Error),
            other => Err(EnrichmentError::Validation(format!(
                "unknown log status '{}'",
                other
            ))),
        }
    }
}

/// A log row to append.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLogEntry {
    pub run_id: Option<i64>,
    pub entity_type: EntityType,
    pub entity_id: i64,
    pub entity_name: String,
    pub provider: Provider,
    /// What was looked up, e.g. "artist_info" or "cover"
    pub metadata_type: String,
    pub status: LogStatus,
    pub fields_updated: Vec<MetadataField>,
    pub error_message: Option<String>,
    pub preview_url: Option<String>,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, FromRow)]
struct LogRow {
    id: i64,
    run_id: Option<i64>,
    entity_id: i64,
    entity_type: String,
    entity_name: String,
    provider: String,
    metadata_type: String,
    status: String,
    fields_updated: String,
    error_message: Option<String>,
    preview_url: Option<String>,
    processing_time_ms: i64,
    created_at: String,
}

/// A stored log row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentLog {
    pub id: i64,
    pub run_id: Option<i64>,
    pub entity_id: i64,
    pub entity_type: EntityType,
    pub entity_name: String,
    pub provider: Provider,
    pub metadata_type: String,
    pub status: LogStatus,
    pub fields_updated: Vec<MetadataField>,
    pub error_message: Option<String>,
    pub preview_url: Option<String>,
    pub processing_time_ms: u64,
    pub created_at: String,
}

impl TryFrom<LogRow> for EnrichmentLog {
    type Error = EnrichmentError;

    fn try_from(row: LogRow) -> Result<Self, Self::Error> {
        let fields_updated: Vec<MetadataField> = serde_json::from_str(&row.fields_updated)
            .map_err(|e| EnrichmentError::Infrastructure(format!("corrupt fields_updated: {}", e)))?;

        Ok(EnrichmentLog {
            id: row.id,
            run_id: row.run_id,
            entity_id: row.entity_id,
            entity_type: row.entity_type.parse()?,
            entity_name: row.entity_name,
            provider: row.provider.parse()?,
            metadata_type: row.metadata_type,
            status: row.status.parse()?,
            fields_updated,
            error_message: row.error_message,
            preview_url: row.preview_url,
            processing_time_ms: row.processing_time_ms.max(0) as u64,
            created_at: row.created_at,
        })
    }
}

pub async fn insert_log(pool: &SqlitePool, entry: &NewLogEntry) -> Result<i64, EnrichmentError> {
    let fields = serde_json::to_string(&entry.fields_updated)
        .map_err(|e| EnrichmentError::Infrastructure(e.to_string()))?;

    let result = sqlx::query(
        r#"
        INSERT INTO enrichment_log
            (run_id, entity_id, entity_type, entity_name, provider, metadata_type,
             status, fields_updated, error_message, preview_url, processing_time_ms, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.run_id)
    .bind(entry.entity_id)
    .bind(entry.entity_type.as_str())
    .bind(&entry.entity_name)
    .bind(entry.provider.as_str())
    .bind(&entry.metadata_type)
    .bind(entry.status.as_str())
    .bind(fields)
    .bind(&entry.error_message)
    .bind(&entry.preview_url)
    .bind(entry.processing_time_ms as i64)
    .bind(db::now())
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Log rows for one run, in insertion order.
pub async fn logs_for_run(pool: &SqlitePool, run_id: i64) -> Result<Vec<EnrichmentLog>, EnrichmentError> {
    let rows: Vec<LogRow> = sqlx::query_as("SELECT * FROM enrichment_log WHERE run_id = ? ORDER BY id")
        .bind(run_id)
        .fetch_all(pool)
        .await?;
    rows.into_iter().map(EnrichmentLog::try_from).collect()
}

/// Most recent log rows.
pub async fn recent_logs(pool: &SqlitePool, limit: i64) -> Result<Vec<EnrichmentLog>, EnrichmentError> {
    let rows: Vec<LogRow> = sqlx::query_as("SELECT * FROM enrichment_log ORDER BY id DESC LIMIT ?")
        .bind(limit.max(1))
        .fetch_all(pool)
        .await?;
    rows.into_iter().map(EnrichmentLog::try_from).collect()
}

/// Statistics window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsPeriod {
    Day,
    #[default]
    Week,
    Month,
    All,
}

impl StatsPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatsPeriod::Day => "day",
            StatsPeriod::Week => "week",
            StatsPeriod::Month => "month",
            StatsPeriod::All => "all",
        }
    }

    /// Lower bound in storage format, None for all time.
    fn since(&self) -> Option<String> {
        let window = match self {
            StatsPeriod::Day => Duration::days(1),
            StatsPeriod::Week => Duration::days(7),
            StatsPeriod::Month => Duration::days(30),
            StatsPeriod::All => return None,
        };
        Some(db::timestamp(Utc::now() - window))
    }
}

impl FromStr for StatsPeriod {
    type Err = EnrichmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(StatsPeriod::Day),
            "week" => Ok(StatsPeriod::Week),
            "month" => Ok(StatsPeriod::Month),
            "all" => Ok(StatsPeriod::All),
            other => Err(EnrichmentError::Validation(format!(
                "unknown period '{}', expected day, week, month or all",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStats {
    pub attempts: i64,
    pub successes: i64,
    pub partials: i64,
    pub errors: i64,
    pub avg_processing_time_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentStats {
    pub period: StatsPeriod,
    pub total_attempts: i64,
    pub by_status: BTreeMap<LogStatus, i64>,
    pub by_provider: BTreeMap<Provider, ProviderStats>,
    pub fields_updated: i64,
    pub runs: i64,
    pub pending_conflicts: i64,
}

pub async fn get_stats(pool: &SqlitePool, period: StatsPeriod) -> Result<EnrichmentStats, EnrichmentError> {
    let since = period.since();

    let rows: Vec<(String, String, i64, f64)> = sqlx::query_as(
        r#"
        SELECT provider, status, COUNT(*), COALESCE(AVG(processing_time_ms), 0.0)
        FROM enrichment_log
        WHERE (? IS NULL OR created_at >= ?)
        GROUP BY provider, status
        "#,
    )
    .bind(&since)
    .bind(&since)
    .fetch_all(pool)
    .await?;

    let mut by_status: BTreeMap<LogStatus, i64> = BTreeMap::new();
    let mut by_provider: BTreeMap<Provider, ProviderStats> = BTreeMap::new();
    let mut total_attempts = 0;
    // weighted sums, divided once all groups are in
    let mut time_totals: BTreeMap<Provider, f64> = BTreeMap::new();

    for (provider, status, count, avg_ms) in rows {
        let provider: Provider = provider.parse()?;
        let status: LogStatus = status.parse()?;

        total_attempts += count;
        *by_status.entry(status).or_default() += count;

        let stats = by_provider.entry(provider).or_default();
        stats.attempts += count;
        match status {
            LogStatus::Success => stats.successes += count,
            LogStatus::Partial => stats.partials += count,
            LogStatus::Error => stats.errors += count,
        }
        *time_totals.entry(provider).or_default() += avg_ms * count as f64;
    }

    for (provider, stats) in by_provider.iter_mut() {
        if stats.attempts > 0 {
            stats.avg_processing_time_ms =
                time_totals.get(provider).copied().unwrap_or_default() / stats.attempts as f64;
        }
    }

    let (fields_updated,): (i64,) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(json_array_length(fields_updated)), 0)
        FROM enrichment_log
        WHERE (? IS NULL OR created_at >= ?)
        "#,
    )
    .bind(&since)
    .bind(&since)
    .fetch_one(pool)
    .await?;

    let (runs,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM enrichment_runs WHERE (? IS NULL OR started_at >= ?)")
            .bind(&since)
            .bind(&since)
            .fetch_one(pool)
            .await?;

    let pending_conflicts = conflicts::count_pending(pool).await?;

    Ok(EnrichmentStats {
        period,
        total_attempts,
        by_status,
        by_provider,
        fields_updated,
        runs,
        pending_conflicts,
    })
}
