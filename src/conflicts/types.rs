//! Conflict types.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use sqlx::FromRow;

use crate::enrichment::EnrichmentError;
use crate::model::{EntityType, MetadataField, Provider};

/// Review state of a conflict. Everything but `Pending` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStatus {
    Pending,
    Accepted,
    Rejected,
    /// Hidden from default listings
    Ignored,
}

impl ConflictStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStatus::Pending => "pending",
            ConflictStatus::Accepted => "accepted",
            ConflictStatus::Rejected => "rejected",
            ConflictStatus::Ignored => "ignored",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConflictStatus::Pending)
    }
}

impl fmt::Display for ConflictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictStatus {
    type Err = EnrichmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(ConflictStatus::Pending),
            "accepted" => Ok(ConflictStatus::Accepted),
            "rejected" => Ok(ConflictStatus::Rejected),
            "ignored" => Ok(ConflictStatus::Ignored),
            other => Err(EnrichmentError::Validation(format!(
                "unknown conflict status '{}'",
                other
            ))),
        }
    }
}

/// What a reviewer decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveAction {
    /// Apply the proposed value
    Accept,
    /// Keep the current value
    Reject,
    /// Keep the current value and hide the conflict
    Ignore,
}

impl ResolveAction {
    pub fn status(&self) -> ConflictStatus {
        match self {
            ResolveAction::Accept => ConflictStatus::Accepted,
            ResolveAction::Reject => ConflictStatus::Rejected,
            ResolveAction::Ignore => ConflictStatus::Ignored,
        }
    }
}

impl FromStr for ResolveAction {
    type Err = EnrichmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accept" => Ok(ResolveAction::Accept),
            "reject" => Ok(ResolveAction::Reject),
            "ignore" => Ok(ResolveAction::Ignore),
            other => Err(EnrichmentError::Validation(format!(
                "unknown action '{}', expected accept, reject or ignore",
                other
            ))),
        }
    }
}

/// Raw `metadata_conflicts` row.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct ConflictRow {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: i64,
    pub entity_name: String,
    pub provider: String,
    pub field: String,
    pub proposed_value: String,
    pub previous_value: Option<String>,
    pub confidence: Option<f64>,
    pub status: String,
    pub created_at: String,
    pub resolved_at: Option<String>,
    pub resolved_by: Option<String>,
}

/// A provider proposal awaiting (or past) human review.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataConflict {
    pub id: i64,
    pub entity_type: EntityType,
    pub entity_id: i64,
    /// Denormalized for display
    pub entity_name: String,
    pub provider: Provider,
    pub field: MetadataField,
    pub proposed_value: String,
    pub previous_value: Option<String>,
    pub confidence: Option<f64>,
    pub status: ConflictStatus,
    pub created_at: String,
    pub resolved_at: Option<String>,
    pub resolved_by: Option<String>,
}

impl TryFrom<ConflictRow> for MetadataConflict {
    type Error = EnrichmentError;

    fn try_from(row: ConflictRow) -> Result<Self, Self::Error> {
        Ok(MetadataConflict {
            id: row.id,
            entity_type: row.entity_type.parse()?,
            entity_id: row.entity_id,
            entity_name: row.entity_name,
            provider: row.provider.parse()?,
            field: row.field.parse()?,
            proposed_value: row.proposed_value,
            previous_value: row.previous_value,
            confidence: row.confidence,
            status: row.status.parse()?,
            created_at: row.created_at,
            resolved_at: row.resolved_at,
            resolved_by: row.resolved_by,
        })
    }
}

/// A proposal to queue.
#[derive(Debug, Clone, PartialEq)]
pub struct NewConflict {
    pub entity_type: EntityType,
    pub entity_id: i64,
    pub entity_name: String,
    pub provider: Provider,
    pub field: MetadataField,
    pub proposed_value: String,
    pub previous_value: Option<String>,
    pub confidence: Option<f64>,
}

/// Listing filters. With no status, ignored conflicts are left out.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictFilter {
    pub entity_type: Option<EntityType>,
    pub provider: Option<Provider>,
    pub status: Option<ConflictStatus>,
    pub skip: i64,
    pub take: i64,
}

/// Upper bound on `take`
pub const MAX_PAGE_SIZE: i64 = 200;

impl Default for ConflictFilter {
    fn default() -> Self {
        Self {
            entity_type: None,
            provider: None,
            status: None,
            skip: 0,
            take: 50,
        }
    }
}

/// One page of conflicts plus the unpaged total.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictPage {
    pub items: Vec<MetadataConflict>,
    pub total: i64,
    pub skip: i64,
    pub take: i64,
}
