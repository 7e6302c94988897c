//! Internal domain models for metadata enrichment.
//!
//! These types are OUR types - they don't change when external APIs change.
//! Every provider response gets converted into [`ProviderMetadata`] by its
//! adapter, and every failure into an [`EnrichmentError`] variant.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conflicts::ConflictStatus;
use crate::model::{EntityType, MetadataField, Provider};

/// Why an image was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImageRejection {
    /// MIME type not in the jpeg/png/webp allow-list
    InvalidContentType,
    /// Payload exceeds the configured size limit
    FileTooLarge,
    /// Width/height could not be determined
    InvalidDimensions,
    /// Bytes are not a decodable image
    InvalidImage,
    /// The upstream fetch itself failed
    DownloadFailed,
}

impl ImageRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageRejection::InvalidContentType => "INVALID_CONTENT_TYPE",
            ImageRejection::FileTooLarge => "FILE_TOO_LARGE",
            ImageRejection::InvalidDimensions => "INVALID_DIMENSIONS",
            ImageRejection::InvalidImage => "INVALID_IMAGE",
            ImageRejection::DownloadFailed => "DOWNLOAD_FAILED",
        }
    }
}

impl fmt::Display for ImageRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during enrichment
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EnrichmentError {
    #[error("{provider} request failed ({}): {http_status_text} [{url}]", status_label(.http_status))]
    ExternalApi {
        provider: Provider,
        /// None when the request never produced a response
        http_status: Option<u16>,
        http_status_text: String,
        url: String,
    },

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64, operation: String },

    #[error("Image rejected: {reason}")]
    ImageProcessing { reason: ImageRejection },

    #[error("Storage unavailable: {0}")]
    Infrastructure(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Conflict {id} was already resolved ({status})")]
    ConflictAlreadyResolved { id: i64, status: ConflictStatus },

    #[error("Conflict {0} not found")]
    ConflictNotFound(i64),

    #[error("Enrichment already running for {entity_type} {entity_id}")]
    AlreadyRunning {
        entity_type: EntityType,
        entity_id: i64,
    },

    #[error("Enrichment cancelled")]
    Cancelled,
}

fn status_label(status: &Option<u16>) -> String {
    status
        .map(|s| format!("HTTP {}", s))
        .unwrap_or_else(|| "network".to_string())
}

impl EnrichmentError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            EnrichmentError::ExternalApi { .. } => "EXTERNAL_API_ERROR",
            EnrichmentError::Timeout { .. } => "TIMEOUT_ERROR",
            EnrichmentError::ImageProcessing { .. } => "IMAGE_PROCESSING_ERROR",
            EnrichmentError::Infrastructure(_) => "INFRASTRUCTURE_ERROR",
            EnrichmentError::Validation(_) => "VALIDATION_ERROR",
            EnrichmentError::ConflictAlreadyResolved { .. } => "CONFLICT_ALREADY_RESOLVED",
            EnrichmentError::ConflictNotFound(_) => "CONFLICT_NOT_FOUND",
            EnrichmentError::AlreadyRunning { .. } => "ENRICHMENT_ALREADY_RUNNING",
            EnrichmentError::Cancelled => "CANCELLED",
        }
    }

    /// HTTP status of an upstream failure, if one was received.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            EnrichmentError::ExternalApi { http_status, .. } => *http_status,
            _ => None,
        }
    }

    /// Whether the error only affects the provider/field that produced it.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EnrichmentError::ExternalApi { .. }
                | EnrichmentError::Timeout { .. }
                | EnrichmentError::ImageProcessing { .. }
        )
    }

    pub fn image(reason: ImageRejection) -> Self {
        EnrichmentError::ImageProcessing { reason }
    }
}

impl From<sqlx::Error> for EnrichmentError {
    fn from(e: sqlx::Error) -> Self {
        EnrichmentError::Infrastructure(e.to_string())
    }
}

/// What kind of picture an image candidate is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    /// Artist portrait / thumbnail
    Profile,
    /// Wide artist backdrop
    Background,
    /// Album front cover
    Cover,
}

impl ImageKind {
    pub fn field(&self) -> MetadataField {
        match self {
            ImageKind::Profile => MetadataField::ProfileImage,
            ImageKind::Background => MetadataField::BackgroundImage,
            ImageKind::Cover => MetadataField::Cover,
        }
    }
}

/// An image a provider offers, best candidates first.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageCandidate {
    pub kind: ImageKind,
    pub url: String,
}

/// Metadata obtained from one provider, in the common field shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderMetadata {
    /// MusicBrainz ID confirmed by the provider
    pub mbid: Option<String>,
    pub biography: Option<String>,
    /// Ordered best-first within each kind
    pub images: Vec<ImageCandidate>,
    pub tags: Vec<String>,
}

/// Ranked images of one kind tried before the field is given up on.
pub const MAX_IMAGE_CANDIDATES: usize = 3;

impl ProviderMetadata {
    pub fn is_empty(&self) -> bool {
        self.mbid.is_none() && self.biography.is_none() && self.images.is_empty() && self.tags.is_empty()
    }

    /// Flatten into proposed values for the fields the entity type supports.
    ///
    /// Images keep the provider's ranking: up to [`MAX_IMAGE_CANDIDATES`] per
    /// kind, best first, so a later one can stand in when an earlier one
    /// fails validation. Fields the entity has no column for are dropped.
    pub fn into_proposals(self, entity_type: EntityType) -> Vec<(MetadataField, String)> {
        let mut proposals = Vec::new();

        if let Some(mbid) = self.mbid.filter(|m| !m.trim().is_empty()) {
            proposals.push((MetadataField::Mbid, mbid));
        }
        if let Some(bio) = self.biography.filter(|b| !b.trim().is_empty()) {
            proposals.push((MetadataField::Biography, bio));
        }

        for image in self.images {
            let field = image.kind.field();
            if image.url.trim().is_empty() {
                continue;
            }
            let ranked: Vec<&String> = proposals
                .iter()
                .filter(|(f, _)| *f == field)
                .map(|(_, url)| url)
                .collect();
            if ranked.len() >= MAX_IMAGE_CANDIDATES || ranked.contains(&&image.url) {
                continue;
            }
            proposals.push((field, image.url));
        }

        if !self.tags.is_empty() {
            proposals.push((MetadataField::Tags, self.tags.join(", ")));
        }

        proposals.retain(|(field, _)| field.column(entity_type).is_some());
        proposals
    }
}

/// A search hit from a provider's name search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCandidate {
    /// Provider id (MBID for MusicBrainz)
    pub id: String,
    /// Artist name or release group title
    pub name: String,
    /// Credited artist (release group searches)
    pub artist_name: Option<String>,
    /// Provider's own relevance score (0-100), informational only
    pub provider_score: Option<u8>,
}

/// What a provider is asked to fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchTarget {
    pub entity_type: EntityType,
    /// Artist name or album title
    pub name: String,
    /// For albums: the album artist
    pub artist_name: Option<String>,
    pub mbid: Option<String>,
    pub artist_mbid: Option<String>,
}

/// Output of one provider call within a run.
#[derive(Debug, Clone)]
pub struct ProviderResult {
    pub run_id: i64,
    pub provider: Provider,
    /// Proposed values keyed by field
    pub fields: BTreeMap<MetadataField, String>,
    pub confidence: Option<f64>,
    pub fetched_at: DateTime<Utc>,
    pub error: Option<EnrichmentError>,
    pub processing_time_ms: u64,
}

/// Overall outcome of a run or provider attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Success,
    Partial,
    Error,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Success => "success",
            RunOutcome::Partial => "partial",
            RunOutcome::Error => "error",
        }
    }

    /// Combine provider successes/failures into a run outcome.
    pub fn from_counts(succeeded: usize, failed: usize) -> Self {
        match (succeeded, failed) {
            (_, 0) => RunOutcome::Success,
            (0, _) => RunOutcome::Error,
            _ => RunOutcome::Partial,
        }
    }
}

impl std::str::FromStr for RunOutcome {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "success" => RunOutcome::Success,
            "partial" => RunOutcome::Partial,
            _ => RunOutcome::Error,
        })
    }
}

/// A provider that did not return usable data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderFailure {
    pub provider: Provider,
    pub code: String,
    pub message: String,
}

/// A field that was returned but refused before apply/queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedField {
    pub provider: Provider,
    pub field: MetadataField,
    pub reason: String,
}

/// Summary of a finished enrichment run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: i64,
    pub entity_type: EntityType,
    pub entity_id: i64,
    pub entity_name: String,
    pub outcome: RunOutcome,
    /// Fields committed directly to the entity
    pub fields_updated: Vec<MetadataField>,
    /// Pending conflicts created or superseded
    pub conflicts_queued: usize,
    pub failed_providers: Vec<ProviderFailure>,
    pub rejected_fields: Vec<RejectedField>,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn updated(&self, field: MetadataField) -> bool {
        self.fields_updated.contains(&field)
    }
}
