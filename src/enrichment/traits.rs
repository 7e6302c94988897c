//! Capability interfaces for external metadata sources.
//!
//! Every provider adapter implements [`MetadataProvider`]; the orchestrator
//! only ever talks to this trait, selecting implementations through the
//! static priority table in [`crate::model::PROVIDER_PRIORITY`].
//! Production code uses the real adapters, while tests substitute the
//! mock implementations in [`mocks`].
//!
//! # Example
//!
//! ```ignore
//! use music_enricher::enrichment::traits::MetadataProvider;
//!
//! async fn describe(provider: &dyn MetadataProvider, target: &FetchTarget) {
//!     if provider.can_fetch(target) {
//!         let metadata = provider.fetch_by_id(target, &cancel).await?;
//!     }
//! }
//! ```

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::domain::{EnrichmentError, FetchTarget, ProviderMetadata, SearchCandidate};
use crate::model::{EntityType, Provider};

/// A name search request.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub entity_type: EntityType,
    /// Artist name or album title
    pub name: String,
    /// Album artist, used to narrow album searches
    pub artist_hint: Option<String>,
}

/// A metadata source.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Which provider this is.
    fn provider(&self) -> Provider;

    /// Whether this provider can fetch anything for the target.
    ///
    /// Providers keyed by MBID return false when no MBID is known.
    fn can_fetch(&self, target: &FetchTarget) -> bool;

    /// Search for candidates by name. Providers without search return nothing.
    async fn search_by_name(
        &self,
        _query: &SearchQuery,
        _cancel: &CancellationToken,
    ) -> Result<Vec<SearchCandidate>, EnrichmentError> {
        Ok(Vec::new())
    }

    /// Fetch metadata for the target.
    async fn fetch_by_id(
        &self,
        target: &FetchTarget,
        cancel: &CancellationToken,
    ) -> Result<ProviderMetadata, EnrichmentError>;
}

/// Downloaded image bytes, not yet validated.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub data: Vec<u8>,
    /// Content-Type header as sent by the server
    pub mime_type: String,
    /// Source URL
    pub url: String,
}

/// Downloads images proposed by providers.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Bodies over `max_bytes` fail with `ImageRejection::FileTooLarge`
    /// without being buffered in full.
    async fn fetch_image(
        &self,
        provider: Provider,
        url: &str,
        max_bytes: usize,
        cancel: &CancellationToken,
    ) -> Result<FetchedImage, EnrichmentError>;
}
