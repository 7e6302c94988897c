//! MusicBrainz HTTP client
//!
//! Handles communication with the MusicBrainz web service.
//! See: https://musicbrainz.org/doc/MusicBrainz_API
//!
//! IMPORTANT: MusicBrainz requires a User-Agent header and rate limits to 1 req/sec.
//! Both are enforced by the shared [`ApiClient`].

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{adapter, dto};
use crate::enrichment::domain::{EnrichmentError, FetchTarget, ProviderMetadata, SearchCandidate};
use crate::enrichment::http::ApiClient;
use crate::enrichment::traits::{MetadataProvider, SearchQuery};
use crate::model::{EntityType, Provider};

/// Number of search hits requested
const SEARCH_LIMIT: u32 = 10;

/// MusicBrainz API client
pub struct MusicBrainzClient {
    api: ApiClient,
    base_url: String,
}

impl MusicBrainzClient {
    /// Create a new client
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            base_url: "https://musicbrainz.org/ws/2".to_string(),
        }
    }

    /// Create a client with a custom base URL (mirrors, tests)
    pub fn with_base_url(api: ApiClient, base_url: impl Into<String>) -> Self {
        Self {
            api,
            base_url: base_url.into(),
        }
    }

    /// Search artists by name
    pub async fn search_artists(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchCandidate>, EnrichmentError> {
        let url = self.artist_search_url(name);
        let response: dto::ArtistSearchResponse =
            self.api.get_json(Provider::MusicBrainz, &url, cancel).await?;
        Ok(adapter::artist_candidates(response))
    }

    /// Search release groups by title, optionally narrowed by artist
    pub async fn search_release_groups(
        &self,
        title: &str,
        artist: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchCandidate>, EnrichmentError> {
        let url = self.release_group_search_url(title, artist);
        let response: dto::ReleaseGroupSearchResponse =
            self.api.get_json(Provider::MusicBrainz, &url, cancel).await?;
        Ok(adapter::release_group_candidates(response))
    }

    /// Look up an artist by MBID
    pub async fn lookup_artist(
        &self,
        mbid: &str,
        cancel: &CancellationToken,
    ) -> Result<ProviderMetadata, EnrichmentError> {
        let url = format!(
            "{}/artist/{}?inc=genres+tags&fmt=json",
            self.base_url,
            urlencoding::encode(mbid)
        );
        let response: dto::ArtistLookup =
            self.api.get_json(Provider::MusicBrainz, &url, cancel).await?;
        Ok(adapter::artist_metadata(response))
    }

    /// Look up a release group by MBID
    pub async fn lookup_release_group(
        &self,
        mbid: &str,
        cancel: &CancellationToken,
    ) -> Result<ProviderMetadata, EnrichmentError> {
        let url = format!(
            "{}/release-group/{}?inc=artist-credits+genres+tags&fmt=json",
            self.base_url,
            urlencoding::encode(mbid)
        );
        let response: dto::ReleaseGroupLookup =
            self.api.get_json(Provider::MusicBrainz, &url, cancel).await?;
        Ok(adapter::release_group_metadata(response))
    }

    fn artist_search_url(&self, name: &str) -> String {
        let query = format!("artist:\"{}\"", escape_lucene(name));
        format!(
            "{}/artist?query={}&limit={}&fmt=json",
            self.base_url,
            urlencoding::encode(&query),
            SEARCH_LIMIT
        )
    }

    fn release_group_search_url(&self, title: &str, artist: Option<&str>) -> String {
        let mut query = format!("releasegroup:\"{}\"", escape_lucene(title));
        if let Some(artist) = artist.filter(|a| !a.trim().is_empty()) {
            query.push_str(&format!(" AND artist:\"{}\"", escape_lucene(artist)));
        }
        format!(
            "{}/release-group?query={}&limit={}&fmt=json",
            self.base_url,
            urlencoding::encode(&query),
            SEARCH_LIMIT
        )
    }
}

#[async_trait]
impl MetadataProvider for MusicBrainzClient {
    fn provider(&self) -> Provider {
        Provider::MusicBrainz
    }

    fn can_fetch(&self, target: &FetchTarget) -> bool {
        target.mbid.is_some()
    }

    async fn search_by_name(
        &self,
        query: &SearchQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchCandidate>, EnrichmentError> {
        match query.entity_type {
            EntityType::Artist => self.search_artists(&query.name, cancel).await,
            EntityType::Album => {
                self.search_release_groups(&query.name, query.artist_hint.as_deref(), cancel)
                    .await
            }
        }
    }

    async fn fetch_by_id(
        &self,
        target: &FetchTarget,
        cancel: &CancellationToken,
    ) -> Result<ProviderMetadata, EnrichmentError> {
        let Some(ref mbid) = target.mbid else {
            return Ok(ProviderMetadata::default());
        };
        match target.entity_type {
            EntityType::Artist => self.lookup_artist(mbid, cancel).await,
            EntityType::Album => self.lookup_release_group(mbid, cancel).await,
        }
    }
}

/// Escape Lucene query syntax characters inside a quoted phrase
fn escape_lucene(value: &str) -> String {
    const SPECIAL: &[char] = &[
        '+', '-', '&', '|', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~', '*', '?', ':', '\\',
        '/',
    ];
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
