//! Last.fm HTTP client
//!
//! Wraps `artist.getInfo` and `album.getInfo`. Requires an API key; Last.fm
//! answers most failures with HTTP 200 and an `{"error": n}` body, which is
//! turned into [`EnrichmentError::ExternalApi`] here.
//!
//! API: https://www.last.fm/api

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{adapter, dto};
use crate::enrichment::domain::{EnrichmentError, FetchTarget, ProviderMetadata};
use crate::enrichment::http::{ApiClient, redact_url};
use crate::enrichment::traits::MetadataProvider;
use crate::model::{EntityType, Provider};

/// Last.fm API client
pub struct LastFmClient {
    api: ApiClient,
    api_key: String,
    base_url: String,
}

impl LastFmClient {
    pub fn new(api: ApiClient, api_key: impl Into<String>) -> Self {
        Self {
            api,
            api_key: api_key.into(),
            base_url: "https://ws.audioscrobbler.com/2.0/".to_string(),
        }
    }

    /// Fetch artist info by MBID when known, else by name
    pub async fn artist_info(
        &self,
        name: &str,
        mbid: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ProviderMetadata, EnrichmentError> {
        let mut params = vec![("method", "artist.getinfo".to_string())];
        match mbid {
            Some(mbid) => params.push(("mbid", mbid.to_string())),
            None => params.push(("artist", name.to_string())),
        }
        let url = self.build_url(&params);

        let response: dto::ArtistInfoResponse = self.request(&url, cancel).await?;
        Ok(adapter::artist_metadata(response.artist))
    }

    /// Fetch album info by MBID when known, else by artist + title
    pub async fn album_info(
        &self,
        title: &str,
        artist: Option<&str>,
        mbid: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ProviderMetadata, EnrichmentError> {
        let mut params = vec![("method", "album.getinfo".to_string())];
        match (mbid, artist) {
            (Some(mbid), _) => params.push(("mbid", mbid.to_string())),
            (None, Some(artist)) => {
                params.push(("artist", artist.to_string()));
                params.push(("album", title.to_string()));
            }
            (None, None) => {
                return Err(EnrichmentError::Validation(format!(
                    "Last.fm album lookup for '{}' needs an artist name",
                    title
                )));
            }
        }
        let url = self.build_url(&params);

        let response: dto::AlbumInfoResponse = self.request(&url, cancel).await?;
        Ok(adapter::album_metadata(response.album))
    }

    async fn request<T>(&self, url: &str, cancel: &CancellationToken) -> Result<T, EnrichmentError>
    where
        T: serde::de::DeserializeOwned,
    {
        match self
            .api
            .get_json::<dto::Envelope<T>>(Provider::LastFm, url, cancel)
            .await?
        {
            dto::Envelope::Ok(payload) => Ok(payload),
            dto::Envelope::Error(e) => Err(EnrichmentError::ExternalApi {
                provider: Provider::LastFm,
                http_status: Some(200),
                http_status_text: format!("Last.fm error {}: {}", e.error, e.message),
                url: redact_url(url),
            }),
        }
    }

    fn build_url(&self, params: &[(&str, String)]) -> String {
        let mut query: Vec<String> = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect();
        query.push("autocorrect=1".to_string());
        query.push(format!("api_key={}", urlencoding::encode(&self.api_key)));
        query.push("format=json".to_string());
        format!("{}?{}", self.base_url, query.join("&"))
    }
}

#[async_trait]
impl MetadataProvider for LastFmClient {
    fn provider(&self) -> Provider {
        Provider::LastFm
    }

    fn can_fetch(&self, target: &FetchTarget) -> bool {
        if self.api_key.is_empty() || target.name.trim().is_empty() {
            return false;
        }
        match target.entity_type {
            EntityType::Artist => true,
            EntityType::Album => target.mbid.is_some() || target.artist_name.is_some(),
        }
    }

    async fn fetch_by_id(
        &self,
        target: &FetchTarget,
        cancel: &CancellationToken,
    ) -> Result<ProviderMetadata, EnrichmentError> {
        match target.entity_type {
            EntityType::Artist => {
                self.artist_info(&target.name, target.mbid.as_deref(), cancel)
                    .await
            }
            EntityType::Album => {
                self.album_info(
                    &target.name,
                    target.artist_name.as_deref(),
                    target.mbid.as_deref(),
                    cancel,
                )
                .await
            }
        }
    }
}
