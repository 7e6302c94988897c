//! Fanart.tv HTTP client
//!
//! Artist thumbnails/backgrounds and album covers, keyed by MusicBrainz IDs.
//! Requires a personal API key.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{adapter, dto};
use crate::enrichment::domain::{EnrichmentError, FetchTarget, ProviderMetadata};
use crate::enrichment::http::ApiClient;
use crate::enrichment::traits::MetadataProvider;
use crate::model::{EntityType, Provider};

pub struct FanartClient {
    api: ApiClient,
    api_key: String,
    base_url: String,
}

impl FanartClient {
    pub fn new(api: ApiClient, api_key: impl Into<String>) -> Self {
        Self::with_base_url(api, api_key, "https://webservice.fanart.tv/v3/music")
    }

    pub fn with_base_url(
        api: ApiClient,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            api,
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }

    /// Images for an artist; None when Fanart.tv has nothing for the MBID
    pub async fn artist_images(
        &self,
        artist_mbid: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<dto::ArtistImagesResponse>, EnrichmentError> {
        let url = format!(
            "{}/{}?api_key={}",
            self.base_url,
            urlencoding::encode(artist_mbid),
            urlencoding::encode(&self.api_key)
        );
        self.get_optional(&url, cancel).await
    }

    /// Images for a release group; None when Fanart.tv has nothing for the MBID
    pub async fn album_images(
        &self,
        release_group_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<dto::AlbumImagesResponse>, EnrichmentError> {
        let url = format!(
            "{}/albums/{}?api_key={}",
            self.base_url,
            urlencoding::encode(release_group_id),
            urlencoding::encode(&self.api_key)
        );
        self.get_optional(&url, cancel).await
    }

    async fn get_optional<T>(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, EnrichmentError>
    where
        T: serde::de::DeserializeOwned,
    {
        match self.api.get_json::<T>(Provider::FanartTv, url, cancel).await {
            Ok(response) => Ok(Some(response)),
            Err(e) if e.http_status() == Some(404) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl MetadataProvider for FanartClient {
    fn provider(&self) -> Provider {
        Provider::FanartTv
    }

    fn can_fetch(&self, target: &FetchTarget) -> bool {
        !self.api_key.is_empty() && target.mbid.is_some()
    }

    async fn fetch_by_id(
        &self,
        target: &FetchTarget,
        cancel: &CancellationToken,
    ) -> Result<ProviderMetadata, EnrichmentError> {
        let Some(mbid) = target.mbid.as_deref() else {
            return Ok(ProviderMetadata::default());
        };

        match target.entity_type {
            EntityType::Artist => Ok(self
                .artist_images(mbid, cancel)
                .await?
                .map(adapter::artist_metadata)
                .unwrap_or_default()),
            EntityType::Album => Ok(self
                .album_images(mbid, cancel)
                .await?
                .map(|r| adapter::album_metadata(r, mbid))
                .unwrap_or_default()),
        }
    }
}
