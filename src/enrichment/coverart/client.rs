//! Cover Art Archive HTTP client
//!
//! Finds album artwork on the Cover Art Archive by release group MBID.
//! No API key required, but please respect their rate limits.
//!
//! API: https://coverartarchive.org

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::dto;
use crate::enrichment::domain::{
    EnrichmentError, FetchTarget, ImageCandidate, ImageKind, ProviderMetadata,
};
use crate::enrichment::http::ApiClient;
use crate::enrichment::traits::MetadataProvider;
use crate::model::{EntityType, Provider};

/// Desired cover art size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoverSize {
    /// 250px thumbnail
    Small,
    /// 500px thumbnail (default)
    #[default]
    Medium,
    /// 1200px thumbnail
    Large,
    /// Original full-size image
    Original,
}

/// Cover Art Archive client
pub struct CoverArtClient {
    api: ApiClient,
    base_url: String,
    size: CoverSize,
}

impl CoverArtClient {
    /// Create a new client
    pub fn new(api: ApiClient, size: CoverSize) -> Self {
        Self {
            api,
            base_url: "https://coverartarchive.org".to_string(),
            size,
        }
    }

    /// Create a client with a custom base URL
    pub fn with_base_url(api: ApiClient, base_url: impl Into<String>) -> Self {
        Self {
            api,
            base_url: base_url.into(),
            size: CoverSize::default(),
        }
    }

    /// List all cover art for a release group.
    ///
    /// A 404 means the release group simply has no artwork.
    pub async fn list_cover_art(
        &self,
        release_group_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<dto::CoverArtResponse>, EnrichmentError> {
        let url = format!(
            "{}/release-group/{}",
            self.base_url,
            urlencoding::encode(release_group_id)
        );

        match self
            .api
            .get_json::<dto::CoverArtResponse>(Provider::CoverArtArchive, &url, cancel)
            .await
        {
            Ok(response) => Ok(Some(response)),
            Err(e) if e.http_status() == Some(404) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Pick the front image URL at the preferred size
fn front_cover_url(response: &dto::CoverArtResponse, size: CoverSize) -> Option<String> {
    let image = response
        .images
        .iter()
        .find(|i| i.front && i.approved)
        .or_else(|| response.images.iter().find(|i| i.front))
        .or_else(|| {
            response
                .images
                .iter()
                .find(|i| i.types.iter().any(|t| t == "Front"))
        })?;

    let thumbs = &image.thumbnails;
    let sized = match size {
        CoverSize::Small => thumbs.small.clone(),
        CoverSize::Medium => thumbs.large.clone().or_else(|| thumbs.small.clone()),
        CoverSize::Large => thumbs.xlarge.clone().or_else(|| thumbs.large.clone()),
        CoverSize::Original => None,
    };

    Some(sized.unwrap_or_else(|| image.image.clone()))
}

#[async_trait]
impl MetadataProvider for CoverArtClient {
    fn provider(&self) -> Provider {
        Provider::CoverArtArchive
    }

    fn can_fetch(&self, target: &FetchTarget) -> bool {
        target.entity_type == EntityType::Album && target.mbid.is_some()
    }

    async fn fetch_by_id(
        &self,
        target: &FetchTarget,
        cancel: &CancellationToken,
    ) -> Result<ProviderMetadata, EnrichmentError> {
        let Some(ref mbid) = target.mbid else {
            return Ok(ProviderMetadata::default());
        };

        let Some(listing) = self.list_cover_art(mbid, cancel).await? else {
            tracing::debug!("No cover art for release group {}", mbid);
            return Ok(ProviderMetadata::default());
        };

        let images = front_cover_url(&listing, self.size)
            .map(|url| {
                vec![ImageCandidate {
                    kind: ImageKind::Cover,
                    url,
                }]
            })
            .unwrap_or_default();

        Ok(ProviderMetadata {
            images,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::http::HttpSettings;

    fn listing(images: Vec<dto::Image>) -> dto::CoverArtResponse {
        dto::CoverArtResponse {
            images,
            release: None,
        }
    }

    fn image(front: bool, approved: bool, full: &str, medium: Option<&str>) -> dto::Image {
        dto::Image {
            front,
            back: !front,
            types: vec![if front { "Front" } else { "Back" }.to_string()],
            image: full.to_string(),
            thumbnails: dto::Thumbnails {
                small: None,
                large: medium.map(str::to_string),
                xlarge: None,
            },
            approved,
            comment: None,
        }
    }

    #[test]
    fn test_client_creation() {
        let client = CoverArtClient::new(
            ApiClient::new(&HttpSettings::default()).unwrap(),
            CoverSize::Medium,
        );
        assert_eq!(client.base_url, "https://coverartarchive.org");
    }

    #[test]
    fn test_cover_size_default() {
        assert_eq!(CoverSize::default(), CoverSize::Medium);
    }

    #[test]
    fn test_front_cover_prefers_approved_thumbnail() {
        let response = listing(vec![
            image(false, true, "back.jpg", None),
            image(true, false, "unapproved.jpg", None),
            image(true, true, "front.jpg", Some("front-500.jpg")),
        ]);
        assert_eq!(
            front_cover_url(&response, CoverSize::Medium).as_deref(),
            Some("front-500.jpg")
        );
        assert_eq!(
            front_cover_url(&response, CoverSize::Original).as_deref(),
            Some("front.jpg")
        );
    }

    #[test]
    fn test_no_front_cover() {
        let response = listing(vec![image(false, true, "back.jpg", None)]);
        assert!(front_cover_url(&response, CoverSize::Medium).is_none());
    }

    #[test]
    fn test_only_albums_are_fetchable() {
        let client = CoverArtClient::new(
            ApiClient::new(&HttpSettings::default()).unwrap(),
            CoverSize::Medium,
        );
        let artist = FetchTarget {
            entity_type: EntityType::Artist,
            name: "Radiohead".to_string(),
            artist_name: None,
            mbid: Some("mbid".to_string()),
            artist_mbid: None,
        };
        assert!(!client.can_fetch(&artist));
        let album = FetchTarget {
            entity_type: EntityType::Album,
            ..artist
        };
        assert!(client.can_fetch(&album));
    }
}
