//! Adapter layer: Convert Fanart.tv DTOs to domain models

use super::dto;
use crate::enrichment::domain::{ImageCandidate, ImageKind, ProviderMetadata};

pub fn artist_metadata(response: dto::ArtistImagesResponse) -> ProviderMetadata {
    let mut images = ranked(ImageKind::Profile, response.artistthumb);
    images.extend(ranked(ImageKind::Background, response.artistbackground));

    ProviderMetadata {
        images,
        ..Default::default()
    }
}

pub fn album_metadata(response: dto::AlbumImagesResponse, release_group_id: &str) -> ProviderMetadata {
    let covers = response
        .albums
        .into_iter()
        .find(|(id, _)| id.eq_ignore_ascii_case(release_group_id))
        .map(|(_, album)| album.albumcover)
        .unwrap_or_default();

    ProviderMetadata {
        images: ranked(ImageKind::Cover, covers),
        ..Default::default()
    }
}

/// Most liked first
fn ranked(kind: ImageKind, mut images: Vec<dto::Image>) -> Vec<ImageCandidate> {
    // stable sort keeps the API's order among equal like counts
    images.sort_by_key(|img| std::cmp::Reverse(img.like_count()));
    images
        .into_iter()
        .filter(|img| !img.url.trim().is_empty())
        .map(|img| ImageCandidate { kind, url: img.url })
        .collect()
}
