//! Adapter layer: Convert Last.fm DTOs to domain models

use super::dto;
use crate::enrichment::domain::{ImageCandidate, ImageKind, ProviderMetadata};

/// Last.fm serves this star image for every artist it has no picture for.
const PLACEHOLDER_IMAGE_HASH: &str = "2a96cbd8b46e442fc41c2b86b821562f";

/// Maximum number of tags kept
const MAX_TAGS: usize = 5;

/// Size names from largest to smallest
const SIZE_ORDER: [&str; 6] = ["mega", "extralarge", "large", "medium", "small", ""];

pub fn artist_metadata(artist: dto::ArtistInfo) -> ProviderMetadata {
    ProviderMetadata {
        // identifiers come from MusicBrainz only
        mbid: None,
        biography: artist.bio.as_ref().and_then(clean_wiki),
        images: largest_image(&artist.image)
            .map(|url| {
                vec![ImageCandidate {
                    kind: ImageKind::Profile,
                    url,
                }]
            })
            .unwrap_or_default(),
        tags: top_tags(&artist.tags),
    }
}

pub fn album_metadata(album: dto::AlbumInfo) -> ProviderMetadata {
    ProviderMetadata {
        mbid: None,
        biography: album.wiki.as_ref().and_then(clean_wiki),
        images: largest_image(&album.image)
            .map(|url| {
                vec![ImageCandidate {
                    kind: ImageKind::Cover,
                    url,
                }]
            })
            .unwrap_or_default(),
        tags: top_tags(&album.tags),
    }
}

fn top_tags(tags: &dto::Tags) -> Vec<String> {
    tags.names()
        .into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .take(MAX_TAGS)
        .collect()
}

/// Largest non-placeholder image
fn largest_image(images: &[dto::Image]) -> Option<String> {
    SIZE_ORDER.iter().find_map(|size| {
        images
            .iter()
            .find(|img| {
                img.size == *size
                    && !img.url.trim().is_empty()
                    && !img.url.contains(PLACEHOLDER_IMAGE_HASH)
            })
            .map(|img| img.url.clone())
    })
}

/// Prefer the full text; drop the "Read more on Last.fm" link and license
/// boilerplate that follows it.
fn clean_wiki(wiki: &dto::Wiki) -> Option<String> {
    let raw = wiki
        .content
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .or(wiki.summary.as_deref())?;

    let text = match raw.find("<a href=\"https://www.last.fm") {
        Some(idx) => &raw[..idx],
        None => raw,
    };
    let text = text.trim();

    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn img(url: &str, size: &str) -> dto::Image {
        dto::Image {
            url: url.to_string(),
            size: size.to_string(),
        }
    }

    #[test]
    fn test_largest_image_skips_placeholder() {
        let images = vec![
            img("https://x/34s/small.png", "small"),
            img(
                &format!("https://x/300x300/{}.png", PLACEHOLDER_IMAGE_HASH),
                "extralarge",
            ),
            img("https://x/174s/large.png", "large"),
        ];
        assert_eq!(largest_image(&images).as_deref(), Some("https://x/174s/large.png"));
    }

    #[test]
    fn test_only_placeholders_yield_nothing() {
        let images = vec![img(
            &format!("https://x/{}.png", PLACEHOLDER_IMAGE_HASH),
            "mega",
        )];
        assert!(largest_image(&images).is_none());
    }

    #[test]
    fn test_clean_wiki_strips_read_more() {
        let wiki = dto::Wiki {
            summary: None,
            content: Some(
                "Portishead are a band from Bristol. <a href=\"https://www.last.fm/music/Portishead\">Read more on Last.fm</a>. User-contributed text is available under the Creative Commons By-SA License."
                    .to_string(),
            ),
            published: None,
        };
        assert_eq!(
            clean_wiki(&wiki).as_deref(),
            Some("Portishead are a band from Bristol.")
        );
    }

    #[test]
    fn test_clean_wiki_falls_back_to_summary() {
        let wiki = dto::Wiki {
            summary: Some("Short bio".to_string()),
            content: Some("   ".to_string()),
            published: None,
        };
        assert_eq!(clean_wiki(&wiki).as_deref(), Some("Short bio"));
    }

    #[test]
    fn test_link_only_bio_is_dropped() {
        let wiki = dto::Wiki {
            summary: Some(" <a href=\"https://www.last.fm/music/X\">Read more on Last.fm</a>".to_string()),
            content: None,
            published: None,
        };
        assert!(clean_wiki(&wiki).is_none());
    }

    #[test]
    fn test_album_metadata_maps_cover() {
        let album = dto::AlbumInfo {
            name: "Dummy".to_string(),
            artist: Some("Portishead".to_string()),
            mbid: Some("e2f7ea86-1f7c-3a60-8d14-b4c58d2b8a7b".to_string()),
            image: vec![img("https://x/cover.png", "extralarge")],
            tags: dto::Tags::default(),
            wiki: None,
        };
        let metadata = album_metadata(album);
        assert!(metadata.mbid.is_none());
        assert_eq!(metadata.images[0].kind, ImageKind::Cover);
    }
}
