//! Adapter layer: Convert MusicBrainz DTOs to domain models
//!
//! This is the ONLY place where DTO types are converted to domain types.
//! This isolates API changes - if MusicBrainz changes their response format,
//! only this file and dto.rs need to change.

use super::dto;
use crate::enrichment::domain::{ProviderMetadata, SearchCandidate};

/// Maximum number of tags kept from a lookup
const MAX_TAGS: usize = 5;

/// Convert artist search hits to candidates
pub fn artist_candidates(response: dto::ArtistSearchResponse) -> Vec<SearchCandidate> {
    response
        .artists
        .into_iter()
        .map(|hit| SearchCandidate {
            id: hit.id,
            name: hit.name,
            artist_name: None,
            provider_score: hit.score,
        })
        .collect()
}

/// Convert release group search hits to candidates
pub fn release_group_candidates(response: dto::ReleaseGroupSearchResponse) -> Vec<SearchCandidate> {
    response
        .release_groups
        .into_iter()
        .map(|hit| SearchCandidate {
            artist_name: build_artist_string(&hit.artist_credit),
            id: hit.id,
            name: hit.title,
            provider_score: hit.score,
        })
        .collect()
}

/// Convert an artist lookup to metadata
pub fn artist_metadata(artist: dto::ArtistLookup) -> ProviderMetadata {
    ProviderMetadata {
        mbid: Some(artist.id),
        tags: extract_tags(artist.genres, artist.tags),
        ..Default::default()
    }
}

/// Convert a release group lookup to metadata
pub fn release_group_metadata(release_group: dto::ReleaseGroupLookup) -> ProviderMetadata {
    ProviderMetadata {
        mbid: Some(release_group.id),
        tags: extract_tags(release_group.genres, release_group.tags),
        ..Default::default()
    }
}

/// Build a combined artist string from artist credits
fn build_artist_string(credits: &[dto::ArtistCredit]) -> Option<String> {
    if credits.is_empty() {
        return None;
    }

    let mut result = String::new();
    for credit in credits {
        // Use credited name if available, otherwise official name
        let name = credit.name.as_ref().unwrap_or(&credit.artist.name);
        result.push_str(name);

        if let Some(ref join) = credit.joinphrase {
            result.push_str(join);
        }
    }

    Some(result)
}

/// Genres are curated, so prefer them; fall back to free-form tags.
/// Sorted by vote count, zero-vote entries dropped.
fn extract_tags(genres: Vec<dto::Tag>, tags: Vec<dto::Tag>) -> Vec<String> {
    let mut source = if genres.is_empty() { tags } else { genres };
    source.retain(|t| t.count > 0);
    source.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    source
        .into_iter()
        .take(MAX_TAGS)
        .map(|t| t.name.to_lowercase())
        .collect()
}
