//! MusicBrainz API Data Transfer Objects
//!
//! These types match EXACTLY what the MusicBrainz API returns.
//! DO NOT add fields that aren't in the API response.
//! DO NOT use these types outside the musicbrainz module - convert to domain types.
//!
//! API Reference: https://musicbrainz.org/doc/MusicBrainz_API
//!
//! We use the search endpoints (`/artist?query=`, `/release-group?query=`)
//! to find identifiers and the lookup endpoints to confirm them and pull
//! genres/tags.

use serde::{Deserialize, Serialize};

/// Artist search response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtistSearchResponse {
    /// Total hits across all pages
    pub count: Option<u32>,
    #[serde(default)]
    pub artists: Vec<ArtistHit>,
}

/// Artist search hit
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ArtistHit {
    /// MusicBrainz artist ID
    pub id: String,
    pub name: String,
    /// Relevance score (0-100)
    pub score: Option<u8>,
    /// Sort name (e.g., "Beatles, The")
    pub sort_name: Option<String>,
    /// Disambiguation comment
    pub disambiguation: Option<String>,
    /// Artist type (Person, Group, etc.)
    #[serde(rename = "type")]
    pub artist_type: Option<String>,
    pub country: Option<String>,
}

/// Release group search response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReleaseGroupSearchResponse {
    pub count: Option<u32>,
    #[serde(default, rename = "release-groups")]
    pub release_groups: Vec<ReleaseGroupHit>,
}

/// Release group search hit
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReleaseGroupHit {
    /// MusicBrainz release group ID
    pub id: String,
    pub title: String,
    /// Relevance score (0-100)
    pub score: Option<u8>,
    /// Primary type (Album, Single, EP, etc.)
    pub primary_type: Option<String>,
    /// Artist credits
    #[serde(default)]
    pub artist_credit: Vec<ArtistCredit>,
}

/// Artist credit (can be multiple for collaborations)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtistCredit {
    /// The artist
    pub artist: CreditedArtist,
    /// How this artist is credited (may differ from official name)
    pub name: Option<String>,
    /// Join phrase (e.g., " & ", " feat. ")
    pub joinphrase: Option<String>,
}

/// Artist as it appears inside a credit
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CreditedArtist {
    pub id: String,
    pub name: String,
}

/// Artist lookup response (`inc=genres+tags`)
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ArtistLookup {
    pub id: String,
    pub name: String,
    pub sort_name: Option<String>,
    #[serde(default)]
    pub genres: Vec<Tag>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// Release group lookup response (`inc=artist-credits+genres+tags`)
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReleaseGroupLookup {
    pub id: String,
    pub title: String,
    pub primary_type: Option<String>,
    pub first_release_date: Option<String>,
    #[serde(default)]
    pub artist_credit: Vec<ArtistCredit>,
    #[serde(default)]
    pub genres: Vec<Tag>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// Tag or genre with vote count
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Tag {
    pub name: String,
    /// Number of votes
    #[serde(default)]
    pub count: i32,
}

/// Error response from MusicBrainz
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiError {
    pub error: String,
    pub help: Option<String>,
}

#[cfg(test)]
mod contract_tests {
    use super::*;

    #[test]
    fn test_parse_artist_search() {
        let json = r#"{
            "created": "2025-01-01T00:00:00.000Z",
            "count": 2,
            "offset": 0,
            "artists": [
                {
                    "id": "b10bbbfc-cf9e-42e0-be17-e2c3e1d2600d",
                    "type": "Group",
                    "score": 100,
                    "name": "The Beatles",
                    "sort-name": "Beatles, The",
                    "country": "GB"
                },
                {
                    "id": "other-id",
                    "score": 62,
                    "name": "Beatles Revival Band",
                    "sort-name": "Beatles Revival Band",
                    "disambiguation": "tribute band"
                }
            ]
        }"#;

        let response: ArtistSearchResponse =
            serde_json::from_str(json).expect("Should parse artist search");

        assert_eq!(response.artists.len(), 2);
        assert_eq!(response.artists[0].name, "The Beatles");
        assert_eq!(response.artists[0].score, Some(100));
        assert_eq!(response.artists[0].sort_name.as_deref(), Some("Beatles, The"));
        assert_eq!(response.artists[1].disambiguation.as_deref(), Some("tribute band"));
    }

    #[test]
    fn test_parse_release_group_search() {
        let json = r#"{
            "count": 1,
            "release-groups": [{
                "id": "rg-abbey",
                "title": "Abbey Road",
                "score": 100,
                "primary-type": "Album",
                "artist-credit": [{
                    "name": "The Beatles",
                    "artist": {"id": "b10bbbfc", "name": "The Beatles"}
                }]
            }]
        }"#;

        let response: ReleaseGroupSearchResponse =
            serde_json::from_str(json).expect("Should parse release group search");

        assert_eq!(response.release_groups.len(), 1);
        let rg = &response.release_groups[0];
        assert_eq!(rg.title, "Abbey Road");
        assert_eq!(rg.primary_type.as_deref(), Some("Album"));
        assert_eq!(rg.artist_credit[0].artist.name, "The Beatles");
    }

    #[test]
    fn test_parse_empty_search() {
        let json = r#"{"count": 0, "offset": 0}"#;
        let response: ArtistSearchResponse = serde_json::from_str(json).unwrap();
        assert!(response.artists.is_empty());
    }

    #[test]
    fn test_parse_artist_lookup_with_genres() {
        let json = r#"{
            "id": "a74b1b7f-71a5-4011-9441-d0b5e4122711",
            "name": "Radiohead",
            "sort-name": "Radiohead",
            "genres": [
                {"name": "alternative rock", "count": 25},
                {"name": "art rock", "count": 18}
            ],
            "tags": [
                {"name": "british", "count": 9}
            ]
        }"#;

        let artist: ArtistLookup = serde_json::from_str(json).expect("Should parse lookup");
        assert_eq!(artist.genres.len(), 2);
        assert_eq!(artist.genres[0].count, 25);
        assert_eq!(artist.tags[0].name, "british");
    }

    #[test]
    fn test_parse_release_group_lookup_minimal() {
        let json = r#"{"id": "rg-1", "title": "OK Computer"}"#;
        let rg: ReleaseGroupLookup = serde_json::from_str(json).unwrap();
        assert!(rg.genres.is_empty());
        assert!(rg.artist_credit.is_empty());
    }

    #[test]
    fn test_parse_error_response() {
        let json = r#"{
            "error": "Not Found",
            "help": "For usage, please see: https://musicbrainz.org/doc/MusicBrainz_API"
        }"#;

        let error: ApiError = serde_json::from_str(json).expect("Should parse error");
        assert_eq!(error.error, "Not Found");
        assert!(error.help.is_some());
    }
}
