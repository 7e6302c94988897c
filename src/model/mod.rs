//! Core data models for enrichment targets and providers.
//!
//! Defines the library entities enrichment writes to ([`Artist`], [`Album`]),
//! the fixed provider policy table ([`Provider`]) and the field set every
//! provider result is normalised into ([`MetadataField`]).
//!
//! # Database Schema
//!
//! The entity models map to the following tables:
//! - `artists` - Artist records with unique names
//! - `albums` - Albums with optional artist reference

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::enrichment::EnrichmentError;

/// Kind of library entity an enrichment run targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Artist,
    Album,
}

impl EntityType {
    /// Convert to string representation for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Artist => "artist",
            EntityType::Album => "album",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = EnrichmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "artist" => Ok(EntityType::Artist),
            "album" => Ok(EntityType::Album),
            other => Err(EnrichmentError::Validation(format!(
                "unknown entity type '{}' (expected artist or album)",
                other
            ))),
        }
    }
}

/// How far a provider's answers can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderTrust {
    /// Results may be committed without review
    AutoApply,
    /// Results always go through the conflict queue
    RequiresReview,
}

/// External metadata source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    MusicBrainz,
    CoverArtArchive,
    LastFm,
    #[serde(rename = "fanart")]
    FanartTv,
}

/// Providers in the order their results are merged.
pub const PROVIDER_PRIORITY: [Provider; 4] = [
    Provider::MusicBrainz,
    Provider::CoverArtArchive,
    Provider::LastFm,
    Provider::FanartTv,
];

impl Provider {
    /// Convert to string representation for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::MusicBrainz => "musicbrainz",
            Provider::CoverArtArchive => "coverartarchive",
            Provider::LastFm => "lastfm",
            Provider::FanartTv => "fanart",
        }
    }

    /// Human-readable name for display.
    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::MusicBrainz => "MusicBrainz",
            Provider::CoverArtArchive => "Cover Art Archive",
            Provider::LastFm => "Last.fm",
            Provider::FanartTv => "Fanart.tv",
        }
    }

    /// Fixed trust policy.
    ///
    /// Cover Art Archive shares MusicBrainz's tier: it is only ever queried
    /// with an already verified MusicBrainz id.
    pub fn trust(&self) -> ProviderTrust {
        match self {
            Provider::MusicBrainz | Provider::CoverArtArchive => ProviderTrust::AutoApply,
            Provider::LastFm | Provider::FanartTv => ProviderTrust::RequiresReview,
        }
    }

    /// Merge position (lower runs first).
    pub fn priority(&self) -> usize {
        PROVIDER_PRIORITY
            .iter()
            .position(|p| p == self)
            .unwrap_or(PROVIDER_PRIORITY.len())
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = EnrichmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "musicbrainz" => Ok(Provider::MusicBrainz),
            "coverartarchive" | "caa" => Ok(Provider::CoverArtArchive),
            "lastfm" | "last.fm" => Ok(Provider::LastFm),
            "fanart" | "fanart.tv" | "fanarttv" => Ok(Provider::FanartTv),
            other => Err(EnrichmentError::Validation(format!(
                "unknown provider '{}'",
                other
            ))),
        }
    }
}

/// A normalised metadata field that providers can propose a value for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataField {
    Mbid,
    Biography,
    ProfileImage,
    BackgroundImage,
    Cover,
    Tags,
}

impl MetadataField {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataField::Mbid => "mbid",
            MetadataField::Biography => "biography",
            MetadataField::ProfileImage => "profile_image",
            MetadataField::BackgroundImage => "background_image",
            MetadataField::Cover => "cover",
            MetadataField::Tags => "tags",
        }
    }

    /// Whether the value is an image URL that must pass validation.
    pub fn is_image(&self) -> bool {
        matches!(
            self,
            MetadataField::ProfileImage | MetadataField::BackgroundImage | MetadataField::Cover
        )
    }

    /// Storage column backing this field, or None if the entity has no such field.
    pub fn column(&self, entity_type: EntityType) -> Option<&'static str> {
        match (entity_type, self) {
            (_, MetadataField::Mbid) => Some("mbid"),
            (_, MetadataField::Tags) => Some("tags"),
            (EntityType::Artist, MetadataField::Biography) => Some("biography"),
            (EntityType::Artist, MetadataField::ProfileImage) => Some("profile_image_url"),
            (EntityType::Artist, MetadataField::BackgroundImage) => Some("background_image_url"),
            (EntityType::Album, MetadataField::Biography) => Some("description"),
            (EntityType::Album, MetadataField::Cover) => Some("cover_url"),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetadataField {
    type Err = EnrichmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mbid" => Ok(MetadataField::Mbid),
            "biography" => Ok(MetadataField::Biography),
            "profile_image" => Ok(MetadataField::ProfileImage),
            "background_image" => Ok(MetadataField::BackgroundImage),
            "cover" => Ok(MetadataField::Cover),
            "tags" => Ok(MetadataField::Tags),
            other => Err(EnrichmentError::Validation(format!(
                "unknown metadata field '{}'",
                other
            ))),
        }
    }
}

/// An artist in the music library.
#[derive(Debug, Clone, FromRow)]
pub struct Artist {
    /// Database ID (auto-generated)
    pub id: i64,
    /// Artist name (unique)
    pub name: String,
    /// Sort name (e.g., "Beatles, The")
    pub sort_name: Option<String>,
    /// MusicBrainz artist ID
    pub mbid: Option<String>,
    pub biography: Option<String>,
    pub profile_image_url: Option<String>,
    pub background_image_url: Option<String>,
    /// Comma-separated tags
    pub tags: Option<String>,
}

/// An album in the music library.
#[derive(Debug, Clone, FromRow)]
pub struct Album {
    /// Database ID (auto-generated)
    pub id: i64,
    /// Album title
    pub title: String,
    /// Optional artist ID (albums can exist without artist)
    pub artist_id: Option<i64>,
    /// Artist name, joined from `artists`
    pub artist_name: Option<String>,
    /// Artist MBID, joined from `artists`
    pub artist_mbid: Option<String>,
    /// MusicBrainz release group ID
    pub mbid: Option<String>,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    pub tags: Option<String>,
}

/// Entity-agnostic view of an enrichment target.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryEntity {
    pub entity_type: EntityType,
    pub id: i64,
    /// Artist name or album title
    pub name: String,
    /// For albums: the album artist's name
    pub artist_name: Option<String>,
    /// For albums: the album artist's MBID
    pub artist_mbid: Option<String>,
    pub mbid: Option<String>,
    pub biography: Option<String>,
    pub profile_image: Option<String>,
    pub background_image: Option<String>,
    pub cover: Option<String>,
    pub tags: Option<String>,
}

impl LibraryEntity {
    /// Current value of a field, if the entity has one.
    pub fn value(&self, field: MetadataField) -> Option<&str> {
        match field {
            MetadataField::Mbid => self.mbid.as_deref(),
            MetadataField::Biography => self.biography.as_deref(),
            MetadataField::ProfileImage => self.profile_image.as_deref(),
            MetadataField::BackgroundImage => self.background_image.as_deref(),
            MetadataField::Cover => self.cover.as_deref(),
            MetadataField::Tags => self.tags.as_deref(),
        }
    }

    /// Update the in-memory copy after a field has been persisted.
    pub fn set_value(&mut self, field: MetadataField, value: &str) {
        let slot = match field {
            MetadataField::Mbid => &mut self.mbid,
            MetadataField::Biography => &mut self.biography,
            MetadataField::ProfileImage => &mut self.profile_image,
            MetadataField::BackgroundImage => &mut self.background_image,
            MetadataField::Cover => &mut self.cover,
            MetadataField::Tags => &mut self.tags,
        };
        *slot = Some(value.to_string());
    }
}

impl From<Artist> for LibraryEntity {
    fn from(artist: Artist) -> Self {
        LibraryEntity {
            entity_type: EntityType::Artist,
            id: artist.id,
            name: artist.name,
            artist_name: None,
            artist_mbid: None,
            mbid: artist.mbid,
            biography: artist.biography,
            profile_image: artist.profile_image_url,
            background_image: artist.background_image_url,
            cover: None,
            tags: artist.tags,
        }
    }
}

impl From<Album> for LibraryEntity {
    fn from(album: Album) -> Self {
        LibraryEntity {
            entity_type: EntityType::Album,
            id: album.id,
            name: album.title,
            artist_name: album.artist_name,
            artist_mbid: album.artist_mbid,
            mbid: album.mbid,
            biography: album.description,
            profile_image: None,
            background_image: None,
            cover: album.cover_url,
            tags: album.tags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        assert!(Provider::MusicBrainz.priority() < Provider::LastFm.priority());
        assert!(Provider::CoverArtArchive.priority() < Provider::LastFm.priority());
        assert!(Provider::LastFm.priority() < Provider::FanartTv.priority());
    }

    #[test]
    fn test_trust_policy() {
        assert_eq!(Provider::MusicBrainz.trust(), ProviderTrust::AutoApply);
        assert_eq!(Provider::CoverArtArchive.trust(), ProviderTrust::AutoApply);
        assert_eq!(Provider::LastFm.trust(), ProviderTrust::RequiresReview);
        assert_eq!(Provider::FanartTv.trust(), ProviderTrust::RequiresReview);
    }

    #[test]
    fn test_entity_type_parse() {
        assert_eq!("Artist".parse::<EntityType>().unwrap(), EntityType::Artist);
        assert_eq!("album".parse::<EntityType>().unwrap(), EntityType::Album);
        assert!(matches!(
            "track".parse::<EntityType>(),
            Err(EnrichmentError::Validation(_))
        ));
    }

    #[test]
    fn test_field_columns() {
        assert_eq!(MetadataField::Biography.column(EntityType::Album), Some("description"));
        assert_eq!(MetadataField::Cover.column(EntityType::Album), Some("cover_url"));
        assert_eq!(MetadataField::Cover.column(EntityType::Artist), None);
        assert_eq!(MetadataField::ProfileImage.column(EntityType::Album), None);
    }
}
