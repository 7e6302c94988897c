//! Last.fm API Data Transfer Objects
//!
//! These types match what `artist.getInfo` and `album.getInfo` return with
//! `format=json`. Last.fm's JSON is a mechanical translation of its XML API,
//! so a few fields change shape depending on content (empty tag lists come
//! back as `""`, single tags as an object instead of an array).
//!
//! API Reference: https://www.last.fm/api

use serde::{Deserialize, Serialize};

/// `artist.getInfo` response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtistInfoResponse {
    pub artist: ArtistInfo,
}

/// `album.getInfo` response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlbumInfoResponse {
    pub album: AlbumInfo,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtistInfo {
    pub name: String,
    /// Empty string when Last.fm has no MBID
    pub mbid: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub image: Vec<Image>,
    #[serde(default)]
    pub tags: Tags,
    pub bio: Option<Wiki>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlbumInfo {
    pub name: String,
    pub artist: Option<String>,
    pub mbid: Option<String>,
    #[serde(default)]
    pub image: Vec<Image>,
    #[serde(default)]
    pub tags: Tags,
    pub wiki: Option<Wiki>,
}

/// Image at one of Last.fm's fixed sizes
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Image {
    #[serde(rename = "#text")]
    pub url: String,
    /// small, medium, large, extralarge, mega, or ""
    #[serde(default)]
    pub size: String,
}

/// Biography (artists) or wiki (albums)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Wiki {
    pub summary: Option<String>,
    pub content: Option<String>,
    pub published: Option<String>,
}

/// Tag container; `""` when there are none
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Tags {
    List { tag: TagList },
    Empty(String),
}

impl Default for Tags {
    fn default() -> Self {
        Tags::Empty(String::new())
    }
}

impl Tags {
    pub fn names(&self) -> Vec<String> {
        match self {
            Tags::List { tag: TagList::Many(tags) } => tags.iter().map(|t| t.name.clone()).collect(),
            Tags::List { tag: TagList::One(tag) } => vec![tag.name.clone()],
            Tags::Empty(_) => Vec::new(),
        }
    }
}

/// One tag or several
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum TagList {
    Many(Vec<Tag>),
    One(Tag),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Tag {
    pub name: String,
    pub url: Option<String>,
}

/// Error payload, delivered with HTTP 200 for most failures
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiError {
    pub error: i32,
    pub message: String,
}

/// Either a successful payload or an error payload
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Envelope<T> {
    Error(ApiError),
    Ok(T),
}
