//! Fanart.tv API Data Transfer Objects
//!
//! Shapes returned by the v3 music endpoints. Numeric fields such as `likes`
//! arrive as strings.
//!
//! API Reference: https://fanarttv.docs.apiary.io/

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// `GET /v3/music/{artist_mbid}`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ArtistImagesResponse {
    pub name: Option<String>,
    pub mbid_id: Option<String>,
    #[serde(default)]
    pub artistthumb: Vec<Image>,
    #[serde(default)]
    pub artistbackground: Vec<Image>,
    #[serde(default)]
    pub hdmusiclogo: Vec<Image>,
}

/// `GET /v3/music/albums/{release_group_mbid}`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AlbumImagesResponse {
    pub name: Option<String>,
    /// Keyed by release group MBID
    #[serde(default)]
    pub albums: HashMap<String, AlbumImages>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AlbumImages {
    #[serde(default)]
    pub albumcover: Vec<Image>,
    #[serde(default)]
    pub cdart: Vec<Image>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Image {
    pub id: Option<String>,
    pub url: String,
    /// Vote count, as a string
    #[serde(default)]
    pub likes: Option<String>,
    pub lang: Option<String>,
}

impl Image {
    pub fn like_count(&self) -> u32 {
        self.likes
            .as_deref()
            .and_then(|l| l.trim().parse().ok())
            .unwrap_or(0)
    }
}
