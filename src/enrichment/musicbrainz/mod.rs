//! MusicBrainz API integration
//!
//! Finds MusicBrainz identifiers by name search and confirms them by lookup,
//! pulling curated genres/tags along the way. The only provider whose search
//! results can assign identifiers automatically.
//!
//! API docs: https://musicbrainz.org/doc/MusicBrainz_API

pub mod dto;
mod adapter;
mod client;

pub use client::MusicBrainzClient;
