//! Cover Art Archive integration
//!
//! Fetches album covers by MusicBrainz release group ID.

pub mod dto;
mod client;

pub use client::{CoverArtClient, CoverSize};
