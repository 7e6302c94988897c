//! Last.fm integration
//!
//! Biographies, album wikis, pictures and tags. Results always go through
//! the review queue.

pub mod dto;
mod adapter;
mod client;

pub use client::LastFmClient;
