//! Music Enricher - metadata enrichment and conflict resolution for a music library.
//!
//! Artists and albums are enriched from MusicBrainz, the Cover Art Archive,
//! Last.fm and Fanart.tv. Trusted sources update the library directly; the
//! rest are queued as conflicts for review.

pub mod cli;
pub mod config;
pub mod conflicts;
pub mod db;
pub mod enrichment;
pub mod error;
pub mod model;
#[cfg(test)]
pub mod test_utils;
