//! Confidence scoring for name-search candidates.
//!
//! Compares a local artist/album against MusicBrainz search hits and produces
//! a 0.0-1.0 confidence. Scores are pure functions of their inputs, so the
//! same entity always picks the same candidate.

use strsim::normalized_levenshtein;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use super::domain::SearchCandidate;

/// Weight of the album title in album confidence
pub const ALBUM_TITLE_WEIGHT: f64 = 0.7;
/// Weight of the artist name in album confidence
pub const ALBUM_ARTIST_WEIGHT: f64 = 0.3;

/// Normalize a name for comparison.
///
/// - Folds case and strips diacritics ("Björk" → "bjork")
/// - Treats "&" as "and"
/// - Collapses punctuation and whitespace
/// - Drops a leading article ("The Beatles" → "beatles")
pub fn normalize(s: &str) -> String {
    let folded: String = s
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .replace('&', " and ");

    let cleaned = folded
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    for prefix in ["the ", "a ", "an "] {
        if let Some(rest) = cleaned.strip_prefix(prefix)
            && !rest.is_empty()
        {
            return rest.to_string();
        }
    }
    cleaned
}

/// Similarity of two names after normalization (0.0-1.0).
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);

    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    normalized_levenshtein(&a, &b).clamp(0.0, 1.0)
}

/// Confidence that a candidate is the local artist.
pub fn score_artist(local_name: &str, candidate_name: &str) -> f64 {
    similarity(local_name, candidate_name)
}

/// Confidence that a candidate is the local album.
///
/// Without an artist on either side only the title counts.
pub fn score_album(
    local_title: &str,
    local_artist: Option<&str>,
    candidate_title: &str,
    candidate_artist: Option<&str>,
) -> f64 {
    let title = similarity(local_title, candidate_title);
    match (local_artist, candidate_artist) {
        (Some(local), Some(candidate)) => {
            ALBUM_TITLE_WEIGHT * title + ALBUM_ARTIST_WEIGHT * similarity(local, candidate)
        }
        _ => title,
    }
}

/// Whether a confidence clears the threshold. The boundary is inclusive.
pub fn meets_threshold(confidence: f64, threshold: f64) -> bool {
    confidence >= threshold
}

/// Highest-scoring candidate; the first one wins ties.
pub fn best_candidate(
    candidates: &[SearchCandidate],
    local_name: &str,
    local_artist: Option<&str>,
    is_album: bool,
) -> Option<(SearchCandidate, f64)> {
    let mut best: Option<(SearchCandidate, f64)> = None;

    for candidate in candidates {
        let score = if is_album {
            score_album(
                local_name,
                local_artist,
                &candidate.name,
                candidate.artist_name.as_deref(),
            )
        } else {
            score_artist(local_name, &candidate.name)
        };

        if best.as_ref().is_none_or(|(_, s)| score > *s) {
            best = Some((candidate.clone(), score));
        }
    }

    best
}
