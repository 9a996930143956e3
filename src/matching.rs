//! Exact-match policy for pairing a stored track with catalog search results.
//!
//! A candidate matches only when its normalized title and its full artist set
//! both equal the target's, compared case-insensitively. Partial artist overlap
//! never matches: leaving a track unresolved is preferred over linking a cover
//! or a remix.

use crate::ports::catalog::MatchCandidate;
use crate::scrape::normalize_track_name;

/// The track being looked up.
#[derive(Debug, Clone)]
pub struct MatchTarget {
    pub name: String,
    pub artists: Vec<String>,
}

impl MatchTarget {
    pub fn new(name: impl Into<String>, artists: Vec<String>) -> Self {
        Self {
            name: name.into(),
            artists,
        }
    }
}

fn comparable_name(name: &str) -> String {
    normalize_track_name(name).to_lowercase()
}

fn comparable_artists<S: AsRef<str>>(artists: &[S]) -> Vec<String> {
    let mut artists: Vec<String> = artists
        .iter()
        .map(|artist| artist.as_ref().to_lowercase())
        .collect();
    artists.sort();
    artists
}

/// Return the first candidate, in the order given, whose title and artist set
/// match the target. The catalog's relevance order is trusted as-is.
pub fn find_match<'a>(
    target: &MatchTarget,
    candidates: &'a [MatchCandidate],
) -> Option<&'a MatchCandidate> {
    let target_name = comparable_name(&target.name);
    let target_artists = comparable_artists(&target.artists);

    candidates.iter().find(|candidate| {
        let candidate_name = comparable_name(&candidate.name);
        if candidate_name != target_name {
            tracing::trace!(
                "Rejected {:?}: title {:?}",
                candidate.catalog_id,
                candidate_name
            );
            return false;
        }

        let candidate_artists = comparable_artists(&candidate.artists);
        if candidate_artists.len() != target_artists.len() {
            tracing::trace!(
                "Rejected {:?}: {} artists, wanted {}",
                candidate.catalog_id,
                candidate_artists.len(),
                target_artists.len()
            );
            return false;
        }

        candidate_artists == target_artists
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, name: &str, artists: &[&str]) -> MatchCandidate {
        MatchCandidate {
            catalog_id: id.to_string(),
            name: name.to_string(),
            artists: artists.iter().map(|a| a.to_string()).collect(),
            preview_url: None,
        }
    }

    fn target(name: &str, artists: &[&str]) -> MatchTarget {
        MatchTarget::new(name, artists.iter().map(|a| a.to_string()).collect())
    }

    #[test]
    fn test_first_full_match_wins_over_remix() {
        let candidates = vec![
            candidate("c1", "Song", &["B Artist", "A Artist"]),
            candidate("c2", "Song (Remix)", &["A Artist"]),
        ];

        let found = find_match(&target("Song", &["a artist", "b artist"]), &candidates);
        assert_eq!(found.map(|c| c.catalog_id.as_str()), Some("c1"));
    }

    #[test]
    fn test_returns_first_of_several_full_matches() {
        let candidates = vec![
            candidate("wrong", "Other", &["A"]),
            candidate("first", "Song", &["A"]),
            candidate("second", "Song", &["A"]),
        ];

        let found = find_match(&target("Song", &["A"]), &candidates);
        assert_eq!(found.map(|c| c.catalog_id.as_str()), Some("first"));
    }

    #[test]
    fn test_artist_count_mismatch_never_matches() {
        let candidates = vec![
            candidate("fewer", "Song", &["A"]),
            candidate("more", "Song", &["A", "B", "C"]),
        ];

        assert!(find_match(&target("Song", &["A", "B"]), &candidates).is_none());
    }

    #[test]
    fn test_partial_artist_overlap_is_not_a_match() {
        let candidates = vec![candidate("c1", "Song", &["A", "C"])];
        assert!(find_match(&target("Song", &["A", "B"]), &candidates).is_none());
    }

    #[test]
    fn test_candidate_title_is_normalized() {
        let candidates = vec![candidate(
            "c1",
            "\u{201C}SONG\u{201D} (feat. Guest)",
            &["Main"],
        )];

        let found = find_match(&target("Song", &["main"]), &candidates);
        assert_eq!(found.map(|c| c.catalog_id.as_str()), Some("c1"));
    }

    #[test]
    fn test_target_title_is_normalized_the_same_way() {
        // A raw scraped title and a clean catalog title must meet in the middle
        let candidates = vec![candidate("c1", "Dont Stop", &["Band"])];

        let found = find_match(
            &target("\u{2018}Don\u{2019}t Stop\u{2019} [ft. X]", &["Band"]),
            &candidates,
        );
        assert_eq!(found.map(|c| c.catalog_id.as_str()), Some("c1"));
    }

    #[test]
    fn test_unnormalized_apostrophe_on_one_side_only_is_still_equal() {
        // Both sides lose their quotes, so "Don't" and "Dont" compare equal
        let candidates = vec![candidate("c1", "Don't", &["Band"])];
        let found = find_match(&target("Dont", &["Band"]), &candidates);
        assert!(found.is_some());
    }

    #[test]
    fn test_different_title_rejected() {
        let candidates = vec![candidate("c1", "Song (Live)", &["A"])];
        assert!(find_match(&target("Song", &["A"]), &candidates).is_none());
    }

    #[test]
    fn test_no_candidates() {
        assert!(find_match(&target("Song", &["A"]), &[]).is_none());
    }
}
