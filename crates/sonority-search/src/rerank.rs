//! Artist-diversity re-ranking.
//!
//! Nearest neighbors in an audio embedding space cluster by artist, so a
//! plain top-N tends to return one artist's catalog. The re-ranker keeps
//! the first hit of each artist in distance order and only falls back to
//! repeat artists when there are not enough distinct ones to reach the
//! target.

use std::collections::HashSet;
use std::hash::Hash;

use sonority_core::dto::SimilarShortEntity;

/// Result size of the diverse short lookup.
pub const DEFAULT_TARGET: usize = 9;

/// Re-rank `items` (nearest first) so no key repeats until every distinct
/// key in the consumed prefix has been used.
///
/// Single pass: each item whose key has not been seen is accepted, the rest
/// go to a fallback list. The walk stops as soon as `target` items are
/// accepted; a short result is then topped up from the fallback list in
/// order. The result has `min(target, items.len())` entries and both
/// buckets keep their input order.
pub fn diversify_by<T, K, F>(items: impl IntoIterator<Item = T>, target: usize, mut key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: FnMut(&T) -> K,
{
    let mut seen = HashSet::new();
    let mut accepted = Vec::with_capacity(target);
    let mut fallback = Vec::new();

    for item in items {
        if accepted.len() == target {
            break;
        }
        if seen.insert(key(&item)) {
            accepted.push(item);
        } else {
            fallback.push(item);
        }
    }

    if accepted.len() < target {
        let missing = target - accepted.len();
        accepted.extend(fallback.into_iter().take(missing));
    }
    accepted
}

/// [`diversify_by`] keyed on artist.
#[must_use]
pub fn diversify(entities: Vec<SimilarShortEntity>, target: usize) -> Vec<SimilarShortEntity> {
    diversify_by(entities, target, |e| e.artist.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(title: &str, artist: &str) -> SimilarShortEntity {
        SimilarShortEntity {
            title: title.to_string(),
            album: format!("{artist} album"),
            artist: artist.to_string(),
            path: format!("{artist}/{title}.mp3"),
        }
    }

    fn cycling(count: usize, artists: usize) -> Vec<SimilarShortEntity> {
        (0..count)
            .map(|i| entity(&format!("song {i}"), &format!("Artist {}", i % artists)))
            .collect()
    }

    fn titles(entities: &[SimilarShortEntity]) -> Vec<&str> {
        entities.iter().map(|e| e.title.as_str()).collect()
    }

    #[test]
    fn test_cycling_artists_fill_target_with_fallbacks() {
        let result = diversify(cycling(15, 5), 9);

        assert_eq!(result.len(), 9);
        let artists: HashSet<_> = result.iter().map(|e| e.artist.as_str()).collect();
        assert_eq!(artists.len(), 5);
        for artist in &artists {
            let count = result.iter().filter(|e| e.artist == *artist).count();
            assert!(count <= 2, "{artist} appears {count} times");
        }
        // Single occurrences first, then fallbacks in input order.
        assert_eq!(
            titles(&result),
            vec![
                "song 0", "song 1", "song 2", "song 3", "song 4", "song 5", "song 6", "song 7",
                "song 8"
            ]
        );
        for pair in result.windows(2) {
            assert_ne!(pair[0].artist, pair[1].artist);
        }
    }

    #[test]
    fn test_enough_distinct_artists_means_no_duplicates() {
        let result = diversify(cycling(30, 12), 9);
        let artists: HashSet<_> = result.iter().map(|e| e.artist.as_str()).collect();
        assert_eq!(result.len(), 9);
        assert_eq!(artists.len(), 9);
    }

    #[test]
    fn test_duplicates_are_skipped_before_later_distinct_artists() {
        let input = vec![
            entity("a1", "A"),
            entity("a2", "A"),
            entity("b1", "B"),
            entity("a3", "A"),
            entity("c1", "C"),
        ];
        let result = diversify(input, 3);
        assert_eq!(titles(&result), vec!["a1", "b1", "c1"]);
    }

    #[test]
    fn test_stops_once_target_reached() {
        let input = vec![entity("a1", "A"), entity("b1", "B"), entity("c1", "C")];
        let result = diversify(input, 2);
        assert_eq!(titles(&result), vec!["a1", "b1"]);
    }

    #[test]
    fn test_size_bound() {
        assert!(diversify(Vec::new(), 9).is_empty());
        assert_eq!(diversify(vec![entity("only", "A")], 9).len(), 1);
        assert_eq!(diversify(cycling(4, 1), 9).len(), 4);
        assert!(diversify(cycling(4, 4), 0).is_empty());
        for len in 0..20 {
            for artists in 1..6 {
                let result = diversify(cycling(len, artists), 9);
                assert_eq!(result.len(), len.min(9));
            }
        }
    }

    #[test]
    fn test_single_artist_keeps_input_order() {
        let result = diversify(cycling(12, 1), 9);
        let expected: Vec<String> = (0..9).map(|i| format!("song {i}")).collect();
        assert_eq!(
            titles(&result),
            expected.iter().map(String::as_str).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_bucket_order_is_preserved() {
        let input = vec![
            entity("a1", "A"),
            entity("a2", "A"),
            entity("b1", "B"),
            entity("b2", "B"),
            entity("a3", "A"),
        ];
        let result = diversify(input, 5);
        // Accepted: a1, b1; fallback in input order: a2, b2, a3.
        assert_eq!(titles(&result), vec!["a1", "b1", "a2", "b2", "a3"]);
    }

    #[test]
    fn test_diversify_by_custom_key() {
        let result = diversify_by(vec![10, 12, 21, 14, 33], 3, |n| n / 10);
        assert_eq!(result, vec![10, 21, 33]);
    }
}
