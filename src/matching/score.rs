// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded 0-100 percentages.

use crate::matching::MatchSegment;
use crate::text::word_set;

/// Share of `source_length` covered by `segments`, capped at 100.
///
/// Segments are expected to be merged already; overlapping input is counted
/// twice and then clamped.
pub fn coverage_score(source_length: usize, segments: &[MatchSegment]) -> f64 {
    if source_length == 0 {
        return 0.0;
    }
    let covered: usize = segments.iter().map(MatchSegment::len).sum();
    (100.0 * covered as f64 / source_length as f64).min(100.0)
}

/// Mean cosine similarity as a percentage; `0` for no scores.
pub fn semantic_score(scores: &[f32]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let mean = scores.iter().map(|&s| s as f64).sum::<f64>() / scores.len() as f64;
    (mean * 100.0).clamp(0.0, 100.0)
}

/// Jaccard similarity of the lowercase word sets, as a percentage.
pub fn word_overlap(a: &str, b: &str) -> f64 {
    let words_a = word_set(a);
    let words_b = word_set(b);
    let union = words_a.union(&words_b).count();
    if union == 0 {
        return 0.0;
    }
    let shared = words_a.intersection(&words_b).count();
    100.0 * shared as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(start: usize, end: usize) -> MatchSegment {
        MatchSegment {
            text: String::new(),
            start,
            end,
            source_match_start: 0,
        }
    }

    #[test]
    fn test_coverage_bounds() {
        assert_eq!(coverage_score(0, &[segment(0, 10)]), 0.0);
        assert_eq!(coverage_score(100, &[]), 0.0);
        assert_eq!(coverage_score(100, &[segment(0, 25), segment(50, 75)]), 50.0);
        assert_eq!(coverage_score(10, &[segment(0, 10), segment(0, 10)]), 100.0);
    }

    #[test]
    fn test_semantic_score() {
        assert_eq!(semantic_score(&[]), 0.0);
        assert!((semantic_score(&[0.5, 1.0]) - 75.0).abs() < 1e-9);
        assert_eq!(semantic_score(&[-0.4]), 0.0);
        assert_eq!(semantic_score(&[1.2]), 100.0);
    }

    #[test]
    fn test_word_overlap() {
        assert_eq!(word_overlap("", ""), 0.0);
        assert_eq!(word_overlap("The cat", "the CAT"), 100.0);
        assert!((word_overlap("a b c", "b c d") - 50.0).abs() < 1e-9);
        assert_eq!(word_overlap("alpha", "beta"), 0.0);
    }
}
