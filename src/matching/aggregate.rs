// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns raw nearest-neighbor hits into merged, highlightable segments per
//! source document.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::deadline::Deadline;
use crate::errors::Result;
use crate::matching::align_chars;
use crate::matching::score::word_overlap;
use crate::store::{ChunkRecord, DocumentStore};
use crate::text::slice_chars;

/// One nearest-neighbor hit of a query chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHit {
    pub query_chunk: u32,
    pub document_id: String,
    pub chunk_index: u32,
    pub score: f32,
}

/// A highlighted span of the checked text.
///
/// `start..end` are character offsets into the checked text;
/// `source_match_start` is where the span begins in the matched source chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchSegment {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub source_match_start: usize,
}

impl MatchSegment {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Looks up stored chunks by document and index.
pub trait ChunkFetcher {
    fn fetch_chunk(&self, document_id: &str, index: u32) -> Result<Option<ChunkRecord>>;
}

impl<T: DocumentStore + ?Sized> ChunkFetcher for T {
    fn fetch_chunk(&self, document_id: &str, index: u32) -> Result<Option<ChunkRecord>> {
        self.get_chunk(document_id, index)
    }
}

/// What one source document contributed to an analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentEvidence {
    pub document_id: String,
    /// Merged, ascending, non-overlapping.
    pub segments: Vec<MatchSegment>,
    /// Best cosine score of every query chunk that hit this document.
    pub best_scores: Vec<f32>,
    /// Word overlap between the query and the candidate chunks, 0-100.
    pub word_overlap: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct MatchAggregator {
    threshold: f32,
    min_match_length: usize,
}

impl MatchAggregator {
    pub fn new(threshold: f32, min_match_length: usize) -> Self {
        Self {
            threshold,
            min_match_length,
        }
    }

    /// Highlight threshold for a query of `query_len` characters. Clamped so
    /// that a query shorter than the configured length can still match whole.
    pub fn effective_min_length(&self, query_len: usize) -> usize {
        self.min_match_length.min(query_len).max(1)
    }

    /// Aggregates hits against the normalized query characters.
    ///
    /// Documents are returned in ascending id order; each has at least one
    /// hit at or above the threshold.
    pub fn aggregate<F>(
        &self,
        query: &[char],
        hits: &[RawHit],
        fetcher: &F,
        deadline: &Deadline,
    ) -> Result<Vec<DocumentEvidence>>
    where
        F: ChunkFetcher + ?Sized,
    {
        let mut best: BTreeMap<&str, HashMap<u32, f32>> = BTreeMap::new();
        let mut candidates: BTreeMap<&str, BTreeSet<u32>> = BTreeMap::new();

        for hit in hits.iter().filter(|h| h.score >= self.threshold) {
            let per_chunk = best.entry(hit.document_id.as_str()).or_default();
            let slot = per_chunk.entry(hit.query_chunk).or_insert(hit.score);
            if hit.score > *slot {
                *slot = hit.score;
            }

            let indices = candidates.entry(hit.document_id.as_str()).or_default();
            if hit.chunk_index > 0 {
                indices.insert(hit.chunk_index - 1);
            }
            indices.insert(hit.chunk_index);
            indices.insert(hit.chunk_index.saturating_add(1));
        }

        let min_length = self.effective_min_length(query.len());
        let query_text: String = query.iter().collect();
        let mut evidence = Vec::with_capacity(candidates.len());

        for (document_id, indices) in candidates {
            let mut segments = Vec::new();
            let mut candidate_text = String::new();

            for index in indices {
                deadline.check("aggregation")?;
                let Some(chunk) = fetcher.fetch_chunk(document_id, index)? else {
                    continue;
                };
                let chunk_chars: Vec<char> = chunk.text.chars().collect();
                for block in align_chars(query, &chunk_chars, min_length) {
                    segments.push(MatchSegment {
                        text: String::new(),
                        start: block.a_start,
                        end: block.a_end(),
                        source_match_start: block.b_start,
                    });
                }
                if !candidate_text.is_empty() {
                    candidate_text.push(' ');
                }
                candidate_text.push_str(&chunk.text);
            }

            let mut best_scores: Vec<(u32, f32)> = best
                .remove(document_id)
                .unwrap_or_default()
                .into_iter()
                .collect();
            best_scores.sort_by_key(|(query_chunk, _)| *query_chunk);

            evidence.push(DocumentEvidence {
                document_id: document_id.to_string(),
                segments: merge_segments(segments, query),
                best_scores: best_scores.into_iter().map(|(_, score)| score).collect(),
                word_overlap: word_overlap(&query_text, &candidate_text),
            });
        }

        tracing::debug!(
            hits = hits.len(),
            documents = evidence.len(),
            "aggregated hits"
        );

        Ok(evidence)
    }
}

/// Merges overlapping or touching segments and recomputes their text from
/// `source`.
///
/// The result is ascending and non-overlapping; merging it again is a no-op.
pub fn merge_segments(mut segments: Vec<MatchSegment>, source: &[char]) -> Vec<MatchSegment> {
    segments.retain(|s| !s.is_empty());
    segments.sort_by_key(|s| (s.start, s.end));

    let mut merged: Vec<MatchSegment> = Vec::with_capacity(segments.len());
    for segment in segments {
        match merged.last_mut() {
            Some(current) if segment.start <= current.end => {
                current.end = current.end.max(segment.end);
            }
            _ => merged.push(segment),
        }
    }

    for segment in &mut merged {
        segment.end = segment.end.min(source.len());
        segment.text = slice_chars(source, segment.start, segment.end);
    }
    merged.retain(|s| !s.is_empty());
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use std::time::Duration;

    struct MapFetcher(HashMap<(String, u32), ChunkRecord>);

    impl MapFetcher {
        fn new(document_id: &str, chunks: &[&str]) -> Self {
            let mut map = HashMap::new();
            let mut start = 0;
            for (i, text) in chunks.iter().enumerate() {
                let len = text.chars().count();
                map.insert(
                    (document_id.to_string(), i as u32),
                    ChunkRecord {
                        document_id: document_id.to_string(),
                        index: i as u32,
                        text: text.to_string(),
                        start,
                        end: start + len,
                    },
                );
                start += len + 1;
            }
            Self(map)
        }
    }

    impl ChunkFetcher for MapFetcher {
        fn fetch_chunk(&self, document_id: &str, index: u32) -> Result<Option<ChunkRecord>> {
            Ok(self.0.get(&(document_id.to_string(), index)).cloned())
        }
    }

    fn segment(start: usize, end: usize) -> MatchSegment {
        MatchSegment {
            text: String::new(),
            start,
            end,
            source_match_start: start,
        }
    }

    fn hit(query_chunk: u32, document_id: &str, chunk_index: u32, score: f32) -> RawHit {
        RawHit {
            query_chunk,
            document_id: document_id.to_string(),
            chunk_index,
            score,
        }
    }

    fn chars(text: &str) -> Vec<char> {
        text.chars().collect()
    }

    #[test]
    fn test_merge_overlapping_segments() {
        let source = vec!['x'; 200];
        let merged = merge_segments(vec![segment(55, 120), segment(10, 60)], &source);
        assert_eq!(merged.len(), 1);
        assert_eq!((merged[0].start, merged[0].end), (10, 120));
        assert_eq!(merged[0].text.len(), 110);
        assert_eq!(merged[0].source_match_start, 10);
    }

    #[test]
    fn test_merge_touching_and_disjoint() {
        let source = vec!['y'; 100];
        let merged = merge_segments(
            vec![segment(0, 10), segment(10, 20), segment(30, 40), segment(32, 35)],
            &source,
        );
        let spans: Vec<(usize, usize)> = merged.iter().map(|s| (s.start, s.end)).collect();
        assert_eq!(spans, vec![(0, 20), (30, 40)]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let source = chars("the quick brown fox jumps over the lazy dog again and again");
        let once = merge_segments(
            vec![segment(4, 15), segment(12, 19), segment(30, 40), segment(0, 2)],
            &source,
        );
        let twice = merge_segments(once.clone(), &source);
        assert_eq!(once, twice);

        let total: usize = once.iter().map(MatchSegment::len).sum();
        assert!(total <= source.len());
        for pair in once.windows(2) {
            assert!(pair[0].end < pair[1].start);
        }
    }

    #[test]
    fn test_identical_short_query_matches_whole() {
        let query = chars("The quick brown fox");
        let fetcher = MapFetcher::new("doc", &["The quick brown fox"]);
        let aggregator = MatchAggregator::new(0.5, 45);

        let evidence = aggregator
            .aggregate(&query, &[hit(0, "doc", 0, 0.99)], &fetcher, &Deadline::none())
            .unwrap();

        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].segments.len(), 1);
        assert_eq!(evidence[0].segments[0].text, "The quick brown fox");
        assert_eq!(evidence[0].best_scores, vec![0.99]);
        assert_eq!(evidence[0].word_overlap, 100.0);
    }

    #[test]
    fn test_hits_below_threshold_ignored() {
        let query = chars("The quick brown fox");
        let fetcher = MapFetcher::new("doc", &["The quick brown fox"]);
        let aggregator = MatchAggregator::new(0.8, 5);

        let evidence = aggregator
            .aggregate(&query, &[hit(0, "doc", 0, 0.3)], &fetcher, &Deadline::none())
            .unwrap();
        assert!(evidence.is_empty());
    }

    #[test]
    fn test_neighbor_chunks_are_pulled_in() {
        let query = chars("alpha beta gamma delta epsilon zeta eta theta");
        let fetcher = MapFetcher::new(
            "doc",
            &["unrelated words here", "nothing to see", "epsilon zeta eta theta"],
        );
        let aggregator = MatchAggregator::new(0.0, 10);

        // Only chunk 1 was hit, but chunk 2 holds the literal overlap.
        let evidence = aggregator
            .aggregate(
                &query,
                &[hit(0, "doc", 1, 0.7), hit(1, "doc", 1, 0.6)],
                &fetcher,
                &Deadline::none(),
            )
            .unwrap();

        assert_eq!(evidence.len(), 1);
        let segments = &evidence[0].segments;
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "epsilon zeta eta theta");
        assert_eq!(segments[0].source_match_start, 0);
        assert_eq!(evidence[0].best_scores, vec![0.7, 0.6]);
    }

    #[test]
    fn test_duplicate_hits_keep_best_score() {
        let query = chars("some query text that is long enough");
        let fetcher = MapFetcher::new("doc", &["some query text that is long enough"]);
        let aggregator = MatchAggregator::new(0.0, 10);

        let evidence = aggregator
            .aggregate(
                &query,
                &[hit(0, "doc", 0, 0.4), hit(0, "doc", 0, 0.9), hit(0, "doc", 0, 0.2)],
                &fetcher,
                &Deadline::none(),
            )
            .unwrap();

        assert_eq!(evidence[0].best_scores, vec![0.9]);
        assert_eq!(evidence[0].segments.len(), 1);
    }

    #[test]
    fn test_deadline_aborts() {
        let query = chars("text");
        let fetcher = MapFetcher::new("doc", &["text"]);
        let aggregator = MatchAggregator::new(0.0, 1);
        let deadline = Deadline::after(Some(Duration::ZERO));

        let err = aggregator
            .aggregate(&query, &[hit(0, "doc", 0, 1.0)], &fetcher, &deadline)
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[test]
    fn test_effective_min_length() {
        let aggregator = MatchAggregator::new(0.5, 45);
        assert_eq!(aggregator.effective_min_length(19), 19);
        assert_eq!(aggregator.effective_min_length(500), 45);
        assert_eq!(aggregator.effective_min_length(0), 1);
    }
}
