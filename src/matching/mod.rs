// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lexical alignment, hit aggregation and scoring.

pub mod aggregate;
pub mod align;
pub mod score;

pub use aggregate::{
    merge_segments, ChunkFetcher, DocumentEvidence, MatchAggregator, MatchSegment, RawHit,
};
pub use align::{align, align_chars, AlignedBlock};
pub use score::{coverage_score, semantic_score, word_overlap};
