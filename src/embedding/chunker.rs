// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text chunker for embedding generation.
//!
//! Splits normalized document text into overlapping character windows. Each
//! chunk carries the character offsets it occupies in the normalized text, so
//! matches found inside a chunk can be mapped back onto the document.

use crate::errors::{Error, Result};
use crate::text::normalize;

/// Default window size in characters for repository documents.
pub const DEFAULT_WINDOW_SIZE: usize = 500;

/// Default overlap between consecutive repository chunks.
pub const DEFAULT_OVERLAP: usize = 100;

/// Default window size for chunking a query document.
pub const DEFAULT_QUERY_WINDOW_SIZE: usize = 300;

/// Default overlap for query chunks.
pub const DEFAULT_QUERY_OVERLAP: usize = 50;

/// Chunks shorter than this are dropped unless they are the only chunk.
pub const MIN_CHUNK_LENGTH: usize = 20;

/// Configuration for the text chunker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkConfig {
    /// Target window size in characters.
    pub window_size: usize,
    /// Characters shared by consecutive windows.
    pub overlap: usize,
    /// Minimum chunk length in characters.
    pub min_length: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            overlap: DEFAULT_OVERLAP,
            min_length: MIN_CHUNK_LENGTH,
        }
    }
}

impl ChunkConfig {
    /// Creates a validated ChunkConfig.
    pub fn new(window_size: usize, overlap: usize) -> Result<Self> {
        if window_size == 0 {
            return Err(Error::Configuration(
                "chunk window_size must be greater than 0".to_string(),
            ));
        }
        if overlap >= window_size {
            return Err(Error::Configuration(format!(
                "chunk overlap ({}) must be less than window_size ({})",
                overlap, window_size
            )));
        }
        Ok(Self {
            window_size,
            overlap,
            ..Default::default()
        })
    }

    /// Config used for the submitted document during analysis.
    pub fn query_default() -> Self {
        Self {
            window_size: DEFAULT_QUERY_WINDOW_SIZE,
            overlap: DEFAULT_QUERY_OVERLAP,
            min_length: MIN_CHUNK_LENGTH,
        }
    }

    /// Sets the minimum chunk length.
    pub fn with_min_length(mut self, length: usize) -> Self {
        self.min_length = length;
        self
    }

    fn step(&self) -> usize {
        self.window_size - self.overlap
    }
}

/// A chunk of normalized text with its character offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// 0-based position of the chunk within its document.
    pub index: u32,
    /// Start offset (inclusive) in the normalized text.
    pub start: usize,
    /// End offset (exclusive) in the normalized text.
    pub end: usize,
    /// The chunk text, equal to `normalized[start..end]`.
    pub text: String,
}

impl TextChunk {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Splits text into overlapping chunks for embedding generation.
#[derive(Debug, Clone)]
pub struct EmbeddingChunker {
    config: ChunkConfig,
}

impl EmbeddingChunker {
    /// Creates a new chunker, rejecting windows that cannot make progress.
    pub fn new(config: ChunkConfig) -> Result<Self> {
        ChunkConfig::new(config.window_size, config.overlap)?;
        Ok(Self { config })
    }

    /// Creates a chunker with default configuration.
    pub fn with_defaults() -> Self {
        Self {
            config: ChunkConfig::default(),
        }
    }

    /// Returns the current configuration.
    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// Normalizes `content` and splits it into chunks.
    pub fn chunk_text(&self, content: &str) -> Vec<TextChunk> {
        self.chunk_normalized(&normalize(content))
    }

    /// Splits text that is already normalized.
    ///
    /// Algorithm:
    /// ```text
    /// start = 0
    /// step = window_size - overlap
    /// loop:
    ///   end = min(start + window_size, len)
    ///   if end cuts a word: end = last whitespace in (start + window_size/2, end)
    ///   trim whitespace at both edges, keep chunk if long enough
    ///   stop once end == len
    ///   start = min(start + step, end)
    /// ```
    pub fn chunk_normalized(&self, text: &str) -> Vec<TextChunk> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        if total == 0 {
            return Vec::new();
        }

        let window = self.config.window_size;
        let step = self.config.step();
        let mut chunks: Vec<TextChunk> = Vec::new();
        let mut start = 0_usize;

        loop {
            let mut end = (start + window).min(total);

            if end < total && !chars[end].is_whitespace() && !chars[end - 1].is_whitespace() {
                if let Some(space) = (start..end).rev().find(|&i| chars[i].is_whitespace()) {
                    if space > start + window / 2 {
                        end = space;
                    }
                }
            }

            let is_last = end >= total;
            let (chunk_start, chunk_end) = trim_bounds(&chars, start, end);
            if chunk_end > chunk_start {
                let length = chunk_end - chunk_start;
                if length >= self.config.min_length || (is_last && chunks.is_empty()) {
                    chunks.push(TextChunk {
                        index: chunks.len() as u32,
                        start: chunk_start,
                        end: chunk_end,
                        text: chars[chunk_start..chunk_end].iter().collect(),
                    });
                }
            }

            if is_last {
                break;
            }
            // A pulled-back edge must not open a gap before the next window.
            start = (start + step).min(end);
        }

        chunks
    }
}

fn trim_bounds(chars: &[char], mut start: usize, mut end: usize) -> (usize, usize) {
    while start < end && chars[start].is_whitespace() {
        start += 1;
    }
    while end > start && chars[end - 1].is_whitespace() {
        end -= 1;
    }
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(window: usize, overlap: usize, min_length: usize) -> EmbeddingChunker {
        EmbeddingChunker::new(ChunkConfig::new(window, overlap).unwrap().with_min_length(min_length))
            .unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = ChunkConfig::default();
        assert_eq!(config.window_size, 500);
        assert_eq!(config.overlap, 100);
        assert_eq!(ChunkConfig::query_default().window_size, 300);
    }

    #[test]
    fn test_config_validation() {
        assert!(ChunkConfig::new(500, 100).is_ok());

        assert!(matches!(ChunkConfig::new(20, 20), Err(Error::Configuration(_))));
        assert!(matches!(ChunkConfig::new(20, 30), Err(Error::Configuration(_))));
        assert!(matches!(ChunkConfig::new(0, 0), Err(Error::Configuration(_))));

        let bad = ChunkConfig {
            window_size: 10,
            overlap: 10,
            min_length: 1,
        };
        assert!(EmbeddingChunker::new(bad).is_err());
    }

    #[test]
    fn test_empty_content() {
        let chunker = EmbeddingChunker::with_defaults();
        assert!(chunker.chunk_text("").is_empty());
        assert!(chunker.chunk_text(" \n\n ").is_empty());
    }

    #[test]
    fn test_short_document_yields_single_chunk() {
        let chunks = EmbeddingChunker::with_defaults().chunk_text("AAAA BBBB CCCC");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[0].end, 14);
        assert_eq!(chunks[0].text, "AAAA BBBB CCCC");
    }

    #[test]
    fn test_line_breaks_are_ordinary_text() {
        let chunks = EmbeddingChunker::with_defaults().chunk_text("AAAA\n\nBBBB\nCCCC");
        assert_eq!(chunks[0].text, "AAAA BBBB CCCC");
    }

    #[test]
    fn test_fixed_windows_with_overlap() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let chunks = chunker(10, 4, 1).chunk_normalized(text);

        let bounds: Vec<(usize, usize)> = chunks.iter().map(|c| (c.start, c.end)).collect();
        assert_eq!(bounds, vec![(0, 10), (6, 16), (12, 22), (18, 26)]);
        assert_eq!(chunks[1].text, "ghijklmnop");
        assert_eq!(chunks.iter().map(|c| c.index).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_window_pulled_back_to_whitespace() {
        let text = "aaaa bbbb cccc dddd";
        let chunks = chunker(12, 2, 1).chunk_normalized(text);

        assert_eq!(chunks.len(), 2);
        assert_eq!((chunks[0].start, chunks[0].end), (0, 9));
        assert_eq!(chunks[0].text, "aaaa bbbb");
        assert_eq!((chunks[1].start, chunks[1].end), (10, 19));
        assert_eq!(chunks[1].text, "cccc dddd");
    }

    #[test]
    fn test_pull_back_never_below_half_window() {
        // The only space sits too early, so the word is cut instead.
        let text = "ab cdefghijklmnopqrstuvwxyz";
        let chunks = chunker(10, 2, 1).chunk_normalized(text);
        assert_eq!((chunks[0].start, chunks[0].end), (0, 10));
    }

    #[test]
    fn test_trailing_short_chunk_dropped() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let chunks = chunker(10, 4, 9).chunk_normalized(text);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.last().unwrap().end, 22);
    }

    #[test]
    fn test_offsets_match_text_and_leave_no_gaps() {
        let text = normalize(
            &"Lorem ipsum dolor sit amet, consectetur adipiscing elit.\n".repeat(40),
        );
        let chars: Vec<char> = text.chars().collect();
        let chunks = chunker(120, 30, 20).chunk_normalized(&text);

        assert!(chunks.len() > 5);
        for chunk in &chunks {
            let expected: String = chars[chunk.start..chunk.end].iter().collect();
            assert_eq!(chunk.text, expected);
            assert!(chunk.len() <= 120);
        }
        for pair in chunks.windows(2) {
            assert!(pair[1].start <= pair[0].end + 1, "gap between chunks");
            assert!(pair[1].start > pair[0].start);
        }
        assert_eq!(chunks.last().unwrap().end, chars.len());
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(30);
        let chunker = chunker(100, 20, 20);
        assert_eq!(chunker.chunk_text(&text), chunker.chunk_text(&text));
    }
}
