// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding module - chunking and vector embeddings for semantic retrieval
//!
//! Documents are split into overlapping character windows, and every window
//! is mapped to a unit vector so that inner product equals cosine similarity.

pub mod chunker;
pub mod encoder;
pub mod provider;

pub use chunker::{ChunkConfig, EmbeddingChunker, TextChunk};
pub use encoder::{l2_normalize, Embedder};
pub use provider::{
    CommandProvider, EmbeddingProvider, EmbeddingProviderConfig, FastEmbedder, HashingProvider,
};

/// Default embedding dimension for sentence-transformers/all-MiniLM-L6-v2.
pub const DEFAULT_EMBEDDING_DIM: usize = 384;
