// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistent document store.
//!
//! Keeps document records, their chunks and (optionally) chunk embeddings,
//! keyed by document id and partitioned by [`Scope`].

mod sqlite;

pub use sqlite::SqliteStore;

use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Repository partition a document belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "repo_type", rename_all = "snake_case")]
pub enum Scope {
    /// Shared repository.
    #[default]
    University,
    /// A single owner's repository.
    Personal { owner_id: i64 },
}

impl Scope {
    pub fn repo_type(&self) -> &'static str {
        match self {
            Scope::University => "university",
            Scope::Personal { .. } => "personal",
        }
    }

    pub fn owner_id(&self) -> Option<i64> {
        match self {
            Scope::University => None,
            Scope::Personal { owner_id } => Some(*owner_id),
        }
    }

    /// Rebuilds a scope from its stored columns.
    pub fn from_columns(repo_type: &str, owner_id: Option<i64>) -> Result<Self> {
        match (repo_type, owner_id) {
            ("university", _) => Ok(Scope::University),
            ("personal", Some(owner_id)) => Ok(Scope::Personal { owner_id }),
            ("personal", None) => Err(Error::Configuration(
                "personal scope requires an owner id".to_string(),
            )),
            (other, _) => Err(Error::Configuration(format!(
                "unknown repository type '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::University => write!(f, "university"),
            Scope::Personal { owner_id } => write!(f, "personal:{}", owner_id),
        }
    }
}

/// A stored document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentRecord {
    pub id: String,
    pub file_name: String,
    /// Character count of the normalized text.
    pub length: usize,
    pub chunk_count: usize,
    pub unit_count: u32,
    pub scope: Scope,
    /// Unix timestamp, seconds.
    pub indexed_at: i64,
}

/// A stored chunk; offsets are characters into the normalized document text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkRecord {
    pub document_id: String,
    pub index: u32,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// A chunk with its persisted embedding, if one was stored.
#[derive(Debug, Clone)]
pub struct ChunkWithEmbedding {
    pub chunk: ChunkRecord,
    pub scope: Scope,
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub documents: u64,
    pub chunks: u64,
    pub embeddings: u64,
}

/// Durable storage of documents, chunks and embeddings.
///
/// `None` as a scope argument means every scope.
pub trait DocumentStore: Send + Sync {
    /// Inserts a document record. An existing id is a
    /// [`Error::DuplicateDocument`].
    fn create_document(&self, document: &DocumentRecord) -> Result<()>;

    fn add_chunks(&self, document_id: &str, chunks: &[ChunkRecord]) -> Result<()>;

    /// Stores embeddings keyed by chunk index, replacing existing ones.
    fn put_embeddings(&self, document_id: &str, embeddings: &[(u32, Vec<f32>)]) -> Result<()>;

    /// Inserts a document, its chunks and embeddings in one transaction.
    fn save_document(
        &self,
        document: &DocumentRecord,
        chunks: &[ChunkRecord],
        embeddings: &[(u32, Vec<f32>)],
    ) -> Result<()>;

    fn get_document(&self, document_id: &str) -> Result<Option<DocumentRecord>>;

    fn get_chunk(&self, document_id: &str, index: u32) -> Result<Option<ChunkRecord>>;

    fn list_documents(&self, scope: Option<&Scope>) -> Result<Vec<DocumentRecord>>;

    fn list_chunks_with_embeddings(&self, scope: Option<&Scope>) -> Result<Vec<ChunkWithEmbedding>>;

    /// Removes a document with its chunks and embeddings. Returns whether
    /// anything was deleted.
    fn delete_document(&self, document_id: &str) -> Result<bool>;

    fn stats(&self) -> Result<StoreStats>;

    fn contains_document(&self, document_id: &str) -> Result<bool> {
        Ok(self.get_document(document_id)?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_columns_round_trip() {
        for scope in [Scope::University, Scope::Personal { owner_id: 7 }] {
            let rebuilt = Scope::from_columns(scope.repo_type(), scope.owner_id()).unwrap();
            assert_eq!(rebuilt, scope);
        }
    }

    #[test]
    fn test_scope_rejects_bad_columns() {
        assert!(Scope::from_columns("personal", None).is_err());
        assert!(Scope::from_columns("department", None).is_err());
    }

    #[test]
    fn test_scope_display() {
        assert_eq!(Scope::University.to_string(), "university");
        assert_eq!(Scope::Personal { owner_id: 3 }.to_string(), "personal:3");
    }
}
