// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory vector index with exact cosine ranking.
//!
//! Vectors live in one contiguous `f32` buffer addressed by internal id,
//! which is always the insertion ordinal. Search is brute force over every
//! live entry (parallel with rayon), so the ranking is exact at any corpus
//! size. Deleting a document tombstones its entries; ids are never reused.

mod container;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use crate::embedding::l2_normalize;
use crate::errors::{Error, Result};

/// Maps an internal id back to the chunk it was computed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorIndexEntry {
    pub internal_id: u64,
    pub document_id: String,
    pub chunk_index: u32,
    #[serde(default)]
    pub deleted: bool,
}

/// Identifies the chunk a new vector belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkRef {
    pub document_id: String,
    pub chunk_index: u32,
}

impl ChunkRef {
    pub fn new(document_id: impl Into<String>, chunk_index: u32) -> Self {
        Self {
            document_id: document_id.into(),
            chunk_index,
        }
    }
}

/// A search result, ordered by descending cosine similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub internal_id: u64,
    pub score: f32,
    pub document_id: String,
    pub chunk_index: u32,
}

/// Vectors validated and assigned ids, not yet visible to searches.
#[derive(Debug)]
pub struct PendingVectors {
    base_len: usize,
    vectors: Vec<f32>,
    entries: Vec<VectorIndexEntry>,
}

impl PendingVectors {
    pub fn ids(&self) -> Vec<u64> {
        self.entries.iter().map(|e| e.internal_id).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
struct IndexData {
    vectors: Vec<f32>,
    entries: Vec<VectorIndexEntry>,
}

/// Exact cosine vector index.
#[derive(Debug)]
pub struct VectorIndex {
    model_id: String,
    dimension: usize,
    data: RwLock<IndexData>,
}

impl VectorIndex {
    /// Creates an empty index bound to one model and dimension.
    pub fn new(model_id: impl Into<String>, dimension: usize) -> Self {
        Self {
            model_id: model_id.into(),
            dimension,
            data: RwLock::new(IndexData::default()),
        }
    }

    /// Loads a container, checking it was built by the active model.
    pub fn load(path: impl AsRef<Path>, model_id: &str, dimension: usize) -> Result<Self> {
        let (header, vectors) = container::read_container(path.as_ref())?;

        if header.model_id != model_id {
            return Err(Error::Configuration(format!(
                "index at {} was built with model '{}', active model is '{}'",
                path.as_ref().display(),
                header.model_id,
                model_id
            )));
        }
        if header.dimension != dimension {
            return Err(Error::Configuration(format!(
                "index dimension {} does not match model dimension {}",
                header.dimension, dimension
            )));
        }

        tracing::debug!(
            path = %path.as_ref().display(),
            vectors = header.count,
            "loaded vector index"
        );

        Ok(Self {
            model_id: header.model_id,
            dimension: header.dimension,
            data: RwLock::new(IndexData {
                vectors,
                entries: header.entries,
            }),
        })
    }

    /// Loads `path` if it exists, otherwise starts empty.
    pub fn open_or_create(path: impl AsRef<Path>, model_id: &str, dimension: usize) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path, model_id, dimension)
        } else {
            Ok(Self::new(model_id, dimension))
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of ids handed out, tombstones included.
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of searchable vectors.
    pub fn live_len(&self) -> usize {
        self.read().entries.iter().filter(|e| !e.deleted).count()
    }

    pub fn entry(&self, internal_id: u64) -> Option<VectorIndexEntry> {
        self.read().entries.get(internal_id as usize).cloned()
    }

    /// Validates vectors and assigns the ids they will receive.
    pub fn prepare(&self, vectors: Vec<Vec<f32>>, metadata: Vec<ChunkRef>) -> Result<PendingVectors> {
        if vectors.len() != metadata.len() {
            return Err(Error::Configuration(format!(
                "{} vectors supplied with {} metadata entries",
                vectors.len(),
                metadata.len()
            )));
        }

        let base_len = self.len();
        let mut flat = Vec::with_capacity(vectors.len() * self.dimension);
        let mut entries = Vec::with_capacity(vectors.len());

        for (offset, (mut vector, chunk)) in vectors.into_iter().zip(metadata).enumerate() {
            if vector.len() != self.dimension {
                return Err(Error::Configuration(format!(
                    "vector dimension {} does not match index dimension {}",
                    vector.len(),
                    self.dimension
                )));
            }
            if !l2_normalize(&mut vector) {
                return Err(Error::Embedding(format!(
                    "zero vector for {}#{}",
                    chunk.document_id, chunk.chunk_index
                )));
            }
            flat.extend_from_slice(&vector);
            entries.push(VectorIndexEntry {
                internal_id: (base_len + offset) as u64,
                document_id: chunk.document_id,
                chunk_index: chunk.chunk_index,
                deleted: false,
            });
        }

        Ok(PendingVectors {
            base_len,
            vectors: flat,
            entries,
        })
    }

    /// Publishes staged vectors. Fails if another write landed since
    /// [`prepare`](Self::prepare), since the staged ids would be stale.
    pub fn commit(&self, pending: PendingVectors) -> Result<Vec<u64>> {
        let mut data = self.write();
        if data.entries.len() != pending.base_len {
            return Err(Error::IndexState(format!(
                "index grew from {} to {} while vectors were staged",
                pending.base_len,
                data.entries.len()
            )));
        }
        let ids = pending.ids();
        data.vectors.extend_from_slice(&pending.vectors);
        data.entries.extend(pending.entries);
        Ok(ids)
    }

    /// Appends vectors and returns their internal ids.
    pub fn add(&self, vectors: Vec<Vec<f32>>, metadata: Vec<ChunkRef>) -> Result<Vec<u64>> {
        let pending = self.prepare(vectors, metadata)?;
        self.commit(pending)
    }

    /// Top-k live entries by cosine similarity.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        self.search_filtered(query, k, |_| true)
    }

    /// Top-k live entries accepted by `filter`.
    pub fn search_filtered<F>(&self, query: &[f32], k: usize, filter: F) -> Result<Vec<IndexHit>>
    where
        F: Fn(&VectorIndexEntry) -> bool + Sync,
    {
        if query.len() != self.dimension {
            return Err(Error::Configuration(format!(
                "query dimension {} does not match index dimension {}",
                query.len(),
                self.dimension
            )));
        }
        let mut query = query.to_vec();
        if k == 0 || !l2_normalize(&mut query) {
            return Ok(Vec::new());
        }

        let data = self.read();
        let dim = self.dimension;
        let mut scored: Vec<(usize, f32)> = data
            .entries
            .par_iter()
            .enumerate()
            .filter(|(_, entry)| !entry.deleted && filter(entry))
            .map(|(pos, _)| {
                let vector = &data.vectors[pos * dim..(pos + 1) * dim];
                (pos, dot(vector, &query))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(pos, score)| {
                let entry = &data.entries[pos];
                IndexHit {
                    internal_id: entry.internal_id,
                    score,
                    document_id: entry.document_id.clone(),
                    chunk_index: entry.chunk_index,
                }
            })
            .collect())
    }

    /// Tombstones every vector of a document; returns how many were hidden.
    pub fn remove_document(&self, document_id: &str) -> usize {
        let mut data = self.write();
        let mut removed = 0;
        for entry in data
            .entries
            .iter_mut()
            .filter(|e| !e.deleted && e.document_id == document_id)
        {
            entry.deleted = true;
            removed += 1;
        }
        removed
    }

    /// Swaps in the contents of another index built for the same model.
    pub fn replace_with(&self, other: VectorIndex) -> Result<()> {
        if other.model_id != self.model_id || other.dimension != self.dimension {
            return Err(Error::Configuration(format!(
                "cannot replace index of '{}' ({}) with '{}' ({})",
                self.model_id, self.dimension, other.model_id, other.dimension
            )));
        }
        let fresh = other.data.into_inner().unwrap_or_else(PoisonError::into_inner);
        *self.write() = fresh;
        Ok(())
    }

    /// Writes the current state to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let data = self.read();
        container::write_container(
            path.as_ref(),
            &self.model_id,
            self.dimension,
            &data.entries,
            &data.vectors,
        )
    }

    /// Writes the current state plus `pending` to `path` without publishing
    /// the pending vectors in memory.
    pub fn save_with(&self, path: impl AsRef<Path>, pending: &PendingVectors) -> Result<()> {
        let data = self.read();
        if data.entries.len() != pending.base_len {
            return Err(Error::IndexState(
                "index changed while vectors were staged".to_string(),
            ));
        }
        let mut entries = data.entries.clone();
        entries.extend(pending.entries.iter().cloned());
        let mut vectors = data.vectors.clone();
        vectors.extend_from_slice(&pending.vectors);
        container::write_container(path.as_ref(), &self.model_id, self.dimension, &entries, &vectors)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, IndexData> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, IndexData> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    fn refs(doc: &str, n: u32) -> Vec<ChunkRef> {
        (0..n).map(|i| ChunkRef::new(doc, i)).collect()
    }

    fn sample_index() -> VectorIndex {
        let index = VectorIndex::new("test-model", 3);
        index
            .add(
                vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.9, 0.1, 0.0]],
                refs("a", 3),
            )
            .unwrap();
        index
    }

    #[test]
    fn test_empty_index_search() {
        let index = VectorIndex::new("test-model", 3);
        assert!(index.search(&[1.0, 0.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_ids_are_insertion_ordinals() {
        let index = sample_index();
        let ids = index
            .add(vec![vec![0.0, 0.0, 1.0]], refs("b", 1))
            .unwrap();
        assert_eq!(ids, vec![3]);
        assert_eq!(index.entry(3).unwrap().document_id, "b");
    }

    #[test]
    fn test_search_orders_by_cosine() {
        let index = sample_index();
        let hits = index.search(&[1.0, 0.0, 0.0], 2).unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].internal_id, 0);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert_eq!(hits[1].internal_id, 2);
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn test_search_ties_break_by_id() {
        let index = VectorIndex::new("test-model", 2);
        index
            .add(vec![vec![0.0, 1.0], vec![0.0, 2.0], vec![0.0, 3.0]], refs("t", 3))
            .unwrap();
        let hits = index.search(&[0.0, 1.0], 3).unwrap();
        let ids: Vec<u64> = hits.iter().map(|h| h.internal_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let index = VectorIndex::new("test-model", 3);
        assert!(matches!(
            index.add(vec![vec![1.0, 0.0]], refs("a", 1)),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            index.search(&[1.0, 0.0], 1),
            Err(Error::Configuration(_))
        ));
        assert!(index.is_empty());
    }

    #[test]
    fn test_filtered_search() {
        let index = sample_index();
        index.add(vec![vec![1.0, 0.0, 0.0]], refs("b", 1)).unwrap();
        let hits = index
            .search_filtered(&[1.0, 0.0, 0.0], 10, |e| e.document_id == "b")
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, "b");
    }

    #[test]
    fn test_remove_document_keeps_ids_reserved() {
        let index = sample_index();
        assert_eq!(index.remove_document("a"), 3);
        assert!(index.search(&[1.0, 0.0, 0.0], 5).unwrap().is_empty());
        assert_eq!(index.live_len(), 0);

        let ids = index.add(vec![vec![1.0, 0.0, 0.0]], refs("c", 1)).unwrap();
        assert_eq!(ids, vec![3]);
    }

    #[test]
    fn test_stale_pending_rejected() {
        let index = sample_index();
        let pending = index.prepare(vec![vec![0.0, 0.0, 1.0]], refs("x", 1)).unwrap();
        index.add(vec![vec![0.0, 1.0, 1.0]], refs("y", 1)).unwrap();
        assert!(matches!(index.commit(pending), Err(Error::IndexState(_))));
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vectors.idx");
        let index = sample_index();
        index.remove_document("missing");
        index.save(&path).unwrap();

        let loaded = VectorIndex::load(&path, "test-model", 3).unwrap();
        let query = [0.6, 0.8, 0.0];
        assert_eq!(
            index.search(&query, 3).unwrap(),
            loaded.search(&query, 3).unwrap()
        );
    }

    #[test]
    fn test_save_with_pending_persists_without_publishing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vectors.idx");
        let index = sample_index();
        let pending = index.prepare(vec![vec![0.0, 0.0, 1.0]], refs("b", 1)).unwrap();

        index.save_with(&path, &pending).unwrap();
        assert_eq!(index.len(), 3);

        let loaded = VectorIndex::load(&path, "test-model", 3).unwrap();
        assert_eq!(loaded.len(), 4);

        assert_eq!(index.commit(pending).unwrap(), vec![3]);
    }

    #[test]
    fn test_replace_with_compacts() {
        let index = sample_index();
        index.remove_document("a");
        let fresh = VectorIndex::new("test-model", 3);
        fresh.add(vec![vec![0.0, 0.0, 1.0]], refs("b", 1)).unwrap();

        index.replace_with(fresh).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.entry(0).unwrap().document_id, "b");

        let other = VectorIndex::new("other-model", 3);
        assert!(index.replace_with(other).is_err());
    }

    #[test]
    fn test_load_rejects_other_model() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vectors.idx");
        sample_index().save(&path).unwrap();

        assert!(matches!(
            VectorIndex::load(&path, "other-model", 3),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            VectorIndex::load(&path, "test-model", 4),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_concurrent_search_sees_whole_vectors() {
        let index = Arc::new(VectorIndex::new("test-model", 4));
        let writer = {
            let index = Arc::clone(&index);
            thread::spawn(move || {
                for i in 0..50 {
                    index
                        .add(vec![vec![1.0, 1.0, 1.0, 1.0]], vec![ChunkRef::new("w", i)])
                        .unwrap();
                }
            })
        };

        for _ in 0..50 {
            for hit in index.search(&[1.0, 1.0, 1.0, 1.0], 100).unwrap() {
                assert!((hit.score - 1.0).abs() < 1e-5);
            }
        }
        writer.join().unwrap();
        assert_eq!(index.len(), 50);
    }
}
