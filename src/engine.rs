// SPDX-License-Identifier: MIT OR Apache-2.0

//! The similarity engine service object.
//!
//! One [`SimilarityEngine`] per process owns the embedder, the vector index
//! and the document store. Searches run concurrently; index mutations are
//! serialized by a writer lock and only become visible once the document,
//! its chunks and its vectors are all durably stored.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::deadline::Deadline;
use crate::embedding::{ChunkConfig, Embedder, EmbeddingChunker, TextChunk};
use crate::errors::{Error, Result};
use crate::index::{ChunkRef, VectorIndex};
use crate::matching::{
    align_chars, coverage_score, merge_segments, semantic_score, word_overlap, MatchAggregator,
    MatchSegment, RawHit,
};
use crate::store::{ChunkRecord, DocumentRecord, DocumentStore, Scope, StoreStats};
use crate::text::{char_len, normalize};

/// Default number of neighbors retrieved per query chunk.
pub const DEFAULT_TOP_K: usize = 5;

/// Default cosine threshold for a hit to count.
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Default minimum highlighted run, in characters.
pub const DEFAULT_MIN_MATCH_LENGTH: usize = 45;

/// Engine-wide settings fixed at construction.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Chunking of repository documents.
    pub chunk: ChunkConfig,
    /// Chunking of submitted texts during analysis.
    pub query_chunk: ChunkConfig,
    /// Location of the vector index container.
    pub index_path: PathBuf,
}

impl EngineSettings {
    pub fn new(index_path: impl Into<PathBuf>) -> Self {
        Self {
            chunk: ChunkConfig::default(),
            query_chunk: ChunkConfig::query_default(),
            index_path: index_path.into(),
        }
    }

    pub fn with_chunk(mut self, chunk: ChunkConfig) -> Self {
        self.chunk = chunk;
        self
    }

    pub fn with_query_chunk(mut self, query_chunk: ChunkConfig) -> Self {
        self.query_chunk = query_chunk;
        self
    }
}

/// A document to add to the repository.
#[derive(Debug, Clone)]
pub struct IndexRequest {
    /// Explicit id; derived from the content when absent.
    pub document_id: Option<String>,
    pub file_name: String,
    pub text: String,
    pub unit_count: u32,
    pub scope: Scope,
    pub timeout: Option<Duration>,
    /// Once published, removes other documents with the same file name and
    /// scope.
    pub replace: bool,
}

impl IndexRequest {
    pub fn new(file_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            document_id: None,
            file_name: file_name.into(),
            text: text.into(),
            unit_count: 1,
            scope: Scope::University,
            timeout: None,
            replace: false,
        }
    }

    pub fn with_id(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_unit_count(mut self, unit_count: u32) -> Self {
        self.unit_count = unit_count;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_replace(mut self, replace: bool) -> Self {
        self.replace = replace;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexOutcome {
    pub document_id: String,
    pub chunk_count: usize,
    /// Chunks stored without a vector because embedding them failed.
    pub skipped_chunks: usize,
    /// Earlier versions removed by a replacing request.
    pub replaced: Vec<String>,
}

/// Per-request analysis options.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub top_k: usize,
    pub threshold: f32,
    pub min_match_length: usize,
    /// Restricts candidates to one repository partition.
    pub scope: Option<Scope>,
    pub timeout: Option<Duration>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            threshold: DEFAULT_THRESHOLD,
            min_match_length: DEFAULT_MIN_MATCH_LENGTH,
            scope: None,
            timeout: None,
        }
    }
}

/// Overlap with one repository document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanResult {
    pub document_id: String,
    pub source_filename: String,
    /// Share of the query covered by highlighted segments, 0-100.
    pub similarity_score: f64,
    /// Mean best cosine of the query chunks that hit this document, 0-100.
    pub semantic_score: f64,
    pub word_overlap: f64,
    pub segments: Vec<MatchSegment>,
}

/// Result of one analysis request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanReport {
    pub overall_similarity: f64,
    pub semantic_similarity: f64,
    /// Mean word overlap between each query chunk and its best hit, 0-100.
    pub lexical_similarity: f64,
    pub query_length: usize,
    pub query_chunk_count: usize,
    pub skipped_chunks: usize,
    pub matches: Vec<ScanResult>,
}

/// Result of comparing two texts directly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    /// Share of the second text found in the first, 0-100.
    pub score: f64,
    /// Segments in the second text's coordinates.
    pub segments: Vec<MatchSegment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStats {
    pub documents: u64,
    pub chunks: u64,
    pub embeddings: u64,
    pub index_vectors: usize,
    pub live_vectors: usize,
    pub model_id: String,
    pub dimension: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebuildOutcome {
    pub vectors: usize,
    /// Chunks whose stored embedding was missing or stale and was recomputed.
    pub reencoded: usize,
    pub skipped_chunks: usize,
}

pub struct SimilarityEngine {
    embedder: Embedder,
    index: VectorIndex,
    store: Box<dyn DocumentStore>,
    chunker: EmbeddingChunker,
    query_chunker: EmbeddingChunker,
    index_path: PathBuf,
    writer: Mutex<()>,
}

impl SimilarityEngine {
    /// Builds the engine and loads the persisted index.
    ///
    /// A missing index file is rebuilt from the store. An index built by
    /// another model fails with [`Error::Configuration`].
    pub fn open(
        embedder: Embedder,
        store: Box<dyn DocumentStore>,
        settings: EngineSettings,
    ) -> Result<Self> {
        let index_exists = settings.index_path.exists();
        let index = VectorIndex::open_or_create(
            &settings.index_path,
            embedder.model_id(),
            embedder.dimension(),
        )?;
        let engine = Self::assemble(embedder, store, settings, index)?;

        if !index_exists && engine.store.stats()?.chunks > 0 {
            tracing::info!(
                path = %engine.index_path.display(),
                "vector index missing, rebuilding from store"
            );
            engine.rebuild_index()?;
        }

        Ok(engine)
    }

    /// Builds the engine with an empty index, ignoring any persisted one.
    /// Call [`rebuild_index`](Self::rebuild_index) to repopulate it.
    pub fn open_fresh(
        embedder: Embedder,
        store: Box<dyn DocumentStore>,
        settings: EngineSettings,
    ) -> Result<Self> {
        let index = VectorIndex::new(embedder.model_id(), embedder.dimension());
        Self::assemble(embedder, store, settings, index)
    }

    fn assemble(
        embedder: Embedder,
        store: Box<dyn DocumentStore>,
        settings: EngineSettings,
        index: VectorIndex,
    ) -> Result<Self> {
        Ok(Self {
            chunker: EmbeddingChunker::new(settings.chunk)?,
            query_chunker: EmbeddingChunker::new(settings.query_chunk)?,
            index_path: settings.index_path,
            embedder,
            index,
            store,
            writer: Mutex::new(()),
        })
    }

    pub fn model_id(&self) -> &str {
        self.embedder.model_id()
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    /// Adds a document to the repository.
    ///
    /// Either the document, its chunks and its vectors all become visible,
    /// or none of them do.
    pub fn index_document(&self, request: IndexRequest) -> Result<IndexOutcome> {
        let deadline = Deadline::after(request.timeout);
        let normalized = normalize(&request.text);
        if normalized.is_empty() {
            return Err(Error::EmptyContent(request.file_name));
        }

        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let document_id = request
            .document_id
            .clone()
            .unwrap_or_else(|| document_fingerprint(&normalized));
        if self.store.contains_document(&document_id)? {
            return Err(Error::DuplicateDocument(document_id));
        }

        deadline.check("chunking")?;
        let chunks = self.chunker.chunk_normalized(&normalized);
        if chunks.is_empty() {
            return Err(Error::EmptyContent(request.file_name));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let outcomes = self.embedder.encode_each(&texts, &deadline)?;

        let mut embeddings: Vec<(u32, Vec<f32>)> = Vec::with_capacity(chunks.len());
        let mut skipped = 0;
        for (chunk, outcome) in chunks.iter().zip(outcomes) {
            match outcome {
                Ok(vector) => embeddings.push((chunk.index, vector)),
                Err(err) => {
                    skipped += 1;
                    tracing::warn!(
                        document = %document_id,
                        chunk = chunk.index,
                        error = %err,
                        "skipping chunk that could not be embedded"
                    );
                }
            }
        }
        if embeddings.is_empty() {
            return Err(Error::Embedding(format!(
                "no chunk of {} could be embedded",
                request.file_name
            )));
        }

        deadline.check("storing")?;
        let record = DocumentRecord {
            id: document_id.clone(),
            file_name: request.file_name.clone(),
            length: char_len(&normalized),
            chunk_count: chunks.len(),
            unit_count: request.unit_count,
            scope: request.scope.clone(),
            indexed_at: unix_now(),
        };
        let chunk_records: Vec<ChunkRecord> = chunks
            .iter()
            .map(|c| chunk_record(&document_id, c))
            .collect();
        self.store.save_document(&record, &chunk_records, &embeddings)?;

        if let Err(err) = self.publish_vectors(&document_id, &embeddings, &deadline) {
            if let Err(cleanup) = self.store.delete_document(&document_id) {
                tracing::warn!(
                    document = %document_id,
                    error = %cleanup,
                    "failed to roll back stored document"
                );
            }
            return Err(err);
        }

        let replaced = if request.replace {
            self.remove_superseded(&document_id, &request.file_name, &request.scope)?
        } else {
            Vec::new()
        };

        tracing::info!(
            document = %document_id,
            file = %request.file_name,
            chunks = chunks.len(),
            skipped,
            replaced = replaced.len(),
            "indexed document"
        );

        Ok(IndexOutcome {
            document_id,
            chunk_count: chunks.len(),
            skipped_chunks: skipped,
            replaced,
        })
    }

    /// Removes the other documents named `file_name` in `scope`. Caller holds
    /// the writer lock.
    fn remove_superseded(
        &self,
        current_id: &str,
        file_name: &str,
        scope: &Scope,
    ) -> Result<Vec<String>> {
        let stale: Vec<String> = self
            .store
            .list_documents(Some(scope))?
            .into_iter()
            .filter(|doc| doc.file_name == file_name && doc.id != current_id)
            .map(|doc| doc.id)
            .collect();
        for id in &stale {
            self.remove_locked(id)?;
        }
        Ok(stale)
    }

    fn publish_vectors(
        &self,
        document_id: &str,
        embeddings: &[(u32, Vec<f32>)],
        deadline: &Deadline,
    ) -> Result<()> {
        deadline.check("indexing")?;
        let vectors = embeddings.iter().map(|(_, v)| v.clone()).collect();
        let refs = embeddings
            .iter()
            .map(|(index, _)| ChunkRef::new(document_id, *index))
            .collect();
        let pending = self.index.prepare(vectors, refs)?;
        self.index.save_with(&self.index_path, &pending)?;
        self.index.commit(pending)?;
        Ok(())
    }

    /// Analyzes `query_text` against the repository.
    pub fn search(&self, query_text: &str, options: &SearchOptions) -> Result<ScanReport> {
        let deadline = Deadline::after(options.timeout);
        let normalized = normalize(query_text);
        if normalized.is_empty() {
            return Err(Error::EmptyContent("query text".to_string()));
        }
        let query: Vec<char> = normalized.chars().collect();

        let chunks = self.query_chunker.chunk_normalized(&normalized);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let outcomes = self.embedder.encode_each(&texts, &deadline)?;

        let allowed: Option<HashSet<String>> = match &options.scope {
            Some(scope) => Some(
                self.store
                    .list_documents(Some(scope))?
                    .into_iter()
                    .map(|d| d.id)
                    .collect(),
            ),
            None => None,
        };

        let mut hits = Vec::new();
        let mut best_per_chunk = Vec::with_capacity(chunks.len());
        let mut lexical_total = 0.0;
        let mut skipped = 0;
        for (chunk, outcome) in chunks.iter().zip(outcomes) {
            let vector = match outcome {
                Ok(vector) => vector,
                Err(err) => {
                    skipped += 1;
                    tracing::warn!(chunk = chunk.index, error = %err, "skipping query chunk");
                    continue;
                }
            };
            deadline.check("search")?;
            let found = self.index.search_filtered(&vector, options.top_k, |entry| {
                allowed
                    .as_ref()
                    .is_none_or(|ids| ids.contains(&entry.document_id))
            })?;

            // Hits arrive best first.
            match found.first().filter(|h| h.score >= options.threshold) {
                Some(top) => {
                    best_per_chunk.push(top.score);
                    let source = self.store.get_chunk(&top.document_id, top.chunk_index)?;
                    if let Some(source) = source {
                        lexical_total += word_overlap(&chunk.text, &source.text);
                    }
                }
                None => best_per_chunk.push(0.0),
            }

            hits.extend(found.into_iter().map(|h| RawHit {
                query_chunk: chunk.index,
                document_id: h.document_id,
                chunk_index: h.chunk_index,
                score: h.score,
            }));
        }

        let aggregator = MatchAggregator::new(options.threshold, options.min_match_length);
        let evidence = aggregator.aggregate(&query, &hits, self.store.as_ref(), &deadline)?;

        let mut matches = Vec::with_capacity(evidence.len());
        for doc in evidence {
            if doc.segments.is_empty() {
                continue;
            }
            let Some(record) = self.store.get_document(&doc.document_id)? else {
                continue;
            };
            matches.push(ScanResult {
                similarity_score: coverage_score(query.len(), &doc.segments),
                semantic_score: semantic_score(&doc.best_scores),
                word_overlap: doc.word_overlap,
                document_id: doc.document_id,
                source_filename: record.file_name,
                segments: doc.segments,
            });
        }
        matches.sort_by(|a, b| {
            b.similarity_score
                .total_cmp(&a.similarity_score)
                .then(b.semantic_score.total_cmp(&a.semantic_score))
                .then_with(|| a.document_id.cmp(&b.document_id))
        });

        let overall_similarity = matches
            .iter()
            .map(|m| m.similarity_score)
            .fold(0.0, f64::max);
        let (semantic_similarity, lexical_similarity) = if chunks.is_empty() {
            (0.0, 0.0)
        } else {
            let total: f32 = best_per_chunk.iter().sum();
            let count = chunks.len() as f64;
            (
                (100.0 * total as f64 / count).clamp(0.0, 100.0),
                (lexical_total / count).clamp(0.0, 100.0),
            )
        };

        tracing::debug!(
            query_chars = query.len(),
            query_chunks = chunks.len(),
            matches = matches.len(),
            "analysis finished"
        );

        Ok(ScanReport {
            overall_similarity,
            semantic_similarity,
            lexical_similarity,
            query_length: query.len(),
            query_chunk_count: chunks.len(),
            skipped_chunks: skipped,
            matches,
        })
    }

    /// Measures how much of `text_b` is found verbatim in `text_a`.
    pub fn compare(&self, text_a: &str, text_b: &str, min_match_length: usize) -> Result<Comparison> {
        self.compare_within(text_a, text_b, min_match_length, &Deadline::none())
    }

    /// [`compare`](Self::compare) with a time budget, checked per chunk.
    pub fn compare_within(
        &self,
        text_a: &str,
        text_b: &str,
        min_match_length: usize,
        deadline: &Deadline,
    ) -> Result<Comparison> {
        compare_texts(&self.chunker, text_a, text_b, min_match_length, deadline)
    }

    /// Removes a document with its chunks, embeddings and vectors.
    pub fn delete_document(&self, document_id: &str) -> Result<bool> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        self.remove_locked(document_id)
    }

    fn remove_locked(&self, document_id: &str) -> Result<bool> {
        let deleted = self.store.delete_document(document_id)?;
        let removed = self.index.remove_document(document_id);
        if removed > 0 {
            self.index.save(&self.index_path)?;
        }

        tracing::info!(document = %document_id, deleted, vectors = removed, "deleted document");
        Ok(deleted || removed > 0)
    }

    pub fn list_documents(&self, scope: Option<&Scope>) -> Result<Vec<DocumentRecord>> {
        self.store.list_documents(scope)
    }

    pub fn stats(&self) -> Result<EngineStats> {
        let StoreStats {
            documents,
            chunks,
            embeddings,
        } = self.store.stats()?;
        Ok(EngineStats {
            documents,
            chunks,
            embeddings,
            index_vectors: self.index.len(),
            live_vectors: self.index.live_len(),
            model_id: self.index.model_id().to_string(),
            dimension: self.index.dimension(),
        })
    }

    /// Rebuilds the vector index from the store.
    ///
    /// Stored embeddings of the right dimension are reused; the rest are
    /// recomputed and written back. Tombstones are dropped and ids are
    /// reassigned from zero.
    pub fn rebuild_index(&self) -> Result<RebuildOutcome> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let dimension = self.embedder.dimension();

        let stored = self.store.list_chunks_with_embeddings(None)?;
        let mut vectors: Vec<Option<Vec<f32>>> = Vec::with_capacity(stored.len());
        let mut missing: Vec<usize> = Vec::new();
        for (pos, item) in stored.iter().enumerate() {
            match &item.embedding {
                Some(v) if v.len() == dimension => vectors.push(Some(v.clone())),
                _ => {
                    vectors.push(None);
                    missing.push(pos);
                }
            }
        }

        let texts: Vec<String> = missing.iter().map(|&pos| stored[pos].chunk.text.clone()).collect();
        let outcomes = self.embedder.encode_each(&texts, &Deadline::none())?;

        let mut reencoded: HashMap<&str, Vec<(u32, Vec<f32>)>> = HashMap::new();
        let mut skipped = 0;
        for (&pos, outcome) in missing.iter().zip(outcomes) {
            let chunk = &stored[pos].chunk;
            match outcome {
                Ok(vector) => {
                    reencoded
                        .entry(chunk.document_id.as_str())
                        .or_default()
                        .push((chunk.index, vector.clone()));
                    vectors[pos] = Some(vector);
                }
                Err(err) => {
                    skipped += 1;
                    tracing::warn!(
                        document = %chunk.document_id,
                        chunk = chunk.index,
                        error = %err,
                        "chunk left out of rebuilt index"
                    );
                }
            }
        }
        let reencoded_count = reencoded.values().map(Vec::len).sum();
        for (document_id, embeddings) in &reencoded {
            self.store.put_embeddings(document_id, embeddings)?;
        }

        let mut flat = Vec::new();
        let mut refs = Vec::new();
        for (item, vector) in stored.iter().zip(vectors) {
            if let Some(vector) = vector {
                flat.push(vector);
                refs.push(ChunkRef::new(item.chunk.document_id.clone(), item.chunk.index));
            }
        }

        let fresh = VectorIndex::new(self.embedder.model_id(), dimension);
        let count = flat.len();
        fresh.add(flat, refs)?;
        fresh.save(&self.index_path)?;
        self.index.replace_with(fresh)?;

        tracing::info!(vectors = count, reencoded = reencoded_count, skipped, "rebuilt vector index");

        Ok(RebuildOutcome {
            vectors: count,
            reencoded: reencoded_count,
            skipped_chunks: skipped,
        })
    }
}

/// Measures how much of `text_b` is found verbatim in `text_a`.
///
/// `text_b` is chunked and every chunk is aligned against the whole of
/// `text_a`; segments are reported in `text_b` coordinates with
/// `source_match_start` pointing into `text_a`.
pub fn compare_texts(
    chunker: &EmbeddingChunker,
    text_a: &str,
    text_b: &str,
    min_match_length: usize,
    deadline: &Deadline,
) -> Result<Comparison> {
    let a: Vec<char> = normalize(text_a).chars().collect();
    let normalized_b = normalize(text_b);
    let b: Vec<char> = normalized_b.chars().collect();
    if a.is_empty() || b.is_empty() {
        return Ok(Comparison {
            score: 0.0,
            segments: Vec::new(),
        });
    }

    let min_length = min_match_length.min(b.len()).max(1);
    let mut segments = Vec::new();
    for chunk in chunker.chunk_normalized(&normalized_b) {
        deadline.check("comparison")?;
        let chunk_chars: Vec<char> = chunk.text.chars().collect();
        for block in align_chars(&chunk_chars, &a, min_length) {
            segments.push(MatchSegment {
                text: String::new(),
                start: chunk.start + block.a_start,
                end: chunk.start + block.a_end(),
                source_match_start: block.b_start,
            });
        }
    }

    let segments = merge_segments(segments, &b);
    Ok(Comparison {
        score: coverage_score(b.len(), &segments),
        segments,
    })
}

/// Content-derived document id: the first 16 hex digits of blake3 over the
/// normalized text.
pub fn document_fingerprint(normalized: &str) -> String {
    blake3::hash(normalized.as_bytes()).to_hex()[..16].to_string()
}

fn chunk_record(document_id: &str, chunk: &TextChunk) -> ChunkRecord {
    ChunkRecord {
        document_id: document_id.to_string(),
        index: chunk.index,
        text: chunk.text.clone(),
        start: chunk.start,
        end: chunk.end,
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
