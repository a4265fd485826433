// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed document store.
//!
//! Stores documents in `.simscan/documents.sqlite` by default. Embeddings are
//! kept as little-endian `f32` blobs next to their chunks so the vector index
//! can be rebuilt without re-running the model.

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::errors::{Error, Result};
use crate::store::{
    ChunkRecord, ChunkWithEmbedding, DocumentRecord, DocumentStore, Scope, StoreStats,
};

const SCHEMA_VERSION: &str = "1";

pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl SqliteStore {
    /// Opens or creates a store at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&path)?;
        let store = Self {
            conn: Mutex::new(conn),
            path,
        };
        store.init_schema()?;
        store.check_schema_version()?;
        Ok(store)
    }

    /// Opens the store in the default location under a data directory.
    pub fn open_default<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        Self::open(data_dir.as_ref().join("documents.sqlite"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                file_name TEXT NOT NULL,
                length INTEGER NOT NULL,
                chunk_count INTEGER NOT NULL,
                unit_count INTEGER NOT NULL,
                repo_type TEXT NOT NULL,
                owner_id INTEGER,
                indexed_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_documents_scope
                ON documents(repo_type, owner_id);

            CREATE TABLE IF NOT EXISTS document_chunks (
                document_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                start_offset INTEGER NOT NULL,
                end_offset INTEGER NOT NULL,
                PRIMARY KEY (document_id, chunk_index)
            );

            CREATE TABLE IF NOT EXISTS document_chunk_embeddings (
                document_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                embedding BLOB NOT NULL,
                PRIMARY KEY (document_id, chunk_index)
            );
            "#,
        )?;
        Ok(())
    }

    /// Stamps a new database with the schema version and refuses one written
    /// by an incompatible version.
    fn check_schema_version(&self) -> Result<()> {
        match self.get_meta("schema_version")? {
            None => self.set_meta("schema_version", SCHEMA_VERSION),
            Some(version) if version == SCHEMA_VERSION => Ok(()),
            Some(version) => Err(Error::Configuration(format!(
                "{} uses schema version {}, expected {}",
                self.path.display(),
                version,
                SCHEMA_VERSION
            ))),
        }
    }

    /// Gets metadata value by key.
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .lock()
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Sets metadata value.
    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.lock().execute(
            r#"
            INSERT INTO meta (key, value)
            VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
            params![key, value],
        )?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert_document(tx: &Transaction<'_>, document: &DocumentRecord) -> Result<()> {
        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM documents WHERE id = ?1)",
            params![document.id],
            |row| row.get(0),
        )?;
        if exists {
            return Err(Error::DuplicateDocument(document.id.clone()));
        }

        tx.execute(
            r#"
            INSERT INTO documents (
                id, file_name, length, chunk_count, unit_count, repo_type, owner_id, indexed_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                document.id,
                document.file_name,
                document.length as i64,
                document.chunk_count as i64,
                document.unit_count,
                document.scope.repo_type(),
                document.scope.owner_id(),
                document.indexed_at
            ],
        )?;
        Ok(())
    }

    fn insert_chunks(tx: &Transaction<'_>, document_id: &str, chunks: &[ChunkRecord]) -> Result<()> {
        let mut stmt = tx.prepare(
            r#"
            INSERT INTO document_chunks (document_id, chunk_index, text, start_offset, end_offset)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )?;
        for chunk in chunks {
            stmt.execute(params![
                document_id,
                chunk.index,
                chunk.text,
                chunk.start as i64,
                chunk.end as i64
            ])?;
        }
        Ok(())
    }

    fn upsert_embeddings(
        tx: &Transaction<'_>,
        document_id: &str,
        embeddings: &[(u32, Vec<f32>)],
    ) -> Result<()> {
        let mut stmt = tx.prepare(
            r#"
            INSERT INTO document_chunk_embeddings (document_id, chunk_index, embedding)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(document_id, chunk_index) DO UPDATE SET embedding = excluded.embedding
            "#,
        )?;
        for (index, embedding) in embeddings {
            stmt.execute(params![document_id, index, embedding_to_blob(embedding)])?;
        }
        Ok(())
    }
}

impl DocumentStore for SqliteStore {
    fn create_document(&self, document: &DocumentRecord) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        Self::insert_document(&tx, document)?;
        tx.commit()?;
        Ok(())
    }

    fn add_chunks(&self, document_id: &str, chunks: &[ChunkRecord]) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        Self::insert_chunks(&tx, document_id, chunks)?;
        tx.commit()?;
        Ok(())
    }

    fn put_embeddings(&self, document_id: &str, embeddings: &[(u32, Vec<f32>)]) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        Self::upsert_embeddings(&tx, document_id, embeddings)?;
        tx.commit()?;
        Ok(())
    }

    fn save_document(
        &self,
        document: &DocumentRecord,
        chunks: &[ChunkRecord],
        embeddings: &[(u32, Vec<f32>)],
    ) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        Self::insert_document(&tx, document)?;
        Self::insert_chunks(&tx, &document.id, chunks)?;
        Self::upsert_embeddings(&tx, &document.id, embeddings)?;
        tx.commit()?;
        Ok(())
    }

    fn get_document(&self, document_id: &str) -> Result<Option<DocumentRecord>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                r#"
                SELECT id, file_name, length, chunk_count, unit_count, repo_type, owner_id, indexed_at
                FROM documents
                WHERE id = ?1
                "#,
                params![document_id],
                DocumentRow::from_row,
            )
            .optional()?;
        row.map(DocumentRow::into_record).transpose()
    }

    fn get_chunk(&self, document_id: &str, index: u32) -> Result<Option<ChunkRecord>> {
        let conn = self.lock();
        let chunk = conn
            .query_row(
                r#"
                SELECT document_id, chunk_index, text, start_offset, end_offset
                FROM document_chunks
                WHERE document_id = ?1 AND chunk_index = ?2
                "#,
                params![document_id, index],
                chunk_from_row,
            )
            .optional()?;
        Ok(chunk)
    }

    fn list_documents(&self, scope: Option<&Scope>) -> Result<Vec<DocumentRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, file_name, length, chunk_count, unit_count, repo_type, owner_id, indexed_at
            FROM documents
            ORDER BY indexed_at, id
            "#,
        )?;
        let rows = stmt
            .query_map([], DocumentRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            let record = row.into_record()?;
            if scope.is_none_or(|s| *s == record.scope) {
                documents.push(record);
            }
        }
        Ok(documents)
    }

    fn list_chunks_with_embeddings(&self, scope: Option<&Scope>) -> Result<Vec<ChunkWithEmbedding>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT c.document_id, c.chunk_index, c.text, c.start_offset, c.end_offset,
                   d.repo_type, d.owner_id, e.embedding
            FROM document_chunks c
            JOIN documents d ON d.id = c.document_id
            LEFT JOIN document_chunk_embeddings e
                ON e.document_id = c.document_id AND e.chunk_index = c.chunk_index
            ORDER BY d.indexed_at, c.document_id, c.chunk_index
            "#,
        )?;
        let rows = stmt
            .query_map([], |row| {
                let chunk = chunk_from_row(row)?;
                let repo_type: String = row.get(5)?;
                let owner_id: Option<i64> = row.get(6)?;
                let blob: Option<Vec<u8>> = row.get(7)?;
                Ok((chunk, repo_type, owner_id, blob))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut chunks = Vec::with_capacity(rows.len());
        for (chunk, repo_type, owner_id, blob) in rows {
            let chunk_scope = Scope::from_columns(&repo_type, owner_id)?;
            if scope.is_some_and(|s| *s != chunk_scope) {
                continue;
            }
            chunks.push(ChunkWithEmbedding {
                chunk,
                scope: chunk_scope,
                embedding: blob.as_deref().map(blob_to_embedding),
            });
        }
        Ok(chunks)
    }

    fn delete_document(&self, document_id: &str) -> Result<bool> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM document_chunk_embeddings WHERE document_id = ?1",
            params![document_id],
        )?;
        tx.execute(
            "DELETE FROM document_chunks WHERE document_id = ?1",
            params![document_id],
        )?;
        let deleted = tx.execute("DELETE FROM documents WHERE id = ?1", params![document_id])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    fn stats(&self) -> Result<StoreStats> {
        let conn = self.lock();
        let count = |table: &str| -> Result<u64> {
            let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })?;
            Ok(n as u64)
        };
        Ok(StoreStats {
            documents: count("documents")?,
            chunks: count("document_chunks")?,
            embeddings: count("document_chunk_embeddings")?,
        })
    }
}

struct DocumentRow {
    id: String,
    file_name: String,
    length: i64,
    chunk_count: i64,
    unit_count: u32,
    repo_type: String,
    owner_id: Option<i64>,
    indexed_at: i64,
}

impl DocumentRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            file_name: row.get(1)?,
            length: row.get(2)?,
            chunk_count: row.get(3)?,
            unit_count: row.get(4)?,
            repo_type: row.get(5)?,
            owner_id: row.get(6)?,
            indexed_at: row.get(7)?,
        })
    }

    fn into_record(self) -> Result<DocumentRecord> {
        Ok(DocumentRecord {
            scope: Scope::from_columns(&self.repo_type, self.owner_id)?,
            id: self.id,
            file_name: self.file_name,
            length: self.length as usize,
            chunk_count: self.chunk_count as usize,
            unit_count: self.unit_count,
            indexed_at: self.indexed_at,
        })
    }
}

fn chunk_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChunkRecord> {
    let start: i64 = row.get(3)?;
    let end: i64 = row.get(4)?;
    Ok(ChunkRecord {
        document_id: row.get(0)?,
        index: row.get(1)?,
        text: row.get(2)?,
        start: start as usize,
        end: end as usize,
    })
}

/// Converts an embedding vector to a compact blob.
fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Converts a blob back to an embedding vector.
fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
