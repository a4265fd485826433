// SPDX-License-Identifier: MIT OR Apache-2.0

//! On-disk container for the vector index.
//!
//! Layout:
//! ```text
//! MAGIC (8 bytes) | header length (u64 LE) | header (JSON) | payload (f32 LE)
//! ```
//! The header carries the model identity, the dimension, the full
//! `internal_id -> chunk` mapping and a blake3 checksum of the payload, so
//! vectors and their mapping always travel together. Files are written to a
//! sibling temp file and renamed into place.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::{Error, Result};
use crate::index::VectorIndexEntry;

const MAGIC: &[u8; 8] = b"SIMSCNV1";
const FORMAT_VERSION: u32 = 1;
const PREFIX_LEN: usize = MAGIC.len() + 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ContainerHeader {
    pub format_version: u32,
    pub model_id: String,
    pub dimension: usize,
    pub count: usize,
    pub entries: Vec<VectorIndexEntry>,
    pub payload_blake3: String,
}

/// Writes entries and vectors as one file, replacing `path` atomically.
pub(crate) fn write_container(
    path: &Path,
    model_id: &str,
    dimension: usize,
    entries: &[VectorIndexEntry],
    vectors: &[f32],
) -> Result<()> {
    let payload: Vec<u8> = vectors.iter().flat_map(|f| f.to_le_bytes()).collect();
    let header = ContainerHeader {
        format_version: FORMAT_VERSION,
        model_id: model_id.to_string(),
        dimension,
        count: entries.len(),
        entries: entries.to_vec(),
        payload_blake3: blake3::hash(&payload).to_hex().to_string(),
    };
    let header_bytes = serde_json::to_vec(&header)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = temp_path(path);
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(MAGIC)?;
        file.write_all(&(header_bytes.len() as u64).to_le_bytes())?;
        file.write_all(&header_bytes)?;
        file.write_all(&payload)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Reads and verifies a container. Any inconsistency is an
/// [`Error::IndexState`]; nothing is truncated or repaired.
pub(crate) fn read_container(path: &Path) -> Result<(ContainerHeader, Vec<f32>)> {
    let bytes = fs::read(path)?;
    let state_err = |msg: String| Error::IndexState(format!("{}: {}", path.display(), msg));

    if bytes.len() < PREFIX_LEN || &bytes[..MAGIC.len()] != MAGIC {
        return Err(state_err("not a vector index container".to_string()));
    }

    let mut len_bytes = [0_u8; 8];
    len_bytes.copy_from_slice(&bytes[MAGIC.len()..PREFIX_LEN]);
    let header_len = u64::from_le_bytes(len_bytes) as usize;
    let header_end = PREFIX_LEN
        .checked_add(header_len)
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| state_err("truncated header".to_string()))?;

    let header: ContainerHeader = serde_json::from_slice(&bytes[PREFIX_LEN..header_end])
        .map_err(|e| state_err(format!("unreadable header: {}", e)))?;

    if header.format_version != FORMAT_VERSION {
        return Err(state_err(format!(
            "unsupported format version {}",
            header.format_version
        )));
    }
    if header.count != header.entries.len() {
        return Err(state_err(format!(
            "header declares {} vectors but maps {}",
            header.count,
            header.entries.len()
        )));
    }
    if let Some((pos, entry)) = header
        .entries
        .iter()
        .enumerate()
        .find(|(pos, entry)| entry.internal_id != *pos as u64)
    {
        return Err(state_err(format!(
            "entry at position {} has internal id {}",
            pos, entry.internal_id
        )));
    }

    let payload = &bytes[header_end..];
    let expected = header
        .count
        .checked_mul(header.dimension)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| {
            state_err(format!(
                "header declares {} vectors of dimension {}",
                header.count, header.dimension
            ))
        })?;
    if payload.len() != expected {
        return Err(state_err(format!(
            "payload holds {} bytes, mapping requires {}",
            payload.len(),
            expected
        )));
    }
    if blake3::hash(payload).to_hex().as_str() != header.payload_blake3 {
        return Err(state_err("payload checksum mismatch".to_string()));
    }

    let vectors = payload
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    Ok((header, vectors))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "vectors".into());
    name.push(".tmp");
    path.with_file_name(name)
}
