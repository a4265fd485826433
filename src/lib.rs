// SPDX-License-Identifier: MIT OR Apache-2.0

//! simscan - Local document similarity library
//!
//! Detects overlap between a submitted text and a repository of indexed
//! documents: overlapping chunks are embedded and retrieved by cosine
//! similarity, then aligned character by character so the shared spans can
//! be highlighted and scored.

pub mod config;
pub mod deadline;
pub mod embedding;
pub mod engine;
pub mod errors;
pub mod extract;
pub mod index;
pub mod matching;
pub mod output;
pub mod store;
pub mod text;
pub mod utils;

pub use engine::{
    Comparison, EngineSettings, EngineStats, IndexOutcome, IndexRequest, RebuildOutcome,
    ScanReport, ScanResult, SearchOptions, SimilarityEngine,
};
pub use errors::{Error, Result};
