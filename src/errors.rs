// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error taxonomy for the similarity engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid chunking parameters, model/dimension mismatch, bad settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("text extraction failed: {0}")]
    Extraction(String),

    /// Extraction succeeded but produced no usable text.
    #[error("no content: {0}")]
    EmptyContent(String),

    /// The persisted vector index is inconsistent and was not loaded.
    #[error("index state error: {0}")]
    IndexState(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("document already indexed: {0}")]
    DuplicateDocument(String),

    #[error("timed out during {0}")]
    Timeout(&'static str),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the failure should be reported back to the caller as a
    /// request-level outcome rather than treated as a broken engine.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Extraction(_)
                | Error::EmptyContent(_)
                | Error::Embedding(_)
                | Error::DuplicateDocument(_)
                | Error::Timeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(Error::EmptyContent("a.txt".into()).is_recoverable());
        assert!(Error::Timeout("embedding").is_recoverable());
        assert!(!Error::IndexState("bad header".into()).is_recoverable());
        assert!(!Error::Configuration("overlap".into()).is_recoverable());
    }
}
