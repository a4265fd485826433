// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration file support for simscan
//!
//! Loads configuration from .simscanrc.toml in current directory or ~/.config/simscan/config.toml

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::embedding::chunker::{
    DEFAULT_OVERLAP, DEFAULT_QUERY_OVERLAP, DEFAULT_QUERY_WINDOW_SIZE, DEFAULT_WINDOW_SIZE,
    MIN_CHUNK_LENGTH,
};
use crate::embedding::ChunkConfig;
use crate::engine::{DEFAULT_MIN_MATCH_LENGTH, DEFAULT_THRESHOLD, DEFAULT_TOP_K};
use crate::errors::Result;

/// Output format for results (mirrored from cli for library use)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOutputFormat {
    #[default]
    Text,
    Json,
}

/// Embedding provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderType {
    /// fastembed all-MiniLM-L6-v2
    #[default]
    Builtin,
    /// External process speaking JSON over stdin/stdout
    Command,
    /// Deterministic offline feature hashing
    Hashing,
}

/// Chunking configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window size for repository documents, in characters
    pub window_size: Option<usize>,
    /// Overlap between repository chunks
    pub overlap: Option<usize>,
    /// Chunks shorter than this are dropped unless they are the only one
    pub min_length: Option<usize>,
    /// Window size for submitted texts
    pub query_window_size: Option<usize>,
    /// Overlap between query chunks
    pub query_overlap: Option<usize>,
}

impl ChunkingConfig {
    /// Chunking of repository documents (defaults to 500/100)
    pub fn document(&self) -> Result<ChunkConfig> {
        Ok(ChunkConfig::new(
            self.window_size.unwrap_or(DEFAULT_WINDOW_SIZE),
            self.overlap.unwrap_or(DEFAULT_OVERLAP),
        )?
        .with_min_length(self.min_length()))
    }

    /// Chunking of submitted texts (defaults to 300/50)
    pub fn query(&self) -> Result<ChunkConfig> {
        Ok(ChunkConfig::new(
            self.query_window_size.unwrap_or(DEFAULT_QUERY_WINDOW_SIZE),
            self.query_overlap.unwrap_or(DEFAULT_QUERY_OVERLAP),
        )?
        .with_min_length(self.min_length()))
    }

    /// Get minimum chunk length (defaults to 20)
    pub fn min_length(&self) -> usize {
        self.min_length.unwrap_or(MIN_CHUNK_LENGTH)
    }
}

/// Search configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Neighbors retrieved per query chunk
    pub top_k: Option<usize>,
    /// Cosine threshold for a hit to count (0.0-1.0)
    pub threshold: Option<f32>,
    /// Minimum highlighted run when scanning
    pub min_match_length: Option<usize>,
    /// Minimum highlighted run when comparing two files
    pub compare_min_match_length: Option<usize>,
    /// Time budget per request in seconds
    pub timeout_secs: Option<u64>,
}

impl SearchConfig {
    /// Get top k (defaults to 5)
    pub fn top_k(&self) -> usize {
        self.top_k.unwrap_or(DEFAULT_TOP_K)
    }

    /// Get threshold (defaults to 0.5)
    pub fn threshold(&self) -> f32 {
        self.threshold.unwrap_or(DEFAULT_THRESHOLD)
    }

    /// Get minimum match length (defaults to 45)
    pub fn min_match_length(&self) -> usize {
        self.min_match_length.unwrap_or(DEFAULT_MIN_MATCH_LENGTH)
    }

    /// Get compare minimum match length (defaults to 45)
    pub fn compare_min_match_length(&self) -> usize {
        self.compare_min_match_length
            .unwrap_or(DEFAULT_MIN_MATCH_LENGTH)
    }

    /// Get timeout (defaults to none)
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider type (builtin, command, hashing)
    pub provider: Option<EmbeddingProviderType>,
    /// Model identifier for the embedding provider
    pub model: Option<String>,
    /// Command to execute for command provider
    pub command: Option<String>,
    /// Texts per provider call
    pub batch_size: Option<usize>,
    /// Characters kept per text before embedding
    pub max_chars: Option<usize>,
    /// Vector dimension for command and hashing providers
    pub dimension: Option<usize>,
}

impl EmbeddingConfig {
    /// Get provider type (defaults to Builtin)
    pub fn provider(&self) -> EmbeddingProviderType {
        self.provider.unwrap_or_default()
    }

    /// Get model identifier (defaults to "minilm")
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or("minilm")
    }

    /// Get command (defaults to "embedder")
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or("embedder")
    }

    /// Get dimension (defaults to 384)
    pub fn dimension(&self) -> usize {
        self.dimension
            .unwrap_or(crate::embedding::DEFAULT_EMBEDDING_DIM)
    }
}

/// Repository configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Directory holding the document store and the vector index
    pub data_dir: Option<PathBuf>,
}

/// Configuration loaded from .simscanrc.toml or ~/.config/simscan/config.toml
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default output format (text or json)
    pub default_format: Option<String>,

    /// Chunking configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Search configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Embedding configuration
    #[serde(default)]
    pub embeddings: EmbeddingConfig,

    /// Repository configuration
    #[serde(default)]
    pub repository: RepositoryConfig,
}

impl Config {
    /// Load configuration from files
    ///
    /// Precedence (highest to lowest):
    /// 1. .simscanrc.toml in current directory
    /// 2. ~/.config/simscan/config.toml
    pub fn load() -> Self {
        if let Some(config) = Self::load_from_path(Path::new(".simscanrc.toml")) {
            return config;
        }

        if let Some(home) = dirs::home_dir() {
            let config_path = home.join(".config").join("simscan").join("config.toml");
            if let Some(config) = Self::load_from_path(&config_path) {
                return config;
            }
        }

        Self::default()
    }

    pub fn load_from_path(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match toml::from_str(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to parse config");
                None
            }
        }
    }

    /// Get output format from config, parsing the string to ConfigOutputFormat
    pub fn output_format(&self) -> Option<ConfigOutputFormat> {
        self.default_format.as_ref().and_then(|s| match s.to_lowercase().as_str() {
            "json" => Some(ConfigOutputFormat::Json),
            "text" => Some(ConfigOutputFormat::Text),
            _ => None,
        })
    }

    /// Data directory: CLI value, then config, then `.simscan` under `cwd`.
    pub fn data_dir(&self, cli_value: Option<&Path>, cwd: &Path) -> PathBuf {
        cli_value
            .map(Path::to_path_buf)
            .or_else(|| self.repository.data_dir.clone())
            .unwrap_or_else(|| crate::utils::get_data_dir(cwd))
    }

    /// Merge CLI timeout with config (CLI wins)
    pub fn merge_timeout(&self, cli_secs: Option<u64>) -> Option<Duration> {
        cli_secs.map(Duration::from_secs).or_else(|| self.search.timeout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.search.top_k(), 5);
        assert_eq!(config.search.threshold(), 0.5);
        assert_eq!(config.search.min_match_length(), 45);
        assert_eq!(config.embeddings.provider(), EmbeddingProviderType::Builtin);
        assert_eq!(config.chunking.document().unwrap(), ChunkConfig::default());
        assert_eq!(config.chunking.query().unwrap(), ChunkConfig::query_default());
        assert!(config.search.timeout().is_none());
    }

    #[test]
    fn test_parse_sections() {
        let config: Config = toml::from_str(
            r#"
            default_format = "json"

            [chunking]
            window_size = 200
            overlap = 40

            [search]
            top_k = 8
            threshold = 0.3
            timeout_secs = 30

            [embeddings]
            provider = "hashing"
            dimension = 64

            [repository]
            data_dir = "/tmp/simscan-data"
            "#,
        )
        .unwrap();

        assert_eq!(config.output_format(), Some(ConfigOutputFormat::Json));
        let chunk = config.chunking.document().unwrap();
        assert_eq!((chunk.window_size, chunk.overlap), (200, 40));
        assert_eq!(config.search.top_k(), 8);
        assert_eq!(config.search.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.embeddings.provider(), EmbeddingProviderType::Hashing);
        assert_eq!(config.embeddings.dimension(), 64);
        assert_eq!(
            config.data_dir(None, Path::new("/work")),
            PathBuf::from("/tmp/simscan-data")
        );
        assert_eq!(
            config.data_dir(Some(Path::new("/cli")), Path::new("/work")),
            PathBuf::from("/cli")
        );
    }

    #[test]
    fn test_invalid_chunking_rejected() {
        let config: Config = toml::from_str("[chunking]\nwindow_size = 50\noverlap = 50\n").unwrap();
        assert!(config.chunking.document().is_err());
    }

    #[test]
    fn test_merge_timeout_cli_wins() {
        let config: Config = toml::from_str("[search]\ntimeout_secs = 10\n").unwrap();
        assert_eq!(config.merge_timeout(Some(3)), Some(Duration::from_secs(3)));
        assert_eq!(config.merge_timeout(None), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_unparsable_file_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".simscanrc.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();
        assert!(Config::load_from_path(&path).is_none());
        assert!(Config::load_from_path(&dir.path().join("missing.toml")).is_none());
    }
}
