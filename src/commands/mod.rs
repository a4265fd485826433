// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command implementations and the shared setup they need.

pub mod compare;
pub mod documents;
pub mod index;
pub mod scan;
pub mod watch;

use anyhow::{Context as _, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use simscan::config::{Config, ConfigOutputFormat, EmbeddingConfig, EmbeddingProviderType};
use simscan::embedding::provider::parse_model_name;
use simscan::embedding::{
    CommandProvider, Embedder, EmbeddingChunker, EmbeddingProvider, EmbeddingProviderConfig,
    FastEmbedder, HashingProvider,
};
use simscan::store::{Scope, SqliteStore};
use simscan::utils::index_file;
use simscan::{EngineSettings, SimilarityEngine};

use crate::cli::{Cli, OutputFormat, ScopeArgs};

impl From<ScopeArgs> for Option<Scope> {
    fn from(args: ScopeArgs) -> Self {
        match (args.owner, args.university) {
            (Some(owner_id), _) => Some(Scope::Personal { owner_id }),
            (None, true) => Some(Scope::University),
            (None, false) => None,
        }
    }
}

/// Settings resolved once from the command line and config files.
pub struct Context {
    pub config: Config,
    pub format: OutputFormat,
    pub compact: bool,
    pub data_dir: PathBuf,
    pub timeout: Option<Duration>,
    pub use_color: bool,
}

impl Context {
    pub fn new(cli: &Cli) -> Result<Self> {
        let config = Config::load();
        let cwd = std::env::current_dir().context("Cannot determine current directory")?;
        let format = cli.format.unwrap_or(match config.output_format() {
            Some(ConfigOutputFormat::Json) => OutputFormat::Json,
            _ => OutputFormat::Text,
        });

        Ok(Self {
            data_dir: config.data_dir(cli.data_dir.as_deref(), &cwd),
            timeout: config.merge_timeout(cli.timeout),
            use_color: simscan::output::use_colors(),
            format,
            compact: cli.compact,
            config,
        })
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    pub fn engine_settings(&self) -> Result<EngineSettings> {
        Ok(EngineSettings::new(index_file(&self.data_dir))
            .with_chunk(self.config.chunking.document()?)
            .with_query_chunk(self.config.chunking.query()?))
    }

    /// Document chunker alone, for commands that never touch the model.
    pub fn chunker(&self) -> Result<EmbeddingChunker> {
        Ok(EmbeddingChunker::new(self.config.chunking.document()?)?)
    }

    pub fn open_store(&self) -> Result<SqliteStore> {
        SqliteStore::open_default(&self.data_dir).with_context(|| {
            format!("Failed to open document store in {}", self.data_dir.display())
        })
    }

    /// Opens the engine with the persisted index.
    pub fn open_engine(&self) -> Result<SimilarityEngine> {
        let embedder = Embedder::new(build_provider(&self.config.embeddings)?);
        let store = self.open_store()?;
        SimilarityEngine::open(embedder, Box::new(store), self.engine_settings()?).with_context(
            || {
                format!(
                    "Failed to open repository in {} (run `simscan reindex` after changing the embedding model)",
                    self.data_dir.display()
                )
            },
        )
    }

    /// Opens the engine without loading the persisted index.
    pub fn open_engine_fresh(&self) -> Result<SimilarityEngine> {
        let embedder = Embedder::new(build_provider(&self.config.embeddings)?);
        let store = self.open_store()?;
        Ok(SimilarityEngine::open_fresh(
            embedder,
            Box::new(store),
            self.engine_settings()?,
        )?)
    }

    pub fn print_json<T: Serialize>(&self, value: &T) -> Result<()> {
        let rendered = if self.compact {
            serde_json::to_string(value)?
        } else {
            serde_json::to_string_pretty(value)?
        };
        println!("{}", rendered);
        Ok(())
    }
}

/// Builds the configured embedding provider.
///
/// The builtin provider honors `FASTEMBED_MODEL`, `FASTEMBED_BATCH_SIZE` and
/// `FASTEMBED_MAX_CHARS` over the config file.
pub fn build_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider() {
        EmbeddingProviderType::Builtin => {
            let provider_config = if EmbeddingProviderConfig::has_env_overrides() {
                EmbeddingProviderConfig::from_env()?
            } else {
                let mut provider_config = EmbeddingProviderConfig {
                    model: parse_model_name(config.model())?,
                    ..EmbeddingProviderConfig::default()
                };
                if let Some(batch_size) = config.batch_size {
                    provider_config = provider_config.with_batch_size(batch_size);
                }
                if let Some(max_chars) = config.max_chars {
                    provider_config = provider_config.with_max_chars(max_chars);
                }
                provider_config
            };
            Ok(Box::new(FastEmbedder::new(provider_config)?))
        }
        EmbeddingProviderType::Command => {
            let mut provider = CommandProvider::new(
                config.command().to_string(),
                config.model().to_string(),
                config.dimension(),
            );
            if let Some(batch_size) = config.batch_size {
                provider = provider.with_batch_size(batch_size);
            }
            Ok(Box::new(provider))
        }
        EmbeddingProviderType::Hashing => Ok(Box::new(HashingProvider::new(config.dimension()))),
    }
}

/// Renders a scope filter for human output.
pub fn describe_scope(scope: Option<&Scope>) -> String {
    scope.map_or_else(|| "all repositories".to_string(), |s| s.to_string())
}
