// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding provider interface and implementations.
//!
//! The default provider wraps fastembed's all-MiniLM-L6-v2. A command
//! provider shells out to an external embedder, and a hashing provider gives
//! deterministic offline vectors.

use anyhow::{bail, Context, Result};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::env;
use std::process::{Command, Stdio};

use crate::embedding::DEFAULT_EMBEDDING_DIM;

const DEFAULT_FASTEMBED_MODEL: &str = "minilm";
const DEFAULT_FASTEMBED_BATCH_SIZE: usize = 256;
const MAX_FASTEMBED_BATCH_SIZE: usize = 1024;
const DEFAULT_FASTEMBED_MAX_CHARS: usize = 2000;
const DEFAULT_COMMAND_BATCH_SIZE: usize = 64;
const HASHING_MODEL_ID: &str = "hashing-ngram-v1";

/// Configuration for the fastembed provider.
#[derive(Debug, Clone)]
pub struct EmbeddingProviderConfig {
    pub model: EmbeddingModel,
    pub batch_size: usize,
    pub max_chars: usize,
}

impl EmbeddingProviderConfig {
    pub fn from_env() -> Result<Self> {
        let model = parse_model_env()?;
        let mut batch_size = parse_usize_env("FASTEMBED_BATCH_SIZE", DEFAULT_FASTEMBED_BATCH_SIZE)?;
        if batch_size == 0 {
            batch_size = DEFAULT_FASTEMBED_BATCH_SIZE;
        }
        let mut max_chars = parse_usize_env("FASTEMBED_MAX_CHARS", DEFAULT_FASTEMBED_MAX_CHARS)?;
        if max_chars == 0 {
            max_chars = DEFAULT_FASTEMBED_MAX_CHARS;
        }

        Ok(Self {
            model,
            batch_size,
            max_chars,
        }
        .clamped())
    }

    pub fn has_env_overrides() -> bool {
        env::var_os("FASTEMBED_MODEL").is_some()
            || env::var_os("FASTEMBED_BATCH_SIZE").is_some()
            || env::var_os("FASTEMBED_MAX_CHARS").is_some()
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        if batch_size > 0 {
            self.batch_size = batch_size;
        }
        self.clamped()
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        if max_chars > 0 {
            self.max_chars = max_chars;
        }
        self
    }

    fn clamped(mut self) -> Self {
        if self.batch_size > MAX_FASTEMBED_BATCH_SIZE {
            tracing::warn!(
                "embedding batch size {} exceeds max {}; clamping",
                self.batch_size,
                MAX_FASTEMBED_BATCH_SIZE
            );
            self.batch_size = MAX_FASTEMBED_BATCH_SIZE;
        }
        self
    }
}

impl Default for EmbeddingProviderConfig {
    fn default() -> Self {
        Self {
            model: EmbeddingModel::AllMiniLML6V2,
            batch_size: DEFAULT_FASTEMBED_BATCH_SIZE,
            max_chars: DEFAULT_FASTEMBED_MAX_CHARS,
        }
    }
}

/// Trait for embedding providers.
///
/// Providers return raw model output; normalization and validation happen in
/// [`crate::embedding::Embedder`].
pub trait EmbeddingProvider: Send {
    /// Returns the model identifier recorded in the vector index.
    fn model_id(&self) -> &str;

    /// Returns the fixed vector dimension.
    fn dimension(&self) -> usize;

    /// Returns the batch size used by the provider.
    fn batch_size(&self) -> usize;

    /// Generates embeddings for the given texts.
    fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Generates an embedding for a single text.
    fn embed_one(&mut self, text: &str) -> Result<Vec<f32>> {
        let mut result = self.embed_texts(&[text.to_string()])?;
        result
            .pop()
            .ok_or_else(|| anyhow::anyhow!("No embedding returned"))
    }
}

/// FastEmbed provider using sentence-transformers/all-MiniLM-L6-v2.
pub struct FastEmbedder {
    embedder: TextEmbedding,
    config: EmbeddingProviderConfig,
    model_id: String,
    dimension: usize,
}

impl FastEmbedder {
    pub fn new(config: EmbeddingProviderConfig) -> Result<Self> {
        let model = config.model.clone();
        let model_id = model.to_string();
        let init = InitOptions::new(model);
        let mut embedder =
            TextEmbedding::try_new(init).context("Failed to initialize fastembed model")?;

        let sample = embedder
            .embed(vec!["dimension check"], None)
            .context("Failed to read fastembed model dimension")?;
        let dimension = sample
            .first()
            .map(|v| v.len())
            .ok_or_else(|| anyhow::anyhow!("fastembed returned no sample embedding"))?;

        tracing::info!(model = %model_id, dimension, "loaded embedding model");

        Ok(Self {
            embedder,
            config,
            model_id,
            dimension,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(EmbeddingProviderConfig::from_env()?)
    }
}

impl EmbeddingProvider for FastEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let prepared = truncate_texts(texts, self.config.max_chars);
        let embeddings = self
            .embedder
            .embed(&prepared, Some(self.config.batch_size))?;

        Ok(embeddings)
    }
}

/// Command provider that shells out to an external process.
///
/// The command receives `{"model": ..., "texts": [...]}` on stdin and must
/// print a JSON array of vectors (or an object with an `embeddings`,
/// `vectors` or `data` field).
pub struct CommandProvider {
    command: String,
    model: String,
    dimension: usize,
    batch_size: usize,
}

impl CommandProvider {
    pub fn new(command: String, model: String, dimension: usize) -> Self {
        Self {
            command,
            model,
            dimension,
            batch_size: DEFAULT_COMMAND_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        if batch_size > 0 {
            self.batch_size = batch_size;
        }
        self
    }

    fn run_command(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn embedding command: {}", self.command))?;

        // Dropping stdin closes the pipe so the command sees end of input.
        if let Some(stdin) = child.stdin.take() {
            let request = CommandRequest {
                model: &self.model,
                texts,
            };
            serde_json::to_writer(stdin, &request)
                .context("Failed to send texts to embedding command")?;
        }

        let output = child
            .wait_with_output()
            .context("Failed to read embedding command output")?;
        if !output.status.success() {
            bail!(
                "Embedding command failed ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        parse_command_output(String::from_utf8_lossy(&output.stdout).trim())
    }
}

/// Request written to the command's stdin.
#[derive(Serialize)]
struct CommandRequest<'a> {
    model: &'a str,
    texts: &'a [String],
}

impl EmbeddingProvider for CommandProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self.run_command(texts)?;
        if vectors.len() != texts.len() {
            bail!(
                "Embedding command returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            );
        }
        Ok(vectors)
    }
}

/// Accepted shapes of the command's stdout.
#[derive(Deserialize)]
#[serde(untagged)]
enum CommandOutput {
    Bare(Vec<Vec<f32>>),
    Wrapped {
        #[serde(alias = "vectors", alias = "data")]
        embeddings: Vec<Vec<f32>>,
    },
}

fn parse_command_output(raw: &str) -> Result<Vec<Vec<f32>>> {
    let output: CommandOutput = serde_json::from_str(raw).context(
        "Embedding command must print a JSON array of vectors or an object with an 'embeddings' field",
    )?;
    Ok(match output {
        CommandOutput::Bare(vectors) => vectors,
        CommandOutput::Wrapped { embeddings } => embeddings,
    })
}

/// Deterministic provider based on feature hashing of character trigrams
/// and words. Texts sharing wording land close together; no model download
/// is needed, which makes it the provider of choice for tests.
pub struct HashingProvider {
    dimension: usize,
    batch_size: usize,
}

impl HashingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            batch_size: DEFAULT_COMMAND_BATCH_SIZE,
        }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];
        let lowered = text.to_lowercase();

        let padded: Vec<char> = format!(" {} ", lowered).chars().collect();
        for gram in padded.windows(3) {
            if gram.iter().all(|c| c.is_whitespace()) {
                continue;
            }
            let feature: String = gram.iter().collect();
            self.accumulate(&mut vector, "c", &feature);
        }
        for word in lowered.split_whitespace() {
            self.accumulate(&mut vector, "w", word);
        }

        vector
    }

    fn accumulate(&self, vector: &mut [f32], namespace: &str, feature: &str) {
        let mut hasher = blake3::Hasher::new();
        hasher.update(namespace.as_bytes());
        hasher.update(feature.as_bytes());
        let digest = hasher.finalize();
        let bytes = digest.as_bytes();

        let mut slot = [0_u8; 8];
        slot.copy_from_slice(&bytes[..8]);
        let bucket = (u64::from_le_bytes(slot) % self.dimension as u64) as usize;
        let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign;
    }
}

impl Default for HashingProvider {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIM)
    }
}

impl EmbeddingProvider for HashingProvider {
    fn model_id(&self) -> &str {
        HASHING_MODEL_ID
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

fn truncate_texts<'a>(texts: &'a [String], max_chars: usize) -> Vec<Cow<'a, str>> {
    texts
        .iter()
        .map(|text| truncate_to_chars(text.as_str(), max_chars))
        .collect()
}

fn truncate_to_chars<'a>(input: &'a str, max_chars: usize) -> Cow<'a, str> {
    if max_chars == 0 {
        return Cow::Borrowed("");
    }

    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => Cow::Owned(input[..idx].to_string()),
        None => Cow::Borrowed(input),
    }
}

/// Parses a model name from configuration or `FASTEMBED_MODEL`.
pub fn parse_model_name(raw: &str) -> Result<EmbeddingModel> {
    let value = raw.trim();
    if value.is_empty() {
        return Ok(EmbeddingModel::AllMiniLML6V2);
    }

    match value.to_lowercase().as_str() {
        "minilm"
        | "all-minilm-l6-v2"
        | "allminilm-l6-v2"
        | "sentence-transformers/all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        other => bail!(
            "Unsupported embedding model '{}'. Supported value: {}",
            other,
            DEFAULT_FASTEMBED_MODEL
        ),
    }
}

fn parse_model_env() -> Result<EmbeddingModel> {
    let raw = env::var("FASTEMBED_MODEL").unwrap_or_else(|_| DEFAULT_FASTEMBED_MODEL.to_string());
    parse_model_name(&raw)
}

fn parse_usize_env(name: &str, default: usize) -> Result<usize> {
    match env::var(name) {
        Ok(raw) => {
            let value = raw.trim();
            if value.is_empty() {
                Ok(default)
            } else {
                value
                    .parse::<usize>()
                    .with_context(|| format!("Invalid {} value: {}", name, value))
            }
        }
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("Failed to read {}", name)),
    }
}
