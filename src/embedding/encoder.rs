// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared embedder: batching, validation and unit normalization on top of a
//! provider.

use std::sync::{Mutex, PoisonError};

use crate::deadline::Deadline;
use crate::errors::{Error, Result};
use crate::embedding::EmbeddingProvider;
use crate::text::is_blank;

/// Wraps a provider loaded once per process.
///
/// Every vector that leaves the embedder has unit L2 norm, so inner product
/// equals cosine similarity downstream.
pub struct Embedder {
    provider: Mutex<Box<dyn EmbeddingProvider>>,
    model_id: String,
    dimension: usize,
    batch_size: usize,
}

impl Embedder {
    pub fn new(provider: Box<dyn EmbeddingProvider>) -> Self {
        let model_id = provider.model_id().to_string();
        let dimension = provider.dimension();
        let batch_size = provider.batch_size().max(1);
        Self {
            provider: Mutex::new(provider),
            model_id,
            dimension,
            batch_size,
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Encodes every text or fails as a whole.
    pub fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if let Some(pos) = texts.iter().position(|t| is_blank(t)) {
            return Err(Error::Embedding(format!(
                "text #{} is empty; filter blank texts before encoding",
                pos
            )));
        }
        self.encode_each(texts, &Deadline::none())?
            .into_iter()
            .collect()
    }

    /// Encodes texts with per-item outcomes.
    ///
    /// Blank texts and items of a failing batch get their own error while the
    /// rest still encode. The outer error is reserved for the deadline.
    pub fn encode_each(
        &self,
        texts: &[String],
        deadline: &Deadline,
    ) -> Result<Vec<Result<Vec<f32>>>> {
        let mut outcomes: Vec<Option<Result<Vec<f32>>>> = texts
            .iter()
            .map(|text| {
                if is_blank(text) {
                    Some(Err(Error::Embedding("empty text".to_string())))
                } else {
                    None
                }
            })
            .collect();

        let pending: Vec<usize> = (0..texts.len())
            .filter(|&i| outcomes[i].is_none())
            .collect();

        for batch in pending.chunks(self.batch_size) {
            deadline.check("embedding")?;
            let batch_texts: Vec<String> = batch.iter().map(|&i| texts[i].clone()).collect();

            let result = {
                let mut provider = self
                    .provider
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                provider.embed_texts(&batch_texts)
            };

            match result {
                Ok(vectors) if vectors.len() == batch.len() => {
                    for (&i, vector) in batch.iter().zip(vectors) {
                        outcomes[i] = Some(self.finish_vector(vector));
                    }
                }
                Ok(vectors) => {
                    let message = format!(
                        "provider returned {} vectors for {} texts",
                        vectors.len(),
                        batch.len()
                    );
                    for &i in batch {
                        outcomes[i] = Some(Err(Error::Embedding(message.clone())));
                    }
                }
                Err(err) => {
                    let message = format!("{:#}", err);
                    for &i in batch {
                        outcomes[i] = Some(Err(Error::Embedding(message.clone())));
                    }
                }
            }
        }

        Ok(outcomes
            .into_iter()
            .map(|o| o.unwrap_or_else(|| Err(Error::Embedding("text was not encoded".to_string()))))
            .collect())
    }

    fn finish_vector(&self, mut vector: Vec<f32>) -> Result<Vec<f32>> {
        if vector.len() != self.dimension {
            return Err(Error::Embedding(format!(
                "expected dimension {}, got {}",
                self.dimension,
                vector.len()
            )));
        }
        if !l2_normalize(&mut vector) {
            return Err(Error::Embedding(
                "model produced a zero or non-finite vector".to_string(),
            ));
        }
        Ok(vector)
    }
}

/// Normalizes in place; returns false for vectors that cannot be normalized.
pub fn l2_normalize(vector: &mut [f32]) -> bool {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return false;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingProvider;
    use std::time::Duration;

    struct FailingProvider;

    impl EmbeddingProvider for FailingProvider {
        fn model_id(&self) -> &str {
            "failing"
        }
        fn dimension(&self) -> usize {
            4
        }
        fn batch_size(&self) -> usize {
            2
        }
        fn embed_texts(&mut self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            if texts.iter().any(|t| t.contains('\u{fffd}')) {
                anyhow::bail!("unsupported characters");
            }
            Ok(texts.iter().map(|_| vec![3.0, 0.0, 4.0, 0.0]).collect())
        }
    }

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[test]
    fn test_vectors_are_unit_norm() {
        let embedder = Embedder::new(Box::new(HashingProvider::new(32)));
        let vectors = embedder
            .encode(&["alpha beta".to_string(), "gamma delta".to_string()])
            .unwrap();
        for vector in &vectors {
            assert!((norm(vector) - 1.0).abs() < 1e-5);
        }
        assert_eq!(embedder.dimension(), 32);
        assert_eq!(embedder.model_id(), "hashing-ngram-v1");
    }

    #[test]
    fn test_blank_text_rejected() {
        let embedder = Embedder::new(Box::new(HashingProvider::new(8)));
        let err = embedder
            .encode(&["fine".to_string(), "   ".to_string()])
            .unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
    }

    #[test]
    fn test_encode_each_isolates_failures() {
        let embedder = Embedder::new(Box::new(FailingProvider));
        let texts = vec![
            "ok one".to_string(),
            "".to_string(),
            "ok two".to_string(),
            "bad \u{fffd}".to_string(),
        ];
        let outcomes = embedder.encode_each(&texts, &Deadline::none()).unwrap();

        assert_eq!(outcomes.len(), 4);
        assert!(outcomes[1].is_err());
        // Blank texts are not sent, so the batches are [0, 2] and [3].
        assert!(outcomes[2].is_ok());
        assert!(matches!(outcomes[3], Err(Error::Embedding(_))));
        let first = outcomes[0].as_ref().unwrap();
        assert!((first[0] - 0.6).abs() < 1e-6);
        assert!((first[2] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_encode_each_respects_deadline() {
        let embedder = Embedder::new(Box::new(HashingProvider::new(8)));
        let deadline = Deadline::after(Some(Duration::ZERO));
        let err = embedder
            .encode_each(&["text".to_string()], &deadline)
            .unwrap_err();
        assert!(matches!(err, Error::Timeout("embedding")));
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        let mut zero = vec![0.0_f32; 3];
        assert!(!l2_normalize(&mut zero));
    }
}
