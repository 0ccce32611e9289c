//! Text embedding backends
//!
//! The engine treats embedding as a black box behind the `Embedder` trait:
//! fastembed-rs in production (the `embeddings` feature), deterministic
//! mocks in tests.

use crate::signal::{EmbeddedSignal, Signal};
use thiserror::Error;

/// Error type for embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The model returned no vectors
    #[error("embedding returned no results")]
    EmptyResult,

    /// The model returned a different number of vectors than texts
    #[error("embedding returned {actual} vectors for {expected} texts")]
    CountMismatch { expected: usize, actual: usize },

    /// Model loading or inference failed
    #[error("embedding model error: {0}")]
    ModelError(String),

    /// No backend is available in this build
    #[error("no embedding backend available; rebuild with the `embeddings` feature or supply precomputed embeddings")]
    Unavailable,
}

pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Trait for embedding text into vectors.
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, returning one vector per text, in order.
    fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>>;

    /// Embed a single text.
    fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        self.embed_batch(&[text])?
            .into_iter()
            .next()
            .ok_or(EmbeddingError::EmptyResult)
    }
}

/// Embed the text of every signal in one batch call.
pub fn embed_signals(
    embedder: &dyn Embedder,
    signals: Vec<Signal>,
) -> EmbeddingResult<Vec<EmbeddedSignal>> {
    if signals.is_empty() {
        return Ok(Vec::new());
    }
    let texts: Vec<&str> = signals.iter().map(|s| s.text.as_str()).collect();
    let vectors = embedder.embed_batch(&texts)?;
    if vectors.len() != signals.len() {
        return Err(EmbeddingError::CountMismatch {
            expected: signals.len(),
            actual: vectors.len(),
        });
    }
    Ok(signals
        .into_iter()
        .zip(vectors)
        .map(|(signal, embedding)| EmbeddedSignal::new(signal, embedding))
        .collect())
}

#[cfg(feature = "embeddings")]
mod fastembed_impl {
    use super::{Embedder, EmbeddingError, EmbeddingResult};
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::sync::Mutex;

    /// Embedder backed by fastembed (ONNX Runtime).
    ///
    /// `TextEmbedding::embed` takes `&mut self`, hence the `Mutex`.
    pub struct FastEmbedEmbedder {
        model: Mutex<TextEmbedding>,
    }

    impl FastEmbedEmbedder {
        pub fn new(model: EmbeddingModel) -> EmbeddingResult<Self> {
            let options = InitOptions::new(model).with_show_download_progress(false);
            let embedding = TextEmbedding::try_new(options)
                .map_err(|e| EmbeddingError::ModelError(e.to_string()))?;
            Ok(Self {
                model: Mutex::new(embedding),
            })
        }

        /// all-MiniLM-L6-v2, 384 dimensions
        pub fn default_model() -> EmbeddingResult<Self> {
            Self::new(EmbeddingModel::AllMiniLML6V2)
        }
    }

    impl Embedder for FastEmbedEmbedder {
        fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let mut model = self
                .model
                .lock()
                .map_err(|e| EmbeddingError::ModelError(e.to_string()))?;
            let embeddings = model
                .embed(texts.to_vec(), None)
                .map_err(|e| EmbeddingError::ModelError(e.to_string()))?;
            if embeddings.is_empty() {
                return Err(EmbeddingError::EmptyResult);
            }
            Ok(embeddings)
        }
    }
}

#[cfg(feature = "embeddings")]
pub use fastembed_impl::FastEmbedEmbedder;
