//! Deterministic embedder keyed on topic words

use std::sync::atomic::{AtomicUsize, Ordering};
use trendline::{Embedder, EmbeddingError};

const KEYWORDS: [&str; 4] = ["rust", "election", "climate", "football"];

/// Maps each text to the axis of the first keyword it contains, with a
/// small length-dependent tilt so texts are not all identical. Texts with
/// no keyword land on a shared "other" axis.
pub struct KeywordEmbedder {
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn vector_for(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let axis = KEYWORDS
            .iter()
            .position(|k| lower.contains(k))
            .unwrap_or(KEYWORDS.len());
        let mut v = vec![0.0; KEYWORDS.len() + 2];
        v[axis] = 1.0;
        v[KEYWORDS.len() + 1] = (text.len() % 7) as f32 * 0.02;
        v
    }
}

impl Embedder for KeywordEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
    }
}
