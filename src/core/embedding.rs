//! Text Embedding
//!
//! The `TextEmbedder` trait is the boundary to the encoder runtime: batch
//! encoding of texts into L2-normalized vectors of a fixed dimension. The
//! production implementation runs all-MiniLM-L6-v2 through fastembed; tests
//! substitute deterministic embedders.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Embedding backend error: {0}")]
    Backend(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, EmbeddingError>;

// ============================================================================
// Embedder Trait
// ============================================================================

/// Black-box encoder contract: texts in, L2-normalized vectors of dimension
/// `dimension()` out. Implementations must be safe to call from blocking
/// contexts on multiple threads.
pub trait TextEmbedder: Send + Sync {
    /// Encode a batch of texts, processing `batch_size` texts per model pass.
    fn embed_batch(&self, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>>;

    /// The fixed vector dimension D.
    fn dimension(&self) -> usize;

    /// Encode a single text.
    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(std::slice::from_ref(&text.to_string()), 1)?;
        vectors.pop().ok_or_else(|| {
            EmbeddingError::Backend("encoder returned no vector".to_string())
        })
    }
}

/// Rescale a vector to unit length. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

// ============================================================================
// FastEmbed Implementation
// ============================================================================

/// ONNX-runtime encoder for all-MiniLM-L6-v2 (D = 384), weights cached under
/// the configured model cache directory.
pub struct FastEmbedder {
    model: Mutex<TextEmbedding>,
    dimension: usize,
}

impl FastEmbedder {
    pub fn load(model_name: &str, cache_dir: &Path) -> Result<Self> {
        let model = select_model(model_name);
        log::info!("Loading embedding model {model_name} (cache: {cache_dir:?})");

        let embedding = TextEmbedding::try_new(
            InitOptions::new(model)
                .with_cache_dir(cache_dir.to_path_buf())
                .with_show_download_progress(false),
        )
        .map_err(|e| EmbeddingError::Backend(e.to_string()))?;

        let mut loaded = Self {
            model: Mutex::new(embedding),
            dimension: 0,
        };

        // Probe once to learn the dimension and warm the session.
        let probe = loaded.embed_batch(&["dimension probe".to_string()], 1)?;
        loaded.dimension = probe[0].len();
        log::info!("Embedding model loaded, dimension = {}", loaded.dimension);

        Ok(loaded)
    }
}

fn select_model(model_name: &str) -> EmbeddingModel {
    if model_name.contains("MiniLM-L6") {
        EmbeddingModel::AllMiniLML6V2
    } else {
        log::warn!("Unknown embedding model '{model_name}', using all-MiniLM-L6-v2");
        EmbeddingModel::AllMiniLML6V2
    }
}

impl TextEmbedder for FastEmbedder {
    fn embed_batch(&self, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = self.model.lock().unwrap_or_else(PoisonError::into_inner);
        let mut vectors = model
            .embed(texts.to_vec(), Some(batch_size.max(1)))
            .map_err(|e| EmbeddingError::Backend(e.to_string()))?;

        for vector in &mut vectors {
            l2_normalize(vector);
            if self.dimension != 0 && vector.len() != self.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimension,
                    actual: vector.len(),
                });
            }
        }

        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
