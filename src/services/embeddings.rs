// src/services/embeddings.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("failed to initialize embedding model: {0}")]
    Init(String),

    #[error("embedding generation failed: {0}")]
    Embed(String),
}

/// Turns text into fixed-length dense vectors.
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    /// Embed multiple texts in one call; output order matches input order.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// Text submitted for one article: headline, then body.
pub fn embedding_text(headline: &str, content: &str) -> String {
    format!("{}. {}", headline, content)
}

#[cfg(feature = "local-embeddings")]
pub use local::FastEmbedder;

#[cfg(feature = "local-embeddings")]
mod local {
    use super::{EmbedError, Embedder};
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::sync::Mutex;

    /// all-MiniLM-L6-v2 sentence embeddings, run in process.
    pub struct FastEmbedder {
        model: Mutex<TextEmbedding>,
        dimension: usize,
    }

    impl FastEmbedder {
        pub fn new() -> Result<Self, EmbedError> {
            let model = TextEmbedding::try_new(
                InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false),
            )
            .map_err(|e| EmbedError::Init(e.to_string()))?;

            Ok(Self {
                model: Mutex::new(model),
                dimension: 384,
            })
        }
    }

    impl Embedder for FastEmbedder {
        fn dimension(&self) -> usize {
            self.dimension
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let mut model = self
                .model
                .lock()
                .map_err(|_| EmbedError::Embed("embedding model lock poisoned".to_string()))?;
            model
                .embed(texts, None)
                .map_err(|e| EmbedError::Embed(e.to_string()))
        }
    }
}
