//! Embedding module for semantic search
//!
//! The [`Embedder`] capability turns text into fixed-length vectors. The
//! same model must serve every write and every read of one store.

mod cache;
mod discovery;
mod engine;

use async_trait::async_trait;

use crate::error::Result;

pub use cache::{EmbeddingCache, DEFAULT_CACHE_CAPACITY};
pub use discovery::find_models_path;
pub use engine::{EmbeddingConfig, VectorEngine, DEFAULT_MODEL};

/// Text to vector capability
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Encode `text`; deterministic for a given model version
    async fn encode(&self, text: &str) -> Result<Vec<f32>>;

    /// Length of every vector this embedder produces
    fn dimension(&self) -> usize;

    /// Identifier of the model behind this embedder
    fn model_id(&self) -> &str;
}
