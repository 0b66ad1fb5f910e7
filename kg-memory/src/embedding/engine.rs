//! Vector embedding engine
//!
//! fastembed-backed [`Embedder`] with a bounded text-keyed cache.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use async_trait::async_trait;
use fastembed::{InitOptions, TextEmbedding};

use super::cache::{EmbeddingCache, DEFAULT_CACHE_CAPACITY};
use super::discovery::find_models_path;
use super::Embedder;
use crate::error::{MemoryError, Result};

/// Default model (BGE-Small-EN-v1.5, 384 dimensions)
pub const DEFAULT_MODEL: &str = "BAAI/bge-small-en-v1.5";

/// Embedding model selection
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// fastembed model code, e.g. `BAAI/bge-small-en-v1.5`
    pub model: String,
    /// Model cache directory (discovered when unset)
    pub models_path: Option<PathBuf>,
    /// Print download progress on first use
    pub show_download_progress: bool,
    /// Maximum number of cached embeddings
    pub cache_capacity: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            models_path: None,
            show_download_progress: false,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// Vector embedding engine with caching
///
/// Wraps a fastembed model with an LRU cache for repeated lookups.
/// Encoding runs on tokio's blocking pool.
pub struct VectorEngine {
    model: Arc<TextEmbedding>,
    cache: EmbeddingCache,
    dimension: usize,
    model_id: String,
}

impl VectorEngine {
    /// Load the configured model, downloading it into the cache directory if needed
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let cache_dir = find_models_path(config.models_path.as_deref());
        std::fs::create_dir_all(&cache_dir)?;

        let started = Instant::now();
        let (model, dimension) =
            load_model(&config.model, &cache_dir, config.show_download_progress)
                .map_err(|e| MemoryError::model(format!("{:#}", e)))?;

        log::info!(
            "VectorEngine ready ({}, {}d) in {:.3}s",
            config.model,
            dimension,
            started.elapsed().as_secs_f64()
        );

        Ok(Self {
            model: Arc::new(model),
            cache: EmbeddingCache::new(config.cache_capacity),
            dimension,
            model_id: config.model.clone(),
        })
    }

    /// Get cache size
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    /// Clear the cache
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

fn load_model(code: &str, cache_dir: &Path, progress: bool) -> anyhow::Result<(TextEmbedding, usize)> {
    let info = TextEmbedding::list_supported_models()
        .into_iter()
        .find(|info| info.model_code == code)
        .with_context(|| format!("unsupported embedding model '{}'", code))?;

    let options = InitOptions::new(info.model.clone())
        .with_cache_dir(cache_dir.to_path_buf())
        .with_show_download_progress(progress);

    let model = TextEmbedding::try_new(options)
        .with_context(|| format!("failed to load '{}' from {}", code, cache_dir.display()))?;

    Ok((model, info.dim))
}

#[async_trait]
impl Embedder for VectorEngine {
    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(cached) = self.cache.get(text) {
            return Ok(cached);
        }

        let model = Arc::clone(&self.model);
        let owned = text.to_string();
        let started = Instant::now();
        let mut embeddings = tokio::task::spawn_blocking(move || model.embed(vec![owned], None))
            .await
            .map_err(|e| MemoryError::embedding(format!("Encoder task failed: {}", e)))?
            .map_err(|e| MemoryError::embedding(format!("Failed to encode text: {}", e)))?;

        let embedding = embeddings
            .pop()
            .ok_or_else(|| MemoryError::embedding("Model returned no embedding"))?;

        log::debug!(
            "Encoded {} chars in {:.3}s",
            text.len(),
            started.elapsed().as_secs_f64()
        );

        self.cache.put(text.to_string(), embedding.clone());
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EmbeddingConfig::default();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert!(config.models_path.is_none());
        assert_eq!(config.cache_capacity, DEFAULT_CACHE_CAPACITY);
    }

    #[test]
    fn test_unknown_model_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = load_model("nobody/no-such-model", dir.path(), false);
        let message = format!("{:#}", result.err().unwrap());
        assert!(message.contains("unsupported embedding model"));
    }

    #[tokio::test]
    #[ignore = "downloads model files"]
    async fn test_encode_is_deterministic_and_cached() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = EmbeddingConfig {
            models_path: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let engine = VectorEngine::new(&config).unwrap();

        let a = engine.encode("likes tea").await.unwrap();
        assert_eq!(a.len(), engine.dimension());
        assert_eq!(engine.cache_size(), 1);

        engine.clear_cache();
        let b = engine.encode("likes tea").await.unwrap();
        assert_eq!(a, b);
    }
}
