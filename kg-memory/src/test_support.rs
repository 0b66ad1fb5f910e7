//! Test doubles for the embedder capability

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::embedding::Embedder;
use crate::error::{MemoryError, Result};

/// Deterministic embedder: one axis per keyword, plus a bias axis so no
/// vector is ever zero. Texts sharing keywords point in similar directions.
pub struct KeywordEmbedder {
    keywords: Vec<&'static str>,
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new(keywords: &[&'static str]) -> Self {
        Self {
            keywords: keywords.to_vec(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let mut vector: Vec<f32> = self
            .keywords
            .iter()
            .map(|k| lower.matches(k).count() as f32)
            .collect();
        vector.push(0.01);
        vector
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Let concurrent writers interleave between read and write
        tokio::task::yield_now().await;
        Ok(self.vector(text))
    }

    fn dimension(&self) -> usize {
        self.keywords.len() + 1
    }

    fn model_id(&self) -> &str {
        "keyword-test"
    }
}

/// Embedder whose backend is always unreachable
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn encode(&self, _text: &str) -> Result<Vec<f32>> {
        Err(MemoryError::embedding("model offline"))
    }

    fn dimension(&self) -> usize {
        4
    }

    fn model_id(&self) -> &str {
        "offline"
    }
}
