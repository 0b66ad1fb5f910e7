//! Bounded embedding cache

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

/// Default number of cached embeddings
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// LRU cache of text → vector, evicting the least recently used entry
/// once full.
pub struct EmbeddingCache {
    entries: Mutex<LruCache<String, Vec<f32>>>,
}

impl EmbeddingCache {
    /// Create a cache holding at most `capacity` vectors (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, text: &str) -> Option<Vec<f32>> {
        self.entries.lock().get(text).cloned()
    }

    pub fn put(&self, text: String, embedding: Vec<f32>) {
        self.entries.lock().put(text, embedding);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_growing_merge_texts_stay_bounded() {
        let cache = EmbeddingCache::new(4);
        let mut facts = Vec::new();
        for i in 0..100 {
            facts.push(format!("fact {}", i));
            let text = serde_json::json!({"name": "X", "content": facts}).to_string();
            cache.put(text, vec![i as f32]);
        }
        assert_eq!(cache.len(), 4);
        assert_eq!(cache.capacity(), 4);
    }

    #[test]
    fn test_least_recently_used_is_evicted() {
        let cache = EmbeddingCache::new(2);
        cache.put("tea".into(), vec![1.0]);
        cache.put("coffee".into(), vec![2.0]);
        assert_eq!(cache.get("tea"), Some(vec![1.0]));

        cache.put("cocoa".into(), vec![3.0]);
        assert!(cache.get("coffee").is_none());
        assert_eq!(cache.get("tea"), Some(vec![1.0]));
        assert_eq!(cache.get("cocoa"), Some(vec![3.0]));
    }

    #[test]
    fn test_zero_capacity_still_caches_one() {
        let cache = EmbeddingCache::new(0);
        cache.put("a".into(), vec![1.0]);
        cache.put("b".into(), vec![2.0]);
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
