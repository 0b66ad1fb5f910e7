//! Engine configuration

/// Tunables for merging and retrieval
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Maximum number of seed entities taken from the vector search (K)
    pub seed_limit: usize,
    /// Seeds must lie strictly below this cosine distance (T)
    pub distance_threshold: f32,
    /// Attempts an upsert makes before giving up on a contended name
    pub max_write_attempts: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            seed_limit: 3,
            distance_threshold: 1.2,
            max_write_attempts: 8,
        }
    }
}
