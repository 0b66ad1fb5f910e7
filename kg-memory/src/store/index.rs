//! In-memory vector index
//!
//! Exact scan for small stores, instant-distance HNSW above a size cutoff.
//! The HNSW graph is rebuilt lazily on the first query after a write.

use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use instant_distance::{Builder, HnswMap, Point, Search};
use parking_lot::RwLock;

use super::Neighbor;
use crate::entity::EntityId;

/// Stores at or below this many vectors are scanned exactly
pub const DEFAULT_EXACT_CUTOFF: usize = 512;

/// HNSW point wrapper for semantic search
#[derive(Clone)]
struct IndexPoint(Vec<f32>);

impl Point for IndexPoint {
    fn distance(&self, other: &Self) -> f32 {
        cosine_distance(&self.0, &other.0)
    }
}

/// Vector cache with an optional HNSW graph over it
pub struct VectorIndex {
    vectors: DashMap<EntityId, Vec<f32>>,
    hnsw: RwLock<Option<HnswMap<IndexPoint, EntityId>>>,
    dirty: AtomicBool,
    exact_cutoff: usize,
}

impl VectorIndex {
    pub fn new(exact_cutoff: usize) -> Self {
        Self {
            vectors: DashMap::new(),
            hnsw: RwLock::new(None),
            dirty: AtomicBool::new(false),
            exact_cutoff,
        }
    }

    /// Insert or replace the vector of an entity
    pub fn upsert(&self, id: EntityId, vector: Vec<f32>) {
        self.vectors.insert(id, vector);
        self.dirty.store(true, Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Up to `limit` ids with distance below `max_distance`, closest first
    pub fn nearest(&self, query: &[f32], limit: usize, max_distance: f32) -> Vec<Neighbor> {
        if limit == 0 || self.vectors.is_empty() {
            return Vec::new();
        }

        let mut results = if self.vectors.len() <= self.exact_cutoff {
            self.exact_search(query, max_distance)
        } else {
            self.hnsw_search(query, limit, max_distance)
        };

        results.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
        results.truncate(limit);
        results
    }

    fn exact_search(&self, query: &[f32], max_distance: f32) -> Vec<Neighbor> {
        self.vectors
            .iter()
            .map(|entry| Neighbor {
                id: *entry.key(),
                distance: cosine_distance(query, entry.value()),
            })
            .filter(|n| n.distance < max_distance)
            .collect()
    }

    fn hnsw_search(&self, query: &[f32], limit: usize, max_distance: f32) -> Vec<Neighbor> {
        self.refresh();

        let guard = self.hnsw.read();
        let hnsw = match guard.as_ref() {
            Some(hnsw) => hnsw,
            None => return self.exact_search(query, max_distance),
        };

        let query_point = IndexPoint(query.to_vec());
        let mut search = Search::default();
        let mut results = Vec::new();

        for item in hnsw.search(&query_point, &mut search) {
            if item.distance >= max_distance {
                // Candidates arrive closest first
                break;
            }
            results.push(Neighbor {
                id: *item.value,
                distance: item.distance,
            });
            // Keep one extra so ties at the boundary are settled by id
            if results.len() > limit {
                break;
            }
        }

        results
    }

    /// Rebuild HNSW index if vectors changed since the last build
    fn refresh(&self) {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return;
        }

        let (points, ids): (Vec<IndexPoint>, Vec<EntityId>) = self
            .vectors
            .iter()
            .map(|entry| (IndexPoint(entry.value().clone()), *entry.key()))
            .unzip();

        log::debug!("Rebuilding HNSW index over {} vectors", points.len());

        let hnsw = Builder::default().ef_construction(100).build(points, ids);
        *self.hnsw.write() = Some(hnsw);
    }
}

/// Calculate cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Cosine distance in [0, 2]; 0 means identical direction
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    (1.0 - cosine_similarity(a, b)).clamp(0.0, 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_cosine_distance_range() {
        let a = [1.0, 0.0, 0.0];
        assert!(cosine_distance(&a, &a) < 0.001);
        assert!((cosine_distance(&a, &[0.0, 1.0, 0.0]) - 1.0).abs() < 0.001);
        assert!((cosine_distance(&a, &[-1.0, 0.0, 0.0]) - 2.0).abs() < 0.001);
    }

    #[test]
    fn test_zero_vector_is_unrelated() {
        assert!((cosine_distance(&[0.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_exact_threshold_and_limit() {
        let index = VectorIndex::new(DEFAULT_EXACT_CUTOFF);
        index.upsert(EntityId(1), vec![1.0, 0.0]);
        index.upsert(EntityId(2), vec![0.9, 0.1]);
        index.upsert(EntityId(3), vec![0.0, 1.0]);
        index.upsert(EntityId(4), vec![-1.0, 0.0]);

        let hits = index.nearest(&[1.0, 0.0], 3, 1.2);
        let ids: Vec<_> = hits.iter().map(|n| n.id).collect();
        // 4 sits at distance 2.0, beyond the threshold
        assert_eq!(ids, vec![EntityId(1), EntityId(2), EntityId(3)]);

        let hits = index.nearest(&[1.0, 0.0], 1, 1.2);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, EntityId(1));
    }

    #[test]
    fn test_threshold_is_strict() {
        let index = VectorIndex::new(DEFAULT_EXACT_CUTOFF);
        index.upsert(EntityId(1), vec![0.0, 1.0]);
        assert!(index.nearest(&[1.0, 0.0], 3, 1.0).is_empty());
        assert_eq!(index.nearest(&[1.0, 0.0], 3, 1.0001).len(), 1);
    }

    #[test]
    fn test_ties_broken_by_id() {
        let index = VectorIndex::new(DEFAULT_EXACT_CUTOFF);
        index.upsert(EntityId(9), vec![1.0, 0.0]);
        index.upsert(EntityId(3), vec![2.0, 0.0]);
        index.upsert(EntityId(5), vec![3.0, 0.0]);
        let ids: Vec<_> = index.nearest(&[1.0, 0.0], 2, 1.2).iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![EntityId(3), EntityId(5)]);
    }

    #[test]
    fn test_upsert_replaces_vector() {
        let index = VectorIndex::new(DEFAULT_EXACT_CUTOFF);
        index.upsert(EntityId(1), vec![0.0, 1.0]);
        index.upsert(EntityId(1), vec![1.0, 0.0]);
        assert_eq!(index.len(), 1);
        let hits = index.nearest(&[1.0, 0.0], 3, 0.5);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_hnsw_path_finds_nearest() {
        let index = VectorIndex::new(0);
        for i in 0..64u64 {
            let angle = i as f32 * 0.02;
            index.upsert(EntityId(i), vec![angle.cos(), angle.sin()]);
        }
        let hits = index.nearest(&[1.0, 0.0], 3, 1.2);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].id, EntityId(0));
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));

        // A write marks the graph stale; the next query sees the new point
        index.upsert(EntityId(100), vec![1.0, 0.0001]);
        let hits = index.nearest(&[1.0, 0.0001], 1, 1.2);
        assert!(hits[0].id == EntityId(100) || hits[0].distance < 0.001);
    }
}
