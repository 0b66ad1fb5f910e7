//! Hybrid retrieval
//!
//! Semantic seed search followed by one-hop graph expansion. Nearest
//! neighbours surface entities that resemble the query; the expansion pulls
//! in entities linked to them in either direction, since facts about a
//! queried entity are often stored on a neighbour.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use crate::embedding::Embedder;
use crate::entity::{Entity, EntityId, RelationId};
use crate::error::Result;
use crate::store::VectorStore;

/// Why an entity is part of the result
#[derive(Debug, Clone, PartialEq)]
pub enum MatchReason {
    /// Direct vector match
    SemanticSimilarity { distance: f32 },
    /// Reached over one relation from a seed
    GraphNeighbor {
        seed: EntityId,
        relation: RelationId,
        relation_type: String,
    },
}

/// Retrieved entity
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub entity: Entity,
    pub reason: MatchReason,
}

/// Similarity search with one-hop expansion
pub struct HybridRetriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    seed_limit: usize,
    distance_threshold: f32,
}

impl HybridRetriever {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        seed_limit: usize,
        distance_threshold: f32,
    ) -> Self {
        Self {
            store,
            embedder,
            seed_limit,
            distance_threshold,
        }
    }

    /// Entities matching `query` plus their direct neighbours.
    ///
    /// Each entity appears once. Seeds come first, closest first, followed by
    /// neighbours in discovery order. An empty result is not an error.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let started = Instant::now();

        // 1. Embed the query
        let query_vector = self.embedder.encode(query).await?;

        // 2. Seed set
        let seeds = self
            .store
            .nearest(&query_vector, self.seed_limit, self.distance_threshold)
            .await?;

        if seeds.is_empty() {
            log::debug!("No seeds below distance {} for query", self.distance_threshold);
            return Ok(Vec::new());
        }

        let mut seen: HashSet<EntityId> = seeds.iter().map(|n| n.id).collect();
        let seed_ids: Vec<EntityId> = seeds.iter().map(|n| n.id).collect();
        let mut results: Vec<SearchResult> = self
            .store
            .entities(&seed_ids)
            .await?
            .into_iter()
            .zip(seeds.iter())
            .map(|(entity, seed)| SearchResult {
                entity,
                reason: MatchReason::SemanticSimilarity {
                    distance: seed.distance,
                },
            })
            .collect();

        // 3. One-hop expansion in both directions
        let mut expansion: Vec<(EntityId, MatchReason)> = Vec::new();
        for seed in &seed_ids {
            let outgoing = self.store.relations_from(*seed).await?;
            let incoming = self.store.relations_to(*seed).await?;

            let neighbours = outgoing
                .into_iter()
                .map(|r| (r.target_entity_id, r))
                .chain(incoming.into_iter().map(|r| (r.source_entity_id, r)));

            for (neighbour, relation) in neighbours {
                if seen.insert(neighbour) {
                    expansion.push((
                        neighbour,
                        MatchReason::GraphNeighbor {
                            seed: *seed,
                            relation: relation.id,
                            relation_type: relation.relation_type,
                        },
                    ));
                }
            }
        }

        // 4. Union, deduplicated by id
        let expansion_ids: Vec<EntityId> = expansion.iter().map(|(id, _)| *id).collect();
        let mut reasons = expansion.into_iter().map(|(_, reason)| reason);
        for entity in self.store.entities(&expansion_ids).await? {
            // Entities are never deleted, so lookups line up with the ids
            if let Some(reason) = reasons.next() {
                results.push(SearchResult { entity, reason });
            }
        }

        log::debug!(
            "Search returned {} entities ({} seeds) in {:.3}s",
            results.len(),
            seed_ids.len(),
            started.elapsed().as_secs_f64()
        );

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::linker::RelationLinker;
    use crate::merger::EntityMerger;
    use crate::store::InMemoryStore;
    use crate::test_support::{FailingEmbedder, KeywordEmbedder};

    const KEYWORDS: &[&str] = &["tennis", "bowling", "garden", "piano", "chess"];

    struct Fixture {
        store: Arc<InMemoryStore>,
        merger: EntityMerger,
        linker: RelationLinker,
        retriever: HybridRetriever,
    }

    fn fixture(seed_limit: usize, threshold: f32) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let embedder = Arc::new(KeywordEmbedder::new(KEYWORDS));
        Fixture {
            merger: EntityMerger::new(store.clone(), embedder.clone(), 8),
            linker: RelationLinker::new(store.clone()),
            retriever: HybridRetriever::new(store.clone(), embedder, seed_limit, threshold),
            store,
        }
    }

    impl Fixture {
        async fn add(&self, name: &str, fact: &str) -> EntityId {
            self.merger
                .upsert(name, "thing", &[fact.to_string()])
                .await
                .unwrap()
                .id
        }
    }

    fn names(results: &[SearchResult]) -> Vec<&str> {
        results.iter().map(|r| r.entity.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_search_includes_neighbors() {
        let f = fixture(3, 0.5);
        let a = f.add("A", "tennis tennis tennis").await;
        let b = f.add("B", "garden").await;
        f.linker.link(a, b, "owns").await.unwrap();

        let results = f.retriever.search("tennis").await.unwrap();
        assert_eq!(names(&results), vec!["A", "B"]);
        assert!(matches!(results[0].reason, MatchReason::SemanticSimilarity { .. }));
        match &results[1].reason {
            MatchReason::GraphNeighbor {
                seed,
                relation_type,
                ..
            } => {
                assert_eq!(*seed, a);
                assert_eq!(relation_type, "owns");
            }
            other => panic!("unexpected reason {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_incoming_relations_expand_too() {
        let f = fixture(3, 0.5);
        let a = f.add("A", "tennis").await;
        let owner = f.add("Owner", "piano").await;
        f.linker.link(owner, a, "coaches").await.unwrap();

        let results = f.retriever.search("tennis").await.unwrap();
        assert_eq!(names(&results), vec!["A", "Owner"]);
    }

    #[tokio::test]
    async fn test_empty_seed_returns_empty() {
        let f = fixture(3, 0.5);
        f.add("A", "tennis").await;
        let results = f.retriever.search("chess").await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_empty_store_returns_empty() {
        let f = fixture(3, 1.2);
        assert!(f.retriever.search("anything").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_edges_dedup_at_entity_level() {
        let f = fixture(3, 0.5);
        let a = f.add("A", "tennis").await;
        let b = f.add("B", "garden").await;
        f.linker.link(a, b, "knows").await.unwrap();
        f.linker.link(a, b, "knows").await.unwrap();
        f.linker.link(b, a, "knows").await.unwrap();
        assert_eq!(f.store.stats().await.unwrap().relations, 3);

        let results = f.retriever.search("tennis").await.unwrap();
        assert_eq!(names(&results), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_seed_linked_to_seed_appears_once() {
        let f = fixture(3, 0.5);
        let a = f.add("A", "tennis").await;
        let b = f.add("B", "tennis bowling").await;
        f.linker.link(a, b, "partners").await.unwrap();

        let results = f.retriever.search("tennis").await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results
            .iter()
            .all(|r| matches!(r.reason, MatchReason::SemanticSimilarity { .. })));
    }

    #[tokio::test]
    async fn test_seed_limit_bounds_seeds_not_neighbors() {
        let f = fixture(1, 1.2);
        let a = f.add("A", "tennis").await;
        f.add("A2", "tennis tennis bowling").await;
        let b = f.add("B", "garden").await;
        let c = f.add("C", "piano").await;
        f.linker.link(a, b, "x").await.unwrap();
        f.linker.link(c, a, "y").await.unwrap();

        let results = f.retriever.search("tennis").await.unwrap();
        assert_eq!(names(&results), vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_hop_is_exactly_one() {
        let f = fixture(3, 0.5);
        let a = f.add("A", "tennis").await;
        let b = f.add("B", "garden").await;
        let c = f.add("C", "piano").await;
        f.linker.link(a, b, "x").await.unwrap();
        f.linker.link(b, c, "x").await.unwrap();

        let results = f.retriever.search("tennis").await.unwrap();
        assert_eq!(names(&results), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_embedder_failure_is_error() {
        let store = Arc::new(InMemoryStore::new());
        let retriever = HybridRetriever::new(store, Arc::new(FailingEmbedder), 3, 1.2);
        let err = retriever.search("tennis").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Embedding);
    }
}
