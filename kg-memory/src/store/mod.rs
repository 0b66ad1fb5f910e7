//! Entity and relation persistence
//!
//! The [`VectorStore`] capability offers exact CRUD over entities and
//! relations plus nearest-neighbour ordering by cosine distance. Entity
//! writes are conditional on the stored revision so callers can build
//! linearizable read-modify-write merges on top of it.

mod index;
mod memory;
mod rocks;
mod schema;

use async_trait::async_trait;
use serde::Serialize;

use crate::entity::{Entity, EntityId, Relation};
use crate::error::{MemoryError, Result};

pub use index::{cosine_distance, cosine_similarity, VectorIndex, DEFAULT_EXACT_CUTOFF};
pub use memory::InMemoryStore;
pub use rocks::RocksStore;
pub use schema::SCHEMA_VERSION;

/// Conditional entity write
#[derive(Debug, Clone)]
pub enum EntityWrite {
    /// Create a new entity; conflicts if `name` is already taken
    Insert {
        name: String,
        entity_type: String,
        content: Vec<String>,
        embedding: Vec<f32>,
    },
    /// Replace an entity's mutable fields; conflicts unless the stored
    /// revision still equals `expected_revision`
    Update {
        id: EntityId,
        expected_revision: u64,
        entity_type: String,
        content: Vec<String>,
        embedding: Vec<f32>,
    },
}

impl EntityWrite {
    fn embedding(&self) -> &[f32] {
        match self {
            Self::Insert { embedding, .. } | Self::Update { embedding, .. } => embedding,
        }
    }
}

/// Result of a conditional write
#[derive(Debug, Clone)]
pub enum WriteOutcome {
    /// The write was applied; carries the stored row
    Written(Entity),
    /// Another writer got there first; nothing was changed
    Conflict,
}

/// Relation to insert
#[derive(Debug, Clone)]
pub struct NewRelation {
    pub source_entity_id: EntityId,
    pub target_entity_id: EntityId,
    pub relation_type: String,
}

/// Nearest-neighbour candidate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: EntityId,
    /// Cosine distance in [0, 2]
    pub distance: f32,
}

/// Store statistics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub entities: usize,
    pub relations: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,
}

/// Persistent table of entities and directed relations
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Point lookup by unique name
    async fn entity_by_name(&self, name: &str) -> Result<Option<Entity>>;

    /// Point lookup by id
    async fn entity(&self, id: EntityId) -> Result<Option<Entity>>;

    /// Batch lookup; missing ids are skipped, order follows `ids`
    async fn entities(&self, ids: &[EntityId]) -> Result<Vec<Entity>> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entity) = self.entity(*id).await? {
                found.push(entity);
            }
        }
        Ok(found)
    }

    /// Apply a conditional write as one all-or-nothing unit
    async fn write_entity(&self, write: EntityWrite) -> Result<WriteOutcome>;

    /// Insert an edge; fails with `DanglingReference` if an endpoint is missing
    async fn insert_relation(&self, relation: NewRelation) -> Result<Relation>;

    /// Relations whose source is `id`
    async fn relations_from(&self, id: EntityId) -> Result<Vec<Relation>>;

    /// Relations whose target is `id`
    async fn relations_to(&self, id: EntityId) -> Result<Vec<Relation>>;

    /// Up to `limit` entities with distance strictly below `max_distance`,
    /// closest first, ties broken by id
    async fn nearest(&self, vector: &[f32], limit: usize, max_distance: f32)
        -> Result<Vec<Neighbor>>;

    async fn stats(&self) -> Result<StoreStats>;
}

/// Record the store dimension on first use and reject mismatches afterwards
fn check_dimension(stored: &mut Option<usize>, actual: usize) -> Result<()> {
    match *stored {
        Some(expected) if expected != actual => {
            Err(MemoryError::DimensionMismatch { expected, actual })
        }
        Some(_) => Ok(()),
        None => {
            if actual == 0 {
                return Err(MemoryError::validation("embedding must not be empty"));
            }
            *stored = Some(actual);
            Ok(())
        }
    }
}

/// Reject a query vector that cannot be compared with stored ones
fn check_query_dimension(stored: Option<usize>, actual: usize) -> Result<()> {
    match stored {
        Some(expected) if expected != actual => {
            Err(MemoryError::DimensionMismatch { expected, actual })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_dimension_records_first() {
        let mut stored = None;
        check_dimension(&mut stored, 4).unwrap();
        assert_eq!(stored, Some(4));
        check_dimension(&mut stored, 4).unwrap();
        let err = check_dimension(&mut stored, 5).unwrap_err();
        assert!(matches!(
            err,
            MemoryError::DimensionMismatch {
                expected: 4,
                actual: 5
            }
        ));
    }

    #[test]
    fn test_check_dimension_rejects_empty() {
        let mut stored = None;
        assert!(check_dimension(&mut stored, 0).is_err());
        assert_eq!(stored, None);
    }

    #[test]
    fn test_query_dimension_on_empty_store() {
        assert!(check_query_dimension(None, 3).is_ok());
        assert!(check_query_dimension(Some(3), 2).is_err());
    }
}
