//! Volatile store
//!
//! Same contract as [`RocksStore`](super::RocksStore) over in-process maps.
//! Nothing survives the process; used by tests and `--in-memory` runs.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::index::{VectorIndex, DEFAULT_EXACT_CUTOFF};
use super::{
    check_dimension, check_query_dimension, EntityWrite, Neighbor, NewRelation, StoreStats,
    VectorStore, WriteOutcome,
};
use crate::entity::{Entity, EntityId, Relation, RelationId};
use crate::error::{MemoryError, Result};

#[derive(Default)]
struct Tables {
    entities: BTreeMap<EntityId, Entity>,
    names: HashMap<String, EntityId>,
    relations: BTreeMap<RelationId, Relation>,
    outgoing: HashMap<EntityId, Vec<RelationId>>,
    incoming: HashMap<EntityId, Vec<RelationId>>,
    dimension: Option<usize>,
}

impl Tables {
    fn collect(&self, ids: Option<&Vec<RelationId>>) -> Vec<Relation> {
        ids.map(|ids| {
            ids.iter()
                .filter_map(|id| self.relations.get(id).cloned())
                .collect()
        })
        .unwrap_or_default()
    }
}

/// In-memory entity store
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    index: VectorIndex,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            index: VectorIndex::new(DEFAULT_EXACT_CUTOFF),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn entity_by_name(&self, name: &str) -> Result<Option<Entity>> {
        let tables = self.tables.read().await;
        Ok(tables
            .names
            .get(name)
            .and_then(|id| tables.entities.get(id))
            .cloned())
    }

    async fn entity(&self, id: EntityId) -> Result<Option<Entity>> {
        Ok(self.tables.read().await.entities.get(&id).cloned())
    }

    async fn write_entity(&self, write: EntityWrite) -> Result<WriteOutcome> {
        let mut tables = self.tables.write().await;
        let mut dimension = tables.dimension;
        check_dimension(&mut dimension, write.embedding().len())?;
        let now = Utc::now();

        let entity = match write {
            EntityWrite::Insert {
                name,
                entity_type,
                content,
                embedding,
            } => {
                if tables.names.contains_key(&name) {
                    return Ok(WriteOutcome::Conflict);
                }
                let id = EntityId(tables.entities.keys().next_back().map_or(1, |id| id.0 + 1));
                tables.names.insert(name.clone(), id);
                Entity {
                    id,
                    name,
                    entity_type,
                    content,
                    embedding,
                    revision: 1,
                    created_at: now,
                    updated_at: now,
                }
            }
            EntityWrite::Update {
                id,
                expected_revision,
                entity_type,
                content,
                embedding,
            } => match tables.entities.get(&id) {
                Some(current) if current.revision == expected_revision => Entity {
                    entity_type,
                    content,
                    embedding,
                    revision: current.revision + 1,
                    updated_at: now,
                    ..current.clone()
                },
                _ => return Ok(WriteOutcome::Conflict),
            },
        };

        tables.dimension = dimension;
        tables.entities.insert(entity.id, entity.clone());
        self.index.upsert(entity.id, entity.embedding.clone());
        Ok(WriteOutcome::Written(entity))
    }

    async fn insert_relation(&self, relation: NewRelation) -> Result<Relation> {
        let mut tables = self.tables.write().await;

        for endpoint in [relation.source_entity_id, relation.target_entity_id] {
            if !tables.entities.contains_key(&endpoint) {
                return Err(MemoryError::DanglingReference(endpoint));
            }
        }

        let id = RelationId(tables.relations.keys().next_back().map_or(1, |id| id.0 + 1));
        let relation = Relation {
            id,
            source_entity_id: relation.source_entity_id,
            target_entity_id: relation.target_entity_id,
            relation_type: relation.relation_type,
            created_at: Utc::now(),
        };

        tables
            .outgoing
            .entry(relation.source_entity_id)
            .or_default()
            .push(id);
        tables
            .incoming
            .entry(relation.target_entity_id)
            .or_default()
            .push(id);
        tables.relations.insert(id, relation.clone());
        Ok(relation)
    }

    async fn relations_from(&self, id: EntityId) -> Result<Vec<Relation>> {
        let tables = self.tables.read().await;
        Ok(tables.collect(tables.outgoing.get(&id)))
    }

    async fn relations_to(&self, id: EntityId) -> Result<Vec<Relation>> {
        let tables = self.tables.read().await;
        Ok(tables.collect(tables.incoming.get(&id)))
    }

    async fn nearest(
        &self,
        vector: &[f32],
        limit: usize,
        max_distance: f32,
    ) -> Result<Vec<Neighbor>> {
        let tables = self.tables.read().await;
        check_query_dimension(tables.dimension, vector.len())?;
        Ok(self.index.nearest(vector, limit, max_distance))
    }

    async fn stats(&self) -> Result<StoreStats> {
        let tables = self.tables.read().await;
        Ok(StoreStats {
            entities: tables.entities.len(),
            relations: tables.relations.len(),
            dimension: tables.dimension,
        })
    }
}
