//! Relation creation

use std::sync::Arc;

use crate::entity::{EntityId, Relation};
use crate::error::Result;
use crate::store::{NewRelation, VectorStore};

/// Inserts directed edges between existing entities
///
/// Every call adds a new edge; identical edges are not deduplicated and
/// self-relations are allowed. Endpoints are checked by the store.
pub struct RelationLinker {
    store: Arc<dyn VectorStore>,
}

impl RelationLinker {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }

    pub async fn link(
        &self,
        source: EntityId,
        target: EntityId,
        relation_type: &str,
    ) -> Result<Relation> {
        let relation = self
            .store
            .insert_relation(NewRelation {
                source_entity_id: source,
                target_entity_id: target,
                relation_type: relation_type.to_string(),
            })
            .await?;

        log::debug!(
            "Linked {} -[{}]-> {} (relation {})",
            source,
            relation_type,
            target,
            relation.id
        );
        Ok(relation)
    }
}
