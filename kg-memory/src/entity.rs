//! Entity and relation types
//!
//! Core records of the knowledge graph: named entities holding an
//! append-only list of facts, and typed directed relations between them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned entity identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for EntityId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

/// Store-assigned relation identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationId(pub u64);

impl std::fmt::Display for RelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named record with a type, an append-only fact list and a derived embedding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Immutable surrogate key
    pub id: EntityId,
    /// Unique business key (case-sensitive)
    pub name: String,
    /// Free-text category label
    pub entity_type: String,
    /// Facts in insertion order
    pub content: Vec<String>,
    /// Derived from `(name, entity_type, content)` at the last write
    pub embedding: Vec<f32>,
    /// Incremented on every successful write
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    /// Text the embedding of this entity is computed from
    pub fn embedding_text(&self) -> String {
        embedding_text(&self.name, &self.entity_type, &self.content)
    }

    /// Caller-facing projection without the vector
    pub fn summary(&self) -> EntitySummary {
        EntitySummary {
            id: self.id,
            name: self.name.clone(),
            entity_type: self.entity_type.clone(),
            content: self.content.clone(),
        }
    }
}

/// Entity fields returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySummary {
    pub id: EntityId,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub content: Vec<String>,
}

/// A directed, typed edge between two entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub id: RelationId,
    pub source_entity_id: EntityId,
    pub target_entity_id: EntityId,
    pub relation_type: String,
    pub created_at: DateTime<Utc>,
}

/// Serialize an entity triple into the text handed to the embedder.
///
/// Produces `{"name":…,"entity_type":…,"content":[…]}` with fields in that
/// order, so the same triple always yields the same text.
pub fn embedding_text(name: &str, entity_type: &str, content: &[String]) -> String {
    #[derive(Serialize)]
    struct Triple<'a> {
        name: &'a str,
        entity_type: &'a str,
        content: &'a [String],
    }

    // Serializing borrowed strings into a Vec cannot fail.
    serde_json::to_string(&Triple {
        name,
        entity_type,
        content,
    })
    .unwrap_or_default()
}
