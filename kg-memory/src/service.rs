//! Memory service
//!
//! The single entry point transports talk to. Validates request shape,
//! dispatches to the merger, linker or retriever, and turns every outcome
//! into one structured reply.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::MemoryConfig;
use crate::embedding::Embedder;
use crate::entity::{EntityId, EntitySummary, RelationId};
use crate::error::{ErrorKind, MemoryError, Result};
use crate::linker::RelationLinker;
use crate::merger::EntityMerger;
use crate::retriever::HybridRetriever;
use crate::store::VectorStore;

/// Operations exposed to transports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    SetEntity,
    SetRelationship,
    SearchEntity,
    GetEntity,
    MemoryStats,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Self::SetEntity,
        Self::SetRelationship,
        Self::SearchEntity,
        Self::GetEntity,
        Self::MemoryStats,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::SetEntity => "set-entity",
            Self::SetRelationship => "set-relationship",
            Self::SearchEntity => "search-entity",
            Self::GetEntity => "get-entity",
            Self::MemoryStats => "memory-stats",
        }
    }
}

impl std::str::FromStr for Operation {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.name() == s)
            .ok_or_else(|| MemoryError::unsupported(s))
    }
}

/// Facts may arrive as a list or as one string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Facts {
    Many(Vec<String>),
    One(String),
}

impl Facts {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Self::Many(facts) => facts,
            Self::One(fact) => vec![fact],
        }
    }
}

/// Entity ids may arrive as numbers or numeric strings
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IdArg {
    Number(u64),
    Text(String),
}

impl IdArg {
    fn resolve(self, field: &str) -> Result<EntityId> {
        match self {
            Self::Number(n) => Ok(EntityId(n)),
            Self::Text(s) => s.parse().map_err(|_| {
                MemoryError::validation(format!("{} must be an entity id, got '{}'", field, s))
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetEntityRequest {
    pub name: String,
    pub entity_type: String,
    pub content: Facts,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetRelationshipRequest {
    pub source_entity_id: IdArg,
    pub target_entity_id: IdArg,
    pub relation_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchEntityRequest {
    pub query: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetEntityRequest {
    pub name: String,
}

/// Reply to set-entity
#[derive(Debug, Clone, Serialize)]
pub struct SetEntityReply {
    pub id: EntityId,
    pub created: bool,
    pub fact_count: usize,
    pub message: String,
}

/// Reply to set-relationship
#[derive(Debug, Clone, Serialize)]
pub struct SetRelationshipReply {
    pub relation_id: RelationId,
    pub message: String,
}

/// Reply to get-entity
#[derive(Debug, Clone, Serialize)]
pub struct GetEntityReply {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntitySummary>,
}

/// Reply to memory-stats
#[derive(Debug, Clone, Serialize)]
pub struct StatsReply {
    pub entities: usize,
    pub relations: usize,
    pub dimension: usize,
    pub model: String,
}

/// Structured failure handed to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&MemoryError> for Failure {
    fn from(err: &MemoryError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Orchestrates merger, linker and retriever behind the operation set
pub struct MemoryService {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    merger: EntityMerger,
    linker: RelationLinker,
    retriever: HybridRetriever,
}

impl MemoryService {
    /// Wire the components around injected collaborators
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        config: &MemoryConfig,
    ) -> Self {
        Self {
            merger: EntityMerger::new(
                Arc::clone(&store),
                Arc::clone(&embedder),
                config.max_write_attempts,
            ),
            linker: RelationLinker::new(Arc::clone(&store)),
            retriever: HybridRetriever::new(
                Arc::clone(&store),
                Arc::clone(&embedder),
                config.seed_limit,
                config.distance_threshold,
            ),
            store,
            embedder,
        }
    }

    /// Run a named operation against raw JSON arguments
    pub async fn call(&self, operation: &str, args: Value) -> std::result::Result<Value, Failure> {
        let started = Instant::now();
        let result = self.dispatch(operation, args).await;
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(value) => {
                log::debug!("{} succeeded in {:.3}s", operation, elapsed);
                Ok(value)
            }
            Err(err) => {
                log::warn!("{} failed after {:.3}s: {}", operation, elapsed, err);
                Err(Failure::from(&err))
            }
        }
    }

    async fn dispatch(&self, operation: &str, args: Value) -> Result<Value> {
        let value = match operation.parse::<Operation>()? {
            Operation::SetEntity => serde_json::to_value(self.set_entity(parse(args)?).await?)?,
            Operation::SetRelationship => {
                serde_json::to_value(self.set_relationship(parse(args)?).await?)?
            }
            Operation::SearchEntity => {
                serde_json::to_value(self.search_entity(parse(args)?).await?)?
            }
            Operation::GetEntity => serde_json::to_value(self.get_entity(parse(args)?).await?)?,
            Operation::MemoryStats => serde_json::to_value(self.stats().await?)?,
        };
        Ok(value)
    }

    pub async fn set_entity(&self, request: SetEntityRequest) -> Result<SetEntityReply> {
        require_non_blank("name", &request.name)?;
        let facts = request.content.into_vec();
        if facts.is_empty() {
            return Err(MemoryError::validation("content must contain at least one fact"));
        }

        let upserted = self
            .merger
            .upsert(&request.name, &request.entity_type, &facts)
            .await?;

        let message = if upserted.created {
            format!("Inserted new entity as id {} into memory.", upserted.id)
        } else {
            format!("Updated existing entity '{}' with new content.", upserted.id)
        };

        Ok(SetEntityReply {
            id: upserted.id,
            created: upserted.created,
            fact_count: upserted.fact_count,
            message,
        })
    }

    pub async fn set_relationship(
        &self,
        request: SetRelationshipRequest,
    ) -> Result<SetRelationshipReply> {
        let source = request.source_entity_id.resolve("source_entity_id")?;
        let target = request.target_entity_id.resolve("target_entity_id")?;

        let relation = self
            .linker
            .link(source, target, &request.relation_type)
            .await?;

        Ok(SetRelationshipReply {
            relation_id: relation.id,
            message: "Created relationship.".to_string(),
        })
    }

    pub async fn search_entity(&self, request: SearchEntityRequest) -> Result<Vec<EntitySummary>> {
        require_non_blank("query", &request.query)?;
        let results = self.retriever.search(&request.query).await?;
        Ok(results.iter().map(|r| r.entity.summary()).collect())
    }

    pub async fn get_entity(&self, request: GetEntityRequest) -> Result<GetEntityReply> {
        require_non_blank("name", &request.name)?;
        let entity = self.store.entity_by_name(&request.name).await?;
        Ok(GetEntityReply {
            found: entity.is_some(),
            entity: entity.map(|e| e.summary()),
        })
    }

    pub async fn stats(&self) -> Result<StatsReply> {
        let stats = self.store.stats().await?;
        Ok(StatsReply {
            entities: stats.entities,
            relations: stats.relations,
            dimension: stats.dimension.unwrap_or_else(|| self.embedder.dimension()),
            model: self.embedder.model_id().to_string(),
        })
    }
}

/// Deserialize arguments, reporting shape problems as validation errors
fn parse<T: serde::de::DeserializeOwned>(args: Value) -> Result<T> {
    let args = if args.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        args
    };
    serde_json::from_value(args).map_err(|e| MemoryError::validation(e.to_string()))
}

fn require_non_blank(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(MemoryError::validation(format!("{} must not be empty", field)));
    }
    Ok(())
}
