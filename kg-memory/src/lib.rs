//! Knowledge Graph Memory
//!
//! Persistent memory for AI agents: named entities carrying an append-only
//! list of facts, typed directed relations between them, and retrieval that
//! combines vector similarity with one-hop graph expansion.
//!
//! ## Features
//!
//! - **Upsert with merge** - Writing an existing name appends facts and re-embeds
//! - **Hybrid search** - Nearest seeds below a distance threshold plus their neighbours
//! - **Checked relations** - Edges to missing entities are rejected
//! - **RocksDB persistence** - Atomic batched writes with an HNSW index for large stores
//!
//! ## Example
//!
//! ```ignore
//! use kg_memory::{EmbeddingConfig, MemoryConfig, MemoryService, RocksStore, VectorEngine};
//!
//! let store = Arc::new(RocksStore::open(&db_path)?);
//! let engine = Arc::new(VectorEngine::new(&EmbeddingConfig::default())?);
//! let service = MemoryService::new(store, engine, &MemoryConfig::default());
//!
//! service
//!     .call("set-entity", json!({"name": "Ada", "entity_type": "person", "content": ["likes tea"]}))
//!     .await?;
//! let hits = service.call("search-entity", json!({"query": "tea"})).await?;
//! ```

pub mod config;
pub mod embedding;
pub mod entity;
pub mod error;
pub mod linker;
pub mod merger;
pub mod retriever;
pub mod service;
pub mod store;

#[cfg(test)]
mod test_support;

// Re-exports for convenience
pub use config::MemoryConfig;
pub use embedding::{Embedder, EmbeddingConfig, VectorEngine};
pub use entity::{Entity, EntityId, EntitySummary, Relation, RelationId};
pub use error::{ErrorKind, MemoryError, Result};
pub use linker::RelationLinker;
pub use merger::{EntityMerger, Upserted};
pub use retriever::{HybridRetriever, MatchReason, SearchResult};
pub use service::{Failure, MemoryService, Operation};
pub use store::{InMemoryStore, RocksStore, StoreStats, VectorStore};
