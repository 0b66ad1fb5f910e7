//! Entity upsert with fact merging
//!
//! Upserts of one name are serialized by a per-name async lock held across
//! read, merge, embed and write. The write itself is still conditional on the
//! revision that was read, so a writer outside this merger forces a fresh
//! read instead of losing facts.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;

use crate::embedding::Embedder;
use crate::entity::{embedding_text, EntityId};
use crate::error::{MemoryError, Result};
use crate::store::{EntityWrite, VectorStore, WriteOutcome};

/// Outcome of an upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Upserted {
    pub id: EntityId,
    /// True when the call created the entity, false when it merged
    pub created: bool,
    /// Number of facts stored after the merge
    pub fact_count: usize,
}

type NameLocks = DashMap<String, Arc<AsyncMutex<()>>>;

/// Shared handle on one name's lock; the map entry goes away with the last lease
struct NameLease<'a> {
    locks: &'a NameLocks,
    name: &'a str,
    lock: Arc<AsyncMutex<()>>,
}

impl<'a> NameLease<'a> {
    fn acquire(locks: &'a NameLocks, name: &'a str) -> Self {
        let lock = Arc::clone(locks.entry(name.to_string()).or_default().value());
        Self { locks, name, lock }
    }
}

impl Drop for NameLease<'_> {
    fn drop(&mut self) {
        // Held by the map and this lease only. Cloning out of the map needs
        // the shard lock that `remove_if` holds, so the count cannot race.
        self.locks
            .remove_if(self.name, |_, lock| Arc::strong_count(lock) == 2);
    }
}

/// Implements upsert-with-merge on top of conditional store writes
pub struct EntityMerger {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    max_attempts: usize,
    name_locks: NameLocks,
}

impl EntityMerger {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        max_attempts: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            max_attempts: max_attempts.max(1),
            name_locks: DashMap::new(),
        }
    }

    /// Create `name` with `new_facts`, or append them to its existing facts.
    ///
    /// `entity_type` is last-write-wins. The embedding is always recomputed
    /// from the full merged content.
    pub async fn upsert(
        &self,
        name: &str,
        entity_type: &str,
        new_facts: &[String],
    ) -> Result<Upserted> {
        if new_facts.is_empty() {
            return Err(MemoryError::validation("content must contain at least one fact"));
        }

        let started = Instant::now();

        let lease = NameLease::acquire(&self.name_locks, name);
        let _serialized = lease.lock.lock().await;

        for attempt in 1..=self.max_attempts {
            let current = self.store.entity_by_name(name).await?;

            let (content, base) = match current {
                Some(existing) => {
                    let mut content = existing.content;
                    content.extend_from_slice(new_facts);
                    (content, Some((existing.id, existing.revision)))
                }
                None => (new_facts.to_vec(), None),
            };

            let embedding = self
                .embedder
                .encode(&embedding_text(name, entity_type, &content))
                .await?;

            let write = match base {
                Some((id, revision)) => EntityWrite::Update {
                    id,
                    expected_revision: revision,
                    entity_type: entity_type.to_string(),
                    content,
                    embedding,
                },
                None => EntityWrite::Insert {
                    name: name.to_string(),
                    entity_type: entity_type.to_string(),
                    content,
                    embedding,
                },
            };

            match self.store.write_entity(write).await? {
                WriteOutcome::Written(entity) => {
                    log::debug!(
                        "{} entity '{}' (id {}, {} facts) in {:.3}s",
                        if base.is_none() { "Inserted" } else { "Merged" },
                        name,
                        entity.id,
                        entity.content.len(),
                        started.elapsed().as_secs_f64()
                    );
                    return Ok(Upserted {
                        id: entity.id,
                        created: base.is_none(),
                        fact_count: entity.content.len(),
                    });
                }
                WriteOutcome::Conflict => {
                    log::debug!("Write conflict on '{}' (attempt {}), retrying", name, attempt);
                }
            }
        }

        log::warn!(
            "Giving up on '{}' after {} conflicting attempts",
            name,
            self.max_attempts
        );
        Err(MemoryError::WriteConflict {
            name: name.to_string(),
            attempts: self.max_attempts,
        })
    }
}
