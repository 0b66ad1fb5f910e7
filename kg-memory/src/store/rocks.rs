//! RocksDB-backed store
//!
//! Persistent storage for entities and relations using RocksDB with LZ4
//! compression. Key layout:
//!
//! - `entity:{id}` → bincode [`Entity`]
//! - `name:{name}` → entity id
//! - `relation:{id}` → bincode [`Relation`]
//! - `out:{source}:{relation}` / `in:{target}:{relation}` → adjacency markers
//! - `_seq:entity`, `_seq:relation`, `_dimension` → little-endian u64 counters
//!
//! Ids are zero-padded so prefix scans return relations in creation order.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, WriteOptions, DB};

use super::index::{VectorIndex, DEFAULT_EXACT_CUTOFF};
use super::{
    check_dimension, check_query_dimension, EntityWrite, Neighbor, NewRelation, StoreStats,
    VectorStore, WriteOutcome,
};
use crate::entity::{Entity, EntityId, Relation, RelationId};
use crate::error::{MemoryError, Result};

const ENTITY_SEQ_KEY: &[u8] = b"_seq:entity";
const RELATION_SEQ_KEY: &[u8] = b"_seq:relation";
const DIMENSION_KEY: &[u8] = b"_dimension";

fn entity_key(id: EntityId) -> String {
    format!("entity:{:020}", id.0)
}

fn name_key(name: &str) -> String {
    format!("name:{}", name)
}

fn relation_key(id: RelationId) -> String {
    format!("relation:{:020}", id.0)
}

fn outgoing_prefix(id: EntityId) -> String {
    format!("out:{:020}:", id.0)
}

fn incoming_prefix(id: EntityId) -> String {
    format!("in:{:020}:", id.0)
}

fn decode_u64(bytes: &[u8]) -> Result<u64> {
    let array: [u8; 8] = bytes
        .try_into()
        .map_err(|_| MemoryError::other("Corrupt counter value"))?;
    Ok(u64::from_le_bytes(array))
}

/// Counters mutated only while holding the write lock. Readers never take
/// it; they see the dimension through `RocksStore::dimension`.
struct WriteState {
    last_entity_id: u64,
    last_relation_id: u64,
    dimension: Option<usize>,
}

/// RocksDB-based entity store with an in-memory vector index
pub struct RocksStore {
    db: DB,
    index: VectorIndex,
    write_state: Mutex<WriteState>,
    relation_count: AtomicUsize,
    /// Published copy of the stored dimension, 0 until the first write
    dimension: AtomicUsize,
}

impl RocksStore {
    /// Open (or create) a store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_cutoff(path, DEFAULT_EXACT_CUTOFF)
    }

    /// Open a store, switching from exact scan to HNSW above `exact_cutoff` entities
    pub fn open_with_cutoff(path: impl AsRef<Path>, exact_cutoff: usize) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_background_jobs(2);
        opts.set_bytes_per_sync(1048576); // 1MB
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path)?;
        super::schema::ensure_current(&db)?;

        let read_counter = |key: &[u8]| -> Result<u64> {
            match db.get(key)? {
                Some(bytes) => decode_u64(&bytes),
                None => Ok(0),
            }
        };
        let last_entity_id = read_counter(ENTITY_SEQ_KEY)?;
        let last_relation_id = read_counter(RELATION_SEQ_KEY)?;
        let dimension = match db.get(DIMENSION_KEY)? {
            Some(bytes) => Some(decode_u64(&bytes)? as usize),
            None => None,
        };

        log::info!("RocksStore opened at: {}", path.display());

        let store = Self {
            db,
            index: VectorIndex::new(exact_cutoff),
            write_state: Mutex::new(WriteState {
                last_entity_id,
                last_relation_id,
                dimension,
            }),
            relation_count: AtomicUsize::new(0),
            dimension: AtomicUsize::new(dimension.unwrap_or(0)),
        };

        store.load_cache()?;
        Ok(store)
    }

    /// Load vectors and relation count on startup
    fn load_cache(&self) -> Result<()> {
        let mut entities = 0;
        let mut skipped = 0;

        for item in self.prefix_scan("entity:") {
            let (key, value) = item?;
            match bincode::deserialize::<Entity>(&value) {
                Ok(entity) => {
                    self.index.upsert(entity.id, entity.embedding);
                    entities += 1;
                }
                Err(e) => {
                    log::warn!(
                        "Failed to deserialize {}: {}. Skipping.",
                        String::from_utf8_lossy(&key),
                        e
                    );
                    skipped += 1;
                }
            }
        }

        let mut relations = 0;
        for item in self.prefix_scan("relation:") {
            item?;
            relations += 1;
        }
        self.relation_count.store(relations, Ordering::Release);

        if entities > 0 || relations > 0 {
            log::info!("Loaded {} entities and {} relations from disk", entities, relations);
        }
        if skipped > 0 {
            log::warn!("Skipped {} entities due to deserialization errors", skipped);
        }

        Ok(())
    }

    /// Iterate all key/value pairs under `prefix`
    fn prefix_scan<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = Result<(Box<[u8]>, Box<[u8]>)>> + 'a {
        self.db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward))
            .take_while(move |item| match item {
                Ok((key, _)) => key.starts_with(prefix.as_bytes()),
                Err(_) => true,
            })
            .map(|item| item.map_err(MemoryError::from))
    }

    fn get_entity(&self, id: EntityId) -> Result<Option<Entity>> {
        match self.db.get(entity_key(id).as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn get_relation(&self, id: RelationId) -> Result<Option<Relation>> {
        match self.db.get(relation_key(id).as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Relations listed under an adjacency prefix
    fn adjacent(&self, prefix: &str) -> Result<Vec<Relation>> {
        let mut relations = Vec::new();
        for item in self.prefix_scan(prefix) {
            let (key, _) = item?;
            let relation_id = std::str::from_utf8(&key[prefix.len()..])
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .ok_or_else(|| MemoryError::other("Corrupt adjacency key"))?;
            match self.get_relation(RelationId(relation_id))? {
                Some(relation) => relations.push(relation),
                None => log::warn!("Adjacency entry points at missing relation {}", relation_id),
            }
        }
        Ok(relations)
    }

    fn stored_dimension(&self) -> Option<usize> {
        match self.dimension.load(Ordering::Acquire) {
            0 => None,
            n => Some(n),
        }
    }

    fn commit(&self, batch: WriteBatch) -> Result<()> {
        let mut opts = WriteOptions::default();
        opts.set_sync(true);
        self.db.write_opt(batch, &opts)?;
        Ok(())
    }

    fn insert_entity(
        &self,
        state: &mut WriteState,
        name: String,
        entity_type: String,
        content: Vec<String>,
        embedding: Vec<f32>,
    ) -> Result<WriteOutcome> {
        if self.db.get(name_key(&name).as_bytes())?.is_some() {
            return Ok(WriteOutcome::Conflict);
        }

        let now = Utc::now();
        let id = EntityId(state.last_entity_id + 1);
        let entity = Entity {
            id,
            name,
            entity_type,
            content,
            embedding,
            revision: 1,
            created_at: now,
            updated_at: now,
        };

        let mut batch = WriteBatch::default();
        batch.put(entity_key(id).as_bytes(), bincode::serialize(&entity)?);
        batch.put(name_key(&entity.name).as_bytes(), id.0.to_le_bytes());
        batch.put(ENTITY_SEQ_KEY, id.0.to_le_bytes());
        batch.put(DIMENSION_KEY, (entity.embedding.len() as u64).to_le_bytes());
        self.commit(batch)?;

        state.last_entity_id = id.0;
        self.index.upsert(id, entity.embedding.clone());
        Ok(WriteOutcome::Written(entity))
    }

    fn update_entity(
        &self,
        id: EntityId,
        expected_revision: u64,
        entity_type: String,
        content: Vec<String>,
        embedding: Vec<f32>,
    ) -> Result<WriteOutcome> {
        let current = match self.get_entity(id)? {
            Some(entity) if entity.revision == expected_revision => entity,
            _ => return Ok(WriteOutcome::Conflict),
        };

        let entity = Entity {
            entity_type,
            content,
            embedding,
            revision: current.revision + 1,
            updated_at: Utc::now(),
            ..current
        };

        let mut batch = WriteBatch::default();
        batch.put(entity_key(id).as_bytes(), bincode::serialize(&entity)?);
        self.commit(batch)?;

        self.index.upsert(id, entity.embedding.clone());
        Ok(WriteOutcome::Written(entity))
    }
}

#[async_trait]
impl VectorStore for RocksStore {
    async fn entity_by_name(&self, name: &str) -> Result<Option<Entity>> {
        match self.db.get(name_key(name).as_bytes())? {
            Some(bytes) => self.get_entity(EntityId(decode_u64(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn entity(&self, id: EntityId) -> Result<Option<Entity>> {
        self.get_entity(id)
    }

    async fn write_entity(&self, write: EntityWrite) -> Result<WriteOutcome> {
        let started = Instant::now();
        let mut state = self.write_state.lock();
        let mut dimension = state.dimension;
        check_dimension(&mut dimension, write.embedding().len())?;

        let outcome = match write {
            EntityWrite::Insert {
                name,
                entity_type,
                content,
                embedding,
            } => self.insert_entity(&mut state, name, entity_type, content, embedding)?,
            EntityWrite::Update {
                id,
                expected_revision,
                entity_type,
                content,
                embedding,
            } => self.update_entity(id, expected_revision, entity_type, content, embedding)?,
        };

        if matches!(outcome, WriteOutcome::Written(_)) {
            state.dimension = dimension;
            self.dimension
                .store(dimension.unwrap_or(0), Ordering::Release);
        }
        log::debug!("Entity write took {:.3}s", started.elapsed().as_secs_f64());
        Ok(outcome)
    }

    async fn insert_relation(&self, relation: NewRelation) -> Result<Relation> {
        let mut state = self.write_state.lock();

        for endpoint in [relation.source_entity_id, relation.target_entity_id] {
            if self.db.get(entity_key(endpoint).as_bytes())?.is_none() {
                return Err(MemoryError::DanglingReference(endpoint));
            }
        }

        let id = RelationId(state.last_relation_id + 1);
        let relation = Relation {
            id,
            source_entity_id: relation.source_entity_id,
            target_entity_id: relation.target_entity_id,
            relation_type: relation.relation_type,
            created_at: Utc::now(),
        };

        let mut batch = WriteBatch::default();
        batch.put(relation_key(id).as_bytes(), bincode::serialize(&relation)?);
        batch.put(
            format!("{}{:020}", outgoing_prefix(relation.source_entity_id), id.0).as_bytes(),
            b"",
        );
        batch.put(
            format!("{}{:020}", incoming_prefix(relation.target_entity_id), id.0).as_bytes(),
            b"",
        );
        batch.put(RELATION_SEQ_KEY, id.0.to_le_bytes());
        self.commit(batch)?;

        state.last_relation_id = id.0;
        self.relation_count.fetch_add(1, Ordering::AcqRel);
        Ok(relation)
    }

    async fn relations_from(&self, id: EntityId) -> Result<Vec<Relation>> {
        self.adjacent(&outgoing_prefix(id))
    }

    async fn relations_to(&self, id: EntityId) -> Result<Vec<Relation>> {
        self.adjacent(&incoming_prefix(id))
    }

    async fn nearest(
        &self,
        vector: &[f32],
        limit: usize,
        max_distance: f32,
    ) -> Result<Vec<Neighbor>> {
        check_query_dimension(self.stored_dimension(), vector.len())?;
        Ok(self.index.nearest(vector, limit, max_distance))
    }

    async fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            entities: self.index.len(),
            relations: self.relation_count.load(Ordering::Acquire),
            dimension: self.stored_dimension(),
        })
    }
}
