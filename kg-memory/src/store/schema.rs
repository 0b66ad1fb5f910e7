//! On-disk layout versioning
//!
//! Refuses to open stores written by an incompatible layout instead of
//! misreading their records.

use rocksdb::DB;

use crate::error::{MemoryError, Result};

/// Database version stored in metadata
const SCHEMA_VERSION_KEY: &[u8] = b"_schema_version";

/// Current on-disk layout
pub const SCHEMA_VERSION: u32 = 1;

/// Stamp a fresh database or verify the version of an existing one
pub(super) fn ensure_current(db: &DB) -> Result<()> {
    match db.get(SCHEMA_VERSION_KEY)? {
        None => {
            log::debug!("Stamping new store with schema v{}", SCHEMA_VERSION);
            db.put(SCHEMA_VERSION_KEY, SCHEMA_VERSION.to_le_bytes())?;
            Ok(())
        }
        Some(bytes) => {
            let version_bytes: [u8; 4] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| MemoryError::other("Invalid schema version format"))?;
            let version = u32::from_le_bytes(version_bytes);

            log::info!("Store schema version: {} (current: {})", version, SCHEMA_VERSION);

            if version != SCHEMA_VERSION {
                return Err(MemoryError::Schema(version));
            }
            Ok(())
        }
    }
}
