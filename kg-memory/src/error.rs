//! Error types for kg-memory

use serde::Serialize;
use thiserror::Error;

use crate::entity::EntityId;

/// Errors that can occur in the memory system
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Missing or malformed input, rejected before any side effect
    #[error("Validation error: {0}")]
    Validation(String),

    /// A relation endpoint does not exist
    #[error("Entity {0} does not exist")]
    DanglingReference(EntityId),

    /// Model loading error
    #[error("Model error: {0}")]
    Model(String),

    /// Embedding generation error
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// RocksDB error
    #[error("Storage error: {0}")]
    Storage(#[from] rocksdb::Error),

    /// Serialization error (bincode)
    #[error("Serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Concurrent writers kept invalidating the merge
    #[error("Write conflict on entity '{name}' after {attempts} attempts")]
    WriteConflict { name: String, attempts: usize },

    /// Embedding length differs from the one the store was created with
    #[error("Embedding dimension mismatch: store holds {expected}d vectors, got {actual}d")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Store layout written by an incompatible version
    #[error("Unsupported schema version: {0}")]
    Schema(u32),

    /// Unknown operation name
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Caller-facing error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    DanglingReference,
    Embedding,
    Storage,
    UnsupportedOperation,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::DanglingReference => "dangling_reference",
            Self::Embedding => "embedding",
            Self::Storage => "storage",
            Self::UnsupportedOperation => "unsupported_operation",
        };
        f.write_str(s)
    }
}

impl MemoryError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a model error
    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    /// Create an embedding error
    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    /// Create an unsupported operation error
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::UnsupportedOperation(operation.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Category reported to callers
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::DanglingReference(_) => ErrorKind::DanglingReference,
            Self::Model(_) | Self::Embedding(_) => ErrorKind::Embedding,
            Self::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
            Self::Storage(_)
            | Self::Bincode(_)
            | Self::Json(_)
            | Self::WriteConflict { .. }
            | Self::DimensionMismatch { .. }
            | Self::Schema(_)
            | Self::Io(_)
            | Self::Other(_) => ErrorKind::Storage,
        }
    }
}

/// Result type for memory operations
pub type Result<T> = std::result::Result<T, MemoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(MemoryError::validation("x").kind(), ErrorKind::Validation);
        assert_eq!(
            MemoryError::DanglingReference(EntityId(7)).kind(),
            ErrorKind::DanglingReference
        );
        assert_eq!(MemoryError::model("gone").kind(), ErrorKind::Embedding);
        assert_eq!(
            MemoryError::WriteConflict {
                name: "X".into(),
                attempts: 3
            }
            .kind(),
            ErrorKind::Storage
        );
        assert_eq!(
            MemoryError::unsupported("drop-table").kind(),
            ErrorKind::UnsupportedOperation
        );
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::DanglingReference).unwrap();
        assert_eq!(json, "\"dangling_reference\"");
        assert_eq!(ErrorKind::UnsupportedOperation.to_string(), "unsupported_operation");
    }

    #[test]
    fn test_dangling_message_names_entity() {
        let err = MemoryError::DanglingReference(EntityId(42));
        assert_eq!(err.to_string(), "Entity 42 does not exist");
    }
}
