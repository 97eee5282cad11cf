//! Error types for repository operations

use crate::domain::value_objects::EntityId;

/// Repository operation errors with context for debugging.
///
/// Backends return these untranslated; the dispatch layer maps them onto its
/// own error surface.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// A referenced entity, world or tenant does not exist (or is not visible
    /// to the calling tenant).
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    /// A uniqueness constraint rejected the write.
    #[error("Duplicate {entity_type}: {detail}")]
    Duplicate { entity_type: String, detail: String },

    /// The stored version moved on since the caller read the entity.
    #[error("Concurrency conflict on {entity_type} {id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        entity_type: String,
        id: EntityId,
        expected: u64,
        actual: u64,
    },

    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),

    /// A record of one type was handed to the repository of another.
    #[error("Repository for {expected} received a {found} record")]
    TypeMismatch { expected: String, found: String },

    /// Database operation failed - includes operation name for tracing.
    #[error("Database error in {operation}: {message}")]
    Database {
        operation: &'static str,
        message: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RepoError {
    pub fn not_found(entity_type: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    pub fn duplicate(entity_type: impl Into<String>, detail: impl ToString) -> Self {
        Self::Duplicate {
            entity_type: entity_type.into(),
            detail: detail.to_string(),
        }
    }

    /// Create a Database error with operation context.
    pub fn database(operation: &'static str, message: impl ToString) -> Self {
        Self::Database {
            operation,
            message: message.to_string(),
        }
    }

    pub fn serialization(message: impl ToString) -> Self {
        Self::Serialization(message.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}
