//! Domain error types

use thiserror::Error;

use crate::domain::catalog::FieldKind;

/// An entity-level invariant was violated while constructing or mutating a
/// record. Raised by the entity itself; storage backends never produce it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{entity_type} has no field {field:?}")]
    UnknownField { entity_type: String, field: String },

    #[error("{entity_type}.{field} expects {expected}, got {found}")]
    TypeMismatch {
        entity_type: String,
        field: String,
        expected: FieldKind,
        found: FieldKind,
    },

    #[error("{entity_type}.{field} is required")]
    MissingRequired { entity_type: String, field: String },

    #[error("{entity_type}.{field} must be between {min:?} and {max:?}, got {value}")]
    OutOfRange {
        entity_type: String,
        field: String,
        value: f64,
        min: Option<f64>,
        max: Option<f64>,
    },

    #[error("{entity_type}.{field} exceeds {max_length} characters")]
    TooLong {
        entity_type: String,
        field: String,
        max_length: usize,
    },

    #[error("{entity_type}.{field} must be one of {allowed:?}, got {value:?}")]
    NotAllowed {
        entity_type: String,
        field: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("{entity_type}.{field} must be a finite number")]
    NotFinite { entity_type: String, field: String },

    #[error("{entity_type}.{field} year {year} is outside 0000-9999")]
    YearOutOfRange {
        entity_type: String,
        field: String,
        year: i32,
    },

    #[error("{entity_type}: {reason}")]
    Ownership { entity_type: String, reason: String },

    #[error("Entity type {0} is not in the catalog")]
    UnknownEntityType(String),

    #[error("Expected a {expected} record, got {found}")]
    WrongEntityType { expected: String, found: String },
}
