//! Entity DTOs - raw JSON arguments in, JSON records out
//!
//! The dispatch layer receives untyped arguments keyed by field name. Values
//! are coerced by the declared field kind before the record validates them.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::catalog::{Catalog, EntityDescriptor, FieldKind};
use crate::domain::entities::EntityRecord;
use crate::domain::errors::ValidationError;
use crate::domain::value_objects::{EntityId, FieldValue, TenantId};

#[derive(Debug, thiserror::Error)]
pub enum DtoError {
    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),

    #[error("{entity_type}.{field} expects {expected}, got {value}")]
    Coercion {
        entity_type: String,
        field: String,
        expected: FieldKind,
        value: Value,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Arguments for creating a new entity
#[derive(Debug, Clone, Deserialize)]
pub struct CreateEntityRequestDto {
    pub entity_type: String,
    pub tenant_id: TenantId,
    #[serde(default)]
    pub world_id: Option<EntityId>,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl CreateEntityRequestDto {
    /// Build an unpersisted record ready for `save`
    pub fn into_record(self, catalog: &Catalog) -> Result<EntityRecord, DtoError> {
        let descriptor = catalog
            .get(&self.entity_type)
            .cloned()
            .ok_or_else(|| DtoError::UnknownEntityType(self.entity_type.clone()))?;
        let fields = coerce_fields(&descriptor, self.fields)?;
        let record = EntityRecord::new(descriptor, self.tenant_id, self.world_id, fields)?;
        Ok(record)
    }
}

/// Field changes for an entity already read through `find_by_id`.
///
/// A `null` clears an optional field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateEntityRequestDto {
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl UpdateEntityRequestDto {
    pub fn apply_to(self, record: &mut EntityRecord) -> Result<(), DtoError> {
        let descriptor = record.descriptor().clone();
        for (name, value) in self.fields {
            if value.is_null() {
                record.clear(&name)?;
                continue;
            }
            let value = coerce(&descriptor, &name, value)?;
            record.set(&name, value)?;
        }
        Ok(())
    }
}

/// A stored entity as the dispatch layer returns it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityResponseDto {
    pub entity_type: String,
    pub id: Option<EntityId>,
    pub tenant_id: TenantId,
    pub world_id: Option<EntityId>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: u64,
    pub fields: Map<String, Value>,
}

impl From<&EntityRecord> for EntityResponseDto {
    fn from(record: &EntityRecord) -> Self {
        let envelope = record.envelope();
        Self {
            entity_type: record.entity_type().to_string(),
            id: envelope.id(),
            tenant_id: envelope.tenant_id(),
            world_id: envelope.world_id(),
            created_at: envelope.created_at(),
            updated_at: envelope.updated_at(),
            version: envelope.version(),
            fields: record
                .fields()
                .iter()
                .map(|(name, value)| (name.clone(), to_json(value)))
                .collect(),
        }
    }
}

fn coerce_fields(
    descriptor: &Arc<EntityDescriptor>,
    raw: Map<String, Value>,
) -> Result<BTreeMap<String, FieldValue>, DtoError> {
    raw.into_iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(name, value)| {
            let value = coerce(descriptor, &name, value)?;
            Ok((name, value))
        })
        .collect()
}

fn coerce(descriptor: &EntityDescriptor, name: &str, value: Value) -> Result<FieldValue, DtoError> {
    let spec = descriptor
        .field(name)
        .ok_or_else(|| ValidationError::UnknownField {
            entity_type: descriptor.name().to_string(),
            field: name.to_string(),
        })?;

    let coerced = match (spec.kind, &value) {
        (FieldKind::Text, Value::String(s)) => Some(FieldValue::Text(s.clone())),
        (FieldKind::Integer, Value::Number(n)) => n.as_i64().map(FieldValue::Integer),
        (FieldKind::Real, Value::Number(n)) => n.as_f64().map(FieldValue::Real),
        (FieldKind::Boolean, Value::Bool(b)) => Some(FieldValue::Boolean(*b)),
        (FieldKind::Timestamp, Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|ts| FieldValue::Timestamp(ts.with_timezone(&Utc))),
        (FieldKind::Json, _) => Some(FieldValue::Json(value.clone())),
        _ => None,
    };

    coerced.ok_or_else(|| DtoError::Coercion {
        entity_type: descriptor.name().to_string(),
        field: name.to_string(),
        expected: spec.kind,
        value,
    })
}

fn to_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::Text(s) => Value::String(s.clone()),
        FieldValue::Integer(i) => Value::from(*i),
        FieldValue::Real(r) => serde_json::Number::from_f64(*r)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        FieldValue::Boolean(b) => Value::Bool(*b),
        FieldValue::Timestamp(ts) => Value::String(ts.to_rfc3339()),
        FieldValue::Json(v) => v.clone(),
    }
}
