//! Typed entity facades over `EntityRecord`

use std::sync::Arc;

use crate::domain::catalog::{Catalog, EntityDescriptor};
use crate::domain::entities::EntityRecord;
use crate::domain::errors::ValidationError;

/// A compile-time view of one cataloged entity type.
///
/// The record stays the source of truth; a facade only adds typed accessors.
pub trait TypedEntity: Sized {
    /// Catalog name of the wrapped type
    const ENTITY_TYPE: &'static str;

    /// Wrap a record, rejecting records of any other type
    fn from_record(record: EntityRecord) -> Result<Self, ValidationError>;

    fn record(&self) -> &EntityRecord;

    fn into_record(self) -> EntityRecord;
}

/// Resolve the descriptor for `entity_type` or fail with `UnknownEntityType`.
pub(crate) fn descriptor_of(
    catalog: &Catalog,
    entity_type: &str,
) -> Result<Arc<EntityDescriptor>, ValidationError> {
    catalog
        .get(entity_type)
        .cloned()
        .ok_or_else(|| ValidationError::UnknownEntityType(entity_type.to_string()))
}

/// Shared plumbing for a typed facade: the newtype, `TypedEntity`, envelope
/// accessors and the `name`/`description` fields every facade carries.
macro_rules! typed_entity {
    ($(#[$meta:meta])* $ty:ident => $entity_type:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $ty($crate::domain::entities::EntityRecord);

        impl $crate::domain::entities::TypedEntity for $ty {
            const ENTITY_TYPE: &'static str = $entity_type;

            fn from_record(
                record: $crate::domain::entities::EntityRecord,
            ) -> Result<Self, $crate::domain::errors::ValidationError> {
                if record.entity_type() != $entity_type {
                    return Err($crate::domain::errors::ValidationError::WrongEntityType {
                        expected: $entity_type.to_string(),
                        found: record.entity_type().to_string(),
                    });
                }
                Ok(Self(record))
            }

            fn record(&self) -> &$crate::domain::entities::EntityRecord {
                &self.0
            }

            fn into_record(self) -> $crate::domain::entities::EntityRecord {
                self.0
            }
        }

        impl From<$ty> for $crate::domain::entities::EntityRecord {
            fn from(entity: $ty) -> Self {
                entity.0
            }
        }

        impl $ty {
            pub fn id(&self) -> Option<$crate::domain::value_objects::EntityId> {
                self.0.id()
            }

            pub fn tenant_id(&self) -> $crate::domain::value_objects::TenantId {
                self.0.tenant_id()
            }

            pub fn envelope(&self) -> &$crate::domain::entities::Envelope {
                self.0.envelope()
            }

            pub fn version(&self) -> u64 {
                self.0.version()
            }

            pub fn name(&self) -> &str {
                self.0.text("name").unwrap_or_default()
            }

            pub fn set_name(
                &mut self,
                name: impl Into<String>,
            ) -> Result<(), $crate::domain::errors::ValidationError> {
                self.0.set("name", name.into())
            }

            pub fn description(&self) -> Option<&str> {
                self.0.text("description")
            }

            pub fn set_description(
                &mut self,
                description: Option<String>,
            ) -> Result<(), $crate::domain::errors::ValidationError> {
                match description {
                    Some(text) => self.0.set("description", text),
                    None => self.0.clear("description"),
                }
            }
        }
    };
}

pub(crate) use typed_entity;
