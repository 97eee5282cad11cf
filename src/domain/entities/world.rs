//! World - aggregate root owning every other entity

use crate::domain::catalog::Catalog;
use crate::domain::entities::typed::{descriptor_of, typed_entity};
use crate::domain::entities::{EntityRecord, TypedEntity};
use crate::domain::errors::ValidationError;
use crate::domain::value_objects::{EntityId, FieldValue, TenantId};

typed_entity! {
    /// A world belonging to one tenant
    World => "World"
}

impl World {
    pub fn new(
        catalog: &Catalog,
        tenant_id: TenantId,
        name: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let descriptor = descriptor_of(catalog, Self::ENTITY_TYPE)?;
        let record = EntityRecord::new(
            descriptor,
            tenant_id,
            None,
            [("name", FieldValue::Text(name.into()))],
        )?;
        Ok(Self(record))
    }

    /// The id dependents must carry as their `world_id`
    pub fn world_id(&self) -> Option<EntityId> {
        self.id()
    }

    pub fn genre(&self) -> Option<&str> {
        self.0.text("genre")
    }

    pub fn set_genre(&mut self, genre: impl Into<String>) -> Result<(), ValidationError> {
        self.0.set("genre", genre.into())
    }

    pub fn current_year(&self) -> Option<i64> {
        self.0.integer("current_year")
    }

    pub fn set_current_year(&mut self, year: i64) -> Result<(), ValidationError> {
        self.0.set("current_year", year)
    }

    pub fn settings(&self) -> Option<&serde_json::Value> {
        self.0.json("settings")
    }

    pub fn set_settings(&mut self, settings: serde_json::Value) -> Result<(), ValidationError> {
        self.0.set("settings", settings)
    }
}
