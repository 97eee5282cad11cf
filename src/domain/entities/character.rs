//! Character - a person or creature with an archetype and stat block

use crate::domain::catalog::Catalog;
use crate::domain::entities::typed::{descriptor_of, typed_entity};
use crate::domain::entities::{EntityRecord, TypedEntity};
use crate::domain::errors::ValidationError;
use crate::domain::value_objects::{EntityId, FieldValue, TenantId};

typed_entity! {
    /// A character, player or otherwise, in a world
    Character => "Character"
}

impl Character {
    pub fn new(
        catalog: &Catalog,
        tenant_id: TenantId,
        world_id: EntityId,
        name: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let descriptor = descriptor_of(catalog, Self::ENTITY_TYPE)?;
        let record = EntityRecord::new(
            descriptor,
            tenant_id,
            Some(world_id),
            [("name", FieldValue::Text(name.into()))],
        )?;
        Ok(Self(record))
    }

    pub fn world_id(&self) -> Option<EntityId> {
        self.0.world_id()
    }

    pub fn age(&self) -> Option<i64> {
        self.0.integer("age")
    }

    pub fn set_age(&mut self, age: i64) -> Result<(), ValidationError> {
        self.0.set("age", age)
    }

    pub fn status(&self) -> Option<&str> {
        self.0.text("status")
    }

    pub fn set_status(&mut self, status: &str) -> Result<(), ValidationError> {
        self.0.set("status", status)
    }

    /// Alive unless a status says otherwise
    pub fn is_alive(&self) -> bool {
        !matches!(self.status(), Some("dead"))
    }

    pub fn archetype(&self) -> Option<&str> {
        self.0.text("archetype")
    }

    pub fn set_archetype(&mut self, archetype: impl Into<String>) -> Result<(), ValidationError> {
        self.0.set("archetype", archetype.into())
    }

    pub fn is_player_character(&self) -> bool {
        self.0.boolean("is_player_character").unwrap_or(false)
    }

    pub fn set_player_character(&mut self, is_pc: bool) -> Result<(), ValidationError> {
        self.0.set("is_player_character", is_pc)
    }

    pub fn stats(&self) -> Option<&serde_json::Value> {
        self.0.json("stats")
    }

    pub fn set_stats(&mut self, stats: serde_json::Value) -> Result<(), ValidationError> {
        self.0.set("stats", stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_character_defaults_and_setters() {
        let catalog = Catalog::embedded().unwrap();
        let mut hero =
            Character::new(&catalog, TenantId::new(), EntityId::from_raw(3), "Aria").unwrap();
        assert!(hero.is_alive());
        assert!(!hero.is_player_character());

        hero.set_player_character(true).unwrap();
        hero.set_stats(serde_json::json!({ "str": 14, "dex": 12 })).unwrap();
        hero.set_status("dead").unwrap();
        assert!(hero.is_player_character());
        assert!(!hero.is_alive());
        assert_eq!(hero.stats().unwrap()["str"], 14);
    }

    #[test]
    fn test_character_age_bounds() {
        let catalog = Catalog::embedded().unwrap();
        let mut hero =
            Character::new(&catalog, TenantId::new(), EntityId::from_raw(3), "Aria").unwrap();
        assert!(hero.set_age(-4).is_err());
        hero.set_age(27).unwrap();
        assert_eq!(hero.age(), Some(27));
    }
}
