//! Faction - an organized group competing for influence

use crate::domain::catalog::Catalog;
use crate::domain::entities::typed::{descriptor_of, typed_entity};
use crate::domain::entities::{EntityRecord, TypedEntity};
use crate::domain::errors::ValidationError;
use crate::domain::value_objects::{EntityId, FieldValue, TenantId};

typed_entity! {
    Faction => "Faction"
}

impl Faction {
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

    /// Influence on a 0..=100 scale
    pub fn influence(&self) -> Option<i64> {
        self.0.integer("influence")
    }

    pub fn set_influence(&mut self, influence: i64) -> Result<(), ValidationError> {
        self.0.set("influence", influence)
    }

    pub fn motto(&self) -> Option<&str> {
        self.0.text("motto")
    }

    pub fn set_motto(&mut self, motto: impl Into<String>) -> Result<(), ValidationError> {
        self.0.set("motto", motto.into())
    }

    pub fn founded_year(&self) -> Option<i64> {
        self.0.integer("founded_year")
    }

    pub fn set_founded_year(&mut self, year: i64) -> Result<(), ValidationError> {
        self.0.set("founded_year", year)
    }

    pub fn treasury(&self) -> Option<f64> {
        self.0.real("treasury")
    }

    pub fn set_treasury(&mut self, treasury: f64) -> Result<(), ValidationError> {
        self.0.set("treasury", treasury)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_faction_treasury_and_influence() {
        let catalog = Catalog::embedded().unwrap();
        let mut guild =
            Faction::new(&catalog, TenantId::new(), EntityId::from_raw(9), "Gilded Hand").unwrap();

        guild.set_treasury(2500.5).unwrap();
        guild.set_influence(40).unwrap();
        assert_eq!(guild.treasury(), Some(2500.5));
        assert_eq!(guild.influence(), Some(40));

        assert!(guild.set_treasury(-1.0).is_err());
        assert!(guild.set_influence(150).is_err());
        assert_eq!(guild.treasury(), Some(2500.5));
    }
}
