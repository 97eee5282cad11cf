//! Army - a standing military force within a world

use crate::domain::catalog::Catalog;
use crate::domain::entities::typed::{descriptor_of, typed_entity};
use crate::domain::entities::{EntityRecord, TypedEntity};
use crate::domain::errors::ValidationError;
use crate::domain::value_objects::{EntityId, FieldValue, TenantId};

typed_entity! {
    /// A military force; `size` is its head count
    Army => "Army"
}

impl Army {
    pub fn new(
        catalog: &Catalog,
        tenant_id: TenantId,
        world_id: EntityId,
        name: impl Into<String>,
        size: i64,
    ) -> Result<Self, ValidationError> {
        let descriptor = descriptor_of(catalog, Self::ENTITY_TYPE)?;
        let record = EntityRecord::new(
            descriptor,
            tenant_id,
            Some(world_id),
            [
                ("name", FieldValue::Text(name.into())),
                ("size", FieldValue::Integer(size)),
            ],
        )?;
        Ok(Self(record))
    }

    pub fn world_id(&self) -> Option<EntityId> {
        self.0.world_id()
    }

    pub fn size(&self) -> i64 {
        self.0.integer("size").unwrap_or_default()
    }

    pub fn set_size(&mut self, size: i64) -> Result<(), ValidationError> {
        self.0.set("size", size)
    }

    pub fn morale(&self) -> Option<i64> {
        self.0.integer("morale")
    }

    pub fn set_morale(&mut self, morale: i64) -> Result<(), ValidationError> {
        self.0.set("morale", morale)
    }

    pub fn status(&self) -> Option<&str> {
        self.0.text("status")
    }

    pub fn set_status(&mut self, status: &str) -> Result<(), ValidationError> {
        self.0.set("status", status)
    }

    pub fn commander(&self) -> Option<&str> {
        self.0.text("commander")
    }

    pub fn set_commander(&mut self, commander: Option<String>) -> Result<(), ValidationError> {
        match commander {
            Some(name) => self.0.set("commander", name),
            None => self.0.clear("commander"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iron_legion() -> Army {
        let catalog = Catalog::embedded().unwrap();
        Army::new(&catalog, TenantId::new(), EntityId::from_raw(1), "Iron Legion", 1000).unwrap()
    }

    #[test]
    fn test_army_fields() {
        let mut army = iron_legion();
        assert_eq!(army.size(), 1000);
        assert_eq!(army.world_id(), Some(EntityId::from_raw(1)));

        army.set_size(1200).unwrap();
        army.set_status("marching").unwrap();
        army.set_commander(Some("Marshal Vey".to_string())).unwrap();
        assert_eq!(army.size(), 1200);
        assert_eq!(army.status(), Some("marching"));

        army.set_commander(None).unwrap();
        assert!(army.commander().is_none());
    }

    #[test]
    fn test_army_rejects_invalid_values() {
        let mut army = iron_legion();
        assert!(matches!(
            army.set_size(-1),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(matches!(
            army.set_morale(101),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(matches!(
            army.set_status("routed"),
            Err(ValidationError::NotAllowed { .. })
        ));
        assert_eq!(army.size(), 1000);
    }

    #[test]
    fn test_from_record_checks_type() {
        let catalog = Catalog::embedded().unwrap();
        let world = crate::domain::entities::World::new(&catalog, TenantId::new(), "Eldoria").unwrap();
        let err = Army::from_record(world.into_record()).unwrap_err();
        assert!(matches!(err, ValidationError::WrongEntityType { .. }));

        let army = Army::from_record(iron_legion().into_record()).unwrap();
        assert_eq!(army.name(), "Iron Legion");
    }
}
