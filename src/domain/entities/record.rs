//! Entity record - the single generic representation of every entity type
//!
//! A record pairs an [`EntityDescriptor`] with an [`Envelope`] and a map of
//! domain field values. Construction and every mutation run the descriptor's
//! constraints, so a record that exists is valid; backends store and load
//! records without re-checking domain rules.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};

use crate::domain::aggregates::AggregateGuard;
use crate::domain::catalog::{EntityDescriptor, FieldSpec};
use crate::domain::entities::Envelope;
use crate::domain::errors::ValidationError;
use crate::domain::value_objects::{EntityId, FieldValue, TenantId};

/// A validated entity of any cataloged type
#[derive(Debug, Clone)]
pub struct EntityRecord {
    descriptor: Arc<EntityDescriptor>,
    envelope: Envelope,
    fields: BTreeMap<String, FieldValue>,
}

impl EntityRecord {
    /// Build an unpersisted record owned by `tenant_id` (and `world_id` for
    /// every type except World).
    pub fn new<K, V>(
        descriptor: Arc<EntityDescriptor>,
        tenant_id: TenantId,
        world_id: Option<EntityId>,
        fields: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Self, ValidationError>
    where
        K: Into<String>,
        V: Into<FieldValue>,
    {
        AggregateGuard::check_ownership(&descriptor, world_id)?;
        let fields = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let envelope = Envelope::unpersisted(tenant_id, world_id);
        Self::validated(descriptor, envelope, fields)
    }

    /// Rebuild a record read back from storage
    pub(crate) fn from_storage(
        descriptor: Arc<EntityDescriptor>,
        envelope: Envelope,
        fields: BTreeMap<String, FieldValue>,
    ) -> Result<Self, ValidationError> {
        AggregateGuard::check_ownership(&descriptor, envelope.world_id())?;
        Self::validated(descriptor, envelope, fields)
    }

    fn validated(
        descriptor: Arc<EntityDescriptor>,
        envelope: Envelope,
        fields: BTreeMap<String, FieldValue>,
    ) -> Result<Self, ValidationError> {
        for (name, value) in &fields {
            let spec = lookup(&descriptor, name)?;
            validate_value(&descriptor, spec, value)?;
        }
        for spec in descriptor.fields().iter().filter(|s| s.required) {
            if !fields.contains_key(&spec.name) {
                return Err(ValidationError::MissingRequired {
                    entity_type: descriptor.name().to_string(),
                    field: spec.name.clone(),
                });
            }
        }
        Ok(Self {
            descriptor,
            envelope,
            fields,
        })
    }

    /// Replace the envelope after a successful save
    pub(crate) fn with_envelope(mut self, envelope: Envelope) -> Self {
        self.envelope = envelope;
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn descriptor(&self) -> &Arc<EntityDescriptor> {
        &self.descriptor
    }

    pub fn entity_type(&self) -> &str {
        self.descriptor.name()
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn id(&self) -> Option<EntityId> {
        self.envelope.id()
    }

    pub fn tenant_id(&self) -> TenantId {
        self.envelope.tenant_id()
    }

    pub fn world_id(&self) -> Option<EntityId> {
        self.envelope.world_id()
    }

    pub fn version(&self) -> u64 {
        self.envelope.version()
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_text)
    }

    pub fn integer(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(FieldValue::as_integer)
    }

    pub fn real(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(FieldValue::as_real)
    }

    pub fn boolean(&self, field: &str) -> Option<bool> {
        self.get(field).and_then(FieldValue::as_boolean)
    }

    pub fn timestamp(&self, field: &str) -> Option<DateTime<Utc>> {
        self.get(field).and_then(FieldValue::as_timestamp)
    }

    pub fn json(&self, field: &str) -> Option<&serde_json::Value> {
        self.get(field).and_then(FieldValue::as_json)
    }

    // ========================================================================
    // Mutators
    // ========================================================================

    /// Set a domain field. The envelope is untouched; the next save bumps
    /// the version.
    pub fn set(&mut self, field: &str, value: impl Into<FieldValue>) -> Result<(), ValidationError> {
        let value = value.into();
        let spec = lookup(&self.descriptor, field)?;
        validate_value(&self.descriptor, spec, &value)?;
        self.fields.insert(spec.name.clone(), value);
        Ok(())
    }

    /// Remove an optional domain field
    pub fn clear(&mut self, field: &str) -> Result<(), ValidationError> {
        let spec = lookup(&self.descriptor, field)?;
        if spec.required {
            return Err(ValidationError::MissingRequired {
                entity_type: self.descriptor.name().to_string(),
                field: spec.name.clone(),
            });
        }
        self.fields.remove(field);
        Ok(())
    }
}

impl PartialEq for EntityRecord {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor.name() == other.descriptor.name()
            && self.envelope == other.envelope
            && self.fields == other.fields
    }
}

fn lookup<'a>(descriptor: &'a EntityDescriptor, field: &str) -> Result<&'a FieldSpec, ValidationError> {
    descriptor
        .field(field)
        .ok_or_else(|| ValidationError::UnknownField {
            entity_type: descriptor.name().to_string(),
            field: field.to_string(),
        })
}

fn validate_value(
    descriptor: &EntityDescriptor,
    spec: &FieldSpec,
    value: &FieldValue,
) -> Result<(), ValidationError> {
    let entity_type = || descriptor.name().to_string();
    let field = || spec.name.clone();

    if value.kind() != spec.kind {
        return Err(ValidationError::TypeMismatch {
            entity_type: entity_type(),
            field: field(),
            expected: spec.kind,
            found: value.kind(),
        });
    }

    match value {
        FieldValue::Text(text) => {
            if spec.required && text.trim().is_empty() {
                return Err(ValidationError::MissingRequired {
                    entity_type: entity_type(),
                    field: field(),
                });
            }
            if let Some(max_length) = spec.max_length {
                if text.chars().count() > max_length {
                    return Err(ValidationError::TooLong {
                        entity_type: entity_type(),
                        field: field(),
                        max_length,
                    });
                }
            }
            if !spec.one_of.is_empty() && !spec.one_of.iter().any(|allowed| allowed == text) {
                return Err(ValidationError::NotAllowed {
                    entity_type: entity_type(),
                    field: field(),
                    value: text.clone(),
                    allowed: spec.one_of.clone(),
                });
            }
        }
        FieldValue::Integer(i) => check_range(descriptor, spec, *i as f64)?,
        FieldValue::Real(r) => {
            if !r.is_finite() {
                return Err(ValidationError::NotFinite {
                    entity_type: entity_type(),
                    field: field(),
                });
            }
            check_range(descriptor, spec, *r)?;
        }
        // RFC 3339 only carries four-digit years
        FieldValue::Timestamp(ts) => {
            if !(0..=9999).contains(&ts.year()) {
                return Err(ValidationError::YearOutOfRange {
                    entity_type: entity_type(),
                    field: field(),
                    year: ts.year(),
                });
            }
        }
        FieldValue::Boolean(_) | FieldValue::Json(_) => {}
    }
    Ok(())
}

fn check_range(descriptor: &EntityDescriptor, spec: &FieldSpec, value: f64) -> Result<(), ValidationError> {
    let below = spec.min.is_some_and(|min| value < min);
    let above = spec.max.is_some_and(|max| value > max);
    if below || above {
        return Err(ValidationError::OutOfRange {
            entity_type: descriptor.name().to_string(),
            field: spec.name.clone(),
            value,
            min: spec.min,
            max: spec.max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::{Catalog, FieldKind};

    fn catalog() -> Catalog {
        Catalog::embedded().expect("embedded catalog")
    }

    fn army(catalog: &Catalog) -> EntityRecord {
        EntityRecord::new(
            catalog.get("Army").unwrap().clone(),
            TenantId::new(),
            Some(EntityId::from_raw(1)),
            [("name", FieldValue::from("Iron Legion")), ("size", FieldValue::from(1000))],
        )
        .expect("valid army")
    }

    #[test]
    fn test_new_record_is_unpersisted() {
        let catalog = catalog();
        let record = army(&catalog);
        assert_eq!(record.id(), None);
        assert_eq!(record.version(), 0);
        assert_eq!(record.envelope().created_at(), None);
        assert_eq!(record.integer("size"), Some(1000));
        assert_eq!(record.text("name"), Some("Iron Legion"));
    }

    #[test]
    fn test_required_fields_enforced() {
        let catalog = catalog();
        let err = EntityRecord::new(
            catalog.get("Army").unwrap().clone(),
            TenantId::new(),
            Some(EntityId::from_raw(1)),
            [("name", FieldValue::from("Iron Legion"))],
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::MissingRequired { ref field, .. } if field == "size"));
    }

    #[test]
    fn test_blank_required_text_rejected() {
        let catalog = catalog();
        let mut record = army(&catalog);
        let err = record.set("name", "   ").unwrap_err();
        assert!(matches!(err, ValidationError::MissingRequired { .. }));
        assert_eq!(record.text("name"), Some("Iron Legion"));
    }

    #[test]
    fn test_type_and_range_checks() {
        let catalog = catalog();
        let mut record = army(&catalog);

        let err = record.set("size", "many").unwrap_err();
        assert!(matches!(
            err,
            ValidationError::TypeMismatch { expected: FieldKind::Integer, found: FieldKind::Text, .. }
        ));

        let err = record.set("size", -5).unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { .. }));

        let err = record.set("morale", 101).unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { .. }));

        record.set("size", 1200).unwrap();
        assert_eq!(record.integer("size"), Some(1200));
    }

    #[test]
    fn test_one_of_and_max_length() {
        let catalog = catalog();
        let mut record = army(&catalog);

        let err = record.set("status", "sleeping").unwrap_err();
        assert!(matches!(err, ValidationError::NotAllowed { .. }));
        record.set("status", "marching").unwrap();

        let err = record.set("commander", "x".repeat(256)).unwrap_err();
        assert!(matches!(err, ValidationError::TooLong { max_length: 255, .. }));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let catalog = catalog();
        let mut record = army(&catalog);
        let err = record.set("dragons", 3).unwrap_err();
        assert!(matches!(err, ValidationError::UnknownField { .. }));
    }

    #[test]
    fn test_clear_optional_but_not_required() {
        let catalog = catalog();
        let mut record = army(&catalog);
        record.set("commander", "Marshal Vey").unwrap();
        record.clear("commander").unwrap();
        assert_eq!(record.get("commander"), None);
        assert!(record.clear("size").is_err());
    }

    #[test]
    fn test_world_record_cannot_have_world_id() {
        let catalog = catalog();
        let err = EntityRecord::new(
            catalog.world().clone(),
            TenantId::new(),
            Some(EntityId::from_raw(7)),
            [("name", "Aerth")],
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::Ownership { .. }));
    }

    #[test]
    fn test_dependent_record_requires_world_id() {
        let catalog = catalog();
        let err = EntityRecord::new(
            catalog.get("Army").unwrap().clone(),
            TenantId::new(),
            None,
            [("name", FieldValue::from("Iron Legion")), ("size", FieldValue::from(10))],
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::Ownership { .. }));
    }

    #[test]
    fn test_non_finite_reals_rejected() {
        let catalog = catalog();
        let mut faction = EntityRecord::new(
            catalog.get("Faction").unwrap().clone(),
            TenantId::new(),
            Some(EntityId::from_raw(1)),
            [("name", "Gilded Hand")],
        )
        .unwrap();
        assert!(matches!(
            faction.set("treasury", f64::NAN).unwrap_err(),
            ValidationError::NotFinite { .. }
        ));
        faction.set("treasury", 12.5).unwrap();
    }

    #[test]
    fn test_timestamps_beyond_four_digit_years_rejected() {
        use chrono::TimeZone;

        let catalog = catalog();
        let mut treaty = EntityRecord::new(
            catalog.get("Treaty").unwrap().clone(),
            TenantId::new(),
            Some(EntityId::from_raw(1)),
            [("name", "Pact of Ash"), ("status", "draft")],
        )
        .unwrap();

        let far_future = Utc.with_ymd_and_hms(12_000, 1, 1, 0, 0, 0).unwrap();
        assert!(matches!(
            treaty.set("signed_on", far_future).unwrap_err(),
            ValidationError::YearOutOfRange { year: 12_000, .. }
        ));
        let before_epoch = Utc.with_ymd_and_hms(-1, 6, 1, 0, 0, 0).unwrap();
        assert!(treaty.set("signed_on", before_epoch).is_err());
        assert_eq!(treaty.get("signed_on"), None);

        let last_day = Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap();
        treaty.set("signed_on", last_day).unwrap();
        assert_eq!(treaty.timestamp("signed_on"), Some(last_day));
    }
}
