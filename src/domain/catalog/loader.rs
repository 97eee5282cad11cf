//! Catalog parsing and load-time validation

use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use super::{
    Catalog, CatalogError, EntityDescriptor, FieldKind, FieldSpec, ENVELOPE_COLUMNS,
    TENANTS_TABLE, WORLDS_TABLE, WORLD_ENTITY,
};

/// SQLite accepts longer names; keeping them short keeps index names legal everywhere.
const MAX_IDENTIFIER_LEN: usize = 63;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    world: WorldSection,
    #[serde(default)]
    entity: Vec<EntitySection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WorldSection {
    #[serde(default)]
    fields: Vec<FieldSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EntitySection {
    name: String,
    table: String,
    #[serde(default)]
    fields: Vec<FieldSpec>,
}

pub(super) fn parse(source: &str) -> Result<Catalog, CatalogError> {
    let file: CatalogFile = toml::from_str(source)?;

    validate_fields(WORLD_ENTITY, &file.world.fields)?;
    let world = EntityDescriptor::new(WORLD_ENTITY, WORLDS_TABLE, true, file.world.fields);

    let mut names: HashSet<String> = HashSet::from([WORLD_ENTITY.to_string()]);
    let mut tables: HashMap<String, String> = HashMap::new();
    let mut entities = Vec::with_capacity(file.entity.len());

    for section in file.entity {
        if !is_type_name(&section.name) {
            return Err(CatalogError::InvalidEntityName(section.name));
        }
        if !names.insert(section.name.clone()) {
            return Err(CatalogError::DuplicateEntity(section.name));
        }
        if !is_identifier(&section.table) {
            return Err(CatalogError::InvalidIdentifier {
                entity_type: section.name,
                identifier: section.table,
            });
        }
        if section.table == WORLDS_TABLE || section.table == TENANTS_TABLE {
            return Err(CatalogError::ReservedTable {
                entity_type: section.name,
                table: section.table,
            });
        }
        if let Some(first) = tables.get(&section.table) {
            return Err(CatalogError::DuplicateTable {
                table: section.table.clone(),
                first: first.clone(),
                second: section.name,
            });
        }
        validate_fields(&section.name, &section.fields)?;

        tables.insert(section.table.clone(), section.name.clone());
        entities.push(EntityDescriptor::new(
            section.name,
            section.table,
            false,
            section.fields,
        ));
    }

    Ok(Catalog::from_descriptors(world, entities))
}

fn validate_fields(entity_type: &str, fields: &[FieldSpec]) -> Result<(), CatalogError> {
    let mut seen = HashSet::new();
    for field in fields {
        let invalid = |reason: &str| CatalogError::InvalidConstraint {
            entity_type: entity_type.to_string(),
            field: field.name.clone(),
            reason: reason.to_string(),
        };

        if !is_identifier(&field.name) {
            return Err(CatalogError::InvalidIdentifier {
                entity_type: entity_type.to_string(),
                identifier: field.name.clone(),
            });
        }
        if ENVELOPE_COLUMNS.contains(&field.name.as_str()) {
            return Err(CatalogError::ReservedColumn {
                entity_type: entity_type.to_string(),
                field: field.name.clone(),
            });
        }
        if !seen.insert(field.name.as_str()) {
            return Err(CatalogError::DuplicateField {
                entity_type: entity_type.to_string(),
                field: field.name.clone(),
            });
        }

        if (field.min.is_some() || field.max.is_some()) && !field.kind.is_numeric() {
            return Err(invalid("min/max apply only to numeric fields"));
        }
        if let (Some(min), Some(max)) = (field.min, field.max) {
            if min > max {
                return Err(invalid("min exceeds max"));
            }
        }
        if field.max_length.is_some() && field.kind != FieldKind::Text {
            return Err(invalid("max_length applies only to text fields"));
        }
        if !field.one_of.is_empty() && field.kind != FieldKind::Text {
            return Err(invalid("one_of applies only to text fields"));
        }
        if field.unique && !matches!(field.kind, FieldKind::Text | FieldKind::Integer) {
            return Err(invalid("unique applies only to text or integer fields"));
        }
    }
    Ok(())
}

/// Lowercase SQL-safe identifier: `[a-z][a-z0-9_]*`
fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && s.len() <= MAX_IDENTIFIER_LEN
}

/// PascalCase type name: `[A-Z][A-Za-z0-9]*`
fn is_type_name(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_alphanumeric())
}
