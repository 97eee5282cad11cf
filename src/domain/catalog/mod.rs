//! Entity catalog - the declarative schema registry
//!
//! Every entity type the system stores is described here as data: a type
//! name, the table it lives in and its domain fields with their constraints.
//! One generic validator (`EntityRecord`) and one generic repository per
//! backend consume these descriptors, so adding a type means adding a
//! catalog entry and nothing else.
//!
//! The World aggregate root is part of the catalog but special-cased: its
//! table is always `worlds` and it carries no `world_id` envelope column.

mod loader;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Type name of the aggregate root.
pub const WORLD_ENTITY: &str = "World";
/// Table holding World rows.
pub const WORLDS_TABLE: &str = "worlds";
/// Table holding registered tenants.
pub const TENANTS_TABLE: &str = "tenants";
/// Envelope columns implied for every table; catalog fields may not reuse them.
pub const ENVELOPE_COLUMNS: [&str; 6] = [
    "id",
    "tenant_id",
    "world_id",
    "created_at",
    "updated_at",
    "version",
];

/// The catalog shipped with the crate.
const EMBEDDED_CATALOG: &str = include_str!("../../../catalog/entities.toml");

/// Storage kind of a domain field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Integer,
    Real,
    Boolean,
    Timestamp,
    Json,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Integer => "integer",
            FieldKind::Real => "real",
            FieldKind::Boolean => "boolean",
            FieldKind::Timestamp => "timestamp",
            FieldKind::Json => "json",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldKind::Integer | FieldKind::Real)
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declaration of one domain field and its construction-time constraints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    /// Must be present; required text must also be non-blank
    #[serde(default)]
    pub required: bool,
    /// Unique within the owning world (within the tenant for World)
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    /// Maximum length in characters
    #[serde(default)]
    pub max_length: Option<usize>,
    /// Closed set of allowed text values
    #[serde(default)]
    pub one_of: Vec<String>,
}

/// Descriptor of one entity type: everything the generic engine needs to
/// validate, store and load it.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDescriptor {
    name: String,
    table: String,
    root: bool,
    fields: Vec<FieldSpec>,
}

impl EntityDescriptor {
    pub(crate) fn new(
        name: impl Into<String>,
        table: impl Into<String>,
        root: bool,
        fields: Vec<FieldSpec>,
    ) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            root,
            fields,
        }
    }

    /// Entity type name, e.g. `Army`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table name, e.g. `armies`
    pub fn table(&self) -> &str {
        &self.table
    }

    /// True only for the World aggregate root
    pub fn is_root(&self) -> bool {
        self.root
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn unique_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.unique)
    }
}

/// Errors raised while loading the catalog. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid entity type name: {0:?}")]
    InvalidEntityName(String),

    #[error("{entity_type}: invalid identifier {identifier:?}")]
    InvalidIdentifier {
        entity_type: String,
        identifier: String,
    },

    #[error("{entity_type}: field {field:?} collides with an envelope column")]
    ReservedColumn { entity_type: String, field: String },

    #[error("{entity_type}: table name {table:?} is reserved")]
    ReservedTable { entity_type: String, table: String },

    #[error("Entity type {0} is declared more than once")]
    DuplicateEntity(String),

    #[error("Table {table} is claimed by both {first} and {second}")]
    DuplicateTable {
        table: String,
        first: String,
        second: String,
    },

    #[error("{entity_type}: field {field:?} is declared more than once")]
    DuplicateField { entity_type: String, field: String },

    #[error("{entity_type}.{field}: {reason}")]
    InvalidConstraint {
        entity_type: String,
        field: String,
        reason: String,
    },
}

/// The loaded, validated catalog of entity types.
#[derive(Debug, Clone)]
pub struct Catalog {
    world: Arc<EntityDescriptor>,
    entities: Vec<Arc<EntityDescriptor>>,
    by_name: HashMap<String, usize>,
    by_table: HashMap<String, usize>,
}

impl Catalog {
    /// Load the catalog compiled into the binary
    pub fn embedded() -> Result<Self, CatalogError> {
        Self::from_toml_str(EMBEDDED_CATALOG)
    }

    pub fn from_toml_str(source: &str) -> Result<Self, CatalogError> {
        loader::parse(source)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    pub(crate) fn from_descriptors(
        world: EntityDescriptor,
        entities: Vec<EntityDescriptor>,
    ) -> Self {
        let world = Arc::new(world);
        let entities: Vec<Arc<EntityDescriptor>> = std::iter::once(world.clone())
            .chain(entities.into_iter().map(Arc::new))
            .collect();
        let by_name = entities
            .iter()
            .enumerate()
            .map(|(idx, d)| (d.name().to_string(), idx))
            .collect();
        let by_table = entities
            .iter()
            .enumerate()
            .map(|(idx, d)| (d.table().to_string(), idx))
            .collect();
        Self {
            world,
            entities,
            by_name,
            by_table,
        }
    }

    /// The World aggregate root descriptor
    pub fn world(&self) -> &Arc<EntityDescriptor> {
        &self.world
    }

    pub fn get(&self, entity_type: &str) -> Option<&Arc<EntityDescriptor>> {
        self.by_name.get(entity_type).map(|idx| &self.entities[*idx])
    }

    pub fn descriptor_for_table(&self, table: &str) -> Option<&Arc<EntityDescriptor>> {
        self.by_table.get(table).map(|idx| &self.entities[*idx])
    }

    /// All descriptors, World first, then catalog order
    pub fn descriptors(&self) -> impl Iterator<Item = &Arc<EntityDescriptor>> {
        self.entities.iter()
    }

    /// Every entity type owned by a World
    pub fn dependents(&self) -> impl Iterator<Item = &Arc<EntityDescriptor>> {
        self.entities.iter().filter(|d| !d.is_root())
    }

    /// Number of entity types, World included
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
