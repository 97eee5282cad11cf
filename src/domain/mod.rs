//! Domain layer - Core persistence model with no I/O
//!
//! This layer contains:
//! - Catalog: the declarative registry of every entity type
//! - Entities: the generic record, its envelope and typed facades
//! - Aggregates: Tenant/World ownership and cascade rules
//! - Value Objects: ids, field values, paging, tenants

pub mod aggregates;
pub mod catalog;
pub mod entities;
pub mod errors;
pub mod value_objects;
