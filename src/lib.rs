//! WrldBldr Vault - Multi-tenant entity persistence for world catalogs
//!
//! The vault stores every entity type named in the catalog under a common
//! envelope (tenant, owning world, timestamps, version) and serves them
//! through typed repositories. A World owns every other entity; deleting it
//! removes the lot.

pub mod application;
pub mod domain;
pub mod infrastructure;
