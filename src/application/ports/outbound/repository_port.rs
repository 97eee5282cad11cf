//! Repository ports - Interfaces for entity persistence
//!
//! One generic repository contract serves every cataloged entity type. A
//! storage backend hands out one repository per type and owns the tenant
//! registry.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::RepoError;
use crate::domain::catalog::{Catalog, EntityDescriptor};
use crate::domain::entities::EntityRecord;
use crate::domain::value_objects::{EntityId, Page, Tenant, TenantId};

// =============================================================================
// Entity Repository Port
// =============================================================================

/// Repository port for one entity type
#[async_trait]
pub trait EntityRepositoryPort: Send + Sync {
    /// The entity type this repository serves
    fn descriptor(&self) -> &Arc<EntityDescriptor>;

    /// Insert (unset id) or update (set id, matching version).
    ///
    /// Insert assigns the id, stamps `created_at == updated_at` and sets
    /// version 1. Update succeeds only if the stored version equals the
    /// record's; it bumps the version by one and advances `updated_at`.
    async fn save(&self, record: &EntityRecord) -> Result<EntityRecord, RepoError>;

    /// Get an entity by id; other tenants' entities are always absent
    async fn find_by_id(
        &self,
        tenant_id: TenantId,
        id: EntityId,
    ) -> Result<Option<EntityRecord>, RepoError>;

    /// List entities in one world, ordered by id.
    ///
    /// For World itself this yields at most the world `world_id`.
    async fn list_by_world(
        &self,
        tenant_id: TenantId,
        world_id: EntityId,
        page: Page,
    ) -> Result<Vec<EntityRecord>, RepoError>;

    /// Delete an entity. Returns false if it was absent.
    ///
    /// Deleting a World removes every dependent of every type in the same
    /// atomic step.
    async fn delete(&self, tenant_id: TenantId, id: EntityId) -> Result<bool, RepoError>;
}

// =============================================================================
// Storage Backend Port
// =============================================================================

/// Which storage engine backs the repositories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Memory,
    Sqlite,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A constructed storage backend: the handle the dispatch layer is given
#[async_trait]
pub trait StorageBackendPort: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn catalog(&self) -> &Arc<Catalog>;

    /// The repository serving `entity_type`
    fn repository(&self, entity_type: &str) -> Result<Arc<dyn EntityRepositoryPort>, RepoError>;

    /// Register a tenant; an existing id is `Duplicate`
    async fn register_tenant(&self, tenant: &Tenant) -> Result<(), RepoError>;

    async fn find_tenant(&self, id: TenantId) -> Result<Option<Tenant>, RepoError>;

    /// Every World owned by `tenant_id`, ordered by id
    async fn list_worlds(&self, tenant_id: TenantId, page: Page)
        -> Result<Vec<EntityRecord>, RepoError>;
}
