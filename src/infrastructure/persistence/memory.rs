//! In-memory storage backend for development and testing
//!
//! One ordered partition per entity type, keyed by `(tenant_id, entity_id)`.
//! Every call takes the single store lock exactly once, so a World delete
//! and its fan-out across partitions happen in one critical section.
//! Nothing is persisted.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::application::ports::outbound::{
    BackendKind, ClockPort, EntityRepositoryPort, RepoError, StorageBackendPort,
};
use crate::domain::aggregates::{AggregateGuard, CascadePlan};
use crate::domain::catalog::{Catalog, EntityDescriptor, WORLD_ENTITY};
use crate::domain::entities::{EntityRecord, Envelope};
use crate::domain::value_objects::{EntityId, Page, Tenant, TenantId};

type RowKey = (TenantId, EntityId);

#[derive(Default)]
struct Partition {
    rows: BTreeMap<RowKey, EntityRecord>,
    /// Last id handed out per tenant
    last_ids: HashMap<TenantId, i64>,
}

impl Partition {
    fn next_id(&mut self, tenant_id: TenantId) -> EntityId {
        let last = self.last_ids.entry(tenant_id).or_insert(0);
        *last += 1;
        EntityId::from_raw(*last)
    }

    fn tenant_rows(&self, tenant_id: TenantId) -> impl Iterator<Item = &EntityRecord> {
        self.rows
            .range((tenant_id, EntityId::MIN)..=(tenant_id, EntityId::MAX))
            .map(|(_, record)| record)
    }
}

struct MemoryState {
    tenants: BTreeMap<TenantId, Tenant>,
    partitions: HashMap<String, Partition>,
}

impl MemoryState {
    fn partition(&self, entity_type: &str) -> Result<&Partition, RepoError> {
        self.partitions
            .get(entity_type)
            .ok_or_else(|| RepoError::UnknownEntityType(entity_type.to_string()))
    }

    fn partition_mut(&mut self, entity_type: &str) -> Result<&mut Partition, RepoError> {
        self.partitions
            .get_mut(entity_type)
            .ok_or_else(|| RepoError::UnknownEntityType(entity_type.to_string()))
    }
}

// =============================================================================
// Backend
// =============================================================================

/// In-memory backend: a tenant registry plus one repository per entity type
pub struct MemoryBackend {
    catalog: Arc<Catalog>,
    state: Arc<RwLock<MemoryState>>,
    repositories: HashMap<String, Arc<MemoryRepository>>,
}

impl MemoryBackend {
    pub fn new(catalog: Arc<Catalog>, clock: Arc<dyn ClockPort>) -> Self {
        let partitions = catalog
            .descriptors()
            .map(|d| (d.name().to_string(), Partition::default()))
            .collect();
        let state = Arc::new(RwLock::new(MemoryState {
            tenants: BTreeMap::new(),
            partitions,
        }));
        let cascade = Arc::new(CascadePlan::for_catalog(&catalog));

        let repositories = catalog
            .descriptors()
            .map(|descriptor| {
                let repository = MemoryRepository {
                    descriptor: descriptor.clone(),
                    state: state.clone(),
                    clock: clock.clone(),
                    cascade: cascade.clone(),
                };
                (descriptor.name().to_string(), Arc::new(repository))
            })
            .collect();

        debug!(entity_types = catalog.len(), "In-memory backend ready");
        Self {
            catalog,
            state,
            repositories,
        }
    }
}

#[async_trait]
impl StorageBackendPort for MemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    fn repository(&self, entity_type: &str) -> Result<Arc<dyn EntityRepositoryPort>, RepoError> {
        self.repositories
            .get(entity_type)
            .map(|r| r.clone() as Arc<dyn EntityRepositoryPort>)
            .ok_or_else(|| RepoError::UnknownEntityType(entity_type.to_string()))
    }

    async fn register_tenant(&self, tenant: &Tenant) -> Result<(), RepoError> {
        let mut state = self.state.write().await;
        if state.tenants.contains_key(&tenant.id) {
            return Err(RepoError::duplicate("Tenant", tenant.id));
        }
        state.tenants.insert(tenant.id, tenant.clone());
        Ok(())
    }

    async fn find_tenant(&self, id: TenantId) -> Result<Option<Tenant>, RepoError> {
        let state = self.state.read().await;
        Ok(state.tenants.get(&id).cloned())
    }

    async fn list_worlds(
        &self,
        tenant_id: TenantId,
        page: Page,
    ) -> Result<Vec<EntityRecord>, RepoError> {
        let state = self.state.read().await;
        Ok(state
            .partition(WORLD_ENTITY)?
            .tenant_rows(tenant_id)
            .skip(page.offset)
            .take(page.limit)
            .cloned()
            .collect())
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository over one partition of the shared in-memory store
pub struct MemoryRepository {
    descriptor: Arc<EntityDescriptor>,
    state: Arc<RwLock<MemoryState>>,
    clock: Arc<dyn ClockPort>,
    cascade: Arc<CascadePlan>,
}

impl MemoryRepository {
    fn check_type(&self, record: &EntityRecord) -> Result<(), RepoError> {
        if record.entity_type() != self.descriptor.name() {
            return Err(RepoError::TypeMismatch {
                expected: self.descriptor.name().to_string(),
                found: record.entity_type().to_string(),
            });
        }
        Ok(())
    }

    /// The owning tenant, and for dependents the owning world, must exist.
    fn check_owner(&self, state: &MemoryState, record: &EntityRecord) -> Result<(), RepoError> {
        let tenant_id = record.tenant_id();
        if !state.tenants.contains_key(&tenant_id) {
            return Err(RepoError::not_found("Tenant", tenant_id));
        }
        if let Some(world_id) = record.world_id() {
            let worlds = state.partition(WORLD_ENTITY)?;
            if !worlds.rows.contains_key(&(tenant_id, world_id)) {
                return Err(RepoError::not_found(WORLD_ENTITY, world_id));
            }
        }
        Ok(())
    }

    /// Unique fields are scoped to the owning world, or to the tenant for World.
    fn check_unique(&self, partition: &Partition, record: &EntityRecord) -> Result<(), RepoError> {
        for spec in self.descriptor.unique_fields() {
            let Some(value) = record.get(&spec.name) else {
                continue;
            };
            let taken = partition.tenant_rows(record.tenant_id()).any(|other| {
                other.id() != record.id()
                    && other.world_id() == record.world_id()
                    && other.get(&spec.name) == Some(value)
            });
            if taken {
                return Err(RepoError::duplicate(
                    self.descriptor.name(),
                    format!("{} {:?} already exists", spec.name, value),
                ));
            }
        }
        Ok(())
    }

    fn insert(&self, state: &mut MemoryState, record: &EntityRecord) -> Result<EntityRecord, RepoError> {
        self.check_owner(state, record)?;
        let now = self.clock.now();
        let partition = state.partition_mut(self.descriptor.name())?;
        self.check_unique(partition, record)?;

        let tenant_id = record.tenant_id();
        let id = partition.next_id(tenant_id);
        let envelope = Envelope::persisted(id, tenant_id, record.world_id(), now, now, 1);
        let stored = record.clone().with_envelope(envelope);
        partition.rows.insert((tenant_id, id), stored.clone());
        Ok(stored)
    }

    fn update(
        &self,
        state: &mut MemoryState,
        id: EntityId,
        record: &EntityRecord,
    ) -> Result<EntityRecord, RepoError> {
        let now = self.clock.now();
        let tenant_id = record.tenant_id();
        let partition = state.partition_mut(self.descriptor.name())?;

        let previous = partition
            .rows
            .get(&(tenant_id, id))
            .ok_or_else(|| RepoError::not_found(self.descriptor.name(), id))?
            .envelope()
            .clone();
        if previous.version() != record.version() {
            return Err(RepoError::ConcurrencyConflict {
                entity_type: self.descriptor.name().to_string(),
                id,
                expected: record.version(),
                actual: previous.version(),
            });
        }
        self.check_unique(partition, record)?;

        let envelope = Envelope::persisted(
            id,
            tenant_id,
            previous.world_id(),
            previous.created_at().unwrap_or(now),
            previous.next_updated_at(now),
            previous.version() + 1,
        );
        let stored = record.clone().with_envelope(envelope);
        partition.rows.insert((tenant_id, id), stored.clone());
        Ok(stored)
    }
}

#[async_trait]
impl EntityRepositoryPort for MemoryRepository {
    fn descriptor(&self) -> &Arc<EntityDescriptor> {
        &self.descriptor
    }

    #[instrument(skip(self, record), fields(entity_type = %self.descriptor.name()))]
    async fn save(&self, record: &EntityRecord) -> Result<EntityRecord, RepoError> {
        self.check_type(record)?;
        let mut state = self.state.write().await;
        let saved = match record.id() {
            None => self.insert(&mut state, record)?,
            Some(id) => self.update(&mut state, id, record)?,
        };
        debug!(id = ?saved.id(), version = saved.version(), "Saved entity");
        Ok(saved)
    }

    async fn find_by_id(
        &self,
        tenant_id: TenantId,
        id: EntityId,
    ) -> Result<Option<EntityRecord>, RepoError> {
        let state = self.state.read().await;
        let partition = state.partition(self.descriptor.name())?;
        Ok(partition.rows.get(&(tenant_id, id)).cloned())
    }

    async fn list_by_world(
        &self,
        tenant_id: TenantId,
        world_id: EntityId,
        page: Page,
    ) -> Result<Vec<EntityRecord>, RepoError> {
        let state = self.state.read().await;
        let partition = state.partition(self.descriptor.name())?;
        Ok(partition
            .tenant_rows(tenant_id)
            .filter(|r| AggregateGuard::in_scope(&self.descriptor, tenant_id, world_id, r.envelope()))
            .skip(page.offset)
            .take(page.limit)
            .cloned()
            .collect())
    }

    #[instrument(skip(self), fields(entity_type = %self.descriptor.name()))]
    async fn delete(&self, tenant_id: TenantId, id: EntityId) -> Result<bool, RepoError> {
        let mut state = self.state.write().await;
        let removed = state
            .partition_mut(self.descriptor.name())?
            .rows
            .remove(&(tenant_id, id))
            .is_some();

        if removed && self.descriptor.is_root() {
            let mut swept = 0usize;
            for target in self.cascade.targets() {
                let Some(partition) = state.partitions.get_mut(target.name()) else {
                    continue;
                };
                let before = partition.rows.len();
                partition.rows.retain(|(owner, _), record| {
                    !(*owner == tenant_id && record.world_id() == Some(id))
                });
                swept += before - partition.rows.len();
            }
            debug!(world_id = %id, dependents = swept, "Cascaded world delete");
        }
        Ok(removed)
    }
}
