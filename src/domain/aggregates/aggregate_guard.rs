//! Tenant/World aggregate guard
//!
//! Every entity is reachable only through its owning (tenant, world) pair and
//! a World owns everything that names it in `world_id`. The rules here are
//! shared by both storage backends: the in-memory store applies them as
//! predicates and sweeps, the relational store turns them into `WHERE`
//! clauses and `ON DELETE CASCADE` foreign keys.

use std::sync::Arc;

use crate::domain::catalog::{Catalog, EntityDescriptor};
use crate::domain::entities::Envelope;
use crate::domain::errors::ValidationError;
use crate::domain::value_objects::{EntityId, TenantId};

/// Stateless ownership rules for the Tenant/World aggregate
pub struct AggregateGuard;

impl AggregateGuard {
    /// World has no owning world; every other type has exactly one.
    pub fn check_ownership(
        descriptor: &EntityDescriptor,
        world_id: Option<EntityId>,
    ) -> Result<(), ValidationError> {
        match (descriptor.is_root(), world_id) {
            (true, Some(_)) => Err(ValidationError::Ownership {
                entity_type: descriptor.name().to_string(),
                reason: "the aggregate root cannot belong to a world".to_string(),
            }),
            (false, None) => Err(ValidationError::Ownership {
                entity_type: descriptor.name().to_string(),
                reason: "world_id is required".to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// True if `envelope` belongs to `tenant_id`
    pub fn admits(tenant_id: TenantId, envelope: &Envelope) -> bool {
        envelope.tenant_id() == tenant_id
    }

    /// True if `envelope` lies inside the (tenant, world) scope.
    ///
    /// A World is in its own scope, so listing Worlds "by world" yields at
    /// most the World itself.
    pub fn in_scope(
        descriptor: &EntityDescriptor,
        tenant_id: TenantId,
        world_id: EntityId,
        envelope: &Envelope,
    ) -> bool {
        if !Self::admits(tenant_id, envelope) {
            return false;
        }
        if descriptor.is_root() {
            envelope.id() == Some(world_id)
        } else {
            envelope.world_id() == Some(world_id)
        }
    }
}

/// The set of entity types a World deletion must sweep.
///
/// Built once from the catalog; a backend that sweeps every target in the
/// plan cannot miss a partition or table.
#[derive(Debug, Clone)]
pub struct CascadePlan {
    targets: Vec<Arc<EntityDescriptor>>,
}

impl CascadePlan {
    pub fn for_catalog(catalog: &Catalog) -> Self {
        Self {
            targets: catalog.dependents().cloned().collect(),
        }
    }

    pub fn targets(&self) -> &[Arc<EntityDescriptor>] {
        &self.targets
    }

    pub fn covers(&self, entity_type: &str) -> bool {
        self.targets.iter().any(|d| d.name() == entity_type)
    }
}
