//! Entity envelope - identity, ownership, timestamps and version

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::{EntityId, TenantId};

/// Fields shared by every entity regardless of type.
///
/// Only a storage backend moves an envelope from unpersisted to persisted;
/// callers can read it but never write it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    id: Option<EntityId>,
    tenant_id: TenantId,
    /// Owning world; `None` only for World itself
    world_id: Option<EntityId>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency token; 0 until first save
    version: u64,
}

impl Envelope {
    pub(crate) fn unpersisted(tenant_id: TenantId, world_id: Option<EntityId>) -> Self {
        Self {
            id: None,
            tenant_id,
            world_id,
            created_at: None,
            updated_at: None,
            version: 0,
        }
    }

    pub(crate) fn persisted(
        id: EntityId,
        tenant_id: TenantId,
        world_id: Option<EntityId>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        version: u64,
    ) -> Self {
        Self {
            id: Some(id),
            tenant_id,
            world_id,
            created_at: Some(created_at),
            updated_at: Some(updated_at),
            version,
        }
    }

    pub fn id(&self) -> Option<EntityId> {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn world_id(&self) -> Option<EntityId> {
        self.world_id
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// `updated_at` for the next successful update.
    ///
    /// Strictly later than the current value even when `now` is not, so a
    /// coarse or frozen clock still yields increasing timestamps.
    pub fn next_updated_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.updated_at {
            Some(previous) if now <= previous => previous + Duration::microseconds(1),
            _ => now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_updated_at_is_strictly_increasing() {
        let then = Utc::now();
        let envelope =
            Envelope::persisted(EntityId::from_raw(1), TenantId::new(), None, then, then, 1);

        let frozen = envelope.next_updated_at(then);
        assert_eq!(frozen, then + Duration::microseconds(1));

        let earlier = envelope.next_updated_at(then - Duration::seconds(5));
        assert!(earlier > then);

        let later = then + Duration::seconds(5);
        assert_eq!(envelope.next_updated_at(later), later);
    }

    #[test]
    fn test_unpersisted_envelope() {
        let envelope = Envelope::unpersisted(TenantId::new(), Some(EntityId::from_raw(4)));
        assert!(!envelope.is_persisted());
        assert_eq!(envelope.version(), 0);
        assert!(envelope.created_at().is_none());
    }
}
