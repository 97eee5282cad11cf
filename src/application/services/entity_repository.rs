//! Typed repository - `EntityRepositoryPort` viewed through one facade type
//!
//! The backend stays generic; this wrapper only converts records to and
//! from the facade at the edges.

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::instrument;

use crate::application::ports::outbound::{EntityRepositoryPort, RepoError, StorageBackendPort};
use crate::domain::entities::{EntityRecord, TypedEntity};
use crate::domain::value_objects::{EntityId, Page, TenantId};

/// Repository for a single typed entity, e.g. `Repository<Army>`
pub struct Repository<E> {
    inner: Arc<dyn EntityRepositoryPort>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: TypedEntity> Repository<E> {
    pub fn new(backend: &dyn StorageBackendPort) -> Result<Self, RepoError> {
        let inner = backend.repository(E::ENTITY_TYPE)?;
        Ok(Self {
            inner,
            _entity: PhantomData,
        })
    }

    /// The untyped repository underneath
    pub fn untyped(&self) -> &Arc<dyn EntityRepositoryPort> {
        &self.inner
    }

    #[instrument(skip(self, entity), fields(entity_type = E::ENTITY_TYPE))]
    pub async fn save(&self, entity: &E) -> Result<E, RepoError> {
        let saved = self.inner.save(entity.record()).await?;
        Self::wrap(saved)
    }

    pub async fn find_by_id(
        &self,
        tenant_id: TenantId,
        id: EntityId,
    ) -> Result<Option<E>, RepoError> {
        self.inner
            .find_by_id(tenant_id, id)
            .await?
            .map(Self::wrap)
            .transpose()
    }

    pub async fn list_by_world(
        &self,
        tenant_id: TenantId,
        world_id: EntityId,
        page: Page,
    ) -> Result<Vec<E>, RepoError> {
        self.inner
            .list_by_world(tenant_id, world_id, page)
            .await?
            .into_iter()
            .map(Self::wrap)
            .collect()
    }

    pub async fn delete(&self, tenant_id: TenantId, id: EntityId) -> Result<bool, RepoError> {
        self.inner.delete(tenant_id, id).await
    }

    fn wrap(record: EntityRecord) -> Result<E, RepoError> {
        let found = record.entity_type().to_string();
        E::from_record(record).map_err(|_| RepoError::TypeMismatch {
            expected: E::ENTITY_TYPE.to_string(),
            found,
        })
    }
}
