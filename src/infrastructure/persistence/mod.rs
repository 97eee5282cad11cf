//! Persistence adapters - storage backends behind `StorageBackendPort`
//!
//! Backend selection happens once at startup from configuration. The rest of
//! the system only sees the constructed `StorageBackend` handle.

pub mod memory;
pub mod sqlite;


use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use crate::application::ports::outbound::{
    BackendKind, ClockPort, EntityRepositoryPort, RepoError, StorageBackendPort,
};
use crate::domain::catalog::Catalog;
use crate::domain::entities::EntityRecord;
use crate::domain::value_objects::{Page, Tenant, TenantId};
use crate::infrastructure::config::StorageConfig;

pub use memory::MemoryBackend;
pub use sqlite::{ProvisioningReport, SchemaProvisioner, SchemaProvisioningError, SqliteBackend};

/// Enum wrapper for storage backends to enable runtime selection
pub enum StorageBackend {
    Memory(MemoryBackend),
    Sqlite(SqliteBackend),
}

#[async_trait]
impl StorageBackendPort for StorageBackend {
    fn kind(&self) -> BackendKind {
        match self {
            StorageBackend::Memory(b) => b.kind(),
            StorageBackend::Sqlite(b) => b.kind(),
        }
    }

    fn catalog(&self) -> &Arc<Catalog> {
        match self {
            StorageBackend::Memory(b) => b.catalog(),
            StorageBackend::Sqlite(b) => b.catalog(),
        }
    }

    fn repository(&self, entity_type: &str) -> Result<Arc<dyn EntityRepositoryPort>, RepoError> {
        match self {
            StorageBackend::Memory(b) => b.repository(entity_type),
            StorageBackend::Sqlite(b) => b.repository(entity_type),
        }
    }

    async fn register_tenant(&self, tenant: &Tenant) -> Result<(), RepoError> {
        match self {
            StorageBackend::Memory(b) => b.register_tenant(tenant).await,
            StorageBackend::Sqlite(b) => b.register_tenant(tenant).await,
        }
    }

    async fn find_tenant(&self, id: TenantId) -> Result<Option<Tenant>, RepoError> {
        match self {
            StorageBackend::Memory(b) => b.find_tenant(id).await,
            StorageBackend::Sqlite(b) => b.find_tenant(id).await,
        }
    }

    async fn list_worlds(
        &self,
        tenant_id: TenantId,
        page: Page,
    ) -> Result<Vec<EntityRecord>, RepoError> {
        match self {
            StorageBackend::Memory(b) => b.list_worlds(tenant_id, page).await,
            StorageBackend::Sqlite(b) => b.list_worlds(tenant_id, page).await,
        }
    }
}

/// Storage factory - builds the configured backend
pub struct StorageFactory {
    config: StorageConfig,
}

impl StorageFactory {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    /// Construct the backend. For SQLite this provisions (if enabled) and
    /// always verifies the schema before any repository is handed out.
    pub async fn build(
        &self,
        catalog: Arc<Catalog>,
        clock: Arc<dyn ClockPort>,
    ) -> Result<StorageBackend> {
        match self.config.backend {
            BackendKind::Memory => {
                info!(entity_types = catalog.len(), "Using in-memory storage");
                Ok(StorageBackend::Memory(MemoryBackend::new(catalog, clock)))
            }
            BackendKind::Sqlite => {
                let pool = sqlite::connect(&self.config)
                    .await
                    .context("Failed to open SQLite database")?;

                let provisioner = SchemaProvisioner::new(&catalog);
                if self.config.provision_schema {
                    let report = provisioner
                        .provision(&pool)
                        .await
                        .context("Schema provisioning failed")?;
                    if !report.columns_added.is_empty() {
                        warn!(columns = ?report.columns_added, "Added columns to existing tables");
                    }
                } else {
                    info!("Schema provisioning disabled; verifying only");
                }
                provisioner
                    .verify(&pool)
                    .await
                    .context("Schema verification failed")?;

                Ok(StorageBackend::Sqlite(SqliteBackend::new(catalog, pool, clock)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::SystemClock;

    fn storage_config(backend: BackendKind, path: String, provision_schema: bool) -> StorageConfig {
        StorageConfig {
            backend,
            sqlite_path: path,
            max_connections: 2,
            busy_timeout_ms: 1_000,
            provision_schema,
        }
    }

    #[tokio::test]
    async fn test_factory_builds_memory_backend() {
        let catalog = Arc::new(Catalog::embedded().unwrap());
        let factory = StorageFactory::new(storage_config(BackendKind::Memory, String::new(), true));
        let backend = factory.build(catalog, Arc::new(SystemClock)).await.unwrap();
        assert_eq!(backend.kind(), BackendKind::Memory);
        assert!(backend.repository("Army").is_ok());
        assert!(matches!(
            backend.repository("Spaceship"),
            Err(RepoError::UnknownEntityType(_))
        ));
    }

    #[tokio::test]
    async fn test_factory_refuses_unprovisioned_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("vault.db");
        let catalog = Arc::new(Catalog::embedded().unwrap());
        let factory = StorageFactory::new(storage_config(
            BackendKind::Sqlite,
            path.to_string_lossy().into_owned(),
            false,
        ));
        let err = factory
            .build(catalog, Arc::new(SystemClock))
            .await
            .err()
            .unwrap();
        let cause = err.downcast_ref::<SchemaProvisioningError>().unwrap();
        assert!(matches!(cause, SchemaProvisioningError::MissingTable { .. }));
    }

    #[tokio::test]
    async fn test_factory_provisions_sqlite_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.db");
        let catalog = Arc::new(Catalog::embedded().unwrap());
        let factory = StorageFactory::new(storage_config(
            BackendKind::Sqlite,
            path.to_string_lossy().into_owned(),
            true,
        ));
        let backend = factory
            .build(catalog.clone(), Arc::new(SystemClock))
            .await
            .unwrap();
        assert_eq!(backend.kind(), BackendKind::Sqlite);

        // a second start over the same file is a no-op
        drop(backend);
        let report = SchemaProvisioner::new(&catalog)
            .provision(&sqlite::connect(&factory.config).await.unwrap())
            .await
            .unwrap();
        assert!(report.is_noop());
    }
}
