//! SQLite storage backend for durable persistence

mod codec;
mod provisioner;
mod repository;

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::info;

pub use provisioner::{ProvisioningReport, SchemaProvisioner, SchemaProvisioningError};
pub use repository::SqliteRepository;

use codec::{decode_tenant_id, decode_timestamp, encode_timestamp, map_sqlx_error, quote};
use crate::application::ports::outbound::{
    BackendKind, ClockPort, EntityRepositoryPort, RepoError, StorageBackendPort,
};
use crate::domain::catalog::{Catalog, TENANTS_TABLE};
use crate::domain::entities::EntityRecord;
use crate::domain::value_objects::{Page, Tenant, TenantId};
use crate::infrastructure::config::StorageConfig;

/// Open a pool on the configured database file, creating it if needed.
///
/// Foreign keys are switched on for every connection; the cascade from
/// `worlds` depends on it.
pub async fn connect(config: &StorageConfig) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(&config.sqlite_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", config.sqlite_path))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .connect_with(options)
        .await?;
    info!(path = %config.sqlite_path, "Connected to SQLite database");
    Ok(pool)
}

/// SQLite backend: the `tenants` table plus one repository per entity type
pub struct SqliteBackend {
    catalog: Arc<Catalog>,
    pool: SqlitePool,
    repositories: HashMap<String, Arc<SqliteRepository>>,
}

impl SqliteBackend {
    /// Wrap a pool whose schema has already been provisioned and verified
    pub fn new(catalog: Arc<Catalog>, pool: SqlitePool, clock: Arc<dyn ClockPort>) -> Self {
        let repositories = catalog
            .descriptors()
            .map(|descriptor| {
                let repository =
                    SqliteRepository::new(descriptor.clone(), pool.clone(), clock.clone());
                (descriptor.name().to_string(), Arc::new(repository))
            })
            .collect();
        Self {
            catalog,
            pool,
            repositories,
        }
    }
}

#[async_trait]
impl StorageBackendPort for SqliteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
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
        sqlx::query(&format!(
            "INSERT INTO {} (\"id\", \"name\", \"created_at\") VALUES (?, ?, ?)",
            quote(TENANTS_TABLE)
        ))
        .bind(tenant.id.to_string())
        .bind(&tenant.name)
        .bind(encode_timestamp(&tenant.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("register_tenant", "Tenant", e))?;
        Ok(())
    }

    async fn find_tenant(&self, id: TenantId) -> Result<Option<Tenant>, RepoError> {
        let row = sqlx::query(&format!(
            "SELECT \"id\", \"name\", \"created_at\" FROM {} WHERE \"id\" = ?",
            quote(TENANTS_TABLE)
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::database("find_tenant", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let id: String = row
            .try_get("id")
            .map_err(|e| RepoError::database("find_tenant", e))?;
        let name: String = row
            .try_get("name")
            .map_err(|e| RepoError::database("find_tenant", e))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| RepoError::database("find_tenant", e))?;

        Ok(Some(Tenant {
            id: decode_tenant_id(&id)?,
            name,
            created_at: decode_timestamp("created_at", &created_at)?,
        }))
    }

    async fn list_worlds(
        &self,
        tenant_id: TenantId,
        page: Page,
    ) -> Result<Vec<EntityRecord>, RepoError> {
        repository::list_worlds(&self.pool, self.catalog.world(), tenant_id, page).await
    }
}
