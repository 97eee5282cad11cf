//! SQLite repository - one table per entity type
//!
//! Statements are rendered once per type from its descriptor. Every write
//! runs inside its own transaction; a World delete relies on the
//! `ON DELETE CASCADE` foreign keys, so the world row and all of its
//! dependents disappear in the same statement.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

use super::codec::{bind_value, decode_record, encode_timestamp, map_sqlx_error, quote};
use crate::application::ports::outbound::{ClockPort, EntityRepositoryPort, RepoError};
use crate::domain::catalog::{EntityDescriptor, TENANTS_TABLE, WORLDS_TABLE, WORLD_ENTITY};
use crate::domain::entities::{EntityRecord, Envelope};
use crate::domain::value_objects::{EntityId, Page, TenantId};

/// SQL rendered for one entity type
#[derive(Debug, Clone)]
pub(crate) struct Statements {
    pub(crate) insert: String,
    pub(crate) update: String,
    pub(crate) current_version: String,
    pub(crate) select_by_id: String,
    pub(crate) list_by_world: String,
    pub(crate) delete: String,
}

impl Statements {
    pub(crate) fn render(descriptor: &EntityDescriptor) -> Self {
        let table = quote(descriptor.table());
        let field_columns: Vec<String> =
            descriptor.fields().iter().map(|f| quote(&f.name)).collect();

        let mut envelope_columns = vec!["\"id\"", "\"tenant_id\""];
        if !descriptor.is_root() {
            envelope_columns.push("\"world_id\"");
        }
        envelope_columns.extend(["\"created_at\"", "\"updated_at\"", "\"version\""]);
        let all_columns = envelope_columns
            .iter()
            .map(|c| c.to_string())
            .chain(field_columns.iter().cloned())
            .collect::<Vec<_>>()
            .join(", ");

        // INSERT ... SELECT so the owner check and the insert are one statement
        let (owner_columns, owner_check) = if descriptor.is_root() {
            (
                vec!["\"tenant_id\""],
                format!("EXISTS (SELECT 1 FROM {} WHERE \"id\" = ?)", quote(TENANTS_TABLE)),
            )
        } else {
            (
                vec!["\"tenant_id\"", "\"world_id\""],
                format!(
                    "EXISTS (SELECT 1 FROM {} WHERE \"id\" = ? AND \"tenant_id\" = ?)",
                    quote(WORLDS_TABLE)
                ),
            )
        };
        let insert_columns: Vec<String> = owner_columns
            .iter()
            .map(|c| c.to_string())
            .chain(["created_at", "updated_at", "version"].map(quote))
            .chain(field_columns.iter().cloned())
            .collect();
        let placeholders: Vec<&str> = insert_columns
            .iter()
            .map(|c| if c == "\"version\"" { "1" } else { "?" })
            .collect();
        let insert = format!(
            "INSERT INTO {table} ({}) SELECT {} WHERE {owner_check} RETURNING \"id\"",
            insert_columns.join(", "),
            placeholders.join(", ")
        );

        let assignments = std::iter::once("\"updated_at\" = ?".to_string())
            .chain(std::iter::once("\"version\" = \"version\" + 1".to_string()))
            .chain(field_columns.iter().map(|c| format!("{c} = ?")))
            .collect::<Vec<_>>()
            .join(", ");
        let update = format!(
            "UPDATE {table} SET {assignments} \
             WHERE \"id\" = ? AND \"tenant_id\" = ? AND \"version\" = ? \
             RETURNING {all_columns}"
        );

        let current_version =
            format!("SELECT \"version\" FROM {table} WHERE \"id\" = ? AND \"tenant_id\" = ?");
        let select_by_id =
            format!("SELECT {all_columns} FROM {table} WHERE \"id\" = ? AND \"tenant_id\" = ?");
        let scope_column = if descriptor.is_root() { "id" } else { "world_id" };
        let list_by_world = format!(
            "SELECT {all_columns} FROM {table} \
             WHERE \"tenant_id\" = ? AND \"{scope_column}\" = ? \
             ORDER BY \"id\" LIMIT ? OFFSET ?"
        );
        let delete = format!("DELETE FROM {table} WHERE \"id\" = ? AND \"tenant_id\" = ?");

        Self {
            insert,
            update,
            current_version,
            select_by_id,
            list_by_world,
            delete,
        }
    }
}

pub struct SqliteRepository {
    descriptor: Arc<EntityDescriptor>,
    pool: SqlitePool,
    clock: Arc<dyn ClockPort>,
    statements: Statements,
}

impl SqliteRepository {
    pub fn new(
        descriptor: Arc<EntityDescriptor>,
        pool: SqlitePool,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        let statements = Statements::render(&descriptor);
        Self {
            descriptor,
            pool,
            clock,
            statements,
        }
    }

    fn db_error(&self, operation: &'static str, e: sqlx::Error) -> RepoError {
        map_sqlx_error(operation, self.descriptor.name(), e)
    }

    async fn insert(&self, record: &EntityRecord) -> Result<EntityRecord, RepoError> {
        let tenant_id = record.tenant_id();
        let now = self.clock.now();
        let stamp = encode_timestamp(&now);

        let mut tx = self.pool.begin().await.map_err(|e| self.db_error("begin", e))?;

        let mut query = sqlx::query(&self.statements.insert).bind(tenant_id.to_string());
        if let Some(world_id) = record.world_id() {
            query = query.bind(world_id.as_i64());
        }
        query = query.bind(stamp.clone()).bind(stamp);
        for spec in self.descriptor.fields() {
            query = bind_value(query, record.get(&spec.name));
        }
        query = match record.world_id() {
            Some(world_id) => query.bind(world_id.as_i64()).bind(tenant_id.to_string()),
            None => query.bind(tenant_id.to_string()),
        };

        let row = query
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| self.db_error("insert", e))?;

        let Some(row) = row else {
            let tenant_exists = sqlx::query(&format!(
                "SELECT 1 FROM {} WHERE \"id\" = ?",
                quote(TENANTS_TABLE)
            ))
            .bind(tenant_id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| self.db_error("insert", e))?
            .is_some();
            return Err(match (tenant_exists, record.world_id()) {
                (true, Some(world_id)) => RepoError::not_found(WORLD_ENTITY, world_id),
                _ => RepoError::not_found("Tenant", tenant_id),
            });
        };
        let id: i64 = row.try_get("id").map_err(|e| self.db_error("insert", e))?;

        tx.commit().await.map_err(|e| self.db_error("commit", e))?;

        let envelope =
            Envelope::persisted(EntityId::from_raw(id), tenant_id, record.world_id(), now, now, 1);
        Ok(record.clone().with_envelope(envelope))
    }

    async fn update(&self, id: EntityId, record: &EntityRecord) -> Result<EntityRecord, RepoError> {
        let tenant_id = record.tenant_id();
        let expected = record.version();
        let updated_at = record.envelope().next_updated_at(self.clock.now());

        let mut tx = self.pool.begin().await.map_err(|e| self.db_error("begin", e))?;

        let mut query = sqlx::query(&self.statements.update).bind(encode_timestamp(&updated_at));
        for spec in self.descriptor.fields() {
            query = bind_value(query, record.get(&spec.name));
        }
        let expected_i64 = i64::try_from(expected)
            .map_err(|_| RepoError::serialization(format!("Version {expected} out of range")))?;
        let row = query
            .bind(id.as_i64())
            .bind(tenant_id.to_string())
            .bind(expected_i64)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| self.db_error("update", e))?;

        let Some(row) = row else {
            let current: Option<i64> = sqlx::query(&self.statements.current_version)
                .bind(id.as_i64())
                .bind(tenant_id.to_string())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| self.db_error("update", e))?
                .map(|row| row.try_get("version"))
                .transpose()
                .map_err(|e| self.db_error("update", e))?;
            return Err(match current {
                None => RepoError::not_found(self.descriptor.name(), id),
                Some(actual) => RepoError::ConcurrencyConflict {
                    entity_type: self.descriptor.name().to_string(),
                    id,
                    expected,
                    actual: u64::try_from(actual).unwrap_or_default(),
                },
            });
        };
        let stored = decode_record(&self.descriptor, &row)?;

        tx.commit().await.map_err(|e| self.db_error("commit", e))?;
        Ok(stored)
    }
}

#[async_trait]
impl EntityRepositoryPort for SqliteRepository {
    fn descriptor(&self) -> &Arc<EntityDescriptor> {
        &self.descriptor
    }

    #[instrument(skip(self, record), fields(entity_type = %self.descriptor.name()))]
    async fn save(&self, record: &EntityRecord) -> Result<EntityRecord, RepoError> {
        if record.entity_type() != self.descriptor.name() {
            return Err(RepoError::TypeMismatch {
                expected: self.descriptor.name().to_string(),
                found: record.entity_type().to_string(),
            });
        }
        let saved = match record.id() {
            None => self.insert(record).await?,
            Some(id) => self.update(id, record).await?,
        };
        debug!(id = ?saved.id(), version = saved.version(), "Saved entity");
        Ok(saved)
    }

    async fn find_by_id(
        &self,
        tenant_id: TenantId,
        id: EntityId,
    ) -> Result<Option<EntityRecord>, RepoError> {
        let row = sqlx::query(&self.statements.select_by_id)
            .bind(id.as_i64())
            .bind(tenant_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| self.db_error("find_by_id", e))?;
        row.map(|row| decode_record(&self.descriptor, &row)).transpose()
    }

    async fn list_by_world(
        &self,
        tenant_id: TenantId,
        world_id: EntityId,
        page: Page,
    ) -> Result<Vec<EntityRecord>, RepoError> {
        let rows = sqlx::query(&self.statements.list_by_world)
            .bind(tenant_id.to_string())
            .bind(world_id.as_i64())
            .bind(page.limit_i64())
            .bind(page.offset_i64())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| self.db_error("list_by_world", e))?;
        rows.iter()
            .map(|row| decode_record(&self.descriptor, row))
            .collect()
    }

    #[instrument(skip(self), fields(entity_type = %self.descriptor.name()))]
    async fn delete(&self, tenant_id: TenantId, id: EntityId) -> Result<bool, RepoError> {
        let mut tx = self.pool.begin().await.map_err(|e| self.db_error("begin", e))?;
        let result = sqlx::query(&self.statements.delete)
            .bind(id.as_i64())
            .bind(tenant_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| self.db_error("delete", e))?;
        tx.commit().await.map_err(|e| self.db_error("commit", e))?;

        let removed = result.rows_affected() > 0;
        if removed && self.descriptor.is_root() {
            debug!(world_id = %id, "Deleted world; dependents cascaded");
        }
        Ok(removed)
    }
}

/// Every World owned by `tenant_id`
pub(crate) async fn list_worlds(
    pool: &SqlitePool,
    worlds: &Arc<EntityDescriptor>,
    tenant_id: TenantId,
    page: Page,
) -> Result<Vec<EntityRecord>, RepoError> {
    let columns = std::iter::once("\"id\"".to_string())
        .chain(
            ["tenant_id", "created_at", "updated_at", "version"]
                .into_iter()
                .map(quote),
        )
        .chain(worlds.fields().iter().map(|f| quote(&f.name)))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {columns} FROM {} WHERE \"tenant_id\" = ? ORDER BY \"id\" LIMIT ? OFFSET ?",
        quote(WORLDS_TABLE)
    );
    let rows = sqlx::query(&sql)
        .bind(tenant_id.to_string())
        .bind(page.limit_i64())
        .bind(page.offset_i64())
        .fetch_all(pool)
        .await
        .map_err(|e| map_sqlx_error("list_worlds", WORLD_ENTITY, e))?;
    rows.iter().map(|row| decode_record(worlds, row)).collect()
}
