//! Schema provisioner - the only writer of DDL
//!
//! Brings an SQLite database in line with the catalog at startup:
//!
//! 1. `tenants`, then `worlds`, then one table per dependent type, each
//!    created if absent
//! 2. optional catalog columns missing from an existing table are added with
//!    `ALTER TABLE ... ADD COLUMN`
//! 3. scope, cascade and unique indexes
//!
//! All of it runs in one transaction; any failing statement rolls the whole
//! pass back and names the entity type that caused it. Verification is a
//! separate read-only pass that runs even when provisioning is switched off.

use std::collections::{BTreeMap, HashSet};

use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use thiserror::Error;
use tracing::{debug, info, instrument};

use super::codec::{column_type, quote};
use crate::domain::aggregates::CascadePlan;
use crate::domain::catalog::{
    Catalog, EntityDescriptor, ENVELOPE_COLUMNS, TENANTS_TABLE, WORLDS_TABLE,
};

#[derive(Debug, Error)]
pub enum SchemaProvisioningError {
    #[error("Provisioning {entity_type} (table {table}) failed: {source}")]
    Statement {
        entity_type: String,
        table: String,
        source: sqlx::Error,
    },

    #[error("Provisioning transaction failed: {0}")]
    Transaction(#[source] sqlx::Error),

    #[error("{entity_type}: table {table} does not exist")]
    MissingTable { entity_type: String, table: String },

    #[error("{entity_type}: table {table} has no column {column}")]
    MissingColumn {
        entity_type: String,
        table: String,
        column: String,
    },

    #[error("{entity_type}: required column {column} cannot be added to existing table {table}")]
    RequiredColumnMissing {
        entity_type: String,
        table: String,
        column: String,
    },

    #[error("Table worlds has a world_id column; World is the aggregate root and must not reference itself")]
    LegacyWorldColumn,

    #[error("{entity_type}: table {table} lacks world_id REFERENCES worlds(id) ON DELETE CASCADE")]
    MissingCascade { entity_type: String, table: String },

    #[error("{entity_type}: table {table} has no unique index on ({scope}, {column})")]
    MissingUniqueIndex {
        entity_type: String,
        table: String,
        scope: String,
        column: String,
    },
}

/// What a provisioning pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisioningReport {
    pub tables_created: Vec<String>,
    /// (table, column)
    pub columns_added: Vec<(String, String)>,
}

impl ProvisioningReport {
    pub fn is_noop(&self) -> bool {
        self.tables_created.is_empty() && self.columns_added.is_empty()
    }
}

pub struct SchemaProvisioner<'a> {
    catalog: &'a Catalog,
}

impl<'a> SchemaProvisioner<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    // =========================================================================
    // DDL
    // =========================================================================

    pub fn tenants_table_sql() -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             \"id\" TEXT PRIMARY KEY, \
             \"name\" TEXT NOT NULL, \
             \"created_at\" TEXT NOT NULL)",
            quote(TENANTS_TABLE)
        )
    }

    /// `CREATE TABLE IF NOT EXISTS` for one entity type.
    ///
    /// World references `tenants`; every other type references `worlds` and
    /// has no tenant foreign key of its own.
    pub fn create_table_sql(descriptor: &EntityDescriptor) -> String {
        let mut columns = vec!["\"id\" INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];
        if descriptor.is_root() {
            columns.push(format!(
                "\"tenant_id\" TEXT NOT NULL REFERENCES {}(\"id\") ON DELETE CASCADE",
                quote(TENANTS_TABLE)
            ));
        } else {
            columns.push("\"tenant_id\" TEXT NOT NULL".to_string());
            columns.push(format!(
                "\"world_id\" INTEGER NOT NULL REFERENCES {}(\"id\") ON DELETE CASCADE",
                quote(WORLDS_TABLE)
            ));
        }
        columns.push("\"created_at\" TEXT NOT NULL".to_string());
        columns.push("\"updated_at\" TEXT NOT NULL".to_string());
        columns.push("\"version\" INTEGER NOT NULL DEFAULT 1".to_string());

        for field in descriptor.fields() {
            let null = if field.required { " NOT NULL" } else { "" };
            columns.push(format!(
                "{} {}{}",
                quote(&field.name),
                column_type(field.kind),
                null
            ));
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            quote(descriptor.table()),
            columns.join(",\n    ")
        )
    }

    pub fn index_sql(descriptor: &EntityDescriptor) -> Vec<String> {
        let table = descriptor.table();
        let scope_column = unique_scope(descriptor);
        let mut statements = Vec::new();

        if descriptor.is_root() {
            statements.push(format!(
                "CREATE INDEX IF NOT EXISTS {} ON {}(\"tenant_id\", \"id\")",
                quote(&format!("idx_{table}_scope")),
                quote(table)
            ));
        } else {
            statements.push(format!(
                "CREATE INDEX IF NOT EXISTS {} ON {}(\"tenant_id\", \"world_id\", \"id\")",
                quote(&format!("idx_{table}_scope")),
                quote(table)
            ));
            statements.push(format!(
                "CREATE INDEX IF NOT EXISTS {} ON {}(\"world_id\")",
                quote(&format!("idx_{table}_world")),
                quote(table)
            ));
        }

        for field in descriptor.unique_fields() {
            statements.push(format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {}({}, {})",
                quote(&format!("uq_{table}_{}", field.name)),
                quote(table),
                quote(scope_column),
                quote(&field.name)
            ));
        }
        statements
    }

    // =========================================================================
    // Provisioning
    // =========================================================================

    /// Create and extend every catalog table in a single transaction
    #[instrument(skip_all, fields(entity_types = self.catalog.len()))]
    pub async fn provision(
        &self,
        pool: &SqlitePool,
    ) -> Result<ProvisioningReport, SchemaProvisioningError> {
        let mut tx = pool
            .begin()
            .await
            .map_err(SchemaProvisioningError::Transaction)?;
        let mut report = ProvisioningReport::default();

        sqlx::query(&Self::tenants_table_sql())
            .execute(&mut *tx)
            .await
            .map_err(|source| SchemaProvisioningError::Statement {
                entity_type: "Tenant".to_string(),
                table: TENANTS_TABLE.to_string(),
                source,
            })?;

        for descriptor in self.catalog.descriptors() {
            self.provision_entity(&mut tx, descriptor, &mut report).await?;
        }

        tx.commit()
            .await
            .map_err(SchemaProvisioningError::Transaction)?;

        info!(
            tables_created = report.tables_created.len(),
            columns_added = report.columns_added.len(),
            "Schema provisioned"
        );
        Ok(report)
    }

    async fn provision_entity(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        descriptor: &EntityDescriptor,
        report: &mut ProvisioningReport,
    ) -> Result<(), SchemaProvisioningError> {
        let table = descriptor.table();
        let statement_error = |source| SchemaProvisioningError::Statement {
            entity_type: descriptor.name().to_string(),
            table: table.to_string(),
            source,
        };

        let existing = table_columns(&mut **tx, table)
            .await
            .map_err(statement_error)?;

        if existing.is_empty() {
            sqlx::query(&Self::create_table_sql(descriptor))
                .execute(&mut **tx)
                .await
                .map_err(statement_error)?;
            report.tables_created.push(table.to_string());
            debug!(entity_type = descriptor.name(), table, "Created table");
        } else {
            check_envelope(descriptor, &existing)?;
            for field in descriptor.fields() {
                if existing.contains(&field.name) {
                    continue;
                }
                if field.required {
                    return Err(SchemaProvisioningError::RequiredColumnMissing {
                        entity_type: descriptor.name().to_string(),
                        table: table.to_string(),
                        column: field.name.clone(),
                    });
                }
                let alter = format!(
                    "ALTER TABLE {} ADD COLUMN {} {}",
                    quote(table),
                    quote(&field.name),
                    column_type(field.kind)
                );
                sqlx::query(&alter)
                    .execute(&mut **tx)
                    .await
                    .map_err(statement_error)?;
                report
                    .columns_added
                    .push((table.to_string(), field.name.clone()));
                debug!(entity_type = descriptor.name(), table, column = %field.name, "Added column");
            }
        }

        for statement in Self::index_sql(descriptor) {
            sqlx::query(&statement)
                .execute(&mut **tx)
                .await
                .map_err(statement_error)?;
        }
        Ok(())
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Check that every catalog table and column exists, that `worlds` does
    /// not carry `world_id`, that every dependent cascades from `worlds`, and
    /// that every `unique` field is backed by a scoped unique index.
    #[instrument(skip_all)]
    pub async fn verify(&self, pool: &SqlitePool) -> Result<(), SchemaProvisioningError> {
        let cascade = CascadePlan::for_catalog(self.catalog);

        for descriptor in self.catalog.descriptors() {
            let table = descriptor.table();
            let statement_error = |source| SchemaProvisioningError::Statement {
                entity_type: descriptor.name().to_string(),
                table: table.to_string(),
                source,
            };

            let existing = table_columns(pool, table).await.map_err(statement_error)?;
            if existing.is_empty() {
                return Err(SchemaProvisioningError::MissingTable {
                    entity_type: descriptor.name().to_string(),
                    table: table.to_string(),
                });
            }
            check_envelope(descriptor, &existing)?;
            for field in descriptor.fields() {
                if !existing.contains(&field.name) {
                    return Err(SchemaProvisioningError::MissingColumn {
                        entity_type: descriptor.name().to_string(),
                        table: table.to_string(),
                        column: field.name.clone(),
                    });
                }
            }

            if cascade.covers(descriptor.name()) {
                let cascades = sqlx::query(
                    "SELECT COUNT(*) AS n FROM pragma_foreign_key_list(?) \
                     WHERE \"table\" = ? AND \"from\" = 'world_id' AND \"on_delete\" = 'CASCADE'",
                )
                .bind(table)
                .bind(WORLDS_TABLE)
                .fetch_one(pool)
                .await
                .map_err(statement_error)?
                .try_get::<i64, _>("n")
                .map_err(statement_error)?;
                if cascades == 0 {
                    return Err(SchemaProvisioningError::MissingCascade {
                        entity_type: descriptor.name().to_string(),
                        table: table.to_string(),
                    });
                }
            }

            let unique_keys = unique_indexes(pool, table).await.map_err(statement_error)?;
            let scope = unique_scope(descriptor);
            for field in descriptor.unique_fields() {
                let backed = unique_keys.values().any(|columns| {
                    matches!(columns.as_slice(), [first, second] if first == scope && *second == field.name)
                });
                if !backed {
                    return Err(SchemaProvisioningError::MissingUniqueIndex {
                        entity_type: descriptor.name().to_string(),
                        table: table.to_string(),
                        scope: scope.to_string(),
                        column: field.name.clone(),
                    });
                }
            }
        }

        info!(tables = self.catalog.len(), "Schema verified");
        Ok(())
    }
}

/// Envelope columns must all be present; `worlds` must never have `world_id`.
fn check_envelope(
    descriptor: &EntityDescriptor,
    existing: &HashSet<String>,
) -> Result<(), SchemaProvisioningError> {
    if descriptor.is_root() && existing.contains("world_id") {
        return Err(SchemaProvisioningError::LegacyWorldColumn);
    }
    for column in ENVELOPE_COLUMNS {
        if descriptor.is_root() && column == "world_id" {
            continue;
        }
        if !existing.contains(column) {
            return Err(SchemaProvisioningError::MissingColumn {
                entity_type: descriptor.name().to_string(),
                table: descriptor.table().to_string(),
                column: column.to_string(),
            });
        }
    }
    Ok(())
}

/// Unique fields are scoped to the owning world, or to the tenant for World.
fn unique_scope(descriptor: &EntityDescriptor) -> &'static str {
    if descriptor.is_root() {
        "tenant_id"
    } else {
        "world_id"
    }
}

/// Key columns of every unique index on `table`, by index name
async fn unique_indexes(
    pool: &SqlitePool,
    table: &str,
) -> Result<BTreeMap<String, Vec<String>>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT il.name AS index_name, ii.name AS column_name \
         FROM pragma_index_list(?) AS il, pragma_index_info(il.name) AS ii \
         WHERE il.\"unique\" = 1 ORDER BY il.name, ii.seqno",
    )
    .bind(table)
    .fetch_all(pool)
    .await?;

    let mut indexes: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for row in rows {
        let index: String = row.try_get("index_name")?;
        // expression columns have no name
        let column: Option<String> = row.try_get("column_name")?;
        indexes.entry(index).or_default().push(column.unwrap_or_default());
    }
    Ok(indexes)
}

/// Column names of `table`; empty if the table does not exist
async fn table_columns<'e, E>(executor: E, table: &str) -> Result<HashSet<String>, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query("SELECT name FROM pragma_table_info(?)")
        .bind(table)
        .fetch_all(executor)
        .await?;
    rows.iter().map(|row| row.try_get::<String, _>("name")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

    const SMALL_CATALOG: &str = r#"
        [world]
        fields = [{ name = "name", kind = "text", required = true, unique = true }]

        [[entity]]
        name = "Army"
        table = "armies"
        fields = [
          { name = "name", kind = "text", required = true, unique = true },
          { name = "size", kind = "integer", required = true, min = 0 },
          { name = "status", kind = "text" },
        ]
    "#;

    async fn pool(dir: &tempfile::TempDir) -> SqlitePool {
        let options = SqliteConnectOptions::new()
            .filename(dir.path().join("vault.db"))
            .create_if_missing(true)
            .foreign_keys(true);
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap()
    }

    #[test]
    fn test_world_table_has_no_world_id() {
        let catalog = Catalog::from_toml_str(SMALL_CATALOG).unwrap();
        let worlds = SchemaProvisioner::create_table_sql(catalog.world());
        assert!(!worlds.contains("\"world_id\""));
        assert!(worlds.contains("REFERENCES \"tenants\"(\"id\") ON DELETE CASCADE"));

        let armies = SchemaProvisioner::create_table_sql(catalog.get("Army").unwrap());
        assert!(armies.contains(
            "\"world_id\" INTEGER NOT NULL REFERENCES \"worlds\"(\"id\") ON DELETE CASCADE"
        ));
        assert!(armies.contains("\"size\" INTEGER NOT NULL"));
        assert!(armies.contains("\"status\" TEXT"));
    }

    #[test]
    fn test_unique_indexes_are_scoped() {
        let catalog = Catalog::from_toml_str(SMALL_CATALOG).unwrap();
        let world_indexes = SchemaProvisioner::index_sql(catalog.world());
        assert!(world_indexes
            .iter()
            .any(|s| s.contains("UNIQUE") && s.contains("(\"tenant_id\", \"name\")")));

        let army_indexes = SchemaProvisioner::index_sql(catalog.get("Army").unwrap());
        assert_eq!(army_indexes.len(), 3);
        assert!(army_indexes
            .iter()
            .any(|s| s.contains("UNIQUE") && s.contains("(\"world_id\", \"name\")")));
    }

    #[tokio::test]
    async fn test_provision_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(&dir).await;
        let catalog = Catalog::from_toml_str(SMALL_CATALOG).unwrap();
        let provisioner = SchemaProvisioner::new(&catalog);

        let first = provisioner.provision(&pool).await.unwrap();
        assert_eq!(first.tables_created, vec!["worlds", "armies"]);

        let second = provisioner.provision(&pool).await.unwrap();
        assert!(second.is_noop());
        provisioner.verify(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_full_catalog_provisions_and_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(&dir).await;
        let catalog = Catalog::embedded().unwrap();
        let provisioner = SchemaProvisioner::new(&catalog);

        let report = provisioner.provision(&pool).await.unwrap();
        assert_eq!(report.tables_created.len(), catalog.len());
        provisioner.verify(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_optional_columns_are_added() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(&dir).await;
        let catalog = Catalog::from_toml_str(SMALL_CATALOG).unwrap();
        SchemaProvisioner::new(&catalog).provision(&pool).await.unwrap();

        let extended = Catalog::from_toml_str(&SMALL_CATALOG.replace(
            r#"{ name = "status", kind = "text" },"#,
            r#"{ name = "status", kind = "text" },
               { name = "banner", kind = "text" },"#,
        ))
        .unwrap();
        let report = SchemaProvisioner::new(&extended).provision(&pool).await.unwrap();
        assert_eq!(
            report.columns_added,
            vec![("armies".to_string(), "banner".to_string())]
        );
        SchemaProvisioner::new(&extended).verify(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_required_column_cannot_be_added_and_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(&dir).await;
        let catalog = Catalog::from_toml_str(SMALL_CATALOG).unwrap();
        SchemaProvisioner::new(&catalog).provision(&pool).await.unwrap();

        let extended = Catalog::from_toml_str(&SMALL_CATALOG.replace(
            r#"{ name = "status", kind = "text" },"#,
            r#"{ name = "status", kind = "text" },
               { name = "banner", kind = "text" },
               { name = "morale", kind = "integer", required = true },"#,
        ))
        .unwrap();
        let err = SchemaProvisioner::new(&extended)
            .provision(&pool)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SchemaProvisioningError::RequiredColumnMissing { ref column, .. } if column == "morale"
        ));

        // the optional column added earlier in the same pass was rolled back
        let columns = table_columns(&pool, "armies").await.unwrap();
        assert!(!columns.contains("banner"));
    }

    #[tokio::test]
    async fn test_verify_rejects_legacy_world_table() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(&dir).await;
        sqlx::query(
            "CREATE TABLE worlds (id INTEGER PRIMARY KEY, tenant_id TEXT NOT NULL, \
             world_id INTEGER REFERENCES worlds(id), created_at TEXT NOT NULL, \
             updated_at TEXT NOT NULL, version INTEGER NOT NULL, name TEXT NOT NULL)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let catalog = Catalog::from_toml_str(SMALL_CATALOG).unwrap();
        let provisioner = SchemaProvisioner::new(&catalog);
        assert!(matches!(
            provisioner.verify(&pool).await.unwrap_err(),
            SchemaProvisioningError::LegacyWorldColumn
        ));
        assert!(matches!(
            provisioner.provision(&pool).await.unwrap_err(),
            SchemaProvisioningError::LegacyWorldColumn
        ));
    }

    #[tokio::test]
    async fn test_verify_catches_unique_index_name_clash() {
        // armies.x_name and armies_x.name both derive uq_armies_x_name
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(&dir).await;
        let catalog = Catalog::from_toml_str(
            r#"
            [world]
            fields = [{ name = "name", kind = "text", required = true, unique = true }]

            [[entity]]
            name = "Army"
            table = "armies"
            fields = [{ name = "x_name", kind = "text", unique = true }]

            [[entity]]
            name = "ArmyX"
            table = "armies_x"
            fields = [{ name = "name", kind = "text", required = true, unique = true }]
            "#,
        )
        .unwrap();
        let provisioner = SchemaProvisioner::new(&catalog);
        provisioner.provision(&pool).await.unwrap();

        let err = provisioner.verify(&pool).await.unwrap_err();
        assert!(matches!(
            err,
            SchemaProvisioningError::MissingUniqueIndex { ref entity_type, ref column, .. }
                if entity_type == "ArmyX" && column == "name"
        ));
    }

    #[tokio::test]
    async fn test_verify_requires_unique_index() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(&dir).await;
        let catalog = Catalog::from_toml_str(SMALL_CATALOG).unwrap();
        let provisioner = SchemaProvisioner::new(&catalog);
        provisioner.provision(&pool).await.unwrap();
        provisioner.verify(&pool).await.unwrap();

        sqlx::query("DROP INDEX \"uq_armies_name\"")
            .execute(&pool)
            .await
            .unwrap();
        let err = provisioner.verify(&pool).await.unwrap_err();
        assert!(matches!(
            err,
            SchemaProvisioningError::MissingUniqueIndex { ref table, ref scope, .. }
                if table == "armies" && scope == "world_id"
        ));

        // re-provisioning restores it
        provisioner.provision(&pool).await.unwrap();
        provisioner.verify(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_verify_reports_missing_table() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(&dir).await;
        let catalog = Catalog::from_toml_str(SMALL_CATALOG).unwrap();
        let err = SchemaProvisioner::new(&catalog).verify(&pool).await.unwrap_err();
        assert!(matches!(
            err,
            SchemaProvisioningError::MissingTable { ref entity_type, .. } if entity_type == "World"
        ));
    }

    #[tokio::test]
    async fn test_verify_requires_cascade() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(&dir).await;
        let catalog = Catalog::from_toml_str(SMALL_CATALOG).unwrap();
        let provisioner = SchemaProvisioner::new(&catalog);

        sqlx::query(
            "CREATE TABLE armies (id INTEGER PRIMARY KEY, tenant_id TEXT NOT NULL, \
             world_id INTEGER NOT NULL REFERENCES worlds(id), created_at TEXT NOT NULL, \
             updated_at TEXT NOT NULL, version INTEGER NOT NULL, name TEXT NOT NULL, \
             size INTEGER NOT NULL, status TEXT)",
        )
        .execute(&pool)
        .await
        .unwrap();
        provisioner.provision(&pool).await.unwrap();

        let err = provisioner.verify(&pool).await.unwrap_err();
        assert!(matches!(
            err,
            SchemaProvisioningError::MissingCascade { ref entity_type, .. } if entity_type == "Army"
        ));
    }
}
