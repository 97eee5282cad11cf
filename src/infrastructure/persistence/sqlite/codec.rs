//! Mapping between catalog values and SQLite storage
//!
//! Column affinities: text, timestamp and json are TEXT, integer and boolean
//! are INTEGER, real is REAL. Timestamps are RFC 3339 UTC with nanosecond
//! precision, which keeps them lexically ordered and lossless.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite};

use crate::application::ports::outbound::RepoError;
use crate::domain::catalog::{EntityDescriptor, FieldKind, FieldSpec};
use crate::domain::entities::{EntityRecord, Envelope};
use crate::domain::value_objects::{EntityId, FieldValue, TenantId};

pub(crate) type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Double-quote an identifier. Catalog identifiers are already restricted to
/// `[a-z][a-z0-9_]*`; quoting keeps words like `status` or `key` legal.
pub(crate) fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

pub(crate) fn column_type(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Text | FieldKind::Timestamp | FieldKind::Json => "TEXT",
        FieldKind::Integer | FieldKind::Boolean => "INTEGER",
        FieldKind::Real => "REAL",
    }
}

pub(crate) fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn decode_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, RepoError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepoError::serialization(format!("Invalid datetime in {column}: {e}")))
}

pub(crate) fn decode_tenant_id(raw: &str) -> Result<TenantId, RepoError> {
    raw.parse()
        .map_err(|e| RepoError::serialization(format!("Invalid tenant id {raw:?}: {e}")))
}

/// Bind one domain column; an absent value binds NULL.
pub(crate) fn bind_value<'q>(query: SqliteQuery<'q>, value: Option<&FieldValue>) -> SqliteQuery<'q> {
    match value {
        None => query.bind(Option::<String>::None),
        Some(FieldValue::Text(s)) => query.bind(s.clone()),
        Some(FieldValue::Integer(i)) => query.bind(*i),
        Some(FieldValue::Real(r)) => query.bind(*r),
        Some(FieldValue::Boolean(b)) => query.bind(*b),
        Some(FieldValue::Timestamp(ts)) => query.bind(encode_timestamp(ts)),
        Some(FieldValue::Json(v)) => query.bind(v.to_string()),
    }
}

fn decode_error(column: &str, e: sqlx::Error) -> RepoError {
    RepoError::serialization(format!("Failed to read column {column}: {e}"))
}

fn decode_field(row: &SqliteRow, spec: &FieldSpec) -> Result<Option<FieldValue>, RepoError> {
    let column = spec.name.as_str();
    let value = match spec.kind {
        FieldKind::Text => row
            .try_get::<Option<String>, _>(column)
            .map_err(|e| decode_error(column, e))?
            .map(FieldValue::Text),
        FieldKind::Integer => row
            .try_get::<Option<i64>, _>(column)
            .map_err(|e| decode_error(column, e))?
            .map(FieldValue::Integer),
        FieldKind::Real => row
            .try_get::<Option<f64>, _>(column)
            .map_err(|e| decode_error(column, e))?
            .map(FieldValue::Real),
        FieldKind::Boolean => row
            .try_get::<Option<bool>, _>(column)
            .map_err(|e| decode_error(column, e))?
            .map(FieldValue::Boolean),
        FieldKind::Timestamp => row
            .try_get::<Option<String>, _>(column)
            .map_err(|e| decode_error(column, e))?
            .map(|raw| decode_timestamp(column, &raw).map(FieldValue::Timestamp))
            .transpose()?,
        FieldKind::Json => row
            .try_get::<Option<String>, _>(column)
            .map_err(|e| decode_error(column, e))?
            .map(|raw| {
                serde_json::from_str(&raw)
                    .map(FieldValue::Json)
                    .map_err(|e| RepoError::serialization(format!("Invalid JSON in {column}: {e}")))
            })
            .transpose()?,
    };
    Ok(value)
}

/// Rebuild a record from a full-row `SELECT`
pub(crate) fn decode_record(
    descriptor: &Arc<EntityDescriptor>,
    row: &SqliteRow,
) -> Result<EntityRecord, RepoError> {
    let id: i64 = row.try_get("id").map_err(|e| decode_error("id", e))?;
    let tenant_id: String = row
        .try_get("tenant_id")
        .map_err(|e| decode_error("tenant_id", e))?;
    let world_id: Option<i64> = if descriptor.is_root() {
        None
    } else {
        Some(row.try_get("world_id").map_err(|e| decode_error("world_id", e))?)
    };
    let created_at: String = row
        .try_get("created_at")
        .map_err(|e| decode_error("created_at", e))?;
    let updated_at: String = row
        .try_get("updated_at")
        .map_err(|e| decode_error("updated_at", e))?;
    let version: i64 = row.try_get("version").map_err(|e| decode_error("version", e))?;

    let envelope = Envelope::persisted(
        EntityId::from_raw(id),
        decode_tenant_id(&tenant_id)?,
        world_id.map(EntityId::from_raw),
        decode_timestamp("created_at", &created_at)?,
        decode_timestamp("updated_at", &updated_at)?,
        u64::try_from(version)
            .map_err(|_| RepoError::serialization(format!("Negative version {version}")))?,
    );

    let mut fields = BTreeMap::new();
    for spec in descriptor.fields() {
        if let Some(value) = decode_field(row, spec)? {
            fields.insert(spec.name.clone(), value);
        }
    }

    EntityRecord::from_storage(descriptor.clone(), envelope, fields).map_err(|e| {
        RepoError::serialization(format!(
            "Stored {} {} no longer validates: {}",
            descriptor.name(),
            id,
            e
        ))
    })
}

/// Translate a driver error, recognising constraint violations
pub(crate) fn map_sqlx_error(
    operation: &'static str,
    entity_type: &str,
    e: sqlx::Error,
) -> RepoError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return RepoError::duplicate(entity_type, db.message());
        }
        if db.is_foreign_key_violation() {
            return RepoError::not_found(entity_type, db.message());
        }
    }
    RepoError::database(operation, e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamps_keep_nanoseconds() {
        let ts = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let encoded = encode_timestamp(&ts);
        assert_eq!(encoded, "2023-11-14T22:13:20.123456789Z");
        assert_eq!(decode_timestamp("t", &encoded).unwrap(), ts);
    }

    #[test]
    fn test_encoded_timestamps_sort_lexically() {
        let a = Utc.timestamp_opt(1_700_000_000, 900_000_000).unwrap();
        let b = Utc.timestamp_opt(1_700_000_001, 0).unwrap();
        assert!(encode_timestamp(&a) < encode_timestamp(&b));
    }

    #[test]
    fn test_quote_and_column_types() {
        assert_eq!(quote("status"), "\"status\"");
        assert_eq!(column_type(FieldKind::Boolean), "INTEGER");
        assert_eq!(column_type(FieldKind::Json), "TEXT");
        assert_eq!(column_type(FieldKind::Real), "REAL");
    }
}
