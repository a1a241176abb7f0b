//! Provider-agnostic store for dynamic collections (`/api/query/{slug}`).
//!
//! Collections are free-form JSON documents. The active backend is selected by
//! the `STORE_PROVIDER` environment variable; `postgres` is the in-tree
//! implementation, which materializes collections as real tables and widens
//! them column-by-column on first write. This is a convenience layer for admin
//! tooling: there is no schema versioning, no rollback and no protection
//! against concurrent writers racing on DDL.

use serde_json::Value;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::{AppError, AppResult},
};

pub mod postgres;

use postgres::PostgresStore;

/// Core application tables that the dynamic store must never touch.
pub const RESERVED_TABLES: &[&str] = &[
    "users",
    "shop_items",
    "cart_items",
    "orders",
    "order_items",
    "user_tokens",
    "audit_logs",
    "_sqlx_migrations",
];

/// Identifiers are interpolated into DDL/DML, so they are restricted to a
/// shape that cannot break out of a quoted identifier.
pub fn validate_ident(ident: &str) -> Result<(), AppError> {
    let mut chars = ident.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_');
    let valid_rest =
        chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !valid_start || !valid_rest || ident.len() > 63 {
        return Err(AppError::BadRequest(format!(
            "invalid identifier: {ident:?}"
        )));
    }
    Ok(())
}

pub fn validate_slug(slug: &str) -> Result<(), AppError> {
    validate_ident(slug)?;
    if RESERVED_TABLES.contains(&slug) {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

/// Map a JSON value to the SQL type a new column gets for it.
pub fn infer_sql_type(value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => "BOOLEAN",
        Value::Number(n) if n.is_i64() || n.is_u64() => "BIGINT",
        Value::Number(_) => "DOUBLE PRECISION",
        Value::Array(_) | Value::Object(_) => "JSONB",
        // Strings and nulls both land in TEXT; null carries no type information.
        Value::String(_) | Value::Null => "TEXT",
    }
}

/// Pluggable store backend. Matching the provider string happens once at
/// startup; every request dispatches through this enum.
pub enum Store {
    Postgres(PostgresStore),
}

impl Store {
    pub fn from_config(provider: &str, pool: DbPool) -> anyhow::Result<Self> {
        match provider {
            "postgres" => Ok(Store::Postgres(PostgresStore::new(pool))),
            other => anyhow::bail!("unknown store provider: {other}"),
        }
    }

    pub async fn list(
        &self,
        slug: &str,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<Value>, i64)> {
        validate_slug(slug)?;
        match self {
            Store::Postgres(store) => store.list(slug, limit, offset).await,
        }
    }

    pub async fn get(&self, slug: &str, id: Uuid) -> AppResult<Value> {
        validate_slug(slug)?;
        match self {
            Store::Postgres(store) => store.get(slug, id).await,
        }
    }

    pub async fn insert(&self, slug: &str, payload: Value) -> AppResult<Value> {
        validate_slug(slug)?;
        let fields = object_fields(payload)?;
        match self {
            Store::Postgres(store) => store.insert(slug, fields).await,
        }
    }

    pub async fn update(&self, slug: &str, id: Uuid, payload: Value) -> AppResult<Value> {
        validate_slug(slug)?;
        let fields = object_fields(payload)?;
        if fields.is_empty() {
            return Err(AppError::BadRequest("empty update payload".into()));
        }
        match self {
            Store::Postgres(store) => store.update(slug, id, fields).await,
        }
    }

    pub async fn delete(&self, slug: &str, id: Uuid) -> AppResult<()> {
        validate_slug(slug)?;
        match self {
            Store::Postgres(store) => store.delete(slug, id).await,
        }
    }
}

/// Flatten a JSON object into (column, value) pairs, dropping the columns the
/// backend owns and validating every key as an identifier.
fn object_fields(payload: Value) -> AppResult<Vec<(String, Value)>> {
    let Value::Object(map) = payload else {
        return Err(AppError::BadRequest("payload must be a JSON object".into()));
    };

    let mut fields = Vec::with_capacity(map.len());
    for (key, value) in map {
        if key == "id" || key == "created_at" {
            continue;
        }
        validate_ident(&key)?;
        // Integral columns are BIGINT; anything past i64 cannot be bound.
        if let Value::Number(n) = &value {
            if n.is_u64() && n.as_i64().is_none() {
                return Err(AppError::BadRequest(format!(
                    "integer value for {key:?} is out of range"
                )));
            }
        }
        fields.push((key, value));
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn slug_validation_accepts_snake_case() {
        assert!(validate_slug("tarot_readings").is_ok());
        assert!(validate_slug("_private").is_ok());
    }

    #[test]
    fn slug_validation_rejects_injection_shapes() {
        assert!(validate_slug("Readings").is_err());
        assert!(validate_slug("a b").is_err());
        assert!(validate_slug("t\"; DROP TABLE users; --").is_err());
        assert!(validate_slug("1starts_with_digit").is_err());
        assert!(validate_slug("").is_err());
        assert!(validate_slug(&"x".repeat(64)).is_err());
    }

    #[test]
    fn slug_validation_rejects_reserved_tables() {
        for table in RESERVED_TABLES {
            assert!(matches!(validate_slug(table), Err(AppError::Forbidden)));
        }
    }

    #[test]
    fn sql_types_follow_json_value_kind() {
        assert_eq!(infer_sql_type(&json!(true)), "BOOLEAN");
        assert_eq!(infer_sql_type(&json!(42)), "BIGINT");
        assert_eq!(infer_sql_type(&json!(-7)), "BIGINT");
        assert_eq!(infer_sql_type(&json!(1.5)), "DOUBLE PRECISION");
        assert_eq!(infer_sql_type(&json!("hello")), "TEXT");
        assert_eq!(infer_sql_type(&json!(null)), "TEXT");
        assert_eq!(infer_sql_type(&json!([1, 2])), "JSONB");
        assert_eq!(infer_sql_type(&json!({"a": 1})), "JSONB");
    }

    #[test]
    fn object_fields_skips_backend_owned_columns() {
        let fields = object_fields(json!({
            "id": "ignored",
            "created_at": "ignored",
            "title": "The Tower",
            "rank": 16
        }))
        .unwrap();
        let keys: Vec<_> = fields.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["rank", "title"]);
    }

    #[test]
    fn object_fields_rejects_non_objects() {
        assert!(object_fields(json!([1, 2, 3])).is_err());
        assert!(object_fields(json!("scalar")).is_err());
    }

    #[test]
    fn object_fields_rejects_invalid_keys() {
        assert!(object_fields(json!({"bad key": 1})).is_err());
    }

    #[test]
    fn object_fields_rejects_integers_past_i64() {
        assert!(matches!(
            object_fields(json!({"n": u64::MAX})),
            Err(AppError::BadRequest(_))
        ));
        assert!(object_fields(json!({"n": i64::MAX})).is_ok());
    }
}
