//! Postgres backend for the dynamic-collection store.
//!
//! Collections become plain tables with an `id` UUID key and a `created_at`
//! timestamp; remaining columns are added lazily when a write first mentions
//! them, typed by [`super::infer_sql_type`]. Identifiers are only ever
//! interpolated after passing [`super::validate_ident`].

use serde_json::Value;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::{AppError, AppResult},
    store::infer_sql_type,
};

pub struct PostgresStore {
    pool: DbPool,
}

impl PostgresStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn list(
        &self,
        slug: &str,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<Value>, i64)> {
        if !self.table_exists(slug).await? {
            return Err(AppError::NotFound);
        }

        let rows: Vec<(Value,)> = sqlx::query_as(&format!(
            r#"SELECT to_jsonb(t.*) FROM "{slug}" t ORDER BY created_at DESC LIMIT $1 OFFSET $2"#
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: (i64,) = sqlx::query_as(&format!(r#"SELECT COUNT(*) FROM "{slug}""#))
            .fetch_one(&self.pool)
            .await?;

        Ok((rows.into_iter().map(|(row,)| row).collect(), total.0))
    }

    pub async fn get(&self, slug: &str, id: Uuid) -> AppResult<Value> {
        if !self.table_exists(slug).await? {
            return Err(AppError::NotFound);
        }

        let row: Option<(Value,)> = sqlx::query_as(&format!(
            r#"SELECT to_jsonb(t.*) FROM "{slug}" t WHERE id = $1"#
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(row,)| row).ok_or(AppError::NotFound)
    }

    pub async fn insert(&self, slug: &str, fields: Vec<(String, Value)>) -> AppResult<Value> {
        self.ensure_columns(slug, &fields).await?;

        if fields.is_empty() {
            let row: (Value,) = sqlx::query_as(&format!(
                r#"INSERT INTO "{slug}" DEFAULT VALUES RETURNING to_jsonb("{slug}".*)"#
            ))
            .fetch_one(&self.pool)
            .await?;
            return Ok(row.0);
        }

        let mut qb = QueryBuilder::<Postgres>::new(format!(r#"INSERT INTO "{slug}" ("#));
        let mut columns = qb.separated(", ");
        for (column, _) in &fields {
            columns.push(format!(r#""{column}""#));
        }
        qb.push(") VALUES (");
        let mut values = qb.separated(", ");
        for (_, value) in &fields {
            push_bind_value(&mut values, value);
        }
        qb.push(format!(r#") RETURNING to_jsonb("{slug}".*)"#));

        let row: (Value,) = qb.build_query_as().fetch_one(&self.pool).await?;
        Ok(row.0)
    }

    pub async fn update(
        &self,
        slug: &str,
        id: Uuid,
        fields: Vec<(String, Value)>,
    ) -> AppResult<Value> {
        if !self.table_exists(slug).await? {
            return Err(AppError::NotFound);
        }
        self.ensure_columns(slug, &fields).await?;

        let mut qb = QueryBuilder::<Postgres>::new(format!(r#"UPDATE "{slug}" SET "#));
        let mut assignments = qb.separated(", ");
        for (column, value) in &fields {
            assignments.push(format!(r#""{column}" = "#));
            push_bind_value_unseparated(&mut assignments, value);
        }
        qb.push(" WHERE id = ");
        qb.push_bind(id);
        qb.push(format!(r#" RETURNING to_jsonb("{slug}".*)"#));

        let row: Option<(Value,)> = qb.build_query_as().fetch_optional(&self.pool).await?;
        row.map(|(row,)| row).ok_or(AppError::NotFound)
    }

    pub async fn delete(&self, slug: &str, id: Uuid) -> AppResult<()> {
        if !self.table_exists(slug).await? {
            return Err(AppError::NotFound);
        }

        let result = sqlx::query(&format!(r#"DELETE FROM "{slug}" WHERE id = $1"#))
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn table_exists(&self, slug: &str) -> AppResult<bool> {
        let exists: (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(slug)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists.0)
    }

    /// Create the table on first use and add any columns this payload mentions
    /// that the table does not have yet.
    async fn ensure_columns(&self, slug: &str, fields: &[(String, Value)]) -> AppResult<()> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{slug}" (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#
        ))
        .execute(&self.pool)
        .await?;

        let existing: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT column_name FROM information_schema.columns
            WHERE table_schema = 'public' AND table_name = $1
            "#,
        )
        .bind(slug)
        .fetch_all(&self.pool)
        .await?;

        for (column, value) in fields {
            if existing.iter().any(|(name,)| name == column) {
                continue;
            }
            let sql_type = infer_sql_type(value);
            sqlx::query(&format!(
                r#"ALTER TABLE "{slug}" ADD COLUMN IF NOT EXISTS "{column}" {sql_type}"#
            ))
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }
}

fn push_bind_value(separated: &mut sqlx::query_builder::Separated<'_, '_, Postgres, &str>, value: &Value) {
    match value {
        Value::Null => {
            separated.push("NULL");
        }
        Value::Bool(b) => {
            separated.push_bind(*b);
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                separated.push_bind(i);
            } else {
                separated.push_bind(n.as_f64().unwrap_or(0.0));
            }
        }
        Value::String(s) => {
            separated.push_bind(s.clone());
        }
        other => {
            separated.push_bind(other.clone());
        }
    }
}

fn push_bind_value_unseparated(
    separated: &mut sqlx::query_builder::Separated<'_, '_, Postgres, &str>,
    value: &Value,
) {
    match value {
        Value::Null => {
            separated.push_unseparated("NULL");
        }
        Value::Bool(b) => {
            separated.push_bind_unseparated(*b);
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                separated.push_bind_unseparated(i);
            } else {
                separated.push_bind_unseparated(n.as_f64().unwrap_or(0.0));
            }
        }
        Value::String(s) => {
            separated.push_bind_unseparated(s.clone());
        }
        other => {
            separated.push_bind_unseparated(other.clone());
        }
    }
}
