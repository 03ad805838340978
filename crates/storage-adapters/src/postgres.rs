//! # Postgres Document Store
//!
//! Every collection lives in one `documents` table as JSONB keyed by
//! `(collection, id)`. Filters compile to SQL over `body`; a missing field
//! compares as JSON `null`, matching the in-memory evaluation.
//!
//! Patches are applied in Rust under `SELECT … FOR UPDATE`, so the whole
//! patch of one document commits as a unit and concurrent patches to the
//! same document serialize on the row lock.
//!
//! Partial unique indexes enforce the keys of `domains::unique_keys`; a
//! violation surfaces as `AppError::Conflict`.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::debug;
use uuid::Uuid;

use domains::{
    AppError, Collection, Condition, DocumentStore, Filter, FindOptions, Patch, Result,
    SortDirection,
};

use crate::memory::document_id;

const SCHEMA: &str = include_str!("../migrations/0001_documents.sql");

pub struct PgDocumentStore {
    pool: PgPool,
}

fn db_err(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::Conflict(format!(
            "{} already holds this value",
            db.constraint().unwrap_or("another document")
        )),
        _ => AppError::Internal(format!("database: {err}")),
    }
}

fn not_found(collection: Collection, id: Uuid) -> AppError {
    AppError::NotFound {
        entity: collection.as_str(),
        id: id.to_string(),
    }
}

/// Escapes LIKE metacharacters so the needle matches literally.
fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn push_field(qb: &mut QueryBuilder<'_, Postgres>, field: &str) {
    qb.push("coalesce(body -> ");
    qb.push_bind(field.to_string());
    qb.push(", 'null'::jsonb)");
}

/// Appends `WHERE collection = $n AND …` for the filter.
fn push_where(qb: &mut QueryBuilder<'_, Postgres>, collection: Collection, filter: &Filter) {
    qb.push(" WHERE collection = ");
    qb.push_bind(collection.as_str());
    for condition in &filter.conditions {
        qb.push(" AND ");
        match condition {
            Condition::Eq(field, value) => {
                push_field(qb, field);
                qb.push(" = ");
                qb.push_bind(Json(value.clone()));
            }
            Condition::Ne(field, value) => {
                push_field(qb, field);
                qb.push(" <> ");
                qb.push_bind(Json(value.clone()));
            }
            Condition::In(_, values) if values.is_empty() => {
                qb.push("FALSE");
            }
            Condition::In(field, values) => {
                push_field(qb, field);
                qb.push(" IN (");
                let mut list = qb.separated(", ");
                for value in values {
                    list.push_bind(Json(value.clone()));
                }
                list.push_unseparated(")");
            }
            Condition::ArrayContains(field, item) => {
                qb.push("(jsonb_typeof(body -> ");
                qb.push_bind(field.clone());
                qb.push(") = 'array' AND body -> ");
                qb.push_bind(field.clone());
                qb.push(" @> ");
                qb.push_bind(Json(Value::Array(vec![item.clone()])));
                qb.push(")");
            }
            Condition::TextContains(field, needle) => {
                qb.push("body ->> ");
                qb.push_bind(field.clone());
                qb.push(" ILIKE ");
                qb.push_bind(like_pattern(needle));
                qb.push(" ESCAPE '\\'");
            }
        }
    }
}

impl PgDocumentStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(db_err)?;
        Ok(Self::new(pool))
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the table and indexes when missing.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        debug!("document schema ready");
        Ok(())
    }

    async fn patch_locked(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        collection: Collection,
        id: Uuid,
        patch: &Patch,
    ) -> Result<Option<Value>> {
        let row = sqlx::query(
            "SELECT body FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE",
        )
        .bind(collection.as_str())
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_err)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let Json(mut body): Json<Value> = row.try_get("body").map_err(db_err)?;
        patch.apply(&mut body);
        sqlx::query("UPDATE documents SET body = $3 WHERE collection = $1 AND id = $2")
            .bind(collection.as_str())
            .bind(id)
            .bind(Json(&body))
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;
        Ok(Some(body))
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get_by_id(&self, collection: Collection, id: Uuid) -> Result<Value> {
        let row = sqlx::query("SELECT body FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection.as_str())
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| not_found(collection, id))?;
        let Json(body): Json<Value> = row.try_get("body").map_err(db_err)?;
        Ok(body)
    }

    async fn find(
        &self,
        collection: Collection,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Value>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT body FROM documents");
        push_where(&mut qb, collection, filter);
        if !options.sort.is_empty() {
            qb.push(" ORDER BY ");
            for (i, sort) in options.sort.iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                push_field(&mut qb, &sort.field);
                qb.push(match sort.direction {
                    SortDirection::Ascending => " ASC",
                    SortDirection::Descending => " DESC",
                });
            }
        }
        if let Some(limit) = options.limit {
            qb.push(" LIMIT ");
            qb.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if options.skip > 0 {
            qb.push(" OFFSET ");
            qb.push_bind(i64::try_from(options.skip).unwrap_or(i64::MAX));
        }

        let rows = qb.build().fetch_all(&self.pool).await.map_err(db_err)?;
        rows.into_iter()
            .map(|row| {
                let Json(body): Json<Value> = row.try_get("body").map_err(db_err)?;
                Ok(body)
            })
            .collect()
    }

    async fn count(&self, collection: Collection, filter: &Filter) -> Result<u64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) AS n FROM documents");
        push_where(&mut qb, collection, filter);
        let row = qb.build().fetch_one(&self.pool).await.map_err(db_err)?;
        let n: i64 = row.try_get("n").map_err(db_err)?;
        Ok(n as u64)
    }

    async fn insert(&self, collection: Collection, doc: Value) -> Result<Value> {
        let id = document_id(&doc)?;
        let inserted = sqlx::query(
            "INSERT INTO documents (collection, id, body) VALUES ($1, $2, $3) \
             ON CONFLICT (collection, id) DO NOTHING",
        )
        .bind(collection.as_str())
        .bind(id)
        .bind(Json(&doc))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if inserted.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "{collection} document {id} already exists"
            )));
        }
        Ok(doc)
    }

    async fn update_by_id(&self, collection: Collection, id: Uuid, patch: &Patch) -> Result<Value> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let updated = Self::patch_locked(&mut tx, collection, id, patch).await?;
        tx.commit().await.map_err(db_err)?;
        updated.ok_or_else(|| not_found(collection, id))
    }

    async fn update_many(
        &self,
        collection: Collection,
        filter: &Filter,
        patch: &Patch,
    ) -> Result<u64> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let mut qb = QueryBuilder::<Postgres>::new("SELECT id FROM documents");
        push_where(&mut qb, collection, filter);
        qb.push(" FOR UPDATE");
        let rows = qb.build().fetch_all(&mut *tx).await.map_err(db_err)?;

        let mut updated = 0;
        for row in rows {
            let id: Uuid = row.try_get("id").map_err(db_err)?;
            if Self::patch_locked(&mut tx, collection, id, patch).await?.is_some() {
                updated += 1;
            }
        }
        tx.commit().await.map_err(db_err)?;
        Ok(updated)
    }

    async fn delete_by_id(&self, collection: Collection, id: Uuid) -> Result<Value> {
        let row = sqlx::query(
            "DELETE FROM documents WHERE collection = $1 AND id = $2 RETURNING body",
        )
        .bind(collection.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or_else(|| not_found(collection, id))?;
        let Json(body): Json<Value> = row.try_get("body").map_err(db_err)?;
        Ok(body)
    }

    async fn delete_many(&self, collection: Collection, filter: &Filter) -> Result<u64> {
        let mut qb = QueryBuilder::<Postgres>::new("DELETE FROM documents");
        push_where(&mut qb, collection, filter);
        let done = qb.build().execute(&self.pool).await.map_err(db_err)?;
        Ok(done.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_metacharacters_are_escaped() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("rust"), "%rust%");
    }

    #[test]
    fn filters_compile_to_parameterized_sql() {
        let filter = Filter::new()
            .eq("questionId", "q")
            .one_of("status", vec![])
            .contains("tags", "rust")
            .text("title", "tokio");
        let mut qb = QueryBuilder::<Postgres>::new("SELECT body FROM documents");
        push_where(&mut qb, Collection::Questions, &filter);
        let sql = qb.sql();
        assert!(sql.contains("WHERE collection = $1"));
        assert!(sql.contains("coalesce(body -> $2, 'null'::jsonb) = $3"));
        assert!(sql.contains("FALSE"));
        assert!(sql.contains("@>"));
        assert!(sql.contains("ILIKE"));
    }

    #[test]
    fn schema_declares_the_unique_keys() {
        for index in [
            "documents_user_email_key",
            "documents_user_username_key",
            "documents_accepted_answer_key",
        ] {
            assert!(SCHEMA.contains(index), "{index} missing");
        }
    }
}
