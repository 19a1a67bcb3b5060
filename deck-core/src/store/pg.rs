use async_trait::async_trait;
use log::info;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, query, query_scalar, types::Json, Error as SqlxError, PgPool};

use crate::{Document, DocumentStore, Id, Query, SortOrder, StoreError, StoreResult};

const UNIQUE_VIOLATION: &str = "23505";

/// A postgres document store.
/// Every collection lives in one `documents` table, keyed by (collection, id), with the body as JSONB.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn new(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| e.any())?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    async fn migrate(&self) -> StoreResult<()> {
        query(
            "
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                data JSONB NOT NULL,
                PRIMARY KEY (collection, id)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        info!("Document table is ready");
        Ok(())
    }
}

fn into_document(collection: &str, value: Value) -> StoreResult<Document> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Malformed {
            collection: collection.to_string(),
            reason: format!("expected an object, got {}", other),
        }),
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn find(&self, collection: &str, query: &Query) -> StoreResult<Vec<Document>> {
        // The direction is never user input, so it is safe to format into the statement.
        let order_by = match &query.sort {
            Some((_, SortOrder::Ascending)) => "data -> $3 ASC, id ASC",
            Some((_, SortOrder::Descending)) => "data -> $3 DESC, id DESC",
            None => "id ASC",
        };

        let statement = format!(
            "SELECT data FROM documents
            WHERE collection = $1 AND data @> $2
            ORDER BY {}
            LIMIT $4",
            order_by
        );

        let sort_field = query.sort.as_ref().map(|(field, _)| field.clone());
        let limit = query.limit.map(|l| l as i64);

        let rows: Vec<Json<Value>> = query_scalar(&statement)
            .bind(collection)
            .bind(Json(Value::Object(query.filter.clone())))
            .bind(sort_field)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())?;

        rows.into_iter()
            .map(|Json(value)| into_document(collection, value))
            .collect()
    }

    async fn find_by_id(&self, collection: &str, id: Id) -> StoreResult<Option<Document>> {
        let row: Option<Json<Value>> =
            query_scalar("SELECT data FROM documents WHERE collection = $1 AND id = $2")
                .bind(collection)
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| e.any())?;

        row.map(|Json(value)| into_document(collection, value))
            .transpose()
    }

    async fn count(&self, collection: &str, query: &Query) -> StoreResult<usize> {
        let count: i64 =
            query_scalar("SELECT COUNT(*) FROM documents WHERE collection = $1 AND data @> $2")
                .bind(collection)
                .bind(Json(Value::Object(query.filter.clone())))
                .fetch_one(&self.pool)
                .await
                .map_err(|e| e.any())?;

        Ok(count as usize)
    }

    async fn insert(&self, collection: &str, id: Id, document: Document) -> StoreResult<()> {
        query("INSERT INTO documents (collection, id, data) VALUES ($1, $2, $3)")
            .bind(collection)
            .bind(id.to_string())
            .bind(Json(Value::Object(document)))
            .execute(&self.pool)
            .await
            .map_err(|e| e.duplicate_or(collection, id))
            .map(|_| ())
    }

    async fn upsert(&self, collection: &str, id: Id, document: Document) -> StoreResult<()> {
        query(
            "
            INSERT INTO documents (collection, id, data) VALUES ($1, $2, $3)
            ON CONFLICT (collection, id) DO UPDATE SET data = EXCLUDED.data",
        )
        .bind(collection)
        .bind(id.to_string())
        .bind(Json(Value::Object(document)))
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())
        .map(|_| ())
    }

    async fn remove(&self, collection: &str, id: Id) -> StoreResult<bool> {
        query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|r| r.rows_affected() > 0)
    }
}

/// Helper trait to reduce boilerplate
trait IntoStoreError {
    fn any(self) -> StoreError;
    fn duplicate_or(self, collection: &str, id: Id) -> StoreError;
}

impl IntoStoreError for SqlxError {
    fn any(self) -> StoreError {
        StoreError::Backend(Box::new(self))
    }

    fn duplicate_or(self, collection: &str, id: Id) -> StoreError {
        let is_duplicate = self
            .as_database_error()
            .and_then(|e| e.code())
            .is_some_and(|code| code == UNIQUE_VIOLATION);

        if is_duplicate {
            StoreError::DuplicateId {
                collection: collection.to_string(),
                id,
            }
        } else {
            self.any()
        }
    }
}
