use std::cmp::Ordering;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::Id;

mod memory;
pub use memory::*;

mod pg;
pub use pg::*;

/// A single stored document. Every document carries its id under the `id` key.
pub type Document = Map<String, Value>;

pub type StoreResult<T> = std::result::Result<T, StoreError>;
pub type BoxedStore = Box<dyn DocumentStore>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// An unknown or internal error happened in the backend
    #[error(transparent)]
    Backend(Box<dyn std::error::Error + Send + Sync>),
    /// A document with the same id already exists in the collection
    #[error("{collection}:{id} already exists")]
    DuplicateId { collection: String, id: Id },
    /// A stored document could not be read back
    #[error("Malformed document in {collection}: {reason}")]
    Malformed { collection: String, reason: String },
}

/// Direction of a sorted query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// A query against one collection.
/// Filters are top-level field equality, combined with AND.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filter: Document,
    pub sort: Option<(String, SortOrder)>,
    pub limit: Option<usize>,
}

impl Query {
    /// A query matching every document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only match documents where `field` equals `value`.
    pub fn eq<V>(mut self, field: &str, value: V) -> Self
    where
        V: Into<Value>,
    {
        self.filter.insert(field.to_string(), value.into());
        self
    }

    pub fn sort_by(mut self, field: &str, order: SortOrder) -> Self {
        self.sort = Some((field.to_string(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if the document satisfies every filter of this query.
    /// A missing field is treated as `null`.
    pub fn matches(&self, document: &Document) -> bool {
        self.filter
            .iter()
            .all(|(field, expected)| document.get(field).unwrap_or(&Value::Null) == expected)
    }
}

/// Represents a store that can hold deck documents, grouped by collection
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns the documents matching the query, sorted by id unless the query says otherwise.
    async fn find(&self, collection: &str, query: &Query) -> StoreResult<Vec<Document>>;
    async fn find_by_id(&self, collection: &str, id: Id) -> StoreResult<Option<Document>>;
    async fn count(&self, collection: &str, query: &Query) -> StoreResult<usize>;
    /// Inserts a new document, failing if the id is taken.
    async fn insert(&self, collection: &str, id: Id, document: Document) -> StoreResult<()>;
    /// Inserts or replaces the document with the given id.
    async fn upsert(&self, collection: &str, id: Id, document: Document) -> StoreResult<()>;
    /// Removes a document, returning whether it existed.
    async fn remove(&self, collection: &str, id: Id) -> StoreResult<bool>;

    async fn find_one(&self, collection: &str, query: &Query) -> StoreResult<Option<Document>> {
        let query = query.clone().limit(1);
        let mut found = self.find(collection, &query).await?;

        Ok(found.pop())
    }
}

impl From<Id> for Value {
    fn from(id: Id) -> Self {
        Value::String(id.to_string())
    }
}

/// Orders two json values the way the stores sort documents.
/// Nulls come first, then booleans, numbers and strings.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64().unwrap_or_default();
            let b = b.as_f64().unwrap_or_default();

            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (a, b) => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn document(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("test document must be an object"),
        }
    }

    #[test]
    fn test_query_matches_on_every_field() {
        let doc = document(json!({ "url": "lounge", "nsfw": false, "until": null }));

        assert!(Query::new().matches(&doc));
        assert!(Query::new().eq("url", "lounge").eq("nsfw", false).matches(&doc));
        assert!(!Query::new().eq("url", "lounge").eq("nsfw", true).matches(&doc));
        assert!(
            Query::new().eq("missing", Value::Null).matches(&doc),
            "missing fields should match null"
        );
    }

    #[test]
    fn test_compare_values() {
        assert_eq!(compare_values(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(compare_values(&json!("b"), &json!("a")), Ordering::Greater);
        assert_eq!(compare_values(&Value::Null, &json!(0)), Ordering::Less);
    }
}
