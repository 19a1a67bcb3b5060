use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{compare_values, Document, DocumentStore, Id, Query, SortOrder, StoreError, StoreResult};

type Collection = BTreeMap<Id, Document>;

/// A document store held entirely in memory.
/// Used when no database is configured, and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the amount of documents in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.len())
            .unwrap_or_default()
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(&self, collection: &str, query: &Query) -> StoreResult<Vec<Document>> {
        let collections = self.collections.read();

        let Some(documents) = collections.get(collection) else {
            return Ok(vec![]);
        };

        // BTreeMap iteration gives id order, which the sort below keeps for equal keys.
        let mut found: Vec<_> = documents
            .values()
            .filter(|d| query.matches(d))
            .cloned()
            .collect();

        if let Some((field, order)) = &query.sort {
            found.sort_by(|a, b| {
                let a = a.get(field).unwrap_or(&serde_json::Value::Null);
                let b = b.get(field).unwrap_or(&serde_json::Value::Null);

                match order {
                    SortOrder::Ascending => compare_values(a, b),
                    SortOrder::Descending => compare_values(b, a),
                }
            });
        }

        if let Some(limit) = query.limit {
            found.truncate(limit);
        }

        Ok(found)
    }

    async fn find_by_id(&self, collection: &str, id: Id) -> StoreResult<Option<Document>> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|c| c.get(&id))
            .cloned())
    }

    async fn count(&self, collection: &str, query: &Query) -> StoreResult<usize> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(|c| c.values().filter(|d| query.matches(d)).count())
            .unwrap_or_default())
    }

    async fn insert(&self, collection: &str, id: Id, document: Document) -> StoreResult<()> {
        let mut collections = self.collections.write();
        let documents = collections.entry(collection.to_string()).or_default();

        if documents.contains_key(&id) {
            return Err(StoreError::DuplicateId {
                collection: collection.to_string(),
                id,
            });
        }

        documents.insert(id, document);
        Ok(())
    }

    async fn upsert(&self, collection: &str, id: Id, document: Document) -> StoreResult<()> {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(id, document);

        Ok(())
    }

    async fn remove(&self, collection: &str, id: Id) -> StoreResult<bool> {
        Ok(self
            .collections
            .write()
            .get_mut(collection)
            .and_then(|c| c.remove(&id))
            .is_some())
    }
}
