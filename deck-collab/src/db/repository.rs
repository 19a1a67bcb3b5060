use std::{
    ops::{Deref, DerefMut},
    sync::Arc,
    time::Duration,
};

use chrono::Utc;
use dashmap::DashMap;
use deck_core::{Document, DocumentStore, Id, Query, StoreError};
use log::debug;
use parking_lot::Mutex as SyncMutex;
use serde_json::Value;
use tokio::{sync::Mutex, time::Instant};

use super::{Entity, LockGuard, LockKey, LockManager, RepositoryError, RepositoryResult, Result};

struct Cached<T> {
    value: T,
    fetched_at: Instant,
}

type CacheSlot<T> = Arc<Mutex<Option<Cached<T>>>>;

/// Typed access to one collection of the document store.
///
/// Reads by id go through a cache that expires after a fixed time.
/// Writes that depend on the current state of a record must go through [Repository::lock].
pub struct Repository<T> {
    store: Arc<dyn DocumentStore>,
    locks: Arc<LockManager>,
    cache: DashMap<Id, CacheSlot<T>>,
    last_sweep: SyncMutex<Instant>,
    ttl: Duration,
}

/// A record that nobody else can lock until this is dropped
pub struct Locked<'a, T: Entity> {
    repository: &'a Repository<T>,
    record: T,
    _guard: LockGuard,
}

impl<T> Repository<T>
where
    T: Entity,
{
    pub fn new(store: &Arc<dyn DocumentStore>, locks: &Arc<LockManager>, ttl: Duration) -> Self {
        Self {
            store: store.clone(),
            locks: locks.clone(),
            cache: DashMap::new(),
            last_sweep: SyncMutex::new(Instant::now()),
            ttl,
        }
    }

    /// Validates and inserts a new record, giving it an id and timestamps
    pub async fn create(&self, mut record: T) -> Result<T> {
        record.validate()?;

        for (field, query) in record.unique() {
            let value = describe(&query);

            self.get(query)
                .await
                .conflict_or_ok(T::RESOURCE, field, &value)?;
        }

        let now = Utc::now();
        let meta = record.meta_mut();

        if meta.id.is_none() {
            meta.id = Id::new();
        }

        meta.created = now;
        meta.updated = now;

        let id = record.id();
        self.store
            .insert(T::COLLECTION, id, to_document(&record)?)
            .await?;

        debug!("Created {} {}", T::RESOURCE, id);
        Ok(record)
    }

    /// Returns the first record matching the query
    pub async fn get(&self, query: Query) -> Result<T> {
        self.store
            .find_one(T::COLLECTION, &query)
            .await?
            .map(from_document)
            .transpose()?
            .ok_or(RepositoryError::NotFound {
                resource: T::RESOURCE,
            })
    }

    /// Returns up to `limit` records matching the query
    pub async fn get_multi(&self, limit: usize, query: Query) -> Result<Vec<T>> {
        self.store
            .find(T::COLLECTION, &query.limit(limit))
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    /// Returns every record matching the query
    pub async fn get_all(&self, query: Query) -> Result<Vec<T>> {
        self.store
            .find(T::COLLECTION, &query)
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    pub async fn count(&self, query: Query) -> Result<usize> {
        Ok(self.store.count(T::COLLECTION, &query).await?)
    }

    /// Returns a record by its id, from the cache if it's fresh.
    /// Concurrent calls for the same id wait for the first one to fill the cache.
    pub async fn get_by_id(&self, id: Id) -> Result<T> {
        self.sweep();

        let slot = self.cache.entry(id).or_default().clone();
        let mut cached = slot.lock().await;

        if let Some(entry) = cached.as_ref() {
            if entry.fetched_at.elapsed() < self.ttl {
                return Ok(entry.value.clone());
            }
        }

        match self.fetch(id).await {
            Ok(value) => {
                *cached = Some(Cached {
                    value: value.clone(),
                    fetched_at: Instant::now(),
                });

                Ok(value)
            }
            Err(err) => {
                *cached = None;
                drop(cached);

                self.cache
                    .remove_if(&id, |_, slot| Arc::strong_count(slot) <= 2);

                Err(err)
            }
        }
    }

    /// Writes the record, replacing what is stored under its id
    pub async fn save(&self, record: &mut T) -> Result<()> {
        record.validate()?;
        record.meta_mut().updated = Utc::now();

        let id = record.id();
        self.store
            .upsert(T::COLLECTION, id, to_document(record)?)
            .await?;

        self.invalidate(id);
        Ok(())
    }

    pub async fn delete(&self, record: &T) -> Result<()> {
        self.delete_by_id(record.id()).await
    }

    pub async fn delete_by_id(&self, id: Id) -> Result<()> {
        let existed = self.store.remove(T::COLLECTION, id).await?;
        self.invalidate(id);

        if !existed {
            return Err(RepositoryError::NotFound {
                resource: T::RESOURCE,
            });
        }

        debug!("Deleted {} {}", T::RESOURCE, id);
        Ok(())
    }

    /// Locks the record and reads its current state, bypassing the cache.
    pub async fn lock(&self, id: Id) -> Result<Locked<'_, T>> {
        let guard = self.locks.acquire(LockKey::new(T::KIND, id)).await;
        let record = self.fetch(id).await?;

        Ok(Locked {
            repository: self,
            record,
            _guard: guard,
        })
    }

    /// Locks several records of this collection, in id order.
    pub async fn lock_many(&self, ids: &[Id]) -> Result<Vec<Locked<'_, T>>> {
        let keys = ids.iter().map(|id| LockKey::new(T::KIND, *id)).collect();
        let guards = self.locks.acquire_ordered(keys).await;

        let mut locked = Vec::with_capacity(guards.len());
        for guard in guards {
            let record = self.fetch(guard.key().id).await?;

            locked.push(Locked {
                repository: self,
                record,
                _guard: guard,
            });
        }

        Ok(locked)
    }

    /// Drops expired records from the cache, at most once per ttl.
    /// Slots that another read is using are left alone.
    fn sweep(&self) {
        {
            let mut last_sweep = self.last_sweep.lock();

            if last_sweep.elapsed() < self.ttl {
                return;
            }

            *last_sweep = Instant::now();
        }

        let ttl = self.ttl;
        self.cache.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }

            match slot.try_lock() {
                Ok(cached) => cached
                    .as_ref()
                    .is_some_and(|entry| entry.fetched_at.elapsed() < ttl),
                Err(_) => true,
            }
        });
    }

    fn invalidate(&self, id: Id) {
        self.cache.remove(&id);
    }

    async fn fetch(&self, id: Id) -> Result<T> {
        self.store
            .find_by_id(T::COLLECTION, id)
            .await?
            .map(from_document)
            .transpose()?
            .ok_or(RepositoryError::NotFound {
                resource: T::RESOURCE,
            })
    }
}

impl<'a, T: Entity> Locked<'a, T> {
    /// Saves the changes made to the record while keeping the lock
    pub async fn save(&mut self) -> Result<()> {
        self.repository.save(&mut self.record).await
    }

    pub async fn delete(self) -> Result<()> {
        self.repository.delete(&self.record).await
    }

    pub fn into_inner(self) -> T {
        self.record
    }
}

impl<'a, T: Entity> Deref for Locked<'a, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.record
    }
}

impl<'a, T: Entity> DerefMut for Locked<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.record
    }
}

fn to_document<T: Entity>(record: &T) -> Result<Document> {
    match serde_json::to_value(record) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(malformed::<T>("not an object".to_string())),
        Err(e) => Err(malformed::<T>(e.to_string())),
    }
}

fn from_document<T: Entity>(document: Document) -> Result<T> {
    serde_json::from_value(Value::Object(document)).map_err(|e| malformed::<T>(e.to_string()))
}

fn malformed<T: Entity>(reason: String) -> RepositoryError {
    StoreError::Malformed {
        collection: T::COLLECTION.to_string(),
        reason,
    }
    .into()
}

fn describe(query: &Query) -> String {
    query
        .filter
        .values()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use deck_core::MemoryStore;

    use super::*;
    use crate::{PlaylistData, UserData};

    fn repository<T: Entity>(store: &Arc<dyn DocumentStore>) -> Repository<T> {
        Repository::new(store, &Arc::new(LockManager::new()), Duration::from_secs(60))
    }

    fn store() -> Arc<dyn DocumentStore> {
        Arc::new(MemoryStore::new())
    }

    #[tokio::test]
    async fn test_create_stamps_and_validates() {
        let users = repository::<UserData>(&store());

        let user = users.create(UserData::new("Selecta")).await.unwrap();

        assert!(!user.id().is_none());
        assert_eq!(user.username, "selecta");
        assert_eq!(user.meta.created, user.meta.updated);

        let fetched = users.get_by_id(user.id()).await.unwrap();
        assert_eq!(fetched.username, "selecta");
    }

    #[tokio::test]
    async fn test_unique_fields_conflict() {
        let users = repository::<UserData>(&store());

        users.create(UserData::new("selecta")).await.unwrap();
        let result = users.create(UserData::new("SELECTA")).await;

        assert!(
            matches!(
                result,
                Err(RepositoryError::Conflict {
                    field: "username",
                    ..
                })
            ),
            "usernames should be unique regardless of case"
        );
    }

    #[tokio::test]
    async fn test_save_invalidates_cache() {
        let users = repository::<UserData>(&store());
        let user = users.create(UserData::new("selecta")).await.unwrap();

        // Fill the cache
        users.get_by_id(user.id()).await.unwrap();

        let mut locked = users.lock(user.id()).await.unwrap();
        locked.points = 12;
        locked.save().await.unwrap();
        drop(locked);

        assert_eq!(users.get_by_id(user.id()).await.unwrap().points, 12);
    }

    #[tokio::test]
    async fn test_cache_serves_stale_reads_until_expiry() {
        tokio::time::pause();

        let store = store();
        let users = repository::<UserData>(&store);
        let user = users.create(UserData::new("selecta")).await.unwrap();

        users.get_by_id(user.id()).await.unwrap();

        // Write behind the repository's back
        let mut changed = user.clone();
        changed.points = 7;
        store
            .upsert("users", user.id(), to_document(&changed).unwrap())
            .await
            .unwrap();

        assert_eq!(users.get_by_id(user.id()).await.unwrap().points, 0);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(users.get_by_id(user.id()).await.unwrap().points, 7);
    }

    #[tokio::test]
    async fn test_expired_records_are_evicted() {
        tokio::time::pause();

        let users = repository::<UserData>(&store());
        let first = users.create(UserData::new("first")).await.unwrap();
        let second = users.create(UserData::new("second")).await.unwrap();

        users.get_by_id(first.id()).await.unwrap();
        assert_eq!(users.cache.len(), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        users.get_by_id(second.id()).await.unwrap();

        assert_eq!(users.cache.len(), 1);
        assert!(users.cache.contains_key(&second.id()));
        assert!(!users.cache.contains_key(&first.id()));
    }

    #[tokio::test]
    async fn test_missing_records() {
        let users = repository::<UserData>(&store());
        let id = Id::new();

        assert!(matches!(
            users.get_by_id(id).await,
            Err(RepositoryError::NotFound { .. })
        ));
        assert!(matches!(
            users.delete_by_id(id).await,
            Err(RepositoryError::NotFound { .. })
        ));
        assert!(matches!(
            users.lock(id).await,
            Err(RepositoryError::NotFound { .. })
        ));
        assert!(users.cache.is_empty(), "failed reads shouldn't be cached");
    }

    #[tokio::test]
    async fn test_get_multi_respects_limit_and_sort() {
        let playlists = repository::<PlaylistData>(&store());
        let owner = Id::new();

        for order in [2, 0, 1] {
            playlists
                .create(PlaylistData {
                    meta: Default::default(),
                    owner,
                    name: format!("list {}", order),
                    selected: false,
                    order,
                })
                .await
                .unwrap();
        }

        let found = playlists
            .get_multi(
                2,
                Query::new()
                    .eq("owner", owner)
                    .sort_by("order", deck_core::SortOrder::Ascending),
            )
            .await
            .unwrap();

        let orders: Vec<_> = found.iter().map(|p| p.order).collect();
        assert_eq!(orders, vec![0, 1]);
    }
}
