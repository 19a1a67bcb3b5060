use std::sync::Arc;

use dashmap::DashMap;
use deck_core::Id;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::EntityKind;

/// Identifies a single lockable entity.
/// Keys order by kind first, which is the order locks must be taken in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LockKey {
    pub kind: EntityKind,
    pub id: Id,
}

impl LockKey {
    pub fn new(kind: EntityKind, id: Id) -> Self {
        Self { kind, id }
    }
}

/// Hands out exclusive, per-entity locks for read-modify-write sequences.
#[derive(Debug, Default)]
pub struct LockManager {
    locks: DashMap<LockKey, Arc<Mutex<()>>>,
}

/// Holds a lock until dropped
#[derive(Debug)]
pub struct LockGuard {
    key: LockKey,
    manager: Arc<LockManager>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to the entity behind `key`.
    pub async fn acquire(self: &Arc<Self>, key: LockKey) -> LockGuard {
        let mutex = self.locks.entry(key).or_default().clone();
        let guard = mutex.lock_owned().await;

        LockGuard {
            key,
            manager: self.clone(),
            guard: Some(guard),
        }
    }

    /// Acquires every lock in `keys` in the global order, so two callers asking for
    /// overlapping sets can never wait on each other in a cycle.
    pub async fn acquire_ordered(self: &Arc<Self>, mut keys: Vec<LockKey>) -> Vec<LockGuard> {
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            guards.push(self.acquire(key).await);
        }

        guards
    }

    /// Returns the amount of entities that currently have a lock entry.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl LockGuard {
    pub fn key(&self) -> LockKey {
        self.key
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        // Only the map holds the mutex now, so nobody is waiting on it
        self.manager
            .locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let manager = Arc::new(LockManager::new());
        let key = LockKey::new(EntityKind::Media, Id::new());

        let guard = manager.acquire(key).await;

        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move {
                let _guard = manager.acquire(key).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished(), "second acquire should wait");

        drop(guard);
        waiter.await.unwrap();

        assert!(manager.is_empty(), "released locks should be cleaned up");
    }

    #[tokio::test]
    async fn test_ordered_acquire_sorts_by_kind() {
        let manager = Arc::new(LockManager::new());
        let id = Id::new();

        let guards = manager
            .acquire_ordered(vec![
                LockKey::new(EntityKind::Media, id),
                LockKey::new(EntityKind::User, id),
                LockKey::new(EntityKind::Media, id),
            ])
            .await;

        let kinds: Vec<_> = guards.iter().map(|g| g.key.kind).collect();
        assert_eq!(kinds, vec![EntityKind::User, EntityKind::Media]);
        assert_eq!(manager.len(), 2);
    }
}
