//! Advisory per-file, per-operation locks.
//!
//! The TTL only exists for crash recovery: a holder that dies without
//! releasing blocks the key until it expires. A run that outlives the TTL may
//! overlap with a second run.

use crate::error::LockError;
use crate::types::Operation;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Default lock lifetime.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(5 * 60);

/// Shared keyed store with atomic insert-if-absent.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Inserts `key` with the given lifetime unless a live entry exists.
    /// Returns `true` when the caller now holds the lock.
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<bool, LockError>;

    /// Deletes `key` regardless of its remaining lifetime.
    async fn release(&self, key: &str) -> Result<(), LockError>;
}

/// In-process lock table with expiry.
#[derive(Debug, Clone, Default)]
pub struct MemoryLockStore {
    entries: Arc<Mutex<HashMap<String, Instant>>>,
}

impl MemoryLockStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` while a live entry exists for `key`.
    pub async fn is_held(&self, key: &str) -> bool {
        self.entries
            .lock()
            .await
            .get(key)
            .is_some_and(|expiry| *expiry > Instant::now())
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<bool, LockError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(expiry) if *expiry > now => Ok(false),
            _ => {
                entries.insert(key.to_string(), now + ttl);
                Ok(true)
            }
        }
    }

    async fn release(&self, key: &str) -> Result<(), LockError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

/// Builds lock keys and applies the configured lifetime.
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn LockStore>,
    ttl: Duration,
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl LockManager {
    #[must_use]
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self {
            store,
            ttl: DEFAULT_LOCK_TTL,
        }
    }

    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// `bioformats-<operation>-lock-<file_id>`
    #[must_use]
    pub fn lock_key(file_id: u64, operation: Operation) -> String {
        format!("bioformats-{operation}-lock-{file_id}")
    }

    /// Attempts to take the lock for `(file_id, operation)`. Never waits.
    ///
    /// # Errors
    ///
    /// Returns `LockError` when the store cannot be reached.
    pub async fn try_acquire(&self, file_id: u64, operation: Operation) -> Result<bool, LockError> {
        let key = Self::lock_key(file_id, operation);
        let acquired = self.store.try_acquire(&key, self.ttl).await?;
        tracing::debug!(key, acquired, "lock acquisition");
        Ok(acquired)
    }

    /// Releases the lock for `(file_id, operation)`.
    ///
    /// # Errors
    ///
    /// Returns `LockError` when the store cannot be reached.
    pub async fn release(&self, file_id: u64, operation: Operation) -> Result<(), LockError> {
        self.store
            .release(&Self::lock_key(file_id, operation))
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_key_format() {
        assert_eq!(
            LockManager::lock_key(17, Operation::Metadata),
            "bioformats-metadata-lock-17"
        );
        assert_eq!(
            LockManager::lock_key(17, Operation::Preview),
            "bioformats-preview-lock-17"
        );
    }

    #[tokio::test]
    async fn test_second_acquire_fails_until_release() {
        let store = MemoryLockStore::new();
        let ttl = Duration::from_secs(60);
        assert!(store.try_acquire("k", ttl).await.unwrap());
        assert!(!store.try_acquire("k", ttl).await.unwrap());
        assert!(store.is_held("k").await);

        store.release("k").await.unwrap();
        assert!(!store.is_held("k").await);
        assert!(store.try_acquire("k", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_entry_is_replaced() {
        let store = MemoryLockStore::new();
        assert!(store.try_acquire("k", Duration::ZERO).await.unwrap());
        assert!(!store.is_held("k").await);
        assert!(store.try_acquire("k", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn test_operations_lock_independently() {
        let store = Arc::new(MemoryLockStore::new());
        let locks = LockManager::new(store.clone());
        assert!(locks.try_acquire(1, Operation::Metadata).await.unwrap());
        assert!(locks.try_acquire(1, Operation::Preview).await.unwrap());
        assert!(locks.try_acquire(2, Operation::Metadata).await.unwrap());
        assert!(!locks.try_acquire(1, Operation::Metadata).await.unwrap());

        locks.release(1, Operation::Metadata).await.unwrap();
        assert!(!store.is_held("bioformats-metadata-lock-1").await);
        assert!(store.is_held("bioformats-preview-lock-1").await);
    }

    #[tokio::test]
    async fn test_concurrent_acquire_has_one_winner() {
        let store = Arc::new(MemoryLockStore::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.try_acquire("race", DEFAULT_LOCK_TTL).await.unwrap()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
