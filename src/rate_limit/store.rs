use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::StoreError;

/// Stored state of one bucket.
///
/// An absent key reads as [`BucketState::EMPTY`]. `last_leak` is `None` when the
/// timestamp field is missing, which the limiter treats as "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BucketState {
    /// Units consumed and not yet leaked.
    pub count: u64,
    /// Unix seconds of the last admission.
    pub last_leak: Option<i64>,
}

impl BucketState {
    /// State of a key that was never written (or was reset/evicted).
    pub const EMPTY: BucketState = BucketState { count: 0, last_leak: None };

    /// Whether this is the state of an absent key.
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }
}

/// Abstract storage interface for leaky-bucket state.
///
/// Designed for both in-memory and distributed backends. Writes go exclusively through
/// [`compare_and_set`](BucketStore::compare_and_set), which must be atomic per key.
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Fetch the current state for a key.
    async fn get(&self, key: &str) -> Result<BucketState, StoreError>;

    /// Write `next` only if the stored state still equals `expected`.
    ///
    /// `expected == BucketState::EMPTY` means "the key must still be absent".
    ///
    /// Returns `Ok(true)` if the write happened, `Ok(false)` if a race was detected.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: BucketState,
        next: BucketState,
    ) -> Result<bool, StoreError>;

    /// Remove both fields for `key` in one operation. Missing keys are fine.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<T> BucketStore for Arc<T>
where
    T: BucketStore + ?Sized,
{
    async fn get(&self, key: &str) -> Result<BucketState, StoreError> {
        (**self).get(key).await
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: BucketState,
        next: BucketState,
    ) -> Result<bool, StoreError> {
        (**self).compare_and_set(key, expected, next).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key).await
    }
}

/// Simple in-memory bucket store.
///
/// Shared by cloning; suitable for tests and single-process deployments.
#[derive(Default, Clone, Debug)]
pub struct InMemoryBucketStore {
    data: Arc<Mutex<HashMap<String, BucketState>>>,
}

impl InMemoryBucketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently holding state.
    pub fn len(&self) -> usize {
        self.data.lock().map(|g| g.len()).unwrap_or_default()
    }

    /// Whether no key holds state.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, BucketState>>, StoreError> {
        self.data.lock().map_err(|_| StoreError::Unavailable("bucket store lock poisoned".into()))
    }
}

#[async_trait]
impl BucketStore for InMemoryBucketStore {
    async fn get(&self, key: &str) -> Result<BucketState, StoreError> {
        let guard = self.lock()?;
        Ok(guard.get(key).copied().unwrap_or(BucketState::EMPTY))
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: BucketState,
        next: BucketState,
    ) -> Result<bool, StoreError> {
        let mut guard = self.lock()?;
        let current = guard.get(key).copied().unwrap_or(BucketState::EMPTY);
        if current != expected {
            return Ok(false); // Race detected
        }
        guard.insert(key.to_string(), next);
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.lock()?.remove(key);
        Ok(())
    }
}
