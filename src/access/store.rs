use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use crate::access::AccessList;
use crate::StoreError;

/// Abstract storage interface for the two access lists.
///
/// Values are network strings. Callers write canonical CIDR text, but readers must
/// tolerate rows written by other tools.
#[async_trait]
pub trait AccessListStore: Send + Sync {
    /// Store `network` in `list`. Inserting a value that is already present is a no-op.
    async fn insert(&self, list: AccessList, network: &str) -> Result<(), StoreError>;

    /// Delete `network` from `list`, returning the number of rows removed.
    async fn delete(&self, list: AccessList, network: &str) -> Result<u64, StoreError>;

    /// All values in `list`.
    async fn get_all(&self, list: AccessList) -> Result<Vec<String>, StoreError>;

    /// Exact-match lookup of `network` in `list`.
    async fn exists_exact(&self, list: AccessList, network: &str) -> Result<bool, StoreError>;
}

#[async_trait]
impl<T> AccessListStore for Arc<T>
where
    T: AccessListStore + ?Sized,
{
    async fn insert(&self, list: AccessList, network: &str) -> Result<(), StoreError> {
        (**self).insert(list, network).await
    }

    async fn delete(&self, list: AccessList, network: &str) -> Result<u64, StoreError> {
        (**self).delete(list, network).await
    }

    async fn get_all(&self, list: AccessList) -> Result<Vec<String>, StoreError> {
        (**self).get_all(list).await
    }

    async fn exists_exact(&self, list: AccessList, network: &str) -> Result<bool, StoreError> {
        (**self).exists_exact(list, network).await
    }
}

/// In-memory access lists (tests / single process).
#[derive(Default, Clone, Debug)]
pub struct InMemoryAccessListStore {
    lists: Arc<RwLock<HashMap<AccessList, BTreeSet<String>>>>,
}

impl InMemoryAccessListStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows in `list`.
    pub fn len(&self, list: AccessList) -> usize {
        self.lists
            .read()
            .map(|g| g.get(&list).map(BTreeSet::len).unwrap_or_default())
            .unwrap_or_default()
    }

    fn poisoned<T>(_: T) -> StoreError {
        StoreError::Unavailable("access list store lock poisoned".into())
    }
}

#[async_trait]
impl AccessListStore for InMemoryAccessListStore {
    async fn insert(&self, list: AccessList, network: &str) -> Result<(), StoreError> {
        let mut guard = self.lists.write().map_err(Self::poisoned)?;
        guard.entry(list).or_default().insert(network.to_string());
        Ok(())
    }

    async fn delete(&self, list: AccessList, network: &str) -> Result<u64, StoreError> {
        let mut guard = self.lists.write().map_err(Self::poisoned)?;
        let removed = guard.get_mut(&list).map(|set| set.remove(network)).unwrap_or(false);
        Ok(u64::from(removed))
    }

    async fn get_all(&self, list: AccessList) -> Result<Vec<String>, StoreError> {
        let guard = self.lists.read().map_err(Self::poisoned)?;
        Ok(guard.get(&list).map(|set| set.iter().cloned().collect()).unwrap_or_default())
    }

    async fn exists_exact(&self, list: AccessList, network: &str) -> Result<bool, StoreError> {
        let guard = self.lists.read().map_err(Self::poisoned)?;
        Ok(guard.get(&list).map(|set| set.contains(network)).unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_are_separate() {
        let store = InMemoryAccessListStore::new();
        store.insert(AccessList::Whitelist, "10.0.0.0/8").await.unwrap();
        assert!(store.exists_exact(AccessList::Whitelist, "10.0.0.0/8").await.unwrap());
        assert!(!store.exists_exact(AccessList::Blacklist, "10.0.0.0/8").await.unwrap());
        assert!(store.get_all(AccessList::Blacklist).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn insert_is_idempotent() {
        let store = InMemoryAccessListStore::new();
        store.insert(AccessList::Blacklist, "1.1.1.0/24").await.unwrap();
        store.insert(AccessList::Blacklist, "1.1.1.0/24").await.unwrap();
        assert_eq!(store.len(AccessList::Blacklist), 1);
    }

    #[tokio::test]
    async fn delete_reports_affected_rows() {
        let store = InMemoryAccessListStore::new();
        assert_eq!(store.delete(AccessList::Blacklist, "1.1.1.0/24").await.unwrap(), 0);
        store.insert(AccessList::Blacklist, "1.1.1.0/24").await.unwrap();
        assert_eq!(store.delete(AccessList::Blacklist, "1.1.1.0/24").await.unwrap(), 1);
        assert_eq!(store.len(AccessList::Blacklist), 0);
    }
}
