use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::cache::{CacheEntry, CacheError, CacheStore};
use crate::flow::fingerprint::Fingerprint;

/// Process-lifetime cache.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<Fingerprint, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries.read().get(fingerprint).cloned())
    }

    async fn store(&self, entry: CacheEntry) -> Result<(), CacheError> {
        self.entries.write().insert(entry.fingerprint.clone(), entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::test_support::entry;

    #[tokio::test]
    async fn test_store_then_lookup() {
        let cache = MemoryCache::new();
        let first = entry("tighten bullets");
        assert!(cache.lookup(&first.fingerprint).await.unwrap().is_none());

        cache.store(first.clone()).await.unwrap();
        assert_eq!(cache.lookup(&first.fingerprint).await.unwrap(), Some(first.clone()));

        let other = entry("something else");
        assert!(cache.lookup(&other.fingerprint).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_restore_supersedes() {
        let cache = MemoryCache::new();
        let first = entry("tighten bullets");
        let mut second = first.clone();
        second.flow_version = "newer".to_string();

        cache.store(first.clone()).await.unwrap();
        cache.store(second.clone()).await.unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup(&first.fingerprint).await.unwrap(), Some(second));
    }
}
