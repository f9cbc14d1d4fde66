use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use prep_core::model::{UserId, UserProgress};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::repository::StorageError;

/// A cached document plus the time it was fetched from the remote store.
///
/// The TTL only decides when to re-fetch; it plays no part in merge
/// correctness. Stale entries are still valid merge inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub doc: T,
    pub fetched_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    #[must_use]
    pub fn new(doc: T, fetched_at: DateTime<Utc>) -> Self {
        Self { doc, fetched_at }
    }

    /// Whether the entry is recent enough to skip a remote fetch.
    #[must_use]
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.fetched_at) < ttl
    }
}

/// Local offline cache of a user's progress document.
#[async_trait]
pub trait ProgressCache: Send + Sync {
    /// Fetch the cached document, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the cache backend fails.
    async fn get_cached(&self, user: &UserId)
    -> Result<Option<CacheEntry<UserProgress>>, StorageError>;

    /// Store or replace the cached document.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the cache backend fails.
    async fn put_cached(
        &self,
        user: &UserId,
        progress: &UserProgress,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Drop the cached document.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the cache backend fails.
    async fn clear_cached(&self, user: &UserId) -> Result<(), StorageError>;
}

/// In-memory cache implementation for tests and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryCache {
    entries: Arc<Mutex<HashMap<UserId, CacheEntry<UserProgress>>>>,
}

impl InMemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressCache for InMemoryCache {
    async fn get_cached(
        &self,
        user: &UserId,
    ) -> Result<Option<CacheEntry<UserProgress>>, StorageError> {
        let guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(user).cloned())
    }

    async fn put_cached(
        &self,
        user: &UserId,
        progress: &UserProgress,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(user.clone(), CacheEntry::new(progress.clone(), fetched_at));
        Ok(())
    }

    async fn clear_cached(&self, user: &UserId) -> Result<(), StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(user);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prep_core::time::fixed_now;

    #[test]
    fn freshness_is_strict() {
        let now = fixed_now();
        let entry = CacheEntry::new((), now);
        let ttl = Duration::minutes(10);

        assert!(entry.is_fresh(ttl, now + Duration::minutes(9)));
        assert!(!entry.is_fresh(ttl, now + Duration::minutes(10)));
        assert!(!entry.is_fresh(ttl, now + Duration::hours(1)));
    }

    #[tokio::test]
    async fn round_trips_and_clears() {
        let cache = InMemoryCache::new();
        let user = UserId::new("u1");
        let doc = UserProgress::empty(fixed_now());

        assert!(cache.get_cached(&user).await.unwrap().is_none());
        cache.put_cached(&user, &doc, fixed_now()).await.unwrap();

        let entry = cache.get_cached(&user).await.unwrap().unwrap();
        assert_eq!(entry.doc, doc);
        assert_eq!(entry.fetched_at, fixed_now());

        cache.clear_cached(&user).await.unwrap();
        assert!(cache.get_cached(&user).await.unwrap().is_none());
    }
}
