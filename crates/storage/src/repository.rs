use async_trait::async_trait;
use prep_core::model::{ProductId, StreakState, UserId, UserProgress};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    /// The document changed underneath a conditional write.
    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Monotonic per-document version used for conditional writes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentVersion(u64);

impl DocumentVersion {
    #[must_use]
    pub fn new(v: u64) -> Self {
        Self(v)
    }

    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Debug for DocumentVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A document together with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub doc: T,
    pub version: DocumentVersion,
}

/// Remote store contract for the exam-progress document.
///
/// Writes are compare-and-swap: `expected` must match the version currently
/// stored (`None` means the document must not exist yet), otherwise the write
/// fails with [`StorageError::Conflict`] and the caller re-loads and retries.
/// This is what keeps concurrent multi-device load-merge-save cycles from
/// silently discarding each other's history.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Fetch the progress document for a user.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on transport failures; a missing document is
    /// `Ok(None)`, not an error.
    async fn get_progress(
        &self,
        user: &UserId,
    ) -> Result<Option<Versioned<UserProgress>>, StorageError>;

    /// Conditionally write the progress document.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` when `expected` does not match the
    /// stored version, or other storage errors.
    async fn put_progress(
        &self,
        user: &UserId,
        progress: &UserProgress,
        expected: Option<DocumentVersion>,
    ) -> Result<DocumentVersion, StorageError>;

    /// Remove the progress document entirely (account-data deletion).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on transport failures. Deleting a missing
    /// document is not an error.
    async fn delete_progress(&self, user: &UserId) -> Result<(), StorageError>;
}

/// Remote store contract for the streak document, keyed by the exam-product
/// namespace so one user can hold independent streaks per product.
#[async_trait]
pub trait StreakStore: Send + Sync {
    /// Fetch the streak document for a (product, user) pair.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on transport failures; missing is `Ok(None)`.
    async fn get_streak(
        &self,
        product: &ProductId,
        user: &UserId,
    ) -> Result<Option<Versioned<StreakState>>, StorageError>;

    /// Conditionally write the streak document.
    ///
    /// The streak counters and the reward ledger live in this one document,
    /// so a single write commits them together.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` on a version mismatch, or other
    /// storage errors.
    async fn put_streak(
        &self,
        product: &ProductId,
        user: &UserId,
        state: &StreakState,
        expected: Option<DocumentVersion>,
    ) -> Result<DocumentVersion, StorageError>;

    /// Remove the streak document.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on transport failures.
    async fn delete_streak(&self, product: &ProductId, user: &UserId)
    -> Result<(), StorageError>;
}

/// Aggregates the remote document stores behind trait objects for easy
/// backend swapping.
#[derive(Clone)]
pub struct RemoteStore {
    pub progress: Arc<dyn ProgressStore>,
    pub streaks: Arc<dyn StreakStore>,
}

impl RemoteStore {
    #[must_use]
    pub fn in_memory() -> Self {
        let store = InMemoryStore::new();
        let progress: Arc<dyn ProgressStore> = Arc::new(store.clone());
        let streaks: Arc<dyn StreakStore> = Arc::new(store);
        Self { progress, streaks }
    }
}

//
// ─── IN-MEMORY STORE ──────────────────────────────────────────────────────────
//

/// Versioned in-memory document store for testing and prototyping.
///
/// Faithful to the CAS contract: every successful write bumps the document
/// version, and a stale `expected` fails with `Conflict`.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    progress: Arc<Mutex<HashMap<UserId, Versioned<UserProgress>>>>,
    streaks: Arc<Mutex<HashMap<(ProductId, UserId), Versioned<StreakState>>>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn cas_put<K: std::hash::Hash + Eq, T: Clone>(
    map: &mut HashMap<K, Versioned<T>>,
    key: K,
    doc: &T,
    expected: Option<DocumentVersion>,
) -> Result<DocumentVersion, StorageError> {
    let current = map.get(&key).map(|v| v.version);
    if current != expected {
        return Err(StorageError::Conflict);
    }
    let version = current.map_or(DocumentVersion::new(1), |v| v.next());
    map.insert(
        key,
        Versioned {
            doc: doc.clone(),
            version,
        },
    );
    Ok(version)
}

#[async_trait]
impl ProgressStore for InMemoryStore {
    async fn get_progress(
        &self,
        user: &UserId,
    ) -> Result<Option<Versioned<UserProgress>>, StorageError> {
        let guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(user).cloned())
    }

    async fn put_progress(
        &self,
        user: &UserId,
        progress: &UserProgress,
        expected: Option<DocumentVersion>,
    ) -> Result<DocumentVersion, StorageError> {
        let mut guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        cas_put(&mut guard, user.clone(), progress, expected)
    }

    async fn delete_progress(&self, user: &UserId) -> Result<(), StorageError> {
        let mut guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(user);
        Ok(())
    }
}

#[async_trait]
impl StreakStore for InMemoryStore {
    async fn get_streak(
        &self,
        product: &ProductId,
        user: &UserId,
    ) -> Result<Option<Versioned<StreakState>>, StorageError> {
        let guard = self
            .streaks
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&(product.clone(), user.clone())).cloned())
    }

    async fn put_streak(
        &self,
        product: &ProductId,
        user: &UserId,
        state: &StreakState,
        expected: Option<DocumentVersion>,
    ) -> Result<DocumentVersion, StorageError> {
        let mut guard = self
            .streaks
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        cas_put(&mut guard, (product.clone(), user.clone()), state, expected)
    }

    async fn delete_streak(
        &self,
        product: &ProductId,
        user: &UserId,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .streaks
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(&(product.clone(), user.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prep_core::time::fixed_now;

    fn user() -> UserId {
        UserId::new("u1")
    }

    fn product() -> ProductId {
        ProductId::new("telc-b1")
    }

    #[tokio::test]
    async fn create_then_read_back() {
        let store = InMemoryStore::new();
        let doc = UserProgress::empty(fixed_now());

        let v1 = store.put_progress(&user(), &doc, None).await.unwrap();
        assert_eq!(v1, DocumentVersion::new(1));

        let fetched = store.get_progress(&user()).await.unwrap().unwrap();
        assert_eq!(fetched.doc, doc);
        assert_eq!(fetched.version, v1);
    }

    #[tokio::test]
    async fn stale_version_conflicts() {
        let store = InMemoryStore::new();
        let doc = UserProgress::empty(fixed_now());

        let v1 = store.put_progress(&user(), &doc, None).await.unwrap();
        let v2 = store.put_progress(&user(), &doc, Some(v1)).await.unwrap();
        assert!(v2 > v1);

        // A writer still holding v1 must not clobber v2.
        let err = store.put_progress(&user(), &doc, Some(v1)).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
    }

    #[tokio::test]
    async fn create_only_write_conflicts_when_present() {
        let store = InMemoryStore::new();
        let doc = UserProgress::empty(fixed_now());
        store.put_progress(&user(), &doc, None).await.unwrap();

        let err = store.put_progress(&user(), &doc, None).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
    }

    #[tokio::test]
    async fn streaks_are_namespaced_by_product() {
        let store = InMemoryStore::new();
        let state = StreakState::default();
        store
            .put_streak(&product(), &user(), &state, None)
            .await
            .unwrap();

        let other = ProductId::new("telc-b2");
        assert!(store.get_streak(&other, &user()).await.unwrap().is_none());
        assert!(store.get_streak(&product(), &user()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_removes_document() {
        let store = InMemoryStore::new();
        let doc = UserProgress::empty(fixed_now());
        store.put_progress(&user(), &doc, None).await.unwrap();
        store.delete_progress(&user()).await.unwrap();
        assert!(store.get_progress(&user()).await.unwrap().is_none());

        // Deleting again is not an error.
        store.delete_progress(&user()).await.unwrap();
    }
}
