//! Shared error types for the services crate.

use thiserror::Error;

use storage::repository::StorageError;

/// Errors emitted by `SyncService`.
///
/// Benign races (claiming with nothing earned, duplicate activity ids) are
/// not errors; they are reported in the operation's return value. A failed
/// remote call leaves in-memory state untouched; retrying is the caller's
/// discretion.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    /// No user id is available; operations never proceed as anonymous.
    #[error("not authenticated")]
    NotAuthenticated,

    /// Conditional writes kept conflicting with concurrent writers.
    #[error("write contention: retries exhausted")]
    Contention,

    #[error(transparent)]
    Storage(#[from] StorageError),
}
