#![forbid(unsafe_code)]

pub mod error;
pub mod sync_service;

pub use error::SyncError;
pub use sync_service::{ActivityRecorded, ClaimOutcome, SyncService};

// Re-exported so service callers control time without a direct core
// dependency.
pub use prep_core::Clock;
