#![forbid(unsafe_code)]

pub mod error;
pub mod merge;
pub mod model;
pub mod streak;
pub mod time;

pub use error::Error;
pub use merge::merge_progress;
pub use streak::{ActivityOutcome, record_activity};
pub use time::{Clock, DayKey, ParseDayKeyError};
