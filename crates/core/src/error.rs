use thiserror::Error;

use crate::time::ParseDayKeyError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    DayKey(#[from] ParseDayKeyError),
}
