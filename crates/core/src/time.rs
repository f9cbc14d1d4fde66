use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A simple clock abstraction for deterministic time in services and tests.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    Default,
    Fixed(DateTime<Utc>),
}

impl Clock {
    /// Returns a clock that uses the current system time.
    #[must_use]
    pub fn default_clock() -> Self {
        Self::Default
    }

    /// Returns a clock fixed at the given timestamp.
    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    /// Returns the current time according to the clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::Default => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }

    /// If this is a fixed clock, advance it by the given duration.
    ///
    /// Has no effect on `Clock::Default`.
    pub fn advance(&mut self, delta: Duration) {
        if let Clock::Fixed(t) = self {
            *t += delta;
        }
    }

    /// The current calendar day in the given UTC offset.
    #[must_use]
    pub fn today(&self, offset: FixedOffset) -> DayKey {
        DayKey::from_utc(self.now(), offset)
    }

    /// Returns true if this clock represents real time.
    #[must_use]
    pub fn is_default(&self) -> bool {
        matches!(self, Clock::Default)
    }

    /// Returns true if this clock is fixed.
    #[must_use]
    pub fn is_fixed(&self) -> bool {
        matches!(self, Clock::Fixed(_))
    }
}

/// Error parsing a `DayKey` from its `YYYY-MM-DD` form.
///
/// Day keys are always minted through [`DayKey::from_utc`], so hitting this
/// outside of deserializing foreign data is a programmer error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid day key: {input:?} (expected YYYY-MM-DD)")]
pub struct ParseDayKeyError {
    pub input: String,
}

/// One calendar day in the user's local timezone, the unit of streak
/// accounting.
///
/// Rendered and persisted as `YYYY-MM-DD`. Two instants within the same local
/// calendar day map to the same key regardless of time-of-day, and the
/// consecutive-day check operates on date-only values so DST transitions
/// cannot shift a day boundary.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayKey(NaiveDate);

impl DayKey {
    /// Derive the local calendar day for an instant, given the user's UTC
    /// offset.
    #[must_use]
    pub fn from_utc(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self(now.with_timezone(&offset).date_naive())
    }

    #[must_use]
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date)
    }

    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// True iff `curr` is exactly one calendar day after `prev`.
    #[must_use]
    pub fn is_consecutive(prev: DayKey, curr: DayKey) -> bool {
        curr.0.signed_duration_since(prev.0).num_days() == 1
    }

    /// The following calendar day.
    #[must_use]
    pub fn succ(&self) -> Self {
        Self(self.0 + Duration::days(1))
    }

    /// The preceding calendar day.
    #[must_use]
    pub fn pred(&self) -> Self {
        Self(self.0 - Duration::days(1))
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl fmt::Debug for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DayKey({self})")
    }
}

impl FromStr for DayKey {
    type Err = ParseDayKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Self)
            .map_err(|_| ParseDayKeyError {
                input: s.to_owned(),
            })
    }
}

/// Deterministic timestamp for tests and examples (2023-11-14T22:13:20Z).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// Returns a deterministic `DateTime<Utc>` for tests and doc examples.
///
/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}

/// Returns a `Clock` fixed at the deterministic test timestamp.
#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc_offset() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn same_local_day_maps_to_same_key() {
        let offset = FixedOffset::east_opt(3600).unwrap();
        let morning = "2024-03-10T06:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let night = "2024-03-10T22:30:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(
            DayKey::from_utc(morning, offset),
            DayKey::from_utc(night, offset)
        );
    }

    #[test]
    fn offset_can_move_the_day_boundary() {
        // 23:30 UTC is already the next day at UTC+1.
        let late = "2024-03-10T23:30:00Z".parse::<DateTime<Utc>>().unwrap();
        let plus_one = FixedOffset::east_opt(3600).unwrap();
        assert_eq!(
            DayKey::from_utc(late, utc_offset()).to_string(),
            "2024-03-10"
        );
        assert_eq!(DayKey::from_utc(late, plus_one).to_string(), "2024-03-11");
    }

    #[test]
    fn consecutive_day_classification() {
        let a: DayKey = "2024-02-28".parse().unwrap();
        let b: DayKey = "2024-02-29".parse().unwrap();
        let c: DayKey = "2024-03-01".parse().unwrap();
        assert!(DayKey::is_consecutive(a, b));
        assert!(DayKey::is_consecutive(b, c));
        assert!(!DayKey::is_consecutive(a, c));
        assert!(!DayKey::is_consecutive(b, a));
        assert!(!DayKey::is_consecutive(a, a));
    }

    #[test]
    fn succ_and_pred_are_inverse() {
        let day: DayKey = "2023-12-31".parse().unwrap();
        assert_eq!(day.succ().to_string(), "2024-01-01");
        assert_eq!(day.succ().pred(), day);
    }

    #[test]
    fn malformed_day_key_fails_to_parse() {
        assert!("2024-13-01".parse::<DayKey>().is_err());
        assert!("yesterday".parse::<DayKey>().is_err());
        assert!("".parse::<DayKey>().is_err());
    }

    #[test]
    fn serde_round_trips_as_plain_string() {
        let day: DayKey = "2024-05-17".parse().unwrap();
        let json = serde_json::to_string(&day).unwrap();
        assert_eq!(json, "\"2024-05-17\"");
        let back: DayKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, day);
    }

    #[test]
    fn clock_today_uses_offset() {
        let clock = fixed_clock();
        let day = clock.today(utc_offset());
        assert_eq!(day.to_string(), "2023-11-14");
    }
}
