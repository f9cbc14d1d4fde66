use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::ActivityId;
use crate::model::reward::RewardLedger;
use crate::time::DayKey;

fn epoch() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH
}

/// Kind of learning activity being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    /// A completed exam section.
    Exam,
    /// A grammar or vocabulary study session.
    Study,
}

//
// ─── DAILY ACTIVITY ───────────────────────────────────────────────────────────
//

/// One calendar day's engagement counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DailyActivity {
    #[serde(default)]
    pub activities_count: u32,
    #[serde(default)]
    pub exams_completed: u32,
    #[serde(default)]
    pub study_sessions_completed: u32,
    #[serde(default = "epoch")]
    pub updated_at: DateTime<Utc>,
    /// Idempotency keys already counted for this day.
    #[serde(default)]
    pub recorded_ids: BTreeSet<ActivityId>,
}

impl DailyActivity {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.activities_count == 0
    }
}

/// Per-day digest for the weekly activity chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayDigest {
    pub day: DayKey,
    pub activities_count: u32,
    pub exams_completed: u32,
    pub study_sessions_completed: u32,
}

//
// ─── STREAK STATE ─────────────────────────────────────────────────────────────
//

/// The daily-engagement document for one (product, user) pair.
///
/// Holds the streak counters, the per-day activity aggregates, and the
/// milestone reward ledger. Streak transitions live in [`crate::streak`];
/// this type owns the day-granular activity record keeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StreakState {
    #[serde(default)]
    pub current_streak: u32,
    #[serde(default)]
    pub longest_streak: u32,
    #[serde(default)]
    pub last_activity_date: Option<DayKey>,
    /// Lifetime count of distinct active days.
    #[serde(default)]
    pub total_days: u32,
    #[serde(default)]
    pub daily_activities: BTreeMap<DayKey, DailyActivity>,
    #[serde(default)]
    pub reward: RewardLedger,
    /// Day the streak summary was last surfaced to the user.
    #[serde(default)]
    pub last_summary_shown: Option<DayKey>,
}

impl StreakState {
    /// Count one activity into the given day's aggregate.
    ///
    /// Creates the day's record with zero counters on first touch. Returns
    /// `false` without counting when `activity_id` was already recorded for
    /// that day, so retried submissions cannot double-count.
    pub fn record_daily_activity(
        &mut self,
        day: DayKey,
        kind: ActivityKind,
        activity_id: &ActivityId,
        now: DateTime<Utc>,
    ) -> bool {
        let entry = self.daily_activities.entry(day).or_default();
        if !entry.recorded_ids.insert(activity_id.clone()) {
            return false;
        }

        entry.activities_count += 1;
        match kind {
            ActivityKind::Exam => entry.exams_completed += 1,
            ActivityKind::Study => entry.study_sessions_completed += 1,
        }
        entry.updated_at = now;
        true
    }

    /// The 7 days ending at `today` inclusive, oldest first.
    ///
    /// Always yields exactly 7 entries, zero-padded for days with no recorded
    /// activity. Read-only.
    #[must_use]
    pub fn weekly_activity(&self, today: DayKey) -> Vec<DayDigest> {
        let mut days: Vec<DayKey> = Vec::with_capacity(7);
        let mut day = today;
        for _ in 0..7 {
            days.push(day);
            day = day.pred();
        }
        days.reverse();

        days.into_iter()
            .map(|day| match self.daily_activities.get(&day) {
                Some(activity) => DayDigest {
                    day,
                    activities_count: activity.activities_count,
                    exams_completed: activity.exams_completed,
                    study_sessions_completed: activity.study_sessions_completed,
                },
                None => DayDigest {
                    day,
                    activities_count: 0,
                    exams_completed: 0,
                    study_sessions_completed: 0,
                },
            })
            .collect()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn day(s: &str) -> DayKey {
        s.parse().unwrap()
    }

    #[test]
    fn counts_by_kind_and_creates_day_lazily() {
        let mut state = StreakState::default();
        let today = day("2024-06-01");
        let now = fixed_now();

        assert!(state.record_daily_activity(today, ActivityKind::Exam, &ActivityId::new("a"), now));
        assert!(state.record_daily_activity(today, ActivityKind::Study, &ActivityId::new("b"), now));

        let entry = &state.daily_activities[&today];
        assert_eq!(entry.activities_count, 2);
        assert_eq!(entry.exams_completed, 1);
        assert_eq!(entry.study_sessions_completed, 1);
    }

    #[test]
    fn duplicate_activity_id_is_not_counted() {
        let mut state = StreakState::default();
        let today = day("2024-06-01");
        let id = ActivityId::new("retry-me");
        let now = fixed_now();

        assert!(state.record_daily_activity(today, ActivityKind::Exam, &id, now));
        assert!(!state.record_daily_activity(today, ActivityKind::Exam, &id, now));
        assert_eq!(state.daily_activities[&today].activities_count, 1);
    }

    #[test]
    fn same_id_counts_again_on_a_new_day() {
        let mut state = StreakState::default();
        let id = ActivityId::new("daily-quiz");
        let now = fixed_now();

        assert!(state.record_daily_activity(day("2024-06-01"), ActivityKind::Study, &id, now));
        assert!(state.record_daily_activity(day("2024-06-02"), ActivityKind::Study, &id, now));
    }

    #[test]
    fn weekly_activity_pads_to_seven_days() {
        let mut state = StreakState::default();
        let today = day("2024-06-07");
        let now = fixed_now();
        state.record_daily_activity(today, ActivityKind::Exam, &ActivityId::new("a"), now);
        state.record_daily_activity(day("2024-06-03"), ActivityKind::Study, &ActivityId::new("b"), now);

        let week = state.weekly_activity(today);
        assert_eq!(week.len(), 7);
        assert_eq!(week[0].day, day("2024-06-01"));
        assert_eq!(week[6].day, today);
        assert_eq!(week[6].activities_count, 1);
        assert_eq!(week[2].study_sessions_completed, 1);
        assert!(week.iter().filter(|d| d.activities_count > 0).count() == 2);
    }

    #[test]
    fn weekly_activity_is_all_zero_without_history() {
        let state = StreakState::default();
        let week = state.weekly_activity(day("2024-06-07"));
        assert_eq!(week.len(), 7);
        assert!(week.iter().all(|d| d.activities_count == 0));
    }
}
