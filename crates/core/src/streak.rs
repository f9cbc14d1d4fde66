//! Daily-activity streak state machine.
//!
//! Consumes activity events and advances the streak counters in
//! [`StreakState`], deciding when a milestone reward is earned and whether
//! the daily summary should be surfaced. The transition is driven entirely by
//! calendar-day keys, so a day with many activities mutates the streak at
//! most once.

use chrono::{DateTime, Utc};

use crate::model::{ActivityId, ActivityKind, StreakState, milestone_reward_days};
use crate::time::DayKey;

/// What one recorded activity did to the streak state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActivityOutcome {
    /// The activity id was already recorded today; nothing was mutated.
    pub duplicate: bool,
    /// This was the first counted activity of a new day, so the streak
    /// counters moved.
    pub counted_new_day: bool,
    /// A gap of 2+ days ended a streak of this length.
    pub streak_broken: Option<u32>,
    /// A new milestone was reached; the value is the reward level in days.
    pub milestone_earned: Option<u32>,
    /// The daily summary has not been shown today and should be surfaced.
    /// UI hint only; independent of the streak transition.
    pub show_summary: bool,
}

/// Apply one activity event to the streak state.
///
/// Same-day repeats only touch the day's activity counters; the streak
/// counters change at most once per calendar day. A gap of two or more days
/// breaks the streak but still counts the day as active. Milestone earns fire
/// when the streak crosses a new multiple of the reward threshold and no
/// unclaimed earn is pending.
pub fn record_activity(
    state: &mut StreakState,
    kind: ActivityKind,
    activity_id: &ActivityId,
    today: DayKey,
    now: DateTime<Utc>,
) -> ActivityOutcome {
    if !state.record_daily_activity(today, kind, activity_id, now) {
        return ActivityOutcome {
            duplicate: true,
            ..ActivityOutcome::default()
        };
    }

    let mut outcome = ActivityOutcome::default();

    let already_counted_today = state.last_activity_date == Some(today);
    if !already_counted_today {
        outcome.counted_new_day = true;

        match state.last_activity_date {
            None => {
                // First ever activity.
                state.current_streak = 1;
                state.longest_streak = state.longest_streak.max(1);
                state.total_days += 1;
            }
            Some(prev) if DayKey::is_consecutive(prev, today) => {
                state.current_streak += 1;
                state.total_days += 1;
                state.longest_streak = state.longest_streak.max(state.current_streak);
            }
            Some(_) => {
                outcome.streak_broken = Some(state.current_streak);
                state.current_streak = 1;
                state.total_days += 1;
            }
        }

        state.last_activity_date = Some(today);

        let level = milestone_reward_days(state.current_streak);
        let previous_level = milestone_reward_days(state.current_streak.saturating_sub(1));
        if level > previous_level && level > 0 && state.reward.mark_earned(now) {
            outcome.milestone_earned = Some(level);
        }
    }

    if state.last_summary_shown != Some(today) {
        outcome.show_summary = true;
        state.last_summary_shown = Some(today);
    }

    outcome
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
