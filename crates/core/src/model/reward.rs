use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Streak length unlocking one claimable reward, and the step between
/// milestones.
pub const STREAK_REWARD_THRESHOLD: u32 = 7;

/// Reward duration granted per milestone level.
pub const BASE_REWARD_HOURS: i64 = 24;

/// Reward size in days for a given streak: one day per full threshold
/// multiple.
#[must_use]
pub fn milestone_reward_days(streak: u32) -> u32 {
    streak / STREAK_REWARD_THRESHOLD
}

/// Tracks whether an earned milestone reward has been claimed and until when
/// the claimed benefit runs.
///
/// Invariants: `claimed` implies `expires_at` is set; earning does not stack
/// while a previous earn is unclaimed; claiming never resets the streak.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RewardLedger {
    #[serde(default)]
    pub earned: bool,
    #[serde(default)]
    pub claimed: bool,
    #[serde(default)]
    pub earned_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl RewardLedger {
    /// Mark a milestone as earned. Returns `false` when an unclaimed earn is
    /// already pending.
    pub fn mark_earned(&mut self, now: DateTime<Utc>) -> bool {
        if self.earned {
            return false;
        }
        self.earned = true;
        self.earned_at = Some(now);
        true
    }

    /// An earned reward is waiting to be claimed.
    #[must_use]
    pub fn pending(&self) -> bool {
        self.earned && !self.claimed
    }

    /// Claim the earned reward.
    ///
    /// Returns `None` when nothing is earned (a benign race, not an error).
    /// Idempotent while a claimed reward is still active: the existing expiry
    /// is returned without mutation, so claiming twice never double-extends.
    /// Otherwise the expiry is `now` plus 24h per milestone level of
    /// `current_streak`, and the earned flag is cleared so the next milestone
    /// can be earned later; the streak itself keeps running.
    pub fn claim(&mut self, current_streak: u32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.earned {
            return None;
        }
        if self.claimed {
            if let Some(expires_at) = self.expires_at {
                if expires_at > now {
                    return Some(expires_at);
                }
            }
        }

        let reward_days = i64::from(milestone_reward_days(current_streak));
        let expires_at = now + Duration::hours(reward_days * BASE_REWARD_HOURS);
        self.claimed = true;
        self.expires_at = Some(expires_at);
        self.earned = false;
        self.earned_at = None;
        Some(expires_at)
    }

    /// Grant a gifted benefit period outside the milestone flow.
    ///
    /// Extends a still-active period by the full duration instead of
    /// replacing it.
    pub fn grant(&mut self, duration_hours: i64, now: DateTime<Utc>) -> DateTime<Utc> {
        let base = match self.expires_at {
            Some(expires_at) if self.claimed && expires_at > now => expires_at,
            _ => now,
        };
        let expires_at = base + Duration::hours(duration_hours);
        self.claimed = true;
        self.expires_at = Some(expires_at);
        expires_at
    }

    /// Pure query: a claimed reward is currently in effect.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.claimed && self.expires_at.is_some_and(|at| at > now)
    }

    /// Lazy-expiry cleanup: clears `claimed`/`expires_at` once past expiry.
    ///
    /// Returns `true` when state was cleared, so the caller knows to persist.
    pub fn check_and_expire(&mut self, now: DateTime<Utc>) -> bool {
        if self.claimed && !self.is_active(now) {
            self.claimed = false;
            self.expires_at = None;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn milestone_levels() {
        assert_eq!(milestone_reward_days(6), 0);
        assert_eq!(milestone_reward_days(7), 1);
        assert_eq!(milestone_reward_days(13), 1);
        assert_eq!(milestone_reward_days(14), 2);
    }

    #[test]
    fn claim_without_earn_fails() {
        let mut ledger = RewardLedger::default();
        assert_eq!(ledger.claim(7, fixed_now()), None);
        assert!(!ledger.claimed);
    }

    #[test]
    fn claim_consumes_earn_and_sets_expiry() {
        let now = fixed_now();
        let mut ledger = RewardLedger::default();
        assert!(ledger.mark_earned(now));

        let expires_at = ledger.claim(7, now).unwrap();
        assert_eq!(expires_at, now + Duration::hours(24));
        assert!(ledger.claimed);
        assert!(!ledger.earned);
        assert_eq!(ledger.earned_at, None);
    }

    #[test]
    fn double_claim_returns_same_expiry() {
        let now = fixed_now();
        let mut ledger = RewardLedger::default();
        ledger.mark_earned(now);

        let first = ledger.claim(7, now).unwrap();
        ledger.mark_earned(now);
        let second = ledger.claim(7, now + Duration::hours(1)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn higher_milestones_grant_longer_rewards() {
        let now = fixed_now();
        let mut ledger = RewardLedger::default();
        ledger.mark_earned(now);
        let expires_at = ledger.claim(14, now).unwrap();
        assert_eq!(expires_at, now + Duration::hours(48));
    }

    #[test]
    fn earn_does_not_stack_while_unclaimed() {
        let now = fixed_now();
        let mut ledger = RewardLedger::default();
        assert!(ledger.mark_earned(now));
        assert!(!ledger.mark_earned(now + Duration::days(7)));
        assert_eq!(ledger.earned_at, Some(now));
    }

    #[test]
    fn active_until_expiry_then_check_and_expire_clears() {
        let now = fixed_now();
        let mut ledger = RewardLedger::default();
        ledger.mark_earned(now);
        ledger.claim(7, now);

        assert!(ledger.is_active(now + Duration::hours(23)));
        assert!(!ledger.is_active(now + Duration::hours(25)));

        assert!(!ledger.check_and_expire(now + Duration::hours(23)));
        assert!(ledger.check_and_expire(now + Duration::hours(25)));
        assert!(!ledger.claimed);
        assert_eq!(ledger.expires_at, None);
    }

    #[test]
    fn gift_extends_active_period() {
        let now = fixed_now();
        let mut ledger = RewardLedger::default();

        let first = ledger.grant(24, now);
        assert_eq!(first, now + Duration::hours(24));

        // Granting again while active extends from the current expiry.
        let second = ledger.grant(24, now + Duration::hours(1));
        assert_eq!(second, now + Duration::hours(48));

        // Granting after expiry starts fresh.
        let mut lapsed = RewardLedger::default();
        lapsed.grant(24, now);
        let restarted = lapsed.grant(24, now + Duration::hours(30));
        assert_eq!(restarted, now + Duration::hours(54));
    }
}
