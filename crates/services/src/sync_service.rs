use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, Offset, Utc};
use tracing::{debug, info, warn};

use prep_core::merge::merge_progress;
use prep_core::model::{
    ActivityId, ActivityKind, DayDigest, ExamId, ExamType, ProductId, QuestionAnswer, StreakState,
    UserId, UserProgress,
};
use prep_core::streak;
use prep_core::time::Clock;
use storage::cache::ProgressCache;
use storage::repository::{RemoteStore, StorageError};

use crate::error::SyncError;

/// Bounded optimistic-concurrency retries before reporting contention.
const MAX_WRITE_ATTEMPTS: usize = 3;

/// Default staleness bound for the local progress cache.
const DEFAULT_CACHE_TTL_MINUTES: i64 = 15;

//
// ─── OUTCOMES ─────────────────────────────────────────────────────────────────
//

/// UI-facing result of recording one activity.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityRecorded {
    /// Streak document after the write.
    pub streak: StreakState,
    /// The activity id was already counted today; nothing changed.
    pub duplicate: bool,
    /// The daily streak summary should be surfaced.
    pub should_show_summary: bool,
    /// A streak of this length was just broken by a gap.
    pub streak_broken: Option<u32>,
    /// A milestone reward of this many days was just earned.
    pub milestone_earned: Option<u32>,
}

/// Result of a claim attempt. `NotEarned` is a benign race, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    NotEarned,
    Claimed { expires_at: DateTime<Utc> },
}

//
// ─── SERVICE ──────────────────────────────────────────────────────────────────
//

/// Orchestrates the remote document store, the local cache, the streak state
/// machine, and the progress merge engine behind simple operations.
///
/// Every write is load–mutate–save of one whole document, guarded by the
/// store's compare-and-swap version; on conflict the mutation is re-applied
/// to a fresh load. Streak counters and the reward ledger share one document,
/// so they commit together.
pub struct SyncService {
    store: RemoteStore,
    cache: Arc<dyn ProgressCache>,
    product: ProductId,
    clock: Clock,
    /// The user's last-known UTC offset; the single clock policy for
    /// deriving local calendar days.
    tz_offset: FixedOffset,
    cache_ttl: Duration,
}

impl SyncService {
    #[must_use]
    pub fn new(store: RemoteStore, cache: Arc<dyn ProgressCache>, product: ProductId) -> Self {
        Self {
            store,
            cache,
            product,
            clock: Clock::default(),
            tz_offset: Utc.fix(),
            cache_ttl: Duration::minutes(DEFAULT_CACHE_TTL_MINUTES),
        }
    }

    /// Override the clock (usually for deterministic testing).
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Set the user's UTC offset used for calendar-day boundaries.
    #[must_use]
    pub fn with_tz_offset(mut self, offset: FixedOffset) -> Self {
        self.tz_offset = offset;
        self
    }

    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Current time according to the service's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn authenticated<'a>(user: Option<&'a UserId>) -> Result<&'a UserId, SyncError> {
        user.ok_or(SyncError::NotAuthenticated)
    }

    //
    // ─── WRITE LOOPS ──────────────────────────────────────────────────────
    //

    /// Load–mutate–save the streak document under optimistic concurrency.
    ///
    /// `apply` must be safe to re-run: on a version conflict it is applied
    /// again to a freshly loaded document.
    async fn update_streak<T>(
        &self,
        user: &UserId,
        mut apply: impl FnMut(&mut StreakState) -> T,
    ) -> Result<(StreakState, T), SyncError> {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let loaded = self.store.streaks.get_streak(&self.product, user).await?;
            let (mut state, expected) = match loaded {
                Some(versioned) => (versioned.doc, Some(versioned.version)),
                None => (StreakState::default(), None),
            };

            let out = apply(&mut state);

            match self
                .store
                .streaks
                .put_streak(&self.product, user, &state, expected)
                .await
            {
                Ok(_) => return Ok((state, out)),
                Err(StorageError::Conflict) => {
                    warn!(user = %user, attempt, "streak write conflicted, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(SyncError::Contention)
    }

    /// Load–mutate–save the progress document under optimistic concurrency.
    async fn update_progress(
        &self,
        user: &UserId,
        mut apply: impl FnMut(&mut UserProgress),
    ) -> Result<UserProgress, SyncError> {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let loaded = self.store.progress.get_progress(user).await?;
            let (mut doc, expected) = match loaded {
                Some(versioned) => (versioned.doc, Some(versioned.version)),
                None => (UserProgress::empty(self.now()), None),
            };

            apply(&mut doc);

            match self.store.progress.put_progress(user, &doc, expected).await {
                Ok(_) => return Ok(doc),
                Err(StorageError::Conflict) => {
                    warn!(user = %user, attempt, "progress write conflicted, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(SyncError::Contention)
    }

    //
    // ─── STREAK & REWARD OPERATIONS ───────────────────────────────────────
    //

    /// Record one learning activity for today.
    ///
    /// Counts the activity into today's aggregate (idempotent per activity
    /// id), advances the streak at most once per calendar day, and reports
    /// the UI-facing events.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::NotAuthenticated` without a user id, or storage
    /// errors from the remote store.
    pub async fn record_activity(
        &self,
        user: Option<&UserId>,
        kind: ActivityKind,
        activity_id: &ActivityId,
        score: u32,
    ) -> Result<ActivityRecorded, SyncError> {
        let user = Self::authenticated(user)?;
        let now = self.now();
        let today = self.clock.today(self.tz_offset);

        let (state, outcome) = self
            .update_streak(user, |state| {
                streak::record_activity(state, kind, activity_id, today, now)
            })
            .await?;

        if let Some(previous) = outcome.streak_broken {
            info!(user = %user, previous, "streak broken");
        }
        if let Some(level) = outcome.milestone_earned {
            info!(user = %user, streak = state.current_streak, level, "milestone reward earned");
        }
        debug!(
            user = %user,
            ?kind,
            activity_id = %activity_id,
            score,
            streak = state.current_streak,
            duplicate = outcome.duplicate,
            "activity recorded"
        );

        Ok(ActivityRecorded {
            duplicate: outcome.duplicate,
            should_show_summary: outcome.show_summary,
            streak_broken: outcome.streak_broken,
            milestone_earned: outcome.milestone_earned,
            streak: state,
        })
    }

    /// Claim the earned milestone reward.
    ///
    /// Idempotent while a claimed reward is still active; the running streak
    /// is never reset by a claim.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::NotAuthenticated` without a user id, or storage
    /// errors.
    pub async fn claim_reward(&self, user: Option<&UserId>) -> Result<ClaimOutcome, SyncError> {
        let user = Self::authenticated(user)?;
        let now = self.now();

        let (state, expires_at) = self
            .update_streak(user, |state| {
                let streak = state.current_streak;
                state.reward.claim(streak, now)
            })
            .await?;

        match expires_at {
            Some(expires_at) => {
                info!(user = %user, streak = state.current_streak, %expires_at, "reward claimed");
                Ok(ClaimOutcome::Claimed { expires_at })
            }
            None => {
                debug!(user = %user, "claim attempted with no reward earned");
                Ok(ClaimOutcome::NotEarned)
            }
        }
    }

    /// Whether a claimed reward is currently in effect.
    ///
    /// A reward found just past its expiry is cleaned up with an explicit
    /// check-and-expire write before reporting `false`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::NotAuthenticated` without a user id, or storage
    /// errors.
    pub async fn reward_active(&self, user: Option<&UserId>) -> Result<bool, SyncError> {
        let user = Self::authenticated(user)?;
        let now = self.now();

        let state = self.load_streak(user).await?;
        if state.reward.is_active(now) {
            return Ok(true);
        }
        if state.reward.claimed {
            // Lazy expiry: persist the cleanup so every device sees it.
            let (_, cleared) = self
                .update_streak(user, |state| state.reward.check_and_expire(now))
                .await?;
            if cleared {
                info!(user = %user, "reward expired and cleared");
            }
        }
        Ok(false)
    }

    /// An earned milestone reward is waiting to be claimed.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::NotAuthenticated` without a user id, or storage
    /// errors.
    pub async fn pending_reward(&self, user: Option<&UserId>) -> Result<bool, SyncError> {
        let user = Self::authenticated(user)?;
        Ok(self.load_streak(user).await?.reward.pending())
    }

    /// Grant a gifted benefit period outside the milestone flow, extending
    /// any active period.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::NotAuthenticated` without a user id, or storage
    /// errors.
    pub async fn grant_gift(
        &self,
        user: Option<&UserId>,
        duration_hours: i64,
    ) -> Result<DateTime<Utc>, SyncError> {
        let user = Self::authenticated(user)?;
        let now = self.now();

        let (_, expires_at) = self
            .update_streak(user, |state| state.reward.grant(duration_hours, now))
            .await?;
        info!(user = %user, duration_hours, %expires_at, "gift reward granted");
        Ok(expires_at)
    }

    /// The current streak document, defaulted when none exists yet.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::NotAuthenticated` without a user id, or storage
    /// errors.
    pub async fn streak_state(&self, user: Option<&UserId>) -> Result<StreakState, SyncError> {
        let user = Self::authenticated(user)?;
        self.load_streak(user).await
    }

    /// The last 7 days of activity ending today, oldest first, zero-padded.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::NotAuthenticated` without a user id, or storage
    /// errors.
    pub async fn weekly_activity(&self, user: Option<&UserId>) -> Result<Vec<DayDigest>, SyncError> {
        let user = Self::authenticated(user)?;
        let today = self.clock.today(self.tz_offset);
        Ok(self.load_streak(user).await?.weekly_activity(today))
    }

    async fn load_streak(&self, user: &UserId) -> Result<StreakState, SyncError> {
        let loaded = self.store.streaks.get_streak(&self.product, user).await?;
        Ok(loaded.map(|v| v.doc).unwrap_or_default())
    }

    //
    // ─── PROGRESS OPERATIONS ──────────────────────────────────────────────
    //

    /// Record a newly scored exam attempt.
    ///
    /// The attempt is applied as a single-attempt delta and merged into the
    /// remote document with the same union rule as cross-device merges, so a
    /// concurrent writer's history is never lost. The local cache is
    /// refreshed with the merged result.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::NotAuthenticated` without a user id, or storage
    /// errors.
    pub async fn record_exam_result(
        &self,
        user: Option<&UserId>,
        exam_type: ExamType,
        exam_id: &ExamId,
        answers: Vec<QuestionAnswer>,
        score: u32,
        max_score: u32,
    ) -> Result<UserProgress, SyncError> {
        let user = Self::authenticated(user)?;
        let now = self.now();

        let mut delta = UserProgress::empty(now);
        delta.apply_attempt(exam_type, exam_id.clone(), answers, score, max_score, now);

        let merged = self
            .update_progress(user, |doc| *doc = merge_progress(&delta, doc))
            .await?;

        info!(
            user = %user,
            ?exam_type,
            exam_id = %exam_id,
            score,
            max_score,
            total_score = merged.total_score,
            "exam result recorded"
        );

        self.cache.put_cached(user, &merged, now).await?;
        Ok(merged)
    }

    /// Reconcile a device-local snapshot with the remote document.
    ///
    /// Called once per sign-in for a device that accumulated progress while
    /// signed out. The merged result becomes both the new remote state and
    /// the cached local state.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::NotAuthenticated` without a user id, or storage
    /// errors.
    pub async fn merge_on_login(
        &self,
        user: Option<&UserId>,
        local_snapshot: &UserProgress,
    ) -> Result<UserProgress, SyncError> {
        let user = Self::authenticated(user)?;
        let now = self.now();

        let merged = self
            .update_progress(user, |doc| *doc = merge_progress(local_snapshot, doc))
            .await?;

        info!(
            user = %user,
            exams = merged.exams.len(),
            total_score = merged.total_score,
            "login merge completed"
        );

        self.cache.put_cached(user, &merged, now).await?;
        Ok(merged)
    }

    /// The user's progress document, served from the local cache while
    /// fresh.
    ///
    /// The TTL only bounds staleness of reads; merge correctness never
    /// depends on it.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::NotAuthenticated` without a user id, or storage
    /// errors.
    pub async fn progress(&self, user: Option<&UserId>) -> Result<UserProgress, SyncError> {
        let user = Self::authenticated(user)?;
        let now = self.now();

        if let Some(entry) = self.cache.get_cached(user).await? {
            if entry.is_fresh(self.cache_ttl, now) {
                debug!(user = %user, "serving progress from cache");
                return Ok(entry.doc);
            }
        }

        let doc = self
            .store
            .progress
            .get_progress(user)
            .await?
            .map_or_else(|| UserProgress::empty(now), |v| v.doc);
        self.cache.put_cached(user, &doc, now).await?;
        Ok(doc)
    }

    /// Delete all progress and streak data for the user (account deletion).
    ///
    /// # Errors
    ///
    /// Returns `SyncError::NotAuthenticated` without a user id, or storage
    /// errors.
    pub async fn clear_all(&self, user: Option<&UserId>) -> Result<(), SyncError> {
        let user = Self::authenticated(user)?;

        self.store.progress.delete_progress(user).await?;
        self.store.streaks.delete_streak(&self.product, user).await?;
        self.cache.clear_cached(user).await?;
        info!(user = %user, "all user data cleared");
        Ok(())
    }
}

//
// ─── TESTS ────────────────────────────────────────────────────────────────────
//
