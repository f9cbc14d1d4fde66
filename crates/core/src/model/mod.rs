mod ids;
mod progress;
mod reward;
mod streak;

pub use ids::{ActivityId, ExamId, ProductId, UserId};

pub use progress::{
    ExamAttempt, ExamType, HistoricalResult, HistoricalTotalScore, ProgressStats, QuestionAnswer,
    UserProgress,
};
pub use reward::{
    BASE_REWARD_HOURS, RewardLedger, STREAK_REWARD_THRESHOLD, milestone_reward_days,
};
pub use streak::{ActivityKind, DailyActivity, DayDigest, StreakState};

pub(crate) use progress::{push_result, push_total};
