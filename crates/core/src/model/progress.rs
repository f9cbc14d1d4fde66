use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::ExamId;

fn epoch() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH
}

//
// ─── EXAM TYPE ────────────────────────────────────────────────────────────────
//

/// Section of the exam a practice item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExamType {
    Grammar,
    Reading,
    Listening,
    Writing,
    Speaking,
}

//
// ─── ANSWERS & HISTORY ────────────────────────────────────────────────────────
//

/// One submitted answer to one question of an exam attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionAnswer {
    pub question_id: u32,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub is_correct: bool,
    #[serde(default = "epoch")]
    pub answered_at: DateTime<Utc>,
}

/// Snapshot of one scored attempt, kept across repeated attempts.
///
/// Entries are deduplicated by exact timestamp and stored sorted ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalResult {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub score: u32,
    #[serde(default)]
    pub max_score: u32,
}

/// Snapshot of the aggregate totals at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalTotalScore {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub total_score: u32,
    #[serde(default)]
    pub total_max_score: u32,
}

//
// ─── EXAM ATTEMPT ─────────────────────────────────────────────────────────────
//

/// The current scored attempt at one exam item, plus its attempt history.
///
/// Within one [`UserProgress`] there is at most one `ExamAttempt` per
/// `(exam_type, exam_id)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamAttempt {
    pub exam_type: ExamType,
    pub exam_id: ExamId,
    #[serde(default)]
    pub answers: Vec<QuestionAnswer>,
    #[serde(default)]
    pub score: u32,
    #[serde(default)]
    pub max_score: u32,
    #[serde(default)]
    pub completed: bool,
    #[serde(default = "epoch")]
    pub last_attempt: DateTime<Utc>,
    #[serde(default)]
    pub historical_results: Vec<HistoricalResult>,
}

impl ExamAttempt {
    /// True if `other` refers to the same exam item.
    #[must_use]
    pub fn same_item(&self, exam_type: ExamType, exam_id: &ExamId) -> bool {
        self.exam_type == exam_type && self.exam_id == *exam_id
    }
}

//
// ─── USER PROGRESS ────────────────────────────────────────────────────────────
//

/// Aggregated progress statistics, useful for UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressStats {
    pub total_exams: usize,
    pub completed_exams: usize,
    pub total_score: u32,
    pub total_max_score: u32,
    /// Rounded percentage of points earned over points available.
    pub average_percent: u32,
}

/// The full exam-progress document for one user.
///
/// Created empty on first activity, mutated on every exam completion, and
/// reconciled across devices by [`crate::merge::merge_progress`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UserProgress {
    #[serde(default)]
    pub exams: Vec<ExamAttempt>,
    #[serde(default)]
    pub total_score: u32,
    #[serde(default)]
    pub total_max_score: u32,
    #[serde(default)]
    pub historical_total_scores: Vec<HistoricalTotalScore>,
    #[serde(default = "epoch")]
    pub last_updated: DateTime<Utc>,
}

impl UserProgress {
    /// An empty document stamped at `now`.
    #[must_use]
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            last_updated: now,
            ..Self::default()
        }
    }

    /// The current attempt for an exam item, if any.
    #[must_use]
    pub fn attempt(&self, exam_type: ExamType, exam_id: &ExamId) -> Option<&ExamAttempt> {
        self.exams.iter().find(|e| e.same_item(exam_type, exam_id))
    }

    /// Record a newly scored attempt.
    ///
    /// Replaces the current attempt for the item (creating it if absent),
    /// appends the new result to the item's attempt history, recomputes the
    /// aggregate totals, and snapshots them into the total-score history.
    pub fn apply_attempt(
        &mut self,
        exam_type: ExamType,
        exam_id: ExamId,
        answers: Vec<QuestionAnswer>,
        score: u32,
        max_score: u32,
        now: DateTime<Utc>,
    ) {
        let snapshot = HistoricalResult {
            timestamp: now,
            score,
            max_score,
        };

        match self
            .exams
            .iter_mut()
            .find(|e| e.same_item(exam_type, &exam_id))
        {
            Some(existing) => {
                existing.answers = answers;
                existing.score = score;
                existing.max_score = max_score;
                existing.completed = true;
                existing.last_attempt = now;
                push_result(&mut existing.historical_results, snapshot);
            }
            None => {
                self.exams.push(ExamAttempt {
                    exam_type,
                    exam_id,
                    answers,
                    score,
                    max_score,
                    completed: true,
                    last_attempt: now,
                    historical_results: vec![snapshot],
                });
            }
        }

        self.recompute_totals();
        push_total(
            &mut self.historical_total_scores,
            HistoricalTotalScore {
                timestamp: now,
                total_score: self.total_score,
                total_max_score: self.total_max_score,
            },
        );
        self.last_updated = now;
    }

    /// Re-derive `total_score`/`total_max_score` from the current attempts.
    pub fn recompute_totals(&mut self) {
        self.total_score = self.exams.iter().map(|e| e.score).sum();
        self.total_max_score = self.exams.iter().map(|e| e.max_score).sum();
    }

    /// Summary statistics over the current attempts.
    #[must_use]
    pub fn stats(&self) -> ProgressStats {
        let completed = self.exams.iter().filter(|e| e.completed).count();
        let average_percent = if self.total_max_score > 0 {
            (self.total_score * 100 + self.total_max_score / 2) / self.total_max_score
        } else {
            0
        };
        ProgressStats {
            total_exams: self.exams.len(),
            completed_exams: completed,
            total_score: self.total_score,
            total_max_score: self.total_max_score,
            average_percent,
        }
    }
}

/// Insert a result snapshot, deduplicating by exact timestamp and keeping the
/// list sorted ascending.
pub(crate) fn push_result(list: &mut Vec<HistoricalResult>, entry: HistoricalResult) {
    if list.iter().any(|e| e.timestamp == entry.timestamp) {
        return;
    }
    let at = list.partition_point(|e| e.timestamp < entry.timestamp);
    list.insert(at, entry);
}

/// Same policy as [`push_result`], for total-score snapshots.
pub(crate) fn push_total(list: &mut Vec<HistoricalTotalScore>, entry: HistoricalTotalScore) {
    if list.iter().any(|e| e.timestamp == entry.timestamp) {
        return;
    }
    let at = list.partition_point(|e| e.timestamp < entry.timestamp);
    list.insert(at, entry);
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn answers(correct: usize, total: usize) -> Vec<QuestionAnswer> {
        (0..total)
            .map(|i| QuestionAnswer {
                question_id: u32::try_from(i).unwrap(),
                answer: format!("a{i}"),
                is_correct: i < correct,
                answered_at: fixed_now(),
            })
            .collect()
    }

    #[test]
    fn first_attempt_creates_entry_and_totals() {
        let now = fixed_now();
        let mut progress = UserProgress::empty(now);
        progress.apply_attempt(
            ExamType::Grammar,
            ExamId::new("g1"),
            answers(3, 5),
            3,
            5,
            now,
        );

        assert_eq!(progress.exams.len(), 1);
        assert_eq!(progress.total_score, 3);
        assert_eq!(progress.total_max_score, 5);
        assert_eq!(progress.historical_total_scores.len(), 1);
        let attempt = progress.attempt(ExamType::Grammar, &ExamId::new("g1")).unwrap();
        assert!(attempt.completed);
        assert_eq!(attempt.historical_results.len(), 1);
    }

    #[test]
    fn repeated_attempt_replaces_current_and_grows_history() {
        let t0 = fixed_now();
        let t1 = t0 + Duration::hours(2);
        let mut progress = UserProgress::empty(t0);
        let id = ExamId::new("r2");

        progress.apply_attempt(ExamType::Reading, id.clone(), answers(2, 5), 2, 5, t0);
        progress.apply_attempt(ExamType::Reading, id.clone(), answers(4, 5), 4, 5, t1);

        assert_eq!(progress.exams.len(), 1);
        let attempt = progress.attempt(ExamType::Reading, &id).unwrap();
        assert_eq!(attempt.score, 4);
        assert_eq!(attempt.last_attempt, t1);
        assert_eq!(attempt.historical_results.len(), 2);
        assert!(attempt.historical_results[0].timestamp < attempt.historical_results[1].timestamp);
        assert_eq!(progress.total_score, 4);
    }

    #[test]
    fn history_dedupes_by_exact_timestamp() {
        let now = fixed_now();
        let mut list = vec![HistoricalResult {
            timestamp: now,
            score: 1,
            max_score: 5,
        }];
        push_result(
            &mut list,
            HistoricalResult {
                timestamp: now,
                score: 9,
                max_score: 9,
            },
        );
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].score, 1);
    }

    #[test]
    fn separate_items_sum_into_totals() {
        let now = fixed_now();
        let mut progress = UserProgress::empty(now);
        progress.apply_attempt(ExamType::Grammar, ExamId::new("g1"), answers(3, 5), 3, 5, now);
        progress.apply_attempt(
            ExamType::Listening,
            ExamId::new("l1"),
            answers(4, 4),
            4,
            4,
            now + Duration::minutes(1),
        );

        assert_eq!(progress.exams.len(), 2);
        assert_eq!(progress.total_score, 7);
        assert_eq!(progress.total_max_score, 9);

        let stats = progress.stats();
        assert_eq!(stats.completed_exams, 2);
        assert_eq!(stats.average_percent, 78);
    }

    #[test]
    fn old_schema_documents_deserialize_with_defaults() {
        // A document written before totals and history existed.
        let json = r#"{
            "exams": [
                {"exam_type": "grammar", "exam_id": "g1", "score": 2, "max_score": 5}
            ]
        }"#;
        let progress: UserProgress = serde_json::from_str(json).unwrap();
        assert_eq!(progress.exams.len(), 1);
        assert!(!progress.exams[0].completed);
        assert!(progress.exams[0].historical_results.is_empty());
        assert_eq!(progress.total_score, 0);
        assert_eq!(progress.last_updated, DateTime::UNIX_EPOCH);
    }
}
