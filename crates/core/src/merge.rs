//! Progress merge engine.
//!
//! Reconciles two independently-evolved copies of a user's exam progress
//! (the local offline cache and the remote document) into one. The merge is
//! a union by `(exam_type, exam_id)` with newer-attempt-wins scalars and
//! dedup-by-timestamp history unions, so re-merging the same snapshots is
//! idempotent and no completed attempt present on either side is ever lost.

use crate::model::{ExamAttempt, HistoricalResult, HistoricalTotalScore, UserProgress};
use crate::model::{push_result, push_total};

/// Merge a locally cached progress document with the remote one.
///
/// Policy per attempt key:
/// - present on one side only: taken as-is;
/// - present on both: the side with the strictly newer `last_attempt` keeps
///   its scalar fields (answers, score, completion); an exact timestamp tie
///   keeps the remote side;
/// - the per-attempt result histories of both sides are always unioned,
///   deduplicated by exact timestamp, and sorted ascending — the history
///   never shrinks from a merge.
///
/// Totals are recomputed from the merged current attempts, the total-score
/// history is unioned the same way, and `last_updated` is the max of the two
/// inputs.
#[must_use]
pub fn merge_progress(local: &UserProgress, remote: &UserProgress) -> UserProgress {
    let mut exams: Vec<ExamAttempt> = remote.exams.clone();

    for local_exam in &local.exams {
        match exams
            .iter_mut()
            .find(|e| e.same_item(local_exam.exam_type, &local_exam.exam_id))
        {
            Some(existing) => {
                let history = merge_results(&existing.historical_results, &local_exam.historical_results);
                if local_exam.last_attempt > existing.last_attempt {
                    *existing = local_exam.clone();
                }
                existing.historical_results = history;
            }
            None => exams.push(local_exam.clone()),
        }
    }

    let mut merged = UserProgress {
        exams,
        total_score: 0,
        total_max_score: 0,
        historical_total_scores: merge_totals(
            &remote.historical_total_scores,
            &local.historical_total_scores,
        ),
        last_updated: local.last_updated.max(remote.last_updated),
    };
    merged.recompute_totals();
    merged
}

fn merge_results(a: &[HistoricalResult], b: &[HistoricalResult]) -> Vec<HistoricalResult> {
    let mut merged = Vec::with_capacity(a.len() + b.len());
    for entry in a.iter().chain(b) {
        push_result(&mut merged, *entry);
    }
    merged
}

fn merge_totals(a: &[HistoricalTotalScore], b: &[HistoricalTotalScore]) -> Vec<HistoricalTotalScore> {
    let mut merged = Vec::with_capacity(a.len() + b.len());
    for entry in a.iter().chain(b) {
        push_total(&mut merged, *entry);
    }
    merged
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
