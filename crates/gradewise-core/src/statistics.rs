//! Per-assignment submission statistics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::GradingError;
use crate::model::{Record, SortKey, Submission, SubmissionStatus};
use crate::store::RecordStore;

/// Letter grades counted in the distribution.
pub const GRADE_LETTERS: [&str; 5] = ["A", "B", "C", "D", "F"];

/// Summary of one assignment's submissions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentStatistics {
    pub assignment_id: String,
    pub total_submissions: usize,
    /// Submissions that have left the draft state.
    pub submitted_count: usize,
    /// Submissions graded or released.
    pub graded_count: usize,
    /// Mean graded score, one decimal place.
    pub avg_score: Option<f64>,
    pub max_score: Option<f64>,
    pub min_score: Option<f64>,
    pub grade_distribution: BTreeMap<String, usize>,
}

/// Running accumulator fed one submission at a time.
#[derive(Debug, Clone)]
pub struct StatisticsAccumulator {
    stats: AssignmentStatistics,
    score_sum: f64,
    scored: usize,
}

impl StatisticsAccumulator {
    pub fn new(assignment_id: &str) -> Self {
        Self {
            stats: AssignmentStatistics {
                assignment_id: assignment_id.to_string(),
                total_submissions: 0,
                submitted_count: 0,
                graded_count: 0,
                avg_score: None,
                max_score: None,
                min_score: None,
                grade_distribution: GRADE_LETTERS
                    .iter()
                    .map(|letter| (letter.to_string(), 0))
                    .collect(),
            },
            score_sum: 0.0,
            scored: 0,
        }
    }

    pub fn add(&mut self, submission: &Submission) {
        let stats = &mut self.stats;
        stats.total_submissions += 1;
        if submission.status.is_submitted() {
            stats.submitted_count += 1;
        }
        let graded = submission.status >= SubmissionStatus::Graded;
        if graded {
            stats.graded_count += 1;
            if let Some(score) = submission.score {
                self.score_sum += score;
                self.scored += 1;
                stats.max_score = Some(stats.max_score.map_or(score, |m| m.max(score)));
                stats.min_score = Some(stats.min_score.map_or(score, |m| m.min(score)));
            }
        }
        if let Some(count) = submission
            .grade
            .as_deref()
            .and_then(|grade| stats.grade_distribution.get_mut(grade))
        {
            *count += 1;
        }
    }

    pub fn finish(mut self) -> AssignmentStatistics {
        if self.scored > 0 {
            let avg = self.score_sum / self.scored as f64;
            self.stats.avg_score = Some((avg * 10.0).round() / 10.0);
        }
        self.stats
    }
}

/// Compute statistics for `assignment_id`, reading submissions in batches.
pub async fn collect_statistics(
    store: &dyn RecordStore,
    assignment_id: &str,
    batch_size: usize,
) -> Result<AssignmentStatistics, GradingError> {
    let batch_size = batch_size.max(1);
    let mut acc = StatisticsAccumulator::new(assignment_id);
    let mut cursor: Option<SortKey> = None;
    loop {
        let batch = store
            .submission_batch(assignment_id, cursor.as_ref(), batch_size)
            .await?;
        for submission in &batch {
            acc.add(submission);
        }
        if batch.len() < batch_size {
            break;
        }
        cursor = batch.last().map(Record::sort_key);
    }
    Ok(acc.finish())
}
