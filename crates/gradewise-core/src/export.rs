//! Grade export rows and their CSV rendering.

use std::borrow::Cow;
use std::io::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Submission, SubmissionStatus};

/// Column order of [`write_csv`].
pub const CSV_HEADER: &str =
    "submission_id,student_id,status,score,max_score,grade,ai_score,submitted_at,graded_at";

/// One submission's grade, as exported for a gradebook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeRow {
    pub submission_id: String,
    pub student_id: String,
    pub status: SubmissionStatus,
    pub score: Option<f64>,
    pub max_score: Option<f64>,
    pub grade: Option<String>,
    /// The AI review's score, kept next to the teacher's for comparison.
    pub ai_score: Option<f64>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub graded_at: Option<DateTime<Utc>>,
}

impl From<&Submission> for GradeRow {
    fn from(submission: &Submission) -> Self {
        Self {
            submission_id: submission.id.clone(),
            student_id: submission.student_id.clone(),
            status: submission.status,
            score: submission.score,
            max_score: submission.max_score,
            grade: submission.grade.clone(),
            ai_score: submission.ai_review.as_ref().map(|review| review.score),
            submitted_at: submission.submitted_at,
            graded_at: submission.graded_at,
        }
    }
}

/// Write `rows` as CSV with a header line. Returns the number of rows.
pub fn write_csv<W: Write>(rows: &[GradeRow], mut out: W) -> std::io::Result<usize> {
    writeln!(out, "{CSV_HEADER}")?;
    for row in rows {
        writeln!(
            out,
            "{},{},{},{},{},{},{},{},{}",
            csv_escape(&row.submission_id),
            csv_escape(&row.student_id),
            row.status.as_str(),
            number(row.score),
            number(row.max_score),
            csv_escape(row.grade.as_deref().unwrap_or("")),
            number(row.ai_score),
            timestamp(row.submitted_at),
            timestamp(row.graded_at),
        )?;
    }
    out.flush()?;
    Ok(rows.len())
}

fn number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn timestamp(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

fn csv_escape(s: &str) -> Cow<'_, str> {
    if s.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", s.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(s)
    }
}
