//! Error types for gradewise.
//!
//! `GradingError` is the taxonomy surfaced to callers. `ScorerError` is what
//! an external scoring capability reports; the orchestrator classifies it for
//! retry decisions and recovers from it locally.

use thiserror::Error;

/// Errors surfaced by gradewise operations.
#[derive(Debug, Error)]
pub enum GradingError {
    /// The caller lacks the requested capability on a record.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Unknown identifier.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Malformed input such as a bad rubric or an out-of-scale score.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A status change that would move a submission backwards or skip a
    /// required state.
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// The rubric cannot produce a grade.
    #[error("aggregation failed: {0}")]
    Aggregation(AggregationError),

    /// A single criterion's scoring call failed.
    #[error("external scoring failed: {0}")]
    ExternalService(#[from] ScorerError),

    /// Another grading invocation holds the lease for this submission.
    #[error("submission {submission_id} is already being graded")]
    Busy { submission_id: String },

    /// The record store failed.
    #[error("record store error: {0}")]
    Store(String),
}

impl GradingError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        GradingError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Returns `true` if the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GradingError::Busy { .. } | GradingError::Store(_))
    }
}

/// Problems found while turning per-criterion scores into one grade.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AggregationError {
    #[error("rubric has no criteria")]
    EmptyRubric,

    #[error("no scored criteria to aggregate")]
    NoScoredCriteria,

    #[error("score for '{criterion}' is not a rubric criterion")]
    UnknownCriterion { criterion: String },

    #[error("score {score} for '{criterion}' is outside [{min}, {max}]")]
    ScoreOutOfRange {
        criterion: String,
        score: f64,
        min: i32,
        max: i32,
    },

    #[error("weight {weight} for '{criterion}' is not a finite, non-negative number")]
    InvalidWeight { criterion: String, weight: f64 },

    #[error("invalid {name}: {value} (must be finite and positive)")]
    InvalidScale { name: &'static str, value: f64 },
}

impl AggregationError {
    /// Value problems in the submitted scores, as opposed to structural
    /// problems with the rubric or the scale.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            AggregationError::UnknownCriterion { .. } | AggregationError::ScoreOutOfRange { .. }
        )
    }
}

impl From<AggregationError> for GradingError {
    fn from(err: AggregationError) -> Self {
        if err.is_input_error() {
            GradingError::Validation(err.to_string())
        } else {
            GradingError::Aggregation(err)
        }
    }
}

/// Errors reported by an external scoring capability.
#[derive(Debug, Clone, Error)]
pub enum ScorerError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}ms")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),

    /// The scorer answered, but not with a usable score.
    #[error("malformed scorer output: {0}")]
    Malformed(String),
}

impl ScorerError {
    /// Returns `true` if this error is permanent and should not be retried.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ScorerError::AuthenticationFailed(_) | ScorerError::Malformed(_)
        ) || matches!(self, ScorerError::ApiError { status, .. } if (400..500).contains(status))
    }

    /// Returns the retry-after delay in milliseconds, if applicable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ScorerError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}
