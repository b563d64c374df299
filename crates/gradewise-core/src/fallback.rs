//! Deterministic substitutes for failed criterion scoring.

use crate::error::ScorerError;
use crate::model::Criterion;
use crate::traits::CriterionScore;

/// Baseline score assigned when the scorer fails, on a 0–5 style scale.
pub const DEFAULT_BASELINE_SCORE: f64 = 3.5;

/// Produces a locally computed score when the external scorer fails.
pub trait FallbackStrategy: Send + Sync {
    fn fallback(&self, criterion: &Criterion, error: &ScorerError) -> CriterionScore;
}

/// Fixed baseline score with a generic rationale naming the criterion.
#[derive(Debug, Clone)]
pub struct BaselineFallback {
    baseline: f64,
}

impl BaselineFallback {
    pub fn new(baseline: f64) -> Self {
        Self { baseline }
    }
}

impl Default for BaselineFallback {
    fn default() -> Self {
        Self::new(DEFAULT_BASELINE_SCORE)
    }
}

impl FallbackStrategy for BaselineFallback {
    fn fallback(&self, criterion: &Criterion, _error: &ScorerError) -> CriterionScore {
        let score = criterion.scale.clamp(self.baseline);
        CriterionScore::new(
            score,
            format!(
                "Automatic scoring for \"{}\" was unavailable; a baseline score of {score} \
                 was assigned pending teacher review.",
                criterion.title
            ),
        )
    }
}
