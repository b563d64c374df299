//! Rubric validation and weighted score aggregation.
//!
//! Aggregation is pure: it never calls a scorer and can be exercised on its
//! own with hand-written scores.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{AggregationError, GradingError};
use crate::model::{Criterion, Rubric};

/// Weight sums within this distance of 1.0 are considered exact.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Weight sums farther than this from 1.0 are rejected by [`Rubric::validate`].
pub const WEIGHT_SUM_LIMIT: f64 = 0.01;

/// Reference scale used when a caller does not configure one.
pub const DEFAULT_REFERENCE_SCALE_MAX: f64 = 5.0;

/// Result of a successful aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    pub weighted_sum: f64,
    pub total_weight: f64,
    /// Weighted mean on the reference scale.
    pub normalized: f64,
    /// `normalized` rescaled to the target maximum, rounded to 2 places.
    pub final_score: f64,
    /// Criterion ids that contributed, in rubric order.
    pub scored_criteria: Vec<String>,
    /// |Σ weight − 1| over the whole rubric when it exceeds [`WEIGHT_TOLERANCE`].
    pub weight_deviation: Option<f64>,
}

/// Non-fatal findings from [`Rubric::validate`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RubricReport {
    pub weight_sum: f64,
    pub warnings: Vec<String>,
}

impl Criterion {
    /// Weight used in aggregation: the explicit weight, or an equal share.
    pub fn effective_weight(&self, criteria_count: usize) -> f64 {
        match self.weight {
            Some(w) => w,
            None if criteria_count > 0 => 1.0 / criteria_count as f64,
            None => 0.0,
        }
    }
}

impl Rubric {
    /// Sum of effective weights across all criteria.
    pub fn weight_sum(&self) -> f64 {
        let n = self.criteria.len();
        self.criteria.iter().map(|c| c.effective_weight(n)).sum()
    }

    /// |Σ weight − 1| when it exceeds [`WEIGHT_TOLERANCE`].
    pub fn weight_deviation(&self) -> Option<f64> {
        if self.criteria.is_empty() {
            return None;
        }
        let deviation = (self.weight_sum() - 1.0).abs();
        (deviation > WEIGHT_TOLERANCE).then_some(deviation)
    }

    /// Check the rubric's shape.
    ///
    /// Structural problems are errors. A weight sum off by less than
    /// [`WEIGHT_SUM_LIMIT`] is reported as a warning only.
    pub fn validate(&self) -> Result<RubricReport, GradingError> {
        let mut problems = Vec::new();
        let mut seen = HashSet::new();

        for criterion in &self.criteria {
            if criterion.id.trim().is_empty() {
                problems.push("criterion with empty id".to_string());
            } else if !seen.insert(criterion.id.as_str()) {
                problems.push(format!("duplicate criterion id: {}", criterion.id));
            }
            if let Some(w) = criterion.weight {
                if !w.is_finite() || w <= 0.0 || w > 1.0 {
                    problems.push(format!(
                        "weight {w} for '{}' is outside (0, 1]",
                        criterion.id
                    ));
                }
            }
            if criterion.scale.min >= criterion.scale.max {
                problems.push(format!(
                    "scale [{}, {}] for '{}' is empty",
                    criterion.scale.min, criterion.scale.max, criterion.id
                ));
            }
        }

        let weight_sum = self.weight_sum();
        let mut warnings = Vec::new();
        if let Some(deviation) = self.weight_deviation() {
            let message = format!("criterion weights sum to {weight_sum:.4}, expected 1.0");
            if deviation > WEIGHT_SUM_LIMIT {
                problems.push(message);
            } else {
                warnings.push(message);
            }
        }
        if self.criteria.is_empty() {
            warnings.push("rubric has no criteria".to_string());
        }

        if problems.is_empty() {
            Ok(RubricReport {
                weight_sum,
                warnings,
            })
        } else {
            Err(GradingError::Validation(problems.join("; ")))
        }
    }
}

/// Turn per-criterion raw scores into one grade out of `target_max`.
///
/// Only criteria present in `scores` contribute. Every score must name a
/// rubric criterion and lie within its scale. The weighted mean is read on a
/// scale topping out at `reference_scale_max` and rescaled to `target_max`.
pub fn aggregate(
    rubric: &Rubric,
    scores: &BTreeMap<String, f64>,
    reference_scale_max: f64,
    target_max: f64,
) -> Result<Aggregation, AggregationError> {
    check_positive("reference scale max", reference_scale_max)?;
    check_positive("target max", target_max)?;
    if rubric.criteria.is_empty() {
        return Err(AggregationError::EmptyRubric);
    }

    if let Some(unknown) = scores.keys().find(|id| rubric.criterion(id).is_none()) {
        return Err(AggregationError::UnknownCriterion {
            criterion: unknown.clone(),
        });
    }

    let criteria_count = rubric.criteria.len();
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;
    let mut scored_criteria = Vec::new();

    for criterion in &rubric.criteria {
        let Some(&score) = scores.get(&criterion.id) else {
            continue;
        };
        if !score.is_finite() || !criterion.scale.contains(score) {
            return Err(AggregationError::ScoreOutOfRange {
                criterion: criterion.id.clone(),
                score,
                min: criterion.scale.min,
                max: criterion.scale.max,
            });
        }
        let weight = criterion.effective_weight(criteria_count);
        if !weight.is_finite() || weight < 0.0 {
            return Err(AggregationError::InvalidWeight {
                criterion: criterion.id.clone(),
                weight,
            });
        }
        weighted_sum += score * weight;
        total_weight += weight;
        scored_criteria.push(criterion.id.clone());
    }

    if total_weight <= 0.0 {
        return Err(AggregationError::NoScoredCriteria);
    }

    let weight_deviation = rubric.weight_deviation();
    if let Some(deviation) = weight_deviation {
        tracing::warn!(
            deviation,
            "rubric weights do not sum to 1.0; grade uses the scored weights as the denominator"
        );
    }

    let normalized = weighted_sum / total_weight;
    let final_score = round2(normalized / reference_scale_max * target_max);

    Ok(Aggregation {
        weighted_sum,
        total_weight,
        normalized,
        final_score,
        scored_criteria,
        weight_deviation,
    })
}

fn check_positive(name: &'static str, value: f64) -> Result<(), AggregationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(AggregationError::InvalidScale { name, value })
    }
}

/// Round half away from zero to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
