//! Trait definitions for the external scoring capability and group
//! membership resolution.
//!
//! Scorers are implemented by the `gradewise-providers` crate.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{GradingError, ScorerError};
use crate::model::Criterion;

// ---------------------------------------------------------------------------
// Criterion scorer trait
// ---------------------------------------------------------------------------

/// An external, unreliable capability that scores one criterion at a time.
#[async_trait]
pub trait CriterionScorer: Send + Sync {
    /// Human-readable scorer name (e.g. "openai/gpt-4o-mini").
    fn name(&self) -> &str;

    /// Score `request.content` against `request.criterion`.
    async fn score(&self, request: &ScoreRequest) -> Result<CriterionScore, ScorerError>;
}

/// Input to a single criterion scoring call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRequest {
    /// The student's answer.
    pub content: String,
    /// Title of the assignment the answer belongs to.
    pub assignment_title: String,
    /// The criterion to score against.
    pub criterion: Criterion,
}

/// A score and the reasoning behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub score: f64,
    #[serde(alias = "reason")]
    pub rationale: String,
}

impl CriterionScore {
    pub fn new(score: f64, rationale: impl Into<String>) -> Self {
        Self {
            score,
            rationale: rationale.into(),
        }
    }

    /// Check that the score is usable for `criterion`.
    pub fn check(&self, criterion: &Criterion) -> Result<(), ScorerError> {
        if !self.score.is_finite() || !criterion.scale.contains(self.score) {
            return Err(ScorerError::Malformed(format!(
                "score {} for '{}' is outside [{}, {}]",
                self.score, criterion.id, criterion.scale.min, criterion.scale.max
            )));
        }
        if self.rationale.trim().is_empty() {
            return Err(ScorerError::Malformed(format!(
                "empty rationale for '{}'",
                criterion.id
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Group membership
// ---------------------------------------------------------------------------

/// Resolves the groups a principal belongs to.
#[async_trait]
pub trait GroupResolver: Send + Sync {
    async fn groups_of(&self, principal_id: &str) -> Result<HashSet<String>, GradingError>;
}

/// Fixed group → members table.
#[derive(Debug, Clone, Default)]
pub struct StaticGroups {
    members: HashMap<String, HashSet<String>>,
}

impl StaticGroups {
    pub fn new(members: HashMap<String, Vec<String>>) -> Self {
        Self {
            members: members
                .into_iter()
                .map(|(group, users)| (group, users.into_iter().collect()))
                .collect(),
        }
    }

    pub fn with_member(mut self, group: &str, principal_id: &str) -> Self {
        self.members
            .entry(group.to_string())
            .or_default()
            .insert(principal_id.to_string());
        self
    }
}

#[async_trait]
impl GroupResolver for StaticGroups {
    async fn groups_of(&self, principal_id: &str) -> Result<HashSet<String>, GradingError> {
        Ok(self
            .members
            .iter()
            .filter(|(_, users)| users.contains(principal_id))
            .map(|(group, _)| group.clone())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Scorer output parsing
// ---------------------------------------------------------------------------

/// Strip markdown code fences from a model response, returning the payload.
///
/// Handles ```json fences, bare ``` fences, unclosed fences and raw text.
pub fn extract_json_payload(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after_fence = &trimmed[start + 3..];
    // Skip the info string (e.g. "json") up to the end of the line.
    let body = match after_fence.find('\n') {
        Some(nl) => &after_fence[nl + 1..],
        None => after_fence.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

/// Parse a scorer response of the form `{"score": n, "reason": "..."}`.
pub fn parse_criterion_score(response: &str) -> Result<CriterionScore, ScorerError> {
    let payload = extract_json_payload(response);
    serde_json::from_str::<CriterionScore>(payload)
        .map_err(|e| ScorerError::Malformed(format!("{e}: {}", truncate(payload, 120))))
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{head}…")
    }
}
