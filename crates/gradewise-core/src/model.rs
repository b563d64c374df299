//! Core data model types for gradewise.
//!
//! Assignments own a rubric and an access policy; submissions move through a
//! forward-only status machine and keep AI-produced results apart from the
//! teacher-authored grading fields.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GradingError;

// ---------------------------------------------------------------------------
// Access control
// ---------------------------------------------------------------------------

/// Permissions known to the access evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Write,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::Write => "write",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = GradingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "read" => Ok(Permission::Read),
            "write" => Ok(Permission::Write),
            other => Err(GradingError::Validation(format!(
                "unknown permission: {other}"
            ))),
        }
    }
}

/// Principals allowed to exercise one permission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    #[serde(default)]
    pub user_ids: BTreeSet<String>,
    #[serde(default)]
    pub group_ids: BTreeSet<String>,
}

/// Per-record permission → allow-set mapping.
///
/// Keys are kept as strings so that policies written by other tools survive a
/// round trip; names that are not a [`Permission`] are never consulted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessPolicy(pub BTreeMap<String, AccessGrant>);

impl AccessPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, permission: Permission) -> Option<&AccessGrant> {
        self.0.get(permission.as_str())
    }

    pub fn with_users<I, S>(mut self, permission: Permission, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let grant = self.0.entry(permission.as_str().to_string()).or_default();
        grant.user_ids.extend(users.into_iter().map(Into::into));
        self
    }

    pub fn with_groups<I, S>(mut self, permission: Permission, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let grant = self.0.entry(permission.as_str().to_string()).or_default();
        grant.group_ids.extend(groups.into_iter().map(Into::into));
        self
    }
}

/// Role of an authenticated principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl FromStr for Role {
    type Err = GradingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "admin" => Ok(Role::Admin),
            other => Err(GradingError::Validation(format!("unknown role: {other}"))),
        }
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub principal_id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(principal_id: impl Into<String>, role: Role) -> Self {
        Self {
            principal_id: principal_id.into(),
            role,
        }
    }

    pub fn student(principal_id: impl Into<String>) -> Self {
        Self::new(principal_id, Role::Student)
    }

    pub fn teacher(principal_id: impl Into<String>) -> Self {
        Self::new(principal_id, Role::Teacher)
    }

    pub fn admin(principal_id: impl Into<String>) -> Self {
        Self::new(principal_id, Role::Admin)
    }
}

// ---------------------------------------------------------------------------
// Rubrics
// ---------------------------------------------------------------------------

/// Inclusive integer scoring range of a criterion.
///
/// Serialized as `[min, max]`. A longer list of allowed points such as
/// `[0, 1, 2, 3, 4, 5]` is also accepted; its first and last entries are used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<i32>", into = "Vec<i32>")]
pub struct Scale {
    pub min: i32,
    pub max: i32,
}

impl Scale {
    pub fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, score: f64) -> bool {
        score >= f64::from(self.min) && score <= f64::from(self.max)
    }

    /// Clamp `score` into the scale. Never panics, even for a reversed
    /// scale built in code.
    pub fn clamp(&self, score: f64) -> f64 {
        let low = f64::from(self.min.min(self.max));
        let high = f64::from(self.min.max(self.max));
        score.max(low).min(high)
    }
}

impl Default for Scale {
    fn default() -> Self {
        Self { min: 0, max: 5 }
    }
}

impl TryFrom<Vec<i32>> for Scale {
    type Error = String;

    fn try_from(points: Vec<i32>) -> Result<Self, Self::Error> {
        match (points.first(), points.last()) {
            (Some(&min), Some(&max)) if points.len() >= 2 && min < max => Ok(Scale { min, max }),
            (Some(&min), Some(&max)) if points.len() >= 2 => Err(format!(
                "scale must rise from min to max, got [{min}, {max}]"
            )),
            _ => Err(format!(
                "scale needs at least two points, got {}",
                points.len()
            )),
        }
    }
}

impl From<Scale> for Vec<i32> {
    fn from(scale: Scale) -> Self {
        vec![scale.min, scale.max]
    }
}

/// One named, weighted scoring dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub id: String,
    pub title: String,
    /// Relative weight in (0, 1]. Absent means an equal share.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default)]
    pub scale: Scale,
}

impl Criterion {
    pub fn new(id: impl Into<String>, title: impl Into<String>, weight: Option<f64>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            weight,
            scale: Scale::default(),
        }
    }

    pub fn with_scale(mut self, min: i32, max: i32) -> Self {
        self.scale = Scale::new(min, max);
        self
    }
}

/// Ordered set of weighted criteria sharing a reference scale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rubric {
    #[serde(default)]
    pub criteria: Vec<Criterion>,
}

impl Rubric {
    pub fn new(criteria: Vec<Criterion>) -> Self {
        Self { criteria }
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn criterion(&self, id: &str) -> Option<&Criterion> {
        self.criteria.iter().find(|c| c.id == id)
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A record whose visibility is governed by an owner and an access policy.
pub trait Record: Clone + Send + Sync {
    fn id(&self) -> &str;
    fn owner_id(&self) -> &str;
    fn access_policy(&self) -> Option<&AccessPolicy>;
    fn updated_at(&self) -> DateTime<Utc>;

    fn sort_key(&self) -> SortKey {
        SortKey {
            updated_at: self.updated_at(),
            id: self.id().to_string(),
        }
    }
}

/// Position in the listing order: newest first, ties broken by id ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub updated_at: DateTime<Utc>,
    pub id: String,
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .updated_at
            .cmp(&self.updated_at)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// A piece of coursework defined by a teacher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: String,
    pub teacher_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default = "default_max_score")]
    pub max_score: f64,
    #[serde(default)]
    pub rubric: Option<Rubric>,
    /// Whether AI-assisted grading is enabled.
    #[serde(default)]
    pub ai_assist: bool,
    #[serde(default)]
    pub access_control: Option<AccessPolicy>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub fn default_max_score() -> f64 {
    100.0
}

impl Record for Assignment {
    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> &str {
        &self.teacher_id
    }

    fn access_policy(&self) -> Option<&AccessPolicy> {
        self.access_control.as_ref()
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// Lifecycle of a submission. Variants are declared in lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Draft,
    Submitted,
    AiReviewed,
    Graded,
    Released,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Draft => "draft",
            SubmissionStatus::Submitted => "submitted",
            SubmissionStatus::AiReviewed => "ai_reviewed",
            SubmissionStatus::Graded => "graded",
            SubmissionStatus::Released => "released",
        }
    }

    /// Transitions only move forward; `Released` must come from `Graded`.
    pub fn can_advance_to(self, next: SubmissionStatus) -> bool {
        match next {
            SubmissionStatus::Released => self == SubmissionStatus::Graded,
            _ => next > self,
        }
    }

    /// Whether the submission has been handed in (anything past draft).
    pub fn is_submitted(self) -> bool {
        self >= SubmissionStatus::Submitted
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Results written by AI-assisted grading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiReview {
    pub rubric_scores: BTreeMap<String, f64>,
    pub feedback_draft: String,
    pub score: f64,
    /// Criteria whose score came from the fallback strategy.
    #[serde(default)]
    pub fallback_criteria: Vec<String>,
    pub scorer: String,
    pub reviewed_at: DateTime<Utc>,
}

/// A student's answer to an assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    pub assignment_id: String,
    pub student_id: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub attachments: Vec<String>,
    pub status: SubmissionStatus,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,

    // Teacher-authored grading fields.
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub max_score: Option<f64>,
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub rubric_scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub grader_id: Option<String>,
    #[serde(default)]
    pub graded_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub ai_review: Option<AiReview>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Submissions are private to their student; graders are authorized through
/// the assignment instead.
static PRIVATE: AccessPolicy = AccessPolicy(BTreeMap::new());

impl Record for Submission {
    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> &str {
        &self.student_id
    }

    fn access_policy(&self) -> Option<&AccessPolicy> {
        Some(&PRIVATE)
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}
