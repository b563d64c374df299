//! AI-assisted grading of one submission.
//!
//! Scores every rubric criterion concurrently through the external scorer,
//! substitutes a deterministic fallback for any criterion that cannot be
//! scored, aggregates once, and records the result on the submission. A
//! per-submission lease keeps two invocations from grading the same
//! submission at once.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::instrument;

use crate::access::is_grading_identity;
use crate::error::{GradingError, ScorerError};
use crate::events::{ChangeEvent, EntityType, EventNotifier, TracingNotifier};
use crate::fallback::{BaselineFallback, FallbackStrategy};
use crate::lease::{LeaseRegistry, DEFAULT_LEASE_TTL};
use crate::model::{Actor, AiReview, Criterion, Rubric, Submission};
use crate::rubric::{aggregate, Aggregation, DEFAULT_REFERENCE_SCALE_MAX};
use crate::store::RecordStore;
use crate::traits::{CriterionScore, CriterionScorer, GroupResolver, ScoreRequest};
use crate::update::SubmissionUpdate;

/// Upper bound on the delay between retries.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Configuration for the grading orchestrator.
#[derive(Debug, Clone)]
pub struct GradingConfig {
    /// Maximum concurrent scorer calls per submission.
    pub concurrency: usize,
    /// Time allowed for a single scorer call.
    pub criterion_timeout: Duration,
    /// Retries on transient scorer errors.
    pub max_retries: u32,
    /// Delay before the first retry; doubles after each.
    pub retry_delay: Duration,
    /// Top of the scale the weighted mean is read against.
    pub reference_scale_max: f64,
    /// How long a lease may be held before it can be taken over.
    pub lease_ttl: Duration,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            criterion_timeout: Duration::from_secs(30),
            max_retries: 1,
            retry_delay: Duration::from_millis(500),
            reference_scale_max: DEFAULT_REFERENCE_SCALE_MAX,
            lease_ttl: DEFAULT_LEASE_TTL,
        }
    }
}

/// Lifecycle of one grading invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationState {
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InvocationState::NotStarted => "not_started",
            InvocationState::InProgress => "in_progress",
            InvocationState::Completed => "completed",
            InvocationState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Result for one criterion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriterionResult {
    pub criterion_id: String,
    pub title: String,
    pub score: f64,
    pub rationale: String,
    /// Scorer calls made, including retries.
    pub attempts: u32,
    /// Set when the score came from the fallback strategy.
    pub fallback_reason: Option<String>,
}

impl CriterionResult {
    pub fn used_fallback(&self) -> bool {
        self.fallback_reason.is_some()
    }
}

/// Everything a grading invocation produced.
#[derive(Debug)]
pub struct GradingOutcome {
    pub submission_id: String,
    pub state: InvocationState,
    /// Per-criterion results in rubric order.
    pub criteria: Vec<CriterionResult>,
    pub aggregation: Option<Aggregation>,
    pub feedback_draft: String,
    /// The stored submission after the review was recorded.
    pub submission: Option<Submission>,
    /// Why the invocation failed.
    pub error: Option<GradingError>,
}

impl GradingOutcome {
    pub fn is_completed(&self) -> bool {
        self.state == InvocationState::Completed
    }

    /// Ids of criteria scored by the fallback strategy.
    pub fn fallback_criteria(&self) -> Vec<String> {
        self.criteria
            .iter()
            .filter(|c| c.used_fallback())
            .map(|c| c.criterion_id.clone())
            .collect()
    }

    /// Surface a failed invocation as its error.
    pub fn into_result(self) -> Result<GradingOutcome, GradingError> {
        match self.error {
            Some(e) if self.state == InvocationState::Failed => Err(e),
            _ => Ok(self),
        }
    }

    fn failed(submission_id: &str, criteria: Vec<CriterionResult>, error: GradingError) -> Self {
        let feedback_draft = feedback_draft(&criteria);
        Self {
            submission_id: submission_id.to_string(),
            state: InvocationState::Failed,
            criteria,
            aggregation: None,
            feedback_draft,
            submission: None,
            error: Some(error),
        }
    }
}

/// Grades submissions against their assignment's rubric.
pub struct GradingOrchestrator {
    store: Arc<dyn RecordStore>,
    scorer: Arc<dyn CriterionScorer>,
    groups: Arc<dyn GroupResolver>,
    fallback: Arc<dyn FallbackStrategy>,
    notifier: Arc<dyn EventNotifier>,
    leases: LeaseRegistry,
    config: GradingConfig,
}

impl GradingOrchestrator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        scorer: Arc<dyn CriterionScorer>,
        groups: Arc<dyn GroupResolver>,
        config: GradingConfig,
    ) -> Self {
        Self {
            store,
            scorer,
            groups,
            fallback: Arc::new(BaselineFallback::default()),
            notifier: Arc::new(TracingNotifier),
            leases: LeaseRegistry::new(config.lease_ttl),
            config,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackStrategy>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn EventNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Share a lease registry with other orchestrators in the process.
    pub fn with_leases(mut self, leases: LeaseRegistry) -> Self {
        self.leases = leases;
        self
    }

    pub fn leases(&self) -> &LeaseRegistry {
        &self.leases
    }

    pub fn config(&self) -> &GradingConfig {
        &self.config
    }

    /// Grade one submission on behalf of `actor`.
    ///
    /// Precondition failures (missing records, permission, assignment not
    /// set up for AI grading, malformed rubric, lease held) are returned as errors before any
    /// scorer call. Once the lease is held, the invocation always returns an
    /// outcome; a failed one carries its error and persists nothing.
    #[instrument(skip(self, actor), fields(principal = %actor.principal_id, scorer = self.scorer.name()))]
    pub async fn grade(
        &self,
        actor: &Actor,
        submission_id: &str,
    ) -> Result<GradingOutcome, GradingError> {
        let submission = self.store.get_submission(submission_id).await?;
        let assignment = self.store.get_assignment(&submission.assignment_id).await?;
        let groups = self.groups.groups_of(&actor.principal_id).await?;

        if !is_grading_identity(actor, &assignment, &groups) {
            return Err(GradingError::PermissionDenied(format!(
                "{} may not grade submissions to assignment {}",
                actor.principal_id, assignment.id
            )));
        }
        if !assignment.ai_assist {
            return Err(GradingError::Validation(format!(
                "AI grading is not enabled for assignment {}",
                assignment.id
            )));
        }
        let Some(rubric) = assignment.rubric.as_ref() else {
            return Err(GradingError::Validation(format!(
                "assignment {} has no rubric",
                assignment.id
            )));
        };
        rubric.validate()?;

        let _lease = self.leases.try_acquire(submission_id)?;
        tracing::info!(state = %InvocationState::InProgress, criteria = rubric.criteria.len(), "grading started");

        let content = submission.content.clone().unwrap_or_default();
        let criteria = self
            .score_criteria(rubric, &assignment.title, &content)
            .await;

        let scores: BTreeMap<String, f64> = criteria
            .iter()
            .map(|c| (c.criterion_id.clone(), c.score))
            .collect();
        let aggregation = match aggregate(
            rubric,
            &scores,
            self.config.reference_scale_max,
            assignment.max_score,
        ) {
            Ok(aggregation) => aggregation,
            Err(e) => {
                tracing::error!(state = %InvocationState::Failed, error = %e, "aggregation failed");
                return Ok(GradingOutcome::failed(submission_id, criteria, e.into()));
            }
        };

        let feedback_draft = feedback_draft(&criteria);
        let review = AiReview {
            rubric_scores: scores,
            feedback_draft: feedback_draft.clone(),
            score: aggregation.final_score,
            fallback_criteria: criteria
                .iter()
                .filter(|c| c.used_fallback())
                .map(|c| c.criterion_id.clone())
                .collect(),
            scorer: self.scorer.name().to_string(),
            reviewed_at: Utc::now(),
        };

        let updated = match self
            .store
            .update_submission(submission_id, SubmissionUpdate::RecordAiReview(review))
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                tracing::error!(state = %InvocationState::Failed, error = %e, "failed to record AI review");
                return Ok(GradingOutcome::failed(submission_id, criteria, e));
            }
        };

        self.notifier.notify(ChangeEvent::new(
            EntityType::Submission,
            submission_id,
            updated.status.as_str(),
        ));

        tracing::info!(
            state = %InvocationState::Completed,
            score = aggregation.final_score,
            fallbacks = review_fallbacks(&criteria),
            "grading completed"
        );

        Ok(GradingOutcome {
            submission_id: submission_id.to_string(),
            state: InvocationState::Completed,
            criteria,
            aggregation: Some(aggregation),
            feedback_draft,
            submission: Some(updated),
            error: None,
        })
    }

    /// Score every criterion with bounded concurrency, returning results in
    /// rubric order.
    async fn score_criteria(
        &self,
        rubric: &Rubric,
        assignment_title: &str,
        content: &str,
    ) -> Vec<CriterionResult> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut futures = FuturesUnordered::new();

        for (index, criterion) in rubric.criteria.iter().enumerate() {
            let scorer = Arc::clone(&self.scorer);
            let semaphore = Arc::clone(&semaphore);
            let config = self.config.clone();
            let request = ScoreRequest {
                content: content.to_string(),
                assignment_title: assignment_title.to_string(),
                criterion: criterion.clone(),
            };

            futures.push(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => score_with_retries(scorer.as_ref(), &request, &config).await,
                    Err(_) => (
                        Err(ScorerError::NetworkError("scorer pool closed".into())),
                        0,
                    ),
                };
                (index, request.criterion, outcome)
            });
        }

        let mut results: Vec<Option<CriterionResult>> = vec![None; rubric.criteria.len()];
        while let Some((index, criterion, (result, attempts))) = futures.next().await {
            results[index] = Some(self.resolve(&criterion, result, attempts));
        }
        results.into_iter().flatten().collect()
    }

    fn resolve(
        &self,
        criterion: &Criterion,
        result: Result<CriterionScore, ScorerError>,
        attempts: u32,
    ) -> CriterionResult {
        let (score, fallback_reason) = match result {
            Ok(score) => (score, None),
            Err(e) => {
                tracing::warn!(
                    criterion = %criterion.id,
                    attempts,
                    error = %e,
                    "criterion scoring failed, using fallback"
                );
                (self.fallback.fallback(criterion, &e), Some(e.to_string()))
            }
        };
        CriterionResult {
            criterion_id: criterion.id.clone(),
            title: criterion.title.clone(),
            score: score.score,
            rationale: score.rationale,
            attempts,
            fallback_reason,
        }
    }
}

/// Call the scorer, retrying transient errors with exponential backoff.
/// Returns the final result and the number of calls made.
async fn score_with_retries(
    scorer: &dyn CriterionScorer,
    request: &ScoreRequest,
    config: &GradingConfig,
) -> (Result<CriterionScore, ScorerError>, u32) {
    let mut retry_delay = config.retry_delay.min(MAX_RETRY_DELAY);
    let mut attempts = 0;
    loop {
        attempts += 1;
        let result = match tokio::time::timeout(config.criterion_timeout, scorer.score(request))
            .await
        {
            Ok(Ok(score)) => score.check(&request.criterion).map(|()| score),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ScorerError::Timeout(
                config.criterion_timeout.as_millis() as u64
            )),
        };

        match result {
            Ok(score) => return (Ok(score), attempts),
            Err(e) if e.is_permanent() || attempts > config.max_retries => {
                return (Err(e), attempts)
            }
            Err(e) => {
                // Use the provider's retry-after hint if available
                let wait = e
                    .retry_after_ms()
                    .map(Duration::from_millis)
                    .unwrap_or(retry_delay);
                tracing::debug!(
                    criterion = %request.criterion.id,
                    attempt = attempts,
                    wait_ms = wait.as_millis() as u64,
                    error = %e,
                    "retrying criterion"
                );
                tokio::time::sleep(wait).await;
                retry_delay = next_retry_delay(retry_delay);
            }
        }
    }
}

/// Double `delay`, capped at [`MAX_RETRY_DELAY`].
fn next_retry_delay(delay: Duration) -> Duration {
    delay.saturating_mul(2).min(MAX_RETRY_DELAY)
}

/// One `[title] rationale` line per criterion.
pub fn feedback_draft(criteria: &[CriterionResult]) -> String {
    criteria
        .iter()
        .map(|c| format!("[{}] {}", c.title, c.rationale))
        .collect::<Vec<_>>()
        .join("\n")
}

fn review_fallbacks(criteria: &[CriterionResult]) -> usize {
    criteria.iter().filter(|c| c.used_fallback()).count()
}
