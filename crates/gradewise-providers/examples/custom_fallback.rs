//! Custom fallback example: plug your own strategy into the orchestrator.
//!
//! The built-in fallback assigns a fixed baseline when a criterion cannot be
//! scored. This example scores failed criteria at the middle of their scale
//! instead and says why in the rationale. The scorer is a mock that rejects
//! one criterion, so no API key is needed.
//!
//! ```bash
//! cargo run -p gradewise-providers --example custom_fallback
//! ```

use std::sync::Arc;

use chrono::Utc;
use gradewise_core::fallback::FallbackStrategy;
use gradewise_core::model::{
    Actor, Assignment, Criterion, Rubric, Submission, SubmissionStatus,
};
use gradewise_core::orchestrator::{GradingConfig, GradingOrchestrator};
use gradewise_core::store::{MemoryStore, RecordStore};
use gradewise_core::traits::{CriterionScore, StaticGroups};
use gradewise_core::ScorerError;
use gradewise_providers::{MockResponse, MockScorer};

/// Scores an unscorable criterion at the midpoint of its scale.
struct MidpointFallback;

impl FallbackStrategy for MidpointFallback {
    fn fallback(&self, criterion: &Criterion, error: &ScorerError) -> CriterionScore {
        let midpoint = f64::from(criterion.scale.min + criterion.scale.max) / 2.0;
        CriterionScore::new(
            criterion.scale.clamp(midpoint),
            format!("Not scored automatically ({error}); midpoint assigned."),
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let now = Utc::now();
    let assignment = Assignment {
        id: "essay-1".into(),
        teacher_id: "teacher-1".into(),
        title: "Persuasive essay".into(),
        description: None,
        due_date: None,
        max_score: 100.0,
        rubric: Some(Rubric::new(vec![
            Criterion::new("content", "Content", Some(0.5)),
            Criterion::new("structure", "Structure", Some(0.3)),
            Criterion::new("language", "Language", Some(0.2)),
        ])),
        ai_assist: true,
        access_control: None,
        created_at: now,
        updated_at: now,
    };
    let submission = Submission {
        id: "sub-1".into(),
        assignment_id: assignment.id.clone(),
        student_id: "student-1".into(),
        content: Some("School uniforms limit self-expression because...".into()),
        attachments: vec![],
        status: SubmissionStatus::Submitted,
        submitted_at: Some(now),
        score: None,
        max_score: Some(assignment.max_score),
        grade: None,
        feedback: None,
        rubric_scores: Default::default(),
        grader_id: None,
        graded_at: None,
        ai_review: None,
        created_at: now,
        updated_at: now,
    };
    let store = Arc::new(MemoryStore::with_records(vec![assignment], vec![submission]).await?);

    // The scorer rejects one criterion outright; authentication errors are not retried.
    let scorer = MockScorer::with_fixed_score(4.0, "Solid work").respond(
        "structure",
        MockResponse::Fail(ScorerError::AuthenticationFailed("key revoked".into())),
    );

    let orchestrator = GradingOrchestrator::new(
        store.clone(),
        Arc::new(scorer),
        Arc::new(StaticGroups::default()),
        GradingConfig::default(),
    )
    .with_fallback(Arc::new(MidpointFallback));

    let outcome = orchestrator
        .grade(&Actor::teacher("teacher-1"), "sub-1")
        .await?
        .into_result()?;

    for criterion in &outcome.criteria {
        let marker = if criterion.used_fallback() { "*" } else { " " };
        println!(
            "{marker} {:<10} {:>4.1}  {}",
            criterion.criterion_id, criterion.score, criterion.rationale
        );
    }
    if let Some(aggregation) = &outcome.aggregation {
        // (4*0.5 + 2.5*0.3 + 4*0.2) / 5 * 100 = 71
        println!("\nAI score: {:.2} / 100", aggregation.final_score);
    }

    let stored = store.get_submission("sub-1").await?;
    println!("Submission state: {}", stored.status.as_str());
    Ok(())
}
