//! The `gradewise grade` command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use comfy_table::{Cell, Table};

use gradewise_core::model::Actor;
use gradewise_core::orchestrator::{GradingOrchestrator, GradingOutcome};
use gradewise_core::traits::CriterionScorer;
use gradewise_providers::config::{load_config_from, scorer_from_config};

use super::LoadedDataset;

pub async fn execute(
    data: PathBuf,
    submission_id: String,
    actor: Actor,
    provider: Option<String>,
    model: Option<String>,
    dry_run: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let scorer: Arc<dyn CriterionScorer> =
        Arc::from(scorer_from_config(&config, provider.as_deref(), model.as_deref())?);

    let dataset = LoadedDataset::load(&data).await?;
    let orchestrator = GradingOrchestrator::new(
        dataset.store.clone(),
        scorer.clone(),
        dataset.groups.clone(),
        config.grading.grading_config(),
    )
    .with_fallback(Arc::new(config.grading.fallback()));

    eprintln!("Grading {submission_id} with {}", scorer.name());
    let outcome = orchestrator.grade(&actor, &submission_id).await?;
    print_outcome(&outcome);

    let outcome = outcome.into_result()?;
    if let Some(aggregation) = &outcome.aggregation {
        let max = outcome
            .submission
            .as_ref()
            .and_then(|s| s.max_score)
            .unwrap_or(gradewise_core::model::default_max_score());
        println!("AI score: {:.2} / {max}", aggregation.final_score);
    }
    let fallbacks = outcome.fallback_criteria();
    if !fallbacks.is_empty() {
        eprintln!(
            "Warning: {} criteria used the fallback score: {}",
            fallbacks.len(),
            fallbacks.join(", ")
        );
    }

    if dry_run {
        eprintln!("Dry run: dataset not saved.");
    } else {
        dataset.save(&data).await?;
        eprintln!("Saved review to {}", data.display());
    }
    Ok(())
}

fn print_outcome(outcome: &GradingOutcome) {
    let mut table = Table::new();
    table.set_header(vec!["Criterion", "Score", "Attempts", "Rationale"]);
    for result in &outcome.criteria {
        let rationale = match &result.fallback_reason {
            Some(reason) => format!("fallback: {reason}"),
            None => result.rationale.clone(),
        };
        table.add_row(vec![
            Cell::new(&result.title),
            Cell::new(result.score),
            Cell::new(result.attempts),
            Cell::new(rationale),
        ]);
    }
    println!("{table}");
    println!("State: {}", outcome.state);
}
