//! The `gradewise aggregate` command.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use gradewise_core::parser;
use gradewise_core::rubric::aggregate;
use gradewise_providers::config::load_config_from;

pub fn execute(
    rubric_path: PathBuf,
    raw_scores: Vec<String>,
    max_score: f64,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let file = parser::parse_rubric(&rubric_path)?;
    let scores = parse_scores(&raw_scores)?;

    let report = file.rubric.validate()?;
    for warning in &report.warnings {
        eprintln!("Warning: {warning}");
    }

    let aggregation = aggregate(
        &file.rubric,
        &scores,
        config.grading.reference_scale_max,
        max_score,
    )?;

    let criteria_count = file.rubric.criteria.len();
    let mut table = Table::new();
    table.set_header(vec!["Criterion", "Weight", "Scale", "Score"]);
    for criterion in &file.rubric.criteria {
        let score = scores
            .get(&criterion.id)
            .map(|s| format!("{s}"))
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(&criterion.title),
            Cell::new(format!("{:.2}", criterion.effective_weight(criteria_count))),
            Cell::new(format!("{}-{}", criterion.scale.min, criterion.scale.max)),
            Cell::new(score),
        ]);
    }
    println!("{table}");
    println!(
        "Final score: {:.2} / {max_score} (weighted mean {:.2} of {})",
        aggregation.final_score, aggregation.normalized, config.grading.reference_scale_max
    );

    Ok(())
}

/// Parse `id=score` pairs.
fn parse_scores(raw: &[String]) -> Result<BTreeMap<String, f64>> {
    let mut scores = BTreeMap::new();
    for pair in raw {
        let (id, value) = pair
            .split_once('=')
            .with_context(|| format!("expected ID=SCORE, got '{pair}'"))?;
        let value: f64 = value
            .trim()
            .parse()
            .with_context(|| format!("invalid score for '{}': '{}'", id.trim(), value.trim()))?;
        if scores.insert(id.trim().to_string(), value).is_some() {
            anyhow::bail!("criterion '{}' scored twice", id.trim());
        }
    }
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pairs() {
        let scores = parse_scores(&["a=4".into(), " b = 2.5".into()]).unwrap();
        assert_eq!(scores["a"], 4.0);
        assert_eq!(scores["b"], 2.5);
    }

    #[test]
    fn rejects_bad_pairs() {
        assert!(parse_scores(&["a4".into()]).is_err());
        assert!(parse_scores(&["a=four".into()]).is_err());
        assert!(parse_scores(&["a=1".into(), "a=2".into()]).is_err());
    }
}
