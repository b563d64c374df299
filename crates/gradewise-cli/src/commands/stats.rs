//! The `gradewise stats` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use gradewise_core::model::Actor;

use super::LoadedDataset;

pub async fn execute(data: PathBuf, assignment_id: String, actor: Actor) -> Result<()> {
    let dataset = LoadedDataset::load(&data).await?;
    let stats = dataset
        .gradebook()
        .statistics(&actor, &assignment_id)
        .await?;

    let fmt_score = |score: Option<f64>| score.map_or_else(|| "-".to_string(), |s| format!("{s}"));

    let mut table = Table::new();
    table.set_header(vec!["Metric", "Value"]);
    table.add_row(vec![Cell::new("Submissions"), Cell::new(stats.total_submissions)]);
    table.add_row(vec![Cell::new("Submitted"), Cell::new(stats.submitted_count)]);
    table.add_row(vec![Cell::new("Graded"), Cell::new(stats.graded_count)]);
    table.add_row(vec![Cell::new("Average"), Cell::new(fmt_score(stats.avg_score))]);
    table.add_row(vec![Cell::new("Highest"), Cell::new(fmt_score(stats.max_score))]);
    table.add_row(vec![Cell::new("Lowest"), Cell::new(fmt_score(stats.min_score))]);
    println!("Assignment: {assignment_id}");
    println!("{table}");

    let distribution: Vec<String> = stats
        .grade_distribution
        .iter()
        .map(|(letter, count)| format!("{letter}: {count}"))
        .collect();
    println!("Grades: {}", distribution.join("  "));
    Ok(())
}
