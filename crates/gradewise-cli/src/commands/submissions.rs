//! The `gradewise submissions` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use gradewise_core::model::Actor;

use super::LoadedDataset;

pub async fn execute(
    data: PathBuf,
    actor: Actor,
    assignment_id: Option<String>,
    skip: usize,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let dataset = LoadedDataset::load(&data).await?;
    let gradebook = dataset.gradebook();
    let submissions = match &assignment_id {
        Some(id) => gradebook.list_submissions(&actor, id, skip, limit).await?,
        None => gradebook.list_own_submissions(&actor, skip, limit).await?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&submissions)?);
        return Ok(());
    }

    if submissions.is_empty() {
        println!("No submissions visible to {}.", actor.principal_id);
        return Ok(());
    }

    let fmt_score = |score: Option<f64>| score.map_or_else(|| "-".to_string(), |s| format!("{s}"));

    let mut table = Table::new();
    table.set_header(vec!["ID", "Assignment", "Student", "State", "Score", "AI", "Updated"]);
    for submission in &submissions {
        table.add_row(vec![
            Cell::new(&submission.id),
            Cell::new(&submission.assignment_id),
            Cell::new(&submission.student_id),
            Cell::new(submission.status.as_str()),
            Cell::new(fmt_score(submission.score)),
            Cell::new(fmt_score(submission.ai_review.as_ref().map(|r| r.score))),
            Cell::new(submission.updated_at.format("%Y-%m-%d %H:%M")),
        ]);
    }
    println!("{table}");
    Ok(())
}
