//! The `gradewise list` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use gradewise_core::model::{Actor, Permission};

use super::LoadedDataset;

pub async fn execute(
    data: PathBuf,
    actor: Actor,
    permission: Permission,
    skip: usize,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let dataset = LoadedDataset::load(&data).await?;
    let assignments = dataset
        .gradebook()
        .list_assignments(&actor, permission, skip, limit)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&assignments)?);
        return Ok(());
    }

    if assignments.is_empty() {
        println!("No assignments visible to {}.", actor.principal_id);
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Title", "Teacher", "Max", "AI", "Updated"]);
    for assignment in &assignments {
        table.add_row(vec![
            Cell::new(&assignment.id),
            Cell::new(&assignment.title),
            Cell::new(&assignment.teacher_id),
            Cell::new(assignment.max_score),
            Cell::new(if assignment.ai_assist { "yes" } else { "no" }),
            Cell::new(assignment.updated_at.format("%Y-%m-%d %H:%M")),
        ]);
    }
    println!("{table}");
    Ok(())
}
