//! The `gradewise export` command.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use gradewise_core::export::write_csv;
use gradewise_core::model::Actor;

use super::LoadedDataset;

pub async fn execute(
    data: PathBuf,
    assignment_id: String,
    actor: Actor,
    format: String,
    output: Option<PathBuf>,
) -> Result<()> {
    if !matches!(format.as_str(), "csv" | "json") {
        bail!("unknown export format '{format}', expected csv or json");
    }

    let dataset = LoadedDataset::load(&data).await?;
    let rows = dataset
        .gradebook()
        .export_grades(&actor, &assignment_id)
        .await?;

    let mut out: Box<dyn Write> = match &output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    };
    if format == "json" {
        serde_json::to_writer_pretty(&mut out, &rows)?;
        writeln!(out)?;
        out.flush()?;
    } else {
        write_csv(&rows, &mut out)?;
    }

    if let Some(path) = &output {
        eprintln!(
            "Exported {} grades for {assignment_id} to {}",
            rows.len(),
            path.display()
        );
    }
    Ok(())
}
