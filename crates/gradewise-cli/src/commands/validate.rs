//! The `gradewise validate` command.

use std::path::PathBuf;

use anyhow::Result;

use gradewise_core::parser;

pub fn execute(rubric_path: PathBuf) -> Result<()> {
    let rubrics = if rubric_path.is_dir() {
        parser::load_rubric_directory(&rubric_path)?
    } else {
        vec![parser::parse_rubric(&rubric_path)?]
    };

    let mut total_warnings = 0;
    let mut invalid = 0;

    for file in &rubrics {
        println!(
            "Rubric: {} ({} criteria)",
            file.name,
            file.rubric.criteria.len()
        );

        match file.rubric.validate() {
            Ok(report) => {
                for warning in &report.warnings {
                    println!("   WARNING: {warning}");
                }
                total_warnings += report.warnings.len();
            }
            Err(e) => {
                println!("   ERROR: {e}");
                invalid += 1;
            }
        }

        let warnings = parser::lint_rubric(&file.rubric);
        for w in &warnings {
            let prefix = w
                .criterion_id
                .as_ref()
                .map(|id| format!("  [{id}]"))
                .unwrap_or_else(|| "  ".to_string());
            println!("{prefix} WARNING: {}", w.message);
        }
        total_warnings += warnings.len();
    }

    if invalid > 0 {
        anyhow::bail!("{invalid} invalid rubric(s)");
    }
    if total_warnings == 0 {
        println!("All rubrics valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
