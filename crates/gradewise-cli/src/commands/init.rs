//! The `gradewise init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    write_if_missing(Path::new("gradewise.toml"), SAMPLE_CONFIG)?;

    std::fs::create_dir_all("rubrics")?;
    write_if_missing(Path::new("rubrics/essay.toml"), EXAMPLE_RUBRIC)?;
    write_if_missing(Path::new("gradebook.json"), EXAMPLE_DATASET)?;

    println!("\nNext steps:");
    println!("  1. Edit gradewise.toml with your API keys");
    println!("  2. Run: gradewise validate --rubric rubrics/essay.toml");
    println!("  3. Run: gradewise grade --data gradebook.json --submission sub-1 --as teacher-1 --provider offline");

    Ok(())
}

fn write_if_missing(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        println!("{} already exists, skipping.", path.display());
    } else {
        std::fs::write(path, content)?;
        println!("Created {}", path.display());
    }
    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# gradewise configuration

default_provider = "openai"
default_model = "gpt-4o-mini"

[providers.openai]
type = "openai"
api_key = "${OPENAI_API_KEY}"

[providers.anthropic]
type = "anthropic"
api_key = "${ANTHROPIC_API_KEY}"

# Scores every criterion 4 without calling out; useful for dry runs.
[providers.offline]
type = "mock"
score = 4.0
rationale = "Offline placeholder score."

[grading]
concurrency = 4
criterion_timeout_secs = 30
max_retries = 1
retry_delay_ms = 500
reference_scale_max = 5.0
fallback_baseline = 3.5
lease_ttl_secs = 300
"#;

const EXAMPLE_RUBRIC: &str = r#"[rubric]
name = "Essay"
description = "Argumentative essay rubric"

[[criteria]]
id = "content"
title = "Content quality and argument"
weight = 0.5
scale = [0, 5]

[[criteria]]
id = "structure"
title = "Structure and organisation"
weight = 0.3
scale = [0, 5]

[[criteria]]
id = "language"
title = "Language and style"
weight = 0.2
scale = [0, 5]
"#;

const EXAMPLE_DATASET: &str = r#"{
  "assignments": [
    {
      "id": "essay-1",
      "teacher_id": "teacher-1",
      "title": "Persuasive essay",
      "description": "Argue for or against a four-day school week.",
      "max_score": 100.0,
      "ai_assist": true,
      "rubric": {
        "criteria": [
          { "id": "content", "title": "Content quality and argument", "weight": 0.5, "scale": [0, 5] },
          { "id": "structure", "title": "Structure and organisation", "weight": 0.3, "scale": [0, 5] },
          { "id": "language", "title": "Language and style", "weight": 0.2, "scale": [0, 5] }
        ]
      },
      "access_control": {
        "read": { "group_ids": ["class-7a"] },
        "write": { "user_ids": ["teacher-2"] }
      },
      "created_at": "2026-09-01T08:00:00Z",
      "updated_at": "2026-09-01T08:00:00Z"
    },
    {
      "id": "notice-1",
      "teacher_id": "teacher-1",
      "title": "Reading list",
      "created_at": "2026-08-25T08:00:00Z",
      "updated_at": "2026-08-25T08:00:00Z"
    }
  ],
  "submissions": [
    {
      "id": "sub-1",
      "assignment_id": "essay-1",
      "student_id": "student-1",
      "content": "A four-day week gives students time to rest and study independently...",
      "status": "submitted",
      "submitted_at": "2026-09-10T17:30:00Z",
      "max_score": 100.0,
      "created_at": "2026-09-09T12:00:00Z",
      "updated_at": "2026-09-10T17:30:00Z"
    }
  ],
  "groups": {
    "class-7a": ["student-1", "student-2"]
  }
}
"#;
