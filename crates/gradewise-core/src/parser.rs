//! Rubric and dataset file loading.
//!
//! Rubrics are authored as TOML files; datasets (assignments, submissions
//! and group membership) are stored as JSON.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::{Assignment, Rubric, Submission};
use crate::rubric::DEFAULT_REFERENCE_SCALE_MAX;
use crate::store::MemoryStore;
use crate::traits::StaticGroups;

/// A named rubric loaded from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct RubricFile {
    pub name: String,
    pub description: String,
    pub rubric: Rubric,
}

/// Intermediate TOML structure for rubric files.
#[derive(Debug, Deserialize)]
struct TomlRubricFile {
    #[serde(default)]
    rubric: TomlRubricHeader,
    #[serde(default)]
    criteria: Vec<crate::model::Criterion>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlRubricHeader {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: String,
}

/// Parse a single rubric TOML file.
pub fn parse_rubric(path: &Path) -> Result<RubricFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read rubric file: {}", path.display()))?;

    parse_rubric_str(&content, path)
}

/// Parse rubric TOML from a string. The file stem names unnamed rubrics.
pub fn parse_rubric_str(content: &str, source_path: &Path) -> Result<RubricFile> {
    let parsed: TomlRubricFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let name = parsed.rubric.name.unwrap_or_else(|| {
        source_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "rubric".to_string())
    });

    Ok(RubricFile {
        name,
        description: parsed.rubric.description,
        rubric: Rubric::new(parsed.criteria),
    })
}

/// Recursively load all `.toml` rubric files from a directory.
pub fn load_rubric_directory(dir: &Path) -> Result<Vec<RubricFile>> {
    let mut rubrics = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            rubrics.extend(load_rubric_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_rubric(&path) {
                Ok(rubric) => rubrics.push(rubric),
                Err(e) => {
                    tracing::warn!("skipping {}: {}", path.display(), e);
                }
            }
        }
    }

    rubrics.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(rubrics)
}

/// A non-fatal issue found in a rubric.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The criterion ID (if applicable).
    pub criterion_id: Option<String>,
    /// Warning message.
    pub message: String,
}

/// Style checks on top of [`Rubric::validate`].
pub fn lint_rubric(rubric: &Rubric) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    // Mixing explicit and implicit weights rarely sums to 1.0
    let weighted = rubric.criteria.iter().filter(|c| c.weight.is_some()).count();
    if weighted > 0 && weighted < rubric.criteria.len() {
        for criterion in rubric.criteria.iter().filter(|c| c.weight.is_none()) {
            warnings.push(ValidationWarning {
                criterion_id: Some(criterion.id.clone()),
                message: format!(
                    "no weight given; defaults to 1/{} while other criteria are weighted",
                    rubric.criteria.len()
                ),
            });
        }
    }

    for criterion in &rubric.criteria {
        if criterion.title.trim().is_empty() {
            warnings.push(ValidationWarning {
                criterion_id: Some(criterion.id.clone()),
                message: "title is empty".into(),
            });
        }
    }

    // Scores above the reference scale push grades past the maximum
    for criterion in &rubric.criteria {
        if f64::from(criterion.scale.max) > DEFAULT_REFERENCE_SCALE_MAX {
            warnings.push(ValidationWarning {
                criterion_id: Some(criterion.id.clone()),
                message: format!(
                    "scale tops out at {} but grades are read against {}",
                    criterion.scale.max, DEFAULT_REFERENCE_SCALE_MAX
                ),
            });
        }
    }

    warnings
}

/// Records and group membership persisted between CLI runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub assignments: Vec<Assignment>,
    #[serde(default)]
    pub submissions: Vec<Submission>,
    /// Group id -> member principal ids.
    #[serde(default)]
    pub groups: HashMap<String, Vec<String>>,
}

impl Dataset {
    /// Load a dataset from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read dataset: {}", path.display()))?;
        let dataset: Dataset = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse dataset: {}", path.display()))?;
        dataset.check()?;
        Ok(dataset)
    }

    /// Write the dataset as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize dataset")?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write dataset: {}", path.display()))
    }

    /// Reject submissions pointing at unknown assignments.
    fn check(&self) -> Result<()> {
        let known: HashSet<&str> = self.assignments.iter().map(|a| a.id.as_str()).collect();
        if let Some(orphan) = self
            .submissions
            .iter()
            .find(|s| !known.contains(s.assignment_id.as_str()))
        {
            anyhow::bail!(
                "submission {} refers to unknown assignment {}",
                orphan.id,
                orphan.assignment_id
            );
        }
        Ok(())
    }

    pub fn group_resolver(&self) -> StaticGroups {
        StaticGroups::new(self.groups.clone())
    }

    /// Build an in-memory store holding the dataset's records.
    pub async fn into_store(self) -> Result<(MemoryStore, StaticGroups)> {
        let groups = self.group_resolver();
        let store = MemoryStore::with_records(self.assignments, self.submissions)
            .await
            .context("dataset contains duplicate ids")?;
        Ok((store, groups))
    }

    /// Capture a store's records together with `groups`.
    pub async fn from_store(store: &MemoryStore, groups: HashMap<String, Vec<String>>) -> Self {
        let (assignments, submissions) = store.snapshot().await;
        Self {
            assignments,
            submissions,
            groups,
        }
    }
}
