//! CLI integration tests using assert_cmd.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn gradewise() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("gradewise").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("GRADEWISE_OPENAI_KEY")
        .env_remove("GRADEWISE_ANTHROPIC_KEY");
    cmd
}

/// A temp directory populated by `gradewise init`.
fn initialized() -> TempDir {
    let dir = TempDir::new().unwrap();
    gradewise()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();
    dir
}

fn read_dataset(dir: &Path) -> serde_json::Value {
    let content = std::fs::read_to_string(dir.join("gradebook.json")).unwrap();
    serde_json::from_str(&content).unwrap()
}

#[test]
fn init_creates_files() {
    let dir = TempDir::new().unwrap();

    gradewise()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created gradewise.toml"))
        .stdout(predicate::str::contains("Created rubrics/essay.toml"))
        .stdout(predicate::str::contains("Created gradebook.json"));

    assert!(dir.path().join("gradewise.toml").exists());
    assert!(dir.path().join("rubrics/essay.toml").exists());
    assert!(dir.path().join("gradebook.json").exists());
}

#[test]
fn init_skips_existing() {
    let dir = initialized();

    gradewise()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn validate_generated_rubric() {
    let dir = initialized();

    gradewise()
        .current_dir(dir.path())
        .args(["validate", "--rubric", "rubrics"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Essay (3 criteria)"))
        .stdout(predicate::str::contains("All rubrics valid"));
}

#[test]
fn validate_rejects_bad_weights() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("lopsided.toml"),
        r#"
[[criteria]]
id = "a"
title = "A"
weight = 0.5

[[criteria]]
id = "b"
title = "B"
weight = 0.3
"#,
    )
    .unwrap();

    gradewise()
        .current_dir(dir.path())
        .args(["validate", "--rubric", "lopsided.toml"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("ERROR"))
        .stderr(predicate::str::contains("1 invalid rubric"));
}

#[test]
fn validate_nonexistent_file() {
    gradewise()
        .args(["validate", "--rubric", "nonexistent.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn aggregate_scores() {
    let dir = initialized();

    gradewise()
        .current_dir(dir.path())
        .args([
            "aggregate",
            "--rubric",
            "rubrics/essay.toml",
            "--score",
            "content=4",
            "--score",
            "structure=3",
            "--score",
            "language=5",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Final score: 78.00 / 100"));
}

#[test]
fn aggregate_rejects_out_of_scale_score() {
    let dir = initialized();

    gradewise()
        .current_dir(dir.path())
        .args([
            "aggregate",
            "--rubric",
            "rubrics/essay.toml",
            "--score",
            "content=9",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("content"));
}

#[test]
fn list_filters_by_group_membership() {
    let dir = initialized();

    gradewise()
        .current_dir(dir.path())
        .args([
            "list", "--data", "gradebook.json", "--as", "student-1", "--role", "student",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("essay-1"))
        .stdout(predicate::str::contains("notice-1"));

    gradewise()
        .current_dir(dir.path())
        .args([
            "list", "--data", "gradebook.json", "--as", "student-9", "--role", "student",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("notice-1"))
        .stdout(predicate::str::contains("essay-1").not());
}

fn listed_ids(dir: &Path, principal: &str, role: &str) -> Vec<String> {
    let output = gradewise()
        .current_dir(dir)
        .args([
            "list",
            "--data",
            "gradebook.json",
            "--as",
            principal,
            "--role",
            role,
            "--permission",
            "write",
            "--json",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let listed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    listed
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["id"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn list_write_permission_json() {
    let dir = initialized();

    // notice-1 has no policy and is open to everyone.
    assert_eq!(
        listed_ids(dir.path(), "teacher-2", "teacher"),
        vec!["essay-1", "notice-1"]
    );
    assert_eq!(listed_ids(dir.path(), "student-1", "student"), vec!["notice-1"]);
}

#[test]
fn list_rejects_unknown_permission() {
    let dir = initialized();

    gradewise()
        .current_dir(dir.path())
        .args([
            "list", "--data", "gradebook.json", "--as", "teacher-1", "--permission", "admin",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown permission"));
}

#[test]
fn grade_with_offline_scorer_saves_review() {
    let dir = initialized();

    gradewise()
        .current_dir(dir.path())
        .args([
            "grade",
            "--data",
            "gradebook.json",
            "--submission",
            "sub-1",
            "--as",
            "teacher-1",
            "--provider",
            "offline",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("AI score: 80.00 / 100"))
        .stdout(predicate::str::contains("State: completed"));

    let dataset = read_dataset(dir.path());
    let submission = &dataset["submissions"][0];
    assert_eq!(submission["status"], "ai_reviewed");
    assert_eq!(submission["ai_review"]["score"], 80.0);
    assert_eq!(submission["ai_review"]["scorer"], "mock");
    // Teacher-authored fields stay untouched.
    assert!(submission["score"].is_null());
}

#[test]
fn grade_dry_run_leaves_dataset_alone() {
    let dir = initialized();
    let before = read_dataset(dir.path());

    gradewise()
        .current_dir(dir.path())
        .args([
            "grade",
            "--data",
            "gradebook.json",
            "--submission",
            "sub-1",
            "--as",
            "teacher-1",
            "--provider",
            "offline",
            "--dry-run",
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("Dry run"));

    assert_eq!(read_dataset(dir.path()), before);
}

#[test]
fn grade_denied_for_students() {
    let dir = initialized();

    gradewise()
        .current_dir(dir.path())
        .args([
            "grade",
            "--data",
            "gradebook.json",
            "--submission",
            "sub-1",
            "--as",
            "student-1",
            "--role",
            "student",
            "--provider",
            "offline",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("permission denied"));
}

#[test]
fn grade_requires_configured_provider() {
    let dir = initialized();

    gradewise()
        .current_dir(dir.path())
        .args([
            "grade",
            "--data",
            "gradebook.json",
            "--submission",
            "sub-1",
            "--as",
            "teacher-1",
            "--provider",
            "missing",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("provider 'missing' is not configured"));
}

#[test]
fn stats_for_owner() {
    let dir = initialized();

    gradewise()
        .current_dir(dir.path())
        .args([
            "stats",
            "--data",
            "gradebook.json",
            "--assignment",
            "essay-1",
            "--as",
            "teacher-1",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Assignment: essay-1"))
        .stdout(predicate::str::contains("A: 0"));

    gradewise()
        .current_dir(dir.path())
        .args([
            "stats",
            "--data",
            "gradebook.json",
            "--assignment",
            "essay-1",
            "--as",
            "student-1",
            "--role",
            "student",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("permission denied"));
}

#[test]
fn submissions_by_role() {
    let dir = initialized();

    // teacher-2 grades essay-1 through a write grant.
    let output = gradewise()
        .current_dir(dir.path())
        .args([
            "submissions", "--data", "gradebook.json", "--assignment", "essay-1", "--as",
            "teacher-2", "--json",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let listed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["id"], "sub-1");

    // A classmate can read the assignment but not other students' work.
    gradewise()
        .current_dir(dir.path())
        .args([
            "submissions", "--data", "gradebook.json", "--assignment", "essay-1", "--as",
            "student-2", "--role", "student",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("No submissions visible to student-2"));

    gradewise()
        .current_dir(dir.path())
        .args([
            "submissions", "--data", "gradebook.json", "--as", "student-1", "--role", "student",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("sub-1"))
        .stdout(predicate::str::contains("submitted"));
}

#[test]
fn export_grades_as_csv() {
    let dir = initialized();

    let output = gradewise()
        .current_dir(dir.path())
        .args([
            "export", "--data", "gradebook.json", "--assignment", "essay-1", "--as", "teacher-1",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let csv = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("submission_id,student_id,status,score"));
    assert!(lines[1].starts_with("sub-1,student-1,submitted,,"));
}

#[test]
fn export_grades_to_json_file() {
    let dir = initialized();

    gradewise()
        .current_dir(dir.path())
        .args([
            "export", "--data", "gradebook.json", "--assignment", "essay-1", "--as", "teacher-2",
            "--format", "json", "--output", "grades.json",
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("Exported 1 grades for essay-1"));

    let content = std::fs::read_to_string(dir.path().join("grades.json")).unwrap();
    let rows: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(rows[0]["student_id"], "student-1");
    assert_eq!(rows[0]["status"], "submitted");
    assert!(rows[0]["score"].is_null());
}

#[test]
fn export_denied_for_students_and_unknown_formats() {
    let dir = initialized();

    gradewise()
        .current_dir(dir.path())
        .args([
            "export", "--data", "gradebook.json", "--assignment", "essay-1", "--as", "student-1",
            "--role", "student",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("permission denied"));

    gradewise()
        .current_dir(dir.path())
        .args([
            "export", "--data", "gradebook.json", "--assignment", "essay-1", "--as", "teacher-1",
            "--format", "xlsx",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown export format 'xlsx'"));
}
