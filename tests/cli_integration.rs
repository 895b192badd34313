//! CLI Integration Tests
//!
//! Tests the command-line interface end-to-end.

use assert_cmd::Command;
use assert_fs::prelude::*;
use predicates::prelude::*;

/// Get the binary to test.
fn slowhand() -> Command {
    let mut cmd = Command::cargo_bin("slowhand").unwrap();
    cmd.env_remove("SLOWHAND_DEBUG").env_remove("SLOWHAND_JOBS_DIR");
    cmd
}

/// A workspace with a local `.slowhand.toml` that keeps all run state inside it.
fn workspace() -> assert_fs::TempDir {
    let temp = assert_fs::TempDir::new().unwrap();
    let root = temp.path().display().to_string();
    temp.child(".slowhand.toml")
        .write_str(&format!(
            "[jobs]\ndirs = ['{root}/jobs']\n\n[state]\ncheckpoint = '{root}/state/checkpoint.json'\nscratch_root = '{root}/scratch'\n"
        ))
        .unwrap();
    temp
}

const HELLO_JOB: &str = r#"
name: Say hello
inputs:
  who:
    default: world
steps:
  - id: greet
    name: Greet
    run: |
      echo "greeting=hello ${{ inputs.who }}" >> "$OUTPUT"
  - name: Shout
    if: greet.greeting == "hello slowhand"
    run: echo "${{ greet.greeting }}!"
"#;

// ============================================================================
// Help & Version Tests
// ============================================================================

#[test]
fn test_help_flag() {
    slowhand()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Declarative job runner"));
}

#[test]
fn test_version_flag() {
    slowhand()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_run_command_help() {
    slowhand()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("NAME=VALUE"));
}

#[test]
fn test_completions() {
    slowhand()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("slowhand"));
}

// ============================================================================
// Jobs Command Tests
// ============================================================================

#[test]
fn test_jobs_lists_job_files() {
    let temp = workspace();
    temp.child("jobs/hello.yaml").write_str(HELLO_JOB).unwrap();
    temp.child("jobs/broken.yaml").write_str("name: [unclosed").unwrap();

    slowhand()
        .arg("jobs")
        .current_dir(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Found 1 jobs"))
        .stdout(predicate::str::contains("hello : Say hello"));

    temp.close().unwrap();
}

#[test]
fn test_jobs_dir_flag_overrides_config() {
    let temp = workspace();
    temp.child("elsewhere/other.yml").write_str(HELLO_JOB).unwrap();

    slowhand()
        .args(["jobs", "--jobs-dir"])
        .arg(temp.child("elsewhere").path())
        .current_dir(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("other : Say hello"));

    temp.close().unwrap();
}

// ============================================================================
// Run & Resume Tests
// ============================================================================

#[test]
fn test_run_job() {
    let temp = workspace();
    temp.child("jobs/hello.yaml").write_str(HELLO_JOB).unwrap();

    slowhand()
        .args(["run", "hello", "-i", "who=slowhand"])
        .current_dir(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Job hello completed"))
        .stdout(predicate::str::contains("2. Shout - done"));

    temp.child("state/checkpoint.json").assert(predicate::path::missing());
    temp.close().unwrap();
}

#[test]
fn test_run_skips_false_condition() {
    let temp = workspace();
    temp.child("jobs/hello.yaml").write_str(HELLO_JOB).unwrap();

    slowhand()
        .args(["run", "hello"])
        .current_dir(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("2. Shout - skipped (condition false)"));

    temp.close().unwrap();
}

#[test]
fn test_run_rejects_unknown_input() {
    let temp = workspace();
    temp.child("jobs/hello.yaml").write_str(HELLO_JOB).unwrap();

    slowhand()
        .args(["run", "hello", "-i", "whom=x"])
        .current_dir(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown input 'whom'"));

    temp.close().unwrap();
}

#[test]
fn test_run_unknown_job() {
    let temp = workspace();

    slowhand()
        .args(["run", "nope"])
        .current_dir(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));

    temp.close().unwrap();
}

#[test]
fn test_failed_run_then_resume() {
    let temp = workspace();
    let marker = temp.child("marker");
    temp.child("jobs/gate.yaml")
        .write_str(&format!(
            r#"
name: Gate
steps:
  - id: first
    name: First
    run: |
      echo "x" >> "{count}"
  - id: gate
    name: Gate
    run: test -f "{marker}"
"#,
            count = temp.child("count").path().display(),
            marker = marker.path().display()
        ))
        .unwrap();

    slowhand()
        .args(["run", "gate"])
        .current_dir(temp.path())
        .assert()
        .failure()
        .stdout(predicate::str::contains("Job gate failed"))
        .stdout(predicate::str::contains("Checkpoint saved to"));
    temp.child("state/checkpoint.json").assert(predicate::path::exists());

    marker.touch().unwrap();

    slowhand()
        .args(["resume", "gate"])
        .current_dir(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("1. First - skipped (already done)"))
        .stdout(predicate::str::contains("2. Gate - done"));

    temp.child("count").assert("x\n");
    temp.child("state/checkpoint.json").assert(predicate::path::missing());
    temp.close().unwrap();
}

#[test]
fn test_resume_without_checkpoint() {
    let temp = workspace();
    temp.child("jobs/hello.yaml").write_str(HELLO_JOB).unwrap();

    slowhand()
        .args(["resume", "hello"])
        .current_dir(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("No checkpoint found"));

    temp.close().unwrap();
}

// ============================================================================
// Config Command Tests
// ============================================================================

#[test]
fn test_config_shows_local_settings() {
    let temp = workspace();

    slowhand()
        .arg("config")
        .current_dir(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("[state]"))
        .stdout(predicate::str::contains("checkpoint.json"));

    temp.close().unwrap();
}

#[test]
fn test_config_path() {
    slowhand()
        .args(["config", "--path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}
