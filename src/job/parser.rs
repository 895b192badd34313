//! Job parser.
//!
//! Parses YAML job files into `Job` structs and finds them in the
//! configured job directories.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::schema::{InputSpec, Job, Step, StepKind};
use super::JobError;
use crate::core::{Config, Params};
use crate::expression::Condition;

/// Namespaces of the run context that step ids may not shadow.
pub const RESERVED_IDS: [&str; 3] = ["meta", "inputs", "steps"];

static STEP_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w+$").expect("valid step id regex"));

/// Job file as written on disk.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawJob {
    name: String,
    description: Option<String>,
    #[serde(default)]
    inputs: IndexMap<String, InputSpec>,
    steps: Vec<RawStep>,
}

/// Step as written on disk; `run` and `uses` select the variant.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStep {
    id: Option<String>,
    name: String,
    #[serde(rename = "if")]
    condition: Option<String>,
    run: Option<String>,
    #[serde(rename = "working-dir")]
    working_dir: Option<String>,
    uses: Option<String>,
    #[serde(rename = "with")]
    params: Option<Params>,
}

impl TryFrom<RawStep> for Step {
    type Error = JobError;

    fn try_from(raw: RawStep) -> Result<Self, Self::Error> {
        let invalid = |reason: String| JobError::Invalid(format!("Step '{}' {reason}", raw.name));

        let kind = match (raw.run, raw.uses) {
            (Some(script), None) => {
                if raw.params.is_some() {
                    return Err(invalid("is a `run` step and cannot take `with`".into()));
                }
                StepKind::Script { script, working_dir: raw.working_dir }
            }
            (None, Some(uses)) => {
                if raw.working_dir.is_some() {
                    return Err(invalid("is a `uses` step and cannot take `working-dir`".into()));
                }
                if uses.trim().is_empty() {
                    return Err(invalid("has an empty `uses`".into()));
                }
                StepKind::Action { uses, params: raw.params.unwrap_or_default() }
            }
            (Some(_), Some(_)) => return Err(invalid("has both `run` and `uses`".into())),
            (None, None) => return Err(invalid("has neither `run` nor `uses`".into())),
        };

        let condition = raw
            .condition
            .as_deref()
            .map(Condition::compile)
            .transpose()
            .map_err(|e| invalid(format!("has an invalid condition: {e}")))?;

        Ok(Self { id: raw.id, name: raw.name, condition, kind })
    }
}

/// Parse a job from a file. The job id is the file stem.
pub fn load_job_file(path: &Path) -> Result<Job, JobError> {
    let content = std::fs::read_to_string(path)
        .map_err(|source| JobError::Io { path: path.to_path_buf(), source })?;
    let job_id = path
        .file_stem()
        .and_then(|n| n.to_str())
        .ok_or_else(|| JobError::Invalid(format!("Bad job file name: {}", path.display())))?;

    let mut job = parse_job_str(job_id, &content)?;
    job.source = Some(path.to_path_buf());
    Ok(job)
}

/// Parse a job from a string.
pub fn parse_job_str(job_id: &str, content: &str) -> Result<Job, JobError> {
    let raw: RawJob = serde_yaml::from_str(content)?;

    let steps = raw.steps.into_iter().map(Step::try_from).collect::<Result<Vec<_>, _>>()?;

    let job = Job {
        job_id: job_id.to_string(),
        source: None,
        name: raw.name,
        description: raw.description,
        inputs: raw.inputs,
        steps,
    };
    validate_job(&job)?;
    Ok(job)
}

/// Validate a job for errors that serde cannot catch.
fn validate_job(job: &Job) -> Result<(), JobError> {
    if job.name.trim().is_empty() {
        return Err(JobError::Invalid("Job name cannot be empty".into()));
    }

    if job.steps.is_empty() {
        return Err(JobError::Invalid("Job must have at least one step".into()));
    }

    for (name, spec) in &job.inputs {
        if spec.required && spec.default.is_some() {
            return Err(JobError::Invalid(format!(
                "Input '{name}' is required and cannot have a default"
            )));
        }
        if let Some(ref default) = spec.default {
            if !spec.input_type.accepts(default) {
                return Err(JobError::Invalid(format!(
                    "Default of input '{name}' is a {}, expected {}",
                    default.kind(),
                    spec.input_type
                )));
            }
        }
    }

    let mut seen = HashSet::new();
    for (i, step) in job.steps.iter().enumerate() {
        if step.name.trim().is_empty() {
            return Err(JobError::Invalid(format!("Step {} has no name", i + 1)));
        }

        if let Some(ref id) = step.id {
            if !STEP_ID.is_match(id) {
                return Err(JobError::Invalid(format!(
                    "Step '{}' has id '{id}'; ids may only contain letters, digits and '_'",
                    step.name
                )));
            }
            if RESERVED_IDS.contains(&id.as_str()) {
                return Err(JobError::Invalid(format!(
                    "Step '{}' uses the reserved id '{id}'",
                    step.name
                )));
            }
        }

        let identity = step.identity();
        if !seen.insert(identity.clone()) {
            return Err(JobError::Invalid(format!(
                "Step '{}' duplicates the step identity '{identity}'",
                step.name
            )));
        }
    }

    Ok(())
}

/// Find a job by id in the configured job directories.
pub fn find_job(config: &Config, job_id: &str) -> Result<Job, JobError> {
    for dir in config.jobs_dirs() {
        for ext in ["yaml", "yml"] {
            let path = dir.join(format!("{job_id}.{ext}"));
            if path.is_file() {
                return load_job_file(&path);
            }
        }
    }
    Err(JobError::NotFound(job_id.to_string()))
}

/// Discover all jobs in the configured job directories.
///
/// Files that fail to parse are logged and skipped.
pub fn discover_jobs(config: &Config) -> Vec<Job> {
    let mut jobs = Vec::new();
    for dir in config.jobs_dirs() {
        jobs.extend(scan_job_dir(&dir));
    }
    jobs
}

/// Scan a directory for job files.
fn scan_job_dir(dir: &Path) -> Vec<Job> {
    let mut paths: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| path.extension().is_some_and(|e| e == "yaml" || e == "yml"))
            .collect(),
        Err(e) => {
            tracing::debug!(dir = %dir.display(), error = %e, "Skipping jobs dir");
            return Vec::new();
        }
    };
    paths.sort();

    paths
        .into_iter()
        .filter_map(|path| match load_job_file(&path) {
            Ok(job) => Some(job),
            Err(e) => {
                tracing::warn!(path = ?path, error = %e, "Failed to parse job");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::core::Value;
    use crate::job::InputType;

    const SAMPLE: &str = r#"
name: Sample Job
description: Does a few things
inputs:
  version:
    description: Version to release
    type: string
    required: true
  dry:
    type: bool
    default: false
  retries:
    type: int
    default: 3
steps:
  - name: Clone repo
    id: clone
    uses: actions/git-clone
    with:
      repo: acme/widgets
      fetch-depth: 1
  - name: Build
    run: make build
    working-dir: ${{ clone.repo_dir }}
  - name: Publish
    if: inputs.dry != "true"
    run: make publish
"#;

    #[test]
    fn test_parse_valid_job() {
        let job = parse_job_str("sample", SAMPLE).unwrap();

        assert_eq!(job.job_id, "sample");
        assert_eq!(job.name, "Sample Job");
        assert_eq!(job.step_count(), 3);
        assert_eq!(job.input_names(), vec!["version", "dry", "retries"]);
        assert_eq!(job.inputs["retries"].input_type, InputType::Int);
        assert_eq!(job.inputs["retries"].default, Some(Value::Int(3)));

        match &job.steps[0].kind {
            StepKind::Action { uses, params } => {
                assert_eq!(uses, "actions/git-clone");
                assert_eq!(params["fetch-depth"], Value::Int(1));
            }
            other => panic!("unexpected kind: {other:?}"),
        }
        match &job.steps[1].kind {
            StepKind::Script { script, working_dir } => {
                assert_eq!(script, "make build");
                assert_eq!(working_dir.as_deref(), Some("${{ clone.repo_dir }}"));
            }
            other => panic!("unexpected kind: {other:?}"),
        }
        assert_eq!(job.steps[2].condition.as_ref().unwrap().text(), r#"inputs.dry != "true""#);
    }

    #[test]
    fn test_identities_are_stable_across_loads() {
        let first = parse_job_str("sample", SAMPLE).unwrap().step_identities();
        let second = parse_job_str("sample", SAMPLE).unwrap().step_identities();
        assert_eq!(first, second);
        assert_eq!(first[0], "clone");
    }

    fn assert_invalid(yaml: &str, needle: &str) {
        let err = parse_job_str("t", yaml).unwrap_err();
        assert!(err.to_string().contains(needle), "`{err}` should contain `{needle}`");
    }

    #[test]
    fn test_empty_name_fails() {
        assert_invalid("name: \"\"\nsteps:\n  - name: a\n    run: x\n", "name cannot be empty");
    }

    #[test]
    fn test_no_steps_fails() {
        assert_invalid("name: t\nsteps: []\n", "at least one step");
    }

    #[test]
    fn test_step_kind_must_be_exactly_one() {
        assert_invalid(
            "name: t\nsteps:\n  - name: a\n    run: x\n    uses: actions/shell\n",
            "both `run` and `uses`",
        );
        assert_invalid("name: t\nsteps:\n  - name: a\n", "neither `run` nor `uses`");
    }

    #[test]
    fn test_misplaced_fields_fail() {
        assert_invalid(
            "name: t\nsteps:\n  - name: a\n    run: x\n    with: {a: 1}\n",
            "cannot take `with`",
        );
        assert_invalid(
            "name: t\nsteps:\n  - name: a\n    uses: actions/abort\n    working-dir: /tmp\n",
            "cannot take `working-dir`",
        );
    }

    #[test]
    fn test_unknown_fields_fail() {
        assert!(parse_job_str("t", "name: t\nsteps:\n  - name: a\n    run: x\n    foo: 1\n").is_err());
        assert!(parse_job_str("t", "name: t\nbogus: 1\nsteps:\n  - name: a\n    run: x\n").is_err());
    }

    #[test]
    fn test_invalid_condition_fails_at_load() {
        assert_invalid(
            "name: t\nsteps:\n  - name: a\n    if: a ==\n    run: x\n",
            "invalid condition",
        );
    }

    #[test]
    fn test_duplicate_identities_fail() {
        assert_invalid(
            "name: t\nsteps:\n  - name: a\n    id: s\n    run: x\n  - name: b\n    id: s\n    run: y\n",
            "duplicates",
        );
        assert_invalid(
            "name: t\nsteps:\n  - name: same\n    run: x\n  - name: same\n    run: y\n",
            "duplicates",
        );
    }

    #[test]
    fn test_bad_and_reserved_ids_fail() {
        assert_invalid("name: t\nsteps:\n  - name: a\n    id: my-step\n    run: x\n", "may only");
        assert_invalid("name: t\nsteps:\n  - name: a\n    id: inputs\n    run: x\n", "reserved");
    }

    #[test]
    fn test_input_invariants() {
        assert_invalid(
            "name: t\ninputs:\n  v:\n    type: string\n    required: true\n    default: x\nsteps:\n  - name: a\n    run: x\n",
            "cannot have a default",
        );
        assert_invalid(
            "name: t\ninputs:\n  v:\n    type: int\n    default: \"3\"\nsteps:\n  - name: a\n    run: x\n",
            "expected int",
        );
        assert!(parse_job_str(
            "t",
            "name: t\ninputs:\n  v:\n    type: float\nsteps:\n  - name: a\n    run: x\n"
        )
        .is_err());
    }

    #[test]
    fn test_load_job_file_uses_stem_as_id() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("release-app.yaml");
        fs::write(&path, SAMPLE).unwrap();

        let job = load_job_file(&path).unwrap();
        assert_eq!(job.job_id, "release-app");
        assert_eq!(job.source.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_find_and_discover_jobs() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        fs::write(first.path().join("alpha.yaml"), "name: Alpha\nsteps:\n  - name: a\n    run: x\n")
            .unwrap();
        fs::write(second.path().join("beta.yml"), "name: Beta\nsteps:\n  - name: b\n    run: y\n")
            .unwrap();
        fs::write(second.path().join("broken.yaml"), "name: [").unwrap();
        fs::write(second.path().join("notes.txt"), "not a job").unwrap();

        let mut config = Config::default();
        config.jobs.dirs = vec![
            first.path().to_string_lossy().to_string(),
            second.path().to_string_lossy().to_string(),
        ];

        assert_eq!(find_job(&config, "beta").unwrap().name, "Beta");
        assert!(matches!(find_job(&config, "gamma"), Err(JobError::NotFound(_))));

        let names: Vec<String> = discover_jobs(&config).into_iter().map(|j| j.job_id).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_release_example_loads() {
        let yaml = r#"
name: Release
inputs:
  version:
    required: true
steps:
  - id: bump
    name: Bump
    uses: actions/compute-version
    with:
      input: ${{ inputs.version }}
      add-patch: 1
  - name: Tag
    if: bump.result != ""
    run: git tag "v${{ bump.result }}"
"#;
        let job = parse_job_str("release", yaml).unwrap();
        assert_eq!(job.step_count(), 2);
        assert_eq!(job.steps[0].identity(), "bump");
        assert!(job.steps[1].condition.is_some());
    }

    #[test]
    fn test_step_without_name_fails() {
        assert_invalid("name: t\nsteps:\n  - id: bump\n    run: x\n", "name");
    }
}
