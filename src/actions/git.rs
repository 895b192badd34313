//! Git actions: clone a GitHub repository, commit and push a branch.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::{decode_params, Action, ActionError};
use crate::core::{random_name, run_command, Outputs, Params, Value};
use crate::engine::Context;

/// `owner/name`
pub(crate) static REPO_SLUG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w\-]+/[\w\-]+$").expect("valid repo regex"));

const PROTECTED_BRANCHES: [&str; 2] = ["main", "master"];

pub(crate) fn check_repo(repo: &str) -> Result<(), ActionError> {
    if REPO_SLUG.is_match(repo) {
        Ok(())
    } else {
        Err(ActionError::InvalidParams(format!("repo must look like owner/name, got '{repo}'")))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CloneParams {
    repo: String,
    #[serde(rename = "fetch-depth", default)]
    fetch_depth: Option<u32>,
    #[serde(rename = "new-branch", default)]
    new_branch: Option<String>,
}

impl CloneParams {
    fn validate(self) -> Result<Self, ActionError> {
        check_repo(&self.repo)?;
        if self.fetch_depth == Some(0) {
            return Err(ActionError::InvalidParams("fetch-depth must be positive".to_string()));
        }
        Ok(self)
    }

    fn bare_name(&self) -> &str {
        self.repo.rsplit('/').next().unwrap_or(&self.repo)
    }

    fn url(&self) -> String {
        format!("git@github.com:{}.git", self.repo)
    }
}

/// Clones `repo` over SSH into the run directory.
///
/// Outputs: `repo_dir`, `head_hash`, `head_hash_short`, `new_branch`.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitClone;

impl Action for GitClone {
    fn run(&self, params: &Params, context: &Context, _dry_run: bool) -> Result<Outputs, ActionError> {
        let params = decode_params::<CloneParams>(params)?.validate()?;
        let repo_dir = context.run_dir().join(random_name(params.bare_name()));
        let repo_dir_str = repo_dir.to_string_lossy().to_string();

        let url = params.url();
        let depth = params.fetch_depth.map(|d| d.to_string());
        let mut args = vec!["git", "clone", url.as_str(), repo_dir_str.as_str()];
        if let Some(ref depth) = depth {
            args.extend(["--depth", depth.as_str()]);
        }
        tracing::info!(repo = params.repo, dir = repo_dir_str, "Cloning repository");
        run_command(&args, None)?;

        let head_hash = run_command(&["git", "rev-parse", "HEAD"], Some(&repo_dir))?;
        if let Some(ref branch) = params.new_branch {
            run_command(&["git", "checkout", "-b", branch.as_str()], Some(&repo_dir))?;
        }

        let short: String = head_hash.chars().take(7).collect();
        let mut outputs = Outputs::new();
        outputs.insert("repo_dir".to_string(), Value::from(repo_dir_str));
        outputs.insert("head_hash".to_string(), Value::from(head_hash));
        outputs.insert("head_hash_short".to_string(), Value::from(short));
        outputs.insert("new_branch".to_string(), Value::from(params.new_branch));
        Ok(outputs)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CommitPushParams {
    #[serde(rename = "repo-dir")]
    repo_dir: String,
    message: String,
    branch: String,
}

/// Commits all changes in `repo-dir` on `branch` and pushes it.
///
/// Refuses protected branches and clean trees. The push is skipped in
/// dry-run mode; the local commit is not.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitCommitPushBranch;

impl Action for GitCommitPushBranch {
    fn run(&self, params: &Params, _context: &Context, dry_run: bool) -> Result<Outputs, ActionError> {
        let params: CommitPushParams = decode_params(params)?;
        if PROTECTED_BRANCHES.contains(&params.branch.as_str()) {
            return Err(ActionError::Failed(format!(
                "Pushing to {} branch is disallowed",
                params.branch
            )));
        }

        let repo = Path::new(&params.repo_dir);
        let status = run_command(&["git", "status", "--porcelain"], Some(repo))?;
        if status.is_empty() {
            return Err(ActionError::Failed(format!("No changes to commit in: {}", params.repo_dir)));
        }

        let current = run_command(&["git", "rev-parse", "--abbrev-ref", "HEAD"], Some(repo))?;
        if current != params.branch {
            tracing::info!(branch = params.branch, "Checking out new branch");
            run_command(&["git", "checkout", "-b", params.branch.as_str()], Some(repo))?;
        }

        run_command(&["git", "add", "-A"], Some(repo))?;
        run_command(&["git", "commit", "-m", params.message.as_str()], Some(repo))?;
        if dry_run {
            tracing::warn!(branch = params.branch, "Dry run: skipping git push");
        } else {
            run_command(&["git", "push", "--set-upstream", "origin", params.branch.as_str()], Some(repo))?;
        }

        Ok(Outputs::new())
    }
}
