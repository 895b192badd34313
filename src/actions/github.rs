//! `actions/github-create-pr`: open a pull request with the `gh` CLI.

use serde::Deserialize;

use super::git::check_repo;
use super::{decode_params, Action, ActionError};
use crate::core::{run_command, Outputs, Params, Value};
use crate::engine::Context;

fn default_base() -> String {
    "main".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PrParams {
    repo: String,
    head: String,
    #[serde(default = "default_base")]
    base: String,
    title: String,
    #[serde(default)]
    body: String,
}

/// Opens a pull request from `head` into `base`. Output: `url`.
///
/// In dry-run mode the `gh` command is logged, not run, and `url` is empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct GithubCreatePr;

impl Action for GithubCreatePr {
    fn run(&self, params: &Params, _context: &Context, dry_run: bool) -> Result<Outputs, ActionError> {
        let params: PrParams = decode_params(params)?;
        check_repo(&params.repo)?;

        let args = [
            "gh",
            "pr",
            "create",
            "--repo",
            params.repo.as_str(),
            "--head",
            params.head.as_str(),
            "--base",
            params.base.as_str(),
            "--title",
            params.title.as_str(),
            "--body",
            params.body.as_str(),
        ];

        let url = if dry_run {
            tracing::warn!(repo = params.repo, head = params.head, base = params.base, "Dry run: skipping gh pr create");
            String::new()
        } else {
            let url = run_command(&args, None)?;
            tracing::info!(url = url, "Created pull request");
            url
        };

        let mut outputs = Outputs::new();
        outputs.insert("url".to_string(), Value::from(url));
        Ok(outputs)
    }
}
