//! Prerequisite checks for the `git` and `gh` command-line tools.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{Action, ActionError};
use crate::core::{run_command, Outputs, Params, Value};
use crate::engine::Context;

static GIT_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"git version (?P<version>[\d\-\.]+)").expect("valid git version regex"));
static GH_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"gh version (?P<version>[\d\-\.]+)").expect("valid gh version regex"));

const GIT_HINT: &str = "To install git, run:

    sudo apt update
    sudo apt install -y git";

const GH_HINT: &str = "To install gh, see: https://cli.github.com";

const GH_AUTH_HINT: &str = "You are not authenticated on github.com.
Create a personal access token and export it as GH_TOKEN or GITHUB_TOKEN:
https://github.com/settings/tokens";

/// Run a command; on failure, log `hint` and fail the step.
fn checked_run(args: &[&str], hint: &str) -> Result<String, ActionError> {
    run_command(args, None).map_err(|e| {
        let message = format!("Failed to run `{}`: {e}", args.join(" "));
        tracing::error!("{message}");
        tracing::info!("{hint}");
        ActionError::Failed(message)
    })
}

fn extract_version(re: &Regex, output: &str) -> Result<String, ActionError> {
    re.captures(output)
        .and_then(|caps| caps.name("version"))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| ActionError::Failed(format!("Unknown output: {output}")))
}

/// Checks that git is installed. Output: `git_version`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SetupGit;

impl Action for SetupGit {
    fn run(&self, _params: &Params, _context: &Context, _dry_run: bool) -> Result<Outputs, ActionError> {
        let output = checked_run(&["git", "--version"], GIT_HINT)?;
        let version = extract_version(&GIT_VERSION, &output)?;
        tracing::info!(version = version, "git is available");

        let mut outputs = Outputs::new();
        outputs.insert("git_version".to_string(), Value::from(version));
        Ok(outputs)
    }
}

/// Checks that gh is installed and authenticated. Output: `gh_version`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SetupGh;

impl Action for SetupGh {
    fn run(&self, _params: &Params, _context: &Context, _dry_run: bool) -> Result<Outputs, ActionError> {
        let output = checked_run(&["gh", "--version"], GH_HINT)?;
        let version = extract_version(&GH_VERSION, &output)?;
        tracing::info!(version = version, "gh is available");

        checked_run(&["gh", "auth", "status"], GH_AUTH_HINT)?;
        tracing::info!("Authenticated on github.com");

        let mut outputs = Outputs::new();
        outputs.insert("gh_version".to_string(), Value::from(version));
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_git_version() {
        assert_eq!(extract_version(&GIT_VERSION, "git version 2.43.0").unwrap(), "2.43.0");
        assert_eq!(
            extract_version(&GIT_VERSION, "git version 2.39.3 (Apple Git-146)").unwrap(),
            "2.39.3"
        );
        assert!(extract_version(&GIT_VERSION, "bash: git: command not found").is_err());
    }

    #[test]
    fn test_extract_gh_version() {
        let output = "gh version 2.45.0 (2024-03-04)\nhttps://github.com/cli/cli/releases/tag/v2.45.0";
        assert_eq!(extract_version(&GH_VERSION, output).unwrap(), "2.45.0");
    }

    #[test]
    fn test_missing_tool_fails() {
        let err = checked_run(&["slowhand-no-such-tool", "--version"], "install it").unwrap_err();
        assert!(matches!(err, ActionError::Failed(ref m) if m.contains("slowhand-no-such-tool")));
    }
}
