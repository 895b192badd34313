//! `actions/shell`: run a bash script.
//!
//! Scripts run with `set -e`. A script publishes outputs by appending
//! `KEY=VALUE` lines to the file named by `$OUTPUT`.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{decode_params, Action, ActionError};
use crate::core::{random_name, Executor, Outputs, Params, ShellCommand, Value};
use crate::engine::Context;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ShellParams {
    script: String,
    #[serde(rename = "working-dir", default)]
    working_dir: Option<String>,
}

/// Runs `script` with bash.
#[derive(Debug, Default, Clone, Copy)]
pub struct Shell;

impl Action for Shell {
    fn run(&self, params: &Params, context: &Context, dry_run: bool) -> Result<Outputs, ActionError> {
        let params: ShellParams = decode_params(params)?;
        if params.script.trim().is_empty() {
            return Err(ActionError::InvalidParams("script must not be empty".to_string()));
        }

        let working_dir = match params.working_dir.as_deref() {
            Some(dir) if !dir.is_empty() => check_working_dir(dir)?,
            _ => context.run_dir().to_path_buf(),
        };

        let output_file = context.run_dir().join(random_name("output"));
        let script = format!("set -e\n{}", textwrap::dedent(&params.script).trim());

        let mut command = ShellCommand::new(script)
            .with_working_dir(working_dir)
            .with_env("OUTPUT", output_file.to_string_lossy().to_string());
        if dry_run {
            command = command.with_env("SLOWHAND_DRY_RUN", "1");
        }

        let result = Executor::new().execute(&command)?;
        if !result.success() {
            let code = result.code().map_or_else(|| "a signal".to_string(), |c| format!("code {c}"));
            return Err(ActionError::Failed(format!("Script exited with {code}")));
        }
        tracing::debug!(duration = ?result.duration, "Script finished");

        read_output_file(&output_file)
    }
}

/// Relative paths are taken from the directory slowhand was started in.
fn check_working_dir(dir: &str) -> Result<PathBuf, ActionError> {
    let mut path = PathBuf::from(dir);
    if path.is_relative() {
        let cwd = std::env::current_dir()
            .map_err(|e| ActionError::Failed(format!("Cannot read current directory: {e}")))?;
        path = cwd.join(path);
    }
    if !path.is_dir() {
        return Err(ActionError::InvalidParams(format!("working-dir does not exist: {dir}")));
    }
    Ok(path)
}

/// Parse `KEY=VALUE` lines. Lines without `=` are ignored; later keys win.
fn read_output_file(path: &Path) -> Result<Outputs, ActionError> {
    if !path.exists() {
        return Ok(Outputs::new());
    }
    let text = std::fs::read_to_string(path)
        .map_err(|e| ActionError::Failed(format!("Cannot read {}: {e}", path.display())))?;
    Ok(parse_outputs(&text))
}

fn parse_outputs(text: &str) -> Outputs {
    text.lines()
        .filter_map(|line| line.split_once('='))
        .filter(|(key, _)| !key.trim().is_empty())
        .map(|(key, value)| (key.trim().to_string(), Value::from(value.trim())))
        .collect()
}
