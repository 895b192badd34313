//! Process execution module.
//!
//! Handles spawning shell scripts and external tools (git, gh) for actions.

use std::path::{Path, PathBuf};
use std::process::{Command as ProcessCommand, ExitStatus, Stdio};
use std::time::{Duration, Instant};

/// Scripts use bash features such as `set -e`.
const SHELL: &str = "bash";

/// A shell script to run.
#[derive(Debug, Clone, Default)]
pub struct ShellCommand {
    /// Script body, passed to the shell as a single argument
    pub script: String,

    /// Working directory for execution
    pub working_dir: Option<PathBuf>,

    /// Extra environment variables
    pub env: Vec<(String, String)>,
}

impl ShellCommand {
    /// Create a new shell command.
    pub fn new(script: impl Into<String>) -> Self {
        Self { script: script.into(), working_dir: None, env: Vec::new() }
    }

    /// Set the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Add an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Result of executing a command.
#[derive(Debug)]
pub struct ExecutionResult {
    /// Exit status of the command
    pub status: ExitStatus,

    /// Time taken to execute
    pub duration: Duration,
}

impl ExecutionResult {
    /// Check if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Get the exit code.
    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }
}

/// Shell script executor.
///
/// Scripts run with `bash -c` and share the terminal, so the user sees
/// their output live.
#[derive(Debug, Default)]
pub struct Executor;

impl Executor {
    /// Create a new executor.
    pub fn new() -> Self {
        Self
    }

    /// Execute a shell script and wait for it.
    pub fn execute(&self, command: &ShellCommand) -> anyhow::Result<ExecutionResult> {
        let start = Instant::now();

        let mut cmd = ProcessCommand::new(SHELL);
        cmd.arg("-c");
        cmd.arg(&command.script);

        if let Some(ref dir) = command.working_dir {
            cmd.current_dir(dir);
        }

        for (key, value) in &command.env {
            cmd.env(key, value);
        }

        cmd.stdin(Stdio::inherit());
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());

        let status = cmd
            .status()
            .map_err(|e| anyhow::anyhow!("Failed to start {SHELL}: {e}"))?;

        Ok(ExecutionResult { status, duration: start.elapsed() })
    }
}

/// Run an external program and return its trimmed standard output.
///
/// A non-zero exit status is an error carrying the program's stderr.
pub fn run_command(args: &[&str], cwd: Option<&Path>) -> anyhow::Result<String> {
    let (program, rest) =
        args.split_first().ok_or_else(|| anyhow::anyhow!("Empty command line"))?;

    tracing::debug!(command = args.join(" "), cwd = ?cwd, "Running command");

    let mut cmd = ProcessCommand::new(program);
    cmd.args(rest);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let output = cmd
        .output()
        .map_err(|e| anyhow::anyhow!("Failed to run `{}`: {e}", args.join(" ")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!(
            "`{}` exited with {}: {}",
            args.join(" "),
            output.status.code().map_or_else(|| "signal".to_string(), |c| c.to_string()),
            stderr.trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
