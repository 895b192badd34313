//! Actions: the real-world effects behind job steps.
//!
//! Every step dispatches to an action by name. `run:` steps go to
//! `actions/shell`; `uses:` steps name their action explicitly. Actions get
//! template-resolved parameters, a read-only view of the run context and the
//! dry-run flag, and return outputs that later steps can reference.

mod abort;
mod git;
mod github;
mod setup;
mod shell;
mod version;

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::core::{Outputs, Params};
use crate::engine::Context;

pub use abort::Abort;
pub use git::{GitClone, GitCommitPushBranch};
pub use github::GithubCreatePr;
pub use setup::{SetupGh, SetupGit};
pub use shell::Shell;
pub use version::{compute_version, ComputeVersion};

/// Errors reported by actions. Any of them aborts the run.
#[derive(Debug, Error)]
pub enum ActionError {
    /// No action is registered under this name.
    #[error("Cannot find action {0}")]
    NotFound(String),

    /// Parameters do not match what the action expects.
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// The action ran and failed.
    #[error("{0}")]
    Failed(String),

    /// An external command failed.
    #[error(transparent)]
    Command(#[from] anyhow::Error),
}

/// A named effect a step can invoke.
pub trait Action {
    /// Run the action.
    ///
    /// With `dry_run` set, the action must not perform irreversible external
    /// effects and should log what it skipped.
    fn run(&self, params: &Params, context: &Context, dry_run: bool) -> Result<Outputs, ActionError>;
}

/// Actions available to jobs, keyed by name.
#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Box<dyn Action>>,
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry").field("actions", &self.names()).finish()
    }
}

impl ActionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with all built-in actions.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("actions/shell", Shell);
        registry.register("actions/abort", Abort);
        registry.register("actions/compute-version", ComputeVersion);
        registry.register("actions/git-clone", GitClone);
        registry.register("actions/git-commit-push-branch", GitCommitPushBranch);
        registry.register("actions/github-create-pr", GithubCreatePr);
        registry.register("actions/setup-git", SetupGit);
        registry.register("actions/setup-gh", SetupGh);
        registry
    }

    /// Register an action, replacing any previous one with the same name.
    pub fn register(&mut self, name: impl Into<String>, action: impl Action + 'static) {
        self.actions.insert(name.into(), Box::new(action));
    }

    /// Whether an action is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Look up an action.
    pub fn get(&self, name: &str) -> Result<&dyn Action, ActionError> {
        self.actions
            .get(name)
            .map(Box::as_ref)
            .ok_or_else(|| ActionError::NotFound(name.to_string()))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Decode parameters into an action's typed parameter struct.
pub(crate) fn decode_params<T: DeserializeOwned>(params: &Params) -> Result<T, ActionError> {
    let json = serde_json::to_value(params).map_err(|e| ActionError::InvalidParams(e.to_string()))?;
    serde_json::from_value(json).map_err(|e| ActionError::InvalidParams(e.to_string()))
}

/// Accept an integer or a string holding one; templated parameters are always strings.
pub(crate) fn int_or_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntOrString {
        Int(i64),
        Str(String),
    }

    match IntOrString::deserialize(deserializer)? {
        IntOrString::Int(i) => Ok(i),
        IntOrString::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
