//! Job schema definitions.
//!
//! A `Job` is the immutable description of a workflow: ordered steps plus
//! declared inputs. Jobs are built from YAML by the parser, which validates
//! everything below before a run can start.

use std::fmt;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::{Params, Value};
use crate::expression::Condition;

/// Built-in action that script steps are dispatched to.
pub const SHELL_ACTION: &str = "actions/shell";

/// Maximum slug length in derived step identities.
const SLUG_MAX_LEN: usize = 40;

/// A job definition.
#[derive(Debug, Clone)]
pub struct Job {
    /// Stable identifier, derived from the job file name
    pub job_id: String,

    /// File the job was loaded from
    pub source: Option<PathBuf>,

    /// Human-readable title
    pub name: String,

    /// Optional description
    pub description: Option<String>,

    /// Declared inputs, in declaration order
    pub inputs: IndexMap<String, InputSpec>,

    /// Steps, in execution order
    pub steps: Vec<Step>,
}

/// An input declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputSpec {
    /// Help text
    pub description: Option<String>,

    /// Type of the input
    #[serde(rename = "type", default)]
    pub input_type: InputType,

    /// Whether a value must be supplied
    #[serde(default)]
    pub required: bool,

    /// Default value, used when nothing is supplied
    pub default: Option<Value>,
}

/// Input types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    #[default]
    String,
    Bool,
    Int,
}

impl InputType {
    /// Whether a value has the runtime type this input declares.
    pub fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Self::String, Value::String(_)) | (Self::Bool, Value::Bool(_)) | (Self::Int, Value::Int(_))
        )
    }

    /// Get the string representation of the type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Bool => "bool",
            Self::Int => "int",
        }
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A step in the job.
#[derive(Debug, Clone)]
pub struct Step {
    /// Explicit identifier
    pub id: Option<String>,

    /// Human-readable name
    pub name: String,

    /// Condition for running this step (the `if:` field)
    pub condition: Option<Condition>,

    /// What the step does
    pub kind: StepKind,
}

/// The two kinds of step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepKind {
    /// Run a shell script (`run:`)
    Script { script: String, working_dir: Option<String> },

    /// Invoke a named action (`uses:` + `with:`)
    Action { uses: String, params: Params },
}

impl Step {
    /// The key under which this step's outputs are stored.
    ///
    /// The explicit `id` when present, otherwise derived from the name so
    /// that loading the same job file twice yields the same identity.
    pub fn identity(&self) -> String {
        self.id.clone().unwrap_or_else(|| derive_identity(&self.name))
    }

    /// The action this step dispatches to.
    pub fn action_name(&self) -> &str {
        match self.kind {
            StepKind::Script { .. } => SHELL_ACTION,
            StepKind::Action { ref uses, .. } => uses,
        }
    }

    /// Parameters for the dispatched action, before template resolution.
    pub fn dispatch_params(&self) -> Params {
        match self.kind {
            StepKind::Script { ref script, ref working_dir } => {
                let mut params = Params::new();
                params.insert("script".to_string(), Value::from(script.as_str()));
                params.insert("working-dir".to_string(), Value::from(working_dir.clone()));
                params
            }
            StepKind::Action { ref params, .. } => params.clone(),
        }
    }
}

/// Derive a step identity from its name: a slug plus a short hash of the name.
pub fn derive_identity(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let mut slug: String = slug.trim_matches('_').chars().take(SLUG_MAX_LEN).collect();
    while slug.ends_with('_') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("step");
    }

    let digest = Sha256::digest(name.as_bytes());
    let hash: String = digest.iter().take(4).map(|b| format!("{b:02x}")).collect();

    format!("{slug}_{hash}")
}

impl Job {
    /// Get the number of steps.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Identities of all steps, in order.
    pub fn step_identities(&self) -> Vec<String> {
        self.steps.iter().map(Step::identity).collect()
    }

    /// Get input names, in declaration order.
    #[must_use]
    pub fn input_names(&self) -> Vec<&str> {
        self.inputs.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script_step(id: Option<&str>, name: &str) -> Step {
        Step {
            id: id.map(str::to_string),
            name: name.to_string(),
            condition: None,
            kind: StepKind::Script { script: "echo hi".to_string(), working_dir: None },
        }
    }

    #[test]
    fn test_explicit_id_is_identity() {
        assert_eq!(script_step(Some("build"), "Build it").identity(), "build");
    }

    #[test]
    fn test_derived_identity_is_stable() {
        let a = script_step(None, "Clone the repo!").identity();
        let b = script_step(None, "Clone the repo!").identity();
        assert_eq!(a, b);
        assert!(a.starts_with("clone_the_repo_"));
        assert_eq!(a.len(), "clone_the_repo_".len() + 8);
    }

    #[test]
    fn test_derived_identity_differs_by_name() {
        assert_ne!(derive_identity("Build"), derive_identity("build"));
        assert_ne!(derive_identity("a b"), derive_identity("a-b"));
    }

    #[test]
    fn test_derived_identity_edge_cases() {
        assert!(derive_identity("!!!").starts_with("step_"));
        assert!(derive_identity("Déployer").starts_with("d_ployer_"));

        let long = "x".repeat(100);
        let identity = derive_identity(&long);
        assert_eq!(identity.len(), SLUG_MAX_LEN + 1 + 8);
    }

    #[test]
    fn test_derived_identity_is_a_word() {
        let identity = derive_identity("  Open PR: bump deps / v1.2  ");
        assert!(identity.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        assert!(!identity.starts_with('_'));
    }

    #[test]
    fn test_script_step_dispatches_to_shell() {
        let mut step = script_step(None, "s");
        step.kind =
            StepKind::Script { script: "make".to_string(), working_dir: Some("/tmp".to_string()) };

        assert_eq!(step.action_name(), SHELL_ACTION);
        let params = step.dispatch_params();
        assert_eq!(params["script"], Value::from("make"));
        assert_eq!(params["working-dir"], Value::from("/tmp"));
    }

    #[test]
    fn test_script_step_without_working_dir_passes_null() {
        let params = script_step(None, "s").dispatch_params();
        assert_eq!(params["working-dir"], Value::Null);
    }

    #[test]
    fn test_input_type_accepts() {
        assert!(InputType::Int.accepts(&Value::Int(1)));
        assert!(!InputType::Int.accepts(&Value::from("1")));
        assert!(InputType::Bool.accepts(&Value::Bool(false)));
        assert!(InputType::String.accepts(&Value::from("x")));
        assert!(!InputType::String.accepts(&Value::Null));
    }
}
