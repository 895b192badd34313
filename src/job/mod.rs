//! Job definitions.
//!
//! Jobs are YAML files that define an ordered list of steps, each either a
//! shell script or a named action, with optional conditions and declared
//! inputs.

mod inputs;
mod parser;
mod schema;

use std::path::PathBuf;

use thiserror::Error;

pub use inputs::{parse_assignments, parse_bool, parse_inputs};
pub use parser::{discover_jobs, find_job, load_job_file, parse_job_str, RESERVED_IDS};
pub use schema::{derive_identity, InputSpec, InputType, Job, Step, StepKind, SHELL_ACTION};

/// Errors found while loading or validating a job, before any step runs.
#[derive(Debug, Error)]
pub enum JobError {
    /// Job file not found in any jobs dir.
    #[error("Job file not found: {0}")]
    NotFound(String),

    /// Job file could not be read.
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Job file is not valid YAML or does not match the schema.
    #[error("Malformed job file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Job violates a rule serde cannot express.
    #[error("{0}")]
    Invalid(String),

    /// Supplied inputs do not match the declarations.
    #[error("{0}")]
    Input(String),

    /// A step uses an action that is not registered.
    #[error("Step '{step}' uses unknown action '{action}'")]
    UnknownAction { step: String, action: String },
}
