//! Crate-wide error type.

use thiserror::Error;

use crate::actions::ActionError;
use crate::engine::{CheckpointError, ContextError};
use crate::expression::ExpressionError;
use crate::job::JobError;

/// Errors returned by the runner.
#[derive(Debug, Error)]
pub enum Error {
    /// The job, its inputs or its actions are misconfigured. Raised before any step runs.
    #[error("Configuration error: {0}")]
    Config(#[from] JobError),

    /// A condition failed to evaluate.
    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),

    /// A step's action failed.
    #[error("Action failed: {0}")]
    Action(#[from] ActionError),

    /// A checkpoint belongs to a different job.
    #[error("Checkpoint belongs to job '{found}', not '{expected}'")]
    ResumeMismatch { expected: String, found: String },

    /// The checkpoint could not be read, written or locked.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// A step failed and its checkpoint could not be written either.
    #[error("{cause}; the checkpoint could not be saved: {source}")]
    CheckpointNotSaved {
        #[source]
        source: CheckpointError,
        cause: Box<Error>,
    },

    /// A context operation failed.
    #[error("Context error: {0}")]
    Context(#[from] ContextError),
}

/// Result alias for runner operations.
pub type Result<T> = std::result::Result<T, Error>;
