//! Execution engine: run context, checkpoints and the step runner.

mod checkpoint;
mod context;
mod runner;

pub use checkpoint::{CheckpointError, CheckpointLock, CheckpointStore};
pub use context::{Context, ContextError};
pub use runner::{
    RunOptions, RunOutcome, RunReport, RunState, Runner, SkipReason, StepOutcome, StepRecord,
};
