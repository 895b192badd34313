//! The control loop.
//!
//! A run moves through `Starting -> Executing(i)... -> Completed | Failed(i)
//! -> Finalized`. Each step is skipped if it already has outputs, otherwise
//! its parameters are resolved, its condition evaluated and its action
//! dispatched. The first error stops the loop and writes a checkpoint that
//! `resume` picks up.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use super::checkpoint::CheckpointStore;
use super::context::Context;
use crate::actions::ActionRegistry;
use crate::core::{Config, Outputs};
use crate::error::{Error, Result};
use crate::expression::ExpressionError;
use crate::job::{parse_inputs, Job, JobError, Step};

/// Per-run flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Ask actions to skip irreversible effects.
    pub dry_run: bool,
    /// Remove the scratch directory after a successful run.
    pub clean: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { dry_run: false, clean: true }
    }
}

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Starting,
    /// Working on the step at this index.
    Executing(usize),
    Completed,
    /// Stopped at the step at this index.
    Failed(usize),
    Finalized,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Executing(i) => write!(f, "executing step {}", i + 1),
            Self::Completed => write!(f, "completed"),
            Self::Failed(i) => write!(f, "failed at step {}", i + 1),
            Self::Finalized => write!(f, "finalized"),
        }
    }
}

/// Why a step did not dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Outputs were already recorded by an earlier attempt.
    AlreadyDone,
    /// Its condition evaluated to false.
    ConditionFalse,
}

/// What happened to a visited step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Ran(Outputs),
    Skipped(SkipReason),
}

/// One visited step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub index: usize,
    pub identity: String,
    pub name: String,
    pub outcome: StepOutcome,
}

/// What a run did, step by step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub job_id: String,
    pub run_id: String,
    pub run_dir: PathBuf,
    /// Every state the run went through, in order.
    pub states: Vec<RunState>,
    pub steps: Vec<StepRecord>,
}

impl RunReport {
    fn new(context: &Context) -> Self {
        Self {
            job_id: context.job_id().to_string(),
            run_id: context.run_id().to_string(),
            run_dir: context.run_dir().to_path_buf(),
            states: vec![RunState::Starting],
            steps: Vec::new(),
        }
    }

    /// The latest state.
    pub fn state(&self) -> RunState {
        self.states.last().copied().unwrap_or(RunState::Starting)
    }

    /// Identities of steps that dispatched in this run.
    pub fn ran(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|r| matches!(r.outcome, StepOutcome::Ran(_)))
            .map(|r| r.identity.as_str())
            .collect()
    }

    /// Identities of steps skipped for the given reason.
    pub fn skipped(&self, reason: SkipReason) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|r| r.outcome == StepOutcome::Skipped(reason))
            .map(|r| r.identity.as_str())
            .collect()
    }

    fn transition(&mut self, state: RunState) {
        tracing::trace!(from = %self.state(), to = %state, "Run state");
        self.states.push(state);
    }

    fn current_step(&self) -> usize {
        self.states
            .iter()
            .rev()
            .find_map(|s| match s {
                RunState::Executing(i) => Some(*i),
                _ => None,
            })
            .unwrap_or_default()
    }

    fn record(&mut self, index: usize, step: &Step, identity: String, outcome: StepOutcome) {
        self.steps.push(StepRecord { index, identity, name: step.name.clone(), outcome });
    }
}

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    Succeeded(RunReport),
    /// A step failed; the context was saved to `checkpoint`.
    Failed { report: RunReport, error: Error, checkpoint: PathBuf },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    pub fn report(&self) -> &RunReport {
        match self {
            Self::Succeeded(report) | Self::Failed { report, .. } => report,
        }
    }
}

/// Executes jobs against a registry of actions.
#[derive(Debug)]
pub struct Runner {
    config: Config,
    registry: ActionRegistry,
    checkpoints: CheckpointStore,
}

impl Runner {
    /// Create a runner. The checkpoint location and scratch root come from `config`.
    pub fn new(config: Config, registry: ActionRegistry) -> Self {
        let checkpoints = CheckpointStore::new(config.checkpoint_path());
        Self { config, registry, checkpoints }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// Run a job from the first step with a fresh context.
    ///
    /// `inputs` holds the user-supplied text for declared inputs.
    pub fn run(
        &self,
        job: &Job,
        inputs: &BTreeMap<String, String>,
        options: RunOptions,
    ) -> Result<RunOutcome> {
        self.check_actions(job)?;
        let inputs = parse_inputs(job, inputs)?;

        let _lock = self.checkpoints.lock()?;
        let mut context = Context::create(&job.job_id, &self.config.scratch_root())?;
        context.set_inputs(inputs)?;

        tracing::info!(
            job = job.job_id,
            run_id = context.run_id(),
            dry_run = options.dry_run,
            "Starting job"
        );
        self.drive(job, context, options)
    }

    /// Continue the last failed run of `job` from its checkpoint.
    pub fn resume(&self, job: &Job, options: RunOptions) -> Result<RunOutcome> {
        self.check_actions(job)?;

        let _lock = self.checkpoints.lock()?;
        let context = self.checkpoints.load()?;
        if context.job_id() != job.job_id {
            return Err(Error::ResumeMismatch {
                expected: job.job_id.clone(),
                found: context.job_id().to_string(),
            });
        }

        let known: BTreeSet<String> = job.step_identities().into_iter().collect();
        for orphan in context.completed_steps().into_iter().filter(|id| !known.contains(*id)) {
            tracing::warn!(step = orphan, "Checkpoint has outputs for a step the job no longer defines");
        }
        if context.ensure_run_dir()? {
            tracing::warn!(
                run_dir = %context.run_dir().display(),
                "Scratch directory was missing and has been recreated; files from the failed run are gone"
            );
        }

        tracing::info!(
            job = job.job_id,
            run_id = context.run_id(),
            started = %context.start_time(),
            dry_run = options.dry_run,
            "Resuming job"
        );
        self.drive(job, context, options)
    }

    fn check_actions(&self, job: &Job) -> Result<()> {
        for step in &job.steps {
            let action = step.action_name();
            if !self.registry.contains(action) {
                return Err(JobError::UnknownAction { step: step.name.clone(), action: action.to_string() }.into());
            }
        }
        Ok(())
    }

    fn drive(&self, job: &Job, mut context: Context, options: RunOptions) -> Result<RunOutcome> {
        let mut report = RunReport::new(&context);

        match self.execute(job, &mut context, options, &mut report) {
            Ok(()) => {
                report.transition(RunState::Completed);
                self.checkpoints.clear()?;
                if options.clean && !self.config.general.debug {
                    if let Err(e) = context.teardown() {
                        tracing::warn!(error = %e, "Failed to remove run directory");
                    }
                } else {
                    tracing::info!(run_dir = %context.run_dir().display(), "Keeping run directory");
                }
                report.transition(RunState::Finalized);
                tracing::info!(job = job.job_id, "Job completed");
                Ok(RunOutcome::Succeeded(report))
            }
            Err(error) => {
                let index = report.current_step();
                report.transition(RunState::Failed(index));

                let step = job.steps.get(index).map(|s| s.name.as_str()).unwrap_or_default();
                tracing::error!(
                    job = job.job_id,
                    step = step,
                    error = %error,
                    run_dir = %context.run_dir().display(),
                    "Job failed"
                );

                if let Err(source) = self.checkpoints.save(&context) {
                    tracing::error!(error = %source, "Failed to save checkpoint; the run cannot be resumed");
                    return Err(Error::CheckpointNotSaved { source, cause: Box::new(error) });
                }
                tracing::info!("Run `slowhand resume {}` to continue", job.job_id);
                report.transition(RunState::Finalized);

                if self.config.general.debug {
                    return Err(error);
                }
                Ok(RunOutcome::Failed {
                    report,
                    error,
                    checkpoint: self.checkpoints.path().to_path_buf(),
                })
            }
        }
    }

    fn execute(
        &self,
        job: &Job,
        context: &mut Context,
        options: RunOptions,
        report: &mut RunReport,
    ) -> Result<()> {
        let total = job.step_count();

        for (index, step) in job.steps.iter().enumerate() {
            report.transition(RunState::Executing(index));
            let identity = step.identity();

            if context.has_step_outputs(&identity) {
                tracing::info!(step = step.name, "Skipping step (already done)");
                report.record(index, step, identity, StepOutcome::Skipped(SkipReason::AlreadyDone));
                continue;
            }

            let params = context.resolve_params(&step.dispatch_params())?;

            if let Some(ref condition) = step.condition {
                let resolve = |path: &str| {
                    context.resolve_variable(path).map_err(|e| ExpressionError::Variable {
                        path: path.to_string(),
                        reason: e.to_string(),
                    })
                };
                let holds = condition.evaluate(&resolve).map_err(|e| ExpressionError::Invalid {
                    expression: condition.text().to_string(),
                    source: Box::new(e),
                })?;
                if !holds {
                    tracing::info!(step = step.name, condition = condition.text(), "Skipping step (condition is false)");
                    report.record(index, step, identity, StepOutcome::Skipped(SkipReason::ConditionFalse));
                    continue;
                }
            }

            let action = self.registry.get(step.action_name())?;
            tracing::info!(
                step = step.name,
                action = step.action_name(),
                "Running step {}/{}",
                index + 1,
                total
            );
            let outputs = action.run(&params, context, options.dry_run)?;
            context.save_step_outputs(&identity, outputs.clone())?;
            report.record(index, step, identity, StepOutcome::Ran(outputs));
        }

        Ok(())
    }
}
