//! Slowhand - a declarative job runner.
//!
//! Runs YAML jobs step by step and resumes failed runs from a checkpoint.

use std::io;
use std::process::ExitCode;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use slowhand::actions::ActionRegistry;
use slowhand::core::{run_command, Config};
use slowhand::engine::{RunOptions, RunOutcome, RunReport, Runner, SkipReason, StepOutcome};
use slowhand::job::{discover_jobs, find_job, parse_assignments};

/// Declarative job runner with checkpoint and resume
#[derive(Parser)]
#[command(name = "slowhand")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Debug mode: propagate failures and keep scratch directories
    #[arg(long, global = true, env = "SLOWHAND_DEBUG")]
    debug: bool,

    /// Search this directory for jobs instead of the configured ones
    #[arg(long, global = true, env = "SLOWHAND_JOBS_DIR")]
    jobs_dir: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available jobs
    Jobs,

    /// Run a job from the start
    Run {
        /// Job id (file name without extension)
        job: String,

        /// Input assignments (name=value)
        #[arg(short, long = "input", value_name = "NAME=VALUE")]
        inputs: Vec<String>,

        /// Ask actions to skip irreversible effects
        #[arg(long)]
        dry_run: bool,

        /// Keep the scratch directory after a successful run
        #[arg(long)]
        keep: bool,
    },

    /// Resume the last failed run of a job
    Resume {
        /// Job id
        job: String,

        /// Ask actions to skip irreversible effects
        #[arg(long)]
        dry_run: bool,

        /// Keep the scratch directory after a successful run
        #[arg(long)]
        keep: bool,
    },

    /// Show configuration
    Config {
        /// Show config file path
        #[arg(long)]
        path: bool,
    },

    /// Show versions of slowhand and the tools it drives
    Info,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = Config::load()?;
    config.general.debug |= cli.debug;
    if let Some(dir) = cli.jobs_dir {
        config.jobs.dirs = vec![dir];
    }

    // Setup logging
    let filter = if cli.verbose || config.general.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Jobs => cmd_jobs(&config),
        Commands::Run { job, inputs, dry_run, keep } => {
            cmd_run(config, &job, &inputs, RunOptions { dry_run, clean: !keep })
        }
        Commands::Resume { job, dry_run, keep } => {
            cmd_resume(config, &job, RunOptions { dry_run, clean: !keep })
        }
        Commands::Config { path } => cmd_config(&config, path),
        Commands::Info => cmd_info(),
        Commands::Completions { shell } => {
            cmd_completions(shell);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// List discovered jobs.
fn cmd_jobs(config: &Config) -> Result<ExitCode> {
    let jobs = discover_jobs(config);
    println!("Found {} jobs", jobs.len());
    for job in &jobs {
        let source = job.source.as_ref().map(|p| p.display().to_string()).unwrap_or_default();
        println!("  - {} : {} @ {}", job.job_id, job.name, source);
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_run(config: Config, job_id: &str, inputs: &[String], options: RunOptions) -> Result<ExitCode> {
    let job = find_job(&config, job_id)?;
    let inputs = parse_assignments(inputs)?;
    let runner = Runner::new(config, ActionRegistry::with_builtins());
    let outcome = runner.run(&job, &inputs, options)?;
    Ok(report_outcome(&outcome))
}

fn cmd_resume(config: Config, job_id: &str, options: RunOptions) -> Result<ExitCode> {
    let job = find_job(&config, job_id)?;
    let runner = Runner::new(config, ActionRegistry::with_builtins());
    let outcome = runner.resume(&job, options)?;
    Ok(report_outcome(&outcome))
}

fn print_steps(report: &RunReport) {
    for record in &report.steps {
        let status = match record.outcome {
            StepOutcome::Ran(_) => "done",
            StepOutcome::Skipped(SkipReason::AlreadyDone) => "skipped (already done)",
            StepOutcome::Skipped(SkipReason::ConditionFalse) => "skipped (condition false)",
        };
        println!("  {}. {} - {}", record.index + 1, record.name, status);
    }
}

fn report_outcome(outcome: &RunOutcome) -> ExitCode {
    match outcome {
        RunOutcome::Succeeded(report) => {
            println!("Job {} completed (run {})", report.job_id, report.run_id);
            print_steps(report);
            ExitCode::SUCCESS
        }
        RunOutcome::Failed { report, error, checkpoint } => {
            println!("Job {} failed: {error}", report.job_id);
            print_steps(report);
            println!("Scratch directory kept at {}", report.run_dir.display());
            println!("Checkpoint saved to {}", checkpoint.display());
            ExitCode::FAILURE
        }
    }
}

/// Show configuration.
fn cmd_config(config: &Config, show_path: bool) -> Result<ExitCode> {
    if show_path {
        if let Some(path) = Config::config_dir() {
            println!("{}", path.join("config.toml").display());
        }
        return Ok(ExitCode::SUCCESS);
    }

    let toml = toml::to_string_pretty(config)?;
    println!("{toml}");
    println!("# checkpoint: {}", config.checkpoint_path().display());

    Ok(ExitCode::SUCCESS)
}

fn cmd_info() -> Result<ExitCode> {
    let tool_version = |program: &str| {
        run_command(&[program, "--version"], None).unwrap_or_else(|e| format!("not available ({e})"))
    };

    println!("slowhand\n    version {}\n", slowhand::VERSION);
    println!("git\n{}\n", textwrap::indent(&tool_version("git"), "    "));
    println!("gh\n{}\n", textwrap::indent(&tool_version("gh"), "    "));
    Ok(ExitCode::SUCCESS)
}

/// Generate shell completions.
fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "slowhand", &mut io::stdout());
}
