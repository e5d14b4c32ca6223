pub mod cli;
pub mod command;
pub mod config;
pub mod environment;
pub mod error;
pub mod executor;
pub mod image;
pub mod registry;
pub mod scheduled_task;
pub mod settings;
pub mod snapshot;

pub use error::SnapshotError;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{FmtSubscriber, filter::LevelFilter};

use crate::executor::CommandExecutor;
use crate::registry::TurboHub;
use crate::scheduled_task::ScheduledTaskRunner;
use crate::snapshot::{RunOutcome, Services};

pub fn init_logging(log_level: cli::LogLevel) -> Result<()> {
    let filter = match log_level {
        cli::LogLevel::Trace => LevelFilter::TRACE,
        cli::LogLevel::Debug => LevelFilter::DEBUG,
        cli::LogLevel::Info => LevelFilter::INFO,
        cli::LogLevel::Warn => LevelFilter::WARN,
        cli::LogLevel::Error => LevelFilter::ERROR,
    };

    tracing::subscriber::set_global_default(
        FmtSubscriber::builder().with_max_level(filter).finish(),
    )
    .context("failed to set global default tracing subscriber")
}

/// Loads and validates a job file, then runs the snapshot workflow.
///
/// Configuration problems are returned as errors before any VM exists.
/// Everything after that is reported through the returned [`RunOutcome`].
pub fn run_snapshot(
    opts: &cli::SnapshotArgs,
    executor: Arc<dyn CommandExecutor>,
) -> Result<RunOutcome> {
    let profile = config::load_profile(opts.file.as_path())
        .with_context(|| format!("failed to load profile from {}", opts.file))?;
    profile.validate().context("profile validation failed")?;

    let job = profile.job();
    let context = profile.build_context(opts.current_result, opts.dry_run);
    let tasks = ScheduledTaskRunner::new(executor.clone(), profile.scheduler.options());
    let registry = TurboHub::new(executor.clone(), job.turbo_path.clone());
    let services = Services {
        tasks: &tasks,
        executor: executor.as_ref(),
        registry: &registry,
    };

    Ok(snapshot::perform(&context, &job, &services))
}

pub fn run_validate(opts: &cli::ValidateArgs) -> Result<()> {
    let profile = config::load_profile(opts.file.as_path())?;
    profile.validate().context("profile validation failed")?;
    info!("validation successful:\n{:#?}", profile);
    Ok(())
}
