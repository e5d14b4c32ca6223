use std::io;
use std::process;
use std::sync::Arc;

use anyhow::Result;
use clap::CommandFactory;
use clap_complete::generate;
use tracing::error;

use spoon_snapshot::cli::{self, Cli};
use spoon_snapshot::executor::RealCommandExecutor;
use spoon_snapshot::snapshot::RunOutcome;

fn main() -> Result<()> {
    let args = cli::parse_args()?;

    let log_level = match &args.command {
        cli::Commands::Snapshot(opts) => opts.log_level,
        cli::Commands::Validate(opts) => opts.log_level,
        cli::Commands::Completions(opts) => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(opts.shell, &mut cmd, name, &mut io::stdout());
            return Ok(());
        }
    };

    spoon_snapshot::init_logging(log_level)?;

    match &args.command {
        cli::Commands::Snapshot(opts) => {
            let executor = Arc::new(RealCommandExecutor {
                dry_run: opts.dry_run,
            });
            match spoon_snapshot::run_snapshot(opts, executor) {
                Ok(RunOutcome::Success) | Ok(RunOutcome::Aborted) => {}
                Ok(RunOutcome::Failed(e)) => {
                    if let Some(stage) = e.stage() {
                        error!("{} stage failed", stage);
                    }
                    process::exit(1);
                }
                Err(e) => {
                    error!("{:#}", e);
                    process::exit(1);
                }
            }
        }
        cli::Commands::Validate(opts) => {
            if let Err(e) = spoon_snapshot::run_validate(opts) {
                error!("{:#}", e);
                process::exit(1);
            }
        }
        cli::Commands::Completions(_) => {}
    }

    Ok(())
}
