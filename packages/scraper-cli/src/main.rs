//! post-scraper: runs, resumes and cancels forum scraping jobs.
//!
//! Exit codes: 0 when a job finished, chained or was cancelled; 1 on a
//! fatal error; 2 when the job stopped but can be resumed.

mod cli;
mod config;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands};
use config::Config;
use post_scraper::pipeline::DetachedLauncher;
use post_scraper::{
    cancel, prepare, report_setup_failure, resume, LaunchFlags, ResumeOutcome, RunOutcome,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let default_filter = if cli.command.debug() {
        "info,post_scraper=debug"
    } else {
        "info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    match execute(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = format!("{:#}", e), "post-scraper failed");
            ExitCode::from(1)
        }
    }
}

async fn execute(command: Commands) -> Result<ExitCode> {
    let config = Config::from_env()?;
    let engine = config.engine()?;

    match command {
        Commands::Run {
            target,
            quiet,
            chained,
            relogin,
            skip_unit,
            debug,
        } => {
            let target = target.target()?;
            let flags = LaunchFlags {
                chained,
                relogin,
                skip_unit,
                quiet,
                debug,
            };
            let mut runner = match prepare(&target, &engine, flags) {
                Ok(runner) => runner,
                Err(e) => {
                    tracing::error!(error = %e, "Job could not be started");
                    report_setup_failure(&target, &engine, &e);
                    return Ok(ExitCode::from(1));
                }
            };
            match runner.run().await {
                Ok(RunOutcome::Finished) => tracing::info!("Job finished"),
                Ok(RunOutcome::Chained) => tracing::info!("Job continues in a new process"),
                Err(e) => {
                    tracing::warn!(error = %e, "Job process stopped");
                    return Ok(ExitCode::from(e.exit_code() as u8));
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Resume { target, skip_unit } => {
            let target = target.target()?;
            let outcome = resume(&target, &engine, skip_unit, &DetachedLauncher)
                .context("failed to resume job")?;
            match outcome {
                ResumeOutcome::Launched => {
                    println!("Resume started");
                    Ok(ExitCode::SUCCESS)
                }
                ResumeOutcome::NotResumable => {
                    println!("Job is not resumable");
                    Ok(ExitCode::from(1))
                }
            }
        }
        Commands::Cancel { target } => {
            let target = target.target()?;
            cancel(&target, &engine).context("failed to request cancellation")?;
            println!("Cancellation requested");
            Ok(ExitCode::SUCCESS)
        }
    }
}
