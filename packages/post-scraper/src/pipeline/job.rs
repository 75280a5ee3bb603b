//! Job entry points: building a runner for a process, manual resume, cancel.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::adapters::adapter_for;
use crate::error::{SetupError, SetupResult};
use crate::fetch::{request_cancellation, CancellationWatcher, FetchClient, RateLimiter, ReqwestTransport};
use crate::pipeline::chain::ContinuationCommand;
use crate::pipeline::runner::{RunOptions, StageRunner};
use crate::security::UrlValidator;
use crate::stores::{Checkpointer, ResumableMarker, StatusSink, Terminal};
use crate::traits::ProcessLauncher;
use crate::types::paths::{JobPaths, JobTarget};
use crate::types::settings::Settings;
use crate::types::state::JobState;

/// Process-wide configuration shared by every job this binary runs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding token-mode job files
    pub data_dir: PathBuf,

    /// Seconds a process may work before chaining
    pub chain_budget_seconds: u64,

    pub user_agent: String,

    /// Per-request timeout
    pub request_timeout: Duration,

    /// Program started for continuation processes
    pub executable: PathBuf,

    /// SSRF rules applied to every fetched URL
    pub validator: UrlValidator,
}

/// Flags given to `run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaunchFlags {
    pub chained: bool,
    pub relogin: bool,
    pub skip_unit: bool,
    pub quiet: bool,
    pub debug: bool,
}

/// Result of a manual resume request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// A continuation process was started
    Launched,
    /// No resumable failure is pending for the job
    NotResumable,
}

/// Build the runner for one process of a job.
///
/// A fresh job reads its settings file; a chained one restores the
/// checkpoint and the cookie jar its predecessor left behind.
pub fn prepare(
    target: &JobTarget,
    config: &EngineConfig,
    flags: LaunchFlags,
) -> SetupResult<StageRunner> {
    let paths = JobPaths::resolve(target, &config.data_dir)?;

    let state = if flags.chained {
        Checkpointer::new(&paths.checkpoint).load()?
    } else {
        let settings = Settings::from_file(&paths.settings, &config.validator)?;
        info!(job_id = %paths.job_id, settings = %settings.redacted_summary(), "New job");
        JobState::new(
            paths.job_id.clone(),
            settings,
            &paths.cookies,
            config.chain_budget_seconds,
        )
    };

    let transport = ReqwestTransport::open(
        &state.cookie_store_ref,
        &config.user_agent,
        config.request_timeout,
        !flags.chained,
    )?;
    let client = FetchClient::new(
        Box::new(transport),
        config.validator.clone(),
        RateLimiter::new(Duration::from_secs(state.settings.delay_seconds)),
        CancellationWatcher::new(&paths.cancel_marker),
    );
    let adapter = adapter_for(state.settings.forum_type)?;

    let file_mode = matches!(target, JobTarget::Files { .. });
    let continuation = ContinuationCommand::new(&config.executable, target.clone())
        .quiet(flags.quiet && file_mode)
        .debug(flags.debug || state.settings.debug);
    let options = RunOptions {
        login: !flags.chained || flags.relogin,
        skip_unit: flags.chained && flags.skip_unit,
    };

    Ok(StageRunner::new(state, adapter, client, paths, continuation)
        .with_options(options)
        .quiet(flags.quiet && file_mode))
}

/// Start a continuation of a job that stopped with a resumable failure.
///
/// The resumability marker is claimed before launching so that two resume
/// requests never both start a process; it is put back if the launch fails.
pub fn resume(
    target: &JobTarget,
    config: &EngineConfig,
    skip_unit: bool,
    launcher: &dyn ProcessLauncher,
) -> SetupResult<ResumeOutcome> {
    let paths = JobPaths::resolve(target, &config.data_dir)?;
    let marker = ResumableMarker::new(&paths.resumable_marker);
    let claimed = marker.claim().map_err(|source| SetupError::Marker {
        path: paths.resumable_marker.clone(),
        source,
    })?;
    if !claimed {
        return Ok(ResumeOutcome::NotResumable);
    }

    let command = ContinuationCommand::new(&config.executable, target.clone())
        .relogin(true)
        .skip_unit(skip_unit);
    if let Err(e) = command.launch(launcher) {
        if let Err(restore) = marker.set() {
            warn!(path = %marker.path().display(), error = %restore, "Failed to restore resumable marker");
        }
        return Err(e.into());
    }

    info!(job_id = %paths.job_id, skip_unit, "Resume launched");
    Ok(ResumeOutcome::Launched)
}

/// Ask a running job to stop at its next fetch.
pub fn cancel(target: &JobTarget, config: &EngineConfig) -> SetupResult<()> {
    let paths = JobPaths::resolve(target, &config.data_dir)?;
    request_cancellation(&paths.cancel_marker).map_err(|source| SetupError::Marker {
        path: paths.cancel_marker.clone(),
        source,
    })?;
    info!(job_id = %paths.job_id, "Cancellation requested");
    Ok(())
}

/// Record a failure that happened before any stage ran.
///
/// Returns `false` when the job's files could not even be located.
pub fn report_setup_failure(target: &JobTarget, config: &EngineConfig, err: &SetupError) -> bool {
    let Ok(paths) = JobPaths::resolve(target, &config.data_dir) else {
        return false;
    };
    let status = StatusSink::new(&paths, Utc::now());
    status.fatal(err.to_string());
    status.terminal(Terminal::Failed);
    true
}
