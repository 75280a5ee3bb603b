//! Self-continuation: deciding when to hand a job to a fresh process, and
//! building the command that process is started with.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

use crate::error::ChainError;
use crate::traits::launcher::ProcessLauncher;
use crate::types::paths::JobTarget;

/// Chain budget when neither an explicit budget nor a host limit is known.
pub const FALLBACK_CHAIN_SECONDS: u64 = 240;

/// Seconds a process may work before chaining.
///
/// A positive `chain_seconds` wins; otherwise 3/4 of a positive host
/// execution limit; otherwise [`FALLBACK_CHAIN_SECONDS`].
pub fn chain_budget(chain_seconds: i64, max_execution_seconds: Option<u64>) -> u64 {
    if chain_seconds > 0 {
        return chain_seconds as u64;
    }
    match max_execution_seconds {
        Some(max) if max > 0 => (max * 3 / 4).max(1),
        _ => FALLBACK_CHAIN_SECONDS,
    }
}

/// Tracks this process's lifetime against the chain budget.
#[derive(Debug)]
pub struct ChainSupervisor {
    started: Instant,
    budget: Duration,
    chained: bool,
}

impl ChainSupervisor {
    pub fn new(budget_seconds: u64) -> Self {
        Self {
            started: Instant::now(),
            budget: Duration::from_secs(budget_seconds),
            chained: false,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Whether the budget is spent and no successor has been started yet.
    pub fn should_chain(&self) -> bool {
        !self.chained && self.elapsed() > self.budget
    }

    pub fn mark_chained(&mut self) {
        self.chained = true;
    }

    pub fn has_chained(&self) -> bool {
        self.chained
    }
}

/// Builder for the argument vector of a continuation process.
///
/// The CLI accepts exactly these arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationCommand {
    program: PathBuf,
    target: JobTarget,
    chained: bool,
    relogin: bool,
    skip_unit: bool,
    quiet: bool,
    debug: bool,
}

impl ContinuationCommand {
    /// Continuation of `target`, run by `program`.
    pub fn new(program: impl Into<PathBuf>, target: JobTarget) -> Self {
        Self {
            program: program.into(),
            target,
            chained: true,
            relogin: false,
            skip_unit: false,
            quiet: false,
            debug: false,
        }
    }

    pub fn relogin(mut self, relogin: bool) -> Self {
        self.relogin = relogin;
        self
    }

    pub fn skip_unit(mut self, skip_unit: bool) -> Self {
        self.skip_unit = skip_unit;
        self
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn target(&self) -> &JobTarget {
        &self.target
    }

    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["run".to_string()];
        match &self.target {
            JobTarget::Token(token) => {
                args.push("--token".into());
                args.push(token.clone());
            }
            JobTarget::Files {
                settings,
                output_dir,
            } => {
                args.push("--settings".into());
                args.push(settings.display().to_string());
                args.push("--output-dir".into());
                args.push(output_dir.display().to_string());
                if self.quiet {
                    args.push("--quiet".into());
                }
            }
        }
        let flags = [
            (self.chained, "--chained"),
            (self.relogin, "--relogin"),
            (self.skip_unit, "--skip-unit"),
            (self.debug, "--debug"),
        ];
        args.extend(
            flags
                .into_iter()
                .filter(|(on, _)| *on)
                .map(|(_, flag)| flag.to_string()),
        );
        args
    }

    /// Start the continuation through `launcher`.
    pub fn launch(&self, launcher: &dyn ProcessLauncher) -> Result<(), ChainError> {
        launcher.launch(&self.program, &self.args())
    }
}

/// Starts a detached child with null stdio and does not wait for it.
#[derive(Debug, Default, Clone)]
pub struct DetachedLauncher;

impl ProcessLauncher for DetachedLauncher {
    fn launch(&self, program: &Path, args: &[String]) -> Result<(), ChainError> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // New process group, so the child outlives our session
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let child = cmd.spawn().map_err(|source| ChainError::Launch {
            program: program.display().to_string(),
            source,
        })?;
        info!(pid = child.id(), program = %program.display(), args = ?args, "Continuation process started");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_budget() {
        assert_eq!(chain_budget(30, Some(600)), 30);
        assert_eq!(chain_budget(-1, Some(600)), 450);
        assert_eq!(chain_budget(-1, Some(1)), 1);
        assert_eq!(chain_budget(-1, Some(0)), FALLBACK_CHAIN_SECONDS);
        assert_eq!(chain_budget(0, None), FALLBACK_CHAIN_SECONDS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervisor_triggers_once_budget_is_exceeded() {
        let mut supervisor = ChainSupervisor::new(1);
        assert!(!supervisor.should_chain());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!supervisor.should_chain());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(supervisor.should_chain());

        supervisor.mark_chained();
        assert!(!supervisor.should_chain());
        assert!(supervisor.has_chained());
    }

    #[test]
    fn test_token_continuation_args() {
        let cmd = ContinuationCommand::new("/usr/bin/post-scraper", JobTarget::Token("abc".into()))
            .debug(true);
        assert_eq!(cmd.args(), vec!["run", "--token", "abc", "--chained", "--debug"]);
    }

    #[test]
    fn test_file_continuation_args() {
        let cmd = ContinuationCommand::new(
            "/usr/bin/post-scraper",
            JobTarget::Files {
                settings: PathBuf::from("/jobs/alice.settings.txt"),
                output_dir: PathBuf::from("/out"),
            },
        )
        .quiet(true)
        .relogin(true)
        .skip_unit(true);
        assert_eq!(
            cmd.args(),
            vec![
                "run",
                "--settings",
                "/jobs/alice.settings.txt",
                "--output-dir",
                "/out",
                "--quiet",
                "--chained",
                "--relogin",
                "--skip-unit",
            ]
        );
    }

    #[test]
    fn test_quiet_is_ignored_for_token_jobs() {
        let cmd = ContinuationCommand::new("p", JobTarget::Token("t".into())).quiet(true);
        assert!(!cmd.args().contains(&"--quiet".to_string()));
    }

    #[test]
    fn test_detached_launch_of_missing_program_fails() {
        let err = DetachedLauncher
            .launch(Path::new("/nonexistent/post-scraper"), &[])
            .unwrap_err();
        assert!(matches!(err, ChainError::Launch { .. }));
    }
}
