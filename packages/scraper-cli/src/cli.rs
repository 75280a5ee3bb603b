//! Command-line interface.
//!
//! `run` accepts exactly the arguments a continuation command carries, so a
//! chained process is started the same way as the first one.

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use post_scraper::JobTarget;

#[derive(Parser, Debug)]
#[command(name = "post-scraper")]
#[command(version, about = "Scrape a forum member's posts, or whole sub-forums")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Which job to act on.
#[derive(Args, Debug)]
pub struct TargetArgs {
    /// Job token; files live in SCRAPER_DATA_DIR
    #[arg(long, conflicts_with_all = ["settings", "output_dir"], required_unless_present = "settings")]
    pub token: Option<String>,

    /// Settings file of a job run outside the data directory
    #[arg(long, requires = "output_dir")]
    pub settings: Option<PathBuf>,

    /// Directory for the output, status and error files
    #[arg(long, requires = "settings")]
    pub output_dir: Option<PathBuf>,
}

impl TargetArgs {
    pub fn target(&self) -> Result<JobTarget> {
        match (&self.token, &self.settings, &self.output_dir) {
            (Some(token), None, None) => Ok(JobTarget::Token(token.clone())),
            (None, Some(settings), Some(output_dir)) => Ok(JobTarget::Files {
                settings: settings.clone(),
                output_dir: output_dir.clone(),
            }),
            _ => bail!("give either --token or both --settings and --output-dir"),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a job (or continue one with --chained)
    Run {
        #[command(flatten)]
        target: TargetArgs,

        /// Only write the final status line
        #[arg(long, requires = "settings", conflicts_with = "token")]
        quiet: bool,

        /// Continue from the job's checkpoint
        #[arg(long)]
        chained: bool,

        /// Log in again before continuing
        #[arg(long, requires = "chained")]
        relogin: bool,

        /// Skip the unit of work the previous process stopped at
        #[arg(long, requires = "chained")]
        skip_unit: bool,

        /// Verbose logging
        #[arg(long)]
        debug: bool,
    },

    /// Resume a job that stopped with a resumable error
    Resume {
        #[command(flatten)]
        target: TargetArgs,

        /// Skip the unit of work the job failed on
        #[arg(long)]
        skip_unit: bool,
    },

    /// Ask a running job to stop
    Cancel {
        #[command(flatten)]
        target: TargetArgs,
    },
}

impl Commands {
    pub fn debug(&self) -> bool {
        matches!(self, Commands::Run { debug: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use post_scraper::ContinuationCommand;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("post-scraper").chain(args.iter().copied()))
    }

    #[test]
    fn test_run_with_token() {
        let cli = parse(&["run", "--token", "abc", "--chained", "--relogin"]).unwrap();
        match cli.command {
            Commands::Run {
                target,
                chained,
                relogin,
                skip_unit,
                ..
            } => {
                assert_eq!(target.target().unwrap(), JobTarget::Token("abc".into()));
                assert!(chained && relogin && !skip_unit);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_target_forms_are_exclusive() {
        assert!(parse(&["run"]).is_err());
        assert!(parse(&["run", "--settings", "s.txt"]).is_err());
        assert!(parse(&["run", "--token", "a", "--settings", "s.txt", "--output-dir", "o"]).is_err());
        assert!(parse(&["cancel", "--settings", "s.txt", "--output-dir", "o"]).is_ok());
    }

    #[test]
    fn test_quiet_needs_file_mode() {
        assert!(parse(&["run", "--token", "a", "--quiet"]).is_err());
        assert!(parse(&["run", "--token", "a", "--chained", "--quiet"]).is_err());
        assert!(parse(&["run", "--quiet"]).is_err());
        assert!(parse(&["run", "--settings", "s.txt", "--output-dir", "o", "--quiet"]).is_ok());
    }

    #[test]
    fn test_accepts_every_continuation_command() {
        let targets = [
            JobTarget::Token("abc".into()),
            JobTarget::Files {
                settings: "/jobs/j.settings.txt".into(),
                output_dir: "/out".into(),
            },
        ];
        for target in targets {
            let command = ContinuationCommand::new("/bin/post-scraper", target.clone())
                .relogin(true)
                .skip_unit(true)
                .quiet(true)
                .debug(true);
            let args: Vec<String> = command.args();
            let cli = Cli::try_parse_from(std::iter::once("post-scraper".to_string()).chain(args))
                .unwrap();
            match cli.command {
                Commands::Run {
                    target: parsed,
                    chained,
                    relogin,
                    skip_unit,
                    debug,
                    ..
                } => {
                    assert_eq!(parsed.target().unwrap(), target);
                    assert!(chained && relogin && skip_unit && debug);
                }
                other => panic!("unexpected command {:?}", other),
            }
        }
    }
}
