//! The job engine.
//!
//! - [`runner`] - the stage state machine and failure escalation
//! - [`user_stages`], [`downloads`], [`forum_stages`], [`report`] - stage bodies
//! - [`login`] - forum login before the first stage of a process
//! - [`chain`] - time budget and continuation processes
//! - [`job`] - building a runner for a process, manual resume, cancel

pub mod chain;
pub mod downloads;
pub mod forum_stages;
pub mod job;
pub mod login;
pub mod report;
pub mod runner;
pub mod user_stages;

pub use chain::{chain_budget, ChainSupervisor, ContinuationCommand, DetachedLauncher, FALLBACK_CHAIN_SECONDS};
pub use downloads::{local_asset_name, resolve_asset_url};
pub use job::{cancel, prepare, report_setup_failure, resume, EngineConfig, LaunchFlags, ResumeOutcome};
pub use runner::{RunOptions, RunOutcome, StageFlow, StageRunner};
pub use user_stages::{UNKNOWN_AUTHOR, UNKNOWN_USER};
