//! Forum Post Scraper Library
//!
//! Scrapes every post a forum member wrote (or every topic of a set of
//! sub-forums) and hands the collected threads to an output writer.
//!
//! # Design Philosophy
//!
//! A job may run for hours on a host that kills long processes, so the
//! engine is built around three guarantees:
//!
//! - Every unit of work is recorded in a serializable [`JobState`] before
//!   the next one starts
//! - A process hands over to a successor ("chains") when its time budget is
//!   spent, after checkpointing
//! - A failed job that can be continued leaves a checkpoint and a marker so
//!   it can be resumed without repeating finished work
//!
//! # Usage
//!
//! ```rust,ignore
//! use post_scraper::{prepare, EngineConfig, JobTarget, LaunchFlags};
//!
//! let target = JobTarget::Token("a1b2c3".into());
//! let mut runner = prepare(&target, &config, LaunchFlags::default())?;
//! match runner.run().await {
//!     Ok(outcome) => println!("{:?}", outcome),
//!     Err(err) => std::process::exit(err.exit_code()),
//! }
//! ```
//!
//! # Modules
//!
//! - [`pipeline`] - Stage runner, chaining, job entry points
//! - [`fetch`] - HTTP client with retries, redirects, delay and cancellation
//! - [`adapters`] - phpBB and XenForo URL builders and extraction rules
//! - [`stores`] - Checkpoints, status files, markers, JSON output
//! - [`traits`] - Output writer, notifier and process launcher seams
//! - [`types`] - Settings, job state, threads and posts
//! - [`security`] - Credential handling and SSRF protection
//! - [`testing`] - Mock implementations for testing

pub mod adapters;
pub mod error;
pub mod fetch;
pub mod pipeline;
pub mod security;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use adapters::{adapter_for, ForumAdapter, ForumKind, PhpBbAdapter, XenForoAdapter};
pub use error::{
    AdapterError, ChainError, CheckpointError, ErrorContext, FetchError, JobError, JobResult,
    OutputError, SecurityError, SettingsError, SetupError,
};
pub use fetch::{CancellationWatcher, FetchClient, RateLimiter, ReqwestTransport, Transport};
pub use security::{LoginCredentials, UrlValidator};
pub use types::{
    paths::{JobPaths, JobTarget},
    settings::Settings,
    state::{JobState, Stage},
    thread::{Post, Thread},
};

// Re-export pipeline entry points
pub use pipeline::{
    cancel, chain_budget, prepare, report_setup_failure, resume, ContinuationCommand,
    EngineConfig, LaunchFlags, ResumeOutcome, RunOptions, RunOutcome, StageRunner,
};

// Re-export stores and collaborator seams
pub use stores::{Checkpointer, JsonOutputWriter, StatusSink, Terminal};
pub use traits::{Escalation, LogNotifier, Notifier, OutputWriter, ProcessLauncher, Severity};

// Re-export testing utilities
pub use testing::{MemoryOutputWriter, MockTransport, RecordingLauncher, RecordingNotifier};
