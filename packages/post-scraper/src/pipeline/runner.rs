//! The stage state machine.
//!
//! [`StageRunner`] drives a [`JobState`] through the fixed stage sequence.
//! Every stage mutates the state one unit of work at a time and asks the
//! [`ChainSupervisor`] after each unit whether to hand over to a successor
//! process, so a checkpoint taken at any of those points resumes exactly
//! where this process stopped.
//!
//! All errors surface here as [`JobError`]; [`StageRunner::run`] is the one
//! place that decides how a failure is reported and whether the job can be
//! resumed.

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapters::ForumAdapter;
use crate::error::{ChainError, ErrorContext, FetchResult, JobError, JobResult};
use crate::fetch::FetchClient;
use crate::pipeline::chain::{ChainSupervisor, ContinuationCommand, DetachedLauncher};
use crate::stores::{Checkpointer, JsonOutputWriter, ResumableMarker, StatusSink, Terminal};
use crate::traits::notifier::{truncate_utf8, Escalation, LogNotifier, Notifier};
use crate::traits::{OutputWriter, ProcessLauncher};
use crate::types::paths::JobPaths;
use crate::types::state::{JobState, Stage};

/// Bytes of the last fetched page kept for error reports.
const HTML_EXCERPT_BYTES: usize = 4_000;

/// How a stage body ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageFlow {
    /// Stage finished; advance to the next one
    Done,
    /// A successor process took over mid-stage
    Chained,
}

/// How a process ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every stage ran
    Finished,
    /// A successor process was launched to continue the job
    Chained,
}

/// Per-process flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Log in before the first stage (when credentials are set)
    pub login: bool,

    /// Advance the in-stage cursor by one unit before resuming
    pub skip_unit: bool,
}

/// A fetched page.
#[derive(Debug, Clone)]
pub(crate) struct Page {
    pub html: String,
    pub redirected_to: Option<String>,
}

/// Runs a job's stages in one process.
pub struct StageRunner {
    pub(crate) state: JobState,
    pub(crate) adapter: Box<dyn ForumAdapter>,
    pub(crate) client: FetchClient,
    pub(crate) paths: JobPaths,
    pub(crate) status: StatusSink,
    pub(crate) output: Box<dyn OutputWriter>,
    pub(crate) notifier: Box<dyn Notifier>,
    checkpointer: Checkpointer,
    marker: ResumableMarker,
    chain: ChainSupervisor,
    continuation: ContinuationCommand,
    launcher: Box<dyn ProcessLauncher>,
    options: RunOptions,
    last_html: Option<String>,
    run_id: Uuid,
}

impl StageRunner {
    /// Create a runner with the default collaborators: JSON output, log
    /// notifier and detached continuation processes.
    pub fn new(
        state: JobState,
        adapter: Box<dyn ForumAdapter>,
        client: FetchClient,
        paths: JobPaths,
        continuation: ContinuationCommand,
    ) -> Self {
        let status = StatusSink::new(&paths, state.created_at);
        let chain = ChainSupervisor::new(state.chain_deadline_seconds);
        Self {
            checkpointer: Checkpointer::new(&paths.checkpoint),
            marker: ResumableMarker::new(&paths.resumable_marker),
            status,
            chain,
            state,
            adapter,
            client,
            paths,
            continuation,
            output: Box::new(JsonOutputWriter::new()),
            notifier: Box::new(LogNotifier),
            launcher: Box::new(DetachedLauncher),
            options: RunOptions::default(),
            last_html: None,
            run_id: Uuid::now_v7(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_output(mut self, output: Box<dyn OutputWriter>) -> Self {
        self.output = output;
        self
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_launcher(mut self, launcher: Box<dyn ProcessLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    /// Suppress progress lines in the status file.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.status = self.status.quiet(quiet);
        self
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn into_state(self) -> JobState {
        self.state
    }

    pub fn fetch_client(&self) -> &FetchClient {
        &self.client
    }

    /// Run stages until the job finishes, chains, or fails.
    ///
    /// Failures are reported (status file, admin file, notifier) before
    /// being returned; a resumable failure also leaves a checkpoint and the
    /// resumability marker behind.
    pub async fn run(&mut self) -> JobResult<RunOutcome> {
        info!(
            job_id = %self.state.job_id,
            run_id = %self.run_id,
            stage = %self.state.stage,
            chain_budget_secs = self.chain.budget().as_secs(),
            "Job process starting"
        );
        match self.drive().await {
            Ok(RunOutcome::Finished) => {
                self.status.terminal(Terminal::Done);
                Ok(RunOutcome::Finished)
            }
            Ok(RunOutcome::Chained) => Ok(RunOutcome::Chained),
            Err(JobError::Cancelled) => {
                self.status.terminal(Terminal::Cancelled);
                Err(JobError::Cancelled)
            }
            Err(err) => Err(self.escalate(err).await),
        }
    }

    async fn drive(&mut self) -> JobResult<RunOutcome> {
        if self.options.login {
            self.login().await?;
        }
        if self.options.skip_unit {
            self.skip_unit();
        }

        while !self.state.is_finished() {
            let stage = self.state.stage;
            self.status.progress(format!("Stage {}", stage));
            match self.run_stage(stage).await? {
                StageFlow::Done => {
                    let completed = self.state.advance_stage();
                    self.adapter.on_stage_complete(completed, &mut self.state);
                    debug!(completed = %completed, next = %self.state.stage, "Stage complete");
                    self.checkpoint_best_effort();
                }
                StageFlow::Chained => return Ok(RunOutcome::Chained),
            }
        }
        Ok(RunOutcome::Finished)
    }

    async fn run_stage(&mut self, stage: Stage) -> JobResult<StageFlow> {
        match stage {
            Stage::InitUserSearch => self.init_user_search().await,
            Stage::UserPostSearch => self.user_post_search().await,
            Stage::PostsRetrieval => self.posts_retrieval().await,
            Stage::ExtractPerThreadInfo => self.extract_thread_info().await,
            Stage::TopicPostSort => Ok(self.topic_post_sort()),
            Stage::HandleMissingPosts => Ok(self.handle_missing_posts()),
            Stage::DownloadFiles => self.download_files().await,
            Stage::InitForums => Ok(self.init_forums()),
            Stage::ForumPagination => self.forum_pagination().await,
            Stage::TopicPagination => self.topic_pagination().await,
            Stage::WriteOutput => self.write_output(),
            Stage::ErrorSummaryNotification => Ok(self.notify_errors().await),
            Stage::Finished => Ok(StageFlow::Done),
        }
    }

    /// Advance the current stage's cursor by one unit of work.
    fn skip_unit(&mut self) {
        let skipped = match self.state.stage {
            Stage::UserPostSearch => self.skip_search_page(),
            Stage::PostsRetrieval => self.skip_post(),
            Stage::ExtractPerThreadInfo => self.skip_thread_info(),
            Stage::DownloadFiles => self.skip_download(),
            Stage::ForumPagination => self.skip_forum(),
            Stage::TopicPagination => self.skip_topic(),
            _ => None,
        };
        match skipped {
            Some(unit) => self.status.progress(format!("Skipped {}", unit)),
            None => warn!(stage = %self.state.stage, "Nothing to skip in this stage"),
        }
    }

    // ---- shared helpers for stage bodies ----

    /// Fetch a page, remembering it for error reports and picking up the
    /// board title while it is still unknown.
    pub(crate) async fn fetch_page(&mut self, url: &str) -> FetchResult<Page> {
        let response = self.client.fetch(url).await?;
        Ok(self.note_page(response.text(), response.redirected_to))
    }

    /// Submit a form, treating the response like [`Self::fetch_page`].
    pub(crate) async fn post_page(
        &mut self,
        url: &str,
        fields: Vec<(String, String)>,
    ) -> FetchResult<Page> {
        let response = self.client.post_form(url, fields).await?;
        Ok(self.note_page(response.text(), response.redirected_to))
    }

    fn note_page(&mut self, html: String, redirected_to: Option<String>) -> Page {
        if self.state.settings.board_title.is_none() {
            if let Some(title) = self.adapter.board_title(&html) {
                debug!(board_title = %title, "Board title found");
                self.state.settings.board_title = Some(title);
            }
        }
        self.last_html = Some(truncate_utf8(&html, HTML_EXCERPT_BYTES).to_string());
        Page {
            html,
            redirected_to,
        }
    }

    /// Hand over to a successor process when the time budget is spent.
    ///
    /// Returns `true` when the caller must stop its stage immediately.
    pub(crate) fn maybe_chain(&mut self) -> JobResult<bool> {
        if !self.chain.should_chain() {
            return Ok(false);
        }
        let stage = self.state.stage;
        info!(
            stage = %stage,
            elapsed_secs = self.chain.elapsed().as_secs(),
            "Chain budget spent, handing over to a new process"
        );

        self.client
            .persist_cookies()
            .map_err(|e| JobError::resumable(stage, ChainError::Cookies(e).to_string()))?;
        self.checkpointer
            .save(&self.state)
            .map_err(|e| JobError::resumable(stage, ChainError::from(e).to_string()))?;
        // The successor owns the status file once it starts
        self.status.progress("Continuing in a new process");
        self.continuation
            .launch(self.launcher.as_ref())
            .map_err(|e| JobError::resumable(stage, e.to_string()))?;

        self.chain.mark_chained();
        Ok(true)
    }

    /// Save a checkpoint outside of chaining; failure is only logged.
    fn checkpoint_best_effort(&self) {
        if let Err(e) = self.checkpointer.save(&self.state) {
            warn!(error = %e, "Failed to save checkpoint");
        }
    }

    /// Report a failure, checkpointing first when it is resumable.
    async fn escalate(&mut self, err: JobError) -> JobError {
        let err = match err {
            JobError::ResumableFatal(ctx) => self.preserve_for_resume(ctx),
            other => other,
        };

        let settings = self.state.settings.redacted_summary();
        if let Some(escalation) = Escalation::from_job_error(&err, &self.state.job_id, settings) {
            let escalation = escalation.with_html_excerpt(self.last_html.take());
            self.status.fatal(err.to_string());
            self.status.admin(&escalation.render());
            self.notifier.notify(&escalation).await;
        }

        let terminal = match err {
            JobError::ResumableFatal(_) => Terminal::FailedResumable,
            _ => Terminal::Failed,
        };
        self.status.terminal(terminal);
        err
    }

    fn preserve_for_resume(&mut self, ctx: ErrorContext) -> JobError {
        if let Err(e) = self.client.persist_cookies() {
            warn!(error = %e, "Failed to persist cookies for resume");
        }
        if let Err(e) = self.checkpointer.save(&self.state) {
            return JobError::Fatal(ErrorContext {
                message: format!("{} (checkpoint could not be saved: {})", ctx.message, e),
                ..ctx
            });
        }
        if let Err(e) = self.marker.set() {
            warn!(path = %self.marker.path().display(), error = %e, "Failed to set resumable marker");
        }
        JobError::ResumableFatal(ctx)
    }
}
