//! Job state: the unit of checkpointing.
//!
//! Everything a job has learned lives in [`JobState`], and nothing else
//! does. Restoring a serialized `JobState` reproduces the exact next fetch
//! the job would have made.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::types::settings::Settings;
use crate::types::thread::{DownloadLedger, ForumProgress, Post, Thread};

/// Fixed, ordered job stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    InitUserSearch,
    UserPostSearch,
    PostsRetrieval,
    ExtractPerThreadInfo,
    TopicPostSort,
    HandleMissingPosts,
    DownloadFiles,
    InitForums,
    ForumPagination,
    TopicPagination,
    WriteOutput,
    ErrorSummaryNotification,
    /// Terminal: the job is done
    Finished,
}

impl Stage {
    /// Position in the stage sequence.
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::InitUserSearch => "init-user-search",
            Stage::UserPostSearch => "user-post-search",
            Stage::PostsRetrieval => "posts-retrieval",
            Stage::ExtractPerThreadInfo => "extract-per-thread-info",
            Stage::TopicPostSort => "topic-post-sort",
            Stage::HandleMissingPosts => "handle-missing-posts",
            Stage::DownloadFiles => "download-files",
            Stage::InitForums => "init-forums",
            Stage::ForumPagination => "forum-pagination",
            Stage::TopicPagination => "topic-pagination",
            Stage::WriteOutput => "write-output",
            Stage::ErrorSummaryNotification => "error-summary-notification",
            Stage::Finished => "finished",
        }
    }

    fn succ(self) -> Stage {
        match self {
            Stage::InitUserSearch => Stage::UserPostSearch,
            Stage::UserPostSearch => Stage::PostsRetrieval,
            Stage::PostsRetrieval => Stage::ExtractPerThreadInfo,
            Stage::ExtractPerThreadInfo => Stage::TopicPostSort,
            Stage::TopicPostSort => Stage::HandleMissingPosts,
            Stage::HandleMissingPosts => Stage::DownloadFiles,
            Stage::DownloadFiles => Stage::InitForums,
            Stage::InitForums => Stage::ForumPagination,
            Stage::ForumPagination => Stage::TopicPagination,
            Stage::TopicPagination => Stage::WriteOutput,
            Stage::WriteOutput => Stage::ErrorSummaryNotification,
            Stage::ErrorSummaryNotification | Stage::Finished => Stage::Finished,
        }
    }

    /// Stages 0 through 6 (single-user scraping).
    pub fn is_user_stage(self) -> bool {
        self <= Stage::DownloadFiles
    }

    /// Stages 7 through 9 (whole-forum scraping).
    pub fn is_forum_stage(self) -> bool {
        (Stage::InitForums..=Stage::TopicPagination).contains(&self)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.ordinal(), self.name())
    }
}

/// Search-results pagination cursor.
///
/// `position` is adapter-defined: a result offset for phpBB, a page number
/// for XenForo.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCursor {
    pub search_id: Option<String>,
    pub position: u32,
}

/// Progress counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Counters {
    pub total_posts: u64,
    pub posts_retrieved: u64,
    pub thread_infos_retrieved: u64,

    /// 1-based number of the next search page
    pub search_page_num: u32,

    pub forum_page_counter: u64,
    pub topic_page_counter: u64,
}

/// Complete, serializable job progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    pub job_id: String,
    pub stage: Stage,
    pub settings: Settings,

    /// Threads keyed by id, in discovery order until sorted
    pub threads: IndexMap<String, Thread>,

    /// Forum mode progress keyed by forum id
    pub forums: IndexMap<String, ForumProgress>,

    pub counters: Counters,

    pub search_cursor: Option<SearchCursor>,

    /// Search to start over from when the forum hands out a new search id
    #[serde(default)]
    pub search_restart: Option<String>,

    /// Threads whose starter post was already looked up in stage 1
    #[serde(default)]
    pub starter_threads: BTreeSet<String>,

    /// Unit of work in flight, for skip-unit resumes
    pub current_thread: Option<String>,
    pub current_forum: Option<String>,
    pub current_topic: Option<String>,

    /// Posts known to be unfetchable
    pub not_found: BTreeSet<String>,

    /// Posts fetched with empty content
    pub empty: BTreeSet<String>,

    pub downloads: DownloadLedger,

    /// Ids minted for threads whose listings carry only a title
    pub synthetic_thread_ids: IndexMap<String, String>,

    /// Cookie jar owned by the fetch client
    pub cookie_store_ref: PathBuf,

    /// When the job was first submitted
    pub created_at: DateTime<Utc>,

    /// When the current process took over the job
    pub started_at: DateTime<Utc>,

    pub chain_deadline_seconds: u64,
}

impl JobState {
    /// Create the initial state for a freshly submitted job.
    pub fn new(
        job_id: impl Into<String>,
        settings: Settings,
        cookie_store_ref: impl Into<PathBuf>,
        chain_deadline_seconds: u64,
    ) -> Self {
        let now = Utc::now();
        let stage = if settings.is_user_mode() {
            Stage::InitUserSearch
        } else {
            Stage::InitForums
        };
        Self {
            job_id: job_id.into(),
            stage,
            settings,
            threads: IndexMap::new(),
            forums: IndexMap::new(),
            counters: Counters::default(),
            search_cursor: None,
            search_restart: None,
            starter_threads: BTreeSet::new(),
            current_thread: None,
            current_forum: None,
            current_topic: None,
            not_found: BTreeSet::new(),
            empty: BTreeSet::new(),
            downloads: DownloadLedger::default(),
            synthetic_thread_ids: IndexMap::new(),
            cookie_store_ref: cookie_store_ref.into(),
            created_at: now,
            started_at: now,
            chain_deadline_seconds,
        }
    }

    fn skips(&self, stage: Stage) -> bool {
        (stage.is_user_stage() && !self.settings.is_user_mode())
            || (stage.is_forum_stage() && !self.settings.is_forum_mode())
    }

    /// Move past the current stage, applying the mode jump rules.
    ///
    /// Returns the stage that was completed.
    pub fn advance_stage(&mut self) -> Stage {
        let completed = self.stage;
        let mut next = completed.succ();
        while next != Stage::Finished && self.skips(next) {
            next = next.succ();
        }
        self.stage = next;
        self.current_thread = None;
        self.current_forum = None;
        self.current_topic = None;
        completed
    }

    pub fn is_finished(&self) -> bool {
        self.stage == Stage::Finished
    }

    /// Thread id holding `post_id`, if any.
    pub fn thread_of_post(&self, post_id: &str) -> Option<&str> {
        self.threads
            .values()
            .find(|t| t.posts.contains_key(post_id))
            .map(|t| t.id.as_str())
    }

    /// Stable id for a thread known only by title.
    pub fn synthetic_thread_id(&mut self, title: &str) -> String {
        let next = format!("t{}", self.synthetic_thread_ids.len() + 1);
        self.synthetic_thread_ids
            .entry(title.to_string())
            .or_insert(next)
            .clone()
    }

    /// Record a post found in a listing. Returns `false` for duplicates.
    pub fn add_post(&mut self, template: Thread, post: Post) -> bool {
        if self.thread_of_post(&post.id).is_some() {
            return false;
        }
        let thread = self
            .threads
            .entry(template.id.clone())
            .or_insert(template);
        thread.posts.insert(post.id.clone(), post);
        true
    }

    /// Whether a post needs no further fetching.
    pub fn is_post_resolved(&self, post: &Post) -> bool {
        post.content.is_some() || self.not_found.contains(&post.id) || self.empty.contains(&post.id)
    }

    /// `(thread id, post id)` for every post still awaiting content.
    pub fn pending_posts(&self) -> Vec<(String, String)> {
        self.threads
            .values()
            .flat_map(|t| {
                t.posts
                    .values()
                    .filter(|p| !self.is_post_resolved(p))
                    .map(move |p| (t.id.clone(), p.id.clone()))
            })
            .collect()
    }

    /// Threads whose starter is not known yet.
    pub fn threads_missing_author(&self) -> Vec<String> {
        self.threads
            .values()
            .filter(|t| t.author.is_none())
            .map(|t| t.id.clone())
            .collect()
    }

    /// Stable-sort threads by title, then each thread's posts by timestamp.
    pub fn sort_threads_and_posts(&mut self) {
        self.threads.sort_by(|_, a, _, b| a.title.cmp(&b.title));
        for thread in self.threads.values_mut() {
            thread
                .posts
                .sort_by(|_, a, _, b| a.timestamp.cmp(&b.timestamp));
        }
    }

    pub fn post_count(&self) -> usize {
        self.threads.values().map(|t| t.posts.len()).sum()
    }
}
