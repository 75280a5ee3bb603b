//! Scraped forum content: threads, posts, forums and downloaded assets.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A single post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub title: String,

    /// Author as printed (forum mode only; user mode posts share one author)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// Timestamp exactly as the forum printed it
    pub ts_raw: String,

    /// Parsed timestamp, when the text was recognised
    pub timestamp: Option<DateTime<Utc>>,

    /// Post body HTML; `None` until fetched
    pub content: Option<String>,

    /// Image and attachment references found in `content`
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl Post {
    /// Create a post known only from a listing (no content yet).
    pub fn new(id: impl Into<String>, title: impl Into<String>, ts_raw: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            author: None,
            ts_raw: ts_raw.into(),
            timestamp: None,
            content: None,
            attachments: Vec::new(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: Option<DateTime<Utc>>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

/// A thread (topic) and the posts collected from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    /// Identifier used as the map key
    pub id: String,

    /// Forum-assigned id discovered on the thread page, when search
    /// results did not carry one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_id: Option<String>,

    pub title: String,
    pub forum: String,
    pub forum_id: String,

    /// Thread starter; `None` until stage 3 (or the first topic page) runs
    pub author: Option<String>,

    /// Posts in discovery order (sorted by timestamp in stage 4)
    pub posts: IndexMap<String, Post>,
}

impl Thread {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        forum: impl Into<String>,
        forum_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            canonical_id: None,
            title: title.into(),
            forum: forum.into(),
            forum_id: forum_id.into(),
            author: None,
            posts: IndexMap::new(),
        }
    }

    /// Id to use when addressing the thread on the forum.
    pub fn forum_thread_id(&self) -> &str {
        self.canonical_id.as_deref().unwrap_or(&self.id)
    }
}

/// Pagination progress through one topic (forum mode).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicProgress {
    pub thread_id: String,
    pub next_page: u32,
    pub complete: bool,
}

/// Pagination progress through one sub-forum (forum mode).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForumProgress {
    pub id: String,
    pub title: Option<String>,
    pub next_page: u32,
    pub complete: bool,

    /// Topics discovered on the forum's listing pages, in listing order
    pub topics: Vec<TopicProgress>,
}

impl ForumProgress {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            next_page: 0,
            complete: false,
            topics: Vec::new(),
        }
    }
}

/// Asset download bookkeeping (stage 6).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadLedger {
    /// References have been collected from post content
    pub collected: bool,

    /// Absolute URL to local file name
    pub files: IndexMap<String, String>,

    pub downloaded: BTreeSet<String>,
    pub failed: BTreeSet<String>,

    /// Content has been rewritten to local paths
    pub rewritten: bool,
}

impl DownloadLedger {
    /// URLs neither downloaded nor failed yet, in collection order.
    pub fn pending(&self) -> Vec<String> {
        self.files
            .keys()
            .filter(|url| !self.downloaded.contains(*url) && !self.failed.contains(*url))
            .cloned()
            .collect()
    }
}
