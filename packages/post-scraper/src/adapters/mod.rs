//! Forum adapters.
//!
//! A [`ForumAdapter`] knows how one forum package lays out its URLs and
//! pages. The set is closed: [`adapter_for`] maps each [`ForumKind`] to its
//! adapter. Extraction is driven by the adapter's [`RuleSet`], so most
//! extractor methods have rule-backed default implementations.

pub mod phpbb;
pub mod rules;
pub mod xenforo;

use crate::error::AdapterError;
use crate::security::LoginCredentials;
use crate::types::settings::Settings;
use crate::types::state::{JobState, SearchCursor, Stage};
use crate::types::thread::Thread;

pub use crate::types::settings::ForumKind;
pub use phpbb::PhpBbAdapter;
pub use rules::{Field, Record, RuleId, RuleSet, RuleSpec};
pub use xenforo::XenForoAdapter;

/// What a search hit points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitKind {
    /// The hit is a post
    Post,
    /// The hit is a thread the user started; its first post must be looked up
    ThreadStarter,
}

/// One entry on a search results page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub kind: HitKind,
    pub post_id: String,
    pub title: String,
    pub ts_raw: String,
    pub forum: String,
    pub forum_id: String,
    pub topic: String,

    /// `None` when the listing shows only the topic title
    pub topic_id: Option<String>,
}

/// Where the search goes after a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchAdvance {
    /// Fetch the next page at this cursor
    Next(SearchCursor),
    /// Start a new search (fetch this URL and read the cursor from its redirect)
    Restart(String),
    /// No further pages
    LastPage,
}

/// A thread page reference (phpBB pagination links).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagePointer {
    pub forum_id: String,
    pub topic_id: String,
    pub start: Option<u32>,
}

/// A topic listed on a forum page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRef {
    pub id: String,
    pub title: String,
}

/// One page of a sub-forum listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForumPage {
    pub title: Option<String>,
    pub topics: Vec<TopicRef>,
    pub has_next: bool,
}

/// A post as shown on a topic page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPost {
    pub id: String,
    pub author: Option<String>,
    pub ts_raw: String,
    pub content: String,
}

/// One page of a topic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicPage {
    pub posts: Vec<TopicPost>,
    pub has_next: bool,
}

/// Form submission that logs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginForm {
    pub action: String,
    pub fields: Vec<(String, String)>,
}

/// URL construction and page extraction for one forum package.
pub trait ForumAdapter: Send + Sync {
    fn kind(&self) -> ForumKind;

    fn rules(&self) -> &RuleSet;

    // ---- URL builders ----

    fn user_page_url(&self, settings: &Settings, user_id: &str) -> String;

    /// Page whose redirect reveals a search id, for forums that need one.
    fn search_bootstrap_url(
        &self,
        _settings: &Settings,
        _user_id: &str,
        _before: Option<&str>,
    ) -> Option<String> {
        None
    }

    fn search_url(&self, settings: &Settings, user_id: &str, cursor: &SearchCursor) -> String;

    fn post_url(&self, settings: &Settings, thread: &Thread, post_id: &str) -> String;

    fn thread_url(&self, settings: &Settings, thread: &Thread, start: Option<u32>) -> String;

    /// Thread page for a thread-starter search hit, whose first post id is not yet known.
    fn thread_starter_url(&self, _settings: &Settings, _thread_id: &str) -> Option<String> {
        None
    }

    fn forum_page_url(&self, settings: &Settings, forum_id: &str, page: u32) -> String;

    fn topic_page_url(&self, settings: &Settings, thread: &Thread, page: u32) -> String;

    /// Login page, for forums that support logging in.
    fn login_url(&self, _settings: &Settings) -> Option<String> {
        None
    }

    // ---- cursor hooks ----

    fn initial_search_cursor(&self) -> SearchCursor;

    fn search_cursor_from_redirect(&self, _redirected_to: &str) -> Option<SearchCursor> {
        None
    }

    fn advance_search_cursor(
        &self,
        settings: &Settings,
        user_id: &str,
        cursor: &SearchCursor,
        html: &str,
        hits: usize,
    ) -> SearchAdvance;

    /// Cursor one page past `cursor`, used when a page is skipped outright.
    fn skip_search_page(&self, cursor: &SearchCursor) -> SearchCursor;

    // ---- extractors ----

    fn board_title(&self, html: &str) -> Option<String> {
        self.rules().value(RuleId::BoardTitle, html)
    }

    fn user_name(&self, html: &str) -> Option<String> {
        self.rules().value(RuleId::UserName, html)
    }

    fn login_required(&self, html: &str) -> bool {
        self.rules().is_match(RuleId::LoginRequired, html)
    }

    fn thread_author(&self, html: &str) -> Option<String> {
        self.rules().value(RuleId::ThreadAuthor, html)
    }

    fn search_no_results(&self, html: &str) -> bool {
        self.rules().is_match(RuleId::SearchNoResults, html)
    }

    /// Hits from every skin, in page order per skin.
    fn search_hits(&self, html: &str) -> Vec<SearchHit>;

    /// `(post id, content)` for every post on a thread page.
    fn post_contents(&self, html: &str) -> Vec<(String, String)> {
        self.rules()
            .all(RuleId::PostContents, html)
            .into_iter()
            .filter_map(|r| {
                let id = r.text(Field::PostId)?;
                let content = r.get(Field::Content).unwrap_or_default().trim().to_string();
                Some((id, content))
            })
            .collect()
    }

    /// Image and attachment references in post content, in order, without duplicates.
    fn asset_refs(&self, content: &str) -> Vec<String> {
        let mut refs: Vec<String> = Vec::new();
        for record in self.rules().combined(RuleId::AssetRefs, content) {
            if let Some(url) = record.text(Field::Value) {
                if !refs.contains(&url) {
                    refs.push(url);
                }
            }
        }
        refs
    }

    /// Canonical thread id shown on a thread page.
    fn thread_id(&self, html: &str) -> Option<String> {
        self.rules().value(RuleId::ThreadId, html)
    }

    fn prev_page(&self, html: &str) -> Option<PagePointer> {
        page_pointer(self.rules().first(RuleId::PrevPage, html)?)
    }

    fn next_page(&self, html: &str) -> Option<PagePointer> {
        page_pointer(self.rules().first(RuleId::NextPage, html)?)
    }

    /// Neighbouring thread pages to try when a wanted post is missing.
    fn fallback_urls(&self, _settings: &Settings, _thread: &Thread, _html: &str) -> Vec<String> {
        Vec::new()
    }

    fn forum_page(&self, html: &str) -> ForumPage {
        let rules = self.rules();
        ForumPage {
            title: rules.value(RuleId::ForumTitle, html),
            topics: rules
                .all(RuleId::ForumTopics, html)
                .into_iter()
                .filter_map(|r| {
                    Some(TopicRef {
                        id: r.text(Field::TopicId)?,
                        title: r.text(Field::Topic).unwrap_or_default(),
                    })
                })
                .collect(),
            has_next: rules.is_match(RuleId::ListingNextPage, html),
        }
    }

    fn topic_page(&self, html: &str) -> TopicPage {
        let rules = self.rules();
        TopicPage {
            posts: rules
                .all(RuleId::TopicPosts, html)
                .into_iter()
                .filter_map(|r| {
                    Some(TopicPost {
                        id: r.text(Field::PostId)?,
                        author: r.text(Field::Author),
                        ts_raw: r.text(Field::Ts).unwrap_or_default(),
                        content: r.get(Field::Content).unwrap_or_default().trim().to_string(),
                    })
                })
                .collect(),
            has_next: rules.is_match(RuleId::ListingNextPage, html),
        }
    }

    // ---- login ----

    /// Build the login submission from the login page.
    fn login_form(
        &self,
        settings: &Settings,
        _credentials: &LoginCredentials,
        _login_page_html: &str,
    ) -> Result<LoginForm, AdapterError> {
        Err(AdapterError::LoginFormNotFound {
            url: self.login_url(settings).unwrap_or_default(),
        })
    }

    /// Whether the login response indicates success.
    fn login_succeeded(&self, html: &str, redirected: bool) -> bool {
        redirected || self.rules().is_match(RuleId::LoginSuccess, html)
    }

    /// Called after each stage completes.
    fn on_stage_complete(&self, _stage: Stage, _state: &mut JobState) {}
}

fn page_pointer(record: Record) -> Option<PagePointer> {
    Some(PagePointer {
        forum_id: record.text(Field::ForumId)?,
        topic_id: record.text(Field::TopicId)?,
        start: record.text(Field::Start).and_then(|s| s.parse().ok()),
    })
}

/// Adapter for a forum package.
pub fn adapter_for(kind: ForumKind) -> Result<Box<dyn ForumAdapter>, AdapterError> {
    Ok(match kind {
        ForumKind::PhpBb => Box::new(PhpBbAdapter::new()?),
        ForumKind::XenForo => Box::new(XenForoAdapter::new()?),
    })
}

/// Turn a search-hit record into a hit, or `None` when required fields are absent.
pub(crate) fn hit_from_record(record: &Record) -> Option<SearchHit> {
    let kind = match record.get(Field::Kind) {
        Some(kind) if kind.starts_with("thread") => HitKind::ThreadStarter,
        _ => HitKind::Post,
    };
    let topic = record.text(Field::Topic).unwrap_or_default();
    Some(SearchHit {
        kind,
        post_id: record.text(Field::PostId)?,
        title: record.text(Field::Title).unwrap_or_else(|| topic.clone()),
        ts_raw: record.text(Field::Ts).unwrap_or_default(),
        forum: record.text(Field::Forum).unwrap_or_default(),
        forum_id: record.text(Field::ForumId).unwrap_or_default(),
        topic,
        topic_id: record.text(Field::TopicId),
    })
}
