//! XenForo 1.x and 2.x default skins.
//!
//! Search ids are only visible in the redirect that follows
//! `search/member?user_id=N`. Results are capped per search, so the last
//! page of a search may carry an "older content" link that starts a new
//! one. XF1 results name the thread only by title; the thread id is
//! discovered on the post page and threads are re-keyed once posts are
//! retrieved.

use indexmap::map::Entry;
use regex::Regex;

use super::rules::{Field, RuleId, RuleSet, RuleSpec};
use super::{hit_from_record, ForumAdapter, ForumKind, SearchAdvance, SearchHit};
use crate::error::AdapterError;
use crate::types::settings::{trailing_digits, Settings};
use crate::types::state::{JobState, SearchCursor, Stage};
use crate::types::thread::Thread;

const RULES: &[RuleSpec] = &[
    // ---- XenForo 1 ----
    RuleSpec {
        rule: RuleId::BoardTitle,
        skin: "xf1",
        pattern: r#"<div class="boardTitle"><strong>([^<]*)</strong></div>"#,
        fields: &[Field::Value],
    },
    RuleSpec {
        rule: RuleId::UserName,
        skin: "xf1",
        pattern: r#"<h1 itemprop="name" class="username">(?:<span class="[^"]*">)?([^<]+)"#,
        fields: &[Field::Value],
    },
    RuleSpec {
        rule: RuleId::ThreadAuthor,
        skin: "xf1",
        pattern: r#"(?s)<p id="pageDescription" class="muted ">[^<]*<a href="forums/[^/]*/">[^<]*</a>[^<]*<a href="members/[^/]*/" class="username"[^>]*>([^<]*)</a>"#,
        fields: &[Field::Value],
    },
    RuleSpec {
        rule: RuleId::SearchNoResults,
        skin: "xf1",
        pattern: r#"<div class="messageBody">[^<]*</div>"#,
        fields: &[],
    },
    // The date is a <span title=...> for older posts and an <abbr> for recent ones.
    RuleSpec {
        rule: RuleId::SearchHits,
        skin: "xf1",
        pattern: r#"(?s)<div class="listBlock main">\s*<div class="titleText">\s*<span class="contentType">[^<]*</span>\s*<h3 class="title"><a href="(posts|threads)/([^/"]+)/">([^<]*)</a></h3>\s*</div>\s*<blockquote class="snippet">.*?</blockquote>\s*<div class="meta">\s*[^<]*<a href="members/[^/"]*/"\s*class="username"[^>]*>[^<]*</a>,\s*<(?:span|abbr) class="DateTime"(?: title="([^"]+)")?[^>]*>([^<]*)</(?:span|abbr)>[^<]*<a href="forums/([^/"]*)/">([^<]*)</a>"#,
        fields: &[
            Field::Kind,
            Field::PostId,
            Field::Topic,
            Field::Ts,
            Field::Ts,
            Field::ForumId,
            Field::Forum,
        ],
    },
    RuleSpec {
        rule: RuleId::SearchNextPage,
        skin: "xf1",
        pattern: r#"<a href="[^"]*" class="text">[^<]*&gt;</a>"#,
        fields: &[],
    },
    RuleSpec {
        rule: RuleId::PostContents,
        skin: "xf1",
        pattern: r#"(?s)<li id="post-(\d+)".*?<article>\s*<blockquote class="messageText [^"]*">(.*?)</blockquote>\s*</article>"#,
        fields: &[Field::PostId, Field::Content],
    },
    RuleSpec {
        rule: RuleId::ForumTitle,
        skin: "xf1",
        pattern: r#"(?s)<div class="titleBar">\s*<h1>([^<]+)</h1>"#,
        fields: &[Field::Value],
    },
    RuleSpec {
        rule: RuleId::ForumTopics,
        skin: "xf1",
        pattern: r#"<a href="threads/([^/"]+)/"[^>]*class="PreviewTooltip"[^>]*>([^<]*)</a>"#,
        fields: &[Field::TopicId, Field::Topic],
    },
    RuleSpec {
        rule: RuleId::ListingNextPage,
        skin: "xf1",
        pattern: r#"<a href="[^"]*" class="text">[^<]*&gt;</a>"#,
        fields: &[],
    },
    RuleSpec {
        rule: RuleId::TopicPosts,
        skin: "xf1",
        pattern: r#"(?s)<li id="post-(\d+)" class="message[^"]*"[^>]*data-author="([^"]*)">.*?<article>\s*<blockquote class="messageText [^"]*">(.*?)</blockquote>\s*</article>.*?<(?:span|abbr) class="DateTime"(?: title="([^"]+)")?[^>]*>([^<]*)</(?:span|abbr)>"#,
        fields: &[Field::PostId, Field::Author, Field::Content, Field::Ts, Field::Ts],
    },
    // ---- XenForo 2 ----
    RuleSpec {
        rule: RuleId::BoardTitle,
        skin: "xf2",
        pattern: r#"<meta property="og:site_name" content="([^"]+)""#,
        fields: &[Field::Value],
    },
    RuleSpec {
        rule: RuleId::UserName,
        skin: "xf2",
        pattern: r#"(?s)<h1 class="memberHeader-name">.*?<span class="username[^"]*"[^>]*>(?:<span[^>]*>)?([^<]+)"#,
        fields: &[Field::Value],
    },
    RuleSpec {
        rule: RuleId::ThreadAuthor,
        skin: "xf2",
        pattern: r#"<article class="message message--post[^"]*"[^>]*data-author="([^"]+)""#,
        fields: &[Field::Value],
    },
    RuleSpec {
        rule: RuleId::SearchNoResults,
        skin: "xf2",
        pattern: r#"<div class="blockMessage">[^<]*</div>"#,
        fields: &[],
    },
    RuleSpec {
        rule: RuleId::SearchHits,
        skin: "xf2-post",
        pattern: r#"(?s)<h3 class="contentRow-title">\s*<a href="[^"]*threads/([^/"]+)/post-(\d+)"[^>]*>([^<]*)</a>\s*</h3>.*?<time[^>]*datetime="([^"]+)".*?<li>[^<:]*: <a href="[^"]*forums/([^/"]+)/">([^<]*)</a>"#,
        fields: &[
            Field::TopicId,
            Field::PostId,
            Field::Topic,
            Field::Ts,
            Field::ForumId,
            Field::Forum,
        ],
    },
    RuleSpec {
        rule: RuleId::SearchHits,
        skin: "xf2-thread",
        pattern: r#"(?s)<h3 class="contentRow-title">\s*<a href="[^"]*(threads)/([^/"]+)/"[^>]*>([^<]*)</a>\s*</h3>.*?<time[^>]*datetime="([^"]+)".*?<li>[^<:]*: <a href="[^"]*forums/([^/"]+)/">([^<]*)</a>"#,
        fields: &[
            Field::Kind,
            Field::PostId,
            Field::Topic,
            Field::Ts,
            Field::ForumId,
            Field::Forum,
        ],
    },
    RuleSpec {
        rule: RuleId::SearchNextPage,
        skin: "xf2",
        pattern: r#"class="pageNav-jump pageNav-jump--next""#,
        fields: &[],
    },
    RuleSpec {
        rule: RuleId::PostContents,
        skin: "xf2",
        pattern: r#"(?s)<article class="message message--post[^"]*"[^>]*data-content="post-(\d+)".*?<div class="bbWrapper">(.*?)</div>\s*<div class="js-selectToQuoteEnd">"#,
        fields: &[Field::PostId, Field::Content],
    },
    RuleSpec {
        rule: RuleId::ForumTitle,
        skin: "xf2",
        pattern: r#"<h1 class="p-title-value">([^<]+)</h1>"#,
        fields: &[Field::Value],
    },
    RuleSpec {
        rule: RuleId::ForumTopics,
        skin: "xf2",
        pattern: r#"<a href="[^"]*threads/([^/"]+)/"[^>]*data-tp-primary="on"[^>]*>([^<]*)</a>"#,
        fields: &[Field::TopicId, Field::Topic],
    },
    RuleSpec {
        rule: RuleId::ListingNextPage,
        skin: "xf2",
        pattern: r#"class="pageNav-jump pageNav-jump--next""#,
        fields: &[],
    },
    RuleSpec {
        rule: RuleId::TopicPosts,
        skin: "xf2",
        pattern: r#"(?s)<article class="message message--post[^"]*"[^>]*data-author="([^"]*)"[^>]*data-content="post-(\d+)".*?<time[^>]*datetime="([^"]+)".*?<div class="bbWrapper">(.*?)</div>\s*<div class="js-selectToQuoteEnd">"#,
        fields: &[Field::Author, Field::PostId, Field::Ts, Field::Content],
    },
    // ---- both ----
    RuleSpec {
        rule: RuleId::ThreadId,
        skin: "canonical",
        pattern: r#"<link rel="canonical" href="[^"]*threads/([^/"]+)/"#,
        fields: &[Field::Value],
    },
    RuleSpec {
        rule: RuleId::OlderContent,
        skin: "any",
        pattern: r#"href="[^"]*search/member\?user_id=\d+&amp;before=(\d+)""#,
        fields: &[Field::Value],
    },
    RuleSpec {
        rule: RuleId::AssetRefs,
        skin: "img",
        pattern: r#"<img\s[^>]*?src="([^"]+)""#,
        fields: &[Field::Value],
    },
    RuleSpec {
        rule: RuleId::AssetRefs,
        skin: "attachment",
        pattern: r#"href="([^"]*attachments/[^"]+)""#,
        fields: &[Field::Value],
    },
];

/// XenForo adapter. Login is not supported.
pub struct XenForoAdapter {
    rules: RuleSet,
    search_redirect: Regex,
}

impl XenForoAdapter {
    pub fn new() -> Result<Self, AdapterError> {
        let pattern = r"/search/(\d+)/";
        let search_redirect = Regex::new(pattern).map_err(|source| AdapterError::InvalidRule {
            rule: "search_redirect",
            skin: "any",
            source,
        })?;
        Ok(Self {
            rules: RuleSet::compile(RULES)?,
            search_redirect,
        })
    }

    fn paged(settings: &Settings, kind: &str, id: &str, page: u32) -> String {
        match page {
            0 => format!("{}/{}/{}/", settings.base_url, kind, id),
            n => format!("{}/{}/{}/page-{}", settings.base_url, kind, id, n + 1),
        }
    }
}

impl ForumAdapter for XenForoAdapter {
    fn kind(&self) -> ForumKind {
        ForumKind::XenForo
    }

    fn rules(&self) -> &RuleSet {
        &self.rules
    }

    fn user_page_url(&self, settings: &Settings, user_id: &str) -> String {
        format!("{}/members/{}/", settings.base_url, user_id)
    }

    fn search_bootstrap_url(
        &self,
        settings: &Settings,
        user_id: &str,
        before: Option<&str>,
    ) -> Option<String> {
        let mut url = format!(
            "{}/search/member?user_id={}",
            settings.base_url,
            trailing_digits(user_id)
        );
        if let Some(before) = before {
            url.push_str(&format!("&before={}", before));
        }
        Some(url)
    }

    fn search_url(&self, settings: &Settings, _user_id: &str, cursor: &SearchCursor) -> String {
        format!(
            "{}/search/{}/?page={}",
            settings.base_url,
            cursor.search_id.as_deref().unwrap_or_default(),
            cursor.position
        )
    }

    fn post_url(&self, settings: &Settings, _thread: &Thread, post_id: &str) -> String {
        format!("{}/posts/{}/", settings.base_url, post_id)
    }

    fn thread_url(&self, settings: &Settings, thread: &Thread, _start: Option<u32>) -> String {
        Self::paged(settings, "threads", thread.forum_thread_id(), 0)
    }

    fn thread_starter_url(&self, settings: &Settings, thread_id: &str) -> Option<String> {
        Some(Self::paged(settings, "threads", thread_id, 0))
    }

    fn forum_page_url(&self, settings: &Settings, forum_id: &str, page: u32) -> String {
        Self::paged(settings, "forums", forum_id, page)
    }

    fn topic_page_url(&self, settings: &Settings, thread: &Thread, page: u32) -> String {
        Self::paged(settings, "threads", thread.forum_thread_id(), page)
    }

    /// Page numbers start at 1; the search id is filled in from the bootstrap redirect.
    fn initial_search_cursor(&self) -> SearchCursor {
        SearchCursor {
            search_id: None,
            position: 1,
        }
    }

    fn search_cursor_from_redirect(&self, redirected_to: &str) -> Option<SearchCursor> {
        let caps = self.search_redirect.captures(redirected_to)?;
        Some(SearchCursor {
            search_id: Some(caps[1].to_string()),
            position: 1,
        })
    }

    fn advance_search_cursor(
        &self,
        settings: &Settings,
        user_id: &str,
        cursor: &SearchCursor,
        html: &str,
        hits: usize,
    ) -> SearchAdvance {
        if hits > 0 && self.rules.is_match(RuleId::SearchNextPage, html) {
            return SearchAdvance::Next(self.skip_search_page(cursor));
        }
        match self.rules.value(RuleId::OlderContent, html) {
            Some(before) => self
                .search_bootstrap_url(settings, user_id, Some(&before))
                .map(SearchAdvance::Restart)
                .unwrap_or(SearchAdvance::LastPage),
            None => SearchAdvance::LastPage,
        }
    }

    fn skip_search_page(&self, cursor: &SearchCursor) -> SearchCursor {
        SearchCursor {
            search_id: cursor.search_id.clone(),
            position: cursor.position + 1,
        }
    }

    fn search_hits(&self, html: &str) -> Vec<SearchHit> {
        self.rules
            .combined(RuleId::SearchHits, html)
            .iter()
            .filter_map(hit_from_record)
            .collect()
    }

    // Threads found only by title carry a provisional id until now.
    fn on_stage_complete(&self, stage: Stage, state: &mut JobState) {
        if stage != Stage::PostsRetrieval {
            return;
        }
        let threads = std::mem::take(&mut state.threads);
        for (_, mut thread) in threads {
            if let Some(canonical) = thread.canonical_id.take() {
                thread.id = canonical;
            }
            match state.threads.entry(thread.id.clone()) {
                Entry::Occupied(mut existing) => {
                    let existing = existing.get_mut();
                    for (id, post) in thread.posts {
                        existing.posts.entry(id).or_insert(post);
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(thread);
                }
            }
        }
        tracing::debug!(threads = state.threads.len(), "Re-keyed threads by forum thread id");
    }
}
