//! Stages 0 through 5: scraping one user's posts.

use tracing::{debug, info};

use crate::adapters::{HitKind, SearchAdvance, SearchHit};
use crate::error::{FetchError, JobError, JobResult};
use crate::pipeline::runner::{StageFlow, StageRunner};
use crate::types::state::Stage;
use crate::types::thread::{Post, Thread};

/// Username recorded when the profile page does not show one.
pub const UNKNOWN_USER: &str = "[unknown]";

/// Author recorded when a thread page does not show one.
pub const UNKNOWN_AUTHOR: &str = "???";

impl StageRunner {
    fn user_id(&self, stage: Stage) -> JobResult<String> {
        self.state
            .settings
            .extract_user_id
            .clone()
            .ok_or_else(|| JobError::fatal(stage, "extract_user_id is not set"))
    }

    /// Stage 0: resolve the username and set up the search cursor.
    pub(crate) async fn init_user_search(&mut self) -> JobResult<StageFlow> {
        let stage = Stage::InitUserSearch;
        let user_id = self.user_id(stage)?;

        if self.state.settings.extract_user.is_none() {
            let url = self.adapter.user_page_url(&self.state.settings, &user_id);
            let page = self
                .fetch_page(&url)
                .await
                .map_err(|e| JobError::from_fetch(stage, e))?;
            let name = match self.adapter.user_name(&page.html) {
                Some(name) => name,
                None => {
                    let hint = if self.adapter.login_required(&page.html) {
                        " The forum only shows member profiles to logged-in users; set login_user and login_password."
                    } else {
                        ""
                    };
                    self.status.error(format!(
                        "Could not find the username of user id {}.{}",
                        user_id, hint
                    ));
                    UNKNOWN_USER.to_string()
                }
            };
            self.state.settings.extract_user = Some(name);
        }

        self.status.progress(format!(
            "Searching for posts by {}",
            self.state.settings.extract_user.as_deref().unwrap_or(UNKNOWN_USER)
        ));
        if self.state.search_cursor.is_none() {
            self.state.search_cursor = Some(self.adapter.initial_search_cursor());
            self.state.counters.search_page_num = 1;
        }
        Ok(StageFlow::Done)
    }

    /// Stage 1: page through the user's search results.
    pub(crate) async fn user_post_search(&mut self) -> JobResult<StageFlow> {
        let stage = Stage::UserPostSearch;
        let user_id = self.user_id(stage)?;

        loop {
            let cursor = self
                .state
                .search_cursor
                .clone()
                .unwrap_or_else(|| self.adapter.initial_search_cursor());
            let bootstrap = match cursor.search_id {
                Some(_) => None,
                None => self.state.search_restart.clone().or_else(|| {
                    self.adapter
                        .search_bootstrap_url(&self.state.settings, &user_id, None)
                }),
            };
            let url = bootstrap.clone().unwrap_or_else(|| {
                self.adapter
                    .search_url(&self.state.settings, &user_id, &cursor)
            });

            self.status.progress(format!(
                "Fetching search results page {}",
                self.state.counters.search_page_num
            ));
            let page = self
                .fetch_page(&url)
                .await
                .map_err(|e| JobError::from_fetch(stage, e))?;

            // A new search reveals its id only through the redirect
            let cursor = match &bootstrap {
                Some(_) => page
                    .redirected_to
                    .as_deref()
                    .and_then(|to| self.adapter.search_cursor_from_redirect(to))
                    .unwrap_or(cursor),
                None => cursor,
            };
            self.state.search_restart = None;

            if self.adapter.search_no_results(&page.html) {
                info!(page = self.state.counters.search_page_num, "Search reports no results");
                break;
            }

            let hits = self.adapter.search_hits(&page.html);
            let hit_count = hits.len();
            let found_older = self.record_hits(hits).await?;
            self.state.counters.search_page_num += 1;

            let advance = if found_older {
                info!("Reached posts older than the start date");
                SearchAdvance::LastPage
            } else if cursor.search_id.is_none() && bootstrap.is_some() {
                // Without a search id there is nothing to paginate
                SearchAdvance::LastPage
            } else {
                self.adapter.advance_search_cursor(
                    &self.state.settings,
                    &user_id,
                    &cursor,
                    &page.html,
                    hit_count,
                )
            };

            match advance {
                SearchAdvance::Next(next) => self.state.search_cursor = Some(next),
                SearchAdvance::Restart(url) => {
                    debug!(url = %url, "Restarting search from older content");
                    self.state.search_cursor = Some(self.adapter.initial_search_cursor());
                    self.state.search_restart = Some(url);
                }
                SearchAdvance::LastPage => break,
            }

            if self.maybe_chain()? {
                return Ok(StageFlow::Chained);
            }
        }

        self.status.progress(format!(
            "Found {} posts in {} threads",
            self.state.post_count(),
            self.state.threads.len()
        ));
        Ok(StageFlow::Done)
    }

    /// Record one page of hits. Returns whether any hit predates the cutoff.
    ///
    /// Every hit is looked at: results are not strictly chronological, so
    /// one old hit does not mean the rest of the page is old.
    async fn record_hits(&mut self, hits: Vec<SearchHit>) -> JobResult<bool> {
        let mut found_older = false;
        for hit in hits {
            let timestamp = self.state.settings.parse_timestamp(&hit.ts_raw);
            if timestamp.is_none() {
                self.report_unparsed_timestamp(&hit.ts_raw, &hit.post_id);
            }
            if let (Some(earliest), Some(ts)) = (self.state.settings.earliest, timestamp) {
                if ts < earliest {
                    found_older = true;
                    continue;
                }
            }

            match hit.kind {
                HitKind::Post => {
                    let thread_id = match &hit.topic_id {
                        Some(id) => id.clone(),
                        None => self.state.synthetic_thread_id(&hit.topic),
                    };
                    let thread = Thread::new(thread_id, &hit.topic, &hit.forum, &hit.forum_id);
                    let post = Post::new(&hit.post_id, &hit.title, &hit.ts_raw).with_timestamp(timestamp);
                    if self.state.add_post(thread, post) {
                        self.state.counters.total_posts += 1;
                    }
                }
                HitKind::ThreadStarter => self.record_thread_starter(&hit, timestamp).await?,
            }
        }
        Ok(found_older)
    }

    /// A thread the user started: its first post is theirs.
    async fn record_thread_starter(
        &mut self,
        hit: &SearchHit,
        timestamp: Option<chrono::DateTime<chrono::Utc>>,
    ) -> JobResult<()> {
        let thread_id = hit.post_id.clone();
        if self.state.starter_threads.contains(&thread_id) {
            return Ok(());
        }
        let Some(url) = self
            .adapter
            .thread_starter_url(&self.state.settings, &thread_id)
        else {
            return Ok(());
        };

        match self.fetch_page(&url).await {
            Ok(page) => match self.adapter.post_contents(&page.html).into_iter().next() {
                Some((post_id, content)) => {
                    let mut thread = Thread::new(&thread_id, &hit.topic, &hit.forum, &hit.forum_id);
                    thread.author = self.state.settings.extract_user.clone();
                    let mut post = Post::new(&post_id, &hit.title, &hit.ts_raw).with_timestamp(timestamp);
                    if content.is_empty() {
                        self.state.empty.insert(post_id.clone());
                    } else {
                        post.content = Some(content);
                        self.state.counters.posts_retrieved += 1;
                    }
                    if self.state.add_post(thread, post) {
                        self.state.counters.total_posts += 1;
                    }
                }
                None => self.status.error(format!(
                    "Could not find the first post of thread \"{}\" ({})",
                    hit.topic, url
                )),
            },
            Err(FetchError::Cancelled) => return Err(JobError::Cancelled),
            Err(e) => self.status.error(format!(
                "Could not fetch thread \"{}\" to find its first post: {}",
                hit.topic, e
            )),
        }
        self.state.starter_threads.insert(thread_id);
        Ok(())
    }

    pub(crate) fn report_unparsed_timestamp(&self, raw: &str, post_id: &str) {
        let hint = if raw.contains('/') && !self.state.settings.non_us_date_format {
            " If this forum prints dates day-first, set non_us_date_format."
        } else {
            ""
        };
        self.status.error(format!(
            "Could not parse the timestamp \"{}\" of post {}.{}",
            raw, post_id, hint
        ));
    }

    pub(crate) fn skip_search_page(&mut self) -> Option<String> {
        let cursor = self.state.search_cursor.clone()?;
        self.state.search_restart = None;
        self.state.search_cursor = Some(self.adapter.skip_search_page(&cursor));
        self.state.counters.search_page_num += 1;
        Some(format!("search results page {}", self.state.counters.search_page_num - 1))
    }

    /// Stage 2: fetch the content of every post, a thread page at a time.
    pub(crate) async fn posts_retrieval(&mut self) -> JobResult<StageFlow> {
        loop {
            let Some((thread_id, post_id)) = self.state.pending_posts().into_iter().next() else {
                break;
            };
            self.state.current_thread = Some(thread_id.clone());
            self.retrieve_post(&thread_id, &post_id).await?;
            self.status.progress(format!(
                "Retrieved {} of {} posts",
                self.state.counters.posts_retrieved, self.state.counters.total_posts
            ));

            if self.maybe_chain()? {
                return Ok(StageFlow::Chained);
            }
        }
        Ok(StageFlow::Done)
    }

    async fn retrieve_post(&mut self, thread_id: &str, post_id: &str) -> JobResult<()> {
        let Some(thread) = self.state.threads.get(thread_id).cloned() else {
            return Ok(());
        };
        let url = self.adapter.post_url(&self.state.settings, &thread, post_id);

        let page = match self.fetch_page(&url).await {
            Ok(page) => page,
            Err(FetchError::Cancelled) => return Err(JobError::Cancelled),
            Err(e) => {
                debug!(post_id, error = %e, "Post could not be fetched");
                self.state.not_found.insert(post_id.to_string());
                return Ok(());
            }
        };

        if let Some(canonical) = self.adapter.thread_id(&page.html) {
            if let Some(thread) = self.state.threads.get_mut(thread_id) {
                if canonical != thread.id {
                    thread.canonical_id = Some(canonical);
                }
            }
        }
        self.fill_contents(thread_id, &page.html);

        if !self.is_resolved(thread_id, post_id) {
            for fallback in self
                .adapter
                .fallback_urls(&self.state.settings, &thread, &page.html)
            {
                match self.fetch_page(&fallback).await {
                    Ok(page) => self.fill_contents(thread_id, &page.html),
                    Err(FetchError::Cancelled) => return Err(JobError::Cancelled),
                    Err(e) => debug!(url = %fallback, error = %e, "Fallback page failed"),
                }
                if self.is_resolved(thread_id, post_id) {
                    break;
                }
            }
        }

        if !self.is_resolved(thread_id, post_id) {
            debug!(post_id, "Post not found on its thread pages");
            self.state.not_found.insert(post_id.to_string());
        }
        Ok(())
    }

    fn is_resolved(&self, thread_id: &str, post_id: &str) -> bool {
        self.state
            .threads
            .get(thread_id)
            .and_then(|t| t.posts.get(post_id))
            .map_or(true, |p| self.state.is_post_resolved(p))
    }

    /// Fill every still-empty post of `thread_id` that appears on the page.
    fn fill_contents(&mut self, thread_id: &str, html: &str) {
        let contents = self.adapter.post_contents(html);
        let Some(thread) = self.state.threads.get_mut(thread_id) else {
            return;
        };
        for (id, content) in contents {
            if self.state.not_found.contains(&id) || self.state.empty.contains(&id) {
                continue;
            }
            let Some(post) = thread.posts.get_mut(&id) else {
                continue;
            };
            if post.content.is_some() {
                continue;
            }
            if content.is_empty() {
                self.state.empty.insert(id);
            } else {
                post.content = Some(content);
                self.state.counters.posts_retrieved += 1;
            }
        }
    }

    pub(crate) fn skip_post(&mut self) -> Option<String> {
        let (_, post_id) = self.state.pending_posts().into_iter().next()?;
        self.state.not_found.insert(post_id.clone());
        Some(format!("post {}", post_id))
    }

    /// Stage 3: find the starter of every thread.
    pub(crate) async fn extract_thread_info(&mut self) -> JobResult<StageFlow> {
        loop {
            let Some(thread_id) = self.state.threads_missing_author().into_iter().next() else {
                break;
            };
            self.state.current_thread = Some(thread_id.clone());
            let Some(thread) = self.state.threads.get(&thread_id).cloned() else {
                break;
            };
            let url = self.adapter.thread_url(&self.state.settings, &thread, None);

            let author = match self.fetch_page(&url).await {
                Ok(page) => self.adapter.thread_author(&page.html),
                Err(FetchError::Cancelled) => return Err(JobError::Cancelled),
                Err(e) => {
                    debug!(thread_id = %thread_id, error = %e, "Thread page could not be fetched");
                    None
                }
            };
            let author = author.unwrap_or_else(|| {
                self.status.error(format!(
                    "Could not find the author of thread \"{}\" ({})",
                    thread.title, url
                ));
                UNKNOWN_AUTHOR.to_string()
            });
            if let Some(thread) = self.state.threads.get_mut(&thread_id) {
                thread.author = Some(author);
            }
            self.state.counters.thread_infos_retrieved += 1;
            self.status.progress(format!(
                "Retrieved details of {} of {} threads",
                self.state.counters.thread_infos_retrieved,
                self.state.threads.len()
            ));

            if self.maybe_chain()? {
                return Ok(StageFlow::Chained);
            }
        }
        Ok(StageFlow::Done)
    }

    pub(crate) fn skip_thread_info(&mut self) -> Option<String> {
        let thread_id = self.state.threads_missing_author().into_iter().next()?;
        let thread = self.state.threads.get_mut(&thread_id)?;
        thread.author = Some(UNKNOWN_AUTHOR.to_string());
        Some(format!("thread {}", thread_id))
    }

    /// Stage 4: order threads by title and posts by time.
    pub(crate) fn topic_post_sort(&mut self) -> StageFlow {
        self.state.sort_threads_and_posts();
        StageFlow::Done
    }

    /// Stage 5: report posts that could not be retrieved.
    pub(crate) fn handle_missing_posts(&mut self) -> StageFlow {
        if !self.state.not_found.is_empty() {
            let ids: Vec<&str> = self.state.not_found.iter().map(String::as_str).collect();
            self.status.error(format!(
                "{} posts could not be retrieved: {}",
                ids.len(),
                ids.join(", ")
            ));
        }
        if !self.state.empty.is_empty() {
            info!(count = self.state.empty.len(), "Posts with empty content");
        }
        StageFlow::Done
    }
}
