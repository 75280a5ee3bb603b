//! Stages 7 through 9: scraping whole sub-forums.

use tracing::debug;

use crate::error::{JobError, JobResult};
use crate::pipeline::runner::{StageFlow, StageRunner};
use crate::types::state::Stage;
use crate::types::thread::{ForumProgress, Post, Thread, TopicProgress};

impl StageRunner {
    /// Stage 7: one progress record per configured forum.
    pub(crate) fn init_forums(&mut self) -> StageFlow {
        for id in self.state.settings.forum_ids.clone() {
            self.state
                .forums
                .entry(id.clone())
                .or_insert_with(|| ForumProgress::new(id));
        }
        self.status
            .progress(format!("Scraping {} forums", self.state.forums.len()));
        StageFlow::Done
    }

    fn next_forum(&self) -> Option<String> {
        self.state
            .forums
            .values()
            .find(|f| !f.complete)
            .map(|f| f.id.clone())
    }

    /// Stage 8: page through each forum's topic listing.
    pub(crate) async fn forum_pagination(&mut self) -> JobResult<StageFlow> {
        let stage = Stage::ForumPagination;
        while let Some(forum_id) = self.next_forum() {
            self.state.current_forum = Some(forum_id.clone());
            let page_num = self.state.forums[&forum_id].next_page;
            let url = self
                .adapter
                .forum_page_url(&self.state.settings, &forum_id, page_num);
            let page = self
                .fetch_page(&url)
                .await
                .map_err(|e| JobError::from_fetch(stage, e))?;
            let listing = self.adapter.forum_page(&page.html);

            let Some(forum) = self.state.forums.get_mut(&forum_id) else {
                break;
            };
            if forum.title.is_none() {
                forum.title = listing.title.clone();
            }
            let forum_title = forum.title.clone().unwrap_or_default();
            for topic in &listing.topics {
                if !forum.topics.iter().any(|t| t.thread_id == topic.id) {
                    forum.topics.push(TopicProgress {
                        thread_id: topic.id.clone(),
                        next_page: 0,
                        complete: false,
                    });
                }
            }
            if listing.has_next && !listing.topics.is_empty() {
                forum.next_page += 1;
            } else {
                forum.complete = true;
            }

            for topic in listing.topics {
                self.state
                    .threads
                    .entry(topic.id.clone())
                    .or_insert_with(|| Thread::new(topic.id, topic.title, &forum_title, &forum_id));
            }
            self.state.counters.forum_page_counter += 1;
            self.status.progress(format!(
                "Fetched {} forum pages, {} topics found",
                self.state.counters.forum_page_counter,
                self.state.forums.values().map(|f| f.topics.len()).sum::<usize>()
            ));

            if self.maybe_chain()? {
                return Ok(StageFlow::Chained);
            }
        }
        Ok(StageFlow::Done)
    }

    pub(crate) fn skip_forum(&mut self) -> Option<String> {
        let forum_id = self.next_forum()?;
        let forum = self.state.forums.get_mut(&forum_id)?;
        forum.complete = true;
        Some(format!("forum {}", forum_id))
    }

    fn next_topic(&self) -> Option<(String, usize)> {
        self.state.forums.values().find_map(|f| {
            f.topics
                .iter()
                .position(|t| !t.complete)
                .map(|i| (f.id.clone(), i))
        })
    }

    /// Stage 9: page through every discovered topic.
    pub(crate) async fn topic_pagination(&mut self) -> JobResult<StageFlow> {
        let stage = Stage::TopicPagination;
        while let Some((forum_id, index)) = self.next_topic() {
            let progress = self.state.forums[&forum_id].topics[index].clone();
            self.state.current_topic = Some(progress.thread_id.clone());
            let Some(thread) = self.state.threads.get(&progress.thread_id).cloned() else {
                debug!(thread_id = %progress.thread_id, "Topic has no thread record");
                self.state.forums[&forum_id].topics[index].complete = true;
                continue;
            };

            let url = self
                .adapter
                .topic_page_url(&self.state.settings, &thread, progress.next_page);
            let page = self
                .fetch_page(&url)
                .await
                .map_err(|e| JobError::from_fetch(stage, e))?;
            let topic_page = self.adapter.topic_page(&page.html);

            if progress.next_page == 0 && thread.author.is_none() {
                if let Some(author) = topic_page.posts.first().and_then(|p| p.author.clone()) {
                    if let Some(thread) = self.state.threads.get_mut(&progress.thread_id) {
                        thread.author = Some(author);
                    }
                }
            }

            let has_more = topic_page.has_next && !topic_page.posts.is_empty();
            for p in topic_page.posts {
                let timestamp = self.state.settings.parse_timestamp(&p.ts_raw);
                if timestamp.is_none() {
                    self.report_unparsed_timestamp(&p.ts_raw, &p.id);
                }
                let mut post = Post::new(&p.id, &thread.title, &p.ts_raw)
                    .with_timestamp(timestamp)
                    .with_content(p.content);
                if let Some(author) = p.author {
                    post = post.with_author(author);
                }
                if self.state.add_post(thread.clone(), post) {
                    self.state.counters.total_posts += 1;
                    self.state.counters.posts_retrieved += 1;
                }
            }

            let topic = &mut self.state.forums[&forum_id].topics[index];
            if has_more {
                topic.next_page += 1;
            } else {
                topic.complete = true;
            }
            self.state.counters.topic_page_counter += 1;
            self.status.progress(format!(
                "Fetched {} topic pages, {} posts",
                self.state.counters.topic_page_counter,
                self.state.post_count()
            ));

            if self.maybe_chain()? {
                return Ok(StageFlow::Chained);
            }
        }
        Ok(StageFlow::Done)
    }

    pub(crate) fn skip_topic(&mut self) -> Option<String> {
        let (forum_id, index) = self.next_topic()?;
        let topic = &mut self.state.forums.get_mut(&forum_id)?.topics[index];
        topic.complete = true;
        Some(format!("topic {}", topic.thread_id))
    }
}
