//! Scripted phpBB board shared by the integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use post_scraper::{
    adapter_for, CancellationWatcher, ContinuationCommand, FetchClient, ForumKind, JobPaths,
    JobState, JobTarget, MemoryOutputWriter, MockTransport, RateLimiter, RecordingLauncher,
    RecordingNotifier, RunOptions, Settings, StageRunner, UrlValidator,
};

pub const BASE: &str = "https://forum.test";
pub const TOKEN: &str = "job";

/// A search hit: (post id, topic id, topic title, timestamp).
pub type Hit<'a> = (&'a str, &'a str, &'a str, &'a str);

pub fn validator() -> UrlValidator {
    UrlValidator::new().allow_host("forum.test")
}

pub fn user_settings(extra: &str) -> Settings {
    let text = format!(
        "base_url={}\nforum_type=phpbb\nextract_user_id=42\nextract_user=alice\ndelay=2\n{}",
        BASE, extra
    );
    Settings::parse(&text, &validator()).unwrap()
}

pub fn forum_settings() -> Settings {
    let text = format!("base_url={}\nforum_type=phpbb\nforum_ids=2\ndelay=2\n", BASE);
    Settings::parse(&text, &validator()).unwrap()
}

pub fn paths(dir: &Path) -> JobPaths {
    JobPaths::resolve(&JobTarget::Token(TOKEN.into()), dir).unwrap()
}

pub fn search_url(start: u32) -> String {
    format!(
        "{}/search.php?st=0&sk=t&sd=d&author_id=42&start={}",
        BASE, start
    )
}

pub fn post_url(topic: &str, post: &str) -> String {
    format!("{}/viewtopic.php?f=2&t={}&p={}", BASE, topic, post)
}

pub fn thread_url(topic: &str) -> String {
    format!("{}/viewtopic.php?f=2&t={}", BASE, topic)
}

pub fn search_page(hits: &[Hit], has_next: bool) -> String {
    let mut html = String::from("<h1>Green Thumbs</h1>\n");
    for (post, topic, title, ts) in hits {
        html.push_str(&format!(
            r#"<div class="search post bg2">
	<div class="inner">
	<div class="postbody">
		<h3><a href="./viewtopic.php?f=2&amp;t={topic}&amp;p={post}#p{post}">Re: {title}</a></h3>
		<div class="content">snippet</div>
	</div>
	<dl class="postprofile">
		<dt class="author">by <a href="./memberlist.php?mode=viewprofile&amp;u=42">alice</a></dt>
		<dd>{ts}</dd>
		<dd>&nbsp;</dd>
		<dd>Forum: <a href="./viewforum.php?f=2">Gardening</a></dd>
		<dd>Topic: <a href="./viewtopic.php?f=2&amp;t={topic}">{title}</a></dd>
	</dl>
	<ul class="searchresults">
		<li ><a href="./viewtopic.php?f=2&amp;t={topic}&amp;p={post}#p{post}" class="right-box right">Jump to post</a></li>
	</ul>
	</div>
</div>
"#
        ));
    }
    if has_next {
        html.push_str(
            r#"<div class="pagination"><span><strong>1</strong><span class="page-sep">, </span><a href="./search.php?st=0&amp;sk=t&amp;sd=d&amp;author_id=42&amp;start=25">2</a></span></div>"#,
        );
    }
    html
}

/// A topic page: (post id, author, timestamp, content).
pub fn topic_page(title: &str, posts: &[(&str, &str, &str, &str)], has_next: bool) -> String {
    let mut html = format!("<h2><a href=\"./viewtopic.php?f=2&amp;t=1\">{}</a></h2>\n", title);
    if has_next {
        html.push_str(
            r#"<div class="pagination"><strong>1</strong><span class="page-sep">, </span><a href="./viewtopic.php?f=2&amp;t=1&amp;start=10">2</a></div>"#,
        );
    }
    for (id, author, ts, content) in posts {
        html.push_str(&format!(
            r##"<div id="p{id}" class="post bg2">
	<div class="inner">
	<div class="postbody">
		<h3><a href="#p{id}">{title}</a></h3>
		<p class="author">by <strong><a href="./memberlist.php?mode=viewprofile&amp;u=7">{author}</a></strong> &raquo; {ts} </p>
		<div class="content">{content}</div>

		</div>

		<dl class="postprofile" id="profile{id}">
		</dl>
	</div>
</div>
"##
        ));
    }
    html
}

/// Collaborators a test keeps handles on.
pub struct Harness {
    pub transport: MockTransport,
    pub output: MemoryOutputWriter,
    pub notifier: RecordingNotifier,
    pub launcher: RecordingLauncher,
}

impl Harness {
    pub fn new(transport: MockTransport) -> Self {
        Self {
            transport,
            output: MemoryOutputWriter::new(),
            notifier: RecordingNotifier::new(),
            launcher: RecordingLauncher::new(),
        }
    }

    pub fn runner(&self, dir: &Path, state: JobState, options: RunOptions) -> StageRunner {
        let paths = paths(dir);
        let client = FetchClient::new(
            Box::new(self.transport.clone()),
            validator(),
            RateLimiter::new(Duration::from_secs(state.settings.delay_seconds)),
            CancellationWatcher::new(&paths.cancel_marker),
        );
        let continuation =
            ContinuationCommand::new("/usr/local/bin/post-scraper", JobTarget::Token(TOKEN.into()));
        StageRunner::new(
            state,
            adapter_for(ForumKind::PhpBb).unwrap(),
            client,
            paths,
            continuation,
        )
        .with_options(options)
        .with_output(Box::new(self.output.clone()))
        .with_notifier(Box::new(self.notifier.clone()))
        .with_launcher(Box::new(self.launcher.clone()))
    }
}

pub fn fresh_state(dir: &Path, settings: Settings, budget: u64) -> JobState {
    JobState::new(TOKEN, settings, paths(dir).cookies, budget)
}

/// Last line of the status file.
pub fn last_status(dir: &Path) -> String {
    std::fs::read_to_string(paths(dir).status)
        .unwrap_or_default()
        .lines()
        .last()
        .unwrap_or_default()
        .to_string()
}
