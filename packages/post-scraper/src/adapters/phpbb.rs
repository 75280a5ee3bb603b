//! phpBB 3.x (prosilver and subsilver2 skins).

use super::rules::{Field, RuleId, RuleSet, RuleSpec};
use super::{hit_from_record, ForumAdapter, ForumKind, LoginForm, SearchAdvance, SearchHit};
use crate::error::AdapterError;
use crate::security::LoginCredentials;
use crate::types::settings::Settings;
use crate::types::state::SearchCursor;
use crate::types::thread::Thread;

/// Results per search page on a stock board.
const SEARCH_PAGE_SIZE: u32 = 25;
const TOPICS_PER_PAGE: u32 = 25;
const POSTS_PER_PAGE: u32 = 10;

const RULES: &[RuleSpec] = &[
    // ---- prosilver ----
    RuleSpec {
        rule: RuleId::BoardTitle,
        skin: "prosilver",
        pattern: r#"<h1>([^<]+)</h1>"#,
        fields: &[Field::Value],
    },
    RuleSpec {
        rule: RuleId::LoginHiddenField,
        skin: "prosilver",
        pattern: r#"<input type="hidden" name="([^"]+)" value="([^"]*)""#,
        fields: &[Field::Name, Field::Value],
    },
    RuleSpec {
        rule: RuleId::LoginSuccess,
        skin: "prosilver",
        pattern: r#"<div class="panel" id="message">"#,
        fields: &[],
    },
    RuleSpec {
        rule: RuleId::LoginRequired,
        skin: "prosilver",
        pattern: r#"<form action="\./ucp\.php\?mode=login[^"]*" method="post""#,
        fields: &[],
    },
    RuleSpec {
        rule: RuleId::UserName,
        skin: "prosilver",
        pattern: r#"(?s)<dl class="left-box details"[^>]*>\s*<dt>[^<]*</dt>\s*<dd>\s*<span>([^<]+)</span>"#,
        fields: &[Field::Value],
    },
    RuleSpec {
        rule: RuleId::ThreadAuthor,
        skin: "prosilver",
        pattern: r#"(?s)<p class="author">.*?memberlist\.php\?mode=viewprofile[^"]*"[^>]*>([^<]+)</a>"#,
        fields: &[Field::Value],
    },
    RuleSpec {
        rule: RuleId::SearchNoResults,
        skin: "prosilver",
        pattern: r#"(?s)<div class="panel" id="message">\s*<div class="inner">.*?<h2>"#,
        fields: &[],
    },
    // 3.0 layout: subject first, profile block after.
    RuleSpec {
        rule: RuleId::SearchHits,
        skin: "prosilver",
        pattern: r#"(?s)<h3><a href="[^"]*">([^<]*)</a></h3>.*?<dl class="postprofile">\s*<dt[^>]*>.*?</dt>\s*<dd>([^<]+)</dd>.*?<dd>[^:<]*: <a href="[^"]*viewforum\.php\?f=\d+[^"]*">([^<]*)</a></dd>\s*<dd>[^:<]*: <a href="[^"]*">([^<]*)</a></dd>.*?viewtopic\.php\?f=(\d+)&amp;t=(\d+)&amp;p=(\d+)"#,
        fields: &[
            Field::Title,
            Field::Ts,
            Field::Forum,
            Field::Topic,
            Field::ForumId,
            Field::TopicId,
            Field::PostId,
        ],
    },
    // 3.1 layout: profile block first, subject links to the post.
    RuleSpec {
        rule: RuleId::SearchHits,
        skin: "prosilver-3.1",
        pattern: r#"(?s)<dl class="postprofile">.*?<dd class="search-result-date">([^<]+)</dd>\s*<dd>[^:<]*: <a href="[^"]*viewforum\.php\?f=\d+[^"]*">([^<]*)</a></dd>\s*<dd>[^:<]*: <a href="[^"]*">([^<]*)</a></dd>.*?<h3><a href="[^"]*viewtopic\.php\?f=(\d+)&amp;t=(\d+)&amp;p=(\d+)[^"]*">([^<]*)</a></h3>"#,
        fields: &[
            Field::Ts,
            Field::Forum,
            Field::Topic,
            Field::ForumId,
            Field::TopicId,
            Field::PostId,
            Field::Title,
        ],
    },
    RuleSpec {
        rule: RuleId::SearchNextPage,
        skin: "prosilver",
        pattern: r#"<strong>\d+</strong><span class="page-sep">, </span><a href="\./search\.php\?"#,
        fields: &[],
    },
    RuleSpec {
        rule: RuleId::SearchNextPage,
        skin: "prosilver-3.1",
        pattern: r#"<a href="\./search\.php\?[^"]*" rel="next""#,
        fields: &[],
    },
    RuleSpec {
        rule: RuleId::PostContents,
        skin: "prosilver",
        pattern: r#"(?s)<div id="p(\d+)"[^>]*>.*?<div class="content">(.*?)</div>\s*(?:<dl class="attachbox"|<div id="sig\d+"|<div class="notice"|<div class="rules"|</div>\s*<dl class="postprofile"|</div>\s*<div class="back2top")"#,
        fields: &[Field::PostId, Field::Content],
    },
    RuleSpec {
        rule: RuleId::PrevPage,
        skin: "prosilver",
        pattern: r#"<a href="\./viewtopic\.php\?f=(\d+)&amp;t=(\d+)(?:&amp;start=(\d+))?[^"]*">\d+</a><span class="page-sep">, </span><strong>\d+</strong>"#,
        fields: &[Field::ForumId, Field::TopicId, Field::Start],
    },
    RuleSpec {
        rule: RuleId::PrevPage,
        skin: "prosilver-3.1",
        pattern: r#"<a href="\./viewtopic\.php\?f=(\d+)&amp;t=(\d+)(?:&amp;start=(\d+))?[^"]*" rel="prev""#,
        fields: &[Field::ForumId, Field::TopicId, Field::Start],
    },
    RuleSpec {
        rule: RuleId::NextPage,
        skin: "prosilver",
        pattern: r#"<strong>\d+</strong><span class="page-sep">, </span><a href="\./viewtopic\.php\?f=(\d+)&amp;t=(\d+)&amp;start=(\d+)[^"]*">"#,
        fields: &[Field::ForumId, Field::TopicId, Field::Start],
    },
    RuleSpec {
        rule: RuleId::NextPage,
        skin: "prosilver-3.1",
        pattern: r#"<a href="\./viewtopic\.php\?f=(\d+)&amp;t=(\d+)&amp;start=(\d+)[^"]*" rel="next""#,
        fields: &[Field::ForumId, Field::TopicId, Field::Start],
    },
    RuleSpec {
        rule: RuleId::ForumTitle,
        skin: "prosilver",
        pattern: r#"<h2(?: class="forum-title")?><a href="\./viewforum\.php\?f=\d+[^"]*">([^<]+)</a></h2>"#,
        fields: &[Field::Value],
    },
    RuleSpec {
        rule: RuleId::ForumTopics,
        skin: "prosilver",
        pattern: r#"<a [^>]*?href="\./viewtopic\.php\?f=\d+&amp;t=(\d+)[^"]*"[^>]*class="topictitle"[^>]*>([^<]*)</a>"#,
        fields: &[Field::TopicId, Field::Topic],
    },
    RuleSpec {
        rule: RuleId::ListingNextPage,
        skin: "prosilver",
        pattern: r#"<strong>\d+</strong><span class="page-sep">, </span><a href="\./view(?:forum|topic)\.php\?"#,
        fields: &[],
    },
    RuleSpec {
        rule: RuleId::ListingNextPage,
        skin: "prosilver-3.1",
        pattern: r#"<a href="\./view(?:forum|topic)\.php\?[^"]*" rel="next""#,
        fields: &[],
    },
    RuleSpec {
        rule: RuleId::TopicPosts,
        skin: "prosilver",
        pattern: r#"(?s)<div id="p(\d+)"[^>]*>.*?<p class="author">.*?<a href="[^"]*memberlist\.php\?mode=viewprofile[^"]*"[^>]*>([^<]*)</a></strong>(?:[^<]*</span>)?([^<]*)</p>\s*<div class="content">(.*?)</div>\s*(?:<dl class="attachbox"|<div id="sig\d+"|<div class="notice"|<div class="rules"|</div>\s*<dl class="postprofile"|</div>\s*<div class="back2top")"#,
        fields: &[Field::PostId, Field::Author, Field::Ts, Field::Content],
    },
    // ---- subsilver2 ----
    RuleSpec {
        rule: RuleId::BoardTitle,
        skin: "subsilver",
        pattern: r#"<title>([^<]+?) &bull; "#,
        fields: &[Field::Value],
    },
    RuleSpec {
        rule: RuleId::LoginSuccess,
        skin: "subsilver",
        pattern: r#"<td class="row1" align="center"><br /><p class="gen">"#,
        fields: &[],
    },
    RuleSpec {
        rule: RuleId::UserName,
        skin: "subsilver",
        pattern: r#"<td align="center"><b class="gen">([^<]*)</b></td>"#,
        fields: &[Field::Value],
    },
    RuleSpec {
        rule: RuleId::ThreadAuthor,
        skin: "subsilver",
        pattern: r#"<b class="postauthor">(?:<a [^>]*>)?([^<]+)"#,
        fields: &[Field::Value],
    },
    RuleSpec {
        rule: RuleId::SearchNoResults,
        skin: "subsilver",
        pattern: r#"<td class="row1" align="center"><br /><p class="gen">[^<]*</p><br /></td>"#,
        fields: &[],
    },
    // Hits made by posts without a subject show `[ ... ]` instead of one.
    RuleSpec {
        rule: RuleId::SearchHits,
        skin: "subsilver",
        pattern: r#"(?s)<tr class="row2">\s*<td colspan="2" height="25"><p class="topictitle"><a name="p(\d+)" id="p\d+"></a>&nbsp;[^:<]*: <a href="\./viewforum\.php\?f=(\d+)[^"]*">([^<]*)</a> &nbsp; [^:<]*: <a href="\./viewtopic\.php\?f=\d+&amp;t=(\d+)[^"]*">([^<]+)</a> </p></td>.*?<div style="float: left;">\s*(?:&nbsp;<b>[^:<]*:</b> <a href="[^"]*">([^<]*)</a>|\[[^\]]*\])\s*</div>\s*<div style="float: right;"><b>[^:<]*:</b>\s(.*?)&nbsp;</div>"#,
        fields: &[
            Field::PostId,
            Field::ForumId,
            Field::Forum,
            Field::TopicId,
            Field::Topic,
            Field::Title,
            Field::Ts,
        ],
    },
    RuleSpec {
        rule: RuleId::PostContents,
        skin: "subsilver",
        pattern: r#"(?s)<a name="p(\d+)"></a>.*?<div class="postbody">(.*?)</div>\s*(?:<br clear="all" />|<span class="gensmall">|</td>)"#,
        fields: &[Field::PostId, Field::Content],
    },
    // ---- post content references ----
    RuleSpec {
        rule: RuleId::AssetRefs,
        skin: "img",
        pattern: r#"<img\s[^>]*?src="([^"]+)""#,
        fields: &[Field::Value],
    },
    RuleSpec {
        rule: RuleId::AssetRefs,
        skin: "attachment",
        pattern: r#"href="([^"]*download/file\.php\?id=\d+[^"]*)""#,
        fields: &[Field::Value],
    },
];

/// phpBB adapter.
pub struct PhpBbAdapter {
    rules: RuleSet,
}

impl PhpBbAdapter {
    pub fn new() -> Result<Self, AdapterError> {
        Ok(Self {
            rules: RuleSet::compile(RULES)?,
        })
    }

    fn topic_url(settings: &Settings, forum_id: &str, topic_id: &str, start: Option<u32>) -> String {
        let mut url = format!(
            "{}/viewtopic.php?f={}&t={}",
            settings.base_url, forum_id, topic_id
        );
        if let Some(start) = start {
            url.push_str(&format!("&start={}", start));
        }
        url
    }
}

impl ForumAdapter for PhpBbAdapter {
    fn kind(&self) -> ForumKind {
        ForumKind::PhpBb
    }

    fn rules(&self) -> &RuleSet {
        &self.rules
    }

    fn user_page_url(&self, settings: &Settings, user_id: &str) -> String {
        format!(
            "{}/memberlist.php?mode=viewprofile&u={}",
            settings.base_url, user_id
        )
    }

    fn search_url(&self, settings: &Settings, user_id: &str, cursor: &SearchCursor) -> String {
        format!(
            "{}/search.php?st=0&sk=t&sd=d&author_id={}&start={}",
            settings.base_url, user_id, cursor.position
        )
    }

    fn post_url(&self, settings: &Settings, thread: &Thread, post_id: &str) -> String {
        format!(
            "{}/viewtopic.php?f={}&t={}&p={}",
            settings.base_url,
            thread.forum_id,
            thread.forum_thread_id(),
            post_id
        )
    }

    fn thread_url(&self, settings: &Settings, thread: &Thread, start: Option<u32>) -> String {
        Self::topic_url(settings, &thread.forum_id, thread.forum_thread_id(), start)
    }

    fn forum_page_url(&self, settings: &Settings, forum_id: &str, page: u32) -> String {
        format!(
            "{}/viewforum.php?f={}&start={}",
            settings.base_url,
            forum_id,
            page * TOPICS_PER_PAGE
        )
    }

    fn topic_page_url(&self, settings: &Settings, thread: &Thread, page: u32) -> String {
        self.thread_url(settings, thread, Some(page * POSTS_PER_PAGE))
    }

    fn login_url(&self, settings: &Settings) -> Option<String> {
        Some(format!("{}/ucp.php?mode=login", settings.base_url))
    }

    fn initial_search_cursor(&self) -> SearchCursor {
        SearchCursor::default()
    }

    fn advance_search_cursor(
        &self,
        _settings: &Settings,
        _user_id: &str,
        cursor: &SearchCursor,
        html: &str,
        hits: usize,
    ) -> SearchAdvance {
        if hits == 0 || !self.rules.is_match(RuleId::SearchNextPage, html) {
            return SearchAdvance::LastPage;
        }
        SearchAdvance::Next(SearchCursor {
            search_id: cursor.search_id.clone(),
            position: cursor.position + hits as u32,
        })
    }

    fn skip_search_page(&self, cursor: &SearchCursor) -> SearchCursor {
        SearchCursor {
            search_id: cursor.search_id.clone(),
            position: cursor.position + SEARCH_PAGE_SIZE,
        }
    }

    fn search_hits(&self, html: &str) -> Vec<SearchHit> {
        self.rules
            .combined(RuleId::SearchHits, html)
            .iter()
            .filter_map(hit_from_record)
            .collect()
    }

    // Posts sometimes render on the neighbouring page of their thread.
    fn fallback_urls(&self, settings: &Settings, _thread: &Thread, html: &str) -> Vec<String> {
        [self.prev_page(html), self.next_page(html)]
            .into_iter()
            .flatten()
            .map(|p| Self::topic_url(settings, &p.forum_id, &p.topic_id, p.start))
            .collect()
    }

    fn login_form(
        &self,
        settings: &Settings,
        credentials: &LoginCredentials,
        login_page_html: &str,
    ) -> Result<LoginForm, AdapterError> {
        let action = self.login_url(settings).unwrap_or_default();
        let mut fields: Vec<(String, String)> = self
            .rules
            .combined(RuleId::LoginHiddenField, login_page_html)
            .into_iter()
            .filter_map(|r| Some((r.text(Field::Name)?, r.get(Field::Value)?.to_string())))
            .collect();
        if !fields.iter().any(|(name, _)| name == "sid") {
            return Err(AdapterError::LoginFormNotFound { url: action });
        }

        fields.retain(|(name, _)| !matches!(name.as_str(), "username" | "password" | "login"));
        fields.push(("username".into(), credentials.user.clone()));
        fields.push(("password".into(), credentials.password.expose().to_string()));
        fields.push(("login".into(), "Login".into()));
        Ok(LoginForm { action, fields })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{HitKind, PagePointer};
    use crate::security::UrlValidator;

    fn settings() -> Settings {
        let validator = UrlValidator::new().allow_host("forum.test");
        Settings::parse(
            "base_url=https://forum.test/board/\nforum_type=phpbb\nextract_user_id=42",
            &validator,
        )
        .unwrap()
    }

    fn adapter() -> PhpBbAdapter {
        PhpBbAdapter::new().unwrap()
    }

    const PROSILVER_SEARCH: &str = r#"
<div class="search post bg2">
	<div class="inner"><span class="corners-top"><span></span></span>
	<div class="postbody">
		<h3><a href="./viewtopic.php?f=2&amp;t=10&amp;p=101#p101">Re: Garden plans</a></h3>
		<div class="content">Tomatoes again.</div>
	</div>
	<dl class="postprofile">
		<dt class="author">by <a href="./memberlist.php?mode=viewprofile&amp;u=42">alice</a></dt>
		<dd>Mon Sep 28, 2015 6:05 pm</dd>
		<dd>&nbsp;</dd>
		<dd>Forum: <a href="./viewforum.php?f=2">Gardening</a></dd>
		<dd>Topic: <a href="./viewtopic.php?f=2&amp;t=10">Garden plans</a></dd>
		<dd>Replies: <strong>3</strong></dd>
	</dl>
	<ul class="searchresults">
		<li ><a href="./viewtopic.php?f=2&amp;t=10&amp;p=101#p101" class="right-box right">Jump to post</a></li>
	</ul>
	<span class="corners-bottom"><span></span></span></div>
</div>
<div class="search post bg1">
	<div class="inner"><span class="corners-top"><span></span></span>
	<div class="postbody">
		<h3><a href="./viewtopic.php?f=5&amp;t=77&amp;p=99#p99">Bikes</a></h3>
		<div class="content">Two wheels.</div>
	</div>
	<dl class="postprofile">
		<dt class="author">by <a href="./memberlist.php?mode=viewprofile&amp;u=42">alice</a></dt>
		<dd>Sun Sep 27, 2015 9:00 am</dd>
		<dd>&nbsp;</dd>
		<dd>Forum: <a href="./viewforum.php?f=5">Transport</a></dd>
		<dd>Topic: <a href="./viewtopic.php?f=5&amp;t=77">Bikes</a></dd>
	</dl>
	<ul class="searchresults">
		<li ><a href="./viewtopic.php?f=5&amp;t=77&amp;p=99#p99" class="right-box right">Jump to post</a></li>
	</ul>
	<span class="corners-bottom"><span></span></span></div>
</div>
<div class="pagination">
	Search found 60 matches &bull; Page <strong>1</strong> of <strong>3</strong> &bull; <span><strong>1</strong><span class="page-sep">, </span><a href="./search.php?st=0&amp;sk=t&amp;sd=d&amp;author_id=42&amp;start=25">2</a></span>
</div>
"#;

    const PROSILVER_31_SEARCH: &str = r#"
<div class="search post bg2">
	<div class="inner">
	<dl class="postprofile">
		<dt class="author">by <a href="./memberlist.php?mode=viewprofile&amp;u=42" class="username">alice</a></dt>
		<dd class="search-result-date">Mon Sep 28, 2015 6:05 pm</dd>
		<dd>Forum: <a href="./viewforum.php?f=2">Gardening</a></dd>
		<dd>Topic: <a href="./viewtopic.php?f=2&amp;t=10">Garden plans</a></dd>
	</dl>
	<div class="postbody">
		<h3><a href="./viewtopic.php?f=2&amp;t=10&amp;p=101#p101">Re: Garden plans</a></h3>
		<div class="content">Tomatoes again.</div>
	</div>
	</div>
</div>
"#;

    const SUBSILVER_SEARCH: &str = r#"
<tr class="row2">
	<td colspan="2" height="25"><p class="topictitle"><a name="p300" id="p300"></a>&nbsp;Forum: <a href="./viewforum.php?f=3">Chat</a> &nbsp; Topic: <a href="./viewtopic.php?f=3&amp;t=30">Hello all</a> </p></td>
</tr>
<tr class="row1">
	<td width="150" align="center" valign="middle"><b class="postauthor"><a href="./memberlist.php?mode=viewprofile&amp;u=42">alice</a></b></td>
	<td height="25">
		<table width="100%" cellspacing="0" cellpadding="0" border="0">
		<tr>
			<td class="gensmall">
				<div style="float: left;">
				[ Search result ]
				</div>
				<div style="float: right;"><b>Posted:</b> Tue Mar 04, 2014 10:00 am&nbsp;</div>
			</td>
		</tr>
		</table>
	</td>
</tr>
"#;

    const PROSILVER_TOPIC: &str = r##"
<h2><a href="./viewtopic.php?f=2&amp;t=10">Garden plans</a></h2>
<div class="pagination">
	Page <strong>2</strong> of <strong>3</strong> &bull; <span><a href="./viewtopic.php?f=2&amp;t=10">1</a><span class="page-sep">, </span><strong>2</strong><span class="page-sep">, </span><a href="./viewtopic.php?f=2&amp;t=10&amp;start=20">3</a></span>
</div>
<div id="p100" class="post bg2">
	<div class="inner"><span class="corners-top"><span></span></span>
	<div class="postbody">
		<h3 class="first"><a href="#p100">Garden plans</a></h3>
		<p class="author"><a href="./viewtopic.php?p=100#p100"><img src="./styles/prosilver/imageset/icon_post_target.gif" /></a>by <strong><a href="./memberlist.php?mode=viewprofile&amp;u=7">bob</a></strong> &raquo; Sun Sep 27, 2015 8:00 am </p>
		<div class="content">What should we plant?<blockquote><div><cite>carol wrote:</cite>Beans</div></blockquote></div>

		</div>

		<dl class="postprofile" id="profile100">
		</dl>
	</div>
</div>
<div id="p101" class="post bg1">
	<div class="inner"><span class="corners-top"><span></span></span>
	<div class="postbody">
		<h3><a href="#p101">Re: Garden plans</a></h3>
		<p class="author"><a href="./viewtopic.php?p=101#p101"><img src="x.gif" /></a>by <strong><a href="./memberlist.php?mode=viewprofile&amp;u=42">alice</a></strong> &raquo; Mon Sep 28, 2015 6:05 pm </p>
		<div class="content">Tomatoes again. <img src="./download/file.php?id=5" alt="pic" /></div>

		<div id="sig101" class="signature">alice's sig</div>
		</div>
	</div>
</div>
"##;

    #[test]
    fn test_urls() {
        let s = settings();
        let a = adapter();
        let thread = Thread::new("10", "Garden plans", "Gardening", "2");
        assert_eq!(
            a.search_url(&s, "42", &SearchCursor { search_id: None, position: 25 }),
            "https://forum.test/board/search.php?st=0&sk=t&sd=d&author_id=42&start=25"
        );
        assert_eq!(
            a.post_url(&s, &thread, "101"),
            "https://forum.test/board/viewtopic.php?f=2&t=10&p=101"
        );
        assert_eq!(
            a.user_page_url(&s, "42"),
            "https://forum.test/board/memberlist.php?mode=viewprofile&u=42"
        );
        assert_eq!(
            a.topic_page_url(&s, &thread, 2),
            "https://forum.test/board/viewtopic.php?f=2&t=10&start=20"
        );
        assert_eq!(
            a.forum_page_url(&s, "2", 1),
            "https://forum.test/board/viewforum.php?f=2&start=25"
        );
    }

    #[test]
    fn test_prosilver_search_hits() {
        let hits = adapter().search_hits(PROSILVER_SEARCH);
        assert_eq!(hits.len(), 2);
        assert_eq!(
            hits[0],
            SearchHit {
                kind: HitKind::Post,
                post_id: "101".into(),
                title: "Re: Garden plans".into(),
                ts_raw: "Mon Sep 28, 2015 6:05 pm".into(),
                forum: "Gardening".into(),
                forum_id: "2".into(),
                topic: "Garden plans".into(),
                topic_id: Some("10".into()),
            }
        );
        assert_eq!(hits[1].post_id, "99");
        assert_eq!(hits[1].topic_id.as_deref(), Some("77"));
    }

    #[test]
    fn test_prosilver_31_search_hits_do_not_cross_match() {
        let hits = adapter().search_hits(PROSILVER_31_SEARCH);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].post_id, "101");
        assert_eq!(hits[0].title, "Re: Garden plans");
        assert_eq!(hits[0].ts_raw, "Mon Sep 28, 2015 6:05 pm");
    }

    #[test]
    fn test_subsilver_hit_without_subject_uses_topic() {
        let hits = adapter().search_hits(SUBSILVER_SEARCH);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].post_id, "300");
        assert_eq!(hits[0].title, "Hello all");
        assert_eq!(hits[0].forum_id, "3");
        assert_eq!(hits[0].ts_raw, "Tue Mar 04, 2014 10:00 am");
    }

    #[test]
    fn test_cursor_advances_by_hit_count_until_no_next_link() {
        let s = settings();
        let a = adapter();
        let cursor = a.initial_search_cursor();

        let next = a.advance_search_cursor(&s, "42", &cursor, PROSILVER_SEARCH, 2);
        assert_eq!(
            next,
            SearchAdvance::Next(SearchCursor { search_id: None, position: 2 })
        );

        let last = a.advance_search_cursor(&s, "42", &cursor, PROSILVER_31_SEARCH, 1);
        assert_eq!(last, SearchAdvance::LastPage);

        assert_eq!(a.skip_search_page(&cursor).position, 25);
    }

    #[test]
    fn test_post_contents_stop_before_signature_and_profile() {
        let posts = adapter().post_contents(PROSILVER_TOPIC);
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].0, "100");
        assert!(posts[0].1.ends_with("</blockquote>"));
        assert_eq!(posts[1].0, "101");
        assert!(posts[1].1.starts_with("Tomatoes again."));
        assert!(!posts[1].1.contains("sig"));
    }

    #[test]
    fn test_neighbour_pages_and_fallback_urls() {
        let a = adapter();
        assert_eq!(
            a.prev_page(PROSILVER_TOPIC),
            Some(PagePointer {
                forum_id: "2".into(),
                topic_id: "10".into(),
                start: None
            })
        );
        assert_eq!(a.next_page(PROSILVER_TOPIC).and_then(|p| p.start), Some(20));

        let thread = Thread::new("10", "Garden plans", "Gardening", "2");
        let urls = a.fallback_urls(&settings(), &thread, PROSILVER_TOPIC);
        assert_eq!(
            urls,
            vec![
                "https://forum.test/board/viewtopic.php?f=2&t=10".to_string(),
                "https://forum.test/board/viewtopic.php?f=2&t=10&start=20".to_string(),
            ]
        );
    }

    #[test]
    fn test_topic_page_posts() {
        let page = adapter().topic_page(PROSILVER_TOPIC);
        assert!(page.has_next);
        assert_eq!(page.posts.len(), 2);
        assert_eq!(page.posts[0].author.as_deref(), Some("bob"));
        assert_eq!(page.posts[1].author.as_deref(), Some("alice"));
        assert_eq!(page.posts[1].ts_raw, "&raquo; Mon Sep 28, 2015 6:05 pm");
        assert_eq!(adapter().thread_author(PROSILVER_TOPIC).as_deref(), Some("bob"));
    }

    #[test]
    fn test_forum_page() {
        let html = r#"
<h2><a href="./viewforum.php?f=2">Gardening</a></h2>
<ul class="topiclist topics">
<li class="row bg1"><dl><dt><a href="./viewtopic.php?f=2&amp;t=10" class="topictitle">Garden plans</a></dt></dl></li>
<li class="row bg2"><dl><dt><a href="./viewtopic.php?f=2&amp;t=11" class="topictitle">Compost</a></dt></dl></li>
</ul>
"#;
        let page = adapter().forum_page(html);
        assert_eq!(page.title.as_deref(), Some("Gardening"));
        assert_eq!(page.topics.len(), 2);
        assert_eq!(page.topics[1].id, "11");
        assert_eq!(page.topics[1].title, "Compost");
        assert!(!page.has_next);
    }

    #[test]
    fn test_login_form_keeps_hidden_fields() {
        let html = r#"<form action="./ucp.php?mode=login" method="post" id="login">
<input type="hidden" name="redirect" value="./ucp.php?mode=login" />
<input type="hidden" name="sid" value="abc123" />
</form>"#;
        let creds = LoginCredentials::new("alice", "hunter2");
        let form = adapter().login_form(&settings(), &creds, html).unwrap();
        assert_eq!(form.action, "https://forum.test/board/ucp.php?mode=login");
        assert!(form.fields.contains(&("sid".into(), "abc123".into())));
        assert!(form.fields.contains(&("password".into(), "hunter2".into())));
        assert!(adapter().login_required(html));
    }

    #[test]
    fn test_login_form_without_sid_is_an_error() {
        let creds = LoginCredentials::new("alice", "hunter2");
        let err = adapter()
            .login_form(&settings(), &creds, "<html></html>")
            .unwrap_err();
        assert!(matches!(err, AdapterError::LoginFormNotFound { .. }));
    }

    #[test]
    fn test_user_name_and_board_title() {
        let html = r#"<h1>Green Thumbs</h1>
<dl class="left-box details" style="width: 80%;">
	<dt>Username:</dt>
	<dd>
		<span>alice</span>
	</dd>
</dl>"#;
        let a = adapter();
        assert_eq!(a.user_name(html).as_deref(), Some("alice"));
        assert_eq!(a.board_title(html).as_deref(), Some("Green Thumbs"));
    }

    #[test]
    fn test_asset_refs_are_deduplicated() {
        let content = r#"<img src="./images/smilies/icon_e_smile.gif" alt=":)" /> look
<img class="postimage" src="https://pics.example.net/a.jpg" alt="Image" />
<a href="./download/file.php?id=12&amp;mode=view">photo.png</a>
<img src="./images/smilies/icon_e_smile.gif" alt=":)" />"#;
        assert_eq!(
            adapter().asset_refs(content),
            vec![
                "./images/smilies/icon_e_smile.gif".to_string(),
                "https://pics.example.net/a.jpg".to_string(),
                "./download/file.php?id=12&amp;mode=view".to_string(),
            ]
        );
    }
}
