//! Integration tests for whole-forum jobs.

mod common;

use common::*;
use post_scraper::{MockTransport, RunOptions, RunOutcome, Stage};
use tempfile::TempDir;

fn forum_page() -> String {
    r#"
<h2><a href="./viewforum.php?f=2">Gardening</a></h2>
<ul class="topiclist topics">
<li class="row bg1"><dl><dt><a href="./viewtopic.php?f=2&amp;t=10" class="topictitle">Garden plans</a></dt></dl></li>
<li class="row bg2"><dl><dt><a href="./viewtopic.php?f=2&amp;t=11" class="topictitle">Compost</a></dt></dl></li>
</ul>
"#
    .to_string()
}

fn board() -> MockTransport {
    MockTransport::new()
        .with_page(format!("{}/viewforum.php?f=2&start=0", BASE), forum_page())
        .with_page(
            format!("{}/viewtopic.php?f=2&t=10&start=0", BASE),
            topic_page(
                "Garden plans",
                &[
                    ("100", "bob", "Sun Sep 27, 2015 8:00 am", "What should we plant?"),
                    ("101", "alice", "Mon Sep 28, 2015 6:05 pm", "Tomatoes again."),
                ],
                true,
            ),
        )
        .with_page(
            format!("{}/viewtopic.php?f=2&t=10&start=10", BASE),
            topic_page(
                "Garden plans",
                &[("106", "carol", "Tue Sep 29, 2015 7:30 am", "Beans.")],
                false,
            ),
        )
        .with_page(
            format!("{}/viewtopic.php?f=2&t=11&start=0", BASE),
            topic_page(
                "Compost",
                &[("110", "dave", "Wed Sep 30, 2015 12:00 pm", "Turn it weekly.")],
                false,
            ),
        )
}

#[tokio::test(start_paused = true)]
async fn test_forum_job_collects_every_topic_page() {
    let dir = TempDir::new().unwrap();
    let harness = Harness::new(board());
    let state = fresh_state(dir.path(), forum_settings(), 3600);
    assert_eq!(state.stage, Stage::InitForums);

    let options = RunOptions {
        login: true,
        skip_unit: false,
    };
    let outcome = harness.runner(dir.path(), state, options).run().await.unwrap();
    assert_eq!(outcome, RunOutcome::Finished);
    assert!(last_status(dir.path()).ends_with("DONE"));

    let state = harness.output.last().unwrap();
    let forum = &state.forums["2"];
    assert!(forum.complete);
    assert_eq!(forum.title.as_deref(), Some("Gardening"));
    assert_eq!(forum.topics.len(), 2);
    assert!(forum.topics.iter().all(|t| t.complete));

    let plans = &state.threads["10"];
    assert_eq!(plans.forum, "Gardening");
    assert_eq!(plans.author.as_deref(), Some("bob"));
    assert_eq!(
        plans.posts.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["100", "101", "106"]
    );
    assert_eq!(plans.posts["106"].author.as_deref(), Some("carol"));
    assert!(plans.posts["106"].timestamp.is_some());

    let compost = &state.threads["11"];
    assert_eq!(compost.author.as_deref(), Some("dave"));
    assert_eq!(compost.posts["110"].content.as_deref(), Some("Turn it weekly."));

    assert_eq!(state.counters.forum_page_counter, 1);
    assert_eq!(state.counters.topic_page_counter, 3);
    assert_eq!(harness.transport.request_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_skipping_a_topic_leaves_it_unfetched() {
    let dir = TempDir::new().unwrap();
    let harness = Harness::new(board());
    let mut state = fresh_state(dir.path(), forum_settings(), 3600);

    // Stop after the forum listing by running with the topic pages missing
    let listing_only = Harness::new(MockTransport::new().with_page(
        format!("{}/viewforum.php?f=2&start=0", BASE),
        forum_page(),
    ));
    let err = listing_only
        .runner(dir.path(), state.clone(), RunOptions::default())
        .run()
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), 2);

    state = post_scraper::Checkpointer::new(paths(dir.path()).checkpoint)
        .load()
        .unwrap();
    assert_eq!(state.stage, Stage::TopicPagination);

    let options = RunOptions {
        login: false,
        skip_unit: true,
    };
    harness.runner(dir.path(), state, options).run().await.unwrap();

    let state = harness.output.last().unwrap();
    assert!(state.threads["10"].posts.is_empty());
    assert_eq!(state.threads["11"].posts.len(), 1);
    assert_eq!(harness.transport.count_for(&format!("{}/viewtopic.php?f=2&t=10&start=0", BASE)), 0);
}
