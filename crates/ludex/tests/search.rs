// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for the search session.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use ludex::{
    ConnectivityProber, ProberOptions, SearchOptions, SearchSession, SearchSnapshot, SearchStatus, SearchStrategy,
    SessionOptions, SourcePreference,
};
use ludex_cache::{CacheOptions, EntityCache, EntityLookup, Provenance, UpstreamLoader};
use ludex_upstream::testing::{MockUpstream, UpstreamCall};
use ludex_upstream::{ErrorKind, Game, GameId, SourceId};
use pretty_assertions::assert_eq;
use tick::ClockControl;

fn game(id: &str, source: &str) -> Game {
    Game::new(id, source, format!("Game {id}"))
}

fn games(count: usize, source: &str) -> Vec<Game> {
    (1..=count).map(|i| game(&i.to_string(), source)).collect()
}

fn ids(snapshot: &SearchSnapshot) -> Vec<&str> {
    snapshot.result.items.iter().map(|g| g.id.as_str()).collect()
}

fn sources(names: &[&str]) -> BTreeSet<SourceId> {
    names.iter().map(|n| SourceId::new(*n)).collect()
}

fn session(upstream: &MockUpstream, control: &ClockControl, options: SessionOptions) -> SearchSession<MockUpstream> {
    SearchSession::builder(Arc::new(upstream.clone()), control.to_clock())
        .options(options)
        .build()
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn typing_within_the_debounce_window_issues_one_request() {
    let control = ClockControl::new();
    let upstream = MockUpstream::new(["catalog"]);
    upstream.add_results("catalog", "abc", games(1, "catalog"));
    let session = session(&upstream, &control, SessionOptions::default());

    session.set_query("ab");
    settle().await;
    control.advance(Duration::from_millis(200));
    settle().await;
    session.set_query("abc");
    settle().await;
    control.advance(Duration::from_millis(200));
    settle().await;

    assert!(upstream.search_calls().is_empty());

    control.advance(Duration::from_millis(150));
    settle().await;

    let calls = upstream.search_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1.text, "abc");
    assert_eq!(calls[0].1.page, 1);

    let snapshot = session.snapshot();
    assert_eq!(snapshot.status, SearchStatus::Succeeded);
    assert_eq!(snapshot.query, "abc");
    assert_eq!(ids(&snapshot), ["1"]);
    assert_eq!(session.debounced_query(), "abc");
}

#[tokio::test]
async fn settled_input_equal_to_the_last_search_is_not_reissued() {
    let control = ClockControl::new();
    let upstream = MockUpstream::new(["catalog"]);
    let session = session(&upstream, &control, SessionOptions::default());

    session.search("zelda").await;
    session.set_query("  zelda ");
    settle().await;
    control.advance(Duration::from_millis(400));
    settle().await;

    assert_eq!(upstream.search_calls().len(), 1);
}

#[tokio::test]
async fn auto_search_can_be_disabled() {
    let control = ClockControl::new();
    let upstream = MockUpstream::new(["catalog"]);
    let session = session(&upstream, &control, SessionOptions::default().auto_search(false));

    session.set_query("zelda");
    settle().await;
    control.advance(Duration::from_secs(1));
    settle().await;

    assert!(upstream.search_calls().is_empty());
    assert_eq!(session.debounced_query(), "zelda");
    assert_eq!(session.snapshot().status, SearchStatus::Idle);
}

#[tokio::test]
async fn superseded_responses_never_overwrite_newer_results() {
    let control = ClockControl::new();
    let upstream = MockUpstream::new(["catalog"]).with_clock(control.to_clock());
    upstream.add_results("catalog", "zelda", vec![game("z", "catalog")]);
    upstream.add_results("catalog", "mario", vec![game("m", "catalog")]);
    upstream.set_latency("zelda", Duration::from_secs(1));
    let session = session(&upstream, &control, SessionOptions::default());

    let (slow, fast) = tokio::join!(session.search("zelda"), async {
        settle().await;
        let fast = session.search("mario").await;
        control.advance(Duration::from_secs(2));
        settle().await;
        fast
    });

    assert_eq!(ids(&fast), ["m"]);
    assert_ne!(ids(&slow), ["z"]);

    let last = session.snapshot();
    assert_eq!(last.query, "mario");
    assert_eq!(ids(&last), ["m"]);
    assert_eq!(last.status, SearchStatus::Succeeded);
    assert_eq!(upstream.search_calls().len(), 2);
}

#[tokio::test]
async fn short_queries_resolve_to_an_empty_result_without_a_request() {
    let control = ClockControl::new();
    let upstream = MockUpstream::new(["catalog"]);
    let session = session(&upstream, &control, SessionOptions::default());

    let snapshot = session.search(" a ").await;

    assert_eq!(snapshot.status, SearchStatus::Idle);
    assert!(snapshot.result.items.is_empty());
    assert_eq!(snapshot.result.total, 0);
    assert_eq!(snapshot.failure, None);
    assert!(!snapshot.has_searched);
    assert!(upstream.search_calls().is_empty());
}

#[tokio::test]
async fn pages_outside_the_result_are_ignored() {
    let control = ClockControl::new();
    let upstream = MockUpstream::new(["catalog"]);
    upstream.add_results("catalog", "metroid", games(45, "catalog"));
    let session = session(&upstream, &control, SessionOptions::default());

    let first = session.search("metroid").await;
    assert_eq!(first.result.total_pages(), 3);
    assert!(first.result.has_next_page);
    assert!(!first.result.has_previous_page);

    assert!(!session.go_to_page(0).await);
    assert!(!session.go_to_page(4).await);
    assert!(!session.previous_page().await);
    assert_eq!(session.snapshot(), first);

    assert!(session.go_to_page(3).await);
    let last = session.snapshot();
    assert_eq!(last.result.page, 3);
    assert_eq!(last.result.items.len(), 5);
    assert!(!last.result.has_next_page);
    assert!(!session.next_page().await);

    assert!(session.previous_page().await);
    assert_eq!(session.snapshot().result.page, 2);

    let pages: Vec<u32> = upstream.search_calls().iter().map(|(_, q)| q.page).collect();
    assert_eq!(pages, [1, 3, 2]);
}

#[tokio::test]
async fn pagination_requires_an_issued_query() {
    let control = ClockControl::new();
    let upstream = MockUpstream::new(["catalog"]);
    let session = session(&upstream, &control, SessionOptions::default());

    assert!(!session.next_page().await);
    assert!(!session.change_page_size(10).await);
}

#[tokio::test]
async fn changing_the_page_size_restarts_at_page_one() {
    let control = ClockControl::new();
    let upstream = MockUpstream::new(["catalog"]);
    upstream.add_results("catalog", "metroid", games(45, "catalog"));
    let session = session(&upstream, &control, SessionOptions::default());

    session.search("metroid").await;
    assert!(session.go_to_page(2).await);
    assert!(!session.change_page_size(0).await);
    assert!(session.change_page_size(10).await);

    let snapshot = session.snapshot();
    assert_eq!(snapshot.result.page, 1);
    assert_eq!(snapshot.result.page_size, 10);
    assert_eq!(snapshot.result.total_pages(), 5);
    assert_eq!(ids(&snapshot).len(), 10);
}

#[tokio::test]
async fn preferred_source_falls_back_when_empty() {
    let control = ClockControl::new();
    let upstream = MockUpstream::new(["a", "b"]);
    upstream.add_results("b", "halo", vec![game("h", "b")]);
    let options = SessionOptions::default().search(SearchOptions::default().strategy(SearchStrategy::Prefer("a".into())));
    let session = session(&upstream, &control, options);

    let snapshot = session.search("halo").await;

    assert_eq!(snapshot.status, SearchStatus::Succeeded);
    assert_eq!(ids(&snapshot), ["h"]);
    assert_eq!(snapshot.result.sources, sources(&["b"]));

    let queried: Vec<SourceId> = upstream.search_calls().into_iter().map(|(s, _)| s).collect();
    assert_eq!(queried, [SourceId::new("a"), SourceId::new("b")]);
}

#[tokio::test]
async fn preferred_source_falls_back_when_failing() {
    let control = ClockControl::new();
    let upstream = MockUpstream::new(["a", "b"]);
    upstream.add_results("a", "halo", vec![game("1", "a")]);
    upstream.add_results("b", "halo", vec![game("2", "b")]);
    upstream.fail_when(|call| match call {
        UpstreamCall::Search { source, .. } if source.as_str() == "b" => Some(ErrorKind::ServiceUnavailable),
        _ => None,
    });
    let options = SessionOptions::default().search(SearchOptions::default().strategy(SearchStrategy::Prefer("b".into())));
    let session = session(&upstream, &control, options);

    let snapshot = session.search("halo").await;

    assert_eq!(ids(&snapshot), ["1"]);
    assert_eq!(snapshot.result.sources, sources(&["a"]));
}

#[tokio::test]
async fn combined_search_merges_and_tolerates_partial_failure() {
    let control = ClockControl::new();
    let upstream = MockUpstream::new(["a", "b", "c"]);
    upstream.add_results("a", "doom", vec![game("1", "a"), game("2", "a")]);
    upstream.add_results("b", "doom", vec![game("2", "b"), game("3", "b")]);
    upstream.fail_when(|call| match call {
        UpstreamCall::Search { source, .. } if source.as_str() == "c" => Some(ErrorKind::Network),
        _ => None,
    });
    let session = session(&upstream, &control, SessionOptions::default());

    let snapshot = session.search("doom").await;

    assert_eq!(snapshot.status, SearchStatus::Succeeded);
    assert_eq!(ids(&snapshot), ["1", "2", "3"]);
    assert_eq!(snapshot.result.items[1].source, SourceId::new("a"));
    assert_eq!(snapshot.result.total, 3);
    assert_eq!(snapshot.result.sources, sources(&["a", "b"]));
}

#[tokio::test]
async fn failures_keep_previous_results() {
    let control = ClockControl::new();
    let upstream = MockUpstream::new(["catalog"]);
    upstream.add_results("catalog", "zelda", vec![game("z", "catalog")]);
    let session = session(&upstream, &control, SessionOptions::default());

    session.search("zelda").await;
    upstream.fail_when(|_| Some(ErrorKind::Network));
    let snapshot = session.search("zelda botw").await;

    assert_eq!(snapshot.status, SearchStatus::Failed);
    assert_eq!(snapshot.query, "zelda botw");
    assert_eq!(ids(&snapshot), ["z"]);
    let failure = snapshot.failure.as_ref().unwrap();
    assert_eq!(failure.kind, ErrorKind::Network);
    assert!(snapshot.should_notify());

    upstream.clear_failures();
    let recovered = session.search("zelda").await;
    assert_eq!(recovered.status, SearchStatus::Succeeded);
    assert_eq!(recovered.failure, None);
}

#[tokio::test]
async fn paging_after_a_failure_continues_from_the_shown_results() {
    let control = ClockControl::new();
    let upstream = MockUpstream::new(["catalog"]);
    upstream.add_results("catalog", "zelda", games(45, "catalog"));
    upstream.fail_when(|call| match call {
        UpstreamCall::Search { query, .. } if query.text == "mario" => Some(ErrorKind::ServiceUnavailable),
        _ => None,
    });
    let session = session(&upstream, &control, SessionOptions::default());

    session.search("zelda").await;
    let failed = session.search("mario").await;
    assert_eq!(failed.status, SearchStatus::Failed);
    assert_eq!(failed.result.total_pages(), 3);

    assert!(session.next_page().await);

    let snapshot = session.snapshot();
    assert_eq!(snapshot.status, SearchStatus::Succeeded);
    assert_eq!(snapshot.query, "zelda");
    assert_eq!(snapshot.result.page, 2);
    assert_eq!(snapshot.result.items.len(), 20);

    let issued: Vec<(String, u32)> = upstream.search_calls().into_iter().map(|(_, q)| (q.text, q.page)).collect();
    assert_eq!(
        issued,
        [("zelda".to_owned(), 1), ("mario".to_owned(), 1), ("zelda".to_owned(), 2)]
    );
}

#[tokio::test]
async fn failed_first_searches_cannot_be_paged() {
    let control = ClockControl::new();
    let upstream = MockUpstream::new(["catalog"]);
    upstream.fail_when(|_| Some(ErrorKind::Network));
    let session = session(&upstream, &control, SessionOptions::default());

    session.search("mario").await;

    assert!(!session.next_page().await);
    assert!(!session.change_page_size(10).await);
    assert_eq!(upstream.search_calls().len(), 1);
}

#[tokio::test]
async fn offline_sources_fail_fast() {
    let control = ClockControl::new();
    let upstream = MockUpstream::new(["a", "b"]);
    upstream.set_reachable("a", false);
    upstream.set_reachable("b", false);
    let prober = ConnectivityProber::new(Arc::new(upstream.clone()), control.to_clock(), ProberOptions::default());
    let session = SearchSession::builder(Arc::new(upstream.clone()), control.to_clock())
        .prober(prober)
        .build();

    let snapshot = session.search("zelda").await;

    assert_eq!(snapshot.status, SearchStatus::Failed);
    assert_eq!(snapshot.failure.map(|f| f.kind), Some(ErrorKind::Network));
    assert!(upstream.search_calls().is_empty());
}

#[tokio::test]
async fn unreachable_sources_are_skipped() {
    let control = ClockControl::new();
    let upstream = MockUpstream::new(["a", "b"]);
    upstream.set_reachable("a", false);
    upstream.add_results("b", "zelda", vec![game("z", "b")]);
    let prober = ConnectivityProber::new(Arc::new(upstream.clone()), control.to_clock(), ProberOptions::default());
    let session = SearchSession::builder(Arc::new(upstream.clone()), control.to_clock())
        .prober(prober)
        .build();

    let snapshot = session.search("zelda").await;

    assert_eq!(ids(&snapshot), ["z"]);
    let queried: Vec<SourceId> = upstream.search_calls().into_iter().map(|(s, _)| s).collect();
    assert_eq!(queried, [SourceId::new("b")]);
}

#[tokio::test]
async fn repeated_searches_are_served_from_the_result_cache() {
    let control = ClockControl::new();
    let upstream = MockUpstream::new(["catalog"]);
    upstream.add_results("catalog", "portal", vec![game("p", "catalog")]);
    let session = session(&upstream, &control, SessionOptions::default());

    let first = session.search("portal").await;
    let second = session.search("Portal").await;

    assert!(!first.result.cache_hit);
    assert!(second.result.cache_hit);
    assert_eq!(ids(&second), ["p"]);
    assert_eq!(upstream.search_calls().len(), 1);

    let stats = session.cache_stats();
    assert_eq!((stats.entries, stats.hits, stats.misses), (1, 1, 1));

    session.clear_cache();
    let third = session.search("portal").await;
    assert!(!third.result.cache_hit);
    assert_eq!(upstream.search_calls().len(), 2);
}

#[tokio::test]
async fn cached_results_expire() {
    let control = ClockControl::new();
    let upstream = MockUpstream::new(["catalog"]);
    let options = SessionOptions::default().result_cache(Duration::from_secs(60), 10);
    let session = session(&upstream, &control, options);

    session.search("portal").await;
    control.advance(Duration::from_secs(60));
    let snapshot = session.search("portal").await;

    assert!(!snapshot.result.cache_hit);
    assert_eq!(upstream.search_calls().len(), 2);
}

#[tokio::test]
async fn uncached_searches_bypass_the_result_cache() {
    let control = ClockControl::new();
    let upstream = MockUpstream::new(["catalog"]);
    let session = session(&upstream, &control, SessionOptions::default());

    session.search("portal").await;
    let snapshot = session.search_with("portal", SearchOptions::default().use_cache(false)).await;

    assert!(!snapshot.result.cache_hit);
    assert_eq!(upstream.search_calls().len(), 2);
}

#[tokio::test]
async fn suggestions_use_the_fastest_source() {
    let control = ClockControl::new();
    let upstream = MockUpstream::new(["a", "b"]);
    upstream.add_results("a", "zel", games(10, "a"));
    let session = session(&upstream, &control, SessionOptions::default());

    let suggestions = session.get_suggestions("zel", 3).await;

    assert_eq!(suggestions.len(), 3);
    let calls = upstream.search_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, SourceId::new("a"));
    assert_eq!(calls[0].1.page_size, 3);
    assert_eq!(session.snapshot(), SearchSnapshot::default());
    assert_eq!(session.cache_stats().entries, 0);
}

#[tokio::test]
async fn failing_suggestions_are_empty_and_leave_the_session_untouched() {
    let control = ClockControl::new();
    let upstream = MockUpstream::new(["catalog"]);
    upstream.add_results("catalog", "zelda", vec![game("z", "catalog")]);
    let session = session(&upstream, &control, SessionOptions::default());

    let before = session.search("zelda").await;
    upstream.fail_when(|_| Some(ErrorKind::ServiceUnavailable));

    assert!(session.get_suggestions("zel", 5).await.is_empty());
    assert!(session.get_suggestions("z", 5).await.is_empty());
    assert_eq!(session.snapshot(), before);
}

#[tokio::test]
async fn clearing_resets_the_session() {
    let control = ClockControl::new();
    let upstream = MockUpstream::new(["catalog"]);
    upstream.add_results("catalog", "zelda", vec![game("z", "catalog")]);
    let session = session(&upstream, &control, SessionOptions::default());

    session.search("zelda").await;
    session.clear_search();

    assert_eq!(session.snapshot(), SearchSnapshot::default());
    assert_eq!(session.debounced_query(), "");
    assert!(!session.next_page().await);
}

#[tokio::test]
async fn subscribers_observe_state_changes() {
    let control = ClockControl::new();
    let upstream = MockUpstream::new(["catalog"]);
    upstream.add_results("catalog", "zelda", vec![game("z", "catalog")]);
    let session = session(&upstream, &control, SessionOptions::default());
    let mut updates = session.subscribe();

    session.search("zelda").await;

    assert!(updates.has_changed().unwrap());
    assert_eq!(updates.borrow_and_update().status, SearchStatus::Succeeded);
}

#[tokio::test]
async fn cached_detail_records_replace_summaries() {
    let control = ClockControl::new();
    let upstream = MockUpstream::new(["catalog"]);
    upstream.add_results("catalog", "zelda", vec![game("1", "catalog"), game("2", "catalog")]);

    let cache = EntityCache::builder(UpstreamLoader::new(Arc::new(upstream.clone())), control.to_clock())
        .options(CacheOptions::default().maintenance(false))
        .build();
    let mut detailed = game("1", "catalog").into_detailed();
    detailed.summary = Some("A link to the past".to_owned());
    cache.put(GameId::new("1"), detailed.clone(), Provenance::Upstream);

    let session = SearchSession::builder(Arc::new(upstream.clone()), control.to_clock())
        .lookup(Arc::new(cache) as Arc<dyn EntityLookup>)
        .build();

    let snapshot = session.search("zelda").await;

    assert_eq!(snapshot.result.items[0], detailed);
    assert!(!snapshot.result.items[1].detailed);
}

#[tokio::test]
async fn pinned_preference_queries_only_that_source() {
    let control = ClockControl::new();
    let upstream = MockUpstream::new(["a", "b"]);
    upstream.add_results("a", "zelda", vec![game("1", "a")]);
    upstream.add_results("b", "zelda", vec![game("2", "b")]);
    let session = session(&upstream, &control, SessionOptions::default());

    let snapshot = session
        .search_with("zelda", SearchOptions::default().preference(SourcePreference::Pinned("b".into())))
        .await;

    assert_eq!(ids(&snapshot), ["2"]);
    assert_eq!(upstream.search_calls().len(), 1);
}
