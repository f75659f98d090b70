// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for listing feeds.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use ludex::{Backoff, ConnectivityProber, FeedOptions, FeedSource, FeedStatus, ListingFeed, ProberOptions};
use ludex_upstream::testing::{MockUpstream, UpstreamCall};
use ludex_upstream::{ErrorKind, Game, Listing, SourceId};
use pretty_assertions::assert_eq;
use tick::ClockControl;
use tracing_test::traced_test;

fn game(id: &str, source: &str) -> Game {
    Game::new(id, source, format!("Game {id}"))
}

fn list_calls(upstream: &MockUpstream) -> usize {
    upstream.count_calls(|call| matches!(call, UpstreamCall::List { .. }))
}

fn fail_listings(upstream: &MockUpstream, kind: ErrorKind) {
    upstream.fail_when(move |call| matches!(call, UpstreamCall::List { .. }).then_some(kind));
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn failures_keep_items_until_a_retry_succeeds() {
    let control = ClockControl::new();
    let upstream = MockUpstream::new(["catalog"]);
    upstream.set_listing("catalog", Listing::Trending, vec![game("1", "catalog"), game("2", "catalog")]);
    let feed = ListingFeed::new(Arc::new(upstream.clone()), control.to_clock(), FeedOptions::default());

    assert_eq!(feed.load(10, FeedSource::Auto).await.len(), 2);
    let loaded = feed.snapshot();
    assert_eq!(loaded.status, FeedStatus::Loaded);
    assert_eq!(loaded.source, Some(SourceId::new("catalog")));
    assert_eq!(loaded.loaded_at, Some(SystemTime::UNIX_EPOCH));

    fail_listings(&upstream, ErrorKind::Network);
    let items = feed.load(10, FeedSource::Auto).await;

    assert_eq!(items, loaded.items);
    let failed = feed.snapshot();
    assert_eq!(failed.status, FeedStatus::Failed);
    assert_eq!(failed.failure.as_ref().map(|f| f.kind), Some(ErrorKind::Network));
    assert_eq!(failed.consecutive_failures, 1);
    assert_eq!(failed.failure.as_ref().and_then(|f| f.detail.as_deref()), Some("injected failure"));
    assert!(feed.should_notify());

    upstream.clear_failures();
    assert_eq!(feed.retry().await.len(), 2);

    let recovered = feed.snapshot();
    assert_eq!(recovered.status, FeedStatus::Loaded);
    assert_eq!(recovered.failure, None);
    assert_eq!(recovered.consecutive_failures, 0);
    assert!(!feed.should_notify());
}

#[tokio::test]
async fn empty_listings_are_not_failures() {
    let control = ClockControl::new();
    let upstream = MockUpstream::new(["catalog"]);
    let feed = ListingFeed::new(Arc::new(upstream.clone()), control.to_clock(), FeedOptions::default());

    assert!(feed.load(10, FeedSource::Auto).await.is_empty());

    let snapshot = feed.snapshot();
    assert_eq!(snapshot.status, FeedStatus::Loaded);
    assert_eq!(snapshot.failure, None);
    assert!(!feed.should_notify());
}

#[tokio::test]
async fn non_retryable_failures_do_not_notify() {
    let control = ClockControl::new();
    let upstream = MockUpstream::new(["catalog"]);
    fail_listings(&upstream, ErrorKind::Validation);
    let feed = ListingFeed::new(Arc::new(upstream.clone()), control.to_clock(), FeedOptions::default());

    feed.load(10, FeedSource::Auto).await;

    assert_eq!(feed.snapshot().status, FeedStatus::Failed);
    assert!(!feed.should_notify());
}

#[tokio::test]
async fn auto_moves_on_to_the_next_source() {
    let control = ClockControl::new();
    let upstream = MockUpstream::new(["a", "b"]);
    upstream.set_listing("b", Listing::Popular, vec![game("1", "b")]);
    upstream.fail_when(|call| match call {
        UpstreamCall::List { source, .. } if source.as_str() == "a" => Some(ErrorKind::ServiceUnavailable),
        _ => None,
    });
    let options = FeedOptions::default().listing(Listing::Popular);
    let feed = ListingFeed::new(Arc::new(upstream.clone()), control.to_clock(), options);

    let items = feed.load(5, FeedSource::Auto).await;

    assert_eq!(items, [game("1", "b")]);
    assert_eq!(feed.snapshot().source, Some(SourceId::new("b")));
    assert_eq!(feed.snapshot().failure, None);
}

#[tokio::test]
async fn pinned_loads_query_only_that_source() {
    let control = ClockControl::new();
    let upstream = MockUpstream::new(["a", "b"]);
    let feed = ListingFeed::new(Arc::new(upstream.clone()), control.to_clock(), FeedOptions::default());

    feed.load(5, FeedSource::Pinned("b".into())).await;

    assert_eq!(
        upstream.calls(),
        [UpstreamCall::List {
            source: SourceId::new("b"),
            listing: Listing::Trending,
            limit: 5,
        }]
    );
}

#[tokio::test]
async fn unreachable_sources_are_skipped() {
    let control = ClockControl::new();
    let upstream = MockUpstream::new(["a", "b"]);
    upstream.set_reachable("a", false);
    upstream.set_listing("a", Listing::Trending, vec![game("1", "a")]);
    upstream.set_listing("b", Listing::Trending, vec![game("2", "b")]);
    let prober = ConnectivityProber::new(Arc::new(upstream.clone()), control.to_clock(), ProberOptions::default());
    let feed = ListingFeed::with_prober(Arc::new(upstream.clone()), control.to_clock(), FeedOptions::default(), prober);

    let items = feed.load(5, FeedSource::Auto).await;

    assert_eq!(items, [game("2", "b")]);
    assert_eq!(list_calls(&upstream), 1);
}

#[tokio::test]
async fn retry_repeats_the_last_request() {
    let control = ClockControl::new();
    let upstream = MockUpstream::new(["a", "b"]);
    let feed = ListingFeed::new(Arc::new(upstream.clone()), control.to_clock(), FeedOptions::default());

    feed.load(3, FeedSource::Pinned("b".into())).await;
    upstream.clear_calls();
    feed.retry().await;

    assert_eq!(
        upstream.calls(),
        [UpstreamCall::List {
            source: SourceId::new("b"),
            listing: Listing::Trending,
            limit: 3,
        }]
    );
}

#[tokio::test]
async fn polling_backs_off_after_failures() {
    let control = ClockControl::new();
    let upstream = MockUpstream::new(["catalog"]);
    let options = FeedOptions::default()
        .poll_interval(Duration::from_secs(300))
        .backoff(Backoff::exponential(Duration::from_secs(1), Duration::from_secs(60)));
    let feed = ListingFeed::new(Arc::new(upstream.clone()), control.to_clock(), options);

    assert!(feed.start_polling());
    settle().await;
    assert!(feed.is_polling());
    assert_eq!(list_calls(&upstream), 1);

    fail_listings(&upstream, ErrorKind::Network);
    control.advance(Duration::from_secs(300));
    settle().await;
    assert_eq!(list_calls(&upstream), 2);

    // First retry after the base delay, the second one after twice that.
    control.advance(Duration::from_secs(1));
    settle().await;
    assert_eq!(list_calls(&upstream), 3);

    control.advance(Duration::from_secs(1));
    settle().await;
    assert_eq!(list_calls(&upstream), 3);

    control.advance(Duration::from_secs(1));
    settle().await;
    assert_eq!(list_calls(&upstream), 4);
    assert_eq!(feed.snapshot().consecutive_failures, 3);

    feed.stop_polling();
    control.advance(Duration::from_secs(600));
    settle().await;
    assert!(!feed.is_polling());
    assert_eq!(list_calls(&upstream), 4);
}

#[tokio::test]
async fn polling_does_not_back_off_for_permanent_failures() {
    let control = ClockControl::new();
    let upstream = MockUpstream::new(["catalog"]);
    fail_listings(&upstream, ErrorKind::Validation);
    let options = FeedOptions::default()
        .poll_interval(Duration::from_secs(300))
        .backoff(Backoff::exponential(Duration::from_secs(1), Duration::from_secs(60)));
    let feed = ListingFeed::new(Arc::new(upstream.clone()), control.to_clock(), options);

    assert!(feed.start_polling());
    settle().await;
    assert_eq!(list_calls(&upstream), 1);

    control.advance(Duration::from_secs(1));
    settle().await;
    assert_eq!(list_calls(&upstream), 1);

    control.advance(Duration::from_secs(299));
    settle().await;
    assert_eq!(list_calls(&upstream), 2);
    assert_eq!(feed.snapshot().consecutive_failures, 2);
    assert!(!feed.should_notify());
}

#[tokio::test]
async fn polling_starts_once() {
    let control = ClockControl::new();
    let upstream = MockUpstream::new(["catalog"]);
    let feed = ListingFeed::new(Arc::new(upstream.clone()), control.to_clock(), FeedOptions::default());

    assert!(feed.start_polling());
    assert!(feed.start_polling());
    settle().await;

    assert_eq!(list_calls(&upstream), 1);
}

#[test]
#[traced_test]
fn polling_without_a_runtime_is_disabled() {
    let upstream = MockUpstream::new(["catalog"]);
    let feed = ListingFeed::new(Arc::new(upstream), ClockControl::new().to_clock(), FeedOptions::default());

    assert!(!feed.start_polling());
    assert!(!feed.is_polling());
    assert!(logs_contain("feed polling disabled"));
}
