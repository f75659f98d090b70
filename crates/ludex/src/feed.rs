// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Periodically refreshed, query-less listings such as trending or upcoming games.

use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use ludex_upstream::{Game, Listing, SourceId, Upstream, UpstreamError};
use parking_lot::Mutex;
use serde::Deserialize;
use tick::{Clock, FutureExt as _};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::backoff::Backoff;
use crate::constants::{DEFAULT_FEED_LIMIT, DEFAULT_POLL_INTERVAL, DEFAULT_REQUEST_TIMEOUT};
use crate::failure::Failure;
use crate::prober::ConnectivityProber;

/// Which provider a feed loads from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedSource {
    /// The first reachable provider, in priority order, that answers.
    #[default]
    Auto,
    /// Only the given provider.
    Pinned(SourceId),
}

/// Configuration of a [`ListingFeed`].
///
/// Durations are expressed in milliseconds when deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct FeedOptions {
    /// The listing to load.
    pub listing: Listing,
    /// Number of items loaded by polling and by [`ListingFeed::retry`] before any explicit load.
    pub limit: usize,
    /// Interval between refreshes while polling succeeds.
    #[serde(with = "ludex_cache::serde_millis")]
    pub poll_interval: Duration,
    /// Delays between refreshes while polling fails.
    pub backoff: Backoff,
    /// Upper bound on a single provider request; elapsed requests count as network failures.
    #[serde(with = "ludex_cache::serde_millis")]
    pub request_timeout: Duration,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            listing: Listing::default(),
            limit: DEFAULT_FEED_LIMIT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            backoff: Backoff::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl FeedOptions {
    /// Sets the listing to load.
    #[must_use]
    pub fn listing(mut self, listing: Listing) -> Self {
        self.listing = listing;
        self
    }

    /// Sets the default number of items.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the polling interval.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the retry delays used after failed refreshes.
    #[must_use]
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the per-provider request timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Lifecycle of a listing feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FeedStatus {
    /// Nothing has been loaded yet.
    #[default]
    Idle,
    /// A load is in flight.
    Loading,
    /// The most recent load succeeded, possibly with no items.
    Loaded,
    /// The most recent load failed; the previous items are kept.
    Failed,
}

/// Observable state of a [`ListingFeed`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeedSnapshot {
    /// Items of the most recent successful load.
    pub items: Vec<Game>,
    /// Provider that served `items`.
    pub source: Option<SourceId>,
    /// Current lifecycle state.
    pub status: FeedStatus,
    /// Classification of the most recent failure, cleared by the next success.
    pub failure: Option<Failure>,
    /// When `items` were loaded.
    pub loaded_at: Option<SystemTime>,
    /// Number of failed loads since the last success.
    pub consecutive_failures: u32,
}

impl FeedSnapshot {
    /// Returns `true` when the failure warrants a "try again" notice.
    ///
    /// Empty listings and non-retryable failures never do.
    #[must_use]
    pub fn should_notify(&self) -> bool {
        self.failure.as_ref().is_some_and(Failure::is_retryable)
    }
}

#[derive(Debug, Default)]
struct FeedState {
    snapshot: FeedSnapshot,
    generation: u64,
    last_request: Option<(usize, FeedSource)>,
}

struct FeedCore<U> {
    upstream: Arc<U>,
    clock: Clock,
    options: FeedOptions,
    prober: Option<ConnectivityProber<U>>,
    state: Mutex<FeedState>,
    snapshots: watch::Sender<FeedSnapshot>,
}

/// A query-less listing loaded on demand or refreshed periodically.
///
/// Failures never clear loaded items: the feed keeps showing the last successful listing and
/// records a [`Failure`] until a later load succeeds. While polling, consecutive retryable
/// failures are retried after [`Backoff`] delays instead of the regular interval; failures
/// that retrying cannot fix wait for the regular interval.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use ludex::{FeedOptions, FeedSource, ListingFeed};
/// use ludex_upstream::testing::MockUpstream;
/// use ludex_upstream::{Game, Listing};
/// use tick::Clock;
///
/// # futures::executor::block_on(async {
/// let upstream = MockUpstream::new(["catalog"]);
/// upstream.set_listing("catalog", Listing::Trending, vec![Game::new("1", "catalog", "Hades")]);
///
/// let feed = ListingFeed::new(Arc::new(upstream), Clock::new_frozen(), FeedOptions::default());
/// let items = feed.load(10, FeedSource::Auto).await;
///
/// assert_eq!(items[0].name, "Hades");
/// assert!(feed.snapshot().failure.is_none());
/// # });
/// ```
pub struct ListingFeed<U> {
    core: Arc<FeedCore<U>>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl<U> Debug for ListingFeed<U> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListingFeed")
            .field("options", &self.core.options)
            .field("snapshot", &*self.core.snapshots.borrow())
            .finish_non_exhaustive()
    }
}

impl<U> ListingFeed<U>
where
    U: Upstream + 'static,
{
    /// Creates a feed loading from `upstream`.
    #[must_use]
    pub fn new(upstream: Arc<U>, clock: Clock, options: FeedOptions) -> Self {
        Self::with_prober_opt(upstream, clock, options, None)
    }

    /// Creates a feed that skips providers the prober reports as unreachable.
    #[must_use]
    pub fn with_prober(upstream: Arc<U>, clock: Clock, options: FeedOptions, prober: ConnectivityProber<U>) -> Self {
        Self::with_prober_opt(upstream, clock, options, Some(prober))
    }

    fn with_prober_opt(upstream: Arc<U>, clock: Clock, options: FeedOptions, prober: Option<ConnectivityProber<U>>) -> Self {
        let (snapshots, _) = watch::channel(FeedSnapshot::default());
        Self {
            core: Arc::new(FeedCore {
                upstream,
                clock,
                options,
                prober,
                state: Mutex::new(FeedState::default()),
                snapshots,
            }),
            poller: Mutex::new(None),
        }
    }

    /// Returns the feed options.
    #[must_use]
    pub fn options(&self) -> &FeedOptions {
        &self.core.options
    }

    /// Loads up to `limit` items from `source` and returns the items the feed shows afterwards.
    ///
    /// On failure the previously loaded items are returned and the failure is recorded.
    pub async fn load(&self, limit: usize, source: FeedSource) -> Vec<Game> {
        self.core.load(limit, source).await
    }

    /// Repeats the most recent load, or loads the configured defaults when nothing was loaded.
    pub async fn retry(&self) -> Vec<Game> {
        let (limit, source) = self.core.last_request();
        self.core.load(limit, source).await
    }

    /// Returns the current state.
    #[must_use]
    pub fn snapshot(&self) -> FeedSnapshot {
        self.core.snapshots.borrow().clone()
    }

    /// Returns a receiver notified on every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot> {
        self.core.snapshots.subscribe()
    }

    /// Returns `true` when the current failure warrants a "try again" notice.
    #[must_use]
    pub fn should_notify(&self) -> bool {
        self.core.snapshots.borrow().should_notify()
    }

    /// Starts refreshing the feed in the background, beginning with an immediate load.
    ///
    /// Returns `false` when no tokio runtime is available; polling is then disabled and a
    /// warning is logged. Calling this while polling is a no-op.
    pub fn start_polling(&self) -> bool {
        let mut poller = self.poller.lock();
        if poller.as_ref().is_some_and(|task| !task.is_finished()) {
            return true;
        }

        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!(feed.listing = %self.core.options.listing, "no tokio runtime available, feed polling disabled");
            return false;
        };

        *poller = Some(runtime.spawn(poll(Arc::clone(&self.core))));
        true
    }

    /// Stops background refreshes.
    pub fn stop_polling(&self) {
        if let Some(task) = self.poller.lock().take() {
            task.abort();
        }
    }

    /// Returns `true` while background refreshes are running.
    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.poller.lock().as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl<U> Drop for ListingFeed<U> {
    fn drop(&mut self) {
        if let Some(task) = self.poller.get_mut().take() {
            task.abort();
        }
    }
}

impl<U> FeedCore<U>
where
    U: Upstream + 'static,
{
    fn last_request(&self) -> (usize, FeedSource) {
        self.state
            .lock()
            .last_request
            .clone()
            .unwrap_or((self.options.limit, FeedSource::Auto))
    }

    async fn load(&self, limit: usize, source: FeedSource) -> Vec<Game> {
        let generation = {
            let mut state = self.state.lock();
            state.generation = state.generation.wrapping_add(1);
            state.last_request = Some((limit, source.clone()));
            state.snapshot.status = FeedStatus::Loading;
            self.snapshots.send_replace(state.snapshot.clone());
            state.generation
        };

        let outcome = self.fetch(limit, &source).await;

        let mut state = self.state.lock();
        if state.generation != generation {
            tracing::debug!(feed.listing = %self.options.listing, "feed.stale_dropped");
            return state.snapshot.items.clone();
        }

        match outcome {
            Ok((source, items)) => {
                tracing::debug!(
                    feed.listing = %self.options.listing,
                    feed.source = %source,
                    feed.count = items.len(),
                    "feed.loaded"
                );
                state.snapshot = FeedSnapshot {
                    items,
                    source: Some(source),
                    status: FeedStatus::Loaded,
                    failure: None,
                    loaded_at: Some(self.clock.system_time()),
                    consecutive_failures: 0,
                };
            }
            Err(error) => {
                let failures = state.snapshot.consecutive_failures.saturating_add(1);
                tracing::warn!(
                    feed.listing = %self.options.listing,
                    feed.failures = failures,
                    error.kind = error.kind().as_str(),
                    "feed.failed"
                );
                state.snapshot.status = FeedStatus::Failed;
                state.snapshot.failure = Some(Failure::from(&error));
                state.snapshot.consecutive_failures = failures;
            }
        }

        self.snapshots.send_replace(state.snapshot.clone());
        state.snapshot.items.clone()
    }

    async fn fetch(&self, limit: usize, source: &FeedSource) -> Result<(SourceId, Vec<Game>), UpstreamError> {
        let candidates = match source {
            FeedSource::Pinned(pinned) => vec![pinned.clone()],
            FeedSource::Auto => {
                let sources = self.upstream.sources();
                match &self.prober {
                    Some(prober) => {
                        let connectivity = prober.probe().await;
                        sources.into_iter().filter(|s| connectivity.is_reachable(s)).collect()
                    }
                    None => sources,
                }
            }
        };

        let mut first_error = None;
        for candidate in candidates {
            let listed = match self
                .upstream
                .list(&candidate, self.options.listing, limit)
                .timeout(&self.clock, self.options.request_timeout)
                .await
            {
                Ok(result) => result,
                Err(elapsed) => Err(UpstreamError::network(elapsed)),
            };

            match listed {
                Ok(items) => return Ok((candidate, items)),
                Err(error) => {
                    tracing::debug!(feed.source = %candidate, error.kind = error.kind().as_str(), "feed.source_failed");
                    first_error.get_or_insert(error);
                }
            }
        }

        Err(first_error.unwrap_or_else(|| UpstreamError::network("no reachable catalog source")))
    }
}

async fn poll<U>(core: Arc<FeedCore<U>>)
where
    U: Upstream + 'static,
{
    loop {
        let (limit, source) = core.last_request();
        core.load(limit, source).await;

        let wait = {
            let state = core.state.lock();
            match (&state.snapshot.failure, state.snapshot.consecutive_failures) {
                // Only failures that may clear up are retried early.
                (Some(failure), n) if n > 0 && failure.is_retryable() => core.options.backoff.delay(n - 1),
                _ => core.options.poll_interval,
            }
        };
        core.clock.delay(wait).await;
    }
}

#[cfg(test)]
mod tests {
    use ludex_upstream::ErrorKind;

    use super::*;

    #[test]
    fn only_retryable_failures_notify() {
        let mut snapshot = FeedSnapshot::default();
        assert!(!snapshot.should_notify());

        snapshot.failure = Some(Failure::new(ErrorKind::ServiceUnavailable, "busy"));
        assert!(snapshot.should_notify());

        snapshot.failure = Some(Failure::new(ErrorKind::Validation, "bad listing"));
        assert!(!snapshot.should_notify());
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: FeedOptions =
            serde_json::from_str(r#"{ "listing": "upcoming", "backoff": { "kind": "constant", "base": 500 } }"#).unwrap();

        assert_eq!(options.listing, Listing::Upcoming);
        assert_eq!(options.limit, DEFAULT_FEED_LIMIT);
        assert_eq!(options.backoff.delay(3), Duration::from_millis(500));
    }
}
