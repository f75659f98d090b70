// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use ludex_cache::EntityLookup;
use ludex_upstream::{Game, SearchQuery, Upstream, UpstreamError};
use parking_lot::Mutex;
use tick::Clock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::options::{SearchOptions, SessionOptions, SourcePreference};
use super::plan;
use super::result::{SearchResult, SearchSnapshot, SearchStatus};
use super::result_cache::{ResultCache, ResultCacheStats, ResultKey};
use crate::debounce::Debouncer;
use crate::failure::Failure;
use crate::prober::ConnectivityProber;

/// A search as issued to the providers.
#[derive(Debug, Clone)]
struct SearchRequest {
    query: String,
    page: u32,
    options: SearchOptions,
}

#[derive(Debug)]
struct InFlight {
    id: u64,
    token: CancellationToken,
}

#[derive(Debug, Default)]
struct SessionState {
    snapshot: SearchSnapshot,
    in_flight: Option<InFlight>,
    next_id: u64,
    last_issued: Option<String>,
    /// The request whose results are shown; pagination continues from it.
    current: Option<SearchRequest>,
}

struct SessionCore<U> {
    upstream: Arc<U>,
    clock: Clock,
    options: SessionOptions,
    prober: Option<ConnectivityProber<U>>,
    lookup: Option<Arc<dyn EntityLookup>>,
    state: Mutex<SessionState>,
    results: Mutex<ResultCache>,
    snapshots: watch::Sender<SearchSnapshot>,
}

/// Builder for [`SearchSession`].
pub struct SessionBuilder<U> {
    upstream: Arc<U>,
    clock: Clock,
    options: SessionOptions,
    prober: Option<ConnectivityProber<U>>,
    lookup: Option<Arc<dyn EntityLookup>>,
}

impl<U> Debug for SessionBuilder<U> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("options", &self.options)
            .field("prober", &self.prober.is_some())
            .field("lookup", &self.lookup.is_some())
            .finish_non_exhaustive()
    }
}

impl<U> SessionBuilder<U>
where
    U: Upstream + 'static,
{
    /// Replaces the session options.
    #[must_use]
    pub fn options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Skips providers the prober reports as unreachable.
    #[must_use]
    pub fn prober(mut self, prober: ConnectivityProber<U>) -> Self {
        self.prober = Some(prober);
        self
    }

    /// Replaces results that have a fresh, full-detail record in `lookup` with that record.
    #[must_use]
    pub fn lookup(mut self, lookup: Arc<dyn EntityLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Builds the session and starts its input driver.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    #[must_use]
    pub fn build(self) -> SearchSession<U> {
        let options = self.options;
        let debouncer = Debouncer::new(&self.clock, options.debounce, String::new());
        let (snapshots, _) = watch::channel(SearchSnapshot::default());
        let results = ResultCache::new(options.result_cache_capacity, options.result_cache_ttl);

        let core = Arc::new(SessionCore {
            upstream: self.upstream,
            clock: self.clock,
            prober: self.prober,
            lookup: self.lookup,
            state: Mutex::new(SessionState::default()),
            results: Mutex::new(results),
            snapshots,
            options,
        });

        let driver = core
            .options
            .auto_search
            .then(|| tokio::spawn(drive(Arc::clone(&core), debouncer.subscribe())));

        SearchSession { core, debouncer, driver }
    }
}

/// A debounced, cancellable, paginated search over one or more providers.
///
/// Input fed through [`set_query`](Self::set_query) is debounced; once it settles and differs
/// from the last issued query a search for page one is issued automatically.
/// [`search`](Self::search) issues immediately for explicit user actions. Either way, issuing a
/// request cancels the one in flight, and a response is only committed while its request is
/// still the latest, so a slow stale response can never overwrite a newer result.
///
/// Expected failures never surface as errors. They are recorded in the session's
/// [`SearchSnapshot`] together with the previous results, which stay visible.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use ludex::{SearchSession, SearchStatus};
/// use ludex_upstream::Game;
/// use ludex_upstream::testing::MockUpstream;
/// use tick::Clock;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let upstream = MockUpstream::new(["catalog"]);
/// upstream.add_results("catalog", "zelda", vec![Game::new("1", "catalog", "Zelda")]);
///
/// let session = SearchSession::builder(Arc::new(upstream), Clock::new_tokio()).build();
/// let snapshot = session.search("zelda").await;
///
/// assert_eq!(snapshot.status, SearchStatus::Succeeded);
/// assert_eq!(snapshot.result.items[0].name, "Zelda");
/// # }
/// ```
pub struct SearchSession<U> {
    core: Arc<SessionCore<U>>,
    debouncer: Debouncer<String>,
    driver: Option<JoinHandle<()>>,
}

impl<U> Debug for SearchSession<U> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchSession")
            .field("options", &self.core.options)
            .field("snapshot", &*self.core.snapshots.borrow())
            .finish_non_exhaustive()
    }
}

impl<U> SearchSession<U>
where
    U: Upstream + 'static,
{
    /// Creates a builder for a session searching `upstream`.
    #[must_use]
    pub fn builder(upstream: Arc<U>, clock: Clock) -> SessionBuilder<U> {
        SessionBuilder {
            upstream,
            clock,
            options: SessionOptions::default(),
            prober: None,
            lookup: None,
        }
    }

    /// Returns the session options.
    #[must_use]
    pub fn options(&self) -> &SessionOptions {
        &self.core.options
    }

    /// Feeds typed input; a search follows once the input settles.
    pub fn set_query(&self, query: &str) {
        self.debouncer.set(query.trim().to_owned());
    }

    /// Returns the settled input.
    #[must_use]
    pub fn debounced_query(&self) -> String {
        self.debouncer.get()
    }

    /// Searches for `query` immediately with the session's default parameters.
    ///
    /// Returns the snapshot once the request has completed or been superseded.
    pub async fn search(&self, query: &str) -> SearchSnapshot {
        self.search_with(query, self.core.options.search.clone()).await
    }

    /// Searches for `query` immediately with the given parameters.
    pub async fn search_with(&self, query: &str, options: SearchOptions) -> SearchSnapshot {
        let query = query.trim().to_owned();
        let request = SearchRequest {
            query: query.clone(),
            page: 1,
            options,
        };

        let task = self.core.start(&mut self.core.state.lock(), request);
        self.debouncer.set_now(query);
        self.finish(task).await
    }

    /// Moves to the next page. See [`go_to_page`](Self::go_to_page).
    pub async fn next_page(&self) -> bool {
        let page = self.core.snapshots.borrow().result.page;
        self.go_to_page(page.saturating_add(1)).await
    }

    /// Moves to the previous page. See [`go_to_page`](Self::go_to_page).
    pub async fn previous_page(&self) -> bool {
        let page = self.core.snapshots.borrow().result.page;
        self.go_to_page(page.saturating_sub(1)).await
    }

    /// Re-issues the query whose results are shown for `page`.
    ///
    /// After a failed search the previous results stay visible, so paging continues from the
    /// request that produced them rather than from the failed one.
    ///
    /// Returns `false` without changing anything when `page` is outside `1..=total_pages`,
    /// when a search is in flight, or when no results have been shown.
    pub async fn go_to_page(&self, page: u32) -> bool {
        let task = {
            let mut state = self.core.state.lock();
            let Some(current) = state.current.clone() else {
                return false;
            };
            if state.in_flight.is_some() || page == 0 || page > state.snapshot.result.total_pages() {
                return false;
            }

            self.core.start(&mut state, SearchRequest { page, ..current })
        };

        self.finish(task).await;
        true
    }

    /// Re-issues the query whose results are shown for page one with `page_size` results per
    /// page.
    ///
    /// Returns `false` without changing anything when `page_size` is zero, when a search is in
    /// flight, or when no results have been shown.
    pub async fn change_page_size(&self, page_size: u32) -> bool {
        let task = {
            let mut state = self.core.state.lock();
            let Some(current) = state.current.clone() else {
                return false;
            };
            if state.in_flight.is_some() || page_size == 0 {
                return false;
            }

            let request = SearchRequest {
                page: 1,
                options: current.options.clone().page_size(page_size),
                ..current
            };
            self.core.start(&mut state, request)
        };

        self.finish(task).await;
        true
    }

    /// Cancels any in-flight search, discards pending input and resets the session to idle.
    pub fn clear_search(&self) {
        {
            let mut state = self.core.state.lock();
            if let Some(in_flight) = state.in_flight.take() {
                in_flight.token.cancel();
            }
            state.last_issued = Some(String::new());
            state.current = None;
            state.snapshot = SearchSnapshot::default();
            self.core.publish(&state);
        }

        self.debouncer.set_now(String::new());
    }

    /// Returns up to `limit` autocomplete suggestions for `query`.
    ///
    /// Suggestions bypass the result cache, ask only the highest-priority reachable provider,
    /// and never touch the session state. Failures resolve to an empty list. A `limit` of zero
    /// uses the configured default.
    pub async fn get_suggestions(&self, query: &str, limit: u32) -> Vec<Game> {
        let query = query.trim();
        if query.chars().count() < self.core.options.min_query_len {
            return Vec::new();
        }

        let limit = if limit == 0 { self.core.options.suggestion_limit } else { limit };
        let request = SearchRequest {
            query: query.to_owned(),
            page: 1,
            options: SearchOptions::default()
                .page_size(limit)
                .preference(SourcePreference::Fastest)
                .use_cache(false),
        };

        match self.core.execute(&request).await {
            Ok(result) => {
                let mut items = result.items;
                items.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
                items
            }
            Err(error) => {
                tracing::debug!(
                    search.query = %request.query,
                    error.kind = error.kind().as_str(),
                    "search.suggestions_failed"
                );
                Vec::new()
            }
        }
    }

    /// Returns the counters of the result cache.
    #[must_use]
    pub fn cache_stats(&self) -> ResultCacheStats {
        self.core.results.lock().stats()
    }

    /// Empties the result cache.
    pub fn clear_cache(&self) {
        self.core.results.lock().clear();
    }

    /// Returns the current state.
    #[must_use]
    pub fn snapshot(&self) -> SearchSnapshot {
        self.core.snapshots.borrow().clone()
    }

    /// Returns a receiver notified on every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SearchSnapshot> {
        self.core.snapshots.subscribe()
    }

    async fn finish(&self, task: Option<JoinHandle<()>>) -> SearchSnapshot {
        if let Some(task) = task {
            // Cancelled and aborted requests end quietly; either way the snapshot is current.
            let _ = task.await;
        }
        self.snapshot()
    }
}

impl<U> SearchSession<U> {
    /// Stops the input driver and cancels any in-flight search.
    ///
    /// Explicit [`search`](Self::search) calls keep working; settled input no longer triggers
    /// searches. Dropping the session shuts it down.
    pub fn shutdown(&self) {
        if let Some(driver) = &self.driver {
            driver.abort();
        }
        if let Some(in_flight) = self.core.state.lock().in_flight.take() {
            tracing::debug!(search.id = in_flight.id, "search.cancelled");
            in_flight.token.cancel();
        }
    }
}

impl<U> Drop for SearchSession<U> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<U> SessionCore<U>
where
    U: Upstream + 'static,
{
    fn publish(&self, state: &SessionState) {
        self.snapshots.send_replace(state.snapshot.clone());
    }

    /// Cancels the search in flight and issues `request`.
    ///
    /// Queries below the minimum length resolve to an empty idle result without a task.
    fn start(self: &Arc<Self>, state: &mut SessionState, request: SearchRequest) -> Option<JoinHandle<()>> {
        if let Some(previous) = state.in_flight.take() {
            tracing::debug!(search.id = previous.id, "search.cancelled");
            previous.token.cancel();
        }
        state.last_issued = Some(request.query.clone());

        if request.query.chars().count() < self.options.min_query_len {
            state.current = None;
            state.snapshot = SearchSnapshot {
                query: request.query,
                result: SearchResult::empty(request.options.page_size),
                ..SearchSnapshot::default()
            };
            self.publish(state);
            return None;
        }

        let id = state.next_id;
        state.next_id = state.next_id.wrapping_add(1);
        let token = CancellationToken::new();
        state.in_flight = Some(InFlight { id, token: token.clone() });
        state.snapshot.query.clone_from(&request.query);
        state.snapshot.status = SearchStatus::Searching;
        self.publish(state);

        tracing::debug!(search.id = id, search.query = %request.query, search.page = request.page, "search.issued");

        let core = Arc::clone(self);
        Some(tokio::spawn(async move {
            let outcome = tokio::select! {
                () = token.cancelled() => return,
                outcome = core.execute(&request) => outcome,
            };
            core.commit(id, &request, outcome);
        }))
    }

    async fn execute(&self, request: &SearchRequest) -> Result<SearchResult, UpstreamError> {
        let started = self.clock.instant();
        let options = &request.options;
        let key = ResultKey::new(&request.query, request.page, options);

        if options.use_cache {
            let cached = self.results.lock().get(&key, started);
            if let Some(mut result) = cached {
                result.cache_hit = true;
                result.elapsed = self.clock.instant().saturating_duration_since(started);
                return Ok(result);
            }
        }

        let connectivity = match &self.prober {
            Some(prober) => Some(prober.probe().await),
            None => None,
        };
        let plan = plan::plan(
            self.upstream.sources(),
            connectivity.as_ref(),
            &options.strategy,
            &options.preference,
        )?;
        let query = SearchQuery::new(request.query.clone(), request.page, options.page_size);
        let outcome = plan::run(&*self.upstream, &self.clock, self.options.request_timeout, &plan, &query).await?;

        let items = match &self.lookup {
            Some(lookup) => outcome
                .items
                .into_iter()
                .map(|game| lookup.lookup(&game.id).unwrap_or(game))
                .collect(),
            None => outcome.items,
        };

        let mut result = SearchResult::new(items, outcome.total, request.page, options.page_size, outcome.sources);
        if options.use_cache {
            self.results.lock().insert(key, result.clone(), self.clock.instant());
        }
        result.elapsed = self.clock.instant().saturating_duration_since(started);
        Ok(result)
    }

    /// Applies the outcome of request `id`, unless a newer request has been issued since.
    fn commit(&self, id: u64, request: &SearchRequest, outcome: Result<SearchResult, UpstreamError>) {
        let mut state = self.state.lock();
        let latest = state.in_flight.as_ref().is_some_and(|in_flight| in_flight.id == id);
        if !latest || state.last_issued.as_deref() != Some(request.query.as_str()) {
            tracing::debug!(search.id = id, "search.stale_dropped");
            return;
        }

        state.in_flight = None;
        state.snapshot.has_searched = true;
        match outcome {
            Ok(result) => {
                tracing::debug!(
                    search.id = id,
                    search.total = result.total,
                    search.cache_hit = result.cache_hit,
                    "search.succeeded"
                );
                state.snapshot.result = result;
                state.snapshot.status = SearchStatus::Succeeded;
                state.current = Some(request.clone());
                state.snapshot.failure = None;
            }
            Err(error) => {
                tracing::warn!(search.id = id, error.kind = error.kind().as_str(), "search.failed");
                state.snapshot.status = SearchStatus::Failed;
                state.snapshot.failure = Some(Failure::from(&error));
            }
        }
        self.publish(&state);
    }
}

/// Issues a search whenever the settled input differs from the last issued query.
async fn drive<U>(core: Arc<SessionCore<U>>, mut input: watch::Receiver<String>)
where
    U: Upstream + 'static,
{
    while input.changed().await.is_ok() {
        let query = input.borrow_and_update().clone();

        let mut state = core.state.lock();
        if state.last_issued.as_deref() == Some(query.as_str()) {
            continue;
        }

        let request = SearchRequest {
            query,
            page: 1,
            options: core.options.search.clone(),
        };
        // The spawned request runs on its own; the driver only issues.
        drop(core.start(&mut state, request));
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use ludex_upstream::testing::MockUpstream;
    use tick::ClockControl;
    use tracing_test::traced_test;

    use super::*;

    fn request(query: &str) -> SearchRequest {
        SearchRequest {
            query: query.to_owned(),
            page: 1,
            options: SearchOptions::default(),
        }
    }

    fn result(total: u64) -> SearchResult {
        SearchResult::new(Vec::new(), total, 1, 20, BTreeSet::new())
    }

    #[tokio::test]
    #[traced_test]
    async fn outcomes_of_superseded_requests_are_dropped() {
        let control = ClockControl::new();
        let session = SearchSession::builder(Arc::new(MockUpstream::new(["catalog"])), control.to_clock())
            .options(SessionOptions::default().auto_search(false))
            .build();
        let core = &session.core;
        {
            let mut state = core.state.lock();
            state.in_flight = Some(InFlight {
                id: 7,
                token: CancellationToken::new(),
            });
            state.last_issued = Some("mario".to_owned());
        }

        // An older request that was never cancelled at the transport level.
        core.commit(6, &request("mario"), Ok(result(5)));
        // The latest id, but answering a query that is no longer the last issued one.
        core.commit(7, &request("zelda"), Err(UpstreamError::network("late")));

        assert_eq!(session.snapshot(), SearchSnapshot::default());
        assert!(core.state.lock().in_flight.is_some());
        assert!(core.state.lock().current.is_none());
        assert!(logs_contain("search.stale_dropped"));

        core.commit(7, &request("mario"), Ok(result(5)));

        let snapshot = session.snapshot();
        assert_eq!(snapshot.status, SearchStatus::Succeeded);
        assert_eq!(snapshot.result.total, 5);
        assert!(snapshot.has_searched);
        assert!(core.state.lock().in_flight.is_none());
        assert_eq!(core.state.lock().current.as_ref().map(|r| r.query.as_str()), Some("mario"));
    }
}
