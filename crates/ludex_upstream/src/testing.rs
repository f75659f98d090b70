// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Mock upstream implementation for testing.
//!
//! This module provides [`MockUpstream`], a configurable in-memory provider that records all
//! calls and supports failure and latency injection for testing error and race paths.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tick::Clock;

use crate::error::Result;
use crate::{ErrorKind, Game, GameId, Listing, Page, SearchQuery, SourceId, Upstream, UpstreamError};

/// A call recorded by [`MockUpstream`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamCall {
    /// A [`Upstream::get_entity`] call.
    GetEntity(GameId),
    /// A [`Upstream::search`] call.
    Search {
        /// The provider that was queried.
        source: SourceId,
        /// The query as received.
        query: SearchQuery,
    },
    /// A [`Upstream::list`] call.
    List {
        /// The provider that was queried.
        source: SourceId,
        /// The requested listing.
        listing: Listing,
        /// The requested item limit.
        limit: usize,
    },
    /// A [`Upstream::probe`] call.
    Probe(SourceId),
}

type FailPredicate = Box<dyn Fn(&UpstreamCall) -> Option<ErrorKind> + Send + Sync>;

#[derive(Default)]
struct State {
    sources: Vec<SourceId>,
    entities: HashMap<GameId, Game>,
    results: HashMap<(SourceId, String), Vec<Game>>,
    listings: HashMap<(SourceId, Listing), Vec<Game>>,
    unreachable: Vec<SourceId>,
    latency: HashMap<String, Duration>,
    calls: Vec<UpstreamCall>,
    fail_when: Option<FailPredicate>,
}

/// A mock [`Upstream`] for testing.
///
/// Responses are served from canned data. Every call is recorded before it is answered, so a
/// test can observe that a request was issued even while its response is still delayed.
///
/// Latency is keyed by query text, entity id or source id and requires a [`Clock`], which lets
/// tests hold responses back until they advance a `ClockControl`.
#[derive(Clone)]
pub struct MockUpstream {
    state: Arc<Mutex<State>>,
    clock: Option<Clock>,
}

impl std::fmt::Debug for MockUpstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockUpstream")
            .field("sources", &state.sources)
            .field("calls", &state.calls)
            .field("fail_when", &state.fail_when.is_some())
            .finish_non_exhaustive()
    }
}

impl MockUpstream {
    /// Creates a mock serving the given providers, in priority order.
    #[must_use]
    pub fn new<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SourceId>,
    {
        let state = State {
            sources: sources.into_iter().map(Into::into).collect(),
            ..State::default()
        };

        Self {
            state: Arc::new(Mutex::new(state)),
            clock: None,
        }
    }

    /// Attaches the clock used to simulate latency.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Registers a full-detail record returned by [`Upstream::get_entity`].
    pub fn add_entity(&self, game: Game) {
        self.state.lock().entities.insert(game.id.clone(), game);
    }

    /// Registers every match of `query` on `source`; searches are paginated over this list.
    pub fn add_results(&self, source: impl Into<SourceId>, query: &str, games: Vec<Game>) {
        self.state.lock().results.insert((source.into(), query.to_owned()), games);
    }

    /// Registers the items of a listing.
    pub fn set_listing(&self, source: impl Into<SourceId>, listing: Listing, games: Vec<Game>) {
        self.state.lock().listings.insert((source.into(), listing), games);
    }

    /// Marks a provider as reachable or not for [`Upstream::probe`].
    pub fn set_reachable(&self, source: impl Into<SourceId>, reachable: bool) {
        let source = source.into();
        let mut state = self.state.lock();
        state.unreachable.retain(|s| s != &source);
        if !reachable {
            state.unreachable.push(source);
        }
    }

    /// Delays searches for `key` (query text), fetches of `key` (entity id) and probes of `key`
    /// (source id).
    pub fn set_latency(&self, key: &str, latency: Duration) {
        self.state.lock().latency.insert(key.to_owned(), latency);
    }

    /// Makes calls matching the predicate fail with the returned kind.
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&UpstreamCall) -> Option<ErrorKind> + Send + Sync + 'static,
    {
        self.state.lock().fail_when = Some(Box::new(predicate));
    }

    /// Removes any failure injection.
    pub fn clear_failures(&self) {
        self.state.lock().fail_when = None;
    }

    /// Returns every call received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<UpstreamCall> {
        self.state.lock().calls.clone()
    }

    /// Returns the search calls received so far.
    #[must_use]
    pub fn search_calls(&self) -> Vec<(SourceId, SearchQuery)> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                UpstreamCall::Search { source, query } => Some((source.clone(), query.clone())),
                _ => None,
            })
            .collect()
    }

    /// Returns how many calls matched the predicate.
    #[must_use]
    pub fn count_calls(&self, predicate: impl Fn(&UpstreamCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|call| predicate(call)).count()
    }

    /// Forgets all recorded calls.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    async fn begin(&self, call: UpstreamCall, latency_key: Option<&str>) -> Option<ErrorKind> {
        let latency = {
            let mut state = self.state.lock();
            state.calls.push(call.clone());
            latency_key.and_then(|key| state.latency.get(key).copied())
        };

        if let (Some(clock), Some(latency)) = (&self.clock, latency) {
            clock.delay(latency).await;
        }

        let state = self.state.lock();
        state.fail_when.as_ref().and_then(|predicate| predicate(&call))
    }
}

impl Upstream for MockUpstream {
    fn sources(&self) -> Vec<SourceId> {
        self.state.lock().sources.clone()
    }

    async fn get_entity(&self, id: &GameId) -> Result<Game> {
        if let Some(kind) = self.begin(UpstreamCall::GetEntity(id.clone()), Some(id.as_str())).await {
            return Err(UpstreamError::with_kind(kind, "injected failure"));
        }

        self.state
            .lock()
            .entities
            .get(id)
            .cloned()
            .ok_or_else(|| UpstreamError::not_found(format!("no game with id {id}")))
    }

    async fn search(&self, source: &SourceId, query: &SearchQuery) -> Result<Page<Game>> {
        let call = UpstreamCall::Search {
            source: source.clone(),
            query: query.clone(),
        };
        if let Some(kind) = self.begin(call, Some(&query.text)).await {
            return Err(UpstreamError::with_kind(kind, "injected failure"));
        }

        let state = self.state.lock();
        let Some(all) = state.results.get(&(source.clone(), query.text.clone())) else {
            return Ok(Page::empty());
        };

        let size = query.page_size as usize;
        let skip = (query.page.saturating_sub(1) as usize).saturating_mul(size);
        let items = all.iter().skip(skip).take(size).cloned().collect();
        Ok(Page::new(items, all.len() as u64))
    }

    async fn list(&self, source: &SourceId, listing: Listing, limit: usize) -> Result<Vec<Game>> {
        let call = UpstreamCall::List {
            source: source.clone(),
            listing,
            limit,
        };
        if let Some(kind) = self.begin(call, None).await {
            return Err(UpstreamError::with_kind(kind, "injected failure"));
        }

        let state = self.state.lock();
        Ok(state
            .listings
            .get(&(source.clone(), listing))
            .map(|games| games.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn probe(&self, source: &SourceId) -> bool {
        if self.begin(UpstreamCall::Probe(source.clone()), Some(source.as_str())).await.is_some() {
            return false;
        }

        !self.state.lock().unreachable.contains(source)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::FutureExt;
    use tick::ClockControl;

    use super::*;

    fn block_on<F: Future>(f: F) -> F::Output {
        futures::executor::block_on(f)
    }

    fn games(n: usize) -> Vec<Game> {
        (0..n).map(|i| Game::new(i.to_string(), "catalog", format!("Game {i}"))).collect()
    }

    #[test]
    fn search_paginates_registered_results() {
        let upstream = MockUpstream::new(["catalog"]);
        upstream.add_results("catalog", "mario", games(5));

        let page = block_on(upstream.search(&"catalog".into(), &SearchQuery::new("mario", 2, 2))).unwrap();

        assert_eq!(page.total, 5);
        assert_eq!(page.items.iter().map(|g| g.id.as_str()).collect::<Vec<_>>(), ["2", "3"]);
    }

    #[test]
    fn unknown_entity_is_not_found() {
        let upstream = MockUpstream::new(["catalog"]);

        let error = block_on(upstream.get_entity(&"404".into())).unwrap_err();

        assert_eq!(error.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn probe_reports_configured_reachability() {
        let upstream = MockUpstream::new(["catalog", "graph"]);
        upstream.set_reachable("graph", false);

        assert!(block_on(upstream.probe(&"catalog".into())));
        assert!(!block_on(upstream.probe(&"graph".into())));

        upstream.set_reachable("graph", true);
        assert!(block_on(upstream.probe(&"graph".into())));
    }

    #[test]
    fn latency_holds_response_until_clock_advances() {
        let control = ClockControl::new();
        let upstream = MockUpstream::new(["catalog"]).with_clock(control.to_clock());
        upstream.set_latency("slow", Duration::from_secs(1));

        let source = SourceId::new("catalog");
        let query = SearchQuery::new("slow", 1, 10);
        let mut pending = Box::pin(upstream.search(&source, &query));

        assert!((&mut pending).now_or_never().is_none());
        assert_eq!(upstream.search_calls().len(), 1);

        control.advance(Duration::from_secs(1));
        assert!(block_on(pending).is_ok());
    }
}
