// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Provider selection and fan-out of a single search request.

use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

use futures::future;
use ludex_upstream::{Game, SearchQuery, SourceId, Upstream, UpstreamError};
use tick::{Clock, FutureExt as _};

use super::options::{SearchStrategy, SourcePreference};
use crate::prober::Connectivity;

/// The providers a request goes to and how their answers combine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Plan {
    /// Query all providers concurrently and merge.
    Merge(Vec<SourceId>),
    /// Query providers one after another until one returns results.
    Fallback(Vec<SourceId>),
}

/// Merged answer of the providers a plan queried.
#[derive(Debug, Default)]
pub(crate) struct Outcome {
    pub items: Vec<Game>,
    pub total: u64,
    pub sources: BTreeSet<SourceId>,
}

/// Picks the providers for a request.
///
/// `sources` are the configured providers in priority order. When a connectivity result is
/// available, providers it reports as unreachable are skipped. Fails with a network error when
/// no candidate remains.
pub(crate) fn plan(
    sources: Vec<SourceId>,
    connectivity: Option<&Connectivity>,
    strategy: &SearchStrategy,
    preference: &SourcePreference,
) -> Result<Plan, UpstreamError> {
    let mut candidates: Vec<SourceId> = sources
        .into_iter()
        .filter(|source| connectivity.is_none_or(|c| c.is_reachable(source)))
        .collect();

    let plan = match preference {
        SourcePreference::Pinned(pinned) => {
            candidates.retain(|source| source == pinned);
            Plan::Fallback(candidates)
        }
        SourcePreference::Fastest => {
            candidates.truncate(1);
            Plan::Fallback(candidates)
        }
        SourcePreference::Auto => match strategy {
            SearchStrategy::Combined => Plan::Merge(candidates),
            SearchStrategy::Prefer(preferred) => {
                if let Some(position) = candidates.iter().position(|source| source == preferred) {
                    let first = candidates.remove(position);
                    candidates.insert(0, first);
                }
                Plan::Fallback(candidates)
            }
        },
    };

    let (Plan::Merge(chosen) | Plan::Fallback(chosen)) = &plan;
    if chosen.is_empty() {
        return Err(UpstreamError::network("no reachable catalog source"));
    }

    Ok(plan)
}

/// Executes a plan, bounding every provider request with `timeout`.
pub(crate) async fn run<U: Upstream>(
    upstream: &U,
    clock: &Clock,
    timeout: Duration,
    plan: &Plan,
    query: &SearchQuery,
) -> Result<Outcome, UpstreamError> {
    match plan {
        Plan::Merge(sources) => merge(upstream, clock, timeout, sources, query).await,
        Plan::Fallback(sources) => fallback(upstream, clock, timeout, sources, query).await,
    }
}

async fn search_one<U: Upstream>(
    upstream: &U,
    clock: &Clock,
    timeout: Duration,
    source: &SourceId,
    query: &SearchQuery,
) -> Result<ludex_upstream::Page<Game>, UpstreamError> {
    match upstream.search(source, query).timeout(clock, timeout).await {
        Ok(result) => result,
        Err(elapsed) => Err(UpstreamError::network(elapsed)),
    }
}

async fn merge<U: Upstream>(
    upstream: &U,
    clock: &Clock,
    timeout: Duration,
    sources: &[SourceId],
    query: &SearchQuery,
) -> Result<Outcome, UpstreamError> {
    let mut requests = Vec::with_capacity(sources.len());
    for source in sources {
        requests.push(search_one(upstream, clock, timeout, source, query));
    }
    let pages = future::join_all(requests).await;

    let mut outcome = Outcome::default();
    let mut seen = HashSet::new();
    let mut duplicates = 0_u64;
    let mut answered = false;
    let mut first_error = None;

    for (source, page) in sources.iter().zip(pages) {
        match page {
            Ok(page) => {
                answered = true;
                outcome.total = outcome.total.saturating_add(page.total);
                for game in page.items {
                    if seen.insert(game.id.clone()) {
                        outcome.sources.insert(source.clone());
                        outcome.items.push(game);
                    } else {
                        duplicates = duplicates.saturating_add(1);
                    }
                }
            }
            Err(error) => {
                tracing::warn!(
                    search.source = %source,
                    error.kind = error.kind().as_str(),
                    "search.partial_failure"
                );
                first_error.get_or_insert(error);
            }
        }
    }

    match first_error {
        Some(error) if !answered => Err(error),
        _ => {
            outcome.total = outcome.total.saturating_sub(duplicates);
            Ok(outcome)
        }
    }
}

async fn fallback<U: Upstream>(
    upstream: &U,
    clock: &Clock,
    timeout: Duration,
    sources: &[SourceId],
    query: &SearchQuery,
) -> Result<Outcome, UpstreamError> {
    let mut answered = false;
    let mut first_error = None;

    for source in sources {
        match search_one(upstream, clock, timeout, source, query).await {
            Ok(page) if !page.items.is_empty() => {
                return Ok(Outcome {
                    items: page.items,
                    total: page.total,
                    sources: BTreeSet::from([source.clone()]),
                });
            }
            Ok(_) => {
                answered = true;
                tracing::debug!(search.source = %source, "search.fallback");
            }
            Err(error) => {
                tracing::warn!(
                    search.source = %source,
                    error.kind = error.kind().as_str(),
                    "search.fallback"
                );
                first_error.get_or_insert(error);
            }
        }
    }

    match first_error {
        Some(error) if !answered => Err(error),
        _ => Ok(Outcome::default()),
    }
}
