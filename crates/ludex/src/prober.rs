// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::BTreeMap;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{self, BoxFuture, FutureExt as _, Shared};
use ludex_upstream::{SourceId, Upstream};
use parking_lot::Mutex;
use serde::Deserialize;
use tick::{Clock, FutureExt as _};

use crate::constants::{DEFAULT_PROBE_TIMEOUT, DEFAULT_PROBE_TTL};

/// Reachability of every configured upstream provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Connectivity {
    /// Probe outcome per provider.
    pub per_source: BTreeMap<SourceId, bool>,
}

impl Connectivity {
    /// Returns `true` when every provider is reachable.
    ///
    /// A configuration without providers is never online.
    #[must_use]
    pub fn is_online(&self) -> bool {
        !self.per_source.is_empty() && self.per_source.values().all(|reachable| *reachable)
    }

    /// Returns `true` when no provider is reachable.
    #[must_use]
    pub fn is_offline(&self) -> bool {
        !self.per_source.values().any(|reachable| *reachable)
    }

    /// Returns `true` when some, but not all, providers are reachable.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.is_online() && !self.is_offline()
    }

    /// Returns `true` when `source` was probed and found reachable.
    #[must_use]
    pub fn is_reachable(&self, source: &SourceId) -> bool {
        self.per_source.get(source).copied().unwrap_or(false)
    }
}

/// Configuration of a [`ConnectivityProber`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct ProberOptions {
    /// How long a probe result is reused before the providers are probed again.
    #[serde(with = "ludex_cache::serde_millis")]
    pub ttl: Duration,
    /// Upper bound of a single provider probe; a probe that takes longer counts as unreachable.
    #[serde(with = "ludex_cache::serde_millis")]
    pub timeout: Duration,
}

impl Default for ProberOptions {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_PROBE_TTL,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl ProberOptions {
    /// Sets how long probe results are reused.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the per-provider probe timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

type PendingProbe = Shared<BoxFuture<'static, Connectivity>>;

#[derive(Default)]
struct ProbeState {
    last: Option<(Instant, Connectivity)>,
    in_flight: Option<PendingProbe>,
}

struct Inner<U> {
    upstream: Arc<U>,
    clock: Clock,
    options: ProberOptions,
    state: Mutex<ProbeState>,
}

/// Tests the reachability of each upstream provider and caches the outcome briefly.
///
/// Concurrent callers share a single in-flight probe, so a burst of keystrokes never fans out
/// into a burst of reachability checks. Probing never fails: a provider that errors or does
/// not answer within [`ProberOptions::timeout`] is reported as unreachable.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use ludex::{ConnectivityProber, ProberOptions};
/// use ludex_upstream::testing::MockUpstream;
/// use tick::Clock;
///
/// # futures::executor::block_on(async {
/// let upstream = MockUpstream::new(["catalog", "graph"]);
/// upstream.set_reachable("graph", false);
///
/// let prober = ConnectivityProber::new(Arc::new(upstream), Clock::new_frozen(), ProberOptions::default());
/// let connectivity = prober.probe().await;
///
/// assert!(connectivity.is_partial());
/// assert!(connectivity.is_reachable(&"catalog".into()));
/// # });
/// ```
pub struct ConnectivityProber<U> {
    inner: Arc<Inner<U>>,
}

impl<U> Clone for ConnectivityProber<U> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<U> Debug for ConnectivityProber<U> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ConnectivityProber")
            .field("options", &self.inner.options)
            .field("last", &state.last.as_ref().map(|(_, connectivity)| connectivity))
            .field("in_flight", &state.in_flight.is_some())
            .finish_non_exhaustive()
    }
}

impl<U> ConnectivityProber<U>
where
    U: Upstream + 'static,
{
    /// Creates a prober for every provider `upstream` exposes.
    #[must_use]
    pub fn new(upstream: Arc<U>, clock: Clock, options: ProberOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                upstream,
                clock,
                options,
                state: Mutex::new(ProbeState::default()),
            }),
        }
    }

    /// Returns the cached reachability, probing the providers when it is missing or expired.
    pub async fn probe(&self) -> Connectivity {
        let pending = {
            let mut state = self.inner.state.lock();
            if let Some((probed_at, connectivity)) = &state.last
                && self.inner.clock.instant().saturating_duration_since(*probed_at) < self.inner.options.ttl
            {
                return connectivity.clone();
            }

            self.join_or_start(&mut state)
        };

        self.complete(pending).await
    }

    /// Probes the providers regardless of the cached result.
    ///
    /// A probe already in flight is joined rather than duplicated.
    pub async fn refresh(&self) -> Connectivity {
        let pending = self.join_or_start(&mut self.inner.state.lock());
        self.complete(pending).await
    }

    /// Discards the cached result so the next [`probe`](Self::probe) checks the providers.
    pub fn invalidate(&self) {
        self.inner.state.lock().last = None;
    }

    /// Returns the most recent probe result, even when expired.
    #[must_use]
    pub fn last(&self) -> Option<Connectivity> {
        self.inner.state.lock().last.as_ref().map(|(_, connectivity)| connectivity.clone())
    }

    fn join_or_start(&self, state: &mut ProbeState) -> PendingProbe {
        if let Some(pending) = &state.in_flight {
            return pending.clone();
        }

        let upstream = Arc::clone(&self.inner.upstream);
        let clock = self.inner.clock.clone();
        let timeout = self.inner.options.timeout;
        let pending = probe_all(upstream, clock, timeout).boxed().shared();

        state.in_flight = Some(pending.clone());
        pending
    }

    async fn complete(&self, pending: PendingProbe) -> Connectivity {
        let connectivity = pending.clone().await;

        let mut state = self.inner.state.lock();
        if state.in_flight.as_ref().is_some_and(|current| current.ptr_eq(&pending)) {
            state.in_flight = None;
            state.last = Some((self.inner.clock.instant(), connectivity.clone()));
        }

        connectivity
    }
}

async fn probe_all<U: Upstream + 'static>(upstream: Arc<U>, clock: Clock, timeout: Duration) -> Connectivity {
    let probes: Vec<_> = upstream
        .sources()
        .into_iter()
        .map(|source| probe_one(Arc::clone(&upstream), clock.clone(), timeout, source))
        .collect();

    let connectivity = Connectivity {
        per_source: future::join_all(probes).await.into_iter().collect(),
    };
    tracing::debug!(
        probe.online = connectivity.is_online(),
        probe.offline = connectivity.is_offline(),
        "probe.completed"
    );
    connectivity
}

async fn probe_one<U: Upstream>(upstream: Arc<U>, clock: Clock, timeout: Duration, source: SourceId) -> (SourceId, bool) {
    let reachable = upstream.probe(&source).timeout(&clock, timeout).await.unwrap_or(false);
    if !reachable {
        tracing::warn!(probe.source = %source, "probe.unreachable");
    }
    (source, reachable)
}
