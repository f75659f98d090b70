// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt::{self, Debug, Formatter};
use std::ops::ControlFlow;
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};

use ludex_upstream::{Game, GameId, UpstreamError};
use parking_lot::Mutex;
use tick::{Clock, FutureExt};

use crate::builder::CacheBuilder;
use crate::entry::{CacheEntry, FetchState, Provenance};
use crate::loader::{EntityLookup, Loader};
use crate::maintenance::{self, MaintenanceHandle};
use crate::persistence::{Persistence, PersistenceError};
use crate::snapshot::{self, SnapshotEntry};
use crate::stats::CacheStats;
use crate::telemetry::{self, CacheActivity};
use crate::{CacheKey, CacheOptions, CacheValue};

/// A bounded, TTL-aware cache of entities with single-flight loading.
///
/// The cache keeps two maps behind one lock: the entries themselves and a per-key
/// [`FetchState`]. Reads never touch the network. [`fetch`](Self::fetch) serves fresh entries
/// from memory and otherwise calls the [`Loader`], allowing at most one load per key at a time
/// and refusing keys that have failed `max_retries` times until their state is reset.
///
/// When an insert pushes the entry count above the capacity, the cache keeps the `capacity`
/// most recently accessed entries and drops the rest. A background task started by
/// [`CacheBuilder::build`] periodically drops entries older than the sweep age and writes a
/// snapshot through the configured [`Persistence`].
///
/// Cloning is cheap and yields a handle to the same cache.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use ludex_cache::{CacheOptions, EntityCache, Provenance, UpstreamLoader};
/// use ludex_upstream::testing::MockUpstream;
/// use ludex_upstream::{Game, GameId};
/// use tick::Clock;
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build()?.block_on(async {
/// let upstream = Arc::new(MockUpstream::new(["catalog"]));
/// upstream.add_entity(Game::new("7", "catalog", "Portal"));
///
/// let cache = EntityCache::builder(UpstreamLoader::new(upstream), Clock::new_tokio())
///     .options(CacheOptions::default().capacity(100))
///     .build();
///
/// let game = cache.fetch(&GameId::new("7")).await.expect("loaded");
/// assert_eq!(game.name, "Portal");
/// assert_eq!(cache.get(&GameId::new("7")).map(|e| e.provenance), Some(Provenance::Upstream));
/// # });
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct EntityCache<L: Loader> {
    inner: Arc<Inner<L>>,
}

impl<L: Loader> Clone for EntityCache<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: Loader> Debug for EntityCache<L> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityCache")
            .field("name", &self.inner.options.name)
            .field("len", &self.len())
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

pub(crate) struct Inner<L: Loader> {
    loader: L,
    clock: Clock,
    options: CacheOptions,
    persistence: Option<Arc<dyn Persistence>>,
    state: Mutex<CacheState<L::Key, L::Value>>,
    maintenance: Mutex<Option<MaintenanceHandle>>,
}

struct CacheState<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    states: HashMap<K, FetchState>,
    next_seq: u64,
}

impl<K: CacheKey, V: CacheValue> CacheState<K, V> {
    fn seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn touch(&mut self, key: &K, now: SystemTime) -> Option<&CacheEntry<V>> {
        let seq = self.seq();
        let entry = self.entries.get_mut(key)?;
        entry.last_accessed_at = now;
        entry.access_seq = seq;
        Some(entry)
    }

    fn insert(&mut self, key: K, value: V, provenance: Provenance, now: SystemTime) {
        let access_seq = self.seq();
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.value = value;
                entry.last_accessed_at = now;
                entry.access_seq = access_seq;
                entry.provenance = provenance;
                if provenance == Provenance::Upstream {
                    entry.fetched_at = now;
                    entry.fetch_count = entry.fetch_count.saturating_add(1);
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry {
                    value,
                    fetched_at: now,
                    last_accessed_at: now,
                    fetch_count: 1,
                    provenance,
                    access_seq,
                });
            }
        }
    }

    /// Drops the fetch state of `key` unless a load is in flight.
    fn forget_state(&mut self, key: &K) {
        if self.states.get(key).is_some_and(|s| !s.is_loading()) {
            self.states.remove(key);
        }
    }

    fn remove(&mut self, key: &K) -> Option<CacheEntry<V>> {
        self.forget_state(key);
        self.entries.remove(key)
    }

    /// Keeps the `capacity` most recently accessed entries; returns how many were dropped.
    fn optimize(&mut self, capacity: usize) -> usize {
        if self.entries.len() <= capacity {
            return 0;
        }

        let mut by_recency: Vec<(SystemTime, u64, K)> = self
            .entries
            .iter()
            .map(|(key, entry)| (entry.last_accessed_at, entry.access_seq, key.clone()))
            .collect();
        by_recency.sort_unstable_by(|a, b| (b.0, b.1).cmp(&(a.0, a.1)));

        let doomed = by_recency.split_off(capacity);
        for (_, _, key) in &doomed {
            self.remove(key);
        }
        doomed.len()
    }
}

impl<L: Loader> EntityCache<L> {
    /// Starts building a cache around `loader`.
    #[must_use]
    pub fn builder(loader: L, clock: Clock) -> CacheBuilder<L> {
        CacheBuilder::new(loader, clock)
    }

    pub(crate) fn from_parts(
        loader: L,
        clock: Clock,
        options: CacheOptions,
        persistence: Option<Arc<dyn Persistence>>,
    ) -> Self {
        let cache = Self {
            inner: Arc::new(Inner {
                loader,
                clock,
                options,
                persistence,
                state: Mutex::new(CacheState {
                    entries: HashMap::new(),
                    states: HashMap::new(),
                    next_seq: 0,
                }),
                maintenance: Mutex::new(None),
            }),
        };

        cache.restore();
        if cache.inner.options.maintenance {
            cache.start_maintenance();
        }
        cache
    }

    /// Returns the options the cache was built with.
    #[must_use]
    pub fn options(&self) -> &CacheOptions {
        &self.inner.options
    }

    /// Returns the entry for `key` and marks it as accessed. Staleness is not checked.
    #[must_use]
    pub fn get(&self, key: &L::Key) -> Option<CacheEntry<L::Value>> {
        let now = self.inner.clock.system_time();
        let entry = self.inner.state.lock().touch(key, now).cloned();
        self.inner.record(
            if entry.is_some() { CacheActivity::Hit } else { CacheActivity::Miss },
            Some(key),
        );
        entry
    }

    /// Returns the entry for `key` without marking it as accessed.
    #[must_use]
    pub fn peek(&self, key: &L::Key) -> Option<CacheEntry<L::Value>> {
        self.inner.state.lock().entries.get(key).cloned()
    }

    /// Returns `true` if an entry exists for `key`, fresh or not.
    #[must_use]
    pub fn contains(&self, key: &L::Key) -> bool {
        self.inner.state.lock().entries.contains_key(key)
    }

    /// Returns `true` if an entry for `key` exists and is younger than the TTL.
    #[must_use]
    pub fn is_fresh(&self, key: &L::Key) -> bool {
        let now = self.inner.clock.system_time();
        self.inner
            .state
            .lock()
            .entries
            .get(key)
            .is_some_and(|e| e.is_fresh(now, self.inner.options.ttl))
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    /// Returns `true` if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts or replaces the value of `key`.
    ///
    /// An [`Upstream`](Provenance::Upstream) insert restarts the entry's TTL and counts as a
    /// load; a [`Cache`](Provenance::Cache) insert keeps both. The key's fetch state is reset
    /// unless a load is in flight. If the insert pushes the cache over capacity, the least
    /// recently accessed entries are evicted.
    pub fn put(&self, key: L::Key, value: L::Value, provenance: Provenance) {
        self.insert(key, value, provenance, false);
    }

    fn insert(&self, key: L::Key, value: L::Value, provenance: Provenance, loaded: bool) {
        let now = self.inner.clock.system_time();
        let evicted = {
            let mut state = self.inner.state.lock();
            if loaded {
                state.states.remove(&key);
            } else {
                state.forget_state(&key);
            }
            state.insert(key, value, provenance, now);
            state.optimize(self.inner.options.capacity)
        };

        if evicted > 0 {
            self.inner.record_count(CacheActivity::Evicted, evicted);
        }
    }

    /// Returns the value of `key`, loading it if the cached entry is missing or stale.
    ///
    /// Returns `None` without calling the loader when a load of `key` is already in flight or
    /// when the key has failed `max_retries` times. A failed load also returns `None`; the
    /// failure is recorded in [`fetch_state`](Self::fetch_state).
    ///
    /// Dropping the returned future before it completes releases the key, so a later fetch
    /// can load it again.
    pub async fn fetch(&self, key: &L::Key) -> Option<L::Value> {
        self.fetch_inner(key, false).await
    }

    /// Like [`fetch`](Self::fetch), but loads even when a fresh entry is cached.
    pub async fn refresh(&self, key: &L::Key) -> Option<L::Value> {
        self.fetch_inner(key, true).await
    }

    async fn fetch_inner(&self, key: &L::Key, force: bool) -> Option<L::Value> {
        let inner = &*self.inner;
        let retry_count = {
            let now = inner.clock.system_time();
            let mut state = inner.state.lock();
            let current = state.states.get(key).cloned().unwrap_or_default();

            if current.is_loading() {
                drop(state);
                inner.record(CacheActivity::InFlight, Some(key));
                return None;
            }

            if !force {
                let fresh = state.entries.get(key).map(|e| e.is_fresh(now, inner.options.ttl));
                match fresh {
                    Some(true) => {
                        let value = state.touch(key, now).map(|e| e.value.clone());
                        drop(state);
                        inner.record(CacheActivity::Hit, Some(key));
                        return value;
                    }
                    Some(false) => inner.record(CacheActivity::Stale, Some(key)),
                    None => inner.record(CacheActivity::Miss, Some(key)),
                }
            }

            if current.retry_count >= inner.options.max_retries {
                drop(state);
                inner.record(CacheActivity::RetriesExhausted, Some(key));
                return None;
            }

            state.states.insert(key.clone(), FetchState::loading(current.retry_count));
            current.retry_count
        };

        let mut guard = LoadingGuard {
            inner,
            key,
            armed: true,
        };

        inner.record(CacheActivity::Fetch, Some(key));
        let result = match inner.loader.load(key).timeout(&inner.clock, inner.options.fetch_timeout).await {
            Ok(result) => result,
            Err(elapsed) => Err(UpstreamError::network(elapsed)),
        };
        guard.armed = false;

        match result {
            Ok(value) => {
                self.insert(key.clone(), value.clone(), Provenance::Upstream, true);
                Some(value)
            }
            Err(error) => {
                let retry_count = retry_count.saturating_add(1);
                inner
                    .state
                    .lock()
                    .states
                    .insert(key.clone(), FetchState::failed(error.to_string(), retry_count));
                tracing::error!(
                    cache.name = %inner.options.name,
                    cache.activity = CacheActivity::FetchFailed.as_str(),
                    cache.key = ?key,
                    cache.retry_count = retry_count,
                    error.kind = error.kind().as_str(),
                    "cache.event"
                );
                None
            }
        }
    }

    /// Returns the fetch state of `key`; keys never fetched are idle.
    #[must_use]
    pub fn fetch_state(&self, key: &L::Key) -> FetchState {
        self.inner.state.lock().states.get(key).cloned().unwrap_or_default()
    }

    /// Clears the failure history of `key` so it can be fetched again.
    ///
    /// Returns `false`, leaving the state untouched, while a load of `key` is in flight.
    pub fn reset_fetch_state(&self, key: &L::Key) -> bool {
        let mut state = self.inner.state.lock();
        if state.states.get(key).is_some_and(FetchState::is_loading) {
            return false;
        }
        state.states.remove(key);
        true
    }

    /// Removes `key` and its fetch state.
    pub fn evict_key(&self, key: &L::Key) -> Option<CacheEntry<L::Value>> {
        let removed = self.inner.state.lock().remove(key);
        if removed.is_some() {
            self.inner.record(CacheActivity::Evicted, Some(key));
        }
        removed
    }

    /// Removes every entry and every fetch state except those of in-flight loads.
    pub fn clear(&self) {
        let count = {
            let mut state = self.inner.state.lock();
            let count = state.entries.len();
            state.entries.clear();
            state.states.retain(|_, s| s.is_loading());
            count
        };
        self.inner.record_count(CacheActivity::Evicted, count);
    }

    /// Removes entries loaded `max_age` or longer ago, and their fetch states.
    ///
    /// Returns the number of removed entries.
    pub fn clear_stale(&self, max_age: Duration) -> usize {
        self.inner.clear_stale(max_age)
    }

    /// Evicts down to the capacity, keeping the most recently accessed entries.
    ///
    /// Returns the number of evicted entries; zero when the cache is within capacity.
    pub fn optimize_cache(&self) -> usize {
        let evicted = self.inner.state.lock().optimize(self.inner.options.capacity);
        if evicted > 0 {
            self.inner.record_count(CacheActivity::Evicted, evicted);
        }
        evicted
    }

    /// Summarizes the cache contents.
    #[must_use]
    pub fn stats(&self) -> CacheStats<L::Key> {
        let now = self.inner.clock.system_time();
        let ttl = self.inner.options.ttl;

        let (snapshot, stale) = {
            let state = self.inner.state.lock();
            let stale = state.entries.values().filter(|e| !e.is_fresh(now, ttl)).count();
            (self.inner.snapshot_entries(&state), stale)
        };
        let entries = snapshot.len();

        let approximate_size = snapshot
            .iter()
            .map(|e| serde_json::to_vec(e).map_or(0, |bytes| bytes.len()))
            .sum();

        let mut most_fetched: Vec<_> = snapshot.into_iter().map(|e| (e.key, e.fetch_count)).collect();
        most_fetched.sort_by(|a, b| b.1.cmp(&a.1));
        most_fetched.truncate(self.inner.options.stats_top);

        CacheStats {
            entries,
            approximate_size,
            stale,
            most_fetched,
        }
    }

    /// Writes a snapshot of all entries through the configured persistence.
    ///
    /// Does nothing when no persistence is configured.
    ///
    /// # Errors
    ///
    /// Returns an error when the snapshot cannot be encoded or stored.
    pub fn save(&self) -> Result<(), PersistenceError> {
        self.inner.save()
    }

    /// Returns `true` while the background sweep is running.
    #[must_use]
    pub fn is_maintenance_running(&self) -> bool {
        self.inner.maintenance.lock().as_ref().is_some_and(MaintenanceHandle::is_running)
    }

    /// Stops the background sweep. Has no effect if it is not running.
    pub fn stop_maintenance(&self) {
        self.inner.maintenance.lock().take();
    }

    /// Stops the background sweep and writes a final snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error when the snapshot cannot be stored.
    pub fn shutdown(&self) -> Result<(), PersistenceError> {
        self.stop_maintenance();
        self.save()
    }

    fn start_maintenance(&self) {
        let weak: Weak<Inner<L>> = Arc::downgrade(&self.inner);
        let max_age = self.inner.options.sweep_max_age;
        let handle = maintenance::start(
            &self.inner.options.name,
            &self.inner.clock,
            self.inner.options.sweep_interval,
            move || {
                let Some(inner) = weak.upgrade() else {
                    return ControlFlow::Break(());
                };
                inner.clear_stale(max_age);
                // Failures are already logged; the next sweep tries again.
                let _ = inner.save();
                ControlFlow::Continue(())
            },
        );
        *self.inner.maintenance.lock() = handle;
    }

    fn restore(&self) {
        let Some(persistence) = &self.inner.persistence else {
            return;
        };

        let text = match persistence.load() {
            Ok(Some(text)) => text,
            Ok(None) => return,
            Err(error) => {
                self.inner.record_corrupted(&error);
                return;
            }
        };

        let mut entries = match snapshot::decode::<L::Key, L::Value>(&text) {
            Ok(entries) => entries,
            Err(error) => {
                self.inner.record_corrupted(&error);
                return;
            }
        };

        // Oldest access first, so restored entries get ascending access sequence numbers.
        entries.sort_by_key(|e| e.last_accessed_at);
        let count = entries.len();
        let evicted = {
            let mut state = self.inner.state.lock();
            for restored in entries {
                let access_seq = state.seq();
                state.entries.insert(
                    restored.key,
                    CacheEntry {
                        value: restored.value,
                        fetched_at: snapshot::from_millis(restored.fetched_at),
                        last_accessed_at: snapshot::from_millis(restored.last_accessed_at),
                        fetch_count: restored.fetch_count.max(1),
                        provenance: restored.provenance,
                        access_seq,
                    },
                );
            }
            state.optimize(self.inner.options.capacity)
        };

        self.inner.record_count(CacheActivity::Restored, count);
        if evicted > 0 {
            self.inner.record_count(CacheActivity::Evicted, evicted);
        }
    }
}

impl<L: Loader> Inner<L> {
    fn clear_stale(&self, max_age: Duration) -> usize {
        let now = self.clock.system_time();
        let removed = {
            let mut state = self.state.lock();
            let stale: Vec<L::Key> = state
                .entries
                .iter()
                .filter(|(_, e)| !e.is_fresh(now, max_age))
                .map(|(k, _)| k.clone())
                .collect();
            for key in &stale {
                state.remove(key);
            }
            stale.len()
        };

        if removed > 0 {
            self.record_count(CacheActivity::Expired, removed);
        }
        removed
    }

    fn snapshot_entries(&self, state: &CacheState<L::Key, L::Value>) -> Vec<SnapshotEntry<L::Key, L::Value>> {
        state
            .entries
            .iter()
            .map(|(key, entry)| SnapshotEntry::new(key.clone(), entry))
            .collect()
    }

    fn save(&self) -> Result<(), PersistenceError> {
        let Some(persistence) = &self.persistence else {
            return Ok(());
        };

        let entries = self.snapshot_entries(&self.state.lock());
        let count = entries.len();
        let result = snapshot::encode(entries)
            .map_err(PersistenceError::from_message)
            .and_then(|text| persistence.save(&text));

        match &result {
            Ok(()) => self.record_count(CacheActivity::Persisted, count),
            Err(error) => tracing::error!(
                cache.name = %self.options.name,
                cache.activity = CacheActivity::PersistFailed.as_str(),
                error = %error,
                "cache.event"
            ),
        }
        result
    }

    fn record(&self, activity: CacheActivity, key: Option<&L::Key>) {
        telemetry::record(&self.options.name, activity, key.map(|k| k as &dyn Debug), None);
    }

    fn record_count(&self, activity: CacheActivity, count: usize) {
        telemetry::record(&self.options.name, activity, None, Some(count));
    }

    fn record_corrupted(&self, error: &dyn std::error::Error) {
        tracing::error!(
            cache.name = %self.options.name,
            cache.activity = CacheActivity::Corrupted.as_str(),
            error = %error,
            "cache.event"
        );
    }
}

/// Returns the key to idle if a load is abandoned before it completes.
struct LoadingGuard<'a, L: Loader> {
    inner: &'a Inner<L>,
    key: &'a L::Key,
    armed: bool,
}

impl<L: Loader> Drop for LoadingGuard<'_, L> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let mut state = self.inner.state.lock();
        if let Some(fetch_state) = state.states.get_mut(self.key)
            && fetch_state.is_loading()
        {
            *fetch_state = FetchState {
                retry_count: fetch_state.retry_count,
                ..FetchState::default()
            };
        }
    }
}

impl<L> EntityLookup for EntityCache<L>
where
    L: Loader<Key = GameId, Value = Game>,
{
    fn lookup(&self, id: &GameId) -> Option<Game> {
        let now = self.inner.clock.system_time();
        let ttl = self.inner.options.ttl;
        let mut state = self.inner.state.lock();
        let usable = state
            .entries
            .get(id)
            .is_some_and(|e| e.value.detailed && e.is_fresh(now, ttl));
        if !usable {
            return None;
        }
        state.touch(id, now).map(|e| e.value.clone())
    }
}
