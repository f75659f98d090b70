// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use serde::Deserialize;

use crate::constants::{
    DEFAULT_CAPACITY, DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_RETRIES, DEFAULT_NAME, DEFAULT_STATS_TOP, DEFAULT_SWEEP_INTERVAL,
    DEFAULT_SWEEP_MAX_AGE, DEFAULT_TTL,
};

/// Tuning knobs of an [`EntityCache`](crate::EntityCache).
///
/// Every field has a default, so options can be loaded from a partial configuration document.
/// Durations are expressed in milliseconds when deserialized.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use ludex_cache::CacheOptions;
///
/// let options: CacheOptions = serde_json::from_str(r#"{ "capacity": 50, "ttl": 60000 }"#)?;
/// assert_eq!(options.capacity, 50);
/// assert_eq!(options.ttl, Duration::from_secs(60));
/// assert_eq!(options.max_retries, 3);
///
/// let options = CacheOptions::default().capacity(2).maintenance(false);
/// assert_eq!(options.capacity, 2);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct CacheOptions {
    /// Name reported in telemetry.
    pub name: String,
    /// Age after which an entry is stale and refetched.
    #[serde(with = "crate::serde_millis")]
    pub ttl: Duration,
    /// Number of entries retained when eviction runs.
    pub capacity: usize,
    /// Number of failed fetches after which a key is no longer retried.
    pub max_retries: u32,
    /// Upper bound on a single loader call; elapsed loads count as network failures.
    #[serde(with = "crate::serde_millis")]
    pub fetch_timeout: Duration,
    /// Whether [`build`](crate::CacheBuilder::build) starts the background stale sweep.
    pub maintenance: bool,
    /// Interval of the background stale sweep.
    #[serde(with = "crate::serde_millis")]
    pub sweep_interval: Duration,
    /// Age after which the background sweep removes an entry.
    #[serde(with = "crate::serde_millis")]
    pub sweep_max_age: Duration,
    /// Number of entries listed in [`CacheStats::most_fetched`](crate::CacheStats::most_fetched).
    pub stats_top: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_owned(),
            ttl: DEFAULT_TTL,
            capacity: DEFAULT_CAPACITY,
            max_retries: DEFAULT_MAX_RETRIES,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            maintenance: true,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            sweep_max_age: DEFAULT_SWEEP_MAX_AGE,
            stats_top: DEFAULT_STATS_TOP,
        }
    }
}

impl CacheOptions {
    /// Sets the telemetry name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the entry time-to-live.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the eviction capacity.
    #[must_use]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the retry ceiling per key.
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the loader timeout.
    #[must_use]
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Enables or disables the background stale sweep.
    #[must_use]
    pub fn maintenance(mut self, enabled: bool) -> Self {
        self.maintenance = enabled;
        self
    }

    /// Sets the sweep interval and the age after which the sweep drops entries.
    #[must_use]
    pub fn sweep(mut self, interval: Duration, max_age: Duration) -> Self {
        self.sweep_interval = interval;
        self.sweep_max_age = max_age;
        self
    }

    /// Sets the number of entries reported as most fetched.
    #[must_use]
    pub fn stats_top(mut self, top: usize) -> Self {
        self.stats_top = top;
        self
    }
}
