// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

/// How the current value of an entry was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Inserted from a local source: a restored snapshot or a record learned elsewhere.
    #[default]
    Cache,
    /// Freshly loaded from an upstream provider.
    Upstream,
}

/// A cached value together with its bookkeeping.
///
/// `fetched_at` only moves on an upstream load, while `last_accessed_at` moves on every read
/// and insert, so neither bounds the other.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    /// The cached value.
    pub value: V,
    /// When the value was last loaded from upstream.
    pub fetched_at: SystemTime,
    /// When the entry was last read or written; drives eviction.
    pub last_accessed_at: SystemTime,
    /// Number of upstream loads of this key, at least 1.
    pub fetch_count: u32,
    /// How the current value was obtained.
    pub provenance: Provenance,
    // Tie-breaker for entries accessed within the same clock tick.
    pub(crate) access_seq: u64,
}

impl<V> CacheEntry<V> {
    /// Returns how long ago the value was loaded, or zero if the clock moved backwards.
    #[must_use]
    pub fn age(&self, now: SystemTime) -> Duration {
        now.duration_since(self.fetched_at).unwrap_or_default()
    }

    /// Returns `true` when the entry is younger than `ttl`; an entry exactly `ttl` old is stale.
    #[must_use]
    pub fn is_fresh(&self, now: SystemTime, ttl: Duration) -> bool {
        self.age(now) < ttl
    }
}

/// Progress of loads for a single key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FetchStatus {
    /// No load is running.
    #[default]
    Idle,
    /// A load is in flight; further fetches of the key are refused.
    Loading,
    /// The last load failed.
    Error,
}

/// Per-key load state. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchState {
    /// Current status.
    pub status: FetchStatus,
    /// Description of the last failure while `status` is [`FetchStatus::Error`].
    pub error: Option<String>,
    /// Number of consecutive failed loads.
    pub retry_count: u32,
}

impl FetchState {
    /// Returns `true` while a load is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.status == FetchStatus::Loading
    }

    pub(crate) fn loading(retry_count: u32) -> Self {
        Self {
            status: FetchStatus::Loading,
            error: None,
            retry_count,
        }
    }

    pub(crate) fn failed(error: String, retry_count: u32) -> Self {
        Self {
            status: FetchStatus::Error,
            error: Some(error),
            retry_count,
        }
    }
}
