// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Structured log events emitted by the entity cache.

use std::fmt::Debug;

use tracing::Level;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheActivity {
    Hit,
    Miss,
    Stale,
    Fetch,
    FetchFailed,
    InFlight,
    RetriesExhausted,
    Evicted,
    Expired,
    Restored,
    Corrupted,
    Persisted,
    PersistFailed,
}

impl CacheActivity {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "cache.hit",
            Self::Miss => "cache.miss",
            Self::Stale => "cache.stale",
            Self::Fetch => "cache.fetch",
            Self::FetchFailed => "cache.fetch_failed",
            Self::InFlight => "cache.in_flight",
            Self::RetriesExhausted => "cache.retries_exhausted",
            Self::Evicted => "cache.evicted",
            Self::Expired => "cache.expired",
            Self::Restored => "cache.restored",
            Self::Corrupted => "cache.corrupted",
            Self::Persisted => "cache.persisted",
            Self::PersistFailed => "cache.persist_failed",
        }
    }

    pub(crate) fn severity(self) -> Level {
        match self {
            Self::FetchFailed | Self::Corrupted | Self::PersistFailed => Level::ERROR,
            Self::RetriesExhausted | Self::Evicted | Self::Expired | Self::Restored | Self::Persisted => Level::INFO,
            Self::Hit | Self::Miss | Self::Stale | Self::Fetch | Self::InFlight => Level::DEBUG,
        }
    }
}

/// Emits a cache event. `key` is attached for per-key activities, `count` for bulk ones.
pub(crate) fn record(cache_name: &str, activity: CacheActivity, key: Option<&dyn Debug>, count: Option<usize>) {
    let activity_name = activity.as_str();

    // Tracing levels must be constant, so the level is selected through a macro.
    macro_rules! emit_event {
        ($level:ident) => {
            tracing::$level!(
                cache.name = cache_name,
                cache.activity = activity_name,
                cache.key = key.map(tracing::field::debug),
                cache.count = count,
                "cache.event"
            )
        };
    }

    match activity.severity() {
        Level::ERROR => emit_event!(error),
        Level::INFO => emit_event!(info),
        _ => emit_event!(debug),
    }
}
