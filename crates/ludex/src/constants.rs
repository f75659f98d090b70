// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

/// Default quiet period before typed input triggers a search: 300 milliseconds.
///
/// Short enough to feel live, long enough that most words are typed before a request is sent.
pub(crate) const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Queries shorter than this many characters never reach the network.
pub(crate) const DEFAULT_MIN_QUERY_LEN: usize = 2;

/// Default number of results per page.
pub(crate) const DEFAULT_PAGE_SIZE: u32 = 20;

/// Default number of autocomplete suggestions.
pub(crate) const DEFAULT_SUGGESTION_LIMIT: u32 = 5;

/// Default upper bound on a single upstream request: 8 seconds.
pub(crate) const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

/// Default lifetime of a cached search result: 2 minutes.
pub(crate) const DEFAULT_RESULT_CACHE_TTL: Duration = Duration::from_secs(2 * 60);

/// Default number of cached search results.
pub(crate) const DEFAULT_RESULT_CACHE_CAPACITY: usize = 100;

/// Default lifetime of a connectivity probe result: 2 minutes.
pub(crate) const DEFAULT_PROBE_TTL: Duration = Duration::from_secs(2 * 60);

/// Default timeout of a single reachability check: 3 seconds.
///
/// A probe is a lightweight request; a provider that cannot answer it within a few seconds
/// is treated as unreachable.
pub(crate) const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Default number of items loaded by a listing feed.
pub(crate) const DEFAULT_FEED_LIMIT: usize = 20;

/// Default interval between successful feed refreshes: 5 minutes.
pub(crate) const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Default first retry delay after a failed feed refresh.
pub(crate) const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Default ceiling for feed retry delays.
pub(crate) const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(60);
