// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

/// Default time-to-live of an entry: 5 minutes.
///
/// Catalog records change rarely; five minutes keeps detail views responsive while still
/// picking up corrections within a single browsing session.
pub(crate) const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Default number of entries kept after eviction.
pub(crate) const DEFAULT_CAPACITY: usize = 500;

/// Default number of failed fetches after which a key stops being retried.
pub(crate) const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default upper bound on a single upstream load: 8 seconds.
///
/// Long enough for a slow provider on a mobile connection, short enough that a hung request
/// does not pin the key's single-flight slot.
pub(crate) const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(8);

/// Default interval of the background stale sweep: 10 minutes.
pub(crate) const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Default age after which the background sweep drops an entry: 1 hour.
pub(crate) const DEFAULT_SWEEP_MAX_AGE: Duration = Duration::from_secs(60 * 60);

/// Number of entries reported by [`CacheStats::most_fetched`](crate::CacheStats::most_fetched).
pub(crate) const DEFAULT_STATS_TOP: usize = 5;

/// Name used in telemetry when none is configured.
pub(crate) const DEFAULT_NAME: &str = "entities";
