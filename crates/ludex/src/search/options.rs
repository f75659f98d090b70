// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use ludex_upstream::SourceId;
use serde::{Deserialize, Deserializer};

use crate::constants::{
    DEFAULT_DEBOUNCE, DEFAULT_MIN_QUERY_LEN, DEFAULT_PAGE_SIZE, DEFAULT_REQUEST_TIMEOUT, DEFAULT_RESULT_CACHE_CAPACITY,
    DEFAULT_RESULT_CACHE_TTL, DEFAULT_SUGGESTION_LIMIT,
};

/// How a search fans out across providers and how their answers are merged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    /// Query every candidate provider concurrently and merge the pages, de-duplicating by
    /// game id. The first provider (in priority order) to return a game owns it.
    #[default]
    Combined,

    /// Query the given provider first and move on to the next one only when it returns no
    /// results or fails.
    Prefer(SourceId),
}

/// Which providers are candidates for a search.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourcePreference {
    /// Every reachable provider, ordered by the strategy.
    #[default]
    Auto,

    /// Only the given provider.
    Pinned(SourceId),

    /// Only the highest-priority reachable provider. Used for autocomplete.
    Fastest,
}

/// Per-request search parameters.
///
/// # Examples
///
/// ```
/// use ludex::{SearchOptions, SearchStrategy};
///
/// let options = SearchOptions::default()
///     .page_size(10)
///     .strategy(SearchStrategy::Prefer("graph".into()));
///
/// assert_eq!(options.page_size, 10);
/// assert!(options.use_cache);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct SearchOptions {
    /// Number of results per page. Zero is treated as one.
    #[serde(deserialize_with = "at_least_one")]
    pub page_size: u32,
    /// Fan-out and merge behavior.
    pub strategy: SearchStrategy,
    /// Candidate providers.
    pub preference: SourcePreference,
    /// Whether the session's result cache may answer the request.
    pub use_cache: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            strategy: SearchStrategy::default(),
            preference: SourcePreference::default(),
            use_cache: true,
        }
    }
}

impl SearchOptions {
    /// Sets the number of results per page. Zero is treated as one.
    #[must_use]
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Sets the fan-out strategy.
    #[must_use]
    pub fn strategy(mut self, strategy: SearchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the candidate providers.
    #[must_use]
    pub fn preference(mut self, preference: SourcePreference) -> Self {
        self.preference = preference;
        self
    }

    /// Enables or disables the result cache for this request.
    #[must_use]
    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }
}

fn at_least_one<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    u32::deserialize(deserializer).map(|value| value.max(1))
}

/// Configuration of a [`SearchSession`](crate::SearchSession).
///
/// Durations are expressed in milliseconds when deserialized; the default per-request
/// parameters are flattened into the same document.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use ludex::SessionOptions;
///
/// let options: SessionOptions = serde_json::from_str(r#"{ "debounce": 150, "page_size": 12 }"#)?;
/// assert_eq!(options.debounce, Duration::from_millis(150));
/// assert_eq!(options.search.page_size, 12);
/// assert_eq!(options.min_query_len, 2);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct SessionOptions {
    /// Quiet period before typed input triggers a search.
    #[serde(with = "ludex_cache::serde_millis")]
    pub debounce: Duration,
    /// Queries with fewer characters resolve to an empty result without a request.
    pub min_query_len: usize,
    /// Whether settled input triggers a search on its own.
    pub auto_search: bool,
    /// Upper bound on a single provider request; elapsed requests count as network failures.
    #[serde(with = "ludex_cache::serde_millis")]
    pub request_timeout: Duration,
    /// Lifetime of a cached search result.
    #[serde(with = "ludex_cache::serde_millis")]
    pub result_cache_ttl: Duration,
    /// Number of cached search results.
    pub result_cache_capacity: usize,
    /// Default number of autocomplete suggestions.
    pub suggestion_limit: u32,
    /// Parameters of searches triggered by input.
    #[serde(flatten)]
    pub search: SearchOptions,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            min_query_len: DEFAULT_MIN_QUERY_LEN,
            auto_search: true,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            result_cache_ttl: DEFAULT_RESULT_CACHE_TTL,
            result_cache_capacity: DEFAULT_RESULT_CACHE_CAPACITY,
            suggestion_limit: DEFAULT_SUGGESTION_LIMIT,
            search: SearchOptions::default(),
        }
    }
}

impl SessionOptions {
    /// Sets the input quiet period. Zero issues a search for every change.
    #[must_use]
    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Sets the minimum query length.
    #[must_use]
    pub fn min_query_len(mut self, min_query_len: usize) -> Self {
        self.min_query_len = min_query_len;
        self
    }

    /// Enables or disables searching on settled input.
    #[must_use]
    pub fn auto_search(mut self, auto_search: bool) -> Self {
        self.auto_search = auto_search;
        self
    }

    /// Sets the per-provider request timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the lifetime and size of the result cache.
    #[must_use]
    pub fn result_cache(mut self, ttl: Duration, capacity: usize) -> Self {
        self.result_cache_ttl = ttl;
        self.result_cache_capacity = capacity;
        self
    }

    /// Sets the default number of autocomplete suggestions.
    #[must_use]
    pub fn suggestion_limit(mut self, limit: u32) -> Self {
        self.suggestion_limit = limit;
        self
    }

    /// Sets the parameters of searches triggered by input.
    #[must_use]
    pub fn search(mut self, search: SearchOptions) -> Self {
        self.search = search;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategies_deserialize_externally_tagged() {
        let strategy: SearchStrategy = serde_json::from_str(r#"{ "prefer": "graph" }"#).unwrap();
        assert_eq!(strategy, SearchStrategy::Prefer(SourceId::new("graph")));

        let preference: SourcePreference = serde_json::from_str(r#""fastest""#).unwrap();
        assert_eq!(preference, SourcePreference::Fastest);
    }

    #[test]
    fn zero_page_size_is_clamped() {
        assert_eq!(SearchOptions::default().page_size(0).page_size, 1);
    }

    #[test]
    fn zero_page_size_is_clamped_when_deserialized() {
        let options: SearchOptions = serde_json::from_str(r#"{ "page_size": 0 }"#).unwrap();
        assert_eq!(options.page_size, 1);

        let options: SessionOptions = serde_json::from_str(r#"{ "page_size": 0, "debounce": 100 }"#).unwrap();
        assert_eq!(options.search.page_size, 1);
        assert_eq!(options.debounce, Duration::from_millis(100));
    }
}
