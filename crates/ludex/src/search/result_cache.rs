// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;

use super::options::{SearchOptions, SearchStrategy, SourcePreference};
use super::result::SearchResult;

/// Counters of a session's result cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub struct ResultCacheStats {
    /// Number of cached results, including expired ones not yet discarded.
    pub entries: usize,
    /// Maximum number of cached results.
    pub capacity: usize,
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that missed or found an expired result.
    pub misses: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ResultKey {
    query: String,
    page: u32,
    page_size: u32,
    strategy: SearchStrategy,
    preference: SourcePreference,
}

impl ResultKey {
    pub(crate) fn new(query: &str, page: u32, options: &SearchOptions) -> Self {
        Self {
            query: normalize_query(query),
            page,
            page_size: options.page_size,
            strategy: options.strategy.clone(),
            preference: options.preference.clone(),
        }
    }
}

/// Case- and whitespace-insensitive form of a query.
fn normalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Short-lived memo of search results, independent of the entity cache.
#[derive(Debug)]
pub(crate) struct ResultCache {
    entries: LruCache<ResultKey, (Instant, SearchResult)>,
    ttl: Duration,
    hits: u64,
    misses: u64,
}

impl ResultCache {
    pub(crate) fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
            ttl,
            hits: 0,
            misses: 0,
        }
    }

    pub(crate) fn get(&mut self, key: &ResultKey, now: Instant) -> Option<SearchResult> {
        let fresh = match self.entries.get(key) {
            Some((stored_at, result)) if now.saturating_duration_since(*stored_at) < self.ttl => Some(result.clone()),
            Some(_) => {
                self.entries.pop(key);
                None
            }
            None => None,
        };

        if fresh.is_some() {
            self.hits = self.hits.saturating_add(1);
        } else {
            self.misses = self.misses.saturating_add(1);
        }
        fresh
    }

    pub(crate) fn insert(&mut self, key: ResultKey, result: SearchResult, now: Instant) {
        self.entries.put(key, (now, result));
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.hits = 0;
        self.misses = 0;
    }

    pub(crate) fn stats(&self) -> ResultCacheStats {
        ResultCacheStats {
            entries: self.entries.len(),
            capacity: self.entries.cap().get(),
            hits: self.hits,
            misses: self.misses,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(query: &str) -> ResultKey {
        ResultKey::new(query, 1, &SearchOptions::default())
    }

    #[test]
    fn keys_ignore_case_and_spacing() {
        assert_eq!(key("  Zelda   Breath "), key("zelda breath"));
        assert_ne!(key("zelda"), ResultKey::new("zelda", 2, &SearchOptions::default()));
        assert_ne!(key("zelda"), ResultKey::new("zelda", 1, &SearchOptions::default().page_size(5)));
    }

    #[test]
    fn results_expire_after_ttl() {
        let start = Instant::now();
        let mut cache = ResultCache::new(4, Duration::from_secs(60));
        cache.insert(key("mario"), SearchResult::default(), start);

        assert!(cache.get(&key("mario"), start + Duration::from_secs(59)).is_some());
        assert!(cache.get(&key("mario"), start + Duration::from_secs(60)).is_none());
        assert_eq!(
            cache.stats(),
            ResultCacheStats {
                entries: 0,
                capacity: 4,
                hits: 1,
                misses: 1,
            }
        );
    }

    #[test]
    fn least_recently_used_results_are_dropped() {
        let now = Instant::now();
        let mut cache = ResultCache::new(2, Duration::from_secs(60));
        cache.insert(key("a"), SearchResult::default(), now);
        cache.insert(key("b"), SearchResult::default(), now);
        cache.get(&key("a"), now);
        cache.insert(key("c"), SearchResult::default(), now);

        assert!(cache.get(&key("a"), now).is_some());
        assert!(cache.get(&key("b"), now).is_none());
        assert!(cache.get(&key("c"), now).is_some());
    }

    #[test]
    fn clear_resets_counters() {
        let now = Instant::now();
        let mut cache = ResultCache::new(2, Duration::from_secs(60));
        cache.insert(key("a"), SearchResult::default(), now);
        cache.get(&key("a"), now);
        cache.clear();

        assert_eq!(cache.stats().entries, 0);
        assert_eq!(cache.stats().hits, 0);
    }
}
