// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::BTreeSet;
use std::time::Duration;

use ludex_upstream::{Game, SourceId};

use crate::constants::DEFAULT_PAGE_SIZE;
use crate::failure::Failure;

/// One page of search results with its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// Results on this page.
    pub items: Vec<Game>,
    /// Total number of matches across all pages.
    pub total: u64,
    /// 1-based page number.
    pub page: u32,
    /// Requested number of results per page.
    pub page_size: u32,
    /// Whether a page after this one exists.
    pub has_next_page: bool,
    /// Whether a page before this one exists.
    pub has_previous_page: bool,
    /// Providers that contributed to `items`.
    pub sources: BTreeSet<SourceId>,
    /// Whether the session's result cache answered the request.
    pub cache_hit: bool,
    /// Time spent producing the result.
    pub elapsed: Duration,
}

impl SearchResult {
    pub(crate) fn new(items: Vec<Game>, total: u64, page: u32, page_size: u32, sources: BTreeSet<SourceId>) -> Self {
        let page_size = page_size.max(1);
        Self {
            items,
            total,
            page,
            page_size,
            has_next_page: total > u64::from(page) * u64::from(page_size),
            has_previous_page: page > 1,
            sources,
            cache_hit: false,
            elapsed: Duration::ZERO,
        }
    }

    pub(crate) fn empty(page_size: u32) -> Self {
        Self::new(Vec::new(), 0, 1, page_size, BTreeSet::new())
    }

    /// Returns the number of pages needed to show every match.
    #[must_use]
    pub fn total_pages(&self) -> u32 {
        let pages = self.total.div_ceil(u64::from(self.page_size.max(1)));
        u32::try_from(pages).unwrap_or(u32::MAX)
    }
}

impl Default for SearchResult {
    fn default() -> Self {
        Self::empty(DEFAULT_PAGE_SIZE)
    }
}

/// Lifecycle of a search session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SearchStatus {
    /// No search is running and none has completed since the last reset.
    #[default]
    Idle,
    /// A request is in flight.
    Searching,
    /// The most recent request succeeded.
    Succeeded,
    /// The most recent request failed; the previous results are kept.
    Failed,
}

/// Observable state of a [`SearchSession`](crate::SearchSession).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchSnapshot {
    /// Query of the most recently issued search.
    pub query: String,
    /// Current lifecycle state.
    pub status: SearchStatus,
    /// Most recent successful result, kept across failures.
    pub result: SearchResult,
    /// Classification of the most recent failure, cleared by the next success.
    pub failure: Option<Failure>,
    /// Whether a search has reached a provider since the last reset.
    pub has_searched: bool,
}

impl SearchSnapshot {
    /// Returns `true` while a request is in flight.
    #[must_use]
    pub fn is_searching(&self) -> bool {
        self.status == SearchStatus::Searching
    }

    /// Returns `true` when the failure warrants a "try again" notice.
    #[must_use]
    pub fn should_notify(&self) -> bool {
        self.failure.as_ref().is_some_and(Failure::is_retryable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_flags_follow_the_total() {
        let first = SearchResult::new(Vec::new(), 45, 1, 20, BTreeSet::new());
        assert!(first.has_next_page);
        assert!(!first.has_previous_page);
        assert_eq!(first.total_pages(), 3);

        let last = SearchResult::new(Vec::new(), 45, 3, 20, BTreeSet::new());
        assert!(!last.has_next_page);
        assert!(last.has_previous_page);

        let exact = SearchResult::new(Vec::new(), 40, 2, 20, BTreeSet::new());
        assert!(!exact.has_next_page);
        assert_eq!(exact.total_pages(), 2);
    }

    #[test]
    fn empty_result_has_no_pages() {
        let empty = SearchResult::default();
        assert_eq!(empty.total_pages(), 0);
        assert!(!empty.has_next_page);
        assert!(!empty.has_previous_page);
    }

    #[test]
    fn zero_page_size_counts_as_one() {
        let result = SearchResult::new(Vec::new(), 3, 1, 0, BTreeSet::new());
        assert_eq!(result.page_size, 1);
        assert_eq!(result.total_pages(), 3);
    }
}
