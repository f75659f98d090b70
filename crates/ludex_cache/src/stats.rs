// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// A point-in-time summary of an [`EntityCache`](crate::EntityCache), for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats<K> {
    /// Number of entries.
    pub entries: usize,
    /// Approximate size of the entries when serialized, in bytes.
    pub approximate_size: usize,
    /// Number of entries at least one TTL old.
    pub stale: usize,
    /// Keys with the most upstream loads, highest first, with their load counts.
    pub most_fetched: Vec<(K, u32)>,
}
