// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use tick::Clock;

use crate::{CacheOptions, EntityCache, Loader, Persistence};

/// Builder for [`EntityCache`].
///
/// Created by [`EntityCache::builder`].
pub struct CacheBuilder<L> {
    loader: L,
    clock: Clock,
    options: CacheOptions,
    persistence: Option<Arc<dyn Persistence>>,
}

impl<L> Debug for CacheBuilder<L> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheBuilder")
            .field("options", &self.options)
            .field("persistence", &self.persistence)
            .finish_non_exhaustive()
    }
}

impl<L: Loader> CacheBuilder<L> {
    pub(crate) fn new(loader: L, clock: Clock) -> Self {
        Self {
            loader,
            clock,
            options: CacheOptions::default(),
            persistence: None,
        }
    }

    /// Replaces the options.
    #[must_use]
    pub fn options(mut self, options: CacheOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the storage used to restore the cache at build time and to save snapshots.
    #[must_use]
    pub fn persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Builds the cache.
    ///
    /// Entries are restored from the configured persistence first; an unreadable snapshot is
    /// logged and the cache starts out empty. When maintenance is enabled and a tokio runtime
    /// is available, the background stale sweep is started.
    #[must_use]
    pub fn build(self) -> EntityCache<L> {
        EntityCache::from_parts(self.loader, self.clock, self.options, self.persistence)
    }
}
