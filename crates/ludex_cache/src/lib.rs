// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! A bounded entity cache with TTL staleness, single-flight loading and versioned persistence.
//!
//! [`EntityCache`] stores values produced by a [`Loader`] together with their fetch time,
//! last access time, load count and [`Provenance`]. Each key also carries a [`FetchState`]
//! that tracks in-flight loads and failures:
//!
//! - A fresh entry (younger than the TTL) is served from memory.
//! - At most one load per key runs at a time; concurrent fetches of a loading key return
//!   `None` instead of issuing a duplicate request.
//! - Failed loads are recorded rather than returned as errors. After `max_retries` failures
//!   the key is no longer loaded until [`EntityCache::reset_fetch_state`] is called.
//! - Inserts that push the cache over capacity evict the least recently accessed entries.
//!
//! The cache can be persisted through any [`Persistence`] transport. Snapshots carry a schema
//! version; older snapshots are upgraded with [`migrate`] on load, and unreadable ones are
//! discarded. A background task periodically drops old entries and saves a snapshot.
//!
//! [`UpstreamLoader`] connects the cache to a [`ludex_upstream::Upstream`], and the
//! [`EntityLookup`] trait exposes cached game records to other components.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use ludex_cache::{CacheOptions, EntityCache, MemoryPersistence, Provenance, UpstreamLoader};
//! use ludex_upstream::testing::MockUpstream;
//! use ludex_upstream::{Game, GameId};
//! use tick::Clock;
//!
//! let persistence = Arc::new(MemoryPersistence::new());
//! let cache = EntityCache::builder(UpstreamLoader::new(Arc::new(MockUpstream::new(["catalog"]))), Clock::new_frozen())
//!     .options(CacheOptions::default().capacity(2).maintenance(false))
//!     .persistence(Arc::clone(&persistence) as _)
//!     .build();
//!
//! for id in ["a", "b"] {
//!     cache.put(GameId::new(id), Game::new(id, "catalog", id), Provenance::Cache);
//! }
//! cache.save()?;
//! assert!(persistence.snapshot().is_some());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod builder;
mod cache;
mod constants;
mod entry;
mod loader;
mod maintenance;
mod options;
mod persistence;
pub mod serde_millis;
mod snapshot;
mod stats;
mod telemetry;

#[doc(inline)]
pub use builder::CacheBuilder;
#[doc(inline)]
pub use cache::EntityCache;
#[doc(inline)]
pub use entry::{CacheEntry, FetchState, FetchStatus, Provenance};
#[doc(inline)]
pub use loader::{CacheKey, CacheValue, EntityLookup, Loader, UpstreamLoader};
#[doc(inline)]
pub use options::CacheOptions;
#[doc(inline)]
pub use persistence::{FilePersistence, MemoryPersistence, Persistence, PersistenceError};
#[doc(inline)]
pub use snapshot::{SNAPSHOT_VERSION, SnapshotError, migrate};
#[doc(inline)]
pub use stats::CacheStats;
