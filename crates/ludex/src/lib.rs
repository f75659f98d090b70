// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Debounced, cancellable, multi-provider game search and listing feeds.
//!
//! This crate is the orchestration layer of the ludex catalog. It sits on top of the
//! [`ludex_upstream`] provider contracts and the [`ludex_cache`] entity cache:
//!
//! - [`SearchSession`] turns typed input into searches. Input is debounced, superseded
//!   requests are cancelled, providers are queried according to a [`SearchStrategy`], results
//!   are paginated and annotated with the providers that answered and whether the session's
//!   short-lived result cache served them.
//! - [`ListingFeed`] loads fixed listings such as trending games, optionally refreshing them
//!   in the background with [`Backoff`] after failures.
//! - [`ConnectivityProber`] checks which providers are reachable so searches and feeds can
//!   skip the ones that are not.
//! - [`Debouncer`] is the primitive behind the session's input handling.
//!
//! Expected failures are state, not errors: sessions and feeds record a [`Failure`] next to
//! the last good results, and [`Failure::is_retryable`] tells whether a "try again" notice is
//! warranted.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use ludex::{SearchOptions, SearchSession, SearchStrategy, SessionOptions};
//! use ludex_upstream::Game;
//! use ludex_upstream::testing::MockUpstream;
//! use tick::Clock;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let upstream = MockUpstream::new(["catalog", "graph"]);
//! upstream.add_results("graph", "celeste", vec![Game::new("7", "graph", "Celeste")]);
//!
//! let options = SessionOptions::default()
//!     .debounce(Duration::from_millis(50))
//!     .search(SearchOptions::default().strategy(SearchStrategy::Prefer("catalog".into())));
//! let session = SearchSession::builder(Arc::new(upstream), Clock::new_tokio())
//!     .options(options)
//!     .build();
//!
//! // The preferred provider has nothing, so the next one answers.
//! let snapshot = session.search("celeste").await;
//! assert_eq!(snapshot.result.items.len(), 1);
//! assert!(snapshot.result.sources.contains(&"graph".into()));
//! # }
//! ```

mod backoff;
mod constants;
mod debounce;
mod failure;
mod feed;
mod prober;
mod search;

#[doc(inline)]
pub use backoff::{Backoff, BackoffKind};
#[doc(inline)]
pub use debounce::Debouncer;
#[doc(inline)]
pub use failure::Failure;
#[doc(inline)]
pub use feed::{FeedOptions, FeedSnapshot, FeedSource, FeedStatus, ListingFeed};
#[doc(inline)]
pub use prober::{Connectivity, ConnectivityProber, ProberOptions};
#[doc(inline)]
pub use search::{
    ResultCacheStats, SearchOptions, SearchResult, SearchSession, SearchSnapshot, SearchStatus, SearchStrategy, SessionBuilder,
    SessionOptions, SourcePreference,
};
pub use {ludex_cache, ludex_upstream};
