// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Canonical catalog entities and the contracts of the upstream providers that serve them.
//!
//! Everything that crosses the boundary between the ludex caching layer and a remote
//! content provider is defined here:
//!
//! - [`Game`], [`GameId`] and [`SourceId`] - the canonical entity every other crate works with.
//! - [`Upstream`] - the fetch capability consumed by the entity cache, the search session and
//!   the listing feeds.
//! - [`UpstreamError`] and [`ErrorKind`] - the failure taxonomy. Errors implement
//!   [`recoverable::Recovery`] so callers can decide whether a retry is worthwhile.
//! - [`normalize`] - one mapping function per provider shape. Providers disagree on how they
//!   encode genres, platforms, identifiers and dates; those differences are absorbed here so no
//!   other code ever branches on the shape of a provider response.
//!
//! # Examples
//!
//! ```
//! use ludex_upstream::{ErrorKind, UpstreamError};
//! use recoverable::{Recovery, RecoveryKind};
//!
//! let error = UpstreamError::network("connection reset");
//! assert_eq!(error.kind(), ErrorKind::Network);
//! assert_eq!(error.recovery().kind(), RecoveryKind::Retry);
//! ```

mod error;
mod game;
mod ids;
pub mod normalize;
mod upstream;

#[cfg(any(feature = "test-util", test))]
pub mod testing;

#[doc(inline)]
pub use error::{ErrorKind, UpstreamError};
#[doc(inline)]
pub use game::{Game, Listing, Page, SearchQuery};
#[doc(inline)]
pub use ids::{GameId, SourceId};
#[doc(inline)]
pub use upstream::Upstream;
