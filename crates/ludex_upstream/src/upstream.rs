// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The fetch capability every upstream provider implementation exposes.

use crate::error::Result;
use crate::{Game, GameId, Listing, Page, SearchQuery, SourceId};

/// Access to one or more remote content providers.
///
/// Implementations own the wire format of their providers and are expected to map raw
/// responses through [`normalize`](crate::normalize) before returning them, so callers only
/// ever see canonical [`Game`] values. Failures are classified with an
/// [`ErrorKind`](crate::ErrorKind); timeouts are applied by the callers.
///
/// # Examples
///
/// ```
/// use ludex_upstream::{Game, GameId, Listing, Page, SearchQuery, SourceId, Upstream, UpstreamError};
///
/// struct Static;
///
/// impl Upstream for Static {
///     fn sources(&self) -> Vec<SourceId> {
///         vec![SourceId::new("static")]
///     }
///
///     async fn get_entity(&self, id: &GameId) -> Result<Game, UpstreamError> {
///         Ok(Game::new(id.clone(), "static", "Static Game").into_detailed())
///     }
///
///     async fn search(&self, _source: &SourceId, _query: &SearchQuery) -> Result<Page<Game>, UpstreamError> {
///         Ok(Page::empty())
///     }
///
///     async fn list(&self, _source: &SourceId, _listing: Listing, _limit: usize) -> Result<Vec<Game>, UpstreamError> {
///         Ok(Vec::new())
///     }
///
///     async fn probe(&self, _source: &SourceId) -> bool {
///         true
///     }
/// }
/// ```
pub trait Upstream: Send + Sync {
    /// Returns the configured providers in priority order.
    fn sources(&self) -> Vec<SourceId>;

    /// Fetches the full-detail record of a single game.
    fn get_entity(&self, id: &GameId) -> impl Future<Output = Result<Game>> + Send;

    /// Runs a paginated search against one provider.
    fn search(&self, source: &SourceId, query: &SearchQuery) -> impl Future<Output = Result<Page<Game>>> + Send;

    /// Loads a fixed listing from one provider.
    fn list(&self, source: &SourceId, listing: Listing, limit: usize) -> impl Future<Output = Result<Vec<Game>>> + Send;

    /// Performs a cheap reachability check of one provider.
    ///
    /// Implementations must not fail; unreachable providers report `false`.
    fn probe(&self, source: &SourceId) -> impl Future<Output = bool> + Send;
}
