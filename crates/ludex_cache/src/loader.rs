// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use ludex_upstream::{Game, GameId, Upstream, UpstreamError};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Requirements on cache keys.
pub trait CacheKey: Clone + Eq + Hash + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> CacheKey for T where T: Clone + Eq + Hash + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Requirements on cached values.
pub trait CacheValue: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Produces the value of a key on a cache miss.
///
/// The cache bounds every call with its configured fetch timeout and records failures in the
/// key's [`FetchState`](crate::FetchState); loaders only need to report what went wrong.
pub trait Loader: Send + Sync + 'static {
    /// The key type.
    type Key: CacheKey;
    /// The value type.
    type Value: CacheValue;

    /// Loads the current value of `key`.
    fn load(&self, key: &Self::Key) -> impl Future<Output = Result<Self::Value, UpstreamError>> + Send;
}

/// Loads full-detail game records through an [`Upstream`].
#[derive(Debug)]
pub struct UpstreamLoader<U> {
    upstream: Arc<U>,
}

impl<U> UpstreamLoader<U> {
    /// Wraps a shared upstream.
    #[must_use]
    pub fn new(upstream: Arc<U>) -> Self {
        Self { upstream }
    }
}

impl<U> Clone for UpstreamLoader<U> {
    fn clone(&self) -> Self {
        Self {
            upstream: Arc::clone(&self.upstream),
        }
    }
}

impl<U: Upstream + 'static> Loader for UpstreamLoader<U> {
    type Key = GameId;
    type Value = Game;

    async fn load(&self, key: &GameId) -> Result<Game, UpstreamError> {
        self.upstream.get_entity(key).await.map(Game::into_detailed)
    }
}

/// Read access to already known game records.
///
/// Lets consumers such as the search session prefer cached full-detail records over search
/// summaries without knowing the concrete cache type.
pub trait EntityLookup: Send + Sync {
    /// Returns a fresh record for `id` if one is cached. Marks the record as accessed.
    fn lookup(&self, id: &GameId) -> Option<Game>;
}
