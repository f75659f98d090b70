// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Debounced, cancellable, multi-provider search.

mod options;
mod plan;
mod result;
mod result_cache;
mod session;

pub use options::{SearchOptions, SearchStrategy, SessionOptions, SourcePreference};
pub use result::{SearchResult, SearchSnapshot, SearchStatus};
pub use result_cache::ResultCacheStats;
pub use session::{SearchSession, SessionBuilder};
