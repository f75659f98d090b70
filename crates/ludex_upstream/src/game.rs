// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{GameId, SourceId};

/// A cataloged game in its canonical shape.
///
/// Instances are only ever produced by [`normalize`](crate::normalize) functions (or by
/// [`Upstream`](crate::Upstream) implementations that call them), which means every field
/// already has a single well-defined representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    /// Stable identifier of the game.
    pub id: GameId,
    /// The provider that produced this record.
    pub source: SourceId,
    /// Display name.
    pub name: String,
    /// URL-friendly name, if the provider has one.
    #[serde(default)]
    pub slug: Option<String>,
    /// Free-form description.
    #[serde(default)]
    pub summary: Option<String>,
    /// Release date as `YYYY-MM-DD`.
    #[serde(default)]
    pub released: Option<String>,
    /// Rating normalized to the `0.0..=5.0` range.
    #[serde(default)]
    pub rating: Option<f32>,
    /// Genre names.
    #[serde(default)]
    pub genres: Vec<String>,
    /// Platform names.
    #[serde(default)]
    pub platforms: Vec<String>,
    /// Cover art location.
    #[serde(default)]
    pub cover_url: Option<String>,
    /// `true` for a full-detail record, `false` for a search or listing summary.
    #[serde(default)]
    pub detailed: bool,
}

impl Game {
    /// Creates a summary record with only the mandatory fields populated.
    ///
    /// # Examples
    ///
    /// ```
    /// use ludex_upstream::Game;
    ///
    /// let game = Game::new("3498", "catalog", "Grand Theft Auto V");
    /// assert_eq!(game.id.as_str(), "3498");
    /// assert!(!game.detailed);
    /// ```
    #[must_use]
    pub fn new(id: impl Into<GameId>, source: impl Into<SourceId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            name: name.into(),
            slug: None,
            summary: None,
            released: None,
            rating: None,
            genres: Vec::new(),
            platforms: Vec::new(),
            cover_url: None,
            detailed: false,
        }
    }

    /// Marks the record as a full-detail record.
    #[must_use]
    pub fn into_detailed(mut self) -> Self {
        self.detailed = true;
        self
    }
}

/// One page of results returned by a provider.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page, in provider order.
    pub items: Vec<T>,
    /// Total number of matches across all pages.
    pub total: u64,
}

impl<T> Page<T> {
    /// Creates a page.
    #[must_use]
    pub fn new(items: Vec<T>, total: u64) -> Self {
        Self { items, total }
    }

    /// Creates a page with no items and a zero total.
    #[must_use]
    pub fn empty() -> Self {
        Self { items: Vec::new(), total: 0 }
    }
}

/// A search request as sent to a single provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchQuery {
    /// The query text, already trimmed.
    pub text: String,
    /// 1-based page number.
    pub page: u32,
    /// Number of items per page.
    pub page_size: u32,
}

impl SearchQuery {
    /// Creates a query for the given page. A zero page or page size is treated as one.
    #[must_use]
    pub fn new(text: impl Into<String>, page: u32, page_size: u32) -> Self {
        Self {
            text: text.into(),
            page: page.max(1),
            page_size: page_size.max(1),
        }
    }
}

/// Fixed, query-less listings a provider can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Listing {
    /// Currently trending games.
    #[default]
    Trending,
    /// All-time popular games.
    Popular,
    /// Announced but not yet released games.
    Upcoming,
}

impl Listing {
    /// Returns a stable name for the listing.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trending => "trending",
            Self::Popular => "popular",
            Self::Upcoming => "upcoming",
        }
    }
}

impl Display for Listing {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
