// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Mapping of provider-specific record shapes into the canonical [`Game`].
//!
//! Each provider gets exactly one entry point. The raw record types accept every shape the
//! provider is known to emit (identifiers as numbers or strings, genres as plain names or
//! objects, dates as unix seconds or ISO 8601 strings) so the variance never leaks past this
//! module.
//!
//! # Examples
//!
//! ```
//! use ludex_upstream::SourceId;
//! use ludex_upstream::normalize::{self, CatalogRecord};
//!
//! let raw: CatalogRecord = serde_json::from_str(
//!     r#"{ "id": 3498, "name": "Grand Theft Auto V", "genres": [{ "id": 4, "name": "Action" }, "Adventure"] }"#,
//! )?;
//!
//! let game = normalize::catalog_record(&SourceId::new("catalog"), raw)?;
//! assert_eq!(game.id.as_str(), "3498");
//! assert_eq!(game.genres, ["Action", "Adventure"]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use jiff::Timestamp;
use jiff::civil::Date;
use jiff::tz::TimeZone;
use serde::Deserialize;

use crate::error::Result;
use crate::{Game, GameId, SourceId, UpstreamError};

const GRAPH_RATING_SCALE: f32 = 20.0;
const MAX_RATING: f32 = 5.0;

/// An identifier that a provider encodes either as a number or as a string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    /// Numeric identifier.
    Number(u64),
    /// Textual identifier.
    Text(String),
}

/// A named reference (genre, platform) in any of the shapes providers emit.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawNamed {
    /// `"Action"`
    Text(String),
    /// `{ "id": 4, "name": "Action" }`
    Object {
        /// The display name.
        name: String,
    },
    /// `{ "platform": { "name": "PC" } }`
    Nested {
        /// The wrapped reference.
        platform: Box<Self>,
    },
}

/// A date encoded either as unix seconds or as an ISO 8601 string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawDate {
    /// Seconds since the unix epoch.
    Unix(i64),
    /// `YYYY-MM-DD` or a full ISO 8601 timestamp.
    Text(String),
}

/// A cover reference given either as a URL or as an object carrying one.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawImage {
    /// `"https://..."`
    Url(String),
    /// `{ "url": "//images..." }`
    Object {
        /// The image location, possibly protocol-relative.
        url: String,
    },
}

/// Record shape of the REST catalog provider.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogRecord {
    /// Provider identifier.
    pub id: RawId,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// URL-friendly name.
    #[serde(default)]
    pub slug: Option<String>,
    /// Plain-text description; only present on detail responses.
    #[serde(default, alias = "description")]
    pub description_raw: Option<String>,
    /// Release date.
    #[serde(default)]
    pub released: Option<RawDate>,
    /// Rating on a `0..=5` scale.
    #[serde(default)]
    pub rating: Option<f32>,
    /// Cover art.
    #[serde(default)]
    pub background_image: Option<RawImage>,
    /// Genres.
    #[serde(default)]
    pub genres: Vec<RawNamed>,
    /// Platforms.
    #[serde(default)]
    pub platforms: Vec<RawNamed>,
}

/// Record shape of the query-language provider.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphRecord {
    /// Provider identifier.
    pub id: RawId,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// URL-friendly name.
    #[serde(default)]
    pub slug: Option<String>,
    /// Description; only present on detail responses.
    #[serde(default)]
    pub summary: Option<String>,
    /// First release date.
    #[serde(default)]
    pub first_release_date: Option<RawDate>,
    /// Aggregated rating on a `0..=100` scale.
    #[serde(default)]
    pub total_rating: Option<f32>,
    /// Cover art.
    #[serde(default)]
    pub cover: Option<RawImage>,
    /// Genres.
    #[serde(default)]
    pub genres: Vec<RawNamed>,
    /// Platforms.
    #[serde(default)]
    pub platforms: Vec<RawNamed>,
}

/// Maps a record of the REST catalog provider into a [`Game`].
///
/// Records carrying a description are treated as full-detail records.
///
/// # Errors
///
/// Returns a [`ServiceUnavailable`](crate::ErrorKind::ServiceUnavailable) error when the record
/// has no usable name; such a response indicates a misbehaving provider.
pub fn catalog_record(source: &SourceId, raw: CatalogRecord) -> Result<Game> {
    let id = id(raw.id);
    let name = name(&id, raw.name)?;
    let detailed = raw.description_raw.is_some();

    Ok(Game {
        id,
        source: source.clone(),
        name,
        slug: non_empty(raw.slug),
        summary: non_empty(raw.description_raw),
        released: raw.released.and_then(date),
        rating: raw.rating.map(|r| r.clamp(0.0, MAX_RATING)),
        genres: names(raw.genres),
        platforms: names(raw.platforms),
        cover_url: raw.background_image.map(image),
        detailed,
    })
}

/// Maps a record of the query-language provider into a [`Game`].
///
/// Ratings are rescaled from `0..=100` to `0..=5`. Records carrying a summary are treated as
/// full-detail records.
///
/// # Errors
///
/// Returns a [`ServiceUnavailable`](crate::ErrorKind::ServiceUnavailable) error when the record
/// has no usable name.
pub fn graph_record(source: &SourceId, raw: GraphRecord) -> Result<Game> {
    let id = id(raw.id);
    let name = name(&id, raw.name)?;
    let detailed = raw.summary.is_some();

    Ok(Game {
        id,
        source: source.clone(),
        name,
        slug: non_empty(raw.slug),
        summary: non_empty(raw.summary),
        released: raw.first_release_date.and_then(date),
        rating: raw.total_rating.map(|r| (r / GRAPH_RATING_SCALE).clamp(0.0, MAX_RATING)),
        genres: names(raw.genres),
        platforms: names(raw.platforms),
        cover_url: raw.cover.map(image),
        detailed,
    })
}

fn id(raw: RawId) -> GameId {
    match raw {
        RawId::Number(n) => GameId::new(n.to_string()),
        RawId::Text(s) => GameId::new(s.trim()),
    }
}

fn name(id: &GameId, raw: Option<String>) -> Result<String> {
    non_empty(raw).ok_or_else(|| UpstreamError::service_unavailable(format!("record {id} has no name")))
}

fn names(raw: Vec<RawNamed>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for named in raw {
        let name = flatten(named);
        let name = name.trim();
        if !name.is_empty() && !out.iter().any(|n| n == name) {
            out.push(name.to_owned());
        }
    }
    out
}

fn flatten(named: RawNamed) -> String {
    match named {
        RawNamed::Text(name) | RawNamed::Object { name } => name,
        RawNamed::Nested { platform } => flatten(*platform),
    }
}

fn date(raw: RawDate) -> Option<String> {
    let date = match raw {
        RawDate::Unix(secs) => Timestamp::from_second(secs).ok()?.to_zoned(TimeZone::UTC).date(),
        RawDate::Text(text) => text.get(..10)?.parse::<Date>().ok()?,
    };
    Some(date.to_string())
}

fn image(raw: RawImage) -> String {
    let (RawImage::Url(url) | RawImage::Object { url }) = raw;
    if url.starts_with("//") { format!("https:{url}") } else { url }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_owned()).filter(|v| !v.is_empty())
}
