// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The versioned snapshot format and its migrations.
//!
//! A snapshot is a JSON document `{ "version": N, "entries": [...] }`. Only entries are
//! persisted; per-key fetch state always starts out idle. Timestamps are unix milliseconds.
//!
//! | Version | Entry fields |
//! |---|---|
//! | 1 | `key`, `value`, `fetched_at` |
//! | 2 | `key`, `value`, `fetched_at`, `last_accessed_at`, `fetch_count`, `provenance` |

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Provenance;
use crate::entry::CacheEntry;

/// The schema version written by this crate.
pub const SNAPSHOT_VERSION: u32 = 2;

/// A snapshot that cannot be read or migrated.
///
/// The cache never surfaces this error; it logs it and starts out empty.
#[ohno::error]
#[from(serde_json::Error)]
pub struct SnapshotError {}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Snapshot<K, V> {
    pub version: u32,
    pub entries: Vec<SnapshotEntry<K, V>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct SnapshotEntry<K, V> {
    pub key: K,
    pub value: V,
    pub fetched_at: u64,
    pub last_accessed_at: u64,
    pub fetch_count: u32,
    pub provenance: Provenance,
}

impl<K, V> SnapshotEntry<K, V> {
    pub(crate) fn new(key: K, entry: &CacheEntry<V>) -> Self
    where
        V: Clone,
    {
        Self {
            key,
            value: entry.value.clone(),
            fetched_at: to_millis(entry.fetched_at),
            last_accessed_at: to_millis(entry.last_accessed_at),
            fetch_count: entry.fetch_count,
            provenance: entry.provenance,
        }
    }
}

pub(crate) fn to_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

pub(crate) fn from_millis(millis: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(millis)
}

/// Upgrades a snapshot document written under `from_version` to [`SNAPSHOT_VERSION`].
///
/// The function is pure: it only reshapes the document. A document already at the current
/// version is returned unchanged.
///
/// # Errors
///
/// Returns an error when `from_version` is unknown or newer than [`SNAPSHOT_VERSION`], or when
/// the document does not have the shape its version promises.
///
/// # Examples
///
/// ```
/// use ludex_cache::{SNAPSHOT_VERSION, migrate};
/// use serde_json::json;
///
/// let v1 = json!({ "version": 1, "entries": [{ "key": "a", "value": 7, "fetched_at": 1000 }] });
/// let current = migrate(v1, 1)?;
///
/// assert_eq!(current["version"], SNAPSHOT_VERSION);
/// assert_eq!(current["entries"][0]["last_accessed_at"], 1000);
/// assert_eq!(current["entries"][0]["fetch_count"], 1);
/// assert_eq!(current["entries"][0]["provenance"], "cache");
/// # Ok::<(), ludex_cache::SnapshotError>(())
/// ```
pub fn migrate(mut document: Value, from_version: u32) -> Result<Value, SnapshotError> {
    if from_version == 0 || from_version > SNAPSHOT_VERSION {
        return Err(SnapshotError::caused_by(format!(
            "cannot migrate snapshot version {from_version} to {SNAPSHOT_VERSION}"
        )));
    }

    for version in from_version..SNAPSHOT_VERSION {
        document = match version {
            1 => v1_to_v2(document)?,
            _ => return Err(SnapshotError::caused_by(format!("no migration from snapshot version {version}"))),
        };
    }

    Ok(document)
}

fn v1_to_v2(mut document: Value) -> Result<Value, SnapshotError> {
    let root = object(&mut document, "snapshot")?;
    let entries = root
        .get_mut("entries")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| SnapshotError::caused_by("snapshot has no entries array"))?;

    for entry in entries {
        let entry = object(entry, "entry")?;
        let fetched_at = entry
            .get("fetched_at")
            .and_then(Value::as_u64)
            .ok_or_else(|| SnapshotError::caused_by("entry has no fetched_at timestamp"))?;

        entry.entry("last_accessed_at").or_insert(Value::from(fetched_at));
        entry.entry("fetch_count").or_insert(Value::from(1));
        entry.entry("provenance").or_insert(Value::from("cache"));
    }

    root.insert("version".to_owned(), Value::from(2));
    Ok(document)
}

fn object<'a>(value: &'a mut Value, what: &str) -> Result<&'a mut Map<String, Value>, SnapshotError> {
    value
        .as_object_mut()
        .ok_or_else(|| SnapshotError::caused_by(format!("{what} is not an object")))
}

/// Parses a stored snapshot, migrating it to the current version first.
pub(crate) fn decode<K, V>(text: &str) -> Result<Vec<SnapshotEntry<K, V>>, SnapshotError>
where
    K: serde::de::DeserializeOwned,
    V: serde::de::DeserializeOwned,
{
    let mut document: Value = serde_json::from_str(text)?;
    let version = document
        .get("version")
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| SnapshotError::caused_by("snapshot has no version"))?;

    if version != SNAPSHOT_VERSION {
        document = migrate(document, version)?;
    }

    let snapshot: Snapshot<K, V> = serde_json::from_value(document)?;
    Ok(snapshot.entries)
}

pub(crate) fn encode<K: Serialize, V: Serialize>(entries: Vec<SnapshotEntry<K, V>>) -> Result<String, SnapshotError> {
    let snapshot = Snapshot {
        version: SNAPSHOT_VERSION,
        entries,
    };
    Ok(serde_json::to_string(&snapshot)?)
}
