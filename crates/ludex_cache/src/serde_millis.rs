// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Serde helpers that encode a [`Duration`] as whole milliseconds.
//!
//! Use with `#[serde(with = "ludex_cache::serde_millis")]`.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

/// Serializes a duration as an integer number of milliseconds.
///
/// # Errors
///
/// Returns the serializer's error.
pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

/// Deserializes a duration from an integer number of milliseconds.
///
/// # Errors
///
/// Returns the deserializer's error when the input is not an unsigned integer.
pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}
