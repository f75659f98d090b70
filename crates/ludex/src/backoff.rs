// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use serde::Deserialize;

use crate::constants::{DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX};

/// How retry delays grow with consecutive failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// The same delay every time.
    ///
    /// **Example with `1s` base delay:** `1s, 1s, 1s, 1s, ...`
    Constant,

    /// Delays grow proportionally with the attempt count.
    ///
    /// **Example with `1s` base delay:** `1s, 2s, 3s, 4s, ...`
    Linear,

    /// Delays double with each attempt.
    ///
    /// **Example with `1s` base delay:** `1s, 2s, 4s, 8s, ...`
    #[default]
    Exponential,
}

/// A retry delay schedule, capped at a maximum delay.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use ludex::Backoff;
///
/// let backoff = Backoff::exponential(Duration::from_secs(1), Duration::from_secs(5));
///
/// let delays: Vec<_> = (0..5).map(|attempt| backoff.delay(attempt).as_secs()).collect();
/// assert_eq!(delays, [1, 2, 4, 5, 5]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Backoff {
    /// Growth of the schedule.
    pub kind: BackoffKind,
    /// Delay before the first retry.
    #[serde(with = "ludex_cache::serde_millis")]
    pub base: Duration,
    /// Upper bound of any delay.
    #[serde(with = "ludex_cache::serde_millis")]
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::exponential(DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX)
    }
}

impl Backoff {
    /// Creates an exponential schedule.
    #[must_use]
    pub const fn exponential(base: Duration, max: Duration) -> Self {
        Self {
            kind: BackoffKind::Exponential,
            base,
            max,
        }
    }

    /// Creates a constant schedule.
    #[must_use]
    pub const fn constant(delay: Duration) -> Self {
        Self {
            kind: BackoffKind::Constant,
            base: delay,
            max: delay,
        }
    }

    /// Returns the delay before retry number `attempt`, counting from zero.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let delay = match self.kind {
            BackoffKind::Constant => self.base,
            BackoffKind::Linear => self.base.saturating_mul(attempt.saturating_add(1)),
            BackoffKind::Exponential => 2_u32
                .checked_pow(attempt)
                .map_or(Duration::MAX, |factor| self.base.saturating_mul(factor)),
        };
        delay.min(self.max)
    }
}
