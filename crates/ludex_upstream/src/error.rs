// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for upstream operations.

use std::fmt::{self, Display, Formatter};

use recoverable::{Recovery, RecoveryInfo, RecoveryKind};
use serde::{Deserialize, Serialize};

/// Classification of an upstream failure.
///
/// The classification drives both retry decisions and what the presentation layer is told:
/// only [`Network`](Self::Network) and [`ServiceUnavailable`](Self::ServiceUnavailable)
/// failures warrant a user-facing "try again" notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The provider could not be reached or did not answer in time.
    Network,
    /// The provider answered but is erroring, overloaded or rate limiting.
    ServiceUnavailable,
    /// The requested entity does not exist.
    NotFound,
    /// The request was rejected as malformed, e.g. a query that is too short.
    Validation,
}

impl ErrorKind {
    /// Returns how callers should react to failures of this kind.
    #[must_use]
    pub fn recovery(self) -> RecoveryInfo {
        match self {
            Self::Network => RecoveryInfo::retry(),
            Self::ServiceUnavailable => RecoveryInfo::unavailable(),
            Self::NotFound | Self::Validation => RecoveryInfo::never(),
        }
    }

    /// Returns `true` for transport and service failures that a retry may fix.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self.recovery().kind(), RecoveryKind::Retry | RecoveryKind::Unavailable)
    }

    /// Returns a stable name for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::ServiceUnavailable => "service_unavailable",
            Self::NotFound => "not_found",
            Self::Validation => "validation",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Network => "the catalog service could not be reached",
            Self::ServiceUnavailable => "the catalog service is temporarily unavailable",
            Self::NotFound => "the requested game was not found",
            Self::Validation => "the request was invalid",
        })
    }
}

/// An error returned by an [`Upstream`](crate::Upstream) operation.
///
/// # Examples
///
/// ```
/// use ludex_upstream::{ErrorKind, UpstreamError};
///
/// let error = UpstreamError::service_unavailable("HTTP 429");
/// assert_eq!(error.kind(), ErrorKind::ServiceUnavailable);
/// assert!(error.kind().is_retryable());
/// ```
#[ohno::error]
#[display("{kind}")]
pub struct UpstreamError {
    kind: ErrorKind,
}

impl UpstreamError {
    /// Creates an error of the given kind caused by `cause`.
    pub fn with_kind(kind: ErrorKind, cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(kind, cause)
    }

    /// The provider could not be reached or timed out.
    pub fn network(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::Network, cause)
    }

    /// The provider is erroring or rate limiting.
    pub fn service_unavailable(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::ServiceUnavailable, cause)
    }

    /// The entity does not exist.
    pub fn not_found(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::NotFound, cause)
    }

    /// The request was malformed.
    pub fn validation(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::Validation, cause)
    }

    /// Returns the classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl Recovery for UpstreamError {
    fn recovery(&self) -> RecoveryInfo {
        self.kind.recovery()
    }
}

/// A specialized [`Result`] type for upstream operations.
pub type Result<T> = std::result::Result<T, UpstreamError>;
