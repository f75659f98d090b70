// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::error::Error as _;
use std::fmt::{self, Display, Formatter};

use ludex_upstream::{ErrorKind, UpstreamError};
use recoverable::{Recovery, RecoveryInfo, RecoveryKind};

/// A classified, human-readable description of a failed request.
///
/// Failures are recorded in session and feed state rather than returned as errors, so
/// callers read them instead of handling them. The [`Recovery`] classification of the
/// underlying error is kept and drives both user notices and polling backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Classification of the failure.
    pub kind: ErrorKind,
    /// Message suitable for display.
    pub message: String,
    /// What the provider or transport reported, such as `HTTP 429`.
    pub detail: Option<String>,
    recovery: RecoveryInfo,
}

impl Failure {
    /// Creates a failure of the given kind without further detail.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
            recovery: kind.recovery(),
        }
    }

    /// Returns `true` when retrying may help, so a "try again" notice is warranted.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self.recovery.kind() {
            RecoveryKind::Retry | RecoveryKind::Unavailable => true,
            RecoveryKind::Never | RecoveryKind::Unknown | _ => false,
        }
    }
}

impl Recovery for Failure {
    fn recovery(&self) -> RecoveryInfo {
        self.recovery.clone()
    }
}

impl From<&UpstreamError> for Failure {
    fn from(error: &UpstreamError) -> Self {
        Self {
            kind: error.kind(),
            message: error.kind().to_string(),
            detail: error.source().map(ToString::to_string),
            recovery: error.recovery(),
        }
    }
}

impl Display for Failure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{} ({detail})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_the_reported_cause() {
        let failure = Failure::from(&UpstreamError::service_unavailable("HTTP 429"));

        assert_eq!(failure.kind, ErrorKind::ServiceUnavailable);
        assert_eq!(failure.detail.as_deref(), Some("HTTP 429"));
        assert_eq!(
            failure.to_string(),
            "the catalog service is temporarily unavailable (HTTP 429)"
        );
    }

    #[test]
    fn recovery_follows_the_error() {
        let unavailable = Failure::from(&UpstreamError::service_unavailable("busy"));
        assert_eq!(unavailable.recovery().kind(), RecoveryKind::Unavailable);
        assert!(unavailable.is_retryable());

        let missing = Failure::from(&UpstreamError::not_found("no game with id 7"));
        assert_eq!(missing.recovery().kind(), RecoveryKind::Never);
        assert!(!missing.is_retryable());

        let manual = Failure::new(ErrorKind::Network, "offline");
        assert_eq!(manual.detail, None);
        assert_eq!(manual.recovery(), RecoveryInfo::retry());
        assert_eq!(manual.to_string(), "offline");
    }
}
