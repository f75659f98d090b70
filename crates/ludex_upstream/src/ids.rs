// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id! {
    /// Stable identifier of a catalog entity.
    ///
    /// Identifiers are opaque; providers that use numeric identifiers are normalized to their
    /// decimal string form by [`normalize`](crate::normalize).
    ///
    /// # Examples
    ///
    /// ```
    /// use ludex_upstream::GameId;
    ///
    /// let id = GameId::new("3498");
    /// assert_eq!(id.as_str(), "3498");
    /// assert_eq!(id.to_string(), "3498");
    /// ```
    GameId
}

string_id! {
    /// Identifier of an upstream content provider, e.g. `"catalog"` or `"graph"`.
    SourceId
}
