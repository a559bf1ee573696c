//! Data types for the raccoon KV client

use std::fmt;

use bytes::Bytes;

/// Opaque revision token assigned by the store (the `etag` header).
///
/// Versions are only ever compared for equality. The empty version means
/// "no version known yet".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Version(String);

impl Version {
    /// Wrap a raw token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The unset version
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Raw token as sent on the wire
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true when no version is known
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Version {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Result of a single conditional read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The key exists; the full value was read
    Found {
        /// Value bytes
        value: Bytes,
        /// Version of this value
        version: Version,
    },
    /// The key is absent. The version is the one the store reported for the absence.
    NotFound {
        /// Version of the absence
        version: Version,
    },
    /// The store confirmed the caller's known version is still current
    NotModified {
        /// The caller's version, echoed back
        version: Version,
    },
}

impl FetchOutcome {
    /// Version observed by this read
    pub fn version(&self) -> &Version {
        match self {
            FetchOutcome::Found { version, .. }
            | FetchOutcome::NotFound { version }
            | FetchOutcome::NotModified { version } => version,
        }
    }

    /// Returns true if the key exists and a value was read
    pub fn is_found(&self) -> bool {
        matches!(self, FetchOutcome::Found { .. })
    }

    /// Consume the outcome, returning the value (empty unless `Found`)
    pub fn into_value(self) -> Bytes {
        match self {
            FetchOutcome::Found { value, .. } => value,
            _ => Bytes::new(),
        }
    }
}

/// A value read by [`Client::get`](crate::Client::get)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Value bytes, empty when the key is absent
    pub value: Bytes,
    /// Version reported by the store
    pub version: Version,
    /// Whether the key exists
    pub found: bool,
}
