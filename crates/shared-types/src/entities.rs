//! # Core Identities
//!
//! - **Correlation**: [`TransId`], the 128-bit transaction identifier
//! - **Addressing**: [`Source`], the requester identity
//! - **Scheduling**: [`Priority`]

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// =============================================================================
// CORRELATION
// =============================================================================

/// A 128-bit transaction identifier.
///
/// Generated at send time (UUID v7, so ids sort by creation time) and used by
/// the correlator to match asynchronous replies with their requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransId(Uuid);

impl TransId {
    /// The all-zero sentinel. Never assigned to a real transaction.
    pub const NULL: TransId = TransId(Uuid::nil());

    /// Generate a fresh, time-ordered transaction id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Build from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Returns true for the all-zero sentinel.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0.is_nil()
    }

    /// Get as bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Get the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TransId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TransId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<[u8; 16]> for TransId {
    fn from(bytes: [u8; 16]) -> Self {
        Self::from_bytes(bytes)
    }
}

// =============================================================================
// ADDRESSING
// =============================================================================

/// Identity of the party that issued a request.
///
/// Carried unchanged across forwarding hops so the final handler knows who
/// originally asked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Source(String);

impl Source {
    /// Create a requester identity.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Source {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

// =============================================================================
// SCHEDULING
// =============================================================================

/// Request priority. Lower values are more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(pub i8);

impl Priority {
    /// Most urgent priority.
    pub const HIGHEST: Priority = Priority(i8::MIN);

    /// Default priority for requests that do not specify one.
    pub const NORMAL: Priority = Priority(0);

    /// Least urgent priority.
    pub const LOWEST: Priority = Priority(i8::MAX);
}

impl Default for Priority {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl From<i8> for Priority {
    fn from(value: i8) -> Self {
        Self(value)
    }
}
