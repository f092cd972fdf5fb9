//! Typed ID definitions.
//!
//! Platform IDs are ULID-based for sortability and uniqueness. Load balancer
//! IDs come from the cloud provider and are kept verbatim.

use std::fmt;
use std::str::FromStr;

use crate::{define_id, IdError};

// =============================================================================
// Orchestration
// =============================================================================

define_id!(JobId, "job");
define_id!(TaskId, "task");

// =============================================================================
// Cloud
// =============================================================================

/// Identifier of a cloud load balancer (or target group).
///
/// Cloud identifiers are opaque: ARNs, names, or provider-specific handles.
/// The only guarantees are that the value is non-empty, at most
/// [`LoadBalancerId::MAX_LEN`] bytes, and free of whitespace and control
/// characters, so it can be logged and used as a path segment safely.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoadBalancerId(String);

impl LoadBalancerId {
    /// Maximum accepted length in bytes.
    pub const MAX_LEN: usize = 512;

    /// Validates and wraps a cloud load balancer identifier.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }

        if s.len() > Self::MAX_LEN {
            return Err(IdError::TooLong {
                len: s.len(),
                max: Self::MAX_LEN,
            });
        }

        if let Some(c) = s.chars().find(|c| c.is_whitespace() || c.is_control()) {
            return Err(IdError::InvalidCharacter(c));
        }

        Ok(Self(s.to_string()))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LoadBalancerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for LoadBalancerId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for LoadBalancerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for LoadBalancerId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for LoadBalancerId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================
