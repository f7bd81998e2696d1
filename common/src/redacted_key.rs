//! Overlay auth key handling with redacted Debug output.

use crate::{ErrorLocation, RedactError};

use std::fmt;
use std::panic::Location;

use serde::ser::Error;
use serde::{Deserialize, Deserializer};
use zeroize::Zeroize;

/// Prefix carried by every pre-authorized overlay key.
const AUTH_KEY_PREFIX: &str = "tskey-";

/// A pre-authorized overlay key that never shows up in logs or debug output.
///
/// Keys can be read from configuration, but serializing one back out fails
/// so a config dump can't leak it.
#[derive(Clone)]
pub struct RedactedAuthKey {
    inner: String,
}

impl RedactedAuthKey {
    pub fn new(key: String) -> Self {
        Self { inner: key }
    }

    /// Get the actual key value for handing to the identity provider.
    ///
    /// # Security Note
    /// Only call this when actually passing the key to the provider.
    #[inline]
    pub fn expose(&self) -> &str {
        &self.inner
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Whether the key has the shape the provider expects.
    pub fn has_expected_prefix(&self) -> bool {
        self.inner.starts_with(AUTH_KEY_PREFIX)
    }
}

impl fmt::Debug for RedactedAuthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RedactedAuthKey([REDACTED])")
    }
}

impl fmt::Display for RedactedAuthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED AUTH KEY]")
    }
}

impl Drop for RedactedAuthKey {
    fn drop(&mut self) {
        self.inner.zeroize();
    }
}

impl<'de> Deserialize<'de> for RedactedAuthKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Self::new)
    }
}

// Prevent accidental serialization
impl serde::Serialize for RedactedAuthKey {
    fn serialize<S>(&self, _serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        Err(S::Error::custom(RedactError::Serialization {
            message: String::from(
                "RedactedAuthKey cannot be serialized - use expose() explicitly",
            ),
            location: ErrorLocation::from(Location::caller()),
        }))
    }
}
