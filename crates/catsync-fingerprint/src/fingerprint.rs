//! Content fingerprint primitive
//!
//! Provides [`Fingerprint`], a strongly-typed 16-byte digest stored on remote
//! entities as their `sourceHash`.

use crate::canonical::{canonical_json, strip_fields};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Digest length in bytes
pub const FINGERPRINT_LEN: usize = 16;

/// A 16-byte content fingerprint (truncated Blake3)
///
/// Computed over the canonical JSON form of an entity's semantic fields.
/// Rendered as 32 lowercase hex chars. Cheap to copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    /// Create a fingerprint from raw bytes
    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; FINGERPRINT_LEN]) -> Self {
        Self(bytes)
    }

    /// Get reference to the underlying bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }

    /// Create fingerprint from byte slice
    ///
    /// # Errors
    /// Returns error if slice length is not exactly [`FINGERPRINT_LEN`] bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, FingerprintError> {
        let arr: [u8; FINGERPRINT_LEN] =
            bytes.try_into().map_err(|_| FingerprintError::InvalidLength {
                expected: FINGERPRINT_LEN,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    /// Fingerprint arbitrary bytes
    #[inline]
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        let hash = blake3::hash(data);
        let mut arr = [0u8; FINGERPRINT_LEN];
        arr.copy_from_slice(&hash.as_bytes()[..FINGERPRINT_LEN]);
        Self(arr)
    }

    /// Fingerprint a serializable value, ignoring `excluded` top-level fields
    ///
    /// The value is converted to JSON, the excluded fields are dropped and
    /// the remainder is hashed in canonical (key-sorted) form, so two values
    /// that differ only in field order or in excluded fields match.
    ///
    /// # Errors
    /// Returns error if serialization fails
    pub fn of_serializable<T>(value: &T, excluded: &[&str]) -> Result<Self, FingerprintError>
    where
        T: serde::Serialize,
    {
        let mut json = serde_json::to_value(value)?;
        strip_fields(&mut json, excluded);
        Ok(Self::compute(canonical_json(&json).as_bytes()))
    }

    /// Compare against a stored fingerprint string
    ///
    /// Stored values come from the remote store and may have been written by
    /// another producer, so the comparison is on the textual form and never
    /// fails.
    #[must_use]
    pub fn matches(&self, stored: &str) -> bool {
        stored.eq_ignore_ascii_case(&self.to_string())
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for Fingerprint {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }
}

impl serde::Serialize for Fingerprint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Fingerprint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors that can occur when working with fingerprints
#[derive(Debug, thiserror::Error)]
pub enum FingerprintError {
    /// Invalid digest length
    #[error("invalid fingerprint length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Digest length in bytes
        expected: usize,
        /// Bytes actually decoded
        actual: usize,
    },

    /// Hex encoding error
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
