//! public key fingerprint type.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use sha2::{Digest, Sha256};

/// length of a key fingerprint in bytes (sha-256 digest).
pub const FINGERPRINT_LEN: usize = 32;

/// identifies a public key by the sha-256 digest of its wire-format blob.
///
/// fingerprints name both requesters and signers in the policy tables, and
/// the ca key an environment signs with. they are compared for equality
/// only. serializes as hex in JSON.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyFingerprint([u8; FINGERPRINT_LEN]);

impl KeyFingerprint {
    /// fingerprint a public key's wire-format blob.
    pub fn of_blob(blob: &[u8]) -> Self {
        let digest = Sha256::digest(blob);
        Self(digest.into())
    }

    /// returns the fingerprint as a byte slice.
    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }
}

impl From<[u8; FINGERPRINT_LEN]> for KeyFingerprint {
    fn from(bytes: [u8; FINGERPRINT_LEN]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for KeyFingerprint {
    type Error = FingerprintError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; FINGERPRINT_LEN] =
            slice.try_into().map_err(|_| FingerprintError::InvalidLength {
                expected: FINGERPRINT_LEN,
                actual: slice.len(),
            })?;
        Ok(Self(bytes))
    }
}

impl FromStr for KeyFingerprint {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        Self::try_from(bytes.as_slice())
    }
}

impl fmt::Display for KeyFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for KeyFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyFingerprint({})", hex::encode(self.0))
    }
}

impl Serialize for KeyFingerprint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for KeyFingerprint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// error type for invalid fingerprints.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FingerprintError {
    /// fingerprint has the wrong number of bytes.
    #[error("invalid fingerprint length: expected {expected}, got {actual}")]
    InvalidLength {
        /// expected length in bytes
        expected: usize,
        /// actual length in bytes
        actual: usize,
    },

    /// fingerprint is not valid hex.
    #[error("invalid hex in fingerprint: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}
