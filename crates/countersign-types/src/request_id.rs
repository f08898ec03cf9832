//! validated certificate request id type.
//!
//! request ids must be exactly 16 characters from the base32 alphabet
//! `[A-Z2-7=]`. new ids are generated from 10 bytes of cryptographic
//! randomness, which encodes to 16 base32 characters with no padding.

use std::str::FromStr;

use data_encoding::BASE32;
use serde::{Deserialize, Serialize};

/// length of a request id in characters.
pub const REQUEST_ID_LEN: usize = 16;

/// number of random bytes behind a generated request id.
const REQUEST_ID_RANDOM_BYTES: usize = 10;

/// a validated certificate request id.
///
/// request ids are guaranteed to be exactly 16 characters of `[A-Z2-7=]`.
///
/// # Example
/// ```
/// use countersign_types::RequestId;
///
/// let id: RequestId = "MFRGGZDFMZTWQ2LK".parse().unwrap();
/// assert_eq!(id.as_str(), "MFRGGZDFMZTWQ2LK");
/// ```
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display, derive_more::AsRef,
)]
#[as_ref(str)]
pub struct RequestId(String);

impl RequestId {
    /// create a new request id, validating the format.
    pub fn new(s: impl Into<String>) -> Result<Self, RequestIdError> {
        let s = s.into();
        Self::validate(&s)?;
        Ok(Self(s))
    }

    /// generate a new random request id.
    pub fn generate() -> Self {
        use rand::Rng;
        let mut rng = rand::rng();
        let bytes: [u8; REQUEST_ID_RANDOM_BYTES] = rng.random();
        Self(BASE32.encode(&bytes))
    }

    /// get the id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// consume the id and return the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }

    fn validate(s: &str) -> Result<(), RequestIdError> {
        if s.len() != REQUEST_ID_LEN {
            return Err(RequestIdError::InvalidLength {
                expected: REQUEST_ID_LEN,
                got: s.len(),
            });
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c) || c == '=')
        {
            return Err(RequestIdError::InvalidCharacters);
        }
        Ok(())
    }
}

impl FromStr for RequestId {
    type Err = RequestIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// serde: deserialize with validation
impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        RequestId::new(s).map_err(serde::de::Error::custom)
    }
}

impl Serialize for RequestId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

/// error type for request id validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestIdError {
    /// request id has the wrong length.
    #[error("request id must be {expected} characters, got {got}")]
    InvalidLength {
        /// expected length
        expected: usize,
        /// actual length
        got: usize,
    },

    /// request id contains characters outside the base32 alphabet.
    #[error("request id must contain only characters from [A-Z2-7=]")]
    InvalidCharacters,
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn generated_ids_match_shape(_n in 0..64usize) {
            let id = RequestId::generate();
            prop_assert_eq!(id.as_str().len(), REQUEST_ID_LEN);
            let all_valid_chars = id.as_str().chars().all(|c| {
                c.is_ascii_uppercase() || ('2'..='7').contains(&c) || c == '='
            });
            prop_assert!(all_valid_chars);
        }

        #[test]
        fn arbitrary_string_never_panics(s in ".*") {
            let _ = RequestId::new(&s);
        }

        #[test]
        fn valid_shape_roundtrips(s in "[A-Z2-7=]{16}") {
            let id = RequestId::new(&s).unwrap();
            let json = serde_json::to_string(&id).unwrap();
            let parsed: RequestId = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(parsed, id);
        }
    }
}
