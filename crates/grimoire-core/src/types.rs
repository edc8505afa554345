use derive_more::{Deref, Display};
use rand::{Rng, distributions::Alphanumeric, thread_rng};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;
use thiserror::Error as ThisError;

/// Raw document tree node.
pub type Json = serde_json::Value;

/// Raw document record: an ordered mapping of keys to tree nodes.
pub type JsonObject = serde_json::Map<String, Json>;

/// Canonical length of an entity identifier.
pub const ID_LENGTH: usize = 16;

/// Reserved key under which entity identifiers are stored.
pub const ID_KEY: &str = "_id";

///
/// IdError
///

#[derive(Debug, ThisError)]
pub enum IdError {
    #[error("invalid id length: {len} chars (expected {ID_LENGTH})")]
    InvalidLength { len: usize },

    #[error("invalid id character at position {position}")]
    InvalidCharacter { position: usize },
}

///
/// Id
///
/// A 16-character alphanumeric entity identifier.
///
/// Ids are opaque and case-sensitive. Construction goes through
/// [`Id::generate`] or [`Id::try_parse`]; both guarantee shape.
///

#[derive(Clone, Debug, Deref, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Id(String);

impl Id {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        let inner: String = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(ID_LENGTH)
            .map(char::from)
            .collect();

        Self(inner)
    }

    /// Parse and shape-check an identifier.
    pub fn try_parse(encoded: &str) -> Result<Self, IdError> {
        if encoded.len() != ID_LENGTH {
            return Err(IdError::InvalidLength {
                len: encoded.len(),
            });
        }

        if let Some(position) = encoded.bytes().position(|b| !b.is_ascii_alphanumeric()) {
            return Err(IdError::InvalidCharacter { position });
        }

        Ok(Self(encoded.to_string()))
    }

    /// Returns true if `encoded` has valid identifier shape.
    #[must_use]
    pub fn is_valid(encoded: &str) -> bool {
        Self::try_parse(encoded).is_ok()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Id {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_parse(s)
    }
}

impl From<Id> for String {
    fn from(id: Id) -> Self {
        id.0
    }
}

impl From<&Id> for Json {
    fn from(id: &Id) -> Self {
        Self::String(id.0.clone())
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;

        Self::try_parse(&encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_produces_valid_ids() {
        for _ in 0..64 {
            let id = Id::generate();
            assert!(Id::is_valid(id.as_str()), "generated id must round-trip");
        }
    }

    #[test]
    fn try_parse_rejects_bad_shapes() {
        assert!(matches!(
            Id::try_parse("short"),
            Err(IdError::InvalidLength { len: 5 })
        ));
        assert!(matches!(
            Id::try_parse("AAAAAAAA-AAAAAAA"),
            Err(IdError::InvalidCharacter { position: 8 })
        ));
        assert!(Id::try_parse("AAAAAAAAAAAAAAAA").is_ok());
    }

    #[test]
    fn serde_round_trip_preserves_value() {
        let id = Id::try_parse("Abc123Def456Ghi7").unwrap();
        let encoded = serde_json::to_string(&id).unwrap();
        let decoded: Id = serde_json::from_str(&encoded).unwrap();

        assert_eq!(id, decoded);
    }
}
