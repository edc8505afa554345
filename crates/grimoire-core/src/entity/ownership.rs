use crate::{
    field::Field,
    types::{Json, JsonObject},
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::json;
use std::{collections::BTreeSet, fmt};

/// Ownership bucket applying to every user without an explicit entry.
pub const DEFAULT_OWNERSHIP_KEY: &str = "default";

///
/// OwnershipLevel
///
/// The ordered permission tiers gating per-entity access. `Inherit`
/// defers to the default bucket.
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(i8)]
pub enum OwnershipLevel {
    Inherit = -1,
    None = 0,
    Limited = 1,
    Observer = 2,
    Owner = 3,
}

impl OwnershipLevel {
    #[must_use]
    pub const fn level(self) -> i8 {
        self as i8
    }

    #[must_use]
    pub const fn from_i64(value: i64) -> Option<Self> {
        match value {
            -1 => Some(Self::Inherit),
            0 => Some(Self::None),
            1 => Some(Self::Limited),
            2 => Some(Self::Observer),
            3 => Some(Self::Owner),
            _ => None,
        }
    }
}

impl fmt::Display for OwnershipLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Inherit => "inherit",
            Self::None => "none",
            Self::Limited => "limited",
            Self::Observer => "observer",
            Self::Owner => "owner",
        };

        write!(f, "{label}")
    }
}

impl Serialize for OwnershipLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i8(self.level())
    }
}

impl<'de> Deserialize<'de> for OwnershipLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = i64::deserialize(deserializer)?;

        Self::from_i64(value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid ownership level: {value}")))
    }
}

///
/// Action
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };

        write!(f, "{label}")
    }
}

///
/// User
///
/// The acting principal for permission checks: an id plus a flat
/// capability set.
///

#[derive(Clone, Debug)]
pub struct User {
    pub id: String,
    pub capabilities: BTreeSet<String>,
}

impl User {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            capabilities: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    #[must_use]
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}

/// Resolve a user's level from an ownership mapping, falling back to the
/// default bucket; `Inherit` entries defer to it as well.
#[must_use]
pub fn resolve_level(ownership: &JsonObject, user: &User) -> OwnershipLevel {
    let entry = ownership
        .get(&user.id)
        .and_then(Json::as_i64)
        .and_then(OwnershipLevel::from_i64);

    match entry {
        Some(OwnershipLevel::Inherit) | None => ownership
            .get(DEFAULT_OWNERSHIP_KEY)
            .and_then(Json::as_i64)
            .and_then(OwnershipLevel::from_i64)
            .filter(|level| *level != OwnershipLevel::Inherit)
            .unwrap_or(OwnershipLevel::None),
        Some(level) => level,
    }
}

/// The canonical ownership field declaration for permission-bearing
/// types: user id (or `"default"`) to level.
#[must_use]
pub fn ownership_field() -> Field {
    Field::object().initial(json!({ DEFAULT_OWNERSHIP_KEY: 0 }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ownership(value: Json) -> JsonObject {
        value.as_object().expect("test fixture must be an object").clone()
    }

    #[test]
    fn levels_are_totally_ordered() {
        assert!(OwnershipLevel::Inherit < OwnershipLevel::None);
        assert!(OwnershipLevel::None < OwnershipLevel::Limited);
        assert!(OwnershipLevel::Limited < OwnershipLevel::Observer);
        assert!(OwnershipLevel::Observer < OwnershipLevel::Owner);
    }

    #[test]
    fn explicit_entry_beats_default() {
        let map = ownership(json!({"default": 2, "alice": 3}));

        assert_eq!(resolve_level(&map, &User::new("alice")), OwnershipLevel::Owner);
        assert_eq!(resolve_level(&map, &User::new("bob")), OwnershipLevel::Observer);
    }

    #[test]
    fn inherit_defers_to_default_bucket() {
        let map = ownership(json!({"default": 1, "alice": -1}));

        assert_eq!(resolve_level(&map, &User::new("alice")), OwnershipLevel::Limited);
    }

    #[test]
    fn missing_everything_means_none() {
        let map = ownership(json!({}));

        assert_eq!(resolve_level(&map, &User::new("alice")), OwnershipLevel::None);
    }

    #[test]
    fn serde_round_trips_as_integers() {
        let encoded = serde_json::to_string(&OwnershipLevel::Owner).unwrap();
        assert_eq!(encoded, "3");

        let decoded: OwnershipLevel = serde_json::from_str("-1").unwrap();
        assert_eq!(decoded, OwnershipLevel::Inherit);
        assert!(serde_json::from_str::<OwnershipLevel>("9").is_err());
    }
}
