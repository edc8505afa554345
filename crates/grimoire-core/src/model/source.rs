use crate::types::{Json, JsonObject};
use thiserror::Error as ThisError;

///
/// SourceError
///

#[derive(Debug, ThisError)]
pub enum SourceError {
    #[error("unknown source key: {key}")]
    UnknownKey { key: String },
}

///
/// SourceRecord
///
/// The frozen canonical record of a model: its key set is locked when the
/// cleaned data is sealed here, and values mutate only through explicit
/// setters under the update discipline. The update machinery alone may
/// extend or shrink the key set, and only for schema-declared fields.
///

#[derive(Clone, Debug, PartialEq)]
pub struct SourceRecord {
    data: JsonObject,
}

impl SourceRecord {
    pub(crate) const fn new(data: JsonObject) -> Self {
        Self { data }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Json> {
        self.data.get(key)
    }

    /// Replace the value under an existing key, returning the old value.
    /// Unknown keys are rejected: the key set is fixed.
    pub fn set(&mut self, key: &str, value: Json) -> Result<Json, SourceError> {
        match self.data.get_mut(key) {
            Some(slot) => Ok(std::mem::replace(slot, value)),
            None => Err(SourceError::UnknownKey {
                key: key.to_string(),
            }),
        }
    }

    // update machinery only: admit a schema-declared key that was absent
    pub(crate) fn insert(&mut self, key: &str, value: Json) -> Option<Json> {
        self.data.insert(key.to_string(), value)
    }

    // update machinery only: used to restore an absent before-image
    pub(crate) fn remove(&mut self, key: &str) -> Option<Json> {
        self.data.remove(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    #[must_use]
    pub const fn as_object(&self) -> &JsonObject {
        &self.data
    }

    pub(crate) const fn as_object_mut(&mut self) -> &mut JsonObject {
        &mut self.data
    }

    /// Deep copy of the canonical record.
    #[must_use]
    pub fn to_object(&self) -> JsonObject {
        self.data.clone()
    }
}
