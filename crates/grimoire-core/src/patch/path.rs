use crate::types::{Json, JsonObject};
use thiserror::Error as ThisError;

/// Prefix marking a key for deletion during merges and updates.
pub const DELETION_PREFIX: &str = "-=";

/// Maximum nesting depth tolerated by [`expand`] and [`flatten`].
///
/// Deeper trees are a sign of malformed or adversarial input; both
/// operations error out instead of recursing further.
pub const MAX_PATH_DEPTH: usize = 100;

///
/// PatchError
///

#[derive(Debug, ThisError)]
pub enum PatchError {
    #[error("object nesting exceeds {limit} levels")]
    DepthExceeded { limit: usize },
}

/// Return the key targeted for deletion, if `key` carries the `-=` marker.
#[must_use]
pub fn deletion_target(key: &str) -> Option<&str> {
    key.strip_prefix(DELETION_PREFIX)
}

/// Read the value at a dotted path, if every intermediate step is an object.
#[must_use]
pub fn get_path<'a>(object: &'a JsonObject, path: &str) -> Option<&'a Json> {
    let mut segments = path.split('.');
    let mut current = object.get(segments.next()?)?;

    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }

    Some(current)
}

/// Returns true if a dotted path resolves to a value.
#[must_use]
pub fn has_path(object: &JsonObject, path: &str) -> bool {
    get_path(object, path).is_some()
}

/// Write a value at a dotted path, creating intermediate objects.
///
/// A non-object intermediate is replaced by an object. Returns true when
/// the tree changed.
pub fn set_path(object: &mut JsonObject, path: &str, value: Json) -> bool {
    let mut segments = path.split('.').peekable();
    let mut current = object;

    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            let changed = current.get(segment) != Some(&value);
            if changed {
                current.insert(segment.to_string(), value);
            }

            return changed;
        }

        let slot = current
            .entry(segment.to_string())
            .or_insert_with(|| Json::Object(JsonObject::new()));
        if !slot.is_object() {
            *slot = Json::Object(JsonObject::new());
        }

        match slot {
            Json::Object(map) => current = map,
            _ => return false,
        }
    }

    false
}

/// Remove the value at a dotted path, returning it if present.
pub fn delete_path(object: &mut JsonObject, path: &str) -> Option<Json> {
    match path.split_once('.') {
        None => object.remove(path),
        Some((head, rest)) => match object.get_mut(head)? {
            Json::Object(map) => delete_path(map, rest),
            _ => None,
        },
    }
}

/// Expand dotted keys into a nested tree.
///
/// `{"a.b.c": 1}` becomes `{"a": {"b": {"c": 1}}}`. Deletion markers are
/// ordinary keys here and survive expansion in structural position.
pub fn expand(object: JsonObject) -> Result<JsonObject, PatchError> {
    expand_at(object, 0)
}

fn expand_at(object: JsonObject, depth: usize) -> Result<JsonObject, PatchError> {
    if depth > MAX_PATH_DEPTH {
        return Err(PatchError::DepthExceeded {
            limit: MAX_PATH_DEPTH,
        });
    }

    let mut out = JsonObject::new();

    for (key, value) in object {
        let value = match value {
            Json::Object(map) => Json::Object(expand_at(map, depth + 1)?),
            other => other,
        };

        if key.contains('.') && deletion_target(&key).is_none() {
            insert_expanded(&mut out, &key, value);
        } else {
            merge_expanded(&mut out, key, value);
        }
    }

    Ok(out)
}

// Split a dotted key and graft the value, merging object collisions.
fn insert_expanded(target: &mut JsonObject, path: &str, value: Json) {
    match path.split_once('.') {
        None => merge_expanded(target, path.to_string(), value),
        Some((head, rest)) => {
            let slot = target
                .entry(head.to_string())
                .or_insert_with(|| Json::Object(JsonObject::new()));
            if !slot.is_object() {
                *slot = Json::Object(JsonObject::new());
            }
            if let Json::Object(map) = slot {
                insert_expanded(map, rest, value);
            }
        }
    }
}

// Insert, deep-combining when both sides are objects.
fn merge_expanded(target: &mut JsonObject, key: String, value: Json) {
    match (target.get_mut(&key), value) {
        (Some(Json::Object(current)), Json::Object(incoming)) => {
            for (k, v) in incoming {
                merge_expanded(current, k, v);
            }
        }
        (_, value) => {
            target.insert(key, value);
        }
    }
}

/// Flatten a nested tree into dotted keys.
///
/// Inverse of [`expand`] for trees without dotted literal keys. Arrays and
/// empty objects are leaves.
pub fn flatten(object: &JsonObject) -> Result<JsonObject, PatchError> {
    let mut out = JsonObject::new();
    flatten_into(&mut out, "", object, 0)?;

    Ok(out)
}

fn flatten_into(
    out: &mut JsonObject,
    prefix: &str,
    object: &JsonObject,
    depth: usize,
) -> Result<(), PatchError> {
    if depth > MAX_PATH_DEPTH {
        return Err(PatchError::DepthExceeded {
            limit: MAX_PATH_DEPTH,
        });
    }

    for (key, value) in object {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        match value {
            Json::Object(map) if !map.is_empty() => flatten_into(out, &path, map, depth + 1)?,
            other => {
                out.insert(path, other.clone());
            }
        }
    }

    Ok(())
}
