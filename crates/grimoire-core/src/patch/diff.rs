use crate::{
    patch::path::deletion_target,
    types::{Json, JsonObject},
};

///
/// DiffOptions
///
/// - `inner`: restrict the diff to keys the original already carries.
/// - `deletion_keys`: report `-=key` markers whose target exists.
///

#[derive(Clone, Copy, Debug)]
pub struct DiffOptions {
    pub inner: bool,
    pub deletion_keys: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            inner: false,
            deletion_keys: true,
        }
    }
}

/// Compute the nested mapping of keys whose values differ between trees.
///
/// Structural position is preserved: a change at `a.b` appears as
/// `{"a": {"b": ..}}`. Deletion markers survive in place.
#[must_use]
pub fn diff_object(original: &JsonObject, other: &JsonObject, options: DiffOptions) -> JsonObject {
    let mut out = JsonObject::new();

    for (key, value) in other {
        if let Some(target) = deletion_target(key) {
            if options.deletion_keys && original.contains_key(target) {
                out.insert(key.clone(), value.clone());
            }
            continue;
        }

        match original.get(key) {
            None => {
                if !options.inner {
                    out.insert(key.clone(), value.clone());
                }
            }
            Some(current) => match (current, value) {
                (Json::Object(current), Json::Object(incoming)) => {
                    let nested = diff_object(current, incoming, options);
                    if !nested.is_empty() {
                        out.insert(key.clone(), Json::Object(nested));
                    }
                }
                (current, value) => {
                    if current != value {
                        out.insert(key.clone(), value.clone());
                    }
                }
            },
        }
    }

    out
}
