use crate::{
    patch::path::{PatchError, deletion_target, expand},
    types::{Json, JsonObject},
};

///
/// MergeOptions
///
/// Policies governing how `other` folds into `original`.
///
/// - `insert_keys`: admit top-level keys absent from the original.
/// - `insert_values`: admit nested keys absent from the original.
/// - `overwrite`: replace existing values (merges always recurse into
///   object pairs when `recursive`).
/// - `recursive`: descend into object/object pairs instead of replacing.
/// - `perform_deletions`: honor `-=key` markers by removing the target;
///   otherwise markers are retained as literal keys for downstream diffs.
///

#[derive(Clone, Copy, Debug)]
pub struct MergeOptions {
    pub insert_keys: bool,
    pub insert_values: bool,
    pub overwrite: bool,
    pub recursive: bool,
    pub perform_deletions: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            insert_keys: true,
            insert_values: true,
            overwrite: true,
            recursive: true,
            perform_deletions: false,
        }
    }
}

/// Deep-merge `other` into `original` under the given policies.
///
/// Both sides are expanded first, so dotted keys address nested slots.
pub fn merge_object(
    original: &mut JsonObject,
    other: JsonObject,
    options: MergeOptions,
) -> Result<(), PatchError> {
    let expanded = expand(std::mem::take(original))?;
    *original = expanded;

    let other = expand(other)?;
    merge_into(original, other, options, 0);

    Ok(())
}

fn merge_into(original: &mut JsonObject, other: JsonObject, options: MergeOptions, depth: usize) {
    for (key, value) in other {
        if let Some(target) = deletion_target(&key) {
            if options.perform_deletions {
                original.remove(target);
                // clear a marker retained by an earlier non-deleting merge
                original.remove(&key);
            } else {
                original.insert(key, value);
            }
            continue;
        }

        if let Some(current) = original.get_mut(&key) {
            match (current, value) {
                (Json::Object(current), Json::Object(incoming)) if options.recursive => {
                    merge_into(current, incoming, options, depth + 1);
                }
                (current, value) => {
                    if options.overwrite && *current != value {
                        *current = value;
                    }
                }
            }
        } else {
            let admitted = if depth == 0 {
                options.insert_keys
            } else {
                options.insert_values
            };

            if admitted {
                original.insert(key, value);
            }
        }
    }
}
