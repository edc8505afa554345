use crate::{
    field::{CleanOptions, FieldKind, ValidateOptions},
    model::{Model, ModelError},
    patch::{self, DiffOptions, MergeOptions, deletion_target},
    schema::ValidationFailure,
    types::{Json, JsonObject},
};

///
/// UpdateOptions
///
/// Merge policies for a partial update. Deletion markers are honored only
/// when `perform_deletions` is set.
///

#[derive(Clone, Copy, Debug)]
pub struct UpdateOptions {
    pub insert_keys: bool,
    pub insert_values: bool,
    pub overwrite: bool,
    pub recursive: bool,
    pub perform_deletions: bool,
}

impl Default for UpdateOptions {
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

impl Model {
    /// Apply a partial change set against the source record.
    ///
    /// Dotted keys are expanded, changes are validated as a partial record
    /// (always strict, joint pass deferred until the record is whole
    /// again) and then normalized, then applied field-by-field with a
    /// before-image of
    /// every touched field. Any failure restores the before-image: the
    /// update is all-or-nothing. On success the model re-initializes and
    /// the accumulated diff of real changes is returned.
    pub fn apply_update(
        &mut self,
        changes: JsonObject,
        options: UpdateOptions,
    ) -> Result<JsonObject, ModelError> {
        let changes = patch::expand(changes)?;

        // updates are always strict, and judge the raw changes: cleaning
        // must not clamp an out-of-range value into acceptance
        let errors = self
            .ty()
            .schema()
            .validate_errors(&changes, ValidateOptions { partial: true });
        if !errors.is_empty() {
            return Err(ModelError::UpdateRejected {
                type_name: self.ty().name,
                id: self.id_string(),
                failure: ValidationFailure::new(errors),
            });
        }

        let cleaned = self
            .ty()
            .schema()
            .clean(changes, CleanOptions { partial: true });

        for (name, value) in &cleaned {
            if deletion_target(name).is_some() {
                continue;
            }
            let Some(field) = self.ty().schema().get(name) else {
                continue;
            };

            if field.is_readonly() && self.source().get(name) != Some(value) {
                return Err(ModelError::Readonly { name: name.clone() });
            }
        }

        let mut diff = JsonObject::new();
        let mut backup: Vec<(String, Option<Json>)> = Vec::new();

        let applied = self
            .apply_changes(cleaned, options, &mut diff, &mut backup)
            .and_then(|()| self.revalidate_joint());

        if let Err(err) = applied {
            self.restore(backup);

            return Err(err);
        }

        self.reset()?;

        Ok(diff)
    }

    fn apply_changes(
        &mut self,
        changes: JsonObject,
        options: UpdateOptions,
        diff: &mut JsonObject,
        backup: &mut Vec<(String, Option<Json>)>,
    ) -> Result<(), ModelError> {
        for (name, value) in changes {
            if let Some(target) = deletion_target(&name) {
                // top-level keys are schema-fixed; markers act inside
                // object fields only
                tracing::debug!(origin = %self.origin(), target, "ignoring top-level deletion marker");
                continue;
            }

            let Some(field) = self.ty().schema().get(&name) else {
                continue;
            };
            let current = self.source().get(&name).cloned();

            match field.kind() {
                FieldKind::EmbeddedCollection(_) => {
                    let Json::Array(items) = value else {
                        continue;
                    };

                    backup.push((name.clone(), current));

                    let Some(collection) = self.collection_mut(&name) else {
                        continue;
                    };
                    let child_diffs = collection.update(items, options)?;
                    let backing = Json::Array(collection.backing().to_vec());

                    self.source_mut().insert(&name, backing);
                    if !child_diffs.is_empty() {
                        diff.insert(name, Json::Array(child_diffs));
                    }
                }

                FieldKind::Schema(_) | FieldKind::EmbeddedModel(_) | FieldKind::Object => {
                    let Json::Object(incoming) = value else {
                        continue;
                    };
                    let mut target = match &current {
                        Some(Json::Object(map)) => map.clone(),
                        _ => JsonObject::new(),
                    };
                    let before = target.clone();

                    // plain objects merge under caller policy; schema-backed
                    // interiors always admit their declared keys
                    let merge_options = if matches!(field.kind(), FieldKind::Object) {
                        MergeOptions {
                            insert_keys: options.insert_keys,
                            insert_values: options.insert_values,
                            overwrite: options.overwrite,
                            recursive: options.recursive,
                            perform_deletions: options.perform_deletions,
                        }
                    } else {
                        MergeOptions::default()
                    };

                    patch::merge_object(&mut target, incoming.clone(), merge_options)?;
                    if target == before {
                        continue;
                    }

                    let nested = patch::diff_object(&before, &incoming, DiffOptions::default());

                    backup.push((name.clone(), current));
                    self.source_mut().insert(&name, Json::Object(target));
                    if !nested.is_empty() {
                        diff.insert(name, Json::Object(nested));
                    }
                }

                _ => {
                    if current.as_ref() == Some(&value) {
                        continue;
                    }

                    backup.push((name.clone(), current));
                    self.source_mut().insert(&name, value.clone());
                    diff.insert(name, value);
                }
            }
        }

        Ok(())
    }

    // secondary defense: the change set validated field-by-field, but the
    // whole record must still satisfy cross-field invariants
    fn revalidate_joint(&mut self) -> Result<(), ModelError> {
        let Some(joint) = self.ty().validate_joint else {
            return Ok(());
        };

        if let Err(message) = joint(self.source().as_object()) {
            return Err(ModelError::Joint {
                type_name: self.ty().name,
                id: self.id_string(),
                message,
            });
        }

        Ok(())
    }

    fn restore(&mut self, backup: Vec<(String, Option<Json>)>) {
        for (name, value) in backup.into_iter().rev() {
            match value {
                Some(value) => {
                    self.source_mut().insert(&name, value);
                }
                None => {
                    self.source_mut().remove(&name);
                }
            }
        }

        if let Err(err) = self.reset() {
            tracing::error!(
                origin = %self.origin(),
                %err,
                "failed to re-initialize after update rollback"
            );
        }
    }
}
