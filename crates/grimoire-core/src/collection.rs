use crate::{
    entity::{Entity, EntityType},
    model::{ModelContext, ModelError, UpdateOptions},
    types::{ID_KEY, Id, Json, JsonObject},
};
use indexmap::IndexMap;
use std::collections::BTreeSet;

///
/// EmbeddedCollection
///
/// An ordered, identifier-keyed container of child entities mirroring a
/// backing array of raw records. The live contents are a deterministic
/// projection of the backing array; structural mutations keep the two in
/// sync unless sync is explicitly suppressed. A child that fails to
/// construct is excluded from the live view but retained in the backing
/// array and tracked in a side set of invalid ids.
///

#[derive(Debug)]
pub struct EmbeddedCollection {
    ty: &'static EntityType,
    context: ModelContext,
    source: Vec<Json>,
    entries: IndexMap<String, Entity>,
    invalid: BTreeSet<String>,
}

impl EmbeddedCollection {
    #[must_use]
    pub fn new(ty: &'static EntityType, context: ModelContext) -> Self {
        Self {
            ty,
            context,
            source: Vec::new(),
            entries: IndexMap::new(),
            invalid: BTreeSet::new(),
        }
    }

    ///
    /// ACCESSORS
    ///

    #[must_use]
    pub const fn entity_type(&self) -> &'static EntityType {
        self.ty
    }

    /// The raw backing array, in collection order.
    #[must_use]
    pub fn backing(&self) -> &[Json] {
        &self.source
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Entity> {
        self.entries.get_mut(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entries.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Ids of backing records whose children failed to construct.
    #[must_use]
    pub const fn invalid_ids(&self) -> &BTreeSet<String> {
        &self.invalid
    }

    ///
    /// INITIALIZE
    ///

    /// (Re-)derive the live children from a backing array.
    ///
    /// Records lacking an id are assigned a fresh random one. A child
    /// whose construction fails is logged, tracked as invalid, and
    /// excluded, without aborting the caller. Unchanged existing children
    /// are re-initialized in place rather than rebuilt.
    pub fn initialize(&mut self, records: Vec<Json>) {
        let mut previous = std::mem::take(&mut self.entries);
        let mut entries = IndexMap::with_capacity(records.len());
        let mut invalid = BTreeSet::new();
        let mut source = Vec::with_capacity(records.len());

        for mut record in records {
            let Some(map) = record.as_object_mut() else {
                tracing::warn!(
                    type_name = self.ty.name(),
                    "non-object backing record retained but not materialized"
                );
                source.push(record);
                continue;
            };

            let id = match map.get(ID_KEY).and_then(Json::as_str) {
                Some(id) => id.to_string(),
                None => {
                    let id = Id::generate().to_string();
                    map.insert(ID_KEY.to_string(), Json::String(id.clone()));
                    id
                }
            };

            if entries.contains_key(&id) || invalid.contains(&id) {
                tracing::warn!(
                    type_name = self.ty.name(),
                    id = %id,
                    "duplicate id in backing array; record retained but not materialized"
                );
                source.push(record);
                continue;
            }

            // unchanged children re-initialize in place
            if let Some(mut existing) = previous.shift_remove(&id) {
                if Json::Object(existing.to_object(true)) == record && existing.reset().is_ok() {
                    entries.insert(id, existing);
                    source.push(record);
                    continue;
                }
            }

            match Entity::from_raw(self.ty, record.clone(), self.context.clone()) {
                Ok(child) => {
                    entries.insert(id, child);
                }
                Err(err) => {
                    tracing::warn!(
                        type_name = self.ty.name(),
                        id = %id,
                        %err,
                        "embedded child failed to construct; excluded from live collection"
                    );
                    invalid.insert(id);
                }
            }

            source.push(record);
        }

        self.entries = entries;
        self.invalid = invalid;
        self.source = source;
    }

    ///
    /// STRUCTURAL MUTATION
    ///

    /// Insert or replace a child, keyed by its id.
    ///
    /// With `sync`, the backing array is updated in place (replace by id,
    /// else append); bulk importers may suppress this.
    pub fn set(&mut self, child: Entity, sync: bool) -> Result<(), ModelError> {
        let id = child.id().ok_or(ModelError::MissingId)?.to_string();

        if sync {
            let record = Json::Object(child.to_object(true));
            match self
                .source
                .iter()
                .position(|r| record_id(r) == Some(id.as_str()))
            {
                Some(index) => self.source[index] = record,
                None => self.source.push(record),
            }
            self.invalid.remove(&id);
        }

        self.entries.insert(id, child);

        Ok(())
    }

    /// Remove a child by id, returning it.
    ///
    /// With `sync`, the backing record is spliced out as well.
    pub fn delete(&mut self, id: &str, sync: bool) -> Option<Entity> {
        let removed = self.entries.shift_remove(id);

        if sync {
            self.source.retain(|record| record_id(record) != Some(id));
            self.invalid.remove(id);
        }

        removed
    }

    ///
    /// UPDATE
    ///

    /// Upsert children from a change list.
    ///
    /// Entries with a known id apply a partial update to the existing
    /// child; unknown entries construct and insert a new one. When
    /// `recursive` is off the change list is a full replacement: children
    /// it does not mention are deleted. Returns per-child diffs.
    pub fn update(
        &mut self,
        changes: Vec<Json>,
        options: UpdateOptions,
    ) -> Result<Vec<Json>, ModelError> {
        let mut diffs = Vec::new();
        let mut touched: BTreeSet<String> = BTreeSet::new();

        for change in changes {
            let Json::Object(mut change) = change else {
                continue;
            };

            let id = change
                .get(ID_KEY)
                .and_then(Json::as_str)
                .map(str::to_string);

            match id {
                Some(id) if self.entries.contains_key(&id) => {
                    touched.insert(id.clone());

                    // the id is a selector, not a change
                    change.remove(ID_KEY);
                    let Some(child) = self.entries.get_mut(&id) else {
                        continue;
                    };
                    let child_diff = child.apply_update(change, options)?;
                    let record = Json::Object(child.to_object(true));

                    if let Some(index) = self
                        .source
                        .iter()
                        .position(|r| record_id(r) == Some(id.as_str()))
                    {
                        self.source[index] = record;
                    }

                    if !child_diff.is_empty() {
                        let mut entry = JsonObject::new();
                        entry.insert(ID_KEY.to_string(), Json::String(id));
                        entry.extend(child_diff);
                        diffs.push(Json::Object(entry));
                    }
                }
                _ => {
                    let id = match change.get(ID_KEY).and_then(Json::as_str) {
                        Some(id) => id.to_string(),
                        None => {
                            let id = Id::generate().to_string();
                            change.insert(ID_KEY.to_string(), Json::String(id.clone()));
                            id
                        }
                    };

                    let child =
                        Entity::from_raw(self.ty, Json::Object(change), self.context.clone())?;
                    let record = Json::Object(child.to_object(true));

                    touched.insert(id.clone());
                    self.source.push(record.clone());
                    self.entries.insert(id, child);
                    diffs.push(record);
                }
            }
        }

        // full-replacement semantics
        if !options.recursive {
            let stale: Vec<String> = self
                .entries
                .keys()
                .filter(|id| !touched.contains(*id))
                .cloned()
                .collect();
            for id in stale {
                self.delete(&id, true);
            }

            let stale_invalid: Vec<String> = self
                .invalid
                .iter()
                .filter(|id| !touched.contains(*id))
                .cloned()
                .collect();
            for id in stale_invalid {
                self.invalid.remove(&id);
                self.source
                    .retain(|record| record_id(record) != Some(id.as_str()));
            }
        }

        Ok(diffs)
    }

    ///
    /// DIAGNOSTICS
    ///

    /// Reconstruct a detached, tolerant instance of an invalid child from
    /// its stored raw record. The collection itself is untouched.
    pub fn get_invalid(&self, id: &str) -> Result<Entity, ModelError> {
        if !self.invalid.contains(id) {
            return Err(ModelError::ChildNotFound { id: id.to_string() });
        }

        let record = self
            .source
            .iter()
            .find(|record| record_id(record) == Some(id))
            .cloned()
            .ok_or_else(|| ModelError::ChildNotFound { id: id.to_string() })?;

        let context = ModelContext {
            strict: false,
            ..self.context.clone()
        };

        Entity::from_raw(self.ty, record, context)
    }
}

fn record_id(record: &Json) -> Option<&str> {
    record.as_object()?.get(ID_KEY)?.as_str()
}
