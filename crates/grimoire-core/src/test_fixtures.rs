//! Shared fixture types and an in-memory backend for the test suite.

use crate::{
    entity::backend::{Backend, BackendError, OperationRequest},
    field::FileCategory,
    prelude::*,
};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::json;
use std::{
    collections::BTreeMap,
    sync::{LazyLock, Mutex},
};

///
/// Item
///

static ITEM_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::builder()
        .field("_id", Field::identifier())
        .field(
            "name",
            Field::string(StringOptions {
                blank: false,
                ..StringOptions::default()
            })
            .required(true),
        )
        .field(
            "type",
            Field::string_choices(Choices::from_keys(["weapon", "armor", "trinket"]))
                .initial(json!("trinket")),
        )
        .field(
            "quantity",
            Field::number(NumberOptions {
                integer: true,
                positive: true,
                ..NumberOptions::default()
            })
            .initial(json!(1)),
        )
        .field(
            "price",
            Field::number(NumberOptions {
                min: Some(0.0),
                ..NumberOptions::default()
            })
            .initial(json!(0)),
        )
        .field("description", Field::html_string())
        .field("flags", Field::object())
        .build()
        .expect("item schema must build")
});

fn item_schema() -> &'static Schema {
    &ITEM_SCHEMA
}

fn migrate_item(data: &mut JsonObject) {
    // legacy records carried `qty`
    if let Some(qty) = data.remove("qty") {
        data.entry("quantity").or_insert(qty);
    }
}

fn shim_item(data: &JsonObject) -> JsonObject {
    let mut shims = JsonObject::new();
    if let Some(price) = data.get("price") {
        shims.insert("cost".to_string(), price.clone());
    }

    shims
}

pub(crate) static ITEM: EntityType = EntityType {
    model: ModelType {
        name: "Item",
        schema: item_schema,
        migrate: Some(migrate_item),
        shim: Some(shim_item),
        validate_joint: None,
    },
    capability: None,
    can_modify: None,
};

///
/// Profile (plain nested model)
///

static PROFILE_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::builder()
        .field("pronouns", Field::string(StringOptions::default()))
        .field(
            "age",
            Field::number(NumberOptions {
                integer: true,
                min: Some(0.0),
                ..NumberOptions::default()
            }),
        )
        .build()
        .expect("profile schema must build")
});

fn profile_schema() -> &'static Schema {
    &PROFILE_SCHEMA
}

pub(crate) static PROFILE: ModelType = ModelType {
    name: "Profile",
    schema: profile_schema,
    migrate: None,
    shim: None,
    validate_joint: None,
};

///
/// Actor
///

static ACTOR_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    let hp = Schema::builder()
        .field(
            "value",
            Field::number(NumberOptions {
                min: Some(0.0),
                ..NumberOptions::default()
            })
            .initial(json!(10)),
        )
        .field(
            "max",
            Field::number(NumberOptions {
                min: Some(0.0),
                ..NumberOptions::default()
            })
            .initial(json!(10)),
        )
        .build()
        .expect("hp schema must build");

    Schema::builder()
        .field("_id", Field::identifier())
        .field(
            "name",
            Field::string(StringOptions {
                blank: false,
                ..StringOptions::default()
            })
            .required(true),
        )
        .field("hp", Field::schema(hp))
        .field("items", Field::collection(&ITEM))
        .field("ownership", ownership_field())
        .field(
            "portrait",
            Field::file_path(FilePathOptions {
                categories: vec![FileCategory::Image],
            }),
        )
        .field("mentor", Field::reference("Actor"))
        .field("profile", Field::embedded(&PROFILE))
        .field("tags", Field::set(Field::string(StringOptions::default())))
        .field("flags", Field::object())
        .build()
        .expect("actor schema must build")
});

fn actor_schema() -> &'static Schema {
    &ACTOR_SCHEMA
}

fn actor_joint(data: &JsonObject) -> Result<(), String> {
    let value = crate::patch::get_path(data, "hp.value").and_then(Json::as_f64);
    let max = crate::patch::get_path(data, "hp.max").and_then(Json::as_f64);

    match (value, max) {
        (Some(value), Some(max)) if value > max => {
            Err(format!("hp value {value} exceeds hp max {max}"))
        }
        _ => Ok(()),
    }
}

pub(crate) static ACTOR: EntityType = EntityType {
    model: ModelType {
        name: "Actor",
        schema: actor_schema,
        migrate: None,
        shim: None,
        validate_joint: Some(actor_joint),
    },
    capability: None,
    can_modify: None,
};

///
/// Character (flat model)
///

static CHARACTER_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::builder()
        .field(
            "name",
            Field::string(StringOptions {
                blank: false,
                ..StringOptions::default()
            })
            .required(true),
        )
        .field(
            "hp",
            Field::number(NumberOptions {
                min: Some(0.0),
                ..NumberOptions::default()
            })
            .initial(json!(10)),
        )
        .build()
        .expect("character schema must build")
});

fn character_schema() -> &'static Schema {
    &CHARACTER_SCHEMA
}

pub(crate) static CHARACTER: ModelType = ModelType {
    name: "Character",
    schema: character_schema,
    migrate: None,
    shim: None,
    validate_joint: None,
};

///
/// MemoryBackend
///
/// Storage by type name and id, dispatching to embedded handling when the
/// request addresses a parent/container. Updates run through the real
/// model machinery, so stored records stay canonical.
///

#[derive(Debug, Default)]
pub(crate) struct MemoryBackend {
    store: Mutex<BTreeMap<String, IndexMap<String, JsonObject>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, ty: &EntityType, records: Vec<JsonObject>) {
        let mut store = self.store.lock().expect("backend store poisoned");
        let table = store.entry(ty.name().to_string()).or_default();

        for record in records {
            let id = record
                .get(ID_KEY)
                .and_then(Json::as_str)
                .expect("seeded records must carry ids")
                .to_string();
            table.insert(id, record);
        }
    }

    fn not_found(type_name: &str, id: &str) -> BackendError {
        BackendError::NotFound {
            type_name: type_name.to_string(),
            id: id.to_string(),
        }
    }

    fn storage(err: impl std::fmt::Display) -> BackendError {
        BackendError::Storage {
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get(
        &self,
        ty: &'static EntityType,
        request: OperationRequest,
        _user: &User,
    ) -> Result<Vec<JsonObject>, BackendError> {
        let store = self.store.lock().expect("backend store poisoned");

        if let Some(parent) = &request.parent {
            let container = request.container.clone().unwrap_or_default();
            let table = store
                .get(&parent.type_name)
                .ok_or_else(|| Self::not_found(&parent.type_name, &parent.id))?;
            let record = table
                .get(&parent.id)
                .ok_or_else(|| Self::not_found(&parent.type_name, &parent.id))?;
            let children = record
                .get(&container)
                .and_then(Json::as_array)
                .cloned()
                .unwrap_or_default();

            let mut out = Vec::new();
            for child in children {
                let Json::Object(child) = child else { continue };
                let id = child.get(ID_KEY).and_then(Json::as_str).unwrap_or_default();
                if request.ids.is_empty() || request.ids.iter().any(|wanted| wanted.as_str() == id) {
                    out.push(child);
                }
            }

            return Ok(out);
        }

        let Some(table) = store.get(ty.name()) else {
            return Ok(Vec::new());
        };

        if request.ids.is_empty() {
            return Ok(table.values().cloned().collect());
        }

        request
            .ids
            .iter()
            .map(|id| {
                table
                    .get(id)
                    .cloned()
                    .ok_or_else(|| Self::not_found(ty.name(), id))
            })
            .collect()
    }

    async fn create(
        &self,
        ty: &'static EntityType,
        request: OperationRequest,
        _user: &User,
    ) -> Result<Vec<JsonObject>, BackendError> {
        let mut store = self.store.lock().expect("backend store poisoned");

        if let Some(parent) = &request.parent {
            let container = request.container.clone().unwrap_or_default();
            let table = store
                .get_mut(&parent.type_name)
                .ok_or_else(|| Self::not_found(&parent.type_name, &parent.id))?;
            let record = table
                .get_mut(&parent.id)
                .ok_or_else(|| Self::not_found(&parent.type_name, &parent.id))?;

            let slot = record
                .entry(container)
                .or_insert_with(|| Json::Array(Vec::new()));
            let Json::Array(children) = slot else {
                return Err(BackendError::Rejected {
                    reason: "container is not an array".to_string(),
                });
            };

            for datum in &request.data {
                children.push(Json::Object(datum.clone()));
            }

            return Ok(request.data);
        }

        let table = store.entry(ty.name().to_string()).or_default();
        for datum in &request.data {
            let id = datum
                .get(ID_KEY)
                .and_then(Json::as_str)
                .ok_or_else(|| BackendError::Rejected {
                    reason: "create data must carry an id".to_string(),
                })?;
            table.insert(id.to_string(), datum.clone());
        }

        Ok(request.data)
    }

    async fn update(
        &self,
        ty: &'static EntityType,
        request: OperationRequest,
        _user: &User,
    ) -> Result<Vec<JsonObject>, BackendError> {
        let mut store = self.store.lock().expect("backend store poisoned");
        let update_options = UpdateOptions {
            insert_keys: request.options.insert_keys,
            insert_values: request.options.insert_values,
            overwrite: request.options.overwrite,
            recursive: request.options.recursive,
            perform_deletions: true,
        };

        let table = store
            .get_mut(ty.name())
            .ok_or_else(|| Self::not_found(ty.name(), "*"))?;

        let mut out = Vec::with_capacity(request.updates.len());
        for mut update in request.updates {
            let id = update
                .remove(ID_KEY)
                .as_ref()
                .and_then(Json::as_str)
                .ok_or_else(|| BackendError::Rejected {
                    reason: "updates must carry an id".to_string(),
                })?
                .to_string();

            let stored = table
                .get(&id)
                .cloned()
                .ok_or_else(|| Self::not_found(ty.name(), &id))?;

            // run the real machinery so stored records stay canonical
            let mut entity =
                Entity::from_raw(ty, Json::Object(stored), ModelContext::tolerant())
                    .map_err(Self::storage)?;
            entity.apply_update(update, update_options).map_err(Self::storage)?;

            let record = entity.to_object(true);
            table.insert(id, record.clone());
            out.push(record);
        }

        Ok(out)
    }

    async fn delete(
        &self,
        ty: &'static EntityType,
        request: OperationRequest,
        _user: &User,
    ) -> Result<Vec<String>, BackendError> {
        let mut store = self.store.lock().expect("backend store poisoned");
        let Some(table) = store.get_mut(ty.name()) else {
            return Ok(Vec::new());
        };

        let mut removed = Vec::new();
        for id in request.ids {
            if table.shift_remove(&id).is_some() {
                removed.push(id);
            }
        }

        Ok(removed)
    }
}
