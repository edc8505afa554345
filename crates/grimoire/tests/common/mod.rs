//! Fixture types and a minimal world store shared by the integration
//! suite. Everything here goes through the public prelude only.
#![allow(dead_code)]

use async_trait::async_trait;
use grimoire::prelude::*;
use serde_json::json;
use std::{
    collections::BTreeMap,
    sync::{LazyLock, Mutex},
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

pub static CHARACTER: ModelType = ModelType {
    name: "Character",
    schema: character_schema,
    migrate: None,
    shim: None,
    validate_joint: None,
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
            "price",
            Field::number(NumberOptions {
                min: Some(0.0),
                ..NumberOptions::default()
            })
            .initial(json!(0)),
        )
        .build()
        .expect("item schema must build")
});

fn item_schema() -> &'static Schema {
    &ITEM_SCHEMA
}

pub static ITEM: EntityType = EntityType {
    model: ModelType {
        name: "Item",
        schema: item_schema,
        migrate: None,
        shim: None,
        validate_joint: None,
    },
    capability: None,
    can_modify: None,
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
        .field("flags", Field::object())
        .build()
        .expect("actor schema must build")
});

fn actor_schema() -> &'static Schema {
    &ACTOR_SCHEMA
}

fn actor_joint(data: &JsonObject) -> Result<(), String> {
    let value = grimoire::core::patch::get_path(data, "hp.value").and_then(Json::as_f64);
    let max = grimoire::core::patch::get_path(data, "hp.max").and_then(Json::as_f64);

    match (value, max) {
        (Some(value), Some(max)) if value > max => {
            Err(format!("hp value {value} exceeds hp max {max}"))
        }
        _ => Ok(()),
    }
}

pub static ACTOR: EntityType = EntityType {
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
/// WorldStore
///
/// A minimal primary-record backend. Updates run through the real model
/// machinery so stored records stay canonical.
///

#[derive(Debug, Default)]
pub struct WorldStore {
    records: Mutex<BTreeMap<(String, String), JsonObject>>,
}

impl WorldStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, ty: &EntityType, record: JsonObject) {
        let id = record
            .get(ID_KEY)
            .and_then(Json::as_str)
            .expect("seeded records must carry ids")
            .to_string();

        self.records
            .lock()
            .expect("store poisoned")
            .insert((ty.name().to_string(), id), record);
    }
}

#[async_trait]
impl Backend for WorldStore {
    async fn get(
        &self,
        ty: &'static EntityType,
        request: OperationRequest,
        _user: &User,
    ) -> Result<Vec<JsonObject>, BackendError> {
        let records = self.records.lock().expect("store poisoned");

        request
            .ids
            .iter()
            .map(|id| {
                records
                    .get(&(ty.name().to_string(), id.clone()))
                    .cloned()
                    .ok_or_else(|| BackendError::NotFound {
                        type_name: ty.name().to_string(),
                        id: id.clone(),
                    })
            })
            .collect()
    }

    async fn create(
        &self,
        ty: &'static EntityType,
        request: OperationRequest,
        _user: &User,
    ) -> Result<Vec<JsonObject>, BackendError> {
        let mut records = self.records.lock().expect("store poisoned");

        for datum in &request.data {
            let id = datum
                .get(ID_KEY)
                .and_then(Json::as_str)
                .ok_or_else(|| BackendError::Rejected {
                    reason: "create data must carry an id".to_string(),
                })?;
            records.insert((ty.name().to_string(), id.to_string()), datum.clone());
        }

        Ok(request.data)
    }

    async fn update(
        &self,
        ty: &'static EntityType,
        request: OperationRequest,
        _user: &User,
    ) -> Result<Vec<JsonObject>, BackendError> {
        let mut records = self.records.lock().expect("store poisoned");
        let options = UpdateOptions {
            insert_keys: request.options.insert_keys,
            insert_values: request.options.insert_values,
            overwrite: request.options.overwrite,
            recursive: request.options.recursive,
            perform_deletions: true,
        };

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
            let key = (ty.name().to_string(), id.clone());

            let stored = records
                .get(&key)
                .cloned()
                .ok_or_else(|| BackendError::NotFound {
                    type_name: ty.name().to_string(),
                    id,
                })?;

            let mut entity = Entity::from_raw(ty, Json::Object(stored), ModelContext::tolerant())
                .map_err(|err| BackendError::Storage {
                    message: err.to_string(),
                })?;
            entity
                .apply_update(update, options)
                .map_err(|err| BackendError::Storage {
                    message: err.to_string(),
                })?;

            let record = entity.to_object(true);
            records.insert(key, record.clone());
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
        let mut records = self.records.lock().expect("store poisoned");

        let mut removed = Vec::new();
        for id in request.ids {
            if records
                .remove(&(ty.name().to_string(), id.clone()))
                .is_some()
            {
                removed.push(id);
            }
        }

        Ok(removed)
    }
}
