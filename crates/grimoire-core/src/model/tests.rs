use crate::{
    model::{Derived, Model, ModelContext, ModelError, ReferenceResolver, UpdateOptions},
    test_fixtures::{ACTOR, CHARACTER, ITEM},
    types::{Json, JsonObject},
};
use serde_json::json;
use std::sync::Arc;

fn obj(value: Json) -> JsonObject {
    value.as_object().expect("test fixture must be an object").clone()
}

fn character(raw: Json) -> Model {
    Model::from_raw(&CHARACTER, raw, ModelContext::default()).expect("character must construct")
}

fn actor(raw: Json) -> Model {
    Model::from_raw(&ACTOR.model, raw, ModelContext::default()).expect("actor must construct")
}

// ---- construction ------------------------------------------------------

#[test]
fn construction_fills_defaults_from_schema() {
    let model = character(json!({"name": "Aria"}));

    assert_eq!(
        Json::Object(model.to_object(true)),
        json!({"name": "Aria", "hp": 10})
    );
    assert!(model.is_valid());
}

#[test]
fn strict_construction_aborts_on_missing_required_field() {
    let result = Model::from_raw(&CHARACTER, json!({"hp": 3}), ModelContext::default());

    let Err(ModelError::Validation { failure, .. }) = result else {
        panic!("strict construction must raise the aggregate error");
    };
    assert!(failure.errors.contains_key("name"));
}

#[test]
fn tolerant_construction_absorbs_failures_and_clears_valid_flag() {
    let model = Model::from_raw(&CHARACTER, json!({"hp": 3}), ModelContext::tolerant())
        .expect("tolerant construction must not abort");

    assert!(!model.is_valid());
    assert_eq!(model.source().get("hp"), Some(&json!(3)));
}

#[test]
fn non_mapping_candidate_falls_back_to_empty_record() {
    let model = Model::from_raw(&CHARACTER, json!(42), ModelContext::tolerant())
        .expect("outermost type errors are absorbed");

    // hp initial applies; name is missing and the model is marked invalid
    assert_eq!(model.source().get("hp"), Some(&json!(10)));
    assert!(!model.is_valid());
}

#[test]
fn strict_construction_runs_the_joint_pass() {
    let result = Model::from_raw(
        &ACTOR.model,
        json!({"name": "Mira", "hp": {"value": 50, "max": 10}}),
        ModelContext::default(),
    );

    assert!(matches!(result, Err(ModelError::Joint { .. })));
}

#[test]
fn migration_rewrites_legacy_keys_before_cleaning() {
    let model = Model::from_raw(&ITEM.model, json!({"name": "Torch", "qty": 3}), ModelContext::default())
        .expect("legacy item must construct");

    assert_eq!(model.source().get("quantity"), Some(&json!(3)));
    assert!(!model.source().contains("qty"));
}

#[test]
fn shims_answer_reads_but_stay_out_of_canonical_storage() {
    let model = Model::from_raw(
        &ITEM.model,
        json!({"name": "Torch", "price": 5}),
        ModelContext::default(),
    )
    .expect("item must construct");

    assert_eq!(model.value("cost"), Some(json!(5)));
    assert!(!model.to_object(true).contains_key("cost"));
    assert!(!model.to_object(false).contains_key("cost"));
}

// ---- round trip --------------------------------------------------------

#[test]
fn to_object_round_trips_valid_source() {
    let first = actor(json!({
        "name": "Mira",
        "hp": {"value": 4, "max": 12},
        "tags": ["brave", "quick"],
        "flags": {"pinned": true},
    }));
    let snapshot = first.to_object(true);

    let second = Model::from_raw(
        &ACTOR.model,
        Json::Object(snapshot.clone()),
        ModelContext::default(),
    )
    .expect("round-tripped actor must construct");

    assert_eq!(second.to_object(true), snapshot);
}

// ---- initialization ----------------------------------------------------

#[test]
fn initialization_builds_nested_models_and_records() {
    let model = actor(json!({
        "name": "Mira",
        "profile": {"pronouns": "she/her", "age": 31},
    }));

    assert!(matches!(model.derived("profile"), Some(Derived::Model(_))));
    assert!(matches!(model.derived("hp"), Some(Derived::Record(_))));
    assert_eq!(model.value("profile.pronouns"), Some(json!("she/her")));
    assert_eq!(model.value("hp.value"), Some(json!(10)));
}

#[test]
fn foreign_references_resolve_lazily_and_memoize() {
    let resolver: ReferenceResolver = Arc::new(|target, id| {
        (target == "Actor" && id == "AAAAAAAAAAAAAAAA")
            .then(|| json!({"name": "Elder Rowan"}))
    });

    let context = ModelContext {
        resolver: Some(resolver),
        ..ModelContext::default()
    };
    let model = Model::from_raw(
        &ACTOR.model,
        json!({"name": "Mira", "mentor": "AAAAAAAAAAAAAAAA"}),
        context,
    )
    .expect("actor must construct");

    let Some(Derived::Lazy(lazy)) = model.derived("mentor") else {
        panic!("mentor must initialize as a lazy reference");
    };
    assert!(!lazy.is_resolved());
    assert_eq!(model.value("mentor.name"), Some(json!("Elder Rowan")));
    assert!(lazy.is_resolved());
}

#[test]
fn set_value_rejects_readonly_fields_and_reset_recomputes() {
    let mut model = actor(json!({"_id": "AAAAAAAAAAAAAAAA", "name": "Mira"}));

    assert!(matches!(
        model.set_value("_id", json!("BBBBBBBBBBBBBBBB")),
        Err(ModelError::Readonly { .. })
    ));

    model.set_value("name", json!("Nom de guerre")).expect("name is writable");
    assert_eq!(model.value("name"), Some(json!("Nom de guerre")));

    model.reset().expect("reset must succeed");
    assert_eq!(model.value("name"), Some(json!("Mira")));
}

// ---- update ------------------------------------------------------------

#[test]
fn update_rejects_out_of_range_value_before_any_mutation() {
    let mut model = character(json!({"name": "Aria"}));

    let result = model.apply_update(obj(json!({"hp": -5})), UpdateOptions::default());

    assert!(matches!(result, Err(ModelError::UpdateRejected { .. })));
    assert_eq!(model.source().get("hp"), Some(&json!(10)));
}

#[test]
fn updating_a_field_to_its_current_value_yields_no_diff() {
    let mut model = character(json!({"name": "Aria"}));

    let diff = model
        .apply_update(obj(json!({"name": "Aria"})), UpdateOptions::default())
        .expect("no-op update must succeed");

    assert!(diff.is_empty());
    assert_eq!(
        Json::Object(model.to_object(true)),
        json!({"name": "Aria", "hp": 10})
    );
}

#[test]
fn update_returns_only_changed_fields() {
    let mut model = character(json!({"name": "Aria"}));

    let diff = model
        .apply_update(obj(json!({"name": "Aria", "hp": 7})), UpdateOptions::default())
        .expect("update must succeed");

    assert_eq!(Json::Object(diff), json!({"hp": 7}));
    assert_eq!(model.source().get("hp"), Some(&json!(7)));
}

#[test]
fn dotted_paths_update_nested_schema_fields() {
    let mut model = actor(json!({"name": "Mira"}));

    let diff = model
        .apply_update(obj(json!({"hp.value": 3})), UpdateOptions::default())
        .expect("nested update must succeed");

    assert_eq!(Json::Object(diff), json!({"hp": {"value": 3}}));
    assert_eq!(model.value("hp.value"), Some(json!(3)));
    assert_eq!(model.value("hp.max"), Some(json!(10)));
}

#[test]
fn joint_failure_after_application_rolls_back_every_field() {
    let mut model = actor(json!({"name": "Mira", "hp": {"value": 5, "max": 10}}));
    let before = model.to_object(true);

    // each field change validates alone; together they violate the
    // cross-field invariant
    let result = model.apply_update(
        obj(json!({"name": "Overreach", "hp.value": 50})),
        UpdateOptions::default(),
    );

    assert!(matches!(result, Err(ModelError::Joint { .. })));
    assert_eq!(model.to_object(true), before);
    assert_eq!(model.value("name"), Some(json!("Mira")));
}

#[test]
fn update_rejects_readonly_changes() {
    let mut model = actor(json!({"_id": "AAAAAAAAAAAAAAAA", "name": "Mira"}));

    let result = model.apply_update(
        obj(json!({"_id": "BBBBBBBBBBBBBBBB"})),
        UpdateOptions::default(),
    );

    assert!(matches!(result, Err(ModelError::Readonly { .. })));
}

#[test]
fn object_fields_merge_under_insertion_policies() {
    let mut model = actor(json!({"name": "Mira", "flags": {"pinned": true}}));

    let diff = model
        .apply_update(obj(json!({"flags": {"starred": 1}})), UpdateOptions::default())
        .expect("object merge must succeed");

    assert_eq!(Json::Object(diff), json!({"flags": {"starred": 1}}));
    assert_eq!(
        model.source().get("flags"),
        Some(&json!({"pinned": true, "starred": 1}))
    );

    // new keys are dropped when insertion is disabled
    let options = UpdateOptions {
        insert_keys: false,
        insert_values: false,
        ..UpdateOptions::default()
    };
    let diff = model
        .apply_update(obj(json!({"flags": {"other": 2}})), options)
        .expect("suppressed insert must succeed");

    assert!(diff.is_empty());
    assert_eq!(
        model.source().get("flags"),
        Some(&json!({"pinned": true, "starred": 1}))
    );
}

#[test]
fn deletion_keys_remove_object_entries_only_when_enabled() {
    let mut model = actor(json!({"name": "Mira", "flags": {"stale": 1, "keep": 2}}));

    // disabled: the marker is retained literally for downstream consumers
    let diff = model
        .apply_update(obj(json!({"flags": {"-=stale": null}})), UpdateOptions::default())
        .expect("marker retention must succeed");
    assert_eq!(Json::Object(diff), json!({"flags": {"-=stale": null}}));
    assert_eq!(
        model.source().get("flags"),
        Some(&json!({"stale": 1, "keep": 2, "-=stale": null}))
    );

    // enabled: the key is removed entirely
    let options = UpdateOptions {
        perform_deletions: true,
        ..UpdateOptions::default()
    };
    let diff = model
        .apply_update(obj(json!({"flags": {"-=stale": null}})), options)
        .expect("deletion must succeed");
    assert_eq!(Json::Object(diff), json!({"flags": {"-=stale": null}}));
    assert_eq!(model.source().get("flags"), Some(&json!({"keep": 2})));
}

// ---- full validation and cloning --------------------------------------

#[test]
fn validate_full_rechecks_cross_field_invariants() {
    let mut model = Model::from_raw(
        &ACTOR.model,
        json!({"name": "Mira", "hp": {"value": 50, "max": 10}}),
        ModelContext::tolerant(),
    )
    .expect("tolerant construction must not abort");
    assert!(!model.is_valid());

    assert!(matches!(model.validate_full(), Err(ModelError::Joint { .. })));

    model
        .apply_update(obj(json!({"hp.value": 8})), UpdateOptions::default())
        .expect("repairing update must succeed");
    model.validate_full().expect("repaired actor must validate");
    assert!(model.is_valid());
}

#[test]
fn clone_with_merges_overrides_onto_an_independent_snapshot() {
    let original = character(json!({"name": "Aria", "hp": 8}));
    let cloned = original
        .clone_with(obj(json!({"name": "Aria the Second"})))
        .expect("clone must construct");

    assert_eq!(cloned.value("name"), Some(json!("Aria the Second")));
    assert_eq!(cloned.value("hp"), Some(json!(8)));
    assert_eq!(original.value("name"), Some(json!("Aria")));
}
