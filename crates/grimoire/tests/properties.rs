//! Property coverage for the substrate's structural guarantees.

mod common;

use common::CHARACTER;
use grimoire::prelude::*;
use proptest::prelude::*;
use serde_json::json;

fn obj(value: Json) -> JsonObject {
    value.as_object().expect("fixture must be an object").clone()
}

// trim-stable names so cleaning is the identity on them
fn name_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9]{0,19}"
}

// shallow nested trees with plain keys; leaves are integers
fn tree_strategy() -> impl Strategy<Value = JsonObject> {
    let key = "[a-z]{1,6}";
    let leaf = any::<i32>().prop_map(Json::from);

    proptest::collection::btree_map(
        key,
        proptest::collection::btree_map(key, leaf, 1..4).prop_map(|inner| {
            Json::Object(inner.into_iter().collect())
        }),
        1..5,
    )
    .prop_map(|outer| outer.into_iter().collect())
}

proptest! {
    #[test]
    fn valid_sources_round_trip(name in name_strategy(), hp in 0u32..10_000) {
        let source = obj(json!({"name": name, "hp": hp}));

        let model = Model::from_raw(
            &CHARACTER,
            Json::Object(source.clone()),
            ModelContext::default(),
        )
        .expect("valid source must construct");

        prop_assert_eq!(model.to_object(true), source);
    }

    #[test]
    fn cleaning_is_idempotent(name in "[ ]?[A-Za-z]{0,12}[ ]?", hp in proptest::option::of(-10_000i64..10_000)) {
        let mut candidate = JsonObject::new();
        candidate.insert("name".to_string(), json!(name));
        if let Some(hp) = hp {
            candidate.insert("hp".to_string(), json!(hp));
        }

        let schema = CHARACTER.schema();
        let once = schema.clean(candidate, CleanOptions::default());
        let twice = schema.clean(once.clone(), CleanOptions::default());

        prop_assert_eq!(once, twice);
    }

    #[test]
    fn expand_inverts_flatten(tree in tree_strategy()) {
        let flat = flatten(&tree).expect("flatten must succeed");
        let expanded = expand(flat).expect("expand must succeed");

        prop_assert_eq!(expanded, tree);
    }

    #[test]
    fn diff_then_merge_reproduces_the_target(before in tree_strategy(), after in tree_strategy()) {
        let diff = diff_object(&before, &after, DiffOptions::default());

        let mut patched = before;
        merge_object(&mut patched, diff, MergeOptions::default()).expect("merge must succeed");

        // keys removed in `after` are outside diff semantics; compare on
        // the keys `after` declares
        let inner = diff_object(&patched, &after, DiffOptions::default());
        prop_assert!(inner.is_empty(), "patched tree must contain the target: {inner:?}");
    }
}
