use crate::{entity::EntityType, schema::Schema, types::JsonObject};
use std::{collections::BTreeMap, fmt};
use thiserror::Error as ThisError;

/// Lazily-built, cached schema accessor. Concrete types back this with a
/// `LazyLock` static, so a schema is computed once and shared read-only by
/// every instance.
pub type SchemaFn = fn() -> &'static Schema;

/// Type-specific rewrite of legacy keys, applied before cleaning.
pub type MigrateFn = fn(&mut JsonObject);

/// Type-specific backward-compatible accessors derived after cleaning.
/// The returned entries are kept outside canonical storage.
pub type ShimFn = fn(&JsonObject) -> JsonObject;

/// Cross-field invariant check over a complete source record.
pub type JointValidateFn = fn(&JsonObject) -> Result<(), String>;

///
/// ModelType
///
/// The static runtime descriptor for one concrete model type: its name,
/// its cached schema, and its lifecycle hooks. Declared once per type and
/// shared by every instance.
///

pub struct ModelType {
    /// Stable external type name used in diagnostics and registry routing.
    pub name: &'static str,
    pub schema: SchemaFn,
    pub migrate: Option<MigrateFn>,
    pub shim: Option<ShimFn>,
    pub validate_joint: Option<JointValidateFn>,
}

impl ModelType {
    #[must_use]
    pub fn schema(&self) -> &'static Schema {
        (self.schema)()
    }
}

impl fmt::Debug for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelType").field("name", &self.name).finish_non_exhaustive()
    }
}

impl PartialEq for ModelType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ModelType {}

///
/// RegistryError
///

#[derive(Debug, ThisError)]
pub enum RegistryError {
    #[error("entity type already registered: {name}")]
    Duplicate { name: &'static str },
}

///
/// Registry
///
/// An explicit mapping from type names to entity type descriptors.
/// Passed into the places that need cross-type resolution (reference
/// resolvers, backends) instead of being reached through ambient state.
///

#[derive(Debug, Default)]
pub struct Registry {
    types: BTreeMap<&'static str, &'static EntityType>,
}

impl Registry {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            types: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, ty: &'static EntityType) -> Result<(), RegistryError> {
        let name = ty.name();

        if self.types.insert(name, ty).is_some() {
            return Err(RegistryError::Duplicate { name });
        }

        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&'static EntityType> {
        self.types.get(name).copied()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.types.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{ACTOR, ITEM};

    #[test]
    fn registry_routes_type_names_to_descriptors() {
        let mut registry = Registry::new();
        registry.register(&ACTOR).expect("first registration");
        registry.register(&ITEM).expect("second registration");

        assert!(registry.contains("Actor"));
        assert_eq!(registry.get("Item").map(EntityType::name), Some("Item"));
        assert!(registry.get("Scene").is_none());
        assert_eq!(registry.names().count(), 2);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = Registry::new();
        registry.register(&ACTOR).expect("first registration");

        assert!(matches!(
            registry.register(&ACTOR),
            Err(RegistryError::Duplicate { name: "Actor" })
        ));
    }
}
