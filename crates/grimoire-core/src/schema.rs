use crate::{
    field::{CleanOptions, Field, FieldError, FieldKind, ValidateOptions},
    model::{Derived, LazyRef, ModelContext, ModelError},
    patch::deletion_target,
    types::{Json, JsonObject},
};
use indexmap::IndexMap;
use std::{collections::BTreeMap, fmt};
use thiserror::Error as ThisError;

///
/// SchemaError
///
/// Authoring failures raised at schema-definition time. These signal
/// programming errors, never data errors.
///

#[derive(Debug, ThisError)]
pub enum SchemaError {
    #[error("duplicate field name: {name}")]
    DuplicateField { name: String },

    #[error("invalid field name: {name}")]
    InvalidName { name: String },

    #[error("invalid element for collection field {name}: {reason}")]
    InvalidElement { name: String, reason: String },
}

///
/// ValidationFailure
///
/// Aggregate validation error: every failing field keyed by dotted path.
///

#[derive(Clone, Debug, Default)]
pub struct ValidationFailure {
    pub errors: BTreeMap<String, Vec<String>>,
}

impl ValidationFailure {
    #[must_use]
    pub const fn new(errors: BTreeMap<String, Vec<String>>) -> Self {
        Self { errors }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation failed on {} field(s):", self.errors.len())?;
        for (path, messages) in &self.errors {
            write!(f, " {path}: {}.", messages.join("; "))?;
        }

        Ok(())
    }
}

impl std::error::Error for ValidationFailure {}

///
/// Schema
///
/// An ordered mapping of names to fields: the recursive backbone for
/// nesting. A schema is built once per type, cached, and shared read-only
/// by every instance; fields are moved in at build time and never
/// re-attached elsewhere.
///

#[derive(Clone, Debug)]
pub struct Schema {
    fields: IndexMap<String, Field>,
}

impl Schema {
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder {
            fields: IndexMap::new(),
            error: None,
        }
    }

    ///
    /// ACCESSORS
    ///

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Field)> {
        self.fields.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    ///
    /// CLEAN
    ///

    /// Clean a candidate record field-by-field, in declaration order.
    ///
    /// Schemas are closed: undeclared keys are dropped, except deletion
    /// markers in partial mode, which downstream merges honor. Fields
    /// cleaned earlier are visible to later initial functions through the
    /// in-progress record.
    #[must_use]
    pub fn clean(&self, mut data: JsonObject, options: CleanOptions) -> JsonObject {
        let mut out = JsonObject::new();

        for (name, field) in &self.fields {
            let present = data.remove(name);
            if options.partial && present.is_none() {
                continue;
            }

            if let Some(value) = field.clean(present, &out, options) {
                out.insert(name.clone(), value);
            }
        }

        if options.partial {
            for (key, value) in data {
                if deletion_target(&key).is_some() {
                    out.insert(key, value);
                }
            }
        }

        out
    }

    ///
    /// VALIDATE
    ///

    /// Validate a record, accumulating per-field errors keyed by dotted
    /// path. Pure: the record is never repaired.
    #[must_use]
    pub fn validate_errors(
        &self,
        data: &JsonObject,
        options: ValidateOptions,
    ) -> BTreeMap<String, Vec<String>> {
        let mut errors = BTreeMap::new();

        for (name, field) in &self.fields {
            let value = data.get(name);
            if options.partial && value.is_none() {
                continue;
            }

            if let Err(err) = field.validate(value, options) {
                record_error(&mut errors, name, err);
            }
        }

        errors
    }

    /// Validate a record, repairing failing fields with their own defaults
    /// where those defaults validate. Residual errors are returned; every
    /// absorbed failure is logged against `origin`.
    pub fn validate_fallback(
        &self,
        data: &mut JsonObject,
        options: ValidateOptions,
        origin: &str,
    ) -> BTreeMap<String, Vec<String>> {
        let mut errors = BTreeMap::new();

        for (name, field) in &self.fields {
            if options.partial && !data.contains_key(name) {
                continue;
            }

            // set fields shed invalid elements instead of failing whole
            if let FieldKind::Set(element) = field.kind() {
                if let Some(Json::Array(items)) = data.get(name) {
                    let retained: Vec<Json> = items
                        .iter()
                        .filter(|item| element.validate(Some(*item), options).is_ok())
                        .cloned()
                        .collect();

                    if retained.len() != items.len() {
                        tracing::debug!(
                            origin,
                            field = %name,
                            dropped = items.len() - retained.len(),
                            "dropped invalid set elements during fallback"
                        );
                        data.insert(name.clone(), Json::Array(retained));
                    }
                }
            }

            let Err(err) = field.validate(data.get(name), options) else {
                continue;
            };

            // a fallback only applies when the default itself validates
            if let Some(candidate) = field.initial_value(data) {
                if field.validate(Some(&candidate), options).is_ok() {
                    tracing::warn!(
                        origin,
                        field = %name,
                        "invalid value replaced by the field default"
                    );
                    data.insert(name.clone(), candidate);
                    continue;
                }
            }

            record_error(&mut errors, name, err);
        }

        errors
    }

    ///
    /// INITIALIZE
    ///

    /// Derive the working view of a source record, field-by-field.
    ///
    /// Plain values are deep-copied; nested schemas recurse; embedded
    /// models construct child models; embedded collections build their
    /// synchronized container; foreign references stay lazy. Absent
    /// optional fields stay absent.
    pub fn initialize(
        &self,
        source: &JsonObject,
        ctx: &ModelContext,
    ) -> Result<IndexMap<String, Derived>, ModelError> {
        let mut derived = IndexMap::with_capacity(self.fields.len());

        for (name, field) in &self.fields {
            let value = source.get(name);

            let slot = match field.kind() {
                FieldKind::EmbeddedCollection(ty) => {
                    let records = match value {
                        Some(Json::Array(items)) => items.clone(),
                        _ => Vec::new(),
                    };

                    let mut collection =
                        crate::collection::EmbeddedCollection::new(*ty, ctx.clone());
                    collection.initialize(records);

                    Derived::Collection(collection)
                }
                FieldKind::EmbeddedModel(ty) => {
                    let raw = value.cloned().unwrap_or_else(|| Json::Object(JsonObject::new()));
                    let child = crate::model::Model::from_raw(*ty, raw, ctx.for_child())?;

                    Derived::Model(Box::new(child))
                }
                FieldKind::ForeignReference(target) => {
                    let id = value.and_then(Json::as_str).map(str::to_string);

                    Derived::Lazy(LazyRef::new(*target, id, ctx.resolver.clone()))
                }
                FieldKind::Schema(inner) => {
                    let Some(Json::Object(map)) = value else {
                        match value {
                            None => continue,
                            Some(other) => {
                                derived.insert(name.clone(), Derived::Value(other.clone()));
                                continue;
                            }
                        }
                    };

                    Derived::Record(inner.initialize(map, ctx)?)
                }
                _ => match value {
                    None => continue,
                    Some(value) => Derived::Value(value.clone()),
                },
            };

            derived.insert(name.clone(), slot);
        }

        Ok(derived)
    }
}

fn record_error(errors: &mut BTreeMap<String, Vec<String>>, name: &str, err: FieldError) {
    match err {
        FieldError::Invalid(message) => {
            errors.entry(name.to_string()).or_default().push(message);
        }
        FieldError::Nested(nested) => {
            for (path, messages) in nested {
                errors
                    .entry(format!("{name}.{path}"))
                    .or_default()
                    .extend(messages);
            }
        }
    }
}

///
/// SchemaBuilder
///
/// Accumulates field declarations; authoring errors surface at `build`.
///

pub struct SchemaBuilder {
    fields: IndexMap<String, Field>,
    error: Option<SchemaError>,
}

impl SchemaBuilder {
    /// Declare a field. The field is moved in: this is its one and only
    /// attachment.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        if self.error.is_some() {
            return self;
        }

        let name = name.into();

        if name.is_empty() || name.contains('.') || deletion_target(&name).is_some() {
            self.error = Some(SchemaError::InvalidName { name });
            return self;
        }

        if let Some(reason) = element_violation(&field) {
            self.error = Some(SchemaError::InvalidElement { name, reason });
            return self;
        }

        if self.fields.insert(name.clone(), field).is_some() {
            self.error = Some(SchemaError::DuplicateField { name });
        }

        self
    }

    pub fn build(self) -> Result<Schema, SchemaError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(Schema {
                fields: self.fields,
            }),
        }
    }
}

// Element-kind rules for container fields.
fn element_violation(field: &Field) -> Option<String> {
    match field.kind() {
        FieldKind::Array(element) => match element.kind() {
            FieldKind::EmbeddedCollection(_) => {
                Some("array elements may not be embedded collections".to_string())
            }
            _ => None,
        },
        FieldKind::Set(element) => match element.kind() {
            FieldKind::EmbeddedCollection(_)
            | FieldKind::EmbeddedModel(_)
            | FieldKind::Schema(_)
            | FieldKind::Object
            | FieldKind::Array(_)
            | FieldKind::Set(_) => Some("set elements must be scalar fields".to_string()),
            _ => None,
        },
        _ => None,
    }
}
