pub mod descriptor;
pub mod source;
pub mod update;

#[cfg(test)]
mod tests;

pub use descriptor::{ModelType, Registry, RegistryError};
pub use source::{SourceError, SourceRecord};
pub use update::UpdateOptions;

use crate::{
    collection::EmbeddedCollection,
    field::{CleanOptions, ValidateOptions},
    patch::PatchError,
    schema::{Schema, ValidationFailure},
    types::{ID_KEY, Json, JsonObject},
};
use indexmap::IndexMap;
use std::{fmt, sync::Arc, sync::OnceLock};
use thiserror::Error as ThisError;

/// Cross-type lookup used by lazy reference fields:
/// `(target type name, id) -> raw record`.
pub type ReferenceResolver = Arc<dyn Fn(&str, &str) -> Option<Json> + Send + Sync>;

///
/// ModelError
///

#[derive(Debug, ThisError)]
pub enum ModelError {
    #[error("validation failed for {type_name} [{id}]: {failure}")]
    Validation {
        type_name: &'static str,
        id: String,
        failure: ValidationFailure,
    },

    #[error("joint validation failed for {type_name} [{id}]: {message}")]
    Joint {
        type_name: &'static str,
        id: String,
        message: String,
    },

    #[error("update rejected for {type_name} [{id}]: {failure}")]
    UpdateRejected {
        type_name: &'static str,
        id: String,
        failure: ValidationFailure,
    },

    #[error("field {name} is read-only")]
    Readonly { name: String },

    #[error("unknown field: {name}")]
    UnknownField { name: String },

    #[error("record has no id")]
    MissingId,

    #[error("no child with id {id}")]
    ChildNotFound { id: String },

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Patch(#[from] PatchError),
}

///
/// ParentLink
///
/// Identity of the owning model. A back-reference in metadata form only:
/// children are owned by their parent's collection, never the reverse.
///

#[derive(Clone, Debug)]
pub struct ParentLink {
    pub type_name: &'static str,
    pub id: Option<String>,
}

///
/// ModelContext
///
/// Construction context: parent identity, strictness, and the reference
/// resolver handed to lazy fields. Strict is the default; bulk and import
/// paths opt into tolerance.
///

#[derive(Clone)]
pub struct ModelContext {
    pub parent: Option<ParentLink>,
    pub strict: bool,
    pub resolver: Option<ReferenceResolver>,
}

impl ModelContext {
    #[must_use]
    pub fn tolerant() -> Self {
        Self {
            strict: false,
            ..Self::default()
        }
    }

    // nested models re-initialize from already-validated source data
    pub(crate) fn for_child(&self) -> Self {
        Self {
            strict: false,
            ..self.clone()
        }
    }
}

impl Default for ModelContext {
    fn default() -> Self {
        Self {
            parent: None,
            strict: true,
            resolver: None,
        }
    }
}

impl fmt::Debug for ModelContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelContext")
            .field("parent", &self.parent)
            .field("strict", &self.strict)
            .field("resolver", &self.resolver.as_ref().map(|_| ".."))
            .finish()
    }
}

///
/// LazyRef
///
/// An explicit lazy reference: target type, id, and a memoized resolution
/// cell. Each re-initialization produces a fresh cell, so reads stay live
/// across updates while staying cheap within one derived view.
///

pub struct LazyRef {
    target: &'static str,
    id: Option<String>,
    resolver: Option<ReferenceResolver>,
    cell: OnceLock<Option<Json>>,
}

impl LazyRef {
    pub(crate) fn new(
        target: &'static str,
        id: Option<String>,
        resolver: Option<ReferenceResolver>,
    ) -> Self {
        Self {
            target,
            id,
            resolver,
            cell: OnceLock::new(),
        }
    }

    #[must_use]
    pub const fn target(&self) -> &'static str {
        self.target
    }

    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Resolve the referenced record, memoizing the first lookup.
    #[must_use]
    pub fn get(&self) -> Option<&Json> {
        self.cell
            .get_or_init(|| match (&self.id, &self.resolver) {
                (Some(id), Some(resolve)) => resolve(self.target, id),
                _ => None,
            })
            .as_ref()
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl fmt::Debug for LazyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyRef")
            .field("target", &self.target)
            .field("id", &self.id)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

///
/// Derived
///
/// One slot of the working view. The stored/computed distinction is
/// explicit: plain values are stored, lazy references are computed on
/// read.
///

#[derive(Debug)]
pub enum Derived {
    Value(Json),
    Record(IndexMap<String, Derived>),
    Model(Box<Model>),
    Collection(EmbeddedCollection),
    Lazy(LazyRef),
}

impl Derived {
    #[must_use]
    pub const fn as_value(&self) -> Option<&Json> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_collection(&self) -> Option<&EmbeddedCollection> {
        match self {
            Self::Collection(collection) => Some(collection),
            _ => None,
        }
    }

    /// Serializable projection of the slot.
    #[must_use]
    pub fn to_json(&self) -> Json {
        match self {
            Self::Value(value) => value.clone(),
            Self::Record(record) => {
                let mut out = JsonObject::new();
                for (name, slot) in record {
                    out.insert(name.clone(), slot.to_json());
                }

                Json::Object(out)
            }
            Self::Model(model) => Json::Object(model.to_object(false)),
            Self::Collection(collection) => Json::Array(collection.backing().to_vec()),
            Self::Lazy(lazy) => lazy
                .id()
                .map_or(Json::Null, |id| Json::String(id.to_string())),
        }
    }
}

///
/// Model
///
/// One schema, one immutable source record, one derived working view.
/// Lifecycle: construct (migrate, clean, shim, freeze) -> validate ->
/// initialize -> repeatable update / reset.
///

#[derive(Debug)]
pub struct Model {
    ty: &'static ModelType,
    context: ModelContext,
    source: SourceRecord,
    shims: JsonObject,
    valid: bool,
    derived: IndexMap<String, Derived>,
}

impl Model {
    /// Build a model from an untrusted candidate.
    ///
    /// A candidate that is not a mapping at all is logged and replaced by
    /// an empty record; that tolerance applies at this outermost entry
    /// only, nested shape errors are validation failures.
    pub fn from_raw(
        ty: &'static ModelType,
        raw: Json,
        context: ModelContext,
    ) -> Result<Self, ModelError> {
        let mut data = match raw {
            Json::Object(map) => map,
            other => {
                tracing::error!(
                    type_name = ty.name,
                    candidate = %other,
                    "construction candidate is not a mapping; starting from an empty record"
                );
                JsonObject::new()
            }
        };

        if let Some(migrate) = ty.migrate {
            migrate(&mut data);
        }

        let cleaned = ty.schema().clean(data, CleanOptions::default());
        let shims = ty.shim.map(|shim| shim(&cleaned)).unwrap_or_default();

        let mut model = Self {
            ty,
            context,
            source: SourceRecord::new(cleaned),
            shims,
            valid: false,
            derived: IndexMap::new(),
        };

        model.validate_source()?;
        model.reset()?;

        Ok(model)
    }

    ///
    /// ACCESSORS
    ///

    #[must_use]
    pub const fn ty(&self) -> &'static ModelType {
        self.ty
    }

    #[must_use]
    pub fn schema(&self) -> &'static Schema {
        self.ty.schema()
    }

    #[must_use]
    pub const fn source(&self) -> &SourceRecord {
        &self.source
    }

    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.valid
    }

    #[must_use]
    pub const fn parent(&self) -> Option<&ParentLink> {
        self.context.parent.as_ref()
    }

    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.source.get(ID_KEY).and_then(Json::as_str)
    }

    #[must_use]
    pub fn derived(&self, name: &str) -> Option<&Derived> {
        self.derived.get(name)
    }

    #[must_use]
    pub fn collection(&self, name: &str) -> Option<&EmbeddedCollection> {
        self.derived.get(name).and_then(Derived::as_collection)
    }

    pub fn collection_mut(&mut self, name: &str) -> Option<&mut EmbeddedCollection> {
        match self.derived.get_mut(name) {
            Some(Derived::Collection(collection)) => Some(collection),
            _ => None,
        }
    }

    /// Read a working-view value by dotted path. Lazy references resolve;
    /// shim accessors answer for keys outside canonical storage.
    #[must_use]
    pub fn value(&self, path: &str) -> Option<Json> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };

        match self.derived.get(head) {
            Some(slot) => read_slot(slot, rest),
            None => crate::patch::get_path(&self.shims, path).cloned(),
        }
    }

    /// Write a working-view value. Read-only fields reject writes; the
    /// source record is untouched (use [`Self::apply_update`] for that).
    pub fn set_value(&mut self, name: &str, value: Json) -> Result<(), ModelError> {
        let field = self
            .ty
            .schema()
            .get(name)
            .ok_or_else(|| ModelError::UnknownField {
                name: name.to_string(),
            })?;

        if field.is_readonly() {
            return Err(ModelError::Readonly {
                name: name.to_string(),
            });
        }

        self.derived.insert(name.to_string(), Derived::Value(value));

        Ok(())
    }

    ///
    /// LIFECYCLE
    ///

    // Schema validation over the frozen source, then the joint pass.
    // Non-strict contexts absorb failures via fallback and logging.
    fn validate_source(&mut self) -> Result<(), ModelError> {
        let options = ValidateOptions::default();
        let origin = self.origin();

        let errors = if self.context.strict {
            self.ty.schema().validate_errors(self.source.as_object(), options)
        } else {
            self.ty
                .schema()
                .validate_fallback(self.source.as_object_mut(), options, &origin)
        };

        if !errors.is_empty() {
            let failure = ValidationFailure::new(errors);

            if self.context.strict {
                return Err(ModelError::Validation {
                    type_name: self.ty.name,
                    id: self.id_string(),
                    failure,
                });
            }

            for (path, messages) in &failure.errors {
                tracing::warn!(
                    origin = %origin,
                    path = %path,
                    ?messages,
                    "validation failure absorbed in non-strict construction"
                );
            }
            self.valid = false;

            return Ok(());
        }

        if let Some(joint) = self.ty.validate_joint {
            if let Err(message) = joint(self.source.as_object()) {
                if self.context.strict {
                    return Err(ModelError::Joint {
                        type_name: self.ty.name,
                        id: self.id_string(),
                        message,
                    });
                }

                tracing::warn!(
                    origin = %origin,
                    %message,
                    "joint validation failure absorbed in non-strict construction"
                );
                self.valid = false;

                return Ok(());
            }
        }

        self.valid = true;

        Ok(())
    }

    /// Recompute the derived working view from the current source.
    ///
    /// Existing embedded collections re-initialize their children in
    /// place instead of being rebuilt wholesale.
    pub fn reset(&mut self) -> Result<(), ModelError> {
        let child_ctx = self.child_context();
        let mut previous = std::mem::take(&mut self.derived);

        let mut derived = self.ty.schema().initialize(self.source.as_object(), &child_ctx)?;

        for (name, slot) in &mut derived {
            let Derived::Collection(fresh) = slot else {
                continue;
            };
            let Some(Derived::Collection(mut existing)) = previous.shift_remove(name) else {
                continue;
            };

            existing.initialize(fresh.backing().to_vec());
            *slot = Derived::Collection(existing);
        }

        // ids assigned during collection initialization flow back to source
        let sync: Vec<(String, Json)> = derived
            .iter()
            .filter_map(|(name, slot)| {
                let collection = slot.as_collection()?;
                let backing = Json::Array(collection.backing().to_vec());

                (self.source.get(name) != Some(&backing)).then(|| (name.clone(), backing))
            })
            .collect();
        for (name, backing) in sync {
            self.source.set(&name, backing)?;
        }

        self.derived = derived;

        Ok(())
    }

    /// Force a full strict validation (schema and joint pass) over the
    /// current source; refreshes the `valid` flag. The way to re-check
    /// cross-field invariants after a batch of partial updates.
    pub fn validate_full(&mut self) -> Result<(), ModelError> {
        let errors = self
            .ty
            .schema()
            .validate_errors(self.source.as_object(), ValidateOptions::default());

        if !errors.is_empty() {
            self.valid = false;

            return Err(ModelError::Validation {
                type_name: self.ty.name,
                id: self.id_string(),
                failure: ValidationFailure::new(errors),
            });
        }

        if let Some(joint) = self.ty.validate_joint {
            if let Err(message) = joint(self.source.as_object()) {
                self.valid = false;

                return Err(ModelError::Joint {
                    type_name: self.ty.name,
                    id: self.id_string(),
                    message,
                });
            }
        }

        self.valid = true;

        Ok(())
    }

    ///
    /// SERIALIZATION
    ///

    /// Serialize to a plain nested record.
    ///
    /// `source` selects the canonical frozen record (round-trip safe);
    /// otherwise the derived working view is projected. Shim accessors are
    /// outside canonical storage and appear in neither.
    #[must_use]
    pub fn to_object(&self, source: bool) -> JsonObject {
        if source {
            let mut out = self.source.to_object();

            // live collections own their backing arrays
            for (name, slot) in &self.derived {
                if let Derived::Collection(collection) = slot {
                    out.insert(name.clone(), Json::Array(collection.backing().to_vec()));
                }
            }

            out
        } else {
            let mut out = JsonObject::new();
            for (name, slot) in &self.derived {
                out.insert(name.clone(), slot.to_json());
            }

            out
        }
    }

    /// Build an independent model by deep-merging overrides onto a
    /// snapshot of this one.
    pub fn clone_with(&self, overrides: JsonObject) -> Result<Self, ModelError> {
        let mut snapshot = self.to_object(true);
        crate::patch::merge_object(&mut snapshot, overrides, crate::patch::MergeOptions::default())?;

        Self::from_raw(self.ty, Json::Object(snapshot), self.context.clone())
    }

    ///
    /// INTERNAL
    ///

    pub(crate) fn child_context(&self) -> ModelContext {
        ModelContext {
            parent: Some(ParentLink {
                type_name: self.ty.name,
                id: self.id().map(str::to_string),
            }),
            strict: true,
            resolver: self.context.resolver.clone(),
        }
    }

    pub(crate) fn id_string(&self) -> String {
        self.id().unwrap_or("-").to_string()
    }

    pub(crate) fn origin(&self) -> String {
        format!("{} [{}]", self.ty.name, self.id_string())
    }

    pub(crate) const fn source_mut(&mut self) -> &mut SourceRecord {
        &mut self.source
    }
}

fn read_slot(slot: &Derived, rest: Option<&str>) -> Option<Json> {
    match (slot, rest) {
        (Derived::Value(value), None) => Some(value.clone()),
        (Derived::Value(value), Some(rest)) => {
            crate::patch::get_path(value.as_object()?, rest).cloned()
        }
        (Derived::Record(record), None) => {
            let mut out = JsonObject::new();
            for (name, inner) in record {
                out.insert(name.clone(), inner.to_json());
            }

            Some(Json::Object(out))
        }
        (Derived::Record(record), Some(rest)) => {
            let (head, tail) = match rest.split_once('.') {
                Some((head, tail)) => (head, Some(tail)),
                None => (rest, None),
            };

            read_slot(record.get(head)?, tail)
        }
        (Derived::Model(model), None) => Some(Json::Object(model.to_object(false))),
        (Derived::Model(model), Some(rest)) => model.value(rest),
        (Derived::Collection(collection), None) => {
            Some(Json::Array(collection.backing().to_vec()))
        }
        (Derived::Collection(_), Some(_)) => None,
        (Derived::Lazy(lazy), None) => Some(lazy.get().cloned().unwrap_or(Json::Null)),
        (Derived::Lazy(lazy), Some(rest)) => {
            crate::patch::get_path(lazy.get()?.as_object()?, rest).cloned()
        }
    }
}
