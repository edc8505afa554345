pub mod backend;
pub mod ownership;

pub use backend::{
    Backend, BackendError, OperationContext, OperationOptions, OperationRequest, ParentRef,
};
pub use ownership::{
    Action, DEFAULT_OWNERSHIP_KEY, OwnershipLevel, User, ownership_field, resolve_level,
};

use crate::{
    model::{Model, ModelContext, ModelError, ModelType},
    schema::Schema,
    types::{ID_KEY, Id, Json, JsonObject},
};
use derive_more::{Deref, DerefMut};
use std::fmt;
use thiserror::Error as ThisError;

///
/// EntityError
///

#[derive(Debug, ThisError)]
pub enum EntityError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("user {user} may not {action} {type_name}")]
    Forbidden {
        user: String,
        action: Action,
        type_name: &'static str,
    },

    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },
}

///
/// EntityType
///
/// The static descriptor for a persistence-capable type: the model
/// descriptor plus its permission surface. The modification check
/// dispatches, in priority order, to the type-specific predicate, the
/// capability gate, then the ownership level.
///

pub struct EntityType {
    pub model: ModelType,
    /// Capability gating modification when no predicate is declared.
    pub capability: Option<&'static str>,
    /// Type-specific modification predicate; highest dispatch priority.
    pub can_modify: Option<fn(&User, Action, &JsonObject) -> bool>,
}

impl EntityType {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.model.name
    }

    #[must_use]
    pub fn schema(&self) -> &'static Schema {
        self.model.schema()
    }

    #[must_use]
    pub fn evaluate_modify(
        &self,
        user: &User,
        action: Action,
        data: &JsonObject,
        ownership: OwnershipLevel,
    ) -> bool {
        if let Some(predicate) = self.can_modify {
            return predicate(user, action, data);
        }

        if let Some(capability) = self.capability {
            return user.has_capability(capability);
        }

        ownership >= OwnershipLevel::Owner
    }
}

impl fmt::Debug for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityType")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

impl PartialEq for EntityType {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for EntityType {}

///
/// Entity
///
/// A persistence-capable model: identifier-addressed, permission-bearing,
/// and able to delegate CRUD to an abstract backend. Everything else is
/// the underlying model, reachable by deref.
///

#[derive(Debug, Deref, DerefMut)]
pub struct Entity {
    ty: &'static EntityType,
    #[deref]
    #[deref_mut]
    model: Model,
}

impl Entity {
    pub fn from_raw(
        ty: &'static EntityType,
        raw: Json,
        context: ModelContext,
    ) -> Result<Self, ModelError> {
        Model::from_raw(&ty.model, raw, context).map(|model| Self { ty, model })
    }

    #[must_use]
    pub const fn entity_type(&self) -> &'static EntityType {
        self.ty
    }

    ///
    /// PERMISSIONS
    ///

    #[must_use]
    pub fn ownership(&self) -> Option<&JsonObject> {
        self.model.source().get("ownership").and_then(Json::as_object)
    }

    /// The user's effective level: their entry, else the default bucket,
    /// else no access. Types without an ownership mapping grant none.
    #[must_use]
    pub fn ownership_level(&self, user: &User) -> OwnershipLevel {
        self.ownership()
            .map_or(OwnershipLevel::None, |map| resolve_level(map, user))
    }

    /// Compare the user's effective level against a requested one.
    #[must_use]
    pub fn test_permission(&self, user: &User, level: OwnershipLevel) -> bool {
        self.ownership_level(user) >= level
    }

    #[must_use]
    pub fn can_modify(&self, user: &User, action: Action, data: &JsonObject) -> bool {
        self.ty
            .evaluate_modify(user, action, data, self.ownership_level(user))
    }

    ///
    /// CRUD
    ///

    /// Validate, canonicalize, and store new records, returning the
    /// materialized entities. With `temporary`, persistence is skipped and
    /// detached instances are returned.
    pub async fn create_many(
        ty: &'static EntityType,
        backend: &dyn Backend,
        data: Vec<JsonObject>,
        context: OperationContext,
        user: &User,
    ) -> Result<Vec<Self>, EntityError> {
        validate_addressing(&context)?;

        let mut prepared = Vec::with_capacity(data.len());
        for datum in data {
            if !ty.evaluate_modify(user, Action::Create, &datum, OwnershipLevel::Owner) {
                return Err(EntityError::Forbidden {
                    user: user.id.clone(),
                    action: Action::Create,
                    type_name: ty.name(),
                });
            }

            // strict construction validates and canonicalizes the record
            let staged = Self::from_raw(ty, Json::Object(datum), ModelContext::default())?;
            let mut record = staged.to_object(true);
            if record.get(ID_KEY).is_none_or(Json::is_null) {
                record.insert(ID_KEY.to_string(), Json::String(Id::generate().to_string()));
            }

            prepared.push(record);
        }

        if context.options.temporary {
            return Self::materialize(ty, prepared, false);
        }

        let fallback = context.options.fallback;
        let records = backend
            .create(ty, OperationRequest::create(prepared, context), user)
            .await?;

        Self::materialize(ty, records, fallback)
    }

    /// Apply id-keyed partial updates, returning the materialized updated
    /// entities. Permission is evaluated against the current stored
    /// record of each target.
    pub async fn update_many(
        ty: &'static EntityType,
        backend: &dyn Backend,
        updates: Vec<JsonObject>,
        context: OperationContext,
        user: &User,
    ) -> Result<Vec<Self>, EntityError> {
        validate_addressing(&context)?;

        let ids = updates
            .iter()
            .map(|update| {
                update
                    .get(ID_KEY)
                    .and_then(Json::as_str)
                    .filter(|id| Id::is_valid(id))
                    .map(str::to_string)
                    .ok_or_else(|| EntityError::InvalidArgument {
                        reason: "every update must carry a valid _id".to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let existing = backend
            .get(ty, OperationRequest::ids(ids, context.clone()), user)
            .await?;
        for (record, update) in existing.iter().zip(&updates) {
            let target = Self::from_raw(ty, Json::Object(record.clone()), ModelContext::tolerant())?;
            if !target.can_modify(user, Action::Update, update) {
                return Err(EntityError::Forbidden {
                    user: user.id.clone(),
                    action: Action::Update,
                    type_name: ty.name(),
                });
            }
        }

        let fallback = context.options.fallback;
        let records = backend
            .update(ty, OperationRequest::update(updates, context), user)
            .await?;

        Self::materialize(ty, records, fallback)
    }

    /// Delete records by id, returning the ids actually removed.
    pub async fn delete_many(
        ty: &'static EntityType,
        backend: &dyn Backend,
        ids: Vec<String>,
        context: OperationContext,
        user: &User,
    ) -> Result<Vec<String>, EntityError> {
        validate_addressing(&context)?;

        for id in &ids {
            if !Id::is_valid(id) {
                return Err(EntityError::InvalidArgument {
                    reason: format!("invalid id: {id}"),
                });
            }
        }

        let existing = backend
            .get(ty, OperationRequest::ids(ids.clone(), context.clone()), user)
            .await?;
        for record in &existing {
            let target = Self::from_raw(ty, Json::Object(record.clone()), ModelContext::tolerant())?;
            if !target.can_modify(user, Action::Delete, record) {
                return Err(EntityError::Forbidden {
                    user: user.id.clone(),
                    action: Action::Delete,
                    type_name: ty.name(),
                });
            }
        }

        backend
            .delete(ty, OperationRequest::ids(ids, context), user)
            .await
            .map_err(EntityError::from)
    }

    /// Fetch entities by id. Bulk loads are tolerant: invalid stored data
    /// is repaired by fallbacks and logged rather than refused.
    pub async fn get_many(
        ty: &'static EntityType,
        backend: &dyn Backend,
        ids: Vec<String>,
        context: OperationContext,
        user: &User,
    ) -> Result<Vec<Self>, EntityError> {
        validate_addressing(&context)?;

        for id in &ids {
            if !Id::is_valid(id) {
                return Err(EntityError::InvalidArgument {
                    reason: format!("invalid id: {id}"),
                });
            }
        }

        let records = backend
            .get(ty, OperationRequest::ids(ids, context), user)
            .await?;

        Self::materialize(ty, records, true)
    }

    /// Singular convenience over [`Self::create_many`].
    pub async fn create(
        ty: &'static EntityType,
        backend: &dyn Backend,
        data: JsonObject,
        context: OperationContext,
        user: &User,
    ) -> Result<Self, EntityError> {
        Self::create_many(ty, backend, vec![data], context, user)
            .await?
            .pop()
            .ok_or_else(|| EntityError::InvalidArgument {
                reason: "backend returned no record".to_string(),
            })
    }

    /// Singular convenience over [`Self::update_many`].
    pub async fn update(
        ty: &'static EntityType,
        backend: &dyn Backend,
        update: JsonObject,
        context: OperationContext,
        user: &User,
    ) -> Result<Self, EntityError> {
        Self::update_many(ty, backend, vec![update], context, user)
            .await?
            .pop()
            .ok_or_else(|| EntityError::InvalidArgument {
                reason: "backend returned no record".to_string(),
            })
    }

    /// Singular convenience over [`Self::delete_many`].
    pub async fn delete(
        ty: &'static EntityType,
        backend: &dyn Backend,
        id: String,
        context: OperationContext,
        user: &User,
    ) -> Result<String, EntityError> {
        Self::delete_many(ty, backend, vec![id], context, user)
            .await?
            .pop()
            .ok_or_else(|| EntityError::InvalidArgument {
                reason: "backend deleted no record".to_string(),
            })
    }

    fn materialize(
        ty: &'static EntityType,
        records: Vec<JsonObject>,
        fallback: bool,
    ) -> Result<Vec<Self>, EntityError> {
        records
            .into_iter()
            .map(|record| {
                let context = if fallback {
                    ModelContext::tolerant()
                } else {
                    ModelContext::default()
                };

                Self::from_raw(ty, Json::Object(record), context).map_err(EntityError::from)
            })
            .collect()
    }
}

// parent and container address an embedded collection together or not at all
fn validate_addressing(context: &OperationContext) -> Result<(), EntityError> {
    match (&context.parent, &context.container) {
        (Some(parent), Some(_)) => {
            if Id::is_valid(&parent.id) {
                Ok(())
            } else {
                Err(EntityError::InvalidArgument {
                    reason: format!("invalid parent id: {}", parent.id),
                })
            }
        }
        (None, None) => Ok(()),
        _ => Err(EntityError::InvalidArgument {
            reason: "parent and container must be provided together".to_string(),
        }),
    }
}
