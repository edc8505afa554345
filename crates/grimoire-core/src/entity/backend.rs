use crate::{entity::EntityType, entity::ownership::User, types::JsonObject};
use async_trait::async_trait;
use thiserror::Error as ThisError;

///
/// BackendError
///

#[derive(Debug, ThisError)]
pub enum BackendError {
    #[error("{type_name} [{id}] not found")]
    NotFound { type_name: String, id: String },

    #[error("request rejected: {reason}")]
    Rejected { reason: String },

    #[error("storage failure: {message}")]
    Storage { message: String },
}

///
/// OperationOptions
///
/// The option set recognized across backend operations. Merge policies
/// flow through to update application; `render` is transport plumbing for
/// presentation layers and is not interpreted here.
///

#[derive(Clone, Copy, Debug)]
pub struct OperationOptions {
    pub insert_keys: bool,
    pub insert_values: bool,
    pub overwrite: bool,
    pub recursive: bool,
    pub diff: bool,
    pub render: bool,
    pub temporary: bool,
    pub fallback: bool,
}

impl Default for OperationOptions {
    fn default() -> Self {
        Self {
            insert_keys: true,
            insert_values: true,
            overwrite: true,
            recursive: true,
            diff: true,
            render: true,
            temporary: false,
            fallback: false,
        }
    }
}

///
/// ParentRef
///
/// Addressing for embedded operations: the owning entity by type and id.
///

#[derive(Clone, Debug)]
pub struct ParentRef {
    pub type_name: String,
    pub id: String,
}

///
/// OperationContext
///
/// Caller-facing request context: options plus optional parent/container
/// addressing for embedded children.
///

#[derive(Clone, Debug, Default)]
pub struct OperationContext {
    pub options: OperationOptions,
    pub parent: Option<ParentRef>,
    pub container: Option<String>,
}

///
/// OperationRequest
///
/// The wire shape handed to a backend: exactly one of `data` (create),
/// `updates` (update), or `ids` (get/delete) is populated, plus options
/// and addressing. Backends dispatch to primary- or embedded-specific
/// handling based on `parent`.
///

#[derive(Clone, Debug, Default)]
pub struct OperationRequest {
    pub data: Vec<JsonObject>,
    pub updates: Vec<JsonObject>,
    pub ids: Vec<String>,
    pub options: OperationOptions,
    pub parent: Option<ParentRef>,
    pub container: Option<String>,
}

impl OperationRequest {
    #[must_use]
    pub fn create(data: Vec<JsonObject>, context: OperationContext) -> Self {
        Self {
            data,
            options: context.options,
            parent: context.parent,
            container: context.container,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn update(updates: Vec<JsonObject>, context: OperationContext) -> Self {
        Self {
            updates,
            options: context.options,
            parent: context.parent,
            container: context.container,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn ids(ids: Vec<String>, context: OperationContext) -> Self {
        Self {
            ids,
            options: context.options,
            parent: context.parent,
            container: context.container,
            ..Self::default()
        }
    }
}

///
/// Backend
///
/// The abstract persistence boundary. Implementations own storage
/// mechanics and return raw materialized records; the substrate never
/// interprets how they are stored. These calls are the only suspension
/// points in the system.
///

#[async_trait]
pub trait Backend: Send + Sync {
    /// Fetch records by id (all records of the type when `ids` is empty).
    async fn get(
        &self,
        ty: &'static EntityType,
        request: OperationRequest,
        user: &User,
    ) -> Result<Vec<JsonObject>, BackendError>;

    /// Store new records, returning them as persisted.
    async fn create(
        &self,
        ty: &'static EntityType,
        request: OperationRequest,
        user: &User,
    ) -> Result<Vec<JsonObject>, BackendError>;

    /// Apply updates keyed by id, returning the full updated records.
    async fn update(
        &self,
        ty: &'static EntityType,
        request: OperationRequest,
        user: &User,
    ) -> Result<Vec<JsonObject>, BackendError>;

    /// Delete records by id, returning the ids actually removed.
    async fn delete(
        &self,
        ty: &'static EntityType,
        request: OperationRequest,
        user: &User,
    ) -> Result<Vec<String>, BackendError>;
}
