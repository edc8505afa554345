use crate::{
    entity::{BackendError, EntityError},
    model::{ModelError, RegistryError, SourceError},
    patch::PatchError,
    schema::{SchemaError, ValidationFailure},
    types::IdError,
};
use thiserror::Error as ThisError;

///
/// Error
///
/// Crate-level aggregation of every module error surface.
///

#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Entity(#[from] EntityError),

    #[error(transparent)]
    Id(#[from] IdError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Validation(#[from] ValidationFailure),
}
