use thiserror::Error;

use crate::validation::ValidationError;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures reported by a storage backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint rejected the write.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The backend could not be reached or failed mid-operation.
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("failed to (de)serialize stored row: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Errors surfaced by the toggle and tag services.
#[derive(Error, Debug)]
pub enum ToggleError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("A toggle with name {0} already exists")]
    NameExists(String),

    #[error("An archived toggle with name {0} already exists")]
    ArchivedNameExists(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ToggleError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => ToggleError::NotFound(what),
            StoreError::AlreadyExists(what) => ToggleError::Conflict(what),
            other => ToggleError::Store(other),
        }
    }
}

pub type ToggleResult<T> = Result<T, ToggleError>;
