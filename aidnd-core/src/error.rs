//! Crate-wide error type for callers that drive several subsystems at once.

use thiserror::Error;

use crate::cache::FetchError;
use crate::catalog::CatalogError;
use crate::dice::DiceError;
use crate::encounter::CombatError;
use crate::persist::StoreError;

/// Errors surfaced to the orchestration layer.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid dice expression: {0}")]
    InvalidExpression(#[from] DiceError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Fetch failed: {0}")]
    FetchFailed(#[from] FetchError),

    #[error("Stored state is corrupt: {0}")]
    StorageCorrupt(String),

    #[error("Combat error: {0}")]
    Combat(#[from] CombatError),

    #[error("Storage error: {0}")]
    Storage(StoreError),

    #[error("Catalog error: {0}")]
    Catalog(CatalogError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => Error::NotFound(e.to_string()),
            StoreError::Corrupt { .. } => Error::StorageCorrupt(e.to_string()),
            other => Error::Storage(other),
        }
    }
}

impl From<CatalogError> for Error {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::NotFound { .. } => Error::NotFound(e.to_string()),
            other => Error::Catalog(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
