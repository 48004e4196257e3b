//! Storage error types.

use stashsort_core::{ContainerKind, GridError};
use stashsort_protocol::ProtocolError;
use thiserror::Error;

/// Errors from the snapshot layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("character not found: {0}")]
    CharacterNotFound(u64),

    #[error("character {character} has no {container}")]
    ContainerNotFound {
        character: u64,
        container: ContainerKind,
    },

    #[error("no active character")]
    NoActiveCharacter,

    #[error("invalid item catalog: {0}")]
    Catalog(String),

    #[error("grid error: {0}")]
    Grid(#[from] GridError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl StorageError {
    /// Returns whether the error means the data simply is not there yet
    /// (nothing captured), as opposed to a failure reading it.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::CharacterNotFound(_)
                | StorageError::ContainerNotFound { .. }
                | StorageError::NoActiveCharacter
        )
    }
}
