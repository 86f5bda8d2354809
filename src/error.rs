use pocketledger_core::StorageError;
use thiserror::Error;

use crate::sync::RemoteError;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("could not reach remote: {0}")]
    RemoteUnavailable(#[from] RemoteError),
    #[error("storage error: {0}")]
    Storage(StorageError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    pub fn validation(message: impl Into<String>) -> Self {
        LedgerError::Validation(message.into())
    }
}

impl From<StorageError> for LedgerError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::CategoryExists(name) => {
                LedgerError::Conflict(format!("category already exists: {}", name))
            }
            StorageError::DuplicateId(id) => LedgerError::Conflict(format!("duplicate id: {}", id)),
            StorageError::CategoryNotFound(name) => {
                LedgerError::NotFound(format!("category {}", name))
            }
            StorageError::TransactionNotFound(id) => {
                LedgerError::NotFound(format!("transaction {}", id))
            }
            StorageError::Unavailable(message) => LedgerError::StorageUnavailable(message),
            other => LedgerError::Storage(other),
        }
    }
}
