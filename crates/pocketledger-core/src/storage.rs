use crate::models::{
    BackupSnapshot, Category, CategoryId, NewTransaction, TimeRange, Transaction, TransactionId,
};

use thiserror::Error;

/// Current schema version. Version 1 holds transactions and categories,
/// version 2 adds the backup slot.
pub const SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{0}")]
    Other(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("category already exists: {0}")]
    CategoryExists(String),
    #[error("category not found: {0}")]
    CategoryNotFound(String),
    #[error("transaction not found: {0}")]
    TransactionNotFound(TransactionId),
    #[error("duplicate id: {0}")]
    DuplicateId(i64),
}

/// Raw record storage. Integrity rules that span collections (category in use,
/// category exists) are enforced by callers, not by implementations.
pub trait StorageBackend: Send + Sync {
    fn schema_version(&self) -> Result<u32, StorageError>;

    fn insert_transaction(&self, txn: &NewTransaction) -> Result<TransactionId, StorageError>;
    fn delete_transaction(&self, id: TransactionId) -> Result<(), StorageError>;
    fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, StorageError>;
    /// Transactions inside `range` (all when `None`), most recent first, ties by id descending.
    fn list_transactions(&self, range: Option<TimeRange>) -> Result<Vec<Transaction>, StorageError>;
    fn count_transactions_in_category(&self, name: &str) -> Result<usize, StorageError>;

    fn insert_category(&self, name: &str) -> Result<CategoryId, StorageError>;
    fn delete_category(&self, name: &str) -> Result<(), StorageError>;
    fn find_category(&self, name: &str) -> Result<Option<Category>, StorageError>;
    fn list_categories(&self) -> Result<Vec<Category>, StorageError>;

    /// Clears both collections and inserts the given records with their ids.
    /// Either everything is replaced or nothing is.
    fn replace_all(&self, transactions: &[Transaction], categories: &[Category]) -> Result<(), StorageError>;

    /// Overwrites the single backup slot.
    fn save_backup(&self, snapshot: &BackupSnapshot) -> Result<(), StorageError>;
    fn load_backup(&self) -> Result<Option<BackupSnapshot>, StorageError>;
    fn clear_backup(&self) -> Result<(), StorageError>;
}
