//! Core types and traits for PocketLedger storage backends.
//!
//! This crate provides the `StorageBackend` trait and all associated types,
//! enabling pluggable storage implementations in separate crates.

pub mod models;
pub mod storage;

// Re-export key types at crate root for convenience
pub use models::{
    BackupSnapshot, Category, CategoryId, MonthFilter, NewTransaction, SnapshotPayload,
    Transaction, TransactionId, TransactionKind, TimeRange, MAX_AMOUNT,
};
pub use storage::{StorageBackend, StorageError, SCHEMA_VERSION};
