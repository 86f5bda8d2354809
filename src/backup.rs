//! Backup snapshot manager.
//!
//! The store's full contents are mirrored into a single durable backup slot
//! after every mutation. Reads go through an in-memory copy of the latest
//! snapshot, which is dropped before each write and refilled afterwards.

use std::{
    collections::HashSet,
    sync::{Arc, RwLock},
};

use rust_decimal::Decimal;

use pocketledger_core::{BackupSnapshot, SnapshotPayload, StorageBackend, MAX_AMOUNT};

use crate::error::LedgerError;

pub struct BackupManager {
    storage: Arc<dyn StorageBackend>,
    cache: RwLock<Option<Arc<BackupSnapshot>>>,
}

impl BackupManager {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            storage,
            cache: RwLock::new(None),
        }
    }

    /// Reads both collections and overwrites the backup slot with them.
    pub fn capture_snapshot(&self) -> Result<Arc<BackupSnapshot>, LedgerError> {
        self.invalidate()?;

        let payload = SnapshotPayload::new(
            self.storage.list_transactions(None)?,
            self.storage.list_categories()?,
        );
        let snapshot = BackupSnapshot::new(payload);
        self.storage.save_backup(&snapshot)?;

        let snapshot = Arc::new(snapshot);
        *self.cache_write()? = Some(snapshot.clone());
        tracing::info!(
            transactions = snapshot.payload.transactions.len(),
            categories = snapshot.payload.categories.len(),
            "Snapshot captured"
        );
        Ok(snapshot)
    }

    /// Latest snapshot, from the cache when warm, otherwise from the backup slot.
    pub fn latest_snapshot(&self) -> Result<Option<Arc<BackupSnapshot>>, LedgerError> {
        if let Some(snapshot) = self.cache_read()?.as_ref() {
            return Ok(Some(snapshot.clone()));
        }

        let loaded = self.storage.load_backup()?.map(Arc::new);
        if let Some(snapshot) = &loaded {
            *self.cache_write()? = Some(snapshot.clone());
        }
        Ok(loaded)
    }

    /// Replaces the store's contents with the latest snapshot, if there is one.
    /// Returns whether a snapshot was applied.
    pub fn restore_from_snapshot(&self) -> Result<bool, LedgerError> {
        match self.latest_snapshot()? {
            Some(snapshot) => {
                self.replace_store(&snapshot.payload)?;
                tracing::info!(
                    created_at = %snapshot.created_at,
                    transactions = snapshot.payload.transactions.len(),
                    categories = snapshot.payload.categories.len(),
                    "Store restored from snapshot"
                );
                Ok(true)
            }
            None => {
                tracing::debug!("No snapshot to restore");
                Ok(false)
            }
        }
    }

    pub fn export_snapshot(&self) -> Result<SnapshotPayload, LedgerError> {
        self.latest_snapshot()?
            .map(|snapshot| snapshot.payload.clone())
            .ok_or_else(|| LedgerError::NotFound("no snapshot available".to_string()))
    }

    pub fn export_json(&self) -> Result<String, LedgerError> {
        self.export_snapshot()?
            .to_json_pretty()
            .map_err(|e| LedgerError::Storage(e.into()))
    }

    /// Replaces the store with `payload` (ids preserved) and captures a new snapshot.
    pub fn import_snapshot(&self, payload: &SnapshotPayload) -> Result<Arc<BackupSnapshot>, LedgerError> {
        validate_payload(payload)?;
        self.replace_store(payload)?;
        tracing::info!(
            transactions = payload.transactions.len(),
            categories = payload.categories.len(),
            "Snapshot imported"
        );
        self.capture_snapshot()
    }

    pub fn import_json(&self, json: &str) -> Result<Arc<BackupSnapshot>, LedgerError> {
        let payload = SnapshotPayload::from_json(json)
            .map_err(|e| LedgerError::validation(format!("invalid snapshot document: {}", e)))?;
        self.import_snapshot(&payload)
    }

    /// Drops the cached snapshot so the next read goes to the backup slot.
    pub fn invalidate(&self) -> Result<(), LedgerError> {
        *self.cache_write()? = None;
        Ok(())
    }

    fn replace_store(&self, payload: &SnapshotPayload) -> Result<(), LedgerError> {
        self.storage
            .replace_all(&payload.transactions, &payload.categories)?;
        Ok(())
    }

    fn cache_read(&self) -> Result<std::sync::RwLockReadGuard<'_, Option<Arc<BackupSnapshot>>>, LedgerError> {
        self.cache
            .read()
            .map_err(|_| LedgerError::StorageUnavailable("snapshot cache lock poisoned".to_string()))
    }

    fn cache_write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Option<Arc<BackupSnapshot>>>, LedgerError> {
        self.cache
            .write()
            .map_err(|_| LedgerError::StorageUnavailable("snapshot cache lock poisoned".to_string()))
    }
}

/// Checks a snapshot document before it replaces the store.
pub fn validate_payload(payload: &SnapshotPayload) -> Result<(), LedgerError> {
    let mut ids = HashSet::new();
    for txn in &payload.transactions {
        if !ids.insert(txn.id) {
            return Err(LedgerError::validation(format!("duplicate transaction id {}", txn.id)));
        }
        if txn.amount <= Decimal::ZERO {
            return Err(LedgerError::validation(format!(
                "transaction {} has a non-positive amount",
                txn.id
            )));
        }
        if txn.amount > MAX_AMOUNT {
            return Err(LedgerError::validation(format!(
                "transaction {} exceeds the maximum amount {}",
                txn.id, MAX_AMOUNT
            )));
        }
        if txn.description.trim().is_empty() || txn.category.trim().is_empty() {
            return Err(LedgerError::validation(format!(
                "transaction {} is missing a description or category",
                txn.id
            )));
        }
    }

    let mut ids = HashSet::new();
    let mut names = HashSet::new();
    for category in &payload.categories {
        if !ids.insert(category.id) {
            return Err(LedgerError::validation(format!("duplicate category id {}", category.id)));
        }
        if category.name.trim().is_empty() {
            return Err(LedgerError::validation("category name must not be empty"));
        }
        if !names.insert(category.name.as_str()) {
            return Err(LedgerError::validation(format!("duplicate category {}", category.name)));
        }
    }
    Ok(())
}
