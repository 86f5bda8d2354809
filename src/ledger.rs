use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;
use tokio::runtime::Handle;

use pocketledger_core::{
    BackupSnapshot, Category, CategoryId, MonthFilter, NewTransaction, SnapshotPayload,
    StorageBackend, TimeRange, Transaction, TransactionId,
};
use pocketledger_memory::InMemoryStorage;
use pocketledger_sqlite::SqliteStorage;

use crate::aggregation::{self, MonthlySeries};
use crate::backup::BackupManager;
use crate::config::{Config, StorageKind};
use crate::error::LedgerError;
use crate::record_store::RecordStore;
use crate::session::{Identity, Session};
use crate::sync::{PushQueue, RemoteError, RemoteSync};

/// Entry point for collaborators: record CRUD, queries, export/import and sync.
///
/// Every mutation is followed by a snapshot capture and, when a remote and an
/// identity are available, a background push of that snapshot. Pushes run
/// one at a time and only the newest pending snapshot is sent.
pub struct Ledger {
    records: RecordStore,
    backups: BackupManager,
    remote: Option<Arc<RemoteSync>>,
    session: Session,
    pushes: Mutex<Option<PushQueue>>,
}

impl Ledger {
    pub fn new(storage: Arc<dyn StorageBackend>, remote: Option<RemoteSync>, session: Session) -> Self {
        Self {
            records: RecordStore::new(storage.clone()),
            backups: BackupManager::new(storage),
            remote: remote.map(Arc::new),
            session,
            pushes: Mutex::new(None),
        }
    }

    /// Opens the configured backend and runs the startup restore.
    pub fn open(config: &Config, session: Session) -> Result<Self, LedgerError> {
        let storage: Arc<dyn StorageBackend> = match config.storage.backend {
            StorageKind::Sqlite => {
                let storage = SqliteStorage::new(&config.storage.path).map_err(|e| {
                    LedgerError::StorageUnavailable(format!("{}: {}", config.storage.path, e))
                })?;
                Arc::new(storage)
            }
            StorageKind::Memory => Arc::new(InMemoryStorage::new()),
        };
        tracing::info!(backend = ?config.storage.backend, path = %config.storage.path, "Storage opened");

        let remote = if config.remote.enabled {
            match RemoteSync::from_config(&config.remote) {
                Ok(remote) => Some(remote),
                Err(e) => {
                    tracing::warn!(error = %e, "Remote sync disabled");
                    None
                }
            }
        } else {
            None
        };

        let ledger = Self::new(storage, remote, session);
        ledger.start(&config.storage.default_categories)?;
        Ok(ledger)
    }

    /// Local snapshot first. An empty ledger without a snapshot gets the
    /// default categories and an initial snapshot.
    pub fn start(&self, default_categories: &[String]) -> Result<(), LedgerError> {
        if self.backups.restore_from_snapshot()? {
            return Ok(());
        }
        let seeded = self.records.seed_default_categories(default_categories)?;
        if seeded > 0 {
            tracing::info!(seeded, "Default categories created");
        }
        self.backups.capture_snapshot()?;
        Ok(())
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn add_transaction(&self, input: NewTransaction) -> Result<TransactionId, LedgerError> {
        let id = self.records.add_transaction(input)?;
        self.after_mutation()?;
        Ok(id)
    }

    pub fn remove_transaction(&self, id: TransactionId) -> Result<(), LedgerError> {
        self.records.remove_transaction(id)?;
        self.after_mutation()
    }

    pub fn list_transactions(&self, filter: Option<MonthFilter>) -> Result<Vec<Transaction>, LedgerError> {
        self.records.list_transactions(filter)
    }

    pub fn add_category(&self, name: &str) -> Result<CategoryId, LedgerError> {
        let id = self.records.add_category(name)?;
        self.after_mutation()?;
        Ok(id)
    }

    pub fn remove_category(&self, name: &str) -> Result<(), LedgerError> {
        self.records.remove_category(name)?;
        self.after_mutation()
    }

    pub fn list_categories(&self) -> Result<Vec<Category>, LedgerError> {
        self.records.list_categories()
    }

    pub fn month_balance(&self, year: i32, month: u8) -> Result<Decimal, LedgerError> {
        let transactions = self.list_transactions(Some(MonthFilter::new(year, month)))?;
        Ok(aggregation::period_balance(&transactions))
    }

    pub fn month_expenses_by_category(
        &self,
        year: i32,
        month: u8,
    ) -> Result<BTreeMap<String, Decimal>, LedgerError> {
        let transactions = self.list_transactions(Some(MonthFilter::new(year, month)))?;
        Ok(aggregation::expenses_by_category(&transactions))
    }

    pub fn year_series(&self, year: i32) -> Result<MonthlySeries, LedgerError> {
        let transactions = self.transactions_in_year(year)?;
        Ok(aggregation::monthly_series(&transactions, year))
    }

    pub fn year_balance(&self, year: i32) -> Result<Decimal, LedgerError> {
        let transactions = self.transactions_in_year(year)?;
        Ok(aggregation::year_to_date_balance(&transactions, year))
    }

    pub fn export_snapshot(&self) -> Result<SnapshotPayload, LedgerError> {
        self.backups.export_snapshot()
    }

    pub fn export_json(&self) -> Result<String, LedgerError> {
        self.backups.export_json()
    }

    pub fn import_snapshot(&self, payload: &SnapshotPayload) -> Result<(), LedgerError> {
        let snapshot = self.backups.import_snapshot(payload)?;
        self.schedule_push(&snapshot);
        Ok(())
    }

    pub fn import_json(&self, json: &str) -> Result<(), LedgerError> {
        let snapshot = self.backups.import_json(json)?;
        self.schedule_push(&snapshot);
        Ok(())
    }

    /// Clears both collections and the backup slot. The remote copy is left alone.
    pub fn reset(&self) -> Result<(), LedgerError> {
        self.records.reset()?;
        self.backups.invalidate()
    }

    /// Replaces local data with the identity's remote document. On failure the
    /// local data is untouched.
    pub async fn refresh_from_remote(&self) -> Result<SnapshotPayload, LedgerError> {
        let (remote, identity) = self.remote_target()?;
        let payload = remote.pull(identity).await?;
        let snapshot = self.backups.import_snapshot(&payload)?;
        Ok(snapshot.payload.clone())
    }

    /// Pushes the latest snapshot and waits for the result.
    pub async fn push_now(&self) -> Result<(), LedgerError> {
        let (remote, identity) = self.remote_target()?;
        let snapshot = match self.backups.latest_snapshot()? {
            Some(snapshot) => snapshot,
            None => self.backups.capture_snapshot()?,
        };
        remote.try_push(identity, &snapshot.payload).await?;
        Ok(())
    }

    /// Waits until snapshots queued by earlier mutations have been pushed.
    pub async fn flush_pending_sync(&self) {
        let flush = match self.pushes.lock() {
            Ok(pushes) => pushes.as_ref().map(PushQueue::flush),
            Err(_) => {
                tracing::warn!("Push queue lock poisoned");
                return;
            }
        };
        if let Some(flush) = flush {
            flush.await;
        }
    }

    fn after_mutation(&self) -> Result<(), LedgerError> {
        let snapshot = self.backups.capture_snapshot()?;
        self.schedule_push(&snapshot);
        Ok(())
    }

    fn schedule_push(&self, snapshot: &Arc<BackupSnapshot>) {
        let (remote, identity) = match (&self.remote, self.session.identity()) {
            (Some(remote), Some(identity)) => (remote, identity),
            _ => return,
        };
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::debug!("No async runtime, skipping remote push");
                return;
            }
        };

        let mut pushes = match self.pushes.lock() {
            Ok(pushes) => pushes,
            Err(_) => {
                tracing::warn!("Push queue lock poisoned, skipping remote push");
                return;
            }
        };
        if pushes.as_ref().map_or(true, PushQueue::is_closed) {
            *pushes = Some(PushQueue::spawn(remote.clone(), identity.clone(), &handle));
        }
        if let Some(queue) = pushes.as_ref() {
            queue.enqueue(snapshot.clone());
        }
    }

    fn remote_target(&self) -> Result<(&RemoteSync, &Identity), LedgerError> {
        let remote = self.remote.as_deref().ok_or_else(|| {
            RemoteError::NotConfigured("remote sync is disabled".to_string())
        })?;
        let identity = self
            .session
            .identity()
            .ok_or_else(|| RemoteError::NotConfigured("no identity logged in".to_string()))?;
        Ok((remote, identity))
    }

    fn transactions_in_year(&self, year: i32) -> Result<Vec<Transaction>, LedgerError> {
        let range = TimeRange::year(year)
            .ok_or_else(|| LedgerError::validation(format!("invalid year: {}", year)))?;
        Ok(self.records.storage().list_transactions(Some(range))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pocketledger_core::TransactionKind;
    use rust_decimal_macros::dec;
    use time::macros::datetime;

    fn ledger() -> (Arc<InMemoryStorage>, Ledger) {
        let storage = Arc::new(InMemoryStorage::new());
        let ledger = Ledger::new(storage.clone(), None, Session::anonymous());
        (storage, ledger)
    }

    fn expense(amount: Decimal, category: &str, at: time::OffsetDateTime) -> NewTransaction {
        NewTransaction {
            kind: TransactionKind::Expense,
            amount,
            description: "test".to_string(),
            category: category.to_string(),
            occurred_at: at,
        }
    }

    #[test]
    fn test_start_seeds_defaults_once() {
        let (storage, ledger) = ledger();
        let defaults = vec!["Food".to_string(), "Bus".to_string()];

        ledger.start(&defaults).unwrap();
        assert_eq!(ledger.list_categories().unwrap().len(), 2);
        assert!(storage.load_backup().unwrap().is_some());

        ledger.remove_category("Bus").unwrap();
        ledger.start(&defaults).unwrap();
        assert_eq!(ledger.list_categories().unwrap().len(), 1);
    }

    #[test]
    fn test_mutations_capture_snapshots() {
        let (storage, ledger) = ledger();
        ledger.add_category("Food").unwrap();
        let id = ledger
            .add_transaction(expense(dec!(8), "Food", datetime!(2024-03-01 09:00 UTC)))
            .unwrap();

        let backup = storage.load_backup().unwrap().unwrap();
        assert_eq!(backup.payload.transactions[0].id, id);

        ledger.remove_transaction(id).unwrap();
        assert!(storage.load_backup().unwrap().unwrap().payload.transactions.is_empty());
    }

    #[test]
    fn test_failed_mutation_keeps_snapshot() {
        let (storage, ledger) = ledger();
        ledger.add_category("Food").unwrap();
        let before = storage.load_backup().unwrap().unwrap();

        assert!(ledger.add_category("Food").is_err());
        assert_eq!(storage.load_backup().unwrap().unwrap(), before);
    }

    #[test]
    fn test_queries() {
        let (_, ledger) = ledger();
        ledger.add_category("Food").unwrap();
        ledger.add_category("Work").unwrap();
        ledger
            .add_transaction(NewTransaction {
                kind: TransactionKind::Income,
                amount: dec!(200),
                description: "Salary".to_string(),
                category: "Work".to_string(),
                occurred_at: datetime!(2024-03-05 09:00 UTC),
            })
            .unwrap();
        ledger
            .add_transaction(expense(dec!(50), "Food", datetime!(2024-03-10 09:00 UTC)))
            .unwrap();
        ledger
            .add_transaction(expense(dec!(20), "Food", datetime!(2024-04-10 09:00 UTC)))
            .unwrap();

        assert_eq!(ledger.month_balance(2024, 3).unwrap(), dec!(150));
        assert_eq!(ledger.month_expenses_by_category(2024, 4).unwrap()["Food"], dec!(20));
        assert_eq!(ledger.year_balance(2024).unwrap(), dec!(130));
        assert_eq!(ledger.year_series(2024).unwrap().cumulative[11], dec!(130));
    }

    #[test]
    fn test_reset_clears_backup() {
        let (storage, ledger) = ledger();
        ledger.add_category("Food").unwrap();
        ledger.reset().unwrap();

        assert!(ledger.list_categories().unwrap().is_empty());
        assert!(storage.load_backup().unwrap().is_none());
        assert!(matches!(ledger.export_snapshot(), Err(LedgerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_remote_operations_need_configuration() {
        let (_, ledger) = ledger();
        assert!(matches!(
            ledger.refresh_from_remote().await,
            Err(LedgerError::RemoteUnavailable(RemoteError::NotConfigured(_)))
        ));
        assert!(matches!(
            ledger.push_now().await,
            Err(LedgerError::RemoteUnavailable(RemoteError::NotConfigured(_)))
        ));
    }
}
