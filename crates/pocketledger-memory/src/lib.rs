//! In-memory storage backend.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    ops::Bound,
    sync::{
        atomic::{AtomicI64, Ordering},
        RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
};

use time::OffsetDateTime;

use pocketledger_core::{
    BackupSnapshot, Category, CategoryId, NewTransaction, StorageBackend, StorageError, TimeRange,
    Transaction, TransactionId, SCHEMA_VERSION,
};

#[derive(Clone, Default)]
struct LedgerState {
    transactions: BTreeMap<TransactionId, Transaction>,
    by_date: BTreeSet<(OffsetDateTime, TransactionId)>,
    categories: BTreeMap<CategoryId, Category>,
    category_index: HashMap<String, CategoryId>,
}

impl LedgerState {
    fn build(transactions: &[Transaction], categories: &[Category]) -> Result<Self, StorageError> {
        let mut state = LedgerState::default();
        for txn in transactions {
            if state.transactions.insert(txn.id, txn.clone()).is_some() {
                return Err(StorageError::DuplicateId(txn.id));
            }
            state.by_date.insert((txn.occurred_at, txn.id));
        }
        for category in categories {
            if state.category_index.contains_key(&category.name) {
                return Err(StorageError::CategoryExists(category.name.clone()));
            }
            if state.categories.insert(category.id, category.clone()).is_some() {
                return Err(StorageError::DuplicateId(category.id));
            }
            state.category_index.insert(category.name.clone(), category.id);
        }
        Ok(state)
    }
}

pub struct InMemoryStorage {
    state: RwLock<LedgerState>,
    backup: RwLock<Option<BackupSnapshot>>,
    transaction_seq: AtomicI64,
    category_seq: AtomicI64,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LedgerState::default()),
            backup: RwLock::new(None),
            transaction_seq: AtomicI64::new(1),
            category_seq: AtomicI64::new(1),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LedgerState>, StorageError> {
        self.state.read().map_err(|_| poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LedgerState>, StorageError> {
        self.state.write().map_err(|_| poisoned())
    }
}

fn poisoned() -> StorageError {
    StorageError::Unavailable("in-memory store lock poisoned".to_string())
}

impl StorageBackend for InMemoryStorage {
    fn schema_version(&self) -> Result<u32, StorageError> {
        Ok(SCHEMA_VERSION)
    }

    fn insert_transaction(&self, txn: &NewTransaction) -> Result<TransactionId, StorageError> {
        let mut state = self.write()?;
        let id = self.transaction_seq.fetch_add(1, Ordering::SeqCst);
        state.by_date.insert((txn.occurred_at, id));
        state.transactions.insert(
            id,
            Transaction {
                id,
                kind: txn.kind,
                amount: txn.amount,
                description: txn.description.clone(),
                category: txn.category.clone(),
                occurred_at: txn.occurred_at,
            },
        );
        tracing::debug!(id, "Transaction inserted");
        Ok(id)
    }

    fn delete_transaction(&self, id: TransactionId) -> Result<(), StorageError> {
        let mut state = self.write()?;
        let removed = state
            .transactions
            .remove(&id)
            .ok_or(StorageError::TransactionNotFound(id))?;
        state.by_date.remove(&(removed.occurred_at, id));
        tracing::debug!(id, "Transaction deleted");
        Ok(())
    }

    fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, StorageError> {
        Ok(self.read()?.transactions.get(&id).cloned())
    }

    fn list_transactions(&self, range: Option<TimeRange>) -> Result<Vec<Transaction>, StorageError> {
        let state = self.read()?;
        let keys: Vec<&(OffsetDateTime, TransactionId)> = match range {
            Some(range) => state
                .by_date
                .range((
                    Bound::Included((range.start, TransactionId::MIN)),
                    Bound::Excluded((range.end, TransactionId::MIN)),
                ))
                .rev()
                .collect(),
            None => state.by_date.iter().rev().collect(),
        };

        Ok(keys
            .into_iter()
            .filter_map(|(_, id)| state.transactions.get(id).cloned())
            .collect())
    }

    fn count_transactions_in_category(&self, name: &str) -> Result<usize, StorageError> {
        Ok(self
            .read()?
            .transactions
            .values()
            .filter(|t| t.category == name)
            .count())
    }

    fn insert_category(&self, name: &str) -> Result<CategoryId, StorageError> {
        let mut state = self.write()?;
        if state.category_index.contains_key(name) {
            return Err(StorageError::CategoryExists(name.to_string()));
        }
        let id = self.category_seq.fetch_add(1, Ordering::SeqCst);
        state.categories.insert(
            id,
            Category {
                id,
                name: name.to_string(),
            },
        );
        state.category_index.insert(name.to_string(), id);
        tracing::debug!(id, name, "Category inserted");
        Ok(id)
    }

    fn delete_category(&self, name: &str) -> Result<(), StorageError> {
        let mut state = self.write()?;
        let id = state
            .category_index
            .remove(name)
            .ok_or_else(|| StorageError::CategoryNotFound(name.to_string()))?;
        state.categories.remove(&id);
        tracing::debug!(id, name, "Category deleted");
        Ok(())
    }

    fn find_category(&self, name: &str) -> Result<Option<Category>, StorageError> {
        let state = self.read()?;
        Ok(state
            .category_index
            .get(name)
            .and_then(|id| state.categories.get(id))
            .cloned())
    }

    fn list_categories(&self) -> Result<Vec<Category>, StorageError> {
        Ok(self.read()?.categories.values().cloned().collect())
    }

    fn replace_all(&self, transactions: &[Transaction], categories: &[Category]) -> Result<(), StorageError> {
        let replacement = LedgerState::build(transactions, categories)?;

        let max_txn = replacement.transactions.keys().next_back().copied().unwrap_or(0);
        let max_cat = replacement.categories.keys().next_back().copied().unwrap_or(0);

        *self.write()? = replacement;
        self.transaction_seq.fetch_max(max_txn + 1, Ordering::SeqCst);
        self.category_seq.fetch_max(max_cat + 1, Ordering::SeqCst);

        tracing::debug!(
            transactions = transactions.len(),
            categories = categories.len(),
            "Store contents replaced"
        );
        Ok(())
    }

    fn save_backup(&self, snapshot: &BackupSnapshot) -> Result<(), StorageError> {
        *self.backup.write().map_err(|_| poisoned())? = Some(snapshot.clone());
        Ok(())
    }

    fn load_backup(&self) -> Result<Option<BackupSnapshot>, StorageError> {
        Ok(self.backup.read().map_err(|_| poisoned())?.clone())
    }

    fn clear_backup(&self) -> Result<(), StorageError> {
        *self.backup.write().map_err(|_| poisoned())? = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pocketledger_core::{MonthFilter, TransactionKind};
    use rust_decimal_macros::dec;
    use time::macros::datetime;

    fn expense(description: &str, category: &str, at: OffsetDateTime) -> NewTransaction {
        NewTransaction {
            kind: TransactionKind::Expense,
            amount: dec!(10),
            description: description.to_string(),
            category: category.to_string(),
            occurred_at: at,
        }
    }

    #[test]
    fn test_list_by_month_most_recent_first() {
        let storage = InMemoryStorage::new();
        storage.insert_transaction(&expense("early", "Food", datetime!(2024-03-01 00:00 UTC))).unwrap();
        storage.insert_transaction(&expense("late", "Food", datetime!(2024-03-31 23:59:59.999 UTC))).unwrap();
        storage.insert_transaction(&expense("april", "Food", datetime!(2024-04-01 00:00 UTC))).unwrap();
        storage.insert_transaction(&expense("mid", "Food", datetime!(2024-03-15 12:00 UTC))).unwrap();

        let range = MonthFilter::new(2024, 3).range();
        let listed: Vec<String> = storage
            .list_transactions(range)
            .unwrap()
            .into_iter()
            .map(|t| t.description)
            .collect();

        assert_eq!(listed, vec!["late", "mid", "early"]);
    }

    #[test]
    fn test_same_instant_ties_break_by_id() {
        let storage = InMemoryStorage::new();
        let at = datetime!(2024-03-10 10:00 UTC);
        let first = storage.insert_transaction(&expense("a", "Food", at)).unwrap();
        let second = storage.insert_transaction(&expense("b", "Food", at)).unwrap();

        let ids: Vec<TransactionId> = storage.list_transactions(None).unwrap().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![second, first]);
    }

    #[test]
    fn test_category_name_is_unique() {
        let storage = InMemoryStorage::new();
        storage.insert_category("Food").unwrap();
        assert!(matches!(
            storage.insert_category("Food"),
            Err(StorageError::CategoryExists(_))
        ));
        // Case-sensitive match.
        storage.insert_category("food").unwrap();
        assert_eq!(storage.list_categories().unwrap().len(), 2);
    }

    #[test]
    fn test_delete_missing_transaction() {
        let storage = InMemoryStorage::new();
        assert!(matches!(
            storage.delete_transaction(42),
            Err(StorageError::TransactionNotFound(42))
        ));
    }

    #[test]
    fn test_replace_all_preserves_ids_and_advances_sequence() {
        let storage = InMemoryStorage::new();
        storage.insert_category("Old").unwrap();

        let txn = Transaction {
            id: 10,
            kind: TransactionKind::Income,
            amount: dec!(100),
            description: "Salary".to_string(),
            category: "Work".to_string(),
            occurred_at: datetime!(2024-01-05 09:00 UTC),
        };
        let category = Category { id: 4, name: "Work".to_string() };
        storage.replace_all(&[txn.clone()], &[category.clone()]).unwrap();

        assert_eq!(storage.list_transactions(None).unwrap(), vec![txn]);
        assert_eq!(storage.list_categories().unwrap(), vec![category]);
        assert!(storage.find_category("Old").unwrap().is_none());

        let next = storage.insert_transaction(&expense("x", "Work", datetime!(2024-01-06 09:00 UTC))).unwrap();
        assert_eq!(next, 11);
        assert_eq!(storage.insert_category("Fun").unwrap(), 5);
    }

    #[test]
    fn test_replace_all_rejects_duplicates_without_touching_state() {
        let storage = InMemoryStorage::new();
        storage.insert_category("Keep").unwrap();

        let dupes = vec![
            Category { id: 1, name: "A".to_string() },
            Category { id: 2, name: "A".to_string() },
        ];
        assert!(storage.replace_all(&[], &dupes).is_err());
        assert!(storage.find_category("Keep").unwrap().is_some());
    }

    #[test]
    fn test_backup_slot_holds_one_snapshot() {
        let storage = InMemoryStorage::new();
        assert!(storage.load_backup().unwrap().is_none());

        let first = BackupSnapshot::new(Default::default());
        storage.save_backup(&first).unwrap();
        let second = BackupSnapshot::new(pocketledger_core::SnapshotPayload::new(
            vec![],
            vec![Category { id: 1, name: "Food".to_string() }],
        ));
        storage.save_backup(&second).unwrap();

        assert_eq!(storage.load_backup().unwrap(), Some(second));
        storage.clear_backup().unwrap();
        assert!(storage.load_backup().unwrap().is_none());
    }
}
