use std::sync::Arc;

use rust_decimal::Decimal;

use pocketledger_core::{
    Category, CategoryId, MonthFilter, NewTransaction, StorageBackend, Transaction, TransactionId,
    MAX_AMOUNT,
};

use crate::error::LedgerError;

/// Write path over a storage backend. Validation and cross-collection
/// integrity (category exists, category in use) are checked here.
pub struct RecordStore {
    storage: Arc<dyn StorageBackend>,
}

impl RecordStore {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    pub fn add_transaction(&self, input: NewTransaction) -> Result<TransactionId, LedgerError> {
        let input = validate_transaction(input)?;
        if self.storage.find_category(&input.category)?.is_none() {
            return Err(LedgerError::validation(format!(
                "unknown category: {}",
                input.category
            )));
        }
        let id = self.storage.insert_transaction(&input)?;
        tracing::info!(id, kind = %input.kind, category = %input.category, "Transaction added");
        Ok(id)
    }

    pub fn remove_transaction(&self, id: TransactionId) -> Result<(), LedgerError> {
        self.storage.delete_transaction(id)?;
        tracing::info!(id, "Transaction removed");
        Ok(())
    }

    pub fn list_transactions(&self, filter: Option<MonthFilter>) -> Result<Vec<Transaction>, LedgerError> {
        let range = match filter {
            Some(filter) => Some(filter.range().ok_or_else(|| {
                LedgerError::validation(format!("invalid month: {}-{}", filter.year, filter.month))
            })?),
            None => None,
        };
        Ok(self.storage.list_transactions(range)?)
    }

    pub fn add_category(&self, name: &str) -> Result<CategoryId, LedgerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::validation("category name must not be empty"));
        }
        let id = self.storage.insert_category(name)?;
        tracing::info!(id, name, "Category added");
        Ok(id)
    }

    pub fn remove_category(&self, name: &str) -> Result<(), LedgerError> {
        let name = name.trim();
        if self.storage.find_category(name)?.is_none() {
            return Err(LedgerError::NotFound(format!("category {}", name)));
        }
        let in_use = self.storage.count_transactions_in_category(name)?;
        if in_use > 0 {
            return Err(LedgerError::Conflict(format!(
                "category {} is used by {} transaction(s)",
                name, in_use
            )));
        }
        self.storage.delete_category(name)?;
        tracing::info!(name, "Category removed");
        Ok(())
    }

    pub fn list_categories(&self) -> Result<Vec<Category>, LedgerError> {
        Ok(self.storage.list_categories()?)
    }

    /// Inserts `names` into an empty store. Returns how many were created.
    pub fn seed_default_categories(&self, names: &[String]) -> Result<usize, LedgerError> {
        if !self.storage.list_categories()?.is_empty()
            || !self.storage.list_transactions(None)?.is_empty()
        {
            return Ok(0);
        }

        let mut created = 0;
        for name in names {
            match self.add_category(name) {
                Ok(_) => created += 1,
                // duplicates or blanks in the configured list
                Err(LedgerError::Conflict(_)) | Err(LedgerError::Validation(_)) => {
                    tracing::debug!(name = %name, "Skipping default category");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(created)
    }

    /// Removes every transaction, category and the backup slot.
    pub fn reset(&self) -> Result<(), LedgerError> {
        self.storage.replace_all(&[], &[])?;
        self.storage.clear_backup()?;
        tracing::info!("Ledger reset");
        Ok(())
    }
}

pub fn validate_transaction(input: NewTransaction) -> Result<NewTransaction, LedgerError> {
    if input.amount <= Decimal::ZERO {
        return Err(LedgerError::validation("amount must be greater than zero"));
    }
    if input.amount > MAX_AMOUNT {
        return Err(LedgerError::validation(format!("amount must not exceed {}", MAX_AMOUNT)));
    }
    let description = input.description.trim();
    if description.is_empty() {
        return Err(LedgerError::validation("description must not be empty"));
    }
    let category = input.category.trim();
    if category.is_empty() {
        return Err(LedgerError::validation("category must not be empty"));
    }
    Ok(NewTransaction {
        description: description.to_string(),
        category: category.to_string(),
        ..input
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pocketledger_core::TransactionKind;
    use pocketledger_memory::InMemoryStorage;
    use rust_decimal_macros::dec;
    use time::macros::datetime;

    fn store() -> RecordStore {
        RecordStore::new(Arc::new(InMemoryStorage::new()))
    }

    fn input(amount: Decimal, description: &str, category: &str) -> NewTransaction {
        NewTransaction {
            kind: TransactionKind::Expense,
            amount,
            description: description.to_string(),
            category: category.to_string(),
            occurred_at: datetime!(2024-06-15 12:00 UTC),
        }
    }

    #[test]
    fn test_add_and_list_by_month() {
        let store = store();
        store.add_category("Food").unwrap();
        let id = store.add_transaction(input(dec!(9.9), "Lunch", "Food")).unwrap();

        let listed = store.list_transactions(Some(MonthFilter::new(2024, 6))).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
        assert!(store.list_transactions(Some(MonthFilter::new(2024, 7))).unwrap().is_empty());
    }

    #[test]
    fn test_transaction_validation() {
        let store = store();
        store.add_category("Food").unwrap();

        for bad in [
            input(dec!(0), "Lunch", "Food"),
            input(dec!(-5), "Lunch", "Food"),
            input(dec!(5), "   ", "Food"),
            input(dec!(5), "Lunch", ""),
            input(dec!(5), "Lunch", "Unknown"),
        ] {
            assert!(matches!(store.add_transaction(bad), Err(LedgerError::Validation(_))));
        }
        assert!(store.list_transactions(None).unwrap().is_empty());
    }

    #[test]
    fn test_amount_upper_bound() {
        let store = store();
        store.add_category("Food").unwrap();

        store.add_transaction(input(MAX_AMOUNT, "House", "Food")).unwrap();
        assert!(matches!(
            store.add_transaction(input(MAX_AMOUNT + dec!(0.01), "House", "Food")),
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            store.add_transaction(input(Decimal::MAX, "House", "Food")),
            Err(LedgerError::Validation(_))
        ));
        assert_eq!(store.list_transactions(None).unwrap().len(), 1);
    }

    #[test]
    fn test_remove_category_trims_name() {
        let store = store();
        store.add_category(" Food ").unwrap();
        store.remove_category("  Food\t").unwrap();
        assert!(store.list_categories().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_month_filter() {
        let store = store();
        assert!(matches!(
            store.list_transactions(Some(MonthFilter::new(2024, 13))),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn test_remove_missing_transaction_is_not_found() {
        let store = store();
        assert!(matches!(store.remove_transaction(99), Err(LedgerError::NotFound(_))));
    }

    #[test]
    fn test_category_rules() {
        let store = store();
        assert!(matches!(store.add_category("  "), Err(LedgerError::Validation(_))));

        store.add_category("  Food ").unwrap();
        assert!(matches!(store.add_category("Food"), Err(LedgerError::Conflict(_))));
        assert_eq!(store.list_categories().unwrap()[0].name, "Food");

        let id = store.add_transaction(input(dec!(3), "Snack", "Food")).unwrap();
        assert!(matches!(store.remove_category("Food"), Err(LedgerError::Conflict(_))));

        store.remove_transaction(id).unwrap();
        store.remove_category("Food").unwrap();
        assert!(store.list_categories().unwrap().is_empty());
        assert!(matches!(store.remove_category("Food"), Err(LedgerError::NotFound(_))));
    }

    #[test]
    fn test_seed_only_when_empty() {
        let store = store();
        let names = vec!["Food".to_string(), "Bus".to_string(), "Food".to_string()];
        assert_eq!(store.seed_default_categories(&names).unwrap(), 2);
        assert_eq!(store.seed_default_categories(&names).unwrap(), 0);
        assert_eq!(store.list_categories().unwrap().len(), 2);
    }

    #[test]
    fn test_reset() {
        let store = store();
        store.add_category("Food").unwrap();
        store.add_transaction(input(dec!(3), "Snack", "Food")).unwrap();
        store.reset().unwrap();
        assert!(store.list_categories().unwrap().is_empty());
        assert!(store.list_transactions(None).unwrap().is_empty());
    }
}
