//! SQLite storage backend.
//!
//! Schema changes are applied as numbered migrations tracked in
//! `PRAGMA user_version`. Every migration only creates what is missing, so
//! upgrading an older database keeps its rows and indexes.

use std::{
    str::FromStr,
    sync::{Mutex, MutexGuard},
};

use rust_decimal::Decimal;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use pocketledger_core::{
    BackupSnapshot, Category, CategoryId, NewTransaction, SnapshotPayload, StorageBackend,
    StorageError, TimeRange, Transaction, TransactionId, TransactionKind, SCHEMA_VERSION,
};

const MIGRATIONS: [&str; 2] = [
    // 1: records
    "
    CREATE TABLE IF NOT EXISTS transactions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        kind TEXT NOT NULL,
        amount TEXT NOT NULL,
        description TEXT NOT NULL,
        category TEXT NOT NULL,
        occurred_at TEXT NOT NULL,
        occurred_at_ns INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_transactions_occurred_at
        ON transactions(occurred_at_ns);

    CREATE INDEX IF NOT EXISTS idx_transactions_category
        ON transactions(category);

    CREATE TABLE IF NOT EXISTS categories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_categories_name
        ON categories(name);
    ",
    // 2: backup slot
    "
    CREATE TABLE IF NOT EXISTS backups (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        created_at TEXT NOT NULL,
        payload TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_backups_created_at
        ON backups(created_at);
    ",
];

pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn new(path: &str) -> Result<Self, StorageError> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            let conn = Connection::open(path)
                .map_err(|e| StorageError::Unavailable(e.to_string()))?;
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))
                .map(|_| conn)
        }
        .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        Self::from_connection(conn)
    }

    /// Wraps an open connection, upgrading its schema to `SCHEMA_VERSION`.
    pub fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.upgrade_schema(SCHEMA_VERSION)?;
        Ok(storage)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Unavailable("sqlite connection lock poisoned".to_string()))
    }

    fn upgrade_schema(&self, target: u32) -> Result<(), StorageError> {
        let mut conn = self.lock()?;
        let current: u32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        if current > target {
            return Err(StorageError::Unavailable(format!(
                "database schema version {} is newer than supported version {}",
                current, target
            )));
        }
        if current == target {
            return Ok(());
        }

        let tx = conn
            .transaction()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        for (index, migration) in MIGRATIONS
            .iter()
            .enumerate()
            .take(target as usize)
            .skip(current as usize)
        {
            tx.execute_batch(migration)
                .map_err(|e| StorageError::Unavailable(e.to_string()))?;
            tracing::info!(version = index + 1, "Applied schema migration");
        }
        tx.pragma_update(None, "user_version", target)
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        tx.commit()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(())
    }
}

fn other(e: rusqlite::Error) -> StorageError {
    StorageError::Other(e.to_string())
}

fn is_constraint_violation(e: &rusqlite::Error, extended_code: i32) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == ErrorCode::ConstraintViolation && err.extended_code == extended_code
    )
}

fn kind_to_str(kind: TransactionKind) -> &'static str {
    match kind {
        TransactionKind::Income => "INCOME",
        TransactionKind::Expense => "EXPENSE",
    }
}

fn str_to_kind(s: &str) -> Result<TransactionKind, StorageError> {
    match s {
        "INCOME" => Ok(TransactionKind::Income),
        "EXPENSE" => Ok(TransactionKind::Expense),
        _ => Err(StorageError::Other(format!("invalid transaction kind: {}", s))),
    }
}

fn timestamp_to_str(ts: OffsetDateTime) -> Result<String, StorageError> {
    ts.format(&Rfc3339)
        .map_err(|e| StorageError::Other(format!("invalid timestamp: {}", e)))
}

fn str_to_timestamp(s: &str) -> Result<OffsetDateTime, StorageError> {
    OffsetDateTime::parse(s, &Rfc3339)
        .map_err(|e| StorageError::Other(format!("invalid timestamp {}: {}", s, e)))
}

/// Index key for the date index. Instants outside the i64 nanosecond range are clamped.
fn timestamp_key(ts: OffsetDateTime) -> i64 {
    let nanos = ts.unix_timestamp_nanos();
    i64::try_from(nanos).unwrap_or(if nanos < 0 { i64::MIN } else { i64::MAX })
}

type TransactionRow = (i64, String, String, String, String, String);

fn transaction_from_row(row: TransactionRow) -> Result<Transaction, StorageError> {
    let (id, kind, amount, description, category, occurred_at) = row;
    Ok(Transaction {
        id,
        kind: str_to_kind(&kind)?,
        amount: Decimal::from_str(&amount)
            .map_err(|e| StorageError::Other(format!("Invalid decimal: {}", e)))?,
        description,
        category,
        occurred_at: str_to_timestamp(&occurred_at)?,
    })
}

fn map_transaction_row(row: &rusqlite::Row) -> rusqlite::Result<TransactionRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

const SELECT_TRANSACTIONS: &str =
    "SELECT id, kind, amount, description, category, occurred_at FROM transactions";

impl StorageBackend for SqliteStorage {
    fn schema_version(&self) -> Result<u32, StorageError> {
        let conn = self.lock()?;
        conn.query_row("PRAGMA user_version", [], |row| row.get(0))
            .map_err(other)
    }

    fn insert_transaction(&self, txn: &NewTransaction) -> Result<TransactionId, StorageError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO transactions (kind, amount, description, category, occurred_at, occurred_at_ns)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                kind_to_str(txn.kind),
                txn.amount.to_string(),
                txn.description,
                txn.category,
                timestamp_to_str(txn.occurred_at)?,
                timestamp_key(txn.occurred_at)
            ],
        )
        .map_err(other)?;
        let id = conn.last_insert_rowid();
        tracing::debug!(id, "Transaction inserted");
        Ok(id)
    }

    fn delete_transaction(&self, id: TransactionId) -> Result<(), StorageError> {
        let conn = self.lock()?;
        let deleted = conn
            .execute("DELETE FROM transactions WHERE id = ?1", params![id])
            .map_err(other)?;
        if deleted == 0 {
            return Err(StorageError::TransactionNotFound(id));
        }
        tracing::debug!(id, "Transaction deleted");
        Ok(())
    }

    fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, StorageError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_TRANSACTIONS),
                params![id],
                map_transaction_row,
            )
            .optional()
            .map_err(other)?;
        row.map(transaction_from_row).transpose()
    }

    fn list_transactions(&self, range: Option<TimeRange>) -> Result<Vec<Transaction>, StorageError> {
        let conn = self.lock()?;
        let rows: Vec<TransactionRow> = match range {
            Some(range) => {
                let mut stmt = conn
                    .prepare(&format!(
                        "{} WHERE occurred_at_ns >= ?1 AND occurred_at_ns < ?2
                         ORDER BY occurred_at_ns DESC, id DESC",
                        SELECT_TRANSACTIONS
                    ))
                    .map_err(other)?;
                let rows = stmt
                    .query_map(
                        params![timestamp_key(range.start), timestamp_key(range.end)],
                        map_transaction_row,
                    )
                    .map_err(other)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(other)?;
                rows
            }
            None => {
                let mut stmt = conn
                    .prepare(&format!(
                        "{} ORDER BY occurred_at_ns DESC, id DESC",
                        SELECT_TRANSACTIONS
                    ))
                    .map_err(other)?;
                let rows = stmt
                    .query_map([], map_transaction_row)
                    .map_err(other)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(other)?;
                rows
            }
        };

        rows.into_iter().map(transaction_from_row).collect()
    }

    fn count_transactions_in_category(&self, name: &str) -> Result<usize, StorageError> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM transactions WHERE category = ?1",
                params![name],
                |row| row.get(0),
            )
            .map_err(other)?;
        Ok(count.max(0) as usize)
    }

    fn insert_category(&self, name: &str) -> Result<CategoryId, StorageError> {
        let conn = self.lock()?;
        conn.execute("INSERT INTO categories (name) VALUES (?1)", params![name])
            .map_err(|e| {
                if is_constraint_violation(&e, rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE) {
                    StorageError::CategoryExists(name.to_string())
                } else {
                    other(e)
                }
            })?;
        let id = conn.last_insert_rowid();
        tracing::debug!(id, name, "Category inserted");
        Ok(id)
    }

    fn delete_category(&self, name: &str) -> Result<(), StorageError> {
        let conn = self.lock()?;
        let deleted = conn
            .execute("DELETE FROM categories WHERE name = ?1", params![name])
            .map_err(other)?;
        if deleted == 0 {
            return Err(StorageError::CategoryNotFound(name.to_string()));
        }
        tracing::debug!(name, "Category deleted");
        Ok(())
    }

    fn find_category(&self, name: &str) -> Result<Option<Category>, StorageError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, name FROM categories WHERE name = ?1",
            params![name],
            |row| {
                Ok(Category {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )
        .optional()
        .map_err(other)
    }

    fn list_categories(&self) -> Result<Vec<Category>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, name FROM categories ORDER BY id")
            .map_err(other)?;
        let categories = stmt
            .query_map([], |row| {
                Ok(Category {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })
            .map_err(other)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(other)?;
        Ok(categories)
    }

    fn replace_all(&self, transactions: &[Transaction], categories: &[Category]) -> Result<(), StorageError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(other)?;

        tx.execute_batch("DELETE FROM transactions; DELETE FROM categories;")
            .map_err(other)?;

        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO transactions (id, kind, amount, description, category, occurred_at, occurred_at_ns)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )
                .map_err(other)?;
            for txn in transactions {
                stmt.execute(params![
                    txn.id,
                    kind_to_str(txn.kind),
                    txn.amount.to_string(),
                    txn.description,
                    txn.category,
                    timestamp_to_str(txn.occurred_at)?,
                    timestamp_key(txn.occurred_at)
                ])
                .map_err(|e| {
                    if is_constraint_violation(&e, rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY) {
                        StorageError::DuplicateId(txn.id)
                    } else {
                        other(e)
                    }
                })?;
            }

            let mut stmt = tx
                .prepare_cached("INSERT INTO categories (id, name) VALUES (?1, ?2)")
                .map_err(other)?;
            for category in categories {
                stmt.execute(params![category.id, category.name])
                    .map_err(|e| {
                        if is_constraint_violation(&e, rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY) {
                            StorageError::DuplicateId(category.id)
                        } else if is_constraint_violation(&e, rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE) {
                            StorageError::CategoryExists(category.name.clone())
                        } else {
                            other(e)
                        }
                    })?;
            }
        }

        tx.commit().map_err(other)?;
        tracing::debug!(
            transactions = transactions.len(),
            categories = categories.len(),
            "Store contents replaced"
        );
        Ok(())
    }

    fn save_backup(&self, snapshot: &BackupSnapshot) -> Result<(), StorageError> {
        let payload = serde_json::to_string(&snapshot.payload)?;
        let created_at = timestamp_to_str(snapshot.created_at)?;

        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(other)?;
        tx.execute("DELETE FROM backups", []).map_err(other)?;
        tx.execute(
            "INSERT INTO backups (created_at, payload) VALUES (?1, ?2)",
            params![created_at, payload],
        )
        .map_err(other)?;
        tx.commit().map_err(other)?;
        Ok(())
    }

    fn load_backup(&self) -> Result<Option<BackupSnapshot>, StorageError> {
        let conn = self.lock()?;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT created_at, payload FROM backups ORDER BY created_at DESC, id DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(other)?;

        match row {
            Some((created_at, payload)) => Ok(Some(BackupSnapshot {
                created_at: str_to_timestamp(&created_at)?,
                payload: serde_json::from_str::<SnapshotPayload>(&payload)?,
            })),
            None => Ok(None),
        }
    }

    fn clear_backup(&self) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM backups", []).map_err(other)?;
        Ok(())
    }
}
