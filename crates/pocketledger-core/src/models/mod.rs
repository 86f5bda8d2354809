use std::{fmt::Display, str::FromStr};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub mod period;
pub mod snapshot;
pub mod write;

pub use period::{MonthFilter, TimeRange};
pub use snapshot::{BackupSnapshot, SnapshotPayload};
pub use write::NewTransaction;

pub type TransactionId = i64;
pub type CategoryId = i64;

/// Largest accepted transaction amount (one trillion). Sums over any
/// realistic number of records stay far below `Decimal::MAX`.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xD4A5_1000, 0xE8, 0, false, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    #[serde(rename = "Receita")]
    Income,
    #[serde(rename = "Despesa")]
    Expense,
}

impl TransactionKind {
    /// Contribution of an amount of this kind to a balance.
    pub fn signed(&self, amount: Decimal) -> Decimal {
        match self {
            TransactionKind::Income => amount,
            TransactionKind::Expense => -amount,
        }
    }
}

impl Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionKind::Income => f.write_str("Income"),
            TransactionKind::Expense => f.write_str("Expense"),
        }
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "income" | "receita" => Ok(TransactionKind::Income),
            "expense" | "despesa" => Ok(TransactionKind::Expense),
            other => Err(format!("unknown transaction kind: {}", other)),
        }
    }
}

/// A recorded income or expense entry.
///
/// Field names on the wire follow the portable snapshot document
/// (`tipo`, `valor`, `descricao`, `categoria`, `data`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    #[serde(rename = "tipo")]
    pub kind: TransactionKind,
    #[serde(rename = "valor", with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(rename = "descricao")]
    pub description: String,
    #[serde(rename = "categoria")]
    pub category: String,
    #[serde(rename = "data", with = "time::serde::rfc3339")]
    pub occurred_at: OffsetDateTime,
}

impl Transaction {
    pub fn signed_amount(&self) -> Decimal {
        self.kind.signed(self.amount)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    #[serde(rename = "categoria")]
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use time::macros::datetime;

    #[test]
    fn test_transaction_wire_names() {
        let txn = Transaction {
            id: 7,
            kind: TransactionKind::Expense,
            amount: dec!(12.5),
            description: "Lunch".to_string(),
            category: "Food".to_string(),
            occurred_at: datetime!(2024-03-05 12:00 UTC),
        };

        let json = serde_json::to_value(&txn).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["tipo"], "Despesa");
        assert_eq!(json["valor"], 12.5);
        assert_eq!(json["descricao"], "Lunch");
        assert_eq!(json["categoria"], "Food");
        assert_eq!(json["data"], "2024-03-05T12:00:00Z");
    }

    #[test]
    fn test_transaction_accepts_browser_timestamps_and_integer_amounts() {
        let txn: Transaction = serde_json::from_str(
            r#"{"id":1,"tipo":"Receita","valor":100,"descricao":"Salary","categoria":"Work","data":"2024-01-31T23:59:59.999Z"}"#,
        )
        .unwrap();

        assert_eq!(txn.kind, TransactionKind::Income);
        assert_eq!(txn.amount, dec!(100));
        assert_eq!(txn.occurred_at, datetime!(2024-01-31 23:59:59.999 UTC));
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("Income".parse::<TransactionKind>().unwrap(), TransactionKind::Income);
        assert_eq!("despesa".parse::<TransactionKind>().unwrap(), TransactionKind::Expense);
        assert!("transfer".parse::<TransactionKind>().is_err());
    }

    #[test]
    fn test_max_amount_is_one_trillion() {
        assert_eq!(MAX_AMOUNT, Decimal::new(1_000_000_000_000, 0));
    }

    #[test]
    fn test_signed_amount() {
        assert_eq!(TransactionKind::Income.signed(dec!(10)), dec!(10));
        assert_eq!(TransactionKind::Expense.signed(dec!(10)), dec!(-10));
    }
}
