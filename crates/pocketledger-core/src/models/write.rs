use rust_decimal::Decimal;
use time::OffsetDateTime;

use super::TransactionKind;

#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub description: String,
    pub category: String,
    pub occurred_at: OffsetDateTime,
}
