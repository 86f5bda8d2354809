//! Balance and chart series derived from a list of transactions.
//!
//! Everything here is pure: no storage access, exact decimal arithmetic.
//! Rounding to two places only happens in [`format_amount`].

use std::collections::BTreeMap;

use rust_decimal::{Decimal, RoundingStrategy};
use time::{OffsetDateTime, UtcOffset};

use pocketledger_core::{TimeRange, Transaction, TransactionKind};

/// Income minus expenses.
pub fn period_balance(transactions: &[Transaction]) -> Decimal {
    transactions.iter().map(Transaction::signed_amount).sum()
}

/// Expense totals per category. Categories without expenses are absent.
pub fn expenses_by_category(transactions: &[Transaction]) -> BTreeMap<String, Decimal> {
    let mut totals: BTreeMap<String, Decimal> = BTreeMap::new();
    for txn in transactions.iter().filter(|t| t.kind == TransactionKind::Expense) {
        *totals.entry(txn.category.clone()).or_insert(Decimal::ZERO) += txn.amount;
    }
    totals
}

/// Per-month totals for one year, indexed by month - 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthlySeries {
    pub year: i32,
    pub income: [Decimal; 12],
    pub expenses: [Decimal; 12],
    pub cumulative: [Decimal; 12],
}

impl MonthlySeries {
    pub fn net(&self, month_index: usize) -> Decimal {
        self.income[month_index] - self.expenses[month_index]
    }
}

pub fn monthly_series(transactions: &[Transaction], year: i32) -> MonthlySeries {
    let mut income = [Decimal::ZERO; 12];
    let mut expenses = [Decimal::ZERO; 12];

    for txn in transactions {
        let at = utc(txn.occurred_at);
        if at.year() != year {
            continue;
        }
        let index = u8::from(at.month()) as usize - 1;
        match txn.kind {
            TransactionKind::Income => income[index] += txn.amount,
            TransactionKind::Expense => expenses[index] += txn.amount,
        }
    }

    let mut cumulative = [Decimal::ZERO; 12];
    let mut running = Decimal::ZERO;
    for month in 0..12 {
        running += income[month] - expenses[month];
        cumulative[month] = running;
    }

    MonthlySeries {
        year,
        income,
        expenses,
        cumulative,
    }
}

/// Balance of every transaction from Jan 1 through the last instant of Dec 31.
pub fn year_to_date_balance(transactions: &[Transaction], year: i32) -> Decimal {
    let range = match TimeRange::year(year) {
        Some(range) => range,
        None => return Decimal::ZERO,
    };
    transactions
        .iter()
        .filter(|t| range.contains(t.occurred_at))
        .map(Transaction::signed_amount)
        .sum()
}

/// Fixed display format: `R$ 1234.50`.
pub fn format_amount(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("R$ {:.2}", rounded)
}

fn utc(ts: OffsetDateTime) -> OffsetDateTime {
    ts.to_offset(UtcOffset::UTC)
}
