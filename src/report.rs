//! Plain-text tables for the CLI.

use std::collections::BTreeMap;

use prettytable::{row, Table};
use rust_decimal::Decimal;
use time::{format_description::FormatItem, macros::format_description};

use pocketledger_core::{Category, Transaction};

use crate::aggregation::{format_amount, MonthlySeries};

const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day] [hour]:[minute]");

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

pub fn transactions_table(transactions: &[Transaction]) -> String {
    let mut table = Table::new();
    table.add_row(row!["Id", "Date", "Kind", "Category", "Description", "Amount"]);
    table.add_empty_row();

    for txn in transactions {
        let date = txn
            .occurred_at
            .format(DATE_FORMAT)
            .unwrap_or_else(|_| txn.occurred_at.to_string());
        table.add_row(row![
            txn.id,
            date,
            txn.kind,
            txn.category,
            txn.description,
            format_amount(txn.signed_amount())
        ]);
    }

    format!("\n{}\n", table)
}

pub fn categories_table(categories: &[Category]) -> String {
    let mut sorted: Vec<&Category> = categories.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut table = Table::new();
    table.add_row(row!["Id", "Category"]);
    table.add_empty_row();
    for category in sorted {
        table.add_row(row![category.id, category.name]);
    }

    format!("\n{}\n", table)
}

pub fn expenses_table(totals: &BTreeMap<String, Decimal>) -> String {
    let mut table = Table::new();
    table.add_row(row!["Category", "Expenses"]);
    table.add_empty_row();
    for (category, amount) in totals {
        table.add_row(row![category, format_amount(*amount)]);
    }
    let total: Decimal = totals.values().copied().sum();
    table.add_empty_row();
    table.add_row(row!["Total", format_amount(total)]);

    format!("\n{}\n", table)
}

pub fn series_table(series: &MonthlySeries) -> String {
    let mut table = Table::new();
    table.add_row(row!["Month", "Income", "Expenses", "Net", "Cumulative"]);
    table.add_empty_row();
    for (index, month) in MONTHS.iter().enumerate() {
        table.add_row(row![
            format!("{} {}", month, series.year),
            format_amount(series.income[index]),
            format_amount(series.expenses[index]),
            format_amount(series.net(index)),
            format_amount(series.cumulative[index])
        ]);
    }

    format!("\n{}\n", table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::monthly_series;
    use pocketledger_core::TransactionKind;
    use rust_decimal_macros::dec;
    use time::macros::datetime;

    #[test]
    fn test_transactions_table_shows_signed_amounts() {
        let txns = vec![Transaction {
            id: 7,
            kind: TransactionKind::Expense,
            amount: dec!(12.5),
            description: "Cinema".to_string(),
            category: "Lazer".to_string(),
            occurred_at: datetime!(2024-02-10 20:30 UTC),
        }];
        let rendered = transactions_table(&txns);
        assert!(rendered.contains("2024-02-10 20:30"));
        assert!(rendered.contains("R$ -12.50"));
        assert!(rendered.contains("Cinema"));
    }

    #[test]
    fn test_categories_table_is_sorted() {
        let categories = vec![
            Category { id: 1, name: "Transporte".to_string() },
            Category { id: 2, name: "Alimentação".to_string() },
        ];
        let rendered = categories_table(&categories);
        let first = rendered.find("Alimentação").unwrap();
        let second = rendered.find("Transporte").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_expenses_table_total() {
        let mut totals = BTreeMap::new();
        totals.insert("Food".to_string(), dec!(10));
        totals.insert("Bus".to_string(), dec!(2.25));
        assert!(expenses_table(&totals).contains("R$ 12.25"));
    }

    #[test]
    fn test_series_table_has_every_month() {
        let rendered = series_table(&monthly_series(&[], 2024));
        for month in MONTHS {
            assert!(rendered.contains(&format!("{} 2024", month)));
        }
    }
}
