use std::path::PathBuf;

use clap::{Args, Subcommand};
use rust_decimal::Decimal;
use time::{
    format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime,
};

use pocketledger_core::{MonthFilter, NewTransaction, TransactionId, TransactionKind};

use crate::error::LedgerError;
use crate::ledger::Ledger;
use crate::report;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Record an income or expense
    Add(AddArgs),

    /// Delete a transaction by id
    Remove(RemoveArgs),

    /// List transactions, most recent first
    List(PeriodArgs),

    /// Manage categories
    Categories {
        #[command(subcommand)]
        action: CategoryCommand,
    },

    /// Show the balance of a month
    Balance(PeriodArgs),

    /// Expenses by category and the yearly series
    Report(ReportArgs),

    /// Write the latest snapshot to a JSON file
    Export(ExportArgs),

    /// Replace all data with the contents of a JSON file
    Import(ImportArgs),

    /// Delete every transaction, category and the local backup
    Reset(ConfirmArgs),

    /// Synchronize with the remote copy
    Sync {
        #[command(subcommand)]
        action: SyncCommand,
    },
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// income (receita) or expense (despesa)
    pub kind: TransactionKind,

    /// Positive amount, e.g. 12.50
    pub amount: Decimal,

    pub description: String,

    #[arg(short, long)]
    pub category: String,

    /// YYYY-MM-DD or an RFC 3339 timestamp (defaults to now)
    #[arg(short, long, value_parser = parse_occurred_at)]
    pub date: Option<OffsetDateTime>,
}

#[derive(Args, Debug)]
pub struct RemoveArgs {
    pub id: TransactionId,

    /// Confirm the deletion
    #[arg(long, default_value_t = false)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct PeriodArgs {
    /// Month as YYYY-MM (defaults to the current month)
    #[arg(short, long, value_parser = parse_month)]
    pub month: Option<MonthFilter>,

    /// Ignore the month and include everything
    #[arg(long, default_value_t = false, conflicts_with = "month")]
    pub all: bool,
}

#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Month for the category breakdown, as YYYY-MM (defaults to the current month)
    #[arg(short, long, value_parser = parse_month)]
    pub month: Option<MonthFilter>,

    /// Year for the monthly series (defaults to the current year)
    #[arg(short, long)]
    pub year: Option<i32>,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Output file (defaults to cfp-dados-YYYY-MM-DD.json)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    pub file: PathBuf,

    /// Confirm replacing all local data
    #[arg(long, default_value_t = false)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct ConfirmArgs {
    #[arg(long, default_value_t = false)]
    pub yes: bool,
}

#[derive(Subcommand, Debug)]
pub enum CategoryCommand {
    /// List categories by name
    List,
    /// Create a category
    Add { name: String },
    /// Delete an unused category
    Remove {
        name: String,
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum SyncCommand {
    /// Upload the latest snapshot and wait for the result
    Push,
    /// Replace local data with the remote copy
    Pull {
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

pub async fn run(ledger: &Ledger, command: Command) -> Result<(), LedgerError> {
    match command {
        Command::Add(args) => {
            let id = ledger.add_transaction(NewTransaction {
                kind: args.kind,
                amount: args.amount,
                description: args.description,
                category: args.category,
                occurred_at: args.date.unwrap_or_else(OffsetDateTime::now_utc),
            })?;
            println!("Added transaction {}", id);
        }
        Command::Remove(args) => {
            confirm(args.yes, "remove a transaction")?;
            ledger.remove_transaction(args.id)?;
            println!("Removed transaction {}", args.id);
        }
        Command::List(args) => {
            let transactions = ledger.list_transactions(args.filter())?;
            if transactions.is_empty() {
                println!("No transactions.");
            } else {
                print!("{}", report::transactions_table(&transactions));
            }
        }
        Command::Categories { action } => match action {
            CategoryCommand::List => {
                print!("{}", report::categories_table(&ledger.list_categories()?));
            }
            CategoryCommand::Add { name } => {
                let id = ledger.add_category(&name)?;
                println!("Added category {} ({})", name.trim(), id);
            }
            CategoryCommand::Remove { name, yes } => {
                confirm(yes, "remove a category")?;
                ledger.remove_category(&name)?;
                println!("Removed category {}", name);
            }
        },
        Command::Balance(args) => match args.filter() {
            Some(filter) => {
                let balance = ledger.month_balance(filter.year, filter.month)?;
                println!(
                    "Balance {}-{:02}: {}",
                    filter.year,
                    filter.month,
                    crate::aggregation::format_amount(balance)
                );
            }
            None => {
                let transactions = ledger.list_transactions(None)?;
                let balance = crate::aggregation::period_balance(&transactions);
                println!("Balance: {}", crate::aggregation::format_amount(balance));
            }
        },
        Command::Report(args) => {
            let month = args.month.unwrap_or_else(current_month);
            let year = args.year.unwrap_or(month.year);

            let expenses = ledger.month_expenses_by_category(month.year, month.month)?;
            println!("Expenses {}-{:02}", month.year, month.month);
            print!("{}", report::expenses_table(&expenses));

            let series = ledger.year_series(year)?;
            println!("Year {}", year);
            print!("{}", report::series_table(&series));
            println!(
                "Year balance: {}",
                crate::aggregation::format_amount(ledger.year_balance(year)?)
            );
        }
        Command::Export(args) => {
            let path = args.output.unwrap_or_else(default_export_path);
            let json = ledger.export_json()?;
            std::fs::write(&path, json)?;
            println!("Exported to {}", path.display());
        }
        Command::Import(args) => {
            confirm(args.yes, "replace all local data")?;
            let json = std::fs::read_to_string(&args.file)?;
            ledger.import_json(&json)?;
            println!("Imported {}", args.file.display());
        }
        Command::Reset(args) => {
            confirm(args.yes, "delete all local data")?;
            ledger.reset()?;
            println!("Ledger reset");
        }
        Command::Sync { action } => match action {
            SyncCommand::Push => {
                ledger.push_now().await?;
                println!("Pushed to remote");
            }
            SyncCommand::Pull { yes } => {
                confirm(yes, "replace local data with the remote copy")?;
                let payload = ledger.refresh_from_remote().await?;
                println!(
                    "Pulled {} transaction(s) and {} category(ies)",
                    payload.transactions.len(),
                    payload.categories.len()
                );
            }
        },
    }
    Ok(())
}

impl PeriodArgs {
    fn filter(&self) -> Option<MonthFilter> {
        if self.all {
            None
        } else {
            Some(self.month.unwrap_or_else(current_month))
        }
    }
}

fn confirm(yes: bool, action: &str) -> Result<(), LedgerError> {
    if yes {
        Ok(())
    } else {
        Err(LedgerError::validation(format!("pass --yes to {}", action)))
    }
}

fn current_month() -> MonthFilter {
    let now = OffsetDateTime::now_utc();
    MonthFilter::new(now.year(), u8::from(now.month()))
}

pub fn default_export_path() -> PathBuf {
    let today = OffsetDateTime::now_utc().date();
    PathBuf::from(export_file_name(today))
}

pub fn export_file_name(date: Date) -> String {
    let format = format_description!("[year]-[month]-[day]");
    let stamp = date.format(format).unwrap_or_else(|_| date.to_string());
    format!("cfp-dados-{}.json", stamp)
}

pub fn parse_month(s: &str) -> Result<MonthFilter, String> {
    let (year, month) = s
        .split_once('-')
        .ok_or_else(|| format!("expected YYYY-MM, got '{}'", s))?;
    let year: i32 = year.parse().map_err(|_| format!("invalid year in '{}'", s))?;
    let month: u8 = month.parse().map_err(|_| format!("invalid month in '{}'", s))?;
    let filter = MonthFilter::new(year, month);
    filter
        .range()
        .map(|_| filter)
        .ok_or_else(|| format!("month out of range in '{}'", s))
}

/// Date-only input is taken as midnight UTC.
pub fn parse_occurred_at(s: &str) -> Result<OffsetDateTime, String> {
    if let Ok(at) = OffsetDateTime::parse(s, &Rfc3339) {
        return Ok(at);
    }
    let format = format_description!("[year]-[month]-[day]");
    Date::parse(s, format)
        .map(|d| d.midnight().assume_utc())
        .map_err(|_| format!("expected YYYY-MM-DD or RFC 3339, got '{}'", s))
}
