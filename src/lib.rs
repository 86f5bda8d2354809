pub mod aggregation;
pub mod backup;
pub mod cli;
pub mod config;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod record_store;
pub mod report;
pub mod session;
pub mod sync;

pub use error::LedgerError;
pub use ledger::Ledger;
pub use session::{Identity, Session};
