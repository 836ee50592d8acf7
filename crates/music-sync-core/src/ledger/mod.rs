pub mod models;
pub mod queries;
pub mod sqlite;

pub use models::{LedgerSummary, ProcessingRecord};
pub use sqlite::Ledger;
