//! Unitwork Ledger
//!
//! Double-entry ledger whose transfers are staged per unit of work and only
//! applied to balances when the unit commits.

pub mod account;
pub mod engine;
pub mod journal;

pub use account::{Account, AccountId, AccountStatus};
pub use engine::{LedgerConfig, LedgerEngine, LedgerUnit};
pub use journal::{EntryType, JournalBatch, JournalEntry};
