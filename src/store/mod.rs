//! Local persistence

mod ledger;

pub use ledger::{LedgerStore, SqliteLedgerStore};
