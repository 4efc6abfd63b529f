//! Persistence Adapters - JSONL Account Journals
//!
//! Implements the LedgerStore port with one append-only JSONL file per
//! account plus an in-memory view guarded by per-account locks.
//! Partial trailing lines left by a crash are repaired on start-up.

pub mod journal;
pub mod journal_ledger;

pub use journal::{AccountJournal, LedgerEvent};
pub use journal_ledger::{JournalLedger, LedgerSettings};
