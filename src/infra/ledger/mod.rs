//! Ledger store backends.

pub mod jsonl;

pub use jsonl::JsonlLedgerStore;
