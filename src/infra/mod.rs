//! Infrastructure adapters for queues, mailboxes, and storage backends.

pub mod ledger;
pub mod mailbox;
pub mod queue;
pub mod store;

pub use ledger::JsonlLedgerStore;
pub use mailbox::InMemoryMailbox;
pub use queue::RunQueue;
pub use store::{MemorySession, MemoryStore};
