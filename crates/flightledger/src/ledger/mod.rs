//! Append-only, hash-chained chain-of-custody ledger.
//!
//! Each record is one line of JSON. Every record carries the digest of the
//! exact bytes of the record before it, so editing, removing or reordering
//! any record other than the last is detected by [`audit`].

pub mod audit;
pub mod entry;
pub mod store;
pub mod writer;

pub use audit::{audit, AuditReport};
pub use entry::{record_digest, Action, LedgerEntry, GENESIS, NO_EVIDENCE, SYSTEM_ACTOR};
pub use store::{FileStore, LedgerStore, MemoryStore};
pub use writer::ChainWriter;
