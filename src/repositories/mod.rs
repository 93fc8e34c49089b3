pub mod memory_store;
pub mod pg_store;
pub mod store;

// Re-export the store contract and its implementations
pub use memory_store::{MemoryLedgerStore, MemoryLedgerTransaction, TableCounts};
pub use pg_store::{PgLedgerStore, PgLedgerTransaction};
pub use store::{LedgerStore, LedgerTransaction};
