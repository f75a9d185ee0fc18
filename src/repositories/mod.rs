pub mod ledger_store;
pub mod memory_store;
pub mod postgres_store;

pub use ledger_store::{CompletionEffects, CompletionOutcome, DirectoryStore, LedgerStore};
pub use memory_store::InMemoryStore;
pub use postgres_store::PgStore;
