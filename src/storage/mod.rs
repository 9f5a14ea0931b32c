//! Storage backends
//!
//! The event log and the gravity graph live behind traits so the aggregator
//! and ranker can be tested without a database file. The primary
//! implementation is `SqliteStore`, which holds both in one database.

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{
    BatchCommit, EventLog, GravityStore, MergeOutcome, OpenStore, StorageError, StorageResult,
};
