//! # conductor-db
//!
//! SQLite ledger layer for conductor.
//!
//! This crate provides:
//! - Connection pool management (WAL mode, busy-timeout tuning)
//! - The durable, hash-keyed [`ledger::SqliteLedgerRepository`]
//!
//! The ledger is the safety net against data loss: entries are created
//! on first sighting of a content hash and never deleted. All mutations
//! go through single-row compare-and-swap so concurrent workers racing
//! on the same hash converge to one consistent entry.
//!
//! ## Example
//!
//! ```rust,ignore
//! use conductor_db::Database;
//! use conductor_core::{LedgerRepository, LedgerState};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::open("data/ledger.db").await?;
//!     let queued = db.ledger.list_by_state(LedgerState::Queued).await?;
//!     println!("{} queued documents", queued.len());
//!     Ok(())
//! }
//! ```

pub mod ledger;
pub mod pool;

use std::path::Path;
use std::sync::Arc;

pub use ledger::SqliteLedgerRepository;
pub use pool::{create_memory_pool, create_pool, PoolConfig};

// Re-export core types
pub use conductor_core::*;

/// Database facade bundling the repositories.
#[derive(Clone)]
pub struct Database {
    /// Document lifecycle ledger.
    pub ledger: Arc<SqliteLedgerRepository>,
}

impl Database {
    /// Open the ledger database at the given path, creating the file and
    /// schema if missing.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let pool = create_pool(path, PoolConfig::default()).await?;
        let ledger = SqliteLedgerRepository::new(pool);
        ledger.init_schema().await?;
        Ok(Self {
            ledger: Arc::new(ledger),
        })
    }

    /// Open an in-memory database (tests).
    pub async fn open_in_memory() -> Result<Self> {
        let pool = create_memory_pool().await?;
        let ledger = SqliteLedgerRepository::new(pool);
        ledger.init_schema().await?;
        Ok(Self {
            ledger: Arc::new(ledger),
        })
    }
}
