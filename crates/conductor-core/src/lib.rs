//! # conductor-core
//!
//! Core types, traits, and abstractions for the conductor ingestion
//! pipeline.
//!
//! This crate provides the foundational data structures and trait
//! definitions that other conductor crates depend on: the ledger state
//! machine, job descriptors, format detection, rollout flags, and the
//! capability interface extraction services are invoked through.

pub mod defaults;
pub mod error;
pub mod flags;
pub mod format;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use flags::{variant, FlagSet, FlagState};
pub use format::detect;
pub use models::*;
pub use traits::{Capability, LedgerRepository};
