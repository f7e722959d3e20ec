//! # conductor-jobs
//!
//! Routing, scheduling, and worker pool for the conductor ingestion
//! pipeline.
//!
//! This crate provides:
//! - Format routing with magic-byte detection and per-deployment
//!   capability chains
//! - A three-lane priority queue broker with bounded strict priority
//! - An orchestrator that claims inbox files atomically, tracks leases,
//!   and requeues orphaned jobs with backoff
//! - A worker pool executing capability chains with per-call timeouts
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use conductor_db::Database;
//! use conductor_jobs::{
//!     CapabilityRegistry, ChainTable, FormatRouter, Orchestrator,
//!     OrchestratorConfig, StorageLayout, TextNativeAdapter, WorkerConfig,
//!     WorkerPool,
//! };
//! use conductor_core::{FlagSet, FlagState};
//!
//! let db = Database::open("data/ledger.db").await?;
//! let layout = StorageLayout::from_env();
//! layout.ensure_dirs().await?;
//!
//! let flags = FlagSet::new().with("magic_detection", FlagState::on());
//! let router = FormatRouter::new(ChainTable::default(), flags);
//! let orchestrator = Arc::new(Orchestrator::new(
//!     db.clone(), router, layout, OrchestratorConfig::from_env(),
//! ));
//!
//! let mut registry = CapabilityRegistry::new();
//! registry.register(Arc::new(TextNativeAdapter));
//!
//! let pool = WorkerPool::new(
//!     orchestrator.clone(), db, Arc::new(registry), WorkerConfig::from_env(),
//! );
//! let handle = pool.start();
//! let _sweeper = orchestrator.clone().start_sweeper();
//! orchestrator.scan_inbox().await?;
//! ```

pub mod adapters;
pub mod broker;
pub mod capability;
pub mod content_store;
pub mod hash;
pub mod orchestrator;
pub mod relocate;
pub mod router;
pub mod worker;

// Re-export core types
pub use conductor_core::*;

// Re-export the main surface
pub use adapters::{
    GenericTextAdapter, OcrAdapter, StructuredDocAdapter, TextNativeAdapter, TranscribeAdapter,
};
pub use broker::QueueBroker;
pub use capability::CapabilityRegistry;
pub use content_store::{ContentStore, StoredContent};
pub use hash::{hash_bytes, hash_file};
pub use orchestrator::{
    IngestOutcome, Orchestrator, OrchestratorConfig, StorageLayout,
};
pub use router::{
    assign_lane, assign_lane_default, score_priority, ChainTable, FormatRouter,
    FLAG_MAGIC_DETECTION,
};
pub use worker::{WorkerConfig, WorkerEvent, WorkerHandle, WorkerPool};
