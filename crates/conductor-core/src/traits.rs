//! Trait definitions at the seams between conductor crates.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::models::{
    CapabilityKind, ExtractionOutput, LedgerEntry, LedgerPatch, LedgerState,
};
use crate::Result;

/// An extraction capability: OCR, transcription, structured parsing and
/// friends live behind this interface. The worker only decides *which*
/// capability to invoke, in what order, and with what timeout, never
/// how extraction works.
///
/// Implementations must convert every internal failure into an `Err`;
/// there are no catch-and-ignore paths. Transient errors (service
/// unavailable, timeout) let the worker fall through to the next chain
/// position; [`crate::Error::CorruptContent`] aborts the chain and
/// quarantines the file.
#[async_trait]
pub trait Capability: Send + Sync {
    /// The capability identifier this implementation handles.
    fn kind(&self) -> CapabilityKind;

    /// Extract content from raw file data.
    async fn execute(
        &self,
        data: &[u8],
        filename: &str,
        mime_type: &str,
        config: &JsonValue,
    ) -> Result<ExtractionOutput>;

    /// Check if the capability's external dependencies are reachable.
    async fn health_check(&self) -> Result<bool>;

    /// Human-readable name of this capability.
    fn name(&self) -> &str;
}

/// Durable, hash-keyed record store for document lifecycle state.
///
/// All mutations are compare-and-swap against the current state so a
/// preempted worker cannot clobber a newer attempt's result. Entries are
/// never physically deleted.
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Record the first sighting of a content hash, returning the entry.
    ///
    /// Idempotent: if the hash already has an entry, that entry is
    /// returned unchanged. Exactly one row per hash, ever.
    async fn upsert_sighting(&self, seed: LedgerEntry) -> Result<LedgerEntry>;

    /// Fetch the entry for a hash.
    async fn get(&self, hash: &str) -> Result<Option<LedgerEntry>>;

    /// Apply a patch iff the entry is still in `expected_state`.
    ///
    /// Returns the updated entry. Fails with [`crate::Error::StaleWrite`]
    /// when another writer moved the entry first, and with
    /// [`crate::Error::IllegalTransition`] when the patch requests a
    /// transition the state machine forbids.
    async fn update_cas(
        &self,
        hash: &str,
        expected_state: LedgerState,
        patch: LedgerPatch,
    ) -> Result<LedgerEntry>;

    /// All entries currently in the given state.
    async fn list_by_state(&self, state: LedgerState) -> Result<Vec<LedgerEntry>>;

    /// Entry counts grouped by state.
    async fn counts_by_state(&self) -> Result<Vec<(LedgerState, i64)>>;
}
