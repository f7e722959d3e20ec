//! Integration tests for the ingestion pipeline.
//!
//! This suite validates:
//! - Pipeline-001: inbox file reaches `indexed` with archive relocation
//! - Pipeline-002: duplicate content yields exactly one ledger entry
//! - Pipeline-003: corrupt content is quarantined, never deleted
//! - Pipeline-004: transient failures requeue with backoff, then succeed
//! - Pipeline-005: chain exhaustion goes fatal after max attempts
//! - Pipeline-006: an expired lease is swept and the job recovers
//! - Pipeline-007: no terminal state leaves the file bytes missing
//!
//! All tests run against temp directories and an in-memory ledger; no
//! external services are required.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use conductor_core::{
    Capability, CapabilityKind, Error, ExtractionOutput, FlagSet, FlagState, LedgerRepository,
    LedgerState,
};
use conductor_db::Database;
use conductor_jobs::{
    CapabilityRegistry, ChainTable, FormatRouter, IngestOutcome, Orchestrator, OrchestratorConfig,
    StorageLayout, TextNativeAdapter, WorkerConfig, WorkerPool, FLAG_MAGIC_DETECTION,
};

/// Capability that fails transiently a fixed number of times, then
/// delegates to plain text extraction.
struct FlakyTextCapability {
    failures_remaining: AtomicU32,
}

impl FlakyTextCapability {
    fn new(failures: u32) -> Self {
        Self {
            failures_remaining: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl Capability for FlakyTextCapability {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::TextNative
    }

    async fn execute(
        &self,
        data: &[u8],
        filename: &str,
        mime_type: &str,
        config: &JsonValue,
    ) -> conductor_core::Result<ExtractionOutput> {
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::Extraction("service temporarily unavailable".into()));
        }
        TextNativeAdapter.execute(data, filename, mime_type, config).await
    }

    async fn health_check(&self) -> conductor_core::Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "flaky_text"
    }
}

/// Capability that always fails transiently.
struct BrokenCapability;

#[async_trait]
impl Capability for BrokenCapability {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::TextNative
    }

    async fn execute(
        &self,
        _data: &[u8],
        _filename: &str,
        _mime_type: &str,
        _config: &JsonValue,
    ) -> conductor_core::Result<ExtractionOutput> {
        Err(Error::Extraction("permanently flapping service".into()))
    }

    async fn health_check(&self) -> conductor_core::Result<bool> {
        Ok(false)
    }

    fn name(&self) -> &str {
        "broken"
    }
}

struct TestEnv {
    _dir: tempfile::TempDir,
    db: Database,
    orchestrator: Arc<Orchestrator>,
    registry: Arc<CapabilityRegistry>,
}

async fn setup(config: OrchestratorConfig, registry: CapabilityRegistry) -> TestEnv {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = Database::open_in_memory().await.expect("ledger");
    let layout = StorageLayout::under(dir.path());
    layout.ensure_dirs().await.expect("dirs");

    let flags = FlagSet::new().with(FLAG_MAGIC_DETECTION, FlagState::on());
    let router = FormatRouter::new(ChainTable::default(), flags);
    let orchestrator = Arc::new(Orchestrator::new(db.clone(), router, layout, config));

    TestEnv {
        _dir: dir,
        db,
        orchestrator,
        registry: Arc::new(registry),
    }
}

fn default_registry() -> CapabilityRegistry {
    let mut registry = CapabilityRegistry::new();
    registry.register(Arc::new(TextNativeAdapter));
    registry
}

fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig::default().with_backoff_base(Duration::from_millis(1))
}

fn start_workers(env: &TestEnv) -> conductor_jobs::WorkerHandle {
    let pool = WorkerPool::new(
        env.orchestrator.clone(),
        env.db.clone(),
        env.registry.clone(),
        WorkerConfig::default().with_poll_interval(10),
    );
    pool.start()
}

async fn drop_file(env: &TestEnv, name: &str, content: &[u8]) -> std::path::PathBuf {
    let path = env.orchestrator.layout().inbox.join(name);
    tokio::fs::write(&path, content).await.expect("write inbox file");
    path
}

async fn wait_for_state(
    db: &Database,
    hash: &str,
    expected: LedgerState,
    timeout_secs: u64,
) -> bool {
    let deadline = std::time::Instant::now() + Duration::from_secs(timeout_secs);
    while std::time::Instant::now() < deadline {
        if let Some(entry) = db.ledger.get(hash).await.expect("ledger get") {
            if entry.state == expected {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

// ============================================================================
// Pipeline-001: end-to-end success
// ============================================================================

#[tokio::test]
async fn test_ingest_to_indexed_end_to_end() {
    let env = setup(fast_config(), default_registry()).await;
    let handle = start_workers(&env);

    drop_file(&env, "notes.txt", b"quarterly planning notes").await;
    let enqueued = env.orchestrator.scan_inbox().await.unwrap();
    assert_eq!(enqueued, 1);

    let hash = conductor_jobs::hash_bytes(b"quarterly planning notes");
    assert!(
        wait_for_state(&env.db, &hash, LedgerState::Indexed, 5).await,
        "job never reached indexed"
    );

    let entry = env.db.ledger.get(&hash).await.unwrap().unwrap();
    assert_eq!(entry.extracted_chars, 24);
    assert!(entry.last_error.is_none());

    // Archived under the hash-keyed scheme, inbox and staging empty.
    let current = std::path::PathBuf::from(&entry.current_path);
    assert!(current.starts_with(&env.orchestrator.layout().archive_root));
    assert!(current.exists());
    assert!(!env.orchestrator.layout().inbox.join("notes.txt").exists());

    // Extraction output persisted for the downstream indexer.
    let store = conductor_jobs::ContentStore::new(
        env.orchestrator.layout().content_store_root.clone(),
    );
    let stored = store.read(&hash).await.unwrap().expect("stored content");
    assert_eq!(stored.text.as_deref(), Some("quarterly planning notes"));

    handle.shutdown().await.unwrap();
}

// ============================================================================
// Pipeline-002: idempotency on duplicate content
// ============================================================================

#[tokio::test]
async fn test_duplicate_ingest_yields_one_ledger_entry() {
    let env = setup(fast_config(), default_registry()).await;
    let handle = start_workers(&env);

    drop_file(&env, "original.txt", b"the same bytes").await;
    env.orchestrator.scan_inbox().await.unwrap();

    let hash = conductor_jobs::hash_bytes(b"the same bytes");
    assert!(wait_for_state(&env.db, &hash, LedgerState::Indexed, 5).await);

    // Second drop with identical content under a different name.
    let dup_path = drop_file(&env, "copy-of-original.txt", b"the same bytes").await;
    let outcome = env.orchestrator.ingest_path(&dup_path).await.unwrap();
    assert!(matches!(outcome, IngestOutcome::DuplicateSkipped { .. }));

    // Exactly one entry; the duplicate file preserved, not deleted.
    let counts = env.db.ledger.counts_by_state().await.unwrap();
    let total: i64 = counts.iter().map(|(_, n)| n).sum();
    assert_eq!(total, 1);
    let entry = env.db.ledger.get(&hash).await.unwrap().unwrap();
    assert_eq!(entry.state, LedgerState::Indexed);
    assert_eq!(entry.original_filename, "original.txt");

    let dup_preserved = env
        .orchestrator
        .layout()
        .quarantine_root
        .join("_duplicates")
        .join(format!("{hash}__copy-of-original.txt"));
    assert!(dup_preserved.exists());

    handle.shutdown().await.unwrap();
}

// ============================================================================
// Pipeline-003: corrupt content quarantined
// ============================================================================

#[tokio::test]
async fn test_corrupt_file_is_quarantined_not_deleted() {
    let env = setup(fast_config(), default_registry()).await;
    let handle = start_workers(&env);

    // NUL bytes inside a .txt: routed to text_native, rejected as corrupt.
    let corrupt: Vec<u8> = b"broken\x00\x00garbage".to_vec();
    drop_file(&env, "damaged.txt", &corrupt).await;
    env.orchestrator.scan_inbox().await.unwrap();

    let hash = conductor_jobs::hash_bytes(&corrupt);
    assert!(
        wait_for_state(&env.db, &hash, LedgerState::Quarantined, 5).await,
        "corrupt file never quarantined"
    );

    let entry = env.db.ledger.get(&hash).await.unwrap().unwrap();
    assert!(entry.last_error.is_some());
    let current = std::path::PathBuf::from(&entry.current_path);
    assert!(current.starts_with(&env.orchestrator.layout().quarantine_root));
    assert_eq!(tokio::fs::read(&current).await.unwrap(), corrupt);

    handle.shutdown().await.unwrap();
}

// ============================================================================
// Pipeline-004: transient failure retries
// ============================================================================

#[tokio::test]
async fn test_transient_failure_requeues_then_succeeds() {
    let mut registry = CapabilityRegistry::new();
    registry.register(Arc::new(FlakyTextCapability::new(1)));
    let env = setup(fast_config(), registry).await;
    let handle = start_workers(&env);

    drop_file(&env, "eventually.txt", b"survives one flap").await;
    env.orchestrator.scan_inbox().await.unwrap();

    let hash = conductor_jobs::hash_bytes(b"survives one flap");
    assert!(
        wait_for_state(&env.db, &hash, LedgerState::Indexed, 5).await,
        "retry never converged"
    );

    let entry = env.db.ledger.get(&hash).await.unwrap().unwrap();
    // Second attempt won; the transient error was cleared on success.
    assert_eq!(entry.attempts, 2);
    assert!(entry.last_error.is_none());

    handle.shutdown().await.unwrap();
}

// ============================================================================
// Pipeline-005: fatal after max attempts
// ============================================================================

#[tokio::test]
async fn test_chain_exhaustion_goes_fatal_after_max_attempts() {
    let mut registry = CapabilityRegistry::new();
    registry.register(Arc::new(BrokenCapability));
    let env = setup(fast_config().with_max_attempts(2), registry).await;
    let handle = start_workers(&env);

    let content = b"never extracts";
    drop_file(&env, "doomed.txt", content).await;
    env.orchestrator.scan_inbox().await.unwrap();

    let hash = conductor_jobs::hash_bytes(content);
    assert!(
        wait_for_state(&env.db, &hash, LedgerState::Failed, 5).await,
        "job never went fatal"
    );

    let entry = env.db.ledger.get(&hash).await.unwrap().unwrap();
    assert_eq!(entry.attempts, 2);
    assert!(entry
        .last_error
        .as_deref()
        .unwrap()
        .contains("permanently flapping"));

    // Preserved for operator review.
    let current = std::path::PathBuf::from(&entry.current_path);
    assert!(current.starts_with(&env.orchestrator.layout().quarantine_root));
    assert_eq!(tokio::fs::read(&current).await.unwrap(), content);

    handle.shutdown().await.unwrap();
}

// ============================================================================
// Pipeline-006: lease recovery
// ============================================================================

#[tokio::test]
async fn test_lease_sweep_recovers_stuck_job() {
    let config = fast_config().with_lease_timeout(Duration::from_millis(30));
    let env = setup(config, default_registry()).await;

    drop_file(&env, "stuck.txt", b"claimed then abandoned").await;
    env.orchestrator.scan_inbox().await.unwrap();
    let hash = conductor_jobs::hash_bytes(b"claimed then abandoned");

    // Simulate a worker that claimed the job and died mid-flight.
    let broker = env.orchestrator.broker();
    let job = broker.claim().expect("job queued");
    env.orchestrator.mark_claimed(&job);
    env.db
        .ledger
        .update_cas(
            &hash,
            LedgerState::Queued,
            conductor_core::LedgerPatch::state(LedgerState::Processing)
                .with_attempts(job.attempt as i64),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    let requeued = env.orchestrator.sweep_leases().await.unwrap();
    assert_eq!(requeued, 1);
    assert_eq!(env.orchestrator.in_flight_len(), 0);

    // A live worker picks the requeued job up and finishes it.
    let handle = start_workers(&env);
    assert!(
        wait_for_state(&env.db, &hash, LedgerState::Indexed, 5).await,
        "recovered job never indexed"
    );
    let entry = env.db.ledger.get(&hash).await.unwrap().unwrap();
    assert_eq!(entry.attempts, 2);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_sweep_ignores_live_leases() {
    let config = fast_config().with_lease_timeout(Duration::from_secs(3600));
    let env = setup(config, default_registry()).await;

    drop_file(&env, "live.txt", b"still being worked on").await;
    env.orchestrator.scan_inbox().await.unwrap();
    let job = env.orchestrator.broker().claim().unwrap();
    env.orchestrator.mark_claimed(&job);

    let requeued = env.orchestrator.sweep_leases().await.unwrap();
    assert_eq!(requeued, 0);
    assert_eq!(env.orchestrator.in_flight_len(), 1);
}

// ============================================================================
// Pipeline-007: never-delete invariant
// ============================================================================

#[tokio::test]
async fn test_terminal_states_always_keep_file_bytes() {
    let env = setup(fast_config().with_max_attempts(1), default_registry()).await;
    let handle = start_workers(&env);

    drop_file(&env, "good.txt", b"clean sample text").await;
    drop_file(&env, "bad.txt", b"x\x00y\x00z").await;
    env.orchestrator.scan_inbox().await.unwrap();

    let good_hash = conductor_jobs::hash_bytes(b"clean sample text");
    let bad_hash = conductor_jobs::hash_bytes(b"x\x00y\x00z");
    assert!(wait_for_state(&env.db, &good_hash, LedgerState::Indexed, 5).await);
    assert!(wait_for_state(&env.db, &bad_hash, LedgerState::Quarantined, 5).await);

    for state in [
        LedgerState::Indexed,
        LedgerState::Quarantined,
        LedgerState::Failed,
    ] {
        for entry in env.db.ledger.list_by_state(state).await.unwrap() {
            assert!(
                Path::new(&entry.current_path).exists(),
                "bytes missing for {} in state {}",
                entry.hash,
                entry.state
            );
        }
    }

    handle.shutdown().await.unwrap();
}

// ============================================================================
// Startup recovery
// ============================================================================

#[tokio::test]
async fn test_recover_staging_requeues_after_restart() {
    let env = setup(fast_config(), default_registry()).await;

    drop_file(&env, "orphan.txt", b"staged before crash").await;
    env.orchestrator.scan_inbox().await.unwrap();
    // Drain the broker to simulate a restart that lost the queue.
    let _ = env.orchestrator.broker().claim().unwrap();

    let recovered = env.orchestrator.recover_staging().await.unwrap();
    assert_eq!(recovered, 1);

    let handle = start_workers(&env);
    let hash = conductor_jobs::hash_bytes(b"staged before crash");
    assert!(wait_for_state(&env.db, &hash, LedgerState::Indexed, 5).await);

    handle.shutdown().await.unwrap();
}
