//! Worker pool: claims jobs from the broker, runs the capability chain,
//! updates the ledger, and relocates files.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use conductor_core::defaults::{
    CAPABILITY_TIMEOUT_SECS, EVENT_BUS_CAPACITY, JOB_MAX_CONCURRENT, JOB_POLL_INTERVAL_MS,
};
use conductor_core::{
    Error, ExtractionOutput, JobDescriptor, LedgerPatch, LedgerRepository, LedgerState, Result,
};
use conductor_db::Database;

use crate::capability::CapabilityRegistry;
use crate::content_store::ContentStore;
use crate::orchestrator::Orchestrator;
use crate::relocate::{
    archive_path, move_file, quarantine_path, QUARANTINE_CORRUPT, QUARANTINE_PROCESSING_ERROR,
};

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Polling interval in milliseconds when the queue is empty.
    pub poll_interval_ms: u64,
    /// Maximum number of concurrent jobs.
    pub max_concurrent_jobs: usize,
    /// Per-capability-call timeout in seconds.
    pub capability_timeout_secs: u64,
    /// Whether to enable job processing.
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: JOB_POLL_INTERVAL_MS,
            max_concurrent_jobs: JOB_MAX_CONCURRENT,
            capability_timeout_secs: CAPABILITY_TIMEOUT_SECS,
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `WORKER_ENABLED` | `true` | Enable/disable job processing |
    /// | `WORKER_MAX_CONCURRENT` | `4` | Max concurrent jobs |
    /// | `WORKER_POLL_INTERVAL_MS` | `500` | Polling interval when queue is empty |
    /// | `CAPABILITY_TIMEOUT_SECS` | `120` | Per-capability-call timeout |
    pub fn from_env() -> Self {
        let enabled = std::env::var("WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let max_concurrent_jobs = std::env::var("WORKER_MAX_CONCURRENT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(JOB_MAX_CONCURRENT)
            .max(1);

        let poll_interval_ms = std::env::var("WORKER_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(JOB_POLL_INTERVAL_MS);

        let capability_timeout_secs = std::env::var("CAPABILITY_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(CAPABILITY_TIMEOUT_SECS);

        Self {
            poll_interval_ms,
            max_concurrent_jobs,
            capability_timeout_secs,
            enabled,
        }
    }

    /// Create a new config with custom poll interval.
    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set maximum concurrent jobs.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max;
        self
    }

    /// Set the per-capability timeout.
    pub fn with_capability_timeout(mut self, secs: u64) -> Self {
        self.capability_timeout_secs = secs;
        self
    }

    /// Enable or disable job processing.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Event emitted by the worker pool.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// A job was claimed and started.
    JobStarted { job_id: Uuid, content_hash: String },
    /// A job completed; the document is indexed and archived.
    JobIndexed {
        job_id: Uuid,
        content_hash: String,
        extracted_chars: usize,
    },
    /// A job's attempt failed; it was requeued with backoff.
    JobRequeued {
        job_id: Uuid,
        content_hash: String,
        attempt: u32,
        error: String,
    },
    /// A job's file was quarantined (corrupt content).
    JobQuarantined {
        job_id: Uuid,
        content_hash: String,
        reason: String,
    },
    /// A job failed permanently after exhausting attempts.
    JobFailed {
        job_id: Uuid,
        content_hash: String,
        error: String,
    },
    /// Worker pool started.
    WorkerStarted,
    /// Worker pool stopped.
    WorkerStopped,
}

/// Handle for controlling a running worker pool.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
}

impl WorkerHandle {
    /// Signal the pool to shut down gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Pool of stateless workers processing jobs from the broker.
///
/// Workers share nothing between jobs: a worker crash loses at most one
/// in-flight job, recoverable via the orchestrator's lease sweep.
pub struct WorkerPool {
    orchestrator: Arc<Orchestrator>,
    db: Database,
    registry: Arc<CapabilityRegistry>,
    store: ContentStore,
    config: WorkerConfig,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl WorkerPool {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        db: Database,
        registry: Arc<CapabilityRegistry>,
        config: WorkerConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        let store = ContentStore::new(orchestrator.layout().content_store_root.clone());
        Self {
            orchestrator,
            db,
            registry,
            store,
            config,
            event_tx,
        }
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Start the pool and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        let pool = Arc::new(self);
        let pool_clone = pool.clone();

        tokio::spawn(async move {
            pool_clone.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
        }
    }

    /// Run the claim loop with concurrent job processing.
    ///
    /// Claims up to `max_concurrent_jobs` at a time; only sleeps when
    /// the queue is empty.
    #[instrument(skip(self, shutdown_rx))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Worker pool is disabled, not starting");
            return;
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_concurrent = self.config.max_concurrent_jobs,
            "Worker pool started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let broker = self.orchestrator.broker();

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Worker pool received shutdown signal");
                break;
            }

            let mut claimed = 0;
            let mut tasks = tokio::task::JoinSet::new();

            for _ in 0..self.config.max_concurrent_jobs {
                match broker.claim() {
                    Some(job) => {
                        claimed += 1;
                        let worker = self.worker_ref();
                        tasks.spawn(async move {
                            worker.execute_job(job).await;
                        });
                    }
                    None => break,
                }
            }

            if claimed == 0 {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Worker pool received shutdown signal");
                        break;
                    }
                    _ = sleep(poll_interval) => {}
                }
            } else {
                debug!(claimed, "Processing concurrent job batch");
                while let Some(result) = tasks.join_next().await {
                    if let Err(e) = result {
                        error!(error = ?e, "Job task panicked");
                    }
                }
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Worker pool stopped");
    }

    /// Bundle the references a spawned job task needs.
    fn worker_ref(&self) -> WorkerRef {
        WorkerRef {
            orchestrator: self.orchestrator.clone(),
            db: self.db.clone(),
            registry: self.registry.clone(),
            store: self.store.clone(),
            capability_timeout: Duration::from_secs(self.config.capability_timeout_secs),
            event_tx: self.event_tx.clone(),
        }
    }
}

/// Lightweight reference bundle for executing a single job in a spawned
/// task.
struct WorkerRef {
    orchestrator: Arc<Orchestrator>,
    db: Database,
    registry: Arc<CapabilityRegistry>,
    store: ContentStore,
    capability_timeout: Duration,
    event_tx: broadcast::Sender<WorkerEvent>,
}

/// How a single capability call resolved.
enum ChainStep {
    Success(ExtractionOutput),
    Transient(String),
    Corrupt(String),
}

impl WorkerRef {
    /// Execute a single claimed job end to end.
    pub async fn execute_job(self, job: JobDescriptor) {
        let start = Instant::now();
        self.orchestrator.mark_claimed(&job);

        info!(
            job_id = %job.id,
            content_hash = %job.content_hash,
            lane = %job.lane,
            attempt = job.attempt,
            "Processing job"
        );
        let _ = self.event_tx.send(WorkerEvent::JobStarted {
            job_id: job.id,
            content_hash: job.content_hash.clone(),
        });

        // Take ownership in the ledger. Losing this CAS means another
        // attempt already owns (or resolved) the document.
        let claim = self
            .db
            .ledger
            .update_cas(
                &job.content_hash,
                LedgerState::Queued,
                LedgerPatch::state(LedgerState::Processing).with_attempts(job.attempt as i64),
            )
            .await;
        if let Err(e) = claim {
            match e {
                Error::StaleWrite { .. } | Error::EntryNotFound(_) => {
                    warn!(job_id = %job.id, content_hash = %job.content_hash, "Claim lost, skipping job");
                    self.orchestrator.ack(job.id);
                    return;
                }
                // Ledger unreachable: leave the claim for the lease
                // sweep, never report anything.
                other => {
                    error!(job_id = %job.id, error = %other, "Ledger unreachable during claim");
                    return;
                }
            }
        }

        let data = match tokio::fs::read(&job.path).await {
            Ok(data) => data,
            Err(e) => {
                self.resolve_missing_file(&job, &e.to_string()).await;
                return;
            }
        };

        match self.run_chain(&job, &data).await {
            ChainStep::Success(output) => {
                self.finish_indexed(&job, output, start).await;
            }
            ChainStep::Corrupt(reason) => {
                self.finish_quarantined(&job, &reason).await;
            }
            ChainStep::Transient(error) => {
                self.finish_attempt_failed(&job, &error).await;
            }
        }
    }

    /// Try chain positions in order; each call gets its own timeout.
    async fn run_chain(&self, job: &JobDescriptor, data: &[u8]) -> ChainStep {
        let config = serde_json::json!({});
        let mut last_error = format!("Chain empty for category {}", job.category);

        for (pos, kind) in job.chain.iter().enumerate().skip(job.chain_pos) {
            let capability = match self.registry.get(*kind) {
                Some(c) => c,
                None => {
                    warn!(capability = %kind, "No capability registered, trying next chain position");
                    last_error = format!("No capability registered for {kind}");
                    continue;
                }
            };

            debug!(job_id = %job.id, capability = %kind, chain_pos = pos, "Invoking capability");
            let call = capability.execute(data, &job.filename, &job.mime_type, &config);
            match tokio::time::timeout(self.capability_timeout, call).await {
                Ok(Ok(output)) => return ChainStep::Success(output),
                Ok(Err(Error::CorruptContent(reason))) => {
                    // Unreadable bytes stay unreadable: no point trying
                    // further chain positions or attempts.
                    return ChainStep::Corrupt(reason);
                }
                Ok(Err(e)) => {
                    warn!(job_id = %job.id, capability = %kind, error = %e, "Capability failed, falling through");
                    last_error = format!("{kind}: {e}");
                }
                Err(_) => {
                    let timeout = self.capability_timeout.as_secs();
                    warn!(job_id = %job.id, capability = %kind, timeout, "Capability timed out");
                    last_error = format!("{kind}: timed out after {timeout}s");
                }
            }
        }

        ChainStep::Transient(last_error)
    }

    /// Success: archive the file, persist extraction output, record
    /// `indexed`. The relocation happens before the ledger transition so
    /// `current_path` is never ahead of the filesystem.
    async fn finish_indexed(&self, job: &JobDescriptor, output: ExtractionOutput, start: Instant) {
        let layout = self.orchestrator.layout();
        let archived = archive_path(&layout.archive_root, &job.content_hash, &job.filename);

        if let Err(e) = move_file(&job.path, &archived).await {
            error!(job_id = %job.id, error = %e, "Archive relocation failed");
            self.finish_attempt_failed(job, &format!("archive move failed: {e}")).await;
            return;
        }

        let archived_str = archived.display().to_string();
        if let Err(e) = self
            .store
            .write(&job.content_hash, &job.filename, &archived_str, &output)
            .await
        {
            error!(job_id = %job.id, error = %e, "Content store write failed");
            self.finish_attempt_failed(job, &format!("content store write failed: {e}")).await;
            return;
        }

        let chars = output.char_count();
        let result = self
            .db
            .ledger
            .update_cas(
                &job.content_hash,
                LedgerState::Processing,
                LedgerPatch::state(LedgerState::Indexed)
                    .with_current_path(&archived_str)
                    .with_extracted_chars(chars as i64)
                    .clear_error(),
            )
            .await;

        match result {
            Ok(_) => {
                info!(
                    job_id = %job.id,
                    content_hash = %job.content_hash,
                    extracted_chars = chars,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Job indexed"
                );
                let _ = self.event_tx.send(WorkerEvent::JobIndexed {
                    job_id: job.id,
                    content_hash: job.content_hash.clone(),
                    extracted_chars: chars,
                });
            }
            Err(Error::StaleWrite { .. }) => {
                // A lease sweep fenced this attempt out; the newer
                // attempt's result wins.
                warn!(job_id = %job.id, content_hash = %job.content_hash, "Result discarded, entry moved on");
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Failed to record indexed state");
            }
        }
        self.orchestrator.ack(job.id);
    }

    /// Permanent content failure: preserve the file in quarantine and
    /// record `quarantined`. Never retried.
    async fn finish_quarantined(&self, job: &JobDescriptor, reason: &str) {
        let layout = self.orchestrator.layout();
        let qpath = quarantine_path(
            &layout.quarantine_root,
            QUARANTINE_CORRUPT,
            &job.content_hash,
            &job.filename,
        );

        if let Err(e) = move_file(&job.path, &qpath).await {
            error!(job_id = %job.id, error = %e, "Quarantine relocation failed");
            self.finish_attempt_failed(job, &format!("quarantine move failed: {e}")).await;
            return;
        }

        let result = self
            .db
            .ledger
            .update_cas(
                &job.content_hash,
                LedgerState::Processing,
                LedgerPatch::state(LedgerState::Quarantined)
                    .with_current_path(qpath.display().to_string())
                    .with_error(reason),
            )
            .await;

        match result {
            Ok(_) => {
                warn!(
                    job_id = %job.id,
                    content_hash = %job.content_hash,
                    reason,
                    "Job quarantined"
                );
                let _ = self.event_tx.send(WorkerEvent::JobQuarantined {
                    job_id: job.id,
                    content_hash: job.content_hash.clone(),
                    reason: reason.to_string(),
                });
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Failed to record quarantined state");
            }
        }
        self.orchestrator.ack(job.id);
    }

    /// Attempt failure with the chain exhausted: requeue with backoff,
    /// or go fatal once attempts run out.
    async fn finish_attempt_failed(&self, job: &JobDescriptor, error_msg: &str) {
        if self.orchestrator.is_final_attempt(job.attempt) {
            let layout = self.orchestrator.layout();
            let qpath = quarantine_path(
                &layout.quarantine_root,
                QUARANTINE_PROCESSING_ERROR,
                &job.content_hash,
                &job.filename,
            );
            if let Err(e) = move_file(&job.path, &qpath).await {
                // Even the relocation failed; record the failure with
                // the file where it is. The bytes are still on disk.
                error!(job_id = %job.id, error = %e, "Quarantine relocation failed on fatal attempt");
            }

            let result = self
                .db
                .ledger
                .update_cas(
                    &job.content_hash,
                    LedgerState::Processing,
                    LedgerPatch::state(LedgerState::Failed)
                        .with_current_path(qpath.display().to_string())
                        .with_attempts(job.attempt as i64)
                        .with_error(error_msg),
                )
                .await;
            match result {
                Ok(_) => {
                    error!(
                        job_id = %job.id,
                        content_hash = %job.content_hash,
                        attempt = job.attempt,
                        error = %error_msg,
                        "Job failed permanently; surfaced for operator review"
                    );
                    let _ = self.event_tx.send(WorkerEvent::JobFailed {
                        job_id: job.id,
                        content_hash: job.content_hash.clone(),
                        error: error_msg.to_string(),
                    });
                }
                Err(Error::StaleWrite { .. }) => {
                    warn!(job_id = %job.id, "Fatal resolution discarded, entry moved on");
                }
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "Failed to record failed state");
                }
            }
            self.orchestrator.ack(job.id);
            return;
        }

        let result = self
            .db
            .ledger
            .update_cas(
                &job.content_hash,
                LedgerState::Processing,
                LedgerPatch::state(LedgerState::Queued).with_error(error_msg),
            )
            .await;
        match result {
            Ok(_) => {
                warn!(
                    job_id = %job.id,
                    content_hash = %job.content_hash,
                    attempt = job.attempt,
                    error = %error_msg,
                    "Attempt failed, requeueing with backoff"
                );
                let _ = self.event_tx.send(WorkerEvent::JobRequeued {
                    job_id: job.id,
                    content_hash: job.content_hash.clone(),
                    attempt: job.attempt,
                    error: error_msg.to_string(),
                });
                self.orchestrator.requeue_with_backoff(job);
            }
            Err(Error::StaleWrite { .. }) => {
                warn!(job_id = %job.id, "Requeue discarded, entry moved on");
                self.orchestrator.ack(job.id);
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Failed to record requeue");
                self.orchestrator.ack(job.id);
            }
        }
    }

    /// The staged file vanished. If the entry is already indexed this
    /// was duplicate work; otherwise it is an attempt failure.
    async fn resolve_missing_file(&self, job: &JobDescriptor, error_msg: &str) {
        if let Ok(Some(entry)) = self.db.ledger.get(&job.content_hash).await {
            if entry.state == LedgerState::Indexed {
                debug!(job_id = %job.id, "File already indexed by an earlier attempt");
                self.orchestrator.ack(job.id);
                return;
            }
        }
        self.finish_attempt_failed(job, &format!("staged file unreadable: {error_msg}"))
            .await;
    }
}
