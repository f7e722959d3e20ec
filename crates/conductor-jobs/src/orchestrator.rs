//! Orchestrator: owns the queue, assigns lanes, tracks in-flight claims,
//! and recovers jobs whose workers went silent.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use conductor_core::defaults::{
    BACKOFF_BASE_SECS, BACKOFF_CAP_SECS, CONTAINER_PROBE_WINDOW, JOB_MAX_ATTEMPTS,
    LANE_BURST_LIMIT, LANE_NORMAL_THRESHOLD, LANE_PRIORITY_THRESHOLD, LEASE_SWEEP_INTERVAL_SECS,
    LEASE_TIMEOUT_SECS,
};
use conductor_core::{
    JobDescriptor, LedgerEntry, LedgerPatch, LedgerRepository, LedgerState, Result,
};
use conductor_db::Database;

use crate::broker::QueueBroker;
use crate::hash::hash_file;
use crate::relocate::{self, QUARANTINE_DUPLICATES};
use crate::router::{assign_lane, score_priority, FormatRouter};

/// Filesystem layout the pipeline operates over.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Drop directory treated as a work queue, never as storage.
    pub inbox: PathBuf,
    /// Claimed files live here while a worker owns them.
    pub staging: PathBuf,
    /// Successful ingests are archived here, hash-keyed.
    pub archive_root: PathBuf,
    /// Failures are preserved here, never deleted.
    pub quarantine_root: PathBuf,
    /// Extraction output for the downstream indexer.
    pub content_store_root: PathBuf,
}

impl StorageLayout {
    /// Conventional layout under one data root.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            inbox: root.join("inbox"),
            staging: root.join("staging"),
            archive_root: root.join("archive"),
            quarantine_root: root.join("quarantine"),
            content_store_root: root.join("extracted"),
        }
    }

    /// Layout from `CONDUCTOR_*` environment variables, defaulting to
    /// `./data`.
    pub fn from_env() -> Self {
        let mut layout = Self::under(
            std::env::var("CONDUCTOR_ROOT").unwrap_or_else(|_| "data".to_string()),
        );
        if let Ok(v) = std::env::var("CONDUCTOR_INBOX") {
            layout.inbox = v.into();
        }
        if let Ok(v) = std::env::var("CONDUCTOR_ARCHIVE") {
            layout.archive_root = v.into();
        }
        if let Ok(v) = std::env::var("CONDUCTOR_QUARANTINE") {
            layout.quarantine_root = v.into();
        }
        layout
    }

    /// Create every directory in the layout.
    pub async fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            &self.inbox,
            &self.staging,
            &self.archive_root,
            &self.quarantine_root,
            &self.content_store_root,
        ] {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }
}

/// Tuning parameters. Everything here is operational, not algorithmic:
/// deployments adjust these without code changes.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Claim age after which a worker is presumed dead.
    pub lease_timeout: Duration,
    /// How often the lease sweep runs.
    pub sweep_interval: Duration,
    /// Attempts before a job goes to `failed` for good.
    pub max_attempts: u32,
    /// Bound on consecutive higher-lane claims.
    pub burst_limit: u32,
    /// Triage score thresholds for lane assignment.
    pub priority_threshold: u8,
    pub normal_threshold: u8,
    /// Requeue backoff: base doubles per attempt, capped.
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            lease_timeout: Duration::from_secs(LEASE_TIMEOUT_SECS),
            sweep_interval: Duration::from_secs(LEASE_SWEEP_INTERVAL_SECS),
            max_attempts: JOB_MAX_ATTEMPTS,
            burst_limit: LANE_BURST_LIMIT,
            priority_threshold: LANE_PRIORITY_THRESHOLD,
            normal_threshold: LANE_NORMAL_THRESHOLD,
            backoff_base: Duration::from_secs(BACKOFF_BASE_SECS),
            backoff_cap: Duration::from_secs(BACKOFF_CAP_SECS),
        }
    }
}

impl OrchestratorConfig {
    /// Config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `LEASE_TIMEOUT_SECS` | `300` | Claim age before requeue |
    /// | `JOB_MAX_ATTEMPTS` | `3` | Attempts before fatal |
    /// | `LANE_BURST_LIMIT` | `4` | Consecutive higher-lane claims |
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_u64("LEASE_TIMEOUT_SECS") {
            config.lease_timeout = Duration::from_secs(v);
        }
        if let Some(v) = env_u64("JOB_MAX_ATTEMPTS") {
            config.max_attempts = v.max(1) as u32;
        }
        if let Some(v) = env_u64("LANE_BURST_LIMIT") {
            config.burst_limit = v.max(1) as u32;
        }
        config
    }

    pub fn with_lease_timeout(mut self, timeout: Duration) -> Self {
        self.lease_timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max.max(1);
        self
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Outcome of ingesting a single inbox file.
#[derive(Debug)]
pub enum IngestOutcome {
    /// File staged and enqueued.
    Enqueued(JobDescriptor),
    /// Content hash already tracked; drop preserved in quarantine.
    DuplicateSkipped { hash: String },
}

struct Claim {
    job: JobDescriptor,
    claimed_at: Instant,
}

/// Pipeline coordinator between the inbox, the broker, and the ledger.
pub struct Orchestrator {
    broker: Arc<QueueBroker>,
    db: Database,
    router: FormatRouter,
    layout: StorageLayout,
    config: OrchestratorConfig,
    in_flight: Mutex<HashMap<Uuid, Claim>>,
}

impl Orchestrator {
    pub fn new(
        db: Database,
        router: FormatRouter,
        layout: StorageLayout,
        config: OrchestratorConfig,
    ) -> Self {
        let broker = Arc::new(QueueBroker::with_burst_limit(config.burst_limit));
        Self {
            broker,
            db,
            router,
            layout,
            config,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn broker(&self) -> Arc<QueueBroker> {
        self.broker.clone()
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Discover and ingest every regular file currently in the inbox.
    /// Per-file failures are logged and skipped; the scan continues.
    pub async fn scan_inbox(&self) -> Result<usize> {
        let mut entries = tokio::fs::read_dir(&self.layout.inbox).await?;
        let mut enqueued = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !entry.file_type().await?.is_file() {
                continue;
            }
            match self.ingest_path(&path).await {
                Ok(IngestOutcome::Enqueued(_)) => enqueued += 1,
                Ok(IngestOutcome::DuplicateSkipped { hash }) => {
                    debug!(content_hash = %hash, path = %path.display(), "Duplicate drop skipped");
                }
                Err(e) => {
                    // File stays in the inbox for the next scan.
                    error!(path = %path.display(), error = %e, "Ingest failed");
                }
            }
        }
        Ok(enqueued)
    }

    /// Ingest one file: hash, claim by atomic rename into staging,
    /// record the sighting, classify, score, and enqueue.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn ingest_path(&self, path: &Path) -> Result<IngestOutcome> {
        let metadata = tokio::fs::metadata(path).await?;
        let size_bytes = metadata.len();
        let modified: DateTime<Utc> = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                conductor_core::Error::InvalidInput(format!(
                    "Path has no filename: {}",
                    path.display()
                ))
            })?;

        let hash = hash_file(path).await?;

        // Duplicate content is an idempotent no-op against the ledger;
        // the dropped copy is preserved, never deleted.
        let prior_attempts = match self.db.ledger.get(&hash).await? {
            Some(entry) if entry.state != LedgerState::Failed => {
                let dup_path = relocate::quarantine_path(
                    &self.layout.quarantine_root,
                    QUARANTINE_DUPLICATES,
                    &hash,
                    &filename,
                );
                relocate::move_file(path, &dup_path).await?;
                info!(content_hash = %hash, state = %entry.state, "Duplicate content, ledger unchanged");
                return Ok(IngestOutcome::DuplicateSkipped { hash });
            }
            Some(entry) => entry.attempts, // failed: eligible for retry
            None => 0,
        };

        // Claim: atomic rename out of the inbox. A crash between
        // detection and this rename leaves the file in the inbox for
        // the next scan; after it, the file is owned by the pipeline.
        let staged = relocate::staging_path(&self.layout.staging, &hash, &filename);
        relocate::move_file(path, &staged).await?;

        let header = read_header(&staged, CONTAINER_PROBE_WINDOW).await?;
        let decision = self.router.classify(&header, &filename);

        let now = Utc::now();
        let seed = LedgerEntry {
            hash: hash.clone(),
            original_filename: filename.clone(),
            original_path: path.display().to_string(),
            current_path: staged.display().to_string(),
            size_bytes: size_bytes as i64,
            mime_type: decision.mime_type.clone(),
            category: decision.category.as_str().to_string(),
            state: LedgerState::Queued,
            attempts: prior_attempts,
            last_error: None,
            extracted_chars: 0,
            created_at: now,
            updated_at: now,
        };
        let entry = self.db.ledger.upsert_sighting(seed).await?;

        if entry.state == LedgerState::Failed {
            // Re-dropped after a fatal failure: back into the queue.
            self.db
                .ledger
                .update_cas(
                    &hash,
                    LedgerState::Failed,
                    LedgerPatch::state(LedgerState::Queued)
                        .with_current_path(staged.display().to_string()),
                )
                .await?;
        }

        let score = score_priority(&filename, decision.category, size_bytes, modified, now);
        let lane = assign_lane(
            score,
            self.config.priority_threshold,
            self.config.normal_threshold,
        );

        let job = JobDescriptor {
            id: Uuid::new_v4(),
            path: staged,
            filename,
            content_hash: hash,
            size_bytes,
            category: decision.category,
            mime_type: decision.mime_type,
            chain: decision.chain,
            lane,
            attempt: (prior_attempts as u32) + 1,
            chain_pos: 0,
            enqueued_at: now,
        };

        info!(
            job_id = %job.id,
            content_hash = %job.content_hash,
            lane = %job.lane,
            category = %job.category,
            score,
            "Enqueued job"
        );
        self.broker.enqueue(job.clone());
        Ok(IngestOutcome::Enqueued(job))
    }

    /// Re-enqueue queued ledger entries whose staged file survived a
    /// crash. Called once at startup.
    pub async fn recover_staging(&self) -> Result<usize> {
        let queued = self.db.ledger.list_by_state(LedgerState::Queued).await?;
        let mut recovered = 0;
        for entry in queued {
            let staged = PathBuf::from(&entry.current_path);
            if !staged.starts_with(&self.layout.staging) || !staged.exists() {
                continue;
            }
            let header = read_header(&staged, CONTAINER_PROBE_WINDOW).await?;
            let decision = self.router.classify(&header, &entry.original_filename);
            let job = JobDescriptor {
                id: Uuid::new_v4(),
                path: staged,
                filename: entry.original_filename.clone(),
                content_hash: entry.hash.clone(),
                size_bytes: entry.size_bytes as u64,
                category: decision.category,
                mime_type: decision.mime_type,
                chain: decision.chain,
                lane: conductor_core::Lane::Normal,
                attempt: (entry.attempts as u32) + 1,
                chain_pos: 0,
                enqueued_at: Utc::now(),
            };
            self.broker.enqueue(job);
            recovered += 1;
        }
        if recovered > 0 {
            info!(requeued_count = recovered, "Recovered staged jobs after restart");
        }
        Ok(recovered)
    }

    /// Record a worker's claim for lease tracking.
    pub fn mark_claimed(&self, job: &JobDescriptor) {
        let mut in_flight = self.in_flight.lock().expect("in_flight mutex poisoned");
        in_flight.insert(
            job.id,
            Claim {
                job: job.clone(),
                claimed_at: Instant::now(),
            },
        );
    }

    /// Release a claim once the job resolved (any terminal outcome).
    pub fn ack(&self, job_id: Uuid) {
        let mut in_flight = self.in_flight.lock().expect("in_flight mutex poisoned");
        in_flight.remove(&job_id);
    }

    /// Number of currently claimed jobs.
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.lock().expect("in_flight mutex poisoned").len()
    }

    /// Whether `attempt` is the last one before the job goes fatal.
    pub fn is_final_attempt(&self, attempt: u32) -> bool {
        attempt >= self.config.max_attempts
    }

    /// Requeue a job after a failed (but retryable) attempt, with
    /// exponential backoff. The caller has already moved the ledger back
    /// to `queued`.
    pub fn requeue_with_backoff(&self, job: &JobDescriptor) {
        self.ack(job.id);

        let mut next = job.clone();
        next.id = Uuid::new_v4();
        next.attempt += 1;
        next.chain_pos = 0;
        next.enqueued_at = Utc::now();

        let delay = backoff_delay(self.config.backoff_base, self.config.backoff_cap, job.attempt);
        let broker = self.broker.clone();
        debug!(job_id = %next.id, attempt = next.attempt, delay_ms = delay.as_millis() as u64, "Scheduling requeue");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            broker.enqueue(next);
        });
    }

    /// Requeue every claim whose lease expired. Returns how many jobs
    /// were recovered.
    ///
    /// The compare-and-swap against `processing` is the fence: if the
    /// presumed-dead worker is actually alive and finishes later, its
    /// own CAS loses and the result is discarded.
    pub async fn sweep_leases(&self) -> Result<usize> {
        let expired: Vec<JobDescriptor> = {
            let mut in_flight = self.in_flight.lock().expect("in_flight mutex poisoned");
            let timeout = self.config.lease_timeout;
            let expired_ids: Vec<Uuid> = in_flight
                .iter()
                .filter(|(_, claim)| claim.claimed_at.elapsed() >= timeout)
                .map(|(id, _)| *id)
                .collect();
            expired_ids
                .into_iter()
                .filter_map(|id| in_flight.remove(&id).map(|c| c.job))
                .collect()
        };

        let mut requeued = 0;
        for job in expired {
            warn!(
                job_id = %job.id,
                content_hash = %job.content_hash,
                attempt = job.attempt,
                "Lease expired, worker presumed dead"
            );

            if self.is_final_attempt(job.attempt) {
                match self
                    .db
                    .ledger
                    .update_cas(
                        &job.content_hash,
                        LedgerState::Processing,
                        LedgerPatch::state(LedgerState::Failed)
                            .with_attempts(job.attempt as i64)
                            .with_error("lease expired after max attempts"),
                    )
                    .await
                {
                    Ok(_) => {
                        error!(content_hash = %job.content_hash, "Job failed permanently; surfaced for operator review");
                    }
                    Err(conductor_core::Error::StaleWrite { .. }) => {
                        // Worker finished in the meantime; nothing to do.
                    }
                    Err(e) => return Err(e),
                }
                continue;
            }

            match self
                .db
                .ledger
                .update_cas(
                    &job.content_hash,
                    LedgerState::Processing,
                    LedgerPatch::state(LedgerState::Queued).with_error("lease expired"),
                )
                .await
            {
                Ok(_) => {
                    let mut next = job.clone();
                    next.id = Uuid::new_v4();
                    next.attempt += 1;
                    next.chain_pos = 0;
                    next.enqueued_at = Utc::now();
                    self.broker.enqueue(next);
                    requeued += 1;
                }
                Err(conductor_core::Error::StaleWrite { .. }) => {
                    // Worker actually completed (or was already swept).
                }
                Err(e) => return Err(e),
            }
        }
        Ok(requeued)
    }

    /// Spawn the periodic lease sweeper. Abort the handle to stop it.
    pub fn start_sweeper(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let orchestrator = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(orchestrator.config.sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = orchestrator.sweep_leases().await {
                    error!(error = %e, "Lease sweep failed");
                }
            }
        })
    }
}

/// Exponential backoff with a cap: `base * 2^(attempt-1)`.
fn backoff_delay(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << shift).min(cap)
}

async fn read_header(path: &Path, window: usize) -> Result<Vec<u8>> {
    use tokio::io::AsyncReadExt;
    let mut file = tokio::fs::File::open(path).await?;
    let mut buf = vec![0u8; window];
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}
