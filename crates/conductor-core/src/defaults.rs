//! Centralized default constants for the conductor pipeline.
//!
//! **This module is the single source of truth** for all shared default
//! values. Crates reference these constants instead of defining their own
//! magic numbers; anything operators are expected to tune is also exposed
//! through the corresponding config struct.

// =============================================================================
// FORMAT DETECTION
// =============================================================================

/// Number of leading bytes inspected for magic-byte signatures.
pub const MAGIC_HEADER_WINDOW: usize = 32;

/// Bytes scanned when probing ZIP/OLE2 container internals.
pub const CONTAINER_PROBE_WINDOW: usize = 4096;

// =============================================================================
// LANE ASSIGNMENT
// =============================================================================

/// Triage score at or above which a job lands in the priority lane.
pub const LANE_PRIORITY_THRESHOLD: u8 = 75;

/// Triage score at or above which a job lands in the normal lane.
pub const LANE_NORMAL_THRESHOLD: u8 = 40;

/// Size above which a file is penalized in triage scoring (bytes).
pub const LARGE_FILE_BYTES: u64 = 100 * 1024 * 1024;

/// Maximum consecutive priority-lane claims before a lower lane is
/// force-served. Bounds worst-case latency for bulk jobs.
pub const LANE_BURST_LIMIT: u32 = 4;

// =============================================================================
// JOB PROCESSING
// =============================================================================

/// Default maximum attempts before a job is marked failed for good.
pub const JOB_MAX_ATTEMPTS: u32 = 3;

/// Default polling interval for workers when the queue is empty (ms).
pub const JOB_POLL_INTERVAL_MS: u64 = 500;

/// Default max concurrent jobs per worker pool.
pub const JOB_MAX_CONCURRENT: usize = 4;

/// Default per-capability-call timeout in seconds.
pub const CAPABILITY_TIMEOUT_SECS: u64 = 120;

/// Timeout for transcription capabilities (long-running).
pub const TRANSCRIBE_TIMEOUT_SECS: u64 = 600;

/// Lease timeout: a claimed job older than this is presumed orphaned
/// and requeued by the orchestrator sweep (seconds).
pub const LEASE_TIMEOUT_SECS: u64 = 300;

/// Interval between orchestrator lease sweeps (seconds).
pub const LEASE_SWEEP_INTERVAL_SECS: u64 = 30;

/// Base delay for requeue backoff (seconds). Doubles per attempt.
pub const BACKOFF_BASE_SECS: u64 = 5;

/// Upper bound on requeue backoff (seconds).
pub const BACKOFF_CAP_SECS: u64 = 300;

/// Default event bus broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// LEDGER
// =============================================================================

/// Maximum extracted text persisted per entry summary (chars). The full
/// output lives in the content store; the ledger keeps a count only.
pub const LEDGER_TEXT_CAP: usize = 50_000;

// =============================================================================
// VERIFICATION
// =============================================================================

/// Default search result limit per verification query.
pub const VERIFY_SEARCH_LIMIT: usize = 8;

/// Default poll interval while waiting for a sample to settle (seconds).
pub const VERIFY_POLL_SECS: u64 = 5;

/// Default overall timeout per verification run (minutes).
pub const VERIFY_TIMEOUT_MIN: u64 = 20;

/// Snippet length for report excerpts.
pub const SNIPPET_LENGTH: usize = 200;

// =============================================================================
// SERVICES
// =============================================================================

/// Default structured document parser endpoint (Docling analogue).
pub const STRUCTURED_DOC_URL: &str = "http://127.0.0.1:8005/process/document";

/// Default universal fallback parser endpoint (Tika analogue).
pub const GENERIC_TEXT_URL: &str = "http://127.0.0.1:9998/tika";

/// Default OCR service endpoint.
pub const OCR_URL: &str = "http://127.0.0.1:9999/ocr";

/// Default transcription service endpoint.
pub const TRANSCRIBE_URL: &str = "http://127.0.0.1:9000/transcribe";

/// Default search API endpoint consumed by the verifier.
pub const SEARCH_URL: &str = "http://127.0.0.1:8040/api/search";
