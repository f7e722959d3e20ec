//! Structured logging schema and field name constants for conductor.
//!
//! All crates use these constants for consistent structured logging
//! fields, so log aggregation tools can query by standardized names
//! across every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "router", "broker", "orchestrator", "worker", "ledger", "verify"
pub const SUBSYSTEM: &str = "subsystem";

/// Logical operation name.
/// Examples: "classify", "claim", "sweep_leases", "execute_chain"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Job UUID being processed.
pub const JOB_ID: &str = "job_id";

/// SHA-256 content hash of the document (hex).
pub const CONTENT_HASH: &str = "content_hash";

/// Filesystem path involved in the operation.
pub const PATH: &str = "path";

/// Queue lane ("priority", "normal", "bulk").
pub const LANE: &str = "lane";

/// Capability being invoked.
pub const CAPABILITY: &str = "capability";

/// Attempt number for the current job (1-based).
pub const ATTEMPT: &str = "attempt";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Characters of extracted text.
pub const EXTRACTED_CHARS: &str = "extracted_chars";

/// Number of results returned by a search or query.
pub const RESULT_COUNT: &str = "result_count";

/// Number of jobs requeued by a lease sweep.
pub const REQUEUED_COUNT: &str = "requeued_count";

// ─── Verification fields ───────────────────────────────────────────────────

/// Verification sample id.
pub const SAMPLE_ID: &str = "sample_id";

/// Provenance tier resolved for a sample.
pub const TIER: &str = "tier";
