//! Core data models shared across the conductor crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

// =============================================================================
// CONTENT CLASSIFICATION
// =============================================================================

/// Coarse content category a file is routed by.
///
/// Categories mirror the extraction lanes the pipeline can actually act on;
/// anything unrecognized fails closed into `Unknown` rather than being
/// dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentCategory {
    Text,
    Document,
    Spreadsheet,
    Image,
    Audio,
    Video,
    Email,
    Archive,
    Unknown,
}

impl ContentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentCategory::Text => "text",
            ContentCategory::Document => "document",
            ContentCategory::Spreadsheet => "spreadsheet",
            ContentCategory::Image => "image",
            ContentCategory::Audio => "audio",
            ContentCategory::Video => "video",
            ContentCategory::Email => "email",
            ContentCategory::Archive => "archive",
            ContentCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ContentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a file's type was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// Leading magic-byte signature matched.
    Magic,
    /// Container sniffing (ZIP/OLE2/ftyp internals).
    Container,
    /// File extension mapping.
    Extension,
    /// Nothing matched; generic fallback.
    Fallback,
}

/// Result of format detection on a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTypeInfo {
    pub category: ContentCategory,
    pub mime_type: String,
    pub detection: DetectionMethod,
}

// =============================================================================
// CAPABILITIES
// =============================================================================

/// Identifier of an extraction capability.
///
/// The chain table orders these per category: accuracy-ranked primary
/// first, availability-ranked fallback after. New capabilities are added
/// by registration, not by branching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    /// Direct UTF-8 text passthrough, no external service.
    TextNative,
    /// Structured document parser service (tables, layout).
    StructuredDoc,
    /// Universal plain-text fallback parser service.
    GenericText,
    /// OCR service for images and scanned documents.
    Ocr,
    /// Audio/video transcription service.
    Transcribe,
}

impl CapabilityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityKind::TextNative => "text_native",
            CapabilityKind::StructuredDoc => "structured_doc",
            CapabilityKind::GenericText => "generic_text",
            CapabilityKind::Ocr => "ocr",
            CapabilityKind::Transcribe => "transcribe",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CapabilityKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text_native" => Ok(CapabilityKind::TextNative),
            "structured_doc" => Ok(CapabilityKind::StructuredDoc),
            "generic_text" => Ok(CapabilityKind::GenericText),
            "ocr" => Ok(CapabilityKind::Ocr),
            "transcribe" => Ok(CapabilityKind::Transcribe),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown capability kind: {other}"
            ))),
        }
    }
}

/// Output of a successful capability call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    /// Extracted text, if the capability produced any.
    pub text: Option<String>,
    /// Capability-specific metadata (page counts, confidence, language).
    pub metadata: JsonValue,
    /// Which capability produced this output.
    pub capability: CapabilityKind,
}

impl ExtractionOutput {
    /// Character count of the extracted text (0 when none).
    pub fn char_count(&self) -> usize {
        self.text.as_deref().map(str::len).unwrap_or(0)
    }
}

/// Routing decision emitted by the format router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub category: ContentCategory,
    pub mime_type: String,
    pub detection: DetectionMethod,
    /// Ordered fallback chain of capabilities to try.
    pub chain: Vec<CapabilityKind>,
}

// =============================================================================
// LANES
// =============================================================================

/// One of the three priority tiers in the job queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    Priority,
    Normal,
    Bulk,
}

impl Lane {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lane::Priority => "priority",
            Lane::Normal => "normal",
            Lane::Bulk => "bulk",
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// LEDGER
// =============================================================================

/// Lifecycle state of a document in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerState {
    Queued,
    Processing,
    Indexed,
    Quarantined,
    Failed,
}

impl LedgerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerState::Queued => "queued",
            LedgerState::Processing => "processing",
            LedgerState::Indexed => "indexed",
            LedgerState::Quarantined => "quarantined",
            LedgerState::Failed => "failed",
        }
    }

    /// Whether a transition between states is legal.
    ///
    /// Transitions are monotonic except `failed -> queued` (operator or
    /// orchestrator retry) and `processing -> queued` (lease requeue).
    pub fn can_transition(from: LedgerState, to: LedgerState) -> bool {
        use LedgerState::*;
        matches!(
            (from, to),
            (Queued, Processing)
                | (Processing, Indexed)
                | (Processing, Quarantined)
                | (Processing, Failed)
                | (Processing, Queued)
                | (Queued, Quarantined)
                | (Queued, Failed)
                | (Failed, Queued)
        )
    }

    /// Terminal states: the file is at rest at `current_path`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LedgerState::Indexed | LedgerState::Quarantined | LedgerState::Failed
        )
    }
}

impl fmt::Display for LedgerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerState {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(LedgerState::Queued),
            "processing" => Ok(LedgerState::Processing),
            "indexed" => Ok(LedgerState::Indexed),
            "quarantined" => Ok(LedgerState::Quarantined),
            "failed" => Ok(LedgerState::Failed),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown ledger state: {other}"
            ))),
        }
    }
}

/// Durable record of a document's ingestion lifecycle, keyed by content
/// hash. Created on first sighting, updated by whichever component owns
/// the job, never deleted. Deletion of the underlying file never deletes
/// history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// SHA-256 of the file content, hex-encoded. Primary key.
    pub hash: String,
    pub original_filename: String,
    pub original_path: String,
    /// Where the file currently lives (inbox, staging, archive, quarantine).
    pub current_path: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub category: String,
    pub state: LedgerState,
    pub attempts: i64,
    pub last_error: Option<String>,
    /// Characters of text extracted on the successful attempt.
    pub extracted_chars: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update applied to a ledger entry through compare-and-swap.
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct LedgerPatch {
    pub state: Option<LedgerState>,
    pub current_path: Option<String>,
    pub attempts: Option<i64>,
    pub last_error: Option<Option<String>>,
    pub extracted_chars: Option<i64>,
}

impl LedgerPatch {
    pub fn state(state: LedgerState) -> Self {
        Self {
            state: Some(state),
            ..Default::default()
        }
    }

    pub fn with_current_path(mut self, path: impl Into<String>) -> Self {
        self.current_path = Some(path.into());
        self
    }

    pub fn with_attempts(mut self, attempts: i64) -> Self {
        self.attempts = Some(attempts);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.last_error = Some(Some(error.into()));
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.last_error = Some(None);
        self
    }

    pub fn with_extracted_chars(mut self, chars: i64) -> Self {
        self.extracted_chars = Some(chars);
        self
    }
}

// =============================================================================
// JOBS
// =============================================================================

/// A single processing attempt for one staged file.
///
/// Descriptors are transient: created by the orchestrator on enqueue,
/// owned by exactly one worker while claimed, and discarded when the
/// attempt resolves. The ledger entry is the durable anchor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub id: Uuid,
    /// Staged path the worker reads from.
    pub path: PathBuf,
    pub filename: String,
    pub content_hash: String,
    pub size_bytes: u64,
    pub category: ContentCategory,
    pub mime_type: String,
    /// Ordered fallback chain for this job.
    pub chain: Vec<CapabilityKind>,
    pub lane: Lane,
    /// Attempt number, 1-based. Incremented on every requeue.
    pub attempt: u32,
    /// Position in the chain to resume from.
    pub chain_pos: usize,
    pub enqueued_at: DateTime<Utc>,
}

// =============================================================================
// VERIFICATION
// =============================================================================

/// Confidence classification of a search result's provenance match
/// against the ledger, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationTier {
    /// Exact path-level provenance match against the ledger.
    Strong,
    /// Content-level token match in a returned source.
    Medium,
    /// Token found only in the raw indexed payload; a warning, not a pass.
    Weak,
    /// No evidence found.
    None,
}

impl VerificationTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationTier::Strong => "strong",
            VerificationTier::Medium => "medium",
            VerificationTier::Weak => "weak",
            VerificationTier::None => "none",
        }
    }
}

impl fmt::Display for VerificationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
