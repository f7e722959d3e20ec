//! # conductor-verify
//!
//! Retrieval verifier and ingestion harness for conductor.
//!
//! Given a query, a set of search results, and the ledger, the verifier
//! classifies each result's provenance into a confidence tier
//! (strong/medium/weak/none) and produces a pass/fail report. The
//! harness wraps this into an end-to-end check: drop a sample set into
//! the inbox, wait for the pipeline to settle, and certify that every
//! sample traces back to its ledger entry.

pub mod harness;
pub mod index;
pub mod report;
pub mod samples;
pub mod search;
pub mod verifier;

pub use harness::{Harness, HarnessConfig, HarnessOutcome};
pub use index::{ContentStoreProbe, IndexEvidence, IndexProbe};
pub use report::{
    CheckResult, ReportEnv, ReportSummary, SampleReport, SampleStatus, VerificationReport,
};
pub use samples::{build_samples, materialize, minimal_pdf, SampleMode, SampleSpec};
pub use search::{
    HttpSearchClient, SearchProvider, SearchRequest, SearchResponse, SearchSource,
};
pub use verifier::{
    resolve_tier, rollup_passed, SampleExpectation, SampleVerification, StructuralChecks,
    Verifier, VerifierContext,
};

// Re-export core types
pub use conductor_core::VerificationTier;
