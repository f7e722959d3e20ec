//! Report artifact: machine-readable JSON plus a human-readable summary.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use conductor_core::Result;

use crate::verifier::SampleVerification;

/// Result of one structural or retrieval check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub status: bool,
    pub details: String,
}

impl CheckResult {
    pub fn new(status: bool, details: impl Into<String>) -> Self {
        Self {
            status,
            details: details.into(),
        }
    }
}

/// Final status of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleStatus {
    Pass,
    Fail,
    Skipped,
}

/// Per-sample section of the report: the four checks from the
/// verification contract plus timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleReport {
    pub id: String,
    pub token: String,
    pub content_hash: String,
    pub relocated: CheckResult,
    pub ledger_entry: CheckResult,
    pub index_evidence: CheckResult,
    /// Search-retrieval tier with its evidence.
    pub search_retrieval: SampleVerification,
    pub status: SampleStatus,
    pub duration_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Environment echo so a report is reproducible on its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportEnv {
    pub inbox: String,
    pub archive_root: String,
    pub quarantine_root: String,
    pub ledger: String,
    pub search_url: String,
}

/// Rollup counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// The full verification report artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub mode: String,
    pub env: ReportEnv,
    pub samples: Vec<SampleReport>,
    pub summary: ReportSummary,
}

impl VerificationReport {
    pub fn new(run_id: impl Into<String>, mode: impl Into<String>, env: ReportEnv) -> Self {
        Self {
            run_id: run_id.into(),
            timestamp: Utc::now(),
            mode: mode.into(),
            env,
            samples: Vec::new(),
            summary: ReportSummary::default(),
        }
    }

    /// Append a sample and update the rollup counts.
    pub fn push(&mut self, sample: SampleReport) {
        self.summary.total += 1;
        match sample.status {
            SampleStatus::Pass => self.summary.passed += 1,
            SampleStatus::Fail => self.summary.failed += 1,
            SampleStatus::Skipped => self.summary.skipped += 1,
        }
        self.samples.push(sample);
    }

    /// The run passes only when nothing failed.
    pub fn passed(&self) -> bool {
        self.summary.failed == 0
    }

    /// Write the machine-readable artifact.
    pub async fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, serde_json::to_vec_pretty(self)?).await?;
        Ok(())
    }

    /// Render the human-readable summary.
    pub fn render_markdown(&self) -> String {
        let mut lines = vec![
            "# Ingestion Verification Report".to_string(),
            String::new(),
            format!("- Run ID: {}", self.run_id),
            format!("- Timestamp: {}", self.timestamp.to_rfc3339()),
            format!("- Mode: {}", self.mode),
            format!(
                "- Samples: {} total, {} passed, {} failed, {} skipped",
                self.summary.total, self.summary.passed, self.summary.failed, self.summary.skipped
            ),
            String::new(),
            "| Sample | Relocated | Ledger | Index | Tier | Status |".to_string(),
            "|--------|-----------|--------|-------|------|--------|".to_string(),
        ];

        let mark = |b: bool| if b { "pass" } else { "fail" };
        for sample in &self.samples {
            lines.push(format!(
                "| {} | {} | {} | {} | {} | {:?} |",
                sample.id,
                mark(sample.relocated.status),
                mark(sample.ledger_entry.status),
                mark(sample.index_evidence.status),
                sample.search_retrieval.tier,
                sample.status,
            ));
        }

        lines.push(String::new());
        lines.push("## Failures".to_string());
        let failures: Vec<&SampleReport> = self
            .samples
            .iter()
            .filter(|s| s.status == SampleStatus::Fail)
            .collect();
        if failures.is_empty() {
            lines.push("- None".to_string());
        } else {
            for sample in failures {
                lines.push(format!(
                    "- {}: {}",
                    sample.id,
                    sample
                        .error
                        .clone()
                        .unwrap_or_else(|| sample.search_retrieval.details.clone())
                ));
            }
        }

        lines.push(String::new());
        lines.join("\n")
    }

    /// Write the human-readable artifact.
    pub async fn write_markdown(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, self.render_markdown()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verifier::StructuralChecks;
    use conductor_core::VerificationTier;

    fn sample(id: &str, status: SampleStatus, tier: VerificationTier) -> SampleReport {
        SampleReport {
            id: id.to_string(),
            token: format!("TOKEN_{id}"),
            content_hash: "abc".to_string(),
            relocated: CheckResult::new(true, "moved"),
            ledger_entry: CheckResult::new(true, "indexed"),
            index_evidence: CheckResult::new(true, "payload present"),
            search_retrieval: SampleVerification {
                tier,
                matched_on: "path".to_string(),
                details: "match".to_string(),
                checks: StructuralChecks::default(),
                passed: status == SampleStatus::Pass,
            },
            status,
            duration_secs: 1.5,
            error: None,
        }
    }

    #[test]
    fn test_summary_counts() {
        let mut report = VerificationReport::new("run1", "base", ReportEnv::default());
        report.push(sample("txt", SampleStatus::Pass, VerificationTier::Strong));
        report.push(sample("pdf", SampleStatus::Fail, VerificationTier::None));
        report.push(sample("eml", SampleStatus::Skipped, VerificationTier::None));

        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.passed, 1);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.skipped, 1);
        assert!(!report.passed());
    }

    #[test]
    fn test_markdown_lists_failures() {
        let mut report = VerificationReport::new("run2", "base", ReportEnv::default());
        report.push(sample("ok", SampleStatus::Pass, VerificationTier::Medium));
        report.push(sample("broken", SampleStatus::Fail, VerificationTier::None));

        let md = report.render_markdown();
        assert!(md.contains("2 total, 1 passed, 1 failed"));
        assert!(md.contains("- broken:"));
        assert!(md.contains("| ok |"));
    }

    #[tokio::test]
    async fn test_json_round_trip() {
        let mut report = VerificationReport::new("run3", "overlay", ReportEnv::default());
        report.push(sample("txt", SampleStatus::Pass, VerificationTier::Weak));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        report.write_json(&path).await.unwrap();

        let loaded: VerificationReport =
            serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(loaded.run_id, "run3");
        assert_eq!(loaded.samples.len(), 1);
        assert_eq!(loaded.samples[0].search_retrieval.tier, VerificationTier::Weak);
    }
}
