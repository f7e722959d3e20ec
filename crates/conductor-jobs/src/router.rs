//! Format router: byte-level classification, fallback chain lookup, and
//! triage scoring for lane assignment.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use conductor_core::defaults::{
    LANE_NORMAL_THRESHOLD, LANE_PRIORITY_THRESHOLD, LARGE_FILE_BYTES,
};
use conductor_core::{
    detect, CapabilityKind, ContentCategory, DetectionMethod, FileTypeInfo, FlagSet, Lane,
    Result, RoutingDecision,
};

/// Rollout flag gating magic-byte detection; when off for a sample the
/// router relies on extension mapping alone.
pub const FLAG_MAGIC_DETECTION: &str = "magic_detection";

/// Ordered capability chains per content category.
///
/// The default ordering is benchmark-driven: the structured parser leads
/// for layout-heavy documents (highest table accuracy), with the
/// universal fallback behind it (highest availability). Deployments
/// override the table with a JSON file, never with code changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainTable {
    chains: HashMap<ContentCategory, Vec<CapabilityKind>>,
}

impl Default for ChainTable {
    fn default() -> Self {
        use CapabilityKind::*;
        use ContentCategory::*;
        let chains = HashMap::from([
            (Text, vec![TextNative]),
            (Document, vec![StructuredDoc, GenericText]),
            (Spreadsheet, vec![StructuredDoc, GenericText]),
            (Image, vec![Ocr, GenericText]),
            (Audio, vec![Transcribe]),
            (Video, vec![Transcribe]),
            (Email, vec![GenericText]),
            (Archive, vec![GenericText]),
            (Unknown, vec![GenericText]),
        ]);
        Self { chains }
    }
}

impl ChainTable {
    /// Load a chain table from a JSON object of the shape
    /// `{"document": ["structured_doc", "generic_text"], ...}`.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: HashMap<ContentCategory, Vec<CapabilityKind>> = serde_json::from_str(json)?;
        // Missing categories inherit the defaults so a partial override
        // never leaves a category chainless.
        let mut table = Self::default();
        for (category, chain) in raw {
            table.chains.insert(category, chain);
        }
        Ok(table)
    }

    /// Load a chain table override from a file.
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_json(&raw)
    }

    /// The ordered chain for a category. `Unknown` is the fail-closed
    /// answer for anything unmapped.
    pub fn chain_for(&self, category: ContentCategory) -> Vec<CapabilityKind> {
        self.chains
            .get(&category)
            .or_else(|| self.chains.get(&ContentCategory::Unknown))
            .cloned()
            .unwrap_or_else(|| vec![CapabilityKind::GenericText])
    }
}

/// Classifies dropped files and emits routing decisions.
pub struct FormatRouter {
    chains: ChainTable,
    flags: FlagSet,
}

impl FormatRouter {
    pub fn new(chains: ChainTable, flags: FlagSet) -> Self {
        Self { chains, flags }
    }

    /// Inspect file bytes (magic signatures first) with extension
    /// fallback, then look up the capability chain. Never errors: files
    /// that match nothing are routed as `Unknown` rather than dropped.
    pub fn classify(&self, data: &[u8], filename: &str) -> RoutingDecision {
        let info = if self.flags.is_enabled_for(FLAG_MAGIC_DETECTION, filename) {
            detect(data, filename)
        } else {
            extension_only(data, filename)
        };

        let chain = self.chains.chain_for(info.category);
        debug!(
            category = %info.category,
            mime = %info.mime_type,
            detection = ?info.detection,
            chain_len = chain.len(),
            "Classified file"
        );

        RoutingDecision {
            category: info.category,
            mime_type: info.mime_type,
            detection: info.detection,
            chain,
        }
    }
}

/// Extension-only detection used when magic detection is rolled out off
/// for a sample.
fn extension_only(data: &[u8], filename: &str) -> FileTypeInfo {
    let full = detect(data, filename);
    if full.detection == DetectionMethod::Extension {
        return full;
    }
    // Re-detect with an empty header so only the extension can match.
    let by_ext = detect(b"", filename);
    match by_ext.detection {
        DetectionMethod::Extension => by_ext,
        _ => FileTypeInfo {
            category: ContentCategory::Unknown,
            mime_type: "application/octet-stream".to_string(),
            detection: DetectionMethod::Fallback,
        },
    }
}

/// Filename keywords that bump triage priority.
const PRIORITY_KEYWORDS: &[&str] = &[
    "contract", "invoice", "receipt", "password", "secret", "confidential", "tax", "bank",
    "account", "urgent", "important", "asap", "application", "certificate",
];

/// Triage score for a file, 0..=100. Combines recency, category weight,
/// filename keywords, and a penalty for very large files.
pub fn score_priority(
    filename: &str,
    category: ContentCategory,
    size_bytes: u64,
    modified: DateTime<Utc>,
    now: DateTime<Utc>,
) -> u8 {
    let mut score: i32 = 50;

    // Recency boost
    let age = now - modified;
    if age < Duration::hours(1) {
        score += 30;
    } else if age < Duration::days(1) {
        score += 20;
    } else if age < Duration::weeks(1) {
        score += 10;
    }

    // Category weight
    score += match category {
        ContentCategory::Email => 25,
        ContentCategory::Document => 15,
        ContentCategory::Spreadsheet => 12,
        ContentCategory::Audio => 12,
        ContentCategory::Text => 8,
        ContentCategory::Video => 8,
        ContentCategory::Image => 5,
        ContentCategory::Archive => 3,
        ContentCategory::Unknown => 0,
    };

    // Keyword boost (first match only)
    let lowered = filename.to_lowercase();
    if PRIORITY_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
        score += 15;
    }

    // Size penalty: big unimportant files go to the back
    if size_bytes > LARGE_FILE_BYTES && score < 70 {
        score -= 10;
    }

    score.clamp(0, 100) as u8
}

/// Lane assignment is a pure function of the triage score.
pub fn assign_lane(score: u8, priority_threshold: u8, normal_threshold: u8) -> Lane {
    if score >= priority_threshold {
        Lane::Priority
    } else if score >= normal_threshold {
        Lane::Normal
    } else {
        Lane::Bulk
    }
}

/// Lane assignment with the default thresholds.
pub fn assign_lane_default(score: u8) -> Lane {
    assign_lane(score, LANE_PRIORITY_THRESHOLD, LANE_NORMAL_THRESHOLD)
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_core::FlagState;

    fn router() -> FormatRouter {
        FormatRouter::new(
            ChainTable::default(),
            FlagSet::new().with(FLAG_MAGIC_DETECTION, FlagState::on()),
        )
    }

    #[test]
    fn test_classify_pdf_gets_structured_first_chain() {
        let decision = router().classify(b"%PDF-1.5 body", "scan.pdf");
        assert_eq!(decision.category, ContentCategory::Document);
        assert_eq!(
            decision.chain,
            vec![CapabilityKind::StructuredDoc, CapabilityKind::GenericText]
        );
    }

    #[test]
    fn test_classify_text_native_chain() {
        let decision = router().classify(b"plain notes", "notes.txt");
        assert_eq!(decision.category, ContentCategory::Text);
        assert_eq!(decision.chain, vec![CapabilityKind::TextNative]);
    }

    #[test]
    fn test_classify_unknown_fails_closed_to_generic() {
        let decision = router().classify(&[0x00, 0x01, 0x02], "blob.xyz");
        assert_eq!(decision.category, ContentCategory::Unknown);
        assert_eq!(decision.chain, vec![CapabilityKind::GenericText]);
    }

    #[test]
    fn test_classify_audio_has_no_fallback() {
        let decision = router().classify(b"ID3\x04rest", "talk.mp3");
        assert_eq!(decision.category, ContentCategory::Audio);
        assert_eq!(decision.chain, vec![CapabilityKind::Transcribe]);
    }

    #[test]
    fn test_magic_flag_off_uses_extension_only() {
        let no_magic = FormatRouter::new(ChainTable::default(), FlagSet::new());
        // PDF bytes, txt name: with magic off the extension wins.
        let decision = no_magic.classify(b"%PDF-1.5", "notes.txt");
        assert_eq!(decision.category, ContentCategory::Text);
        assert_eq!(decision.detection, DetectionMethod::Extension);
    }

    #[test]
    fn test_chain_table_json_override() {
        let table = ChainTable::from_json(r#"{"image": ["generic_text"]}"#).unwrap();
        assert_eq!(
            table.chain_for(ContentCategory::Image),
            vec![CapabilityKind::GenericText]
        );
        // Unmentioned categories keep defaults
        assert_eq!(
            table.chain_for(ContentCategory::Document),
            vec![CapabilityKind::StructuredDoc, CapabilityKind::GenericText]
        );
    }

    #[test]
    fn test_chain_table_rejects_bad_capability() {
        assert!(ChainTable::from_json(r#"{"image": ["no_such"]}"#).is_err());
    }

    #[test]
    fn test_score_recency_boost() {
        let now = Utc::now();
        let fresh = score_priority("a.txt", ContentCategory::Text, 10, now, now);
        let stale = score_priority(
            "a.txt",
            ContentCategory::Text,
            10,
            now - Duration::days(30),
            now,
        );
        assert!(fresh > stale);
        assert_eq!(fresh - stale, 30);
    }

    #[test]
    fn test_score_keyword_boost() {
        let now = Utc::now();
        let plain = score_priority("meeting-notes.txt", ContentCategory::Text, 10, now, now);
        let hot = score_priority("invoice-2026.txt", ContentCategory::Text, 10, now, now);
        assert_eq!(hot - plain, 15);
    }

    #[test]
    fn test_score_large_file_penalty() {
        let now = Utc::now() - Duration::days(30);
        let small = score_priority("big.bin", ContentCategory::Unknown, 1024, now, Utc::now());
        let huge = score_priority(
            "big.bin",
            ContentCategory::Unknown,
            LARGE_FILE_BYTES + 1,
            now,
            Utc::now(),
        );
        assert!(huge < small);
    }

    #[test]
    fn test_score_clamped() {
        let now = Utc::now();
        let s = score_priority("urgent-invoice-contract.eml", ContentCategory::Email, 10, now, now);
        assert!(s <= 100);
    }

    #[test]
    fn test_assign_lane_thresholds() {
        assert_eq!(assign_lane_default(90), Lane::Priority);
        assert_eq!(assign_lane_default(75), Lane::Priority);
        assert_eq!(assign_lane_default(74), Lane::Normal);
        assert_eq!(assign_lane_default(40), Lane::Normal);
        assert_eq!(assign_lane_default(39), Lane::Bulk);
        assert_eq!(assign_lane_default(0), Lane::Bulk);
    }
}
