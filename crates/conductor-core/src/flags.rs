//! Rollout flags as explicit configuration.
//!
//! Flags are plain data handed to components at construction time; there
//! is no process-wide mutable registry. Percentage rollouts are decided
//! by a pure function of (flag name, rollout percentage, stable sample
//! key), so the same document always sees the same variant across
//! processes and restarts.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// State of one flag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlagState {
    pub enabled: bool,
    /// Percentage of sample keys (0..=100) the flag applies to when
    /// enabled. 100 means everyone.
    #[serde(default = "default_rollout")]
    pub rollout_pct: u8,
}

fn default_rollout() -> u8 {
    100
}

impl FlagState {
    pub fn on() -> Self {
        Self {
            enabled: true,
            rollout_pct: 100,
        }
    }

    pub fn off() -> Self {
        Self {
            enabled: false,
            rollout_pct: 0,
        }
    }

    pub fn partial(rollout_pct: u8) -> Self {
        Self {
            enabled: true,
            rollout_pct: rollout_pct.min(100),
        }
    }
}

/// Immutable set of rollout flags, loaded once and injected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlagSet {
    flags: HashMap<String, FlagState>,
}

impl FlagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, state: FlagState) -> Self {
        self.flags.insert(name.into(), state);
        self
    }

    /// Whether the flag is enabled for every sample key. Unknown flags
    /// are off.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.flags
            .get(name)
            .map(|f| f.enabled && f.rollout_pct >= 100)
            .unwrap_or(false)
    }

    /// Whether the flag applies to the given sample key, honoring the
    /// rollout percentage. Unknown flags are off.
    pub fn is_enabled_for(&self, name: &str, sample_key: &str) -> bool {
        match self.flags.get(name) {
            Some(f) if f.enabled => variant(name, f.rollout_pct, sample_key),
            _ => false,
        }
    }
}

/// Pure rollout decision: buckets `sample_key` into 0..100 with a stable
/// SHA-256 hash of `(flag, key)` and compares against the percentage.
pub fn variant(flag: &str, rollout_pct: u8, sample_key: &str) -> bool {
    if rollout_pct == 0 {
        return false;
    }
    if rollout_pct >= 100 {
        return true;
    }
    let mut hasher = Sha256::new();
    hasher.update(flag.as_bytes());
    hasher.update(b"\x00");
    hasher.update(sample_key.as_bytes());
    let digest = hasher.finalize();
    let bucket = u16::from_be_bytes([digest[0], digest[1]]) % 100;
    (bucket as u8) < rollout_pct
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_is_deterministic() {
        let a = variant("use_ocr_fallback", 50, "abc123");
        let b = variant("use_ocr_fallback", 50, "abc123");
        assert_eq!(a, b);
    }

    #[test]
    fn test_variant_extremes() {
        assert!(variant("f", 100, "any"));
        assert!(!variant("f", 0, "any"));
    }

    #[test]
    fn test_variant_distribution_roughly_matches_pct() {
        let hits = (0..1000)
            .filter(|i| variant("dist_check", 30, &format!("key-{i}")))
            .count();
        // 30% of 1000 with generous tolerance
        assert!((200..400).contains(&hits), "hits = {hits}");
    }

    #[test]
    fn test_variant_differs_across_flags() {
        // Same key may resolve differently for different flag names.
        let differs = (0..100).any(|i| {
            let key = format!("key-{i}");
            variant("flag_a", 50, &key) != variant("flag_b", 50, &key)
        });
        assert!(differs);
    }

    #[test]
    fn test_flag_set_unknown_is_off() {
        let flags = FlagSet::new();
        assert!(!flags.is_enabled("missing"));
        assert!(!flags.is_enabled_for("missing", "key"));
    }

    #[test]
    fn test_flag_set_full_rollout() {
        let flags = FlagSet::new().with("magic_detection", FlagState::on());
        assert!(flags.is_enabled("magic_detection"));
        assert!(flags.is_enabled_for("magic_detection", "any-key"));
    }

    #[test]
    fn test_flag_set_partial_rollout_not_globally_enabled() {
        let flags = FlagSet::new().with("reranking", FlagState::partial(50));
        assert!(!flags.is_enabled("reranking"));
        // Per-key decisions are stable
        assert_eq!(
            flags.is_enabled_for("reranking", "doc-1"),
            flags.is_enabled_for("reranking", "doc-1")
        );
    }

    #[test]
    fn test_flag_set_disabled_ignores_rollout() {
        let flags = FlagSet::new().with(
            "dead_flag",
            FlagState {
                enabled: false,
                rollout_pct: 100,
            },
        );
        assert!(!flags.is_enabled_for("dead_flag", "key"));
    }
}
