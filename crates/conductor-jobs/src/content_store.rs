//! Content store: extraction output written to disk for the downstream
//! indexer, keyed by content hash.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

use conductor_core::{ExtractionOutput, Result};

/// Envelope persisted per document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredContent {
    pub hash: String,
    pub original_filename: String,
    pub current_path: String,
    pub capability: String,
    pub text: Option<String>,
    pub metadata: JsonValue,
    pub indexed_at: chrono::DateTime<chrono::Utc>,
}

/// Hash-sharded on-disk store for extraction output.
///
/// Layout: `<root>/<hash[0..2]>/<hash>.json`. The two-char shard keeps
/// directory fanout bounded on large corpora.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path an envelope for `hash` lives at.
    pub fn path_for(&self, hash: &str) -> PathBuf {
        let shard = &hash[..hash.len().min(2)];
        self.root.join(shard).join(format!("{hash}.json"))
    }

    /// Persist extraction output for a document.
    pub async fn write(
        &self,
        hash: &str,
        original_filename: &str,
        current_path: &str,
        output: &ExtractionOutput,
    ) -> Result<PathBuf> {
        let envelope = StoredContent {
            hash: hash.to_string(),
            original_filename: original_filename.to_string(),
            current_path: current_path.to_string(),
            capability: output.capability.to_string(),
            text: output.text.clone(),
            metadata: output.metadata.clone(),
            indexed_at: chrono::Utc::now(),
        };

        let path = self.path_for(hash);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(&envelope)?;
        tokio::fs::write(&path, json).await?;
        debug!(content_hash = %hash, path = %path.display(), "Wrote extraction output");
        Ok(path)
    }

    /// Read the stored envelope for a hash, if present.
    pub async fn read(&self, hash: &str) -> Result<Option<StoredContent>> {
        let path = self.path_for(hash);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_core::CapabilityKind;

    fn output(text: &str) -> ExtractionOutput {
        ExtractionOutput {
            text: Some(text.to_string()),
            metadata: serde_json::json!({"char_count": text.len()}),
            capability: CapabilityKind::TextNative,
        }
    }

    #[tokio::test]
    async fn test_write_and_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());

        store
            .write("abcdef123456", "doc.txt", "/archive/ab/doc.txt", &output("hello"))
            .await
            .unwrap();

        let stored = store.read("abcdef123456").await.unwrap().unwrap();
        assert_eq!(stored.text.as_deref(), Some("hello"));
        assert_eq!(stored.capability, "text_native");
        assert_eq!(stored.current_path, "/archive/ab/doc.txt");
    }

    #[tokio::test]
    async fn test_sharded_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        let path = store.path_for("abcdef");
        assert!(path.ends_with("ab/abcdef.json"));
    }

    #[tokio::test]
    async fn test_read_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        assert!(store.read("nothere").await.unwrap().is_none());
    }
}
