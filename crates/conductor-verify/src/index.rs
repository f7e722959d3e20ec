//! Index evidence probe: does the raw indexed payload for a document
//! exist, and does it contain the distinguishing token?

use async_trait::async_trait;

use conductor_core::Result;
use conductor_jobs::ContentStore;

/// Evidence found in the index for one document.
#[derive(Debug, Clone, Default)]
pub struct IndexEvidence {
    /// An indexed payload exists for the content hash.
    pub exists: bool,
    /// The payload contains the sample's distinguishing token.
    pub token_found: bool,
    pub details: String,
}

/// Interface for probing the downstream index. The default
/// implementation reads the local content store; deployments with a
/// remote vector store register their own probe.
#[async_trait]
pub trait IndexProbe: Send + Sync {
    async fn evidence_for(&self, hash: &str, token: &str) -> Result<IndexEvidence>;
}

/// Probe backed by the pipeline's on-disk content store.
pub struct ContentStoreProbe {
    store: ContentStore,
}

impl ContentStoreProbe {
    pub fn new(store: ContentStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl IndexProbe for ContentStoreProbe {
    async fn evidence_for(&self, hash: &str, token: &str) -> Result<IndexEvidence> {
        match self.store.read(hash).await? {
            Some(stored) => {
                let token_found = stored
                    .text
                    .as_deref()
                    .map(|t| t.contains(token))
                    .unwrap_or(false);
                Ok(IndexEvidence {
                    exists: true,
                    token_found,
                    details: format!(
                        "payload present, token {}",
                        if token_found { "found" } else { "absent" }
                    ),
                })
            }
            None => Ok(IndexEvidence {
                exists: false,
                token_found: false,
                details: "no payload for hash".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_core::{CapabilityKind, ExtractionOutput};

    #[tokio::test]
    async fn test_probe_finds_token_in_payload() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        let output = ExtractionOutput {
            text: Some("report mentions TOKEN_XYZ here".to_string()),
            metadata: serde_json::json!({}),
            capability: CapabilityKind::TextNative,
        };
        store.write("hash1", "a.txt", "/archive/ha/a.txt", &output).await.unwrap();

        let probe = ContentStoreProbe::new(store);
        let evidence = probe.evidence_for("hash1", "TOKEN_XYZ").await.unwrap();
        assert!(evidence.exists);
        assert!(evidence.token_found);

        let evidence = probe.evidence_for("hash1", "TOKEN_OTHER").await.unwrap();
        assert!(evidence.exists);
        assert!(!evidence.token_found);
    }

    #[tokio::test]
    async fn test_probe_missing_hash() {
        let dir = tempfile::tempdir().unwrap();
        let probe = ContentStoreProbe::new(ContentStore::new(dir.path()));
        let evidence = probe.evidence_for("ghost", "TOKEN").await.unwrap();
        assert!(!evidence.exists);
        assert!(!evidence.token_found);
    }
}
