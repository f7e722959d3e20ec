//! StructuredDoc capability: HTTP client for the structured document
//! parser service (tables, layout, reading order).

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::debug;

use conductor_core::defaults::{CAPABILITY_TIMEOUT_SECS, STRUCTURED_DOC_URL};
use conductor_core::{Capability, CapabilityKind, Error, ExtractionOutput, Result};

use super::health_probe;

/// Capability for layout-aware document extraction via the structured
/// parser service. Leads the document chain on accuracy; the generic
/// fallback sits behind it on availability.
pub struct StructuredDocAdapter {
    endpoint: String,
    client: reqwest::Client,
}

impl StructuredDocAdapter {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(CAPABILITY_TIMEOUT_SECS))
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for StructuredDocAdapter {
    fn default() -> Self {
        Self::new(STRUCTURED_DOC_URL)
    }
}

#[async_trait]
impl Capability for StructuredDocAdapter {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::StructuredDoc
    }

    async fn execute(
        &self,
        data: &[u8],
        filename: &str,
        mime_type: &str,
        _config: &JsonValue,
    ) -> Result<ExtractionOutput> {
        if data.is_empty() {
            return Err(Error::CorruptContent(format!("'{filename}' is empty")));
        }

        let part = reqwest::multipart::Part::bytes(data.to_vec())
            .file_name(filename.to_string())
            .mime_str(mime_type)
            .map_err(|e| Error::InvalidInput(format!("Bad mime type '{mime_type}': {e}")))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Extraction(format!("Structured parser unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Extraction(format!(
                "Structured parser returned {}",
                response.status()
            )));
        }

        let body: JsonValue = response.json().await?;
        let text = body
            .get("text")
            .or_else(|| body.get("markdown"))
            .and_then(|v| v.as_str())
            .map(String::from);
        let metadata = body.get("metadata").cloned().unwrap_or_else(|| {
            serde_json::json!({ "char_count": text.as_deref().map(str::len).unwrap_or(0) })
        });

        debug!(
            filename,
            chars = text.as_deref().map(str::len).unwrap_or(0),
            "Structured extraction complete"
        );

        Ok(ExtractionOutput {
            text,
            metadata,
            capability: CapabilityKind::StructuredDoc,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        health_probe(&self.client, &self.endpoint).await
    }

    fn name(&self) -> &str {
        "structured_doc"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_structured_doc_rejects_empty_payload() {
        let adapter = StructuredDocAdapter::default();
        let err = adapter
            .execute(b"", "empty.pdf", "application/pdf", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CorruptContent(_)));
    }

    #[tokio::test]
    async fn test_structured_doc_unreachable_is_transient() {
        let adapter = StructuredDocAdapter::new("http://127.0.0.1:1/process/document");
        let err = adapter
            .execute(
                b"%PDF-1.4 body",
                "doc.pdf",
                "application/pdf",
                &serde_json::json!({}),
            )
            .await
            .unwrap_err();
        assert!(err.is_transient(), "unreachable service must be retryable");
    }

    #[test]
    fn test_structured_doc_kind_and_name() {
        let adapter = StructuredDocAdapter::default();
        assert_eq!(adapter.kind(), CapabilityKind::StructuredDoc);
        assert_eq!(adapter.name(), "structured_doc");
    }
}
