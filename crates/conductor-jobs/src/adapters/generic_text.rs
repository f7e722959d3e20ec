//! GenericText capability: HTTP client for the universal fallback
//! parser. Lower fidelity than the structured parser, but handles more
//! than a thousand formats and has no GPU dependency.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use conductor_core::defaults::{CAPABILITY_TIMEOUT_SECS, GENERIC_TEXT_URL};
use conductor_core::{Capability, CapabilityKind, Error, ExtractionOutput, Result};

use super::health_probe;

/// Universal plain-text extraction fallback.
pub struct GenericTextAdapter {
    endpoint: String,
    client: reqwest::Client,
}

impl GenericTextAdapter {
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

impl Default for GenericTextAdapter {
    fn default() -> Self {
        Self::new(GENERIC_TEXT_URL)
    }
}

#[async_trait]
impl Capability for GenericTextAdapter {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::GenericText
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

        let response = self
            .client
            .put(&self.endpoint)
            .header("Accept", "text/plain")
            .header("Content-Type", mime_type)
            .body(data.to_vec())
            .send()
            .await
            .map_err(|e| Error::Extraction(format!("Fallback parser unreachable: {e}")))?;

        // 422 means the parser understood the request but cannot read
        // the bytes: permanent, not worth another chain position.
        if response.status().as_u16() == 422 {
            return Err(Error::CorruptContent(format!(
                "'{filename}' rejected as unparseable"
            )));
        }
        if !response.status().is_success() {
            return Err(Error::Extraction(format!(
                "Fallback parser returned {}",
                response.status()
            )));
        }

        let text = response.text().await?.trim().to_string();
        let char_count = text.len();

        Ok(ExtractionOutput {
            text: Some(text),
            metadata: serde_json::json!({ "char_count": char_count }),
            capability: CapabilityKind::GenericText,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        health_probe(&self.client, &self.endpoint).await
    }

    fn name(&self) -> &str {
        "generic_text"
    }
}
