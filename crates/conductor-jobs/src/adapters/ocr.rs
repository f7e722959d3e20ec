//! OCR capability: HTTP client for the OCR service handling images and
//! scanned documents.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use conductor_core::defaults::{CAPABILITY_TIMEOUT_SECS, OCR_URL};
use conductor_core::{Capability, CapabilityKind, Error, ExtractionOutput, Result};

use super::health_probe;

pub struct OcrAdapter {
    endpoint: String,
    client: reqwest::Client,
}

impl OcrAdapter {
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

impl Default for OcrAdapter {
    fn default() -> Self {
        Self::new(OCR_URL)
    }
}

#[async_trait]
impl Capability for OcrAdapter {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Ocr
    }

    async fn execute(
        &self,
        data: &[u8],
        filename: &str,
        mime_type: &str,
        config: &JsonValue,
    ) -> Result<ExtractionOutput> {
        if data.is_empty() {
            return Err(Error::CorruptContent(format!("'{filename}' is empty")));
        }

        let part = reqwest::multipart::Part::bytes(data.to_vec())
            .file_name(filename.to_string())
            .mime_str(mime_type)
            .map_err(|e| Error::InvalidInput(format!("Bad mime type '{mime_type}': {e}")))?;
        let mut form = reqwest::multipart::Form::new().part("file", part);
        if let Some(langs) = config.get("languages").and_then(|v| v.as_str()) {
            form = form.text("languages", langs.to_string());
        }

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Extraction(format!("OCR service unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Extraction(format!(
                "OCR service returned {}",
                response.status()
            )));
        }

        let body: JsonValue = response.json().await?;
        let text = body.get("text").and_then(|v| v.as_str()).map(String::from);
        let confidence = body.get("confidence").and_then(|v| v.as_f64());

        Ok(ExtractionOutput {
            text,
            metadata: serde_json::json!({ "ocr_confidence": confidence }),
            capability: CapabilityKind::Ocr,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        health_probe(&self.client, &self.endpoint).await
    }

    fn name(&self) -> &str {
        "ocr"
    }
}
