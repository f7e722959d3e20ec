//! Transcribe capability: HTTP client for the audio/video transcription
//! service. Long timeout: transcription runs at a fraction of realtime.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use conductor_core::defaults::{TRANSCRIBE_TIMEOUT_SECS, TRANSCRIBE_URL};
use conductor_core::{Capability, CapabilityKind, Error, ExtractionOutput, Result};

use super::health_probe;

pub struct TranscribeAdapter {
    endpoint: String,
    client: reqwest::Client,
}

impl TranscribeAdapter {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(TRANSCRIBE_TIMEOUT_SECS))
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for TranscribeAdapter {
    fn default() -> Self {
        Self::new(TRANSCRIBE_URL)
    }
}

#[async_trait]
impl Capability for TranscribeAdapter {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Transcribe
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
            .map_err(|e| Error::Extraction(format!("Transcription service unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Extraction(format!(
                "Transcription service returned {}",
                response.status()
            )));
        }

        let body: JsonValue = response.json().await?;
        let text = body
            .get("text")
            .or_else(|| body.get("transcript"))
            .and_then(|v| v.as_str())
            .map(String::from);
        let metadata = serde_json::json!({
            "language": body.get("language"),
            "segments": body.get("segments").and_then(|s| s.as_array()).map(|s| s.len()),
        });

        Ok(ExtractionOutput {
            text,
            metadata,
            capability: CapabilityKind::Transcribe,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        health_probe(&self.client, &self.endpoint).await
    }

    fn name(&self) -> &str {
        "transcribe"
    }
}
