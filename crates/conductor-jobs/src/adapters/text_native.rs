//! TextNative capability: handles plain text files in-process.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use conductor_core::{Capability, CapabilityKind, Error, ExtractionOutput, Result};

/// Capability for extracting content from plain text files.
///
/// Reads bytes as UTF-8 (with lossy conversion for invalid sequences)
/// and returns the text with basic metadata. Payloads that are clearly
/// binary (NUL bytes in the leading window) are rejected as corrupt, a
/// permanent failure, since retrying cannot make bytes readable.
pub struct TextNativeAdapter;

/// Leading window scanned for NUL bytes.
const BINARY_SNIFF_WINDOW: usize = 1024;

#[async_trait]
impl Capability for TextNativeAdapter {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::TextNative
    }

    async fn execute(
        &self,
        data: &[u8],
        filename: &str,
        _mime_type: &str,
        _config: &JsonValue,
    ) -> Result<ExtractionOutput> {
        let window = &data[..data.len().min(BINARY_SNIFF_WINDOW)];
        if window.contains(&0) {
            return Err(Error::CorruptContent(format!(
                "'{filename}' contains NUL bytes; not a text file"
            )));
        }

        let text = String::from_utf8_lossy(data).into_owned();
        let char_count = text.len();
        let line_count = text.lines().count();

        Ok(ExtractionOutput {
            text: Some(text),
            metadata: serde_json::json!({
                "char_count": char_count,
                "line_count": line_count,
            }),
            capability: CapabilityKind::TextNative,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true) // No external dependencies
    }

    fn name(&self) -> &str {
        "text_native"
    }
}
