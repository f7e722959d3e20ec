//! Extraction capability implementations.
//!
//! One in-process adapter (plain text) plus HTTP clients for the remote
//! extraction services. Every adapter converts internal failures into
//! typed errors the worker is required to handle (retry, fallback, or
//! terminal failure); there are no catch-and-ignore paths.

pub mod generic_text;
pub mod ocr;
pub mod structured_doc;
pub mod text_native;
pub mod transcribe;

pub use generic_text::GenericTextAdapter;
pub use ocr::OcrAdapter;
pub use structured_doc::StructuredDocAdapter;
pub use text_native::TextNativeAdapter;
pub use transcribe::TranscribeAdapter;

use conductor_core::Result;

/// Probe `<scheme>://<host>:<port>/health` for an HTTP-backed capability.
/// Unreachable or non-2xx means unhealthy, never an error.
pub(crate) async fn health_probe(client: &reqwest::Client, endpoint: &str) -> Result<bool> {
    let url = match reqwest::Url::parse(endpoint) {
        Ok(mut url) => {
            url.set_path("/health");
            url.set_query(None);
            url
        }
        Err(_) => return Ok(false),
    };

    match client.get(url).send().await {
        Ok(response) => Ok(response.status().is_success()),
        Err(_) => Ok(false),
    }
}
