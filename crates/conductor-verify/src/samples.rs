//! Verification sample sets and generators.
//!
//! Each sample embeds a distinguishing token so retrieval can be traced
//! back to exactly this document. Generators only cover formats that can
//! be synthesized deterministically; anything else must be provided as a
//! real fixture file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use conductor_core::{Error, Result};

/// Which sample set a run exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleMode {
    /// Core text-family and document formats.
    Base,
    /// Base plus extended text formats.
    Overlay,
}

impl SampleMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleMode::Base => "base",
            SampleMode::Overlay => "overlay",
        }
    }
}

/// One sample in the verification set.
#[derive(Debug, Clone)]
pub struct SampleSpec {
    pub id: &'static str,
    pub rel_path: &'static str,
    pub token: &'static str,
    overlay_only: bool,
}

/// The full sample table for a mode.
pub fn build_samples(mode: SampleMode) -> Vec<SampleSpec> {
    let all = [
        SampleSpec { id: "txt", rel_path: "text/hello.txt", token: "VERIFY_TOKEN_TXT", overlay_only: false },
        SampleSpec { id: "md", rel_path: "text/note.md", token: "VERIFY_TOKEN_MD", overlay_only: false },
        SampleSpec { id: "html", rel_path: "text/page.html", token: "VERIFY_TOKEN_HTML", overlay_only: false },
        SampleSpec { id: "json", rel_path: "text/sample.json", token: "VERIFY_TOKEN_JSON", overlay_only: false },
        SampleSpec { id: "csv", rel_path: "tables/sample.csv", token: "VERIFY_TOKEN_CSV", overlay_only: false },
        SampleSpec { id: "eml", rel_path: "email/mail.eml", token: "VERIFY_TOKEN_EML", overlay_only: false },
        SampleSpec { id: "pdf", rel_path: "pdf/text.pdf", token: "VERIFY_TOKEN_PDF", overlay_only: false },
        SampleSpec { id: "yaml", rel_path: "overlay/config.yaml", token: "VERIFY_TOKEN_YAML", overlay_only: true },
        SampleSpec { id: "tsv", rel_path: "overlay/table.tsv", token: "VERIFY_TOKEN_TSV", overlay_only: true },
    ];
    all.into_iter()
        .filter(|s| mode == SampleMode::Overlay || !s.overlay_only)
        .collect()
}

/// Ensure the sample file exists under `samples_root`, generating it
/// when missing. `token` is embedded in the content; harness runs pass a
/// run-scoped token so every run ingests distinct bytes. Returns the
/// absolute path.
pub async fn materialize(spec: &SampleSpec, samples_root: &Path, token: &str) -> Result<PathBuf> {
    let path = samples_root.join(spec.rel_path);
    if path.exists() {
        return Ok(path);
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    let content: Vec<u8> = match ext.as_str() {
        "txt" => format!("{token}\n").into_bytes(),
        "md" => format!("# Note\n\n{token}\n").into_bytes(),
        "html" => format!("<html><body><p>{token}</p></body></html>\n").into_bytes(),
        "json" => serde_json::to_vec_pretty(&serde_json::json!({ "token": token }))?,
        "csv" => format!("id,token\n1,{token}\n").into_bytes(),
        "tsv" => format!("id\ttoken\n1\t{token}\n").into_bytes(),
        "yaml" => format!("token: {token}\n").into_bytes(),
        "eml" => format!(
            "From: verify@example.com\n\
             To: verify@example.com\n\
             Subject: {token}\n\
             Date: Tue, 01 Jan 2030 00:00:00 +0000\n\
             Content-Type: text/plain; charset=utf-8\n\
             \n\
             Hello {token}\n"
        )
        .into_bytes(),
        "pdf" => minimal_pdf(token),
        other => {
            return Err(Error::InvalidInput(format!(
                "No generator for sample suffix .{other}"
            )))
        }
    };

    tokio::fs::write(&path, content).await?;
    Ok(path)
}

/// Build a minimal single-page PDF with the text drawn in Helvetica.
/// Enough structure for any conforming text extractor to find the token.
pub fn minimal_pdf(text: &str) -> Vec<u8> {
    let escaped = text
        .replace('\\', "\\\\")
        .replace('(', "\\(")
        .replace(')', "\\)");
    let stream = format!("BT /F1 12 Tf 72 72 Td ({escaped}) Tj ET");

    let objects = [
        "1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n".to_string(),
        "2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n".to_string(),
        "3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 300 144] \
         /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n"
            .to_string(),
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            stream.len(),
            stream
        ),
        "5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n".to_string(),
    ];

    let mut pdf: Vec<u8> = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for obj in &objects {
        offsets.push(pdf.len());
        pdf.extend_from_slice(obj.as_bytes());
    }

    let xref_pos = pdf.len();
    pdf.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    pdf.extend_from_slice(b"0000000000 65535 f \n");
    for off in offsets {
        pdf.extend_from_slice(format!("{off:010} 00000 n \n").as_bytes());
    }
    pdf.extend_from_slice(
        format!(
            "trailer << /Root 1 0 R /Size {} >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_pos
        )
        .as_bytes(),
    );
    pdf
}
