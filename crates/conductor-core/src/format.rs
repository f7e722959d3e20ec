//! File format detection: magic bytes first, extension fallback second.
//!
//! Detection never fails: anything unrecognized lands in
//! [`ContentCategory::Unknown`] so no file is silently dropped. Binary
//! container formats (ZIP-based Office files, RIFF, MP4 `ftyp`) get a
//! second-stage probe because their leading signature alone is ambiguous.

use crate::defaults::{CONTAINER_PROBE_WINDOW, MAGIC_HEADER_WINDOW};
use crate::models::{ContentCategory, DetectionMethod, FileTypeInfo};

/// Leading-byte signatures checked before anything else.
///
/// Order matters: longer, more specific signatures first.
const MAGIC_SIGNATURES: &[(&[u8], ContentCategory, &str)] = &[
    (b"%PDF", ContentCategory::Document, "application/pdf"),
    (
        &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A],
        ContentCategory::Image,
        "image/png",
    ),
    (&[0xFF, 0xD8, 0xFF], ContentCategory::Image, "image/jpeg"),
    (b"GIF87a", ContentCategory::Image, "image/gif"),
    (b"GIF89a", ContentCategory::Image, "image/gif"),
    (b"II*\x00", ContentCategory::Image, "image/tiff"),
    (b"MM\x00*", ContentCategory::Image, "image/tiff"),
    (b"fLaC", ContentCategory::Audio, "audio/flac"),
    (b"OggS", ContentCategory::Audio, "audio/ogg"),
    (b"ID3", ContentCategory::Audio, "audio/mpeg"),
    (&[0xFF, 0xFB], ContentCategory::Audio, "audio/mpeg"),
    (&[0xFF, 0xFA], ContentCategory::Audio, "audio/mpeg"),
    (
        &[0x1A, 0x45, 0xDF, 0xA3],
        ContentCategory::Video,
        "video/x-matroska",
    ),
    (
        &[0x1F, 0x8B],
        ContentCategory::Archive,
        "application/gzip",
    ),
    (
        b"Rar!\x1a\x07",
        ContentCategory::Archive,
        "application/x-rar-compressed",
    ),
    (
        b"7z\xbc\xaf\x27\x1c",
        ContentCategory::Archive,
        "application/x-7z-compressed",
    ),
    (
        b"SQLite format 3",
        ContentCategory::Unknown,
        "application/x-sqlite3",
    ),
    (
        b"{\\rtf",
        ContentCategory::Document,
        "application/rtf",
    ),
];

/// Detect a file's type from its bytes and name.
///
/// Stages: local signature table → ZIP/OLE2/RIFF/ftyp container probe →
/// `infer` crate → extension mapping → fail-closed `Unknown`.
pub fn detect(data: &[u8], filename: &str) -> FileTypeInfo {
    let header = &data[..data.len().min(MAGIC_HEADER_WINDOW)];

    for (magic, category, mime) in MAGIC_SIGNATURES {
        if header.starts_with(magic) {
            return FileTypeInfo {
                category: *category,
                mime_type: (*mime).to_string(),
                detection: DetectionMethod::Magic,
            };
        }
    }

    // ZIP container: could be plain zip, OOXML, ODF, EPUB.
    if header.starts_with(b"PK\x03\x04") {
        return probe_zip(data);
    }

    // OLE2 compound file: legacy Office or Outlook MSG.
    if header.starts_with(&[0xD0, 0xCF, 0x11, 0xE0]) {
        return probe_ole2(data);
    }

    // RIFF container: WAV, AVI, WebP share the same leading bytes.
    if header.starts_with(b"RIFF") && data.len() >= 12 {
        return probe_riff(data);
    }

    // ISO media box (MP4/MOV/M4A) carries an `ftyp` box near the start.
    if let Some(info) = probe_ftyp(header) {
        return info;
    }

    // Secondary: the infer crate covers formats the local table omits.
    if let Some(kind) = infer::get(data) {
        return FileTypeInfo {
            category: category_for_mime(kind.mime_type()),
            mime_type: kind.mime_type().to_string(),
            detection: DetectionMethod::Magic,
        };
    }

    // Extension fallback for formats without magic bytes (text family).
    if let Some((category, mime)) = by_extension(filename) {
        return FileTypeInfo {
            category,
            mime_type: mime.to_string(),
            detection: DetectionMethod::Extension,
        };
    }

    FileTypeInfo {
        category: ContentCategory::Unknown,
        mime_type: "application/octet-stream".to_string(),
        detection: DetectionMethod::Fallback,
    }
}

/// Distinguish OOXML/ODF/EPUB from a plain ZIP by scanning for the
/// characteristic member names in the central directory window.
fn probe_zip(data: &[u8]) -> FileTypeInfo {
    let window = &data[..data.len().min(CONTAINER_PROBE_WINDOW)];

    let container = |needle: &[u8], category, mime: &str| {
        contains(window, needle).then(|| FileTypeInfo {
            category,
            mime_type: mime.to_string(),
            detection: DetectionMethod::Container,
        })
    };

    container(
        b"word/",
        ContentCategory::Document,
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    )
    .or_else(|| {
        container(
            b"xl/",
            ContentCategory::Spreadsheet,
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        )
    })
    .or_else(|| {
        container(
            b"ppt/",
            ContentCategory::Document,
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        )
    })
    .or_else(|| {
        container(
            b"META-INF/container.xml",
            ContentCategory::Document,
            "application/epub+zip",
        )
    })
    .unwrap_or(FileTypeInfo {
        category: ContentCategory::Archive,
        mime_type: "application/zip".to_string(),
        detection: DetectionMethod::Magic,
    })
}

/// Distinguish legacy Office formats inside an OLE2 compound file by the
/// UTF-16 stream names they embed.
fn probe_ole2(data: &[u8]) -> FileTypeInfo {
    let window = &data[..data.len().min(CONTAINER_PROBE_WINDOW)];

    let found = |needle: &[u8]| contains(window, needle);

    let (category, mime) = if found(b"W\x00o\x00r\x00d") {
        (ContentCategory::Document, "application/msword")
    } else if found(b"W\x00o\x00r\x00k\x00b\x00o\x00o\x00k") {
        (ContentCategory::Spreadsheet, "application/vnd.ms-excel")
    } else if found(b"__substg1") {
        (ContentCategory::Email, "application/vnd.ms-outlook")
    } else {
        (ContentCategory::Document, "application/x-ole-storage")
    };

    FileTypeInfo {
        category,
        mime_type: mime.to_string(),
        detection: DetectionMethod::Container,
    }
}

fn probe_riff(data: &[u8]) -> FileTypeInfo {
    let (category, mime) = match &data[8..12] {
        b"WAVE" => (ContentCategory::Audio, "audio/wav"),
        b"AVI " => (ContentCategory::Video, "video/x-msvideo"),
        b"WEBP" => (ContentCategory::Image, "image/webp"),
        _ => (ContentCategory::Unknown, "application/octet-stream"),
    };
    FileTypeInfo {
        category,
        mime_type: mime.to_string(),
        detection: DetectionMethod::Container,
    }
}

fn probe_ftyp(header: &[u8]) -> Option<FileTypeInfo> {
    let pos = header.windows(4).position(|w| w == b"ftyp")?;
    let brand = header.get(pos + 4..pos + 8)?;

    let (category, mime) = if brand.starts_with(b"M4A") || brand.starts_with(b"M4B") {
        (ContentCategory::Audio, "audio/mp4")
    } else if brand.starts_with(b"qt") {
        (ContentCategory::Video, "video/quicktime")
    } else {
        // isom / mp41 / mp42 / m4v and friends
        (ContentCategory::Video, "video/mp4")
    };

    Some(FileTypeInfo {
        category,
        mime_type: mime.to_string(),
        detection: DetectionMethod::Container,
    })
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

fn category_for_mime(mime: &str) -> ContentCategory {
    if mime.starts_with("image/") {
        ContentCategory::Image
    } else if mime.starts_with("audio/") {
        ContentCategory::Audio
    } else if mime.starts_with("video/") {
        ContentCategory::Video
    } else if mime.starts_with("text/") {
        ContentCategory::Text
    } else {
        match mime {
            "application/pdf" => ContentCategory::Document,
            "application/zip" | "application/gzip" => ContentCategory::Archive,
            _ => ContentCategory::Unknown,
        }
    }
}

fn by_extension(filename: &str) -> Option<(ContentCategory, &'static str)> {
    let ext = filename.rsplit('.').next()?.to_ascii_lowercase();
    let mapped = match ext.as_str() {
        "txt" => (ContentCategory::Text, "text/plain"),
        "md" => (ContentCategory::Text, "text/markdown"),
        "html" | "htm" => (ContentCategory::Text, "text/html"),
        "json" => (ContentCategory::Text, "application/json"),
        "xml" => (ContentCategory::Text, "application/xml"),
        "yaml" | "yml" => (ContentCategory::Text, "application/yaml"),
        "csv" => (ContentCategory::Spreadsheet, "text/csv"),
        "tsv" => (ContentCategory::Spreadsheet, "text/tab-separated-values"),
        "pdf" => (ContentCategory::Document, "application/pdf"),
        "doc" => (ContentCategory::Document, "application/msword"),
        "docx" => (
            ContentCategory::Document,
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ),
        "rtf" => (ContentCategory::Document, "application/rtf"),
        "xls" => (ContentCategory::Spreadsheet, "application/vnd.ms-excel"),
        "xlsx" => (
            ContentCategory::Spreadsheet,
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        ),
        "jpg" | "jpeg" => (ContentCategory::Image, "image/jpeg"),
        "png" => (ContentCategory::Image, "image/png"),
        "tif" | "tiff" => (ContentCategory::Image, "image/tiff"),
        "webp" => (ContentCategory::Image, "image/webp"),
        "mp3" => (ContentCategory::Audio, "audio/mpeg"),
        "wav" => (ContentCategory::Audio, "audio/wav"),
        "m4a" => (ContentCategory::Audio, "audio/mp4"),
        "flac" => (ContentCategory::Audio, "audio/flac"),
        "ogg" => (ContentCategory::Audio, "audio/ogg"),
        "mp4" | "m4v" => (ContentCategory::Video, "video/mp4"),
        "mkv" => (ContentCategory::Video, "video/x-matroska"),
        "mov" => (ContentCategory::Video, "video/quicktime"),
        "avi" => (ContentCategory::Video, "video/x-msvideo"),
        "webm" => (ContentCategory::Video, "video/webm"),
        "eml" => (ContentCategory::Email, "message/rfc822"),
        "msg" => (ContentCategory::Email, "application/vnd.ms-outlook"),
        "zip" => (ContentCategory::Archive, "application/zip"),
        "tar" => (ContentCategory::Archive, "application/x-tar"),
        "gz" => (ContentCategory::Archive, "application/gzip"),
        "rar" => (ContentCategory::Archive, "application/x-rar-compressed"),
        "7z" => (ContentCategory::Archive, "application/x-7z-compressed"),
        _ => return None,
    };
    Some(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_pdf_magic() {
        let info = detect(b"%PDF-1.4\nrest of file", "renamed.bin");
        assert_eq!(info.category, ContentCategory::Document);
        assert_eq!(info.mime_type, "application/pdf");
        assert_eq!(info.detection, DetectionMethod::Magic);
    }

    #[test]
    fn test_detect_png_magic() {
        let mut data = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        data.extend_from_slice(&[0u8; 16]);
        let info = detect(&data, "photo.dat");
        assert_eq!(info.category, ContentCategory::Image);
        assert_eq!(info.mime_type, "image/png");
    }

    #[test]
    fn test_magic_wins_over_extension() {
        // PDF bytes with a .txt name: bytes win.
        let info = detect(b"%PDF-1.7 content", "notes.txt");
        assert_eq!(info.category, ContentCategory::Document);
        assert_eq!(info.detection, DetectionMethod::Magic);
    }

    #[test]
    fn test_extension_fallback_for_text() {
        let info = detect(b"just some plain notes", "notes.txt");
        assert_eq!(info.category, ContentCategory::Text);
        assert_eq!(info.mime_type, "text/plain");
        assert_eq!(info.detection, DetectionMethod::Extension);
    }

    #[test]
    fn test_csv_routes_to_spreadsheet() {
        let info = detect(b"id,token\n1,abc\n", "table.csv");
        assert_eq!(info.category, ContentCategory::Spreadsheet);
    }

    #[test]
    fn test_zip_container_docx() {
        let mut data = b"PK\x03\x04".to_vec();
        data.extend_from_slice(b"\x14\x00\x00\x00word/document.xml");
        let info = detect(&data, "report.docx");
        assert_eq!(info.category, ContentCategory::Document);
        assert_eq!(info.detection, DetectionMethod::Container);
    }

    #[test]
    fn test_zip_container_plain_zip() {
        let mut data = b"PK\x03\x04".to_vec();
        data.extend_from_slice(b"\x14\x00\x00\x00some/random/member.bin");
        let info = detect(&data, "bundle.zip");
        assert_eq!(info.category, ContentCategory::Archive);
        assert_eq!(info.mime_type, "application/zip");
    }

    #[test]
    fn test_riff_wav() {
        let mut data = b"RIFF".to_vec();
        data.extend_from_slice(&[0, 0, 0, 0]);
        data.extend_from_slice(b"WAVEfmt ");
        let info = detect(&data, "clip.bin");
        assert_eq!(info.category, ContentCategory::Audio);
        assert_eq!(info.mime_type, "audio/wav");
    }

    #[test]
    fn test_ftyp_mp4() {
        let mut data = vec![0, 0, 0, 0x18];
        data.extend_from_slice(b"ftypisom");
        data.extend_from_slice(&[0u8; 16]);
        let info = detect(&data, "video.part");
        assert_eq!(info.category, ContentCategory::Video);
        assert_eq!(info.mime_type, "video/mp4");
    }

    #[test]
    fn test_unknown_fails_closed() {
        let info = detect(&[0x00, 0x01, 0x02, 0x03], "mystery.xyz");
        assert_eq!(info.category, ContentCategory::Unknown);
        assert_eq!(info.mime_type, "application/octet-stream");
        assert_eq!(info.detection, DetectionMethod::Fallback);
    }

    #[test]
    fn test_empty_data_uses_extension() {
        let info = detect(b"", "empty.md");
        assert_eq!(info.category, ContentCategory::Text);
        assert_eq!(info.mime_type, "text/markdown");
    }

    #[test]
    fn test_eml_extension() {
        let info = detect(b"From: a@example.com\n", "mail.eml");
        assert_eq!(info.category, ContentCategory::Email);
        assert_eq!(info.mime_type, "message/rfc822");
    }
}
