//! File relocation: archive and quarantine path schemes, and the move
//! primitive.
//!
//! Nothing in the pipeline deletes a file outright. Every terminal state
//! corresponds to a relocation, and the destination is recorded in the
//! ledger before anyone reports success.

use std::path::{Path, PathBuf};

use tracing::debug;

use conductor_core::Result;

/// Quarantine sub-folder for files that failed processing.
pub const QUARANTINE_PROCESSING_ERROR: &str = "_processing_error";

/// Quarantine sub-folder for unreadable/corrupt content.
pub const QUARANTINE_CORRUPT: &str = "_corrupt";

/// Quarantine sub-folder for duplicate drops of an already-tracked hash.
pub const QUARANTINE_DUPLICATES: &str = "_duplicates";

/// Deterministic, collision-resistant archive path:
/// `<root>/<hash[0..2]>/<hash>__<original_name>`.
///
/// Keying by hash means two files with the same name never collide, and
/// re-archiving identical content is a no-op by construction.
pub fn archive_path(archive_root: &Path, hash: &str, filename: &str) -> PathBuf {
    let shard = &hash[..hash.len().min(2)];
    archive_root
        .join(shard)
        .join(format!("{hash}__{filename}"))
}

/// Quarantine path: `<root>/<reason>/<hash>__<original_name>`.
pub fn quarantine_path(
    quarantine_root: &Path,
    reason: &str,
    hash: &str,
    filename: &str,
) -> PathBuf {
    quarantine_root.join(reason).join(format!("{hash}__{filename}"))
}

/// Staging path used to claim a file out of the inbox:
/// `<staging>/<hash>__<original_name>`.
pub fn staging_path(staging_root: &Path, hash: &str, filename: &str) -> PathBuf {
    staging_root.join(format!("{hash}__{filename}"))
}

/// Move a file, creating the destination directory as needed.
///
/// Rename first (atomic within a filesystem; this is what makes the
/// inbox claim safe); on cross-device rename failure, fall back to
/// copy-then-remove, removing the source only after the copy succeeded.
pub async fn move_file(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    match tokio::fs::rename(src, dst).await {
        Ok(()) => {}
        Err(_) => {
            tokio::fs::copy(src, dst).await?;
            tokio::fs::remove_file(src).await?;
        }
    }

    debug!(from = %src.display(), to = %dst.display(), "Relocated file");
    Ok(())
}
