//! Writing the snapshot artifact to its well-known location.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::snapshot::traits::PublishError;

/// A snapshot artifact that has been written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedSnapshot {
    pub path: PathBuf,

    pub size_bytes: u64,

    /// SHA-256 of the artifact bytes, hex encoded
    pub sha256: String,
}

/// Writes `bytes` to `output`, replacing any previous artifact.
///
/// The bytes land in a sibling temporary file first and are then renamed
/// over `output`, so readers never observe a half-written snapshot.
///
/// # Errors
///
/// Returns [`PublishError`] if the parent directory cannot be created or
/// the artifact cannot be written or moved into place.
pub fn publish(bytes: &[u8], output: &Path) -> Result<PublishedSnapshot, PublishError> {
    let file_name = output
        .file_name()
        .ok_or_else(|| PublishError::InvalidPath(output.to_path_buf()))?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| PublishError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let mut staging_name = file_name.to_os_string();
    staging_name.push(format!(".tmp-{}", std::process::id()));
    let staging = output.with_file_name(staging_name);

    let write = std::fs::write(&staging, bytes).and_then(|()| std::fs::rename(&staging, output));
    if let Err(source) = write {
        let _ = std::fs::remove_file(&staging);
        return Err(PublishError::Write {
            path: output.to_path_buf(),
            source,
        });
    }

    let sha256 = hex::encode(Sha256::digest(bytes));
    debug!(path = %output.display(), size = bytes.len(), %sha256, "Snapshot written");

    Ok(PublishedSnapshot {
        path: output.to_path_buf(),
        size_bytes: bytes.len() as u64,
        sha256,
    })
}
