//! Tree encoders producing the snapshot payload.

use std::path::Path;
use walkdir::WalkDir;

use crate::snapshot::traits::{SerializeError, SnapshotSerializer};

/// Encodes a directory tree as an uncompressed tar stream.
///
/// Entries are relative to the serialized root, emitted in file-name order
/// with deterministic headers (fixed mtime/ownership), so an unchanged tree
/// always yields identical bytes. Symlinks are stored as links.
#[derive(Debug, Clone, Copy, Default)]
pub struct TarSerializer;

impl SnapshotSerializer for TarSerializer {
    fn serialize(&self, root: &Path) -> Result<Vec<u8>, SerializeError> {
        let mut builder = tar::Builder::new(Vec::new());
        builder.mode(tar::HeaderMode::Deterministic);
        builder.follow_symlinks(false);

        for entry in WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|source| SerializeError::Walk {
                root: root.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let appended = if entry.file_type().is_dir() {
                builder.append_dir(relative, path)
            } else {
                builder.append_path_with_name(path, relative)
            };
            appended.map_err(|source| SerializeError::Encode {
                path: path.to_path_buf(),
                source,
            })?;
        }

        builder.into_inner().map_err(|source| SerializeError::Encode {
            path: root.to_path_buf(),
            source,
        })
    }

    fn format(&self) -> &str {
        "tar"
    }
}
