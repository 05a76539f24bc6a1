//! Ephemeral install workspaces.
//!
//! A [`Workspace`] is a uniquely named directory under the snapshot root
//! holding the manifest and, after installation, the installed package
//! trees. It is removed when the guard is dropped.

use sha3::digest::{ExtendableOutput, Update, XofReader};
use sha3::Shake256;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::model::Manifest;
use crate::snapshot::traits::ProvisionError;

/// File name the manifest is written to inside the workspace.
pub const MANIFEST_FILE: &str = "package.json";

/// Directory the installer materializes package trees into.
pub const PACKAGES_DIR: &str = "node_modules";

/// Length of the identifier digest in bytes.
pub const ID_BYTES: usize = 8;

/// Provisioning attempts before an id collision is reported.
pub const COLLISION_ATTEMPTS: u128 = 8;

/// Derives a workspace identifier from a millisecond timestamp.
///
/// SHAKE256 of the decimal timestamp, read to [`ID_BYTES`] bytes and hex
/// encoded. Only a uniqueness aid: identical timestamps yield identical ids.
pub fn workspace_id(timestamp_ms: u128) -> String {
    let mut hasher = Shake256::default();
    hasher.update(timestamp_ms.to_string().as_bytes());
    let mut id = [0u8; ID_BYTES];
    hasher.finalize_xof().read(&mut id);
    hex::encode(id)
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Scoped ownership of an install workspace.
///
/// # RAII Cleanup
///
/// `Workspace` implements [`Drop`] so the directory is removed on every
/// exit path of a run, including early returns from failed stages.
/// Removal failures are logged and never escalated. It does **not**
/// implement `Clone`; share `path` instead.
#[derive(Debug)]
pub struct Workspace {
    /// Workspace directory
    pub path: PathBuf,

    /// Hex identifier embedded in the directory name
    pub id: String,
}

impl Workspace {
    /// Provisions a workspace under `root` using the current time as id input.
    ///
    /// When a directory with the derived id already exists the timestamp
    /// input is advanced by one millisecond, up to [`COLLISION_ATTEMPTS`]
    /// times. An existing workspace is never reused.
    ///
    /// # Errors
    ///
    /// See [`Workspace::provision_at`].
    pub fn provision(root: &Path, manifest: &Manifest) -> Result<Self, ProvisionError> {
        let base = now_ms();
        let mut attempt = 0;
        loop {
            match Self::provision_at(root, manifest, base + attempt) {
                Err(ProvisionError::Collision(path)) if attempt + 1 < COLLISION_ATTEMPTS => {
                    debug!(path = %path.display(), "Workspace id collision, advancing");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Provisions `root/snapshot-<id>` and writes the manifest into it.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] if:
    /// - `root` or the workspace directory cannot be created
    /// - a workspace with the same id already exists
    /// - the manifest cannot be encoded or written
    pub fn provision_at(
        root: &Path,
        manifest: &Manifest,
        timestamp_ms: u128,
    ) -> Result<Self, ProvisionError> {
        std::fs::create_dir_all(root).map_err(|source| ProvisionError::CreateDir {
            path: root.to_path_buf(),
            source,
        })?;

        let id = workspace_id(timestamp_ms);
        let path = root.join(format!("snapshot-{id}"));

        if let Err(source) = std::fs::create_dir(&path) {
            return Err(if source.kind() == std::io::ErrorKind::AlreadyExists {
                ProvisionError::Collision(path)
            } else {
                ProvisionError::CreateDir { path, source }
            });
        }

        // From here on the guard owns the directory; a failed manifest write
        // removes it again on return.
        let workspace = Self { path, id };

        let contents = manifest.to_json()?;
        let manifest_path = workspace.path.join(MANIFEST_FILE);
        std::fs::write(&manifest_path, contents).map_err(|source| {
            ProvisionError::WriteManifest {
                path: manifest_path.clone(),
                source,
            }
        })?;

        debug!(
            path = %workspace.path.display(),
            dependencies = manifest.dependencies.len(),
            "Workspace provisioned"
        );
        Ok(workspace)
    }

    /// Resolves `relative` against the workspace root, rejecting any path
    /// that escapes the root (path traversal guard).
    ///
    /// # Errors
    ///
    /// Returns `Err` if `relative` contains `..` or is absolute.
    pub fn safe_child(&self, relative: &Path) -> Result<PathBuf, ProvisionError> {
        for component in relative.components() {
            match component {
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(ProvisionError::PathTraversal {
                        attempted: relative.display().to_string(),
                    });
                }
                _ => {}
            }
        }
        Ok(self.path.join(relative))
    }

    /// Location of an installed package tree.
    ///
    /// Scoped names (`@scope/pkg`) resolve to nested directories.
    pub fn package_dir(&self, name: &str) -> Result<PathBuf, ProvisionError> {
        self.safe_child(&Path::new(PACKAGES_DIR).join(name))
    }

    /// Splits manifest dependencies into installed and missing names.
    ///
    /// A name that would resolve outside the workspace counts as missing.
    pub fn check_packages(&self, manifest: &Manifest) -> PackageCheck {
        let mut check = PackageCheck::default();
        for name in manifest.dependencies.keys() {
            match self.package_dir(name) {
                Ok(dir) if dir.is_dir() => {
                    debug!(package = %name, path = %dir.display(), "Package installed");
                    check.installed.push(name.clone());
                }
                Ok(dir) => {
                    warn!(package = %name, path = %dir.display(), "Package directory missing");
                    check.missing.push(name.clone());
                }
                Err(e) => {
                    warn!(package = %name, error = %e, "Package name rejected");
                    check.missing.push(name.clone());
                }
            }
        }
        check
    }
}

/// Result of [`Workspace::check_packages`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PackageCheck {
    pub installed: Vec<String>,
    pub missing: Vec<String>,
}

/// Removes `path` recursively, restoring owner write access on
/// directories once if the first attempt is denied.
fn remove_tree(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            make_dirs_writable(path);
            std::fs::remove_dir_all(path)
        }
        other => other,
    }
}

#[cfg(unix)]
fn make_dirs_writable(root: &Path) {
    use std::os::unix::fs::PermissionsExt;

    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
    {
        if let Ok(meta) = entry.metadata() {
            let mut perms = meta.permissions();
            perms.set_mode(perms.mode() | 0o700);
            let _ = std::fs::set_permissions(entry.path(), perms);
        }
    }
}

#[cfg(not(unix))]
fn make_dirs_writable(root: &Path) {
    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if let Ok(meta) = entry.metadata() {
            let mut perms = meta.permissions();
            if perms.readonly() {
                #[allow(clippy::permissions_set_readonly_false)]
                perms.set_readonly(false);
                let _ = std::fs::set_permissions(entry.path(), perms);
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.path.exists() {
            return;
        }
        match remove_tree(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Workspace removed"),
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove workspace"
            ),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
