//! Stage abstractions and error types for the snapshot pipeline.
//!
//! This module defines the seams of the pipeline:
//! - Dependency installation via [`Installer`]
//! - Tree encoding via [`SnapshotSerializer`]
//! - One error type per stage, wrapped by
//!   [`PipelineError`](crate::snapshot::pipeline::PipelineError)

use std::path::{Path, PathBuf};
use thiserror::Error;

// ============================================================================
// Installer Stage
// ============================================================================

/// Populates a provisioned workspace with installed package trees.
///
/// Installation is a blocking call: it returns once the external tool has
/// exited. A tool that ran but failed is reported through
/// [`InstallOutput::success`] rather than as an `Err`, so callers see both
/// outcomes as plain values. `Err` is reserved for the tool not running at
/// all.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the pipeline moves them onto the
/// blocking thread pool.
pub trait Installer: Send + Sync {
    /// Runs the install step with `workspace` as working directory.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::Spawn`] if the installer process could not be
    /// started (missing binary, permissions).
    fn install(&self, workspace: &Path) -> Result<InstallOutput, InstallError>;

    /// Human-readable name used in logs.
    fn name(&self) -> &str;
}

/// Captured outcome of one installer run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutput {
    /// Process exit code; `None` when terminated by a signal
    pub exit_code: Option<i32>,

    pub stdout: String,

    pub stderr: String,
}

impl InstallOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

// ============================================================================
// Serializer Stage
// ============================================================================

/// Encodes a directory tree into a single binary payload.
///
/// The payload format belongs to whoever consumes the snapshot; the
/// pipeline only persists the returned bytes.
pub trait SnapshotSerializer: Send + Sync {
    /// Serializes everything below `root`.
    ///
    /// # Errors
    ///
    /// Returns [`SerializeError`] if the tree cannot be read or encoded.
    fn serialize(&self, root: &Path) -> Result<Vec<u8>, SerializeError>;

    /// Short format identifier (e.g., `"tar"`).
    fn format(&self) -> &str;
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while provisioning a workspace.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Root or workspace directory could not be created
    #[error("Failed to create workspace directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A workspace with the same identifier already exists
    #[error("Workspace '{0}' already exists")]
    Collision(PathBuf),

    /// Manifest could not be encoded
    #[error("Failed to encode manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    /// Manifest could not be written into the workspace
    #[error("Failed to write manifest '{path}': {source}")]
    WriteManifest {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A path inside the workspace would escape its root (path traversal)
    #[error("Path traversal attempt rejected: '{attempted}'")]
    PathTraversal { attempted: String },
}

/// Errors that can occur during dependency installation.
#[derive(Error, Debug)]
pub enum InstallError {
    /// Installer process could not be started
    #[error("Failed to start installer '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Installer ran and reported failure
    #[error("Installer '{installer}' failed with exit code {}: {stderr}", display_code(.exit_code))]
    Failed {
        installer: String,
        exit_code: Option<i32>,
        stderr: String,
    },
}

fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "<signal>".to_string(), |c| c.to_string())
}

/// Errors that can occur while pruning the installed tree.
#[derive(Error, Debug)]
pub enum FilterError {
    /// Ignore pattern is not a valid glob
    #[error("Invalid ignore pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A matching file could not be removed (abort policy only)
    #[error("Failed to remove '{path}': {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory enumeration failed (abort policy only)
    #[error("Failed to scan workspace: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Errors that can occur while encoding the tree.
#[derive(Error, Debug)]
pub enum SerializeError {
    /// Directory enumeration failed
    #[error("Failed to scan '{root}': {source}")]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// An entry could not be read or appended
    #[error("Failed to encode '{path}': {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur while writing the artifact.
#[derive(Error, Debug)]
pub enum PublishError {
    /// Output directory could not be created
    #[error("Failed to create output directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Artifact bytes could not be written or moved into place
    #[error("Failed to write snapshot '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Output path has no file name component
    #[error("Invalid output path '{0}'")]
    InvalidPath(PathBuf),
}

// ============================================================================
// Tests
// ============================================================================
