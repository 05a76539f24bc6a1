//! Snapshot pipeline executor.
//!
//! This module provides the [`SnapshotPipeline`] coordinator that executes
//! the sequential snapshot stages (Provision → Install → Filter →
//! Serialize → Publish) with:
//! - Blocking stages moved onto tokio's blocking pool, one at a time
//! - Structured logging via `tracing`
//! - Automatic workspace cleanup via RAII (`Drop` on [`Workspace`])

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::model::SnapshotConfig;
use crate::snapshot::filter::{prune, IgnorePatterns};
use crate::snapshot::installer::CommandInstaller;
use crate::snapshot::publish::{publish, PublishedSnapshot};
use crate::snapshot::serializer::TarSerializer;
use crate::snapshot::traits::{
    FilterError, InstallError, Installer, ProvisionError, PublishError, SerializeError,
    SnapshotSerializer,
};
use crate::snapshot::workspace::Workspace;

// ============================================================================
// Pipeline Types
// ============================================================================

/// Complete snapshot result with the published artifact and statistics.
#[derive(Debug)]
pub struct SnapshotResult {
    /// Artifact written to the configured output path
    pub artifact: PublishedSnapshot,

    /// Identifier of the (already removed) workspace the snapshot was built in
    pub workspace_id: String,

    /// Performance and processing statistics
    pub stats: SnapshotStats,
}

/// Statistics about a snapshot run.
#[derive(Debug, Default, Clone)]
pub struct SnapshotStats {
    /// Total time spent on the entire run (milliseconds)
    pub total_duration_ms: u64,

    /// Time spent in the installer (milliseconds)
    pub install_duration_ms: u64,

    /// Time spent pruning (milliseconds)
    pub filter_duration_ms: u64,

    /// Time spent serializing and publishing (milliseconds)
    pub serialize_duration_ms: u64,

    /// Manifest dependencies found on disk after install
    pub packages_installed: usize,

    /// Manifest dependencies the installer did not materialize
    pub packages_missing: usize,

    /// Number of files pruned
    pub files_removed: usize,

    /// Total size of pruned files (bytes)
    pub bytes_removed: u64,

    /// Files that matched but could not be pruned
    pub filter_failures: usize,

    /// Size of the published artifact (bytes)
    pub artifact_size_bytes: u64,
}

// ============================================================================
// Pipeline Errors
// ============================================================================

/// Errors that can occur during pipeline execution.
///
/// Every variant aborts the remaining stages. The workspace, if one was
/// provisioned, is removed before the error reaches the caller.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// Workspace could not be created or seeded with the manifest
    #[error("Provisioning failed: {0}")]
    Provisioning(#[from] ProvisionError),

    /// Installer could not start or exited unsuccessfully
    #[error("Installation failed: {0}")]
    Installation(#[from] InstallError),

    /// Invalid ignore patterns, or a prune failure under the abort policy
    #[error("Filtering failed: {0}")]
    Filter(#[from] FilterError),

    /// Workspace tree could not be encoded
    #[error("Serialization failed: {0}")]
    Serialization(#[from] SerializeError),

    /// Artifact could not be written
    #[error("Publishing failed: {0}")]
    Publish(#[from] PublishError),

    /// A blocking stage task panicked or was cancelled
    #[error("Stage '{stage}' did not complete: {reason}")]
    StageJoin { stage: String, reason: String },

    /// The executor could not schedule the run
    #[error("Executor error: {0}")]
    Executor(String),
}

// ============================================================================
// Pipeline Executor
// ============================================================================

/// Snapshot pipeline with pluggable installer and serializer stages.
///
/// The pipeline coordinates sequential execution of:
/// 1. **Provisioning**: fresh workspace with the manifest written into it
/// 2. **Installation**: external installer run inside the workspace
/// 3. **Filtering**: prune files matching the ignore pattern set
/// 4. **Serialization**: encode the pruned tree into one payload
/// 5. **Publishing**: write the payload to the output path
///
/// A stage only starts once the previous one succeeded, so the artifact is
/// never written from a workspace that was not fully installed and pruned.
///
/// # Example
///
/// ```ignore
/// use snapshot_builder::SnapshotPipeline;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pipeline = SnapshotPipeline::with_defaults(std::env::current_dir()?);
///     let result = pipeline.execute().await?;
///     println!("Wrote {}", result.artifact.path.display());
///     Ok(())
/// }
/// ```
pub struct SnapshotPipeline<I, S>
where
    I: Installer + 'static,
    S: SnapshotSerializer + 'static,
{
    config: SnapshotConfig,

    /// Installation stage implementation
    installer: Arc<I>,

    /// Serialization stage implementation
    serializer: Arc<S>,
}

impl SnapshotPipeline<CommandInstaller, TarSerializer> {
    /// Pipeline rooted at `root` with the default configuration,
    /// `npm install` and the tar serializer.
    pub fn with_defaults(root: impl Into<PathBuf>) -> Self {
        Self::new(
            SnapshotConfig::new(root),
            CommandInstaller::default(),
            TarSerializer,
        )
    }
}

impl<I, S> SnapshotPipeline<I, S>
where
    I: Installer + 'static,
    S: SnapshotSerializer + 'static,
{
    pub fn new(config: SnapshotConfig, installer: I, serializer: S) -> Self {
        Self {
            config,
            installer: Arc::new(installer),
            serializer: Arc::new(serializer),
        }
    }

    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    pub fn installer(&self) -> &I {
        &self.installer
    }

    /// Executes the complete snapshot pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if:
    /// - The ignore patterns are invalid (checked before anything is created)
    /// - The workspace cannot be provisioned
    /// - The installer cannot start or exits unsuccessfully
    /// - Pruning fails under [`FailurePolicy::Abort`](crate::FailurePolicy::Abort)
    /// - The tree cannot be serialized or the artifact cannot be written
    pub async fn execute(&self) -> Result<SnapshotResult, PipelineError> {
        let start = Instant::now();
        let mut stats = SnapshotStats::default();

        let patterns = IgnorePatterns::new(self.config.ignore_patterns.iter().cloned())?;

        // ====================================================================
        // Stage 1: Provisioning
        // ====================================================================
        //
        // From here on `workspace` is dropped on every return path, which
        // removes the directory. No stage below needs its own cleanup.

        let root = self.config.root.clone();
        let manifest = self.config.manifest.clone();
        let workspace =
            run_blocking("provision", move || Workspace::provision(&root, &manifest)).await??;

        info!(
            workspace = %workspace.path.display(),
            dependencies = self.config.manifest.dependencies.len(),
            "Workspace provisioned"
        );

        // ====================================================================
        // Stage 2: Installation
        // ====================================================================

        info!(installer = self.installer.name(), "Starting install stage");
        let install_start = Instant::now();

        let installer = Arc::clone(&self.installer);
        let dir = workspace.path.clone();
        let output = run_blocking("install", move || installer.install(&dir)).await??;

        stats.install_duration_ms = install_start.elapsed().as_millis() as u64;
        if !output.success() {
            return Err(InstallError::Failed {
                installer: self.installer.name().to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr,
            }
            .into());
        }

        let packages = workspace.check_packages(&self.config.manifest);
        stats.packages_installed = packages.installed.len();
        stats.packages_missing = packages.missing.len();
        if !packages.missing.is_empty() {
            warn!(
                missing = ?packages.missing,
                "Installer succeeded without materializing every dependency"
            );
        }
        info!(
            duration_ms = stats.install_duration_ms,
            packages = stats.packages_installed,
            "Install completed"
        );

        // ====================================================================
        // Stage 3: Filtering
        // ====================================================================

        debug!(
            patterns = ?patterns.patterns(),
            policy = ?self.config.filter_policy,
            "Starting filter stage"
        );
        let filter_start = Instant::now();
        let dir = workspace.path.clone();
        let policy = self.config.filter_policy;
        let report = run_blocking("filter", move || prune(&dir, &patterns, policy)).await??;

        stats.filter_duration_ms = filter_start.elapsed().as_millis() as u64;
        stats.files_removed = report.removed.len();
        stats.bytes_removed = report.bytes_removed;
        stats.filter_failures = report.failures.len();

        if !report.failures.is_empty() {
            warn!(
                failures = report.failures.len(),
                "Some files could not be pruned"
            );
        }
        info!(
            duration_ms = stats.filter_duration_ms,
            files = stats.files_removed,
            size_bytes = stats.bytes_removed,
            "Filter completed"
        );

        // ====================================================================
        // Stage 4: Serialization and publishing
        // ====================================================================

        let serialize_start = Instant::now();
        let serializer = Arc::clone(&self.serializer);
        let dir = workspace.path.clone();
        let bytes = run_blocking("serialize", move || serializer.serialize(&dir)).await??;

        let output_path = self.config.output_path();
        let artifact = run_blocking("publish", move || publish(&bytes, &output_path)).await??;

        stats.serialize_duration_ms = serialize_start.elapsed().as_millis() as u64;
        stats.artifact_size_bytes = artifact.size_bytes;

        // Error paths above drop the workspace in place; here the removal
        // runs off the async worker like every other stage.
        let workspace_id = workspace.id.clone();
        if let Err(e) = run_blocking("cleanup", move || drop(workspace)).await {
            warn!(error = %e, "Workspace cleanup task failed");
        }

        stats.total_duration_ms = start.elapsed().as_millis() as u64;
        info!(
            format = self.serializer.format(),
            path = %artifact.path.display(),
            size_bytes = artifact.size_bytes,
            sha256 = %artifact.sha256,
            duration_ms = stats.total_duration_ms,
            "Snapshot published"
        );

        Ok(SnapshotResult {
            artifact,
            workspace_id,
            stats,
        })
    }
}

/// Runs a blocking stage on the blocking pool and waits for it.
async fn run_blocking<T, F>(stage: &'static str, f: F) -> Result<T, PipelineError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PipelineError::StageJoin {
            stage: stage.to_string(),
            reason: e.to_string(),
        })
}

// ============================================================================
// Tests
// ============================================================================
