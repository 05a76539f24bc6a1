//! Snapshot module - dependency install and snapshot generation pipeline.
//!
//! This module provides the building blocks of a snapshot run:
//! - **Workspace**: scoped install directory via [`Workspace`]
//! - **Stages**: [`Installer`] and [`SnapshotSerializer`] seams with the
//!   default [`CommandInstaller`] and [`TarSerializer`]
//! - **Filter**: ignore-pattern pruning via [`prune`]
//! - **Pipeline**: async coordinator via [`pipeline::SnapshotPipeline`]

pub mod filter;
pub mod installer;
pub mod pipeline;
pub mod publish;
pub mod serializer;
pub mod traits;
pub mod workspace;

// Re-export commonly used types
pub use traits::{
    FilterError, InstallError, InstallOutput, Installer, ProvisionError, PublishError,
    SerializeError, SnapshotSerializer,
};

pub use filter::{prune, FailurePolicy, IgnorePatterns, PruneFailure, PruneReport};
pub use installer::CommandInstaller;
pub use pipeline::{PipelineError, SnapshotPipeline, SnapshotResult, SnapshotStats};
pub use publish::{publish, PublishedSnapshot};
pub use serializer::TarSerializer;
pub use workspace::{workspace_id, PackageCheck, Workspace};
