pub mod executor;
pub mod model;
pub mod snapshot;

// Re-export common types for convenience
pub use executor::*;
pub use model::*;
pub use snapshot::{
    CommandInstaller, FailurePolicy, IgnorePatterns, InstallError, InstallOutput, Installer,
    PipelineError, PublishedSnapshot, SnapshotPipeline, SnapshotResult, SnapshotSerializer,
    SnapshotStats, TarSerializer, Workspace,
};
