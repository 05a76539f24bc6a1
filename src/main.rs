use snapshot_builder::{SnapshotExecutor, SnapshotPipeline};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let root = match std::env::current_dir() {
        Ok(root) => root,
        Err(e) => {
            error!(error = %e, "Cannot determine working directory");
            return ExitCode::FAILURE;
        }
    };

    let pipeline = SnapshotPipeline::with_defaults(root);
    match SnapshotExecutor::new().run(&pipeline).await {
        Ok(result) => {
            info!(
                path = %result.artifact.path.display(),
                size_bytes = result.artifact.size_bytes,
                files_removed = result.stats.files_removed,
                "Snapshot ready"
            );
            println!("snapshot generated");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Snapshot generation failed");
            let mut source = std::error::Error::source(&e);
            while let Some(cause) = source {
                error!(cause = %cause, "Caused by");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}
