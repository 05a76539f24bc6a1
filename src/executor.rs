use crate::snapshot::{
    Installer, PipelineError, SnapshotPipeline, SnapshotResult, SnapshotSerializer,
};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, instrument};

/// Runs snapshot pipelines one at a time.
///
/// Workspaces never collide between runs, but the output path is shared;
/// the single permit keeps concurrent callers from racing on it.
#[derive(Clone)]
pub struct SnapshotExecutor {
    semaphore: Arc<Semaphore>,
}

impl SnapshotExecutor {
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
        }
    }

    #[instrument(skip(self, pipeline), fields(root = %pipeline.config().root.display()))]
    pub async fn run<I, S>(
        &self,
        pipeline: &SnapshotPipeline<I, S>,
    ) -> Result<SnapshotResult, PipelineError>
    where
        I: Installer + 'static,
        S: SnapshotSerializer + 'static,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| PipelineError::Executor(format!("Semaphore error: {}", e)))?;

        info!("Starting snapshot run");
        let result = pipeline.execute().await;
        info!(success = result.is_ok(), "Finished snapshot run");
        result
    }
}

impl Default for SnapshotExecutor {
    fn default() -> Self {
        Self::new()
    }
}
