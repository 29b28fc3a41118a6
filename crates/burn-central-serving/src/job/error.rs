use std::sync::Arc;
use thiserror::Error;

/// Terminal failure delivered through a job's result sink.
#[derive(Debug, Clone, Error)]
pub enum JobError {
    /// The engine failed for the batch this job was part of. The cause is shared by every
    /// job of that batch.
    #[error("Inference failed: {0}")]
    Inference(Arc<anyhow::Error>),
    #[error("Job cancelled")]
    Cancelled,
    #[error("Model {0} was unloaded before the job was dispatched")]
    ModelUnavailable(String),
    #[error("Worker stopped unexpectedly while holding the job")]
    WorkerLost,
    /// Handle-side only: the job was never accepted, so no result will ever arrive.
    #[error("Job was not accepted by any model queue")]
    Abandoned,
}

impl JobError {
    pub fn inference(cause: anyhow::Error) -> Self {
        Self::Inference(Arc::new(cause))
    }
}
