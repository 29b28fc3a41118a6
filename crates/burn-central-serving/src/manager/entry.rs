use super::status::{CancelOutcome, ModelStatus};
use crate::config::{BatchConfig, ScalingConfig};
use crate::engine::ExecutionEngine;
use crate::error::ServingError;
use crate::job::{Job, JobError};
use crate::pool::WorkerPool;
use crate::queue::BoundedJobQueue;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Runtime record of one registered model: its policies, queue and worker pool.
pub struct ModelEntry {
    name: String,
    batch: BatchConfig,
    scaling: ScalingConfig,
    queue: Arc<BoundedJobQueue>,
    pool: WorkerPool,
    submitted: AtomicU64,
    rejected: AtomicU64,
    cancelled: AtomicU64,
}

impl ModelEntry {
    pub(crate) fn start(
        name: String,
        engine: Arc<dyn ExecutionEngine>,
        batch: BatchConfig,
        scaling: ScalingConfig,
    ) -> Result<Self, ServingError> {
        batch.validate()?;
        scaling.validate()?;
        let queue = Arc::new(BoundedJobQueue::new(scaling.queue_capacity));
        let pool = WorkerPool::start(name.clone(), queue.clone(), engine, batch, scaling)?;
        Ok(Self {
            name,
            batch,
            scaling,
            queue,
            pool,
            submitted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn batch_config(&self) -> &BatchConfig {
        &self.batch
    }

    pub fn scaling_config(&self) -> &ScalingConfig {
        &self.scaling
    }

    pub fn queue(&self) -> &BoundedJobQueue {
        &self.queue
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub(crate) fn enqueue(&self, job: Job) -> Result<(), Job> {
        let result = self.queue.try_enqueue(job);
        let counter = if result.is_ok() {
            &self.submitted
        } else {
            &self.rejected
        };
        counter.fetch_add(1, Ordering::Relaxed);
        result
    }

    pub(crate) fn cancel(&self, id: Uuid) -> CancelOutcome {
        match self.queue.remove(id) {
            Some(job) => {
                log::debug!("Cancelled queued job {id} of model {}", self.name);
                job.fail(JobError::Cancelled);
                self.cancelled.fetch_add(1, Ordering::Relaxed);
                CancelOutcome::Cancelled
            }
            None => CancelOutcome::NotCancellable,
        }
    }

    pub fn status(&self) -> ModelStatus {
        ModelStatus {
            model_name: self.name.clone(),
            num_workers: self.pool.live_workers(),
            busy_workers: self.pool.busy_workers(),
            pending_jobs: self.queue.len(),
            queue_capacity: self.queue.capacity(),
            submitted_jobs: self.submitted.load(Ordering::Relaxed),
            rejected_jobs: self.rejected.load(Ordering::Relaxed),
            completed_jobs: self.pool.completed_jobs(),
            failed_jobs: self.pool.failed_jobs(),
            cancelled_jobs: self.cancelled.load(Ordering::Relaxed),
            fatal_worker_errors: self.pool.fatal_errors(),
        }
    }

    /// Closes the queue, fails every job still waiting in it, then stops the workers.
    pub(crate) fn shutdown(&self) {
        let pending = self.queue.close();
        if !pending.is_empty() {
            log::info!(
                "Failing {} queued job(s) of unloaded model {}",
                pending.len(),
                self.name
            );
        }
        for job in pending {
            job.fail(JobError::ModelUnavailable(self.name.clone()));
        }
        self.pool.shutdown();
    }
}

impl std::fmt::Debug for ModelEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelEntry")
            .field("name", &self.name)
            .field("batch", &self.batch)
            .field("scaling", &self.scaling)
            .finish_non_exhaustive()
    }
}
