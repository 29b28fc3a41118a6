//! Worker pools and their scaling.
//!
//! Every model gets one [`WorkerPool`]: a set of worker threads bound to the model's queue,
//! plus one coordinator thread that owns the worker list. The coordinator is the only
//! place that spawns or retires workers, so reconciliation never races with itself.
mod coordinator;
mod policy;

pub use policy::{LoadObservation, ScalingDecision, ScalingPolicy};

use crate::config::{BatchConfig, ScalingConfig};
use crate::engine::ExecutionEngine;
use crate::error::ServingError;
use crate::queue::BoundedJobQueue;
use coordinator::Coordinator;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

/// Counters shared by a pool's coordinator and workers. Read without locking.
#[derive(Debug, Default)]
pub(crate) struct PoolStats {
    pub(crate) live_workers: AtomicUsize,
    pub(crate) busy_workers: AtomicUsize,
    pub(crate) fatal_errors: AtomicU64,
    pub(crate) batches: AtomicU64,
    pub(crate) completed_jobs: AtomicU64,
    pub(crate) failed_jobs: AtomicU64,
}

pub struct WorkerPool {
    model_name: String,
    stats: Arc<PoolStats>,
    shutdown_tx: crossbeam::channel::Sender<()>,
    coordinator: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Starts `min_workers` workers on `queue`, then the coordinator that scales them.
    pub fn start(
        model_name: impl Into<String>,
        queue: Arc<BoundedJobQueue>,
        engine: Arc<dyn ExecutionEngine>,
        batch: BatchConfig,
        scaling: ScalingConfig,
    ) -> Result<Self, ServingError> {
        let model_name = model_name.into();
        let stats = Arc::new(PoolStats::default());
        let (shutdown_tx, shutdown_rx) = crossbeam::channel::bounded(1);

        let mut coordinator = Coordinator::new(
            model_name.clone(),
            queue,
            engine,
            batch,
            scaling,
            stats.clone(),
            shutdown_rx,
        );
        coordinator
            .spawn_workers(scaling.min_workers)
            .map_err(ServingError::WorkerSpawn)?;

        let handle = std::thread::Builder::new()
            .name(format!("{model_name}-pool"))
            .spawn(move || coordinator.run())
            .map_err(ServingError::WorkerSpawn)?;

        log::info!(
            "Started worker pool for model {model_name} with {} worker(s)",
            stats.live_workers.load(Ordering::Acquire)
        );

        Ok(Self {
            model_name,
            stats,
            shutdown_tx,
            coordinator: Mutex::new(Some(handle)),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Workers that are running and not asked to stop.
    pub fn live_workers(&self) -> usize {
        self.stats.live_workers.load(Ordering::Acquire)
    }

    /// Workers currently collecting or executing a batch.
    pub fn busy_workers(&self) -> usize {
        self.stats.busy_workers.load(Ordering::Acquire)
    }

    pub fn fatal_errors(&self) -> u64 {
        self.stats.fatal_errors.load(Ordering::Relaxed)
    }

    pub fn batches_executed(&self) -> u64 {
        self.stats.batches.load(Ordering::Relaxed)
    }

    pub fn completed_jobs(&self) -> u64 {
        self.stats.completed_jobs.load(Ordering::Relaxed)
    }

    pub fn failed_jobs(&self) -> u64 {
        self.stats.failed_jobs.load(Ordering::Relaxed)
    }

    /// Stops every worker and the coordinator, then waits for all of them.
    ///
    /// Workers finish the batch they are executing. Safe to call more than once.
    pub fn shutdown(&self) {
        let handle = self
            .coordinator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = self.shutdown_tx.try_send(());
            if handle.join().is_err() {
                log::error!("Coordinator of model {} panicked", self.model_name);
            }
            log::info!("Worker pool for model {} shut down", self.model_name);
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
