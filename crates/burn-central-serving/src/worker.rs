use crate::config::BatchConfig;
use crate::engine::ExecutionEngine;
use crate::job::{Job, JobError};
use crate::pool::PoolStats;
use crate::queue::BoundedJobQueue;
use anyhow::anyhow;
use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// A flag asking one worker to stop at its next safe point.
#[derive(Clone, Debug)]
pub struct StopToken(Arc<AtomicBool>);

impl Default for StopToken {
    fn default() -> Self {
        Self::new()
    }
}

impl StopToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::FromRepr)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum WorkerState {
    Idle = 0,
    CollectingBatch = 1,
    Executing = 2,
    Stopping = 3,
    Stopped = 4,
}

impl WorkerState {
    pub fn is_busy(self) -> bool {
        matches!(self, WorkerState::CollectingBatch | WorkerState::Executing)
    }
}

/// The part of a worker the pool coordinator keeps an eye on.
#[derive(Debug)]
pub(crate) struct WorkerSlot {
    pub(crate) id: usize,
    pub(crate) stop: StopToken,
    state: AtomicU8,
}

impl WorkerSlot {
    pub(crate) fn new(id: usize) -> Self {
        Self {
            id,
            stop: StopToken::new(),
            state: AtomicU8::new(WorkerState::Idle as u8),
        }
    }

    pub(crate) fn state(&self) -> WorkerState {
        WorkerState::from_repr(self.state.load(Ordering::Acquire)).unwrap_or(WorkerState::Stopped)
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release)
    }
}

/// How a worker thread ended, reported to the pool coordinator.
#[derive(Debug)]
pub(crate) enum WorkerExit {
    Stopped(usize),
    Fatal { id: usize, reason: String },
}

/// Counts the worker as busy from the moment it claims a batch until the batch is done,
/// including when it unwinds.
struct BusyGuard<'a> {
    stats: &'a PoolStats,
    engaged: Cell<bool>,
}

impl<'a> BusyGuard<'a> {
    fn new(stats: &'a PoolStats) -> Self {
        Self {
            stats,
            engaged: Cell::new(false),
        }
    }

    fn engage(&self) {
        if !self.engaged.replace(true) {
            self.stats.busy_workers.fetch_add(1, Ordering::AcqRel);
        }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        if self.engaged.get() {
            self.stats.busy_workers.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

pub(crate) struct Worker {
    slot: Arc<WorkerSlot>,
    model_name: String,
    queue: Arc<BoundedJobQueue>,
    engine: Arc<dyn ExecutionEngine>,
    batch: BatchConfig,
    stats: Arc<PoolStats>,
}

impl Worker {
    pub(crate) fn new(
        slot: Arc<WorkerSlot>,
        model_name: String,
        queue: Arc<BoundedJobQueue>,
        engine: Arc<dyn ExecutionEngine>,
        batch: BatchConfig,
        stats: Arc<PoolStats>,
    ) -> Self {
        Self {
            slot,
            model_name,
            queue,
            engine,
            batch,
            stats,
        }
    }

    /// Starts the worker on its own thread. The exit reason is sent to `exits` when the
    /// thread ends, whether it stopped normally or hit a fatal error.
    pub(crate) fn spawn(
        self,
        exits: crossbeam::channel::Sender<WorkerExit>,
    ) -> std::io::Result<JoinHandle<()>> {
        let thread_name = format!("{}-worker-{}", self.model_name, self.slot.id);
        thread::Builder::new().name(thread_name).spawn(move || {
            let id = self.slot.id;
            let exit = match panic::catch_unwind(AssertUnwindSafe(|| self.run())) {
                Ok(()) => WorkerExit::Stopped(id),
                Err(payload) => WorkerExit::Fatal {
                    id,
                    reason: panic_message(payload.as_ref()),
                },
            };
            self.slot.set_state(WorkerState::Stopped);
            let _ = exits.send(exit);
        })
    }

    fn run(&self) {
        log::debug!("Worker {} started for model {}", self.slot.id, self.model_name);
        loop {
            if self.slot.stop.is_stopped() {
                break;
            }
            self.slot.set_state(WorkerState::Idle);

            let busy = BusyGuard::new(&self.stats);
            let batch = self.queue.collect(
                self.batch.max_batch_size,
                self.batch.max_batch_delay,
                Some(&self.slot.stop),
                || {
                    busy.engage();
                    self.slot.set_state(WorkerState::CollectingBatch);
                },
            );
            if batch.is_empty() {
                break;
            }

            self.slot.set_state(WorkerState::Executing);
            self.execute(batch);
        }
        self.slot.set_state(WorkerState::Stopping);
        log::debug!("Worker {} stopping for model {}", self.slot.id, self.model_name);
    }

    fn execute(&self, batch: Vec<Job>) {
        let size = batch.len();
        let mut longest_wait = Duration::ZERO;
        let mut inputs = Vec::with_capacity(size);
        let mut sinks = Vec::with_capacity(size);
        for job in batch {
            job.mark_batched();
            longest_wait = longest_wait.max(job.queue_wait());
            let (input, sink) = job.into_parts();
            inputs.push(input);
            sinks.push(sink);
        }
        log::trace!(
            "Worker {} running a batch of {size} for model {} (longest queue wait {longest_wait:?})",
            self.slot.id,
            self.model_name
        );

        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.engine.predict(inputs)))
            .unwrap_or_else(|payload| {
                Err(anyhow!(
                    "Execution engine panicked: {}",
                    panic_message(payload.as_ref())
                ))
            })
            .and_then(|outputs| {
                if outputs.len() == size {
                    Ok(outputs)
                } else {
                    Err(anyhow!(
                        "Execution engine returned {} outputs for a batch of {size}",
                        outputs.len()
                    ))
                }
            });
        self.stats.batches.fetch_add(1, Ordering::Relaxed);

        match result {
            Ok(outputs) => {
                log::trace!(
                    "Batch of {size} for model {} done in {:?}",
                    self.model_name,
                    started.elapsed()
                );
                for (sink, output) in sinks.into_iter().zip(outputs) {
                    sink.complete(output);
                    self.stats.completed_jobs.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(cause) => {
                log::warn!(
                    "Inference failed for a batch of {size} on model {}: {cause:#}",
                    self.model_name
                );
                let error = JobError::inference(cause);
                for sink in sinks {
                    sink.fail(error.clone());
                    self.stats.failed_jobs.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
