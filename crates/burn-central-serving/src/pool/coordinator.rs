use super::PoolStats;
use super::policy::{LoadObservation, ScalingDecision, ScalingPolicy};
use crate::config::{BatchConfig, ScalingConfig};
use crate::engine::ExecutionEngine;
use crate::queue::BoundedJobQueue;
use crate::worker::{Worker, WorkerExit, WorkerSlot, WorkerState};
use crossbeam::channel::{Receiver, Sender};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::JoinHandle;

struct WorkerRecord {
    slot: Arc<WorkerSlot>,
    join: JoinHandle<()>,
}

/// Owns the worker list of one pool. Runs on its own thread once the pool is started.
pub(super) struct Coordinator {
    model_name: String,
    queue: Arc<BoundedJobQueue>,
    engine: Arc<dyn ExecutionEngine>,
    batch: BatchConfig,
    scaling: ScalingConfig,
    stats: Arc<PoolStats>,
    policy: ScalingPolicy,
    active: Vec<WorkerRecord>,
    /// Asked to stop but not exited yet. Not counted as live.
    retiring: Vec<WorkerRecord>,
    next_id: usize,
    exits_tx: Sender<WorkerExit>,
    exits_rx: Receiver<WorkerExit>,
    shutdown_rx: Receiver<()>,
}

impl Coordinator {
    pub(super) fn new(
        model_name: String,
        queue: Arc<BoundedJobQueue>,
        engine: Arc<dyn ExecutionEngine>,
        batch: BatchConfig,
        scaling: ScalingConfig,
        stats: Arc<PoolStats>,
        shutdown_rx: Receiver<()>,
    ) -> Self {
        let (exits_tx, exits_rx) = crossbeam::channel::unbounded();
        Self {
            model_name,
            queue,
            engine,
            batch,
            scaling,
            stats,
            policy: ScalingPolicy::new(&scaling, &batch),
            active: Vec::new(),
            retiring: Vec::new(),
            next_id: 0,
            exits_tx,
            exits_rx,
            shutdown_rx,
        }
    }

    pub(super) fn run(mut self) {
        let exits = self.exits_rx.clone();
        let shutdown = self.shutdown_rx.clone();
        let ticker = crossbeam::channel::tick(self.scaling.scale_interval);
        loop {
            crossbeam::channel::select! {
                recv(exits) -> exit => {
                    if let Ok(exit) = exit {
                        self.handle_exit(exit);
                    }
                }
                recv(ticker) -> _ => self.reconcile(),
                recv(shutdown) -> _ => break,
            }
        }
        self.stop_all();
    }

    pub(super) fn spawn_workers(&mut self, count: usize) -> std::io::Result<()> {
        for _ in 0..count {
            let id = self.next_id;
            self.next_id += 1;
            let slot = Arc::new(WorkerSlot::new(id));
            let worker = Worker::new(
                slot.clone(),
                self.model_name.clone(),
                self.queue.clone(),
                self.engine.clone(),
                self.batch,
                self.stats.clone(),
            );
            let join = worker.spawn(self.exits_tx.clone())?;
            self.active.push(WorkerRecord { slot, join });
            self.publish_live();
        }
        Ok(())
    }

    /// Raises every stop token, wakes the queue and joins every worker thread.
    pub(super) fn stop_all(&mut self) {
        for record in self.active.iter().chain(self.retiring.iter()) {
            record.slot.stop.stop();
        }
        self.queue.wake_all();

        let mut records: Vec<WorkerRecord> = self.active.drain(..).collect();
        records.append(&mut self.retiring);
        for record in records {
            if record.join.join().is_err() {
                log::error!(
                    "Worker {} of model {} could not be joined",
                    record.slot.id,
                    self.model_name
                );
            }
        }
        self.publish_live();
    }

    fn reconcile(&mut self) {
        if self.queue.is_closed() {
            return;
        }
        let live = self.active.len();
        let load = LoadObservation {
            queue_depth: self.queue.len(),
            live_workers: live,
            busy_workers: self
                .active
                .iter()
                .filter(|record| record.slot.state().is_busy())
                .count(),
        };
        match self.policy.observe(load) {
            ScalingDecision::Hold => {}
            ScalingDecision::ScaleUp(count) => {
                log::info!(
                    "Scaling model {} up from {live} to {} worker(s), queue depth {}",
                    self.model_name,
                    live + count,
                    load.queue_depth
                );
                if let Err(err) = self.spawn_workers(count) {
                    log::error!(
                        "Failed to spawn worker for model {}: {err}",
                        self.model_name
                    );
                }
            }
            ScalingDecision::ScaleDown(count) => {
                log::info!(
                    "Scaling model {} down from {live} to {} worker(s)",
                    self.model_name,
                    live.saturating_sub(count)
                );
                self.retire(count);
            }
        }
    }

    /// Asks `count` workers to stop, idle ones first. Busy workers finish their batch.
    fn retire(&mut self, count: usize) {
        for _ in 0..count {
            let Some(last) = self.active.len().checked_sub(1) else {
                break;
            };
            let index = self
                .active
                .iter()
                .rposition(|record| record.slot.state() == WorkerState::Idle)
                .unwrap_or(last);
            let record = self.active.remove(index);
            record.slot.stop.stop();
            self.retiring.push(record);
        }
        self.publish_live();
        self.queue.wake_all();
    }

    fn handle_exit(&mut self, exit: WorkerExit) {
        let id = match &exit {
            WorkerExit::Stopped(id) | WorkerExit::Fatal { id, .. } => *id,
        };
        if let Some(record) = self.take_record(id) {
            let _ = record.join.join();
        }
        self.publish_live();

        match exit {
            WorkerExit::Stopped(id) => {
                log::debug!("Worker {id} of model {} exited", self.model_name);
            }
            WorkerExit::Fatal { id, reason } => {
                self.stats.fatal_errors.fetch_add(1, Ordering::Relaxed);
                log::error!(
                    "Worker {id} of model {} died: {reason}",
                    self.model_name
                );
                let missing = self.scaling.min_workers.saturating_sub(self.active.len());
                if missing > 0 && !self.queue.is_closed() {
                    log::info!(
                        "Replacing {missing} worker(s) for model {}",
                        self.model_name
                    );
                    if let Err(err) = self.spawn_workers(missing) {
                        log::error!(
                            "Failed to replace worker for model {}: {err}",
                            self.model_name
                        );
                    }
                }
            }
        }
    }

    fn take_record(&mut self, id: usize) -> Option<WorkerRecord> {
        if let Some(index) = self.active.iter().position(|r| r.slot.id == id) {
            return Some(self.active.remove(index));
        }
        let index = self.retiring.iter().position(|r| r.slot.id == id)?;
        Some(self.retiring.remove(index))
    }

    fn publish_live(&self) {
        self.stats
            .live_workers
            .store(self.active.len(), Ordering::Release);
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.stop_all();
    }
}
