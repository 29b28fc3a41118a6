//! Model serving core for Burn Central.
//!
//! This crate sits between "a request arrived" and "the model ran". It provides:
//! * A [`ModelManager`] registry mapping model names to their runtime state.
//! * A per-model [`BoundedJobQueue`] giving FIFO ordering and backpressure.
//! * Worker threads that assemble batches inside a bounded batch window and hand them to
//!   an [`ExecutionEngine`].
//! * A [`WorkerPool`] that grows and shrinks the worker count between configured bounds.
//!
//! The flow for a single request is:
//! 1. Build a [`Job`] with [`Job::new`], keeping the returned [`JobHandle`].
//! 2. Hand the job to [`ModelManager::submit`]. `false` means the model is unknown or its
//!    queue is full.
//! 3. Wait on the handle. Every accepted job receives exactly one result.
mod config;
mod engine;
mod error;
mod job;
pub mod logging;
mod manager;
mod payload;
mod pool;
mod queue;
mod worker;

pub use config::{BatchConfig, ConfigError, ModelConfig, ScalingConfig, ServingConfig};
pub use engine::ExecutionEngine;
pub use error::{ServingError, SubmitError};
pub use job::{Job, JobError, JobHandle, JobResult, JobState};
pub use manager::{
    CancelOutcome, HealthReport, HealthStatus, ModelEntry, ModelManager, ModelStatus,
};
pub use payload::{Input, Output};
pub use pool::{LoadObservation, ScalingDecision, ScalingPolicy, WorkerPool};
pub use queue::BoundedJobQueue;
pub use worker::{StopToken, WorkerState};
