//! Jobs and their result delivery.
//!
//! A [`Job`] is one inference request in flight. It owns a write-once sink; the matching
//! [`JobHandle`] (or a callback) receives exactly one [`JobResult`] for every job that was
//! accepted by a queue.
mod error;
mod handle;
mod sink;
mod state;

pub use error::JobError;
pub use handle::JobHandle;
pub use sink::JobResult;
pub use state::JobState;

pub(crate) use sink::ResultSink;
pub(crate) use state::StateCell;

use crate::payload::Input;
use std::time::{Duration, Instant};
use uuid::Uuid;

pub struct Job {
    id: Uuid,
    model_name: String,
    input: Input,
    enqueued_at: Instant,
    state: StateCell,
    sink: ResultSink,
}

impl Job {
    /// Creates a job whose result is read through the returned [`JobHandle`].
    pub fn new(model_name: impl Into<String>, input: Input) -> (Self, JobHandle) {
        let model_name = model_name.into();
        let id = Uuid::new_v4();
        let state = StateCell::new();
        let (tx, rx) = crossbeam::channel::bounded(1);
        let handle = JobHandle::new(id, model_name.clone(), state.clone(), rx);
        let sink = ResultSink::channel(tx, state.clone());
        (Self::from_parts(id, model_name, input, sink, state), handle)
    }

    /// Creates a job whose result is passed to `callback`, from whichever thread completes
    /// the job. The callback must not block for long: it runs on a worker thread.
    pub fn with_callback<F>(model_name: impl Into<String>, input: Input, callback: F) -> Self
    where
        F: FnOnce(JobResult) + Send + 'static,
    {
        let state = StateCell::new();
        let sink = ResultSink::callback(Box::new(callback), state.clone());
        Self::from_parts(Uuid::new_v4(), model_name.into(), input, sink, state)
    }

    fn from_parts(
        id: Uuid,
        model_name: String,
        input: Input,
        sink: ResultSink,
        state: StateCell,
    ) -> Self {
        Self {
            id,
            model_name,
            input,
            enqueued_at: Instant::now(),
            state,
            sink,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn input(&self) -> &Input {
        &self.input
    }

    pub fn state(&self) -> JobState {
        self.state.get()
    }

    pub fn enqueued_at(&self) -> Instant {
        self.enqueued_at
    }

    /// Time spent since the job entered its queue.
    pub fn queue_wait(&self) -> Duration {
        self.enqueued_at.elapsed()
    }

    pub(crate) fn mark_queued(&mut self) {
        self.enqueued_at = Instant::now();
        self.state.advance(JobState::Queued);
    }

    pub(crate) fn mark_batched(&self) -> bool {
        self.state.advance(JobState::Batched)
    }

    pub(crate) fn into_parts(self) -> (Input, ResultSink) {
        (self.input, self.sink)
    }

    pub(crate) fn fail(self, error: JobError) {
        self.sink.fail(error);
    }

    pub(crate) fn abandon(self) {
        self.sink.abandon();
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("model_name", &self.model_name)
            .field("request_id", &self.input.request_id)
            .field("state", &self.state())
            .finish()
    }
}
