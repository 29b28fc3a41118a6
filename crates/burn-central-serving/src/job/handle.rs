use super::error::JobError;
use super::sink::JobResult;
use super::state::{JobState, StateCell};
use crossbeam::channel::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::Duration;
use uuid::Uuid;

/// Caller side of a job: observes its state and receives its single result.
pub struct JobHandle {
    id: Uuid,
    model_name: String,
    state: StateCell,
    result: Receiver<JobResult>,
}

impl JobHandle {
    pub(crate) fn new(
        id: Uuid,
        model_name: String,
        state: StateCell,
        result: Receiver<JobResult>,
    ) -> Self {
        Self {
            id,
            model_name,
            state,
            result,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn state(&self) -> JobState {
        self.state.get()
    }

    /// Blocks until the job's result arrives.
    ///
    /// Returns [`JobError::Abandoned`] if the job was rejected by `submit` and therefore
    /// will never produce a result.
    pub fn wait(self) -> JobResult {
        self.result.recv().unwrap_or(Err(JobError::Abandoned))
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`, returning `None`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<JobResult> {
        match self.result.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(JobError::Abandoned)),
        }
    }

    pub fn try_result(&self) -> Option<JobResult> {
        match self.result.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(JobError::Abandoned)),
        }
    }
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.id)
            .field("model_name", &self.model_name)
            .field("state", &self.state())
            .finish()
    }
}
