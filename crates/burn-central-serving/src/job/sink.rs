use super::error::JobError;
use super::state::{JobState, StateCell};
use crate::payload::Output;

pub type JobResult = Result<Output, JobError>;

pub(crate) type Callback = Box<dyn FnOnce(JobResult) + Send + 'static>;

enum SinkTarget {
    /// Capacity-1 channel read by a [`JobHandle`](super::JobHandle). Sending never blocks.
    Channel(crossbeam::channel::Sender<JobResult>),
    Callback(Callback),
}

/// Write-once destination of a job's result.
///
/// Fulfilling consumes the sink, so a result can only be delivered once. A sink dropped
/// while still armed reports [`JobError::WorkerLost`], which keeps the "every accepted job
/// gets exactly one result" guarantee even when a worker thread unwinds.
pub(crate) struct ResultSink {
    target: Option<SinkTarget>,
    state: StateCell,
}

impl ResultSink {
    pub(crate) fn channel(
        tx: crossbeam::channel::Sender<JobResult>,
        state: StateCell,
    ) -> Self {
        Self {
            target: Some(SinkTarget::Channel(tx)),
            state,
        }
    }

    pub(crate) fn callback(callback: Callback, state: StateCell) -> Self {
        Self {
            target: Some(SinkTarget::Callback(callback)),
            state,
        }
    }

    pub(crate) fn complete(mut self, output: Output) {
        self.fulfil(Ok(output));
    }

    pub(crate) fn fail(mut self, error: JobError) {
        self.fulfil(Err(error));
    }

    /// Disarms the sink without delivering anything. Used when the job is rejected before
    /// it reaches a queue: the rejection is reported by `submit` instead.
    pub(crate) fn abandon(mut self) {
        self.target = None;
    }

    fn fulfil(&mut self, result: JobResult) {
        let Some(target) = self.target.take() else {
            return;
        };
        let terminal = if result.is_ok() {
            JobState::Completed
        } else {
            JobState::Failed
        };
        self.state.advance(terminal);
        match target {
            SinkTarget::Channel(tx) => {
                // The receiver may be gone; the caller lost interest.
                let _ = tx.try_send(result);
            }
            SinkTarget::Callback(callback) => callback(result),
        }
    }
}

impl Drop for ResultSink {
    fn drop(&mut self) {
        self.fulfil(Err(JobError::WorkerLost));
    }
}
