use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a job. Transitions only move forward and stop at a terminal state.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum::Display,
    strum::FromRepr,
)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum JobState {
    Created = 0,
    Queued = 1,
    Batched = 2,
    Completed = 3,
    Failed = 4,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// Job state shared between the job and its handle.
#[derive(Clone, Debug)]
pub(crate) struct StateCell(Arc<AtomicU8>);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicU8::new(JobState::Created as u8)))
    }

    pub(crate) fn get(&self) -> JobState {
        JobState::from_repr(self.0.load(Ordering::Acquire)).unwrap_or(JobState::Failed)
    }

    /// Moves to `next` if that is a forward transition. Returns whether it happened.
    pub(crate) fn advance(&self, next: JobState) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                let current = JobState::from_repr(raw)?;
                (!current.is_terminal() && current < next).then_some(next as u8)
            })
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_never_regresses() {
        let cell = StateCell::new();
        assert!(cell.advance(JobState::Queued));
        assert!(cell.advance(JobState::Batched));
        assert!(!cell.advance(JobState::Queued));
        assert_eq!(cell.get(), JobState::Batched);
    }

    #[test]
    fn terminal_state_is_final() {
        let cell = StateCell::new();
        assert!(cell.advance(JobState::Completed));
        assert!(!cell.advance(JobState::Failed));
        assert_eq!(cell.get(), JobState::Completed);
        assert_eq!(cell.get().to_string(), "completed");
    }
}
