use crate::payload::{Input, Output};

/// The opaque unit that runs a model on a batch of inputs.
///
/// Implementations must return exactly one output per input, in input order. Any error is
/// treated as a failure of the whole batch. The engine is shared by every worker of a
/// model, so calls may happen concurrently.
pub trait ExecutionEngine: Send + Sync + 'static {
    fn predict(&self, batch: Vec<Input>) -> anyhow::Result<Vec<Output>>;
}

impl<F> ExecutionEngine for F
where
    F: Fn(Vec<Input>) -> anyhow::Result<Vec<Output>> + Send + Sync + 'static,
{
    fn predict(&self, batch: Vec<Input>) -> anyhow::Result<Vec<Output>> {
        self(batch)
    }
}
