use serde::Serialize;
use std::collections::BTreeMap;

/// Read-only snapshot of one model, built from atomic counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelStatus {
    pub model_name: String,
    pub num_workers: usize,
    pub busy_workers: usize,
    pub pending_jobs: usize,
    pub queue_capacity: usize,
    pub submitted_jobs: u64,
    pub rejected_jobs: u64,
    pub completed_jobs: u64,
    pub failed_jobs: u64,
    pub cancelled_jobs: u64,
    pub fatal_worker_errors: u64,
}

impl ModelStatus {
    /// A model can serve requests as long as one worker is alive.
    pub fn health(&self) -> HealthStatus {
        if self.num_workers > 0 {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, strum::Display)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Result of a ping: the health of every registered model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub models: BTreeMap<String, HealthStatus>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.models
            .values()
            .all(|status| *status == HealthStatus::Healthy)
    }

    /// `{"<model>": "Healthy" | "Unhealthy", ...}`, the body of a ping response.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.models).unwrap_or_default()
    }
}

/// Outcome of a cancellation request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum CancelOutcome {
    /// The job was still queued; it has been removed and failed with `Cancelled`.
    Cancelled,
    /// The job was already batched, finished, or unknown. Nothing was done.
    NotCancellable,
}
