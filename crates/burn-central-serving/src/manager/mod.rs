//! Registry of served models.
//!
//! The [`ModelManager`] maps model names to a [`ModelEntry`] holding the model's queue and
//! worker pool. Lookups go through a concurrent map and never block each other. Structural
//! changes (registering and unregistering) are serialized by a separate lifecycle lock.
mod entry;
mod status;

pub use entry::ModelEntry;
pub use status::{CancelOutcome, HealthReport, HealthStatus, ModelStatus};

use crate::config::{BatchConfig, ModelConfig, ScalingConfig};
use crate::engine::ExecutionEngine;
use crate::error::{ServingError, SubmitError};
use crate::job::{Job, JobHandle};
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

#[derive(Default)]
pub struct ModelManager {
    models: DashMap<String, Arc<ModelEntry>>,
    lifecycle: Mutex<()>,
}

impl ModelManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the model's queue, starts its worker pool and makes it visible to `submit`.
    pub fn register(
        &self,
        name: impl Into<String>,
        engine: Arc<dyn ExecutionEngine>,
        batch: BatchConfig,
        scaling: ScalingConfig,
    ) -> Result<Arc<ModelEntry>, ServingError> {
        let name = name.into();
        let _guard = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        if self.models.contains_key(&name) {
            return Err(ServingError::DuplicateModel(name));
        }

        let entry = Arc::new(ModelEntry::start(name.clone(), engine, batch, scaling)?);
        self.models.insert(name.clone(), entry.clone());
        log::info!(
            "Registered model {name} (batch size {}, {}..={} worker(s), queue capacity {})",
            batch.max_batch_size,
            scaling.min_workers,
            scaling.max_workers,
            scaling.queue_capacity
        );
        Ok(entry)
    }

    pub fn register_model(
        &self,
        config: &ModelConfig,
        engine: Arc<dyn ExecutionEngine>,
    ) -> Result<Arc<ModelEntry>, ServingError> {
        config.validate()?;
        self.register(config.name.clone(), engine, config.batch(), config.scaling())
    }

    /// Removes the model, fails its queued jobs with `ModelUnavailable` and stops its workers.
    ///
    /// Batches already executing run to completion. Returns once every worker has exited.
    pub fn unregister(&self, name: &str) -> Result<(), ServingError> {
        let entry = {
            let _guard = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
            self.models
                .remove(name)
                .map(|(_, entry)| entry)
                .ok_or_else(|| ServingError::ModelNotFound(name.to_string()))?
        };
        log::info!("Unregistering model {name}");
        entry.shutdown();
        Ok(())
    }

    /// Routes the job to its model's queue without blocking.
    ///
    /// A rejected job is dropped and its handle resolves to `Abandoned`.
    pub fn try_submit(&self, job: Job) -> Result<(), SubmitError> {
        let Some(entry) = self.get(job.model_name()) else {
            let name = job.model_name().to_string();
            log::debug!("Rejected job {} for unknown model {name}", job.id());
            job.abandon();
            return Err(SubmitError::ModelNotFound(name));
        };

        match entry.enqueue(job) {
            Ok(()) => Ok(()),
            Err(job) => {
                let name = entry.name().to_string();
                job.abandon();
                if entry.queue().is_closed() {
                    Err(SubmitError::ModelNotFound(name))
                } else {
                    log::debug!("Queue of model {name} is full, rejecting job");
                    Err(SubmitError::QueueFull(name))
                }
            }
        }
    }

    /// `true` when the job was accepted. `false` when the model is unknown or its queue is full.
    pub fn submit(&self, job: Job) -> bool {
        self.try_submit(job).is_ok()
    }

    pub fn cancel(&self, handle: &JobHandle) -> CancelOutcome {
        self.cancel_job(handle.model_name(), handle.id())
    }

    /// Only jobs still waiting in a queue can be cancelled.
    pub fn cancel_job(&self, model_name: &str, job_id: Uuid) -> CancelOutcome {
        match self.get(model_name) {
            Some(entry) => entry.cancel(job_id),
            None => CancelOutcome::NotCancellable,
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<ModelEntry>> {
        self.models.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn status(&self, name: &str) -> Result<ModelStatus, ServingError> {
        self.get(name)
            .map(|entry| entry.status())
            .ok_or_else(|| ServingError::ModelNotFound(name.to_string()))
    }

    pub fn list_models(&self) -> BTreeSet<String> {
        self.models.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn health(&self) -> HealthReport {
        let models = self
            .models
            .iter()
            .map(|entry| (entry.key().clone(), entry.status().health()))
            .collect();
        HealthReport { models }
    }

    /// Picks the model a request is for.
    ///
    /// A non-empty explicit name is returned as is. Without one, the request goes to the only
    /// registered model; with zero or several models the caller must name one.
    pub fn resolve_model_name(&self, requested: Option<&str>) -> Result<String, ServingError> {
        if let Some(name) = requested.filter(|name| !name.is_empty()) {
            return Ok(name.to_string());
        }
        let mut names = self.list_models().into_iter();
        match (names.next(), names.next()) {
            (Some(name), None) => Ok(name),
            _ => Err(ServingError::ModelNameRequired),
        }
    }

    /// Unregisters every model.
    pub fn shutdown(&self) {
        for name in self.list_models() {
            if let Err(err) = self.unregister(&name) {
                log::debug!("Model {name} was already gone during shutdown: {err}");
            }
        }
    }
}

impl Drop for ModelManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
