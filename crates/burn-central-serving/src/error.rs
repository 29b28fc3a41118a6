use crate::config::ConfigError;

#[derive(thiserror::Error, Debug)]
pub enum ServingError {
    #[error("Model not found: {0}")]
    ModelNotFound(String),
    #[error("Model already registered: {0}")]
    DuplicateModel(String),
    #[error("Invalid model configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("Parameter model_name is required when zero or several models are loaded")]
    ModelNameRequired,
    #[error("Failed to spawn worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

/// Reason a job was refused before it entered a queue.
///
/// Both variants map to a rejected request at the protocol layer; `QueueFull` is the
/// backpressure signal and is expected under load.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Model not found: {0}")]
    ModelNotFound(String),
    #[error("No worker is available to serve request: {0}")]
    QueueFull(String),
}
