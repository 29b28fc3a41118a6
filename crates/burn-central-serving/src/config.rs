use crate::engine::ExecutionEngine;
use crate::error::ServingError;
use crate::manager::{ModelEntry, ModelManager};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use std::{fs, io};

pub const DEFAULT_MAX_BATCH_SIZE: usize = 1;
pub const DEFAULT_MAX_BATCH_DELAY_MS: u64 = 100;
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
pub const DEFAULT_SCALE_INTERVAL_MS: u64 = 100;
pub const DEFAULT_SCALE_UP_AFTER: u32 = 2;
pub const DEFAULT_SCALE_DOWN_AFTER: u32 = 20;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[error("{0}")]
    Invalid(String),
}

/// Batching policy of one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Upper bound on the number of jobs handed to one engine call.
    pub max_batch_size: usize,
    /// Batch window, measured from the arrival of the first job of the batch.
    pub max_batch_delay: Duration,
}

impl BatchConfig {
    pub fn new(max_batch_size: usize, max_batch_delay: Duration) -> Self {
        Self {
            max_batch_size,
            max_batch_delay,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "max_batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_BATCH_SIZE,
            Duration::from_millis(DEFAULT_MAX_BATCH_DELAY_MS),
        )
    }
}

/// Worker bounds, queue capacity and the knobs of the scaling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalingConfig {
    pub min_workers: usize,
    pub max_workers: usize,
    pub queue_capacity: usize,
    /// Period of the pool coordinator's reconciliation tick.
    pub scale_interval: Duration,
    /// Consecutive saturated observations required before growing the pool.
    pub scale_up_after: u32,
    /// Consecutive idle observations required before shrinking the pool.
    pub scale_down_after: u32,
}

impl ScalingConfig {
    pub fn new(min_workers: usize, max_workers: usize, queue_capacity: usize) -> Self {
        Self {
            min_workers,
            max_workers,
            queue_capacity,
            ..Default::default()
        }
    }

    pub fn with_scale_interval(mut self, interval: Duration) -> Self {
        self.scale_interval = interval;
        self
    }

    pub fn with_hysteresis(mut self, scale_up_after: u32, scale_down_after: u32) -> Self {
        self.scale_up_after = scale_up_after;
        self.scale_down_after = scale_down_after;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::Invalid(
                "max_workers must be at least 1".to_string(),
            ));
        }
        if self.min_workers > self.max_workers {
            return Err(ConfigError::Invalid(format!(
                "min_workers ({}) exceeds max_workers ({})",
                self.min_workers, self.max_workers
            )));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.scale_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "scale_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            min_workers: 1,
            max_workers: 1,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            scale_interval: Duration::from_millis(DEFAULT_SCALE_INTERVAL_MS),
            scale_up_after: DEFAULT_SCALE_UP_AFTER,
            scale_down_after: DEFAULT_SCALE_DOWN_AFTER,
        }
    }
}

/// Serialized form of one model's serving settings, as found in a `[[models]]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_max_batch_delay_ms")]
    pub max_batch_delay_ms: u64,
    #[serde(default = "default_min_workers")]
    pub min_workers: usize,
    /// Defaults to `min_workers` when omitted.
    #[serde(default)]
    pub max_workers: Option<usize>,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_scale_interval_ms")]
    pub scale_interval_ms: u64,
    #[serde(default = "default_scale_up_after")]
    pub scale_up_after: u32,
    #[serde(default = "default_scale_down_after")]
    pub scale_down_after: u32,
}

fn default_max_batch_size() -> usize {
    DEFAULT_MAX_BATCH_SIZE
}

fn default_max_batch_delay_ms() -> u64 {
    DEFAULT_MAX_BATCH_DELAY_MS
}

fn default_min_workers() -> usize {
    1
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_scale_interval_ms() -> u64 {
    DEFAULT_SCALE_INTERVAL_MS
}

fn default_scale_up_after() -> u32 {
    DEFAULT_SCALE_UP_AFTER
}

fn default_scale_down_after() -> u32 {
    DEFAULT_SCALE_DOWN_AFTER
}

impl ModelConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_batch_delay_ms: DEFAULT_MAX_BATCH_DELAY_MS,
            min_workers: 1,
            max_workers: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            scale_interval_ms: DEFAULT_SCALE_INTERVAL_MS,
            scale_up_after: DEFAULT_SCALE_UP_AFTER,
            scale_down_after: DEFAULT_SCALE_DOWN_AFTER,
        }
    }

    pub fn batch(&self) -> BatchConfig {
        BatchConfig::new(
            self.max_batch_size,
            Duration::from_millis(self.max_batch_delay_ms),
        )
    }

    pub fn scaling(&self) -> ScalingConfig {
        ScalingConfig {
            min_workers: self.min_workers,
            max_workers: self.max_workers.unwrap_or(self.min_workers),
            queue_capacity: self.queue_capacity,
            scale_interval: Duration::from_millis(self.scale_interval_ms),
            scale_up_after: self.scale_up_after,
            scale_down_after: self.scale_down_after,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("model name must not be empty".to_string()));
        }
        self.batch().validate()?;
        self.scaling().validate()
    }
}

/// Top-level serving configuration, usually read from a TOML file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServingConfig {
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

impl ServingConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: ServingConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::BTreeSet::new();
        for model in &self.models {
            model.validate()?;
            if !seen.insert(model.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "model '{}' is declared more than once",
                    model.name
                )));
            }
        }
        Ok(())
    }

    /// Registers every configured model, asking `engine_for` for each model's engine.
    ///
    /// Stops at the first failure; models registered before it stay registered.
    pub fn register_all<F>(
        &self,
        manager: &ModelManager,
        mut engine_for: F,
    ) -> Result<Vec<Arc<ModelEntry>>, ServingError>
    where
        F: FnMut(&ModelConfig) -> Arc<dyn ExecutionEngine>,
    {
        self.models
            .iter()
            .map(|model| manager.register_model(model, engine_for(model)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn parses_models_with_defaults() {
        let config = ServingConfig::from_toml_str(
            r#"
            [[models]]
            name = "resnet"
            max_batch_size = 8
            max_batch_delay_ms = 50
            max_workers = 4

            [[models]]
            name = "bert"
            "#,
        )
        .unwrap();

        assert_eq!(config.models.len(), 2);
        let resnet = &config.models[0];
        assert_eq!(
            resnet.batch(),
            BatchConfig::new(8, Duration::from_millis(50))
        );
        assert_eq!(resnet.scaling().min_workers, 1);
        assert_eq!(resnet.scaling().max_workers, 4);
        assert_eq!(resnet.scaling().queue_capacity, DEFAULT_QUEUE_CAPACITY);

        let bert = &config.models[1];
        assert_eq!(bert.batch(), BatchConfig::default());
        assert_eq!(bert.scaling().max_workers, 1);
    }

    #[rstest]
    #[case::zero_batch("max_batch_size = 0")]
    #[case::zero_capacity("queue_capacity = 0")]
    #[case::min_above_max("min_workers = 3\nmax_workers = 2")]
    #[case::zero_interval("scale_interval_ms = 0")]
    fn rejects_invalid_models(#[case] extra: &str) {
        let toml = format!("[[models]]\nname = \"m\"\n{extra}\n");
        let err = ServingConfig::from_toml_str(&toml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "got {err:?}");
    }

    #[test]
    fn rejects_duplicate_model_names() {
        let err = ServingConfig::from_toml_str(
            "[[models]]\nname = \"m\"\n[[models]]\nname = \"m\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn surfaces_toml_syntax_errors() {
        let err = ServingConfig::from_toml_str("[[models]\nname = ").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn zero_min_workers_is_allowed() {
        let scaling = ScalingConfig::new(0, 2, 10);
        assert!(scaling.validate().is_ok());
    }
}
