use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::{GenerateError, GenerateResult};
use crate::retry::RetryPolicy;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Invalid setting {field}: {message}")]
    Invalid { field: String, message: String },

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

/// Run-level knobs: step limit and retry behavior.
///
/// Loaded from defaults, then an optional config file, then `GAGGLE_`
/// environment variables (`GAGGLE_MAX_STEPS=5`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateSettings {
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,
    #[serde(default = "default_retry_backoff_factor")]
    pub retry_backoff_factor: f64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

impl Default for GenerateSettings {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_retries: default_max_retries(),
            retry_initial_delay_ms: default_retry_initial_delay_ms(),
            retry_backoff_factor: default_retry_backoff_factor(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl GenerateSettings {
    /// Defaults overridden by the environment
    pub fn new() -> Result<Self, SettingsError> {
        Self::load(None)
    }

    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut builder = Config::builder()
            .set_default("max_steps", default_max_steps())?
            .set_default("max_retries", default_max_retries())?
            .set_default("retry_initial_delay_ms", default_retry_initial_delay_ms())?
            .set_default("retry_backoff_factor", default_retry_backoff_factor())?
            .set_default("retry_max_delay_ms", default_retry_max_delay_ms())?;
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }
        let config = builder
            .add_source(
                Environment::with_prefix("GAGGLE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Self = config.try_deserialize()?;
        settings.validate().map_err(|err| match err {
            GenerateError::InvalidArgument { argument, message } => SettingsError::Invalid {
                field: argument,
                message,
            },
            other => SettingsError::Invalid {
                field: "settings".to_string(),
                message: other.to_string(),
            },
        })?;
        tracing::debug!(?settings, "loaded generate settings");
        Ok(settings)
    }

    pub fn validate(&self) -> GenerateResult<()> {
        if self.max_steps == 0 {
            return Err(GenerateError::invalid_argument(
                "max_steps",
                "must be at least 1",
            ));
        }
        if !self.retry_backoff_factor.is_finite() || self.retry_backoff_factor < 1.0 {
            return Err(GenerateError::invalid_argument(
                "retry_backoff_factor",
                "must be a finite number of at least 1",
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.retry_initial_delay_ms),
            backoff_factor: self.retry_backoff_factor,
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }
}

fn default_max_steps() -> u32 {
    1
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_initial_delay_ms() -> u64 {
    2000
}

fn default_retry_backoff_factor() -> f64 {
    2.0
}

fn default_retry_max_delay_ms() -> u64 {
    60_000
}
