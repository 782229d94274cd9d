//! Configuration management for the dataplane

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for the concurrent market/position fan-out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Per-source timeout in milliseconds
    pub source_timeout_ms: u64,

    /// Retry policy applied to each source read
    pub retry: RetryConfig,
}

/// Retry configuration for source reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_delay_ms: 100,
            max_delay_ms: 2_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// No retries: a single attempt per read
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            source_timeout_ms: 3_000,
            retry: RetryConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default values
            .add_source(File::with_name("config/gateway").required(false))
            // Add local config (gitignored)
            .add_source(File::with_name("config/gateway.local").required(false))
            // Add environment variables with YIELDWISE_GATEWAY_ prefix
            .add_source(Environment::with_prefix("YIELDWISE_GATEWAY").separator("__"))
            .set_default("source_timeout_ms", 3_000)?
            .set_default("retry.max_attempts", 2)?
            .set_default("retry.initial_delay_ms", 100)?
            .set_default("retry.max_delay_ms", 2_000)?
            .set_default("retry.backoff_multiplier", 2.0)?
            .build()?;

        let gateway: Self = config.try_deserialize()?;
        gateway.validate()?;
        Ok(gateway)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "source_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Message(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::Message(
                "retry.backoff_multiplier must be >= 1.0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }
}
