//! Configuration management for the yield engine
//!
//! Loaded from a YAML file, or layered from `config/default`, `config/local`
//! and `YIELDWISE__` environment variables.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use yieldwise_dataplane::GatewayConfig;

use crate::composer::{default_templates, StrategyTemplate};
use crate::error::{IntelligenceError, Result};
use crate::gas::GasModel;
use crate::rebalance::RebalancePolicy;
use crate::types::{AutoRebalanceConfig, RiskTier, RiskTolerance};

/// Longest cooldown chrono can represent
const MAX_COOLDOWN_SECS: u64 = (i64::MAX / 1_000) as u64;

/// Yield engine configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Source fan-out timeouts and retries
    pub gateway: GatewayConfig,

    /// Opportunity scanning
    pub scanner: ScannerConfig,

    /// Portfolio analytics and strategy scoring
    pub analytics: AnalyticsConfig,

    /// Rebalance trigger thresholds
    pub rebalance: RebalancePolicy,

    /// Default auto-execution policy, used when the caller does not pass one
    pub auto_rebalance: AutoRebalanceConfig,

    /// Seconds before the same recommendation may be emitted again
    pub cooldown_secs: u64,

    /// Allocation templates for strategy composition
    pub templates: Vec<StrategyTemplate>,
}

/// Scanner configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub gas: GasModel,

    /// Tolerance used when scanning held assets during portfolio analysis
    pub default_tolerance: RiskTolerance,
}

/// Analytics configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// APY of the reference strategy (percent). Zero means holding the base asset.
    pub benchmark_apy: f64,

    /// Risk-free rate for Sharpe-like ratios (percent)
    pub risk_free_rate: f64,

    /// Number of equal holdings that scores full diversification
    pub full_diversification_count: usize,

    /// APY volatility per point of template risk score
    pub volatility_per_risk_point: f64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            gas: GasModel::default(),
            default_tolerance: RiskTolerance::Medium,
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            benchmark_apy: 0.0,
            risk_free_rate: 4.0,
            full_diversification_count: 5,
            volatility_per_risk_point: 2.0,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            scanner: ScannerConfig::default(),
            analytics: AnalyticsConfig::default(),
            rebalance: RebalancePolicy::default(),
            auto_rebalance: AutoRebalanceConfig::default(),
            cooldown_secs: 3_600,
            templates: default_templates(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Layered load: optional `config/default` and `config/local` files, then
    /// `YIELDWISE__SECTION__KEY` environment overrides
    pub fn load() -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("YIELDWISE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// `YIELDWISE_CONFIG_PATH` if set, layered sources otherwise
    pub fn from_env_and_file() -> Result<Self> {
        if let Ok(config_path) = std::env::var("YIELDWISE_CONFIG_PATH") {
            tracing::info!("Loading engine config from: {}", config_path);
            return Self::from_file(config_path);
        }
        Self::load()
    }

    /// Save configuration to YAML file (for generating examples)
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Templates of one tier, in config order
    pub fn templates_for(&self, tier: RiskTier) -> Vec<&StrategyTemplate> {
        self.templates.iter().filter(|t| t.tier == tier).collect()
    }

    pub fn cooldown_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cooldown_secs.min(MAX_COOLDOWN_SECS) as i64)
    }

    /// Check every section
    pub fn validate(&self) -> Result<()> {
        self.gateway
            .validate()
            .map_err(|e| IntelligenceError::invalid_config("gateway", e.to_string()))?;
        self.scanner
            .gas
            .validate()
            .map_err(|reason| IntelligenceError::invalid_config("scanner", reason))?;

        let analytics = &self.analytics;
        for (field, value) in [
            ("analytics.benchmark_apy", analytics.benchmark_apy),
            ("analytics.risk_free_rate", analytics.risk_free_rate),
            ("analytics.volatility_per_risk_point", analytics.volatility_per_risk_point),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(IntelligenceError::invalid_config(field, "must be finite and non-negative"));
            }
        }
        if analytics.full_diversification_count < 2 {
            return Err(IntelligenceError::invalid_config(
                "analytics.full_diversification_count",
                "must be at least 2",
            ));
        }

        self.rebalance.validate()?;
        self.auto_rebalance.validate()?;
        for template in &self.templates {
            template.validate()?;
        }
        Ok(())
    }
}
