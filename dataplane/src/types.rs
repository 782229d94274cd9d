//! Core data types and schemas for the dataplane

use serde::{Deserialize, Serialize};

use crate::{Chain, DataplaneError, Result};

/// Family of on-chain venue a market was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketKind {
    /// Single-asset lending vault (supply/borrow)
    Lending,
    /// Two-asset constant-product liquidity pool
    LiquidityPool,
    /// Aggregator routing across several lenders
    CrossProtocol,
}

impl MarketKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketKind::Lending => "lending",
            MarketKind::LiquidityPool => "liquidity_pool",
            MarketKind::CrossProtocol => "cross_protocol",
        }
    }
}

/// Normalized market state for one asset on one protocol.
///
/// APYs are percentages (`4.5` means 4.5 %), utilization is a fraction and
/// amounts are USD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetMarket {
    pub asset: String,
    pub protocol: String,
    pub chain: Chain,
    pub kind: MarketKind,
    pub supply_apy: f64,
    pub borrow_apy: f64,
    /// Additional incentive APY paid on top of the base rate
    #[serde(default)]
    pub reward_apy: f64,
    pub utilization: f64,
    pub total_assets: f64,
    pub available_liquidity: f64,
    /// Second asset of the pair for liquidity pools
    #[serde(default)]
    pub paired_asset: Option<String>,
}

impl AssetMarket {
    /// Check the market invariants: utilization in [0, 1], non-negative APYs
    /// and finite, non-negative amounts.
    pub fn validate(&self) -> Result<()> {
        if self.asset.is_empty() || self.protocol.is_empty() {
            return Err(DataplaneError::invalid_market(
                "asset and protocol must be set".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.utilization) {
            return Err(DataplaneError::invalid_market(format!(
                "{}/{}: utilization {} outside [0, 1]",
                self.protocol, self.asset, self.utilization
            )));
        }
        for (name, value) in [
            ("supply_apy", self.supply_apy),
            ("borrow_apy", self.borrow_apy),
            ("reward_apy", self.reward_apy),
            ("total_assets", self.total_assets),
            ("available_liquidity", self.available_liquidity),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(DataplaneError::invalid_market(format!(
                    "{}/{}: {} must be finite and non-negative, got {}",
                    self.protocol, self.asset, name, value
                )));
            }
        }
        Ok(())
    }

    /// Key identifying the protocol+asset pair
    pub fn pair_key(&self) -> String {
        format!("{}:{}", self.protocol, self.asset)
    }
}

/// A user's position in a single vault, pool or borrow market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub protocol: String,
    #[serde(default)]
    pub chain: Chain,
    pub asset: String,
    pub value_usd: f64,
    /// Current APY of the position in percent
    pub apy: f64,
    #[serde(default)]
    pub unclaimed_rewards_usd: f64,
    pub details: PositionDetails,
}

/// Kind-specific position data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PositionDetails {
    /// Supplied to a lending vault
    Vault,
    /// Liquidity provided to a two-asset pool
    LiquidityPool {
        token0: String,
        token1: String,
        /// USD price of token0 when liquidity was added
        entry_price0: f64,
        /// USD price of token1 when liquidity was added
        entry_price1: f64,
    },
    /// Leveraged or collateralized borrow
    Borrow {
        collateral_usd: f64,
        debt_usd: f64,
        /// Fraction of collateral value counted toward the health factor
        liquidation_threshold: f64,
        /// Fraction of collateral seized on liquidation
        #[serde(default = "default_liquidation_penalty")]
        liquidation_penalty: f64,
    },
}

fn default_liquidation_penalty() -> f64 {
    0.05
}

impl Position {
    /// Key identifying the protocol+asset pair
    pub fn pair_key(&self) -> String {
        format!("{}:{}", self.protocol, self.asset)
    }

    pub fn is_liquidity_pool(&self) -> bool {
        matches!(self.details, PositionDetails::LiquidityPool { .. })
    }

    pub fn is_borrow(&self) -> bool {
        matches!(self.details, PositionDetails::Borrow { .. })
    }

    /// Health factor of a borrow position. `None` for non-borrow positions,
    /// infinite when there is no debt.
    pub fn health_factor(&self) -> Option<f64> {
        match &self.details {
            PositionDetails::Borrow {
                collateral_usd,
                debt_usd,
                liquidation_threshold,
                ..
            } => {
                if *debt_usd <= 0.0 {
                    Some(f64::INFINITY)
                } else {
                    Some(collateral_usd * liquidation_threshold / debt_usd)
                }
            }
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.value_usd.is_finite() || self.value_usd < 0.0 {
            return Err(DataplaneError::invalid_position(format!(
                "{}: value must be finite and non-negative, got {}",
                self.pair_key(),
                self.value_usd
            )));
        }
        if !self.apy.is_finite() {
            return Err(DataplaneError::invalid_position(format!(
                "{}: apy must be finite",
                self.pair_key()
            )));
        }
        if let PositionDetails::Borrow {
            liquidation_threshold,
            ..
        } = &self.details
        {
            if !(0.0..=1.0).contains(liquidation_threshold) {
                return Err(DataplaneError::invalid_position(format!(
                    "{}: liquidation threshold {} outside [0, 1]",
                    self.pair_key(),
                    liquidation_threshold
                )));
            }
        }
        Ok(())
    }
}

/// Why a source did not contribute to a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Error,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Error => "error",
        }
    }
}

/// Per-source error tag attached to partial results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source: String,
    pub kind: FailureKind,
    pub message: String,
}

impl SourceFailure {
    pub fn from_error(source: &str, error: &DataplaneError) -> Self {
        let kind = match error {
            DataplaneError::Timeout { .. } => FailureKind::Timeout,
            _ => FailureKind::Error,
        };
        Self {
            source: source.to_string(),
            kind,
            message: error.to_string(),
        }
    }
}

/// Items merged from every source that answered, plus a tag for each that did not
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReport<T> {
    pub items: Vec<T>,
    pub failures: Vec<SourceFailure>,
}

impl<T> SourceReport<T> {
    pub fn new(items: Vec<T>, failures: Vec<SourceFailure>) -> Self {
        Self { items, failures }
    }

    /// True when at least one source failed or timed out
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

impl<T> Default for SourceReport<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            failures: Vec::new(),
        }
    }
}
