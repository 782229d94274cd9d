//! # Yieldwise Dataplane
//!
//! The data contract of Yieldwise - normalizes heterogeneous lending vault,
//! liquidity pool and cross-protocol records into a common [`AssetMarket`]
//! shape, and gathers markets, user positions and prices from many sources
//! concurrently without letting one slow or broken source fail the rest.

pub mod config;
pub mod error;
pub mod gateway;
pub mod sources;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::{GatewayConfig, RetryConfig};
pub use error::{DataplaneError, Result};
pub use gateway::ChainDataGateway;
pub use sources::{
    CrossProtocolRecord, LendingVaultRecord, LiquidityPoolRecord, MarketRecord, MarketSnapshot,
    MarketSource, PositionSource, PriceOracle, RateQuote, SnapshotMarketSource,
    SnapshotPositionSource, StaticPriceOracle,
};
pub use types::*;

/// Current version of the dataplane
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Supported blockchain networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum Chain {
    #[serde(rename = "ethereum")]
    Ethereum,
    #[serde(rename = "arbitrum")]
    Arbitrum,
    #[serde(rename = "optimism")]
    Optimism,
    #[serde(rename = "base")]
    Base,
}

impl Chain {
    /// Get the chain ID for this network
    pub fn chain_id(&self) -> u64 {
        match self {
            Chain::Ethereum => 1,
            Chain::Arbitrum => 42161,
            Chain::Optimism => 10,
            Chain::Base => 8453,
        }
    }

    /// Get the human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Arbitrum => "arbitrum",
            Chain::Optimism => "optimism",
            Chain::Base => "base",
        }
    }

    /// Rough USD cost multiplier of a transaction relative to mainnet
    pub fn gas_cost_factor(&self) -> f64 {
        match self {
            Chain::Ethereum => 1.0,
            Chain::Arbitrum | Chain::Optimism => 0.02,
            Chain::Base => 0.01,
        }
    }
}

impl Default for Chain {
    fn default() -> Self {
        Chain::Ethereum
    }
}

impl std::fmt::Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Chain {
    type Err = DataplaneError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ethereum" | "eth" | "mainnet" => Ok(Chain::Ethereum),
            "arbitrum" | "arb" => Ok(Chain::Arbitrum),
            "optimism" | "op" => Ok(Chain::Optimism),
            "base" => Ok(Chain::Base),
            _ => Err(DataplaneError::InvalidChain(s.to_string())),
        }
    }
}
