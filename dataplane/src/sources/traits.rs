//! Collaborator interfaces for market, position and price data
//!
//! Live readers (RPC, subgraph, REST) and in-memory snapshots implement the
//! same traits, so decision logic never depends on where data came from.

use async_trait::async_trait;

use crate::types::{AssetMarket, MarketKind, Position};
use crate::Result;

/// A source of normalized market state for one venue family
#[async_trait]
pub trait MarketSource: Send + Sync {
    /// Name used in logs and failure tags
    fn name(&self) -> &str;

    /// Venue family this source reads from
    fn kind(&self) -> MarketKind;

    /// Markets for `asset` across every protocol this source knows.
    /// An empty list means the asset is not listed, not a failure.
    async fn markets(&self, asset: &str) -> Result<Vec<AssetMarket>>;
}

/// A source of a user's open positions
#[async_trait]
pub trait PositionSource: Send + Sync {
    fn name(&self) -> &str;

    /// Positions held by `address` on the venues this source covers
    async fn positions(&self, address: &str) -> Result<Vec<Position>>;
}

/// USD price feed
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Price of one unit of `symbol` in USD
    async fn price(&self, symbol: &str) -> Result<f64>;
}
