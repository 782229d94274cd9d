//! In-memory sources backed by a captured market snapshot
//!
//! Used for offline analysis, replays and tests. They implement the same
//! traits as live readers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use super::adapters::{CrossProtocolRecord, LendingVaultRecord, LiquidityPoolRecord, MarketRecord};
use super::traits::{MarketSource, PositionSource, PriceOracle};
use crate::config::GatewayConfig;
use crate::gateway::ChainDataGateway;
use crate::types::{AssetMarket, MarketKind, Position};
use crate::{DataplaneError, Result};

/// Market source over a fixed set of protocol records
pub struct SnapshotMarketSource<R: MarketRecord> {
    name: String,
    records: Vec<R>,
}

impl<R: MarketRecord> SnapshotMarketSource<R> {
    pub fn new<S: Into<String>>(name: S, records: Vec<R>) -> Self {
        Self {
            name: name.into(),
            records,
        }
    }
}

#[async_trait]
impl<R: MarketRecord> MarketSource for SnapshotMarketSource<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> MarketKind {
        R::KIND
    }

    async fn markets(&self, asset: &str) -> Result<Vec<AssetMarket>> {
        let mut markets = Vec::new();
        for record in self.records.iter().filter(|r| r.lists(asset)) {
            match record.market_for(asset) {
                Ok(market) => markets.push(market),
                Err(e) => warn!(source = %self.name, error = %e, "Dropping invalid market record"),
            }
        }
        debug!(source = %self.name, asset, count = markets.len(), "Snapshot markets");
        Ok(markets)
    }
}

/// Position source over a fixed address → positions map
pub struct SnapshotPositionSource {
    name: String,
    positions: HashMap<String, Vec<Position>>,
}

impl SnapshotPositionSource {
    pub fn new<S: Into<String>>(name: S, positions: HashMap<String, Vec<Position>>) -> Self {
        let positions = positions
            .into_iter()
            .map(|(address, p)| (address.to_lowercase(), p))
            .collect();
        Self {
            name: name.into(),
            positions,
        }
    }
}

#[async_trait]
impl PositionSource for SnapshotPositionSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn positions(&self, address: &str) -> Result<Vec<Position>> {
        Ok(self
            .positions
            .get(&address.to_lowercase())
            .cloned()
            .unwrap_or_default())
    }
}

/// Fixed USD price table
#[derive(Debug, Clone, Default)]
pub struct StaticPriceOracle {
    prices: HashMap<String, f64>,
}

impl StaticPriceOracle {
    pub fn new(prices: HashMap<String, f64>) -> Self {
        let prices = prices
            .into_iter()
            .map(|(symbol, price)| (symbol.to_uppercase(), price))
            .collect();
        Self { prices }
    }

    pub fn with_price<S: Into<String>>(mut self, symbol: S, price: f64) -> Self {
        self.prices.insert(symbol.into().to_uppercase(), price);
        self
    }
}

#[async_trait]
impl PriceOracle for StaticPriceOracle {
    async fn price(&self, symbol: &str) -> Result<f64> {
        self.prices
            .get(&symbol.to_uppercase())
            .copied()
            .filter(|p| p.is_finite() && *p > 0.0)
            .ok_or_else(|| DataplaneError::PriceUnavailable(symbol.to_string()))
    }
}

/// A captured view of markets, positions and prices
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketSnapshot {
    #[serde(default)]
    pub lending_vaults: Vec<LendingVaultRecord>,
    #[serde(default)]
    pub liquidity_pools: Vec<LiquidityPoolRecord>,
    #[serde(default)]
    pub cross_protocol: Vec<CrossProtocolRecord>,
    /// Positions keyed by account address
    #[serde(default)]
    pub positions: HashMap<String, Vec<Position>>,
    /// USD prices keyed by asset symbol
    #[serde(default)]
    pub prices: HashMap<String, f64>,
}

impl MarketSnapshot {
    /// Load a snapshot from a JSON or YAML file (by extension)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let snapshot = if is_json {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        Ok(snapshot)
    }

    /// Price oracle over the snapshot's price table
    pub fn oracle(&self) -> StaticPriceOracle {
        StaticPriceOracle::new(self.prices.clone())
    }

    /// Build a gateway with one source per record family
    pub fn into_gateway(self, config: GatewayConfig) -> ChainDataGateway {
        let MarketSnapshot {
            lending_vaults,
            liquidity_pools,
            cross_protocol,
            positions,
            ..
        } = self;

        ChainDataGateway::new(config)
            .with_market_source(Arc::new(SnapshotMarketSource::new(
                "snapshot_lending",
                lending_vaults,
            )))
            .with_market_source(Arc::new(SnapshotMarketSource::new(
                "snapshot_pools",
                liquidity_pools,
            )))
            .with_market_source(Arc::new(SnapshotMarketSource::new(
                "snapshot_cross_protocol",
                cross_protocol,
            )))
            .with_position_source(Arc::new(SnapshotPositionSource::new(
                "snapshot_positions",
                positions,
            )))
    }
}
