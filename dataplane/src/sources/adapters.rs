//! Protocol adapters
//!
//! Raw vault, pool and aggregator records quote rates in different shapes
//! (APY, APR, per-second). Each record type normalizes itself into an
//! [`AssetMarket`] with annualized, compounded APYs.

use serde::{Deserialize, Serialize};

use crate::types::{AssetMarket, MarketKind};
use crate::utils::{apr_to_apy, per_second_rate_to_apy};
use crate::{Chain, DataplaneError, Result};

/// Compounding periods used when annualizing APR quotes
const DAILY_COMPOUNDING: f64 = 365.0;

/// An interest rate as quoted by a protocol
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RateQuote {
    /// Already compounded, in percent
    Apy(f64),
    /// Simple annual rate in percent, compounded daily
    Apr(f64),
    /// Fractional rate accrued every second
    PerSecond(f64),
}

impl RateQuote {
    /// Annualized, compounded yield in percent
    pub fn to_apy(&self) -> f64 {
        match *self {
            RateQuote::Apy(apy) => apy,
            RateQuote::Apr(apr) => apr_to_apy(apr, DAILY_COMPOUNDING),
            RateQuote::PerSecond(rate) => per_second_rate_to_apy(rate),
        }
    }
}

impl Default for RateQuote {
    fn default() -> Self {
        RateQuote::Apy(0.0)
    }
}

/// A raw protocol record that can be normalized into an [`AssetMarket`]
pub trait MarketRecord: Send + Sync {
    /// Venue family of every record of this type
    const KIND: MarketKind;

    /// Whether this record describes a market for `asset`
    fn lists(&self, asset: &str) -> bool;

    /// Normalize into the common market shape
    fn normalize(&self) -> Result<AssetMarket>;

    /// Normalize from the point of view of `asset`
    fn market_for(&self, _asset: &str) -> Result<AssetMarket> {
        self.normalize()
    }
}

/// Lending vault state (Aave/Compound/Morpho style)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LendingVaultRecord {
    pub protocol: String,
    #[serde(default)]
    pub chain: Chain,
    pub asset: String,
    pub supply_rate: RateQuote,
    #[serde(default)]
    pub borrow_rate: RateQuote,
    #[serde(default)]
    pub reward_apr: f64,
    pub total_supplied_usd: f64,
    pub total_borrowed_usd: f64,
}

impl MarketRecord for LendingVaultRecord {
    const KIND: MarketKind = MarketKind::Lending;

    fn lists(&self, asset: &str) -> bool {
        self.asset.eq_ignore_ascii_case(asset)
    }

    fn normalize(&self) -> Result<AssetMarket> {
        if self.total_supplied_usd < 0.0 || self.total_borrowed_usd < 0.0 {
            return Err(DataplaneError::invalid_market(format!(
                "{}/{}: negative supply or borrow totals",
                self.protocol, self.asset
            )));
        }
        if self.total_borrowed_usd > self.total_supplied_usd {
            return Err(DataplaneError::invalid_market(format!(
                "{}/{}: borrowed {} exceeds supplied {}",
                self.protocol, self.asset, self.total_borrowed_usd, self.total_supplied_usd
            )));
        }

        let utilization = if self.total_supplied_usd > 0.0 {
            self.total_borrowed_usd / self.total_supplied_usd
        } else {
            0.0
        };

        let market = AssetMarket {
            asset: self.asset.clone(),
            protocol: self.protocol.clone(),
            chain: self.chain,
            kind: MarketKind::Lending,
            supply_apy: self.supply_rate.to_apy(),
            borrow_apy: self.borrow_rate.to_apy(),
            reward_apy: apr_to_apy(self.reward_apr, DAILY_COMPOUNDING),
            utilization,
            total_assets: self.total_supplied_usd,
            available_liquidity: self.total_supplied_usd - self.total_borrowed_usd,
            paired_asset: None,
        };
        market.validate()?;
        Ok(market)
    }
}

/// Constant-product liquidity pool state (Uniswap V2/Curve/Velodrome style)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityPoolRecord {
    pub protocol: String,
    #[serde(default)]
    pub chain: Chain,
    pub token0: String,
    pub token1: String,
    /// Swap fee in basis points
    pub fee_tier_bps: u32,
    pub volume_24h_usd: f64,
    pub tvl_usd: f64,
    /// Incentive emissions as a simple APR in percent
    #[serde(default)]
    pub reward_apr: f64,
    /// Rate to borrow against LP shares, when the venue supports leverage
    #[serde(default)]
    pub borrow_rate: Option<RateQuote>,
}

impl LiquidityPoolRecord {
    /// Fee income as a simple APR in percent
    pub fn fee_apr(&self) -> f64 {
        if self.tvl_usd <= 0.0 {
            return 0.0;
        }
        let fee = self.fee_tier_bps as f64 / 10_000.0;
        self.volume_24h_usd * fee / self.tvl_usd * 365.0 * 100.0
    }
}

impl MarketRecord for LiquidityPoolRecord {
    const KIND: MarketKind = MarketKind::LiquidityPool;

    fn lists(&self, asset: &str) -> bool {
        self.token0.eq_ignore_ascii_case(asset) || self.token1.eq_ignore_ascii_case(asset)
    }

    fn normalize(&self) -> Result<AssetMarket> {
        if self.fee_tier_bps > 10_000 {
            return Err(DataplaneError::invalid_market(format!(
                "{} {}/{}: fee tier cannot exceed 100%",
                self.protocol, self.token0, self.token1
            )));
        }
        if self.tvl_usd < 0.0 || self.volume_24h_usd < 0.0 {
            return Err(DataplaneError::invalid_market(format!(
                "{} {}/{}: negative TVL or volume",
                self.protocol, self.token0, self.token1
            )));
        }

        let utilization = if self.tvl_usd > 0.0 {
            (self.volume_24h_usd / self.tvl_usd).min(1.0)
        } else {
            0.0
        };

        let market = AssetMarket {
            asset: self.token0.clone(),
            protocol: self.protocol.clone(),
            chain: self.chain,
            kind: MarketKind::LiquidityPool,
            supply_apy: apr_to_apy(self.fee_apr(), DAILY_COMPOUNDING),
            borrow_apy: self.borrow_rate.map(|r| r.to_apy()).unwrap_or(0.0),
            reward_apy: apr_to_apy(self.reward_apr, DAILY_COMPOUNDING),
            utilization,
            total_assets: self.tvl_usd,
            available_liquidity: self.tvl_usd,
            paired_asset: Some(self.token1.clone()),
        };
        market.validate()?;
        Ok(market)
    }

    fn market_for(&self, asset: &str) -> Result<AssetMarket> {
        pool_market_for(self, asset)
    }
}

/// Aggregated quote from a cross-protocol lender that routes deposits to the
/// best underlying venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossProtocolRecord {
    pub protocol: String,
    #[serde(default)]
    pub chain: Chain,
    pub asset: String,
    /// Supply quotes from each underlying venue
    pub venue_supply_rates: Vec<RateQuote>,
    #[serde(default)]
    pub venue_borrow_rates: Vec<RateQuote>,
    pub tvl_usd: f64,
    /// Capital not currently deployed to any venue
    pub idle_liquidity_usd: f64,
}

impl MarketRecord for CrossProtocolRecord {
    const KIND: MarketKind = MarketKind::CrossProtocol;

    fn lists(&self, asset: &str) -> bool {
        self.asset.eq_ignore_ascii_case(asset)
    }

    fn normalize(&self) -> Result<AssetMarket> {
        if self.venue_supply_rates.is_empty() {
            return Err(DataplaneError::invalid_market(format!(
                "{}/{}: no underlying venue quotes",
                self.protocol, self.asset
            )));
        }
        if self.idle_liquidity_usd < 0.0 || self.idle_liquidity_usd > self.tvl_usd {
            return Err(DataplaneError::invalid_market(format!(
                "{}/{}: idle liquidity {} outside [0, tvl]",
                self.protocol, self.asset, self.idle_liquidity_usd
            )));
        }

        // Deposits are routed to the best venue; borrows to the cheapest
        let supply_apy = self
            .venue_supply_rates
            .iter()
            .map(RateQuote::to_apy)
            .fold(0.0_f64, f64::max);
        let borrow_apy = self
            .venue_borrow_rates
            .iter()
            .map(RateQuote::to_apy)
            .min_by(f64::total_cmp)
            .unwrap_or(0.0);

        let utilization = if self.tvl_usd > 0.0 {
            1.0 - self.idle_liquidity_usd / self.tvl_usd
        } else {
            0.0
        };

        let market = AssetMarket {
            asset: self.asset.clone(),
            protocol: self.protocol.clone(),
            chain: self.chain,
            kind: MarketKind::CrossProtocol,
            supply_apy,
            borrow_apy,
            reward_apy: 0.0,
            utilization,
            total_assets: self.tvl_usd,
            available_liquidity: self.idle_liquidity_usd,
            paired_asset: None,
        };
        market.validate()?;
        Ok(market)
    }
}

/// Normalize a liquidity pool record from the point of view of `asset`: the
/// requested asset becomes the market asset and the other leg the pair.
pub fn pool_market_for(record: &LiquidityPoolRecord, asset: &str) -> Result<AssetMarket> {
    let mut market = record.normalize()?;
    if record.token1.eq_ignore_ascii_case(asset) {
        market.asset = record.token1.clone();
        market.paired_asset = Some(record.token0.clone());
    }
    Ok(market)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lending_vault_normalization() {
        let record = LendingVaultRecord {
            protocol: "aave_v3".into(),
            chain: Chain::Ethereum,
            asset: "USDC".into(),
            supply_rate: RateQuote::Apr(4.0),
            borrow_rate: RateQuote::Apy(5.5),
            reward_apr: 0.0,
            total_supplied_usd: 1_000_000.0,
            total_borrowed_usd: 800_000.0,
        };
        let market = record.normalize().unwrap();
        assert_eq!(market.kind, MarketKind::Lending);
        assert!((market.utilization - 0.8).abs() < 1e-12);
        assert!((market.available_liquidity - 200_000.0).abs() < 1e-6);
        assert!(market.supply_apy > 4.0 && market.supply_apy < 4.1);
        assert_eq!(market.borrow_apy, 5.5);
    }

    #[test]
    fn test_over_borrowed_vault_is_rejected() {
        let record = LendingVaultRecord {
            protocol: "compound_v3".into(),
            chain: Chain::Base,
            asset: "USDC".into(),
            supply_rate: RateQuote::PerSecond(1e-9),
            borrow_rate: RateQuote::default(),
            reward_apr: 0.0,
            total_supplied_usd: 100.0,
            total_borrowed_usd: 150.0,
        };
        assert!(record.normalize().is_err());
    }

    #[test]
    fn test_pool_fee_apr() {
        let record = LiquidityPoolRecord {
            protocol: "uniswap_v2".into(),
            chain: Chain::Ethereum,
            token0: "USDC".into(),
            token1: "WETH".into(),
            fee_tier_bps: 30,
            volume_24h_usd: 10_000_000.0,
            tvl_usd: 100_000_000.0,
            reward_apr: 0.0,
            borrow_rate: None,
        };
        // 10M * 0.003 / 100M * 365 = 1.095% APR
        assert!((record.fee_apr() - 1.095).abs() < 1e-9);

        let market = pool_market_for(&record, "weth").unwrap();
        assert_eq!(market.asset, "WETH");
        assert_eq!(market.paired_asset.as_deref(), Some("USDC"));
        assert!((market.utilization - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_cross_protocol_routes_to_best_venue() {
        let record = CrossProtocolRecord {
            protocol: "yearn_v3".into(),
            chain: Chain::Arbitrum,
            asset: "DAI".into(),
            venue_supply_rates: vec![RateQuote::Apy(3.0), RateQuote::Apy(5.0)],
            venue_borrow_rates: vec![RateQuote::Apy(7.0), RateQuote::Apy(6.0)],
            tvl_usd: 10_000_000.0,
            idle_liquidity_usd: 2_500_000.0,
        };
        let market = record.normalize().unwrap();
        assert_eq!(market.supply_apy, 5.0);
        assert_eq!(market.borrow_apy, 6.0);
        assert!((market.utilization - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_cross_protocol_requires_venues() {
        let record = CrossProtocolRecord {
            protocol: "yearn_v3".into(),
            chain: Chain::Arbitrum,
            asset: "DAI".into(),
            venue_supply_rates: vec![],
            venue_borrow_rates: vec![],
            tvl_usd: 1.0,
            idle_liquidity_usd: 0.0,
        };
        assert!(record.normalize().is_err());
    }
}
