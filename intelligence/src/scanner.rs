//! Opportunity Scanner
//!
//! Turns normalized markets for an asset into ranked yield opportunities for a
//! given deposit size. Ranking is a pure function of the markets passed in;
//! [`OpportunityScanner::scan`] only adds the gateway read in front of it.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, info};
use yieldwise_dataplane::{AssetMarket, ChainDataGateway, MarketKind, SourceFailure};

use crate::config::ScannerConfig;
use crate::types::{RiskTolerance, StrategyType, YieldOpportunity};

/// Leverage applied to leveraged LP opportunities
const LEVERAGE: f64 = 2.0;

/// Utilization above which risk rises and confidence drops
const HIGH_UTILIZATION: f64 = 0.8;

/// Available liquidity below this multiple of the deposit counts as thin
const DEPTH_MULTIPLE: f64 = 10.0;

/// Opportunities from one scan plus the sources that did not answer
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScanReport {
    pub opportunities: Vec<YieldOpportunity>,
    pub failures: Vec<SourceFailure>,
}

impl ScanReport {
    /// Some protocols were omitted because their source failed
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Ranks yield opportunities across every market the gateway knows
pub struct OpportunityScanner {
    config: ScannerConfig,
}

impl OpportunityScanner {
    pub fn new(config: ScannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Read markets for `asset` and rank them. Failed sources are reported,
    /// never fatal.
    pub async fn scan(
        &self,
        gateway: &ChainDataGateway,
        asset: &str,
        amount: f64,
        tolerance: RiskTolerance,
    ) -> ScanReport {
        let markets = gateway.get_markets(asset).await;
        let opportunities = self.rank(&markets.items, amount, tolerance);

        info!(
            asset,
            amount,
            tolerance = ?tolerance,
            opportunities = opportunities.len(),
            failed_sources = markets.failures.len(),
            "🔍 Scan complete"
        );

        ScanReport {
            opportunities,
            failures: markets.failures,
        }
    }

    /// Build every opportunity the markets offer, then filter by risk
    /// tolerance and sort.
    pub fn rank(
        &self,
        markets: &[AssetMarket],
        amount: f64,
        tolerance: RiskTolerance,
    ) -> Vec<YieldOpportunity> {
        let all: Vec<YieldOpportunity> = markets
            .iter()
            .flat_map(|market| self.opportunities_for(market, amount))
            .collect();
        let built = all.len();

        let mut kept = filter_by_tolerance(all, tolerance);
        debug!(built, kept = kept.len(), "Applied risk tolerance filter");

        sort_opportunities(&mut kept);
        kept
    }

    /// Every opportunity a single market supports
    pub fn opportunities_for(&self, market: &AssetMarket, amount: f64) -> Vec<YieldOpportunity> {
        strategies_for(market)
            .into_iter()
            .map(|strategy| self.build(market, strategy, amount))
            .collect()
    }

    fn build(&self, market: &AssetMarket, strategy: StrategyType, amount: f64) -> YieldOpportunity {
        let projected_apy = projected_apy(market, strategy, amount);
        let gas_cost_usd = self.config.gas.round_trip_usd(strategy, market.chain);
        let drag = self.config.gas.apy_drag(gas_cost_usd, amount, projected_apy);

        YieldOpportunity {
            protocol: market.protocol.clone(),
            chain: market.chain,
            strategy_type: strategy,
            asset: market.asset.clone(),
            current_apy: current_apy(market, strategy),
            projected_apy,
            risk_score: risk_score(market, strategy, amount),
            liquidity_score: liquidity_score(market.available_liquidity, amount),
            gas_cost_usd,
            net_apy_after_gas: projected_apy - drag,
            confidence: confidence(market, strategy, amount),
        }
    }
}

/// Strategies a market supports
pub fn strategies_for(market: &AssetMarket) -> Vec<StrategyType> {
    match market.kind {
        MarketKind::Lending => vec![StrategyType::Lending],
        MarketKind::CrossProtocol => vec![StrategyType::Arbitrage],
        MarketKind::LiquidityPool => {
            let base = if market.reward_apy > 0.0 {
                StrategyType::YieldFarming
            } else {
                StrategyType::Lp
            };
            if market.borrow_apy > 0.0 {
                vec![base, StrategyType::LeveragedLp]
            } else {
                vec![base]
            }
        }
    }
}

/// APY a strategy earns on `market` at its current state
pub fn current_apy(market: &AssetMarket, strategy: StrategyType) -> f64 {
    leveraged(market.supply_apy + market.reward_apy, market, strategy)
}

/// APY after `amount` is added to the market
pub fn projected_apy(market: &AssetMarket, strategy: StrategyType, amount: f64) -> f64 {
    let exposure = match strategy {
        StrategyType::LeveragedLp => amount * LEVERAGE,
        _ => amount,
    };
    let diluted = (market.supply_apy + market.reward_apy) * dilution(market.total_assets, exposure);
    leveraged(diluted, market, strategy)
}

fn leveraged(apy: f64, market: &AssetMarket, strategy: StrategyType) -> f64 {
    match strategy {
        StrategyType::LeveragedLp => LEVERAGE * apy - (LEVERAGE - 1.0) * market.borrow_apy,
        _ => apy,
    }
}

/// Share of the current rate left once `amount` joins `depth` of existing supply
fn dilution(depth: f64, amount: f64) -> f64 {
    if amount <= 0.0 {
        1.0
    } else if depth + amount <= 0.0 {
        0.0
    } else {
        depth.max(0.0) / (depth.max(0.0) + amount)
    }
}

fn base_risk(strategy: StrategyType) -> f64 {
    match strategy {
        StrategyType::Lending => 1.5,
        StrategyType::Arbitrage => 3.0,
        StrategyType::Lp => 4.0,
        StrategyType::YieldFarming => 5.0,
        StrategyType::LeveragedLp => 7.0,
    }
}

fn base_confidence(strategy: StrategyType) -> f64 {
    match strategy {
        StrategyType::Lending => 0.95,
        StrategyType::Arbitrage | StrategyType::Lp => 0.85,
        StrategyType::YieldFarming => 0.8,
        StrategyType::LeveragedLp => 0.7,
    }
}

/// Base strategy risk plus utilization and thin-liquidity penalties
pub fn risk_score(market: &AssetMarket, strategy: StrategyType, amount: f64) -> f64 {
    let utilization_penalty = (market.utilization - HIGH_UTILIZATION).max(0.0) * 10.0;
    let liquidity_penalty = if amount > market.available_liquidity {
        2.0
    } else if market.available_liquidity < amount * DEPTH_MULTIPLE {
        1.0
    } else {
        0.0
    };
    (base_risk(strategy) + utilization_penalty + liquidity_penalty).clamp(0.0, 10.0)
}

/// Log-scaled depth: $1k scores 0, $100k scores 4, $100M or more scores 10.
/// Halved when the deposit would not fit.
pub fn liquidity_score(available_liquidity: f64, amount: f64) -> f64 {
    let depth = ((available_liquidity.max(0.0) + 1.0).log10() - 3.0).max(0.0) * 2.0;
    let score = if amount > available_liquidity {
        depth / 2.0
    } else {
        depth
    };
    score.clamp(0.0, 10.0)
}

pub fn confidence(market: &AssetMarket, strategy: StrategyType, amount: f64) -> f64 {
    let mut confidence = base_confidence(strategy);
    if market.utilization > HIGH_UTILIZATION {
        confidence -= (market.utilization - HIGH_UTILIZATION) * 2.0;
    }
    if amount > 0.0 {
        let depth_ratio = (market.available_liquidity / (amount * DEPTH_MULTIPLE)).clamp(0.0, 1.0);
        confidence *= 0.5 + 0.5 * depth_ratio;
    }
    confidence.clamp(0.0, 1.0)
}

/// Keep opportunities whose risk score the tolerance accepts
pub fn filter_by_tolerance(
    opportunities: Vec<YieldOpportunity>,
    tolerance: RiskTolerance,
) -> Vec<YieldOpportunity> {
    opportunities
        .into_iter()
        .filter(|o| tolerance.allows(o.risk_score))
        .collect()
}

/// Net APY desc, confidence desc, liquidity score desc, then protocol,
/// strategy, chain and asset so that the order is total.
pub fn compare_opportunities(a: &YieldOpportunity, b: &YieldOpportunity) -> Ordering {
    b.net_apy_after_gas
        .total_cmp(&a.net_apy_after_gas)
        .then_with(|| b.confidence.total_cmp(&a.confidence))
        .then_with(|| b.liquidity_score.total_cmp(&a.liquidity_score))
        .then_with(|| a.protocol.cmp(&b.protocol))
        .then_with(|| a.strategy_type.cmp(&b.strategy_type))
        .then_with(|| a.chain.cmp(&b.chain))
        .then_with(|| a.asset.cmp(&b.asset))
}

pub fn sort_opportunities(opportunities: &mut [YieldOpportunity]) {
    opportunities.sort_by(compare_opportunities);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gas::GasModel;
    use std::sync::Arc;
    use yieldwise_dataplane::{Chain, GatewayConfig, LendingVaultRecord, RateQuote, SnapshotMarketSource};

    fn market(protocol: &str, kind: MarketKind, supply: f64, utilization: f64) -> AssetMarket {
        AssetMarket {
            asset: "USDC".into(),
            protocol: protocol.into(),
            chain: Chain::Ethereum,
            kind,
            supply_apy: supply,
            borrow_apy: 0.0,
            reward_apy: 0.0,
            utilization,
            total_assets: 50_000_000.0,
            available_liquidity: 20_000_000.0,
            paired_asset: None,
        }
    }

    fn scanner() -> OpportunityScanner {
        OpportunityScanner::new(ScannerConfig::default())
    }

    #[test]
    fn test_ranks_by_net_apy() {
        let markets = vec![
            market("aave_v3", MarketKind::Lending, 4.0, 0.6),
            market("compound_v3", MarketKind::Lending, 5.0, 0.6),
            market("morpho", MarketKind::CrossProtocol, 6.0, 0.6),
        ];
        let ranked = scanner().rank(&markets, 100_000.0, RiskTolerance::High);
        let protocols: Vec<_> = ranked.iter().map(|o| o.protocol.as_str()).collect();
        assert_eq!(protocols, vec!["morpho", "compound_v3", "aave_v3"]);
        assert_eq!(ranked[0].strategy_type, StrategyType::Arbitrage);
    }

    #[test]
    fn test_net_never_exceeds_projected() {
        let markets = vec![market("aave_v3", MarketKind::Lending, 4.0, 0.95)];
        for amount in [-10.0, 0.0, 1.0, 1_000.0, 1e9] {
            for o in scanner().rank(&markets, amount, RiskTolerance::High) {
                assert!(o.net_apy_after_gas <= o.projected_apy);
            }
        }
    }

    #[test]
    fn test_deposit_dilutes_projected_apy() {
        let m = market("aave_v3", MarketKind::Lending, 4.0, 0.5);
        let small = projected_apy(&m, StrategyType::Lending, 1_000.0);
        let large = projected_apy(&m, StrategyType::Lending, 50_000_000.0);
        assert!(small < 4.0 && small > 3.99);
        assert!((large - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_pool_markets_yield_farming_and_leverage() {
        let mut pool = market("uniswap_v3", MarketKind::LiquidityPool, 8.0, 0.3);
        pool.reward_apy = 2.0;
        pool.borrow_apy = 5.0;
        assert_eq!(
            strategies_for(&pool),
            vec![StrategyType::YieldFarming, StrategyType::LeveragedLp]
        );
        // 2 × (8 + 2) − 5
        assert_eq!(current_apy(&pool, StrategyType::LeveragedLp), 15.0);

        pool.reward_apy = 0.0;
        pool.borrow_apy = 0.0;
        assert_eq!(strategies_for(&pool), vec![StrategyType::Lp]);
    }

    #[test]
    fn test_thin_and_hot_markets_score_worse() {
        let calm = market("aave_v3", MarketKind::Lending, 4.0, 0.5);
        let mut hot = calm.clone();
        hot.utilization = 0.98;
        hot.available_liquidity = 50_000.0;

        let amount = 100_000.0;
        assert!(risk_score(&hot, StrategyType::Lending, amount) > risk_score(&calm, StrategyType::Lending, amount));
        assert!(confidence(&hot, StrategyType::Lending, amount) < confidence(&calm, StrategyType::Lending, amount));
        assert!(liquidity_score(50_000.0, amount) < liquidity_score(50_000.0, 1_000.0));
    }

    #[test]
    fn test_medium_tolerance_filter() {
        let template = scanner().rank(
            &[market("aave_v3", MarketKind::Lending, 4.0, 0.5)],
            1_000.0,
            RiskTolerance::High,
        )[0]
        .clone();
        let opportunities: Vec<_> = [1.0, 4.0, 7.0, 9.0]
            .iter()
            .map(|score| YieldOpportunity {
                risk_score: *score,
                ..template.clone()
            })
            .collect();

        let kept = filter_by_tolerance(opportunities, RiskTolerance::Medium);
        let scores: Vec<f64> = kept.iter().map(|o| o.risk_score).collect();
        assert_eq!(scores, vec![1.0, 4.0]);
    }

    #[test]
    fn test_ordering_is_deterministic() {
        let markets = vec![
            market("b_protocol", MarketKind::Lending, 4.0, 0.5),
            market("a_protocol", MarketKind::Lending, 4.0, 0.5),
        ];
        let first = scanner().rank(&markets, 10_000.0, RiskTolerance::High);
        let mut reversed = markets.clone();
        reversed.reverse();
        let second = scanner().rank(&reversed, 10_000.0, RiskTolerance::High);
        assert_eq!(first, second);
        assert_eq!(first[0].protocol, "a_protocol");
    }

    fn ranked_one(protocol: &str) -> YieldOpportunity {
        scanner().rank(
            &[market(protocol, MarketKind::Lending, 4.0, 0.5)],
            10_000.0,
            RiskTolerance::High,
        )[0]
        .clone()
    }

    #[test]
    fn test_equal_net_apy_ranks_by_confidence() {
        let sure = YieldOpportunity {
            confidence: 0.9,
            liquidity_score: 2.0,
            ..ranked_one("z_protocol")
        };
        let unsure = YieldOpportunity {
            confidence: 0.6,
            liquidity_score: 9.0,
            ..ranked_one("a_protocol")
        };
        assert_eq!(sure.net_apy_after_gas, unsure.net_apy_after_gas);

        let mut opportunities = vec![unsure, sure];
        sort_opportunities(&mut opportunities);
        let protocols: Vec<_> = opportunities.iter().map(|o| o.protocol.as_str()).collect();
        assert_eq!(protocols, vec!["z_protocol", "a_protocol"]);
    }

    #[test]
    fn test_equal_net_and_confidence_ranks_by_liquidity() {
        let deep = YieldOpportunity {
            confidence: 0.8,
            liquidity_score: 9.0,
            ..ranked_one("z_protocol")
        };
        let shallow = YieldOpportunity {
            confidence: 0.8,
            liquidity_score: 3.0,
            ..ranked_one("a_protocol")
        };

        let mut opportunities = vec![shallow, deep];
        sort_opportunities(&mut opportunities);
        let protocols: Vec<_> = opportunities.iter().map(|o| o.protocol.as_str()).collect();
        assert_eq!(protocols, vec!["z_protocol", "a_protocol"]);
        assert_eq!(
            compare_opportunities(&opportunities[0], &opportunities[1]),
            Ordering::Less
        );
    }

    #[test]
    fn test_zero_gas_keeps_projected() {
        let free = OpportunityScanner::new(ScannerConfig {
            gas: GasModel {
                lending_usd: 0.0,
                ..GasModel::default()
            },
            ..ScannerConfig::default()
        });
        let o = &free.rank(&[market("aave_v3", MarketKind::Lending, 4.0, 0.5)], 1_000.0, RiskTolerance::Low)[0];
        assert_eq!(o.net_apy_after_gas, o.projected_apy);
    }

    #[tokio::test]
    async fn test_scan_reads_gateway() {
        let gateway = ChainDataGateway::new(GatewayConfig::default()).with_market_source(Arc::new(
            SnapshotMarketSource::new(
                "lending",
                vec![LendingVaultRecord {
                    protocol: "aave_v3".into(),
                    chain: Chain::Arbitrum,
                    asset: "USDC".into(),
                    supply_rate: RateQuote::Apy(4.2),
                    borrow_rate: RateQuote::Apy(5.5),
                    reward_apr: 0.0,
                    total_supplied_usd: 10_000_000.0,
                    total_borrowed_usd: 6_000_000.0,
                }],
            ),
        ));

        let report = scanner()
            .scan(&gateway, "USDC", 25_000.0, RiskTolerance::Low)
            .await;
        assert!(!report.is_partial());
        assert_eq!(report.opportunities.len(), 1);
        assert_eq!(report.opportunities[0].chain, Chain::Arbitrum);
    }
}
