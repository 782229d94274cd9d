//! Strategy Composer
//!
//! Prices configured allocation templates against live market APYs and
//! emits one [`OptimizationStrategy`] per template the caller's tier admits.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};
use yieldwise_dataplane::{AssetMarket, MarketKind};

use crate::config::AnalyticsConfig;
use crate::error::{IntelligenceError, Result};
use crate::scanner::current_apy;
use crate::types::{OptimizationStrategy, PortfolioAllocation, RiskTier, StrategyType};

/// Tolerance on the 100 % allocation sum
pub const PERCENT_EPSILON: f64 = 1e-6;

/// Floor for the Sharpe denominator (percentage points)
const MIN_VOLATILITY: f64 = 1.0;

/// One slice of a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateAllocation {
    pub protocol: String,
    pub asset: String,
    pub strategy: StrategyType,
    pub percentage: f64,
    pub risk_score: f64,
}

/// A fixed allocation recipe for one risk tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyTemplate {
    pub name: String,
    pub tier: RiskTier,
    /// Percent
    pub max_drawdown: f64,
    pub allocations: Vec<TemplateAllocation>,
}

impl StrategyTemplate {
    pub fn validate(&self) -> Result<()> {
        let field = format!("templates.{}", self.name);
        if self.name.trim().is_empty() {
            return Err(IntelligenceError::invalid_config("templates", "template name is empty"));
        }
        if self.allocations.is_empty() {
            return Err(IntelligenceError::invalid_config(field, "no allocations"));
        }
        if !self.max_drawdown.is_finite() || !(0.0..=100.0).contains(&self.max_drawdown) {
            return Err(IntelligenceError::invalid_config(
                field,
                "max_drawdown must be within [0, 100]",
            ));
        }
        for a in &self.allocations {
            if a.protocol.trim().is_empty() || a.asset.trim().is_empty() {
                return Err(IntelligenceError::invalid_config(
                    field,
                    "allocation protocol and asset must be set",
                ));
            }
            if !a.percentage.is_finite() || !(0.0..=100.0).contains(&a.percentage) {
                return Err(IntelligenceError::invalid_config(
                    field,
                    format!("{}:{} percentage {} outside [0, 100]", a.protocol, a.asset, a.percentage),
                ));
            }
            if !a.risk_score.is_finite() || !(0.0..=10.0).contains(&a.risk_score) {
                return Err(IntelligenceError::invalid_config(
                    field,
                    format!("{}:{} risk score {} outside [0, 10]", a.protocol, a.asset, a.risk_score),
                ));
            }
        }
        let sum: f64 = self.allocations.iter().map(|a| a.percentage).sum();
        if (sum - 100.0).abs() > PERCENT_EPSILON {
            return Err(IntelligenceError::invalid_config(
                field,
                format!("allocation percentages sum to {}, expected 100", sum),
            ));
        }
        Ok(())
    }
}

fn allocation(
    protocol: &str,
    asset: &str,
    strategy: StrategyType,
    percentage: f64,
    risk_score: f64,
) -> TemplateAllocation {
    TemplateAllocation {
        protocol: protocol.to_string(),
        asset: asset.to_string(),
        strategy,
        percentage,
        risk_score,
    }
}

/// One template per tier
pub fn default_templates() -> Vec<StrategyTemplate> {
    vec![
        StrategyTemplate {
            name: "stable_lending".to_string(),
            tier: RiskTier::Conservative,
            max_drawdown: 2.0,
            allocations: vec![
                allocation("aave_v3", "USDC", StrategyType::Lending, 40.0, 1.5),
                allocation("compound_v3", "USDC", StrategyType::Lending, 30.0, 1.5),
                allocation("aave_v3", "DAI", StrategyType::Lending, 30.0, 2.0),
            ],
        },
        StrategyTemplate {
            name: "balanced_yield".to_string(),
            tier: RiskTier::Moderate,
            max_drawdown: 12.0,
            allocations: vec![
                allocation("aave_v3", "USDC", StrategyType::Lending, 30.0, 2.0),
                allocation("uniswap_v3", "USDC", StrategyType::Lp, 40.0, 4.0),
                allocation("uniswap_v3", "WETH", StrategyType::LeveragedLp, 30.0, 6.5),
            ],
        },
        StrategyTemplate {
            name: "leveraged_farming".to_string(),
            tier: RiskTier::Aggressive,
            max_drawdown: 30.0,
            allocations: vec![
                allocation("uniswap_v3", "WETH", StrategyType::LeveragedLp, 40.0, 7.5),
                allocation("sushiswap", "WETH", StrategyType::YieldFarming, 35.0, 6.5),
                allocation("morpho", "USDC", StrategyType::Arbitrage, 25.0, 4.0),
            ],
        },
    ]
}

/// Markets indexed by protocol and asset for template pricing
#[derive(Debug, Clone, Default)]
pub struct MarketBook {
    markets: HashMap<(String, String), Vec<AssetMarket>>,
}

impl MarketBook {
    pub fn from_markets<I: IntoIterator<Item = AssetMarket>>(markets: I) -> Self {
        let mut book = Self::default();
        for market in markets {
            book.insert(market);
        }
        book
    }

    pub fn insert(&mut self, market: AssetMarket) {
        let key = (market.protocol.to_lowercase(), market.asset.to_uppercase());
        self.markets.entry(key).or_default().push(market);
    }

    pub fn len(&self) -> usize {
        self.markets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }

    /// Best current APY for a strategy on `protocol`/`asset` across chains
    pub fn apy_for(&self, protocol: &str, asset: &str, strategy: StrategyType) -> Option<f64> {
        let key = (protocol.to_lowercase(), asset.to_uppercase());
        self.markets
            .get(&key)?
            .iter()
            .filter(|m| supports(m, strategy))
            .map(|m| current_apy(m, strategy))
            .max_by(|a, b| a.total_cmp(b))
    }
}

fn supports(market: &AssetMarket, strategy: StrategyType) -> bool {
    match strategy {
        StrategyType::Lending => market.kind == MarketKind::Lending,
        StrategyType::Arbitrage => market.kind == MarketKind::CrossProtocol,
        StrategyType::Lp | StrategyType::YieldFarming => market.kind == MarketKind::LiquidityPool,
        StrategyType::LeveragedLp => {
            market.kind == MarketKind::LiquidityPool && market.borrow_apy > 0.0
        }
    }
}

/// Builds allocation strategies from templates
pub struct StrategyComposer {
    templates: Vec<StrategyTemplate>,
    risk_free_rate: f64,
    volatility_per_risk_point: f64,
}

impl StrategyComposer {
    pub fn new(templates: Vec<StrategyTemplate>, analytics: &AnalyticsConfig) -> Self {
        Self {
            templates,
            risk_free_rate: analytics.risk_free_rate,
            volatility_per_risk_point: analytics.volatility_per_risk_point,
        }
    }

    pub fn templates(&self) -> &[StrategyTemplate] {
        &self.templates
    }

    /// Templates offered at `tier`, most conservative first. Config order is
    /// kept within a tier.
    fn offered(&self, tier: RiskTier) -> Vec<&StrategyTemplate> {
        let mut offered: Vec<&StrategyTemplate> =
            self.templates.iter().filter(|t| tier.includes(t.tier)).collect();
        offered.sort_by_key(|t| t.tier);
        offered
    }

    /// Assets whose markets are needed to price the templates offered at `tier`
    pub fn required_assets(&self, tier: RiskTier) -> BTreeSet<String> {
        self.offered(tier)
            .iter()
            .flat_map(|t| t.allocations.iter().map(|a| a.asset.to_uppercase()))
            .collect()
    }

    pub fn compose(
        &self,
        capital: f64,
        tier: RiskTier,
        book: &MarketBook,
    ) -> Result<Vec<OptimizationStrategy>> {
        if !capital.is_finite() || capital < 0.0 {
            return Err(IntelligenceError::invalid_input(format!(
                "capital must be a non-negative amount, got {}",
                capital
            )));
        }

        let strategies: Vec<OptimizationStrategy> = self
            .offered(tier)
            .into_iter()
            .filter_map(|template| {
                let strategy = self.build(template, capital, book);
                if strategy.is_none() {
                    debug!(template = %template.name, "No market data for any allocation, omitted");
                }
                strategy
            })
            .collect();

        info!(
            capital,
            tier = tier.as_str(),
            strategies = strategies.len(),
            "🧩 Composed strategies"
        );
        Ok(strategies)
    }

    fn build(
        &self,
        template: &StrategyTemplate,
        capital: f64,
        book: &MarketBook,
    ) -> Option<OptimizationStrategy> {
        let priced: Vec<(&TemplateAllocation, f64)> = template
            .allocations
            .iter()
            .filter_map(|a| book.apy_for(&a.protocol, &a.asset, a.strategy).map(|apy| (a, apy)))
            .collect();

        let priced_share: f64 = priced.iter().map(|(a, _)| a.percentage).sum();
        if priced.is_empty() || priced_share <= 0.0 {
            return None;
        }
        let scale = 100.0 / priced_share;

        let allocations: Vec<PortfolioAllocation> = priced
            .iter()
            .map(|(a, apy)| {
                let percentage = a.percentage * scale;
                PortfolioAllocation {
                    protocol: a.protocol.clone(),
                    strategy: a.strategy,
                    asset: a.asset.clone(),
                    percentage,
                    amount: capital * percentage / 100.0,
                    current_apy: *apy,
                    risk_score: a.risk_score,
                }
            })
            .collect();

        let total_apy: f64 = allocations
            .iter()
            .map(|a| a.percentage / 100.0 * a.current_apy)
            .sum();
        let weighted_risk: f64 = allocations
            .iter()
            .map(|a| a.percentage / 100.0 * a.risk_score)
            .sum();
        let volatility = (weighted_risk * self.volatility_per_risk_point).max(MIN_VOLATILITY);

        Some(OptimizationStrategy {
            name: template.name.clone(),
            tier: template.tier,
            partial_data: allocations.len() < template.allocations.len(),
            allocations,
            total_apy,
            sharpe_ratio: (total_apy - self.risk_free_rate) / volatility,
            max_drawdown: template.max_drawdown,
            required_capital: capital,
        })
    }
}
