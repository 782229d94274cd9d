//! Yield engine facade
//!
//! Wires the gateway, price oracle and decision components together behind
//! the four public operations. The engine keeps no per-account state of its
//! own; cooldown bookkeeping goes through an injected store.

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};
use yieldwise_dataplane::{ChainDataGateway, PositionDetails, PriceOracle, SourceFailure};

use crate::analytics::AnalyticsEngine;
use crate::composer::{MarketBook, StrategyComposer};
use crate::config::EngineConfig;
use crate::cooldown::{apply_cooldown, CooldownStore};
use crate::error::{IntelligenceError, Result};
use crate::gate;
use crate::rebalance::{RebalanceEngine, RebalancePolicy};
use crate::scanner::{sort_opportunities, OpportunityScanner, ScanReport};
use crate::types::{
    AccountKey, AutoRebalanceConfig, GateOutcome, OptimizationStrategy, RebalanceAction, RiskTier,
    RiskTolerance, YieldAnalytics, YieldOpportunity,
};

/// Analytics and recommendations for one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioReport {
    pub analytics: YieldAnalytics,
    pub actions: Vec<RebalanceAction>,
    /// Ranked opportunities on the assets the account holds
    pub opportunities: Vec<YieldOpportunity>,
    /// Sources that did not answer, one entry per source
    pub failures: Vec<SourceFailure>,
}

impl PortfolioReport {
    pub fn is_partial(&self) -> bool {
        self.analytics.partial_data || !self.failures.is_empty()
    }
}

/// Entry point for yield scanning, strategy composition, portfolio analysis
/// and auto-execution filtering
pub struct YieldEngine {
    config: EngineConfig,
    gateway: Arc<ChainDataGateway>,
    oracle: Arc<dyn PriceOracle>,
    scanner: OpportunityScanner,
    analytics: AnalyticsEngine,
    composer: StrategyComposer,
    rebalancer: RebalanceEngine,
    cooldown: Option<Arc<dyn CooldownStore>>,
}

impl YieldEngine {
    pub fn new(
        config: EngineConfig,
        gateway: Arc<ChainDataGateway>,
        oracle: Arc<dyn PriceOracle>,
    ) -> Result<Self> {
        config.validate()?;

        let policy = RebalancePolicy::from_auto_config(&config.auto_rebalance, &config.rebalance);
        let engine = Self {
            scanner: OpportunityScanner::new(config.scanner.clone()),
            analytics: AnalyticsEngine::new(config.analytics.clone()),
            composer: StrategyComposer::new(config.templates.clone(), &config.analytics),
            rebalancer: RebalanceEngine::new(policy, config.scanner.gas.clone()),
            cooldown: None,
            config,
            gateway,
            oracle,
        };

        info!(
            market_sources = engine.gateway.market_source_count(),
            templates = engine.composer.templates().len(),
            "Yield engine ready"
        );
        Ok(engine)
    }

    /// Suppress repeated recommendations through `store`
    pub fn with_cooldown_store(mut self, store: Arc<dyn CooldownStore>) -> Self {
        self.cooldown = Some(store);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Ranked opportunities for depositing `amount` USD of `asset`
    pub async fn find_yield_opportunities(
        &self,
        asset: &str,
        amount: f64,
        tolerance: RiskTolerance,
    ) -> Result<ScanReport> {
        let asset = asset.trim();
        if asset.is_empty() {
            return Err(IntelligenceError::invalid_input("asset symbol is empty"));
        }
        if !amount.is_finite() {
            return Err(IntelligenceError::invalid_input(format!(
                "amount must be finite, got {}",
                amount
            )));
        }
        Ok(self.scanner.scan(&self.gateway, asset, amount, tolerance).await)
    }

    /// Template strategies for `capital` USD at `tier`, most conservative first
    pub async fn generate_optimization_strategies(
        &self,
        capital: f64,
        tier: RiskTier,
    ) -> Result<Vec<OptimizationStrategy>> {
        if !capital.is_finite() || capital < 0.0 {
            return Err(IntelligenceError::invalid_input(format!(
                "capital must be a non-negative amount, got {}",
                capital
            )));
        }

        let assets = self.composer.required_assets(tier);
        let reports = join_all(assets.iter().map(|asset| self.gateway.get_markets(asset))).await;

        let mut book = MarketBook::default();
        let mut failures = Vec::new();
        for report in reports {
            failures.extend(report.failures);
            for market in report.items {
                book.insert(market);
            }
        }
        let failures = dedupe_failures(failures);
        if !failures.is_empty() {
            warn!(
                failed_sources = failures.len(),
                "Pricing strategies with partial market data"
            );
        }

        self.composer.compose(capital, tier, &book)
    }

    /// Analytics for `address` plus gated-ready rebalance candidates
    pub async fn analyze_portfolio(&self, address: &str) -> Result<PortfolioReport> {
        if address.trim().is_empty() {
            return Err(IntelligenceError::invalid_input("account address is empty"));
        }
        let account = AccountKey::new(address);

        let positions = self.gateway.get_user_positions(account.as_str()).await;
        let mut analytics = self
            .analytics
            .analyze(&account, &positions.items, self.oracle.as_ref())
            .await;
        if positions.is_partial() {
            analytics.partial_data = true;
        }

        // Largest holding per asset sizes the scan for that asset
        let mut holdings: BTreeMap<String, f64> = BTreeMap::new();
        for position in positions.items.iter().filter(|p| !p.is_borrow()) {
            let assets = match &position.details {
                PositionDetails::LiquidityPool { token0, token1, .. } => vec![token0, token1],
                _ => vec![&position.asset],
            };
            for asset in assets {
                let size = holdings.entry(asset.to_uppercase()).or_insert(0.0);
                *size = size.max(position.value_usd);
            }
        }

        let tolerance = self.config.scanner.default_tolerance;
        let scans = join_all(
            holdings
                .iter()
                .map(|(asset, amount)| self.scanner.scan(&self.gateway, asset, *amount, tolerance)),
        )
        .await;

        let mut opportunities = Vec::new();
        let mut failures = positions.failures;
        for scan in scans {
            opportunities.extend(scan.opportunities);
            failures.extend(scan.failures);
        }
        sort_opportunities(&mut opportunities);
        let failures = dedupe_failures(failures);

        let mut actions = self.rebalancer.recommend(&analytics, &opportunities);
        if let Some(store) = &self.cooldown {
            actions = apply_cooldown(actions, store.as_ref(), self.config.cooldown_window(), Utc::now());
        }

        info!(
            account = %account,
            opportunities = opportunities.len(),
            actions = actions.len(),
            failed_sources = failures.len(),
            "Portfolio report ready"
        );
        Ok(PortfolioReport {
            analytics,
            actions,
            opportunities,
            failures,
        })
    }

    /// Actions eligible for unattended execution under `config`
    pub fn filter_for_auto_execution(
        &self,
        actions: Vec<RebalanceAction>,
        config: &AutoRebalanceConfig,
    ) -> Result<GateOutcome> {
        gate::filter(actions, config)
    }
}

/// Keep the first failure reported by each source
fn dedupe_failures(failures: Vec<SourceFailure>) -> Vec<SourceFailure> {
    let mut seen = HashSet::new();
    failures
        .into_iter()
        .filter(|f| seen.insert(f.source.clone()))
        .collect()
}
