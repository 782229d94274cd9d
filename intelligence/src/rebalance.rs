//! Rebalance Engine
//!
//! Compares an analytics snapshot against ranked opportunities and emits
//! candidate actions. Each trigger is evaluated independently; neither input
//! is modified.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};
use uuid::Uuid;
use yieldwise_dataplane::{Position, PositionDetails};

use crate::error::{IntelligenceError, Result};
use crate::gas::GasModel;
use crate::types::{
    AccountKey, ActionType, AutoRebalanceConfig, PositionSummary, Priority, RebalanceAction,
    StrategyType, YieldAnalytics, YieldOpportunity,
};

/// Thresholds driving the rebalance triggers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RebalancePolicy {
    /// Portfolios below this weighted APY (percent) get a migrate action.
    /// Taken from `auto_rebalance.apy_threshold`, never read from config.
    #[serde(skip)]
    pub target_apy: f64,

    /// Impermanent loss magnitude (fraction) above which a pool is exited.
    /// Taken from `auto_rebalance.il_threshold`, never read from config.
    #[serde(skip)]
    pub il_threshold: f64,

    /// IL at this multiple of the threshold is critical. Replaced by
    /// `auto_rebalance.emergency_withdraw.il_multiple` while that rule is enabled.
    pub catastrophic_il_multiple: f64,

    /// Borrow positions below this health factor are repaid. Replaced by
    /// `auto_rebalance.emergency_withdraw.health_factor_threshold` while that
    /// rule is enabled.
    pub health_factor_margin: f64,

    /// Slippage tolerance stamped on actions (percent)
    pub default_slippage: f64,

    /// Rewards must cover this many compound transactions
    pub compound_gas_multiple: f64,
}

impl Default for RebalancePolicy {
    fn default() -> Self {
        Self {
            target_apy: 4.0,
            il_threshold: 0.05,
            catastrophic_il_multiple: 3.0,
            health_factor_margin: 1.2,
            default_slippage: 0.5,
            compound_gas_multiple: 5.0,
        }
    }
}

impl RebalancePolicy {
    /// Policy driven by a caller's auto-rebalance settings. The emergency
    /// rule, when enabled, supplies the health factor margin and IL multiple.
    pub fn from_auto_config(config: &AutoRebalanceConfig, base: &RebalancePolicy) -> Self {
        let mut policy = RebalancePolicy {
            target_apy: config.apy_threshold,
            il_threshold: config.il_threshold,
            default_slippage: config.max_slippage.min(base.default_slippage),
            ..base.clone()
        };
        if config.emergency_withdraw.enabled {
            policy.health_factor_margin = config.emergency_withdraw.health_factor_threshold;
            policy.catastrophic_il_multiple = config.emergency_withdraw.il_multiple;
        }
        policy
    }

    pub fn validate(&self) -> Result<()> {
        let non_negative = [
            ("auto_rebalance.apy_threshold", self.target_apy),
            ("rebalance.default_slippage", self.default_slippage),
            ("rebalance.compound_gas_multiple", self.compound_gas_multiple),
        ];
        for (field, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(IntelligenceError::invalid_config(field, "must be finite and non-negative"));
            }
        }
        if !self.il_threshold.is_finite() || self.il_threshold <= 0.0 || self.il_threshold >= 1.0 {
            return Err(IntelligenceError::invalid_config(
                "auto_rebalance.il_threshold",
                "must be a fraction within (0, 1)",
            ));
        }
        if !self.catastrophic_il_multiple.is_finite() || self.catastrophic_il_multiple < 2.0 {
            return Err(IntelligenceError::invalid_config(
                "rebalance.catastrophic_il_multiple",
                "must be at least 2",
            ));
        }
        if !self.health_factor_margin.is_finite() || self.health_factor_margin < 1.0 {
            return Err(IntelligenceError::invalid_config(
                "rebalance.health_factor_margin",
                "must be at least 1.0",
            ));
        }
        Ok(())
    }
}

/// Emits candidate rebalance actions
pub struct RebalanceEngine {
    policy: RebalancePolicy,
    gas: GasModel,
}

impl RebalanceEngine {
    pub fn new(policy: RebalancePolicy, gas: GasModel) -> Self {
        Self { policy, gas }
    }

    pub fn policy(&self) -> &RebalancePolicy {
        &self.policy
    }

    /// Candidate actions ordered by priority, then expected gain, both
    /// descending. `opportunities` are expected in ranked order.
    pub fn recommend(
        &self,
        analytics: &YieldAnalytics,
        opportunities: &[YieldOpportunity],
    ) -> Vec<RebalanceAction> {
        let mut actions = Vec::new();
        actions.extend(self.low_yield(analytics, opportunities));
        for summary in &analytics.positions {
            actions.extend(self.high_il(&analytics.account, summary, opportunities));
            actions.extend(self.health_factor(&analytics.account, summary));
            actions.extend(self.compound(&analytics.account, &summary.position));
        }

        sort_actions(&mut actions);
        info!(
            account = %analytics.account,
            actions = actions.len(),
            "⚖️  Rebalance candidates generated"
        );
        actions
    }

    fn low_yield(
        &self,
        analytics: &YieldAnalytics,
        opportunities: &[YieldOpportunity],
    ) -> Option<RebalanceAction> {
        if analytics.total_value <= 0.0 || analytics.weighted_apy >= self.policy.target_apy {
            return None;
        }

        let source = analytics
            .positions
            .iter()
            .map(|s| &s.position)
            .filter(|p| !p.is_borrow() && p.value_usd > 0.0)
            .min_by(|a, b| a.apy.total_cmp(&b.apy).then_with(|| a.pair_key().cmp(&b.pair_key())))?;

        // A pool is held from either leg
        let mut held: HashSet<(String, String)> = HashSet::new();
        for position in analytics.positions.iter().map(|s| &s.position) {
            held.insert(holding_key(&position.protocol, &position.asset));
            if let PositionDetails::LiquidityPool { token0, token1, .. } = &position.details {
                held.insert(holding_key(&position.protocol, token0));
                held.insert(holding_key(&position.protocol, token1));
            }
        }
        let best = opportunities
            .iter()
            .find(|o| !held.contains(&holding_key(&o.protocol, &o.asset)))?;

        let gain = best.net_apy_after_gas - analytics.weighted_apy;
        if gain <= 0.0 {
            debug!(best = %best.protocol, gain, "Best unheld opportunity does not beat current yield");
            return None;
        }

        Some(self.action(
            &analytics.account,
            ActionType::Migrate,
            Some(source.protocol.clone()),
            best.protocol.clone(),
            best.asset.clone(),
            source.value_usd,
            format!(
                "Portfolio APY {:.2}% below target {:.2}%; move {} from {} to {} {} at {:.2}% net",
                analytics.weighted_apy,
                self.policy.target_apy,
                source.asset,
                source.protocol,
                best.protocol,
                best.strategy_type,
                best.net_apy_after_gas
            ),
            gain,
            best.gas_cost_usd,
            gain_priority(gain),
        ))
    }

    fn high_il(
        &self,
        account: &AccountKey,
        summary: &PositionSummary,
        opportunities: &[YieldOpportunity],
    ) -> Option<RebalanceAction> {
        let il = summary.impermanent_loss?;
        let loss = -il;
        if loss <= self.policy.il_threshold {
            return None;
        }
        let position = &summary.position;
        let (token0, token1) = match &position.details {
            PositionDetails::LiquidityPool { token0, token1, .. } => (token0, token1),
            _ => return None,
        };

        let excess = loss / self.policy.il_threshold;
        let priority = if excess >= self.policy.catastrophic_il_multiple {
            Priority::Critical
        } else if excess >= 2.0 {
            Priority::High
        } else {
            Priority::Medium
        };
        let exit_gas = self.gas.exit_usd(StrategyType::Lp, position.chain);
        let reason = format!(
            "Impermanent loss {:.2}% on {} exceeds {:.2}%",
            loss * 100.0,
            position.pair_key(),
            self.policy.il_threshold * 100.0
        );

        // A single-asset lender on either side of the pair removes the
        // relative-price exposure entirely.
        let safe_harbor = opportunities.iter().find(|o| {
            o.strategy_type == StrategyType::Lending
                && (o.asset.eq_ignore_ascii_case(token0) || o.asset.eq_ignore_ascii_case(token1))
        });

        let action = match safe_harbor {
            Some(target) => self.action(
                account,
                ActionType::Migrate,
                Some(position.protocol.clone()),
                target.protocol.clone(),
                target.asset.clone(),
                position.value_usd,
                format!("{}; migrate to {} lending", reason, target.protocol),
                loss * 100.0,
                exit_gas + target.gas_cost_usd,
                priority,
            ),
            None => self.action(
                account,
                ActionType::Withdraw,
                Some(position.protocol.clone()),
                position.protocol.clone(),
                position.asset.clone(),
                position.value_usd,
                reason,
                loss * 100.0,
                exit_gas,
                priority,
            ),
        };
        Some(action)
    }

    fn health_factor(&self, account: &AccountKey, summary: &PositionSummary) -> Option<RebalanceAction> {
        let health = summary.health_factor?;
        if health >= self.policy.health_factor_margin {
            return None;
        }
        let position = &summary.position;
        let (collateral_usd, debt_usd, liquidation_threshold, liquidation_penalty) = match &position.details {
            PositionDetails::Borrow {
                collateral_usd,
                debt_usd,
                liquidation_threshold,
                liquidation_penalty,
            } => (*collateral_usd, *debt_usd, *liquidation_threshold, *liquidation_penalty),
            _ => return None,
        };

        // Debt at which health returns to the margin
        let safe_debt = collateral_usd * liquidation_threshold / self.policy.health_factor_margin;
        let repay = (debt_usd - safe_debt).clamp(0.0, debt_usd);

        Some(self.action(
            account,
            ActionType::Repay,
            None,
            position.protocol.clone(),
            position.asset.clone(),
            repay,
            format!(
                "Health factor {:.3} below safety margin {:.2}",
                health, self.policy.health_factor_margin
            ),
            liquidation_penalty * 100.0,
            self.gas.action_usd(ActionType::Repay, position.chain),
            Priority::Critical,
        ))
    }

    fn compound(&self, account: &AccountKey, position: &Position) -> Option<RebalanceAction> {
        let rewards = position.unclaimed_rewards_usd;
        let gas = self.gas.action_usd(ActionType::Compound, position.chain);
        if rewards <= 0.0 || rewards < gas * self.policy.compound_gas_multiple {
            return None;
        }
        let gain = if position.value_usd > 0.0 {
            rewards / position.value_usd * 100.0
        } else {
            0.0
        };

        Some(self.action(
            account,
            ActionType::Compound,
            None,
            position.protocol.clone(),
            position.asset.clone(),
            rewards,
            format!("${:.2} of unclaimed rewards on {}", rewards, position.pair_key()),
            gain,
            gas,
            Priority::Low,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn action(
        &self,
        account: &AccountKey,
        action_type: ActionType,
        from_protocol: Option<String>,
        to_protocol: String,
        asset: String,
        amount: f64,
        reason: String,
        expected_gain: f64,
        gas_estimate: f64,
        priority: Priority,
    ) -> RebalanceAction {
        RebalanceAction {
            id: Uuid::new_v4(),
            account: account.clone(),
            action_type,
            from_protocol,
            to_protocol,
            asset,
            amount,
            reason,
            expected_gain,
            gas_estimate,
            priority,
            slippage_tolerance: self.policy.default_slippage,
            auto_execute: true,
            created_at: Utc::now(),
        }
    }
}

fn holding_key(protocol: &str, asset: &str) -> (String, String) {
    (protocol.to_lowercase(), asset.to_uppercase())
}

/// Priority of a yield improvement in percentage points
pub fn gain_priority(gain: f64) -> Priority {
    if gain >= 5.0 {
        Priority::High
    } else if gain >= 2.0 {
        Priority::Medium
    } else {
        Priority::Low
    }
}

/// Priority descending, then expected gain descending. Stable, so actions
/// that tie keep generation order.
pub fn sort_actions(actions: &mut [RebalanceAction]) {
    actions.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| b.expected_gain.total_cmp(&a.expected_gain))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TrailingYield;
    use yieldwise_dataplane::Chain;

    fn position(protocol: &str, asset: &str, value: f64, apy: f64, details: PositionDetails) -> Position {
        Position {
            protocol: protocol.into(),
            chain: Chain::Ethereum,
            asset: asset.into(),
            value_usd: value,
            apy,
            unclaimed_rewards_usd: 0.0,
            details,
        }
    }

    fn summary(position: Position, impermanent_loss: Option<f64>) -> PositionSummary {
        PositionSummary {
            health_factor: position.health_factor(),
            position,
            impermanent_loss,
        }
    }

    fn analytics(weighted_apy: f64, positions: Vec<PositionSummary>) -> YieldAnalytics {
        YieldAnalytics {
            account: AccountKey::new("0xabc"),
            total_value: positions.iter().map(|s| s.position.value_usd).sum(),
            weighted_apy,
            trailing_yield: TrailingYield::default(),
            sharpe_ratio: 0.0,
            diversification_score: 0.0,
            impermanent_loss_exposure: 0.0,
            benchmark_apy: 0.0,
            net_return_vs_benchmark: weighted_apy,
            positions,
            partial_data: false,
            missing_prices: Vec::new(),
            generated_at: Utc::now(),
        }
    }

    fn opportunity(protocol: &str, asset: &str, strategy: StrategyType, net: f64) -> YieldOpportunity {
        YieldOpportunity {
            protocol: protocol.into(),
            chain: Chain::Ethereum,
            strategy_type: strategy,
            asset: asset.into(),
            current_apy: net,
            projected_apy: net,
            risk_score: 2.0,
            liquidity_score: 8.0,
            gas_cost_usd: 30.0,
            net_apy_after_gas: net,
            confidence: 0.9,
        }
    }

    fn pool_details() -> PositionDetails {
        PositionDetails::LiquidityPool {
            token0: "USDC".into(),
            token1: "WETH".into(),
            entry_price0: 1.0,
            entry_price1: 2000.0,
        }
    }

    fn engine() -> RebalanceEngine {
        RebalanceEngine::new(RebalancePolicy::default(), GasModel::default())
    }

    #[test]
    fn test_low_yield_migrates_to_best_unheld() {
        let snapshot = analytics(
            2.0,
            vec![summary(position("aave_v3", "USDC", 10_000.0, 2.0, PositionDetails::Vault), None)],
        );
        let opportunities = vec![
            opportunity("aave_v3", "USDC", StrategyType::Lending, 9.0),
            opportunity("morpho", "USDC", StrategyType::Arbitrage, 5.5),
        ];

        let actions = engine().recommend(&snapshot, &opportunities);
        assert_eq!(actions.len(), 1);
        let migrate = &actions[0];
        assert_eq!(migrate.action_type, ActionType::Migrate);
        assert_eq!(migrate.from_protocol.as_deref(), Some("aave_v3"));
        assert_eq!(migrate.to_protocol, "morpho");
        assert!((migrate.expected_gain - 3.5).abs() < 1e-12);
        assert_eq!(migrate.priority, Priority::Medium);
        assert_eq!(migrate.account, AccountKey::new("0xABC"));
    }

    #[test]
    fn test_low_yield_skips_other_leg_of_held_pool() {
        let snapshot = analytics(
            3.0,
            vec![summary(position("uniswap_v3", "USDC", 40_000.0, 3.0, pool_details()), Some(0.0))],
        );
        let opportunities = vec![
            opportunity("uniswap_v3", "WETH", StrategyType::Lp, 10.9),
            opportunity("aave_v3", "USDC", StrategyType::Lending, 6.0),
        ];

        let actions = engine().recommend(&snapshot, &opportunities);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, ActionType::Migrate);
        assert_eq!(actions[0].from_protocol.as_deref(), Some("uniswap_v3"));
        assert_eq!(actions[0].to_protocol, "aave_v3");
        assert!((actions[0].expected_gain - 3.0).abs() < 1e-12);

        // Only the held pool on offer: nothing to migrate to
        let own_pool = vec![opportunity("uniswap_v3", "WETH", StrategyType::Lp, 10.9)];
        assert!(engine().recommend(&snapshot, &own_pool).is_empty());
    }

    #[test]
    fn test_no_migrate_without_gain_or_above_target() {
        let held = vec![summary(position("aave_v3", "USDC", 10_000.0, 3.0, PositionDetails::Vault), None)];
        let weak = vec![opportunity("morpho", "USDC", StrategyType::Arbitrage, 2.5)];
        assert!(engine().recommend(&analytics(3.0, held.clone()), &weak).is_empty());

        let strong = vec![opportunity("morpho", "USDC", StrategyType::Arbitrage, 9.0)];
        assert!(engine().recommend(&analytics(6.0, held), &strong).is_empty());
        assert!(engine().recommend(&analytics(0.0, Vec::new()), &strong).is_empty());
    }

    #[test]
    fn test_il_priority_scales_with_excess() {
        let pool = position("uniswap_v3", "USDC-WETH", 5_000.0, 12.0, pool_details());
        let cases = [
            (-0.06, Priority::Medium),
            (-0.11, Priority::High),
            (-0.20, Priority::Critical),
        ];
        for (il, expected) in cases {
            let actions = engine().recommend(&analytics(12.0, vec![summary(pool.clone(), Some(il))]), &[]);
            assert_eq!(actions.len(), 1, "il {}", il);
            assert_eq!(actions[0].action_type, ActionType::Withdraw);
            assert_eq!(actions[0].to_protocol, "uniswap_v3");
            assert_eq!(actions[0].priority, expected);
            assert!((actions[0].expected_gain - (-il * 100.0)).abs() < 1e-9);
        }

        let within = engine().recommend(&analytics(12.0, vec![summary(pool, Some(-0.01))]), &[]);
        assert!(within.is_empty());
    }

    #[test]
    fn test_il_prefers_single_asset_lender() {
        let pool = position("uniswap_v3", "USDC-WETH", 5_000.0, 12.0, pool_details());
        let opportunities = vec![
            opportunity("sushiswap", "WETH", StrategyType::Lp, 20.0),
            opportunity("aave_v3", "WETH", StrategyType::Lending, 3.0),
        ];
        let actions = engine().recommend(&analytics(12.0, vec![summary(pool, Some(-0.08))]), &opportunities);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, ActionType::Migrate);
        assert_eq!(actions[0].to_protocol, "aave_v3");
        assert_eq!(actions[0].asset, "WETH");
    }

    #[test]
    fn test_health_factor_repay_restores_margin() {
        let borrow = position(
            "aave_v3",
            "WETH",
            2_000.0,
            -1.0,
            PositionDetails::Borrow {
                collateral_usd: 10_000.0,
                debt_usd: 7_500.0,
                liquidation_threshold: 0.825,
                liquidation_penalty: 0.05,
            },
        );
        let snapshot = analytics(5.0, vec![summary(borrow, None)]);
        let actions = engine().recommend(&snapshot, &[]);

        assert_eq!(actions.len(), 1);
        let repay = &actions[0];
        assert_eq!(repay.action_type, ActionType::Repay);
        assert_eq!(repay.priority, Priority::Critical);
        // 10k × 0.825 / 1.2 = 6875 safe debt
        assert!((repay.amount - 625.0).abs() < 1e-9);
        assert!((repay.expected_gain - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_compound_when_rewards_cover_gas() {
        let mut vault = position("aave_v3", "USDC", 20_000.0, 5.0, PositionDetails::Vault);
        vault.unclaimed_rewards_usd = 150.0;
        let actions = engine().recommend(&analytics(5.0, vec![summary(vault.clone(), None)]), &[]);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, ActionType::Compound);
        assert_eq!(actions[0].priority, Priority::Low);

        vault.unclaimed_rewards_usd = 50.0;
        assert!(engine().recommend(&analytics(5.0, vec![summary(vault, None)]), &[]).is_empty());
    }

    #[test]
    fn test_actions_sorted_by_priority_then_gain() {
        let pool = position("uniswap_v3", "USDC-WETH", 5_000.0, 1.0, pool_details());
        let borrow = position(
            "aave_v3",
            "WETH",
            1_000.0,
            0.0,
            PositionDetails::Borrow {
                collateral_usd: 1_000.0,
                debt_usd: 800.0,
                liquidation_threshold: 0.85,
                liquidation_penalty: 0.1,
            },
        );
        let snapshot = analytics(1.0, vec![summary(pool, Some(-0.07)), summary(borrow, None)]);
        let opportunities = vec![opportunity("morpho", "USDC", StrategyType::Arbitrage, 4.5)];

        let actions = engine().recommend(&snapshot, &opportunities);
        let order: Vec<(ActionType, Priority)> =
            actions.iter().map(|a| (a.action_type, a.priority)).collect();
        assert_eq!(
            order,
            vec![
                (ActionType::Repay, Priority::Critical),
                (ActionType::Withdraw, Priority::Medium),
                (ActionType::Migrate, Priority::Medium),
            ]
        );
        assert!(actions[1].expected_gain > actions[2].expected_gain);
    }

    #[test]
    fn test_policy_from_auto_config() {
        let mut auto = AutoRebalanceConfig::default();
        auto.apy_threshold = 6.0;
        auto.emergency_withdraw.health_factor_threshold = 1.5;
        let policy = RebalancePolicy::from_auto_config(&auto, &RebalancePolicy::default());
        assert_eq!(policy.target_apy, 6.0);
        assert_eq!(policy.health_factor_margin, 1.5);
        assert!(policy.validate().is_ok());

        auto.emergency_withdraw.enabled = false;
        let policy = RebalancePolicy::from_auto_config(&auto, &RebalancePolicy::default());
        assert_eq!(policy.health_factor_margin, 1.2);
    }
}
