//! Gas cost estimation for entering, exiting and adjusting positions

use serde::{Deserialize, Serialize};
use yieldwise_dataplane::Chain;

use crate::types::{ActionType, StrategyType};

/// USD gas cost per operation on Ethereum mainnet. Other chains are scaled
/// by [`Chain::gas_cost_factor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasModel {
    /// Supply + withdraw on a lending vault
    pub lending_usd: f64,
    /// Add + remove liquidity
    pub lp_usd: f64,
    /// Borrow, add liquidity, remove, repay
    pub leveraged_lp_usd: f64,
    /// Deposit + withdraw through an aggregator
    pub arbitrage_usd: f64,
    /// LP entry/exit plus staking for rewards
    pub yield_farming_usd: f64,
    /// Claim and re-deposit rewards
    pub compound_usd: f64,
    /// Repay part of a borrow
    pub repay_usd: f64,
}

impl Default for GasModel {
    fn default() -> Self {
        Self {
            lending_usd: 30.0,
            lp_usd: 60.0,
            leveraged_lp_usd: 140.0,
            arbitrage_usd: 80.0,
            yield_farming_usd: 90.0,
            compound_usd: 20.0,
            repay_usd: 25.0,
        }
    }
}

impl GasModel {
    /// Entry plus exit cost of a strategy
    pub fn round_trip_usd(&self, strategy: StrategyType, chain: Chain) -> f64 {
        let base = match strategy {
            StrategyType::Lending => self.lending_usd,
            StrategyType::Lp => self.lp_usd,
            StrategyType::LeveragedLp => self.leveraged_lp_usd,
            StrategyType::Arbitrage => self.arbitrage_usd,
            StrategyType::YieldFarming => self.yield_farming_usd,
        };
        base * chain.gas_cost_factor()
    }

    /// Cost of leaving a strategy
    pub fn exit_usd(&self, strategy: StrategyType, chain: Chain) -> f64 {
        self.round_trip_usd(strategy, chain) / 2.0
    }

    /// Cost of a standalone action that does not open a new strategy
    pub fn action_usd(&self, action: ActionType, chain: Chain) -> f64 {
        let base = match action {
            ActionType::Compound => self.compound_usd,
            ActionType::Repay => self.repay_usd,
            ActionType::Deposit | ActionType::Withdraw => self.lending_usd / 2.0,
            ActionType::Swap => self.lp_usd / 2.0,
            ActionType::Migrate => self.lending_usd,
        };
        base * chain.gas_cost_factor()
    }

    /// Gas cost as an APY-equivalent drag on `amount` held for a year.
    /// A non-positive amount cannot amortize anything, so the whole
    /// `projected_apy` is consumed.
    pub fn apy_drag(&self, gas_usd: f64, amount: f64, projected_apy: f64) -> f64 {
        if amount <= 0.0 || !amount.is_finite() {
            return projected_apy.max(0.0);
        }
        (gas_usd / amount * 100.0).max(0.0)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        for (name, value) in [
            ("lending_usd", self.lending_usd),
            ("lp_usd", self.lp_usd),
            ("leveraged_lp_usd", self.leveraged_lp_usd),
            ("arbitrage_usd", self.arbitrage_usd),
            ("yield_farming_usd", self.yield_farming_usd),
            ("compound_usd", self.compound_usd),
            ("repay_usd", self.repay_usd),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("gas.{} must be finite and non-negative", name));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_gas_is_cheaper() {
        let gas = GasModel::default();
        let mainnet = gas.round_trip_usd(StrategyType::Lending, Chain::Ethereum);
        let base = gas.round_trip_usd(StrategyType::Lending, Chain::Base);
        assert_eq!(mainnet, 30.0);
        assert!(base < mainnet);
        assert_eq!(gas.exit_usd(StrategyType::Lp, Chain::Ethereum), 30.0);
    }

    #[test]
    fn test_apy_drag() {
        let gas = GasModel::default();
        // $30 on $10k is 0.3 % a year
        assert!((gas.apy_drag(30.0, 10_000.0, 5.0) - 0.3).abs() < 1e-12);
        assert_eq!(gas.apy_drag(30.0, 0.0, 5.0), 5.0);
        assert_eq!(gas.apy_drag(30.0, -1.0, -2.0), 0.0);
    }

    #[test]
    fn test_rejects_negative_cost() {
        let gas = GasModel {
            repay_usd: -1.0,
            ..GasModel::default()
        };
        assert!(gas.validate().is_err());
    }
}
