//! Core types for the yield engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use yieldwise_dataplane::{Chain, Position};

/// How a yield opportunity earns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyType {
    /// Supply a single asset to a lending vault
    Lending,

    /// Provide liquidity to a two-asset pool
    Lp,

    /// Provide liquidity with borrowed capital at 2x
    LeveragedLp,

    /// Route supply across lenders through an aggregator
    Arbitrage,

    /// Provide liquidity to a pool that pays incentive rewards
    YieldFarming,
}

impl StrategyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyType::Lending => "lending",
            StrategyType::Lp => "lp",
            StrategyType::LeveragedLp => "leveraged_lp",
            StrategyType::Arbitrage => "arbitrage",
            StrategyType::YieldFarming => "yield_farming",
        }
    }
}

impl fmt::Display for StrategyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller's appetite for risk when scanning opportunities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTolerance {
    Low,
    Medium,
    High,
}

impl RiskTolerance {
    /// Highest risk score this tolerance accepts
    pub fn max_risk_score(&self) -> f64 {
        match self {
            RiskTolerance::Low => 3.0,
            RiskTolerance::Medium => 6.0,
            RiskTolerance::High => 10.0,
        }
    }

    pub fn allows(&self, risk_score: f64) -> bool {
        risk_score <= self.max_risk_score()
    }
}

impl Default for RiskTolerance {
    fn default() -> Self {
        RiskTolerance::Medium
    }
}

impl std::str::FromStr for RiskTolerance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(RiskTolerance::Low),
            "medium" => Ok(RiskTolerance::Medium),
            "high" => Ok(RiskTolerance::High),
            _ => Err(format!("Unknown risk tolerance: {}", s)),
        }
    }
}

/// Risk tier of an allocation strategy. Ordered from most conservative to
/// most aggressive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Conservative,
    Moderate,
    Aggressive,
}

impl RiskTier {
    /// Whether a caller at this tier is offered strategies of `other`
    pub fn includes(&self, other: RiskTier) -> bool {
        other <= *self
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Conservative => "conservative",
            RiskTier::Moderate => "moderate",
            RiskTier::Aggressive => "aggressive",
        }
    }
}

impl std::str::FromStr for RiskTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "conservative" => Ok(RiskTier::Conservative),
            "moderate" => Ok(RiskTier::Moderate),
            "aggressive" => Ok(RiskTier::Aggressive),
            _ => Err(format!("Unknown risk tier: {}", s)),
        }
    }
}

/// A ranked way to earn yield on an asset, valid for a single scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldOpportunity {
    pub protocol: String,

    pub chain: Chain,

    pub strategy_type: StrategyType,

    pub asset: String,

    /// APY at current market state (percent)
    pub current_apy: f64,

    /// APY after the deposit dilutes the market (percent)
    pub projected_apy: f64,

    /// 0 (safest) to 10
    pub risk_score: f64,

    /// 0 (illiquid) to 10
    pub liquidity_score: f64,

    /// Entry plus exit gas in USD
    pub gas_cost_usd: f64,

    /// Projected APY minus gas expressed as APY. Never above `projected_apy`.
    pub net_apy_after_gas: f64,

    /// 0.0 to 1.0
    pub confidence: f64,
}

/// One slice of an allocation strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioAllocation {
    pub protocol: String,
    pub strategy: StrategyType,
    pub asset: String,
    /// Share of capital, 0 to 100
    pub percentage: f64,
    /// USD, capital × percentage / 100
    pub amount: f64,
    pub current_apy: f64,
    pub risk_score: f64,
}

/// A template-driven allocation set for a risk tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationStrategy {
    pub name: String,
    pub tier: RiskTier,
    /// Allocation percentages sum to 100
    pub allocations: Vec<PortfolioAllocation>,
    pub total_apy: f64,
    pub sharpe_ratio: f64,
    /// Worst expected peak-to-trough loss (percent)
    pub max_drawdown: f64,
    pub required_capital: f64,
    /// Some template allocations had no market data and were left out
    pub partial_data: bool,
}

/// USD earned at the current weighted APY over trailing windows
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrailingYield {
    pub day: f64,
    pub week: f64,
    pub month: f64,
}

/// A position plus the per-position figures the analytics derived for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSummary {
    pub position: Position,
    /// Impermanent loss as a fraction, negative for a loss. `None` when not
    /// a pool position or prices were missing.
    pub impermanent_loss: Option<f64>,
    pub health_factor: Option<f64>,
}

/// Point-in-time analytics for one account's portfolio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldAnalytics {
    pub account: AccountKey,
    pub total_value: f64,
    pub weighted_apy: f64,
    pub trailing_yield: TrailingYield,
    pub sharpe_ratio: f64,
    /// 0 (concentrated) to 10 (well spread)
    pub diversification_score: f64,
    /// Value-weighted impermanent loss across pool positions, in percent
    pub impermanent_loss_exposure: f64,
    pub benchmark_apy: f64,
    /// `weighted_apy - benchmark_apy`
    pub net_return_vs_benchmark: f64,
    pub positions: Vec<PositionSummary>,
    /// Some inputs were missing (prices or position sources)
    pub partial_data: bool,
    pub missing_prices: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

/// Rebalance action types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Deposit,
    Withdraw,
    Swap,
    Migrate,
    Compound,
    /// Pay down debt on a borrow position
    Repay,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Deposit => "deposit",
            ActionType::Withdraw => "withdraw",
            ActionType::Swap => "swap",
            ActionType::Migrate => "migrate",
            ActionType::Compound => "compound",
            ActionType::Repay => "repay",
        }
    }
}

/// Action urgency, `Critical` highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

/// Account an action belongs to. Executors hold one lock per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountKey(String);

impl AccountKey {
    /// Addresses are compared case-insensitively
    pub fn new<S: AsRef<str>>(address: S) -> Self {
        Self(address.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A recommended portfolio change, valid for one decision cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalanceAction {
    pub id: Uuid,

    /// Account whose positions the action touches
    pub account: AccountKey,

    pub action_type: ActionType,

    pub from_protocol: Option<String>,

    pub to_protocol: String,

    pub asset: String,

    /// USD
    pub amount: f64,

    pub reason: String,

    /// Percentage points
    pub expected_gain: f64,

    /// USD
    pub gas_estimate: f64,

    pub priority: Priority,

    /// Percent
    pub slippage_tolerance: f64,

    pub auto_execute: bool,

    pub created_at: DateTime<Utc>,
}

/// Emergency exit rule of an auto-rebalance config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyWithdrawRule {
    pub enabled: bool,
    /// Borrow positions below this health factor are repaid
    pub health_factor_threshold: f64,
    /// Impermanent loss beyond this multiple of the IL threshold is critical
    pub il_multiple: f64,
}

impl Default for EmergencyWithdrawRule {
    fn default() -> Self {
        Self {
            enabled: true,
            health_factor_threshold: 1.2,
            il_multiple: 3.0,
        }
    }
}

/// Caller-owned policy deciding which actions may run unattended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoRebalanceConfig {
    pub enabled: bool,

    /// Percent
    pub max_slippage: f64,

    /// Percentage points an action must gain
    pub min_yield_difference: f64,

    /// USD
    pub max_gas_per_rebalance: f64,

    /// Portfolios earning below this APY (percent) get a migrate action
    pub apy_threshold: f64,

    /// Impermanent loss magnitude (fraction) that triggers a pool exit
    pub il_threshold: f64,

    /// Risk score change that would warrant re-planning
    pub risk_tolerance_change_threshold: f64,

    pub whitelisted_protocols: Vec<String>,

    pub blacklisted_protocols: Vec<String>,

    pub emergency_withdraw: EmergencyWithdrawRule,
}

impl Default for AutoRebalanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_slippage: 0.5,
            min_yield_difference: 1.0,
            max_gas_per_rebalance: 50.0,
            apy_threshold: 4.0,
            il_threshold: 0.05,
            risk_tolerance_change_threshold: 2.0,
            whitelisted_protocols: Vec::new(),
            blacklisted_protocols: Vec::new(),
            emergency_withdraw: EmergencyWithdrawRule::default(),
        }
    }
}

/// Named gate checks, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateCheck {
    Enabled,
    MinYieldDifference,
    MaxGas,
    ProtocolPolicy,
    AutoExecute,
}

impl GateCheck {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateCheck::Enabled => "enabled",
            GateCheck::MinYieldDifference => "min_yield_difference",
            GateCheck::MaxGas => "max_gas",
            GateCheck::ProtocolPolicy => "protocol_policy",
            GateCheck::AutoExecute => "auto_execute",
        }
    }
}

/// An action the gate refused, with the first check it failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedAction {
    pub action: RebalanceAction,
    pub check: GateCheck,
}

/// Result of one gate evaluation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GateOutcome {
    pub approved: Vec<RebalanceAction>,
    pub rejected: Vec<RejectedAction>,
}
