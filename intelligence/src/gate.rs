//! Auto-Rebalance Gate
//!
//! Stateless filter deciding which candidate actions may run without a human.
//! Checks run in a fixed order and stop at the first failure; every rejected
//! action is returned together with the check it failed.

use tracing::{debug, info};

use crate::error::{IntelligenceError, Result};
use crate::types::{
    AutoRebalanceConfig, GateCheck, GateOutcome, Priority, RebalanceAction, RejectedAction,
};

impl AutoRebalanceConfig {
    /// Reject malformed settings before any action is evaluated
    pub fn validate(&self) -> Result<()> {
        let non_negative = [
            ("auto_rebalance.min_yield_difference", self.min_yield_difference),
            ("auto_rebalance.max_gas_per_rebalance", self.max_gas_per_rebalance),
            ("auto_rebalance.apy_threshold", self.apy_threshold),
            ("auto_rebalance.il_threshold", self.il_threshold),
            (
                "auto_rebalance.risk_tolerance_change_threshold",
                self.risk_tolerance_change_threshold,
            ),
        ];
        for (field, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(IntelligenceError::invalid_config(
                    field,
                    format!("must be finite and non-negative, got {}", value),
                ));
            }
        }

        if !self.max_slippage.is_finite() || !(0.0..=100.0).contains(&self.max_slippage) {
            return Err(IntelligenceError::invalid_config(
                "auto_rebalance.max_slippage",
                format!("must be within [0, 100], got {}", self.max_slippage),
            ));
        }

        for (field, list) in [
            ("auto_rebalance.whitelisted_protocols", &self.whitelisted_protocols),
            ("auto_rebalance.blacklisted_protocols", &self.blacklisted_protocols),
        ] {
            if list.iter().any(|p| p.trim().is_empty()) {
                return Err(IntelligenceError::invalid_config(field, "contains an empty protocol name"));
            }
        }
        if let Some(both) = self
            .whitelisted_protocols
            .iter()
            .find(|w| contains_protocol(&self.blacklisted_protocols, w))
        {
            return Err(IntelligenceError::invalid_config(
                "auto_rebalance.whitelisted_protocols",
                format!("{} is also blacklisted", both),
            ));
        }

        let rule = &self.emergency_withdraw;
        if !rule.health_factor_threshold.is_finite() || rule.health_factor_threshold < 1.0 {
            return Err(IntelligenceError::invalid_config(
                "auto_rebalance.emergency_withdraw.health_factor_threshold",
                "must be at least 1.0",
            ));
        }
        if !rule.il_multiple.is_finite() || rule.il_multiple < 2.0 {
            return Err(IntelligenceError::invalid_config(
                "auto_rebalance.emergency_withdraw.il_multiple",
                "must be at least 2",
            ));
        }
        Ok(())
    }
}

fn contains_protocol(list: &[String], protocol: &str) -> bool {
    list.iter().any(|p| p.trim().eq_ignore_ascii_case(protocol.trim()))
}

/// First gate check `action` fails under `config`, if any. NaN gains and
/// gas estimates fail their checks.
#[allow(clippy::neg_cmp_op_on_partial_ord)]
pub fn evaluate(action: &RebalanceAction, config: &AutoRebalanceConfig) -> Option<GateCheck> {
    if !config.enabled {
        return Some(GateCheck::Enabled);
    }
    if !(action.expected_gain >= config.min_yield_difference) {
        return Some(GateCheck::MinYieldDifference);
    }
    if !(action.gas_estimate <= config.max_gas_per_rebalance) {
        return Some(GateCheck::MaxGas);
    }
    if !config.whitelisted_protocols.is_empty()
        && !contains_protocol(&config.whitelisted_protocols, &action.to_protocol)
    {
        return Some(GateCheck::ProtocolPolicy);
    }
    if contains_protocol(&config.blacklisted_protocols, &action.to_protocol) {
        return Some(GateCheck::ProtocolPolicy);
    }
    if !action.auto_execute || action.priority == Priority::Low {
        return Some(GateCheck::AutoExecute);
    }
    None
}

/// Split candidates into approved and rejected. An invalid config is an
/// error and nothing is evaluated.
pub fn filter(actions: Vec<RebalanceAction>, config: &AutoRebalanceConfig) -> Result<GateOutcome> {
    config.validate()?;

    let mut outcome = GateOutcome::default();
    for action in actions {
        match evaluate(&action, config) {
            None => outcome.approved.push(action),
            Some(check) => {
                debug!(
                    action_id = %action.id,
                    action_type = action.action_type.as_str(),
                    to_protocol = %action.to_protocol,
                    check = check.as_str(),
                    "Action held for manual review"
                );
                metrics::increment_counter!(
                    "yieldwise_gate_rejections_total",
                    "check" => check.as_str()
                );
                outcome.rejected.push(RejectedAction { action, check });
            }
        }
    }

    info!(
        approved = outcome.approved.len(),
        rejected = outcome.rejected.len(),
        "🚦 Auto-rebalance gate applied"
    );
    Ok(outcome)
}
