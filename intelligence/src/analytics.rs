//! Analytics Engine
//!
//! Computes a fresh [`YieldAnalytics`] snapshot from an account's positions:
//! weighted APY, trailing yield, a Sharpe-like ratio, diversification,
//! impermanent-loss exposure and the benchmark comparison.
//!
//! Missing prices never fail an analysis. The affected pool positions are
//! left out of the IL aggregate (but kept in value totals) and the result is
//! flagged `partial_data`.

use chrono::Utc;
use futures::future::join_all;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};
use yieldwise_dataplane::utils::{weighted_mean, weighted_std_dev};
use yieldwise_dataplane::{Position, PositionDetails, PriceOracle};

use crate::config::AnalyticsConfig;
use crate::types::{AccountKey, PositionSummary, TrailingYield, YieldAnalytics};

/// Floor for the volatility term of the Sharpe-like ratio (percentage points)
const MIN_VOLATILITY: f64 = 1.0;

/// Impermanent loss of a constant-product pool position as a fraction.
///
/// With `r = (c1/c0) / (e1/e0)`, IL is `2·sqrt(r) / (1 + r) − 1`. Zero when
/// the relative price is unchanged, negative otherwise. `None` when any price
/// is not a positive finite number.
pub fn impermanent_loss(entry0: f64, entry1: f64, current0: f64, current1: f64) -> Option<f64> {
    let valid = |p: f64| p.is_finite() && p > 0.0;
    if !(valid(entry0) && valid(entry1) && valid(current0) && valid(current1)) {
        return None;
    }
    let r = (current1 / current0) / (entry1 / entry0);
    Some(2.0 * r.sqrt() / (1.0 + r) - 1.0)
}

/// Value-weighted APY over vault and pool positions. Zero when they hold no
/// value.
pub fn weighted_apy(positions: &[Position]) -> f64 {
    let earning: Vec<&Position> = positions
        .iter()
        .filter(|p| !p.is_borrow() && p.value_usd > 0.0)
        .collect();
    let total: f64 = earning.iter().map(|p| p.value_usd).sum();
    if total <= 0.0 || !total.is_finite() {
        return 0.0;
    }
    earning.iter().map(|p| p.value_usd / total * p.apy).sum()
}

/// Inverse-Herfindahl spread over distinct protocol:asset pairs, scaled so a
/// single holding scores 0 and `full_count` equal holdings score 10.
pub fn diversification_score(positions: &[Position], full_count: usize) -> f64 {
    let mut by_pair: HashMap<String, f64> = HashMap::new();
    for p in positions.iter().filter(|p| p.value_usd > 0.0) {
        let key = format!("{}:{}", p.protocol.to_lowercase(), p.asset.to_uppercase());
        *by_pair.entry(key).or_insert(0.0) += p.value_usd;
    }

    let total: f64 = by_pair.values().sum();
    if total <= 0.0 || full_count < 2 {
        return 0.0;
    }
    let hhi: f64 = by_pair.values().map(|v| (v / total).powi(2)).sum();
    let effective_holdings = 1.0 / hhi;
    (10.0 * (effective_holdings - 1.0) / (full_count as f64 - 1.0)).clamp(0.0, 10.0)
}

/// Computes portfolio analytics against a price oracle
pub struct AnalyticsEngine {
    config: AnalyticsConfig,
}

impl AnalyticsEngine {
    pub fn new(config: AnalyticsConfig) -> Self {
        Self { config }
    }

    /// Price every pool token concurrently, then analyze
    pub async fn analyze(
        &self,
        account: &AccountKey,
        positions: &[Position],
        oracle: &dyn PriceOracle,
    ) -> YieldAnalytics {
        let symbols: BTreeSet<String> = positions
            .iter()
            .filter_map(|p| match &p.details {
                PositionDetails::LiquidityPool { token0, token1, .. } => {
                    Some([token0.to_uppercase(), token1.to_uppercase()])
                }
                _ => None,
            })
            .flatten()
            .collect();

        let quotes = join_all(symbols.into_iter().map(|symbol| async move {
            let price = oracle.price(&symbol).await;
            (symbol, price)
        }))
        .await;

        let mut prices = HashMap::new();
        for (symbol, quote) in quotes {
            match quote {
                Ok(price) => {
                    prices.insert(symbol, price);
                }
                Err(e) => warn!(symbol = %symbol, error = %e, "Price unavailable"),
            }
        }

        self.analyze_with_prices(account, positions, &prices)
    }

    /// Analyze against a fixed price table keyed by upper-case symbol
    pub fn analyze_with_prices(
        &self,
        account: &AccountKey,
        positions: &[Position],
        prices: &HashMap<String, f64>,
    ) -> YieldAnalytics {
        let total_value: f64 = positions.iter().map(|p| p.value_usd.max(0.0)).sum();
        let earning_value: f64 = positions
            .iter()
            .filter(|p| !p.is_borrow())
            .map(|p| p.value_usd.max(0.0))
            .sum();
        let apy = weighted_apy(positions);

        let mut partial_data = false;
        let mut missing_prices = BTreeSet::new();
        let mut il_samples = Vec::new();
        let mut summaries = Vec::with_capacity(positions.len());

        for position in positions {
            let impermanent_loss = match &position.details {
                PositionDetails::LiquidityPool {
                    token0,
                    token1,
                    entry_price0,
                    entry_price1,
                } => {
                    let current0 = prices.get(&token0.to_uppercase()).copied();
                    let current1 = prices.get(&token1.to_uppercase()).copied();
                    if current0.is_none() {
                        missing_prices.insert(token0.to_uppercase());
                    }
                    if current1.is_none() {
                        missing_prices.insert(token1.to_uppercase());
                    }

                    let il = match (current0, current1) {
                        (Some(c0), Some(c1)) => impermanent_loss(*entry_price0, *entry_price1, c0, c1),
                        _ => None,
                    };
                    match il {
                        Some(il) => il_samples.push((il, position.value_usd.max(0.0))),
                        None => {
                            partial_data = true;
                            debug!(position = %position.pair_key(), "Left out of IL exposure");
                        }
                    }
                    il
                }
                _ => None,
            };

            summaries.push(PositionSummary {
                position: position.clone(),
                impermanent_loss,
                health_factor: position.health_factor(),
            });
        }

        let impermanent_loss_exposure = weighted_mean(&il_samples) * 100.0;

        let apy_samples: Vec<(f64, f64)> = positions
            .iter()
            .filter(|p| !p.is_borrow() && p.value_usd > 0.0)
            .map(|p| (p.apy, p.value_usd))
            .collect();
        let volatility =
            (weighted_std_dev(&apy_samples) + impermanent_loss_exposure.abs()).max(MIN_VOLATILITY);
        let sharpe_ratio = if earning_value > 0.0 {
            (apy - self.config.risk_free_rate) / volatility
        } else {
            0.0
        };

        let trailing = |days: f64| earning_value * apy / 100.0 * days / 365.0;

        let analytics = YieldAnalytics {
            account: account.clone(),
            total_value,
            weighted_apy: apy,
            trailing_yield: TrailingYield {
                day: trailing(1.0),
                week: trailing(7.0),
                month: trailing(30.0),
            },
            sharpe_ratio,
            diversification_score: diversification_score(
                positions,
                self.config.full_diversification_count,
            ),
            impermanent_loss_exposure,
            benchmark_apy: self.config.benchmark_apy,
            net_return_vs_benchmark: apy - self.config.benchmark_apy,
            positions: summaries,
            partial_data,
            missing_prices: missing_prices.into_iter().collect(),
            generated_at: Utc::now(),
        };

        info!(
            account = %account,
            positions = positions.len(),
            total_value = analytics.total_value,
            weighted_apy = analytics.weighted_apy,
            il_exposure_pct = analytics.impermanent_loss_exposure,
            partial = analytics.partial_data,
            "📊 Portfolio analyzed"
        );
        analytics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yieldwise_dataplane::{Chain, StaticPriceOracle};

    fn vault(protocol: &str, asset: &str, value: f64, apy: f64) -> Position {
        Position {
            protocol: protocol.into(),
            chain: Chain::Ethereum,
            asset: asset.into(),
            value_usd: value,
            apy,
            unclaimed_rewards_usd: 0.0,
            details: PositionDetails::Vault,
        }
    }

    fn pool(value: f64, entry1: f64) -> Position {
        Position {
            protocol: "uniswap_v3".into(),
            chain: Chain::Ethereum,
            asset: "USDC-WETH".into(),
            value_usd: value,
            apy: 12.0,
            unclaimed_rewards_usd: 0.0,
            details: PositionDetails::LiquidityPool {
                token0: "USDC".into(),
                token1: "WETH".into(),
                entry_price0: 1.0,
                entry_price1: entry1,
            },
        }
    }

    fn engine() -> AnalyticsEngine {
        AnalyticsEngine::new(AnalyticsConfig::default())
    }

    #[test]
    fn test_impermanent_loss_reference_value() {
        let il = impermanent_loss(1.0, 2000.0, 1.0, 2500.0).unwrap();
        assert!((il - (-0.00622)).abs() < 1e-5, "got {}", il);
    }

    #[test]
    fn test_impermanent_loss_edges() {
        assert_eq!(impermanent_loss(1.0, 2000.0, 1.0, 2000.0), Some(0.0));
        // Doubling and halving lose the same
        let up = impermanent_loss(1.0, 1.0, 1.0, 2.0).unwrap();
        let down = impermanent_loss(1.0, 1.0, 1.0, 0.5).unwrap();
        assert!((up - down).abs() < 1e-12);
        assert!(up < 0.0);
        assert_eq!(impermanent_loss(0.0, 1.0, 1.0, 1.0), None);
    }

    #[test]
    fn test_weighted_apy() {
        assert_eq!(weighted_apy(&[vault("aave_v3", "USDC", 1234.5, 3.7)]), 3.7);
        assert_eq!(weighted_apy(&[vault("aave_v3", "USDC", 0.0, 3.7)]), 0.0);
        assert_eq!(weighted_apy(&[]), 0.0);

        let mixed = [vault("aave_v3", "USDC", 3_000.0, 4.0), vault("compound_v3", "USDC", 1_000.0, 8.0)];
        assert!((weighted_apy(&mixed) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_diversification_bounds() {
        let single = [vault("aave_v3", "USDC", 10_000.0, 4.0)];
        assert_eq!(diversification_score(&single, 5), 0.0);

        let spread: Vec<Position> = ["aave_v3", "compound_v3", "morpho", "spark", "euler"]
            .iter()
            .map(|p| vault(p, "USDC", 2_000.0, 4.0))
            .collect();
        assert!((diversification_score(&spread, 5) - 10.0).abs() < 1e-9);

        let skewed = [vault("aave_v3", "USDC", 9_000.0, 4.0), vault("morpho", "USDC", 1_000.0, 4.0)];
        let even = [vault("aave_v3", "USDC", 5_000.0, 4.0), vault("morpho", "USDC", 5_000.0, 4.0)];
        assert!(diversification_score(&skewed, 5) < diversification_score(&even, 5));
    }

    #[test]
    fn test_missing_price_flags_partial_but_keeps_value() {
        let positions = vec![vault("aave_v3", "USDC", 5_000.0, 4.0), pool(5_000.0, 2000.0)];
        let mut prices = HashMap::new();
        prices.insert("USDC".to_string(), 1.0);

        let analytics = engine().analyze_with_prices(&AccountKey::new("0xabc"), &positions, &prices);
        assert!(analytics.partial_data);
        assert_eq!(analytics.missing_prices, vec!["WETH".to_string()]);
        assert_eq!(analytics.total_value, 10_000.0);
        assert_eq!(analytics.impermanent_loss_exposure, 0.0);
        assert_eq!(analytics.positions[1].impermanent_loss, None);
    }

    #[test]
    fn test_zero_value_portfolio() {
        let analytics = engine().analyze_with_prices(&AccountKey::new("0xabc"), &[], &HashMap::new());
        assert_eq!(analytics.weighted_apy, 0.0);
        assert_eq!(analytics.sharpe_ratio, 0.0);
        assert_eq!(analytics.trailing_yield, TrailingYield::default());
        assert!(!analytics.partial_data);
    }

    #[test]
    fn test_benchmark_and_trailing_yield() {
        let config = AnalyticsConfig {
            benchmark_apy: 3.0,
            ..AnalyticsConfig::default()
        };
        let analytics = AnalyticsEngine::new(config).analyze_with_prices(
            &AccountKey::new("0xabc"),
            &[vault("aave_v3", "USDC", 36_500.0, 10.0)],
            &HashMap::new(),
        );
        assert!((analytics.net_return_vs_benchmark - 7.0).abs() < 1e-12);
        assert!((analytics.trailing_yield.day - 10.0).abs() < 1e-9);
        assert!((analytics.trailing_yield.week - 70.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_analyze_prices_pool_tokens() {
        let oracle = StaticPriceOracle::default()
            .with_price("USDC", 1.0)
            .with_price("WETH", 2500.0);
        let positions = vec![pool(10_000.0, 2000.0)];

        let analytics = engine().analyze(&AccountKey::new("0xabc"), &positions, &oracle).await;
        assert!(!analytics.partial_data);
        assert!((analytics.impermanent_loss_exposure - (-0.622)).abs() < 1e-3);
        let il = analytics.positions[0].impermanent_loss.unwrap();
        assert!(il < 0.0);
    }
}
