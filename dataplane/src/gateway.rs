//! Chain Data Gateway
//!
//! Fans a read out to every registered source concurrently, bounds each read
//! with a timeout and retry policy, and joins whatever came back. A failing
//! source is tagged in the report and never fails the whole read.

use futures::future::join_all;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::sources::{MarketSource, PositionSource};
use crate::types::{AssetMarket, Position, SourceFailure, SourceReport};
use crate::utils::{retry_with_backoff, with_timeout};
use crate::Result;

/// Concurrent reader over all configured market and position sources
pub struct ChainDataGateway {
    config: GatewayConfig,
    market_sources: Vec<Arc<dyn MarketSource>>,
    position_sources: Vec<Arc<dyn PositionSource>>,
}

impl ChainDataGateway {
    /// Create a gateway with no sources
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            market_sources: Vec::new(),
            position_sources: Vec::new(),
        }
    }

    pub fn with_market_source(mut self, source: Arc<dyn MarketSource>) -> Self {
        self.market_sources.push(source);
        self
    }

    pub fn with_position_source(mut self, source: Arc<dyn PositionSource>) -> Self {
        self.position_sources.push(source);
        self
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn market_source_count(&self) -> usize {
        self.market_sources.len()
    }

    /// Markets for `asset` from every source. Duplicate protocol/chain/kind
    /// entries keep the first one seen in source registration order.
    pub async fn get_markets(&self, asset: &str) -> SourceReport<AssetMarket> {
        let reads = self.market_sources.iter().map(|source| async move {
            let result = self
                .read_source(source.name(), "markets", move || source.markets(asset))
                .await;
            (source.name().to_string(), result)
        });
        let results = join_all(reads).await;

        let mut seen = HashSet::new();
        let mut markets = Vec::new();
        let mut failures = Vec::new();
        for (name, result) in results {
            match result {
                Ok(items) => {
                    for market in items {
                        let key = (
                            market.protocol.clone(),
                            market.asset.to_uppercase(),
                            market.chain,
                            market.kind,
                        );
                        if seen.insert(key) {
                            markets.push(market);
                        } else {
                            debug!(source = %name, market = %market.pair_key(), "Duplicate market ignored");
                        }
                    }
                }
                Err(e) => failures.push(record_failure(&name, "markets", &e)),
            }
        }

        info!(
            asset,
            markets = markets.len(),
            failed_sources = failures.len(),
            "Gathered markets"
        );
        SourceReport::new(markets, failures)
    }

    /// Positions held by `address` across every position source
    pub async fn get_user_positions(&self, address: &str) -> SourceReport<Position> {
        let reads = self.position_sources.iter().map(|source| async move {
            let result = self
                .read_source(source.name(), "positions", move || source.positions(address))
                .await;
            (source.name().to_string(), result)
        });
        let results = join_all(reads).await;

        let mut positions = Vec::new();
        let mut failures = Vec::new();
        for (name, result) in results {
            match result {
                Ok(items) => {
                    for position in items {
                        match position.validate() {
                            Ok(()) => positions.push(position),
                            Err(e) => warn!(source = %name, error = %e, "Dropping invalid position"),
                        }
                    }
                }
                Err(e) => failures.push(record_failure(&name, "positions", &e)),
            }
        }

        info!(
            address,
            positions = positions.len(),
            failed_sources = failures.len(),
            "Gathered positions"
        );
        SourceReport::new(positions, failures)
    }

    /// One bounded read: every attempt is capped by the source timeout and
    /// retryable failures are retried with backoff.
    async fn read_source<T, F, Fut>(&self, name: &str, operation: &str, read: F) -> Result<Vec<T>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Vec<T>>>,
    {
        let started = Instant::now();
        let timeout = self.config.source_timeout();
        let result = retry_with_backoff(
            || with_timeout(read(), timeout, name),
            &self.config.retry,
            operation,
        )
        .await;

        metrics::histogram!(
            "yieldwise_source_fetch_seconds",
            started.elapsed().as_secs_f64(),
            "source" => name.to_string(),
            "operation" => operation.to_string()
        );
        result
    }
}

fn record_failure(name: &str, operation: &str, error: &crate::DataplaneError) -> SourceFailure {
    let failure = SourceFailure::from_error(name, error);
    warn!(
        source = name,
        operation,
        kind = failure.kind.as_str(),
        error = %error,
        "Source unavailable, continuing with partial data"
    );
    metrics::increment_counter!(
        "yieldwise_source_failures_total",
        "source" => name.to_string(),
        "kind" => failure.kind.as_str()
    );
    failure
}
