//! Yieldwise Intelligence Layer
//!
//! Turns normalized market and position data into ranked yield
//! opportunities, template allocation strategies, portfolio analytics and
//! rebalance recommendations, and decides which recommendations may run
//! without a human.
//!
//! ## Inputs:
//! 1. **dataplane**: markets, positions and prices behind source traits
//! 2. **config**: gas model, analytics constants, templates, gate policy
//!
//! ## Outputs:
//! - **ScanReport**: ranked [`YieldOpportunity`] list per asset
//! - **OptimizationStrategy**: priced allocation templates per risk tier
//! - **PortfolioReport**: [`YieldAnalytics`] plus candidate [`RebalanceAction`]s
//! - **GateOutcome**: actions approved for auto-execution, and the rest with
//!   the check they failed

pub mod analytics;
pub mod composer;
pub mod config;
pub mod cooldown;
pub mod engine;
pub mod error;
pub mod executor;
pub mod gas;
pub mod gate;
pub mod rebalance;
pub mod scanner;
pub mod types;

pub use analytics::AnalyticsEngine;
pub use composer::{default_templates, MarketBook, StrategyComposer, StrategyTemplate, TemplateAllocation};
pub use config::{AnalyticsConfig, EngineConfig, ScannerConfig};
pub use cooldown::{apply_cooldown, record_fired, CooldownKey, CooldownStore, InMemoryCooldownStore};
pub use engine::{PortfolioReport, YieldEngine};
pub use error::{IntelligenceError, Result};
pub use executor::{AccountLocks, ExecutionSigner, SerializedExecutor, TxHandle};
pub use gas::GasModel;
pub use rebalance::{RebalanceEngine, RebalancePolicy};
pub use scanner::{OpportunityScanner, ScanReport};
pub use types::*;

/// Version of the intelligence layer
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
