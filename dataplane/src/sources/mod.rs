//! Market, position and price sources

pub mod adapters;
pub mod snapshot;
pub mod traits;

pub use adapters::{
    CrossProtocolRecord, LendingVaultRecord, LiquidityPoolRecord, MarketRecord, RateQuote,
};
pub use snapshot::{MarketSnapshot, SnapshotMarketSource, SnapshotPositionSource, StaticPriceOracle};
pub use traits::{MarketSource, PositionSource, PriceOracle};
