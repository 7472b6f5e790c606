//! Market ports - the collaborators the ecosystem consumes
//!
//! Signal generation, price quoting and candle history live outside the
//! evolutionary core. The core only sees these three traits; the binary and
//! the integration tests plug in `SimulatedMarket`.

mod simulated;

pub use simulated::SimulatedMarket;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{Candle, MarketSignals};

/// Candle interval the arena asks for when reading patterns
pub const PATTERN_INTERVAL: &str = "5m";

/// Produces one signal batch per master cycle
#[async_trait]
pub trait SignalProvider: Send + Sync {
    /// One entry per symbol, each carrying the fixed 30-slot vector in
    /// stable slot order
    async fn generate_all_signals(&self) -> Result<Vec<MarketSignals>>;
}

/// Live price quotes
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Latest price, `None` when unknown. A `None` means skip the action,
    /// never treat it as zero.
    async fn get_price(&self, symbol: &str) -> Option<f64>;
}

/// Optional OHLC cache
pub trait CandleSource: Send + Sync {
    /// Oldest-first candles, `None` when the cache has nothing for the pair
    fn candles(&self, symbol: &str, interval: &str) -> Option<Vec<Candle>>;
}
