//! Core market-facing types used throughout EvoArena
//!
//! Signals arrive as a fixed 30-slot vector per symbol. Slot order is the
//! genetic locus that genome masks and weights index into, so providers must
//! keep it stable across calls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of strategy slots in every signal vector and genome mask
pub const STRATEGY_COUNT: usize = 30;

/// Symbol used as the market-dominance reference
pub const BTC_SYMBOL: &str = "BTCUSDT";

/// Signal direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
    Neutral,
}

impl Default for Direction {
    fn default() -> Self {
        Direction::Neutral
    }
}

impl Direction {
    /// The opposing side (neutral stays neutral)
    pub fn opposite(&self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
            Direction::Neutral => Direction::Neutral,
        }
    }

    /// +1 for long, -1 for short, 0 for neutral
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
            Direction::Neutral => 0.0,
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "LONG" | "BULLISH" | "UP" => Some(Direction::Long),
            "SHORT" | "BEARISH" | "DOWN" => Some(Direction::Short),
            "NEUTRAL" => Some(Direction::Neutral),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
            Direction::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// The five groups of the community
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GroupId {
    Alpha,
    Beta,
    Gamma,
    Delta,
    Omega,
}

impl Default for GroupId {
    fn default() -> Self {
        GroupId::Alpha
    }
}

impl GroupId {
    pub const ALL: [GroupId; 5] = [
        GroupId::Alpha,
        GroupId::Beta,
        GroupId::Gamma,
        GroupId::Delta,
        GroupId::Omega,
    ];

    /// Position in the community (0 - 4)
    pub fn index(&self) -> usize {
        match self {
            GroupId::Alpha => 0,
            GroupId::Beta => 1,
            GroupId::Gamma => 2,
            GroupId::Delta => 3,
            GroupId::Omega => 4,
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "ALPHA" => Some(GroupId::Alpha),
            "BETA" => Some(GroupId::Beta),
            "GAMMA" => Some(GroupId::Gamma),
            "DELTA" => Some(GroupId::Delta),
            "OMEGA" => Some(GroupId::Omega),
            _ => None,
        }
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupId::Alpha => write!(f, "ALPHA"),
            GroupId::Beta => write!(f, "BETA"),
            GroupId::Gamma => write!(f, "GAMMA"),
            GroupId::Delta => write!(f, "DELTA"),
            GroupId::Omega => write!(f, "OMEGA"),
        }
    }
}

/// Strategy family of a signal slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StrategyCategory {
    Trend,
    Momentum,
    Volatility,
}

impl Default for StrategyCategory {
    fn default() -> Self {
        StrategyCategory::Trend
    }
}

impl StrategyCategory {
    pub const ALL: [StrategyCategory; 3] = [
        StrategyCategory::Trend,
        StrategyCategory::Momentum,
        StrategyCategory::Volatility,
    ];

    /// Category owning a slot: 0-9 trend, 10-19 momentum, 20-29 volatility
    pub fn for_slot(slot: usize) -> Self {
        match slot {
            0..=9 => StrategyCategory::Trend,
            10..=19 => StrategyCategory::Momentum,
            _ => StrategyCategory::Volatility,
        }
    }

    /// Stable index for per-category arrays
    pub fn index(&self) -> usize {
        match self {
            StrategyCategory::Trend => 0,
            StrategyCategory::Momentum => 1,
            StrategyCategory::Volatility => 2,
        }
    }
}

impl fmt::Display for StrategyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyCategory::Trend => write!(f, "TREND"),
            StrategyCategory::Momentum => write!(f, "MOMENTUM"),
            StrategyCategory::Volatility => write!(f, "VOLATILITY"),
        }
    }
}

/// One strategy's opinion on one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSignal {
    pub strategy_id: usize,
    pub strategy_name: String,
    pub category: StrategyCategory,
    pub direction: Direction,
    /// Signal strength (0 - 100)
    pub strength: f64,
    pub symbol: String,
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
}

/// Aggregated counts over a signal vector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalSummary {
    pub long_count: usize,
    pub short_count: usize,
    pub neutral_count: usize,
    pub avg_long_strength: f64,
    pub avg_short_strength: f64,
}

impl SignalSummary {
    pub fn from_signals(signals: &[PoolSignal]) -> Self {
        let mut summary = SignalSummary::default();
        let mut long_sum = 0.0;
        let mut short_sum = 0.0;
        for s in signals {
            match s.direction {
                Direction::Long => {
                    summary.long_count += 1;
                    long_sum += s.strength;
                }
                Direction::Short => {
                    summary.short_count += 1;
                    short_sum += s.strength;
                }
                Direction::Neutral => summary.neutral_count += 1,
            }
        }
        if summary.long_count > 0 {
            summary.avg_long_strength = long_sum / summary.long_count as f64;
        }
        if summary.short_count > 0 {
            summary.avg_short_strength = short_sum / summary.short_count as f64;
        }
        summary
    }
}

/// Higher-timeframe trend context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HigherTimeframe {
    pub bias: Direction,
    /// Bias strength (0 - 100)
    pub strength: f64,
    #[serde(default)]
    pub long_count: usize,
    #[serde(default)]
    pub short_count: usize,
}

/// Full signal batch for one symbol, produced once per cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSignals {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    /// Fixed-length, slot-ordered signal vector
    pub signals: Vec<PoolSignal>,
    pub summary: SignalSummary,
    pub atr14: Option<f64>,
    #[serde(default)]
    pub atr14_5m: Option<f64>,
    pub current_price: f64,
    pub higher_tf: HigherTimeframe,
}

impl MarketSignals {
    /// Side with more raw signals (long wins ties)
    pub fn dominant_direction(&self) -> Direction {
        if self.summary.long_count == 0 && self.summary.short_count == 0 {
            Direction::Neutral
        } else if self.summary.long_count >= self.summary.short_count {
            Direction::Long
        } else {
            Direction::Short
        }
    }

    /// Raw count of signals pointing against `side`
    pub fn opposing_count(&self, side: Direction) -> usize {
        let against = side.opposite();
        self.signals
            .iter()
            .filter(|s| s.direction == against && against != Direction::Neutral)
            .count()
    }

    /// ATR with a 0.1% of price fallback when the provider has none
    pub fn atr_or_fallback(&self) -> f64 {
        match self.atr14 {
            Some(atr) if atr > 0.0 => atr,
            _ => self.current_price * 0.001,
        }
    }
}

/// OHLC candle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    pub fn new(open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            open,
            high,
            low,
            close,
        }
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn upper_wick(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    pub fn lower_wick(&self) -> f64 {
        self.open.min(self.close) - self.low
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(slot: usize, direction: Direction, strength: f64) -> PoolSignal {
        PoolSignal {
            strategy_id: slot,
            strategy_name: format!("s{}", slot),
            category: StrategyCategory::for_slot(slot),
            direction,
            strength,
            symbol: "BTCUSDT".to_string(),
            timestamp: 0,
        }
    }

    #[test]
    fn test_category_slots() {
        assert_eq!(StrategyCategory::for_slot(0), StrategyCategory::Trend);
        assert_eq!(StrategyCategory::for_slot(15), StrategyCategory::Momentum);
        assert_eq!(StrategyCategory::for_slot(29), StrategyCategory::Volatility);
    }

    #[test]
    fn test_summary_counts_and_averages() {
        let signals = vec![
            signal(0, Direction::Long, 60.0),
            signal(1, Direction::Long, 40.0),
            signal(2, Direction::Short, 30.0),
            signal(3, Direction::Neutral, 0.0),
        ];
        let summary = SignalSummary::from_signals(&signals);
        assert_eq!(summary.long_count, 2);
        assert_eq!(summary.short_count, 1);
        assert_eq!(summary.neutral_count, 1);
        assert!((summary.avg_long_strength - 50.0).abs() < 1e-9);
        assert!((summary.avg_short_strength - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_direction_parse_and_display() {
        assert_eq!(Direction::from_str("long"), Some(Direction::Long));
        assert_eq!(Direction::from_str("BEARISH"), Some(Direction::Short));
        assert_eq!(Direction::from_str("sideways"), None);
        assert_eq!(Direction::Short.to_string(), "SHORT");
        assert_eq!(Direction::Long.opposite(), Direction::Short);
    }

    #[test]
    fn test_candle_geometry() {
        let c = Candle::new(100.0, 110.0, 95.0, 105.0);
        assert_eq!(c.body(), 5.0);
        assert_eq!(c.range(), 15.0);
        assert_eq!(c.upper_wick(), 5.0);
        assert_eq!(c.lower_wick(), 5.0);
        assert!(c.is_bullish());
    }
}
