//! Simulated market - random-walk prices with indicator-style signals
//!
//! Each `generate_all_signals` call closes one 5m candle per symbol and derives
//! the 30-slot vector from the candle history: slots 0-9 read trend over a
//! growing lookback, 10-19 read up/down momentum, 20-29 read range breakouts
//! (even slots) or mean reversion (odd slots). Drift regimes switch at random
//! so trends come and go.

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::{CandleSource, PriceOracle, SignalProvider, PATTERN_INTERVAL};
use crate::types::{
    Candle, Direction, HigherTimeframe, MarketSignals, PoolSignal, SignalSummary,
    StrategyCategory, STRATEGY_COUNT,
};

const MAX_HISTORY: usize = 200;
const WARMUP_CANDLES: usize = 60;
const ATR_PERIOD: usize = 14;
/// 4h of 5m candles
const HTF_LOOKBACK: usize = 48;
const REGIME_SWITCH_PROBABILITY: f64 = 0.02;

struct SymbolTape {
    candles: VecDeque<Candle>,
    /// Per-candle drift as a fraction of price
    drift: f64,
}

impl SymbolTape {
    fn last_close(&self) -> Option<f64> {
        self.candles.back().map(|c| c.close)
    }

    fn push(&mut self, candle: Candle) {
        self.candles.push_back(candle);
        while self.candles.len() > MAX_HISTORY {
            self.candles.pop_front();
        }
    }

    /// Mean true range over the last `period` candles
    fn atr(&self, period: usize) -> Option<f64> {
        if self.candles.len() < period + 1 {
            return None;
        }
        let n = self.candles.len();
        let sum: f64 = (n - period..n)
            .map(|i| {
                let c = &self.candles[i];
                let prev = self.candles[i - 1].close;
                c.range().max((c.high - prev).abs()).max((c.low - prev).abs())
            })
            .sum();
        Some(sum / period as f64)
    }

    fn close_back(&self, lookback: usize) -> Option<f64> {
        let n = self.candles.len();
        (n > lookback).then(|| self.candles[n - 1 - lookback].close)
    }
}

struct SimState {
    rng: StdRng,
    tapes: HashMap<String, SymbolTape>,
}

/// Offline market implementing all three ports
pub struct SimulatedMarket {
    symbols: Vec<String>,
    volatility: f64,
    state: Mutex<SimState>,
}

impl SimulatedMarket {
    /// `volatility` is the per-candle return deviation (0.004 = 0.4%)
    pub fn new(symbols: &[String], volatility: f64, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let volatility = volatility.clamp(0.0001, 0.1);

        let mut tapes = HashMap::new();
        for symbol in symbols {
            let mut tape = SymbolTape {
                candles: VecDeque::with_capacity(MAX_HISTORY),
                drift: 0.0,
            };
            let start = starting_price(symbol);
            tape.push(Candle::new(start, start, start, start));
            for _ in 0..WARMUP_CANDLES {
                step_tape(&mut tape, volatility, &mut rng);
            }
            tapes.insert(symbol.clone(), tape);
        }

        Self {
            symbols: symbols.to_vec(),
            volatility,
            state: Mutex::new(SimState { rng, tapes }),
        }
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Force the next quote for `symbol` by appending a flat candle at `price`
    pub fn set_price(&self, symbol: &str, price: f64) {
        let mut state = self.lock();
        if let Some(tape) = state.tapes.get_mut(symbol) {
            tape.push(Candle::new(price, price, price, price));
        }
    }

    /// Advance every symbol by one candle without building signals
    pub fn advance(&self) {
        let mut guard = self.lock();
        let state = &mut *guard;
        for symbol in &self.symbols {
            if let Some(tape) = state.tapes.get_mut(symbol) {
                step_tape(tape, self.volatility, &mut state.rng);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn build_signals(tape: &SymbolTape, symbol: &str, rng: &mut StdRng) -> Option<MarketSignals> {
        let price = tape.last_close()?;
        let atr = tape.atr(ATR_PERIOD);
        let unit = atr.unwrap_or(price * 0.001).max(f64::EPSILON);
        let timestamp = Utc::now();
        let ts_ms = timestamp.timestamp_millis();

        let signals: Vec<PoolSignal> = (0..STRATEGY_COUNT)
            .map(|slot| {
                let (direction, strength) = read_slot(tape, slot, price, unit, rng);
                PoolSignal {
                    strategy_id: slot,
                    strategy_name: format!("{}_{:02}", StrategyCategory::for_slot(slot), slot),
                    category: StrategyCategory::for_slot(slot),
                    direction,
                    strength,
                    symbol: symbol.to_string(),
                    timestamp: ts_ms,
                }
            })
            .collect();
        let summary = SignalSummary::from_signals(&signals);

        let higher_tf = match tape.close_back(HTF_LOOKBACK) {
            Some(past) => {
                let score = (price - past) / (unit * (HTF_LOOKBACK as f64).sqrt());
                HigherTimeframe {
                    bias: if score > 0.3 {
                        Direction::Long
                    } else if score < -0.3 {
                        Direction::Short
                    } else {
                        Direction::Neutral
                    },
                    strength: (score.abs() * 40.0).min(100.0),
                    long_count: summary.long_count,
                    short_count: summary.short_count,
                }
            }
            None => HigherTimeframe::default(),
        };

        Some(MarketSignals {
            symbol: symbol.to_string(),
            timestamp,
            signals,
            summary,
            atr14: atr,
            atr14_5m: atr,
            current_price: price,
            higher_tf,
        })
    }
}

#[async_trait]
impl SignalProvider for SimulatedMarket {
    async fn generate_all_signals(&self) -> anyhow::Result<Vec<MarketSignals>> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let mut batch = Vec::with_capacity(self.symbols.len());
        for symbol in &self.symbols {
            let Some(tape) = state.tapes.get_mut(symbol) else {
                continue;
            };
            step_tape(tape, self.volatility, &mut state.rng);
            if let Some(signals) = Self::build_signals(tape, symbol, &mut state.rng) {
                batch.push(signals);
            }
        }
        debug!(symbols = batch.len(), "📈 Simulated signal batch");
        Ok(batch)
    }
}

#[async_trait]
impl PriceOracle for SimulatedMarket {
    async fn get_price(&self, symbol: &str) -> Option<f64> {
        self.lock()
            .tapes
            .get(symbol)
            .and_then(|t| t.last_close())
            .filter(|p| *p > 0.0)
    }
}

impl CandleSource for SimulatedMarket {
    fn candles(&self, symbol: &str, interval: &str) -> Option<Vec<Candle>> {
        if interval != PATTERN_INTERVAL {
            return None;
        }
        let state = self.lock();
        let tape = state.tapes.get(symbol)?;
        Some(tape.candles.iter().copied().collect())
    }
}

fn starting_price(symbol: &str) -> f64 {
    match symbol {
        "BTCUSDT" => 65_000.0,
        "ETHUSDT" => 3_200.0,
        "SOLUSDT" => 150.0,
        "BNBUSDT" => 580.0,
        "XRPUSDT" => 0.6,
        _ => 100.0,
    }
}

/// Roughly unit-variance noise from three uniforms
fn shock<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    (rng.gen::<f64>() + rng.gen::<f64>() + rng.gen::<f64>() - 1.5) * 2.0
}

fn step_tape<R: Rng + ?Sized>(tape: &mut SymbolTape, volatility: f64, rng: &mut R) {
    let Some(open) = tape.last_close() else {
        return;
    };
    if rng.gen::<f64>() < REGIME_SWITCH_PROBABILITY {
        tape.drift = (rng.gen::<f64>() - 0.5) * volatility;
    }
    let ret = (tape.drift + volatility * shock(rng)).clamp(-0.2, 0.2);
    let close = (open * (1.0 + ret)).max(open * 0.5);
    let high = open.max(close) * (1.0 + rng.gen::<f64>() * volatility * 0.5);
    let low = open.min(close) * (1.0 - rng.gen::<f64>() * volatility * 0.5);
    tape.push(Candle::new(open, high, low, close));
}

fn read_slot(
    tape: &SymbolTape,
    slot: usize,
    price: f64,
    unit: f64,
    rng: &mut StdRng,
) -> (Direction, f64) {
    let variant = slot % 10;
    let lookback = 3 + variant;
    let n = tape.candles.len();

    let score = match StrategyCategory::for_slot(slot) {
        StrategyCategory::Trend => match tape.close_back(lookback) {
            Some(past) => (price - past) / (unit * (lookback as f64).sqrt()),
            None => 0.0,
        },
        StrategyCategory::Momentum => {
            if n <= lookback {
                0.0
            } else {
                let ups = (n - lookback..n)
                    .filter(|i| tape.candles[*i].is_bullish())
                    .count() as f64;
                (ups / lookback as f64 - 0.5) * 4.0
            }
        }
        StrategyCategory::Volatility => {
            let Some(last) = tape.candles.back() else {
                return (Direction::Neutral, 0.0);
            };
            if slot % 2 == 0 {
                let expansion = last.range() / unit;
                let trigger = 1.0 + variant as f64 * 0.05;
                if expansion > trigger {
                    let side = if last.is_bullish() { 1.0 } else { -1.0 };
                    side * expansion
                } else {
                    0.0
                }
            } else if n > lookback {
                let mean = (n - lookback..n)
                    .map(|i| tape.candles[i].close)
                    .sum::<f64>()
                    / lookback as f64;
                (mean - price) / unit
            } else {
                0.0
            }
        }
    };

    let threshold = 0.3 + variant as f64 * 0.05;
    if score.abs() < threshold || rng.gen::<f64>() < 0.1 {
        return (Direction::Neutral, 0.0);
    }
    let direction = if score > 0.0 {
        Direction::Long
    } else {
        Direction::Short
    };
    let strength = (35.0 + score.abs() * 25.0 + (rng.gen::<f64>() - 0.5) * 20.0).clamp(1.0, 100.0);
    (direction, strength)
}
