//! Seed DNA modules
//!
//! Nine independently evolving subsystems, each owning one dimension of the
//! trading decision. Every group owns one instance of each. Seeds share a
//! common contract: a small genome, a Sharpe-like fitness over a rolling PnL
//! window, and `evolve()` which blends from an optional donor, mutates each
//! field with ~15% probability inside hard clamps, then decays its counters
//! so learning carries across generations.

pub mod correlation;
pub mod market_regime;
pub mod meta_evolution;
pub mod pattern;
pub mod risk_adapt;
pub mod sentiment;
pub mod strategy_param;
pub mod symbol_selection;
pub mod temporal;

pub use correlation::{CorrelationDna, CorrelationGenome};
pub use market_regime::{MarketRegime, MarketRegimeDna, MarketRegimeGenome};
pub use meta_evolution::{MetaEvolutionDna, MetaEvolutionGenome, MutationCategory, MutationRates};
pub use pattern::{PatternDna, PatternGenome, PatternKind, PatternRead};
pub use risk_adapt::{DrawdownLevel, RiskAdaptDna, RiskAdaptGenome, RiskContext};
pub use sentiment::{SentimentBand, SentimentDna, SentimentGenome, SentimentRead};
pub use strategy_param::{StrategyParamDna, StrategyParamGenome};
pub use symbol_selection::{SymbolSelectionDna, SymbolSelectionGenome, SymbolStats};
pub use temporal::{TemporalDna, TemporalGenome, TradingSession};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use crate::genome::fingerprint_bytes;
use crate::types::GroupId;

/// Rolling PnL samples feeding seed fitness
pub const PERFORMANCE_WINDOW: usize = 100;
/// Samples needed before fitness moves off its prior
pub const MIN_FITNESS_SAMPLES: usize = 10;
/// Per-field mutation probability
pub const FIELD_MUTATION_RATE: f64 = 0.15;
/// Geometric decay applied to counters on every evolve()
pub const COUNTER_DECAY: f64 = 0.8;
/// Samples kept across an evolve()
const RETAINED_SAMPLES: usize = 50;

// ─────────────────────────────────────────────────────────────────
// Shared performance bookkeeping
// ─────────────────────────────────────────────────────────────────

/// Rolling outcome window with decaying counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceWindow {
    pub pnl: VecDeque<f64>,
    pub wins: f64,
    pub trades: f64,
}

impl PerformanceWindow {
    pub fn record(&mut self, profitable: bool, pnl_percent: f64) {
        self.trades += 1.0;
        if profitable {
            self.wins += 1.0;
        }
        self.pnl.push_back(pnl_percent);
        while self.pnl.len() > PERFORMANCE_WINDOW {
            self.pnl.pop_front();
        }
    }

    pub fn samples(&self) -> usize {
        self.pnl.len()
    }

    pub fn win_rate(&self) -> f64 {
        if self.trades <= 0.0 {
            0.0
        } else {
            self.wins / self.trades
        }
    }

    /// 50 + 30 * mean/stdev once enough samples exist; 70/30 by sign of
    /// the mean when the window has no variance. `None` below the sample floor.
    pub fn fitness(&self) -> Option<f64> {
        if self.pnl.len() < MIN_FITNESS_SAMPLES {
            return None;
        }
        let n = self.pnl.len() as f64;
        let mean = self.pnl.iter().sum::<f64>() / n;
        let variance = self.pnl.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n;
        let std_dev = variance.sqrt();
        let score = if std_dev > 0.0 {
            50.0 + 30.0 * (mean / std_dev)
        } else if mean > 0.0 {
            70.0
        } else if mean < 0.0 {
            30.0
        } else {
            50.0
        };
        Some(score.clamp(0.0, 100.0))
    }

    /// Decay counters x0.8 and keep only the most recent samples
    pub fn decay(&mut self) {
        self.wins = (self.wins * COUNTER_DECAY).floor();
        self.trades = (self.trades * COUNTER_DECAY).floor();
        while self.pnl.len() > RETAINED_SAMPLES {
            self.pnl.pop_front();
        }
    }
}

/// Generation, fitness and performance shared by every seed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedCore {
    pub generation: u32,
    pub fitness: f64,
    #[serde(default)]
    pub performance: PerformanceWindow,
}

impl Default for SeedCore {
    fn default() -> Self {
        Self {
            generation: 1,
            fitness: 50.0,
            performance: PerformanceWindow::default(),
        }
    }
}

impl SeedCore {
    pub fn record(&mut self, profitable: bool, pnl_percent: f64) {
        self.performance.record(profitable, pnl_percent);
        if let Some(f) = self.performance.fitness() {
            self.fitness = f;
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Common contract
// ─────────────────────────────────────────────────────────────────

/// Contract every seed DNA module implements
pub trait Seed {
    type Genome: Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned;

    const NAME: &'static str;

    fn genome(&self) -> &Self::Genome;

    /// Replace the genome (e.g. from persistence) and repair its invariants
    fn restore(&mut self, genome: Self::Genome);

    fn core(&self) -> &SeedCore;

    fn core_mut(&mut self) -> &mut SeedCore;

    /// 50/50 per-field inheritance from a donor genome
    fn blend<R: Rng + ?Sized>(&mut self, partner: &Self::Genome, rng: &mut R);

    /// Independent per-field mutation with probability `rate`
    fn mutate<R: Rng + ?Sized>(&mut self, rate: f64, rng: &mut R);

    /// Extra per-module counters to decay on evolve()
    fn decay_counters(&mut self) {}

    fn mutation_rate(&self) -> f64 {
        FIELD_MUTATION_RATE
    }

    fn fitness(&self) -> f64 {
        self.core().fitness
    }

    fn generation(&self) -> u32 {
        self.core().generation
    }

    fn record_outcome(&mut self, profitable: bool, pnl_percent: f64) {
        self.core_mut().record(profitable, pnl_percent);
    }

    fn evolve<R: Rng + ?Sized>(&mut self, partner: Option<&Self::Genome>, rng: &mut R) {
        self.core_mut().generation += 1;
        if let Some(partner) = partner {
            self.blend(partner, rng);
        }
        let rate = self.mutation_rate();
        self.mutate(rate, rng);
        self.decay_counters();
        self.core_mut().performance.decay();
    }

    fn status(&self) -> SeedStatus {
        let bytes = serde_json::to_vec(self.genome()).unwrap_or_default();
        SeedStatus {
            name: Self::NAME.to_string(),
            generation: self.generation(),
            fitness: self.fitness(),
            fingerprint: fingerprint_bytes(&bytes),
        }
    }
}

/// Summary of one seed for status and registry snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedStatus {
    pub name: String,
    pub generation: u32,
    pub fitness: f64,
    pub fingerprint: String,
}

// ─────────────────────────────────────────────────────────────────
// Mutation helpers
// ─────────────────────────────────────────────────────────────────

/// Bernoulli trial that tolerates out-of-range probabilities
pub(crate) fn chance<R: Rng + ?Sized>(rng: &mut R, p: f64) -> bool {
    rng.gen::<f64>() < p
}

/// With probability `rate`, move `value` by a uniform step in +-span/2, clamped
pub(crate) fn mutate_f64<R: Rng + ?Sized>(
    rng: &mut R,
    rate: f64,
    value: &mut f64,
    span: f64,
    (min, max): (f64, f64),
) {
    if chance(rng, rate) {
        *value = (*value + (rng.gen::<f64>() - 0.5) * span).clamp(min, max);
    }
}

/// Integer variant of `mutate_f64`
pub(crate) fn mutate_u32<R: Rng + ?Sized>(
    rng: &mut R,
    rate: f64,
    value: &mut u32,
    span: f64,
    (min, max): (f64, f64),
) {
    if chance(rng, rate) {
        let next = (*value as f64 + (rng.gen::<f64>() - 0.5) * span).round();
        *value = next.clamp(min, max) as u32;
    }
}

/// Take the donor's value with probability 0.5
pub(crate) fn inherit<R: Rng + ?Sized, T: Clone>(rng: &mut R, own: &mut T, donor: &T) {
    if rng.gen::<f64>() < 0.5 {
        *own = donor.clone();
    }
}

// ─────────────────────────────────────────────────────────────────
// SeedBank: one instance of each seed per group
// ─────────────────────────────────────────────────────────────────

/// Genome-only copy of all nine seeds, used for cross-pollination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedGenomes {
    pub strategy_param: StrategyParamGenome,
    pub market_regime: MarketRegimeGenome,
    pub temporal: TemporalGenome,
    pub correlation: CorrelationGenome,
    pub sentiment: SentimentGenome,
    pub risk_adapt: RiskAdaptGenome,
    pub meta_evolution: MetaEvolutionGenome,
    pub pattern: PatternGenome,
    pub symbol_selection: SymbolSelectionGenome,
}

/// The nine seeds owned by one group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedBank {
    pub strategy_param: StrategyParamDna,
    pub market_regime: MarketRegimeDna,
    pub temporal: TemporalDna,
    pub correlation: CorrelationDna,
    pub sentiment: SentimentDna,
    pub risk_adapt: RiskAdaptDna,
    pub meta_evolution: MetaEvolutionDna,
    pub pattern: PatternDna,
    pub symbol_selection: SymbolSelectionDna,
    /// Donor genomes handed over by migration, consumed at the next evolve
    #[serde(default)]
    pub pending_donor: Option<SeedGenomes>,
}

impl SeedBank {
    pub fn new(group: GroupId, symbols: &[String]) -> Self {
        Self {
            strategy_param: StrategyParamDna::for_group(group),
            market_regime: MarketRegimeDna::default(),
            temporal: TemporalDna::default(),
            correlation: CorrelationDna::default(),
            sentiment: SentimentDna::default(),
            risk_adapt: RiskAdaptDna::default(),
            meta_evolution: MetaEvolutionDna::default(),
            pattern: PatternDna::for_group(group),
            symbol_selection: SymbolSelectionDna::new(symbols),
            pending_donor: None,
        }
    }

    pub fn genomes(&self) -> SeedGenomes {
        SeedGenomes {
            strategy_param: self.strategy_param.genome().clone(),
            market_regime: self.market_regime.genome().clone(),
            temporal: self.temporal.genome().clone(),
            correlation: self.correlation.genome().clone(),
            sentiment: self.sentiment.genome().clone(),
            risk_adapt: self.risk_adapt.genome().clone(),
            meta_evolution: self.meta_evolution.genome().clone(),
            pattern: self.pattern.genome().clone(),
            symbol_selection: self.symbol_selection.genome().clone(),
        }
    }

    /// Feed one closed trade to all nine seeds
    pub fn record_trade(&mut self, symbol: &str, profitable: bool, pnl_percent: f64, cycle: u64) {
        self.strategy_param.record_outcome(profitable, pnl_percent);
        self.market_regime.record_outcome(profitable, pnl_percent);
        self.temporal.record_outcome(profitable, pnl_percent);
        self.correlation.record_outcome(profitable, pnl_percent);
        self.sentiment.record_outcome(profitable, pnl_percent);
        self.risk_adapt.record_outcome(profitable, pnl_percent);
        self.meta_evolution.record_outcome(profitable, pnl_percent);
        self.pattern.record_outcome(profitable, pnl_percent);
        self.symbol_selection
            .record_trade(symbol, profitable, pnl_percent, cycle);
    }

    /// Queue donor genomes for the next evolve
    pub fn accept_donor(&mut self, donor: SeedGenomes) {
        self.pending_donor = Some(donor);
    }

    /// Evolve all nine seeds, using a pending donor as partner when present
    pub fn evolve_all<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let donor = self.pending_donor.take();
        let d = donor.as_ref();
        self.strategy_param.evolve(d.map(|g| &g.strategy_param), rng);
        self.market_regime.evolve(d.map(|g| &g.market_regime), rng);
        self.temporal.evolve(d.map(|g| &g.temporal), rng);
        self.correlation.evolve(d.map(|g| &g.correlation), rng);
        self.sentiment.evolve(d.map(|g| &g.sentiment), rng);
        self.risk_adapt.evolve(d.map(|g| &g.risk_adapt), rng);
        self.meta_evolution.evolve(d.map(|g| &g.meta_evolution), rng);
        self.pattern.evolve(d.map(|g| &g.pattern), rng);
        self.symbol_selection
            .evolve(d.map(|g| &g.symbol_selection), rng);
    }

    /// Re-apply every seed's invariants, used after loading persisted state
    pub fn repair(&mut self) {
        let g = self.genomes();
        self.strategy_param.restore(g.strategy_param);
        self.market_regime.restore(g.market_regime);
        self.temporal.restore(g.temporal);
        self.correlation.restore(g.correlation);
        self.sentiment.restore(g.sentiment);
        self.risk_adapt.restore(g.risk_adapt);
        self.meta_evolution.restore(g.meta_evolution);
        self.pattern.restore(g.pattern);
        self.symbol_selection.restore(g.symbol_selection);
    }

    pub fn statuses(&self) -> Vec<SeedStatus> {
        vec![
            self.strategy_param.status(),
            self.market_regime.status(),
            self.temporal.status(),
            self.correlation.status(),
            self.sentiment.status(),
            self.risk_adapt.status(),
            self.meta_evolution.status(),
            self.pattern.status(),
            self.symbol_selection.status(),
        ]
    }

    /// Mean fitness across the nine seeds
    pub fn mean_fitness(&self) -> f64 {
        let statuses = self.statuses();
        statuses.iter().map(|s| s.fitness).sum::<f64>() / statuses.len() as f64
    }

    /// Clock hook for the temporal seed
    pub fn temporal_weight(&mut self, now: DateTime<Utc>) -> f64 {
        self.temporal.activity_weight(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_fitness_needs_ten_samples() {
        let mut w = PerformanceWindow::default();
        for _ in 0..9 {
            w.record(true, 1.0);
        }
        assert!(w.fitness().is_none());
        w.record(true, 1.0);
        // zero variance, positive mean
        assert_eq!(w.fitness(), Some(70.0));
    }

    #[test]
    fn test_fitness_sharpe_like() {
        let mut w = PerformanceWindow::default();
        for i in 0..20 {
            w.record(i % 2 == 0, if i % 2 == 0 { 3.0 } else { -1.0 });
        }
        // mean 1, stdev 2 -> 50 + 15
        let f = w.fitness().unwrap();
        assert!((f - 65.0).abs() < 1e-9);
    }

    #[test]
    fn test_window_is_bounded_and_decays() {
        let mut w = PerformanceWindow::default();
        for _ in 0..150 {
            w.record(false, -1.0);
        }
        assert_eq!(w.samples(), PERFORMANCE_WINDOW);
        w.decay();
        assert_eq!(w.trades, 120.0);
        assert_eq!(w.samples(), RETAINED_SAMPLES);
    }

    #[test]
    fn test_seed_bank_evolve_consumes_donor() {
        let symbols = vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()];
        let mut rng = StdRng::seed_from_u64(7);
        let mut bank = SeedBank::new(GroupId::Alpha, &symbols);
        let donor = SeedBank::new(GroupId::Omega, &symbols).genomes();
        bank.accept_donor(donor);
        bank.evolve_all(&mut rng);

        assert!(bank.pending_donor.is_none());
        assert!(bank.statuses().iter().all(|s| s.generation == 2));
    }

    #[test]
    fn test_record_trade_reaches_all_seeds() {
        let symbols = vec!["BTCUSDT".to_string()];
        let mut bank = SeedBank::new(GroupId::Gamma, &symbols);
        for _ in 0..12 {
            bank.record_trade("BTCUSDT", true, 2.0, 1);
        }
        assert!(bank.statuses().iter().all(|s| (s.fitness - 70.0).abs() < 1e-9));
    }
}
