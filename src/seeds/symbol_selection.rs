//! Symbol selection DNA - which symbols a group trades
//!
//! Keeps a weight (0..2) per symbol. Every rotation interval the symbols are
//! re-ranked by realized PnL and win rate: winners are boosted, losers shrunk,
//! and trading is restricted to the top-N. Symbols whose weight has sunk below
//! the low-weight threshold are occasionally reset to a moderate weight so
//! none starves forever.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use super::{chance, inherit, mutate_f64, mutate_u32, Seed, SeedCore};

pub const WEIGHT_RANGE: (f64, f64) = (0.0, 2.0);
/// Symbols weighted below this are never traded
pub const MIN_TRADABLE_WEIGHT: f64 = 0.2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolSelectionGenome {
    /// Cycles between re-rankings
    pub rotation_interval: u32,
    pub top_n: u32,
    pub win_boost: f64,
    pub loss_shrink: f64,
    pub reset_probability: f64,
    pub low_weight_threshold: f64,
    pub reset_weight: f64,
}

impl Default for SymbolSelectionGenome {
    fn default() -> Self {
        Self {
            rotation_interval: 100,
            top_n: 3,
            win_boost: 1.1,
            loss_shrink: 0.9,
            reset_probability: 0.2,
            low_weight_threshold: 0.3,
            reset_weight: 0.8,
        }
    }
}

/// Realized results for one symbol since the last rotation
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolStats {
    pub trades: u32,
    pub wins: u32,
    pub pnl_sum: f64,
    pub last_cycle: u64,
}

impl SymbolStats {
    pub fn win_rate(&self) -> f64 {
        if self.trades == 0 {
            0.0
        } else {
            self.wins as f64 / self.trades as f64
        }
    }

    /// Ranking score: mean PnL plus a win-rate term centred on 50%
    pub fn score(&self) -> f64 {
        if self.trades == 0 {
            return 0.0;
        }
        self.pnl_sum / self.trades as f64 + (self.win_rate() - 0.5) * 10.0
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolSelectionDna {
    genome: SymbolSelectionGenome,
    core: SeedCore,
    weights: BTreeMap<String, f64>,
    #[serde(default)]
    stats: BTreeMap<String, SymbolStats>,
    #[serde(default)]
    active: Vec<String>,
    #[serde(default)]
    last_rotation: u64,
}

impl SymbolSelectionDna {
    /// Every symbol starts at weight 1.0 and active until the first rotation
    pub fn new(symbols: &[String]) -> Self {
        Self {
            weights: symbols.iter().map(|s| (s.clone(), 1.0)).collect(),
            active: symbols.to_vec(),
            ..Default::default()
        }
    }

    pub fn weight(&self, symbol: &str) -> f64 {
        self.weights.get(symbol).copied().unwrap_or(1.0)
    }

    pub fn active_symbols(&self) -> &[String] {
        &self.active
    }

    pub fn stats(&self, symbol: &str) -> Option<&SymbolStats> {
        self.stats.get(symbol)
    }

    pub fn is_eligible(&self, symbol: &str) -> bool {
        let listed = self.active.is_empty() || self.active.iter().any(|s| s == symbol);
        listed && self.weight(symbol) >= MIN_TRADABLE_WEIGHT
    }

    pub fn record_trade(&mut self, symbol: &str, profitable: bool, pnl_percent: f64, cycle: u64) {
        self.core.record(profitable, pnl_percent);
        let stats = self.stats.entry(symbol.to_string()).or_default();
        stats.trades += 1;
        if profitable {
            stats.wins += 1;
        }
        stats.pnl_sum += pnl_percent;
        stats.last_cycle = cycle;
        self.weights.entry(symbol.to_string()).or_insert(1.0);
    }

    /// Re-rank once the rotation interval has elapsed. Returns true when a
    /// rotation happened.
    pub fn maybe_rotate<R: Rng + ?Sized>(&mut self, cycle: u64, rng: &mut R) -> bool {
        let interval = self.genome.rotation_interval.max(1) as u64;
        if cycle < self.last_rotation + interval {
            return false;
        }
        self.last_rotation = cycle;

        let g = &self.genome;
        for (symbol, weight) in self.weights.iter_mut() {
            if let Some(stats) = self.stats.get(symbol) {
                if stats.pnl_sum > 0.0 {
                    *weight *= g.win_boost;
                } else if stats.pnl_sum < 0.0 {
                    *weight *= g.loss_shrink;
                }
            }
            if *weight < g.low_weight_threshold && chance(rng, g.reset_probability) {
                *weight = g.reset_weight;
            }
            *weight = weight.clamp(WEIGHT_RANGE.0, WEIGHT_RANGE.1);
        }

        let mut ranked: Vec<(&String, f64, f64)> = self
            .weights
            .iter()
            .map(|(s, w)| {
                let score = self.stats.get(s).map(|st| st.score()).unwrap_or(0.0);
                (s, score, *w)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(b.2.total_cmp(&a.2)));
        self.active = ranked
            .into_iter()
            .take(g.top_n as usize)
            .map(|(s, _, _)| s.clone())
            .collect();
        self.stats.clear();

        debug!(cycle, active = ?self.active, "🔄 Symbol rotation");
        true
    }
}

impl Seed for SymbolSelectionDna {
    type Genome = SymbolSelectionGenome;

    const NAME: &'static str = "symbol_selection";

    fn genome(&self) -> &SymbolSelectionGenome {
        &self.genome
    }

    fn restore(&mut self, mut genome: SymbolSelectionGenome) {
        genome.rotation_interval = genome.rotation_interval.clamp(50, 300);
        genome.top_n = genome.top_n.clamp(2, 5);
        genome.win_boost = genome.win_boost.clamp(1.0, 1.3);
        genome.loss_shrink = genome.loss_shrink.clamp(0.7, 1.0);
        genome.reset_probability = genome.reset_probability.clamp(0.0, 1.0);
        genome.low_weight_threshold = genome.low_weight_threshold.clamp(0.1, 0.5);
        genome.reset_weight = genome.reset_weight.clamp(0.5, 1.0);
        self.genome = genome;
        for w in self.weights.values_mut() {
            *w = w.clamp(WEIGHT_RANGE.0, WEIGHT_RANGE.1);
        }
    }

    fn core(&self) -> &SeedCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SeedCore {
        &mut self.core
    }

    fn blend<R: Rng + ?Sized>(&mut self, partner: &SymbolSelectionGenome, rng: &mut R) {
        let g = &mut self.genome;
        inherit(rng, &mut g.rotation_interval, &partner.rotation_interval);
        inherit(rng, &mut g.top_n, &partner.top_n);
        inherit(rng, &mut g.win_boost, &partner.win_boost);
        inherit(rng, &mut g.loss_shrink, &partner.loss_shrink);
        inherit(rng, &mut g.reset_probability, &partner.reset_probability);
        inherit(rng, &mut g.low_weight_threshold, &partner.low_weight_threshold);
        inherit(rng, &mut g.reset_weight, &partner.reset_weight);
    }

    fn mutate<R: Rng + ?Sized>(&mut self, rate: f64, rng: &mut R) {
        let g = &mut self.genome;
        mutate_u32(rng, rate, &mut g.rotation_interval, 60.0, (50.0, 300.0));
        mutate_u32(rng, rate, &mut g.top_n, 2.0, (2.0, 5.0));
        mutate_f64(rng, rate, &mut g.win_boost, 0.1, (1.0, 1.3));
        mutate_f64(rng, rate, &mut g.loss_shrink, 0.1, (0.7, 1.0));
        mutate_f64(rng, rate, &mut g.reset_probability, 0.2, (0.0, 1.0));
        mutate_f64(rng, rate, &mut g.low_weight_threshold, 0.1, (0.1, 0.5));
        mutate_f64(rng, rate, &mut g.reset_weight, 0.15, (0.5, 1.0));
    }
}
