//! Correlation DNA - cross-symbol agreement
//!
//! Tracks the recent dominant direction of every symbol. A trade is boosted
//! when BTC (looked up `btc_lag` cycles back) and the other symbols agree with
//! it, and damped when they disagree. Cross-symbol agreement weaker than the
//! divergence threshold is treated as noise.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use super::{inherit, mutate_f64, mutate_u32, Seed, SeedCore};
use crate::types::{Direction, BTC_SYMBOL};

const HISTORY_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationGenome {
    /// How many cycles back to read BTC's direction
    pub btc_lag: u32,
    pub btc_weight: f64,
    pub agreement_weight: f64,
    pub divergence_threshold: f64,
    pub max_boost: f64,
    pub max_penalty: f64,
}

impl Default for CorrelationGenome {
    fn default() -> Self {
        Self {
            btc_lag: 1,
            btc_weight: 0.6,
            agreement_weight: 0.4,
            divergence_threshold: 0.4,
            max_boost: 1.25,
            max_penalty: 0.75,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorrelationDna {
    genome: CorrelationGenome,
    core: SeedCore,
    #[serde(default)]
    history: HashMap<String, VecDeque<Direction>>,
}

impl CorrelationDna {
    /// Record a symbol's dominant direction for this cycle
    pub fn update(&mut self, symbol: &str, direction: Direction) {
        let entry = self.history.entry(symbol.to_string()).or_default();
        entry.push_back(direction);
        while entry.len() > HISTORY_LEN {
            entry.pop_front();
        }
    }

    /// Trade modifier in [max_penalty, max_boost]
    pub fn modifier(&self, symbol: &str, direction: Direction) -> f64 {
        let side = direction.sign();
        if side == 0.0 {
            return 1.0;
        }
        let g = &self.genome;

        let btc_term = if symbol == BTC_SYMBOL {
            None
        } else {
            self.history.get(BTC_SYMBOL).and_then(|h| {
                let lag = g.btc_lag as usize;
                (h.len() > lag).then(|| h[h.len() - 1 - lag].sign() * side)
            })
        };

        let others: Vec<f64> = self
            .history
            .iter()
            .filter(|(s, _)| s.as_str() != symbol)
            .filter_map(|(_, h)| h.back())
            .filter(|d| **d != Direction::Neutral)
            .map(|d| d.sign() * side)
            .collect();
        let mut cross = if others.is_empty() {
            0.0
        } else {
            others.iter().sum::<f64>() / others.len() as f64
        };
        if cross.abs() < g.divergence_threshold {
            cross = 0.0;
        }

        let (numerator, weight) = match btc_term {
            Some(b) => (
                g.btc_weight * b + g.agreement_weight * cross,
                g.btc_weight + g.agreement_weight,
            ),
            None => (g.agreement_weight * cross, g.agreement_weight),
        };
        if weight <= 0.0 {
            return 1.0;
        }
        let score = (numerator / weight).clamp(-1.0, 1.0);
        if score >= 0.0 {
            1.0 + score * (g.max_boost - 1.0)
        } else {
            1.0 + score * (1.0 - g.max_penalty)
        }
    }
}

impl Seed for CorrelationDna {
    type Genome = CorrelationGenome;

    const NAME: &'static str = "correlation";

    fn genome(&self) -> &CorrelationGenome {
        &self.genome
    }

    fn restore(&mut self, mut genome: CorrelationGenome) {
        genome.btc_lag = genome.btc_lag.min(5);
        genome.btc_weight = genome.btc_weight.clamp(0.0, 1.0);
        genome.agreement_weight = genome.agreement_weight.clamp(0.0, 1.0);
        genome.divergence_threshold = genome.divergence_threshold.clamp(0.2, 0.8);
        genome.max_boost = genome.max_boost.clamp(1.0, 1.5);
        genome.max_penalty = genome.max_penalty.clamp(0.5, 1.0);
        self.genome = genome;
    }

    fn core(&self) -> &SeedCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SeedCore {
        &mut self.core
    }

    fn blend<R: Rng + ?Sized>(&mut self, partner: &CorrelationGenome, rng: &mut R) {
        let g = &mut self.genome;
        inherit(rng, &mut g.btc_lag, &partner.btc_lag);
        inherit(rng, &mut g.btc_weight, &partner.btc_weight);
        inherit(rng, &mut g.agreement_weight, &partner.agreement_weight);
        inherit(rng, &mut g.divergence_threshold, &partner.divergence_threshold);
        inherit(rng, &mut g.max_boost, &partner.max_boost);
        inherit(rng, &mut g.max_penalty, &partner.max_penalty);
    }

    fn mutate<R: Rng + ?Sized>(&mut self, rate: f64, rng: &mut R) {
        let g = &mut self.genome;
        mutate_u32(rng, rate, &mut g.btc_lag, 2.0, (0.0, 5.0));
        mutate_f64(rng, rate, &mut g.btc_weight, 0.2, (0.0, 1.0));
        mutate_f64(rng, rate, &mut g.agreement_weight, 0.2, (0.0, 1.0));
        mutate_f64(rng, rate, &mut g.divergence_threshold, 0.1, (0.2, 0.8));
        mutate_f64(rng, rate, &mut g.max_boost, 0.1, (1.0, 1.5));
        mutate_f64(rng, rate, &mut g.max_penalty, 0.1, (0.5, 1.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_history_is_neutral() {
        let dna = CorrelationDna::default();
        assert_eq!(dna.modifier("ETHUSDT", Direction::Long), 1.0);
    }

    #[test]
    fn test_full_agreement_hits_max_boost() {
        let mut dna = CorrelationDna::default();
        for _ in 0..3 {
            dna.update("BTCUSDT", Direction::Long);
            dna.update("SOLUSDT", Direction::Long);
            dna.update("XRPUSDT", Direction::Long);
        }
        let m = dna.modifier("ETHUSDT", Direction::Long);
        assert!((m - 1.25).abs() < 1e-9);
    }

    #[test]
    fn test_full_disagreement_hits_max_penalty() {
        let mut dna = CorrelationDna::default();
        for _ in 0..3 {
            dna.update("BTCUSDT", Direction::Short);
            dna.update("SOLUSDT", Direction::Short);
        }
        let m = dna.modifier("ETHUSDT", Direction::Long);
        assert!((m - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_weak_cross_agreement_is_ignored_for_btc() {
        let mut dna = CorrelationDna::default();
        dna.update("ETHUSDT", Direction::Long);
        dna.update("SOLUSDT", Direction::Short);
        // cross agreement is 0 -> below the divergence threshold
        assert_eq!(dna.modifier("BTCUSDT", Direction::Long), 1.0);
    }
}
