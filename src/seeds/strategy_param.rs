//! Strategy parameter DNA - reweights the 30-slot signal vector
//!
//! Category weights scale raw strength, higher-timeframe agreement is boosted
//! and opposition penalized, strength is capped, and anything left below the
//! minimum strength is neutralized in place so slot order never changes.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{inherit, mutate_f64, Seed, SeedCore};
use crate::types::{Direction, GroupId, HigherTimeframe, PoolSignal};

/// HTF bias only counts above this strength
const HTF_MIN_STRENGTH: f64 = 30.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyParamGenome {
    /// Strength multipliers indexed by category [trend, momentum, volatility]
    pub category_weights: [f64; 3],
    /// Signals weaker than this after weighting are neutralized
    pub min_strength: f64,
    pub htf_agree_boost: f64,
    pub htf_oppose_penalty: f64,
    pub strength_cap: f64,
}

impl Default for StrategyParamGenome {
    fn default() -> Self {
        Self {
            category_weights: [1.0, 1.0, 1.0],
            min_strength: 10.0,
            htf_agree_boost: 1.1,
            htf_oppose_penalty: 0.9,
            strength_cap: 100.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyParamDna {
    genome: StrategyParamGenome,
    core: SeedCore,
}

impl StrategyParamDna {
    pub fn for_group(group: GroupId) -> Self {
        let mut genome = StrategyParamGenome::default();
        match group {
            GroupId::Alpha => genome.category_weights[0] = 1.3,
            GroupId::Beta => genome.min_strength = 20.0,
            GroupId::Delta => genome.category_weights[1] = 1.4,
            GroupId::Omega => genome.category_weights[2] = 1.4,
            GroupId::Gamma => {}
        }
        Self {
            genome,
            core: SeedCore::default(),
        }
    }

    /// Seed-adjusted copy of the signal vector
    pub fn process(&self, signals: &[PoolSignal], htf: &HigherTimeframe) -> Vec<PoolSignal> {
        let g = &self.genome;
        signals
            .iter()
            .map(|signal| {
                let mut out = signal.clone();
                if signal.direction == Direction::Neutral {
                    return out;
                }

                let mut strength = signal.strength * g.category_weights[signal.category.index()];
                if htf.bias != Direction::Neutral && htf.strength > HTF_MIN_STRENGTH {
                    if htf.bias == signal.direction {
                        strength *= g.htf_agree_boost;
                    } else {
                        strength *= g.htf_oppose_penalty;
                    }
                }
                strength = strength.min(g.strength_cap);

                if strength < g.min_strength {
                    out.direction = Direction::Neutral;
                    out.strength = 0.0;
                } else {
                    out.strength = strength;
                }
                out
            })
            .collect()
    }
}

impl Seed for StrategyParamDna {
    type Genome = StrategyParamGenome;

    const NAME: &'static str = "strategy_param";

    fn genome(&self) -> &StrategyParamGenome {
        &self.genome
    }

    fn restore(&mut self, mut genome: StrategyParamGenome) {
        for w in genome.category_weights.iter_mut() {
            *w = w.clamp(0.3, 2.0);
        }
        genome.min_strength = genome.min_strength.clamp(0.0, 40.0);
        genome.htf_agree_boost = genome.htf_agree_boost.clamp(1.0, 1.5);
        genome.htf_oppose_penalty = genome.htf_oppose_penalty.clamp(0.5, 1.0);
        genome.strength_cap = genome.strength_cap.clamp(60.0, 100.0);
        self.genome = genome;
    }

    fn core(&self) -> &SeedCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SeedCore {
        &mut self.core
    }

    fn blend<R: Rng + ?Sized>(&mut self, partner: &StrategyParamGenome, rng: &mut R) {
        let g = &mut self.genome;
        for i in 0..3 {
            inherit(rng, &mut g.category_weights[i], &partner.category_weights[i]);
        }
        inherit(rng, &mut g.min_strength, &partner.min_strength);
        inherit(rng, &mut g.htf_agree_boost, &partner.htf_agree_boost);
        inherit(rng, &mut g.htf_oppose_penalty, &partner.htf_oppose_penalty);
        inherit(rng, &mut g.strength_cap, &partner.strength_cap);
    }

    fn mutate<R: Rng + ?Sized>(&mut self, rate: f64, rng: &mut R) {
        let g = &mut self.genome;
        for w in g.category_weights.iter_mut() {
            mutate_f64(rng, rate, w, 0.4, (0.3, 2.0));
        }
        mutate_f64(rng, rate, &mut g.min_strength, 10.0, (0.0, 40.0));
        mutate_f64(rng, rate, &mut g.htf_agree_boost, 0.1, (1.0, 1.5));
        mutate_f64(rng, rate, &mut g.htf_oppose_penalty, 0.1, (0.5, 1.0));
        mutate_f64(rng, rate, &mut g.strength_cap, 10.0, (60.0, 100.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StrategyCategory;

    fn signal(slot: usize, direction: Direction, strength: f64) -> PoolSignal {
        PoolSignal {
            strategy_id: slot,
            strategy_name: format!("s{}", slot),
            category: StrategyCategory::for_slot(slot),
            direction,
            strength,
            symbol: "ETHUSDT".to_string(),
            timestamp: 0,
        }
    }

    #[test]
    fn test_process_keeps_slot_order_and_length() {
        let dna = StrategyParamDna::default();
        let signals: Vec<_> = (0..30).map(|i| signal(i, Direction::Long, 50.0)).collect();
        let out = dna.process(&signals, &HigherTimeframe::default());
        assert_eq!(out.len(), 30);
        assert!(out.iter().enumerate().all(|(i, s)| s.strategy_id == i));
    }

    #[test]
    fn test_weak_signals_are_neutralized() {
        let dna = StrategyParamDna::default();
        let out = dna.process(&[signal(0, Direction::Short, 5.0)], &HigherTimeframe::default());
        assert_eq!(out[0].direction, Direction::Neutral);
        assert_eq!(out[0].strength, 0.0);
    }

    #[test]
    fn test_htf_agreement_boost_and_cap() {
        let dna = StrategyParamDna::default();
        let htf = HigherTimeframe {
            bias: Direction::Long,
            strength: 60.0,
            ..Default::default()
        };
        let out = dna.process(
            &[signal(0, Direction::Long, 50.0), signal(1, Direction::Short, 50.0), signal(2, Direction::Long, 95.0)],
            &htf,
        );
        assert!((out[0].strength - 55.0).abs() < 1e-9);
        assert!((out[1].strength - 45.0).abs() < 1e-9);
        assert_eq!(out[2].strength, 100.0);
    }

    #[test]
    fn test_group_personality_weights() {
        let delta = StrategyParamDna::for_group(GroupId::Delta);
        let out = delta.process(&[signal(12, Direction::Long, 50.0)], &HigherTimeframe::default());
        assert!((out[0].strength - 70.0).abs() < 1e-9);
    }
}
