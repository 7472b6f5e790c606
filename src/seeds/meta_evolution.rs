//! Meta-evolution DNA - evolves the evolutionary process itself
//!
//! Holds per-category mutation rates, crossover blend, tournament pressure,
//! elitism, the intra-group evolution interval, mutation amplitude and the
//! diversity-bonus weight. It tracks whether children beat their parents and
//! raises its own mutation rate when they mostly don't.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use super::{inherit, mutate_f64, mutate_u32, Seed, SeedCore, FIELD_MUTATION_RATE};
use crate::genome::hamming_distance;
use crate::types::STRATEGY_COUNT;

const RATE_RANGE: (f64, f64) = (0.02, 0.6);
const AMPLITUDE_RANGE: (f64, f64) = (0.5, 2.0);
const SELF_RATE_RANGE: (f64, f64) = (0.05, 0.5);
const CHILD_HISTORY: usize = 20;
const CHILD_MIN_SAMPLES: usize = 5;

/// Gene families with their own mutation rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationCategory {
    StrategyMask,
    StrategyWeights,
    Consensus,
    Risk,
    Betting,
}

impl fmt::Display for MutationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationCategory::StrategyMask => write!(f, "strategy_mask"),
            MutationCategory::StrategyWeights => write!(f, "strategy_weights"),
            MutationCategory::Consensus => write!(f, "consensus"),
            MutationCategory::Risk => write!(f, "risk"),
            MutationCategory::Betting => write!(f, "betting"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRates {
    pub strategy_mask: f64,
    pub strategy_weights: f64,
    pub consensus: f64,
    pub risk: f64,
    pub betting: f64,
}

impl Default for MutationRates {
    fn default() -> Self {
        Self {
            strategy_mask: 0.1,
            strategy_weights: 0.2,
            consensus: 0.2,
            risk: 0.2,
            betting: 0.15,
        }
    }
}

impl MutationRates {
    pub fn get(&self, category: MutationCategory) -> f64 {
        match category {
            MutationCategory::StrategyMask => self.strategy_mask,
            MutationCategory::StrategyWeights => self.strategy_weights,
            MutationCategory::Consensus => self.consensus,
            MutationCategory::Risk => self.risk,
            MutationCategory::Betting => self.betting,
        }
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut f64> {
        [
            &mut self.strategy_mask,
            &mut self.strategy_weights,
            &mut self.consensus,
            &mut self.risk,
            &mut self.betting,
        ]
        .into_iter()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaEvolutionGenome {
    pub rates: MutationRates,
    /// Probability a crossover child takes parent 1's gene
    pub crossover_blend: f64,
    /// Tournament size, rounded
    pub selection_pressure: f64,
    /// Share of the group protected from culling
    pub elitism_ratio: f64,
    /// Cycles between intra-group evolutions
    pub evolution_interval: u32,
    pub mutation_amplitude: f64,
    pub diversity_weight: f64,
}

impl Default for MetaEvolutionGenome {
    fn default() -> Self {
        Self {
            rates: MutationRates::default(),
            crossover_blend: 0.5,
            selection_pressure: 3.0,
            elitism_ratio: 0.2,
            evolution_interval: 50,
            mutation_amplitude: 1.0,
            diversity_weight: 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaEvolutionDna {
    genome: MetaEvolutionGenome,
    core: SeedCore,
    /// Did each recent child beat its parents' average?
    #[serde(default)]
    child_outcomes: VecDeque<bool>,
    #[serde(default = "default_self_rate")]
    self_mutation_rate: f64,
    #[serde(default)]
    boosts_applied: u32,
}

fn default_self_rate() -> f64 {
    FIELD_MUTATION_RATE
}

impl Default for MetaEvolutionDna {
    fn default() -> Self {
        Self {
            genome: MetaEvolutionGenome::default(),
            core: SeedCore::default(),
            child_outcomes: VecDeque::new(),
            self_mutation_rate: FIELD_MUTATION_RATE,
            boosts_applied: 0,
        }
    }
}

impl MetaEvolutionDna {
    pub fn mutation_rate_for(&self, category: MutationCategory) -> f64 {
        self.genome.rates.get(category)
    }

    pub fn amplitude(&self) -> f64 {
        self.genome.mutation_amplitude
    }

    pub fn crossover_blend(&self) -> f64 {
        self.genome.crossover_blend
    }

    pub fn tournament_size(&self, population: usize) -> usize {
        (self.genome.selection_pressure.round() as usize).clamp(2, population.max(2))
    }

    /// Bots protected from culling; always leaves at least one candidate
    pub fn elite_count(&self, population: usize) -> usize {
        let elites = (self.genome.elitism_ratio * population as f64).ceil() as usize;
        elites.min(population.saturating_sub(1))
    }

    pub fn evolution_interval(&self) -> u64 {
        self.genome.evolution_interval.max(1) as u64
    }

    /// Override the interval, kept inside the range evolution may explore
    pub fn set_evolution_interval(&mut self, cycles: u64) {
        self.genome.evolution_interval = cycles.clamp(20, 150) as u32;
    }

    pub fn self_mutation_rate(&self) -> f64 {
        self.self_mutation_rate
    }

    /// Success rate of recent children, if enough were observed
    pub fn child_success_rate(&self) -> Option<f64> {
        if self.child_outcomes.len() < CHILD_MIN_SAMPLES {
            return None;
        }
        let wins = self.child_outcomes.iter().filter(|w| **w).count();
        Some(wins as f64 / self.child_outcomes.len() as f64)
    }

    pub fn record_child_performance(&mut self, child_fitness: f64, parent_avg: f64) {
        self.child_outcomes.push_back(child_fitness > parent_avg);
        while self.child_outcomes.len() > CHILD_HISTORY {
            self.child_outcomes.pop_front();
        }
        if let Some(success) = self.child_success_rate() {
            if success < 0.3 {
                self.self_mutation_rate =
                    (self.self_mutation_rate * 1.2).min(SELF_RATE_RANGE.1);
            } else if success > 0.6 {
                self.self_mutation_rate =
                    (self.self_mutation_rate * 0.9).max(SELF_RATE_RANGE.0);
            }
        }
    }

    /// Scale every mutation rate and the amplitude, clamped to range
    pub fn boost_mutation_rates(&mut self, factor: f64) {
        for rate in self.genome.rates.iter_mut() {
            *rate = (*rate * factor).clamp(RATE_RANGE.0, RATE_RANGE.1);
        }
        self.genome.mutation_amplitude =
            (self.genome.mutation_amplitude * factor).clamp(AMPLITUDE_RANGE.0, AMPLITUDE_RANGE.1);
        self.boosts_applied += 1;
    }

    /// Mean Hamming distance to the rest of the population, scaled by the
    /// diversity weight
    pub fn diversity_bonus(&self, mask: &[bool], others: &[&[bool]]) -> f64 {
        if others.is_empty() {
            return 0.0;
        }
        let total: usize = others.iter().map(|o| hamming_distance(mask, o)).sum();
        let mean = total as f64 / others.len() as f64;
        mean / STRATEGY_COUNT as f64 * self.genome.diversity_weight
    }
}

impl Seed for MetaEvolutionDna {
    type Genome = MetaEvolutionGenome;

    const NAME: &'static str = "meta_evolution";

    fn genome(&self) -> &MetaEvolutionGenome {
        &self.genome
    }

    fn restore(&mut self, mut genome: MetaEvolutionGenome) {
        for rate in genome.rates.iter_mut() {
            *rate = rate.clamp(RATE_RANGE.0, RATE_RANGE.1);
        }
        genome.crossover_blend = genome.crossover_blend.clamp(0.3, 0.7);
        genome.selection_pressure = genome.selection_pressure.clamp(2.0, 5.0);
        genome.elitism_ratio = genome.elitism_ratio.clamp(0.0, 0.4);
        genome.evolution_interval = genome.evolution_interval.clamp(20, 150);
        genome.mutation_amplitude = genome
            .mutation_amplitude
            .clamp(AMPLITUDE_RANGE.0, AMPLITUDE_RANGE.1);
        genome.diversity_weight = genome.diversity_weight.clamp(0.0, 10.0);
        self.genome = genome;
    }

    fn core(&self) -> &SeedCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SeedCore {
        &mut self.core
    }

    fn mutation_rate(&self) -> f64 {
        self.self_mutation_rate
    }

    fn blend<R: Rng + ?Sized>(&mut self, partner: &MetaEvolutionGenome, rng: &mut R) {
        let g = &mut self.genome;
        inherit(rng, &mut g.rates.strategy_mask, &partner.rates.strategy_mask);
        inherit(rng, &mut g.rates.strategy_weights, &partner.rates.strategy_weights);
        inherit(rng, &mut g.rates.consensus, &partner.rates.consensus);
        inherit(rng, &mut g.rates.risk, &partner.rates.risk);
        inherit(rng, &mut g.rates.betting, &partner.rates.betting);
        inherit(rng, &mut g.crossover_blend, &partner.crossover_blend);
        inherit(rng, &mut g.selection_pressure, &partner.selection_pressure);
        inherit(rng, &mut g.elitism_ratio, &partner.elitism_ratio);
        inherit(rng, &mut g.evolution_interval, &partner.evolution_interval);
        inherit(rng, &mut g.mutation_amplitude, &partner.mutation_amplitude);
        inherit(rng, &mut g.diversity_weight, &partner.diversity_weight);
    }

    fn mutate<R: Rng + ?Sized>(&mut self, rate: f64, rng: &mut R) {
        let g = &mut self.genome;
        for r in g.rates.iter_mut() {
            mutate_f64(rng, rate, r, 0.1, RATE_RANGE);
        }
        mutate_f64(rng, rate, &mut g.crossover_blend, 0.1, (0.3, 0.7));
        mutate_f64(rng, rate, &mut g.selection_pressure, 1.0, (2.0, 5.0));
        mutate_f64(rng, rate, &mut g.elitism_ratio, 0.1, (0.0, 0.4));
        mutate_u32(rng, rate, &mut g.evolution_interval, 30.0, (20.0, 150.0));
        mutate_f64(rng, rate, &mut g.mutation_amplitude, 0.3, AMPLITUDE_RANGE);
        mutate_f64(rng, rate, &mut g.diversity_weight, 2.0, (0.0, 10.0));
    }
}
