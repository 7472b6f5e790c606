//! Adaptive mutation engine
//!
//! Picks a mutation intensity per evolution event from the group's recent
//! death history and fitness stagnation, so a struggling group explores harder
//! while a healthy one mostly fine-tunes.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use crate::types::GroupId;

/// Cycles without a >1% best-fitness gain that count as stagnation
pub const STAGNATION_THRESHOLD: u64 = 100;
/// Consecutive deaths that force a radical mutation
pub const DEATH_BOOST_THRESHOLD: u32 = 3;
/// Deaths further apart than this break the consecutive streak
pub const CONSECUTIVE_DEATH_GAP: u64 = 50;
const IMPROVEMENT_THRESHOLD: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MutationType {
    Subtle,
    Normal,
    Bold,
    Radical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MutationDirection {
    Conservative,
    Balanced,
    Exploratory,
}

/// Amplitude/rate scaling for one intensity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MutationProfile {
    pub kind: MutationType,
    pub direction: MutationDirection,
    pub amplitude: f64,
    pub rate_multiplier: f64,
    pub description: &'static str,
}

impl MutationType {
    pub fn profile(&self) -> MutationProfile {
        match self {
            MutationType::Subtle => MutationProfile {
                kind: *self,
                direction: MutationDirection::Conservative,
                amplitude: 0.3,
                rate_multiplier: 0.5,
                description: "Fine-tuning of existing traits",
            },
            MutationType::Normal => MutationProfile {
                kind: *self,
                direction: MutationDirection::Balanced,
                amplitude: 1.0,
                rate_multiplier: 1.0,
                description: "Balanced exploration and exploitation",
            },
            MutationType::Bold => MutationProfile {
                kind: *self,
                direction: MutationDirection::Balanced,
                amplitude: 2.0,
                rate_multiplier: 1.5,
                description: "Moderate jumps in trait space",
            },
            MutationType::Radical => MutationProfile {
                kind: *self,
                direction: MutationDirection::Exploratory,
                amplitude: 4.0,
                rate_multiplier: 2.5,
                description: "Large jumps away from local optima",
            },
        }
    }
}

impl fmt::Display for MutationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationType::Subtle => write!(f, "SUBTLE"),
            MutationType::Normal => write!(f, "NORMAL"),
            MutationType::Bold => write!(f, "BOLD"),
            MutationType::Radical => write!(f, "RADICAL"),
        }
    }
}

/// Death and stagnation counters, persisted with the group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeathTriggerState {
    pub total_deaths: u64,
    pub consecutive_deaths: u32,
    pub deaths_since_last_evolution: u32,
    pub last_death_cycle: u64,
    pub last_evolution_cycle: u64,
    pub stagnation_cycles: u64,
    /// Baseline for the stagnation check
    pub last_best_fitness: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdaptiveMutationEngine {
    #[serde(default)]
    group: Option<GroupId>,
    #[serde(default)]
    state: DeathTriggerState,
}

impl AdaptiveMutationEngine {
    pub fn new(group: GroupId) -> Self {
        Self {
            group: Some(group),
            state: DeathTriggerState::default(),
        }
    }

    fn group_label(&self) -> String {
        self.group.map(|g| g.to_string()).unwrap_or_default()
    }

    /// Pick the intensity for the next evolution event
    pub fn select_mutation_type<R: Rng + ?Sized>(
        &mut self,
        cycle: u64,
        best_fitness: f64,
        rng: &mut R,
    ) -> MutationType {
        self.update_stagnation(best_fitness);
        let group = self.group_label();
        let s = &mut self.state;

        if s.consecutive_deaths >= DEATH_BOOST_THRESHOLD {
            info!(
                group = %group,
                cycle,
                consecutive_deaths = s.consecutive_deaths,
                "🔴 Death boost: consecutive deaths -> RADICAL mutation"
            );
            return MutationType::Radical;
        }

        if s.deaths_since_last_evolution >= 2 {
            info!(
                group = %group,
                cycle,
                deaths = s.deaths_since_last_evolution,
                "🟠 Recent deaths -> BOLD mutation"
            );
            return MutationType::Bold;
        }

        if s.stagnation_cycles >= STAGNATION_THRESHOLD {
            info!(
                group = %group,
                cycle,
                stagnation_cycles = s.stagnation_cycles,
                "⚠️ Stagnation -> RADICAL mutation"
            );
            // partial reset so the radical jump has time to pay off
            s.stagnation_cycles = STAGNATION_THRESHOLD * 3 / 10;
            return MutationType::Radical;
        }

        if s.stagnation_cycles >= STAGNATION_THRESHOLD * 6 / 10 {
            return MutationType::Bold;
        }

        let roll: f64 = rng.gen();
        if roll < 0.10 {
            MutationType::Subtle
        } else if roll < 0.70 {
            MutationType::Normal
        } else if roll < 0.95 {
            MutationType::Bold
        } else {
            MutationType::Radical
        }
    }

    pub fn record_death(&mut self, cycle: u64) {
        let s = &mut self.state;
        s.total_deaths += 1;
        s.deaths_since_last_evolution += 1;

        let gap = cycle.saturating_sub(s.last_death_cycle);
        if s.last_death_cycle == 0 {
            s.consecutive_deaths = 1;
        } else if gap < CONSECUTIVE_DEATH_GAP {
            s.consecutive_deaths += 1;
        } else {
            s.consecutive_deaths = 1;
        }
        s.last_death_cycle = cycle;

        info!(
            group = %self.group_label(),
            total = self.state.total_deaths,
            consecutive = self.state.consecutive_deaths,
            gap,
            since_evolution = self.state.deaths_since_last_evolution,
            "💀 Bot death recorded"
        );
    }

    /// An evolution is a fresh start for the death counters
    pub fn record_evolution(&mut self, cycle: u64) {
        self.state.last_evolution_cycle = cycle;
        self.state.deaths_since_last_evolution = 0;
        self.state.consecutive_deaths = 0;
    }

    fn update_stagnation(&mut self, best_fitness: f64) {
        let s = &mut self.state;
        let improvement = if s.last_best_fitness > 0.0 {
            (best_fitness - s.last_best_fitness) / s.last_best_fitness
        } else if best_fitness > 0.0 {
            1.0
        } else {
            0.0
        };
        if improvement > IMPROVEMENT_THRESHOLD {
            s.stagnation_cycles = 0;
            s.last_best_fitness = best_fitness;
        } else {
            s.stagnation_cycles += 1;
        }
    }

    pub fn state(&self) -> &DeathTriggerState {
        &self.state
    }

    pub fn restore(&mut self, state: DeathTriggerState) {
        self.state = state;
    }

    pub fn reset(&mut self) {
        self.state = DeathTriggerState::default();
    }
}

/// Move `value` within [min, max] according to the mutation direction
pub fn apply_directional_bias<R: Rng + ?Sized>(
    value: f64,
    min: f64,
    max: f64,
    direction: MutationDirection,
    amplitude: f64,
    rng: &mut R,
) -> f64 {
    let range = max - min;
    let next = match direction {
        MutationDirection::Conservative => value + (rng.gen::<f64>() - 0.5) * range * 0.05 * amplitude,
        MutationDirection::Balanced => value + (rng.gen::<f64>() - 0.5) * range * 0.2 * amplitude,
        MutationDirection::Exploratory => {
            if rng.gen::<f64>() < 0.3 {
                min + rng.gen::<f64>() * range
            } else {
                value + (rng.gen::<f64>() - 0.5) * range * 0.5 * amplitude
            }
        }
    };
    clamp_range(next, min, max)
}

/// Clamp that never panics on an inverted or NaN range
pub(crate) fn clamp_range(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        return min;
    }
    value.max(min).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_death_sequence_streaks() {
        let mut engine = AdaptiveMutationEngine::new(GroupId::Alpha);
        engine.record_death(10);
        assert_eq!(engine.state().consecutive_deaths, 1);
        engine.record_death(100);
        assert_eq!(engine.state().consecutive_deaths, 1);
        engine.record_death(105);
        assert_eq!(engine.state().consecutive_deaths, 2);
        assert_eq!(engine.state().total_deaths, 3);
        assert_eq!(engine.state().deaths_since_last_evolution, 3);
    }

    #[test]
    fn test_radical_on_death_streak() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..50 {
            let mut engine = AdaptiveMutationEngine::new(GroupId::Beta);
            engine.record_death(10);
            engine.record_death(20);
            engine.record_death(30);
            assert_eq!(
                engine.select_mutation_type(31, 40.0, &mut rng),
                MutationType::Radical
            );
        }
    }

    #[test]
    fn test_bold_or_better_after_recent_deaths() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut engine = AdaptiveMutationEngine::new(GroupId::Gamma);
        engine.record_death(10);
        engine.record_death(200);
        let t = engine.select_mutation_type(201, 40.0, &mut rng);
        assert!(matches!(t, MutationType::Bold | MutationType::Radical));
    }

    #[test]
    fn test_record_evolution_clears_death_counters() {
        let mut engine = AdaptiveMutationEngine::new(GroupId::Delta);
        engine.record_death(5);
        engine.record_death(6);
        engine.record_evolution(50);
        assert_eq!(engine.state().consecutive_deaths, 0);
        assert_eq!(engine.state().deaths_since_last_evolution, 0);
        assert_eq!(engine.state().total_deaths, 2);
        assert_eq!(engine.state().last_evolution_cycle, 50);
    }

    #[test]
    fn test_stagnation_escalates_then_partially_resets() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut engine = AdaptiveMutationEngine::new(GroupId::Omega);
        // first call sets the baseline
        engine.select_mutation_type(1, 50.0, &mut rng);
        for _ in 0..59 {
            engine.select_mutation_type(2, 50.0, &mut rng);
        }
        assert_eq!(engine.state().stagnation_cycles, 59);
        assert_eq!(
            engine.select_mutation_type(3, 50.0, &mut rng),
            MutationType::Bold
        );
        for _ in 0..39 {
            engine.select_mutation_type(4, 50.0, &mut rng);
        }
        assert_eq!(
            engine.select_mutation_type(5, 50.0, &mut rng),
            MutationType::Radical
        );
        assert_eq!(engine.state().stagnation_cycles, 30);

        // a real improvement clears the counter
        engine.select_mutation_type(6, 60.0, &mut rng);
        assert_eq!(engine.state().stagnation_cycles, 0);
        assert_eq!(engine.state().last_best_fitness, 60.0);
    }

    #[test]
    fn test_state_round_trip() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut engine = AdaptiveMutationEngine::new(GroupId::Alpha);
        engine.record_death(12);
        engine.record_death(30);
        engine.select_mutation_type(31, 47.5, &mut rng);

        let json = serde_json::to_string(engine.state()).unwrap();
        let mut restored = AdaptiveMutationEngine::new(GroupId::Alpha);
        restored.restore(serde_json::from_str(&json).unwrap());
        assert_eq!(restored.state(), engine.state());
        assert_eq!(restored.state().last_best_fitness, 47.5);

        restored.reset();
        assert_eq!(restored.state(), &DeathTriggerState::default());
    }

    #[test]
    fn test_directional_bias_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(5);
        let directions = [
            MutationDirection::Conservative,
            MutationDirection::Balanced,
            MutationDirection::Exploratory,
        ];
        for dir in directions {
            for amplitude in [0.3, 1.0, 4.0, 100.0] {
                for value in [1.0, 5.0, 3.0, -10.0, 50.0] {
                    let v = apply_directional_bias(value, 1.0, 5.0, dir, amplitude, &mut rng);
                    assert!((1.0..=5.0).contains(&v), "{:?} {} -> {}", dir, value, v);
                }
                // degenerate range
                let v = apply_directional_bias(2.0, 2.0, 2.0, dir, amplitude, &mut rng);
                assert_eq!(v, 2.0);
            }
        }
    }

    #[test]
    fn test_profiles() {
        let radical = MutationType::Radical.profile();
        assert_eq!(radical.amplitude, 4.0);
        assert_eq!(radical.rate_multiplier, 2.5);
        assert_eq!(radical.direction, MutationDirection::Exploratory);
        assert_eq!(
            MutationType::Subtle.profile().direction,
            MutationDirection::Conservative
        );
    }
}
