//! Evolution registry
//!
//! Periodic per-dimension snapshots of how each group's seeds and best bot
//! evolve: generation, fitness and a genome fingerprint per group. Each
//! dimension keeps a bounded series.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use crate::types::GroupId;

/// Dimension name used for the bot genomes themselves
pub const BOT_DIMENSION: &str = "bot";
pub const MAX_SNAPSHOTS_PER_DIMENSION: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionSnapshot {
    pub cycle: u64,
    pub group: GroupId,
    pub generation: u32,
    pub fitness: f64,
    pub fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionSummary {
    pub dimension: String,
    pub snapshots: usize,
    pub latest_cycle: u64,
    pub best_fitness: f64,
    pub avg_fitness: f64,
    /// Latest minus earliest mean fitness across the kept series
    pub fitness_trend: f64,
    pub max_generation: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvolutionRegistry {
    dimensions: BTreeMap<String, VecDeque<EvolutionSnapshot>>,
}

impl EvolutionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, dimension: &str, snapshot: EvolutionSnapshot) {
        let series = self.dimensions.entry(dimension.to_string()).or_default();
        series.push_back(snapshot);
        while series.len() > MAX_SNAPSHOTS_PER_DIMENSION {
            series.pop_front();
        }
    }

    pub fn dimension(&self, name: &str) -> Option<&VecDeque<EvolutionSnapshot>> {
        self.dimensions.get(name)
    }

    pub fn dimension_names(&self) -> Vec<&str> {
        self.dimensions.keys().map(|k| k.as_str()).collect()
    }

    pub fn summary(&self, name: &str) -> Option<DimensionSummary> {
        let series = self.dimensions.get(name)?;
        let first = series.front()?;
        let last = series.back()?;
        let n = series.len() as f64;

        let cycle_mean = |cycle: u64| {
            let at: Vec<f64> = series
                .iter()
                .filter(|s| s.cycle == cycle)
                .map(|s| s.fitness)
                .collect();
            at.iter().sum::<f64>() / at.len().max(1) as f64
        };

        Some(DimensionSummary {
            dimension: name.to_string(),
            snapshots: series.len(),
            latest_cycle: last.cycle,
            best_fitness: series.iter().map(|s| s.fitness).fold(f64::MIN, f64::max),
            avg_fitness: series.iter().map(|s| s.fitness).sum::<f64>() / n,
            fitness_trend: cycle_mean(last.cycle) - cycle_mean(first.cycle),
            max_generation: series.iter().map(|s| s.generation).max().unwrap_or(0),
        })
    }

    pub fn summaries(&self) -> Vec<DimensionSummary> {
        self.dimensions
            .keys()
            .filter_map(|name| self.summary(name))
            .collect()
    }

    pub fn reset(&mut self) {
        self.dimensions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(cycle: u64, group: GroupId, fitness: f64) -> EvolutionSnapshot {
        EvolutionSnapshot {
            cycle,
            group,
            generation: (cycle / 50) as u32 + 1,
            fitness,
            fingerprint: format!("{}-{}", group, cycle),
        }
    }

    #[test]
    fn test_series_is_bounded() {
        let mut registry = EvolutionRegistry::new();
        for i in 0..(MAX_SNAPSHOTS_PER_DIMENSION as u64 + 20) {
            registry.record("sentiment", snap(i, GroupId::Alpha, 50.0));
        }
        let series = registry.dimension("sentiment").unwrap();
        assert_eq!(series.len(), MAX_SNAPSHOTS_PER_DIMENSION);
        assert_eq!(series.front().unwrap().cycle, 20);
    }

    #[test]
    fn test_summary_trend() {
        let mut registry = EvolutionRegistry::new();
        registry.record(BOT_DIMENSION, snap(50, GroupId::Alpha, 40.0));
        registry.record(BOT_DIMENSION, snap(50, GroupId::Beta, 60.0));
        registry.record(BOT_DIMENSION, snap(100, GroupId::Alpha, 70.0));
        registry.record(BOT_DIMENSION, snap(100, GroupId::Beta, 70.0));

        let s = registry.summary(BOT_DIMENSION).unwrap();
        assert_eq!(s.snapshots, 4);
        assert_eq!(s.latest_cycle, 100);
        assert_eq!(s.best_fitness, 70.0);
        assert!((s.avg_fitness - 60.0).abs() < 1e-9);
        assert!((s.fitness_trend - 20.0).abs() < 1e-9);
        assert_eq!(s.max_generation, 3);
        assert!(registry.summary("missing").is_none());
    }
}
