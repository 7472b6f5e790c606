//! DNA vector memory
//!
//! Records every genome that leaves the population (bankruptcy, cull,
//! migration) or reaches the goal as a feature vector plus its results.
//! Replacement children are nudged toward the neighbourhood of genomes that
//! did well and away from the leverage of those that died.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::fitness::sharpe_ratio;
use crate::bot::BotState;
use crate::genome::Genome;
use crate::types::{GroupId, STRATEGY_COUNT};

pub const MAX_EXPERIENCES: usize = 500;
/// Pruning kicks in above this many experiences
const PRUNE_AT: usize = MAX_EXPERIENCES * 6 / 5;
const MIN_GUIDANCE_EXPERIENCES: usize = 10;
const NEIGHBOURS: usize = 10;
const GOOD_FITNESS: f64 = 30.0;
const BAD_FITNESS: f64 = 10.0;
const BLEND_TOWARD_GOOD: f64 = 0.3;

/// One recorded genome outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub genome_hash: String,
    pub strategy_mask: Vec<bool>,
    pub strategy_weights: Vec<f64>,
    /// [minAgreeing, maxOpposing, minWeightedStrength]
    pub consensus_params: [f64; 3],
    /// [atrTP, atrSL, trailingATR, leverage]
    pub risk_params: [f64; 4],
    /// [base%, winMult, lossMult]
    pub betting_params: [f64; 3],
    pub fitness: f64,
    pub bankroll_multiplier: f64,
    pub win_rate: f64,
    pub sharpe_ratio: f64,
    pub trades: u32,
    pub survived: bool,
    /// 0, 2, 3, 5 or 10
    pub reached_milestone: u32,
    pub group: GroupId,
    pub timestamp: DateTime<Utc>,
}

impl Experience {
    fn similarity_vector(&self) -> Vec<f64> {
        self.risk_params
            .iter()
            .chain(self.consensus_params.iter())
            .copied()
            .collect()
    }

    fn leverage(&self) -> f64 {
        self.risk_params[3]
    }
}

/// Aggregate over genomes sharing an active-count/leverage bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopPattern {
    pub pattern: String,
    pub avg_fitness: f64,
    pub count: usize,
    pub avg_multiplier: f64,
    pub survival_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total: usize,
    pub avg_fitness: f64,
    pub best_multiplier: f64,
    pub survival_rate: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DnaVectorMemory {
    experiences: Vec<Experience>,
}

impl DnaVectorMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_experiences(experiences: Vec<Experience>) -> Self {
        Self { experiences }
    }

    pub fn experiences(&self) -> &[Experience] {
        &self.experiences
    }

    pub fn len(&self) -> usize {
        self.experiences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experiences.is_empty()
    }

    pub fn reset(&mut self) {
        self.experiences.clear();
    }

    pub fn record_experience(
        &mut self,
        bot: &BotState,
        fitness: f64,
        survived: bool,
        milestone: u32,
        group: GroupId,
    ) {
        let genome = &bot.genome;
        let pnl: Vec<f64> = bot.pnl_history.iter().copied().collect();
        let experience = Experience {
            genome_hash: genome_hash(genome),
            strategy_mask: genome.strategy_mask.iter().take(STRATEGY_COUNT).copied().collect(),
            strategy_weights: genome.strategy_weights.iter().take(STRATEGY_COUNT).copied().collect(),
            consensus_params: genome.consensus_vector(),
            risk_params: genome.risk_vector(),
            betting_params: [
                genome.betting.base_bet_percent,
                genome.betting.win_multiplier,
                genome.betting.loss_multiplier,
            ],
            fitness,
            bankroll_multiplier: bot.multiplier(),
            win_rate: bot.win_rate(),
            sharpe_ratio: sharpe_ratio(&pnl),
            trades: bot.total_trades,
            survived,
            reached_milestone: milestone,
            group,
            timestamp: Utc::now(),
        };
        self.experiences.push(experience);

        if self.experiences.len() > PRUNE_AT {
            self.experiences
                .sort_by(|a, b| b.fitness.total_cmp(&a.fitness));
            self.experiences.truncate(MAX_EXPERIENCES);
        }
    }

    /// Bias a child genome toward successful neighbours. Needs at least 10
    /// experiences; otherwise the child comes back unchanged.
    pub fn guide_mutation<R: Rng + ?Sized>(&self, child: &Genome, rng: &mut R) -> Genome {
        let mut adjusted = child.clone();
        if self.experiences.len() < MIN_GUIDANCE_EXPERIENCES {
            return adjusted;
        }

        let probe: Vec<f64> = child
            .risk_vector()
            .iter()
            .chain(child.consensus_vector().iter())
            .copied()
            .collect();
        let mut scored: Vec<(f64, &Experience)> = self
            .experiences
            .iter()
            .map(|e| (cosine_similarity(&probe, &e.similarity_vector()), e))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        let similar: Vec<&Experience> = scored.into_iter().take(NEIGHBOURS).map(|(_, e)| e).collect();

        let good: Vec<&Experience> = similar
            .iter()
            .copied()
            .filter(|e| e.fitness > GOOD_FITNESS && e.survived)
            .collect();
        let bad: Vec<&Experience> = similar
            .iter()
            .copied()
            .filter(|e| e.fitness < BAD_FITNESS || !e.survived)
            .collect();

        if good.len() >= 3 {
            let n = good.len() as f64;
            let avg = |f: fn(&Experience) -> f64| good.iter().map(|e| f(e)).sum::<f64>() / n;
            let avg_leverage = avg(|e| e.risk_params[3]);
            let avg_tp = avg(|e| e.risk_params[0]);
            let avg_sl = avg(|e| e.risk_params[1]);
            let avg_min_agreeing = avg(|e| e.consensus_params[0]);

            let keep = 1.0 - BLEND_TOWARD_GOOD;
            let r = &mut adjusted.risk;
            r.leverage = (r.leverage as f64 * keep + avg_leverage * BLEND_TOWARD_GOOD).round() as u32;
            r.atr_tp_multiplier = r.atr_tp_multiplier * keep + avg_tp * BLEND_TOWARD_GOOD;
            r.atr_sl_multiplier = r.atr_sl_multiplier * keep + avg_sl * BLEND_TOWARD_GOOD;
            let c = &mut adjusted.consensus;
            c.min_agreeing =
                (c.min_agreeing as f64 * keep + avg_min_agreeing * BLEND_TOWARD_GOOD).round() as u32;

            for slot in 0..STRATEGY_COUNT.min(adjusted.strategy_mask.len()) {
                let users = good
                    .iter()
                    .filter(|e| e.strategy_mask.get(slot).copied().unwrap_or(false))
                    .count();
                if users as f64 / n > 0.7 && !adjusted.strategy_mask[slot] && rng.gen::<f64>() < 0.4 {
                    adjusted.strategy_mask[slot] = true;
                }
            }
        }

        if bad.len() >= 3 && good.len() < 2 {
            let avg_bad_leverage = bad.iter().map(|e| e.leverage()).sum::<f64>() / bad.len() as f64;
            if (adjusted.risk.leverage as f64 - avg_bad_leverage).abs() < 10.0 {
                adjusted.risk.leverage = adjusted.risk.leverage.saturating_sub(5).max(5);
            }
        }

        adjusted.normalize();
        adjusted
    }

    /// Best buckets of (active count, leverage/10) with at least 3 members
    pub fn top_patterns(&self) -> Vec<TopPattern> {
        if self.experiences.len() < 5 {
            return Vec::new();
        }
        let mut buckets: BTreeMap<String, Vec<&Experience>> = BTreeMap::new();
        for e in &self.experiences {
            let active = e.strategy_mask.iter().filter(|on| **on).count();
            let leverage_bucket = (e.leverage() / 10.0).round() as u32 * 10;
            buckets
                .entry(format!("strats:{}_lev:{}", active, leverage_bucket))
                .or_default()
                .push(e);
        }

        let mut patterns: Vec<TopPattern> = buckets
            .into_iter()
            .filter(|(_, members)| members.len() >= 3)
            .map(|(pattern, members)| {
                let n = members.len() as f64;
                TopPattern {
                    pattern,
                    avg_fitness: members.iter().map(|e| e.fitness).sum::<f64>() / n,
                    count: members.len(),
                    avg_multiplier: members.iter().map(|e| e.bankroll_multiplier).sum::<f64>() / n,
                    survival_rate: members.iter().filter(|e| e.survived).count() as f64 / n,
                }
            })
            .collect();
        patterns.sort_by(|a, b| b.avg_fitness.total_cmp(&a.avg_fitness));
        patterns.truncate(10);
        patterns
    }

    pub fn stats(&self) -> MemoryStats {
        if self.experiences.is_empty() {
            return MemoryStats::default();
        }
        let n = self.experiences.len() as f64;
        MemoryStats {
            total: self.experiences.len(),
            avg_fitness: self.experiences.iter().map(|e| e.fitness).sum::<f64>() / n,
            best_multiplier: self
                .experiences
                .iter()
                .map(|e| e.bankroll_multiplier)
                .fold(f64::MIN, f64::max),
            survival_rate: self.experiences.iter().filter(|e| e.survived).count() as f64 / n,
        }
    }
}

/// Compact readable hash: first 10 mask bits, consensus and risk headline
fn genome_hash(genome: &Genome) -> String {
    let mask: String = genome
        .strategy_mask
        .iter()
        .take(10)
        .map(|on| if *on { '1' } else { '0' })
        .collect();
    format!(
        "{}_{}-{}_{}-{:.1}",
        mask,
        genome.consensus.min_agreeing,
        genome.consensus.max_opposing,
        genome.risk.leverage,
        genome.risk.atr_tp_multiplier
    )
}

pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let mag_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    let denom = mag_a * mag_b;
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
