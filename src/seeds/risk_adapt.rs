//! Risk adaptation DNA - position-size multiplier
//!
//! multiplier = drawdown floor x streak adjustment x volatility scaling
//!            x milestone protection x recovery penalty
//!
//! The drawdown table stays sorted by threshold with non-increasing
//! multipliers; mutation that breaks this is repaired in place.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{inherit, mutate_f64, mutate_u32, Seed, SeedCore};

/// Bankroll multiples guarded by milestone protection
pub const PROTECTED_MULTIPLES: [f64; 4] = [2.0, 3.0, 5.0, 10.0];
/// Protection starts at this share of the next multiple
const PROTECTION_ZONE: f64 = 0.85;
const THRESHOLD_RANGE: (f64, f64) = (5.0, 60.0);
const LEVEL_MULTIPLIER_RANGE: (f64, f64) = (0.2, 1.0);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrawdownLevel {
    /// Drawdown (%) at which this floor applies
    pub threshold: f64,
    pub multiplier: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAdaptGenome {
    pub drawdown_levels: Vec<DrawdownLevel>,
    pub win_streak_threshold: u32,
    pub win_streak_boost: f64,
    pub loss_streak_threshold: u32,
    pub loss_streak_reduction: f64,
    pub volatility_scale: f64,
    pub milestone_protection: f64,
    /// Drawdown (%) that puts the bot in recovery mode
    pub recovery_threshold: f64,
    pub recovery_penalty: f64,
}

impl Default for RiskAdaptGenome {
    fn default() -> Self {
        Self {
            drawdown_levels: vec![
                DrawdownLevel { threshold: 10.0, multiplier: 0.8 },
                DrawdownLevel { threshold: 20.0, multiplier: 0.6 },
                DrawdownLevel { threshold: 35.0, multiplier: 0.4 },
            ],
            win_streak_threshold: 3,
            win_streak_boost: 1.15,
            loss_streak_threshold: 3,
            loss_streak_reduction: 0.7,
            volatility_scale: 0.75,
            milestone_protection: 0.7,
            recovery_threshold: 40.0,
            recovery_penalty: 0.6,
        }
    }
}

impl RiskAdaptGenome {
    /// Sort by threshold and make multipliers non-increasing
    pub fn repair_levels(&mut self) {
        for level in self.drawdown_levels.iter_mut() {
            level.threshold = level.threshold.clamp(THRESHOLD_RANGE.0, THRESHOLD_RANGE.1);
            level.multiplier = level
                .multiplier
                .clamp(LEVEL_MULTIPLIER_RANGE.0, LEVEL_MULTIPLIER_RANGE.1);
        }
        self.drawdown_levels
            .sort_by(|a, b| a.threshold.total_cmp(&b.threshold));
        for i in 1..self.drawdown_levels.len() {
            let prev = self.drawdown_levels[i - 1].multiplier;
            if self.drawdown_levels[i].multiplier > prev {
                self.drawdown_levels[i].multiplier = prev;
            }
        }
    }

    pub fn levels_are_monotonic(&self) -> bool {
        self.drawdown_levels.windows(2).all(|w| {
            w[0].threshold <= w[1].threshold && w[0].multiplier >= w[1].multiplier
        })
    }
}

/// Inputs for one sizing decision
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskContext {
    pub drawdown_percent: f64,
    pub win_streak: u32,
    pub loss_streak: u32,
    pub bankroll: f64,
    pub initial_bankroll: f64,
    pub high_volatility: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskAdaptDna {
    genome: RiskAdaptGenome,
    core: SeedCore,
}

impl RiskAdaptDna {
    /// Size multiplier in [0.1, 2.0]
    pub fn multiplier(&self, ctx: &RiskContext) -> f64 {
        let g = &self.genome;
        let mut m = 1.0;

        if let Some(level) = g
            .drawdown_levels
            .iter()
            .filter(|l| ctx.drawdown_percent >= l.threshold)
            .last()
        {
            m *= level.multiplier;
        }

        if ctx.win_streak >= g.win_streak_threshold {
            m *= g.win_streak_boost;
        }
        if ctx.loss_streak >= g.loss_streak_threshold {
            m *= g.loss_streak_reduction;
        }

        if ctx.high_volatility {
            m *= g.volatility_scale;
        }

        if ctx.initial_bankroll > 0.0 {
            let ratio = ctx.bankroll / ctx.initial_bankroll;
            if let Some(target) = PROTECTED_MULTIPLES.iter().find(|t| ratio < **t) {
                if ratio >= PROTECTION_ZONE * target {
                    m *= g.milestone_protection;
                }
            }
        }

        if ctx.drawdown_percent > g.recovery_threshold {
            m *= g.recovery_penalty;
        }

        m.clamp(0.1, 2.0)
    }
}

impl Seed for RiskAdaptDna {
    type Genome = RiskAdaptGenome;

    const NAME: &'static str = "risk_adapt";

    fn genome(&self) -> &RiskAdaptGenome {
        &self.genome
    }

    fn restore(&mut self, mut genome: RiskAdaptGenome) {
        genome.win_streak_threshold = genome.win_streak_threshold.clamp(2, 6);
        genome.loss_streak_threshold = genome.loss_streak_threshold.clamp(2, 6);
        genome.win_streak_boost = genome.win_streak_boost.clamp(1.0, 1.5);
        genome.loss_streak_reduction = genome.loss_streak_reduction.clamp(0.4, 1.0);
        genome.volatility_scale = genome.volatility_scale.clamp(0.4, 1.0);
        genome.milestone_protection = genome.milestone_protection.clamp(0.4, 1.0);
        genome.recovery_threshold = genome.recovery_threshold.clamp(20.0, 70.0);
        genome.recovery_penalty = genome.recovery_penalty.clamp(0.3, 0.9);
        genome.repair_levels();
        self.genome = genome;
    }

    fn core(&self) -> &SeedCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SeedCore {
        &mut self.core
    }

    fn blend<R: Rng + ?Sized>(&mut self, partner: &RiskAdaptGenome, rng: &mut R) {
        let g = &mut self.genome;
        inherit(rng, &mut g.drawdown_levels, &partner.drawdown_levels);
        inherit(rng, &mut g.win_streak_threshold, &partner.win_streak_threshold);
        inherit(rng, &mut g.win_streak_boost, &partner.win_streak_boost);
        inherit(rng, &mut g.loss_streak_threshold, &partner.loss_streak_threshold);
        inherit(rng, &mut g.loss_streak_reduction, &partner.loss_streak_reduction);
        inherit(rng, &mut g.volatility_scale, &partner.volatility_scale);
        inherit(rng, &mut g.milestone_protection, &partner.milestone_protection);
        inherit(rng, &mut g.recovery_threshold, &partner.recovery_threshold);
        inherit(rng, &mut g.recovery_penalty, &partner.recovery_penalty);
        g.repair_levels();
    }

    fn mutate<R: Rng + ?Sized>(&mut self, rate: f64, rng: &mut R) {
        let g = &mut self.genome;
        for level in g.drawdown_levels.iter_mut() {
            mutate_f64(rng, rate, &mut level.threshold, 8.0, THRESHOLD_RANGE);
            mutate_f64(rng, rate, &mut level.multiplier, 0.2, LEVEL_MULTIPLIER_RANGE);
        }
        mutate_u32(rng, rate, &mut g.win_streak_threshold, 2.0, (2.0, 6.0));
        mutate_f64(rng, rate, &mut g.win_streak_boost, 0.1, (1.0, 1.5));
        mutate_u32(rng, rate, &mut g.loss_streak_threshold, 2.0, (2.0, 6.0));
        mutate_f64(rng, rate, &mut g.loss_streak_reduction, 0.15, (0.4, 1.0));
        mutate_f64(rng, rate, &mut g.volatility_scale, 0.15, (0.4, 1.0));
        mutate_f64(rng, rate, &mut g.milestone_protection, 0.15, (0.4, 1.0));
        mutate_f64(rng, rate, &mut g.recovery_threshold, 10.0, (20.0, 70.0));
        mutate_f64(rng, rate, &mut g.recovery_penalty, 0.15, (0.3, 0.9));
        g.repair_levels();
    }
}
