//! Group personalities and genesis genomes
//!
//! Each group starts from its own gene pool: consensus floor, directional
//! bias, ATR multipliers, leverage band and an optional specialist slot range.

use rand::Rng;
use uuid::Uuid;

use crate::genome::{BettingGenes, ConsensusGenes, Genome, PreferredDirection, RiskGenes};
use crate::types::{GroupId, STRATEGY_COUNT};

pub const BOTS_PER_GROUP: usize = 5;

pub const BOT_NAME_POOL: [&str; 30] = [
    "Hydra", "Phoenix", "Cerberus", "Atlas", "Kraken", "Titan", "Nexus", "Vortex", "Zenith",
    "Apex", "Sigma", "Nova", "Pulse", "Forge", "Storm", "Drift", "Blaze", "Echo", "Shard", "Flux",
    "Rune", "Cipher", "Ember", "Frost", "Prism", "Arc", "Bolt", "Crest", "Dawn", "Edge",
];

/// Fixed per-group configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupPersonality {
    pub style: &'static str,
    pub consensus_min: u32,
    pub preferred_direction: PreferredDirection,
    pub atr_tp: f64,
    pub atr_sl: f64,
    pub leverage_min: u32,
    pub leverage_max: u32,
    /// Inclusive slot range a specialist favours
    pub strategy_range: Option<(usize, usize)>,
}

impl GroupPersonality {
    pub fn for_group(group: GroupId) -> Self {
        match group {
            GroupId::Alpha => Self {
                style: "Aggressive Trend-Following",
                consensus_min: 3,
                preferred_direction: PreferredDirection::LongBias,
                atr_tp: 2.0,
                atr_sl: 1.0,
                leverage_min: 40,
                leverage_max: 50,
                strategy_range: None,
            },
            GroupId::Beta => Self {
                style: "Conservative Mean-Reversion",
                consensus_min: 6,
                preferred_direction: PreferredDirection::Any,
                atr_tp: 3.0,
                atr_sl: 1.5,
                leverage_min: 20,
                leverage_max: 30,
                strategy_range: None,
            },
            GroupId::Gamma => Self {
                style: "Balanced Multi-Strategy",
                consensus_min: 4,
                preferred_direction: PreferredDirection::Any,
                atr_tp: 2.5,
                atr_sl: 1.2,
                leverage_min: 30,
                leverage_max: 40,
                strategy_range: None,
            },
            GroupId::Delta => Self {
                style: "Momentum Specialist",
                consensus_min: 4,
                preferred_direction: PreferredDirection::Any,
                atr_tp: 2.0,
                atr_sl: 0.8,
                leverage_min: 35,
                leverage_max: 45,
                strategy_range: Some((10, 19)),
            },
            GroupId::Omega => Self {
                style: "Volatility Hunter",
                consensus_min: 5,
                preferred_direction: PreferredDirection::Any,
                atr_tp: 3.5,
                atr_sl: 1.8,
                leverage_min: 25,
                leverage_max: 35,
                strategy_range: Some((20, 29)),
            },
        }
    }

    fn in_range(&self, slot: usize) -> bool {
        self.strategy_range
            .map(|(lo, hi)| slot >= lo && slot <= hi)
            .unwrap_or(false)
    }
}

/// `eco-{group}-{tag}-{8 hex}`
pub fn genome_id(group: GroupId, tag: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("eco-{}-{}-{}", group, tag, &suffix[..8])
}

/// Name for a child of `generation`
pub fn child_name(generation: u32) -> String {
    BOT_NAME_POOL[generation as usize % BOT_NAME_POOL.len()].to_string()
}

/// Build the `index`-th genesis genome of a group
pub fn genesis_genome<R: Rng + ?Sized>(
    group: GroupId,
    index: usize,
    symbols: &[String],
    rng: &mut R,
) -> Genome {
    let p = GroupPersonality::for_group(group);
    let mut mask = vec![false; STRATEGY_COUNT];
    let mut weights = vec![1.0; STRATEGY_COUNT];

    if p.strategy_range.is_some() {
        for slot in 0..STRATEGY_COUNT {
            if p.in_range(slot) {
                mask[slot] = true;
                weights[slot] = 1.2 + rng.gen::<f64>() * 0.6;
            } else if rng.gen::<f64>() < 0.2 {
                mask[slot] = true;
                weights[slot] = 0.5 + rng.gen::<f64>() * 0.5;
            }
        }
    } else {
        for slot in 0..STRATEGY_COUNT {
            mask[slot] = rng.gen::<f64>() < 0.4;
            weights[slot] = 0.5 + rng.gen::<f64>() * 1.5;
        }
    }

    let floor = p.consensus_min as usize + 1;
    if mask.iter().filter(|on| **on).count() < floor {
        let target = floor + 1;
        for slot in 0..STRATEGY_COUNT {
            if mask.iter().filter(|on| **on).count() >= target {
                break;
            }
            mask[slot] = true;
        }
    }

    let spread = (p.leverage_max - p.leverage_min) as f64;
    let leverage = p.leverage_min + (rng.gen::<f64>() * spread).round() as u32;
    let variation = (rng.gen::<f64>() - 0.5) * 0.4;
    let min_agreeing =
        (p.consensus_min as f64 + ((rng.gen::<f64>() - 0.5) * 2.0).round()).max(0.0) as u32;
    let max_opposing = ((3.0 + (rng.gen::<f64>() - 0.5) * 2.0).round() as u32).max(1);

    let mut genome = Genome {
        id: genome_id(group, &format!("genesis-{}", index)),
        name: BOT_NAME_POOL[(index + group.index() * BOTS_PER_GROUP) % BOT_NAME_POOL.len()]
            .to_string(),
        generation: 1,
        parent_ids: Vec::new(),
        strategy_mask: mask,
        strategy_weights: weights,
        consensus: ConsensusGenes {
            min_agreeing,
            max_opposing,
            min_weighted_strength: 30.0 + (rng.gen::<f64>() * 20.0).round(),
            preferred_direction: p.preferred_direction,
        },
        risk: RiskGenes {
            atr_tp_multiplier: (p.atr_tp + variation).max(1.0),
            atr_sl_multiplier: (p.atr_sl + variation * 0.5).max(0.5),
            trailing_stop_atr: 0.5 + rng.gen::<f64>() * 1.5,
            flip_exit_threshold: (5.0 + rng.gen::<f64>() * 5.0).round() as u32,
            leverage,
            max_open_positions: 3,
            max_exposure_percent: 60.0 + (rng.gen::<f64>() * 20.0).round(),
        },
        betting: BettingGenes {
            base_bet_percent: 2.0 + (rng.gen::<f64>() * 3.0).round(),
            win_multiplier: 1.1 + rng.gen::<f64>() * 0.3,
            loss_multiplier: 0.6 + rng.gen::<f64>() * 0.3,
            max_bet_percent: 8.0 + (rng.gen::<f64>() * 4.0).round(),
            reset_after_losses: 3 + (rng.gen::<f64>() * 2.0).round() as u32,
        },
        symbols: symbols.to_vec(),
    };
    genome.normalize();
    genome
}
