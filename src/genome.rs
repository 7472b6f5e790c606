//! Genome - the heritable parameter set of one bot
//!
//! A genome is a plain value type: cloning it yields a fully independent copy,
//! so a child never aliases a parent's fields.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::types::{Direction, STRATEGY_COUNT};

/// Minimum number of enabled strategy slots in any genome
pub const MIN_ACTIVE_STRATEGIES: usize = 3;

/// Hard clamps for every evolvable scalar (min, max)
pub mod bounds {
    pub const WEIGHT: (f64, f64) = (0.1, 2.0);
    pub const MIN_AGREEING: (f64, f64) = (2.0, 15.0);
    pub const MAX_OPPOSING: (f64, f64) = (0.0, 10.0);
    pub const MIN_WEIGHTED_STRENGTH: (f64, f64) = (20.0, 90.0);
    pub const ATR_TP: (f64, f64) = (1.0, 5.0);
    pub const ATR_SL: (f64, f64) = (0.5, 3.0);
    pub const TRAILING_ATR: (f64, f64) = (0.0, 3.0);
    pub const FLIP_EXIT: (f64, f64) = (0.0, 15.0);
    pub const LEVERAGE: (f64, f64) = (5.0, 75.0);
    pub const MAX_OPEN_POSITIONS: (f64, f64) = (1.0, 5.0);
    pub const MAX_EXPOSURE: (f64, f64) = (20.0, 100.0);
    pub const BET_BASE: (f64, f64) = (1.0, 10.0);
    pub const WIN_MULTIPLIER: (f64, f64) = (1.0, 2.0);
    pub const LOSS_MULTIPLIER: (f64, f64) = (0.5, 1.0);
    pub const BET_MAX: (f64, f64) = (5.0, 20.0);
    pub const RESET_AFTER_LOSSES: (f64, f64) = (2.0, 8.0);
}

/// Directional preference of a genome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PreferredDirection {
    Any,
    LongBias,
    ShortBias,
}

impl Default for PreferredDirection {
    fn default() -> Self {
        PreferredDirection::Any
    }
}

impl PreferredDirection {
    /// The favoured side, if any
    pub fn favoured(&self) -> Option<Direction> {
        match self {
            PreferredDirection::Any => None,
            PreferredDirection::LongBias => Some(Direction::Long),
            PreferredDirection::ShortBias => Some(Direction::Short),
        }
    }
}

impl fmt::Display for PreferredDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreferredDirection::Any => write!(f, "ANY"),
            PreferredDirection::LongBias => write!(f, "LONG_BIAS"),
            PreferredDirection::ShortBias => write!(f, "SHORT_BIAS"),
        }
    }
}

/// Consensus rule genes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusGenes {
    /// Minimum agreeing enabled signals
    pub min_agreeing: u32,
    /// Maximum opposing enabled signals tolerated
    pub max_opposing: u32,
    /// Minimum average weighted strength of the agreeing side
    pub min_weighted_strength: f64,
    pub preferred_direction: PreferredDirection,
}

/// Exit and exposure genes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskGenes {
    pub atr_tp_multiplier: f64,
    pub atr_sl_multiplier: f64,
    /// Trailing stop distance in ATRs (0 disables trailing)
    pub trailing_stop_atr: f64,
    /// Opposing raw signals needed for an early exit (0 disables)
    pub flip_exit_threshold: u32,
    pub leverage: u32,
    pub max_open_positions: usize,
    /// Max share of bankroll committed across open positions (%)
    pub max_exposure_percent: f64,
}

/// Bet sizing genes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BettingGenes {
    /// Starting bet as % of bankroll
    pub base_bet_percent: f64,
    pub win_multiplier: f64,
    pub loss_multiplier: f64,
    pub max_bet_percent: f64,
    pub reset_after_losses: u32,
}

/// Heritable parameter set defining one bot's behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genome {
    pub id: String,
    pub name: String,
    pub generation: u32,
    /// Zero, one (mutation) or two (crossover) parents
    #[serde(default)]
    pub parent_ids: Vec<String>,
    pub strategy_mask: Vec<bool>,
    pub strategy_weights: Vec<f64>,
    pub consensus: ConsensusGenes,
    pub risk: RiskGenes,
    pub betting: BettingGenes,
    pub symbols: Vec<String>,
}

impl Genome {
    /// Number of enabled strategy slots
    pub fn active_count(&self) -> usize {
        self.strategy_mask.iter().filter(|on| **on).count()
    }

    /// Indices of enabled strategy slots
    pub fn active_slots(&self) -> Vec<usize> {
        self.strategy_mask
            .iter()
            .enumerate()
            .filter_map(|(i, on)| on.then_some(i))
            .collect()
    }

    /// Weight of a slot (1.0 when missing)
    pub fn weight(&self, slot: usize) -> f64 {
        self.strategy_weights.get(slot).copied().unwrap_or(1.0)
    }

    /// Re-enable slots until the active floor holds. Picks the heaviest
    /// disabled slots first (lowest index on ties) so the repair is
    /// deterministic. Returns how many slots were switched on.
    pub fn enforce_min_active(&mut self) -> usize {
        let mut repaired = 0;
        while self.active_count() < MIN_ACTIVE_STRATEGIES {
            let candidate = self
                .strategy_mask
                .iter()
                .enumerate()
                .filter(|(_, on)| !**on)
                .map(|(i, _)| i)
                .fold(None::<usize>, |best, i| match best {
                    Some(b) if self.weight(b) >= self.weight(i) => Some(b),
                    _ => Some(i),
                });
            match candidate {
                Some(i) => {
                    self.strategy_mask[i] = true;
                    repaired += 1;
                }
                None => break,
            }
        }
        repaired
    }

    /// Restore the structural shape and clamp every gene into its hard range
    pub fn normalize(&mut self) {
        self.strategy_mask.resize(STRATEGY_COUNT, false);
        self.strategy_weights.resize(STRATEGY_COUNT, 1.0);
        for w in self.strategy_weights.iter_mut() {
            *w = clamp(*w, bounds::WEIGHT);
        }

        let c = &mut self.consensus;
        c.min_agreeing = clamp(c.min_agreeing as f64, bounds::MIN_AGREEING) as u32;
        c.max_opposing = clamp(c.max_opposing as f64, bounds::MAX_OPPOSING) as u32;
        c.min_weighted_strength = clamp(c.min_weighted_strength, bounds::MIN_WEIGHTED_STRENGTH);

        let r = &mut self.risk;
        r.atr_tp_multiplier = clamp(r.atr_tp_multiplier, bounds::ATR_TP);
        r.atr_sl_multiplier = clamp(r.atr_sl_multiplier, bounds::ATR_SL);
        r.trailing_stop_atr = clamp(r.trailing_stop_atr, bounds::TRAILING_ATR);
        r.flip_exit_threshold = clamp(r.flip_exit_threshold as f64, bounds::FLIP_EXIT) as u32;
        r.leverage = clamp(r.leverage as f64, bounds::LEVERAGE) as u32;
        r.max_open_positions = clamp(r.max_open_positions as f64, bounds::MAX_OPEN_POSITIONS) as usize;
        r.max_exposure_percent = clamp(r.max_exposure_percent, bounds::MAX_EXPOSURE);

        let b = &mut self.betting;
        b.base_bet_percent = clamp(b.base_bet_percent, bounds::BET_BASE);
        b.win_multiplier = clamp(b.win_multiplier, bounds::WIN_MULTIPLIER);
        b.loss_multiplier = clamp(b.loss_multiplier, bounds::LOSS_MULTIPLIER);
        b.max_bet_percent = clamp(b.max_bet_percent, bounds::BET_MAX).max(b.base_bet_percent);
        b.reset_after_losses =
            clamp(b.reset_after_losses as f64, bounds::RESET_AFTER_LOSSES) as u32;

        self.enforce_min_active();
    }

    /// [tp, sl, trailing, leverage] used for similarity search
    pub fn risk_vector(&self) -> [f64; 4] {
        [
            self.risk.atr_tp_multiplier,
            self.risk.atr_sl_multiplier,
            self.risk.trailing_stop_atr,
            self.risk.leverage as f64,
        ]
    }

    /// [minAgreeing, maxOpposing, minWeightedStrength] used for similarity search
    pub fn consensus_vector(&self) -> [f64; 3] {
        [
            self.consensus.min_agreeing as f64,
            self.consensus.max_opposing as f64,
            self.consensus.min_weighted_strength,
        ]
    }

    /// Short content hash over the heritable genes (identity fields excluded)
    pub fn fingerprint(&self) -> String {
        let genes = (
            &self.strategy_mask,
            &self.strategy_weights,
            &self.consensus,
            &self.risk,
            &self.betting,
        );
        let bytes = serde_json::to_vec(&genes).unwrap_or_default();
        fingerprint_bytes(&bytes)
    }
}

/// First 8 bytes of a SHA-256 digest, hex encoded
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(&digest[..8])
}

/// Hamming distance between two masks
pub fn hamming_distance(a: &[bool], b: &[bool]) -> usize {
    let len = a.len().max(b.len());
    (0..len)
        .filter(|&i| a.get(i).copied().unwrap_or(false) != b.get(i).copied().unwrap_or(false))
        .count()
}

fn clamp(value: f64, (min, max): (f64, f64)) -> f64 {
    if value.is_nan() {
        return min;
    }
    value.clamp(min, max)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_genome() -> Genome {
        let mut mask = vec![false; STRATEGY_COUNT];
        for slot in [0, 3, 7, 12, 21] {
            mask[slot] = true;
        }
        Genome {
            id: "g-1".to_string(),
            name: "Hydra".to_string(),
            generation: 0,
            parent_ids: Vec::new(),
            strategy_mask: mask,
            strategy_weights: vec![1.0; STRATEGY_COUNT],
            consensus: ConsensusGenes {
                min_agreeing: 3,
                max_opposing: 2,
                min_weighted_strength: 40.0,
                preferred_direction: PreferredDirection::Any,
            },
            risk: RiskGenes {
                atr_tp_multiplier: 2.0,
                atr_sl_multiplier: 1.0,
                trailing_stop_atr: 1.0,
                flip_exit_threshold: 6,
                leverage: 20,
                max_open_positions: 3,
                max_exposure_percent: 60.0,
            },
            betting: BettingGenes {
                base_bet_percent: 3.0,
                win_multiplier: 1.2,
                loss_multiplier: 0.8,
                max_bet_percent: 10.0,
                reset_after_losses: 3,
            },
            symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
        }
    }

    #[test]
    fn test_enforce_min_active_picks_heaviest_slots() {
        let mut g = sample_genome();
        g.strategy_mask = vec![false; STRATEGY_COUNT];
        g.strategy_weights[5] = 1.9;
        g.strategy_weights[9] = 1.5;

        let repaired = g.enforce_min_active();
        assert_eq!(repaired, 3);
        assert_eq!(g.active_count(), MIN_ACTIVE_STRATEGIES);
        assert!(g.strategy_mask[5]);
        assert!(g.strategy_mask[9]);
        // remaining weights tie at 1.0, lowest index wins
        assert!(g.strategy_mask[0]);
    }

    #[test]
    fn test_normalize_clamps_genes() {
        let mut g = sample_genome();
        g.risk.leverage = 500;
        g.risk.atr_sl_multiplier = 0.01;
        g.betting.max_bet_percent = 0.5;
        g.strategy_weights.truncate(10);
        g.normalize();

        assert_eq!(g.risk.leverage, 75);
        assert_eq!(g.risk.atr_sl_multiplier, 0.5);
        assert!(g.betting.max_bet_percent >= g.betting.base_bet_percent);
        assert_eq!(g.strategy_weights.len(), STRATEGY_COUNT);
    }

    #[test]
    fn test_clone_does_not_alias() {
        let parent = sample_genome();
        let mut child = parent.clone();
        child.strategy_mask[1] = true;
        child.strategy_weights[0] = 0.2;
        assert!(!parent.strategy_mask[1]);
        assert_eq!(parent.strategy_weights[0], 1.0);
    }

    #[test]
    fn test_fingerprint_ignores_identity() {
        let a = sample_genome();
        let mut b = a.clone();
        b.id = "other".to_string();
        b.name = "Titan".to_string();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.risk.leverage = 30;
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_hamming_distance() {
        let a = vec![true, false, true];
        let b = vec![true, true, false];
        assert_eq!(hamming_distance(&a, &b), 2);
    }
}
