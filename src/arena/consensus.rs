//! Consensus evaluation over a bot's enabled strategy slots

use crate::bot::ConsensusSnapshot;
use crate::genome::Genome;
use crate::types::{Direction, HigherTimeframe, PoolSignal, STRATEGY_COUNT};

/// Extra agreeing signals a biased genome needs to trade against its bias
pub const AGAINST_BIAS_EXTRA: u32 = 2;
const TOP_STRATEGIES: usize = 5;

/// Decide whether the enabled slots agree strongly enough to trade.
///
/// Only enabled slots vote, each adding `strength x weight` to its side. The
/// higher-scoring side is dominant (long on ties). Returns `None` when the
/// agreeing count, opposing count, or agreeing average strength miss the
/// genome's thresholds.
pub fn evaluate_consensus(
    genome: &Genome,
    signals: &[PoolSignal],
    htf: &HigherTimeframe,
) -> Option<ConsensusSnapshot> {
    let mut long_score = 0.0;
    let mut short_score = 0.0;
    let mut long_votes: Vec<(usize, f64)> = Vec::new();
    let mut short_votes: Vec<(usize, f64)> = Vec::new();

    for (slot, signal) in signals.iter().enumerate().take(STRATEGY_COUNT) {
        if !genome.strategy_mask.get(slot).copied().unwrap_or(false) {
            continue;
        }
        let weighted = signal.strength * genome.weight(slot);
        match signal.direction {
            Direction::Long => {
                long_score += weighted;
                long_votes.push((signal.strategy_id, weighted));
            }
            Direction::Short => {
                short_score += weighted;
                short_votes.push((signal.strategy_id, weighted));
            }
            Direction::Neutral => {}
        }
    }

    if long_votes.is_empty() && short_votes.is_empty() {
        return None;
    }

    let (direction, score, mut agreeing, opposing) = if long_score >= short_score {
        (Direction::Long, long_score, long_votes, short_votes.len())
    } else {
        (Direction::Short, short_score, short_votes, long_votes.len())
    };
    let agreeing_count = agreeing.len();
    let weighted_strength = if agreeing_count > 0 {
        score / agreeing_count as f64
    } else {
        0.0
    };

    let c = &genome.consensus;
    if let Some(favoured) = c.preferred_direction.favoured() {
        if direction != favoured && (agreeing_count as u32) < c.min_agreeing + AGAINST_BIAS_EXTRA {
            return None;
        }
    }
    if (agreeing_count as u32) < c.min_agreeing
        || opposing as u32 > c.max_opposing
        || weighted_strength < c.min_weighted_strength
    {
        return None;
    }

    let htf_multiplier = if htf.bias == direction && htf.strength > 30.0 {
        1.15
    } else if htf.bias != Direction::Neutral && htf.bias != direction && htf.strength > 50.0 {
        0.85
    } else {
        1.0
    };

    agreeing.sort_by(|a, b| b.1.total_cmp(&a.1));
    let top_strategies = agreeing
        .iter()
        .take(TOP_STRATEGIES)
        .map(|(id, _)| *id)
        .collect();

    let share = agreeing_count as f64 / (agreeing_count + opposing).max(1) as f64;
    Some(ConsensusSnapshot {
        direction,
        agreeing: agreeing_count,
        opposing,
        weighted_strength,
        confidence: (share * weighted_strength * htf_multiplier).min(100.0),
        top_strategies,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::tests::sample_genome;
    use crate::genome::PreferredDirection;
    use crate::types::StrategyCategory;

    // sample genome enables slots 0, 3, 7, 12, 21; min_agreeing 3,
    // max_opposing 2, min strength 40
    fn vector(votes: &[(usize, Direction, f64)]) -> Vec<PoolSignal> {
        let mut signals: Vec<PoolSignal> = (0..STRATEGY_COUNT)
            .map(|slot| PoolSignal {
                strategy_id: slot,
                strategy_name: format!("s{}", slot),
                category: StrategyCategory::for_slot(slot),
                direction: Direction::Neutral,
                strength: 0.0,
                symbol: "BTCUSDT".to_string(),
                timestamp: 0,
            })
            .collect();
        for (slot, dir, strength) in votes {
            signals[*slot].direction = *dir;
            signals[*slot].strength = *strength;
        }
        signals
    }

    #[test]
    fn test_passes_with_enough_agreement() {
        let genome = sample_genome();
        let signals = vector(&[
            (0, Direction::Long, 60.0),
            (3, Direction::Long, 50.0),
            (7, Direction::Long, 70.0),
            (12, Direction::Short, 40.0),
            // disabled slot, ignored
            (1, Direction::Short, 100.0),
        ]);
        let d = evaluate_consensus(&genome, &signals, &HigherTimeframe::default()).unwrap();
        assert_eq!(d.direction, Direction::Long);
        assert_eq!(d.agreeing, 3);
        assert_eq!(d.opposing, 1);
        assert!((d.weighted_strength - 60.0).abs() < 1e-9);
        assert!((d.confidence - 45.0).abs() < 1e-9);
        assert_eq!(d.top_strategies, vec![7, 0, 3]);
    }

    #[test]
    fn test_rejections() {
        let genome = sample_genome();
        let htf = HigherTimeframe::default();

        let too_few = vector(&[(0, Direction::Long, 80.0), (3, Direction::Long, 80.0)]);
        assert!(evaluate_consensus(&genome, &too_few, &htf).is_none());

        let weak = vector(&[
            (0, Direction::Long, 30.0),
            (3, Direction::Long, 30.0),
            (7, Direction::Long, 30.0),
        ]);
        assert!(evaluate_consensus(&genome, &weak, &htf).is_none());

        let mut strict = sample_genome();
        strict.consensus.max_opposing = 0;
        let opposed = vector(&[
            (0, Direction::Long, 80.0),
            (3, Direction::Long, 80.0),
            (7, Direction::Long, 80.0),
            (12, Direction::Short, 10.0),
        ]);
        assert!(evaluate_consensus(&strict, &opposed, &htf).is_none());
    }

    #[test]
    fn test_bias_needs_two_extra_against_it() {
        let mut genome = sample_genome();
        genome.consensus.preferred_direction = PreferredDirection::LongBias;
        let htf = HigherTimeframe::default();

        let short3 = vector(&[
            (0, Direction::Short, 80.0),
            (3, Direction::Short, 80.0),
            (7, Direction::Short, 80.0),
        ]);
        assert!(evaluate_consensus(&genome, &short3, &htf).is_none());

        let short5 = vector(&[
            (0, Direction::Short, 80.0),
            (3, Direction::Short, 80.0),
            (7, Direction::Short, 80.0),
            (12, Direction::Short, 80.0),
            (21, Direction::Short, 80.0),
        ]);
        let d = evaluate_consensus(&genome, &short5, &htf).unwrap();
        assert_eq!(d.direction, Direction::Short);
    }

    #[test]
    fn test_higher_timeframe_scaling() {
        let genome = sample_genome();
        let signals = vector(&[
            (0, Direction::Long, 50.0),
            (3, Direction::Long, 50.0),
            (7, Direction::Long, 50.0),
        ]);
        let aligned = HigherTimeframe {
            bias: Direction::Long,
            strength: 40.0,
            ..Default::default()
        };
        let opposed = HigherTimeframe {
            bias: Direction::Short,
            strength: 60.0,
            ..Default::default()
        };
        let weak_opposed = HigherTimeframe {
            bias: Direction::Short,
            strength: 45.0,
            ..Default::default()
        };
        let c = |htf: &HigherTimeframe| evaluate_consensus(&genome, &signals, htf).unwrap().confidence;
        assert!((c(&aligned) - 57.5).abs() < 1e-9);
        assert!((c(&opposed) - 42.5).abs() < 1e-9);
        assert!((c(&weak_opposed) - 50.0).abs() < 1e-9);
    }
}
