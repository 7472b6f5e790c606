//! Genetic operators on bot genomes
//!
//! Crossover always ends in a mutation pass. Mutation is steered by a
//! `MutationPlan` (intensity from the adaptive engine, per-category rates and
//! amplitude from the group's meta-evolution seed). Every operator returns a
//! fresh genome with the hard clamps and the active-strategy floor restored.

use rand::Rng;

use super::adaptive::{apply_directional_bias, MutationDirection, MutationType};
use crate::genome::{bounds, Genome};
use crate::seeds::{MetaEvolutionDna, MutationCategory};
use crate::types::STRATEGY_COUNT;

/// Everything one mutation pass needs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MutationPlan {
    pub kind: MutationType,
    pub direction: MutationDirection,
    pub mask_rate: f64,
    pub weight_rate: f64,
    pub consensus_rate: f64,
    pub risk_rate: f64,
    pub betting_rate: f64,
    pub amplitude: f64,
}

impl MutationPlan {
    /// Scale the meta-evolution rates/amplitude by the intensity profile
    pub fn new(kind: MutationType, meta: &MetaEvolutionDna) -> Self {
        let profile = kind.profile();
        let rate = |c: MutationCategory| (meta.mutation_rate_for(c) * profile.rate_multiplier).min(1.0);
        Self {
            kind,
            direction: profile.direction,
            mask_rate: rate(MutationCategory::StrategyMask),
            weight_rate: rate(MutationCategory::StrategyWeights),
            consensus_rate: rate(MutationCategory::Consensus),
            risk_rate: rate(MutationCategory::Risk),
            betting_rate: rate(MutationCategory::Betting),
            amplitude: meta.amplitude() * profile.amplitude,
        }
    }
}

/// Per-field coin flip weighted by `blend` toward `a`, then a mutation pass
pub fn crossover<R: Rng + ?Sized>(
    a: &Genome,
    b: &Genome,
    blend: f64,
    plan: &MutationPlan,
    rng: &mut R,
) -> Genome {
    let mut child = a.clone();
    child.parent_ids = vec![a.id.clone(), b.id.clone()];

    for i in 0..STRATEGY_COUNT {
        if let (Some(m), Some(w)) = (b.strategy_mask.get(i), b.strategy_weights.get(i)) {
            if rng.gen::<f64>() >= blend {
                child.strategy_mask[i] = *m;
            }
            if rng.gen::<f64>() >= blend {
                child.strategy_weights[i] = *w;
            }
        }
    }

    let pick = |rng: &mut R| rng.gen::<f64>() >= blend;
    let c = &mut child.consensus;
    if pick(rng) {
        c.min_agreeing = b.consensus.min_agreeing;
    }
    if pick(rng) {
        c.max_opposing = b.consensus.max_opposing;
    }
    if pick(rng) {
        c.min_weighted_strength = b.consensus.min_weighted_strength;
    }

    let r = &mut child.risk;
    if pick(rng) {
        r.atr_tp_multiplier = b.risk.atr_tp_multiplier;
    }
    if pick(rng) {
        r.atr_sl_multiplier = b.risk.atr_sl_multiplier;
    }
    if pick(rng) {
        r.trailing_stop_atr = b.risk.trailing_stop_atr;
    }
    if pick(rng) {
        r.flip_exit_threshold = b.risk.flip_exit_threshold;
    }
    if pick(rng) {
        r.leverage = b.risk.leverage;
    }

    let bet = &mut child.betting;
    if pick(rng) {
        bet.base_bet_percent = b.betting.base_bet_percent;
    }
    if pick(rng) {
        bet.win_multiplier = b.betting.win_multiplier;
    }
    if pick(rng) {
        bet.loss_multiplier = b.betting.loss_multiplier;
    }

    mutate(&child, plan, rng)
}

/// Mutate a copy of `genome` according to `plan`
pub fn mutate<R: Rng + ?Sized>(genome: &Genome, plan: &MutationPlan, rng: &mut R) -> Genome {
    let mut child = genome.clone();
    child.normalize();
    let dir = plan.direction;
    let amp = plan.amplitude;

    for on in child.strategy_mask.iter_mut() {
        if rng.gen::<f64>() < plan.mask_rate
            && (dir == MutationDirection::Exploratory || rng.gen::<f64>() < 0.5)
        {
            *on = !*on;
        }
    }
    child.enforce_min_active();

    for w in child.strategy_weights.iter_mut() {
        if rng.gen::<f64>() < plan.weight_rate {
            *w = biased(*w, bounds::WEIGHT, dir, amp * 0.4, rng);
        }
    }

    let c = &mut child.consensus;
    if rng.gen::<f64>() < plan.consensus_rate {
        c.min_agreeing = biased_u32(c.min_agreeing, bounds::MIN_AGREEING, dir, amp * 4.0, rng);
    }
    if rng.gen::<f64>() < plan.consensus_rate {
        c.max_opposing = biased_u32(c.max_opposing, bounds::MAX_OPPOSING, dir, amp * 3.0, rng);
    }
    if rng.gen::<f64>() < plan.consensus_rate {
        c.min_weighted_strength =
            biased(c.min_weighted_strength, bounds::MIN_WEIGHTED_STRENGTH, dir, amp * 20.0, rng);
    }

    let r = &mut child.risk;
    if rng.gen::<f64>() < plan.risk_rate {
        r.atr_tp_multiplier = biased(r.atr_tp_multiplier, bounds::ATR_TP, dir, amp, rng);
    }
    if rng.gen::<f64>() < plan.risk_rate {
        r.atr_sl_multiplier = biased(r.atr_sl_multiplier, bounds::ATR_SL, dir, amp * 0.6, rng);
    }
    if rng.gen::<f64>() < plan.risk_rate {
        r.trailing_stop_atr = biased(r.trailing_stop_atr, bounds::TRAILING_ATR, dir, amp * 0.8, rng);
    }
    if rng.gen::<f64>() < plan.risk_rate {
        r.flip_exit_threshold =
            biased_u32(r.flip_exit_threshold, bounds::FLIP_EXIT, dir, amp * 4.0, rng);
    }
    if rng.gen::<f64>() < plan.risk_rate {
        r.leverage = biased_u32(r.leverage, bounds::LEVERAGE, dir, amp * 20.0, rng);
    }

    let b = &mut child.betting;
    if rng.gen::<f64>() < plan.betting_rate {
        b.base_bet_percent = biased(b.base_bet_percent, bounds::BET_BASE, dir, amp * 2.0, rng);
    }
    if rng.gen::<f64>() < plan.betting_rate {
        b.win_multiplier = biased(b.win_multiplier, bounds::WIN_MULTIPLIER, dir, amp * 0.3, rng);
    }
    if rng.gen::<f64>() < plan.betting_rate {
        b.loss_multiplier = biased(b.loss_multiplier, bounds::LOSS_MULTIPLIER, dir, amp * 0.2, rng);
    }
    if rng.gen::<f64>() < plan.betting_rate {
        b.max_bet_percent = biased(b.max_bet_percent, bounds::BET_MAX, dir, amp * 3.0, rng);
    }
    if rng.gen::<f64>() < plan.betting_rate {
        b.reset_after_losses =
            biased_u32(b.reset_after_losses, bounds::RESET_AFTER_LOSSES, dir, amp * 2.0, rng);
    }

    child.normalize();
    child
}

/// Light perturbation applied to a genome cloned into another group:
/// 10% per mask bit/weight, 20% each on leverage, minAgreeing and the ATR multipliers
pub fn perturb_migrant<R: Rng + ?Sized>(genome: &Genome, rng: &mut R) -> Genome {
    let mut clone = genome.clone();
    clone.normalize();

    for i in 0..STRATEGY_COUNT {
        if rng.gen::<f64>() < 0.1 {
            clone.strategy_mask[i] = !clone.strategy_mask[i];
        }
        if rng.gen::<f64>() < 0.1 {
            clone.strategy_weights[i] += (rng.gen::<f64>() - 0.5) * 0.3;
        }
    }
    if rng.gen::<f64>() < 0.2 {
        let step = ((rng.gen::<f64>() - 0.5) * 10.0).round();
        clone.risk.leverage = (clone.risk.leverage as f64 + step).max(0.0) as u32;
    }
    if rng.gen::<f64>() < 0.2 {
        let step = ((rng.gen::<f64>() - 0.5) * 2.0).round();
        clone.consensus.min_agreeing = (clone.consensus.min_agreeing as f64 + step).max(0.0) as u32;
    }
    if rng.gen::<f64>() < 0.2 {
        clone.risk.atr_tp_multiplier += (rng.gen::<f64>() - 0.5) * 0.5;
    }
    if rng.gen::<f64>() < 0.2 {
        clone.risk.atr_sl_multiplier += (rng.gen::<f64>() - 0.5) * 0.3;
    }

    clone.normalize();
    clone
}

fn biased<R: Rng + ?Sized>(
    value: f64,
    (min, max): (f64, f64),
    direction: MutationDirection,
    amplitude: f64,
    rng: &mut R,
) -> f64 {
    apply_directional_bias(value, min, max, direction, amplitude, rng)
}

fn biased_u32<R: Rng + ?Sized>(
    value: u32,
    range: (f64, f64),
    direction: MutationDirection,
    amplitude: f64,
    rng: &mut R,
) -> u32 {
    biased(value as f64, range, direction, amplitude, rng).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::tests::sample_genome;
    use crate::genome::MIN_ACTIVE_STRATEGIES;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn plan(kind: MutationType) -> MutationPlan {
        MutationPlan::new(kind, &MetaEvolutionDna::default())
    }

    fn sparse_genome(id: &str) -> Genome {
        let mut g = sample_genome();
        g.id = id.to_string();
        g.strategy_mask = vec![false; STRATEGY_COUNT];
        for slot in [1, 2, 3] {
            g.strategy_mask[slot] = true;
        }
        g
    }

    #[test]
    fn test_plan_scales_meta_rates() {
        let p = plan(MutationType::Radical);
        assert_eq!(p.direction, MutationDirection::Exploratory);
        assert!((p.mask_rate - 0.25).abs() < 1e-9);
        assert!((p.weight_rate - 0.5).abs() < 1e-9);
        assert!((p.amplitude - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_mutation_keeps_floor_and_bounds() {
        let mut rng = StdRng::seed_from_u64(11);
        for kind in [
            MutationType::Subtle,
            MutationType::Normal,
            MutationType::Bold,
            MutationType::Radical,
        ] {
            let p = plan(kind);
            let mut g = sparse_genome("p");
            for _ in 0..200 {
                g = mutate(&g, &p, &mut rng);
                assert!(g.active_count() >= MIN_ACTIVE_STRATEGIES);
                assert!((5..=75).contains(&g.risk.leverage));
                assert!((2..=15).contains(&g.consensus.min_agreeing));
                assert!(g.risk.atr_tp_multiplier >= 1.0 && g.risk.atr_tp_multiplier <= 5.0);
                assert!(g.betting.max_bet_percent >= g.betting.base_bet_percent);
                assert!(g.strategy_weights.iter().all(|w| (0.1..=2.0).contains(w)));
            }
        }
    }

    #[test]
    fn test_crossover_records_parents_and_keeps_floor() {
        let mut rng = StdRng::seed_from_u64(12);
        let p = plan(MutationType::Radical);
        let a = sparse_genome("a");
        let mut b = sparse_genome("b");
        b.strategy_mask = vec![false; STRATEGY_COUNT];
        for slot in [20, 25, 29] {
            b.strategy_mask[slot] = true;
        }
        for _ in 0..200 {
            let child = crossover(&a, &b, 0.5, &p, &mut rng);
            assert_eq!(child.parent_ids, vec!["a".to_string(), "b".to_string()]);
            assert!(child.active_count() >= MIN_ACTIVE_STRATEGIES);
        }
    }

    #[test]
    fn test_child_does_not_alias_parent() {
        let mut rng = StdRng::seed_from_u64(13);
        let parent = sample_genome();
        let snapshot = parent.clone();
        let _child = mutate(&parent, &plan(MutationType::Radical), &mut rng);
        assert_eq!(parent, snapshot);
    }

    #[test]
    fn test_perturbed_migrant_is_valid() {
        let mut rng = StdRng::seed_from_u64(14);
        let source = sparse_genome("best");
        for _ in 0..200 {
            let m = perturb_migrant(&source, &mut rng);
            assert!(m.active_count() >= MIN_ACTIVE_STRATEGIES);
            assert!((5..=75).contains(&m.risk.leverage));
            assert!(m.risk.atr_sl_multiplier >= 0.5 && m.risk.atr_sl_multiplier <= 3.0);
        }
    }
}
