//! Bot fitness
//!
//! fitness = sharpe*20 + sortino*10 + winRate*15 + min(returns*15, 20)
//!         + min(profitFactor*5, 15) + (1 - maxDrawdown/100)*15
//!         + consistency*5 + diversityBonus
//!
//! Zero below 3 trades. Ratios need at least 5 PnL samples and are clamped
//! to [-2, 5]; a flat positive history scores 3.

use crate::bot::BotState;

pub const MIN_TRADES: u32 = 3;
const MIN_RATIO_SAMPLES: usize = 5;
const RATIO_RANGE: (f64, f64) = (-2.0, 5.0);
const FLAT_POSITIVE_RATIO: f64 = 3.0;
const PROFIT_FACTOR_CAP: f64 = 10.0;
/// Trades at which consistency saturates
const CONSISTENCY_TRADES: f64 = 50.0;

/// Score a bot; `diversity_bonus` comes from the group's meta-evolution seed
pub fn calculate_fitness(bot: &BotState, diversity_bonus: f64) -> f64 {
    if bot.total_trades < MIN_TRADES {
        return 0.0;
    }
    let pnl: Vec<f64> = bot.pnl_history.iter().copied().collect();

    let win_rate = bot.win_rate();
    let returns = if bot.initial_bankroll > 0.0 {
        (bot.bankroll - bot.initial_bankroll) / bot.initial_bankroll
    } else {
        0.0
    };
    let drawdown_penalty = 1.0 - bot.max_drawdown / 100.0;
    let consistency = if bot.total_trades > 10 {
        (bot.total_trades as f64 / CONSISTENCY_TRADES).min(1.0)
    } else {
        0.5
    };

    sharpe_ratio(&pnl) * 20.0
        + sortino_ratio(&pnl) * 10.0
        + win_rate * 15.0
        + (returns * 15.0).min(20.0)
        + (profit_factor(&pnl) * 5.0).min(15.0)
        + drawdown_penalty * 15.0
        + consistency * 5.0
        + diversity_bonus
}

/// mean / stdev of the PnL history
pub fn sharpe_ratio(pnl: &[f64]) -> f64 {
    if pnl.len() < MIN_RATIO_SAMPLES {
        return 0.0;
    }
    let mean = mean(pnl);
    let variance = pnl.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / pnl.len() as f64;
    ratio(mean, variance.sqrt())
}

/// mean / downside deviation, the deviation taken over losing samples only
pub fn sortino_ratio(pnl: &[f64]) -> f64 {
    if pnl.len() < MIN_RATIO_SAMPLES {
        return 0.0;
    }
    let mean = mean(pnl);
    let downs: Vec<f64> = pnl.iter().copied().filter(|p| *p < 0.0).collect();
    if downs.is_empty() {
        return if mean > 0.0 { FLAT_POSITIVE_RATIO } else { 0.0 };
    }
    let downside = (downs.iter().map(|p| p * p).sum::<f64>() / downs.len() as f64).sqrt();
    ratio(mean, downside)
}

/// Gross wins over gross losses, capped at 10 (5 when there are no losses)
pub fn profit_factor(pnl: &[f64]) -> f64 {
    let wins: f64 = pnl.iter().filter(|p| **p > 0.0).sum();
    let losses: f64 = pnl.iter().filter(|p| **p < 0.0).sum::<f64>().abs();
    if losses == 0.0 {
        return if wins > 0.0 { 5.0 } else { 0.0 };
    }
    (wins / losses).min(PROFIT_FACTOR_CAP)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn ratio(mean: f64, deviation: f64) -> f64 {
    if deviation == 0.0 {
        if mean > 0.0 {
            FLAT_POSITIVE_RATIO
        } else {
            0.0
        }
    } else {
        (mean / deviation).clamp(RATIO_RANGE.0, RATIO_RANGE.1)
    }
}
