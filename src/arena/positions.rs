//! Position lifecycle: sizing, entry geometry and per-cycle monitoring
//!
//! Settlement itself lives on `BotState::settle`; this module decides when a
//! position should close and with which reason.

use chrono::Utc;

use crate::bot::{BotState, ConsensusSnapshot, ExitReason, Position, Side};

/// Smallest bet the arena will place
pub const MIN_BET: f64 = 1.0;
/// Share of the TP distance after which the stop moves to breakeven
pub const BREAKEVEN_TRIGGER: f64 = 0.5;

/// Bet size for a new entry, or `None` when the bot has no room.
///
/// Base size is `bankroll x current bet% x risk multiplier`, floored at
/// `MIN_BET` and capped by the free (unexposed) bankroll.
pub fn size_bet(bot: &BotState, risk_multiplier: f64) -> Option<f64> {
    let risk = &bot.genome.risk;
    if bot.bankroll <= 0.0 || bot.positions.len() >= risk.max_open_positions {
        return None;
    }
    if bot.exposure_percent() >= risk.max_exposure_percent {
        return None;
    }
    let free = bot.bankroll - bot.total_exposure;
    if free < MIN_BET {
        return None;
    }
    let wanted = bot.bankroll * bot.current_bet_percent / 100.0 * risk_multiplier;
    Some(wanted.max(MIN_BET).min(free))
}

/// Build a position from ATR-scaled TP/SL/trailing distances
#[allow(clippy::too_many_arguments)]
pub fn build_position(
    bot: &BotState,
    symbol: &str,
    side: Side,
    price: f64,
    atr: f64,
    bet_amount: f64,
    cycle: u64,
    consensus: ConsensusSnapshot,
) -> Position {
    let risk = &bot.genome.risk;
    let atr = if atr > 0.0 { atr } else { price * 0.001 };
    let tp_distance = atr * risk.atr_tp_multiplier;
    let sl_distance = atr * risk.atr_sl_multiplier;
    let trailing_distance = if risk.trailing_stop_atr > 0.0 {
        atr * risk.trailing_stop_atr
    } else {
        0.0
    };
    let sign = side.sign();
    let leverage = risk.leverage;

    Position {
        symbol: symbol.to_string(),
        side,
        entry_price: price,
        quantity: if price > 0.0 {
            bet_amount * leverage as f64 / price
        } else {
            0.0
        },
        leverage,
        bet_amount,
        take_profit: price + sign * tp_distance,
        stop_loss: price - sign * sl_distance,
        trailing_distance,
        high_water_mark: price,
        breakeven_armed: false,
        opened_at: Utc::now(),
        opened_cycle: cycle,
        consensus,
    }
}

/// Advance one position against the latest price.
///
/// Ratchets the stop to breakeven past half the TP distance, trails it on new
/// favourable extremes, then checks TP, stop and the flip exit (opposing raw
/// signal count at or above `flip_threshold`; 0 disables it).
pub fn update_position(
    position: &mut Position,
    price: f64,
    opposing_signals: Option<usize>,
    flip_threshold: u32,
) -> Option<ExitReason> {
    let sign = position.side.sign();
    let profit = position.favourable_move(price);

    if profit > position.tp_distance() * BREAKEVEN_TRIGGER && !position.stop_in_profit() {
        position.stop_loss = position.entry_price;
        position.breakeven_armed = true;
    }

    if position.trailing_distance > 0.0 && (price - position.high_water_mark) * sign > 0.0 {
        position.high_water_mark = price;
        let candidate = price - sign * position.trailing_distance;
        if (candidate - position.stop_loss) * sign > 0.0 {
            position.stop_loss = candidate;
        }
    }

    if position.hit_take_profit(price) {
        return Some(ExitReason::TakeProfit);
    }
    if position.hit_stop(price) {
        let trailing_exit = position.trailing_distance > 0.0
            && position.stop_in_profit()
            && (position.stop_loss - position.entry_price) * sign > 0.0;
        return Some(if trailing_exit {
            ExitReason::TrailingStop
        } else {
            ExitReason::StopLoss
        });
    }
    if flip_threshold > 0 {
        if let Some(opposing) = opposing_signals {
            if opposing >= flip_threshold as usize {
                return Some(ExitReason::FlipExit);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::tests::sample_genome;

    fn long_at_100() -> (BotState, Position) {
        let bot = BotState::new(sample_genome(), 100.0);
        // atr 1: tp 2.0, sl 1.0, trailing 1.0
        let pos = build_position(
            &bot,
            "BTCUSDT",
            Side::Long,
            100.0,
            1.0,
            5.0,
            1,
            ConsensusSnapshot::default(),
        );
        (bot, pos)
    }

    #[test]
    fn test_entry_geometry() {
        let (_, pos) = long_at_100();
        assert_eq!(pos.take_profit, 102.0);
        assert_eq!(pos.stop_loss, 99.0);
        assert_eq!(pos.trailing_distance, 1.0);
        assert_eq!(pos.leverage, 20);
        assert!((pos.quantity - 1.0).abs() < 1e-9);

        let bot = BotState::new(sample_genome(), 100.0);
        let short = build_position(&bot, "ETHUSDT", Side::Short, 50.0, 0.5, 2.0, 1, Default::default());
        assert_eq!(short.take_profit, 49.0);
        assert_eq!(short.stop_loss, 50.5);
    }

    #[test]
    fn test_breakeven_then_trailing() {
        let (_, mut pos) = long_at_100();
        // 1.2 > half of tp distance 2.0: breakeven, then trailing lifts to 100.2
        assert_eq!(update_position(&mut pos, 101.2, None, 0), None);
        assert!(pos.breakeven_armed);
        assert!((pos.stop_loss - 100.2).abs() < 1e-9);
        assert_eq!(pos.high_water_mark, 101.2);

        // pullback does not move the stop
        assert_eq!(update_position(&mut pos, 100.8, None, 0), None);
        assert!((pos.stop_loss - 100.2).abs() < 1e-9);

        assert_eq!(
            update_position(&mut pos, 100.1, None, 0),
            Some(ExitReason::TrailingStop)
        );
    }

    #[test]
    fn test_take_profit_and_stop() {
        let (_, mut pos) = long_at_100();
        assert_eq!(update_position(&mut pos, 102.5, None, 0), Some(ExitReason::TakeProfit));

        let (_, mut pos) = long_at_100();
        assert_eq!(update_position(&mut pos, 98.9, None, 0), Some(ExitReason::StopLoss));
    }

    #[test]
    fn test_flip_exit() {
        let (_, mut pos) = long_at_100();
        assert_eq!(update_position(&mut pos, 100.1, Some(5), 6), None);
        assert_eq!(update_position(&mut pos, 100.1, Some(6), 6), Some(ExitReason::FlipExit));
        assert_eq!(update_position(&mut pos, 100.1, Some(20), 0), None);
    }

    #[test]
    fn test_bet_sizing_limits() {
        let mut bot = BotState::new(sample_genome(), 100.0);
        // 3% of 100
        assert!((size_bet(&bot, 1.0).unwrap() - 3.0).abs() < 1e-9);
        // floored at 1
        assert_eq!(size_bet(&bot, 0.1), Some(MIN_BET));

        bot.total_exposure = 60.0;
        assert!(size_bet(&bot, 1.0).is_none());

        bot.total_exposure = 0.0;
        bot.bankroll = 0.5;
        assert!(size_bet(&bot, 1.0).is_none());
    }
}
