//! Bot state - bankroll accounting and the open-position lifecycle
//!
//! A bot exclusively owns one genome. Settling a position removes it from the
//! open map before its PnL touches the bankroll, so a position can never be
//! counted twice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;

use crate::genome::Genome;
use crate::types::Direction;

/// Closed trades kept per bot
pub const TRADE_HISTORY_LIMIT: usize = 100;
/// PnL samples kept per bot (feeds Sharpe/Sortino)
pub const PNL_HISTORY_LIMIT: usize = 200;
/// Cycles a symbol is blocked after a losing trade
pub const LOSS_COOLDOWN_CYCLES: u64 = 10;
/// Floor for the running bet percentage after loss shrinkage
pub const MIN_BET_PERCENT: f64 = 1.0;

/// Position side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn from_direction(direction: Direction) -> Option<Self> {
        match direction {
            Direction::Long => Some(Side::Long),
            Direction::Short => Some(Side::Short),
            Direction::Neutral => None,
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            Side::Long => Direction::Long,
            Side::Short => Direction::Short,
        }
    }

    /// +1 for long, -1 for short
    pub fn sign(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// Exit reason for a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    TrailingStop,
    FlipExit,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::TakeProfit => write!(f, "TAKE_PROFIT"),
            ExitReason::StopLoss => write!(f, "STOP_LOSS"),
            ExitReason::TrailingStop => write!(f, "TRAILING_STOP"),
            ExitReason::FlipExit => write!(f, "FLIP_EXIT"),
        }
    }
}

/// Consensus that justified an entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsensusSnapshot {
    pub direction: Direction,
    pub agreeing: usize,
    pub opposing: usize,
    pub weighted_strength: f64,
    pub confidence: f64,
    /// Strongest contributing slots
    #[serde(default)]
    pub top_strategies: Vec<usize>,
}

/// Open leveraged position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub quantity: f64,
    pub leverage: u32,
    pub bet_amount: f64,
    pub take_profit: f64,
    /// Ratchets to breakeven, then trails
    pub stop_loss: f64,
    /// Trailing distance in price units (0 disables trailing)
    pub trailing_distance: f64,
    /// Best price seen in the position's favour
    pub high_water_mark: f64,
    #[serde(default)]
    pub breakeven_armed: bool,
    pub opened_at: DateTime<Utc>,
    #[serde(default)]
    pub opened_cycle: u64,
    pub consensus: ConsensusSnapshot,
}

impl Position {
    /// Leveraged return in percent at `exit_price`
    pub fn pnl_percent(&self, exit_price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        let price_diff = (exit_price - self.entry_price) * self.side.sign();
        price_diff / self.entry_price * 100.0 * self.leverage as f64
    }

    /// Favourable price move from entry (negative when underwater)
    pub fn favourable_move(&self, price: f64) -> f64 {
        (price - self.entry_price) * self.side.sign()
    }

    pub fn tp_distance(&self) -> f64 {
        (self.take_profit - self.entry_price).abs()
    }

    pub fn hit_take_profit(&self, price: f64) -> bool {
        match self.side {
            Side::Long => price >= self.take_profit,
            Side::Short => price <= self.take_profit,
        }
    }

    pub fn hit_stop(&self, price: f64) -> bool {
        match self.side {
            Side::Long => price <= self.stop_loss,
            Side::Short => price >= self.stop_loss,
        }
    }

    /// True once the stop sits at or beyond entry in the position's favour
    pub fn stop_in_profit(&self) -> bool {
        (self.stop_loss - self.entry_price) * self.side.sign() >= 0.0
    }
}

/// Closed trade, values rounded to cents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub bot_id: String,
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub exit_price: f64,
    pub leverage: u32,
    pub bet_amount: f64,
    pub pnl_percent: f64,
    pub pnl_value: f64,
    pub reason: ExitReason,
    pub cycle: u64,
    pub closed_at: DateTime<Utc>,
}

impl TradeRecord {
    pub fn is_win(&self) -> bool {
        self.pnl_value > 0.0
    }
}

/// Runtime state of one bot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotState {
    pub genome: Genome,
    pub bankroll: f64,
    pub initial_bankroll: f64,
    pub total_trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub win_streak: u32,
    pub loss_streak: u32,
    pub max_bankroll: f64,
    pub min_bankroll: f64,
    /// Worst peak-to-trough drawdown seen (%)
    pub max_drawdown: f64,
    pub trade_history: VecDeque<TradeRecord>,
    pub pnl_history: VecDeque<f64>,
    pub positions: BTreeMap<String, Position>,
    pub total_exposure: f64,
    /// symbol -> first cycle trading is allowed again
    pub cooldowns: HashMap<String, u64>,
    pub current_bet_percent: f64,
    pub is_alive: bool,
    pub death_count: u32,
    /// Cached fitness, refreshed by the arena
    #[serde(default)]
    pub fitness: f64,
    /// Goal milestone already written to memory
    #[serde(default)]
    pub goal_recorded: bool,
    pub born_at: DateTime<Utc>,
}

impl BotState {
    pub fn new(genome: Genome, initial_bankroll: f64) -> Self {
        let current_bet_percent = genome.betting.base_bet_percent;
        Self {
            genome,
            bankroll: initial_bankroll,
            initial_bankroll,
            total_trades: 0,
            wins: 0,
            losses: 0,
            win_streak: 0,
            loss_streak: 0,
            max_bankroll: initial_bankroll,
            min_bankroll: initial_bankroll,
            max_drawdown: 0.0,
            trade_history: VecDeque::new(),
            pnl_history: VecDeque::new(),
            positions: BTreeMap::new(),
            total_exposure: 0.0,
            cooldowns: HashMap::new(),
            current_bet_percent,
            is_alive: true,
            death_count: 0,
            fitness: 0.0,
            goal_recorded: false,
            born_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.genome.id
    }

    pub fn name(&self) -> &str {
        &self.genome.name
    }

    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            0.0
        } else {
            self.wins as f64 / self.total_trades as f64
        }
    }

    /// Bankroll as a multiple of the starting bankroll
    pub fn multiplier(&self) -> f64 {
        if self.initial_bankroll <= 0.0 {
            0.0
        } else {
            self.bankroll / self.initial_bankroll
        }
    }

    /// Current distance below the bankroll peak (%)
    pub fn current_drawdown(&self) -> f64 {
        if self.max_bankroll <= 0.0 {
            0.0
        } else {
            ((self.max_bankroll - self.bankroll) / self.max_bankroll * 100.0).max(0.0)
        }
    }

    /// Committed bets as a share of bankroll (%)
    pub fn exposure_percent(&self) -> f64 {
        if self.bankroll <= 0.0 {
            100.0
        } else {
            self.total_exposure / self.bankroll * 100.0
        }
    }

    pub fn is_bankrupt(&self) -> bool {
        self.bankroll <= 0.0
    }

    pub fn in_cooldown(&self, symbol: &str, cycle: u64) -> bool {
        self.cooldowns
            .get(symbol)
            .map(|until| cycle < *until)
            .unwrap_or(false)
    }

    /// Open a position and commit its bet to exposure
    pub fn open(&mut self, position: Position) {
        self.total_exposure += position.bet_amount;
        self.positions.insert(position.symbol.clone(), position);
    }

    /// Close the position on `symbol` at `exit_price`.
    ///
    /// Removes the position first, then applies PnL to bankroll (floored at 0),
    /// releases exposure, updates streaks, bet sizing, extrema and drawdown,
    /// and arms a cooldown after a loss. Returns `None` when no position is open.
    pub fn settle(
        &mut self,
        symbol: &str,
        exit_price: f64,
        reason: ExitReason,
        cycle: u64,
    ) -> Option<TradeRecord> {
        let position = self.positions.remove(symbol)?;

        let pnl_percent = position.pnl_percent(exit_price);
        let pnl_value = position.bet_amount * pnl_percent / 100.0;

        self.bankroll = (self.bankroll + pnl_value).max(0.0);
        self.total_exposure = (self.total_exposure - position.bet_amount).max(0.0);

        self.pnl_history.push_back(pnl_percent);
        while self.pnl_history.len() > PNL_HISTORY_LIMIT {
            self.pnl_history.pop_front();
        }
        self.total_trades += 1;

        let betting = &self.genome.betting;
        if pnl_value > 0.0 {
            self.wins += 1;
            self.win_streak += 1;
            self.loss_streak = 0;
            self.current_bet_percent =
                (self.current_bet_percent * betting.win_multiplier).min(betting.max_bet_percent);
        } else {
            self.losses += 1;
            self.loss_streak += 1;
            self.win_streak = 0;
            self.current_bet_percent =
                (self.current_bet_percent * betting.loss_multiplier).max(MIN_BET_PERCENT);
            if self.loss_streak >= betting.reset_after_losses {
                self.current_bet_percent = betting.base_bet_percent;
            }
            self.cooldowns
                .insert(symbol.to_string(), cycle + LOSS_COOLDOWN_CYCLES);
        }

        self.max_bankroll = self.max_bankroll.max(self.bankroll);
        self.min_bankroll = self.min_bankroll.min(self.bankroll);
        self.max_drawdown = self.max_drawdown.max(self.current_drawdown());

        let record = TradeRecord {
            bot_id: self.genome.id.clone(),
            symbol: position.symbol,
            side: position.side,
            entry_price: position.entry_price,
            exit_price,
            leverage: position.leverage,
            bet_amount: round2(position.bet_amount),
            pnl_percent: round2(pnl_percent),
            pnl_value: round2(pnl_value),
            reason,
            cycle,
            closed_at: Utc::now(),
        };
        self.trade_history.push_back(record.clone());
        while self.trade_history.len() > TRADE_HISTORY_LIMIT {
            self.trade_history.pop_front();
        }

        Some(record)
    }

    /// Drop expired cooldown entries
    pub fn prune_cooldowns(&mut self, cycle: u64) {
        self.cooldowns.retain(|_, until| *until > cycle);
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::tests::sample_genome;

    fn position(side: Side, entry: f64, tp: f64, sl: f64) -> Position {
        Position {
            symbol: "BTCUSDT".to_string(),
            side,
            entry_price: entry,
            quantity: 0.5,
            leverage: 10,
            bet_amount: 5.0,
            take_profit: tp,
            stop_loss: sl,
            trailing_distance: 0.0,
            high_water_mark: entry,
            breakeven_armed: false,
            opened_at: Utc::now(),
            opened_cycle: 1,
            consensus: ConsensusSnapshot::default(),
        }
    }

    #[test]
    fn test_settle_long_take_profit_scenario() {
        let mut bot = BotState::new(sample_genome(), 100.0);
        bot.open(position(Side::Long, 100.0, 102.0, 99.0));
        assert_eq!(bot.total_exposure, 5.0);

        let record = bot
            .settle("BTCUSDT", 102.0, ExitReason::TakeProfit, 7)
            .unwrap();

        assert!((record.pnl_percent - 20.0).abs() < 1e-9);
        assert!((record.pnl_value - 1.0).abs() < 1e-9);
        assert!((bot.bankroll - 101.0).abs() < 1e-9);
        assert!(bot.positions.is_empty());
        assert_eq!(bot.total_exposure, 0.0);
        assert_eq!(bot.wins, 1);
        assert_eq!(bot.win_streak, 1);
    }

    #[test]
    fn test_settle_all_sides_and_exits() {
        // (side, exit, reason, expected pnl%)
        let cases = [
            (Side::Long, 102.0, ExitReason::TakeProfit, 20.0),
            (Side::Long, 99.0, ExitReason::StopLoss, -10.0),
            (Side::Short, 98.0, ExitReason::TakeProfit, 20.0),
            (Side::Short, 101.0, ExitReason::StopLoss, -10.0),
        ];
        for (side, exit, reason, pnl_pct) in cases {
            let mut bot = BotState::new(sample_genome(), 100.0);
            bot.open(position(side, 100.0, 0.0, 0.0));
            let before = bot.bankroll;
            let record = bot.settle("BTCUSDT", exit, reason, 3).unwrap();
            let expected = 5.0 * pnl_pct / 100.0;
            assert!((bot.bankroll - (before + expected)).abs() < 1e-9, "{:?} {:?}", side, reason);
            assert!((record.pnl_percent - pnl_pct).abs() < 1e-9);
            assert!(!bot.positions.contains_key("BTCUSDT"));
        }
    }

    #[test]
    fn test_settle_missing_position_is_noop() {
        let mut bot = BotState::new(sample_genome(), 100.0);
        assert!(bot.settle("ETHUSDT", 10.0, ExitReason::StopLoss, 1).is_none());
        assert_eq!(bot.total_trades, 0);
        assert_eq!(bot.bankroll, 100.0);
    }

    #[test]
    fn test_loss_sets_cooldown_and_shrinks_bet() {
        let mut bot = BotState::new(sample_genome(), 100.0);
        bot.open(position(Side::Long, 100.0, 110.0, 95.0));
        bot.settle("BTCUSDT", 99.0, ExitReason::StopLoss, 20).unwrap();

        assert!(bot.in_cooldown("BTCUSDT", 29));
        assert!(!bot.in_cooldown("BTCUSDT", 30));
        assert!((bot.current_bet_percent - 3.0 * 0.8).abs() < 1e-9);
        assert_eq!(bot.loss_streak, 1);
        assert!(bot.max_drawdown > 0.0);
    }

    #[test]
    fn test_bet_resets_after_loss_streak() {
        let mut bot = BotState::new(sample_genome(), 1000.0);
        for cycle in 0..3 {
            bot.open(position(Side::Long, 100.0, 110.0, 95.0));
            bot.settle("BTCUSDT", 99.5, ExitReason::StopLoss, cycle).unwrap();
        }
        assert_eq!(bot.loss_streak, 3);
        assert_eq!(bot.current_bet_percent, bot.genome.betting.base_bet_percent);
    }

    #[test]
    fn test_bankroll_floors_at_zero() {
        let mut bot = BotState::new(sample_genome(), 1.0);
        let mut pos = position(Side::Long, 100.0, 110.0, 50.0);
        pos.leverage = 75;
        bot.open(pos);
        bot.settle("BTCUSDT", 80.0, ExitReason::StopLoss, 1).unwrap();
        assert_eq!(bot.bankroll, 0.0);
        assert!(bot.is_bankrupt());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut bot = BotState::new(sample_genome(), 1_000_000.0);
        for cycle in 0..(PNL_HISTORY_LIMIT as u64 + 20) {
            bot.open(position(Side::Long, 100.0, 110.0, 95.0));
            bot.settle("BTCUSDT", 100.5, ExitReason::TakeProfit, cycle).unwrap();
        }
        assert_eq!(bot.pnl_history.len(), PNL_HISTORY_LIMIT);
        assert_eq!(bot.trade_history.len(), TRADE_HISTORY_LIMIT);
    }
}
