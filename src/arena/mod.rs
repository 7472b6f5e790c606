//! Group arena - five bots, nine seeds and one mutation engine
//!
//! One arena per group. Each cycle reads the shared signal batch, lets the
//! seeds reshape it, settles open positions, opens new ones on consensus and
//! replaces bankrupt bots in place, so the group always holds exactly five
//! bots. Every `evolution_interval` cycles (owned by the meta-evolution seed)
//! the weakest non-elite bot is culled and replaced by a child of two
//! tournament winners.

pub mod consensus;
pub mod personality;
pub mod positions;

pub use consensus::evaluate_consensus;
pub use personality::{genesis_genome, GroupPersonality, BOTS_PER_GROUP, BOT_NAME_POOL};

use anyhow::{ensure, Result};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::bot::{BotState, Side, TradeRecord};
use crate::evolution::{
    calculate_fitness, crossover, mutate, AdaptiveMutationEngine, DeathTriggerState,
    DnaVectorMemory, EvolutionSnapshot, MutationPlan, BOT_DIMENSION,
};
use crate::genome::{Genome, MIN_ACTIVE_STRATEGIES};
use crate::market::{CandleSource, PriceOracle, PATTERN_INTERVAL};
use crate::seeds::pattern::synthetic_candles;
use crate::seeds::{PatternRead, RiskContext, SeedBank, SeedGenomes, SeedStatus};
use crate::types::{Direction, GroupId, HigherTimeframe, MarketSignals, PoolSignal};
use personality::{child_name, genome_id};
use positions::{build_position, size_bet, update_position};

/// Weights of the seed ensemble that gates every entry
const CORRELATION_WEIGHT: f64 = 0.25;
const SENTIMENT_WEIGHT: f64 = 0.20;
const PATTERN_WEIGHT: f64 = 0.20;
const TEMPORAL_WEIGHT: f64 = 0.15;
const SYMBOL_WEIGHT: f64 = 0.20;
/// Ensemble threshold at full activity; rises by up to 0.3 as the group is paused
const BASE_TRADE_THRESHOLD: f64 = 0.6;
const PAUSE_THRESHOLD_SPAN: f64 = 0.3;
/// Candles fed to pattern detection
const PATTERN_CANDLES: usize = 10;
pub const MIN_PAUSE_MULTIPLIER: f64 = 0.1;

// ─────────────────────────────────────────────────────────────────
// Settings, context and reports
// ─────────────────────────────────────────────────────────────────

/// Per-arena knobs taken from the application config
#[derive(Debug, Clone)]
pub struct ArenaSettings {
    pub initial_bankroll: f64,
    pub goal_bankroll: f64,
    pub symbols: Vec<String>,
    pub price_timeout: Duration,
}

impl Default for ArenaSettings {
    fn default() -> Self {
        Self {
            initial_bankroll: 100.0,
            goal_bankroll: 10_000.0,
            symbols: ["BTCUSDT", "ETHUSDT", "SOLUSDT", "BNBUSDT", "XRPUSDT"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            price_timeout: Duration::from_secs(2),
        }
    }
}

/// Everything one cycle borrows from the community
pub struct CycleContext<'a> {
    pub signals: &'a [MarketSignals],
    pub prices: &'a dyn PriceOracle,
    pub candles: Option<&'a dyn CandleSource>,
    pub memory: &'a mut DnaVectorMemory,
    pub rng: &'a mut StdRng,
    pub now: DateTime<Utc>,
}

/// What happened in one group cycle
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub cycle: u64,
    /// Temporal seed had the hour masked out
    pub skipped: bool,
    pub opened: usize,
    pub closed: Vec<TradeRecord>,
    pub bankruptcies: usize,
    pub goals_reached: usize,
    pub evolved: bool,
}

/// Per-symbol view shared by every bot in a cycle
struct PreparedSymbol {
    symbol: String,
    signals: Vec<PoolSignal>,
    higher_tf: HigherTimeframe,
    pattern: PatternRead,
    atr: f64,
    weight: f64,
}

// ─────────────────────────────────────────────────────────────────
// Status and persistence records
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotSummary {
    pub id: String,
    pub name: String,
    pub group: GroupId,
    pub generation: u32,
    pub bankroll: f64,
    pub fitness: f64,
    pub trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub win_rate: f64,
    pub open_positions: usize,
    pub max_drawdown: f64,
    pub leverage: u32,
    pub active_strategies: usize,
    pub is_alive: bool,
}

impl BotSummary {
    fn from_bot(bot: &BotState, group: GroupId) -> Self {
        Self {
            id: bot.id().to_string(),
            name: bot.name().to_string(),
            group,
            generation: bot.genome.generation,
            bankroll: round2(bot.bankroll),
            fitness: round2(bot.fitness),
            trades: bot.total_trades,
            wins: bot.wins,
            losses: bot.losses,
            win_rate: bot.win_rate(),
            open_positions: bot.positions.len(),
            max_drawdown: round2(bot.max_drawdown),
            leverage: bot.genome.risk.leverage,
            active_strategies: bot.genome.active_count(),
            is_alive: bot.is_alive && !bot.is_bankrupt(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupStatus {
    pub group: GroupId,
    pub style: String,
    pub bankroll: f64,
    pub initial_bankroll: f64,
    pub group_fitness: f64,
    pub best_fitness: f64,
    pub generation: u32,
    pub cycle: u64,
    pub total_bots: usize,
    pub alive_bots: usize,
    pub pause_multiplier: f64,
    pub regime: String,
    pub total_deaths: u64,
    pub bots: Vec<BotSummary>,
    pub seeds: Vec<SeedStatus>,
}

/// Persisted form of one arena
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSnapshot {
    pub group: GroupId,
    pub generation: u32,
    pub cycle: u64,
    #[serde(default = "full_activity")]
    pub pause_multiplier: f64,
    pub bots: Vec<BotState>,
    pub seeds: SeedBank,
    #[serde(default)]
    pub mutation: DeathTriggerState,
}

fn full_activity() -> f64 {
    1.0
}

// ─────────────────────────────────────────────────────────────────
// GroupArena
// ─────────────────────────────────────────────────────────────────

pub struct GroupArena {
    group: GroupId,
    personality: GroupPersonality,
    settings: ArenaSettings,
    bots: Vec<BotState>,
    generation: u32,
    cycle: u64,
    seeds: SeedBank,
    mutation: AdaptiveMutationEngine,
    pause_multiplier: f64,
}

impl GroupArena {
    /// Fresh arena with five genesis bots
    pub fn new(group: GroupId, settings: ArenaSettings, rng: &mut StdRng) -> Self {
        let mut arena = Self {
            group,
            personality: GroupPersonality::for_group(group),
            seeds: SeedBank::new(group, &settings.symbols),
            settings,
            bots: Vec::with_capacity(BOTS_PER_GROUP),
            generation: 1,
            cycle: 0,
            mutation: AdaptiveMutationEngine::new(group),
            pause_multiplier: 1.0,
        };
        arena.initialize(rng);
        arena
    }

    /// Reset to genesis: new bots, fresh seeds and mutation state
    pub fn initialize(&mut self, rng: &mut StdRng) {
        self.bots = (0..BOTS_PER_GROUP)
            .map(|i| {
                let genome = genesis_genome(self.group, i, &self.settings.symbols, rng);
                BotState::new(genome, self.settings.initial_bankroll)
            })
            .collect();
        self.generation = 1;
        self.cycle = 0;
        self.seeds = SeedBank::new(self.group, &self.settings.symbols);
        self.mutation = AdaptiveMutationEngine::new(self.group);
        self.pause_multiplier = 1.0;
        info!(
            group = %self.group,
            style = self.personality.style,
            bots = self.bots.len(),
            "🌱 Group initialized"
        );
    }

    /// Rebuild an arena from persisted state, checking its structure first
    pub fn from_snapshot(snapshot: GroupSnapshot, settings: ArenaSettings) -> Result<Self> {
        ensure!(
            snapshot.bots.len() == BOTS_PER_GROUP,
            "group {} has {} bots, expected {}",
            snapshot.group,
            snapshot.bots.len(),
            BOTS_PER_GROUP
        );
        for bot in &snapshot.bots {
            ensure!(
                bot.genome.active_count() >= MIN_ACTIVE_STRATEGIES,
                "bot {} in group {} has only {} active strategies",
                bot.id(),
                snapshot.group,
                bot.genome.active_count()
            );
        }

        let mut seeds = snapshot.seeds;
        seeds.repair();
        let mut mutation = AdaptiveMutationEngine::new(snapshot.group);
        mutation.restore(snapshot.mutation);

        let mut bots = snapshot.bots;
        for bot in bots.iter_mut() {
            bot.genome.normalize();
        }

        Ok(Self {
            group: snapshot.group,
            personality: GroupPersonality::for_group(snapshot.group),
            settings,
            bots,
            generation: snapshot.generation.max(1),
            cycle: snapshot.cycle,
            seeds,
            mutation,
            pause_multiplier: snapshot
                .pause_multiplier
                .clamp(MIN_PAUSE_MULTIPLIER, 1.0),
        })
    }

    pub fn snapshot(&self) -> GroupSnapshot {
        GroupSnapshot {
            group: self.group,
            generation: self.generation,
            cycle: self.cycle,
            pause_multiplier: self.pause_multiplier,
            bots: self.bots.clone(),
            seeds: self.seeds.clone(),
            mutation: self.mutation.state().clone(),
        }
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn group(&self) -> GroupId {
        self.group
    }

    pub fn personality(&self) -> &GroupPersonality {
        &self.personality
    }

    pub fn bots(&self) -> &[BotState] {
        &self.bots
    }

    pub fn bots_mut(&mut self) -> &mut [BotState] {
        &mut self.bots
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn seeds(&self) -> &SeedBank {
        &self.seeds
    }

    pub fn mutation_engine(&self) -> &AdaptiveMutationEngine {
        &self.mutation
    }

    pub fn pause_multiplier(&self) -> f64 {
        self.pause_multiplier
    }

    pub fn set_pause_multiplier(&mut self, multiplier: f64) {
        self.pause_multiplier = multiplier.clamp(MIN_PAUSE_MULTIPLIER, 1.0);
    }

    /// Ensemble score a trade must beat: 0.6 at full activity, up to 0.9 paused
    pub fn trade_threshold(&self) -> f64 {
        BASE_TRADE_THRESHOLD + (1.0 - self.pause_multiplier) * PAUSE_THRESHOLD_SPAN
    }

    pub fn group_bankroll(&self) -> f64 {
        self.bots.iter().map(|b| b.bankroll).sum()
    }

    pub fn initial_bankroll(&self) -> f64 {
        self.settings.initial_bankroll * BOTS_PER_GROUP as f64
    }

    fn alive(&self) -> Vec<usize> {
        (0..self.bots.len())
            .filter(|i| self.bots[*i].is_alive && !self.bots[*i].is_bankrupt())
            .collect()
    }

    /// Mean fitness of live bots, used to rank groups for migration
    pub fn group_fitness(&self) -> f64 {
        let alive = self.alive();
        if alive.is_empty() {
            return 0.0;
        }
        alive.iter().map(|i| self.bots[*i].fitness).sum::<f64>() / alive.len() as f64
    }

    /// Best live-bot fitness, used for stagnation tracking
    pub fn best_fitness(&self) -> f64 {
        self.alive()
            .iter()
            .map(|i| self.bots[*i].fitness)
            .fold(0.0, f64::max)
    }

    pub fn best_bot(&self) -> Option<&BotState> {
        self.alive()
            .into_iter()
            .map(|i| &self.bots[i])
            .max_by(|a, b| a.fitness.total_cmp(&b.fitness))
    }

    pub fn best_genome(&self) -> Option<Genome> {
        self.best_bot().map(|b| b.genome.clone())
    }

    /// Recompute every bot's fitness, diversity bonus included
    pub fn refresh_fitness(&mut self) {
        let masks: Vec<Vec<bool>> = self.bots.iter().map(|b| b.genome.strategy_mask.clone()).collect();
        for i in 0..self.bots.len() {
            let others: Vec<&[bool]> = masks
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, m)| m.as_slice())
                .collect();
            let bonus = self
                .seeds
                .meta_evolution
                .diversity_bonus(&self.bots[i].genome.strategy_mask, &others);
            let fitness = calculate_fitness(&self.bots[i], bonus);
            self.bots[i].fitness = fitness;
        }
    }

    // ── Cycle ────────────────────────────────────────────────────

    /// Run one cycle against the shared signal batch
    pub async fn execute_cycle(&mut self, ctx: &mut CycleContext<'_>) -> CycleReport {
        self.cycle += 1;
        let mut report = CycleReport {
            cycle: self.cycle,
            ..Default::default()
        };

        let temporal = self.seeds.temporal_weight(ctx.now);
        if temporal <= 0.0 {
            debug!(group = %self.group, cycle = self.cycle, "🌙 Temporal seed inactive, cycle skipped");
            report.skipped = true;
            return report;
        }

        self.seeds.market_regime.classify(ctx.signals);
        if !ctx.signals.is_empty() {
            let n = ctx.signals.len() as f64;
            let avg_price = ctx.signals.iter().map(|m| m.current_price).sum::<f64>() / n;
            let avg_volume = ctx
                .signals
                .iter()
                .map(|m| (m.summary.long_count + m.summary.short_count) as f64)
                .sum::<f64>()
                / n;
            self.seeds.sentiment.update(avg_price, avg_volume);
        }
        for ms in ctx.signals {
            self.seeds.correlation.update(&ms.symbol, crowd_direction(ms));
        }
        self.seeds
            .symbol_selection
            .maybe_rotate(self.cycle, &mut *ctx.rng);

        let prepared = self.prepare_symbols(ctx);

        for i in 0..self.bots.len() {
            if !self.bots[i].is_alive {
                continue;
            }
            self.bots[i].prune_cooldowns(self.cycle);
            self.monitor_positions(i, ctx, &mut report).await;

            if self.bots[i].is_bankrupt() {
                self.handle_bankrupt(i, ctx);
                report.bankruptcies += 1;
                continue;
            }
            if self.bots[i].bankroll >= self.settings.goal_bankroll {
                if self.handle_goal(i, ctx) {
                    report.goals_reached += 1;
                }
                continue;
            }
            report.opened += self.try_entries(i, &prepared, temporal, ctx).await;
        }

        self.refresh_fitness();

        if self.cycle % self.seeds.meta_evolution.evolution_interval() == 0 {
            report.evolved = self.intra_group_evolution(ctx);
        }
        report
    }

    fn prepare_symbols(&mut self, ctx: &CycleContext<'_>) -> Vec<PreparedSymbol> {
        let mut prepared = Vec::new();
        for ms in ctx.signals {
            if !self.seeds.symbol_selection.is_eligible(&ms.symbol) {
                continue;
            }
            let mut signals = self
                .seeds
                .strategy_param
                .process(&ms.signals, &ms.higher_tf);
            self.seeds.market_regime.apply_boosts(&mut signals);

            let atr = ms
                .atr14_5m
                .or(ms.atr14)
                .filter(|a| *a > 0.0)
                .unwrap_or(ms.current_price * 0.001);
            let candles = ctx
                .candles
                .and_then(|c| c.candles(&ms.symbol, PATTERN_INTERVAL))
                .filter(|c| c.len() >= PATTERN_CANDLES)
                .map(|c| c[c.len() - PATTERN_CANDLES..].to_vec())
                .unwrap_or_else(|| synthetic_candles(ms.current_price, atr, crowd_direction(ms)));
            let pattern = self
                .seeds
                .pattern
                .analyze(&ms.symbol, &candles, ms.current_price);

            prepared.push(PreparedSymbol {
                symbol: ms.symbol.clone(),
                signals,
                higher_tf: ms.higher_tf.clone(),
                pattern,
                atr,
                weight: self.seeds.symbol_selection.weight(&ms.symbol),
            });
        }
        prepared
    }

    async fn monitor_positions(
        &mut self,
        i: usize,
        ctx: &mut CycleContext<'_>,
        report: &mut CycleReport,
    ) {
        let open: Vec<(String, Side)> = self.bots[i]
            .positions
            .values()
            .map(|p| (p.symbol.clone(), p.side))
            .collect();

        for (symbol, side) in open {
            let Some(price) = quote(ctx.prices, &symbol, self.settings.price_timeout).await else {
                continue;
            };
            let opposing = ctx
                .signals
                .iter()
                .find(|m| m.symbol == symbol)
                .map(|m| m.opposing_count(side.direction()));

            let bot = &mut self.bots[i];
            let flip = bot.genome.risk.flip_exit_threshold;
            let Some(position) = bot.positions.get_mut(&symbol) else {
                continue;
            };
            let Some(reason) = update_position(position, price, opposing, flip) else {
                continue;
            };
            if let Some(record) = bot.settle(&symbol, price, reason, self.cycle) {
                debug!(
                    group = %self.group,
                    bot = %bot.genome.name,
                    symbol = %record.symbol,
                    side = %record.side,
                    reason = %record.reason,
                    pnl = record.pnl_value,
                    bankroll = bot.bankroll,
                    "{} Position closed",
                    if record.is_win() { "💰" } else { "🔻" }
                );
                self.seeds
                    .record_trade(&symbol, record.is_win(), record.pnl_percent, self.cycle);
                report.closed.push(record);
            }
        }
    }

    async fn try_entries(
        &mut self,
        i: usize,
        prepared: &[PreparedSymbol],
        temporal: f64,
        ctx: &mut CycleContext<'_>,
    ) -> usize {
        let mut opened = 0;
        for prep in prepared {
            let bot = &self.bots[i];
            if bot.positions.contains_key(&prep.symbol)
                || bot.in_cooldown(&prep.symbol, self.cycle)
                || bot.positions.len() >= bot.genome.risk.max_open_positions
            {
                continue;
            }
            let Some(consensus) = evaluate_consensus(&bot.genome, &prep.signals, &prep.higher_tf)
            else {
                continue;
            };
            let direction = consensus.direction;
            let Some(side) = Side::from_direction(direction) else {
                continue;
            };

            let sentiment = self.seeds.sentiment.read(direction);
            if !sentiment.should_trade {
                debug!(group = %self.group, symbol = %prep.symbol, band = ?sentiment.band, "🚫 Sentiment veto");
                continue;
            }
            let correlation = self.seeds.correlation.modifier(&prep.symbol, direction);
            let ensemble = CORRELATION_WEIGHT * correlation
                + SENTIMENT_WEIGHT * sentiment.modifier
                + PATTERN_WEIGHT * pattern_modifier(&prep.pattern, direction)
                + TEMPORAL_WEIGHT * temporal
                + SYMBOL_WEIGHT * prep.weight;
            if ensemble <= self.trade_threshold() {
                continue;
            }

            let risk_multiplier = self.seeds.risk_adapt.multiplier(&RiskContext {
                drawdown_percent: bot.current_drawdown(),
                win_streak: bot.win_streak,
                loss_streak: bot.loss_streak,
                bankroll: bot.bankroll,
                initial_bankroll: bot.initial_bankroll,
                high_volatility: self.seeds.market_regime.is_high_volatility(),
            });
            let Some(bet) = size_bet(bot, risk_multiplier) else {
                continue;
            };
            let Some(price) = quote(ctx.prices, &prep.symbol, self.settings.price_timeout).await
            else {
                continue;
            };

            let position = build_position(
                &self.bots[i],
                &prep.symbol,
                side,
                price,
                prep.atr,
                bet,
                self.cycle,
                consensus,
            );
            debug!(
                group = %self.group,
                bot = %self.bots[i].genome.name,
                symbol = %prep.symbol,
                side = %side,
                bet = position.bet_amount,
                leverage = position.leverage,
                tp = position.take_profit,
                sl = position.stop_loss,
                "📈 Position opened"
            );
            self.bots[i].open(position);
            opened += 1;
        }
        opened
    }

    // ── Lifecycle transitions ────────────────────────────────────

    fn handle_bankrupt(&mut self, i: usize, ctx: &mut CycleContext<'_>) {
        let bot = &mut self.bots[i];
        bot.death_count += 1;
        info!(
            group = %self.group,
            bot = %bot.genome.name,
            generation = bot.genome.generation,
            trades = bot.total_trades,
            "💀 Bot bankrupt"
        );
        ctx.memory
            .record_experience(bot, bot.fitness, false, 0, self.group);
        self.replace_bot(i, ctx);
    }

    /// Record the goal once; the bot keeps managing its open positions.
    /// Returns true the first time.
    fn handle_goal(&mut self, i: usize, ctx: &mut CycleContext<'_>) -> bool {
        let bot = &mut self.bots[i];
        if bot.goal_recorded {
            return false;
        }
        let multiple = bot.multiplier();
        let milestone = if multiple >= 10.0 {
            10
        } else if multiple >= 5.0 {
            5
        } else if multiple >= 3.0 {
            3
        } else {
            2
        };
        ctx.memory
            .record_experience(bot, bot.fitness, true, milestone, self.group);
        bot.goal_recorded = true;
        info!(
            group = %self.group,
            bot = %bot.genome.name,
            bankroll = bot.bankroll,
            "🏆 Bot reached the goal bankroll"
        );
        true
    }

    fn next_plan(&mut self, rng: &mut StdRng) -> MutationPlan {
        let kind = self
            .mutation
            .select_mutation_type(self.cycle, self.best_fitness(), rng);
        MutationPlan::new(kind, &self.seeds.meta_evolution)
    }

    /// Stamp identity on a freshly bred genome
    fn stamp_child(&mut self, mut child: Genome, tag: &str) -> Genome {
        self.generation += 1;
        child.generation = self.generation;
        child.id = genome_id(self.group, &format!("{}{}", tag, self.generation));
        child.name = child_name(self.generation);
        child.normalize();
        child
    }

    /// Replace the bot at `i` in place after a death
    fn replace_bot(&mut self, i: usize, ctx: &mut CycleContext<'_>) {
        self.mutation.record_death(self.cycle);

        let mut survivors: Vec<usize> = self.alive().into_iter().filter(|j| *j != i).collect();
        if survivors.is_empty() {
            let genome = genesis_genome(self.group, 0, &self.settings.symbols, &mut *ctx.rng);
            warn!(group = %self.group, "🌱 Whole group dead, reseeding from genesis");
            self.bots[i] = BotState::new(genome, self.settings.initial_bankroll);
            return;
        }
        survivors.sort_by(|a, b| self.bots[*b].fitness.total_cmp(&self.bots[*a].fitness));

        let plan = self.next_plan(ctx.rng);
        let best = &self.bots[survivors[0]];
        let child = match survivors.get(1) {
            Some(second) if best.fitness > 0.0 => crossover(
                &best.genome,
                &self.bots[*second].genome,
                self.seeds.meta_evolution.crossover_blend(),
                &plan,
                &mut *ctx.rng,
            ),
            _ => mutate(&best.genome, &plan, &mut *ctx.rng),
        };
        let child = ctx.memory.guide_mutation(&child, &mut *ctx.rng);
        let child = self.stamp_child(child, "gen");

        info!(
            group = %self.group,
            child = %child.name,
            generation = child.generation,
            mutation = %plan.kind,
            "🔁 Bankrupt bot replaced"
        );
        self.bots[i] = BotState::new(child, self.settings.initial_bankroll);
        self.mutation.record_evolution(self.cycle);
    }

    fn tournament(&self, pool: &[usize], size: usize, best: bool, rng: &mut StdRng) -> Option<usize> {
        let mut shuffled = pool.to_vec();
        shuffled.shuffle(rng);
        shuffled.truncate(size.max(1));
        let by_fitness = |a: &usize, b: &usize| self.bots[*a].fitness.total_cmp(&self.bots[*b].fitness);
        if best {
            shuffled.into_iter().max_by(by_fitness)
        } else {
            shuffled.into_iter().min_by(by_fitness)
        }
    }

    /// Cull one non-elite bot by tournament and breed its replacement from
    /// two tournament winners; then evolve all nine seeds. Needs at least
    /// three live bots.
    pub fn intra_group_evolution(&mut self, ctx: &mut CycleContext<'_>) -> bool {
        let alive = self.alive();
        if alive.len() < 3 {
            return false;
        }
        self.refresh_fitness();

        let meta = &self.seeds.meta_evolution;
        let size = meta.tournament_size(alive.len());
        let elites = meta.elite_count(alive.len());
        let mut ranked = alive.clone();
        ranked.sort_by(|a, b| self.bots[*b].fitness.total_cmp(&self.bots[*a].fitness));
        let cull_pool: Vec<usize> = ranked.iter().skip(elites).copied().collect();

        let Some(worst) = self.tournament(&cull_pool, size, false, ctx.rng) else {
            return false;
        };
        let rest: Vec<usize> = alive.iter().copied().filter(|j| *j != worst).collect();
        let Some(p1) = self.tournament(&rest, size, true, ctx.rng) else {
            return false;
        };
        let rest: Vec<usize> = rest.into_iter().filter(|j| *j != p1).collect();
        let Some(p2) = self.tournament(&rest, size, true, ctx.rng) else {
            return false;
        };

        self.mutation.record_death(self.cycle);
        let culled_fitness = self.bots[worst].fitness;
        ctx.memory
            .record_experience(&self.bots[worst], culled_fitness, true, 0, self.group);
        let parent_avg = (self.bots[p1].fitness + self.bots[p2].fitness) / 2.0;

        let plan = self.next_plan(ctx.rng);
        let child = crossover(
            &self.bots[p1].genome,
            &self.bots[p2].genome,
            self.seeds.meta_evolution.crossover_blend(),
            &plan,
            &mut *ctx.rng,
        );
        let child = ctx.memory.guide_mutation(&child, &mut *ctx.rng);
        let child = self.stamp_child(child, "evo-gen");

        info!(
            group = %self.group,
            culled = %self.bots[worst].genome.name,
            culled_fitness,
            parents = %format!("{} x {}", self.bots[p1].genome.name, self.bots[p2].genome.name),
            child = %child.name,
            mutation = %plan.kind,
            "🧬 Intra-group evolution"
        );
        self.bots[worst] = BotState::new(child, self.settings.initial_bankroll);

        self.seeds
            .meta_evolution
            .record_child_performance(culled_fitness, parent_avg);
        self.mutation.record_evolution(self.cycle);
        self.seeds.evolve_all(&mut *ctx.rng);
        true
    }

    // ── Inter-group hooks ────────────────────────────────────────

    /// Swap the worst live bot for a migrant genome, keeping five bots.
    /// The removed bot is recorded as a death and a memory experience.
    pub fn replace_worst_with_migrant(
        &mut self,
        migrant: Genome,
        memory: &mut DnaVectorMemory,
    ) -> Option<BotState> {
        self.refresh_fitness();
        let worst = self
            .alive()
            .into_iter()
            .min_by(|a, b| self.bots[*a].fitness.total_cmp(&self.bots[*b].fitness))?;

        self.mutation.record_death(self.cycle);
        let removed = self.bots[worst].clone();
        memory.record_experience(&removed, removed.fitness, false, 0, self.group);

        let mut genome = migrant;
        genome.id = genome_id(self.group, "migrant");
        genome.normalize();
        self.bots[worst] = BotState::new(genome, self.settings.initial_bankroll);
        Some(removed)
    }

    /// Queue donor seed genomes for the next seed evolution
    pub fn accept_seed_donor(&mut self, donor: SeedGenomes) {
        self.seeds.accept_donor(donor);
    }

    pub fn boost_mutation(&mut self, factor: f64) {
        self.seeds.meta_evolution.boost_mutation_rates(factor);
    }

    pub fn set_evolution_interval(&mut self, cycles: u64) {
        self.seeds.meta_evolution.set_evolution_interval(cycles);
    }

    // ── Reporting ────────────────────────────────────────────────

    pub fn bot_summaries(&self) -> Vec<BotSummary> {
        self.bots
            .iter()
            .map(|b| BotSummary::from_bot(b, self.group))
            .collect()
    }

    pub fn status(&self) -> GroupStatus {
        GroupStatus {
            group: self.group,
            style: self.personality.style.to_string(),
            bankroll: round2(self.group_bankroll()),
            initial_bankroll: self.initial_bankroll(),
            group_fitness: round2(self.group_fitness()),
            best_fitness: round2(self.best_fitness()),
            generation: self.generation,
            cycle: self.cycle,
            total_bots: self.bots.len(),
            alive_bots: self.alive().len(),
            pause_multiplier: self.pause_multiplier,
            regime: self.seeds.market_regime.current().to_string(),
            total_deaths: self.mutation.state().total_deaths,
            bots: self.bot_summaries(),
            seeds: self.seeds.statuses(),
        }
    }

    /// One registry entry per seed plus the best bot genome
    pub fn registry_snapshots(&self, cycle: u64) -> Vec<(String, EvolutionSnapshot)> {
        let mut out: Vec<(String, EvolutionSnapshot)> = self
            .seeds
            .statuses()
            .into_iter()
            .map(|s| {
                (
                    s.name.clone(),
                    EvolutionSnapshot {
                        cycle,
                        group: self.group,
                        generation: s.generation,
                        fitness: s.fitness,
                        fingerprint: s.fingerprint,
                    },
                )
            })
            .collect();
        if let Some(best) = self.best_bot() {
            out.push((
                BOT_DIMENSION.to_string(),
                EvolutionSnapshot {
                    cycle,
                    group: self.group,
                    generation: best.genome.generation,
                    fitness: best.fitness,
                    fingerprint: best.genome.fingerprint(),
                },
            ));
        }
        out
    }
}

/// Price with a timeout; a miss or a non-positive quote means skip
async fn quote(prices: &dyn PriceOracle, symbol: &str, timeout: Duration) -> Option<f64> {
    match tokio::time::timeout(timeout, prices.get_price(symbol)).await {
        Ok(Some(price)) if price > 0.0 => Some(price),
        Ok(_) => None,
        Err(_) => {
            warn!(symbol = %symbol, timeout_ms = timeout.as_millis() as u64, "⏱️ Price lookup timed out");
            None
        }
    }
}

/// Side with strictly more raw signals, neutral on a tie
fn crowd_direction(ms: &MarketSignals) -> Direction {
    use std::cmp::Ordering;
    match ms.summary.long_count.cmp(&ms.summary.short_count) {
        Ordering::Greater => Direction::Long,
        Ordering::Less => Direction::Short,
        Ordering::Equal => Direction::Neutral,
    }
}

/// Pattern modifier seen from the trade's side: a bias against the trade
/// inverts the boost
fn pattern_modifier(read: &PatternRead, direction: Direction) -> f64 {
    if read.bias != Direction::Neutral && read.bias == direction.opposite() && read.modifier > 0.0 {
        (1.0 / read.modifier).clamp(0.6, 1.5)
    } else {
        read.modifier
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::{ConsensusSnapshot, ExitReason, Position};
    use crate::market::SimulatedMarket;
    use rand::SeedableRng;

    fn settings() -> ArenaSettings {
        ArenaSettings {
            symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            ..Default::default()
        }
    }

    fn open_long(bot: &mut BotState, symbol: &str, entry: f64, bet: f64) {
        bot.open(Position {
            symbol: symbol.to_string(),
            side: Side::Long,
            entry_price: entry,
            quantity: 1.0,
            leverage: 50,
            bet_amount: bet,
            take_profit: entry * 1.5,
            stop_loss: entry * 0.5,
            trailing_distance: 0.0,
            high_water_mark: entry,
            breakeven_armed: false,
            opened_at: Utc::now(),
            opened_cycle: 0,
            consensus: ConsensusSnapshot::default(),
        });
    }

    #[test]
    fn test_new_arena_has_five_genesis_bots() {
        let mut rng = StdRng::seed_from_u64(1);
        let arena = GroupArena::new(GroupId::Gamma, settings(), &mut rng);
        assert_eq!(arena.bots().len(), BOTS_PER_GROUP);
        assert_eq!(arena.generation(), 1);
        assert!((arena.group_bankroll() - 500.0).abs() < 1e-9);
        assert_eq!(arena.status().style, "Balanced Multi-Strategy");
    }

    #[test]
    fn test_pause_multiplier_and_threshold() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut arena = GroupArena::new(GroupId::Alpha, settings(), &mut rng);
        assert!((arena.trade_threshold() - 0.6).abs() < 1e-9);
        arena.set_pause_multiplier(0.3);
        assert!((arena.trade_threshold() - 0.81).abs() < 1e-9);
        arena.set_pause_multiplier(0.0);
        assert_eq!(arena.pause_multiplier(), MIN_PAUSE_MULTIPLIER);
    }

    #[tokio::test]
    async fn test_bankruptcies_keep_five_bots() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut arena = GroupArena::new(GroupId::Beta, settings(), &mut rng);
        let market = SimulatedMarket::new(&settings().symbols, 0.004, Some(3));
        let mut memory = DnaVectorMemory::new();

        // three bots go all-in long, then the price halves
        let price = market.get_price("BTCUSDT").await.unwrap();
        for bot in arena.bots_mut().iter_mut().take(3) {
            let bankroll = bot.bankroll;
            open_long(bot, "BTCUSDT", price, bankroll);
        }
        market.set_price("BTCUSDT", price * 0.45);

        let signals = Vec::new();
        let mut ctx = CycleContext {
            signals: &signals,
            prices: &market,
            candles: None,
            memory: &mut memory,
            rng: &mut rng,
            // 14:00 UTC is active in the default hour mask
            now: "2024-01-03T14:00:00Z".parse().unwrap(),
        };
        let report = arena.execute_cycle(&mut ctx).await;

        assert_eq!(report.bankruptcies, 3);
        assert_eq!(report.closed.len(), 3);
        assert!(report.closed.iter().all(|t| t.reason == ExitReason::StopLoss));
        assert_eq!(arena.bots().len(), BOTS_PER_GROUP);
        assert!(arena.bots().iter().all(|b| b.bankroll > 0.0));
        assert_eq!(arena.mutation_engine().state().total_deaths, 3);
        assert_eq!(memory.len(), 3);
        // two survivors: every replacement is bred, never genesis
        assert_eq!(arena.generation(), 4);
    }

    #[test]
    fn test_intra_group_evolution_respects_elites() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut arena = GroupArena::new(GroupId::Omega, settings(), &mut rng);
        let mut memory = DnaVectorMemory::new();
        let market = SimulatedMarket::new(&settings().symbols, 0.004, Some(4));

        // give the bots distinct track records
        for (k, bot) in arena.bots_mut().iter_mut().enumerate() {
            for t in 0..6 {
                open_long(bot, "BTCUSDT", 100.0, 2.0);
                let exit = if t % 2 == 0 { 100.0 + k as f64 } else { 99.5 };
                bot.settle("BTCUSDT", exit, ExitReason::TakeProfit, t).unwrap();
            }
        }
        arena.refresh_fitness();
        let best_id = arena.best_bot().unwrap().id().to_string();

        let signals = Vec::new();
        let mut ctx = CycleContext {
            signals: &signals,
            prices: &market,
            candles: None,
            memory: &mut memory,
            rng: &mut rng,
            now: Utc::now(),
        };
        assert!(arena.intra_group_evolution(&mut ctx));

        assert_eq!(arena.bots().len(), BOTS_PER_GROUP);
        assert!(arena.bots().iter().any(|b| b.id() == best_id));
        assert!(arena.bots().iter().any(|b| b.genome.parent_ids.len() == 2));
        assert_eq!(memory.len(), 1);
        assert!(arena.seeds().statuses().iter().all(|s| s.generation == 2));
    }

    #[test]
    fn test_migrant_replaces_worst() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut arena = GroupArena::new(GroupId::Delta, settings(), &mut rng);
        let donor = GroupArena::new(GroupId::Alpha, settings(), &mut rng);
        let mut memory = DnaVectorMemory::new();

        let migrant = donor.bots()[0].genome.clone();
        let removed = arena
            .replace_worst_with_migrant(migrant.clone(), &mut memory)
            .unwrap();

        assert_eq!(arena.bots().len(), BOTS_PER_GROUP);
        assert!(arena.bots().iter().all(|b| b.id() != removed.id()));
        let arrived = arena
            .bots()
            .iter()
            .find(|b| b.id().starts_with("eco-DELTA-migrant-"))
            .unwrap();
        assert_eq!(arrived.genome.strategy_mask, migrant.strategy_mask);
        assert_eq!(memory.len(), 1);
    }

    #[test]
    fn test_snapshot_round_trip_and_validation() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut arena = GroupArena::new(GroupId::Gamma, settings(), &mut rng);
        arena.set_pause_multiplier(0.3);
        let snapshot = arena.snapshot();

        let json = serde_json::to_string(&snapshot).unwrap();
        let back: GroupSnapshot = serde_json::from_str(&json).unwrap();
        let restored = GroupArena::from_snapshot(back, settings()).unwrap();
        assert_eq!(restored.pause_multiplier(), 0.3);
        assert_eq!(restored.bots().len(), BOTS_PER_GROUP);
        assert_eq!(restored.bots()[0].id(), arena.bots()[0].id());

        let mut short = arena.snapshot();
        short.bots.pop();
        assert!(GroupArena::from_snapshot(short, settings()).is_err());

        let mut broken = arena.snapshot();
        broken.bots[0].genome.strategy_mask = vec![false; crate::types::STRATEGY_COUNT];
        assert!(GroupArena::from_snapshot(broken, settings()).is_err());
    }

    #[test]
    fn test_pattern_modifier_inverts_against_trade() {
        let read = PatternRead {
            bias: Direction::Short,
            modifier: 1.25,
            ..Default::default()
        };
        assert!((pattern_modifier(&read, Direction::Short) - 1.25).abs() < 1e-9);
        assert!((pattern_modifier(&read, Direction::Long) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_pattern_modifier_opposing_bias_is_clamped() {
        let strong = PatternRead {
            bias: Direction::Long,
            modifier: 2.0,
            ..Default::default()
        };
        // against a strong long read the short trade shrinks, but no lower than 0.6
        assert!((pattern_modifier(&strong, Direction::Short) - 0.6).abs() < 1e-9);
        assert!((pattern_modifier(&strong, Direction::Long) - 2.0).abs() < 1e-9);

        let weak = PatternRead {
            bias: Direction::Long,
            modifier: 0.5,
            ..Default::default()
        };
        assert!((pattern_modifier(&weak, Direction::Short) - 1.5).abs() < 1e-9);

        let neutral = PatternRead {
            bias: Direction::Neutral,
            modifier: 0.7,
            ..Default::default()
        };
        assert!((pattern_modifier(&neutral, Direction::Long) - 0.7).abs() < 1e-9);
        assert!((pattern_modifier(&neutral, Direction::Short) - 0.7).abs() < 1e-9);
    }
}
