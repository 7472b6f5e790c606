//! Community module - five group arenas under one master cycle
//!
//! The ecosystem owns every arena plus the community-wide services: the
//! milestone tracker, DNA memory, evolution registry, hall of fame and the
//! oracle client. One cycle feeds a single shared signal batch to all five
//! groups, then runs the periodic community steps (migration, oracle,
//! pressure, registry). Scheduling lives in `runner`.

pub mod hall_of_fame;
pub mod milestones;
pub mod runner;

pub use hall_of_fame::{HallOfFame, HallOfFameEntry};
pub use milestones::{
    BotBalance, GroupBalance, MilestoneEvent, MilestoneInput, MilestoneLevel, MilestoneTracker,
};
pub use runner::{CycleGate, CycleGuard, EcosystemRunner};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::arena::{
    ArenaSettings, BotSummary, CycleContext, CycleReport, GroupArena, GroupSnapshot, GroupStatus,
    BOTS_PER_GROUP,
};
use crate::evolution::{perturb_migrant, DnaVectorMemory, EvolutionRegistry, MemoryStats};
use crate::market::{CandleSource, PriceOracle, SignalProvider, SimulatedMarket};
use crate::oracle::{
    ConsultReason, DnaBrief, GroupBrief, OracleClient, OracleContext, OracleDecision, OracleLog,
    Recommendation,
};
use crate::persistence::{Document, JournalRow, JsonStore, TradeJournal};
use crate::types::GroupId;

/// Boost applied to every group when three groups hold milestones
const PRESSURE_BOOST: f64 = 1.1;
const PRESSURE_GROUPS: usize = 3;
/// Oracle BOOST_MUTATION factor
const ORACLE_BOOST: f64 = 1.3;
/// Pause multiplier for an oracle PAUSE_GROUP
const ORACLE_PAUSE: f64 = 0.3;
/// Paused groups resume at this share of their initial bankroll
const PAUSE_RESTORE_RATIO: f64 = 0.9;
const EMERGENCY_DRAWDOWN: f64 = 50.0;
const EMERGENCY_BANKRUPTCIES: u32 = 3;
const ORACLE_TOP_DNA: usize = 10;
const ORACLE_RECENT_MILESTONES: usize = 10;
/// Cycle failures logged in full before throttling kicks in
const VERBOSE_ERRORS: u64 = 5;
const ERROR_LOG_EVERY: u64 = 100;

// ─────────────────────────────────────────────────────────────────
// Settings and ports
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EcosystemSettings {
    pub migration_interval: u64,
    pub oracle_interval: u64,
    pub registry_interval: u64,
    pub signal_timeout: Duration,
    /// Fixed seed for reproducible runs
    pub rng_seed: Option<u64>,
    pub arena: ArenaSettings,
}

impl Default for EcosystemSettings {
    fn default() -> Self {
        Self {
            migration_interval: 200,
            oracle_interval: 500,
            registry_interval: 50,
            signal_timeout: Duration::from_secs(10),
            rng_seed: None,
            arena: ArenaSettings::default(),
        }
    }
}

/// The three market collaborators
#[derive(Clone)]
pub struct MarketPorts {
    pub signals: Arc<dyn SignalProvider>,
    pub prices: Arc<dyn PriceOracle>,
    pub candles: Option<Arc<dyn CandleSource>>,
}

impl MarketPorts {
    /// All three ports backed by one simulated market
    pub fn simulated(market: Arc<SimulatedMarket>) -> Self {
        Self {
            signals: market.clone(),
            prices: market.clone(),
            candles: Some(market),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────────────────────────

/// Persisted community state: counters plus every group snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunitySnapshot {
    pub cycle: u64,
    pub start_time: DateTime<Utc>,
    pub peak_bankroll: f64,
    #[serde(default)]
    pub consecutive_bankruptcies: u32,
    pub groups: Vec<GroupSnapshot>,
}

/// Outcome of one master cycle
#[derive(Debug, Clone, Default)]
pub struct CycleSummary {
    pub cycle: u64,
    pub opened: usize,
    pub closed: usize,
    pub bankruptcies: usize,
    pub goals_reached: usize,
    pub evolved_groups: Vec<GroupId>,
    pub skipped_groups: Vec<GroupId>,
    pub milestones: Vec<MilestoneEvent>,
    /// `(source, destination)` when a migration ran
    pub migration: Option<(GroupId, GroupId)>,
    pub oracle: Option<OracleDecision>,
    pub pressure_applied: bool,
    pub community_bankroll: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EcosystemStatus {
    pub cycle: u64,
    pub running: bool,
    pub start_time: DateTime<Utc>,
    pub uptime_secs: i64,
    pub total_bankroll: f64,
    pub initial_bankroll: f64,
    pub peak_bankroll: f64,
    pub drawdown_percent: f64,
    pub multiplier: f64,
    pub total_bots: usize,
    pub consecutive_bankruptcies: u32,
    pub groups: Vec<GroupStatus>,
    pub memory: MemoryStats,
    pub milestone_events: usize,
    pub hall_of_fame: usize,
    pub last_oracle: Option<OracleDecision>,
}

// ─────────────────────────────────────────────────────────────────
// CommunityEcosystem
// ─────────────────────────────────────────────────────────────────

pub struct CommunityEcosystem {
    settings: EcosystemSettings,
    market: MarketPorts,
    /// One arena per group, in `GroupId::ALL` order
    groups: Vec<GroupArena>,
    milestones: MilestoneTracker,
    memory: DnaVectorMemory,
    registry: EvolutionRegistry,
    hall_of_fame: HallOfFame,
    oracle: OracleClient,
    store: Option<JsonStore>,
    journal: Option<TradeJournal>,
    rng: StdRng,
    cycle: u64,
    start_time: DateTime<Utc>,
    peak_bankroll: f64,
    consecutive_bankruptcies: u32,
    running: bool,
    cycle_errors: u64,
}

impl CommunityEcosystem {
    /// Fresh community at genesis. Nothing is loaded until `start`.
    pub fn new(settings: EcosystemSettings, market: MarketPorts, oracle: OracleClient) -> Self {
        let mut rng = match settings.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let groups = genesis_groups(&settings.arena, &mut rng);
        let initial = community_initial(&settings.arena);
        Self {
            settings,
            market,
            groups,
            milestones: MilestoneTracker::new(),
            memory: DnaVectorMemory::new(),
            registry: EvolutionRegistry::new(),
            hall_of_fame: HallOfFame::new(),
            oracle,
            store: None,
            journal: None,
            rng,
            cycle: 0,
            start_time: Utc::now(),
            peak_bankroll: initial,
            consecutive_bankruptcies: 0,
            running: false,
            cycle_errors: 0,
        }
    }

    /// Persist documents into `store`
    pub fn with_store(mut self, store: JsonStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Append closed trades to `journal`
    pub fn with_journal(mut self, journal: TradeJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn groups(&self) -> &[GroupArena] {
        &self.groups
    }

    pub fn group(&self, id: GroupId) -> Option<&GroupArena> {
        self.groups.iter().find(|g| g.group() == id)
    }

    pub fn group_mut(&mut self, id: GroupId) -> Option<&mut GroupArena> {
        self.groups.iter_mut().find(|g| g.group() == id)
    }

    pub fn milestones(&self) -> &MilestoneTracker {
        &self.milestones
    }

    pub fn memory(&self) -> &DnaVectorMemory {
        &self.memory
    }

    pub fn registry(&self) -> &EvolutionRegistry {
        &self.registry
    }

    pub fn hall_of_fame(&self) -> &HallOfFame {
        &self.hall_of_fame
    }

    pub fn oracle(&self) -> &OracleClient {
        &self.oracle
    }

    pub fn cycle_errors(&self) -> u64 {
        self.cycle_errors
    }

    pub fn total_bankroll(&self) -> f64 {
        self.groups.iter().map(|g| g.group_bankroll()).sum()
    }

    pub fn initial_bankroll(&self) -> f64 {
        community_initial(&self.settings.arena)
    }

    pub fn peak_bankroll(&self) -> f64 {
        self.peak_bankroll
    }

    /// Distance below the community peak (%)
    pub fn drawdown_percent(&self) -> f64 {
        if self.peak_bankroll <= 0.0 {
            return 0.0;
        }
        ((self.peak_bankroll - self.total_bankroll()) / self.peak_bankroll * 100.0).max(0.0)
    }

    pub fn consecutive_bankruptcies(&self) -> u32 {
        self.consecutive_bankruptcies
    }

    // ── Master cycle ─────────────────────────────────────────────

    /// Run one cycle and swallow its error, logging the first few failures
    /// in full and then one in every hundred. No-op once stopped.
    pub async fn tick(&mut self) -> Option<CycleSummary> {
        if !self.is_running() {
            debug!(cycle = self.cycle, "⏸️ Ecosystem stopped, tick ignored");
            return None;
        }
        match self.run_cycle().await {
            Ok(summary) => Some(summary),
            Err(e) => {
                self.cycle_errors += 1;
                let n = self.cycle_errors;
                if n <= VERBOSE_ERRORS {
                    error!(cycle = self.cycle, errors = n, error = ?e, "❌ Cycle failed");
                } else if n % ERROR_LOG_EVERY == 0 {
                    error!(cycle = self.cycle, errors = n, error = %e, "❌ Cycle failures continue");
                }
                None
            }
        }
    }

    /// One master cycle: every group trades on the same signal batch, then
    /// milestones, migration, oracle, pressure and registry run in order
    pub async fn run_cycle(&mut self) -> Result<CycleSummary> {
        self.cycle += 1;
        let cycle = self.cycle;

        let signals = tokio::time::timeout(
            self.settings.signal_timeout,
            self.market.signals.generate_all_signals(),
        )
        .await
        .map_err(|_| anyhow!("signal generation timed out after {:?}", self.settings.signal_timeout))?
        .context("Failed to generate signals")?;

        let now = Utc::now();
        let prices: &dyn PriceOracle = self.market.prices.as_ref();
        let candles: Option<&dyn CandleSource> = self.market.candles.as_deref();
        let mut reports: Vec<(GroupId, CycleReport)> = Vec::with_capacity(self.groups.len());
        for arena in self.groups.iter_mut() {
            let mut ctx = CycleContext {
                signals: &signals,
                prices,
                candles,
                memory: &mut self.memory,
                rng: &mut self.rng,
                now,
            };
            let report = arena.execute_cycle(&mut ctx).await;
            reports.push((arena.group(), report));
        }

        let mut summary = CycleSummary {
            cycle,
            ..Default::default()
        };
        for (group, report) in &reports {
            summary.opened += report.opened;
            summary.closed += report.closed.len();
            summary.bankruptcies += report.bankruptcies;
            summary.goals_reached += report.goals_reached;
            if report.evolved {
                summary.evolved_groups.push(*group);
            }
            if report.skipped {
                summary.skipped_groups.push(*group);
            }
        }

        if summary.bankruptcies > 0 {
            self.consecutive_bankruptcies += summary.bankruptcies as u32;
        } else {
            self.consecutive_bankruptcies = 0;
        }

        summary.milestones = self.check_milestones();

        let total = self.total_bankroll();
        if total > self.peak_bankroll {
            self.peak_bankroll = total;
        }

        if cycle % self.settings.migration_interval.max(1) == 0 {
            summary.migration = self.inter_group_migration();
        }
        if cycle % self.settings.oracle_interval.max(1) == 0 {
            summary.oracle = Some(self.consult_oracle().await);
        }

        let new_group_milestone = summary
            .milestones
            .iter()
            .any(|e| e.level == MilestoneLevel::Group);
        summary.pressure_applied = self.community_pressure(new_group_milestone);

        if cycle % self.settings.registry_interval.max(1) == 0 {
            self.record_registry();
        }

        self.journal_trades(&reports);

        summary.community_bankroll = self.total_bankroll();
        debug!(
            cycle,
            opened = summary.opened,
            closed = summary.closed,
            bankruptcies = summary.bankruptcies,
            bankroll = summary.community_bankroll,
            "🔄 Cycle complete"
        );
        Ok(summary)
    }

    fn milestone_input(&self) -> MilestoneInput {
        MilestoneInput {
            cycle: self.cycle,
            total_bankroll: self.total_bankroll(),
            initial_bankroll: self.initial_bankroll(),
            groups: self
                .groups
                .iter()
                .map(|g| GroupBalance {
                    group: g.group(),
                    bankroll: g.group_bankroll(),
                    initial_bankroll: g.initial_bankroll(),
                    bots: g
                        .bots()
                        .iter()
                        .map(|b| BotBalance {
                            bot_id: b.id().to_string(),
                            bankroll: b.bankroll,
                            initial_bankroll: b.initial_bankroll,
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    /// Record new milestones; bots at 5x or more enter the hall of fame
    fn check_milestones(&mut self) -> Vec<MilestoneEvent> {
        let input = self.milestone_input();
        let events = self.milestones.check_all(&input);
        for event in &events {
            info!(
                level = %event.level,
                entity = %event.entity_id,
                milestone = event.milestone,
                bankroll = event.bankroll,
                cycle = event.cycle,
                "🎯 Milestone reached"
            );
            if event.level != MilestoneLevel::Bot {
                continue;
            }
            let Some(group) = event.group else {
                continue;
            };
            let bot = self
                .groups
                .iter()
                .find(|g| g.group() == group)
                .and_then(|g| g.bots().iter().find(|b| b.id() == event.entity_id));
            if let Some(bot) = bot {
                if self.hall_of_fame.induct(bot, group, event.milestone) {
                    info!(group = %group, bot = %bot.name(), milestone = event.milestone, "🏛️ Hall of fame");
                }
            }
        }
        events
    }

    // ── Community steps ──────────────────────────────────────────

    /// Move the best group's best genome into the worst group, replacing
    /// that group's worst bot, and hand over the best group's seed genomes.
    /// Returns `(source, destination)`.
    pub fn inter_group_migration(&mut self) -> Option<(GroupId, GroupId)> {
        if self.groups.len() < 2 {
            return None;
        }
        for arena in self.groups.iter_mut() {
            arena.refresh_fitness();
        }
        let mut ranked: Vec<usize> = (0..self.groups.len()).collect();
        ranked.sort_by(|a, b| {
            self.groups[*b]
                .group_fitness()
                .total_cmp(&self.groups[*a].group_fitness())
        });
        let (best, worst) = (ranked[0], ranked[ranked.len() - 1]);
        if best == worst {
            return None;
        }

        let donor = self.groups[best].best_genome()?;
        let mut migrant = perturb_migrant(&donor, &mut self.rng);
        migrant.name = format!("Migrant-{}", self.cycle);
        let seeds = self.groups[best].seeds().genomes();
        let source = self.groups[best].group();
        let source_fitness = self.groups[best].group_fitness();

        let dest = &mut self.groups[worst];
        let dest_fitness = dest.group_fitness();
        let removed = dest.replace_worst_with_migrant(migrant, &mut self.memory)?;
        dest.accept_seed_donor(seeds);

        info!(
            from = %source,
            to = %dest.group(),
            from_fitness = source_fitness,
            to_fitness = dest_fitness,
            donor = %donor.name,
            replaced = %removed.name(),
            cycle = self.cycle,
            "🔄 MIGRATION"
        );
        Some((source, dest.group()))
    }

    /// Boost every group when enough groups hold milestones (only on cycles
    /// that produced a new group milestone), and lift pauses on groups that
    /// recovered. Returns whether the boost was applied.
    fn community_pressure(&mut self, new_group_milestone: bool) -> bool {
        let boosted = new_group_milestone
            && self.milestones.groups_with_milestones() >= PRESSURE_GROUPS;
        if boosted {
            for arena in self.groups.iter_mut() {
                arena.boost_mutation(PRESSURE_BOOST);
            }
            info!(
                groups = self.milestones.groups_with_milestones(),
                boost = PRESSURE_BOOST,
                "🔥 Community pressure: mutation boosted"
            );
        }

        for arena in self.groups.iter_mut() {
            if arena.pause_multiplier() < 1.0
                && arena.group_bankroll() >= arena.initial_bankroll() * PAUSE_RESTORE_RATIO
            {
                arena.set_pause_multiplier(1.0);
                info!(group = %arena.group(), bankroll = arena.group_bankroll(), "▶️ Group resumed");
            }
        }
        boosted
    }

    fn record_registry(&mut self) {
        for arena in &self.groups {
            for (dimension, snapshot) in arena.registry_snapshots(self.cycle) {
                self.registry.record(&dimension, snapshot);
            }
        }
        info!(
            cycle = self.cycle,
            bankroll = self.total_bankroll(),
            peak = self.peak_bankroll,
            memory = self.memory.len(),
            "📊 Evolution registry updated"
        );
    }

    fn journal_trades(&self, reports: &[(GroupId, CycleReport)]) {
        let Some(journal) = &self.journal else {
            return;
        };
        let rows: Vec<JournalRow> = reports
            .iter()
            .flat_map(|(group, r)| r.closed.iter().map(|t| JournalRow::from_trade(*group, t)))
            .collect();
        if let Err(e) = journal.append(&rows) {
            warn!(error = %e, rows = rows.len(), "📝 Trade journal write failed");
        }
    }

    // ── Oracle ───────────────────────────────────────────────────

    pub fn oracle_context(&self) -> OracleContext {
        let drawdown = self.drawdown_percent();
        let reason = if self.consecutive_bankruptcies >= EMERGENCY_BANKRUPTCIES {
            ConsultReason::ConsecutiveBankruptcies
        } else if drawdown > EMERGENCY_DRAWDOWN {
            ConsultReason::DrawdownEmergency
        } else {
            ConsultReason::PeriodicReview
        };

        let groups = self
            .groups
            .iter()
            .map(|g| GroupBrief {
                group: g.group(),
                style: g.personality().style.to_string(),
                bankroll: g.group_bankroll(),
                alive_bots: g.bots().iter().filter(|b| b.is_alive && !b.is_bankrupt()).count(),
                total_bots: g.bots().len(),
                top_fitness: g.best_fitness(),
            })
            .collect();

        let top_dna = self
            .leaderboard(ORACLE_TOP_DNA)
            .into_iter()
            .map(|b| DnaBrief {
                name: b.name,
                group: b.group,
                fitness: b.fitness,
                bankroll: b.bankroll,
                win_rate: b.win_rate,
                active_strategies: b.active_strategies,
                leverage: b.leverage,
            })
            .collect();

        OracleContext {
            reason,
            cycle: self.cycle,
            community_bankroll: self.total_bankroll(),
            community_initial: self.initial_bankroll(),
            groups,
            top_dna,
            recent_milestones: self
                .milestones
                .recent(ORACLE_RECENT_MILESTONES)
                .iter()
                .map(MilestoneEvent::label)
                .collect(),
            drawdown_percent: drawdown,
        }
    }

    /// Ask the advisor now and apply a confident decision
    pub async fn consult_oracle(&mut self) -> OracleDecision {
        let ctx = self.oracle_context();
        let decision = self.oracle.consult(&ctx).await;
        if self.oracle.is_actionable(&decision) {
            self.apply_oracle_decision(&decision);
            self.oracle.mark_applied();
        }
        decision
    }

    pub fn apply_oracle_decision(&mut self, decision: &OracleDecision) {
        match decision.recommendation {
            Recommendation::BoostMutation => {
                for arena in self.groups.iter_mut() {
                    arena.boost_mutation(ORACLE_BOOST);
                }
                info!(boost = ORACLE_BOOST, "🔮 Oracle: mutation boosted");
            }
            Recommendation::MigrateDna => {
                let migrated = self.inter_group_migration();
                info!(migrated = migrated.is_some(), "🔮 Oracle: extra migration");
            }
            Recommendation::PauseGroup => {
                let worst = self
                    .groups
                    .iter_mut()
                    .min_by(|a, b| a.group_bankroll().total_cmp(&b.group_bankroll()));
                if let Some(arena) = worst {
                    arena.set_pause_multiplier(ORACLE_PAUSE);
                    info!(group = %arena.group(), pause = ORACLE_PAUSE, "🔮 Oracle: group paused");
                }
            }
            Recommendation::AdjustParams => {
                if let Some(boost) = decision.params.mutation_boost.filter(|b| *b > 0.0) {
                    for arena in self.groups.iter_mut() {
                        arena.boost_mutation(boost);
                    }
                }
                if let Some(interval) = decision.params.evolution_interval {
                    for arena in self.groups.iter_mut() {
                        arena.set_evolution_interval(interval);
                    }
                }
                info!(params = ?decision.params, "🔮 Oracle: parameters adjusted");
            }
            Recommendation::NoAction => {}
        }
    }

    // ── Queries ──────────────────────────────────────────────────

    /// Top `n` bots across the community by fitness
    pub fn leaderboard(&self, n: usize) -> Vec<BotSummary> {
        let mut all: Vec<BotSummary> = self.groups.iter().flat_map(|g| g.bot_summaries()).collect();
        all.sort_by(|a, b| b.fitness.total_cmp(&a.fitness));
        all.truncate(n);
        all
    }

    pub fn status(&self) -> EcosystemStatus {
        let total = self.total_bankroll();
        let initial = self.initial_bankroll();
        EcosystemStatus {
            cycle: self.cycle,
            running: self.running,
            start_time: self.start_time,
            uptime_secs: (Utc::now() - self.start_time).num_seconds(),
            total_bankroll: round2(total),
            initial_bankroll: initial,
            peak_bankroll: round2(self.peak_bankroll),
            drawdown_percent: round2(self.drawdown_percent()),
            multiplier: if initial > 0.0 { round2(total / initial) } else { 0.0 },
            total_bots: self.groups.iter().map(|g| g.bots().len()).sum(),
            consecutive_bankruptcies: self.consecutive_bankruptcies,
            groups: self.groups.iter().map(GroupArena::status).collect(),
            memory: self.memory.stats(),
            milestone_events: self.milestones.events().len(),
            hall_of_fame: self.hall_of_fame.len(),
            last_oracle: self.oracle.last_decision().cloned(),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Load persisted state (or keep genesis) and mark the community running
    pub fn start(&mut self) -> Result<()> {
        if self.running {
            anyhow::bail!("ecosystem already running");
        }
        self.load_ancillary();
        if self.restore() {
            info!(cycle = self.cycle, bankroll = self.total_bankroll(), "♻️ Community restored");
        } else {
            info!(
                groups = self.groups.len(),
                bots = self.groups.len() * BOTS_PER_GROUP,
                bankroll = self.total_bankroll(),
                "🌱 Community genesis"
            );
        }
        self.running = true;
        Ok(())
    }

    /// Final persist; the runner stops scheduling cycles
    pub fn stop(&mut self) {
        self.running = false;
        self.persist();
        info!(cycle = self.cycle, bankroll = self.total_bankroll(), "🛑 Community stopped");
    }

    /// Back to genesis, deleting every persisted document
    pub fn reset(&mut self) {
        if let Some(store) = &self.store {
            let results = [
                store.remove::<CommunitySnapshot>(),
                store.remove::<MilestoneTracker>(),
                store.remove::<DnaVectorMemory>(),
                store.remove::<OracleLog>(),
                store.remove::<EvolutionRegistry>(),
                store.remove::<HallOfFame>(),
            ];
            for e in results.into_iter().filter_map(Result::err) {
                warn!(error = %e, "💾 Failed to remove persisted document");
            }
        }
        self.groups = genesis_groups(&self.settings.arena, &mut self.rng);
        self.milestones.reset();
        self.memory.reset();
        self.registry.reset();
        self.hall_of_fame.reset();
        self.oracle.reset();
        self.cycle = 0;
        self.start_time = Utc::now();
        self.peak_bankroll = self.initial_bankroll();
        self.consecutive_bankruptcies = 0;
        self.cycle_errors = 0;
        info!("🔄 Community reset to genesis");
    }

    // ── Persistence ──────────────────────────────────────────────

    pub fn snapshot(&self) -> CommunitySnapshot {
        CommunitySnapshot {
            cycle: self.cycle,
            start_time: self.start_time,
            peak_bankroll: self.peak_bankroll,
            consecutive_bankruptcies: self.consecutive_bankruptcies,
            groups: self.groups.iter().map(GroupArena::snapshot).collect(),
        }
    }

    /// Write every document. Failures are logged and not retried; returns
    /// true when all writes succeeded.
    pub fn persist(&self) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        let ok = [
            save_logged(store, &self.snapshot()),
            save_logged(store, &self.milestones),
            save_logged(store, &self.memory),
            save_logged(store, self.oracle.log()),
            save_logged(store, &self.registry),
            save_logged(store, &self.hall_of_fame),
        ];
        let all = ok.iter().all(|ok| *ok);
        if all {
            debug!(cycle = self.cycle, dir = %store.dir().display(), "💾 Community persisted");
        }
        all
    }

    /// Replace the groups with the persisted snapshot when it is present
    /// and structurally valid
    pub fn restore(&mut self) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        let snapshot = match store.load::<CommunitySnapshot>() {
            Ok(Some(s)) => s,
            Ok(None) => return false,
            Err(e) => {
                warn!(error = %e, "💾 Community snapshot unreadable, using genesis");
                return false;
            }
        };
        match rebuild_groups(snapshot.groups, &self.settings.arena) {
            Ok(groups) => {
                self.groups = groups;
                self.cycle = snapshot.cycle;
                self.start_time = snapshot.start_time;
                self.peak_bankroll = snapshot.peak_bankroll.max(self.initial_bankroll());
                self.consecutive_bankruptcies = snapshot.consecutive_bankruptcies;
                true
            }
            Err(e) => {
                warn!(error = %e, "💾 Community snapshot invalid, using genesis");
                false
            }
        }
    }

    fn load_ancillary(&mut self) {
        let Some(store) = self.store.clone() else {
            return;
        };
        if let Some(doc) = load_logged::<MilestoneTracker>(&store) {
            self.milestones = doc;
        }
        if let Some(doc) = load_logged::<DnaVectorMemory>(&store) {
            self.memory = doc;
        }
        if let Some(doc) = load_logged::<OracleLog>(&store) {
            self.oracle.restore_log(doc);
        }
        if let Some(doc) = load_logged::<EvolutionRegistry>(&store) {
            self.registry = doc;
        }
        if let Some(doc) = load_logged::<HallOfFame>(&store) {
            self.hall_of_fame = doc;
        }
    }
}

fn genesis_groups(settings: &ArenaSettings, rng: &mut StdRng) -> Vec<GroupArena> {
    GroupId::ALL
        .iter()
        .map(|g| GroupArena::new(*g, settings.clone(), rng))
        .collect()
}

fn community_initial(settings: &ArenaSettings) -> f64 {
    settings.initial_bankroll * (BOTS_PER_GROUP * GroupId::ALL.len()) as f64
}

/// Arenas from persisted snapshots: exactly one per group, in
/// `GroupId::ALL` order, each passing `GroupArena::from_snapshot`
fn rebuild_groups(snapshots: Vec<GroupSnapshot>, settings: &ArenaSettings) -> Result<Vec<GroupArena>> {
    let seen: BTreeSet<GroupId> = snapshots.iter().map(|s| s.group).collect();
    anyhow::ensure!(
        snapshots.len() == GroupId::ALL.len() && seen.len() == GroupId::ALL.len(),
        "expected {} distinct groups, found {} snapshots",
        GroupId::ALL.len(),
        snapshots.len()
    );
    let mut snapshots = snapshots;
    snapshots.sort_by_key(|s| s.group.index());
    snapshots
        .into_iter()
        .map(|s| GroupArena::from_snapshot(s, settings.clone()))
        .collect()
}

fn save_logged<D: Document>(store: &JsonStore, doc: &D) -> bool {
    match store.save(doc) {
        Ok(()) => true,
        Err(e) => {
            warn!(file = D::FILE_NAME, error = %e, "💾 Persist failed");
            false
        }
    }
}

fn load_logged<D: Document>(store: &JsonStore) -> Option<D> {
    match store.load::<D>() {
        Ok(doc) => doc,
        Err(e) => {
            warn!(file = D::FILE_NAME, error = %e, "💾 Load failed, starting fresh");
            None
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{DisabledAdvisor, ScriptedAdvisor};

    fn settings(seed: u64) -> EcosystemSettings {
        EcosystemSettings {
            rng_seed: Some(seed),
            arena: ArenaSettings {
                symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn ecosystem(seed: u64) -> CommunityEcosystem {
        let s = settings(seed);
        let market = Arc::new(SimulatedMarket::new(&s.arena.symbols, 0.004, Some(seed)));
        let oracle = OracleClient::new(Arc::new(DisabledAdvisor), Duration::ZERO, 0.5);
        CommunityEcosystem::new(s, MarketPorts::simulated(market), oracle)
    }

    #[test]
    fn test_genesis_has_five_groups_of_five() {
        let eco = ecosystem(1);
        assert_eq!(eco.groups().len(), 5);
        assert!(eco.groups().iter().all(|g| g.bots().len() == BOTS_PER_GROUP));
        assert!((eco.total_bankroll() - 2500.0).abs() < 1e-9);
        assert_eq!(eco.status().total_bots, 25);
    }

    #[test]
    fn test_migration_never_targets_its_source() {
        let mut eco = ecosystem(2);
        for _ in 0..20 {
            let (from, to) = eco.inter_group_migration().unwrap();
            assert_ne!(from, to);
            assert!(eco.groups().iter().all(|g| g.bots().len() == BOTS_PER_GROUP));
        }
        assert_eq!(eco.memory().len(), 20);
    }

    #[test]
    fn test_pause_group_hits_the_poorest_group() {
        let mut eco = ecosystem(3);
        let poorest = GroupId::Delta;
        if let Some(arena) = eco.group_mut(poorest) {
            arena.bots_mut()[0].bankroll = 10.0;
        }
        eco.apply_oracle_decision(&OracleDecision {
            recommendation: Recommendation::PauseGroup,
            params: Default::default(),
            reasoning: "bleeding".to_string(),
            confidence: 0.9,
        });
        assert_eq!(eco.group(poorest).unwrap().pause_multiplier(), ORACLE_PAUSE);

        // still below 90% of 500: stays paused
        assert!(!eco.community_pressure(false));
        assert_eq!(eco.group(poorest).unwrap().pause_multiplier(), ORACLE_PAUSE);

        if let Some(arena) = eco.group_mut(poorest) {
            arena.bots_mut()[0].bankroll = 100.0;
        }
        eco.community_pressure(false);
        assert_eq!(eco.group(poorest).unwrap().pause_multiplier(), 1.0);
    }

    #[test]
    fn test_oracle_reason_prefers_bankruptcy_streak() {
        let mut eco = ecosystem(4);
        assert_eq!(eco.oracle_context().reason, ConsultReason::PeriodicReview);
        eco.peak_bankroll = 6000.0;
        assert_eq!(eco.oracle_context().reason, ConsultReason::DrawdownEmergency);
        eco.consecutive_bankruptcies = 3;
        let ctx = eco.oracle_context();
        assert_eq!(ctx.reason, ConsultReason::ConsecutiveBankruptcies);
        assert_eq!(ctx.top_dna.len(), ORACLE_TOP_DNA);
        assert_eq!(ctx.groups.len(), 5);
    }

    #[tokio::test]
    async fn test_confident_oracle_decision_is_applied() {
        let s = settings(5);
        let market = Arc::new(SimulatedMarket::new(&s.arena.symbols, 0.004, Some(5)));
        let advisor = ScriptedAdvisor::new([
            r#"{"recommendation":"ADJUST_PARAMS","params":{"evolution_interval":30},"confidence":0.8}"#,
            r#"{"recommendation":"PAUSE_GROUP","confidence":0.4}"#,
        ]);
        let oracle = OracleClient::new(Arc::new(advisor), Duration::ZERO, 0.5);
        let mut eco = CommunityEcosystem::new(s, MarketPorts::simulated(market), oracle);

        let first = eco.consult_oracle().await;
        assert_eq!(first.recommendation, Recommendation::AdjustParams);
        assert!(eco
            .groups()
            .iter()
            .all(|g| g.seeds().meta_evolution.evolution_interval() == 30));
        assert!(eco.oracle().log().last().unwrap().applied);

        // below the confidence threshold: logged, not applied
        eco.consult_oracle().await;
        assert!(eco.groups().iter().all(|g| g.pause_multiplier() == 1.0));
        assert!(!eco.oracle().log().last().unwrap().applied);
    }

    #[tokio::test]
    async fn test_cycles_advance_and_keep_population() {
        let mut eco = ecosystem(6);
        eco.start().unwrap();
        assert!(eco.start().is_err());
        for _ in 0..5 {
            let summary = eco.tick().await.unwrap();
            assert_eq!(summary.cycle, eco.cycle());
        }
        assert_eq!(eco.cycle(), 5);
        assert!(eco.groups().iter().all(|g| g.bots().len() == BOTS_PER_GROUP));
        assert_eq!(eco.cycle_errors(), 0);
    }

    #[tokio::test]
    async fn test_tick_after_stop_is_ignored() {
        let mut eco = ecosystem(7);
        assert!(eco.tick().await.is_none());
        assert_eq!(eco.cycle(), 0);

        eco.start().unwrap();
        eco.tick().await.unwrap();
        eco.stop();
        assert!(eco.tick().await.is_none());
        assert_eq!(eco.cycle(), 1);
        assert_eq!(eco.cycle_errors(), 0);
    }
}
