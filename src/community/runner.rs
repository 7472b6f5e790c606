//! Master-cycle scheduler
//!
//! A fixed-interval ticker drives cycles and a second one drives
//! persistence. A tick that arrives while a cycle is still in flight is
//! dropped, never queued: `CycleGate` admits at most one cycle at a time
//! and the guard it hands out reopens the gate when the cycle finishes.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::CommunityEcosystem;

/// "Cycle in progress" flag
#[derive(Debug, Default)]
pub struct CycleGate {
    busy: AtomicBool,
}

impl CycleGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim the gate, or `None` when a cycle is already running
    pub fn try_enter(self: &Arc<Self>) -> Option<CycleGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleGuard { gate: self.clone() })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Held for the duration of one cycle
#[derive(Debug)]
pub struct CycleGuard {
    gate: Arc<CycleGate>,
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.gate.busy.store(false, Ordering::Release);
    }
}

pub struct EcosystemRunner {
    ecosystem: Arc<Mutex<CommunityEcosystem>>,
    gate: Arc<CycleGate>,
    cycle_interval: Duration,
    persist_interval: Duration,
    skipped_ticks: Arc<AtomicU64>,
}

impl EcosystemRunner {
    pub fn new(
        ecosystem: CommunityEcosystem,
        cycle_interval: Duration,
        persist_interval: Duration,
    ) -> Self {
        Self {
            ecosystem: Arc::new(Mutex::new(ecosystem)),
            gate: CycleGate::new(),
            cycle_interval,
            persist_interval,
            skipped_ticks: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shared handle for status queries
    pub fn ecosystem(&self) -> Arc<Mutex<CommunityEcosystem>> {
        self.ecosystem.clone()
    }

    /// Ticks dropped because a cycle was still running
    pub fn skipped_ticks(&self) -> u64 {
        self.skipped_ticks.load(Ordering::Relaxed)
    }

    /// Start the ecosystem and drive it until `shutdown` flips to true (or
    /// its sender goes away). The in-flight cycle finishes before the final
    /// persist.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        self.ecosystem.lock().await.start()?;
        info!(
            cycle_ms = self.cycle_interval.as_millis() as u64,
            persist_secs = self.persist_interval.as_secs(),
            "🚀 Ecosystem runner started"
        );

        let mut cycle_timer = interval(self.cycle_interval);
        cycle_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut persist_timer = interval(self.persist_interval);
        persist_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // first tick of an interval fires immediately
        persist_timer.tick().await;

        let mut in_flight: Option<JoinHandle<()>> = None;
        loop {
            tokio::select! {
                _ = cycle_timer.tick() => {
                    match self.gate.try_enter() {
                        Some(guard) => {
                            let ecosystem = self.ecosystem.clone();
                            in_flight = Some(tokio::spawn(async move {
                                let _guard = guard;
                                ecosystem.lock().await.tick().await;
                            }));
                        }
                        None => {
                            let skipped = self.skipped_ticks.fetch_add(1, Ordering::Relaxed) + 1;
                            debug!(skipped, "⏭️ Cycle still running, tick dropped");
                        }
                    }
                }
                _ = persist_timer.tick() => {
                    let ecosystem = self.ecosystem.clone();
                    tokio::spawn(async move {
                        ecosystem.lock().await.persist();
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if let Some(handle) = in_flight {
            if let Err(e) = handle.await {
                warn!(error = %e, "Cycle task failed during shutdown");
            }
        }
        let mut ecosystem = self.ecosystem.lock().await;
        ecosystem.stop();
        info!(
            cycle = ecosystem.cycle(),
            skipped_ticks = self.skipped_ticks(),
            "👋 Ecosystem runner stopped"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::community::{EcosystemSettings, MarketPorts};
    use crate::market::SimulatedMarket;
    use crate::oracle::{DisabledAdvisor, OracleClient};

    #[test]
    fn test_gate_admits_one_cycle_at_a_time() {
        let gate = CycleGate::new();
        let guard = gate.try_enter().unwrap();
        assert!(gate.is_busy());
        assert!(gate.try_enter().is_none());
        drop(guard);
        assert!(!gate.is_busy());
        assert!(gate.try_enter().is_some());
    }

    #[tokio::test]
    async fn test_runner_cycles_until_shutdown() {
        let settings = EcosystemSettings {
            rng_seed: Some(11),
            ..Default::default()
        };
        let market = Arc::new(SimulatedMarket::new(&settings.arena.symbols, 0.004, Some(11)));
        let oracle = OracleClient::new(Arc::new(DisabledAdvisor), Duration::ZERO, 0.5);
        let ecosystem = CommunityEcosystem::new(settings, MarketPorts::simulated(market), oracle);
        let runner = Arc::new(EcosystemRunner::new(
            ecosystem,
            Duration::from_millis(10),
            Duration::from_secs(60),
        ));

        let (tx, rx) = watch::channel(false);
        let handle = {
            let runner = runner.clone();
            tokio::spawn(async move { runner.run(rx).await })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;
        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
        assert!(!runner.gate.is_busy());

        let eco = runner.ecosystem();
        let stopped_at = eco.lock().await.cycle();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let eco = eco.lock().await;
        assert_eq!(eco.cycle(), stopped_at);
        assert!(eco.cycle() > 0);
        assert!(!eco.is_running());
        assert!(eco.groups().iter().all(|g| g.bots().len() == 5));
    }
}
