//! Integration tests for the community ecosystem

#[cfg(test)]
mod tests {
    use evoarena::arena::{ArenaSettings, BOTS_PER_GROUP};
    use evoarena::community::{
        CommunityEcosystem, CommunitySnapshot, EcosystemSettings, MarketPorts, MilestoneInput,
        MilestoneLevel, MilestoneTracker,
    };
    use evoarena::market::SimulatedMarket;
    use evoarena::oracle::{Advisor, DisabledAdvisor, OracleClient, Recommendation, ScriptedAdvisor};
    use evoarena::persistence::JsonStore;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    fn settings(seed: u64) -> EcosystemSettings {
        EcosystemSettings {
            rng_seed: Some(seed),
            arena: ArenaSettings {
                symbols: vec![
                    "BTCUSDT".to_string(),
                    "ETHUSDT".to_string(),
                    "SOLUSDT".to_string(),
                ],
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn build(settings: EcosystemSettings, volatility: f64, advisor: Arc<dyn Advisor>) -> CommunityEcosystem {
        let market = Arc::new(SimulatedMarket::new(
            &settings.arena.symbols,
            volatility,
            settings.rng_seed,
        ));
        let oracle = OracleClient::new(advisor, Duration::ZERO, 0.5);
        CommunityEcosystem::new(settings, MarketPorts::simulated(market), oracle)
    }

    fn temp_data_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("evoarena_it_{}_{}", name, uuid::Uuid::new_v4()))
    }

    // ============================================================================
    // Population invariants
    // ============================================================================

    #[tokio::test]
    async fn test_every_group_keeps_five_bots_across_cycles() {
        let mut s = settings(21);
        s.migration_interval = 7;
        let mut eco = build(s, 0.03, Arc::new(DisabledAdvisor));
        eco.start().unwrap();

        let mut migrations = 0;
        for _ in 0..60 {
            let summary = eco.run_cycle().await.unwrap();
            assert_eq!(eco.groups().len(), 5);
            for group in eco.groups() {
                assert_eq!(group.bots().len(), BOTS_PER_GROUP);
                assert!(group.bots().iter().all(|b| b.genome.active_count() >= 3));
            }
            if let Some((from, to)) = summary.migration {
                assert_ne!(from, to);
                migrations += 1;
            }
        }
        assert_eq!(migrations, 60 / 7);
        assert_eq!(eco.cycle(), 60);
    }

    #[tokio::test]
    async fn test_leaderboard_and_status() {
        let mut eco = build(settings(22), 0.01, Arc::new(DisabledAdvisor));
        eco.start().unwrap();
        for _ in 0..10 {
            eco.run_cycle().await.unwrap();
        }

        let board = eco.leaderboard(7);
        assert_eq!(board.len(), 7);
        assert!(board.windows(2).all(|w| w[0].fitness >= w[1].fitness));

        let status = eco.status();
        assert_eq!(status.cycle, 10);
        assert_eq!(status.total_bots, 25);
        assert_eq!(status.groups.len(), 5);
        assert_eq!(status.initial_bankroll, 2500.0);
        assert!(status.peak_bankroll >= 2500.0);
    }

    // ============================================================================
    // Milestones
    // ============================================================================

    #[test]
    fn test_community_milestone_fires_only_at_two_x() {
        let mut tracker = MilestoneTracker::new();
        let events = tracker.check_all(&MilestoneInput {
            cycle: 42,
            total_bankroll: 5100.0,
            initial_bankroll: 2500.0,
            groups: Vec::new(),
        });
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, MilestoneLevel::Community);
        assert_eq!(events[0].milestone, 2);
        assert!(tracker
            .check_all(&MilestoneInput {
                cycle: 43,
                total_bankroll: 5200.0,
                initial_bankroll: 2500.0,
                groups: Vec::new(),
            })
            .is_empty());
    }

    // ============================================================================
    // Oracle
    // ============================================================================

    #[tokio::test]
    async fn test_oracle_consulted_on_interval() {
        let mut s = settings(23);
        s.oracle_interval = 2;
        let advisor = ScriptedAdvisor::new([
            r#"{"recommendation":"BOOST_MUTATION","reasoning":"stagnant","confidence":0.9}"#,
            "not json at all",
        ]);
        let mut eco = build(s, 0.01, Arc::new(advisor));
        eco.start().unwrap();

        let first = eco.run_cycle().await.unwrap();
        assert!(first.oracle.is_none());
        let second = eco.run_cycle().await.unwrap();
        assert_eq!(
            second.oracle.map(|d| d.recommendation),
            Some(Recommendation::BoostMutation)
        );
        assert!(eco.oracle().log().last().unwrap().applied);

        eco.run_cycle().await.unwrap();
        let fourth = eco.run_cycle().await.unwrap().oracle.unwrap();
        assert_eq!(fourth.recommendation, Recommendation::NoAction);
        assert_eq!(fourth.confidence, 0.0);
        assert_eq!(eco.oracle().log().len(), 2);
    }

    // ============================================================================
    // Persistence
    // ============================================================================

    #[tokio::test]
    async fn test_persist_and_restore_round_trip() {
        let dir = temp_data_dir("roundtrip");
        let mut eco = build(settings(24), 0.01, Arc::new(DisabledAdvisor))
            .with_store(JsonStore::new(&dir));
        eco.start().unwrap();
        for _ in 0..12 {
            eco.run_cycle().await.unwrap();
        }
        eco.stop();
        let ids: Vec<String> = eco
            .groups()
            .iter()
            .flat_map(|g| g.bots().iter().map(|b| b.id().to_string()))
            .collect();

        let mut restored = build(settings(99), 0.01, Arc::new(DisabledAdvisor))
            .with_store(JsonStore::new(&dir));
        restored.start().unwrap();
        assert_eq!(restored.cycle(), 12);
        let restored_ids: Vec<String> = restored
            .groups()
            .iter()
            .flat_map(|g| g.bots().iter().map(|b| b.id().to_string()))
            .collect();
        assert_eq!(restored_ids, ids);
        assert_eq!(restored.memory().len(), eco.memory().len());
        assert!((restored.total_bankroll() - eco.total_bankroll()).abs() < 1e-6);

        restored.reset();
        assert_eq!(restored.cycle(), 0);
        assert!(!dir.join("community-state.json").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_invalid_snapshot_falls_back_to_genesis() {
        let dir = temp_data_dir("invalid");
        let store = JsonStore::new(&dir);

        let donor = build(settings(25), 0.01, Arc::new(DisabledAdvisor));
        let mut snapshot: CommunitySnapshot = donor.snapshot();
        snapshot.cycle = 77;
        snapshot.groups[2].bots.pop();
        store.save(&snapshot).unwrap();

        let mut eco = build(settings(26), 0.01, Arc::new(DisabledAdvisor)).with_store(store);
        eco.start().unwrap();
        assert_eq!(eco.cycle(), 0);
        assert!(eco.groups().iter().all(|g| g.bots().len() == BOTS_PER_GROUP));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
