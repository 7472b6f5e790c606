//! EvoArena - evolutionary bot community
//!
//! Runs the five-group ecosystem against the simulated market until Ctrl-C.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use evoarena::community::{CommunityEcosystem, EcosystemRunner, MarketPorts};
use evoarena::config::AppConfig;
use evoarena::market::SimulatedMarket;
use evoarena::oracle::{Advisor, DisabledAdvisor, OracleClient, ProcessAdvisor};
use evoarena::persistence::{JsonStore, TradeJournal};

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&config);
    info!(config = %config, "🧬 EvoArena starting");

    let settings = config.ecosystem_settings();
    let market = Arc::new(SimulatedMarket::new(
        &settings.arena.symbols,
        config.market.simulated_volatility,
        settings.rng_seed,
    ));

    let advisor: Arc<dyn Advisor> = if config.advisor.enabled {
        info!(command = %config.advisor.command, "🔮 Oracle advisor enabled");
        Arc::new(ProcessAdvisor::new(
            config.advisor.command.clone(),
            config.advisor.args.clone(),
            Duration::from_secs(config.advisor.timeout_secs),
        ))
    } else {
        Arc::new(DisabledAdvisor)
    };
    let oracle = OracleClient::new(
        advisor,
        Duration::from_secs(config.advisor.min_interval_secs),
        config.advisor.confidence_threshold,
    );

    let data_dir = config.data_dir();
    let mut ecosystem = CommunityEcosystem::new(settings, MarketPorts::simulated(market), oracle)
        .with_store(JsonStore::new(&data_dir));
    if config.persistence.csv_enabled {
        ecosystem = ecosystem.with_journal(TradeJournal::new(&data_dir));
    }

    let runner = EcosystemRunner::new(ecosystem, config.cycle_interval(), config.persist_interval());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("🛑 Shutdown signal received");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                // keep the sender alive, or the runner would read it as shutdown
                warn!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        }
    });

    runner.run(shutdown_rx).await?;
    Ok(())
}
