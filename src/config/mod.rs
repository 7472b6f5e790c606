//! Configuration management for EvoArena
//!
//! Loads from optional config files + environment variables via .env

use anyhow::{ensure, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::arena::ArenaSettings;
use crate::community::EcosystemSettings;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub ecosystem: EcosystemConfig,
    pub market: MarketConfig,
    pub advisor: AdvisorConfig,
    pub persistence: PersistenceConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EcosystemConfig {
    /// Master cycle interval in milliseconds
    pub cycle_interval_ms: u64,
    /// Full-state persist interval in seconds
    pub persist_interval_secs: u64,
    /// Cycles between inter-group migrations
    pub migration_interval: u64,
    /// Cycles between oracle consultations
    pub oracle_interval: u64,
    /// Cycles between evolution registry snapshots
    pub registry_interval: u64,
    /// Starting bankroll of every bot
    pub bot_initial_bankroll: f64,
    /// Bankroll at which a bot stops opening positions
    pub goal_bankroll: f64,
    /// Symbols traded by every group
    pub symbols: Vec<String>,
    /// Fixed RNG seed for reproducible runs
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    pub price_timeout_ms: u64,
    pub signal_timeout_ms: u64,
    /// Per-candle volatility of the simulated random walk
    pub simulated_volatility: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdvisorConfig {
    pub enabled: bool,
    /// External command fed the prompt on stdin
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub timeout_secs: u64,
    /// Minimum spacing between consultations
    pub min_interval_secs: u64,
    /// Decisions at or below this confidence are only logged
    pub confidence_threshold: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Data directory
    pub data_dir: String,
    /// Enable the CSV trade journal
    pub csv_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter directive, overridden by RUST_LOG
    pub filter: String,
    /// JSON lines instead of human-readable output
    pub json: bool,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Self::defaults()?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (EVOARENA_*)
            .add_source(
                Environment::with_prefix("EVOARENA")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app_config.validate()?;
        Ok(app_config)
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(Config::builder()
            // Ecosystem defaults
            .set_default("ecosystem.cycle_interval_ms", 6000)?
            .set_default("ecosystem.persist_interval_secs", 30)?
            .set_default("ecosystem.migration_interval", 200)?
            .set_default("ecosystem.oracle_interval", 500)?
            .set_default("ecosystem.registry_interval", 50)?
            .set_default("ecosystem.bot_initial_bankroll", 100.0)?
            .set_default("ecosystem.goal_bankroll", 10_000.0)?
            .set_default(
                "ecosystem.symbols",
                vec!["BTCUSDT", "ETHUSDT", "SOLUSDT", "BNBUSDT", "XRPUSDT"],
            )?
            // Market defaults
            .set_default("market.price_timeout_ms", 2000)?
            .set_default("market.signal_timeout_ms", 10_000)?
            .set_default("market.simulated_volatility", 0.004)?
            // Advisor defaults
            .set_default("advisor.enabled", false)?
            .set_default("advisor.command", "claude")?
            .set_default("advisor.args", Vec::<String>::new())?
            .set_default("advisor.timeout_secs", 60)?
            .set_default("advisor.min_interval_secs", 300)?
            .set_default("advisor.confidence_threshold", 0.5)?
            // Persistence defaults
            .set_default("persistence.data_dir", "./data/ecosystem")?
            .set_default("persistence.csv_enabled", true)?
            // Logging defaults
            .set_default("logging.filter", "info")?
            .set_default("logging.json", false)?)
    }

    /// Reject values the ecosystem cannot run with
    pub fn validate(&self) -> Result<()> {
        let eco = &self.ecosystem;
        ensure!(eco.cycle_interval_ms > 0, "ecosystem.cycle_interval_ms must be positive");
        ensure!(eco.persist_interval_secs > 0, "ecosystem.persist_interval_secs must be positive");
        ensure!(
            eco.migration_interval > 0 && eco.oracle_interval > 0 && eco.registry_interval > 0,
            "ecosystem intervals must be positive"
        );
        ensure!(eco.bot_initial_bankroll > 0.0, "ecosystem.bot_initial_bankroll must be positive");
        ensure!(
            eco.goal_bankroll > eco.bot_initial_bankroll,
            "ecosystem.goal_bankroll must exceed the initial bankroll"
        );
        ensure!(!eco.symbols.is_empty(), "ecosystem.symbols must not be empty");
        ensure!(
            (0.0..=1.0).contains(&self.advisor.confidence_threshold),
            "advisor.confidence_threshold must be within 0..=1"
        );
        Ok(())
    }

    pub fn arena_settings(&self) -> ArenaSettings {
        ArenaSettings {
            initial_bankroll: self.ecosystem.bot_initial_bankroll,
            goal_bankroll: self.ecosystem.goal_bankroll,
            symbols: self.ecosystem.symbols.clone(),
            price_timeout: Duration::from_millis(self.market.price_timeout_ms),
        }
    }

    pub fn ecosystem_settings(&self) -> EcosystemSettings {
        EcosystemSettings {
            migration_interval: self.ecosystem.migration_interval,
            oracle_interval: self.ecosystem.oracle_interval,
            registry_interval: self.ecosystem.registry_interval,
            signal_timeout: Duration::from_millis(self.market.signal_timeout_ms),
            rng_seed: self.ecosystem.rng_seed,
            arena: self.arena_settings(),
        }
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.ecosystem.cycle_interval_ms)
    }

    pub fn persist_interval(&self) -> Duration {
        Duration::from_secs(self.ecosystem.persist_interval_secs)
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.persistence.data_dir)
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        format!(
            "symbols={:?} cycle_ms={} migration={} oracle={} advisor={} data_dir={} seed={:?}",
            self.ecosystem.symbols,
            self.ecosystem.cycle_interval_ms,
            self.ecosystem.migration_interval,
            self.ecosystem.oracle_interval,
            if self.advisor.enabled { self.advisor.command.as_str() } else { "off" },
            self.persistence.data_dir,
            self.ecosystem.rng_seed
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> AppConfig {
        AppConfig::defaults()
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults_match_the_documented_values() {
        let cfg = defaults();
        assert_eq!(cfg.ecosystem.cycle_interval_ms, 6000);
        assert_eq!(cfg.ecosystem.migration_interval, 200);
        assert_eq!(cfg.ecosystem.symbols.len(), 5);
        assert_eq!(cfg.ecosystem.rng_seed, None);
        assert!(!cfg.advisor.enabled);
        assert!(cfg.validate().is_ok());

        let settings = cfg.ecosystem_settings();
        assert_eq!(settings.arena.initial_bankroll, 100.0);
        assert_eq!(settings.arena.price_timeout, Duration::from_secs(2));
        assert!(cfg.to_string().contains("advisor=off"));
    }

    #[test]
    fn test_validation_rejects_nonsense() {
        let mut cfg = defaults();
        cfg.ecosystem.goal_bankroll = 50.0;
        assert!(cfg.validate().is_err());

        let mut cfg = defaults();
        cfg.ecosystem.symbols.clear();
        assert!(cfg.validate().is_err());
    }
}
