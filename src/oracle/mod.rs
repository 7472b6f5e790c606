//! Oracle module - optional external advisor
//!
//! Every few hundred cycles the community hands an advisor a snapshot of its
//! state and may act on the reply. The advisor is a port (`Advisor`) so the
//! real process-backed backend can be swapped for a scripted one in tests.
//! Anything that goes wrong degrades to `NO_ACTION` with confidence 0.

mod advisor;
mod client;

pub use advisor::{Advisor, DisabledAdvisor, ProcessAdvisor, ScriptedAdvisor};
pub use client::{parse_decision, OracleClient, OracleLog, OracleLogEntry};

#[cfg(test)]
pub use advisor::MockAdvisor;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::GroupId;

/// What the advisor may ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    AdjustParams,
    MigrateDna,
    PauseGroup,
    BoostMutation,
    NoAction,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::AdjustParams => write!(f, "ADJUST_PARAMS"),
            Recommendation::MigrateDna => write!(f, "MIGRATE_DNA"),
            Recommendation::PauseGroup => write!(f, "PAUSE_GROUP"),
            Recommendation::BoostMutation => write!(f, "BOOST_MUTATION"),
            Recommendation::NoAction => write!(f, "NO_ACTION"),
        }
    }
}

/// Why the advisor is being consulted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsultReason {
    PeriodicReview,
    /// Community drawdown above 50%
    DrawdownEmergency,
    /// Three or more bankruptcies in a row
    ConsecutiveBankruptcies,
}

impl fmt::Display for ConsultReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsultReason::PeriodicReview => write!(f, "periodic_review"),
            ConsultReason::DrawdownEmergency => write!(f, "drawdown_emergency"),
            ConsultReason::ConsecutiveBankruptcies => write!(f, "consecutive_bankruptcies"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupBrief {
    pub group: GroupId,
    pub style: String,
    pub bankroll: f64,
    pub alive_bots: usize,
    pub total_bots: usize,
    pub top_fitness: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnaBrief {
    pub name: String,
    pub group: GroupId,
    pub fitness: f64,
    pub bankroll: f64,
    pub win_rate: f64,
    pub active_strategies: usize,
    pub leverage: u32,
}

/// Community snapshot sent to the advisor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleContext {
    pub reason: ConsultReason,
    pub cycle: u64,
    pub community_bankroll: f64,
    pub community_initial: f64,
    pub groups: Vec<GroupBrief>,
    /// Top ten bots by fitness
    pub top_dna: Vec<DnaBrief>,
    /// `LEVEL:entity:Nx` for the latest milestones
    pub recent_milestones: Vec<String>,
    pub drawdown_percent: f64,
}

/// Optional knobs for `ADJUST_PARAMS`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionParams {
    #[serde(default, alias = "mutationBoost")]
    pub mutation_boost: Option<f64>,
    #[serde(default, alias = "evolutionInterval")]
    pub evolution_interval: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleDecision {
    pub recommendation: Recommendation,
    #[serde(default)]
    pub params: DecisionParams,
    #[serde(default)]
    pub reasoning: String,
    /// 0..=1
    #[serde(default)]
    pub confidence: f64,
}

impl OracleDecision {
    pub fn no_action(reasoning: impl Into<String>) -> Self {
        Self {
            recommendation: Recommendation::NoAction,
            params: DecisionParams::default(),
            reasoning: reasoning.into(),
            confidence: 0.0,
        }
    }
}
