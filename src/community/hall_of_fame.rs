//! Hall of fame: bots that reached 5x or more

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::bot::BotState;
use crate::types::GroupId;

pub const HALL_OF_FAME_LIMIT: usize = 50;
/// Smallest bankroll multiple that earns an entry
pub const HALL_OF_FAME_MULTIPLE: u32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HallOfFameEntry {
    pub name: String,
    pub bot_id: String,
    pub group: GroupId,
    pub fitness: f64,
    pub bankroll: f64,
    pub generation: u32,
    pub win_rate: f64,
    pub milestone: u32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HallOfFame {
    entries: VecDeque<HallOfFameEntry>,
}

impl HallOfFame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Induct `bot` for reaching `milestone`. Returns false below 5x.
    pub fn induct(&mut self, bot: &BotState, group: GroupId, milestone: u32) -> bool {
        if milestone < HALL_OF_FAME_MULTIPLE {
            return false;
        }
        self.entries.push_back(HallOfFameEntry {
            name: bot.name().to_string(),
            bot_id: bot.id().to_string(),
            group,
            fitness: bot.fitness,
            bankroll: bot.bankroll,
            generation: bot.genome.generation,
            win_rate: bot.win_rate(),
            milestone,
            timestamp: Utc::now(),
        });
        while self.entries.len() > HALL_OF_FAME_LIMIT {
            self.entries.pop_front();
        }
        true
    }

    pub fn entries(&self) -> &VecDeque<HallOfFameEntry> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }
}
