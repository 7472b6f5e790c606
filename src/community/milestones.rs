//! Bankroll milestones at bot, group and community level
//!
//! A milestone is reached when an entity's bankroll hits 2x, 3x, 5x or 10x of
//! its own initial bankroll. Each multiple fires once per entity; the event
//! ledger keeps the latest 500.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use crate::types::GroupId;

pub const MILESTONE_MULTIPLES: [u32; 4] = [2, 3, 5, 10];
pub const MILESTONE_LEDGER_LIMIT: usize = 500;
pub const COMMUNITY_ENTITY: &str = "community";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MilestoneLevel {
    Bot,
    Group,
    Community,
}

impl fmt::Display for MilestoneLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MilestoneLevel::Bot => write!(f, "BOT"),
            MilestoneLevel::Group => write!(f, "GROUP"),
            MilestoneLevel::Community => write!(f, "COMMUNITY"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoneEvent {
    pub level: MilestoneLevel,
    pub entity_id: String,
    /// Owning group for bot and group events
    pub group: Option<GroupId>,
    pub milestone: u32,
    pub bankroll: f64,
    pub initial_bankroll: f64,
    pub cycle: u64,
    pub timestamp: DateTime<Utc>,
}

impl MilestoneEvent {
    /// `LEVEL:entity:Nx`
    pub fn label(&self) -> String {
        format!("{}:{}:{}x", self.level, self.entity_id, self.milestone)
    }
}

#[derive(Debug, Clone)]
pub struct BotBalance {
    pub bot_id: String,
    pub bankroll: f64,
    pub initial_bankroll: f64,
}

#[derive(Debug, Clone)]
pub struct GroupBalance {
    pub group: GroupId,
    pub bankroll: f64,
    pub initial_bankroll: f64,
    pub bots: Vec<BotBalance>,
}

/// Everything `check_all` needs for one cycle
#[derive(Debug, Clone)]
pub struct MilestoneInput {
    pub cycle: u64,
    pub total_bankroll: f64,
    pub initial_bankroll: f64,
    pub groups: Vec<GroupBalance>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MilestoneTracker {
    /// `LEVEL:entity` -> multiples already reached
    achieved: BTreeMap<String, BTreeSet<u32>>,
    events: VecDeque<MilestoneEvent>,
}

impl MilestoneTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(level: MilestoneLevel, entity: &str) -> String {
        format!("{}:{}", level, entity)
    }

    /// Check every entity and return the milestones reached for the first time
    pub fn check_all(&mut self, input: &MilestoneInput) -> Vec<MilestoneEvent> {
        let mut fresh = Vec::new();
        self.check(
            MilestoneLevel::Community,
            COMMUNITY_ENTITY,
            None,
            input.total_bankroll,
            input.initial_bankroll,
            input.cycle,
            &mut fresh,
        );
        for group in &input.groups {
            self.check(
                MilestoneLevel::Group,
                &group.group.to_string(),
                Some(group.group),
                group.bankroll,
                group.initial_bankroll,
                input.cycle,
                &mut fresh,
            );
            for bot in &group.bots {
                self.check(
                    MilestoneLevel::Bot,
                    &bot.bot_id,
                    Some(group.group),
                    bot.bankroll,
                    bot.initial_bankroll,
                    input.cycle,
                    &mut fresh,
                );
            }
        }
        fresh
    }

    #[allow(clippy::too_many_arguments)]
    fn check(
        &mut self,
        level: MilestoneLevel,
        entity: &str,
        group: Option<GroupId>,
        bankroll: f64,
        initial: f64,
        cycle: u64,
        out: &mut Vec<MilestoneEvent>,
    ) {
        if initial <= 0.0 {
            return;
        }
        let hit: Vec<u32> = MILESTONE_MULTIPLES
            .into_iter()
            .filter(|m| bankroll >= initial * *m as f64)
            .collect();
        // entities below 2x never get a key
        if hit.is_empty() {
            return;
        }
        let reached = self.achieved.entry(Self::key(level, entity)).or_default();
        for multiple in hit {
            if reached.insert(multiple) {
                let event = MilestoneEvent {
                    level,
                    entity_id: entity.to_string(),
                    group,
                    milestone: multiple,
                    bankroll,
                    initial_bankroll: initial,
                    cycle,
                    timestamp: Utc::now(),
                };
                self.events.push_back(event.clone());
                out.push(event);
            }
        }
        while self.events.len() > MILESTONE_LEDGER_LIMIT {
            self.events.pop_front();
        }
    }

    /// Multiples reached by an entity, ascending
    pub fn achieved(&self, level: MilestoneLevel, entity: &str) -> Vec<u32> {
        self.achieved
            .get(&Self::key(level, entity))
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Groups with at least one milestone
    pub fn groups_with_milestones(&self) -> usize {
        GroupId::ALL
            .iter()
            .filter(|g| !self.achieved(MilestoneLevel::Group, &g.to_string()).is_empty())
            .count()
    }

    pub fn events(&self) -> &VecDeque<MilestoneEvent> {
        &self.events
    }

    /// Latest `n` events, oldest first
    pub fn recent(&self, n: usize) -> Vec<MilestoneEvent> {
        let skip = self.events.len().saturating_sub(n);
        self.events.iter().skip(skip).cloned().collect()
    }

    pub fn reset(&mut self) {
        self.achieved.clear();
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_groups(group_bankroll: f64) -> Vec<GroupBalance> {
        GroupId::ALL
            .iter()
            .map(|g| GroupBalance {
                group: *g,
                bankroll: group_bankroll,
                initial_bankroll: 500.0,
                bots: (0..5)
                    .map(|i| BotBalance {
                        bot_id: format!("{}-{}", g, i),
                        bankroll: group_bankroll / 5.0,
                        initial_bankroll: 100.0,
                    })
                    .collect(),
            })
            .collect()
    }

    #[test]
    fn test_community_at_two_point_oh_four_fires_only_2x() {
        let mut tracker = MilestoneTracker::new();
        let events = tracker.check_all(&MilestoneInput {
            cycle: 1,
            total_bankroll: 5100.0,
            initial_bankroll: 2500.0,
            groups: Vec::new(),
        });
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, MilestoneLevel::Community);
        assert_eq!(events[0].milestone, 2);
        assert_eq!(tracker.achieved(MilestoneLevel::Community, COMMUNITY_ENTITY), vec![2]);
    }

    #[test]
    fn test_each_multiple_fires_once() {
        let mut tracker = MilestoneTracker::new();
        let input = MilestoneInput {
            cycle: 1,
            total_bankroll: 2500.0,
            initial_bankroll: 2500.0,
            groups: flat_groups(500.0),
        };
        assert!(tracker.check_all(&input).is_empty());

        let mut rich = input.clone();
        rich.groups[2].bankroll = 1600.0;
        rich.groups[2].bots[0].bankroll = 1000.0;
        let events = tracker.check_all(&rich);
        // GAMMA 2x+3x, its first bot 2x/3x/5x/10x
        assert_eq!(events.len(), 6);
        assert_eq!(tracker.groups_with_milestones(), 1);
        assert_eq!(events[0].label(), "GROUP:GAMMA:2x");

        assert!(tracker.check_all(&rich).is_empty());
        assert_eq!(tracker.recent(2).len(), 2);
        assert_eq!(tracker.recent(2)[1].milestone, 10);
    }

    #[test]
    fn test_ledger_is_bounded() {
        let mut tracker = MilestoneTracker::new();
        for i in 0..200 {
            tracker.check_all(&MilestoneInput {
                cycle: i,
                total_bankroll: 0.0,
                initial_bankroll: 2500.0,
                groups: vec![GroupBalance {
                    group: GroupId::Alpha,
                    bankroll: 0.0,
                    initial_bankroll: 500.0,
                    bots: vec![BotBalance {
                        bot_id: format!("bot-{}", i),
                        bankroll: 1000.0,
                        initial_bankroll: 100.0,
                    }],
                }],
            });
        }
        assert_eq!(tracker.events().len(), MILESTONE_LEDGER_LIMIT);
    }

    #[test]
    fn test_retired_bots_below_two_x_leave_no_keys() {
        let mut tracker = MilestoneTracker::new();
        for i in 0..1000 {
            tracker.check_all(&MilestoneInput {
                cycle: i,
                total_bankroll: 2400.0,
                initial_bankroll: 2500.0,
                groups: vec![GroupBalance {
                    group: GroupId::Beta,
                    bankroll: 480.0,
                    initial_bankroll: 500.0,
                    bots: vec![BotBalance {
                        bot_id: format!("retired-{}", i),
                        bankroll: 150.0,
                        initial_bankroll: 100.0,
                    }],
                }],
            });
        }
        assert!(tracker.achieved.is_empty());
        assert!(tracker.events().is_empty());

        let mut input = MilestoneInput {
            cycle: 1000,
            total_bankroll: 2400.0,
            initial_bankroll: 2500.0,
            groups: flat_groups(500.0),
        };
        input.groups[0].bots[1].bankroll = 250.0;
        assert_eq!(tracker.check_all(&input).len(), 1);
        assert_eq!(tracker.achieved.len(), 1);
    }
}
