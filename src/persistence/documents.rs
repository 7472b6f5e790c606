//! File names and schema versions of every persisted concern

use super::Document;
use crate::community::{CommunitySnapshot, HallOfFame, MilestoneTracker};
use crate::evolution::{DnaVectorMemory, EvolutionRegistry};
use crate::oracle::OracleLog;

impl Document for CommunitySnapshot {
    const FILE_NAME: &'static str = "community-state.json";
    const VERSION: u32 = 1;
}

impl Document for MilestoneTracker {
    const FILE_NAME: &'static str = "milestones.json";
    const VERSION: u32 = 1;
}

impl Document for DnaVectorMemory {
    const FILE_NAME: &'static str = "dna-memory.json";
    const VERSION: u32 = 1;
}

impl Document for OracleLog {
    const FILE_NAME: &'static str = "oracle-log.json";
    const VERSION: u32 = 1;
}

impl Document for EvolutionRegistry {
    const FILE_NAME: &'static str = "evolution-registry.json";
    const VERSION: u32 = 1;
}

impl Document for HallOfFame {
    const FILE_NAME: &'static str = "hall-of-fame.json";
    const VERSION: u32 = 1;
}
