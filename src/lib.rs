//! EvoArena Library
//!
//! Evolutionary bot community: five groups of five paper-trading bots whose
//! genomes, and the nine seed modules shaping their decisions, evolve under
//! adaptive genetic selection.

pub mod arena;
pub mod bot;
pub mod community;
pub mod config;
pub mod error;
pub mod evolution;
pub mod genome;
pub mod market;
pub mod oracle;
pub mod persistence;
pub mod seeds;
pub mod types;
