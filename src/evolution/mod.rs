//! Evolution machinery shared by every group
//!
//! - `adaptive`: mutation intensity from deaths and stagnation
//! - `genetics`: crossover, mutation and migrant perturbation
//! - `fitness`: bot fitness score
//! - `memory`: experience memory that guides replacement children
//! - `registry`: per-dimension evolution snapshots

pub mod adaptive;
pub mod fitness;
pub mod genetics;
pub mod memory;
pub mod registry;

pub use adaptive::{
    apply_directional_bias, AdaptiveMutationEngine, DeathTriggerState, MutationDirection,
    MutationProfile, MutationType,
};
pub use fitness::calculate_fitness;
pub use genetics::{crossover, mutate, perturb_migrant, MutationPlan};
pub use memory::{DnaVectorMemory, Experience, MemoryStats, TopPattern};
pub use registry::{DimensionSummary, EvolutionRegistry, EvolutionSnapshot, BOT_DIMENSION};
