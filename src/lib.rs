// ABOUTME: Library interface for the urbanwind diagnostic urban wind field engine
// ABOUTME: Exposes the simulation entry points while keeping internal organization

pub mod engine;

// Re-export key engine components for library users
pub use engine::config::{
    GridConfig, ProfileConfig, ProfileType, ReferenceWind, RunConfig, SolverConfig,
};
pub use engine::error::{ConfigError, Warning, WarningKind};
pub use engine::geometry::{Building, VegetationPatch};
pub use engine::sim::{CancellationToken, Simulation, WindFieldResult};
pub use engine::solver::SolverStatus;
