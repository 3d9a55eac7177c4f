pub mod config;
pub mod sim_params;
pub mod snapshot;
pub mod vecmath;

// Re-export key types for easier use by dependent crates
pub use config::{SimulationConfig, UniverseConfig, TimingConfig, InitialConditions, CellParamsConfig, OutputConfig};
pub use sim_params::{SimParams, NEAR_ZERO, PRECISION};
pub use snapshot::{
    CellDescription, CellFunctionDescription, ClusterDescription, ParticleDescription, Statistics,
    TokenDescription, WorldDescription,
};
pub use vecmath::{Vec2, angle_of_vector, normalize_angle, periodic_displacement, unit_vector_of_angle, wrap_position};
