use serde::{Deserialize, Serialize};

use crate::vecmath::Vec2;

/// Floating point tolerance used by conservation checks and round-trips.
pub const NEAR_ZERO: f32 = 1.0e-4;

/// Slack added to energy sufficiency checks of cell functions.
pub const PRECISION: f32 = 1.0e-7;

/// Simulation parameters derived from the configuration, passed by reference
/// into every kernel call. Never mutated while a world is running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimParams {
    // World & Grid
    pub world_width: f32,
    pub world_height: f32,
    pub grid_dim_x: u32,
    pub grid_dim_y: u32,
    pub num_grid_cells: u32,

    // Randomness
    pub seed: u64,

    // Energy
    pub internal_to_kinetic_energy: f32,
    pub min_token_energy: f32,
    pub cell_min_energy: f32,
    pub cell_creation_energy: f32,

    // Structure
    pub cell_max_connections: u8,
    pub max_token_branch_number: u8,
    pub max_tokens_per_cell: u8,
    pub token_memory_size: usize,
    pub cell_memory_size: usize,

    // Cell functions
    pub sensor_range: f32,
    pub weapon_strength: f32,
    pub computer_max_instructions: usize,
    pub radiation_probability: f32,
    pub radiation_energy_fraction: f32,

    // Checks
    pub check_energy_conservation: bool,
}

impl SimParams {
    /// World size as a vector, the form the periodic helpers take.
    pub fn world_size(&self) -> Vec2 {
        Vec2::new(self.world_width, self.world_height)
    }

    /// Returns a copy with a different world size and matching grid.
    pub fn with_world_size(&self, width: u32, height: u32) -> Self {
        SimParams {
            world_width: width as f32,
            world_height: height as f32,
            grid_dim_x: width,
            grid_dim_y: height,
            num_grid_cells: width * height,
            ..self.clone()
        }
    }
}

impl Default for SimParams {
    fn default() -> Self {
        SimParams {
            world_width: 200.0,
            world_height: 200.0,
            grid_dim_x: 200,
            grid_dim_y: 200,
            num_grid_cells: 200 * 200,
            seed: 0,
            internal_to_kinetic_energy: 1.0,
            min_token_energy: 3.0,
            cell_min_energy: 50.0,
            cell_creation_energy: 100.0,
            cell_max_connections: 6,
            max_token_branch_number: 6,
            max_tokens_per_cell: 5,
            token_memory_size: 256,
            cell_memory_size: 8,
            sensor_range: 100.0,
            weapon_strength: 0.1,
            computer_max_instructions: 15,
            radiation_probability: 0.0,
            radiation_energy_fraction: 0.01,
            check_energy_conservation: true,
        }
    }
}
