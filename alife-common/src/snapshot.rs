use serde::{Deserialize, Serialize};

use crate::vecmath::Vec2;

/// Aggregate statistics of a world at a specific timestep.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub timestep: u64,
    pub cluster_count: u32,
    pub cell_count: u32,
    pub particle_count: u32,
    pub token_count: u32,
    /// Energy held by particles, cells and tokens.
    pub total_internal_energy: f64,
    pub total_linear_kinetic_energy: f64,
    pub total_rotational_kinetic_energy: f64,
}

/// Complete, lossless description of a world. This is the exchange format
/// handed to persistence and editing collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldDescription {
    pub world_width: u32,
    pub world_height: u32,
    pub timestep: u64,
    /// Next free id for clusters, cells and particles.
    pub next_id: u64,
    pub clusters: Vec<ClusterDescription>,
    pub particles: Vec<ParticleDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterDescription {
    pub id: u64,
    pub pos: Vec2,
    pub vel: Vec2,
    /// Degrees.
    pub angle: f32,
    /// Degrees per timestep.
    pub angular_vel: f32,
    pub cells: Vec<CellDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellDescription {
    pub id: u64,
    /// Position relative to the cluster center, unrotated.
    pub rel_pos: Vec2,
    pub energy: f32,
    pub max_connections: u8,
    /// Ids of connected cells. May reference cells of other clusters, in which
    /// case the clusters are merged when the description is loaded.
    pub connections: Vec<u64>,
    pub token_branch_number: u8,
    pub color: u8,
    pub function: CellFunctionDescription,
    pub tokens: Vec<TokenDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellFunctionDescription {
    None,
    Computer { code: Vec<u8>, memory: Vec<u8> },
    Propulsion,
    Scanner,
    Constructor,
    Sensor,
    Weapon,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenDescription {
    pub energy: f32,
    pub memory: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleDescription {
    pub id: u64,
    pub pos: Vec2,
    pub vel: Vec2,
    pub energy: f32,
    pub color: u8,
}
