//! Particles, cells, clusters and tokens.
//!
//! Cells live in their cluster's `cells` arena and refer to each other by
//! local `u32` index; tokens refer to their host cell the same way. A cell
//! never outlives or leaves its cluster except through reclustering.

use alife_common::{wrap_position, Vec2};

use crate::physics;

/// Free-floating energy carrier.
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub id: u64,
    pub pos: Vec2,
    pub vel: Vec2,
    pub energy: f32,
    pub color: u8,
}

/// Behavior variant of a cell, invoked by arriving tokens.
#[derive(Debug, Clone, PartialEq)]
pub enum CellFunction {
    None,
    Computer { code: Vec<u8>, memory: Vec<u8> },
    Propulsion,
    Scanner,
    Constructor,
    Sensor,
    Weapon,
}

impl CellFunction {
    pub const NUM_TYPES: u8 = 7;

    /// Stable numeric code, reported by scanners and read by constructors.
    pub fn type_code(&self) -> u8 {
        match self {
            CellFunction::None => 0,
            CellFunction::Computer { .. } => 1,
            CellFunction::Propulsion => 2,
            CellFunction::Scanner => 3,
            CellFunction::Constructor => 4,
            CellFunction::Sensor => 5,
            CellFunction::Weapon => 6,
        }
    }

    /// Builds a fresh function from its type code (taken modulo the number of
    /// types). Computers start with an empty program and zeroed memory.
    pub fn from_type_code(code: u8, cell_memory_size: usize) -> Self {
        match code % Self::NUM_TYPES {
            1 => CellFunction::Computer {
                code: Vec::new(),
                memory: vec![0; cell_memory_size],
            },
            2 => CellFunction::Propulsion,
            3 => CellFunction::Scanner,
            4 => CellFunction::Constructor,
            5 => CellFunction::Sensor,
            6 => CellFunction::Weapon,
            _ => CellFunction::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub id: u64,
    /// Position relative to the cluster center in the cluster's own frame.
    pub rel_pos: Vec2,
    pub energy: f32,
    pub max_connections: u8,
    /// Local indices of connected cells in the same cluster.
    pub connections: Vec<u32>,
    pub token_branch_number: u8,
    pub color: u8,
    pub function: CellFunction,
}

impl Cell {
    pub fn is_connected_to(&self, other: u32) -> bool {
        self.connections.contains(&other)
    }
}

/// Mobile energy + memory carrier hosted by a cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub energy: f32,
    pub memory: Vec<u8>,
    /// Local index of the host cell.
    pub cell: u32,
}

/// Rigid aggregate of connected cells sharing one kinematic state.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub id: u64,
    pub pos: Vec2,
    pub vel: Vec2,
    /// Degrees, in [0, 360).
    pub angle: f32,
    /// Degrees per timestep.
    pub angular_vel: f32,
    pub cells: Vec<Cell>,
    pub tokens: Vec<Token>,
}

impl Cluster {
    /// Every cell carries unit mass.
    pub fn mass(&self) -> f32 {
        self.cells.len() as f32
    }

    pub fn angular_mass(&self) -> f32 {
        physics::angular_mass(self.cells.iter().map(|c| c.rel_pos))
    }

    /// Offset of a cell from the cluster center in world orientation.
    pub fn cell_offset(&self, cell: usize) -> Vec2 {
        self.cells[cell].rel_pos.rotate(self.angle)
    }

    /// World position of a cell, wrapped into the world.
    pub fn cell_world_pos(&self, cell: usize, world_size: Vec2) -> Vec2 {
        wrap_position(self.pos + self.cell_offset(cell), world_size)
    }

    /// Velocity of the material point at a cell.
    pub fn cell_velocity(&self, cell: usize) -> Vec2 {
        physics::tangential_velocity(self.cell_offset(cell), self.vel, self.angular_vel)
    }

    pub fn linear_kinetic_energy(&self) -> f32 {
        physics::kinetic_energy(self.mass(), self.vel, 0.0, 0.0)
    }

    pub fn rotational_kinetic_energy(&self) -> f32 {
        physics::kinetic_energy(0.0, Vec2::zero(), self.angular_mass(), self.angular_vel)
    }

    /// Energy held by the cells and tokens of this cluster.
    pub fn internal_energy(&self) -> f64 {
        let cells: f64 = self.cells.iter().map(|c| c.energy as f64).sum();
        let tokens: f64 = self.tokens.iter().map(|t| t.energy as f64).sum();
        cells + tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_cell_cluster() -> Cluster {
        let cell = |id, x: f32| Cell {
            id,
            rel_pos: Vec2::new(x, 0.0),
            energy: 100.0,
            max_connections: 2,
            connections: Vec::new(),
            token_branch_number: 0,
            color: 0,
            function: CellFunction::None,
        };
        Cluster {
            id: 1,
            pos: Vec2::new(10.0, 10.0),
            vel: Vec2::zero(),
            angle: 90.0,
            angular_vel: 0.0,
            cells: vec![cell(2, -0.5), cell(3, 0.5)],
            tokens: Vec::new(),
        }
    }

    #[test]
    fn world_position_follows_cluster_angle() {
        let cluster = two_cell_cluster();
        let p = cluster.cell_world_pos(1, Vec2::new(100.0, 100.0));
        assert!((p.x - 10.0).abs() < 1e-4);
        assert!((p.y - 10.5).abs() < 1e-4);
    }

    #[test]
    fn type_codes_round_trip() {
        for code in 0..CellFunction::NUM_TYPES {
            assert_eq!(CellFunction::from_type_code(code, 8).type_code(), code);
        }
    }

    #[test]
    fn mass_counts_cells() {
        let cluster = two_cell_cluster();
        assert_eq!(cluster.mass(), 2.0);
        assert!((cluster.angular_mass() - 0.5).abs() < 1e-6);
    }
}
