use alife_common::{Statistics, Vec2};

use crate::entities::{Cluster, Particle};

/// Owns every entity of a running world.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldState {
    pub clusters: Vec<Cluster>,
    pub particles: Vec<Particle>,
    /// Next free id, shared by clusters, cells and particles.
    pub next_id: u64,
    pub timestep: u64,
}

impl WorldState {
    pub fn new() -> Self {
        Self { next_id: 1, ..Default::default() }
    }

    /// Hands out a fresh id.
    pub fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Adds a new particle at the end and returns its id. Zero-energy
    /// particles are never created.
    pub fn add_particle(&mut self, pos: Vec2, vel: Vec2, energy: f32, color: u8) -> Option<u64> {
        if energy <= 0.0 {
            return None;
        }
        let id = self.allocate_id();
        self.particles.push(Particle { id, pos, vel, energy, color });
        Some(id)
    }

    /// Energy held by particles, cells and tokens.
    pub fn total_internal_energy(&self) -> f64 {
        let particles: f64 = self.particles.iter().map(|p| p.energy as f64).sum();
        let clusters: f64 = self.clusters.iter().map(|c| c.internal_energy()).sum();
        particles + clusters
    }

    pub fn cell_count(&self) -> usize {
        self.clusters.iter().map(|c| c.cells.len()).sum()
    }

    pub fn token_count(&self) -> usize {
        self.clusters.iter().map(|c| c.tokens.len()).sum()
    }

    /// Keeps `next_id` ahead of every id in use.
    pub fn refresh_next_id(&mut self) {
        let max_cluster = self.clusters.iter().map(|c| c.id);
        let max_cell = self.clusters.iter().flat_map(|c| c.cells.iter().map(|cell| cell.id));
        let max_particle = self.particles.iter().map(|p| p.id);
        let max_id = max_cluster.chain(max_cell).chain(max_particle).max().unwrap_or(0);
        self.next_id = self.next_id.max(max_id + 1);
    }

    pub fn statistics(&self) -> Statistics {
        Statistics {
            timestep: self.timestep,
            cluster_count: self.clusters.len() as u32,
            cell_count: self.cell_count() as u32,
            particle_count: self.particles.len() as u32,
            token_count: self.token_count() as u32,
            total_internal_energy: self.total_internal_energy(),
            total_linear_kinetic_energy: self.clusters.iter().map(|c| c.linear_kinetic_energy() as f64).sum(),
            total_rotational_kinetic_energy: self
                .clusters
                .iter()
                .map(|c| c.rotational_kinetic_energy() as f64)
                .sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_particles_need_energy() {
        let mut state = WorldState::new();
        let a = state.add_particle(Vec2::zero(), Vec2::zero(), 1.0, 0);
        let b = state.add_particle(Vec2::zero(), Vec2::zero(), 0.0, 0);
        let c = state.add_particle(Vec2::zero(), Vec2::zero(), 2.5, 0);
        assert_eq!(a, Some(1));
        assert_eq!(b, None);
        assert_eq!(c, Some(2));
        assert_eq!(state.particles.len(), 2);
        assert!((state.total_internal_energy() - 3.5).abs() < 1e-9);
    }

    #[test]
    fn refresh_moves_next_id_past_existing_ids() {
        let mut state = WorldState::new();
        state.particles.push(Particle { id: 41, pos: Vec2::zero(), vel: Vec2::zero(), energy: 1.0, color: 0 });
        state.refresh_next_id();
        assert_eq!(state.allocate_id(), 42);
    }
}
