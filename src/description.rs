//! Conversion between the running world and its serializable description,
//! plus world resizing.

use std::collections::{HashMap, HashSet};

use alife_common::{
    wrap_position, CellDescription, CellFunctionDescription, ClusterDescription, ParticleDescription, SimParams,
    TokenDescription, Vec2, WorldDescription,
};
use log::{debug, info};

use crate::entities::{Cell, CellFunction, Cluster, Particle, Token};
use crate::error::KernelError;
use crate::physics::tangential_velocity;
use crate::recluster::{build_clusters, flatten, verify_connectivity, FlatCell};
use crate::simulation::Simulation;
use crate::state::WorldState;

impl From<&CellFunction> for CellFunctionDescription {
    fn from(function: &CellFunction) -> Self {
        match function {
            CellFunction::None => CellFunctionDescription::None,
            CellFunction::Computer { code, memory } => CellFunctionDescription::Computer {
                code: code.clone(),
                memory: memory.clone(),
            },
            CellFunction::Propulsion => CellFunctionDescription::Propulsion,
            CellFunction::Scanner => CellFunctionDescription::Scanner,
            CellFunction::Constructor => CellFunctionDescription::Constructor,
            CellFunction::Sensor => CellFunctionDescription::Sensor,
            CellFunction::Weapon => CellFunctionDescription::Weapon,
        }
    }
}

impl From<&CellFunctionDescription> for CellFunction {
    fn from(function: &CellFunctionDescription) -> Self {
        match function {
            CellFunctionDescription::None => CellFunction::None,
            CellFunctionDescription::Computer { code, memory } => CellFunction::Computer {
                code: code.clone(),
                memory: memory.clone(),
            },
            CellFunctionDescription::Propulsion => CellFunction::Propulsion,
            CellFunctionDescription::Scanner => CellFunction::Scanner,
            CellFunctionDescription::Constructor => CellFunction::Constructor,
            CellFunctionDescription::Sensor => CellFunction::Sensor,
            CellFunctionDescription::Weapon => CellFunction::Weapon,
        }
    }
}

fn describe_cluster(cluster: &Cluster) -> ClusterDescription {
    let cells = cluster
        .cells
        .iter()
        .enumerate()
        .map(|(i, cell)| CellDescription {
            id: cell.id,
            rel_pos: cell.rel_pos,
            energy: cell.energy,
            max_connections: cell.max_connections,
            connections: cell.connections.iter().map(|&c| cluster.cells[c as usize].id).collect(),
            token_branch_number: cell.token_branch_number,
            color: cell.color,
            function: (&cell.function).into(),
            tokens: cluster
                .tokens
                .iter()
                .filter(|t| t.cell as usize == i)
                .map(|t| TokenDescription { energy: t.energy, memory: t.memory.clone() })
                .collect(),
        })
        .collect();

    ClusterDescription {
        id: cluster.id,
        pos: cluster.pos,
        vel: cluster.vel,
        angle: cluster.angle,
        angular_vel: cluster.angular_vel,
        cells,
    }
}

fn token_from(desc: &TokenDescription, cell: u32, memory_size: usize) -> Token {
    let mut memory = desc.memory.clone();
    memory.resize(memory_size, 0);
    Token { energy: desc.energy, memory, cell }
}

fn invalid(msg: String) -> KernelError {
    KernelError::InvalidDescription(msg)
}

impl Simulation {
    /// Captures the complete world.
    pub fn to_description(&self) -> WorldDescription {
        let state = self.state();
        let (world_width, world_height) = self.world_size();
        WorldDescription {
            world_width,
            world_height,
            timestep: state.timestep,
            next_id: state.next_id,
            clusters: state.clusters.iter().map(describe_cluster).collect(),
            particles: state
                .particles
                .iter()
                .map(|p| ParticleDescription { id: p.id, pos: p.pos, vel: p.vel, energy: p.energy, color: p.color })
                .collect(),
        }
    }

    /// Builds a world from a description. The world size comes from the
    /// description, every other constant from `params`.
    ///
    /// Clusters whose cells are connected among themselves only are taken as
    /// they are. Clusters that fall apart or are linked to other clusters are
    /// reclustered, so links across clusters merge them.
    pub fn from_description(desc: &WorldDescription, params: &SimParams) -> Result<Self, KernelError> {
        if desc.world_width == 0 || desc.world_height == 0 {
            return Err(KernelError::InvalidWorldSize { width: desc.world_width, height: desc.world_height });
        }
        let params = params.with_world_size(desc.world_width, desc.world_height);
        let world_size = params.world_size();

        // cell id -> (cluster index, cell index)
        let mut cell_at: HashMap<u64, (usize, usize)> = HashMap::new();
        let mut cluster_ids = HashSet::new();
        for (ci, cluster) in desc.clusters.iter().enumerate() {
            if !cluster_ids.insert(cluster.id) {
                return Err(invalid(format!("duplicate cluster id {}", cluster.id)));
            }
            for (i, cell) in cluster.cells.iter().enumerate() {
                if cell_at.insert(cell.id, (ci, i)).is_some() {
                    return Err(invalid(format!("duplicate cell id {}", cell.id)));
                }
            }
        }

        let mut needs_recluster = vec![false; desc.clusters.len()];
        for (ci, cluster) in desc.clusters.iter().enumerate() {
            if cluster.cells.is_empty() {
                return Err(invalid(format!("cluster {} has no cells", cluster.id)));
            }
            for cell in &cluster.cells {
                for &other in &cell.connections {
                    let &(oc, oi) = cell_at
                        .get(&other)
                        .ok_or_else(|| invalid(format!("cell {} connects to unknown cell {}", cell.id, other)))?;
                    if other == cell.id {
                        return Err(invalid(format!("cell {} connects to itself", cell.id)));
                    }
                    if !desc.clusters[oc].cells[oi].connections.contains(&cell.id) {
                        return Err(invalid(format!("connection {} -> {} is not mutual", cell.id, other)));
                    }
                    if oc != ci {
                        needs_recluster[ci] = true;
                    }
                }
            }
        }

        let max_id = cell_at
            .keys()
            .copied()
            .chain(cluster_ids.iter().copied())
            .chain(desc.particles.iter().map(|p| p.id))
            .max()
            .unwrap_or(0);
        let mut state = WorldState {
            next_id: desc.next_id.max(max_id + 1),
            timestep: desc.timestep,
            ..Default::default()
        };

        let mut clusters = Vec::with_capacity(desc.clusters.len());
        for (ci, cluster_desc) in desc.clusters.iter().enumerate() {
            if needs_recluster[ci] {
                continue;
            }
            let cluster = cluster_from(cluster_desc, &params)?;
            match verify_connectivity(&cluster) {
                Ok(()) => clusters.push(cluster),
                Err(KernelError::DisconnectedCluster { .. }) => needs_recluster[ci] = true,
                Err(err) => return Err(err),
            }
        }

        // cells of all clusters that need reclustering, connections resolved
        // to positions in this flat list
        let mut flat_index: HashMap<u64, usize> = HashMap::new();
        let mut flat: Vec<FlatCell> = Vec::new();
        for (ci, cluster_desc) in desc.clusters.iter().enumerate() {
            if !needs_recluster[ci] {
                continue;
            }
            for (i, cell_desc) in cluster_desc.cells.iter().enumerate() {
                let offset = cell_desc.rel_pos.rotate(cluster_desc.angle);
                flat_index.insert(cell_desc.id, flat.len());
                flat.push(FlatCell {
                    cell: cell_from(cell_desc, &[]),
                    pos: wrap_position(cluster_desc.pos + offset, world_size),
                    vel: tangential_velocity(offset, cluster_desc.vel, cluster_desc.angular_vel),
                    connections: Vec::new(),
                    tokens: cell_desc
                        .tokens
                        .iter()
                        .map(|t| token_from(t, i as u32, params.token_memory_size))
                        .collect(),
                    origin: cluster_desc.id,
                    origin_angle: cluster_desc.angle,
                });
            }
        }
        for (ci, cluster_desc) in desc.clusters.iter().enumerate() {
            if !needs_recluster[ci] {
                continue;
            }
            for cell_desc in &cluster_desc.cells {
                let connections = cell_desc
                    .connections
                    .iter()
                    .map(|id| flat_index.get(id).copied())
                    .collect::<Option<Vec<usize>>>()
                    .ok_or_else(|| invalid(format!("cell {} is linked to a complete cluster", cell_desc.id)))?;
                flat[flat_index[&cell_desc.id]].connections = connections;
            }
        }
        if !flat.is_empty() {
            let rebuilt = build_clusters(flat, world_size, &mut state.next_id);
            debug!("Restore: {} clusters rebuilt from linked or split input.", rebuilt.len());
            clusters.extend(rebuilt);
        }

        state.clusters = clusters;
        state.particles = desc
            .particles
            .iter()
            .map(|p| Particle {
                id: p.id,
                pos: wrap_position(p.pos, world_size),
                vel: p.vel,
                energy: p.energy,
                color: p.color,
            })
            .collect();

        let sim = Simulation::from_state(params, state)?;
        info!(
            "Restored world at timestep {}: {} clusters, {} particles.",
            sim.timestep(),
            sim.state().clusters.len(),
            sim.state().particles.len()
        );
        Ok(sim)
    }

    /// Changes the world size. With `scale_content` the old content is
    /// tiled into the new bounds with fresh ids and clusters whose center
    /// falls outside are dropped; otherwise everything is wrapped. Links
    /// longer than half the smaller new dimension are cut.
    pub fn resize(&mut self, width: u32, height: u32, scale_content: bool) -> Result<(), KernelError> {
        if width == 0 || height == 0 {
            return Err(KernelError::InvalidWorldSize { width, height });
        }
        let (old_width, old_height) = self.world_size();
        let params = self.params().with_world_size(width, height);
        let new_size = params.world_size();
        let mut state = self.take_state();

        if scale_content {
            let originals = std::mem::take(&mut state.clusters);
            let original_particles = std::mem::take(&mut state.particles);
            let tiles_x = width.div_ceil(old_width);
            let tiles_y = height.div_ceil(old_height);
            let inside = |p: Vec2| p.x < width as f32 && p.y < height as f32;

            for ty in 0..tiles_y {
                for tx in 0..tiles_x {
                    let offset = Vec2::new((tx * old_width) as f32, (ty * old_height) as f32);
                    let fresh = tx != 0 || ty != 0;
                    for cluster in &originals {
                        let pos = cluster.pos + offset;
                        if !inside(pos) {
                            continue;
                        }
                        let mut copy = cluster.clone();
                        copy.pos = pos;
                        if fresh {
                            copy.id = state.allocate_id();
                            for cell in &mut copy.cells {
                                cell.id = state.allocate_id();
                            }
                        }
                        state.clusters.push(copy);
                    }
                    for particle in &original_particles {
                        let pos = particle.pos + offset;
                        if !inside(pos) {
                            continue;
                        }
                        let id = if fresh { state.allocate_id() } else { particle.id };
                        state.particles.push(Particle { id, pos, ..particle.clone() });
                    }
                }
            }
        }

        for cluster in &mut state.clusters {
            cluster.pos = wrap_position(cluster.pos, new_size);
        }
        for particle in &mut state.particles {
            particle.pos = wrap_position(particle.pos, new_size);
        }

        let max_link = 0.5 * width.min(height) as f32;
        let clusters = std::mem::take(&mut state.clusters);
        let mut cut_links = 0usize;
        for mut cluster in clusters {
            let rel: Vec<Vec2> = cluster.cells.iter().map(|c| c.rel_pos).collect();
            let mut cut = false;
            for (i, cell) in cluster.cells.iter_mut().enumerate() {
                let before = cell.connections.len();
                cell.connections.retain(|&c| rel[i].distance(rel[c as usize]) <= max_link);
                cut |= cell.connections.len() != before;
                cut_links += before - cell.connections.len();
            }
            if cut {
                let flat = flatten(vec![cluster], new_size);
                state.clusters.extend(build_clusters(flat, new_size, &mut state.next_id));
            } else {
                state.clusters.push(cluster);
            }
        }

        *self = Simulation::from_state(params, state)?;
        info!(
            "Resized world from {}x{} to {}x{} ({} links cut).",
            old_width,
            old_height,
            width,
            height,
            cut_links / 2
        );
        Ok(())
    }
}

fn cell_from(desc: &CellDescription, connections: &[u32]) -> Cell {
    Cell {
        id: desc.id,
        rel_pos: desc.rel_pos,
        energy: desc.energy,
        max_connections: desc.max_connections,
        connections: connections.to_vec(),
        token_branch_number: desc.token_branch_number,
        color: desc.color,
        function: (&desc.function).into(),
    }
}

fn cluster_from(desc: &ClusterDescription, params: &SimParams) -> Result<Cluster, KernelError> {
    let local: HashMap<u64, u32> = desc.cells.iter().enumerate().map(|(i, c)| (c.id, i as u32)).collect();
    let mut cells = Vec::with_capacity(desc.cells.len());
    let mut tokens = Vec::new();
    for (i, cell_desc) in desc.cells.iter().enumerate() {
        let connections = cell_desc
            .connections
            .iter()
            .map(|id| local.get(id).copied())
            .collect::<Option<Vec<u32>>>()
            .ok_or_else(|| invalid(format!("cell {} links outside cluster {}", cell_desc.id, desc.id)))?;
        cells.push(cell_from(cell_desc, &connections));
        tokens.extend(cell_desc.tokens.iter().map(|t| token_from(t, i as u32, params.token_memory_size)));
    }
    Ok(Cluster {
        id: desc.id,
        pos: desc.pos,
        vel: desc.vel,
        angle: desc.angle,
        angular_vel: desc.angular_vel,
        cells,
        tokens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell_functions::test_support::chain;

    fn sample_world() -> Simulation {
        let mut a = chain(
            1,
            Vec2::new(20.0, 20.5),
            vec![
                CellFunction::None,
                CellFunction::Computer { code: vec![0, 40, 1], memory: vec![3; 8] },
                CellFunction::Weapon,
            ],
        );
        a.vel = Vec2::new(0.05, -0.02);
        a.angle = 45.0;
        a.angular_vel = 0.3;
        a.tokens.push(Token { energy: 12.0, memory: vec![7; 256], cell: 1 });
        let b = chain(2, Vec2::new(60.0, 70.5), vec![CellFunction::Sensor, CellFunction::Propulsion]);

        let mut state = WorldState::new();
        state.clusters = vec![a, b];
        state.refresh_next_id();
        state.add_particle(Vec2::new(5.5, 5.5), Vec2::new(0.1, 0.0), 4.0, 2);
        Simulation::from_state(SimParams::default(), state).expect("valid world")
    }

    #[test]
    fn description_round_trip_is_lossless() {
        let sim = sample_world();
        let desc = sim.to_description();
        let restored = Simulation::from_description(&desc, sim.params()).expect("restore");
        assert_eq!(restored.to_description(), desc);
        assert_eq!(restored.state(), sim.state());
    }

    #[test]
    fn binary_snapshot_with_every_function_kind_reads_back() {
        let desc = sample_world().to_description();
        let bytes = bincode::serialize(&desc).expect("encode");
        let decoded: WorldDescription = bincode::deserialize(&bytes).expect("decode");
        assert_eq!(decoded, desc);
        assert_eq!(bincode::serialize(&decoded).expect("re-encode"), bytes);

        let restored = Simulation::from_description(&decoded, &SimParams::default()).expect("restore");
        assert!(matches!(
            restored.state().clusters[0].cells[1].function,
            CellFunction::Computer { .. }
        ));
    }

    #[test]
    fn links_across_clusters_merge_them() {
        let mut desc = sample_world().to_description();
        // pull the second cluster next to the first and link them
        desc.clusters[1].pos = Vec2::new(20.0, 22.5);
        desc.clusters[1].angle = 0.0;
        let a_last = desc.clusters[0].cells[2].id;
        let b_first = desc.clusters[1].cells[0].id;
        desc.clusters[0].cells[2].connections.push(b_first);
        desc.clusters[1].cells[0].connections.push(a_last);

        let sim = Simulation::from_description(&desc, &SimParams::default()).expect("restore");
        assert_eq!(sim.state().clusters.len(), 1);
        assert_eq!(sim.state().clusters[0].cells.len(), 5);
        assert_eq!(sim.state().clusters[0].id, 1);
    }

    #[test]
    fn disconnected_cluster_is_split_on_restore() {
        let mut desc = sample_world().to_description();
        desc.clusters[1].cells[0].connections.clear();
        desc.clusters[1].cells[1].connections.clear();

        let sim = Simulation::from_description(&desc, &SimParams::default()).expect("restore");
        assert_eq!(sim.state().clusters.len(), 3);
        let ids: HashSet<u64> = sim.state().clusters.iter().map(|c| c.id).collect();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn broken_descriptions_are_rejected() {
        let mut desc = sample_world().to_description();
        desc.clusters[0].cells[0].connections.push(999);
        assert!(matches!(
            Simulation::from_description(&desc, &SimParams::default()),
            Err(KernelError::InvalidDescription(_))
        ));

        let mut desc = sample_world().to_description();
        let far_cell = desc.clusters[0].cells[2].id;
        desc.clusters[0].cells[0].connections.push(far_cell);
        assert!(matches!(
            Simulation::from_description(&desc, &SimParams::default()),
            Err(KernelError::InvalidDescription(_))
        ));

        let mut desc = sample_world().to_description();
        desc.world_width = 0;
        assert!(matches!(
            Simulation::from_description(&desc, &SimParams::default()),
            Err(KernelError::InvalidWorldSize { .. })
        ));
    }

    #[test]
    fn resize_with_scaling_tiles_content() {
        let mut sim = sample_world();
        let before = sim.statistics();
        sim.resize(400, 200, true).expect("resize");

        let after = sim.statistics();
        assert_eq!(sim.world_size(), (400, 200));
        assert_eq!(after.cluster_count, 2 * before.cluster_count);
        assert_eq!(after.particle_count, 2 * before.particle_count);
        assert!((after.total_internal_energy - 2.0 * before.total_internal_energy).abs() < 1e-3);

        let ids: HashSet<u64> = sim.state().clusters.iter().map(|c| c.id).collect();
        assert_eq!(ids.len(), 4);
        assert!(sim.state().clusters.iter().all(|c| c.pos.x < 400.0 && c.pos.y < 200.0));
    }

    #[test]
    fn resize_without_scaling_wraps_and_cuts_long_links() {
        let mut sim = sample_world();
        sim.resize(50, 50, false).expect("resize");

        assert_eq!(sim.world_size(), (50, 50));
        let stats = sim.statistics();
        assert_eq!(stats.cluster_count, 2);
        for cluster in &sim.state().clusters {
            assert!(cluster.pos.x < 50.0 && cluster.pos.y < 50.0);
            verify_connectivity(cluster).expect("still connected");
        }

        let energy = sim.statistics().total_internal_energy;
        sim.resize(1, 1, false).expect("resize");
        let stats = sim.statistics();
        assert_eq!(stats.cluster_count, 5);
        assert!(sim.state().clusters.iter().all(|c| c.cells.len() == 1 && c.cells[0].connections.is_empty()));
        assert!((stats.total_internal_energy - energy).abs() < 1e-3);
        assert!(matches!(sim.resize(0, 5, false), Err(KernelError::InvalidWorldSize { .. })));
    }
}
