use alife_common::{unit_vector_of_angle, wrap_position, SimParams, Statistics, NEAR_ZERO};
use log::{debug, error, info, trace};
use rand::prelude::*;
use rayon::prelude::*;

use crate::cell_functions::{
    self, EnergyDrain, ExecutionContext, PendingParticle, PendingStructure, StructuralMutation,
};
use crate::entities::{Cell, Cluster, Token};
use crate::error::KernelError;
use crate::grid::SpatialIndex;
use crate::physics::integrate;
use crate::recluster::{build_clusters, flatten, verify_connectivity};
use crate::state::WorldState;
use crate::token_memory;

/// Everything one cluster asks for after its tokens have run.
#[derive(Debug, Default)]
struct ClusterOutcome {
    particles: Vec<PendingParticle>,
    mutations: Vec<StructuralMutation>,
    /// Drains keyed by the index of the acting token in the cluster's new
    /// token list.
    drains: Vec<(usize, EnergyDrain)>,
    energy_to_kinetic: f64,
}

/// Deterministic timestep kernel for one world.
#[derive(Debug, Clone)]
pub struct Simulation {
    params: SimParams,
    state: WorldState,
    index: SpatialIndex,
}

impl Simulation {
    /// Creates an empty world.
    pub fn new(params: SimParams) -> Self {
        let index = SpatialIndex::new(&params);
        info!("Created empty world of {}x{}.", params.world_width, params.world_height);
        Self { params, state: WorldState::new(), index }
    }

    /// Wraps an existing world state. Every cluster must be connected.
    pub fn from_state(params: SimParams, mut state: WorldState) -> Result<Self, KernelError> {
        for cluster in &state.clusters {
            verify_connectivity(cluster)?;
        }
        state.refresh_next_id();
        let mut index = SpatialIndex::new(&params);
        index.rebuild(&state.clusters);
        Ok(Self { params, state, index })
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn state(&self) -> &WorldState {
        &self.state
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    pub fn world_size(&self) -> (u32, u32) {
        (self.params.grid_dim_x, self.params.grid_dim_y)
    }

    pub fn timestep(&self) -> u64 {
        self.state.timestep
    }

    pub fn statistics(&self) -> Statistics {
        self.state.statistics()
    }

    /// Moves the world state out, leaving an empty world behind.
    pub(crate) fn take_state(&mut self) -> WorldState {
        std::mem::take(&mut self.state)
    }

    /// Advances the world by one timestep.
    ///
    /// On error the world is left in an unspecified state; callers restore
    /// a snapshot taken before the step.
    pub fn step(&mut self) -> Result<(), KernelError> {
        let timestep = self.state.timestep;

        // --- 1. Snapshot ---
        let energy_before = self.state.total_internal_energy();

        // --- 2. Token processing (parallel per cluster) ---
        let outcomes = self.process_tokens();
        let energy_to_kinetic: f64 = outcomes.iter().map(|o| o.energy_to_kinetic).sum();

        // --- 3. Pending particles, drains, exhausted tokens ---
        self.apply_pending(&outcomes);

        // --- 4. Structural changes ---
        self.apply_structure(outcomes)?;

        // --- 5. Motion ---
        self.integrate();

        // --- 6. Index rebuild and absorption ---
        self.index.rebuild(&self.state.clusters);
        self.absorb_particles();

        if self.params.check_energy_conservation {
            let energy_after = self.state.total_internal_energy();
            check_energy_balance(timestep, energy_before, energy_to_kinetic, energy_after)?;
        }

        self.state.timestep += 1;
        trace!(
            "Timestep {} done: {} clusters, {} particles.",
            timestep,
            self.state.clusters.len(),
            self.state.particles.len()
        );
        Ok(())
    }

    /// Moves every token one step along its branch and runs the functions
    /// of the cells it arrives at.
    fn process_tokens(&mut self) -> Vec<ClusterOutcome> {
        let params = &self.params;
        let index = &self.index;
        let timestep = self.state.timestep;

        self.state
            .clusters
            .par_iter_mut()
            .enumerate()
            .map(|(cluster_idx, cluster)| {
                let seed = params
                    .seed
                    .wrapping_add(cluster.id.wrapping_mul(0x1F3A))
                    .wrapping_add(timestep.wrapping_mul(0x58C7));
                let mut rng = StdRng::seed_from_u64(seed);
                let ctx = ExecutionContext { params, index, cluster_index: cluster_idx as u32 };
                process_cluster(&ctx, cluster, &mut rng)
            })
            .collect()
    }

    fn apply_pending(&mut self, outcomes: &[ClusterOutcome]) {
        for outcome in outcomes {
            for p in &outcome.particles {
                self.state.add_particle(p.pos, p.vel, p.energy, p.color);
            }
        }

        for (cluster_idx, outcome) in outcomes.iter().enumerate() {
            for &(token_idx, drain) in &outcome.drains {
                let Some(target) = self
                    .state
                    .clusters
                    .get_mut(drain.target.cluster as usize)
                    .and_then(|c| c.cells.get_mut(drain.target.cell as usize))
                else {
                    continue;
                };
                let amount = (target.energy * drain.fraction).clamp(0.0, target.energy.max(0.0));
                target.energy -= amount;
                if let Some(token) = self.state.clusters[cluster_idx].tokens.get_mut(token_idx) {
                    token.energy += amount;
                }
            }
        }

        let min_token_energy = self.params.min_token_energy;
        for cluster in &mut self.state.clusters {
            let Cluster { cells, tokens, .. } = cluster;
            // grouped by host cell, the order descriptions keep them in
            tokens.sort_by_key(|t| t.cell);
            tokens.retain(|token| {
                if token.energy < min_token_energy {
                    cells[token.cell as usize].energy += token.energy;
                    false
                } else {
                    true
                }
            });
        }
    }

    /// Adds requested cells, turns starving cells into particles and
    /// reclusters every cluster that changed.
    fn apply_structure(&mut self, outcomes: Vec<ClusterOutcome>) -> Result<(), KernelError> {
        let world_size = self.params.world_size();
        let mut touched = vec![false; self.state.clusters.len()];

        for (cluster_idx, outcome) in outcomes.into_iter().enumerate() {
            for mutation in outcome.mutations {
                let StructuralMutation::AddCell {
                    constructor,
                    rel_pos,
                    energy,
                    max_connections,
                    branch_number,
                    function,
                } = mutation;
                let id = self.state.allocate_id();
                let cluster = &mut self.state.clusters[cluster_idx];
                let new_idx = cluster.cells.len() as u32;
                let color = cluster.cells[constructor as usize].color;
                cluster.cells[constructor as usize].connections.push(new_idx);
                cluster.cells.push(Cell {
                    id,
                    rel_pos,
                    energy,
                    max_connections,
                    connections: vec![constructor],
                    token_branch_number: branch_number,
                    color,
                    function,
                });
                touched[cluster_idx] = true;
            }
        }

        let cell_min_energy = self.params.cell_min_energy;
        for (cluster_idx, cluster) in self.state.clusters.iter().enumerate() {
            if cluster.cells.iter().any(|c| c.energy < cell_min_energy) {
                touched[cluster_idx] = true;
            }
        }
        if !touched.contains(&true) {
            return Ok(());
        }

        let old_clusters = std::mem::take(&mut self.state.clusters);
        let mut clusters = Vec::with_capacity(old_clusters.len());
        let mut dead_cells = 0usize;
        let mut rebuilt = 0usize;

        for (cluster, touched) in old_clusters.into_iter().zip(touched) {
            if !touched {
                clusters.push(cluster);
                continue;
            }

            let flat = flatten(vec![cluster], world_size);
            let alive: Vec<bool> = flat.iter().map(|f| f.cell.energy >= cell_min_energy).collect();
            let mut new_index = vec![usize::MAX; flat.len()];
            let mut next = 0;
            for (i, &keep) in alive.iter().enumerate() {
                if keep {
                    new_index[i] = next;
                    next += 1;
                }
            }

            let mut survivors = Vec::with_capacity(next);
            for (mut flat_cell, keep) in flat.into_iter().zip(&alive) {
                if !*keep {
                    let energy = flat_cell.cell.energy + flat_cell.tokens.iter().map(|t| t.energy).sum::<f32>();
                    self.state.add_particle(flat_cell.pos, flat_cell.vel, energy, flat_cell.cell.color);
                    dead_cells += 1;
                    continue;
                }
                flat_cell.connections = flat_cell
                    .connections
                    .iter()
                    .filter(|&&c| alive.get(c).copied().unwrap_or(false))
                    .map(|&c| new_index[c])
                    .collect();
                survivors.push(flat_cell);
            }

            for rebuilt_cluster in build_clusters(survivors, world_size, &mut self.state.next_id) {
                if let Err(err) = verify_connectivity(&rebuilt_cluster) {
                    error!("Timestep {}: reclustering produced an invalid cluster: {}", self.state.timestep, err);
                    return Err(err);
                }
                rebuilt += 1;
                clusters.push(rebuilt_cluster);
            }
        }

        self.state.clusters = clusters;
        debug!(
            "Timestep {}: {} cells died, {} clusters rebuilt.",
            self.state.timestep, dead_cells, rebuilt
        );
        Ok(())
    }

    fn integrate(&mut self) {
        let world_size = self.params.world_size();
        self.state.clusters.par_iter_mut().for_each(|cluster| {
            let (pos, angle) = integrate(cluster.pos, cluster.vel, cluster.angle, cluster.angular_vel, world_size);
            cluster.pos = pos;
            cluster.angle = angle;
        });
        self.state.particles.par_iter_mut().for_each(|particle| {
            particle.pos = wrap_position(particle.pos + particle.vel, world_size);
        });
    }

    /// Particles sitting on a cell's slot hand their energy to that cell.
    fn absorb_particles(&mut self) {
        let WorldState { clusters, particles, .. } = &mut self.state;
        let index = &self.index;
        let before = particles.len();
        particles.retain(|particle| match index.cell_at(particle.pos) {
            Some(entry) => {
                clusters[entry.cell.cluster as usize].cells[entry.cell.cell as usize].energy += particle.energy;
                false
            }
            None => true,
        });
        if particles.len() != before {
            trace!("{} particles absorbed.", before - particles.len());
        }
    }
}

/// Token pass of a single cluster. Runs in parallel with other clusters and
/// only writes to its own cluster.
fn process_cluster(ctx: &ExecutionContext, cluster: &mut Cluster, rng: &mut StdRng) -> ClusterOutcome {
    let params = ctx.params;
    let world_size = params.world_size();
    let mut outcome = ClusterOutcome::default();

    // radiation: one draw per cell, regardless of probability
    for i in 0..cluster.cells.len() {
        let draw: f32 = rng.random();
        if draw < params.radiation_probability {
            let energy = cluster.cells[i].energy * params.radiation_energy_fraction;
            if energy > 0.0 {
                let angle = rng.random::<f32>() * 360.0;
                cluster.cells[i].energy -= energy;
                outcome.particles.push(PendingParticle {
                    pos: wrap_position(
                        cluster.cell_world_pos(i, world_size) + unit_vector_of_angle(angle),
                        world_size,
                    ),
                    vel: cluster.cell_velocity(i),
                    energy,
                    color: cluster.cells[i].color,
                });
            }
        }
    }

    if cluster.tokens.is_empty() {
        return outcome;
    }

    let old_tokens = std::mem::take(&mut cluster.tokens);
    let mut new_tokens: Vec<Token> = Vec::with_capacity(old_tokens.len());
    let mut arrivals = vec![0u8; cluster.cells.len()];
    let mut pending = PendingStructure::new(cluster.cells.len());
    let branches = params.max_token_branch_number.max(1);

    for token in old_tokens {
        let host = token.cell as usize;
        let next_branch = ((cluster.cells[host].token_branch_number as u16 + 1) % branches as u16) as u8;
        let mut successors: Vec<u32> = cluster.cells[host]
            .connections
            .iter()
            .copied()
            .filter(|&c| cluster.cells[c as usize].token_branch_number == next_branch)
            .collect();
        successors.sort_unstable();

        if successors.is_empty() {
            cluster.cells[host].energy += token.energy;
            trace!("Cluster {}: token consumed at cell {}.", cluster.id, host);
            continue;
        }

        let share = token.energy / successors.len() as f32;
        for &successor in &successors {
            let s = successor as usize;
            if arrivals[s] >= params.max_tokens_per_cell {
                cluster.cells[s].energy += share;
                continue;
            }
            arrivals[s] += 1;

            let mut moved = Token { energy: share, memory: token.memory.clone(), cell: successor };
            if let Some(slot) = moved.memory.get_mut(token_memory::BRANCH_NUMBER) {
                *slot = cluster.cells[s].token_branch_number;
            }
            let result = cell_functions::execute(ctx, &mut moved, s, host, cluster, &mut pending);

            let token_idx = new_tokens.len();
            new_tokens.push(moved);
            outcome.particles.extend(result.new_particle);
            outcome.mutations.extend(result.mutation);
            outcome.drains.extend(result.drains.into_iter().map(|d| (token_idx, d)));
            outcome.energy_to_kinetic += result.energy_to_kinetic as f64;
        }
    }

    cluster.tokens = new_tokens;
    outcome
}

/// Worst-case f32 rounding allowed per unit of energy in play during a tick.
const ROUNDING_ALLOWANCE: f64 = 32.0 * f32::EPSILON as f64;

/// Internal energy after a tick has to match the energy before it minus what
/// propulsion turned into motion. The allowance is an absolute `NEAR_ZERO`
/// floor plus f32 rounding on the energy in play; a NaN balance always fails.
fn check_energy_balance(timestep: u64, before: f64, to_kinetic: f64, after: f64) -> Result<(), KernelError> {
    let expected = before - to_kinetic;
    let tolerance = NEAR_ZERO as f64 + ROUNDING_ALLOWANCE * before.abs();
    let drift = (after - expected).abs();
    if drift <= tolerance {
        return Ok(());
    }
    error!(
        "Timestep {}: internal energy {:.6} differs from expected {:.6}.",
        timestep, after, expected
    );
    Err(KernelError::EnergyNotConserved { timestep, expected, actual: after })
}
