//! Whole-kernel scenarios: several ticks over populated worlds, checked for
//! the properties every tick has to keep.

use alife_common::{SimParams, SimulationConfig, Vec2, WorldDescription};

use crate::controller::SimulationController;
use crate::entities::{Cell, CellFunction, Cluster, Token};
use crate::recluster::verify_connectivity;
use crate::simulation::Simulation;
use crate::state::WorldState;
use crate::token_memory::{self as mem, propulsion, sensor};
use crate::world_setup::populate;

const CONFIG: &str = r#"
    [universe]
    width = 160
    height = 120

    [timing]
    total_steps = 200
    record_interval_steps = 10

    [initial_conditions]
    seed = 2024
    num_organisms = 12
    cells_per_organism = 5
    cell_energy = 100.0
    token_energy = 60.0
    tokens_per_organism = 2
    num_particles = 60

    [cell_params]
    radiation_probability = 0.02

    [output]
    base_filename = "scenario"
    save_stats = false
    save_snapshot = false
"#;

fn populated() -> Simulation {
    let config = SimulationConfig::from_toml_str(CONFIG).unwrap();
    populate(&config).unwrap()
}

fn assert_consistent(sim: &Simulation) {
    for cluster in &sim.state().clusters {
        verify_connectivity(cluster).unwrap();
        for token in &cluster.tokens {
            assert!((token.cell as usize) < cluster.cells.len());
            assert!(token.energy >= sim.params().min_token_energy);
        }
    }
    for particle in &sim.state().particles {
        assert!(particle.energy > 0.0);
    }
}

#[test]
fn runs_are_deterministic() {
    let mut a = populated();
    let mut b = populated();
    for _ in 0..60 {
        a.step().unwrap();
        b.step().unwrap();
    }
    assert_eq!(a.state(), b.state());
    assert_eq!(a.timestep(), 60);
}

#[test]
fn energy_is_conserved_and_clusters_stay_connected() {
    let mut sim = populated();
    // every step checks the internal energy balance itself
    assert!(sim.params().check_energy_conservation);
    let start = sim.statistics();

    for _ in 0..200 {
        sim.step().unwrap();
        assert_consistent(&sim);
    }

    let end = sim.statistics();
    assert_eq!(end.timestep, 200);
    assert!(end.cell_count > 0);
    // propulsion only ever moves a sliver of the internal energy
    let rel = (start.total_internal_energy - end.total_internal_energy).abs() / start.total_internal_energy;
    assert!(rel < 0.05, "internal energy drifted by {}", rel);
}

#[test]
fn description_survives_ticks_and_encodings() {
    let mut sim = populated();
    for _ in 0..25 {
        sim.step().unwrap();
    }
    let desc = sim.to_description();

    let bytes = bincode::serialize(&desc).unwrap();
    let from_bincode: WorldDescription = bincode::deserialize(&bytes).unwrap();
    assert_eq!(bincode::serialize(&from_bincode).unwrap(), bytes);

    let packed = rmp_serde::to_vec(&desc).unwrap();
    let from_msgpack: WorldDescription = rmp_serde::from_slice(&packed).unwrap();
    assert_eq!(from_msgpack, desc);

    let mut restored = Simulation::from_description(&from_bincode, sim.params()).unwrap();
    assert_eq!(restored.to_description(), desc);
    assert_eq!(restored.state(), sim.state());

    // a restored world carries on exactly like the original
    for _ in 0..10 {
        sim.step().unwrap();
        restored.step().unwrap();
    }
    assert_eq!(restored.state(), sim.state());
}

#[test]
fn json_snapshot_restores() {
    let mut sim = populated();
    for _ in 0..5 {
        sim.step().unwrap();
    }
    let text = serde_json::to_string(&sim.to_description()).unwrap();
    let desc: WorldDescription = serde_json::from_str(&text).unwrap();
    let restored = Simulation::from_description(&desc, sim.params()).unwrap();
    assert_eq!(restored.statistics().cell_count, sim.statistics().cell_count);
    assert_eq!(restored.timestep(), 5);
}

#[test]
fn scaled_resize_tiles_a_running_world() {
    let mut sim = populated();
    for _ in 0..10 {
        sim.step().unwrap();
    }
    let before = sim.statistics();
    sim.resize(320, 120, true).unwrap();
    let after = sim.statistics();

    assert_eq!(sim.world_size(), (320, 120));
    assert_eq!(after.cell_count, 2 * before.cell_count);
    assert_eq!(after.particle_count, 2 * before.particle_count);
    let rel = (after.total_internal_energy - 2.0 * before.total_internal_energy).abs() / after.total_internal_energy;
    assert!(rel < 1e-6);

    for _ in 0..10 {
        sim.step().unwrap();
    }
    assert_consistent(&sim);
}

#[test]
fn controller_history_matches_a_fresh_run() {
    let mut controller = SimulationController::new(populated(), 5);
    controller.set_run(true);
    for _ in 0..10 {
        assert!(controller.update().unwrap());
    }
    for _ in 0..3 {
        assert!(controller.step_backward().unwrap());
    }

    let mut fresh = populated();
    for _ in 0..7 {
        fresh.step().unwrap();
    }
    assert_eq!(controller.simulation().state(), fresh.state());
}

/// L-shaped cluster A-B-C on slot centers, with B away from the center of
/// mass so that "from center" points somewhere.
fn l_shape(propulsion_power: u8, token_energy: f32) -> Simulation {
    let params = SimParams::default();
    let center = Vec2::new(21.5 - 1.0 / 3.0, 20.5 + 1.0 / 3.0);
    let cell = |id: u64, rel: Vec2, connections: Vec<u32>, branch: u8, function: CellFunction| Cell {
        id,
        rel_pos: rel,
        energy: 100.0,
        max_connections: 2,
        connections,
        token_branch_number: branch,
        color: 0,
        function,
    };
    let cells = vec![
        cell(11, Vec2::new(-2.0 / 3.0, -1.0 / 3.0), vec![1], 0, CellFunction::None),
        cell(12, Vec2::new(1.0 / 3.0, -1.0 / 3.0), vec![0, 2], 1, CellFunction::Propulsion),
        cell(13, Vec2::new(1.0 / 3.0, 2.0 / 3.0), vec![1], 2, CellFunction::None),
    ];
    let mut memory = vec![0u8; params.token_memory_size];
    memory[propulsion::IN] = propulsion::FROM_CENTER;
    memory[propulsion::IN_POWER] = propulsion_power;
    let cluster = Cluster {
        id: 1,
        pos: center,
        vel: Vec2::zero(),
        angle: 0.0,
        angular_vel: 0.0,
        cells,
        tokens: vec![Token { energy: token_energy, memory, cell: 0 }],
    };
    let mut state = WorldState::new();
    state.clusters.push(cluster);
    Simulation::from_state(params, state).unwrap()
}

#[test]
fn three_cell_cluster_thrusts_away_from_center() {
    // byte 10 encodes a thrust power of 0.002
    let mut sim = l_shape(10, 100.0);
    sim.step().unwrap();

    let cluster = &sim.state().clusters[0];
    let token = &cluster.tokens[0];
    assert_eq!(token.cell, 1);
    assert_eq!(token.memory[mem::OUT], propulsion::SUCCESS);

    let dir = cluster.vel.normalize_or_zero();
    let expected_dir = Vec2::new(1.0, -1.0).normalize_or_zero();
    assert!(dir.distance(expected_dir) < 1e-3);
    assert!((cluster.vel.length() - 0.002 / 3.0).abs() < 1e-6);
    assert!(cluster.angular_vel.abs() < 1e-4);

    // exhaust lands in the empty slot inside the L and stays there
    assert_eq!(sim.state().particles.len(), 1);
    let exhaust = &sim.state().particles[0];
    let gained = 1.5 * cluster.vel.length_squared();
    assert!((exhaust.energy - gained).abs() < 1e-9);
    assert!((token.energy - (100.0 - 2.0 * exhaust.energy)).abs() < 1e-5);
}

#[test]
fn three_cell_cluster_without_energy_stays_put() {
    let params = SimParams::default();
    let mut sim = l_shape(10, params.min_token_energy);
    sim.step().unwrap();

    let cluster = &sim.state().clusters[0];
    assert_eq!(cluster.tokens[0].memory[mem::OUT], propulsion::ERROR_NO_ENERGY);
    assert_eq!(cluster.vel, Vec2::zero());
    assert!(sim.state().particles.is_empty());
}

fn sensor_world() -> Simulation {
    let params = SimParams::default();
    let mut watcher = crate::cell_functions::test_support::chain(
        1,
        Vec2::new(40.0, 40.5),
        vec![CellFunction::None, CellFunction::Sensor],
    );
    let mut memory = vec![0u8; params.token_memory_size];
    memory[sensor::IN] = sensor::SEARCH_VICINITY;
    watcher.tokens.push(Token { energy: 50.0, memory, cell: 0 });
    let target = crate::cell_functions::test_support::chain(
        2,
        Vec2::new(52.0, 33.5),
        vec![CellFunction::None, CellFunction::None],
    );
    let mut state = WorldState::new();
    state.clusters = vec![watcher, target];
    Simulation::from_state(params, state).unwrap()
}

#[test]
fn identical_worlds_sense_identically() {
    let mut a = sensor_world();
    let mut b = sensor_world();
    a.step().unwrap();
    b.step().unwrap();

    let ta = &a.state().clusters[0].tokens[0];
    let tb = &b.state().clusters[0].tokens[0];
    assert_eq!(ta.memory[mem::OUT], sensor::CLUSTER_FOUND);
    assert_eq!(ta.memory[sensor::OUT_MASS], 2);
    assert_eq!(ta.memory, tb.memory);
}
