//! Token-driven cell functions.
//!
//! Every function sees the arriving token, the cell it arrived at, the cell
//! it came from and the owning cluster. Success and failure codes go into
//! the token's memory; anything that touches other clusters or the cell
//! graph is handed back as a request and applied by the coordinator after
//! all tokens have run.

use alife_common::{SimParams, Vec2};

use crate::entities::{CellFunction, Cluster, Token};
use crate::grid::{CellRef, SpatialIndex};

pub mod computer;
pub mod constructor;
pub mod propulsion;
pub mod scanner;
pub mod sensor;
pub mod weapon;

/// Read-only view of the world available while tokens are processed.
pub struct ExecutionContext<'a> {
    pub params: &'a SimParams,
    pub index: &'a SpatialIndex,
    /// Position of the executing cluster in the world's cluster table.
    pub cluster_index: u32,
}

/// Energy particle to be created once the token pass is over.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingParticle {
    pub pos: Vec2,
    pub vel: Vec2,
    pub energy: f32,
    pub color: u8,
}

/// Change to the cell graph requested by a cell function.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuralMutation {
    /// New cell connected to `constructor`, created with exactly `energy`.
    AddCell {
        constructor: u32,
        rel_pos: Vec2,
        energy: f32,
        max_connections: u8,
        branch_number: u8,
        function: CellFunction,
    },
}

/// Request to move a fraction of a foreign cell's energy into a token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyDrain {
    pub target: CellRef,
    pub fraction: f32,
}

/// What a cell function hands back besides the token memory code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessingResult {
    pub new_particle: Option<PendingParticle>,
    pub mutation: Option<StructuralMutation>,
    pub drains: Vec<EnergyDrain>,
    /// Internal energy converted into cluster kinetic energy (negative when
    /// kinetic energy was released back into internal energy).
    pub energy_to_kinetic: f32,
}

/// Structure changes requested earlier in the same tick, so that functions
/// see the graph as it will be rather than as it was.
#[derive(Debug, Clone, Default)]
pub struct PendingStructure {
    pub added_connections: Vec<u8>,
    /// Grid slots promised to cells constructed this tick.
    pub claimed_slots: Vec<u32>,
}

impl PendingStructure {
    pub fn new(num_cells: usize) -> Self {
        Self { added_connections: vec![0; num_cells], claimed_slots: Vec::new() }
    }
}

/// Runs the function of `cell` for a token that arrived from `previous`.
pub fn execute(
    ctx: &ExecutionContext,
    token: &mut Token,
    cell: usize,
    previous: usize,
    cluster: &mut Cluster,
    pending: &mut PendingStructure,
) -> ProcessingResult {
    match cluster.cells[cell].function {
        CellFunction::None => ProcessingResult::default(),
        CellFunction::Computer { .. } => computer::process(ctx, token, cell, cluster),
        CellFunction::Propulsion => propulsion::process(ctx, token, cell, previous, cluster),
        CellFunction::Scanner => scanner::process(token, cell, previous, cluster),
        CellFunction::Constructor => constructor::process(ctx, token, cell, previous, cluster, pending),
        CellFunction::Sensor => sensor::process(ctx, token, cell, previous, cluster),
        CellFunction::Weapon => weapon::process(ctx, token, cell, cluster),
    }
}

/// Direction a token travels when it enters `cell` from `previous`, in the
/// cluster's own frame (degrees). Zero when both are the same cell.
pub(crate) fn token_orientation(cluster: &Cluster, cell: usize, previous: usize) -> f32 {
    let from = cluster.cells[previous].rel_pos;
    let to = cluster.cells[cell].rel_pos;
    alife_common::angle_of_vector(from - to)
}
