use alife_common::{angle_of_vector, unit_vector_of_angle, PRECISION};

use super::{ExecutionContext, PendingStructure, ProcessingResult, StructuralMutation};
use crate::entities::{CellFunction, Cluster, Token};
use crate::grid::{get_grid_cell_idx, CellRef};
use crate::token_memory::{self as mem, byte_to_angle, byte_to_distance, constructor::*};

/// Requests a new cell attached to the constructing cell. The token pays the
/// creation energy now; the cell itself appears when structural changes are
/// applied at the end of the token pass.
pub fn process(
    ctx: &ExecutionContext,
    token: &mut Token,
    cell: usize,
    previous: usize,
    cluster: &Cluster,
    pending: &mut PendingStructure,
) -> ProcessingResult {
    let mut result = ProcessingResult::default();
    if token.memory[IN] % NUM_COMMANDS == DO_NOTHING {
        token.memory[mem::OUT] = SUCCESS;
        return result;
    }

    let params = ctx.params;
    let host = &cluster.cells[cell];
    let used = host.connections.len() + pending.added_connections[cell] as usize;
    let limit = params.cell_max_connections as u16 + 1;
    let max_connections = (token.memory[IN_CELL_MAX_CONNECTIONS] as u16 % limit) as u8;
    if used >= host.max_connections as usize || max_connections == 0 {
        token.memory[mem::OUT] = ERROR_CONNECTION;
        return result;
    }

    if token.energy < params.cell_creation_energy + params.min_token_energy + PRECISION {
        token.memory[mem::OUT] = ERROR_NO_ENERGY;
        return result;
    }

    let heading = angle_of_vector(host.rel_pos - cluster.cells[previous].rel_pos)
        + byte_to_angle(token.memory[INOUT_ANGLE]);
    let rel_pos = host.rel_pos + unit_vector_of_angle(heading) * byte_to_distance(token.memory[IN_DISTANCE]);

    let world_pos = cluster.pos + rel_pos.rotate(cluster.angle);
    let slot = get_grid_cell_idx(world_pos, params);
    let own = CellRef { cluster: ctx.cluster_index, cell: cell as u32 };
    let occupied = matches!(ctx.index.cell_at(world_pos), Some(entry) if entry.cell != own);
    if occupied || pending.claimed_slots.contains(&slot) {
        token.memory[mem::OUT] = ERROR_OBSTACLE;
        return result;
    }

    token.energy -= params.cell_creation_energy;
    pending.added_connections[cell] += 1;
    pending.claimed_slots.push(slot);
    result.mutation = Some(StructuralMutation::AddCell {
        constructor: cell as u32,
        rel_pos,
        energy: params.cell_creation_energy,
        max_connections,
        branch_number: token.memory[IN_CELL_BRANCH_NUMBER] % params.max_token_branch_number.max(1),
        function: CellFunction::from_type_code(token.memory[IN_CELL_FUNCTION], params.cell_memory_size),
    });
    token.memory[mem::OUT] = SUCCESS;
    log::trace!("Cluster {}: cell {} requests a new cell at {:?}.", cluster.id, cell, rel_pos);
    result
}
