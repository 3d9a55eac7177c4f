use super::{EnergyDrain, ExecutionContext, ProcessingResult};
use crate::entities::{Cluster, Token};
use crate::token_memory::{self as mem, weapon::*};

/// Strikes every foreign cell adjacent to the weapon cell. The drained energy
/// is credited to the token once all tokens of the tick have run.
pub fn process(ctx: &ExecutionContext, token: &mut Token, cell: usize, cluster: &Cluster) -> ProcessingResult {
    let pos = cluster.cell_world_pos(cell, ctx.params.world_size());
    let mut drains = Vec::new();
    ctx.index.for_each_neighbor(pos, |entry| {
        if entry.cell.cluster != ctx.cluster_index {
            drains.push(EnergyDrain { target: entry.cell, fraction: ctx.params.weapon_strength });
        }
    });

    token.memory[mem::OUT] = if drains.is_empty() { NO_TARGET } else { STRIKE_SUCCESSFUL };
    ProcessingResult { drains, ..Default::default() }
}
