use std::collections::VecDeque;

use alife_common::angle_of_vector;

use super::{token_orientation, ProcessingResult};
use crate::entities::{Cluster, Token};
use crate::token_memory::{self as mem, angle_to_byte, energy_to_byte, scanner::*, ureal_to_byte};

/// Reports one cell of the own cluster per invocation, walking the cluster
/// breadth-first from the scanning cell.
pub fn process(token: &mut Token, cell: usize, previous: usize, cluster: &Cluster) -> ProcessingResult {
    let order = breadth_first_order(cluster, cell);
    let mut n = token.memory[INOUT_CELL_NUMBER] as usize;
    // the cell number is one byte, so a scan covers at most 256 cells
    let last = order.len().min(u8::MAX as usize + 1) - 1;

    let code = if n >= order.len() {
        n = 0;
        RESTART
    } else if n == last {
        FINISHED
    } else {
        SUCCESS
    };

    let scanned = &cluster.cells[order[n]];
    let orientation = token_orientation(cluster, cell, previous);
    let offset = scanned.rel_pos - cluster.cells[cell].rel_pos;

    token.memory[mem::OUT] = code;
    token.memory[OUT_ENERGY] = energy_to_byte(scanned.energy);
    token.memory[OUT_ANGLE] = if order[n] == cell {
        0
    } else {
        angle_to_byte(angle_of_vector(offset) - orientation)
    };
    token.memory[OUT_DISTANCE] = ureal_to_byte(offset.length());
    token.memory[OUT_MAX_CONNECTIONS] = scanned.max_connections;
    token.memory[OUT_BRANCH_NUMBER] = scanned.token_branch_number;
    token.memory[OUT_FUNCTION] = scanned.function.type_code();
    token.memory[INOUT_CELL_NUMBER] = if code == FINISHED { 0 } else { (n + 1) as u8 };

    ProcessingResult::default()
}

/// Local cell indices reachable from `start`, in breadth-first order with
/// neighbors visited in connection order.
pub(crate) fn breadth_first_order(cluster: &Cluster, start: usize) -> Vec<usize> {
    let mut visited = vec![false; cluster.cells.len()];
    let mut order = Vec::with_capacity(cluster.cells.len());
    let mut queue = VecDeque::from([start]);
    visited[start] = true;

    while let Some(current) = queue.pop_front() {
        order.push(current);
        for &next in &cluster.cells[current].connections {
            let next = next as usize;
            if !visited[next] {
                visited[next] = true;
                queue.push_back(next);
            }
        }
    }
    order
}
