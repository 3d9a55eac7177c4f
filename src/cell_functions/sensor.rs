use alife_common::{angle_of_vector, periodic_displacement, unit_vector_of_angle, Vec2, PRECISION};

use super::{token_orientation, ExecutionContext, ProcessingResult};
use crate::entities::{Cluster, Token};
use crate::grid::GridEntry;
use crate::token_memory::{self as mem, angle_to_byte, byte_to_angle, byte_to_ureal, sensor::*, ureal_to_byte};

/// Looks for other clusters, either anywhere in range or along a beam.
/// Reads only the spatial index, so it never changes anything but the token.
pub fn process(
    ctx: &ExecutionContext,
    token: &mut Token,
    cell: usize,
    previous: usize,
    cluster: &Cluster,
) -> ProcessingResult {
    let cmd = token.memory[IN] % NUM_COMMANDS;
    if cmd == DO_NOTHING {
        token.memory[mem::OUT] = NOTHING_FOUND;
        return ProcessingResult::default();
    }

    let min_mass = byte_to_ureal(token.memory[IN_MIN_MASS]);
    let max_mass = match token.memory[IN_MAX_MASS] {
        0 => UNBOUNDED_MAX_MASS,
        b => byte_to_ureal(b),
    };

    let world_size = ctx.params.world_size();
    let cell_pos = cluster.cell_world_pos(cell, world_size);
    let orientation = token_orientation(cluster, cell, previous);

    if cmd == SEARCH_VICINITY {
        search_vicinity(ctx, token, cell_pos, orientation + cluster.angle, min_mass, max_mass);
        return ProcessingResult::default();
    }

    let cell_offset = cluster.cell_offset(cell);
    let dir = match cmd {
        SEARCH_BY_ANGLE => {
            let rel_angle = byte_to_angle(token.memory[INOUT_ANGLE]);
            unit_vector_of_angle(orientation + cluster.angle + rel_angle)
        }
        SEARCH_FROM_CENTER => cell_offset.normalize_or_zero(),
        _ => -cell_offset.normalize_or_zero(),
    };

    let own = ctx.cluster_index;
    let mut hit: Option<(GridEntry, f32)> = None;
    scan_beam(ctx, cell_pos, dir, |entries| {
        for entry in entries {
            if entry.cell.cluster == own {
                continue;
            }
            let Some(summary) = ctx.index.cluster(entry.cell.cluster) else {
                continue;
            };
            if summary.mass < min_mass - PRECISION || summary.mass > max_mass + PRECISION {
                continue;
            }
            // heaviest cluster wins, earliest hit on ties
            if hit.map_or(true, |(_, mass)| summary.mass > mass) {
                hit = Some((*entry, summary.mass));
            }
        }
        hit.is_some()
    });

    match hit {
        Some((entry, mass)) => {
            let dist = periodic_displacement(cell_pos, entry.pos, world_size).length();
            token.memory[mem::OUT] = CLUSTER_FOUND;
            token.memory[OUT_DISTANCE] = ureal_to_byte(dist);
            token.memory[OUT_MASS] = ureal_to_byte(mass);
        }
        None => token.memory[mem::OUT] = NOTHING_FOUND,
    }
    ProcessingResult::default()
}

fn search_vicinity(
    ctx: &ExecutionContext,
    token: &mut Token,
    cell_pos: Vec2,
    world_orientation: f32,
    min_mass: f32,
    max_mass: f32,
) {
    let world_size = ctx.params.world_size();
    let found = ctx.index.find_nearby_cluster(
        cell_pos,
        ctx.params.sensor_range,
        min_mass,
        max_mass,
        Some(ctx.cluster_index),
    );
    let Some((target, summary)) = found.and_then(|t| ctx.index.cluster(t).map(|s| (t, *s))) else {
        token.memory[mem::OUT] = NOTHING_FOUND;
        return;
    };

    token.memory[mem::OUT] = CLUSTER_FOUND;
    token.memory[OUT_MASS] = ureal_to_byte(summary.mass);

    let dir = periodic_displacement(cell_pos, summary.pos, world_size).normalize_or_zero();
    token.memory[INOUT_ANGLE] = angle_to_byte(angle_of_vector(dir) - world_orientation);

    let mut distance: Option<f32> = None;
    scan_beam(ctx, cell_pos, dir, |entries| {
        distance = entries
            .iter()
            .find(|entry| entry.cell.cluster == target)
            .map(|entry| periodic_displacement(cell_pos, entry.pos, world_size).length());
        distance.is_some()
    });

    match distance {
        Some(d) => token.memory[OUT_DISTANCE] = ureal_to_byte(d),
        None => token.memory[mem::OUT] = NOTHING_FOUND,
    }
}

/// Walks a beam from `origin` in steps of two units up to the sensor range.
/// `step` receives the occupied slots of the 3x3 block around each beam
/// position and returns true to stop.
fn scan_beam<F>(ctx: &ExecutionContext, origin: Vec2, dir: Vec2, mut step: F)
where
    F: FnMut(&[GridEntry]) -> bool,
{
    let mut beam = origin;
    let mut entries = Vec::with_capacity(9);
    let mut d = 1.0;
    while d < ctx.params.sensor_range {
        beam += dir * 2.0;
        entries.clear();
        ctx.index.for_each_neighbor(beam, |entry| entries.push(entry));
        if step(&entries) {
            return;
        }
        d += 2.0;
    }
}
