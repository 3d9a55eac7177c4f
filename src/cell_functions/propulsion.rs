use alife_common::{unit_vector_of_angle, wrap_position, Vec2, PRECISION};

use super::{token_orientation, ExecutionContext, PendingParticle, ProcessingResult};
use crate::entities::{Cluster, Token};
use crate::physics::{apply_impulse, kinetic_energy, tangential_velocity};
use crate::token_memory::{self as mem, byte_to_angle, byte_to_thrust_power, propulsion::*};

/// Thrusts the cluster from the cell's position. The kinetic energy gained is
/// paid twice by the token: once into the cluster's motion and once into an
/// exhaust particle carrying the same amount.
pub fn process(
    ctx: &ExecutionContext,
    token: &mut Token,
    cell: usize,
    previous: usize,
    cluster: &mut Cluster,
) -> ProcessingResult {
    let mut result = ProcessingResult::default();
    let cmd = token.memory[IN] % NUM_COMMANDS;
    let angle = byte_to_angle(token.memory[IN_ANGLE]);
    let power = byte_to_thrust_power(token.memory[IN_POWER]);

    if cmd == DO_NOTHING {
        token.memory[mem::OUT] = SUCCESS;
        return result;
    }

    let mass = cluster.mass();
    let angular_mass = cluster.angular_mass();
    let e_kin_old = kinetic_energy(mass, cluster.vel, angular_mass, cluster.angular_vel);

    let cell_offset = cluster.cell_offset(cell);
    let tang_vel = tangential_velocity(cell_offset, cluster.vel, cluster.angular_vel);
    let quarter = cell_offset.rotate_quarter_ccw().normalize_or_zero();

    let impulse = match cmd {
        BY_ANGLE => {
            let thrust_angle = token_orientation(cluster, cell, previous) + cluster.angle + angle;
            unit_vector_of_angle(thrust_angle) * power
        }
        FROM_CENTER => cell_offset.normalize_or_zero() * power,
        TOWARD_CENTER => -cell_offset.normalize_or_zero() * power,
        ROTATION_CLOCKWISE => -quarter * power,
        ROTATION_COUNTERCLOCKWISE => quarter * power,
        DAMP_ROTATION if cluster.angular_vel > 0.0 => quarter * power,
        DAMP_ROTATION if cluster.angular_vel < 0.0 => -quarter * power,
        _ => Vec2::zero(),
    };

    let (new_vel, new_angular_vel) =
        apply_impulse(impulse, cell_offset, mass, angular_mass, cluster.vel, cluster.angular_vel);

    if cmd == DAMP_ROTATION {
        let old = cluster.angular_vel;
        if (old > 0.0 && new_angular_vel < 0.0) || (old < 0.0 && new_angular_vel > 0.0) {
            token.memory[mem::OUT] = SUCCESS_DAMPING_FINISHED;
            return result;
        }
    }

    let e_kin_new = kinetic_energy(mass, new_vel, angular_mass, new_angular_vel);
    let energy_diff = (e_kin_new - e_kin_old) / ctx.params.internal_to_kinetic_energy;

    if token.energy >= energy_diff + energy_diff.abs() + ctx.params.min_token_energy + PRECISION {
        if energy_diff != 0.0 {
            let thrust_dir = impulse.normalize_or_zero();
            let cell_pos = cluster.pos + cell_offset;
            result.new_particle = Some(PendingParticle {
                pos: wrap_position(cell_pos - thrust_dir, ctx.params.world_size()),
                vel: tang_vel - thrust_dir / 4.0,
                energy: energy_diff.abs(),
                color: cluster.cells[cell].color,
            });
        }

        cluster.vel = new_vel;
        cluster.angular_vel = new_angular_vel;
        token.energy -= energy_diff + energy_diff.abs();
        result.energy_to_kinetic = energy_diff;
        token.memory[mem::OUT] = SUCCESS;
    } else {
        token.memory[mem::OUT] = ERROR_NO_ENERGY;
    }
    result
}
