//! Rigid-body helpers for clusters. Angles and angular velocities are in
//! degrees (per timestep); conversions to radians happen here only.

use alife_common::{normalize_angle, wrap_position, Vec2, NEAR_ZERO};

/// `0.5*m*|v|^2 + 0.5*I*w^2` with `w` converted to radians.
pub fn kinetic_energy(mass: f32, vel: Vec2, angular_mass: f32, angular_vel: f32) -> f32 {
    let w = angular_vel.to_radians();
    0.5 * mass * vel.length_squared() + 0.5 * angular_mass * w * w
}

/// Applies `impulse` at `lever_arm` (offset from the center of mass) and
/// returns the new linear and angular velocity.
pub fn apply_impulse(
    impulse: Vec2,
    lever_arm: Vec2,
    mass: f32,
    angular_mass: f32,
    vel: Vec2,
    angular_vel: f32,
) -> (Vec2, f32) {
    let new_vel = if mass > NEAR_ZERO { vel + impulse / mass } else { vel };
    let new_angular_vel = if angular_mass > NEAR_ZERO {
        angular_vel + (lever_arm.cross(impulse) / angular_mass).to_degrees()
    } else {
        angular_vel
    };
    (new_vel, new_angular_vel)
}

/// Velocity of the point at `rel_pos` on a body moving with `vel` and
/// rotating with `angular_vel`.
pub fn tangential_velocity(rel_pos: Vec2, vel: Vec2, angular_vel: f32) -> Vec2 {
    let w = angular_vel.to_radians();
    vel + Vec2::new(-rel_pos.y, rel_pos.x) * w
}

/// Moment of inertia of unit point masses about the origin.
pub fn angular_mass(rel_positions: impl Iterator<Item = Vec2>) -> f32 {
    rel_positions.map(|r| r.length_squared()).sum()
}

/// Advances a rigid state by one timestep, wrapping into the world.
pub fn integrate(pos: Vec2, vel: Vec2, angle: f32, angular_vel: f32, world_size: Vec2) -> (Vec2, f32) {
    (wrap_position(pos + vel, world_size), normalize_angle(angle + angular_vel))
}
