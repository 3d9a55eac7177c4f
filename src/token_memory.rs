//! Byte layout of token memory and the quantization shared by all cell
//! functions. Token memory is the instruction set of the simulated
//! organisms, so these numbers are part of the world's semantics.

pub const BRANCH_NUMBER: usize = 0;
/// Output slot shared by every cell function.
pub const OUT: usize = 5;

pub mod propulsion {
    pub const IN: usize = 8;
    pub const IN_ANGLE: usize = 9;
    pub const IN_POWER: usize = 10;

    pub const NUM_COMMANDS: u8 = 7;
    pub const DO_NOTHING: u8 = 0;
    pub const BY_ANGLE: u8 = 1;
    pub const FROM_CENTER: u8 = 2;
    pub const TOWARD_CENTER: u8 = 3;
    pub const ROTATION_CLOCKWISE: u8 = 4;
    pub const ROTATION_COUNTERCLOCKWISE: u8 = 5;
    pub const DAMP_ROTATION: u8 = 6;

    pub const SUCCESS: u8 = 0;
    pub const SUCCESS_DAMPING_FINISHED: u8 = 1;
    pub const ERROR_NO_ENERGY: u8 = 2;
}

pub mod scanner {
    pub const INOUT_CELL_NUMBER: usize = 12;
    pub const OUT_ENERGY: usize = 13;
    pub const OUT_ANGLE: usize = 14;
    pub const OUT_DISTANCE: usize = 15;
    pub const OUT_MAX_CONNECTIONS: usize = 16;
    pub const OUT_BRANCH_NUMBER: usize = 17;
    pub const OUT_FUNCTION: usize = 18;

    pub const SUCCESS: u8 = 0;
    pub const FINISHED: u8 = 1;
    pub const RESTART: u8 = 2;
}

pub mod sensor {
    pub const IN: usize = 20;
    pub const INOUT_ANGLE: usize = 21;
    pub const IN_MIN_MASS: usize = 22;
    pub const IN_MAX_MASS: usize = 23;
    pub const OUT_MASS: usize = 24;
    pub const OUT_DISTANCE: usize = 25;

    pub const NUM_COMMANDS: u8 = 5;
    pub const DO_NOTHING: u8 = 0;
    pub const SEARCH_VICINITY: u8 = 1;
    pub const SEARCH_BY_ANGLE: u8 = 2;
    pub const SEARCH_FROM_CENTER: u8 = 3;
    pub const SEARCH_TOWARD_CENTER: u8 = 4;

    pub const NOTHING_FOUND: u8 = 0;
    pub const CLUSTER_FOUND: u8 = 1;

    /// Upper mass bound used when the token leaves the max mass byte at zero.
    pub const UNBOUNDED_MAX_MASS: f32 = 16000.0;
}

pub mod constructor {
    pub const IN: usize = 6;
    pub const INOUT_ANGLE: usize = 30;
    pub const IN_DISTANCE: usize = 31;
    pub const IN_CELL_MAX_CONNECTIONS: usize = 32;
    pub const IN_CELL_BRANCH_NUMBER: usize = 33;
    pub const IN_CELL_FUNCTION: usize = 34;

    pub const NUM_COMMANDS: u8 = 2;
    pub const DO_NOTHING: u8 = 0;
    pub const CONSTRUCT: u8 = 1;

    pub const SUCCESS: u8 = 0;
    pub const ERROR_NO_ENERGY: u8 = 2;
    pub const ERROR_OBSTACLE: u8 = 3;
    pub const ERROR_CONNECTION: u8 = 4;
}

pub mod weapon {
    pub const NO_TARGET: u8 = 0;
    pub const STRIKE_SUCCESSFUL: u8 = 1;
}

pub mod computer {
    pub const SUCCESS: u8 = 0;
    pub const ERROR_INVALID_PROGRAM: u8 = 1;
}

/// Angle in degrees to byte: [-180, 180) maps onto the signed byte range with
/// 128 steps per half turn, truncating toward zero.
pub fn angle_to_byte(angle_deg: f32) -> u8 {
    let mut a = angle_deg % 360.0;
    if a >= 180.0 {
        a -= 360.0;
    }
    if a < -180.0 {
        a += 360.0;
    }
    // -180 is the only angle that reaches -128
    (a * 128.0 / 180.0) as i8 as u8
}

/// Byte to angle in degrees, at the center of the byte's interval so that
/// `angle_to_byte(byte_to_angle(b)) == b`. Byte 128 owns a single angle.
pub fn byte_to_angle(b: u8) -> f32 {
    match b {
        0..=127 => (b as f32 + 0.5) * (180.0 / 128.0),
        128 => -180.0,
        _ => (b as f32 - 256.5) * (180.0 / 128.0),
    }
}

/// Non-negative real (distance, mass) to byte: floor, clamped to [0, 127].
pub fn ureal_to_byte(r: f32) -> u8 {
    if r.is_nan() || r <= 0.0 {
        return 0;
    }
    r.min(127.0).floor() as u8
}

pub fn byte_to_ureal(b: u8) -> f32 {
    b as f32
}

/// Energy to byte for scanner output: floor, clamped to [0, 255].
pub fn energy_to_byte(e: f32) -> u8 {
    if e.is_nan() || e <= 0.0 {
        return 0;
    }
    e.min(255.0).floor() as u8
}

pub fn byte_to_thrust_power(b: u8) -> f32 {
    (b as f32 + 10.0) / 10000.0
}

/// Inverse of [`byte_to_thrust_power`], rounding to the nearest byte.
pub fn thrust_power_to_byte(power: f32) -> u8 {
    (power * 10000.0 - 10.0).round().clamp(0.0, 255.0) as u8
}

/// Distance of a newly constructed cell from its constructor.
pub fn byte_to_distance(b: u8) -> f32 {
    1.0 + b as f32 / 128.0
}
