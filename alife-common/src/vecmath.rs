use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

/// A simple 2D vector struct.
///
/// World coordinates grow right (x) and down (y). Angles are measured in
/// degrees, 0° points "up" along `(0, -1)` and positive angles turn clockwise
/// on screen.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Vec2 { x, y }
    }

    pub fn zero() -> Self {
        Vec2 { x: 0.0, y: 0.0 }
    }

    /// Calculates the squared length (magnitude) of the vector.
    pub fn length_squared(&self) -> f32 {
        self.x * self.x + self.y * self.y
    }

    /// Calculates the length (magnitude) of the vector.
    pub fn length(&self) -> f32 {
        self.length_squared().sqrt()
    }

    /// Unit vector in the same direction, or zero for (near) zero input.
    pub fn normalize_or_zero(&self) -> Self {
        let len_sq = self.length_squared();
        if len_sq > 1e-12 {
            let inv_len = 1.0 / len_sq.sqrt();
            Vec2 { x: self.x * inv_len, y: self.y * inv_len }
        } else {
            Vec2::zero()
        }
    }

    /// z-component of the 3D cross product of `self` and `other`.
    pub fn cross(&self, other: Vec2) -> f32 {
        self.x * other.y - self.y * other.x
    }

    /// Straight-line distance, ignoring the world's wrap-around.
    pub fn distance(&self, other: Vec2) -> f32 {
        (*self - other).length()
    }

    /// Rotates the vector clockwise (on screen) by `angle_deg` degrees.
    pub fn rotate(&self, angle_deg: f32) -> Self {
        let (sin, cos) = angle_deg.to_radians().sin_cos();
        Vec2 {
            x: self.x * cos - self.y * sin,
            y: self.x * sin + self.y * cos,
        }
    }

    /// Rotates the vector by a quarter turn counterclockwise (on screen).
    pub fn rotate_quarter_ccw(&self) -> Self {
        Vec2 { x: self.y, y: -self.x }
    }
}

impl Add for Vec2 {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self { x: self.x + other.x, y: self.y + other.y }
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, other: Self) {
        self.x += other.x;
        self.y += other.y;
    }
}

impl Sub for Vec2 {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self { x: self.x - other.x, y: self.y - other.y }
    }
}

impl SubAssign for Vec2 {
    fn sub_assign(&mut self, other: Self) {
        self.x -= other.x;
        self.y -= other.y;
    }
}

impl Neg for Vec2 {
    type Output = Self;
    fn neg(self) -> Self {
        Self { x: -self.x, y: -self.y }
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;
    fn mul(self, scalar: f32) -> Self {
        Self { x: self.x * scalar, y: self.y * scalar }
    }
}

impl Div<f32> for Vec2 {
    type Output = Self;
    fn div(self, scalar: f32) -> Self {
        Self { x: self.x / scalar, y: self.y / scalar }
    }
}

/// Unit vector pointing along `angle_deg` (0° = up, clockwise positive).
pub fn unit_vector_of_angle(angle_deg: f32) -> Vec2 {
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    Vec2::new(sin, -cos)
}

/// Angle of `v` in degrees, normalized to [0, 360). The zero vector maps to 0.
pub fn angle_of_vector(v: Vec2) -> f32 {
    if v.length_squared() <= 1e-12 {
        return 0.0;
    }
    normalize_angle(v.x.atan2(-v.y).to_degrees())
}

/// Normalizes an angle in degrees to [0, 360).
pub fn normalize_angle(angle_deg: f32) -> f32 {
    let a = angle_deg.rem_euclid(360.0);
    // rem_euclid may round up to exactly 360.0 for tiny negative inputs
    if a >= 360.0 { 0.0 } else { a }
}

/// Wraps a position into the toroidal world `[0, size.x) x [0, size.y)`.
pub fn wrap_position(pos: Vec2, size: Vec2) -> Vec2 {
    let mut x = pos.x.rem_euclid(size.x);
    let mut y = pos.y.rem_euclid(size.y);
    if x >= size.x { x = 0.0; }
    if y >= size.y { y = 0.0; }
    Vec2::new(x, y)
}

/// Shortest displacement from `from` to `to` on the torus of the given size.
pub fn periodic_displacement(from: Vec2, to: Vec2, size: Vec2) -> Vec2 {
    let mut d = to - from;
    let half_x = size.x * 0.5;
    let half_y = size.y * 0.5;
    d.x -= (d.x / size.x).round() * size.x;
    d.y -= (d.y / size.y).round() * size.y;
    // keep the result inside (-half, half]
    if d.x <= -half_x { d.x += size.x; }
    if d.y <= -half_y { d.y += size.y; }
    d
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn angle_conventions_match_screen_orientation() {
        assert!(approx(angle_of_vector(Vec2::new(0.0, -1.0)), 0.0));
        assert!(approx(angle_of_vector(Vec2::new(1.0, 0.0)), 90.0));
        assert!(approx(angle_of_vector(Vec2::new(0.0, 1.0)), 180.0));
        assert!(approx(angle_of_vector(Vec2::new(-1.0, 0.0)), 270.0));

        let v = unit_vector_of_angle(90.0);
        assert!(approx(v.x, 1.0) && approx(v.y, 0.0));
    }

    #[test]
    fn rotation_composes_with_unit_vectors() {
        let v = unit_vector_of_angle(30.0).rotate(45.0);
        let expected = unit_vector_of_angle(75.0);
        assert!(approx(v.x, expected.x) && approx(v.y, expected.y));
    }

    #[test]
    fn quarter_rotation_matches_full_rotation() {
        let v = Vec2::new(2.0, 1.0);
        let q = v.rotate_quarter_ccw();
        let r = v.rotate(-90.0);
        assert!(approx(q.x, r.x) && approx(q.y, r.y));
    }

    #[test]
    fn displacement_wraps_around_world_edges() {
        let size = Vec2::new(100.0, 50.0);
        let d = periodic_displacement(Vec2::new(98.0, 1.0), Vec2::new(2.0, 49.0), size);
        assert!(approx(d.x, 4.0));
        assert!(approx(d.y, -2.0));

        let p = wrap_position(Vec2::new(-1.0, 51.0), size);
        assert!(approx(p.x, 99.0) && approx(p.y, 1.0));
    }
}
