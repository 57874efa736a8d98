use super::{Point2d, Vector2d};
use cgmath::prelude::*;
use std::f64::consts::TAU;

/// The unit vector pointing along `angle`, in radians.
pub fn unit_vector(angle: f64) -> Vector2d {
    Vector2d::new(angle.cos(), angle.sin())
}

/// The point at the given polar coordinates around the origin.
pub fn polar(radius: f64, angle: f64) -> Point2d {
    Point2d::from_vec(radius * unit_vector(angle))
}

/// The angle of a vector, in radians, in the range `[0, 2pi)`.
pub fn heading(vec: Vector2d) -> f64 {
    wrap_angle(vec.y.atan2(vec.x))
}

/// Wraps an angle into the range `[0, 2pi)`.
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(TAU);
    // `rem_euclid` can round up to exactly `TAU` for tiny negative inputs
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}
