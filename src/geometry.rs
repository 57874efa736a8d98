//! The layout of the roundabout.
//!
//! The origin is the centre of the ring. Leg `k` points along the angle
//! `k * pi / 2`, and circulating traffic travels in the direction of
//! decreasing angle. Inbound lanes sit on the side of a leg reached by
//! rotating it a quarter turn backwards; outbound lanes on the other side.

use crate::config::GeometryConfig;
use crate::math::{polar, unit_vector, wrap_angle, Point2d, QuadraticBezier2d, Vector2d};
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;
pub use transition::TransitionCurve;

mod transition;

/// One of the four approaches to the roundabout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Leg {
    East,
    South,
    West,
    North,
}

impl Leg {
    /// All legs, in order of increasing angle.
    pub const ALL: [Leg; 4] = [Leg::East, Leg::South, Leg::West, Leg::North];

    /// The index of the leg in [`Leg::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// The angle of the leg's centre line, in radians.
    pub fn angle(self) -> f64 {
        self.index() as f64 * FRAC_PI_2
    }

    /// The other three legs.
    pub fn others(self) -> impl Iterator<Item = Leg> {
        Leg::ALL.into_iter().filter(move |leg| *leg != self)
    }
}

/// The angle a circulating vehicle at `from` must travel to reach `to`.
///
/// The ring is traversed with decreasing angle, so the result is
/// `from - to` wrapped into `[0, 2pi)`.
pub fn forward_gap(from: f64, to: f64) -> f64 {
    wrap_angle(from - to)
}

/// The fixed geometry of a roundabout: the ring and the precomputed curves
/// joining it to each leg.
#[derive(Clone, Debug)]
pub struct Roundabout {
    config: GeometryConfig,
    /// Curves from each leg's stop line onto the ring.
    entry_curves: [TransitionCurve; 4],
    /// Curves from the ring onto each leg's outbound lane.
    exit_curves: [TransitionCurve; 4],
}

impl Roundabout {
    /// Builds the geometry, sampling the transition curves of every leg.
    pub fn new(config: &GeometryConfig) -> Self {
        let entry_curves = Leg::ALL.map(|leg| {
            let start = inbound_position(config, leg, config.stop_line);
            let control = start - config.entry_control * unit_vector(leg.angle());
            let end = polar(
                config.ring_radius,
                leg.angle() - config.entry_angle_offset,
            );
            let bezier = QuadraticBezier2d::new(&[start, control, end]);
            TransitionCurve::new(&bezier, config.curve_spacing)
        });

        let exit_curves = Leg::ALL.map(|leg| {
            let angle = leg.angle() + config.exit_threshold;
            let start = polar(config.ring_radius, angle);
            let control = start + config.exit_control * ring_tangent(angle);
            let end = outbound_position(config, leg, config.exit_end_distance);
            let bezier = QuadraticBezier2d::new(&[start, control, end]);
            TransitionCurve::new(&bezier, config.curve_spacing)
        });

        Self {
            config: config.clone(),
            entry_curves,
            exit_curves,
        }
    }

    /// The geometry configuration.
    pub fn config(&self) -> &GeometryConfig {
        &self.config
    }

    /// The radius of the circulating lane.
    pub fn ring_radius(&self) -> f64 {
        self.config.ring_radius
    }

    /// The curve from the stop line of `leg` onto the ring.
    pub fn entry_curve(&self, leg: Leg) -> &TransitionCurve {
        &self.entry_curves[leg.index()]
    }

    /// The curve from the ring onto the outbound lane of `leg`.
    pub fn exit_curve(&self, leg: Leg) -> &TransitionCurve {
        &self.exit_curves[leg.index()]
    }

    /// The ring angle at which vehicles from `leg` join the ring.
    pub fn entry_landing_angle(&self, leg: Leg) -> f64 {
        wrap_angle(leg.angle() - self.config.entry_angle_offset)
    }

    /// The ring angle at which vehicles bound for `leg` leave the ring.
    pub fn exit_start_angle(&self, leg: Leg) -> f64 {
        wrap_angle(leg.angle() + self.config.exit_threshold)
    }

    /// The position of a vehicle on the inbound lane of `leg`.
    pub fn inbound_position(&self, leg: Leg, distance: f64) -> Point2d {
        inbound_position(&self.config, leg, distance)
    }

    /// The position of a vehicle on the outbound lane of `leg`.
    pub fn outbound_position(&self, leg: Leg, distance: f64) -> Point2d {
        outbound_position(&self.config, leg, distance)
    }

    /// The position of a vehicle on the circulating lane.
    pub fn ring_position(&self, angle: f64) -> Point2d {
        polar(self.config.ring_radius, angle)
    }
}

/// The unit vector along the direction of travel at the given ring angle.
pub fn ring_tangent(angle: f64) -> Vector2d {
    Vector2d::new(angle.sin(), -angle.cos())
}

fn inbound_position(config: &GeometryConfig, leg: Leg, distance: f64) -> Point2d {
    polar(distance, leg.angle()) + config.lane_offset * unit_vector(leg.angle() - FRAC_PI_2)
}

fn outbound_position(config: &GeometryConfig, leg: Leg, distance: f64) -> Point2d {
    polar(distance, leg.angle()) + config.lane_offset * unit_vector(leg.angle() + FRAC_PI_2)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::math::heading;
    use assert_approx_eq::assert_approx_eq;
    use cgmath::prelude::*;
    use std::f64::consts::{PI, TAU};

    #[test]
    fn forward_gap_wraps() {
        assert_approx_eq!(forward_gap(1.0, 0.2), 0.8);
        assert_approx_eq!(forward_gap(0.2, 1.0), TAU - 0.8);
        assert_approx_eq!(forward_gap(0.1, 1.5 * PI), 0.1 + 0.5 * PI);
        assert_eq!(forward_gap(2.0, 2.0), 0.0);
    }

    #[test]
    fn legs_are_distinct() {
        assert_eq!(Leg::North.others().count(), 3);
        assert!(Leg::North.others().all(|leg| leg != Leg::North));
        assert_approx_eq!(Leg::West.angle(), PI);
    }

    #[test]
    fn tangent_points_along_travel() {
        // A small step in the direction of travel decreases the angle
        let angle = 1.0;
        let p = polar(145.0, angle) + 0.01 * ring_tangent(angle);
        assert!(heading(p.to_vec()) < angle);
    }

    #[test]
    fn entry_curves_join_ring() {
        let config = GeometryConfig::default();
        let roundabout = Roundabout::new(&config);
        for leg in Leg::ALL {
            let curve = roundabout.entry_curve(leg);
            let start = curve.sample(0.0).0;
            let end = curve.sample(curve.length()).0;
            assert_approx_eq!(start.distance(roundabout.inbound_position(leg, config.stop_line)), 0.0);
            assert_approx_eq!(end.to_vec().magnitude(), config.ring_radius, 1e-6);
            assert_approx_eq!(heading(end.to_vec()), roundabout.entry_landing_angle(leg), 1e-6);
        }
    }

    #[test]
    fn exit_curves_leave_ring() {
        let config = GeometryConfig::default();
        let roundabout = Roundabout::new(&config);
        for leg in Leg::ALL {
            let curve = roundabout.exit_curve(leg);
            let start = curve.sample(0.0).0;
            let end = curve.sample(curve.length()).0;
            assert_approx_eq!(heading(start.to_vec()), roundabout.exit_start_angle(leg), 1e-6);
            assert_approx_eq!(
                end.distance(roundabout.outbound_position(leg, config.exit_end_distance)),
                0.0
            );
        }
    }
}
