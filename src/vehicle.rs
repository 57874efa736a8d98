use self::acceleration::{AccelerationModel, Leader};
use crate::behavior::{BehaviorKind, BehaviorProfile};
use crate::config::SimulationConfig;
use crate::geometry::{forward_gap, ring_tangent, Leg, Roundabout};
use crate::math::{heading, unit_vector, wrap_angle, Point2d, Vector2d};
use crate::util::Interval;
use crate::VehicleId;
use cgmath::prelude::*;
use serde::Serialize;
use std::cell::Cell;

mod acceleration;

/// Where a vehicle is on its journey, with the position that is meaningful there.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum JourneyState {
    /// Travelling inbound on the entry leg.
    Approaching {
        /// The distance from the ring centre.
        distance: f64,
    },
    /// Following the entry curve from the stop line onto the ring.
    Entering {
        /// The distance travelled along the entry curve.
        progress: f64,
    },
    /// Travelling around the ring.
    Circulating {
        /// The ring angle in `[0, 2pi)`, which decreases as the vehicle moves.
        angle: f64,
    },
    /// Following the exit curve from the ring onto the exit leg.
    Exiting {
        /// The distance travelled along the exit curve.
        progress: f64,
    },
    /// Travelling outbound on the exit leg.
    StraightOut {
        /// The distance from the ring centre.
        distance: f64,
    },
}

/// The stages of a journey, in the only order they can occur.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Approaching,
    Entering,
    Circulating,
    Exiting,
    StraightOut,
}

impl Phase {
    /// Whether vehicles in this phase share the circulating stream.
    pub fn is_ring(self) -> bool {
        matches!(self, Phase::Entering | Phase::Circulating | Phase::Exiting)
    }
}

impl JourneyState {
    /// The phase of the journey.
    pub fn phase(&self) -> Phase {
        match self {
            JourneyState::Approaching { .. } => Phase::Approaching,
            JourneyState::Entering { .. } => Phase::Entering,
            JourneyState::Circulating { .. } => Phase::Circulating,
            JourneyState::Exiting { .. } => Phase::Exiting,
            JourneyState::StraightOut { .. } => Phase::StraightOut,
        }
    }
}

/// The fixed attributes of a new vehicle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VehicleAttributes {
    /// The driver's behaviour.
    pub behavior: BehaviorKind,
    /// The leg the vehicle enters from.
    pub entry: Leg,
    /// The leg the vehicle leaves by; never the entry leg.
    pub exit: Leg,
}

/// A simulated vehicle.
#[derive(Clone, Debug)]
pub struct Vehicle {
    /// The vehicle's ID
    pub(crate) id: VehicleId,
    /// The driver's behaviour.
    behavior: BehaviorKind,
    /// The acceleration model
    acc: AccelerationModel,
    /// The leg the vehicle enters from.
    entry: Leg,
    /// The leg the vehicle leaves by.
    exit: Leg,
    /// The current stage of the journey.
    state: JourneyState,
    /// The velocity.
    vel: f64,
    /// Whether the vehicle is held at the stop line by the merge judge this frame.
    blocked: Cell<bool>,
    /// The time spent queueing on the approach in s.
    wait_time: f64,
    /// The number of conflicts the vehicle has been involved in.
    conflicts: usize,
    /// The simulation time at which the vehicle was created.
    spawned_at: f64,
}

/// A read-only view of a vehicle for rendering and reporting.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VehicleSnapshot {
    pub id: VehicleId,
    pub behavior: BehaviorKind,
    pub state: JourneyState,
    /// The world space coordinates of the centre of the vehicle.
    pub position: Point2d,
    /// The direction of travel, in radians.
    pub heading: f64,
    pub speed: f64,
    pub wait_time: f64,
    pub conflicts: usize,
}

impl Vehicle {
    /// Creates a new vehicle.
    pub(crate) fn new(
        id: VehicleId,
        attributes: &VehicleAttributes,
        state: JourneyState,
        vel: f64,
        now: f64,
        config: &SimulationConfig,
    ) -> Self {
        debug_assert_ne!(attributes.entry, attributes.exit);
        Self {
            id,
            behavior: attributes.behavior,
            acc: AccelerationModel::new(attributes.behavior.profile(), config.following.brake_factor),
            entry: attributes.entry,
            exit: attributes.exit,
            state,
            vel: f64::max(vel, 0.0),
            blocked: Cell::new(false),
            wait_time: 0.0,
            conflicts: 0,
            spawned_at: now,
        }
    }

    /// Gets the vehicle's ID.
    pub fn id(&self) -> VehicleId {
        self.id
    }

    /// The driver's behaviour.
    pub fn behavior(&self) -> BehaviorKind {
        self.behavior
    }

    /// The driver's car-following parameters.
    pub fn profile(&self) -> &BehaviorProfile {
        self.acc.profile()
    }

    /// The leg the vehicle enters from.
    pub fn entry(&self) -> Leg {
        self.entry
    }

    /// The leg the vehicle leaves by.
    pub fn exit(&self) -> Leg {
        self.exit
    }

    /// The current stage of the journey.
    pub fn state(&self) -> JourneyState {
        self.state
    }

    /// The phase of the journey.
    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    /// The vehicle's velocity.
    pub fn vel(&self) -> f64 {
        self.vel
    }

    /// The time spent queueing on the approach in s.
    pub fn wait_time(&self) -> f64 {
        self.wait_time
    }

    /// The number of conflicts the vehicle has been involved in.
    pub fn conflicts(&self) -> usize {
        self.conflicts
    }

    /// The simulation time at which the vehicle was created.
    pub fn spawned_at(&self) -> f64 {
        self.spawned_at
    }

    /// The distance from the ring centre, while on the entry or exit leg.
    pub fn radial_distance(&self) -> Option<f64> {
        match self.state {
            JourneyState::Approaching { distance } | JourneyState::StraightOut { distance } => {
                Some(distance)
            }
            _ => None,
        }
    }

    /// The angular position on the ring, while in a ring phase.
    ///
    /// Vehicles on a transition curve report the angle of their position.
    pub fn ring_angle(&self, roundabout: &Roundabout) -> Option<f64> {
        match self.state {
            JourneyState::Circulating { angle } => Some(angle),
            JourneyState::Entering { progress } => {
                let pos = roundabout.entry_curve(self.entry).sample(progress).0;
                Some(heading(pos.to_vec()))
            }
            JourneyState::Exiting { progress } => {
                let pos = roundabout.exit_curve(self.exit).sample(progress).0;
                Some(heading(pos.to_vec()))
            }
            _ => None,
        }
    }

    /// The world space position of the vehicle and a unit vector along its heading.
    pub fn position(&self, roundabout: &Roundabout) -> (Point2d, Vector2d) {
        match self.state {
            JourneyState::Approaching { distance } => (
                roundabout.inbound_position(self.entry, distance),
                -unit_vector(self.entry.angle()),
            ),
            JourneyState::Entering { progress } => roundabout.entry_curve(self.entry).sample(progress),
            JourneyState::Circulating { angle } => (roundabout.ring_position(angle), ring_tangent(angle)),
            JourneyState::Exiting { progress } => roundabout.exit_curve(self.exit).sample(progress),
            JourneyState::StraightOut { distance } => (
                roundabout.outbound_position(self.exit, distance),
                unit_vector(self.exit.angle()),
            ),
        }
    }

    /// A read-only view of the vehicle.
    pub fn snapshot(&self, roundabout: &Roundabout) -> VehicleSnapshot {
        let (position, dir) = self.position(roundabout);
        VehicleSnapshot {
            id: self.id,
            behavior: self.behavior,
            state: self.state,
            position,
            heading: heading(dir),
            speed: self.vel,
            wait_time: self.wait_time,
            conflicts: self.conflicts,
        }
    }

    /// The permitted speed range on the current segment. The upper bound is
    /// the driver's desired speed there.
    pub fn speed_band(&self, config: &SimulationConfig) -> Interval<f64> {
        let speeds = &config.speeds;
        let desired = f64::min(self.profile().desired_speed, speeds.speed_ceiling);
        match self.state {
            JourneyState::Approaching { .. } => Interval::new(0.0, desired),
            JourneyState::Entering { .. } => {
                let max = f64::min(desired, speeds.entry_speed.max);
                Interval::new(speeds.entry_speed.min, f64::max(max, speeds.entry_speed.min))
            }
            JourneyState::Circulating { .. } => Interval::new(0.0, f64::min(desired, speeds.ring_speed)),
            JourneyState::Exiting { .. } => Interval::new(0.0, f64::min(desired, speeds.exit_speed)),
            JourneyState::StraightOut { .. } => {
                Interval::new(0.0, f64::min(desired, speeds.depart_speed))
            }
        }
    }

    /// The raw gap from this vehicle forward to `other`, measured the way
    /// the car following model measures it in the current phase. `None` if
    /// the two vehicles are not on a common path.
    pub fn gap_to(&self, other: &Vehicle, roundabout: &Roundabout) -> Option<f64> {
        match (self.state, other.state) {
            (
                JourneyState::Approaching { distance },
                JourneyState::Approaching { distance: theirs },
            ) if self.entry == other.entry => Some(distance - theirs),
            (
                JourneyState::StraightOut { distance },
                JourneyState::StraightOut { distance: theirs },
            ) if self.exit == other.exit => Some(theirs - distance),
            (ours, theirs) if ours.phase().is_ring() && theirs.phase().is_ring() => {
                let ours = self.ring_angle(roundabout)?;
                let theirs = other.ring_angle(roundabout)?;
                Some(forward_gap(ours, theirs) * roundabout.ring_radius())
            }
            _ => None,
        }
    }

    /// Resets internal model states in preparation for a new step of the simulation.
    pub(crate) fn reset(&self) {
        self.acc.reset();
        self.blocked.set(false);
    }

    /// Marks the vehicle as held back by the merge judge.
    pub(crate) fn set_blocked(&self, blocked: bool) {
        self.blocked.set(blocked);
    }

    /// Applies the car following model, given the vehicle ahead if any,
    /// and returns the resulting acceleration.
    ///
    /// Constraints accumulate until the next step begins: the acceleration
    /// used for integration is the lowest of those applied.
    pub fn accelerate(
        &self,
        lead: Option<&Vehicle>,
        roundabout: &Roundabout,
        config: &SimulationConfig,
    ) -> f64 {
        let leader = lead.and_then(|lead| {
            let gap = self.gap_to(lead, roundabout)?;
            Some(Leader {
                spacing: gap - config.following.vehicle_length,
                vel: lead.vel,
            })
        });
        let desired_speed = self.speed_band(config).max;
        self.acc.follow(
            self.vel,
            desired_speed,
            leader,
            self.blocked.get(),
            &config.following,
        )
    }

    /// Applies the stop line to an approaching vehicle: an anticipatory
    /// slowdown to the stop line speed, and a full stop if it is blocked.
    pub(crate) fn apply_stop_line(&self, config: &SimulationConfig) {
        if let JourneyState::Approaching { distance } = self.state {
            let net_dist = distance - config.geometry.stop_line;
            self.acc
                .apply_speed_limit(self.vel, config.speeds.stop_line_speed, net_dist);
            if self.blocked.get() {
                let desired_speed = self.speed_band(config).max;
                self.acc
                    .stop_at_line(net_dist, self.vel, desired_speed, &config.following);
            }
        }
    }

    /// Integrates the vehicle's velocity and position.
    ///
    /// # Parameters
    /// * `dt` - The time step in seconds
    /// * `roundabout` - The roundabout geometry
    /// * `config` - The simulation configuration
    pub(crate) fn integrate(&mut self, dt: f64, roundabout: &Roundabout, config: &SimulationConfig) {
        let mut acc = self.acc.acc();
        if self.vel <= 0.0 {
            acc = acc.max(0.0);
        }
        // Exit traffic is never held back by the ring
        if self.phase() == Phase::Exiting {
            acc = acc.max(0.0);
        }

        let band = self.speed_band(config);
        let vel = band.clamp(self.vel + dt * acc);
        let dist = 0.5 * (self.vel + vel) * dt;
        self.vel = vel;

        self.state = match self.state {
            JourneyState::Approaching { distance } => JourneyState::Approaching {
                distance: distance - dist,
            },
            JourneyState::Entering { progress } => JourneyState::Entering {
                progress: progress + dist,
            },
            JourneyState::Circulating { angle } => JourneyState::Circulating {
                angle: wrap_angle(angle - dist / roundabout.ring_radius()),
            },
            JourneyState::Exiting { progress } => JourneyState::Exiting {
                progress: progress + dist,
            },
            JourneyState::StraightOut { distance } => JourneyState::StraightOut {
                distance: distance + dist,
            },
        };

        if self.phase() == Phase::Approaching && self.vel < config.wait_speed {
            self.wait_time += dt;
        }
    }

    /// Whether an approaching vehicle has reached the stop line.
    pub(crate) fn reached_stop_line(&self, stop_line: f64) -> bool {
        matches!(self.state, JourneyState::Approaching { distance } if distance <= stop_line)
    }

    /// Holds an approaching vehicle stationary at the stop line.
    pub(crate) fn hold_at_stop_line(&mut self, stop_line: f64) {
        if let JourneyState::Approaching { .. } = self.state {
            self.state = JourneyState::Approaching { distance: stop_line };
            self.vel = 0.0;
        }
    }

    /// Moves an approaching vehicle which has been admitted onto the entry curve.
    pub(crate) fn enter(&mut self, roundabout: &Roundabout) {
        if let JourneyState::Approaching { distance } = self.state {
            let overshoot = f64::max(roundabout.config().stop_line - distance, 0.0);
            let progress = f64::min(overshoot, roundabout.entry_curve(self.entry).length());
            self.transition(JourneyState::Entering { progress });
        }
    }

    /// Advances a vehicle on the ring or beyond to its next phase when it has
    /// completed the current one. Approaching vehicles are advanced by the
    /// merge judge instead.
    pub(crate) fn advance(&mut self, roundabout: &Roundabout) {
        let geometry = roundabout.config();
        match self.state {
            JourneyState::Entering { progress } => {
                let length = roundabout.entry_curve(self.entry).length();
                if progress >= length {
                    let overrun = (progress - length) / roundabout.ring_radius();
                    let angle = wrap_angle(roundabout.entry_landing_angle(self.entry) - overrun);
                    self.transition(JourneyState::Circulating { angle });
                }
            }
            JourneyState::Circulating { angle } => {
                let to_exit = forward_gap(angle, self.exit.angle());
                if to_exit < geometry.exit_threshold {
                    let travelled = (geometry.exit_threshold - to_exit) * roundabout.ring_radius();
                    let progress = f64::min(travelled, roundabout.exit_curve(self.exit).length());
                    self.transition(JourneyState::Exiting { progress });
                }
            }
            JourneyState::Exiting { progress } => {
                let length = roundabout.exit_curve(self.exit).length();
                if progress >= length {
                    let distance = geometry.exit_end_distance + (progress - length);
                    self.transition(JourneyState::StraightOut { distance });
                }
            }
            JourneyState::Approaching { .. } | JourneyState::StraightOut { .. } => {}
        }
    }

    /// Whether the vehicle has left the modelled area.
    pub(crate) fn is_finished(&self, removal_distance: f64) -> bool {
        matches!(self.state, JourneyState::StraightOut { distance } if distance > removal_distance)
    }

    /// Records a conflict with the vehicle ahead.
    pub(crate) fn add_conflict(&mut self) {
        self.conflicts += 1;
    }

    /// Moves the vehicle into its next journey phase.
    fn transition(&mut self, state: JourneyState) {
        debug_assert!(state.phase() > self.phase());
        log::debug!(
            "Vehicle {:?} {:?} -> {:?}",
            self.id,
            self.phase(),
            state.phase()
        );
        self.state = state;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::GeometryConfig;
    use assert_approx_eq::assert_approx_eq;
    use slotmap::KeyData;
    use std::f64::consts::FRAC_PI_2;

    fn vehicle(state: JourneyState, vel: f64) -> Vehicle {
        let attributes = VehicleAttributes {
            behavior: BehaviorKind::Conservative,
            entry: Leg::East,
            exit: Leg::West,
        };
        let id = VehicleId::from(KeyData::from_ffi(1));
        Vehicle::new(id, &attributes, state, vel, 0.0, &SimulationConfig::default())
    }

    #[test]
    fn phases_are_ordered() {
        assert!(Phase::Approaching < Phase::Entering);
        assert!(Phase::Entering < Phase::Circulating);
        assert!(Phase::Circulating < Phase::Exiting);
        assert!(Phase::Exiting < Phase::StraightOut);
        assert!(Phase::Exiting.is_ring() && !Phase::StraightOut.is_ring());
    }

    #[test]
    fn speed_never_negative() {
        let config = SimulationConfig::default();
        let roundabout = Roundabout::new(&config.geometry);
        let stop_line = config.geometry.stop_line;
        let mut veh = vehicle(JourneyState::Approaching { distance: stop_line + 0.5 }, 0.5);
        // Blocked just short of the stop line
        for _ in 0..10 {
            veh.reset();
            veh.set_blocked(true);
            veh.apply_stop_line(&config);
            veh.integrate(0.1, &roundabout, &config);
            assert!(veh.vel() >= 0.0);
        }
        assert_eq!(veh.vel(), 0.0);
        assert!(!veh.reached_stop_line(stop_line));
    }

    #[test]
    fn blocked_vehicle_brakes_for_stop_line() {
        let config = SimulationConfig::default();
        let stop_line = config.geometry.stop_line;
        for offset in [0.5, 1.0, 1.5, 1.9, 5.0] {
            let veh = vehicle(JourneyState::Approaching { distance: stop_line + offset }, 2.0);
            veh.reset();
            veh.set_blocked(true);
            veh.apply_stop_line(&config);
            assert!(veh.acc.acc() < 0.0, "accelerated {} short of the line", offset);
        }
    }

    #[test]
    fn circulating_wraps_at_zero() {
        let config = SimulationConfig::default();
        let roundabout = Roundabout::new(&config.geometry);
        let mut veh = vehicle(JourneyState::Circulating { angle: 0.01 }, 15.0);
        veh.reset();
        veh.integrate(0.1, &roundabout, &config);
        match veh.state() {
            JourneyState::Circulating { angle } => {
                assert!(angle > 6.0 && angle < std::f64::consts::TAU);
            }
            state => panic!("unexpected state {:?}", state),
        }
    }

    #[test]
    fn entering_speed_is_bounded() {
        let config = SimulationConfig::default();
        let veh = vehicle(JourneyState::Entering { progress: 0.0 }, 0.0);
        let band = veh.speed_band(&config);
        assert_eq!(band, config.speeds.entry_speed);
    }

    #[test]
    fn entering_completes_onto_ring() {
        let config = SimulationConfig::default();
        let roundabout = Roundabout::new(&config.geometry);
        let length = roundabout.entry_curve(Leg::East).length();
        let mut veh = vehicle(JourneyState::Entering { progress: length + 1.0 }, 5.0);
        veh.advance(&roundabout);
        match veh.state() {
            JourneyState::Circulating { angle } => {
                let expected = roundabout.entry_landing_angle(Leg::East) - 1.0 / config.geometry.ring_radius;
                assert_approx_eq!(angle, wrap_angle(expected));
            }
            state => panic!("unexpected state {:?}", state),
        }
    }

    #[test]
    fn exits_near_exit_leg() {
        let config = SimulationConfig::default();
        let roundabout = Roundabout::new(&config.geometry);
        let mut veh = vehicle(JourneyState::Circulating { angle: Leg::West.angle() + 0.3 }, 15.0);
        veh.advance(&roundabout);
        assert_eq!(veh.phase(), Phase::Circulating);

        let mut veh = vehicle(JourneyState::Circulating { angle: Leg::West.angle() + 0.2 }, 15.0);
        veh.advance(&roundabout);
        match veh.state() {
            JourneyState::Exiting { progress } => {
                assert_approx_eq!(progress, 0.05 * config.geometry.ring_radius);
            }
            state => panic!("unexpected state {:?}", state),
        }
    }

    #[test]
    fn ring_gap_uses_angles() {
        let geometry = GeometryConfig::default();
        let roundabout = Roundabout::new(&geometry);
        let follower = vehicle(JourneyState::Circulating { angle: FRAC_PI_2 }, 10.0);
        let leader = vehicle(JourneyState::Circulating { angle: FRAC_PI_2 - 0.1 }, 10.0);
        let gap = follower.gap_to(&leader, &roundabout).unwrap();
        assert_approx_eq!(gap, 0.1 * geometry.ring_radius);

        let approaching = vehicle(JourneyState::Approaching { distance: 200.0 }, 10.0);
        assert!(follower.gap_to(&approaching, &roundabout).is_none());
    }

    #[test]
    fn stop_line_hold() {
        let mut veh = vehicle(JourneyState::Approaching { distance: 163.0 }, 4.0);
        assert!(veh.reached_stop_line(165.0));
        veh.hold_at_stop_line(165.0);
        assert_eq!(veh.state(), JourneyState::Approaching { distance: 165.0 });
        assert_eq!(veh.vel(), 0.0);
    }
}
