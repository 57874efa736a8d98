use crate::behavior::BehaviorProfile;
use crate::config::FollowingConfig;
use std::cell::Cell;

/// The acceleration model of a vehicle.
///
/// Each frame the model is reset to the maximum acceleration, and every
/// constraint acting on the vehicle (the vehicle ahead, a stop line, an
/// upcoming speed limit) can only lower it.
#[derive(Clone, Debug)]
pub struct AccelerationModel {
    profile: BehaviorProfile,
    brake_factor: f64,
    acc: Cell<f64>,
}

/// The vehicle being followed, as seen by the follower.
#[derive(Clone, Copy, Debug)]
pub struct Leader {
    /// The bumper-to-bumper spacing.
    pub spacing: f64,
    /// The leader's velocity.
    pub vel: f64,
}

impl AccelerationModel {
    /// Creates a new acceleration model.
    pub fn new(profile: BehaviorProfile, brake_factor: f64) -> Self {
        Self {
            profile,
            brake_factor,
            acc: Cell::new(profile.max_accel),
        }
    }

    /// The driver's parameters.
    pub fn profile(&self) -> &BehaviorProfile {
        &self.profile
    }

    /// Resets the acceleration model. Use at the start of an update.
    pub fn reset(&self) {
        self.acc.set(self.profile.max_accel);
    }

    /// Gets the current acceleration of the vehicle.
    pub fn acc(&self) -> f64 {
        f64::max(self.acc.get(), -self.max_decel())
    }

    /// The hardest braking the vehicle will ever apply.
    pub fn max_decel(&self) -> f64 {
        self.profile.comfort_decel * self.brake_factor
    }

    /// Applies the car following model.
    ///
    /// # Arguments
    /// * `vel` - The velocity of the simulated vehicle.
    /// * `desired_speed` - The desired speed on the current segment.
    /// * `leader` - The vehicle ahead, if there is one.
    /// * `blocked` - Whether the vehicle is held back by a pending merge decision.
    /// * `params` - The shared model parameters.
    pub fn follow(
        &self,
        vel: f64,
        desired_speed: f64,
        leader: Option<Leader>,
        blocked: bool,
        params: &FollowingConfig,
    ) -> f64 {
        let (spacing, their_vel) = match leader {
            Some(leader) => (leader.spacing, leader.vel),
            None => (params.free_spacing, vel),
        };
        let spacing = f64::max(spacing, params.spacing_floor);
        let min_gap = f64::max(self.profile.min_gap, params.min_gap_floor);

        let mut acc = self.idm(spacing, vel, their_vel, desired_speed, min_gap);
        acc = acc.clamp(-self.max_decel(), self.profile.max_accel);

        // A stopped vehicle can settle where the interaction term exactly
        // cancels the free road term, even with room ahead.
        if vel < params.creep_speed && !blocked && spacing > params.creep_clearance && acc <= 0.0 {
            acc = params.creep_accel;
        }
        if vel <= 0.0 {
            acc = acc.max(0.0);
        }

        self.acc.set(f64::min(self.acc.get(), acc));
        acc
    }

    /// Calculates the acceleration needed to stop before a stop line.
    ///
    /// # Arguments
    /// * `net_dist` - The distance between this vehicle and the stop line.
    /// * `vel` - The velocity of the simulated vehicle.
    /// * `desired_speed` - The desired speed on the current segment.
    /// * `params` - The shared model parameters.
    pub fn stop_at_line(&self, net_dist: f64, vel: f64, desired_speed: f64, params: &FollowingConfig) {
        // Inside the standstill gap, brake as hard as possible
        let acc = if net_dist <= params.stop_line_gap {
            -self.max_decel()
        } else {
            let floor = f64::min(params.spacing_floor, params.stop_line_gap);
            let spacing = f64::max(net_dist, floor);
            self.idm(spacing, vel, 0.0, desired_speed, params.stop_line_gap)
        };
        self.acc.set(f64::min(self.acc.get(), acc));
    }

    /// Calculates the acceleration needed to comfortably decelerate to
    /// an upcoming speed limit.
    ///
    /// # Arguments
    /// * `vel` - The velocity of the simulated vehicle.
    /// * `speed_limit` - The upcoming speed limit.
    /// * `distance` - The distance to the point where the limit applies.
    pub fn apply_speed_limit(&self, vel: f64, speed_limit: f64, distance: f64) {
        if distance <= 0.0 || vel <= speed_limit {
            return;
        }

        let comf_acc = -self.profile.comfort_decel;
        let this_acc = (speed_limit.powi(2) - vel.powi(2)) / (2. * distance);
        if this_acc <= comf_acc {
            let this_acc = f64::max(-self.max_decel(), this_acc);
            self.acc.set(f64::min(self.acc.get(), this_acc));
        }
    }

    /// Computes an acceleration using the intelligent driver model.
    fn idm(&self, spacing: f64, my_vel: f64, their_vel: f64, desired_speed: f64, min_gap: f64) -> f64 {
        let max_acc = self.profile.max_accel;
        let comf_dec = self.profile.comfort_decel;
        let desired_speed = f64::max(desired_speed, f64::EPSILON);

        let free = max_acc * (1. - (my_vel / desired_speed).powi(4));

        let appr = my_vel - their_vel;
        let factor = 1. / (2. * (max_acc * comf_dec).sqrt());
        let dynamic = my_vel * self.profile.time_headway + my_vel * appr * factor;
        let ss = min_gap + f64::max(0.0, dynamic);
        let interaction = -max_acc * (ss / spacing).powi(2);

        free + interaction
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::behavior::BehaviorKind;
    use assert_approx_eq::assert_approx_eq;

    fn model() -> AccelerationModel {
        AccelerationModel::new(BehaviorKind::Conservative.profile(), 2.0)
    }

    #[test]
    fn free_road_accelerates_to_desired_speed() {
        let acc = model();
        let params = FollowingConfig::default();
        let profile = *acc.profile();

        // Free spacing with no closing speed leaves a negligible interaction term
        let a = acc.follow(0.0, 30.0, None, false, &params);
        assert_approx_eq!(a, profile.max_accel, 0.01);

        acc.reset();
        let a = acc.follow(30.0, 30.0, None, false, &params);
        assert!(a < 0.0 && a > -0.1);

        acc.reset();
        let a = acc.follow(40.0, 30.0, None, false, &params);
        assert!(a < -1.0);
    }

    #[test]
    fn matches_idm_formula() {
        let acc = model();
        let params = FollowingConfig::default();
        let p = *acc.profile();
        let (v, lead_v, s) = (10.0, 8.0, 60.0);
        let s_star = p.min_gap + v * p.time_headway + v * (v - lead_v) / (2.0 * (p.max_accel * p.comfort_decel).sqrt());
        let expected = p.max_accel * (1.0 - (v / 30.0f64).powi(4)) - p.max_accel * (s_star / s).powi(2);
        let a = acc.follow(v, 30.0, Some(Leader { spacing: s, vel: lead_v }), false, &params);
        assert_approx_eq!(a, expected.clamp(-acc.max_decel(), p.max_accel));
    }

    #[test]
    fn braking_is_bounded() {
        let acc = model();
        let params = FollowingConfig::default();
        let a = acc.follow(20.0, 30.0, Some(Leader { spacing: -5.0, vel: 0.0 }), false, &params);
        assert_approx_eq!(a, -acc.max_decel());
        assert_approx_eq!(acc.acc(), -acc.max_decel());
    }

    #[test]
    fn stopped_vehicle_creeps_when_clear() {
        let acc = model();
        let params = FollowingConfig::default();
        // Just inside the standstill gap the plain model brakes
        let leader = Leader { spacing: 25.0, vel: 0.0 };
        let a = acc.follow(0.0, 30.0, Some(leader), false, &params);
        assert_approx_eq!(a, params.creep_accel);

        acc.reset();
        let a = acc.follow(0.0, 30.0, Some(leader), true, &params);
        assert_eq!(a, 0.0);
    }

    #[test]
    fn min_gap_floor_only_widens() {
        let acc = model();
        let leader = Some(Leader { spacing: 60.0, vel: 10.0 });
        let with_floor = |floor: f64| {
            let params = FollowingConfig {
                min_gap_floor: floor,
                ..Default::default()
            };
            acc.reset();
            acc.follow(10.0, 30.0, leader, false, &params)
        };
        let own = with_floor(0.0);
        assert_eq!(with_floor(acc.profile().min_gap / 2.0), own);
        assert!(with_floor(acc.profile().min_gap * 2.0) < own);
    }

    #[test]
    fn stop_line_brakes_hard_inside_standstill_gap() {
        let acc = model();
        let params = FollowingConfig::default();
        acc.stop_at_line(params.stop_line_gap * 0.5, 0.5, 30.0, &params);
        assert_approx_eq!(acc.acc(), -acc.max_decel());
    }

    #[test]
    fn never_reverses() {
        let acc = model();
        let params = FollowingConfig::default();
        let leader = Leader { spacing: 1.0, vel: 0.0 };
        let a = acc.follow(0.0, 30.0, Some(leader), false, &params);
        assert!(a >= 0.0);
    }

    #[test]
    fn constraints_take_the_minimum() {
        let acc = model();
        let params = FollowingConfig::default();
        acc.follow(10.0, 30.0, None, false, &params);
        let free = acc.acc();
        acc.stop_at_line(5.0, 10.0, 30.0, &params);
        assert!(acc.acc() < free);
        assert!(acc.acc() >= -acc.max_decel());
    }

    #[test]
    fn anticipates_speed_limit() {
        let acc = model();
        acc.apply_speed_limit(20.0, 8.0, 500.0);
        assert_eq!(acc.acc(), acc.profile().max_accel);
        // Needs 3.36, which is more than the vehicle will brake
        acc.apply_speed_limit(20.0, 8.0, 50.0);
        assert_approx_eq!(acc.acc(), -acc.max_decel());
    }
}
