//! Simulation configuration.
//!
//! All tunable constants of the model live here, so that independent
//! simulations never share state. Every section deserialises with defaults,
//! so a configuration file need only name the values it overrides.

use crate::behavior::BehaviorKind;
use crate::util::Interval;
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_4;
use thiserror::Error;

/// The lowest speed ceiling a runtime adjustment may set.
const MIN_SPEED_CEILING: f64 = 10.0;

/// The narrowest merge window a runtime adjustment may set, in radians.
const MIN_MERGE_WINDOW: f64 = 0.5;

/// The complete configuration of a simulation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// The fixed time step in s.
    pub time_step: f64,
    /// An approaching vehicle slower than this accumulates wait time.
    pub wait_speed: f64,
    /// The interval between flow statistics samples in s.
    pub flow_sample_interval: f64,
    /// Seed for the spawner's random number generator; random if absent.
    pub seed: Option<u64>,
    pub geometry: GeometryConfig,
    pub speeds: SpeedConfig,
    pub following: FollowingConfig,
    pub lead: LeadConfig,
    pub merge: MergeConfig,
    pub conflict: ConflictConfig,
    pub spawn: SpawnConfig,
}

/// The layout of the roundabout. Distances are measured from the ring centre.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    /// The radius of the central island.
    pub island_radius: f64,
    /// The lateral offset of a lane from its leg's centre line.
    pub lane_offset: f64,
    /// The radius of the circulating lane.
    pub ring_radius: f64,
    /// The length of each approach leg beyond the island.
    pub approach_length: f64,
    /// The distance of the stop line.
    pub stop_line: f64,
    /// How far before the stop line a vehicle starts yielding to ring traffic.
    pub yield_zone: f64,
    /// The angle between an entry leg and the point where entering vehicles join the ring.
    pub entry_angle_offset: f64,
    /// The distance of the entry curve's control point inbound of the stop line.
    pub entry_control: f64,
    /// A circulating vehicle within this angle of its exit leg starts exiting.
    pub exit_threshold: f64,
    /// The distance of the exit curve's control point along the ring tangent.
    pub exit_control: f64,
    /// The distance at which the exit curve joins the outbound lane.
    pub exit_end_distance: f64,
    /// Departing vehicles beyond this distance are retired.
    pub removal_distance: f64,
    /// The spacing of the samples along a transition curve.
    pub curve_spacing: f64,
}

/// Per-segment speed limits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedConfig {
    /// No vehicle desires to travel faster than this.
    pub speed_ceiling: f64,
    /// The speed approaching vehicles slow to at the stop line.
    pub stop_line_speed: f64,
    /// The permitted speed range on the entry curve.
    pub entry_speed: Interval<f64>,
    /// The speed limit of the circulating lane.
    pub ring_speed: f64,
    /// The speed limit of the exit curve.
    pub exit_speed: f64,
    /// The speed limit of the departure legs.
    pub depart_speed: f64,
}

/// Parameters of the car-following model shared by all drivers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowingConfig {
    /// The length of a vehicle body.
    pub vehicle_length: f64,
    /// Spacings are never smaller than this inside the model.
    pub spacing_floor: f64,
    /// The spacing assumed when there is no lead vehicle.
    pub free_spacing: f64,
    /// Braking may exceed the comfortable deceleration by this factor.
    pub brake_factor: f64,
    /// A lower bound applied to every profile's minimum gap.
    pub min_gap_floor: f64,
    /// The standstill gap kept to a stop line.
    pub stop_line_gap: f64,
    /// The acceleration applied to a stopped vehicle with room ahead.
    pub creep_accel: f64,
    /// Vehicles slower than this are considered stopped.
    pub creep_speed: f64,
    /// A stopped vehicle creeps forward if the spacing ahead exceeds this.
    pub creep_clearance: f64,
}

/// Parameters of the lead vehicle search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeadConfig {
    /// Ring vehicles further ahead than this angle are ignored.
    pub ring_lookahead: f64,
}

/// Parameters of the gap acceptance judge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Ring vehicles less than this angle past the entry point block admission.
    pub critical_gap: f64,
    /// Ring vehicles less than this angle short of the entry point block admission.
    pub upstream_gap: f64,
    /// No vehicle is admitted while this many vehicles are on the ring.
    pub ring_capacity: usize,
}

/// Parameters of the near-miss accounting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictConfig {
    /// A raw gap to the lead vehicle below this is a conflict.
    pub gap: f64,
    /// Both vehicles must be faster than this for a conflict to count.
    pub min_speed: f64,
}

/// Parameters of the vehicle spawner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    /// Whether vehicles are spawned automatically.
    pub enabled: bool,
    /// The mean interval between spawn attempts in s.
    pub interval: f64,
    /// Draw spawn intervals from an exponential distribution instead of a fixed period.
    pub poisson: bool,
    /// The relative frequency of each behaviour.
    pub weights: SpawnWeights,
    /// The minimum distance between a new vehicle and any vehicle queued on its leg.
    pub clearance: f64,
    /// No vehicle is spawned while this many are active.
    pub max_vehicles: usize,
    /// The initial speed of a vehicle as a fraction of its desired speed.
    pub initial_speed_fraction: f64,
}

/// The relative frequency with which each behaviour is spawned.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnWeights {
    pub aggressive: f64,
    pub conservative: f64,
}

/// A runtime change to the configuration of a running simulation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Adjustment {
    /// Sets the speed ceiling.
    SpeedCeiling(f64),
    /// Sets a floor under every driver's minimum gap. Drivers whose own
    /// minimum gap is larger keep it, so this can only widen gaps, and a
    /// floor of zero restores every driver's own gap.
    MinGap(f64),
    /// Sets the critical gap of the merge judge, in radians.
    MergeWindow(f64),
    /// Sets the behaviour mix of new vehicles.
    SpawnWeights(SpawnWeights),
}

/// A configuration value which would break the model.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("`{0}` must be positive")]
    NotPositive(&'static str),
    #[error("the stop line must lie between the ring and the spawn point")]
    StopLine,
    #[error("the entry speed range must be positive and non-empty")]
    EntrySpeed,
    #[error("at least one spawn weight must be positive")]
    SpawnWeights,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            time_step: 0.02,
            wait_speed: 2.0,
            flow_sample_interval: 1.0,
            seed: None,
            geometry: Default::default(),
            speeds: Default::default(),
            following: Default::default(),
            lead: Default::default(),
            merge: Default::default(),
            conflict: Default::default(),
            spawn: Default::default(),
        }
    }
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            island_radius: 120.0,
            lane_offset: 25.0,
            ring_radius: 145.0,
            approach_length: 250.0,
            stop_line: 165.0,
            yield_zone: 55.0,
            entry_angle_offset: 0.35,
            entry_control: 25.0,
            exit_threshold: 0.25,
            exit_control: 20.0,
            exit_end_distance: 220.0,
            removal_distance: 500.0,
            curve_spacing: 1.0,
        }
    }
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            speed_ceiling: 35.0,
            stop_line_speed: 8.0,
            entry_speed: Interval::new(2.0, 10.0),
            ring_speed: 15.0,
            exit_speed: 12.0,
            depart_speed: 25.0,
        }
    }
}

impl Default for FollowingConfig {
    fn default() -> Self {
        Self {
            vehicle_length: 30.0,
            spacing_floor: 2.0,
            free_spacing: 1000.0,
            brake_factor: 2.0,
            min_gap_floor: 0.0,
            stop_line_gap: 1.0,
            creep_accel: 0.5,
            creep_speed: 0.1,
            creep_clearance: 10.0,
        }
    }
}

impl Default for LeadConfig {
    fn default() -> Self {
        Self {
            ring_lookahead: FRAC_PI_4,
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            critical_gap: 0.8,
            upstream_gap: 0.25,
            ring_capacity: 15,
        }
    }
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            gap: 35.0,
            min_speed: 0.5,
        }
    }
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: 1.0,
            poisson: false,
            weights: Default::default(),
            clearance: 60.0,
            max_vehicles: 60,
            initial_speed_fraction: 0.5,
        }
    }
}

impl Default for SpawnWeights {
    fn default() -> Self {
        Self {
            aggressive: 0.3,
            conservative: 0.7,
        }
    }
}

impl GeometryConfig {
    /// The distance from the centre at which vehicles are spawned.
    pub fn spawn_distance(&self) -> f64 {
        self.island_radius + self.approach_length
    }
}

impl SpawnWeights {
    /// The weight of the given behaviour.
    pub fn get(&self, kind: BehaviorKind) -> f64 {
        match kind {
            BehaviorKind::Aggressive => self.aggressive,
            BehaviorKind::Conservative => self.conservative,
        }
    }
}

impl SimulationConfig {
    /// Checks that the configuration describes a runnable model.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("time_step", self.time_step),
            ("flow_sample_interval", self.flow_sample_interval),
            ("geometry.ring_radius", self.geometry.ring_radius),
            ("geometry.curve_spacing", self.geometry.curve_spacing),
            ("speeds.speed_ceiling", self.speeds.speed_ceiling),
            ("speeds.ring_speed", self.speeds.ring_speed),
            ("speeds.exit_speed", self.speeds.exit_speed),
            ("speeds.depart_speed", self.speeds.depart_speed),
            ("following.spacing_floor", self.following.spacing_floor),
            ("following.brake_factor", self.following.brake_factor),
            ("spawn.interval", self.spawn.interval),
            ("lead.ring_lookahead", self.lead.ring_lookahead),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| !(*value > 0.0)) {
            return Err(ConfigError::NotPositive(*name));
        }

        let geometry = &self.geometry;
        if geometry.stop_line <= geometry.ring_radius
            || geometry.stop_line >= geometry.spawn_distance()
        {
            return Err(ConfigError::StopLine);
        }

        let entry = self.speeds.entry_speed;
        if !(entry.min > 0.0) || entry.max < entry.min {
            return Err(ConfigError::EntrySpeed);
        }

        let weights = self.spawn.weights;
        if !(weights.aggressive >= 0.0 && weights.conservative >= 0.0)
            || weights.aggressive + weights.conservative <= 0.0
        {
            return Err(ConfigError::SpawnWeights);
        }

        Ok(())
    }

    /// Applies a runtime adjustment, clamping it to a sensible range.
    pub fn apply(&mut self, adjustment: Adjustment) {
        match adjustment {
            Adjustment::SpeedCeiling(value) => {
                self.speeds.speed_ceiling = clamp_logged("speed ceiling", value, MIN_SPEED_CEILING);
            }
            Adjustment::MinGap(value) => {
                self.following.min_gap_floor = clamp_logged("minimum gap", value, 0.0);
            }
            Adjustment::MergeWindow(value) => {
                self.merge.critical_gap = clamp_logged("merge window", value, MIN_MERGE_WINDOW);
            }
            Adjustment::SpawnWeights(weights) => {
                let aggressive = clamp_logged("aggressive weight", weights.aggressive, 0.0);
                let conservative = clamp_logged("conservative weight", weights.conservative, 0.0);
                if aggressive + conservative > 0.0 {
                    self.spawn.weights = SpawnWeights {
                        aggressive,
                        conservative,
                    };
                } else {
                    log::warn!("Ignoring spawn weights which are all zero");
                }
            }
        }
    }
}

/// Clamps `value` to be at least `min`, logging when it had to.
fn clamp_logged(name: &str, value: f64, min: f64) -> f64 {
    if value >= min {
        value
    } else {
        log::warn!("Clamping {} of {} to {}", name, value, min);
        min
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(SimulationConfig::default().validate(), Ok(()));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: SimulationConfig =
            serde_json::from_str(r#"{ "seed": 7, "merge": { "ring_capacity": 4 } }"#).unwrap();
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.merge.ring_capacity, 4);
        assert_eq!(config.merge.critical_gap, MergeConfig::default().critical_gap);
        assert_eq!(config.geometry, GeometryConfig::default());
    }

    #[test]
    fn invalid_stop_line() {
        let mut config = SimulationConfig::default();
        config.geometry.stop_line = 100.0;
        assert_eq!(config.validate(), Err(ConfigError::StopLine));
    }

    #[test]
    fn nan_time_step_is_rejected() {
        let mut config = SimulationConfig::default();
        config.time_step = f64::NAN;
        assert_eq!(config.validate(), Err(ConfigError::NotPositive("time_step")));
    }

    #[test]
    fn adjustments_are_clamped() {
        let mut config = SimulationConfig::default();
        config.apply(Adjustment::SpeedCeiling(4.0));
        assert_eq!(config.speeds.speed_ceiling, MIN_SPEED_CEILING);
        config.apply(Adjustment::MergeWindow(0.1));
        assert_eq!(config.merge.critical_gap, MIN_MERGE_WINDOW);
        config.apply(Adjustment::MinGap(-3.0));
        assert_eq!(config.following.min_gap_floor, 0.0);
        config.apply(Adjustment::MergeWindow(1.2));
        assert_eq!(config.merge.critical_gap, 1.2);
    }

    #[test]
    fn zero_spawn_weights_are_ignored() {
        let mut config = SimulationConfig::default();
        config.apply(Adjustment::SpawnWeights(SpawnWeights {
            aggressive: 0.0,
            conservative: 0.0,
        }));
        assert_eq!(config.spawn.weights, SpawnWeights::default());
        config.apply(Adjustment::SpawnWeights(SpawnWeights {
            aggressive: 1.0,
            conservative: 0.0,
        }));
        assert_eq!(config.spawn.weights.get(BehaviorKind::Aggressive), 1.0);
    }
}
