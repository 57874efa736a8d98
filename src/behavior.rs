//! Driver behaviour profiles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The driver archetypes that can be spawned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorKind {
    Aggressive,
    Conservative,
}

/// The car-following parameters of a driver.
///
/// Lengths are in abstract distance units and times in seconds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BehaviorProfile {
    /// The free-flow target speed.
    pub desired_speed: f64,
    /// The desired following time gap.
    pub time_headway: f64,
    /// The maximum acceleration.
    pub max_accel: f64,
    /// The comfortable deceleration, a positive number.
    pub comfort_decel: f64,
    /// The minimum bumper-to-bumper spacing when stopped.
    pub min_gap: f64,
}

impl BehaviorKind {
    /// All behaviour kinds, in a stable order.
    pub const ALL: [BehaviorKind; 2] = [BehaviorKind::Aggressive, BehaviorKind::Conservative];

    /// The default car-following parameters for this kind of driver.
    pub fn profile(self) -> BehaviorProfile {
        match self {
            BehaviorKind::Aggressive => BehaviorProfile {
                desired_speed: 40.0,
                time_headway: 0.8,
                max_accel: 2.5,
                comfort_decel: 3.0,
                min_gap: 15.0,
            },
            BehaviorKind::Conservative => BehaviorProfile {
                desired_speed: 30.0,
                time_headway: 1.8,
                max_accel: 1.2,
                comfort_decel: 1.5,
                min_gap: 30.0,
            },
        }
    }

    /// A short lowercase name, used in reports.
    pub fn name(self) -> &'static str {
        match self {
            BehaviorKind::Aggressive => "aggressive",
            BehaviorKind::Conservative => "conservative",
        }
    }
}

impl fmt::Display for BehaviorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
