//! Gap acceptance for vehicles waiting to join the ring.

use crate::config::MergeConfig;
use crate::geometry::{forward_gap, Leg, Roundabout};
use crate::VehicleSet;
use crate::VehicleId;
use std::f64::consts::TAU;

/// The outcome of judging whether a vehicle may join the ring.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// The vehicle may enter.
    Granted,
    /// The ring holds as many vehicles as it may.
    RingFull,
    /// The given ring vehicle is too close to the entry point.
    GapTooSmall(VehicleId),
}

impl Admission {
    /// Whether the vehicle may enter.
    pub fn is_granted(self) -> bool {
        self == Admission::Granted
    }
}

/// The number of vehicles on the ring or its transition curves.
pub(crate) fn ring_occupancy(vehicles: &VehicleSet) -> usize {
    vehicles
        .values()
        .filter(|veh| veh.phase().is_ring())
        .count()
}

/// Judges whether a vehicle entering from `leg` may join the ring now.
///
/// Admission is refused while the ring is at capacity, or while any ring
/// vehicle lies inside the critical window downstream of the entry point or
/// the clearance window just upstream of it. `claimed` ring places are
/// already promised to vehicles with a stronger claim.
pub(crate) fn judge(
    vehicles: &VehicleSet,
    leg: Leg,
    claimed: usize,
    roundabout: &Roundabout,
    config: &MergeConfig,
) -> Admission {
    if ring_occupancy(vehicles) + claimed >= config.ring_capacity {
        return Admission::RingFull;
    }

    let entry = leg.angle();
    let blocker = vehicles.values().find(|veh| {
        veh.ring_angle(roundabout).map_or(false, |angle| {
            let gap = forward_gap(entry, angle);
            gap < config.critical_gap || gap > TAU - config.upstream_gap
        })
    });

    match blocker {
        Some(veh) => Admission::GapTooSmall(veh.id()),
        None => Admission::Granted,
    }
}
