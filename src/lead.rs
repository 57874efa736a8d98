//! Finds the vehicle each vehicle follows.

use crate::config::LeadConfig;
use crate::geometry::Roundabout;
use crate::vehicle::{JourneyState, Vehicle};
use crate::{VehicleId, VehicleSet};
use std::cmp::Ordering;

/// The vehicle ahead of another vehicle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Lead {
    /// The ID of the vehicle ahead.
    pub id: VehicleId,
    /// The raw gap to the vehicle ahead, without subtracting the body length.
    pub gap: f64,
    /// The velocity of the vehicle ahead.
    pub vel: f64,
}

/// Finds the nearest vehicle ahead of `vehicle` which it must follow.
///
/// Ring vehicles follow other ring vehicles within the lookahead angle.
/// Approaching vehicles follow the approaching vehicles on the same leg
/// which are closer to the centre, and departing vehicles those on the same
/// exit leg which are further from it. Vehicles at exactly the same
/// position are ordered by ID so that only one of them follows the other.
pub(crate) fn find_lead(
    vehicles: &VehicleSet,
    vehicle: &Vehicle,
    roundabout: &Roundabout,
    config: &LeadConfig,
) -> Option<Lead> {
    let max_gap = match vehicle.state() {
        JourneyState::Entering { .. }
        | JourneyState::Circulating { .. }
        | JourneyState::Exiting { .. } => config.ring_lookahead * roundabout.ring_radius(),
        _ => f64::INFINITY,
    };

    vehicles
        .values()
        .filter(|other| other.id() != vehicle.id())
        .filter_map(|other| {
            let gap = vehicle.gap_to(other, roundabout)?;
            let ahead = gap > 0.0 || (gap == 0.0 && other.id() < vehicle.id());
            (ahead && gap < max_gap).then(|| Lead {
                id: other.id(),
                gap,
                vel: other.vel(),
            })
        })
        .min_by(|a, b| match a.gap.total_cmp(&b.gap) {
            Ordering::Equal => a.id.cmp(&b.id),
            ord => ord,
        })
}
