//! Near-miss accounting.

use crate::config::{ConflictConfig, LeadConfig};
use crate::geometry::Roundabout;
use crate::lead::find_lead;
use crate::{VehicleId, VehicleSet};
use itertools::Itertools;

/// A close approach between a vehicle and the vehicle it follows.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConflictEvent {
    /// The vehicle behind.
    pub follower: VehicleId,
    /// The vehicle ahead.
    pub leader: VehicleId,
    /// The raw gap between them.
    pub gap: f64,
}

impl ConflictEvent {
    /// The two vehicles, in a canonical order.
    fn pair(&self) -> (VehicleId, VehicleId) {
        if self.follower < self.leader {
            (self.follower, self.leader)
        } else {
            (self.leader, self.follower)
        }
    }
}

/// Finds every pair of moving vehicles closer than the conflict threshold.
///
/// Each vehicle is compared with its lead; a pair is reported at most once
/// even if each vehicle resolves the other as its lead. The motion of the
/// vehicles is not affected.
pub(crate) fn detect_conflicts(
    vehicles: &VehicleSet,
    roundabout: &Roundabout,
    lead_config: &LeadConfig,
    config: &ConflictConfig,
) -> Vec<ConflictEvent> {
    vehicles
        .values()
        .filter(|veh| veh.vel() > config.min_speed)
        .filter_map(|veh| {
            let lead = find_lead(vehicles, veh, roundabout, lead_config)?;
            (lead.vel > config.min_speed && lead.gap < config.gap).then(|| ConflictEvent {
                follower: veh.id(),
                leader: lead.id,
                gap: lead.gap,
            })
        })
        .unique_by(ConflictEvent::pair)
        .collect()
}
