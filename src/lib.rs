//! A microscopic simulation of a single-lane roundabout.
//!
//! Vehicles approach from four legs, merge into the circulating stream by gap
//! acceptance, follow each other around the ring with the intelligent driver
//! model, and leave toward a destination leg. The simulation records queueing
//! delay and near-miss conflicts per driver behaviour.

pub use behavior::{BehaviorKind, BehaviorProfile};
pub use cgmath;
pub use config::{Adjustment, ConfigError, SimulationConfig, SpawnWeights};
pub use conflict::ConflictEvent;
pub use geometry::{forward_gap, Leg, Roundabout, TransitionCurve};
pub use lead::Lead;
pub use merge::Admission;
pub use report::{
    BehaviorSummary, FlowSample, JourneyRecord, JourneyStatus, Report, ReportError, Summary,
};
pub use simulation::Simulation;
use slotmap::{new_key_type, SlotMap};
pub use slotmap::{Key, KeyData};
pub use spawner::SpawnRejected;
pub use util::Interval;
pub use vehicle::{JourneyState, Phase, Vehicle, VehicleAttributes, VehicleSnapshot};

mod behavior;
pub mod config;
mod conflict;
mod geometry;
mod lead;
pub mod math;
mod merge;
mod report;
mod simulation;
mod spawner;
mod util;
mod vehicle;

new_key_type! {
    /// Unique ID of a [Vehicle].
    pub struct VehicleId;
}

type VehicleSet = SlotMap<VehicleId, Vehicle>;
