//! Creation of new vehicles at the ends of the approach legs.

use crate::behavior::BehaviorKind;
use crate::config::{SimulationConfig, SpawnConfig};
use crate::geometry::Leg;
use crate::vehicle::{JourneyState, VehicleAttributes};
use crate::VehicleSet;
use arrayvec::ArrayVec;
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use rand_distr::Exp;
use thiserror::Error;

/// The reason a vehicle could not be added.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum SpawnRejected {
    #[error("the exit leg is the entry leg")]
    SameLeg,
    #[error("the simulation already holds {0} vehicles")]
    AtCapacity(usize),
    #[error("the {0:?} approach is occupied near the spawn point")]
    TooClose(Leg),
}

/// Decides when new vehicles appear and what they are.
#[derive(Clone, Debug)]
pub(crate) struct Spawner {
    rng: StdRng,
    /// The time since the last spawn attempt in s.
    timer: f64,
    /// The interval until the next spawn attempt in s.
    next: f64,
}

impl Spawner {
    /// Creates a spawner, seeded for reproducible runs if a seed is given.
    pub fn new(seed: Option<u64>, config: &SpawnConfig) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut spawner = Self {
            rng,
            timer: 0.0,
            next: config.interval,
        };
        spawner.next = spawner.draw_interval(config);
        spawner
    }

    /// Advances the spawn timer, returning whether a spawn attempt is due.
    pub fn tick(&mut self, dt: f64, config: &SpawnConfig) -> bool {
        if !config.enabled {
            return false;
        }
        self.timer += dt;
        if self.timer < self.next {
            return false;
        }
        self.timer = 0.0;
        self.next = self.draw_interval(config);
        true
    }

    /// Picks the entry leg, exit leg and behaviour of a new vehicle.
    pub fn choose(&mut self, config: &SpawnConfig) -> VehicleAttributes {
        let entry = Leg::ALL[self.rng.gen_range(0..Leg::ALL.len())];
        let exits: ArrayVec<Leg, 3> = entry.others().collect();
        let exit = exits[self.rng.gen_range(0..exits.len())];

        let weights = BehaviorKind::ALL.map(|kind| config.weights.get(kind).max(0.0));
        let behavior = match WeightedIndex::new(weights) {
            Ok(dist) => BehaviorKind::ALL[dist.sample(&mut self.rng)],
            Err(_) => BehaviorKind::Conservative,
        };

        VehicleAttributes {
            behavior,
            entry,
            exit,
        }
    }

    /// The interval until the next spawn attempt.
    fn draw_interval(&mut self, config: &SpawnConfig) -> f64 {
        if config.poisson {
            if let Ok(exp) = Exp::new(1.0 / config.interval) {
                return exp.sample(&mut self.rng);
            }
        }
        config.interval
    }
}

/// Checks whether a vehicle with the given attributes may be placed on its
/// approach at `distance` from the centre.
///
/// A new vehicle must be further from the centre than every vehicle already
/// approaching on its leg, by at least the spawn clearance.
pub(crate) fn check_admission(
    vehicles: &VehicleSet,
    attributes: &VehicleAttributes,
    distance: f64,
    config: &SpawnConfig,
) -> Result<(), SpawnRejected> {
    if attributes.entry == attributes.exit {
        return Err(SpawnRejected::SameLeg);
    }
    if vehicles.len() >= config.max_vehicles {
        return Err(SpawnRejected::AtCapacity(config.max_vehicles));
    }
    let too_close = vehicles.values().any(|veh| {
        veh.entry() == attributes.entry
            && matches!(veh.state(), JourneyState::Approaching { distance: theirs } if theirs > distance - config.clearance)
    });
    if too_close {
        return Err(SpawnRejected::TooClose(attributes.entry));
    }
    Ok(())
}

/// The speed of a vehicle placed on its approach at `distance`: a fraction
/// of its desired speed, but no faster than the vehicle ahead of it.
pub(crate) fn initial_speed(
    vehicles: &VehicleSet,
    attributes: &VehicleAttributes,
    distance: f64,
    config: &SimulationConfig,
) -> f64 {
    let desired = f64::min(
        attributes.behavior.profile().desired_speed,
        config.speeds.speed_ceiling,
    );
    let speed = config.spawn.initial_speed_fraction * desired;
    vehicles
        .values()
        .filter(|veh| veh.entry() == attributes.entry)
        .filter_map(|veh| match veh.state() {
            JourneyState::Approaching { distance: theirs } if theirs < distance => {
                Some((theirs, veh.vel()))
            }
            _ => None,
        })
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map_or(speed, |(_, vel)| f64::min(speed, vel))
}
