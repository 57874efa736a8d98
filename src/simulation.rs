use crate::config::{Adjustment, SimulationConfig};
use crate::conflict::{detect_conflicts, ConflictEvent};
use crate::geometry::{Leg, Roundabout};
use crate::lead::{find_lead, Lead};
use crate::merge::{judge, ring_occupancy, Admission};
use crate::report::{FlowSample, JourneyRecord, Report};
use crate::spawner::{check_admission, initial_speed, SpawnRejected, Spawner};
use crate::vehicle::{JourneyState, Vehicle, VehicleAttributes, VehicleSnapshot};
use crate::{VehicleId, VehicleSet};
use itertools::Itertools;
use smallvec::SmallVec;

/// A roundabout traffic simulation.
///
/// Each call to [Simulation::step] advances every vehicle by one fixed time
/// step, in this order: spawning, car following from the previous state,
/// integration, merge judging and journey transitions, retirement of
/// departed vehicles, conflict accounting, and flow sampling.
#[derive(Clone, Debug)]
pub struct Simulation {
    /// The simulation parameters.
    config: SimulationConfig,
    /// The geometry of the roundabout.
    roundabout: Roundabout,
    /// The vehicles being simulated.
    vehicles: VehicleSet,
    /// Creates new vehicles.
    spawner: Spawner,
    /// The simulated time in s.
    time: f64,
    /// The number of conflicts recorded so far.
    total_conflicts: usize,
    /// The conflicts recorded in the last frame.
    last_conflicts: Vec<ConflictEvent>,
    /// The vehicles which have completed their journey.
    journeys: Vec<JourneyRecord>,
    /// The periodic flow statistics.
    flow: Vec<FlowSample>,
    /// The time since the last flow sample in s.
    flow_timer: f64,
}

impl Simulation {
    /// Creates a new simulation with no vehicles.
    pub fn new(config: SimulationConfig) -> Self {
        let roundabout = Roundabout::new(&config.geometry);
        let spawner = Spawner::new(config.seed, &config.spawn);
        Self {
            config,
            roundabout,
            vehicles: VehicleSet::default(),
            spawner,
            time: 0.0,
            total_conflicts: 0,
            last_conflicts: vec![],
            journeys: vec![],
            flow: vec![],
            flow_timer: 0.0,
        }
    }

    /// The simulation parameters.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// The geometry of the roundabout.
    pub fn roundabout(&self) -> &Roundabout {
        &self.roundabout
    }

    /// Changes a parameter of the running simulation. Takes effect from the next step.
    pub fn adjust(&mut self, adjustment: Adjustment) {
        self.config.apply(adjustment);
        log::info!("Applied {:?}", adjustment);
    }

    /// Adds a vehicle at the far end of its approach leg.
    pub fn add_vehicle(&mut self, attributes: &VehicleAttributes) -> Result<VehicleId, SpawnRejected> {
        let distance = self.config.geometry.spawn_distance();
        self.add_vehicle_at(attributes, distance)
    }

    /// Adds a vehicle on its approach leg at `distance` from the centre.
    ///
    /// The vehicle is refused if its exit is its entry, if the simulation is
    /// full, or if it would not be behind every vehicle already on the leg
    /// by the spawn clearance.
    pub fn add_vehicle_at(
        &mut self,
        attributes: &VehicleAttributes,
        distance: f64,
    ) -> Result<VehicleId, SpawnRejected> {
        check_admission(&self.vehicles, attributes, distance, &self.config.spawn)?;
        let vel = initial_speed(&self.vehicles, attributes, distance, &self.config);
        let id = self.insert_vehicle(attributes, JourneyState::Approaching { distance }, vel);
        log::debug!(
            "Spawned {} vehicle {:?} from {:?} to {:?}",
            attributes.behavior,
            id,
            attributes.entry,
            attributes.exit
        );
        Ok(id)
    }

    /// Places a vehicle anywhere along its journey, without any spacing checks.
    pub fn place_vehicle(
        &mut self,
        attributes: &VehicleAttributes,
        state: JourneyState,
        vel: f64,
    ) -> Result<VehicleId, SpawnRejected> {
        if attributes.entry == attributes.exit {
            return Err(SpawnRejected::SameLeg);
        }
        Ok(self.insert_vehicle(attributes, state, vel))
    }

    /// Removes a vehicle from the simulation, without recording its journey.
    pub fn remove_vehicle(&mut self, id: VehicleId) {
        self.vehicles.remove(id);
    }

    /// Advances the simulation by one time step.
    pub fn step(&mut self) {
        let dt = self.config.time_step;
        self.spawn(dt);
        self.apply_accelerations();
        self.integrate(dt);
        self.advance_vehicles();
        self.retire_vehicles();
        self.count_conflicts();
        self.sample_flow(dt);
    }

    /// The simulated time in s.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// The number of conflicts recorded so far.
    pub fn total_conflicts(&self) -> usize {
        self.total_conflicts
    }

    /// The conflicts recorded in the last step.
    pub fn last_conflicts(&self) -> &[ConflictEvent] {
        &self.last_conflicts
    }

    /// Returns an iterator over all the vehicles in the simulation.
    pub fn iter_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    /// Gets a reference to the vehicle with the given ID, if it is still active.
    pub fn get_vehicle(&self, vehicle_id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(vehicle_id)
    }

    /// A read-only view of every active vehicle.
    pub fn snapshots(&self) -> impl Iterator<Item = VehicleSnapshot> + '_ {
        self.vehicles
            .values()
            .map(|veh| veh.snapshot(&self.roundabout))
    }

    /// The vehicles which have completed their journey.
    pub fn journeys(&self) -> &[JourneyRecord] {
        &self.journeys
    }

    /// The flow statistics sampled so far.
    pub fn flow_samples(&self) -> &[FlowSample] {
        &self.flow
    }

    /// The number of vehicles on the ring or its transition curves.
    pub fn ring_occupancy(&self) -> usize {
        ring_occupancy(&self.vehicles)
    }

    /// The mean speed of the vehicles on the ring, or zero if there are none.
    pub fn mean_ring_speed(&self) -> f64 {
        let (count, total) = self
            .vehicles
            .values()
            .filter(|veh| veh.phase().is_ring())
            .fold((0, 0.0), |(count, total), veh| (count + 1, total + veh.vel()));
        if count == 0 {
            0.0
        } else {
            total / count as f64
        }
    }

    /// The vehicle which the given vehicle currently follows.
    pub fn lead_of(&self, vehicle_id: VehicleId) -> Option<Lead> {
        let vehicle = self.vehicles.get(vehicle_id)?;
        find_lead(&self.vehicles, vehicle, &self.roundabout, &self.config.lead)
    }

    /// Judges whether a vehicle could enter the ring from `leg` right now.
    pub fn may_enter(&self, leg: Leg) -> Admission {
        judge(&self.vehicles, leg, 0, &self.roundabout, &self.config.merge)
    }

    /// Builds a report of the completed journeys, the vehicles still
    /// travelling and the flow statistics.
    pub fn report(&self) -> Report {
        let in_progress = self
            .vehicles
            .values()
            .map(|veh| JourneyRecord::in_progress(veh, self.time));
        let journeys = self.journeys.iter().cloned().chain(in_progress).collect();
        Report::new(journeys, self.flow.clone(), self.time, self.total_conflicts)
    }

    fn insert_vehicle(
        &mut self,
        attributes: &VehicleAttributes,
        state: JourneyState,
        vel: f64,
    ) -> VehicleId {
        let time = self.time;
        let config = &self.config;
        self.vehicles
            .insert_with_key(|id| Vehicle::new(id, attributes, state, vel, time, config))
    }

    /// Attempts to spawn a vehicle, if one is due.
    fn spawn(&mut self, dt: f64) {
        if !self.spawner.tick(dt, &self.config.spawn) {
            return;
        }
        let attributes = self.spawner.choose(&self.config.spawn);
        if let Err(reason) = self.add_vehicle(&attributes) {
            log::trace!("Spawn refused: {}", reason);
        }
    }

    /// Calculates the accelerations of the vehicles from the state at the
    /// end of the previous step.
    fn apply_accelerations(&mut self) {
        for vehicle in self.vehicles.values() {
            vehicle.reset();
        }

        // The head of a queue yields to the ring as it nears the stop line
        let mut claimed = 0;
        for vehicle_id in self.queue_heads() {
            let vehicle = &self.vehicles[vehicle_id];
            let admission = judge(
                &self.vehicles,
                vehicle.entry(),
                claimed,
                &self.roundabout,
                &self.config.merge,
            );
            if admission.is_granted() {
                claimed += 1;
            }
            vehicle.set_blocked(!admission.is_granted());
        }

        for vehicle in self.vehicles.values() {
            let lead = find_lead(&self.vehicles, vehicle, &self.roundabout, &self.config.lead)
                .and_then(|lead| self.vehicles.get(lead.id));
            vehicle.accelerate(lead, &self.roundabout, &self.config);
            vehicle.apply_stop_line(&self.config);
        }
    }

    /// Integrates the velocities and positions of all vehicles.
    fn integrate(&mut self, dt: f64) {
        for vehicle in self.vehicles.values_mut() {
            vehicle.integrate(dt, &self.roundabout, &self.config);
        }
        self.time += dt;
    }

    /// Moves vehicles which have completed a segment of their journey onto
    /// the next, then lets vehicles at the stop lines onto the ring one at a
    /// time, so that each admission sees those made before it.
    fn advance_vehicles(&mut self) {
        for vehicle in self.vehicles.values_mut() {
            vehicle.advance(&self.roundabout);
        }

        let stop_line = self.config.geometry.stop_line;
        let mut claimed = 0;
        for vehicle_id in self.queue_heads() {
            let vehicle = &self.vehicles[vehicle_id];
            let admission = judge(
                &self.vehicles,
                vehicle.entry(),
                claimed,
                &self.roundabout,
                &self.config.merge,
            );
            let at_line = vehicle.reached_stop_line(stop_line);
            match (admission, at_line) {
                (Admission::Granted, true) => self.vehicles[vehicle_id].enter(&self.roundabout),
                // Keeps its place until it reaches the line
                (Admission::Granted, false) => claimed += 1,
                (refused, true) => {
                    log::trace!("Vehicle {:?} held at stop line: {:?}", vehicle_id, refused);
                }
                (_, false) => {}
            }
        }

        for vehicle in self.vehicles.values_mut() {
            if vehicle.reached_stop_line(stop_line) {
                vehicle.hold_at_stop_line(stop_line);
            }
        }
    }

    /// The vehicles at the front of their queue within the yield zone, the
    /// longest waiting first.
    fn queue_heads(&self) -> SmallVec<[VehicleId; 4]> {
        let geometry = &self.config.geometry;
        self.vehicles
            .values()
            .filter(|veh| match veh.state() {
                JourneyState::Approaching { distance } => {
                    distance - geometry.stop_line <= geometry.yield_zone
                }
                _ => false,
            })
            .filter(|veh| find_lead(&self.vehicles, veh, &self.roundabout, &self.config.lead).is_none())
            .sorted_by(|a, b| {
                b.wait_time()
                    .total_cmp(&a.wait_time())
                    .then_with(|| a.id().cmp(&b.id()))
            })
            .map(|veh| veh.id())
            .collect()
    }

    /// Removes vehicles which have left the modelled area, recording their journeys.
    fn retire_vehicles(&mut self) {
        let removal = self.config.geometry.removal_distance;
        let finished: SmallVec<[VehicleId; 4]> = self
            .vehicles
            .values()
            .filter(|veh| veh.is_finished(removal))
            .map(|veh| veh.id())
            .collect();

        for vehicle_id in finished {
            if let Some(vehicle) = self.vehicles.remove(vehicle_id) {
                let record = JourneyRecord::completed(&vehicle, self.time);
                log::debug!(
                    "Vehicle {:?} retired after {:.1}s, waited {:.1}s",
                    vehicle_id,
                    record.travel_time,
                    record.wait_time
                );
                self.journeys.push(record);
            }
        }
    }

    /// Records close approaches between moving vehicles.
    fn count_conflicts(&mut self) {
        let events = detect_conflicts(
            &self.vehicles,
            &self.roundabout,
            &self.config.lead,
            &self.config.conflict,
        );
        for event in &events {
            self.vehicles[event.follower].add_conflict();
        }
        self.total_conflicts += events.len();
        self.last_conflicts = events;
    }

    /// Samples the flow statistics, if a sample is due.
    fn sample_flow(&mut self, dt: f64) {
        self.flow_timer += dt;
        if self.flow_timer < self.config.flow_sample_interval {
            return;
        }
        self.flow_timer -= self.config.flow_sample_interval;
        let sample = FlowSample {
            time: self.time,
            active_vehicles: self.vehicles.len(),
            ring_occupants: self.ring_occupancy(),
            mean_ring_speed: self.mean_ring_speed(),
        };
        self.flow.push(sample);
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}
