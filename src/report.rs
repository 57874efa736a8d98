//! Journey logs and flow statistics, and their export.

use crate::behavior::BehaviorKind;
use crate::geometry::Leg;
use crate::vehicle::Vehicle;
use serde::Serialize;
use slotmap::Key;
use std::io::{self, Write};
use thiserror::Error;

/// Whether a journey had finished when it was recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JourneyStatus {
    Completed,
    InProgress,
}

/// The record of one vehicle's journey.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct JourneyRecord {
    /// The vehicle's ID, as an integer.
    pub id: u64,
    pub behavior: BehaviorKind,
    pub entry: Leg,
    pub exit: Leg,
    /// The time from spawning to retirement, or to the report, in s.
    pub travel_time: f64,
    /// The time spent queueing on the approach in s.
    pub wait_time: f64,
    /// The number of conflicts the vehicle was involved in.
    pub conflicts: usize,
    pub status: JourneyStatus,
}

/// A sample of the traffic state.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct FlowSample {
    /// The simulated time in s.
    pub time: f64,
    pub active_vehicles: usize,
    /// The number of vehicles on the ring or its transition curves.
    pub ring_occupants: usize,
    /// The mean speed of the ring occupants.
    pub mean_ring_speed: f64,
}

/// Aggregate statistics of the journeys of one kind of driver.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BehaviorSummary {
    pub behavior: BehaviorKind,
    /// The number of journeys, finished or not.
    pub count: usize,
    pub completed: usize,
    pub mean_wait: f64,
    pub max_wait: f64,
    /// The mean travel time of completed journeys.
    pub mean_travel_time: f64,
    /// The total conflicts of these drivers.
    pub conflicts: usize,
}

/// Aggregate statistics of a whole run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Summary {
    /// The simulated time in s.
    pub time: f64,
    pub journeys: usize,
    pub completed: usize,
    /// The number of conflicts counted by the simulation.
    pub total_conflicts: usize,
    pub by_behavior: Vec<BehaviorSummary>,
}

/// A failure to export a report.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report")]
    Io(#[from] io::Error),
    #[error("failed to serialise report")]
    Json(#[from] serde_json::Error),
}

/// Everything recorded by a simulation.
#[derive(Clone, Debug, Serialize)]
pub struct Report {
    summary: Summary,
    journeys: Vec<JourneyRecord>,
    flow: Vec<FlowSample>,
}

impl JourneyRecord {
    /// Records the journey of a vehicle leaving the simulation.
    pub(crate) fn completed(vehicle: &Vehicle, now: f64) -> Self {
        Self::new(vehicle, now, JourneyStatus::Completed)
    }

    /// Records the journey so far of a vehicle still in the simulation.
    pub(crate) fn in_progress(vehicle: &Vehicle, now: f64) -> Self {
        Self::new(vehicle, now, JourneyStatus::InProgress)
    }

    fn new(vehicle: &Vehicle, now: f64, status: JourneyStatus) -> Self {
        Self {
            id: vehicle.id().data().as_ffi(),
            behavior: vehicle.behavior(),
            entry: vehicle.entry(),
            exit: vehicle.exit(),
            travel_time: now - vehicle.spawned_at(),
            wait_time: vehicle.wait_time(),
            conflicts: vehicle.conflicts(),
            status,
        }
    }
}

impl Summary {
    fn new(journeys: &[JourneyRecord], time: f64, total_conflicts: usize) -> Self {
        let by_behavior = BehaviorKind::ALL
            .iter()
            .map(|kind| {
                let records: Vec<_> = journeys.iter().filter(|r| r.behavior == *kind).collect();
                let done: Vec<_> = records
                    .iter()
                    .filter(|r| r.status == JourneyStatus::Completed)
                    .collect();
                BehaviorSummary {
                    behavior: *kind,
                    count: records.len(),
                    completed: done.len(),
                    mean_wait: mean(records.iter().map(|r| r.wait_time)),
                    max_wait: records.iter().map(|r| r.wait_time).fold(0.0, f64::max),
                    mean_travel_time: mean(done.iter().map(|r| r.travel_time)),
                    conflicts: records.iter().map(|r| r.conflicts).sum(),
                }
            })
            .collect();

        Self {
            time,
            journeys: journeys.len(),
            completed: journeys
                .iter()
                .filter(|r| r.status == JourneyStatus::Completed)
                .count(),
            total_conflicts,
            by_behavior,
        }
    }
}

impl Report {
    pub(crate) fn new(
        journeys: Vec<JourneyRecord>,
        flow: Vec<FlowSample>,
        time: f64,
        total_conflicts: usize,
    ) -> Self {
        Self {
            summary: Summary::new(&journeys, time, total_conflicts),
            journeys,
            flow,
        }
    }

    /// The aggregate statistics.
    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    /// The completed journeys followed by those still in progress.
    pub fn journeys(&self) -> &[JourneyRecord] {
        &self.journeys
    }

    /// The flow statistics.
    pub fn flow(&self) -> &[FlowSample] {
        &self.flow
    }

    /// Writes the journeys as CSV.
    pub fn write_journeys_csv(&self, mut out: impl Write) -> Result<(), ReportError> {
        writeln!(
            out,
            "id,behavior,entry,exit,travel_time,wait_time,conflicts,status"
        )?;
        for r in &self.journeys {
            let status = match r.status {
                JourneyStatus::Completed => "completed",
                JourneyStatus::InProgress => "in_progress",
            };
            writeln!(
                out,
                "{},{},{:?},{:?},{:.2},{:.2},{},{}",
                r.id, r.behavior, r.entry, r.exit, r.travel_time, r.wait_time, r.conflicts, status
            )?;
        }
        Ok(())
    }

    /// Writes the flow samples as CSV.
    pub fn write_flow_csv(&self, mut out: impl Write) -> Result<(), ReportError> {
        writeln!(out, "time,active_vehicles,ring_occupants,mean_ring_speed")?;
        for s in &self.flow {
            writeln!(
                out,
                "{:.2},{},{},{:.3}",
                s.time, s.active_vehicles, s.ring_occupants, s.mean_ring_speed
            )?;
        }
        Ok(())
    }

    /// Writes the whole report as JSON.
    pub fn write_json(&self, out: impl Write) -> Result<(), ReportError> {
        serde_json::to_writer_pretty(out, self)?;
        Ok(())
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (count, total) = values.fold((0usize, 0.0), |(n, sum), x| (n + 1, sum + x));
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn record(id: u64, behavior: BehaviorKind, wait_time: f64, status: JourneyStatus) -> JourneyRecord {
        JourneyRecord {
            id,
            behavior,
            entry: Leg::East,
            exit: Leg::South,
            travel_time: 40.0,
            wait_time,
            conflicts: 1,
            status,
        }
    }

    #[test]
    fn summarises_by_behavior() {
        let journeys = vec![
            record(1, BehaviorKind::Aggressive, 2.0, JourneyStatus::Completed),
            record(2, BehaviorKind::Conservative, 4.0, JourneyStatus::Completed),
            record(3, BehaviorKind::Conservative, 8.0, JourneyStatus::InProgress),
        ];
        let report = Report::new(journeys, vec![], 100.0, 3);
        let summary = report.summary();
        assert_eq!(summary.journeys, 3);
        assert_eq!(summary.completed, 2);

        let aggressive = &summary.by_behavior[0];
        assert_eq!(aggressive.behavior, BehaviorKind::Aggressive);
        assert_eq!(aggressive.count, 1);
        assert_approx_eq!(aggressive.mean_wait, 2.0);

        let conservative = &summary.by_behavior[1];
        assert_eq!(conservative.count, 2);
        assert_eq!(conservative.completed, 1);
        assert_approx_eq!(conservative.mean_wait, 6.0);
        assert_approx_eq!(conservative.max_wait, 8.0);
        assert_eq!(conservative.conflicts, 2);
    }

    #[test]
    fn writes_csv() {
        let journeys = vec![record(7, BehaviorKind::Aggressive, 1.5, JourneyStatus::InProgress)];
        let flow = vec![FlowSample {
            time: 1.0,
            active_vehicles: 3,
            ring_occupants: 1,
            mean_ring_speed: 12.5,
        }];
        let report = Report::new(journeys, flow, 1.0, 0);

        let mut buf = vec![];
        report.write_journeys_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("id,behavior,entry,exit,travel_time,wait_time,conflicts,status")
        );
        assert_eq!(lines.next(), Some("7,aggressive,East,South,40.00,1.50,1,in_progress"));

        let mut buf = vec![];
        report.write_flow_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().nth(1), Some("1.00,3,1,12.500"));
    }

    #[test]
    fn writes_json() {
        let report = Report::new(vec![], vec![], 0.0, 0);
        let mut buf = vec![];
        report.write_json(&mut buf).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["summary"]["journeys"], 0);
        assert_eq!(value["summary"]["by_behavior"][1]["behavior"], "conservative");
    }
}
