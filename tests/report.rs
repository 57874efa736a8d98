//! Tests of the reporting and control surface of a running simulation.

use roundabout_sim::{Adjustment, JourneyStatus, Phase, Simulation, SimulationConfig};

fn busy_sim(seed: u64, steps: usize) -> Simulation {
    let mut config = SimulationConfig::default();
    config.seed = Some(seed);
    let mut sim = Simulation::new(config);
    for _ in 0..steps {
        sim.step();
    }
    sim
}

/// Test that the report covers every vehicle, finished or not.
#[test]
fn report_lists_all_journeys() {
    let sim = busy_sim(3, 6_000);
    let report = sim.report();
    let active = sim.iter_vehicles().count();
    let completed = sim.journeys().len();
    assert!(active > 0);
    assert_eq!(report.journeys().len(), active + completed);
    assert_eq!(report.summary().completed, completed);
    assert_eq!(
        report
            .journeys()
            .iter()
            .filter(|r| r.status == JourneyStatus::InProgress)
            .count(),
        active
    );
    let counted: usize = report.summary().by_behavior.iter().map(|s| s.count).sum();
    assert_eq!(counted, report.journeys().len());

    let mut csv = vec![];
    report.write_journeys_csv(&mut csv).unwrap();
    assert_eq!(String::from_utf8(csv).unwrap().lines().count(), report.journeys().len() + 1);

    let mut json = vec![];
    report.write_json(&mut json).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
    assert_eq!(value["journeys"].as_array().unwrap().len(), report.journeys().len());
}

/// Test that flow statistics are sampled once per interval.
#[test]
fn flow_sampled_periodically() {
    let sim = busy_sim(4, 3_000);
    let samples = sim.flow_samples();
    // 60 s at one sample per second, give or take rounding
    assert!((59..=60).contains(&samples.len()));
    for pair in samples.windows(2) {
        assert!(pair[1].time > pair[0].time);
    }
    let last = samples.last().unwrap();
    assert!(last.ring_occupants <= last.active_vehicles);
    assert!(last.mean_ring_speed >= 0.0);

    let mut csv = vec![];
    sim.report().write_flow_csv(&mut csv).unwrap();
    assert_eq!(String::from_utf8(csv).unwrap().lines().count(), samples.len() + 1);
}

/// Test that snapshots agree with the vehicles they describe.
#[test]
fn snapshots_match_vehicles() {
    let sim = busy_sim(8, 4_000);
    let radius = sim.config().geometry.ring_radius;
    for snapshot in sim.snapshots() {
        let vehicle = sim.get_vehicle(snapshot.id).unwrap();
        assert_eq!(snapshot.speed, vehicle.vel());
        assert_eq!(snapshot.state.phase(), vehicle.phase());
        if vehicle.phase() == Phase::Circulating {
            let r = (snapshot.position.x.powi(2) + snapshot.position.y.powi(2)).sqrt();
            assert!((r - radius).abs() < 1e-6);
        }
    }
}

/// Test that runtime adjustments are applied and clamped.
#[test]
fn adjustments_take_effect() {
    let mut sim = busy_sim(9, 500);
    sim.adjust(Adjustment::SpeedCeiling(20.0));
    sim.adjust(Adjustment::MergeWindow(0.2));
    sim.adjust(Adjustment::MinGap(40.0));
    assert_eq!(sim.config().speeds.speed_ceiling, 20.0);
    assert_eq!(sim.config().merge.critical_gap, 0.5);
    assert_eq!(sim.config().following.min_gap_floor, 40.0);

    for _ in 0..2_000 {
        sim.step();
        for vehicle in sim.iter_vehicles() {
            assert!(vehicle.vel() <= 20.0 + 1e-9);
        }
    }
}

/// Test that two simulations with the same seed are identical.
#[test]
fn seeded_runs_repeat() {
    let a = busy_sim(21, 2_500);
    let b = busy_sim(21, 2_500);
    assert_eq!(a.journeys(), b.journeys());
    assert_eq!(a.total_conflicts(), b.total_conflicts());
    let speeds = |sim: &Simulation| sim.snapshots().map(|s| s.speed).collect::<Vec<_>>();
    assert_eq!(speeds(&a), speeds(&b));
}
