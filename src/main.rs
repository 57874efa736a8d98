use anyhow::{Context, Result};
use clap::Parser;
use roundabout_sim::{Adjustment, Simulation, SimulationConfig, SpawnWeights, Summary};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "roundabout-sim")]
#[command(about = "Headless single-lane roundabout simulation")]
struct Cli {
    /// Number of simulation steps to run
    #[arg(long, default_value = "30000")]
    steps: usize,

    /// JSON file overriding the default configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seed for the random number generator
    #[arg(long)]
    seed: Option<u64>,

    /// Share of aggressive drivers, between 0 and 1
    #[arg(long)]
    aggressive_share: Option<f64>,

    /// Mean interval between spawn attempts in seconds
    #[arg(long)]
    spawn_interval: Option<f64>,

    /// Write the journey log as CSV
    #[arg(long)]
    journeys_csv: Option<PathBuf>,

    /// Write the flow statistics as CSV
    #[arg(long)]
    flow_csv: Option<PathBuf>,

    /// Write the full report as JSON
    #[arg(long)]
    json: Option<PathBuf>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log a summary every this many steps
    #[arg(long, default_value = "5000")]
    summary_every: usize,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => SimulationConfig::default(),
    };
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    if let Some(interval) = cli.spawn_interval {
        config.spawn.interval = interval;
    }
    config.validate().context("Invalid configuration")?;

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let mut sim = Simulation::new(config);
    if let Some(share) = cli.aggressive_share {
        let share = share.clamp(0.0, 1.0);
        sim.adjust(Adjustment::SpawnWeights(SpawnWeights {
            aggressive: share,
            conservative: 1.0 - share,
        }));
    }

    log::info!("Simulating {} steps...", cli.steps);
    let start = Instant::now();
    for step in 1..=cli.steps {
        sim.step();
        if cli.summary_every > 0 && step % cli.summary_every == 0 {
            log::info!(
                "t = {:.0}s: {} active, {} on ring, {} completed, {} conflicts",
                sim.time(),
                sim.iter_vehicles().count(),
                sim.ring_occupancy(),
                sim.journeys().len(),
                sim.total_conflicts()
            );
        }
    }
    log::info!("Finished in {:?}", start.elapsed());

    let report = sim.report();
    log_summary(report.summary());

    if let Some(path) = &cli.journeys_csv {
        report.write_journeys_csv(create(path)?)?;
        log::info!("Wrote journeys to {}", path.display());
    }
    if let Some(path) = &cli.flow_csv {
        report.write_flow_csv(create(path)?)?;
        log::info!("Wrote flow statistics to {}", path.display());
    }
    if let Some(path) = &cli.json {
        report.write_json(create(path)?)?;
        log::info!("Wrote report to {}", path.display());
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<SimulationConfig> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    serde_json::from_reader(file).with_context(|| format!("Failed to parse {}", path.display()))
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn log_summary(summary: &Summary) {
    log::info!(
        "{:.0}s simulated: {} journeys, {} completed, {} conflicts",
        summary.time,
        summary.journeys,
        summary.completed,
        summary.total_conflicts
    );
    for s in &summary.by_behavior {
        log::info!(
            "  {:<12} n = {:<4} wait mean {:>6.2}s max {:>6.2}s, travel {:>6.2}s, conflicts {}",
            s.behavior.name(),
            s.count,
            s.mean_wait,
            s.max_wait,
            s.mean_travel_time,
            s.conflicts
        );
    }
}
