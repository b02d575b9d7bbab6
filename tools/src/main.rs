//! lab-runner: headless run of the analyzer simulation.
//!
//! Usage:
//!   lab-runner --seed 12345 --hours 24
//!   lab-runner --seed 12345 --hours 72 --config lab.json --db runs.db --json

use anyhow::Result;
use labsim_core::{
    config::LabConfig,
    lab::{LabSimulation, OutcomeSummary},
    stats::{RunRecorder, SharedSink},
    store::ResultStore,
};
use std::env;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let hours = parse_arg(&args, "--hours", 24.0f64);
    let json = args.iter().any(|a| a == "--json");
    let config_path = string_arg(&args, "--config");
    let db = string_arg(&args, "--db");

    let config = match config_path {
        Some(path) => LabConfig::load(path)?,
        None => LabConfig::default(),
    };
    let run_id = format!("run-{seed}-{}", uuid::Uuid::new_v4().simple());
    let duration = hours * 3600.0;

    if !json {
        println!("lab-runner");
        println!("  run:     {run_id}");
        println!("  seed:    {seed}");
        println!("  hours:   {hours}");
        println!("  config:  {}", config_path.unwrap_or("(reference)"));
        println!("  db:      {}", db.unwrap_or("(none)"));
        println!();
    }

    let recorder = RunRecorder::shared();
    let sink: SharedSink = recorder.clone();
    let mut sim = LabSimulation::new(run_id.clone(), config.clone(), seed, sink)?;
    sim.run_for(duration)?;
    let summary = sim.outcome_summary()?;

    if let Some(path) = db {
        let store = ResultStore::open(path)?;
        store.migrate()?;
        store.insert_run(&run_id, seed, env!("CARGO_PKG_VERSION"), duration, &config)?;
        store.save_recorder(&run_id, &recorder.borrow())?;
        log::info!("saved run {run_id} to {path}");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(s: &OutcomeSummary) {
    println!("Run {} ended at t={:.0}s", s.run_id, s.end_time);
    println!("  arrivals:           {}", s.arrivals);
    println!("  rejected:           {}", s.rejected);
    println!("  completed:          {}", s.completed);
    println!("  re-run interrupted: {}", s.rerun_interrupted);
    println!("  failed:             {}", s.failed);
    println!(
        "  maintenance:        {} sessions ({} reagent, {} waste)",
        s.maintenance_sessions, s.reagent_sessions, s.waste_sessions
    );
    println!("  utilization:        {:.1}%", s.analyzer_utilization * 100.0);
    println!("  queue length:       {} now, {:.2} mean", s.queue_length, s.mean_queue_length);
    println!();
    println!("  analyzer status time:");
    for (status, seconds) in &s.status_durations {
        let share = if s.end_time > 0.0 { seconds / s.end_time * 100.0 } else { 0.0 };
        println!("    {:<22} {:>10.0} s {:>6.1}%", format!("{status:?}"), seconds, share);
    }
    println!();
    println!("  {:<30} {:>7} {:>10} {:>10} {:>10} {:>10}", "metric", "count", "mean", "std", "min", "max");
    for (name, m) in &s.metrics {
        println!(
            "  {:<30} {:>7} {:>10.2} {:>10.2} {:>10.2} {:>10.2}",
            name, m.count, m.mean, m.std_dev, m.min, m.max
        );
    }
    println!();
    println!("  final levels:");
    for (store, level) in &s.final_levels {
        println!("    {store:<10} {level:>10.2} ml");
    }
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn string_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
