//! THE MOST IMPORTANT TEST IN THE PROJECT.
//!
//! Two simulations, same seed, same config.
//! They must produce identical outcome and event logs.
//! Any divergence is a blocker. Do not merge until fixed.

use labsim_core::{
    config::LabConfig,
    lab::LabSimulation,
    stats::RunRecorder,
};

const HOURS_8: f64 = 8.0 * 3600.0;

fn run(seed: u64) -> (Vec<String>, Vec<String>) {
    let recorder = RunRecorder::shared();
    let mut sim = LabSimulation::new(format!("det-test-{seed}"), LabConfig::default(), seed, recorder.clone())
        .expect("build simulation");
    sim.run_for(HOURS_8).expect("run");

    let recorder = recorder.borrow();
    let outcomes = recorder
        .outcomes()
        .iter()
        .map(|o| serde_json::to_string(o).expect("serialize outcome"))
        .collect();
    let events = recorder
        .events()
        .iter()
        .map(|e| serde_json::to_string(e).expect("serialize event"))
        .collect();
    (outcomes, events)
}

fn assert_same(label: &str, a: &[String], b: &[String]) {
    assert_eq!(a.len(), b.len(), "{label} lengths differ: {} vs {}", a.len(), b.len());
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        assert_eq!(x, y, "{label} diverged at entry {i}:\n  A: {x}\n  B: {y}");
    }
}

#[test]
fn same_seed_produces_identical_logs() {
    const SEED: u64 = 0xDEAD_BEEF_CAFE_1234;

    let (outcomes_a, events_a) = run(SEED);
    let (outcomes_b, events_b) = run(SEED);

    assert!(!outcomes_a.is_empty(), "an eight hour shift must finish samples");
    assert_same("outcome log", &outcomes_a, &outcomes_b);
    assert_same("event log", &events_a, &events_b);
}

#[test]
fn different_seeds_diverge() {
    let (outcomes_a, _) = run(1);
    let (outcomes_b, _) = run(2);
    assert_ne!(outcomes_a, outcomes_b, "analysis noise must depend on the seed");
}
