//! Properties that must hold for any seed over a long run.

use labsim_core::{
    config::LabConfig,
    event::{AnalyzerStatus, LabEvent, OutcomeRecord, SampleOutcome},
    lab::{LabSimulation, OutcomeSummary},
    stats::{RunRecorder, METRIC_TURNAROUND},
};

const DAY: f64 = 24.0 * 3600.0;

fn run(config: LabConfig, seed: u64) -> (OutcomeSummary, RunRecorder) {
    let recorder = RunRecorder::shared();
    let mut sim = LabSimulation::new(format!("inv-{seed}"), config, seed, recorder.clone()).expect("build lab");
    sim.run_for(DAY).expect("run");
    let summary = sim.outcome_summary().expect("summary");
    let recorder = recorder.borrow().clone();
    (summary, recorder)
}

fn assert_outcome_ordering(outcomes: &[OutcomeRecord]) {
    for o in outcomes {
        assert!(o.queue_time <= o.analysis_end, "{} ended before it queued", o.sample_id);
        if let Some(start) = o.analysis_start {
            assert!(o.queue_time <= start, "{} started before it queued", o.sample_id);
            assert!(start <= o.analysis_end, "{} ended before it started", o.sample_id);
        }
        if o.outcome == SampleOutcome::Completed {
            assert!(o.analysis_start.is_some(), "{} completed without analysis", o.sample_id);
        }
    }
}

/// Samples and maintenance sessions never hold the analyzer at once.
fn assert_exclusive_analyzer(outcomes: &[OutcomeRecord], events: &[LabEvent]) {
    let sessions = events.iter().filter_map(|e| match e {
        LabEvent::MaintenanceCompleted { start, end, .. } => Some((*start, *end)),
        _ => None,
    });
    let mut spans: Vec<(f64, f64)> = outcomes
        .iter()
        .filter_map(|o| o.analysis_start.map(|s| (s, o.analysis_end)))
        .chain(sessions)
        .collect();
    spans.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
    for pair in spans.windows(2) {
        assert!(
            pair[1].0 >= pair[0].1 - 1e-9,
            "analyzer spans overlap: {:?} and {:?}",
            pair[0],
            pair[1]
        );
    }
}

fn assert_levels_in_bounds(config: &LabConfig, events: &[LabEvent]) {
    let caps = &config.capacities;
    for event in events {
        if let LabEvent::LevelChanged { store, level, .. } = event {
            let capacity = match store.as_str() {
                "diluent" => caps.diluent,
                "lyse" => caps.lyse,
                "sheath" => caps.sheath,
                "detergent" => caps.detergent,
                "waste" => caps.waste,
                other => panic!("unexpected store {other}"),
            };
            assert!(*level >= 0.0 && *level <= capacity, "{store} at {level} outside [0, {capacity}]");
        }
    }
}

#[test]
fn reference_lab_keeps_its_invariants_across_seeds() {
    for seed in [1, 7, 42, 2024] {
        let config = LabConfig::default();
        let (summary, recorder) = run(config.clone(), seed);

        assert_outcome_ordering(recorder.outcomes());
        assert_exclusive_analyzer(recorder.outcomes(), recorder.events());
        assert_levels_in_bounds(&config, recorder.events());

        assert_eq!(
            summary.completed + summary.rerun_interrupted + summary.failed,
            recorder.outcomes().len() as u64,
            "each terminal sample records exactly one outcome"
        );
        assert_eq!(recorder.values(METRIC_TURNAROUND).len() as u64, summary.completed);
        assert!(summary.arrivals >= recorder.outcomes().len() as u64 + summary.rejected);
        assert!((0.0..=1.0).contains(&summary.analyzer_utilization));
        let status_total: f64 = summary.status_durations.values().sum();
        assert!(
            (status_total - summary.end_time).abs() < 1e-6,
            "status time {status_total} does not cover the run ({})",
            summary.end_time
        );
    }
}

#[test]
fn starved_lab_fails_samples_but_recovers_through_maintenance() {
    let mut config = LabConfig::default();
    config.capacities.diluent = 60.0;
    config.capacities.waste = 300.0;
    config.rerun_probability = 0.2;
    let (summary, recorder) = run(config.clone(), 5);

    assert_outcome_ordering(recorder.outcomes());
    assert_exclusive_analyzer(recorder.outcomes(), recorder.events());
    assert_levels_in_bounds(&config, recorder.events());

    assert!(summary.maintenance_sessions > 0);
    let off_duty: f64 = summary
        .status_durations
        .iter()
        .filter(|(s, _)| !matches!(s, AnalyzerStatus::Idle | AnalyzerStatus::Analyzing))
        .map(|(_, t)| t)
        .sum();
    assert!(off_duty > 0.0, "maintenance and errors take analyzer time");
    assert!(summary.reagent_sessions > 0);
    assert!(summary.waste_sessions > 0);
    assert!(summary.completed > 0, "maintenance must restore service");

    // Reruns are never flagged again.
    for o in recorder.outcomes().iter().filter(|o| o.is_rerun) {
        assert_ne!(o.outcome, SampleOutcome::ReRunInterrupted);
    }
}
