//! Technician sessions: priority access to the analyzer, refills,
//! waste disposal and flag handling.

use labsim_core::{
    config::LabConfig,
    event::{AnalysisMode, AnalyzerStatus, LabEvent, MaintenanceKind, SampleOutcome},
    lab::LabSimulation,
    stats::{RunRecorder, METRIC_MAINTENANCE},
    types::Priority,
};
use std::cell::RefCell;
use std::rc::Rc;

fn lab(config: LabConfig) -> (LabSimulation, Rc<RefCell<RunRecorder>>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let recorder = RunRecorder::shared();
    let sim = LabSimulation::new("maintenance-test", config, 7, recorder.clone()).expect("build lab");
    (sim, recorder)
}

fn level(sim: &LabSimulation, name: &str) -> f64 {
    sim.outcome_summary().expect("summary").final_levels[name]
}

fn sessions(recorder: &RunRecorder) -> Vec<(f64, f64, MaintenanceKind)> {
    recorder
        .events()
        .iter()
        .filter_map(|e| match e {
            LabEvent::MaintenanceCompleted { start, end, kind } => Some((*start, *end, *kind)),
            _ => None,
        })
        .collect()
}

#[test]
fn maintenance_overtakes_waiting_samples_but_never_the_running_one() {
    let mut config = LabConfig::default_test();
    config.timing.ret_incubation = 10.0;
    let (mut sim, recorder) = lab(config);

    let (ret_id, ret_pid) = sim.submit_sample(AnalysisMode::Ret).unwrap();
    let (cbc_id, _) = sim.submit_sample(AnalysisMode::Cbc).unwrap();

    sim.run_until(20.0).unwrap();
    assert_eq!(*sim.model().status.get(), AnalyzerStatus::Analyzing);
    assert!(sim.signal_maintenance(true, false).unwrap(), "technician was idle");

    sim.run_until(21.0).unwrap();
    let maintenance = sim.model().maintenance;
    let analyzer = sim.model().analyzer;
    let waiting: Vec<_> = sim
        .engine()
        .kernel()
        .resource(analyzer)
        .unwrap()
        .waiters()
        .iter()
        .map(|w| (w.process, w.priority))
        .collect();
    assert_eq!(waiting, vec![(maintenance, Priority::Critical), (ret_pid, Priority::Normal)]);

    sim.run_until(2000.0).unwrap();
    let recorder = recorder.borrow();
    let outcomes = recorder.outcomes();
    assert_eq!(outcomes.len(), 2);

    assert_eq!(outcomes[0].sample_id, cbc_id);
    assert_eq!(outcomes[0].analysis_start, Some(0.0));
    assert_eq!(outcomes[0].analysis_end, 60.0);

    assert_eq!(outcomes[1].sample_id, ret_id);
    assert_eq!(outcomes[1].outcome, SampleOutcome::Completed);
    assert_eq!(outcomes[1].analysis_start, Some(600.0));
    assert_eq!(outcomes[1].analysis_end, 660.0);

    assert_eq!(sessions(&recorder), vec![(60.0, 600.0, MaintenanceKind::Reagent)]);
    assert_eq!(recorder.values(METRIC_MAINTENANCE), &[540.0]);
    assert!(!*sim.model().needs_reagent.get());
    assert!((level(&sim, "diluent") - 4998.0).abs() < 1e-9, "refilled, then one more draw");
    assert_eq!(*sim.model().status.get(), AnalyzerStatus::Idle);
}

#[test]
fn waste_session_empties_the_container_and_leaves_reagents_alone() {
    let mut config = LabConfig::default_test();
    config.initial_levels.diluent = Some(100.0);
    config.initial_levels.waste = Some(19_000.0);
    let (mut sim, recorder) = lab(config);

    sim.signal_maintenance(false, true).unwrap();
    sim.run_until(1000.0).unwrap();

    assert_eq!(sessions(&recorder.borrow()), vec![(0.0, 720.0, MaintenanceKind::Waste)]);
    assert_eq!(level(&sim, "waste"), 0.0);
    assert_eq!(level(&sim, "diluent"), 100.0);
    assert!(!*sim.model().needs_waste.get());
    assert!(!*sim.model().needs_reagent.get());

    let tally = &sim.model().tally;
    assert_eq!(tally.maintenance_sessions, 1);
    assert_eq!(tally.waste_sessions, 1);
    assert_eq!(tally.reagent_sessions, 0);
}

#[test]
fn combined_session_clears_both_flags() {
    let mut config = LabConfig::default_test();
    config.initial_levels.lyse = Some(10.0);
    config.initial_levels.waste = Some(500.0);
    let (mut sim, recorder) = lab(config);

    sim.signal_maintenance(true, true).unwrap();
    sim.run_until(5000.0).unwrap();

    let done = sessions(&recorder.borrow());
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].2, MaintenanceKind::Both);
    // prep + one refill + disposal + finish
    assert_eq!(done[0].1 - done[0].0, 300.0 + 120.0 + 300.0 + 120.0);

    let saw_combined_status = recorder.borrow().events().iter().any(|e| {
        matches!(e, LabEvent::StatusChanged { status: AnalyzerStatus::Maintenance, .. })
    });
    assert!(saw_combined_status);
    assert_eq!(level(&sim, "lyse"), 1000.0);
    assert_eq!(level(&sim, "waste"), 0.0);
    assert!(!*sim.model().needs_reagent.get());
    assert!(!*sim.model().needs_waste.get());
}

#[test]
fn flag_raised_during_a_session_gets_its_own_session() {
    let mut config = LabConfig::default_test();
    config.initial_levels.diluent = Some(100.0);
    config.initial_levels.waste = Some(19_000.0);
    let (mut sim, recorder) = lab(config);

    sim.signal_maintenance(true, false).unwrap();
    sim.run_until(100.0).unwrap();
    assert!(!sim.signal_maintenance(false, true).unwrap(), "technician is busy");

    sim.run_until(5000.0).unwrap();
    assert_eq!(
        sessions(&recorder.borrow()),
        vec![
            (0.0, 540.0, MaintenanceKind::Reagent),
            (540.0, 1260.0, MaintenanceKind::Waste),
        ]
    );
    assert_eq!(level(&sim, "diluent"), 5000.0);
    assert_eq!(level(&sim, "waste"), 0.0);
    assert_eq!(sim.model().tally.maintenance_sessions, 2);
}

#[test]
fn depleted_reagent_fails_the_sample_and_summons_the_technician() {
    let mut config = LabConfig::default_test();
    config.initial_levels.diluent = Some(1.0);
    let (mut sim, recorder) = lab(config);

    let (failed_id, _) = sim.submit_sample(AnalysisMode::Cbc).unwrap();
    sim.run_until(1.0).unwrap();
    assert_eq!(*sim.model().status.get(), AnalyzerStatus::MaintenanceReagent);

    sim.run_until(600.0).unwrap();
    {
        let recorder = recorder.borrow();
        let first = &recorder.outcomes()[0];
        assert_eq!(first.sample_id, failed_id);
        assert_eq!(first.outcome, SampleOutcome::Failed);
        assert_eq!(first.analysis_start, Some(0.0));
        assert_eq!(first.analysis_end, 0.0);
        assert_eq!(sessions(&recorder), vec![(0.0, 540.0, MaintenanceKind::Reagent)]);
        let saw_error = recorder.events().iter().any(|e| {
            matches!(e, LabEvent::StatusChanged { status: AnalyzerStatus::ErrorReagent, .. })
        });
        assert!(saw_error);
    }
    assert_eq!(level(&sim, "diluent"), 5000.0);

    sim.submit_sample(AnalysisMode::Cbc).unwrap();
    sim.run_until(700.0).unwrap();
    let recorder = recorder.borrow();
    let second = &recorder.outcomes()[1];
    assert_eq!(second.outcome, SampleOutcome::Completed);
    assert_eq!(second.analysis_start, Some(600.0));
    assert_eq!(second.analysis_end, 660.0);
}

#[test]
fn full_waste_container_fails_the_sample_after_analysis() {
    let mut config = LabConfig::default_test();
    config.initial_levels.waste = Some(19_999.0);
    let (mut sim, recorder) = lab(config);

    sim.submit_sample(AnalysisMode::Cbc).unwrap();
    sim.run_until(59.0).unwrap();
    assert!(!*sim.model().needs_waste.get());

    sim.run_until(2000.0).unwrap();
    let recorder = recorder.borrow();
    let outcome = &recorder.outcomes()[0];
    assert_eq!(outcome.outcome, SampleOutcome::Failed);
    assert_eq!(outcome.analysis_start, Some(0.0));
    assert_eq!(outcome.analysis_end, 60.0);
    assert_eq!(sessions(&recorder).len(), 1);
    assert_eq!(sessions(&recorder)[0].2, MaintenanceKind::Waste);
    assert_eq!(level(&sim, "waste"), 0.0);
    assert_eq!(sim.model().tally.waste_sessions, 1);
}

#[test]
fn a_session_is_counted_only_once_the_analyzer_is_granted() {
    let (mut sim, _recorder) = lab(LabConfig::default_test());
    sim.submit_sample(AnalysisMode::Cbc).unwrap();
    sim.run_until(10.0).unwrap();

    sim.signal_maintenance(true, false).unwrap();
    sim.run_until(20.0).unwrap();
    assert_eq!(sim.model().tally.maintenance_sessions, 0, "still waiting for the analyzer");

    let maintenance = sim.model().maintenance;
    sim.engine_mut().activate(maintenance).unwrap();
    sim.run_until(30.0).unwrap();
    assert_eq!(sim.model().tally.maintenance_sessions, 0, "interrupted request is not a session");
    assert!(sim.engine().kernel().resource(sim.model().analyzer).unwrap().waiters().is_empty());

    assert!(sim.signal_maintenance(true, false).unwrap());
    sim.run_until(61.0).unwrap();
    assert_eq!(sim.model().tally.maintenance_sessions, 1);
    assert_eq!(*sim.model().status.get(), AnalyzerStatus::MaintenanceReagent);

    sim.run_until(2000.0).unwrap();
    assert_eq!(sim.model().tally.maintenance_sessions, 1);
    assert_eq!(sim.model().tally.reagent_sessions, 1);
}

#[test]
fn waking_without_flags_is_a_no_op() {
    let (mut sim, recorder) = lab(LabConfig::default_test());
    sim.signal_maintenance(false, false).unwrap();
    sim.run_until(1000.0).unwrap();
    assert!(sessions(&recorder.borrow()).is_empty());
    assert_eq!(sim.model().tally.maintenance_sessions, 0);
    assert_eq!(*sim.model().status.get(), AnalyzerStatus::Idle);
}
