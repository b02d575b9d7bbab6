use labsim_core::{
    config::LabConfig,
    event::{AnalysisMode, LabEvent},
    lab::LabSimulation,
    stats::{RunRecorder, METRIC_TURNAROUND},
    store::ResultStore,
};

fn store() -> ResultStore {
    let store = ResultStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    store
}

#[test]
fn finished_run_round_trips_through_the_database() {
    let config = LabConfig::default_test();
    let recorder = RunRecorder::shared();
    let mut sim = LabSimulation::new("store-test", config.clone(), 99, recorder.clone()).unwrap();
    sim.submit_sample(AnalysisMode::Cbc).unwrap();
    sim.submit_sample(AnalysisMode::Cbc5Diff).unwrap();
    sim.run_until(1000.0).unwrap();

    let db = store();
    db.insert_run("store-test", 99, "0.1.0-test", 1000.0, &config).unwrap();
    db.save_recorder("store-test", &recorder.borrow()).unwrap();

    let recorder = recorder.borrow();
    assert_eq!(db.run_seed("store-test").unwrap(), Some(99));
    assert_eq!(db.run_seed("missing").unwrap(), None);
    assert_eq!(db.outcome_count("store-test", "completed").unwrap(), 2);
    assert_eq!(db.outcome_count("store-test", "failed").unwrap(), 0);
    assert_eq!(db.outcomes_for_run("store-test").unwrap(), recorder.outcomes());
    assert_eq!(db.metric_values("store-test", METRIC_TURNAROUND).unwrap(), recorder.values(METRIC_TURNAROUND));

    let events = db.events_for_run("store-test").unwrap();
    assert_eq!(events.len(), recorder.events().len());
    let first: LabEvent = serde_json::from_str(&events[0].payload).unwrap();
    assert_eq!(first, recorder.events()[0]);
    assert_eq!(events[0].event_type, "run_initialized");
}

#[test]
fn results_need_a_registered_run() {
    let db = store();
    let recorder = RunRecorder::shared();
    let mut sim = LabSimulation::new("orphan", LabConfig::default_test(), 1, recorder.clone()).unwrap();
    sim.submit_sample(AnalysisMode::Cbc).unwrap();
    sim.run_until(100.0).unwrap();

    assert!(db.save_recorder("orphan", &recorder.borrow()).is_err());
    assert!(db.outcomes_for_run("orphan").unwrap().is_empty());
}

#[test]
fn run_lookup_surfaces_database_errors() {
    let unmigrated = ResultStore::in_memory().expect("in-memory store");
    assert!(unmigrated.run_seed("any").is_err(), "a missing table is not a missing run");

    let db = store();
    assert_eq!(db.run_seed("any").unwrap(), None);
}
