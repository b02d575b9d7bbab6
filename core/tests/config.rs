use labsim_core::{
    config::{LabConfig, ModeTable, ModeWeight},
    error::SimError,
    event::AnalysisMode,
    lab::LabSimulation,
    rng::Distribution,
    stats::RunRecorder,
};

fn temp_config(name: &str, body: &str) -> String {
    let path = std::env::temp_dir().join(format!("labsim-{}-{name}.json", std::process::id()));
    std::fs::write(&path, body).expect("write temp config");
    path.to_string_lossy().into_owned()
}

#[test]
fn reference_and_test_configs_validate() {
    LabConfig::default().validate().expect("reference config");
    LabConfig::default_test().validate().expect("test config");
    assert_eq!(LabConfig::default().rerun_probability, 0.02);
}

#[test]
fn partial_file_keeps_reference_values_for_missing_fields() {
    let path = temp_config(
        "partial",
        r#"{
            "capacities": { "autoloader": 10 },
            "timing": { "analysis": { "kind": "constant", "value": 45.0 } },
            "modes": [
                { "mode": "cbc", "probability": 0.5 },
                { "mode": "ret", "probability": 0.5 }
            ]
        }"#,
    );
    let config = LabConfig::load(&path).expect("load partial config");
    std::fs::remove_file(&path).ok();

    assert_eq!(config.capacities.autoloader, 10);
    assert_eq!(config.capacities.diluent, 5000.0);
    assert_eq!(config.timing.analysis, Distribution::Constant { value: 45.0 });
    assert_eq!(config.timing.ret_incubation, 900.0);
    assert_eq!(config.rerun_probability, 0.02);
    assert_eq!(config.modes.pick(0.7), AnalysisMode::Ret);
}

#[test]
fn load_rejects_unreadable_and_invalid_files() {
    assert!(LabConfig::load("/definitely/not/here.json").is_err());

    let path = temp_config("bad-sum", r#"{ "modes": [ { "mode": "cbc", "probability": 0.9 } ] }"#);
    let result = LabConfig::load(&path);
    std::fs::remove_file(&path).ok();
    assert!(result.is_err());
}

#[test]
fn validation_catches_each_class_of_mistake() {
    let cases: Vec<(&str, Box<dyn Fn(&mut LabConfig)>)> = vec![
        ("probability sum", Box::new(|c: &mut LabConfig| c.modes.weights[0].probability = 0.5)),
        ("rerun probability", Box::new(|c: &mut LabConfig| c.rerun_probability = 1.5)),
        ("autoloader", Box::new(|c: &mut LabConfig| c.capacities.autoloader = 0)),
        ("store capacity", Box::new(|c: &mut LabConfig| c.capacities.sheath = 0.0)),
        ("initial level", Box::new(|c: &mut LabConfig| c.initial_levels.waste = Some(50_000.0))),
        ("volume", Box::new(|c: &mut LabConfig| c.consumption.diluent_per_sample = -1.0)),
        ("threshold", Box::new(|c: &mut LabConfig| c.thresholds.waste_high_pct = 120.0)),
        ("duration", Box::new(|c: &mut LabConfig| c.maintenance.prep_time = -5.0)),
        ("monitor interval", Box::new(|c: &mut LabConfig| {
            c.actors.level_monitor = true;
            c.actors.monitor_interval = 0.0;
        })),
        ("distribution", Box::new(|c: &mut LabConfig| c.timing.analysis = Distribution::Normal { mean: 60.0, std_dev: -1.0 })),
        ("zero constant gap", Box::new(|c: &mut LabConfig| c.timing.inter_arrival = Distribution::Constant { value: 0.0 })),
        ("zero uniform gap", Box::new(|c: &mut LabConfig| c.timing.inter_arrival = Distribution::Uniform { low: 0.0, high: 0.0 })),
        ("non-positive gap mean", Box::new(|c: &mut LabConfig| c.timing.inter_arrival = Distribution::Normal { mean: 0.0, std_dev: 1.0 })),
    ];
    for (label, mutate) in cases {
        let mut config = LabConfig::default_test();
        mutate(&mut config);
        assert!(
            matches!(config.validate(), Err(SimError::InvalidConfig(_))),
            "{label} mistake was accepted"
        );
    }
}

#[test]
fn zero_gap_arrivals_are_rejected_before_the_run() {
    let mut config = LabConfig::default_test();
    config.actors.arrivals = true;
    config.timing.inter_arrival = Distribution::Constant { value: 0.0 };
    let result = LabSimulation::new("zero-gap", config, 1, RunRecorder::shared());
    assert!(matches!(result, Err(SimError::InvalidConfig(_))), "zero gaps would stall virtual time");

    let mut config = LabConfig::default_test();
    config.timing.inter_arrival = Distribution::Uniform { low: 0.0, high: 30.0 };
    config.validate().expect("a uniform gap with a positive upper bound advances time");
}

#[test]
fn invalid_config_never_builds_a_simulation() {
    let mut config = LabConfig::default_test();
    config.modes = ModeTable { weights: vec![ModeWeight { mode: AnalysisMode::Cbc, probability: 0.4 }] };
    let result = LabSimulation::new("bad", config, 1, RunRecorder::shared());
    assert!(matches!(result, Err(SimError::InvalidConfig(_))));
}

#[test]
fn mode_table_maps_uniform_draws_onto_cumulative_weights() {
    let table = ModeTable::default();
    assert_eq!(table.pick(0.0), AnalysisMode::Cbc);
    assert_eq!(table.pick(0.0999), AnalysisMode::Cbc);
    assert_eq!(table.pick(0.1), AnalysisMode::Cbc5Diff);
    assert_eq!(table.pick(0.8999), AnalysisMode::Cbc5Diff);
    assert_eq!(table.pick(0.9001), AnalysisMode::Ret);
    assert_eq!(table.pick(0.99999), AnalysisMode::Ret);
}

#[test]
fn waste_per_analysis_covers_sample_and_reagents() {
    let consumption = LabConfig::default().consumption;
    assert!((consumption.waste_for(AnalysisMode::Cbc) - 2.02).abs() < 1e-12);
    assert!((consumption.waste_for(AnalysisMode::Ret) - 2.02).abs() < 1e-12);
    assert!((consumption.waste_for(AnalysisMode::Cbc5Diff) - 7.52).abs() < 1e-12);
    assert!((consumption.waste_for(AnalysisMode::Cbc5DiffRrbc) - 7.52).abs() < 1e-12);
}
