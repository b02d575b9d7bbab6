//! The lab run: one analyzer with its autoloader, reagents, waste and actors.
//!
//! WIRING (fixed at construction, never changed during a run):
//!   1. Analyzer resource, reagent and waste stores, autoloader queue.
//!   2. Dispatcher process.
//!   3. Maintenance process.
//!   4. Arrival generator      (if enabled)
//!   5. Level monitor          (if enabled)
//!
//! RULES:
//!   - Actors interact only through the resource, stores, queue and states
//!     held by `LabModel`. No actor calls into another.
//!   - All randomness flows through the RngBank.
//!   - Counters are scoped to the run (`LabTally`).

use crate::{
    arrival_process::ArrivalProcess,
    config::LabConfig,
    depletable::DepletableResource,
    dispatcher_process::DispatcherProcess,
    engine::{Kernel, RunResult, SimEngine},
    error::SimResult,
    event::{AnalysisMode, AnalyzerStatus, LabEvent, OutcomeRecord, SampleOutcome},
    level_monitor_process::LevelMonitorProcess,
    maintenance_process::MaintenanceProcess,
    queue::PriorityQueue,
    resource::Resource,
    rng::{RandomSource, RngBank, StreamSlot},
    sample_process::SampleProcess,
    state::ObservableState,
    stats::{CategoryTime, MetricSummary, RunningStats, SharedSink},
    types::{ProcessId, ResourceId, RunId, SampleId, SimTime, StoreId},
};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// An autoloader slot: which process to activate when the sample is
/// dispatched.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedSample {
    pub process:   ProcessId,
    pub sample_id: SampleId,
    pub mode:      AnalysisMode,
}

/// Run-scoped counters and metric accumulators.
#[derive(Debug, Clone, Default)]
pub struct LabTally {
    pub arrivals:             u64,
    pub rejected:             u64,
    pub completed:            u64,
    pub rerun_interrupted:    u64,
    pub failed:               u64,
    pub maintenance_sessions: u64,
    pub reagent_sessions:     u64,
    pub waste_sessions:       u64,
    pub metrics:              BTreeMap<String, RunningStats>,
    next_sample:              u64,
}

impl LabTally {
    pub fn count(&self, outcome: SampleOutcome) -> u64 {
        match outcome {
            SampleOutcome::Completed        => self.completed,
            SampleOutcome::ReRunInterrupted => self.rerun_interrupted,
            SampleOutcome::Failed           => self.failed,
        }
    }
}

/// Everything the lab's processes share.
pub struct LabModel {
    pub run_id:        RunId,
    pub config:        LabConfig,
    pub analyzer:      ResourceId,
    pub diluent:       StoreId,
    pub lyse:          StoreId,
    pub sheath:        StoreId,
    pub detergent:     StoreId,
    pub waste:         StoreId,
    pub autoloader:    PriorityQueue<QueuedSample>,
    pub status:        ObservableState<AnalyzerStatus>,
    /// Fed by the status observer.
    pub status_time:   Rc<RefCell<CategoryTime<AnalyzerStatus>>>,
    pub needs_reagent: ObservableState<bool>,
    pub needs_waste:   ObservableState<bool>,
    pub dispatcher:    ProcessId,
    pub maintenance:   ProcessId,
    pub analysis_rng:  Box<dyn RandomSource>,
    pub rerun_rng:     Box<dyn RandomSource>,
    pub tally:         LabTally,
    sink:              SharedSink,
}

impl LabModel {
    /// Reagents in refill order.
    pub fn reagents(&self) -> [StoreId; 4] {
        [self.diluent, self.lyse, self.sheath, self.detergent]
    }

    /// Reagent draws for one analysis in `mode`.
    pub fn draws_for(&self, mode: AnalysisMode) -> Vec<(StoreId, f64)> {
        let c = &self.config.consumption;
        let mut draws = vec![(self.diluent, c.diluent_per_sample)];
        if mode.is_differential() {
            draws.push((self.lyse, c.lyse_per_diff_sample));
            draws.push((self.sheath, c.sheath_per_diff_sample));
        }
        draws
    }

    pub fn next_sample_id(&mut self) -> SampleId {
        self.tally.next_sample += 1;
        format!("sample-{:05}", self.tally.next_sample)
    }

    pub fn set_status(&mut self, now: SimTime, status: AnalyzerStatus) {
        self.status.set(now, status);
    }

    pub fn record(&mut self, metric: &str, value: f64) {
        self.sink.borrow_mut().record(metric, value);
        self.tally.metrics.entry(metric.to_string()).or_default().push(value);
    }

    pub fn record_outcome(&mut self, outcome: &OutcomeRecord) {
        match outcome.outcome {
            SampleOutcome::Completed        => self.tally.completed += 1,
            SampleOutcome::ReRunInterrupted => self.tally.rerun_interrupted += 1,
            SampleOutcome::Failed           => self.tally.failed += 1,
        }
        self.sink.borrow_mut().record_outcome(outcome);
    }

    pub fn emit(&self, event: LabEvent) {
        self.sink.borrow_mut().record_event(&event);
    }

    pub fn emit_queue_length(&self, now: SimTime) {
        self.emit(LabEvent::QueueLength { time: now, length: self.autoloader.len() });
    }

    /// Count and announce a new sample.
    pub fn announce_arrival(&mut self, now: SimTime, sample_id: &str, mode: AnalysisMode) {
        self.tally.arrivals += 1;
        self.emit(LabEvent::SampleArrived { time: now, sample_id: sample_id.to_string(), mode });
    }

    pub fn reject_arrival(&mut self, now: SimTime, sample_id: &str, mode: AnalysisMode) {
        self.tally.rejected += 1;
        log::warn!("t={now:.1} lab: autoloader full, {sample_id} rejected");
        self.emit(LabEvent::SampleRejected { time: now, sample_id: sample_id.to_string(), mode });
    }
}

/// End-of-run figures for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeSummary {
    pub run_id:               RunId,
    pub seed:                 u64,
    pub end_time:             SimTime,
    pub arrivals:             u64,
    pub rejected:             u64,
    pub completed:            u64,
    pub rerun_interrupted:    u64,
    pub failed:               u64,
    pub maintenance_sessions: u64,
    pub reagent_sessions:     u64,
    pub waste_sessions:       u64,
    pub queue_length:         usize,
    pub mean_queue_length:    f64,
    pub analyzer_utilization: f64,
    /// Seconds spent in each analyzer status; sums to `end_time`.
    pub status_durations:     BTreeMap<AnalyzerStatus, f64>,
    pub metrics:              BTreeMap<String, MetricSummary>,
    pub final_levels:         BTreeMap<String, f64>,
}

pub struct LabSimulation {
    engine: SimEngine<LabModel>,
    seed:   u64,
}

impl LabSimulation {
    /// Validate `config` and wire a run. Nothing is scheduled if the
    /// configuration is rejected.
    pub fn new(run_id: impl Into<RunId>, config: LabConfig, seed: u64, sink: SharedSink) -> SimResult<Self> {
        config.validate()?;
        let run_id = run_id.into();
        let bank = RngBank::new(seed);

        let engine: SimEngine<LabModel> = SimEngine::assemble(|kernel: &mut Kernel<LabModel>| {
            let caps = &config.capacities;
            let levels = &config.initial_levels;

            let analyzer = kernel.add_resource(Resource::new("analyzer", caps.analyzer)?);
            let mut add_store = |name: &str, capacity: f64, initial: f64| -> SimResult<StoreId> {
                let mut store = DepletableResource::new(name, capacity, initial)?;
                let sink = Rc::clone(&sink);
                store.subscribe(Box::new(move |time: SimTime, store: &str, level: f64| {
                    sink.borrow_mut().record_event(&LabEvent::LevelChanged {
                        time,
                        store: store.to_string(),
                        level,
                    });
                }));
                Ok(kernel.add_store(store))
            };
            let diluent = add_store("diluent", caps.diluent, levels.diluent.unwrap_or(caps.diluent))?;
            let lyse = add_store("lyse", caps.lyse, levels.lyse.unwrap_or(caps.lyse))?;
            let sheath = add_store("sheath", caps.sheath, levels.sheath.unwrap_or(caps.sheath))?;
            let detergent = add_store("detergent", caps.detergent, levels.detergent.unwrap_or(caps.detergent))?;
            let waste = add_store("waste", caps.waste, levels.waste.unwrap_or(0.0))?;

            let mut status = ObservableState::new("analyzer_status", AnalyzerStatus::Idle);
            let status_sink = Rc::clone(&sink);
            let status_time = Rc::new(RefCell::new(CategoryTime::new(0.0, AnalyzerStatus::Idle)));
            let timeline = Rc::clone(&status_time);
            status.subscribe(Box::new(move |time: SimTime, status: &AnalyzerStatus| {
                log::debug!("t={time:.1} lab: analyzer status -> {status:?}");
                timeline.borrow_mut().set(time, *status);
                status_sink.borrow_mut().record_event(&LabEvent::StatusChanged { time, status: *status });
            }));

            let dispatcher = kernel.spawn(Box::new(DispatcherProcess::new()))?;
            let maintenance = kernel.spawn(Box::new(MaintenanceProcess::new()))?;
            if config.actors.arrivals {
                kernel.spawn(Box::new(ArrivalProcess::new(
                    Box::new(bank.stream(StreamSlot::Arrivals)),
                    Box::new(bank.stream(StreamSlot::ModeSelection)),
                )))?;
            }
            if config.actors.level_monitor {
                kernel.spawn(Box::new(LevelMonitorProcess::new()))?;
            }

            Ok(LabModel {
                run_id: run_id.clone(),
                config: config.clone(),
                analyzer,
                diluent,
                lyse,
                sheath,
                detergent,
                waste,
                autoloader: PriorityQueue::new("autoloader", caps.autoloader),
                status,
                status_time,
                needs_reagent: ObservableState::new("needs_reagent", false),
                needs_waste: ObservableState::new("needs_waste", false),
                dispatcher,
                maintenance,
                analysis_rng: Box::new(bank.stream(StreamSlot::Analysis)),
                rerun_rng: Box::new(bank.stream(StreamSlot::ReRun)),
                tally: LabTally::default(),
                sink: Rc::clone(&sink),
            })
        })?;

        engine.model().emit(LabEvent::RunInitialized { run_id: run_id.clone(), seed });
        log::info!("lab: run {run_id} initialised with seed {seed}");
        Ok(Self { engine, seed })
    }

    pub fn now(&self) -> SimTime {
        self.engine.now()
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn model(&self) -> &LabModel {
        self.engine.model()
    }

    pub fn engine(&self) -> &SimEngine<LabModel> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut SimEngine<LabModel> {
        &mut self.engine
    }

    pub fn run_until(&mut self, until: SimTime) -> SimResult<RunResult> {
        let result = self.engine.run_until(until)?;
        log::info!("t={:.1} lab: run paused ({result:?})", self.now());
        Ok(result)
    }

    pub fn run_for(&mut self, duration: SimTime) -> SimResult<RunResult> {
        let until = self.now() + duration;
        self.run_until(until)
    }

    /// Hand a sample to the autoloader at the current time.
    pub fn submit_sample(&mut self, mode: AnalysisMode) -> SimResult<(SampleId, ProcessId)> {
        let now = self.now();
        self.submit_sample_at(mode, now)
    }

    pub fn submit_sample_at(&mut self, mode: AnalysisMode, at: SimTime) -> SimResult<(SampleId, ProcessId)> {
        let model = self.engine.model_mut();
        let sample_id = model.next_sample_id();
        model.announce_arrival(at, &sample_id, mode);
        let process = self.engine.spawn_at(Box::new(SampleProcess::new(sample_id.clone(), mode)), at)?;
        Ok((sample_id, process))
    }

    /// Raise maintenance flags and wake the technician.
    pub fn signal_maintenance(&mut self, reagent: bool, waste: bool) -> SimResult<bool> {
        let (kernel, model) = self.engine.parts_mut();
        let now = kernel.now();
        if reagent {
            model.needs_reagent.set(now, true);
        }
        if waste {
            model.needs_waste.set(now, true);
        }
        kernel.wake(model.maintenance)
    }

    pub fn outcome_summary(&self) -> SimResult<OutcomeSummary> {
        let kernel = self.engine.kernel();
        let model = self.engine.model();
        let now = self.now();
        let tally = &model.tally;

        let mut final_levels = BTreeMap::new();
        for id in model.reagents().into_iter().chain([model.waste]) {
            let store = kernel.store(id)?;
            final_levels.insert(store.name().to_string(), store.level());
        }

        Ok(OutcomeSummary {
            run_id: model.run_id.clone(),
            seed: self.seed,
            end_time: now,
            arrivals: tally.arrivals,
            rejected: tally.rejected,
            completed: tally.completed,
            rerun_interrupted: tally.rerun_interrupted,
            failed: tally.failed,
            maintenance_sessions: tally.maintenance_sessions,
            reagent_sessions: tally.reagent_sessions,
            waste_sessions: tally.waste_sessions,
            queue_length: model.autoloader.len(),
            mean_queue_length: model.autoloader.mean_length(now),
            analyzer_utilization: kernel.resource(model.analyzer)?.utilization(now),
            status_durations: model.status_time.borrow().durations(now),
            metrics: tally
                .metrics
                .iter()
                .filter_map(|(name, stats)| stats.summary().map(|s| (name.clone(), s)))
                .collect(),
            final_levels,
        })
    }
}
