//! Statistics sink and summary accumulators.
//!
//! RULE: The simulation only writes to a sink. It never reads one back.
//! Figures the run driver needs for its own summary are kept in
//! run-scoped accumulators owned by the model (see `LabTally`).

use crate::{
    event::{LabEvent, OutcomeRecord},
    types::SimTime,
};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

pub const METRIC_TURNAROUND: &str             = "turnaround_time";
pub const METRIC_TURNAROUND_INTERRUPTED: &str = "turnaround_time_interrupted";
pub const METRIC_TURNAROUND_FAILED: &str      = "turnaround_time_failed";
pub const METRIC_WAIT: &str                   = "wait_time";
pub const METRIC_PROCESS: &str                = "process_time";
pub const METRIC_MAINTENANCE: &str            = "maintenance_time";
pub const METRIC_QUEUE_LENGTH: &str           = "queue_length";

/// Write-only collector for a run's numbers.
pub trait StatsSink {
    /// Append one scalar sample to `metric`.
    fn record(&mut self, metric: &str, value: f64);

    /// Append the terminal record of one sample.
    fn record_outcome(&mut self, outcome: &OutcomeRecord);

    /// Telemetry side channel. Ignored unless the sink cares.
    fn record_event(&mut self, _event: &LabEvent) {}
}

/// The sink shape handed to a simulation. Observers registered on states
/// and stores hold clones of it, so it is shared rather than borrowed.
pub type SharedSink = Rc<RefCell<dyn StatsSink>>;

/// In-memory sink keeping everything in arrival order.
#[derive(Debug, Clone, Default)]
pub struct RunRecorder {
    metrics:  BTreeMap<String, Vec<f64>>,
    outcomes: Vec<OutcomeRecord>,
    events:   Vec<LabEvent>,
}

impl RunRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A recorder wrapped for handing to a simulation.
    pub fn shared() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn values(&self, metric: &str) -> &[f64] {
        self.metrics.get(metric).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn metrics(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.metrics.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn outcomes(&self) -> &[OutcomeRecord] {
        &self.outcomes
    }

    pub fn events(&self) -> &[LabEvent] {
        &self.events
    }
}

impl StatsSink for RunRecorder {
    fn record(&mut self, metric: &str, value: f64) {
        self.metrics.entry(metric.to_string()).or_default().push(value);
    }

    fn record_outcome(&mut self, outcome: &OutcomeRecord) {
        self.outcomes.push(outcome.clone());
    }

    fn record_event(&mut self, event: &LabEvent) {
        self.events.push(event.clone());
    }
}

/// Count / mean / spread of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub count:   u64,
    pub mean:    f64,
    pub std_dev: f64,
    pub min:     f64,
    pub max:     f64,
}

/// Streaming mean and variance (Welford).
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningStats {
    count: u64,
    mean:  f64,
    m2:    f64,
    min:   f64,
    max:   f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn summary(&self) -> Option<MetricSummary> {
        if self.count == 0 {
            return None;
        }
        let variance = if self.count > 1 { self.m2 / (self.count - 1) as f64 } else { 0.0 };
        Some(MetricSummary {
            count:   self.count,
            mean:    self.mean,
            std_dev: variance.sqrt(),
            min:     self.min,
            max:     self.max,
        })
    }
}

/// Time-weighted average of a piecewise-constant signal.
#[derive(Debug, Clone, Copy)]
pub struct TimeAverage {
    start:      SimTime,
    last_time:  SimTime,
    last_value: f64,
    area:       f64,
}

impl TimeAverage {
    pub fn new(start: SimTime, value: f64) -> Self {
        Self { start, last_time: start, last_value: value, area: 0.0 }
    }

    pub fn update(&mut self, now: SimTime, value: f64) {
        self.area += self.last_value * (now - self.last_time);
        self.last_time = now;
        self.last_value = value;
    }

    pub fn mean(&self, now: SimTime) -> f64 {
        let span = now - self.start;
        if span <= 0.0 {
            return self.last_value;
        }
        (self.area + self.last_value * (now - self.last_time)) / span
    }
}

/// Time spent in each value of a categorical signal, such as the
/// analyzer status.
#[derive(Debug, Clone)]
pub struct CategoryTime<K> {
    current: K,
    since:   SimTime,
    totals:  BTreeMap<K, f64>,
}

impl<K: Ord + Copy> CategoryTime<K> {
    pub fn new(start: SimTime, initial: K) -> Self {
        Self { current: initial, since: start, totals: BTreeMap::new() }
    }

    pub fn set(&mut self, now: SimTime, value: K) {
        *self.totals.entry(self.current).or_insert(0.0) += now - self.since;
        self.current = value;
        self.since = now;
    }

    /// Totals up to `now`, the open interval of the current value included.
    pub fn durations(&self, now: SimTime) -> BTreeMap<K, f64> {
        let mut totals = self.totals.clone();
        *totals.entry(self.current).or_insert(0.0) += now - self.since;
        totals
    }
}
