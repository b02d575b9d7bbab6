//! Lab telemetry and outcome records.
//!
//! RULE: Actors never read telemetry back. Everything here flows one way,
//! from the simulation into a `StatsSink`.

use crate::types::{RunId, SampleId, SimTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    Cbc,
    Cbc5Diff,
    /// Re-run of a differential sample after a flagged result.
    Cbc5DiffRrbc,
    Ret,
}

impl AnalysisMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cbc          => "cbc",
            Self::Cbc5Diff     => "cbc_5diff",
            Self::Cbc5DiffRrbc => "cbc_5diff_rrbc",
            Self::Ret          => "ret",
        }
    }

    /// Differential modes draw lyse and sheath on top of diluent.
    pub fn is_differential(&self) -> bool {
        matches!(self, Self::Cbc5Diff | Self::Cbc5DiffRrbc)
    }

    /// RET samples incubate off-analyzer before their first run.
    pub fn needs_incubation(&self) -> bool {
        matches!(self, Self::Ret)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerStatus {
    Idle,
    Analyzing,
    Maintenance,
    MaintenanceReagent,
    MaintenanceWaste,
    ErrorReagent,
    ErrorWaste,
    ErrorReRun,
}

impl AnalyzerStatus {
    /// Statuses in which the dispatcher may hand out the next sample.
    pub fn accepts_work(&self) -> bool {
        matches!(self, Self::Idle | Self::ErrorReRun)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleOutcome {
    Completed,
    ReRunInterrupted,
    Failed,
}

impl SampleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed        => "completed",
            Self::ReRunInterrupted => "rerun_interrupted",
            Self::Failed           => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceKind {
    Reagent,
    Waste,
    Both,
}

impl MaintenanceKind {
    pub fn from_flags(reagent: bool, waste: bool) -> Option<Self> {
        match (reagent, waste) {
            (true, true)   => Some(Self::Both),
            (true, false)  => Some(Self::Reagent),
            (false, true)  => Some(Self::Waste),
            (false, false) => None,
        }
    }

    pub fn status(&self) -> AnalyzerStatus {
        match self {
            Self::Both    => AnalyzerStatus::Maintenance,
            Self::Reagent => AnalyzerStatus::MaintenanceReagent,
            Self::Waste   => AnalyzerStatus::MaintenanceWaste,
        }
    }
}

/// Terminal record of one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub sample_id:      SampleId,
    pub mode:           AnalysisMode,
    pub is_rerun:       bool,
    pub queue_time:     SimTime,
    /// None if the sample never obtained the analyzer.
    pub analysis_start: Option<SimTime>,
    /// Completion time, or the error time for failures.
    pub analysis_end:   SimTime,
    pub outcome:        SampleOutcome,
}

impl OutcomeRecord {
    pub fn turnaround(&self) -> SimTime {
        self.analysis_end - self.queue_time
    }
}

/// Every telemetry event emitted during a run.
/// Variants are only ever appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LabEvent {
    RunInitialized {
        run_id: RunId,
        seed:   u64,
    },
    SampleArrived {
        time:      SimTime,
        sample_id: SampleId,
        mode:      AnalysisMode,
    },
    SampleRejected {
        time:      SimTime,
        sample_id: SampleId,
        mode:      AnalysisMode,
    },
    StatusChanged {
        time:   SimTime,
        status: AnalyzerStatus,
    },
    LevelChanged {
        time:  SimTime,
        store: String,
        level: f64,
    },
    QueueLength {
        time:   SimTime,
        length: usize,
    },
    MaintenanceCompleted {
        start: SimTime,
        end:   SimTime,
        kind:  MaintenanceKind,
    },
}

impl LabEvent {
    pub fn event_type_name(&self) -> &'static str {
        match self {
            Self::RunInitialized { .. }       => "run_initialized",
            Self::SampleArrived { .. }        => "sample_arrived",
            Self::SampleRejected { .. }       => "sample_rejected",
            Self::StatusChanged { .. }        => "status_changed",
            Self::LevelChanged { .. }         => "level_changed",
            Self::QueueLength { .. }          => "queue_length",
            Self::MaintenanceCompleted { .. } => "maintenance_completed",
        }
    }

    /// Virtual time the event refers to. Run initialisation happens at 0.
    pub fn time(&self) -> SimTime {
        match self {
            Self::RunInitialized { .. } => 0.0,
            Self::SampleArrived { time, .. }
            | Self::SampleRejected { time, .. }
            | Self::StatusChanged { time, .. }
            | Self::LevelChanged { time, .. }
            | Self::QueueLength { time, .. } => *time,
            Self::MaintenanceCompleted { end, .. } => *end,
        }
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id:         Option<i64>,
    pub run_id:     RunId,
    pub time:       SimTime,
    pub event_type: String,
    pub payload:    String, // JSON-serialized LabEvent
}
