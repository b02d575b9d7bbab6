use crate::{
    error::{SimError, SimResult},
    event::AnalysisMode,
    rng::Distribution,
    types::SimTime,
};
use serde::{Deserialize, Serialize};

// ── Timing ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub analysis: Distribution,
    pub inter_arrival: Distribution,
    pub ret_incubation: SimTime,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            analysis: Distribution::Normal { mean: 60.0, std_dev: 5.0 },
            inter_arrival: Distribution::Normal { mean: 120.0, std_dev: 10.0 },
            ret_incubation: 900.0,
        }
    }
}

// ── Capacities ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityConfig {
    pub autoloader: usize,
    pub analyzer: f64,
    pub diluent: f64,
    pub lyse: f64,
    pub sheath: f64,
    pub detergent: f64,
    pub waste: f64,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            autoloader: 50,
            analyzer: 1.0,
            diluent: 5000.0,
            lyse: 1000.0,
            sheath: 10_000.0,
            detergent: 1000.0,
            waste: 20_000.0,
        }
    }
}

/// Starting levels. `None` means full for reagents and empty for waste.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialLevels {
    pub diluent: Option<f64>,
    pub lyse: Option<f64>,
    pub sheath: Option<f64>,
    pub detergent: Option<f64>,
    pub waste: Option<f64>,
}

// ── Consumption per sample (ml) ────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumptionConfig {
    pub sample_volume: f64,
    pub diluent_per_sample: f64,
    pub lyse_per_diff_sample: f64,
    pub sheath_per_diff_sample: f64,
}

impl Default for ConsumptionConfig {
    fn default() -> Self {
        Self {
            sample_volume: 0.02,
            diluent_per_sample: 2.0,
            lyse_per_diff_sample: 0.5,
            sheath_per_diff_sample: 5.0,
        }
    }
}

impl ConsumptionConfig {
    /// Waste produced by one analysis in `mode`: the sample plus every
    /// reagent drawn for it.
    pub fn waste_for(&self, mode: AnalysisMode) -> f64 {
        let base = self.sample_volume + self.diluent_per_sample;
        if mode.is_differential() {
            base + self.lyse_per_diff_sample + self.sheath_per_diff_sample
        } else {
            base
        }
    }
}

// ── Thresholds ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// A reagent below this fill percentage needs replacing.
    pub reagent_low_pct: f64,
    /// A waste container above this fill percentage needs emptying.
    pub waste_high_pct: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self { reagent_low_pct: 10.0, waste_high_pct: 90.0 }
    }
}

// ── Mode table ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeWeight {
    pub mode: AnalysisMode,
    pub probability: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModeTable {
    pub weights: Vec<ModeWeight>,
}

impl Default for ModeTable {
    fn default() -> Self {
        Self {
            weights: vec![
                ModeWeight { mode: AnalysisMode::Cbc, probability: 0.1 },
                ModeWeight { mode: AnalysisMode::Cbc5Diff, probability: 0.8 },
                ModeWeight { mode: AnalysisMode::Ret, probability: 0.1 },
            ],
        }
    }
}

impl ModeTable {
    pub fn total(&self) -> f64 {
        self.weights.iter().map(|w| w.probability).sum()
    }

    /// Map a uniform draw in [0, 1) onto the table.
    pub fn pick(&self, u: f64) -> AnalysisMode {
        let mut cumulative = 0.0;
        for w in &self.weights {
            cumulative += w.probability;
            if u < cumulative {
                return w.mode;
            }
        }
        self.weights.last().map_or(AnalysisMode::Cbc, |w| w.mode)
    }
}

// ── Maintenance ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub prep_time: SimTime,
    /// Per reagent actually refilled.
    pub reagent_replace_time: SimTime,
    pub waste_disposal_time: SimTime,
    pub finish_time: SimTime,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            prep_time: 300.0,
            reagent_replace_time: 120.0,
            waste_disposal_time: 300.0,
            finish_time: 120.0,
        }
    }
}

// ── Background actors ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorConfig {
    /// Spawn the stochastic sample generator.
    pub arrivals: bool,
    /// Spawn the periodic reagent/waste level monitor.
    pub level_monitor: bool,
    pub monitor_interval: SimTime,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self { arrivals: true, level_monitor: true, monitor_interval: 600.0 }
    }
}

// ── Top level ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LabConfig {
    pub timing: TimingConfig,
    pub capacities: CapacityConfig,
    pub initial_levels: InitialLevels,
    pub consumption: ConsumptionConfig,
    pub thresholds: ThresholdConfig,
    pub modes: ModeTable,
    pub rerun_probability: f64,
    pub maintenance: MaintenanceConfig,
    pub actors: ActorConfig,
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            timing: TimingConfig::default(),
            capacities: CapacityConfig::default(),
            initial_levels: InitialLevels::default(),
            consumption: ConsumptionConfig::default(),
            thresholds: ThresholdConfig::default(),
            modes: ModeTable::default(),
            rerun_probability: 0.02,
            maintenance: MaintenanceConfig::default(),
            actors: ActorConfig::default(),
        }
    }
}

impl LabConfig {
    /// Load a JSON config file. Missing fields take their reference values.
    /// In tests, use LabConfig::default_test().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: LabConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Deterministic config for unit tests: no background actors, constant
    /// analysis time, no re-run trigger.
    pub fn default_test() -> Self {
        Self {
            timing: TimingConfig {
                analysis: Distribution::Constant { value: 60.0 },
                inter_arrival: Distribution::Constant { value: 120.0 },
                ret_incubation: 900.0,
            },
            rerun_probability: 0.0,
            actors: ActorConfig { arrivals: false, level_monitor: false, monitor_interval: 600.0 },
            ..Self::default()
        }
    }

    pub fn validate(&self) -> SimResult<()> {
        let total = self.modes.total();
        if self.modes.weights.is_empty() || !(total > 0.999 && total < 1.001) {
            return invalid(format!("mode probabilities must sum to 1.0, got {total}"));
        }
        if let Some(w) = self.modes.weights.iter().find(|w| !(0.0..=1.0).contains(&w.probability)) {
            return invalid(format!("mode {} has probability {}", w.mode.as_str(), w.probability));
        }
        if !(0.0..=1.0).contains(&self.rerun_probability) {
            return invalid(format!("rerun_probability {} outside [0, 1]", self.rerun_probability));
        }

        let caps = &self.capacities;
        if caps.autoloader == 0 {
            return invalid("autoloader capacity must be positive".into());
        }
        let levels = &self.initial_levels;
        for (name, capacity, initial) in [
            ("analyzer", caps.analyzer, None),
            ("diluent", caps.diluent, levels.diluent),
            ("lyse", caps.lyse, levels.lyse),
            ("sheath", caps.sheath, levels.sheath),
            ("detergent", caps.detergent, levels.detergent),
            ("waste", caps.waste, levels.waste),
        ] {
            if !capacity.is_finite() || capacity <= 0.0 {
                return invalid(format!("{name} capacity must be positive, got {capacity}"));
            }
            if let Some(level) = initial {
                if !level.is_finite() || level < 0.0 || level > capacity {
                    return invalid(format!("{name} initial level {level} outside [0, {capacity}]"));
                }
            }
        }

        let c = &self.consumption;
        for (name, volume) in [
            ("sample_volume", c.sample_volume),
            ("diluent_per_sample", c.diluent_per_sample),
            ("lyse_per_diff_sample", c.lyse_per_diff_sample),
            ("sheath_per_diff_sample", c.sheath_per_diff_sample),
        ] {
            if !volume.is_finite() || volume < 0.0 {
                return invalid(format!("{name} must be non-negative, got {volume}"));
            }
        }

        for (name, pct) in [
            ("reagent_low_pct", self.thresholds.reagent_low_pct),
            ("waste_high_pct", self.thresholds.waste_high_pct),
        ] {
            if !(0.0..=100.0).contains(&pct) {
                return invalid(format!("{name} {pct} outside [0, 100]"));
            }
        }

        let m = &self.maintenance;
        for (name, duration) in [
            ("ret_incubation", self.timing.ret_incubation),
            ("prep_time", m.prep_time),
            ("reagent_replace_time", m.reagent_replace_time),
            ("waste_disposal_time", m.waste_disposal_time),
            ("finish_time", m.finish_time),
        ] {
            if !duration.is_finite() || duration < 0.0 {
                return invalid(format!("{name} must be a non-negative duration, got {duration}"));
            }
        }
        if self.actors.level_monitor && !(self.actors.monitor_interval > 0.0) {
            return invalid(format!(
                "monitor_interval must be positive, got {}",
                self.actors.monitor_interval
            ));
        }

        for (name, dist) in [("analysis", &self.timing.analysis), ("inter_arrival", &self.timing.inter_arrival)] {
            if let Some(problem) = dist.problem() {
                return invalid(format!("{name}: {problem}"));
            }
        }

        // A generator that can only draw zero gaps never lets time advance.
        let gap = self.timing.inter_arrival;
        let ceiling = match gap {
            Distribution::Constant { value } => value,
            Distribution::Uniform { high, .. } => high,
            Distribution::Normal { .. } | Distribution::Exponential { .. } => f64::INFINITY,
        };
        if gap.mean() <= 0.0 || ceiling <= 0.0 {
            return invalid(format!("inter_arrival {gap:?} never produces a positive gap"));
        }
        Ok(())
    }
}

fn invalid(message: String) -> SimResult<()> {
    Err(SimError::InvalidConfig(message))
}
