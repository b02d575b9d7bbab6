//! The maintenance technician.
//!
//! RULES:
//!   - Sleeps (passive) until a sample or the level monitor raises a flag.
//!   - Seizes the analyzer at Critical priority. It jumps the wait list but
//!     never interrupts the sample being analyzed.
//!   - Clears exactly the flags that were set when it got the analyzer.
//!     Flags raised during a session are picked up right after it.

use crate::{
    depletable::AdmissionPolicy,
    engine::ProcessContext,
    error::SimResult,
    event::{AnalyzerStatus, LabEvent, MaintenanceKind},
    lab::LabModel,
    process::{Process, Step},
    stats::METRIC_MAINTENANCE,
    types::{Priority, SimTime},
};

/// Below this a shortfall or a waste level is not worth a trip.
const NEGLIGIBLE_ML: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MaintenanceStage {
    Waiting,
    AwaitAnalyzer,
    Preparing,
    /// `next` indexes `LabModel::reagents`; `awaiting` is set while a put
    /// is outstanding.
    Refilling { next: usize, awaiting: bool },
    Replacing,
    Emptying,
    Disposing,
    Finishing,
}

pub struct MaintenanceProcess {
    stage:       MaintenanceStage,
    kind:        Option<MaintenanceKind>,
    started:     SimTime,
    refill_time: SimTime,
}

impl MaintenanceProcess {
    pub fn new() -> Self {
        Self {
            stage: MaintenanceStage::Waiting,
            kind: None,
            started: 0.0,
            refill_time: 0.0,
        }
    }

    fn does_reagent(&self) -> bool {
        matches!(self.kind, Some(MaintenanceKind::Reagent | MaintenanceKind::Both))
    }

    fn does_waste(&self) -> bool {
        matches!(self.kind, Some(MaintenanceKind::Waste | MaintenanceKind::Both))
    }

    fn check_flags(&mut self, cx: &mut ProcessContext<'_, LabModel>) -> Step {
        let reagent = *cx.model.needs_reagent.get();
        let waste = *cx.model.needs_waste.get();
        self.stage = MaintenanceStage::Waiting;
        if !reagent && !waste {
            log::trace!("t={:.1} maintenance: nothing to do", cx.now());
            return Step::Passivate;
        }
        log::info!(
            "t={:.1} maintenance: requested (reagent={reagent}, waste={waste})",
            cx.now()
        );
        self.stage = MaintenanceStage::AwaitAnalyzer;
        Step::request_with(cx.model.analyzer, 1.0, Priority::Critical)
    }

    fn refill(&mut self, cx: &mut ProcessContext<'_, LabModel>, next: usize, awaiting: bool) -> SimResult<Step> {
        if awaiting {
            if cx.failed() {
                log::warn!("t={:.1} maintenance: refill could not be applied", cx.now());
            } else {
                self.refill_time += cx.model.config.maintenance.reagent_replace_time;
            }
        }
        let reagents = cx.model.reagents();
        for (i, id) in reagents.iter().enumerate().skip(next) {
            let store = cx.store(*id)?;
            let shortfall = store.shortfall();
            if shortfall > NEGLIGIBLE_ML {
                log::debug!("t={:.1} maintenance: refilling {} (+{shortfall:.2} ml)", cx.now(), store.name());
                self.stage = MaintenanceStage::Refilling { next: i + 1, awaiting: true };
                return Ok(Step::put(*id, shortfall, AdmissionPolicy::Schedule));
            }
        }
        self.stage = MaintenanceStage::Replacing;
        if self.refill_time > 0.0 {
            return Ok(Step::hold(self.refill_time));
        }
        self.reagents_done(cx)
    }

    fn reagents_done(&mut self, cx: &mut ProcessContext<'_, LabModel>) -> SimResult<Step> {
        let now = cx.now();
        cx.model.needs_reagent.set(now, false);
        self.empty_waste(cx)
    }

    fn empty_waste(&mut self, cx: &mut ProcessContext<'_, LabModel>) -> SimResult<Step> {
        if !self.does_waste() {
            return Ok(self.finish_hold(cx));
        }
        cx.model.tally.waste_sessions += 1;
        let waste = cx.model.waste;
        let level = cx.store(waste)?.level();
        if level > NEGLIGIBLE_ML {
            self.stage = MaintenanceStage::Emptying;
            return Ok(Step::take(waste, level, AdmissionPolicy::Schedule));
        }
        self.waste_done(cx)
    }

    fn waste_done(&mut self, cx: &mut ProcessContext<'_, LabModel>) -> SimResult<Step> {
        let now = cx.now();
        cx.model.needs_waste.set(now, false);
        Ok(self.finish_hold(cx))
    }

    fn finish_hold(&mut self, cx: &mut ProcessContext<'_, LabModel>) -> Step {
        self.stage = MaintenanceStage::Finishing;
        Step::hold(cx.model.config.maintenance.finish_time)
    }

    fn complete(&mut self, cx: &mut ProcessContext<'_, LabModel>) -> SimResult<Step> {
        let now = cx.now();
        let duration = now - self.started;
        cx.model.record(METRIC_MAINTENANCE, duration);
        if let Some(kind) = self.kind.take() {
            cx.model.emit(LabEvent::MaintenanceCompleted { start: self.started, end: now, kind });
            log::info!("t={now:.1} maintenance: {kind:?} session done in {duration:.0}s");
        }
        cx.model.set_status(now, AnalyzerStatus::Idle);
        let analyzer = cx.model.analyzer;
        let dispatcher = cx.model.dispatcher;
        cx.release(analyzer, 1.0)?;
        cx.wake(dispatcher)?;
        Ok(self.check_flags(cx))
    }
}

impl Default for MaintenanceProcess {
    fn default() -> Self {
        Self::new()
    }
}

impl Process<LabModel> for MaintenanceProcess {
    fn name(&self) -> &str {
        "maintenance"
    }

    fn resume(&mut self, cx: &mut ProcessContext<'_, LabModel>) -> SimResult<Step> {
        match self.stage {
            MaintenanceStage::Waiting => Ok(self.check_flags(cx)),
            MaintenanceStage::AwaitAnalyzer => {
                let now = cx.now();
                if cx.failed() {
                    log::warn!("t={now:.1} maintenance: could not acquire analyzer, skipping");
                    self.stage = MaintenanceStage::Waiting;
                    return Ok(Step::Passivate);
                }
                let reagent = *cx.model.needs_reagent.get();
                let waste = *cx.model.needs_waste.get();
                let Some(kind) = MaintenanceKind::from_flags(reagent, waste) else {
                    let analyzer = cx.model.analyzer;
                    cx.release(analyzer, 1.0)?;
                    return Ok(self.check_flags(cx));
                };
                cx.model.tally.maintenance_sessions += 1;
                self.kind = Some(kind);
                self.started = now;
                self.refill_time = 0.0;
                cx.model.set_status(now, kind.status());
                self.stage = MaintenanceStage::Preparing;
                Ok(Step::hold(cx.model.config.maintenance.prep_time))
            }
            MaintenanceStage::Preparing => {
                if self.does_reagent() {
                    cx.model.tally.reagent_sessions += 1;
                    return self.refill(cx, 0, false);
                }
                self.empty_waste(cx)
            }
            MaintenanceStage::Refilling { next, awaiting } => self.refill(cx, next, awaiting),
            MaintenanceStage::Replacing => self.reagents_done(cx),
            MaintenanceStage::Emptying => {
                if cx.failed() {
                    log::warn!("t={:.1} maintenance: waste could not be emptied", cx.now());
                    return self.waste_done(cx);
                }
                self.stage = MaintenanceStage::Disposing;
                Ok(Step::hold(cx.model.config.maintenance.waste_disposal_time))
            }
            MaintenanceStage::Disposing => self.waste_done(cx),
            MaintenanceStage::Finishing => self.complete(cx),
        }
    }
}
