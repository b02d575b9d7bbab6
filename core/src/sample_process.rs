//! One blood sample, from autoloader to terminal outcome.
//!
//! STAGES:
//!   Arrive → AwaitDispatch → (Incubating) → AwaitAnalyzer → DrawReagents
//!   → Analyzing → DrainWaste → {Completed | ReRunInterrupted | Failed}
//!
//! RULES:
//!   - Every terminal transition records exactly one outcome.
//!   - The analyzer is released on every path that acquired it.
//!   - A re-run sample never triggers another re-run.

use crate::{
    depletable::AdmissionPolicy,
    engine::ProcessContext,
    error::SimResult,
    event::{AnalysisMode, AnalyzerStatus, OutcomeRecord, SampleOutcome},
    lab::{LabModel, QueuedSample},
    process::{Process, Step},
    queue::QueueFull,
    stats::{
        METRIC_PROCESS, METRIC_TURNAROUND, METRIC_TURNAROUND_FAILED,
        METRIC_TURNAROUND_INTERRUPTED, METRIC_WAIT,
    },
    types::{Priority, SampleId, SimTime, StoreId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SampleStage {
    Arrive,
    AwaitDispatch,
    Incubating,
    AwaitAnalyzer,
    DrawReagents,
    Analyzing,
    DrainWaste,
    Done,
}

pub struct SampleProcess {
    id:             SampleId,
    mode:           AnalysisMode,
    is_rerun:       bool,
    stage:          SampleStage,
    queue_time:     SimTime,
    analysis_start: Option<SimTime>,
    draws:          Vec<(StoreId, f64)>,
    drawn:          usize,
}

impl SampleProcess {
    /// A first-run sample. It queues itself when first resumed.
    pub fn new(id: SampleId, mode: AnalysisMode) -> Self {
        Self {
            id,
            mode,
            is_rerun: false,
            stage: SampleStage::Arrive,
            queue_time: 0.0,
            analysis_start: None,
            draws: Vec::new(),
            drawn: 0,
        }
    }

    /// A re-run queued by its parent at `queue_time`; it waits for dispatch.
    pub fn rerun(id: SampleId, queue_time: SimTime) -> Self {
        Self {
            is_rerun: true,
            stage: SampleStage::AwaitDispatch,
            queue_time,
            ..Self::new(id, AnalysisMode::Cbc5DiffRrbc)
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn arrive(&mut self, cx: &mut ProcessContext<'_, LabModel>) -> SimResult<Step> {
        let now = cx.now();
        self.queue_time = now;
        let slot = QueuedSample { process: cx.me(), sample_id: self.id.clone(), mode: self.mode };
        if let Err(QueueFull(_)) = cx.model.autoloader.push(now, slot, Priority::Normal) {
            log::warn!("t={now:.1} sample: {} found the autoloader full", self.id);
            return self.finish(cx, SampleOutcome::Failed, now);
        }
        log::debug!(
            "t={now:.1} sample: {} queued mode={} rerun={}",
            self.id,
            self.mode.as_str(),
            self.is_rerun
        );
        cx.model.emit_queue_length(now);
        let dispatcher = cx.model.dispatcher;
        cx.wake(dispatcher)?;
        self.stage = SampleStage::AwaitDispatch;
        Ok(Step::Passivate)
    }

    fn request_analyzer(&mut self, cx: &mut ProcessContext<'_, LabModel>) -> Step {
        self.stage = SampleStage::AwaitAnalyzer;
        Step::request(cx.model.analyzer)
    }

    /// Next reagent draw, or the analysis hold once every draw succeeded.
    fn next_draw(&mut self, cx: &mut ProcessContext<'_, LabModel>) -> Step {
        if let Some(&(store, quantity)) = self.draws.get(self.drawn) {
            return Step::take(store, quantity, AdmissionPolicy::Fail);
        }
        let model = &mut *cx.model;
        let duration = model.analysis_rng.sample(&model.config.timing.analysis).max(0.0);
        self.stage = SampleStage::Analyzing;
        Step::hold(duration)
    }

    fn reagent_failure(&mut self, cx: &mut ProcessContext<'_, LabModel>) -> SimResult<Step> {
        let now = cx.now();
        let reagent = match self.draws.get(self.drawn) {
            Some(&(store, _)) => cx.store(store)?.name().to_string(),
            None => "reagent".to_string(),
        };
        log::warn!("t={now:.1} sample: {} {reagent} depleted", self.id);
        cx.model.needs_reagent.set(now, true);
        let maintenance = cx.model.maintenance;
        cx.wake(maintenance)?;
        cx.model.set_status(now, AnalyzerStatus::ErrorReagent);
        let analyzer = cx.model.analyzer;
        cx.release(analyzer, 1.0)?;
        self.finish(cx, SampleOutcome::Failed, now)
    }

    fn waste_failure(&mut self, cx: &mut ProcessContext<'_, LabModel>) -> SimResult<Step> {
        let now = cx.now();
        log::warn!("t={now:.1} sample: {} waste container full", self.id);
        cx.model.needs_waste.set(now, true);
        let maintenance = cx.model.maintenance;
        cx.wake(maintenance)?;
        cx.model.set_status(now, AnalyzerStatus::ErrorWaste);
        let analyzer = cx.model.analyzer;
        cx.release(analyzer, 1.0)?;
        self.finish(cx, SampleOutcome::Failed, now)
    }

    fn analysis_done(&mut self, cx: &mut ProcessContext<'_, LabModel>) -> SimResult<Step> {
        let now = cx.now();
        let analyzer = cx.model.analyzer;
        let dispatcher = cx.model.dispatcher;

        let eligible = !self.is_rerun && self.mode == AnalysisMode::Cbc5Diff;
        let rerun = eligible && {
            let p = cx.model.config.rerun_probability;
            cx.model.rerun_rng.chance(p)
        };

        if !rerun {
            log::debug!("t={now:.1} sample: {} completed", self.id);
            cx.model.set_status(now, AnalyzerStatus::Idle);
            cx.release(analyzer, 1.0)?;
            cx.wake(dispatcher)?;
            return self.finish(cx, SampleOutcome::Completed, now);
        }

        let rerun_id = format!("{}-rerun", self.id);
        log::debug!("t={now:.1} sample: {} flagged, queueing {rerun_id}", self.id);
        if cx.model.autoloader.is_full() {
            cx.model.reject_arrival(now, &rerun_id, AnalysisMode::Cbc5DiffRrbc);
        } else {
            let process = cx.spawn_passive(Box::new(SampleProcess::rerun(rerun_id.clone(), now)));
            cx.model.announce_arrival(now, &rerun_id, AnalysisMode::Cbc5DiffRrbc);
            let slot = QueuedSample { process, sample_id: rerun_id, mode: AnalysisMode::Cbc5DiffRrbc };
            if cx.model.autoloader.push(now, slot, Priority::Important).is_err() {
                cx.cancel(process)?;
            }
            cx.model.emit_queue_length(now);
        }
        cx.model.set_status(now, AnalyzerStatus::ErrorReRun);
        cx.release(analyzer, 1.0)?;
        cx.wake(dispatcher)?;
        self.finish(cx, SampleOutcome::ReRunInterrupted, now)
    }

    /// Record the terminal outcome. `end` is the completion or error time.
    fn finish(
        &mut self,
        cx: &mut ProcessContext<'_, LabModel>,
        outcome: SampleOutcome,
        end: SimTime,
    ) -> SimResult<Step> {
        self.stage = SampleStage::Done;
        let record = OutcomeRecord {
            sample_id:      self.id.clone(),
            mode:           self.mode,
            is_rerun:       self.is_rerun,
            queue_time:     self.queue_time,
            analysis_start: self.analysis_start,
            analysis_end:   end,
            outcome,
        };
        let turnaround = record.turnaround();
        let model = &mut *cx.model;
        match outcome {
            SampleOutcome::Completed => {
                model.record(METRIC_TURNAROUND, turnaround);
                if let Some(start) = self.analysis_start {
                    model.record(METRIC_WAIT, start - self.queue_time);
                    model.record(METRIC_PROCESS, end - start);
                }
            }
            SampleOutcome::ReRunInterrupted => model.record(METRIC_TURNAROUND_INTERRUPTED, turnaround),
            SampleOutcome::Failed => model.record(METRIC_TURNAROUND_FAILED, turnaround),
        }
        model.record_outcome(&record);
        log::debug!(
            "t={end:.1} sample: {} {} tat={turnaround:.1}",
            self.id,
            outcome.as_str()
        );
        Ok(Step::Terminate)
    }
}

impl Process<LabModel> for SampleProcess {
    fn name(&self) -> &str {
        &self.id
    }

    fn resume(&mut self, cx: &mut ProcessContext<'_, LabModel>) -> SimResult<Step> {
        match self.stage {
            SampleStage::Arrive => self.arrive(cx),
            SampleStage::AwaitDispatch => {
                if self.mode.needs_incubation() && !self.is_rerun {
                    let incubation = cx.model.config.timing.ret_incubation;
                    log::debug!("t={:.1} sample: {} incubating for {incubation:.0}s", cx.now(), self.id);
                    self.stage = SampleStage::Incubating;
                    return Ok(Step::hold(incubation));
                }
                Ok(self.request_analyzer(cx))
            }
            SampleStage::Incubating => Ok(self.request_analyzer(cx)),
            SampleStage::AwaitAnalyzer => {
                let now = cx.now();
                if cx.failed() {
                    log::warn!("t={now:.1} sample: {} analyzer request failed", self.id);
                    return self.finish(cx, SampleOutcome::Failed, now);
                }
                self.analysis_start = Some(now);
                log::debug!(
                    "t={now:.1} sample: {} acquired analyzer after {:.1}s",
                    self.id,
                    now - self.queue_time
                );
                cx.model.set_status(now, AnalyzerStatus::Analyzing);
                self.draws = cx.model.draws_for(self.mode);
                self.drawn = 0;
                self.stage = SampleStage::DrawReagents;
                Ok(self.next_draw(cx))
            }
            SampleStage::DrawReagents => {
                if cx.failed() {
                    return self.reagent_failure(cx);
                }
                self.drawn += 1;
                Ok(self.next_draw(cx))
            }
            SampleStage::Analyzing => {
                let waste = cx.model.waste;
                let volume = cx.model.config.consumption.waste_for(self.mode);
                self.stage = SampleStage::DrainWaste;
                Ok(Step::put(waste, volume, AdmissionPolicy::Fail))
            }
            SampleStage::DrainWaste => {
                if cx.failed() {
                    return self.waste_failure(cx);
                }
                self.analysis_done(cx)
            }
            SampleStage::Done => Ok(Step::Terminate),
        }
    }
}
