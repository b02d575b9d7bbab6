//! Stochastic sample generator.
//!
//! Draws an inter-arrival gap, then creates one sample with a mode picked
//! from the configured table. Arrivals that find the autoloader full are
//! rejected and counted; they never become samples.

use crate::{
    engine::ProcessContext,
    error::SimResult,
    lab::LabModel,
    process::{Process, Step},
    rng::RandomSource,
    sample_process::SampleProcess,
    stats::METRIC_QUEUE_LENGTH,
};

pub struct ArrivalProcess {
    gaps:    Box<dyn RandomSource>,
    modes:   Box<dyn RandomSource>,
    started: bool,
}

impl ArrivalProcess {
    pub fn new(gaps: Box<dyn RandomSource>, modes: Box<dyn RandomSource>) -> Self {
        Self { gaps, modes, started: false }
    }

    fn emit_sample(&mut self, cx: &mut ProcessContext<'_, LabModel>) -> SimResult<()> {
        let now = cx.now();
        let sample_id = cx.model.next_sample_id();
        let mode = cx.model.config.modes.pick(self.modes.next_f64());
        cx.model.announce_arrival(now, &sample_id, mode);

        if cx.model.autoloader.is_full() {
            cx.model.reject_arrival(now, &sample_id, mode);
            return Ok(());
        }
        log::debug!("t={now:.1} arrivals: {sample_id} mode={}", mode.as_str());
        cx.spawn(Box::new(SampleProcess::new(sample_id, mode)))?;
        let queued = cx.model.autoloader.len() as f64;
        cx.model.record(METRIC_QUEUE_LENGTH, queued);
        Ok(())
    }
}

impl Process<LabModel> for ArrivalProcess {
    fn name(&self) -> &str {
        "arrivals"
    }

    fn resume(&mut self, cx: &mut ProcessContext<'_, LabModel>) -> SimResult<Step> {
        if self.started {
            self.emit_sample(cx)?;
        }
        self.started = true;
        let gap = self.gaps.sample(&cx.model.config.timing.inter_arrival).max(0.0);
        Ok(Step::hold(gap))
    }
}
