//! Hands the next queued sample the analyzer.
//!
//! The dispatcher releases one sample at a time and then yields, so the
//! activated sample claims the analyzer before the dispatcher looks again.
//! RET samples incubate without the analyzer, so the next sample can be
//! dispatched behind them.

use crate::{
    engine::ProcessContext,
    error::SimResult,
    lab::LabModel,
    process::{Process, Step},
};

#[derive(Debug, Default)]
pub struct DispatcherProcess;

impl DispatcherProcess {
    pub fn new() -> Self {
        Self
    }
}

impl Process<LabModel> for DispatcherProcess {
    fn name(&self) -> &str {
        "dispatcher"
    }

    fn resume(&mut self, cx: &mut ProcessContext<'_, LabModel>) -> SimResult<Step> {
        let now = cx.now();
        let status = *cx.model.status.get();
        let analyzer_free = cx.resource(cx.model.analyzer)?.is_idle();
        if cx.model.autoloader.is_empty() || !status.accepts_work() || !analyzer_free {
            log::trace!(
                "t={now:.1} dispatcher: passivate, status={status:?} queue={}",
                cx.model.autoloader.len()
            );
            return Ok(Step::Passivate);
        }

        let Some(entry) = cx.model.autoloader.pop(now) else {
            return Ok(Step::Passivate);
        };
        log::debug!(
            "t={now:.1} dispatcher: releasing {} ({:?}), {} left",
            entry.item.sample_id,
            entry.priority,
            cx.model.autoloader.len()
        );
        cx.model.emit_queue_length(now);
        cx.activate(entry.item.process)?;
        Ok(Step::yield_now())
    }
}
