//! Periodic reagent and waste check.
//!
//! Every monitor interval: report levels and queue length, raise the
//! reagent flag if any reagent is under the low threshold and the waste
//! flag if the container is over the high threshold, then wake maintenance.
//! A flag that is already up is left alone.

use crate::{
    engine::ProcessContext,
    error::SimResult,
    event::LabEvent,
    lab::LabModel,
    process::{Process, Step},
    stats::METRIC_QUEUE_LENGTH,
};

#[derive(Debug, Default)]
pub struct LevelMonitorProcess {
    started: bool,
}

impl LevelMonitorProcess {
    pub fn new() -> Self {
        Self::default()
    }

    fn check(&mut self, cx: &mut ProcessContext<'_, LabModel>) -> SimResult<()> {
        let now = cx.now();
        let thresholds = cx.model.config.thresholds.clone();

        let mut low = Vec::new();
        for id in cx.model.reagents() {
            let store = cx.store(id)?;
            cx.model.emit(LabEvent::LevelChanged {
                time:  now,
                store: store.name().to_string(),
                level: store.level(),
            });
            if store.fill_pct() < thresholds.reagent_low_pct {
                low.push(store.name().to_string());
            }
        }
        let waste = cx.store(cx.model.waste)?;
        let waste_pct = waste.fill_pct();
        cx.model.emit(LabEvent::LevelChanged {
            time:  now,
            store: waste.name().to_string(),
            level: waste.level(),
        });
        log::debug!("t={now:.1} monitor: low reagents {low:?}, waste at {waste_pct:.1}%");

        let maintenance = cx.model.maintenance;
        if !*cx.model.needs_reagent.get() && !low.is_empty() {
            log::info!("t={now:.1} monitor: reagents low: {}", low.join(", "));
            cx.model.needs_reagent.set(now, true);
            cx.wake(maintenance)?;
        }
        if !*cx.model.needs_waste.get() && waste_pct > thresholds.waste_high_pct {
            log::info!("t={now:.1} monitor: waste container at {waste_pct:.1}%");
            cx.model.needs_waste.set(now, true);
            cx.wake(maintenance)?;
        }

        let queued = cx.model.autoloader.len() as f64;
        cx.model.record(METRIC_QUEUE_LENGTH, queued);
        cx.model.emit_queue_length(now);
        Ok(())
    }
}

impl Process<LabModel> for LevelMonitorProcess {
    fn name(&self) -> &str {
        "level_monitor"
    }

    fn resume(&mut self, cx: &mut ProcessContext<'_, LabModel>) -> SimResult<Step> {
        if self.started {
            self.check(cx)?;
        }
        self.started = true;
        Ok(Step::hold(cx.model.config.actors.monitor_interval))
    }
}
