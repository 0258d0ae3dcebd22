use crate::callback::{CallbackAction, CallbackContext, TrainerCallback};
use crate::Monitor;

use super::trial::Trial;

/// Reports the monitored metric to a trial after every epoch and prunes the
/// run when the trial's pruner says so.
pub struct PruningCallback {
    trial: Trial,
    monitor: Monitor,
}

impl PruningCallback {
    pub fn new(trial: Trial, monitor: Monitor) -> Self {
        Self { trial, monitor }
    }
}

impl TrainerCallback for PruningCallback {
    fn on_epoch_end(&mut self, ctx: &CallbackContext) -> CallbackAction {
        let Some(score) = ctx.metric(self.monitor) else {
            log::warn!("Metric {:?} is not available; the trial cannot be pruned", self.monitor);
            return CallbackAction::Continue;
        };

        self.trial.report(score, ctx.epoch);
        if self.trial.should_prune() {
            log::info!("Trial {} was pruned at epoch {}.", self.trial.number(), ctx.epoch);
            CallbackAction::Prune
        } else {
            CallbackAction::Continue
        }
    }

    fn name(&self) -> &'static str {
        "PruningCallback"
    }
}
