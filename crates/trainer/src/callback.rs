//! Hooks that observe training after every epoch and can end it early.

use crate::Monitor;

/// Training state handed to callbacks at the end of an epoch.
#[derive(Clone, Debug, Default)]
pub struct CallbackContext {
    /// Current epoch (0-indexed)
    pub epoch: usize,
    pub max_epochs: usize,
    /// Mean per-example training loss of the epoch
    pub train_loss: f64,
    pub val_loss: Option<f64>,
    pub val_accuracy: Option<f64>,
}

impl CallbackContext {
    pub fn metric(&self, monitor: Monitor) -> Option<f64> {
        match monitor {
            Monitor::ValLoss => self.val_loss,
            Monitor::ValAccuracy => self.val_accuracy,
            Monitor::TrainLoss => Some(self.train_loss),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackAction {
    Continue,
    /// Finish training normally after this epoch
    Stop,
    /// Abandon the run; `fit` reports it as pruned
    Prune,
}

/// All methods default to no-ops, so implementors only override the events
/// they care about.
pub trait TrainerCallback: Send {
    fn on_train_begin(&mut self, _ctx: &CallbackContext) {}

    fn on_epoch_end(&mut self, _ctx: &CallbackContext) -> CallbackAction {
        CallbackAction::Continue
    }

    fn on_train_end(&mut self, _ctx: &CallbackContext) {}

    fn name(&self) -> &'static str {
        "TrainerCallback"
    }
}

/// Stops training once the monitored metric has not improved by more than
/// `min_delta` for `patience` consecutive epochs.
#[derive(Clone, Debug)]
pub struct EarlyStopping {
    patience: usize,
    min_delta: f64,
    monitor: Monitor,
    best: Option<f64>,
    pub(crate) wait: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize, min_delta: f64) -> Self {
        Self {
            patience,
            min_delta,
            monitor: Monitor::ValLoss,
            best: None,
            wait: 0,
        }
    }

    pub fn with_monitor(mut self, monitor: Monitor) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    fn improved(&self, value: f64) -> bool {
        match self.best {
            None => true,
            Some(best) if self.monitor.higher_is_better() => value > best + self.min_delta,
            Some(best) => value < best - self.min_delta,
        }
    }
}

impl TrainerCallback for EarlyStopping {
    fn on_train_begin(&mut self, _ctx: &CallbackContext) {
        self.best = None;
        self.wait = 0;
    }

    fn on_epoch_end(&mut self, ctx: &CallbackContext) -> CallbackAction {
        let Some(value) = ctx.metric(self.monitor) else {
            log::warn!("Early stopping is monitoring {:?}, which is not available", self.monitor);
            return CallbackAction::Continue;
        };

        if self.improved(value) {
            self.best = Some(value);
            self.wait = 0;
            return CallbackAction::Continue;
        }

        self.wait += 1;
        if self.wait >= self.patience {
            log::info!(
                "Early stopping at epoch {}: no improvement for {} epochs (best {:?}: {:.4})",
                ctx.epoch,
                self.patience,
                self.monitor,
                self.best.unwrap_or(value)
            );
            CallbackAction::Stop
        } else {
            CallbackAction::Continue
        }
    }

    fn name(&self) -> &'static str {
        "EarlyStopping"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(epoch: usize, val_loss: f64) -> CallbackContext {
        CallbackContext {
            epoch,
            max_epochs: 15,
            train_loss: 1.0,
            val_loss: Some(val_loss),
            val_accuracy: None,
        }
    }

    #[test]
    fn test_stops_after_patience() {
        let mut es = EarlyStopping::new(3, 1e-3);
        es.on_train_begin(&CallbackContext::default());

        assert_eq!(es.on_epoch_end(&ctx(0, 1.0)), CallbackAction::Continue);
        assert_eq!(es.on_epoch_end(&ctx(1, 0.9)), CallbackAction::Continue);
        // within min_delta, so not an improvement
        assert_eq!(es.on_epoch_end(&ctx(2, 0.8995)), CallbackAction::Continue);
        assert_eq!(es.on_epoch_end(&ctx(3, 0.95)), CallbackAction::Continue);
        assert_eq!(es.on_epoch_end(&ctx(4, 0.9)), CallbackAction::Stop);
        assert_eq!(es.best(), Some(0.9));
    }

    #[test]
    fn test_improvement_resets_wait() {
        let mut es = EarlyStopping::new(2, 0.0);
        es.on_epoch_end(&ctx(0, 1.0));
        es.on_epoch_end(&ctx(1, 1.1));
        assert_eq!(es.wait, 1);
        es.on_epoch_end(&ctx(2, 0.5));
        assert_eq!(es.wait, 0);
        assert_eq!(es.on_epoch_end(&ctx(3, 0.6)), CallbackAction::Continue);
    }

    #[test]
    fn test_maximised_metric() {
        let mut es = EarlyStopping::new(1, 0.0).with_monitor(Monitor::ValAccuracy);
        let mut c = ctx(0, 1.0);
        c.val_accuracy = Some(0.7);
        assert_eq!(es.on_epoch_end(&c), CallbackAction::Continue);
        c.val_accuracy = Some(0.8);
        assert_eq!(es.on_epoch_end(&c), CallbackAction::Continue);
        c.val_accuracy = Some(0.75);
        assert_eq!(es.on_epoch_end(&c), CallbackAction::Stop);
    }

    #[test]
    fn test_missing_metric_is_ignored() {
        let mut es = EarlyStopping::new(1, 0.0);
        let c = CallbackContext::default();
        assert_eq!(es.on_epoch_end(&c), CallbackAction::Continue);
        assert_eq!(es.on_epoch_end(&c), CallbackAction::Continue);
    }

    #[test]
    fn test_context_metric() {
        let c = ctx(0, 0.4);
        assert_eq!(c.metric(Monitor::ValLoss), Some(0.4));
        assert_eq!(c.metric(Monitor::TrainLoss), Some(1.0));
        assert_eq!(c.metric(Monitor::ValAccuracy), None);
    }
}
