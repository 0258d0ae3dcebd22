use super::study::Direction;
use super::trial::{FrozenTrial, TrialState};

/// Decides whether a running trial should stop early.
pub trait Pruner: Send + Sync {
    /// `trials` holds every trial the study has finished so far; `trial` is
    /// the one asking, with its intermediate values up to now.
    fn prune(&self, trials: &[FrozenTrial], trial: &FrozenTrial, direction: Direction) -> bool;
}

/// Never prunes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopPruner;

impl Pruner for NopPruner {
    fn prune(&self, _trials: &[FrozenTrial], _trial: &FrozenTrial, _direction: Direction) -> bool {
        false
    }
}

/// Prunes a trial whose best intermediate value is worse than the median of
/// the completed trials' values at the same step.
#[derive(Debug, Clone)]
pub struct MedianPruner {
    /// Completed trials required before anything is pruned.
    pub n_startup_trials: usize,
    /// Steps of each trial that are never pruned.
    pub n_warmup_steps: usize,
    /// Pruning is checked only every `interval_steps` after warmup.
    pub interval_steps: usize,
    /// Completed trials that must have reported at the step.
    pub n_min_trials: usize,
}

impl Default for MedianPruner {
    fn default() -> Self {
        Self {
            n_startup_trials: 5,
            n_warmup_steps: 0,
            interval_steps: 1,
            n_min_trials: 1,
        }
    }
}

impl MedianPruner {
    pub fn new(n_startup_trials: usize, n_warmup_steps: usize, interval_steps: usize) -> Self {
        Self {
            n_startup_trials,
            n_warmup_steps,
            interval_steps: interval_steps.max(1),
            ..Default::default()
        }
    }

    pub fn with_min_trials(mut self, n_min_trials: usize) -> Self {
        self.n_min_trials = n_min_trials.max(1);
        self
    }
}

impl Pruner for MedianPruner {
    fn prune(&self, trials: &[FrozenTrial], trial: &FrozenTrial, direction: Direction) -> bool {
        let Some(step) = trial.last_step() else {
            return false;
        };
        if trial.last_intermediate().is_some_and(f64::is_nan) {
            return true;
        }

        let completed: Vec<&FrozenTrial> = trials
            .iter()
            .filter(|t| t.state == TrialState::Complete)
            .collect();
        if completed.len() < self.n_startup_trials {
            return false;
        }
        if step < self.n_warmup_steps || (step - self.n_warmup_steps) % self.interval_steps.max(1) != 0 {
            return false;
        }

        let others: Vec<f64> = completed
            .iter()
            .filter_map(|t| t.intermediate_values.get(&step).copied())
            .filter(|v| !v.is_nan())
            .collect();
        if others.len() < self.n_min_trials.max(1) {
            return false;
        }

        let values = trial.intermediate_values.values().copied().filter(|v| !v.is_nan());
        let best = match direction {
            Direction::Minimize => values.fold(f64::INFINITY, f64::min),
            Direction::Maximize => values.fold(f64::NEG_INFINITY, f64::max),
        };
        let threshold = median(others);

        match direction {
            Direction::Minimize => best > threshold,
            Direction::Maximize => best < threshold,
        }
    }
}

/// Linear-interpolated median; `values` must be non-empty.
fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}
