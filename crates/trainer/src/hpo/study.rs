use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::error::{HpoError, Result, TrialPruned};
use super::pruner::{MedianPruner, Pruner};
use super::trial::{FrozenTrial, Trial, TrialState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Minimize,
    Maximize,
}

impl Direction {
    fn is_better(self, value: f64, best: f64) -> bool {
        match self {
            Direction::Minimize => value < best,
            Direction::Maximize => value > best,
        }
    }
}

/// A hyperparameter search: runs an objective over successive trials and
/// keeps their records.
pub struct Study {
    direction: Direction,
    pruner: Arc<dyn Pruner>,
    seed: u64,
    trials: Vec<FrozenTrial>,
}

impl Study {
    /// Uses a [`MedianPruner`] with default settings.
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            pruner: Arc::new(MedianPruner::default()),
            seed: 0,
            trials: Vec::new(),
        }
    }

    pub fn with_pruner<P: Pruner + 'static>(mut self, pruner: P) -> Self {
        self.pruner = Arc::new(pruner);
        self
    }

    /// Seed for the sampler; trial `n` draws from `seed + n`.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn trials(&self) -> &[FrozenTrial] {
        &self.trials
    }

    /// Starts the next trial.
    pub fn ask(&self) -> Trial {
        let number = self.trials.len();
        Trial::new(
            number,
            self.seed.wrapping_add(number as u64),
            Arc::clone(&self.pruner),
            Arc::new(self.trials.clone()),
            self.direction,
        )
    }

    /// Records how `trial` ended. An error wrapping [`TrialPruned`] marks it
    /// pruned; any other error marks it failed and is handed back.
    pub fn tell(&mut self, trial: &Trial, outcome: anyhow::Result<f64>, duration: Duration) -> anyhow::Result<&FrozenTrial> {
        let record = match outcome {
            Ok(value) if value.is_nan() => {
                log::warn!("Trial {} failed because the objective returned NaN", trial.number());
                trial.freeze(TrialState::Fail, None, duration)
            }
            Ok(value) => trial.freeze(TrialState::Complete, Some(value), duration),
            Err(e) if e.downcast_ref::<TrialPruned>().is_some() => {
                let pruned = trial.freeze(TrialState::Pruned, None, duration);
                let value = pruned.last_intermediate();
                FrozenTrial { value, ..pruned }
            }
            Err(e) => {
                self.trials.push(trial.freeze(TrialState::Fail, None, duration));
                log::warn!("Trial {} failed: {:#}", trial.number(), e);
                return Err(e.context(format!("Trial {} failed", trial.number())));
            }
        };

        self.trials.push(record);
        let record = &self.trials[self.trials.len() - 1];
        self.log_result(record);
        Ok(record)
    }

    fn log_result(&self, record: &FrozenTrial) {
        match record.state {
            TrialState::Complete => {
                let params: Vec<String> = record
                    .params
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v))
                    .collect();
                let best = self
                    .best_trial()
                    .map(|b| format!("Best is trial {} with value: {}", b.number, b.value.unwrap_or(f64::NAN)))
                    .unwrap_or_default();
                log::info!(
                    "Trial {} finished with value: {} and parameters: {{{}}}. {}",
                    record.number,
                    record.value.unwrap_or(f64::NAN),
                    params.join(", "),
                    best
                );
            }
            TrialState::Pruned => log::info!("Trial {} pruned.", record.number),
            _ => {}
        }
    }

    /// Runs `objective` until `n_trials` have run or `timeout` has elapsed,
    /// whichever comes first. A running trial is never interrupted; the
    /// timeout only stops new ones from starting. With neither limit set the
    /// study runs until the objective fails.
    pub fn optimize<F>(&mut self, mut objective: F, n_trials: Option<usize>, timeout: Option<Duration>) -> anyhow::Result<()>
    where
        F: FnMut(&Trial) -> anyhow::Result<f64>,
    {
        let start = Instant::now();
        let mut run = 0;

        loop {
            if n_trials.is_some_and(|n| run >= n) {
                break;
            }
            if let Some(timeout) = timeout {
                if start.elapsed() >= timeout {
                    log::info!("Timeout of {:?} reached after {} trials", timeout, run);
                    break;
                }
            }

            let trial = self.ask();
            let trial_start = Instant::now();
            let outcome = objective(&trial);
            self.tell(&trial, outcome, trial_start.elapsed())?;
            run += 1;
        }
        Ok(())
    }

    pub fn best_trial(&self) -> Result<&FrozenTrial> {
        let mut best: Option<&FrozenTrial> = None;
        for trial in self.trials.iter().filter(|t| t.state == TrialState::Complete) {
            let Some(value) = trial.value else { continue };
            match best.and_then(|b| b.value) {
                Some(current) if !self.direction.is_better(value, current) => {}
                _ => best = Some(trial),
            }
        }
        best.ok_or(HpoError::NoCompletedTrials)
    }

    pub fn best_value(&self) -> Result<f64> {
        self.best_trial()?.value.ok_or(HpoError::NoCompletedTrials)
    }
}
