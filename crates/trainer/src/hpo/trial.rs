use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::error::{HpoError, Result};
use super::pruner::Pruner;
use super::study::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialState {
    Running,
    Complete,
    Pruned,
    Fail,
}

/// A sampled hyperparameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Categorical(String),
}

impl ParamValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Integers widen to floats.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Categorical(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Categorical(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Categorical(s) => write!(f, "{}", s),
        }
    }
}

/// The range a parameter is drawn from. Both bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Distribution {
    Int { low: i64, high: i64 },
    Float { low: f64, high: f64, log: bool },
    Categorical { choices: Vec<String> },
}

impl Distribution {
    fn validate(&self, name: &str) -> Result<()> {
        let invalid = |low: f64, high: f64| HpoError::InvalidRange {
            name: name.to_string(),
            low,
            high,
        };
        match self {
            Distribution::Int { low, high } if low > high => Err(invalid(*low as f64, *high as f64)),
            Distribution::Float { low, high, log } => {
                if !low.is_finite() || !high.is_finite() || low > high || (*log && *low <= 0.0) {
                    Err(invalid(*low, *high))
                } else {
                    Ok(())
                }
            }
            Distribution::Categorical { choices } if choices.is_empty() => {
                Err(HpoError::EmptyChoices(name.to_string()))
            }
            _ => Ok(()),
        }
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> ParamValue {
        match self {
            Distribution::Int { low, high } => ParamValue::Int(rng.gen_range(*low..=*high)),
            Distribution::Float { low, high, log: false } => {
                ParamValue::Float(rng.gen_range(*low..=*high))
            }
            Distribution::Float { low, high, log: true } => {
                let value = rng.gen_range(low.ln()..=high.ln()).exp();
                ParamValue::Float(value.clamp(*low, *high))
            }
            Distribution::Categorical { choices } => {
                ParamValue::Categorical(choices[rng.gen_range(0..choices.len())].clone())
            }
        }
    }

    pub fn contains(&self, value: &ParamValue) -> bool {
        match (self, value) {
            (Distribution::Int { low, high }, ParamValue::Int(v)) => low <= v && v <= high,
            (Distribution::Float { low, high, .. }, ParamValue::Float(v)) => low <= v && v <= high,
            (Distribution::Categorical { choices }, ParamValue::Categorical(s)) => choices.contains(s),
            _ => false,
        }
    }
}

/// Immutable record of a trial, as kept by the study.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrozenTrial {
    pub number: usize,
    pub state: TrialState,
    pub value: Option<f64>,
    pub params: BTreeMap<String, ParamValue>,
    pub intermediate_values: BTreeMap<usize, f64>,
    pub duration: Duration,
}

impl FrozenTrial {
    pub fn last_step(&self) -> Option<usize> {
        self.intermediate_values.keys().next_back().copied()
    }

    pub fn last_intermediate(&self) -> Option<f64> {
        self.intermediate_values.values().next_back().copied()
    }
}

struct TrialInner {
    params: BTreeMap<String, ParamValue>,
    distributions: BTreeMap<String, Distribution>,
    intermediate_values: BTreeMap<usize, f64>,
    rng: StdRng,
}

/// Handle to the running trial. Clones share state, so a copy can be moved
/// into a training callback while the objective keeps its own.
#[derive(Clone)]
pub struct Trial {
    number: usize,
    inner: Arc<Mutex<TrialInner>>,
    pruner: Arc<dyn Pruner>,
    history: Arc<Vec<FrozenTrial>>,
    direction: Direction,
}

impl Trial {
    pub(crate) fn new(
        number: usize,
        seed: u64,
        pruner: Arc<dyn Pruner>,
        history: Arc<Vec<FrozenTrial>>,
        direction: Direction,
    ) -> Self {
        let inner = TrialInner {
            params: BTreeMap::new(),
            distributions: BTreeMap::new(),
            intermediate_values: BTreeMap::new(),
            rng: StdRng::seed_from_u64(seed),
        };
        Self {
            number,
            inner: Arc::new(Mutex::new(inner)),
            pruner,
            history,
            direction,
        }
    }

    pub fn number(&self) -> usize {
        self.number
    }

    fn lock(&self) -> MutexGuard<'_, TrialInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Draws `name` from `distribution`. Asking again for a name returns the
    /// value drawn the first time.
    fn suggest(&self, name: &str, distribution: Distribution) -> Result<ParamValue> {
        distribution.validate(name)?;

        let mut inner = self.lock();
        if let Some(existing) = inner.distributions.get(name) {
            if *existing != distribution {
                return Err(HpoError::ParameterConflict(name.to_string()));
            }
            if let Some(value) = inner.params.get(name) {
                return Ok(value.clone());
            }
        }

        let value = distribution.sample(&mut inner.rng);
        log::debug!("Trial {} suggested {} = {}", self.number, name, value);
        inner.distributions.insert(name.to_string(), distribution);
        inner.params.insert(name.to_string(), value.clone());
        Ok(value)
    }

    pub fn suggest_int(&self, name: &str, low: i64, high: i64) -> Result<i64> {
        let value = self.suggest(name, Distribution::Int { low, high })?;
        value
            .as_int()
            .ok_or_else(|| HpoError::ParameterConflict(name.to_string()))
    }

    pub fn suggest_float(&self, name: &str, low: f64, high: f64) -> Result<f64> {
        self.suggest_float_with(name, low, high, false)
    }

    /// Samples uniformly in log space.
    pub fn suggest_float_log(&self, name: &str, low: f64, high: f64) -> Result<f64> {
        self.suggest_float_with(name, low, high, true)
    }

    fn suggest_float_with(&self, name: &str, low: f64, high: f64, log: bool) -> Result<f64> {
        let value = self.suggest(name, Distribution::Float { low, high, log })?;
        value
            .as_float()
            .ok_or_else(|| HpoError::ParameterConflict(name.to_string()))
    }

    /// Picks one of `choices`; they are recorded by their string form.
    pub fn suggest_categorical<T: Clone + ToString>(&self, name: &str, choices: &[T]) -> Result<T> {
        let labels: Vec<String> = choices.iter().map(ToString::to_string).collect();
        let value = self.suggest(name, Distribution::Categorical { choices: labels.clone() })?;
        value
            .as_str()
            .and_then(|s| labels.iter().position(|l| l == s))
            .map(|i| choices[i].clone())
            .ok_or_else(|| HpoError::ParameterConflict(name.to_string()))
    }

    /// Records an intermediate score. Only the first report for a step counts.
    pub fn report(&self, value: f64, step: usize) {
        let mut inner = self.lock();
        if inner.intermediate_values.contains_key(&step) {
            log::warn!(
                "Trial {} already reported a value for step {}; ignoring {}",
                self.number,
                step,
                value
            );
            return;
        }
        inner.intermediate_values.insert(step, value);
    }

    pub fn should_prune(&self) -> bool {
        let current = self.freeze(TrialState::Running, None, Duration::ZERO);
        self.pruner.prune(&self.history, &current, self.direction)
    }

    pub fn params(&self) -> BTreeMap<String, ParamValue> {
        self.lock().params.clone()
    }

    pub fn intermediate_values(&self) -> BTreeMap<usize, f64> {
        self.lock().intermediate_values.clone()
    }

    pub(crate) fn freeze(&self, state: TrialState, value: Option<f64>, duration: Duration) -> FrozenTrial {
        let inner = self.lock();
        FrozenTrial {
            number: self.number,
            state,
            value,
            params: inner.params.clone(),
            intermediate_values: inner.intermediate_values.clone(),
            duration,
        }
    }
}

impl fmt::Debug for Trial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trial")
            .field("number", &self.number)
            .field("params", &self.params())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hpo::pruner::NopPruner;

    fn trial(seed: u64) -> Trial {
        Trial::new(0, seed, Arc::new(NopPruner), Arc::new(Vec::new()), Direction::Minimize)
    }

    #[test]
    fn test_suggestions_stay_in_range() {
        let t = trial(3);
        let batch = t.suggest_int("batch_size", 16, 64).unwrap();
        assert!((16..=64).contains(&batch));
        let dropout = t.suggest_float("dropout", 0.2, 0.4).unwrap();
        assert!((0.2..=0.4).contains(&dropout));
        let lr = t.suggest_float_log("lr", 1e-4, 1e-3).unwrap();
        assert!((1e-4..=1e-3).contains(&lr));
        let heads = t.suggest_categorical("n_heads", &[4i64, 8]).unwrap();
        assert!(heads == 4 || heads == 8);

        let params = t.params();
        assert_eq!(params.len(), 4);
        assert_eq!(params["batch_size"], ParamValue::Int(batch));
        assert_eq!(params["n_heads"], ParamValue::Categorical(heads.to_string()));
    }

    #[test]
    fn test_repeated_suggestion_returns_recorded_value() {
        let t = trial(11);
        let first = t.suggest_float("dropout", 0.0, 1.0).unwrap();
        let clone = t.clone();
        assert_eq!(clone.suggest_float("dropout", 0.0, 1.0).unwrap(), first);

        let err = t.suggest_float("dropout", 0.0, 0.5).unwrap_err();
        assert_eq!(err, HpoError::ParameterConflict("dropout".to_string()));
        assert!(t.suggest_int("dropout", 0, 1).is_err());
    }

    #[test]
    fn test_same_seed_same_values() {
        let a = trial(5);
        let b = trial(5);
        assert_eq!(
            a.suggest_int("filter_width", 5, 8).unwrap(),
            b.suggest_int("filter_width", 5, 8).unwrap()
        );
        assert_eq!(
            a.suggest_float("lr", 1e-4, 1e-3).unwrap(),
            b.suggest_float("lr", 1e-4, 1e-3).unwrap()
        );
    }

    #[test]
    fn test_invalid_ranges() {
        let t = trial(0);
        assert!(matches!(t.suggest_int("n", 5, 1), Err(HpoError::InvalidRange { .. })));
        assert!(matches!(t.suggest_float("x", 1.0, 0.0), Err(HpoError::InvalidRange { .. })));
        assert!(matches!(t.suggest_float_log("lr", 0.0, 1.0), Err(HpoError::InvalidRange { .. })));
        assert!(matches!(
            t.suggest_categorical::<&str>("c", &[]),
            Err(HpoError::EmptyChoices(_))
        ));
        assert!(t.params().is_empty());
    }

    #[test]
    fn test_degenerate_range() {
        let t = trial(0);
        assert_eq!(t.suggest_int("n", 3, 3).unwrap(), 3);
        assert_eq!(t.suggest_float("x", 0.5, 0.5).unwrap(), 0.5);
    }

    #[test]
    fn test_report_keeps_first_value_per_step() {
        let t = trial(0);
        t.report(0.9, 0);
        t.report(0.1, 0);
        t.clone().report(0.7, 1);
        let values = t.intermediate_values();
        assert_eq!(values.len(), 2);
        assert_eq!(values[&0], 0.9);

        let frozen = t.freeze(TrialState::Complete, Some(0.7), Duration::ZERO);
        assert_eq!(frozen.last_step(), Some(1));
        assert_eq!(frozen.last_intermediate(), Some(0.7));
        assert!(!t.should_prune());
    }

    #[test]
    fn test_distribution_contains() {
        let d = Distribution::Int { low: 1, high: 3 };
        assert!(d.contains(&ParamValue::Int(2)));
        assert!(!d.contains(&ParamValue::Int(4)));
        assert!(!d.contains(&ParamValue::Float(2.0)));
        assert_eq!(ParamValue::Int(2).as_float(), Some(2.0));
    }
}
