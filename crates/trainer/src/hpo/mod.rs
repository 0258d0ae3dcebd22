//! Trial-based hyperparameter search.
//!
//! A [`Study`] repeatedly calls an objective with a fresh [`Trial`]. The
//! objective draws hyperparameters through the trial's `suggest_*` methods,
//! reports intermediate scores, and asks [`Trial::should_prune`] whether to
//! give up early. Sampling is uniformly random and seeded per trial.

pub mod callback;
pub mod error;
pub mod pruner;
pub mod study;
pub mod trial;

pub use callback::PruningCallback;
pub use error::{HpoError, Result, TrialPruned};
pub use pruner::{MedianPruner, NopPruner, Pruner};
pub use study::{Direction, Study};
pub use trial::{Distribution, FrozenTrial, ParamValue, Trial, TrialState};
