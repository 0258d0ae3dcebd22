use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HpoError {
    #[error("Invalid range for {name}: [{low}, {high}]")]
    InvalidRange { name: String, low: f64, high: f64 },

    #[error("Parameter {0} was already suggested from a different distribution")]
    ParameterConflict(String),

    #[error("Categorical parameter {0} has no choices")]
    EmptyChoices(String),

    #[error("No trials completed")]
    NoCompletedTrials,
}

pub type Result<T> = std::result::Result<T, HpoError>;

/// Returned (through `anyhow`) by an objective to end its trial as pruned.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Trial was pruned")]
pub struct TrialPruned;
