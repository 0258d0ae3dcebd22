use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrainError {
    #[error("Model error: {0}")]
    Model(#[from] textclf_core::ModelError),

    #[error("Data error: {0}")]
    Data(#[from] datasets::DataError),

    #[error("Tensor error: {0}")]
    Tch(#[from] tch::TchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("Loss became non-finite at epoch {epoch}, step {step}")]
    NonFiniteLoss { epoch: usize, step: usize },

    #[error("The {0} split produced no examples")]
    EmptySplit(&'static str),

    #[error("Training was pruned at epoch {epoch}")]
    Pruned { epoch: usize },
}

pub type Result<T> = std::result::Result<T, TrainError>;
