use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Invalid model config: {0}")]
    InvalidConfig(String),

    #[error("Tensor error: {0}")]
    Tch(#[from] tch::TchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Safetensors error: {0}")]
    Safetensors(#[from] safetensors::SafeTensorError),

    #[error("Shape mismatch for {name}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<i64>,
        actual: Vec<i64>,
    },

    #[error("Unsupported dtype {0}")]
    UnsupportedDtype(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
