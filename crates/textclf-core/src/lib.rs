pub mod attention;
pub mod checkpoint;
pub mod classifier;
pub mod config;
pub mod error;
pub mod layer_norm;
pub mod rnf;
pub mod transformer;

pub use checkpoint::{load_safetensors, save_safetensors};
pub use classifier::{summary, trainable_parameters, Classifier};
pub use config::{RnfConfig, TransformerConfig};
pub use error::{ModelError, Result};
pub use rnf::RecurrentNeuralFilter;
pub use transformer::TransformerClassifier;
