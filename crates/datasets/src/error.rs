use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tokenizer error: {0}")]
    Tokenizer(#[from] tokenizer::TokenizerError),

    #[error("Tensor error: {0}")]
    Tch(#[from] tch::TchError),

    #[error("Missing data file {path:?}; download and extract {url} first")]
    MissingFile { path: PathBuf, url: &'static str },

    #[error("Malformed tree at line {line}: {msg}")]
    TreeParse { line: usize, msg: String },

    #[error("Label {0:?} has no mapping")]
    UnknownLabel(String),

    #[error("No {0} split was provided")]
    MissingSplit(&'static str),

    #[error("Cannot encode an empty batch")]
    EmptyBatch,

    #[error("Malformed vectors file: {0}")]
    MalformedVectors(String),
}

pub type Result<T> = std::result::Result<T, DataError>;
