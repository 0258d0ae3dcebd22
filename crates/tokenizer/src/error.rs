use thiserror::Error;

#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Unknown tokenizer kind: {0} (expected \"rule\" or \"simple\")")]
    UnknownKind(String),

    #[error("Vocabulary file is missing special token {0}")]
    MissingSpecial(&'static str),
}

pub type Result<T> = std::result::Result<T, TokenizerError>;
