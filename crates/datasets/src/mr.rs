use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokenizer::Tokenizer;

use crate::dataset::{DatasetAttributes, TextDataset};
use crate::error::Result;
use crate::example::ExampleFilter;
use crate::parse::{parse_line_without_label, read_examples};
use crate::require_file;

const DIR_NAME: &str = "rt-polaritydata";

/// Movie Review (sentence polarity v1.0) loader options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MrConfig {
    pub root: PathBuf,
    pub name: String,
}

impl Default for MrConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".data"),
            name: "mr".to_string(),
        }
    }
}

/// Loads `rt-polarity.pos` and `rt-polarity.neg` as one dataset, positive
/// examples first. MR ships without splits.
pub fn load_mr(
    config: &MrConfig,
    tokenizer: &dyn Tokenizer,
    filter: Option<&ExampleFilter>,
) -> Result<TextDataset> {
    let dir = config.root.join(&config.name).join(DIR_NAME);

    let pos_path = require_file(dir.join("rt-polarity.pos"), "mr")?;
    let neg_path = require_file(dir.join("rt-polarity.neg"), "mr")?;

    let mut raw = read_examples(&pos_path, |line| Ok(parse_line_without_label(line, "positive")))?;
    raw.extend(read_examples(&neg_path, |line| Ok(parse_line_without_label(line, "negative")))?);

    let attributes = DatasetAttributes {
        name: config.name.clone(),
        tokenizer: Some(tokenizer.name().to_string()),
        ..Default::default()
    };
    TextDataset::from_raw(&raw, tokenizer, filter, None, attributes)
}
