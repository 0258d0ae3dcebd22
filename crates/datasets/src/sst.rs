use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokenizer::Tokenizer;

use crate::dataset::{DatasetAttributes, TextDataset};
use crate::error::Result;
use crate::example::ExampleFilter;
use crate::parse::{parse_line_tree, read_examples};
use crate::require_file;

const DIR_NAME: &str = "trees";

/// Stanford Sentiment Treebank loader options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SstConfig {
    /// Directory holding every dataset.
    pub root: PathBuf,
    /// Folder inside `root` for this dataset.
    pub name: String,
    /// Turn every labelled phrase of a tree into its own example.
    pub train_subtrees: bool,
    /// Subtree setting for dev and test; `None` follows `train_subtrees`.
    #[serde(default)]
    pub eval_subtrees: Option<bool>,
    /// Keep five classes instead of collapsing to negative/neutral/positive.
    pub fine_grained: bool,
}

impl Default for SstConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".data"),
            name: "sst".to_string(),
            train_subtrees: false,
            eval_subtrees: None,
            fine_grained: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SstSplits {
    pub train: TextDataset,
    pub val: TextDataset,
    pub test: TextDataset,
}

/// Maps the treebank's `0`..`4` sentiment scale to label names.
pub fn sst_label_map(fine_grained: bool) -> HashMap<String, String> {
    let prefix = if fine_grained { "very " } else { "" };
    HashMap::from([
        ("0".to_string(), format!("{prefix}negative")),
        ("1".to_string(), "negative".to_string()),
        ("2".to_string(), "neutral".to_string()),
        ("3".to_string(), "positive".to_string()),
        ("4".to_string(), format!("{prefix}positive")),
    ])
}

/// Loads the train, dev and test splits from `<root>/<name>/trees`.
pub fn load_sst(
    config: &SstConfig,
    tokenizer: &dyn Tokenizer,
    filter: Option<&ExampleFilter>,
) -> Result<SstSplits> {
    let dir = config.root.join(&config.name).join(DIR_NAME);
    let label_map = sst_label_map(config.fine_grained);
    let attributes = DatasetAttributes {
        name: config.name.clone(),
        train_subtrees: config.train_subtrees,
        fine_grained: config.fine_grained,
        tokenizer: Some(tokenizer.name().to_string()),
    };

    let load_split = |file: &str, subtrees: bool| -> Result<TextDataset> {
        let path = require_file(dir.join(file), "sst")?;
        let raw = read_examples(&path, |line| parse_line_tree(line, subtrees))?;
        log::info!("Parsed {} labelled phrases from {:?}", raw.len(), path);
        TextDataset::from_raw(&raw, tokenizer, filter, Some(&label_map), attributes.clone())
    };

    let eval_subtrees = config.eval_subtrees.unwrap_or(config.train_subtrees);
    Ok(SstSplits {
        train: load_split("train.txt", config.train_subtrees)?,
        val: load_split("dev.txt", eval_subtrees)?,
        test: load_split("test.txt", eval_subtrees)?,
    })
}
