use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokenizer::Tokenizer;

use crate::error::{DataError, Result};

/// A labeled, tokenized text instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    pub text: Vec<String>,
    pub label: String,
}

/// An untokenized line as it comes out of a dataset file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawExample {
    pub text: String,
    pub label: String,
}

impl RawExample {
    pub fn new(text: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            label: label.into(),
        }
    }
}

/// Predicate deciding which examples a loader keeps.
pub type ExampleFilter = dyn Fn(&Example) -> bool + Send + Sync;

/// Filter dropping every example with the given label, e.g. `"neutral"`
/// for binary sentiment.
pub fn exclude_label(label: &str) -> Box<ExampleFilter> {
    let label = label.to_string();
    Box::new(move |ex: &Example| ex.label != label)
}

/// Tokenizes a raw example, relabels it through `label_map` and applies the
/// filter. Returns `Ok(None)` when the filter rejects the example.
pub fn to_example(
    raw: &RawExample,
    tokenizer: &dyn Tokenizer,
    filter: Option<&ExampleFilter>,
    label_map: Option<&HashMap<String, String>>,
) -> Result<Option<Example>> {
    let label = match label_map {
        Some(map) => map
            .get(&raw.label)
            .cloned()
            .ok_or_else(|| DataError::UnknownLabel(raw.label.clone()))?,
        None => raw.label.clone(),
    };

    let example = Example {
        text: tokenizer.tokenize(&raw.text),
        label,
    };

    match filter {
        Some(keep) if !keep(&example) => Ok(None),
        _ => Ok(Some(example)),
    }
}
