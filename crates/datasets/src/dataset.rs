use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::ops::Index;
use tokenizer::{Tokenizer, Vocab, VocabConfig};

use crate::error::Result;
use crate::example::{to_example, Example, ExampleFilter, RawExample};

/// How a dataset was produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetAttributes {
    pub name: String,
    pub train_subtrees: bool,
    pub fine_grained: bool,
    pub tokenizer: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TextDataset {
    examples: Vec<Example>,
    pub attributes: DatasetAttributes,
}

impl TextDataset {
    pub fn new(examples: Vec<Example>, attributes: DatasetAttributes) -> Self {
        Self { examples, attributes }
    }

    /// Tokenizes, relabels and filters raw examples in parallel, keeping
    /// their original order.
    pub fn from_raw(
        raw: &[RawExample],
        tokenizer: &dyn Tokenizer,
        filter: Option<&ExampleFilter>,
        label_map: Option<&HashMap<String, String>>,
        attributes: DatasetAttributes,
    ) -> Result<Self> {
        let mapped: Vec<Option<Example>> = raw
            .par_iter()
            .map(|r| to_example(r, tokenizer, filter, label_map))
            .collect::<Result<_>>()?;

        let examples: Vec<Example> = mapped.into_iter().flatten().collect();
        log::info!(
            "{}: kept {} of {} examples",
            attributes.name,
            examples.len(),
            raw.len()
        );
        Ok(Self::new(examples, attributes))
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Example> {
        self.examples.get(idx)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Example> {
        self.examples.iter()
    }

    pub fn examples(&self) -> &[Example] {
        &self.examples
    }

    /// Number of examples per label, sorted by label.
    pub fn label_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for ex in &self.examples {
            *counts.entry(ex.label.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn build_vocab(&self, config: &VocabConfig) -> Vocab {
        Vocab::build(self.examples.iter().map(|ex| ex.text.as_slice()), config)
    }
}

impl Index<usize> for TextDataset {
    type Output = Example;

    fn index(&self, idx: usize) -> &Example {
        &self.examples[idx]
    }
}

impl<'a> IntoIterator for &'a TextDataset {
    type Item = &'a Example;
    type IntoIter = std::slice::Iter<'a, Example>;

    fn into_iter(self) -> Self::IntoIter {
        self.examples.iter()
    }
}
