pub mod datamodule;
pub mod dataset;
pub mod encoder;
pub mod error;
pub mod example;
pub mod mr;
pub mod parse;
pub mod sst;
pub mod tree;
pub mod vectors;

pub use datamodule::{DataLoader, DataModule};
pub use dataset::{DatasetAttributes, TextDataset};
pub use encoder::{sentiment_target_encoding, Batch, BatchEncoder, PaddingEncoder};
pub use error::DataError;
pub use example::{exclude_label, Example, ExampleFilter, RawExample};
pub use mr::{load_mr, MrConfig};
pub use sst::{load_sst, SstConfig, SstSplits};
pub use vectors::{EmbeddingMatrix, Vectors};

use std::path::PathBuf;

/// Where each supported dataset is published.
pub const DATASET_URLS: &[(&str, &str)] = &[
    ("sst", "http://nlp.stanford.edu/sentiment/trainDevTestTrees_PTB.zip"),
    ("mr", "https://www.cs.cornell.edu/people/pabo/movie-review-data/rt-polaritydata.tar.gz"),
];

pub fn dataset_url(name: &str) -> &'static str {
    DATASET_URLS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, url)| *url)
        .unwrap_or("<unknown source>")
}

/// Fails with the download location when a dataset file is not on disk.
pub(crate) fn require_file(path: PathBuf, dataset: &str) -> error::Result<PathBuf> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(DataError::MissingFile {
            path,
            url: dataset_url(dataset),
        })
    }
}
