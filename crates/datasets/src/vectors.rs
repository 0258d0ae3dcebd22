use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tch::{Device, Tensor};
use tokenizer::{Vocab, PAD_ID};

use crate::error::{DataError, Result};

/// Range of the uniform init for words without a pretrained vector.
const UNKNOWN_INIT: f32 = 0.25;

/// Pretrained word vectors in the GloVe text format (`word v1 ... vd`).
#[derive(Debug, Clone)]
pub struct Vectors {
    dim: usize,
    index: HashMap<String, usize>,
    data: Vec<f32>,
}

/// Dense `[rows, dim]` matrix aligned with a vocabulary's ids.
#[derive(Debug, Clone)]
pub struct EmbeddingMatrix {
    pub rows: usize,
    pub dim: usize,
    pub data: Vec<f32>,
    /// Vocabulary entries that were found in the pretrained vectors.
    pub hits: usize,
}

impl EmbeddingMatrix {
    pub fn row(&self, id: usize) -> Option<&[f32]> {
        self.data.get(id * self.dim..(id + 1) * self.dim)
    }

    pub fn to_tensor(&self, device: Device) -> Tensor {
        Tensor::from_slice(&self.data)
            .view([self.rows as i64, self.dim as i64])
            .to(device)
    }
}

impl Vectors {
    /// Path of a GloVe release inside `root`, e.g. `glove.840B.300d.txt`.
    pub fn glove_path<P: AsRef<Path>>(root: P, name: &str, dim: usize) -> PathBuf {
        root.as_ref().join(format!("glove.{name}.{dim}d.txt"))
    }

    pub fn glove<P: AsRef<Path>>(root: P, name: &str, dim: usize) -> Result<Self> {
        Self::from_file(Self::glove_path(root, name, dim), dim)
    }

    pub fn from_file<P: AsRef<Path>>(path: P, dim: usize) -> Result<Self> {
        Self::read(path.as_ref(), dim, None)
    }

    /// Loads only the words a vocabulary can use (exact or lower-cased),
    /// which keeps the large releases out of memory.
    pub fn from_file_for_vocab<P: AsRef<Path>>(path: P, dim: usize, vocab: &Vocab) -> Result<Self> {
        let mut wanted: HashSet<String> = HashSet::with_capacity(vocab.len() * 2);
        for token in &vocab.id_to_token {
            wanted.insert(token.clone());
            wanted.insert(token.to_lowercase());
        }
        Self::read(path.as_ref(), dim, Some(&wanted))
    }

    fn read(path: &Path, dim: usize, wanted: Option<&HashSet<String>>) -> Result<Self> {
        if dim == 0 {
            return Err(DataError::MalformedVectors("dimension must be positive".to_string()));
        }
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let mut vectors = Self {
            dim,
            index: HashMap::new(),
            data: Vec::new(),
        };
        let mut skipped = 0usize;

        for line in reader.split(b'\n') {
            let bytes = line?;
            let line = String::from_utf8_lossy(&bytes);
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }

            // values are the last `dim` fields; some 840B words contain spaces
            let fields: Vec<&str> = line.split(' ').collect();
            if fields.len() < dim + 1 {
                skipped += 1;
                continue;
            }
            let split = fields.len() - dim;
            // a number right before the values means the line is wider than `dim`
            if split > 1 && fields[split - 1].parse::<f32>().is_ok() {
                skipped += 1;
                continue;
            }
            let word = fields[..split].join(" ");
            if wanted.is_some_and(|w| !w.contains(&word)) || vectors.index.contains_key(&word) {
                continue;
            }

            let values: std::result::Result<Vec<f32>, _> =
                fields[split..].iter().map(|v| v.parse::<f32>()).collect();
            match values {
                Ok(values) => vectors.push(word, &values),
                Err(_) => skipped += 1,
            }
        }

        if skipped > 0 {
            log::warn!("Skipped {} lines without {} values in {:?}", skipped, dim, path);
        }
        if vectors.is_empty() {
            let msg = match wanted {
                Some(_) if skipped == 0 => format!("no vocabulary word has a vector in {path:?}"),
                _ => format!("no {dim}-dimensional vectors found in {path:?}"),
            };
            return Err(DataError::MalformedVectors(msg));
        }
        log::info!("Loaded {} vectors of dim {} from {:?}", vectors.len(), dim, path);
        Ok(vectors)
    }

    fn push(&mut self, word: String, values: &[f32]) {
        self.index.insert(word, self.index.len());
        self.data.extend_from_slice(values);
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Exact lookup, falling back to the lower-cased word.
    pub fn get(&self, token: &str) -> Option<&[f32]> {
        let row = self
            .index
            .get(token)
            .or_else(|| self.index.get(&token.to_lowercase()))?;
        Some(&self.data[row * self.dim..(row + 1) * self.dim])
    }

    /// Builds an embedding matrix row-aligned with `vocab`.
    ///
    /// `<pad>` is all zeros; words without a vector are drawn from
    /// U(-0.25, 0.25) with a seeded generator.
    pub fn matrix(&self, vocab: &Vocab, seed: u64) -> EmbeddingMatrix {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut data = Vec::with_capacity(vocab.len() * self.dim);
        let mut hits = 0;

        for (id, token) in vocab.id_to_token.iter().enumerate() {
            if id as i64 == PAD_ID {
                data.extend(std::iter::repeat(0.0f32).take(self.dim));
                continue;
            }
            match self.get(token) {
                Some(values) => {
                    data.extend_from_slice(values);
                    hits += 1;
                }
                None => data.extend((0..self.dim).map(|_| rng.gen_range(-UNKNOWN_INIT..UNKNOWN_INIT))),
            }
        }

        log::info!(
            "Pretrained vectors cover {}/{} vocabulary entries",
            hits,
            vocab.len().saturating_sub(1)
        );
        EmbeddingMatrix {
            rows: vocab.len(),
            dim: self.dim,
            data,
            hits,
        }
    }
}
